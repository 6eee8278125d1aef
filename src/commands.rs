//! Operations the dashboard screens call. Each one maps internal errors to
//! a display string the UI can show as-is.

use std::{collections::BTreeMap, path::PathBuf};

use crate::{
    alerts::{rules::SENSOR_PAGE, AlertFilter, Thresholds},
    clock::TargetTime,
    history::{self, group_by_month, MonthGroup},
    models::{AlertDraft, AlertRecord, HistoryRecord, RecordKind, Role},
    sensing::SnapshotSource,
    MonitorContext, NoticeLevel,
};

pub const MANUAL_SOURCE: &str = "Manual (Home)";

fn parse_time(value: &str) -> Result<TargetTime, String> {
    value
        .trim()
        .parse::<TargetTime>()
        .map_err(|_| format!("Hora inválida: {value} (use HH:MM)"))
}

pub fn record_manual(ctx: &MonitorContext) -> Result<HistoryRecord, String> {
    let snapshot = ctx.latest.current();
    let record = ctx
        .scheduler
        .record_now(snapshot, RecordKind::Manual, MANUAL_SOURCE);

    ctx.alerts.add(AlertDraft::new(
        "Registro manual ejecutado desde Home",
        SENSOR_PAGE,
    ));
    ctx.ui.notice(
        format!("✓ Registro manual guardado a las {}", record.time),
        NoticeLevel::Success,
    );
    Ok(record)
}

pub fn clear_history(ctx: &MonitorContext) -> Result<(), String> {
    ctx.scheduler.clear_history();
    ctx.alerts
        .add(AlertDraft::new("Historial de registros limpiado", SENSOR_PAGE));
    ctx.ui.notice("Historial limpiado", NoticeLevel::Info);
    Ok(())
}

pub fn add_target_time(ctx: &MonitorContext, value: &str) -> Result<TargetTime, String> {
    let target = parse_time(value)?;
    if !ctx.scheduler.add_time(target) {
        return Err(format!("La hora {target} ya está registrada"));
    }
    ctx.ui
        .notice(format!("Hora {target} agregada"), NoticeLevel::Success);
    Ok(target)
}

pub fn remove_target_time(ctx: &MonitorContext, value: &str) -> Result<(), String> {
    let target = parse_time(value)?;
    if !ctx.scheduler.remove_time(target) {
        return Err(format!("La hora {target} no está registrada"));
    }
    ctx.ui
        .notice(format!("Hora {target} eliminada"), NoticeLevel::Info);
    Ok(())
}

pub fn list_target_times(ctx: &MonitorContext) -> Result<Vec<String>, String> {
    Ok(ctx
        .scheduler
        .target_times()
        .iter()
        .map(TargetTime::to_string)
        .collect())
}

/// Re-reads the alert file first so edits from other processes show up.
pub fn list_alerts(
    ctx: &MonitorContext,
    page: Option<String>,
    element: Option<String>,
) -> Result<Vec<AlertRecord>, String> {
    ctx.alerts.load();
    let filter = AlertFilter { page, element };
    Ok(ctx.alerts.query(&filter))
}

pub fn delete_alert(ctx: &MonitorContext, id: u64) -> Result<(), String> {
    if ctx.alerts.remove(id) {
        Ok(())
    } else {
        Err(format!("Alerta {id} no encontrada"))
    }
}

pub fn clear_alerts(ctx: &MonitorContext) -> Result<(), String> {
    ctx.alerts.clear();
    ctx.ui.notice("Alertas eliminadas", NoticeLevel::Info);
    Ok(())
}

pub fn history_by_month(ctx: &MonitorContext) -> Result<BTreeMap<String, MonthGroup>, String> {
    let records = ctx.scheduler.history().load();
    Ok(group_by_month(&records))
}

/// `month` is the `YYYY-MM` key returned by [`history_by_month`].
pub fn export_month(ctx: &MonitorContext, month: &str) -> Result<PathBuf, String> {
    let groups = history_by_month(ctx)?;
    let group = groups
        .get(month)
        .ok_or_else(|| format!("No hay registros para {month}"))?;

    let dir = ctx.settings.settings().export_dir_or(&ctx.paths.reports());
    let path = history::export_month(group, &dir, ctx.clock().now()).map_err(|e| format!("{e:#}"))?;

    ctx.ui.notice(
        format!("Reporte exportado: {}", path.display()),
        NoticeLevel::Success,
    );
    Ok(path)
}

pub fn login(ctx: &MonitorContext, username: &str, password: &str) -> Result<Role, String> {
    ctx.users
        .verify_login(username, password)
        .map_err(|e| e.to_string())
}

pub fn register(
    ctx: &MonitorContext,
    username: &str,
    password: &str,
    confirm: &str,
) -> Result<(), String> {
    ctx.users
        .register(username, password, confirm)
        .map_err(|e| e.to_string())
}

/// Admin operations take the acting username and refuse non-admins.
pub fn create_user(
    ctx: &MonitorContext,
    actor: &str,
    username: &str,
    password: &str,
    role: Role,
) -> Result<(), String> {
    ctx.users
        .require_admin(actor)
        .and_then(|()| ctx.users.create_user(username, password, role))
        .map_err(|e| e.to_string())
}

pub fn update_user(
    ctx: &MonitorContext,
    actor: &str,
    username: &str,
    new_password: Option<&str>,
    new_role: Option<Role>,
) -> Result<(), String> {
    ctx.users
        .require_admin(actor)
        .and_then(|()| ctx.users.update_user(username, new_password, new_role))
        .map_err(|e| e.to_string())
}

pub fn delete_user(ctx: &MonitorContext, actor: &str, username: &str) -> Result<(), String> {
    ctx.users
        .require_admin(actor)
        .and_then(|()| ctx.users.delete_user(username))
        .map_err(|e| e.to_string())
}

pub fn list_users(ctx: &MonitorContext, actor: &str) -> Result<Vec<(String, Role)>, String> {
    ctx.users.require_admin(actor).map_err(|e| e.to_string())?;
    Ok(ctx.users.list())
}

pub fn update_thresholds(ctx: &MonitorContext, thresholds: Thresholds) -> Result<(), String> {
    ctx.settings
        .update_thresholds(thresholds)
        .map_err(|e| format!("{e:#}"))?;
    ctx.ui.notice("Umbrales actualizados", NoticeLevel::Success);
    Ok(())
}
