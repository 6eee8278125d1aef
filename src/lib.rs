mod alerts;
mod clock;
pub mod commands;
mod events;
mod history;
mod models;
mod notify;
mod sensing;
mod settings;
mod store;
mod users;
mod utils;

use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

pub use alerts::{round_from_six, AlertFilter, AlertStore, AlertWatcher, Thresholds};
pub use clock::{
    spawn_display_ticker, Clock, ManualClock, Scheduler, SchedulerStatus, SystemClock,
    TargetTime, TargetTimeFile,
};
pub use events::{ui_channel, DashboardEvent, NoticeLevel, UiReceiver, UiSender};
pub use history::{export_month, group_by_month, HistoryStore, MonthGroup};
pub use models::{
    snapshot, AlertDraft, AlertRecord, AlertSeverity, HistoryRecord, RecordKind, Role, Snapshot,
};
pub use notify::Subscribers;
pub use sensing::{
    loop_worker::{perform_sample, SensingDeps},
    sample_snapshot, LatestSnapshot, SensingController, SnapshotSource,
};
pub use settings::{DataPaths, MonitorSettings, SettingsStore};
pub use store::{JsonStore, StoreOptions, StoredRecord};
pub use users::{UserError, UserStore};

pub const CLOCK_PAGE: &str = "Reloj Global";

/// Everything a dashboard session shares. Built once at startup and handed
/// to every component by reference.
pub struct MonitorContext {
    pub paths: DataPaths,
    pub settings: Arc<SettingsStore>,
    pub alerts: Arc<AlertStore>,
    pub scheduler: Arc<Scheduler>,
    pub users: UserStore,
    pub latest: Arc<LatestSnapshot>,
    pub ui: UiSender,
    clock: Arc<dyn Clock>,
}

impl MonitorContext {
    pub fn open(paths: DataPaths, clock: Arc<dyn Clock>, ui: UiSender) -> Result<Self> {
        std::fs::create_dir_all(&paths.root)
            .with_context(|| format!("failed to create {}", paths.root.display()))?;

        let settings = Arc::new(SettingsStore::new(paths.settings())?);
        let retention = settings.settings().history_retention;

        let history = Arc::new(HistoryStore::open(paths.history(), retention));
        let scheduler = Arc::new(Scheduler::new(
            TargetTimeFile::new(paths.target_times()),
            history,
            clock.clone(),
        ));

        let context = Self {
            alerts: Arc::new(AlertStore::with_clock(paths.alerts(), clock.clone())),
            users: UserStore::open(paths.users()),
            latest: Arc::new(LatestSnapshot::new(Snapshot::new())),
            settings,
            scheduler,
            ui,
            clock,
            paths,
        };
        context.wire_subscribers();
        Ok(context)
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn sensing_deps(&self) -> SensingDeps {
        SensingDeps {
            latest: self.latest.clone(),
            alerts: self.alerts.clone(),
            settings: self.settings.clone(),
            ui: self.ui.clone(),
        }
    }

    fn wire_subscribers(&self) {
        let scheduler: Weak<Scheduler> = Arc::downgrade(&self.scheduler);
        let source: Arc<dyn SnapshotSource> = self.latest.clone();
        let alerts = self.alerts.clone();
        let settings = self.settings.clone();
        let ui = self.ui.clone();

        self.scheduler.on_alarm(move |time| {
            let scheduler = scheduler
                .upgrade()
                .ok_or_else(|| anyhow!("scheduler dropped before alarm {time}"))?;
            let snapshot = source.current();

            scheduler.record_now(
                snapshot.clone(),
                RecordKind::Automatic,
                format!("Alarma {time}"),
            );
            settings.thresholds().raise(&alerts, &snapshot);
            alerts.add(AlertDraft::new(
                format!("Registro automático ejecutado a las {time}"),
                CLOCK_PAGE,
            ));

            ui.emit(DashboardEvent::AlarmFired {
                time: time.to_string(),
            });
            ui.notice(format!("✓ Registro automático a las {time}"), NoticeLevel::Info);
            Ok(())
        });

        let ui = self.ui.clone();
        self.scheduler.on_history(move |record| {
            ui.emit(match record {
                Some(record) => DashboardEvent::HistoryAdded(record.clone()),
                None => DashboardEvent::HistoryCleared,
            });
            Ok(())
        });
    }
}

/// Background tasks of a running session.
pub struct Services {
    sensing: SensingController,
    cancel_token: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Services {
    pub fn start(context: &MonitorContext) -> Result<Self> {
        let settings = context.settings.settings();
        let cancel_token = CancellationToken::new();

        context.scheduler.start()?;

        let mut sensing = SensingController::new();
        sensing.start_sensing(
            context.sensing_deps(),
            Duration::from_millis(settings.producer_interval_ms),
        )?;

        let watcher = AlertWatcher::new(
            context.alerts.clone(),
            context.ui.clone(),
            Duration::from_millis(settings.alert_watch_interval_ms),
        );
        let tasks = vec![
            watcher.spawn(cancel_token.clone()),
            spawn_display_ticker(
                context.clock.clone(),
                context.ui.clone(),
                Duration::from_secs(1),
                cancel_token.clone(),
            ),
        ];

        Ok(Self {
            sensing,
            cancel_token,
            tasks,
        })
    }

    pub async fn shutdown(mut self, context: &MonitorContext) -> Result<()> {
        self.cancel_token.cancel();
        self.sensing.stop_sensing().await?;
        context.scheduler.shutdown().await;
        for task in self.tasks {
            task.await.context("background task failed to join")?;
        }
        Ok(())
    }
}

/// The UI task: the only place UI-visible state changes. Headless, so it
/// logs what a screen would show.
pub async fn ui_loop(mut events: UiReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            DashboardEvent::Now(now) => debug!("clock {now}"),
            DashboardEvent::SnapshotUpdated(snapshot) => debug!("snapshot {snapshot:?}"),
            DashboardEvent::Notice { message, level } => info!("[{level:?}] {message}"),
            other => info!("{}: {:?}", other.name(), other),
        }
    }
}

pub async fn run() -> Result<()> {
    utils::init_logging(settings::debug_mode());
    info!("UMA monitor starting up...");

    let (ui, events) = ui_channel();
    let ui_task = tokio::spawn(ui_loop(events));

    let context = MonitorContext::open(DataPaths::from_env(), Arc::new(SystemClock), ui)?;
    info!(
        "Data directory {}, {} target times, {} history records, {} alerts",
        context.paths.root.display(),
        context.scheduler.target_times().len(),
        context.scheduler.history().len(),
        context.alerts.count(&AlertFilter::default()),
    );
    context
        .ui
        .notice("Sistema de monitoreo iniciado", NoticeLevel::Info);

    let services = Services::start(&context)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutting down...");

    services.shutdown(&context).await?;
    drop(context);
    if let Err(err) = ui_task.await {
        log::error!("UI task failed: {err}");
    }
    Ok(())
}
