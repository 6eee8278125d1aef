//! Monthly report: one CSV per month, one row per history record.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::info;
use serde::Serialize;

use super::MonthGroup;
use crate::models::{
    snapshot::{HUMIDITY, PRESSURE_1, PRESSURE_2, PRESSURE_3, TEMPERATURE},
    HistoryRecord,
};

const MISSING_READING: &str = "--";

#[derive(Debug, Serialize)]
struct ReportRow {
    #[serde(rename = "Fecha")]
    date: String,
    #[serde(rename = "Hora")]
    time: String,
    #[serde(rename = "Tipo")]
    kind: &'static str,
    #[serde(rename = "Fuente")]
    source: String,
    #[serde(rename = "Temperatura (°C)")]
    temperature: String,
    #[serde(rename = "Humedad (%)")]
    humidity: String,
    #[serde(rename = "Presión 1 (Pa)")]
    pressure_1: String,
    #[serde(rename = "Presión 2 (Pa)")]
    pressure_2: String,
    #[serde(rename = "Presión 3 (Pa)")]
    pressure_3: String,
}

impl ReportRow {
    fn from_record(record: &HistoryRecord) -> Result<Self> {
        let date = record.parsed_date()?;
        let reading = |channel: &str| {
            record
                .data
                .get(channel)
                .map(|value| value.to_string())
                .unwrap_or_else(|| MISSING_READING.to_string())
        };

        Ok(Self {
            date: date.format("%Y-%m-%d").to_string(),
            time: record.time.clone(),
            kind: record.kind.label(),
            source: record.source.clone(),
            temperature: reading(TEMPERATURE),
            humidity: reading(HUMIDITY),
            pressure_1: reading(PRESSURE_1),
            pressure_2: reading(PRESSURE_2),
            pressure_3: reading(PRESSURE_3),
        })
    }
}

pub fn report_file_name(group: &MonthGroup, now: NaiveDateTime) -> String {
    format!(
        "Registros_{}_{}_{}.csv",
        group.month_name,
        group.year,
        now.format("%Y%m%d_%H%M%S")
    )
}

/// Write `group` to `dir` and return the created file's path.
pub fn export_month(group: &MonthGroup, dir: &Path, now: NaiveDateTime) -> Result<PathBuf> {
    let mut rows = group
        .records
        .iter()
        .map(ReportRow::from_record)
        .collect::<Result<Vec<_>>>()?;
    rows.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));

    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(report_file_name(group, now));

    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Monthly report saved: {} ({} records)", path.display(), rows.len());
    Ok(path)
}
