use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Snapshot;
use crate::store::{helpers, StoredRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "registro_automatico")]
    Automatic,
    #[serde(rename = "registro_manual", alias = "manual")]
    Manual,
}

impl RecordKind {
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Automatic => "Automático",
            RecordKind::Manual => "Manual",
        }
    }
}

fn default_source() -> String {
    "Sistema".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub id: u64,
    /// `DD/MM/YY`
    #[serde(rename = "fecha")]
    pub date: String,
    /// `HH:MM`
    #[serde(rename = "hora")]
    pub time: String,
    #[serde(rename = "datos", default)]
    pub data: Snapshot,
    #[serde(rename = "tipo")]
    pub kind: RecordKind,
    #[serde(rename = "fuente", default = "default_source")]
    pub source: String,
}

impl HistoryRecord {
    pub fn parsed_date(&self) -> anyhow::Result<NaiveDate> {
        helpers::parse_history_date(&self.date)
    }
}

impl StoredRecord for HistoryRecord {
    const KIND: &'static str = "history";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}
