use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::store::{helpers, StoredRecord};

pub const GENERAL_ELEMENT: &str = "General";
const MISSING_VALUE: &str = "N/A";

/// Severity tag stored in the `tipo` field. Unrecognised tags read back as
/// `Info`, which keeps the stored text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlertSeverity {
    Warning,
    Critical,
    Info(String),
}

impl AlertSeverity {
    pub fn as_str(&self) -> &str {
        match self {
            AlertSeverity::Warning => "advertencia",
            AlertSeverity::Critical => "critica",
            AlertSeverity::Info(tag) => tag,
        }
    }
}

impl Default for AlertSeverity {
    fn default() -> Self {
        AlertSeverity::Warning
    }
}

impl From<String> for AlertSeverity {
    fn from(value: String) -> Self {
        match value.as_str() {
            "advertencia" | "" => AlertSeverity::Warning,
            "critica" => AlertSeverity::Critical,
            _ => AlertSeverity::Info(value),
        }
    }
}

impl From<AlertSeverity> for String {
    fn from(value: AlertSeverity) -> Self {
        value.as_str().to_string()
    }
}

fn general() -> String {
    GENERAL_ELEMENT.to_string()
}

fn missing_value() -> String {
    MISSING_VALUE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    #[serde(default)]
    pub id: u64,
    #[serde(rename = "causa")]
    pub cause: String,
    #[serde(rename = "pagina", default)]
    pub page: String,
    #[serde(rename = "elemento", default = "general")]
    pub element: String,
    #[serde(rename = "valor", default = "missing_value")]
    pub value: String,
    #[serde(rename = "tipo", default)]
    pub severity: AlertSeverity,
    #[serde(rename = "fecha", default)]
    pub date: String,
    #[serde(rename = "hora", default)]
    pub time: String,
    #[serde(rename = "fecha_hora_completa", default)]
    pub timestamp: String,
}

impl StoredRecord for AlertRecord {
    const KIND: &'static str = "alerts";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

/// Producer-side fields of an alert; the store fills in id and timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertDraft {
    pub cause: String,
    pub page: String,
    pub element: Option<String>,
    pub value: Option<String>,
    pub severity: Option<AlertSeverity>,
}

impl AlertDraft {
    pub fn new(cause: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            page: page.into(),
            ..Self::default()
        }
    }

    pub fn element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn value(mut self, value: impl ToString) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub(crate) fn into_record(self, id: u64, at: NaiveDateTime) -> AlertRecord {
        AlertRecord {
            id,
            cause: self.cause,
            page: self.page,
            element: self
                .element
                .filter(|element| !element.is_empty())
                .unwrap_or_else(general),
            value: self.value.unwrap_or_else(missing_value),
            severity: self.severity.unwrap_or_default(),
            date: helpers::alert_date(at),
            time: helpers::clock_time(at),
            timestamp: at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn draft_fills_defaults() {
        let at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        let record = AlertDraft::new("Historial limpiado", "UMA").into_record(3, at);

        assert_eq!(record.id, 3);
        assert_eq!(record.element, "General");
        assert_eq!(record.value, "N/A");
        assert_eq!(record.severity, AlertSeverity::Warning);
        assert_eq!(record.date, "2024-06-01");
        assert_eq!(record.time, "09:05");
        assert!(record.timestamp.starts_with("2024-06-01T09:05:00"));
    }

    #[test]
    fn severity_round_trips_unknown_tags() {
        let json = r#"{"id":1,"causa":"x","tipo":"informativa"}"#;
        let record: AlertRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.severity, AlertSeverity::Info("informativa".into()));
        assert_eq!(record.element, "General");

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["tipo"], "informativa");
        assert_eq!(back["causa"], "x");
    }
}
