//! Alert events: the file-backed store, threshold rules and the change
//! watcher that tells the UI when to refresh its list.

pub mod rules;
pub mod watcher;

use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::info;

use crate::{
    clock::{Clock, SystemClock},
    models::{AlertDraft, AlertRecord, GENERAL_ELEMENT},
    store::{JsonStore, StoreOptions},
};

pub use rules::{round_from_six, Thresholds};
pub use watcher::AlertWatcher;

/// Equality filters; `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub page: Option<String>,
    pub element: Option<String>,
}

impl AlertFilter {
    pub fn page(page: impl Into<String>) -> Self {
        Self {
            page: Some(page.into()),
            element: None,
        }
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn matches(&self, alert: &AlertRecord) -> bool {
        self.page.as_ref().map_or(true, |page| &alert.page == page)
            && self
                .element
                .as_ref()
                .map_or(true, |element| &alert.element == element)
    }

    fn is_empty(&self) -> bool {
        self.page.is_none() && self.element.is_none()
    }
}

/// Alerts are stamped with the store's clock, so one session shares a
/// single notion of "now" with the scheduler.
pub struct AlertStore {
    store: JsonStore<AlertRecord>,
    clock: Arc<dyn Clock>,
}

impl AlertStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: JsonStore::open(path, StoreOptions::default()),
            clock,
        }
    }

    pub fn load(&self) -> Vec<AlertRecord> {
        self.store.load()
    }

    pub fn add(&self, draft: AlertDraft) -> AlertRecord {
        self.add_at(draft, self.clock.now())
    }

    fn add_at(&self, draft: AlertDraft, at: NaiveDateTime) -> AlertRecord {
        let record = self.store.add_with(|id| draft.into_record(id, at));
        let element = if record.element == GENERAL_ELEMENT {
            String::new()
        } else {
            format!(" [{}]", record.element)
        };
        info!(
            "Alert #{} added: {}{} - {} (value: {})",
            record.id, record.page, element, record.cause, record.value
        );
        record
    }

    pub fn remove(&self, id: u64) -> bool {
        let removed = self.store.remove(id);
        if removed {
            info!("Alert {id} removed");
        }
        removed
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn query(&self, filter: &AlertFilter) -> Vec<AlertRecord> {
        self.store.query(|alert| filter.matches(alert))
    }

    pub fn count(&self, filter: &AlertFilter) -> usize {
        if filter.is_empty() {
            self.store.len()
        } else {
            self.query(filter).len()
        }
    }

    /// Distinct element tags other than the default, sorted.
    pub fn unique_elements(&self) -> Vec<String> {
        self.store
            .records()
            .into_iter()
            .map(|alert| alert.element)
            .filter(|element| !element.is_empty() && element != GENERAL_ELEMENT)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.store.last_modified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> AlertStore {
        AlertStore::open(dir.path().join("alertas.json"))
    }

    #[test]
    fn query_by_page_keeps_order() {
        let dir = TempDir::new().unwrap();
        let alerts = store(&dir);
        alerts.add(AlertDraft::new("t1", "UMA"));
        alerts.add(AlertDraft::new("m1", "Manómetros"));
        alerts.add(AlertDraft::new("t2", "UMA"));
        alerts.add(AlertDraft::new("m2", "Manómetros"));
        alerts.add(AlertDraft::new("t3", "UMA"));

        let causes: Vec<String> = alerts
            .query(&AlertFilter::page("UMA"))
            .into_iter()
            .map(|alert| alert.cause)
            .collect();
        assert_eq!(causes, vec!["t1", "t2", "t3"]);
        assert_eq!(alerts.count(&AlertFilter::page("Manómetros")), 2);
        assert_eq!(alerts.count(&AlertFilter::default()), 5);
    }

    #[test]
    fn filters_combine() {
        let dir = TempDir::new().unwrap();
        let alerts = store(&dir);
        alerts.add(AlertDraft::new("a", "UMA").element("temperatura"));
        alerts.add(AlertDraft::new("b", "UMA").element("humedad"));
        alerts.add(AlertDraft::new("c", "Manómetros").element("temperatura"));

        let filter = AlertFilter::page("UMA").with_element("temperatura");
        let found = alerts.query(&filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cause, "a");
    }

    #[test]
    fn unique_elements_skip_general() {
        let dir = TempDir::new().unwrap();
        let alerts = store(&dir);
        alerts.add(AlertDraft::new("a", "UMA").element("presion2"));
        alerts.add(AlertDraft::new("b", "UMA"));
        alerts.add(AlertDraft::new("c", "UMA").element("humedad"));
        alerts.add(AlertDraft::new("d", "UMA").element("presion2"));

        assert_eq!(alerts.unique_elements(), vec!["humedad", "presion2"]);
    }

    #[test]
    fn clear_resets_ids_and_persists() {
        let dir = TempDir::new().unwrap();
        let alerts = store(&dir);
        alerts.add(AlertDraft::new("a", "UMA"));
        alerts.add(AlertDraft::new("b", "UMA"));
        alerts.clear();

        let reopened = store(&dir);
        assert_eq!(reopened.count(&AlertFilter::default()), 0);
        assert_eq!(reopened.add(AlertDraft::new("c", "UMA")).id, 1);
    }

    #[test]
    fn stamps_come_from_the_store_clock() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap(),
        ));
        let alerts = AlertStore::with_clock(dir.path().join("alertas.json"), clock.clone());

        let first = alerts.add(AlertDraft::new("a", "UMA"));
        assert_eq!(first.date, "2024-06-01");
        assert_eq!(first.time, "14:30");

        clock.advance(chrono::Duration::days(1));
        let second = alerts.add(AlertDraft::new("b", "UMA"));
        assert_eq!(second.date, "2024-06-02");
    }

    #[test]
    fn file_layout_uses_spanish_keys() {
        let dir = TempDir::new().unwrap();
        let alerts = store(&dir);
        alerts.add(AlertDraft::new("Presión ALTA", "UMA").value(109));

        let raw = std::fs::read_to_string(dir.path().join("alertas.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &value[0];
        for key in [
            "id",
            "causa",
            "pagina",
            "elemento",
            "valor",
            "tipo",
            "fecha",
            "hora",
            "fecha_hora_completa",
        ] {
            assert!(entry.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(entry["valor"], "109");
        assert_eq!(entry["tipo"], "advertencia");
    }
}
