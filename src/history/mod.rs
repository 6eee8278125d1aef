//! Measurement history: capped, file-backed, grouped by month for reports.

pub mod export;

use std::{collections::BTreeMap, path::PathBuf};

use chrono::{Datelike, NaiveDateTime};

use crate::{
    models::{HistoryRecord, RecordKind, Snapshot},
    store::{helpers, JsonStore, StoreOptions},
};

pub use export::export_month;

pub const DEFAULT_RETENTION: usize = 100;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Records of one calendar month, in their stored order.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthGroup {
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub records: Vec<HistoryRecord>,
}

impl MonthGroup {
    /// `YYYY-MM`
    pub fn key(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }
}

pub struct HistoryStore {
    store: JsonStore<HistoryRecord>,
}

impl HistoryStore {
    pub fn open(path: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            store: JsonStore::open(
                path,
                StoreOptions {
                    retention: Some(retention),
                    seed_on_missing: true,
                },
            ),
        }
    }

    pub fn load(&self) -> Vec<HistoryRecord> {
        self.store.load()
    }

    pub fn append(
        &self,
        data: Snapshot,
        kind: RecordKind,
        source: impl Into<String>,
        at: NaiveDateTime,
    ) -> HistoryRecord {
        let source = source.into();
        let record = self.store.add_with(|id| HistoryRecord {
            id,
            date: helpers::history_date(at),
            time: helpers::clock_time(at),
            data,
            kind,
            source,
        });
        log_info!(
            "History record #{} added ({} from {})",
            record.id,
            record.kind.label(),
            record.source
        );
        record
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.store.records()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Partition records by the month in their `fecha` field. Keys sort
/// chronologically; records with unparseable dates are skipped.
pub fn group_by_month(records: &[HistoryRecord]) -> BTreeMap<String, MonthGroup> {
    let mut groups: BTreeMap<String, MonthGroup> = BTreeMap::new();

    for record in records {
        let date = match record.parsed_date() {
            Ok(date) => date,
            Err(err) => {
                log_warn!("skipping history record #{}: {err:#}", record.id);
                continue;
            }
        };

        let group = MonthGroup {
            year: date.year(),
            month: date.month(),
            month_name: helpers::month_name(date.month()),
            records: Vec::new(),
        };
        groups
            .entry(group.key())
            .or_insert(group)
            .records
            .push(record.clone());
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(day: u32, month: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn missing_file_is_seeded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("historial_registros.json");
        let history = HistoryStore::open(&path, DEFAULT_RETENTION);
        assert!(history.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn keeps_the_newest_hundred() {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::open(dir.path().join("h.json"), DEFAULT_RETENTION);
        for i in 0..105 {
            history.append(
                Snapshot::new().with("temperatura", i as f64),
                RecordKind::Automatic,
                format!("run {i}"),
                at(1, 6, 8, 0),
            );
        }

        let records = history.records();
        assert_eq!(records.len(), 100);
        assert_eq!(records[0].source, "run 5");
        assert_eq!(records[99].source, "run 104");

        let reopened = HistoryStore::open(dir.path().join("h.json"), DEFAULT_RETENTION);
        assert_eq!(reopened.len(), 100);
    }

    #[test]
    fn append_formats_date_and_time() {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::open(dir.path().join("h.json"), DEFAULT_RETENTION);
        let record = history.append(
            Snapshot::new(),
            RecordKind::Manual,
            "Manual (Home)",
            at(3, 2, 7, 5),
        );
        assert_eq!(record.date, "03/02/24");
        assert_eq!(record.time, "07:05");
        assert_eq!(record.id, 1);
    }

    #[test]
    fn groups_by_month_and_skips_bad_dates() {
        let record = |id: u64, date: &str| HistoryRecord {
            id,
            date: date.to_string(),
            time: "10:00".into(),
            data: Snapshot::new(),
            kind: RecordKind::Automatic,
            source: "test".into(),
        };
        let records = vec![
            record(1, "30/05/24"),
            record(2, "01/06/24"),
            record(3, "garbage"),
            record(4, "15/06/24"),
            record(5, "02/01/25"),
        ];

        let groups = group_by_month(&records);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, vec!["2024-05", "2024-06", "2025-01"]);

        let june = &groups["2024-06"];
        assert_eq!(june.month_name, "Junio");
        assert_eq!(
            june.records.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(groups["2025-01"].month_name, "Enero");
    }
}
