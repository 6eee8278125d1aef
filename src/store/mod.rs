//! File-backed record stores.
//!
//! A [`JsonStore`] keeps an ordered, id-keyed sequence of records in memory
//! and mirrors it to a single JSON array on disk. Every public operation is
//! infallible from the caller's point of view: I/O and parse failures are
//! logged and the store degrades to an empty in-memory state.

pub mod helpers;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// A record that can live in a [`JsonStore`].
pub trait StoredRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Short name used in log lines.
    const KIND: &'static str;

    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// Keep only the newest `n` records on every save.
    pub retention: Option<usize>,
    /// Write the (empty) initial file back when the backing file is missing.
    pub seed_on_missing: bool,
}

struct StoreState<R> {
    records: Vec<R>,
    next_id: u64,
    last_modified: DateTime<Utc>,
}

pub struct JsonStore<R> {
    path: PathBuf,
    options: StoreOptions,
    state: RwLock<StoreState<R>>,
}

impl<R: StoredRecord> JsonStore<R> {
    /// Open the store and load whatever is currently on disk.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let store = Self {
            path: path.into(),
            options,
            state: RwLock::new(StoreState {
                records: Vec::new(),
                next_id: 1,
                last_modified: Utc::now(),
            }),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the backing file, replacing the in-memory sequence.
    pub fn load(&self) -> Vec<R> {
        let mut state = self.write_state();

        if !self.path.exists() {
            state.records.clear();
            state.next_id = 1;
            if self.options.seed_on_missing {
                log_info!("{}: {} missing, writing initial file", R::KIND, self.path.display());
                if let Err(err) = self.persist(&mut state) {
                    log_error!("{}: failed to seed {}: {err:#}", R::KIND, self.path.display());
                }
            }
            return Vec::new();
        }

        match read_records::<R>(&self.path) {
            Ok(mut records) => {
                assign_missing_ids(&mut records);
                state.next_id = max_id(&records) + 1;
                state.records = records;
                log_info!(
                    "{}: {} records loaded, next id {}",
                    R::KIND,
                    state.records.len(),
                    state.next_id
                );
            }
            Err(err) => {
                log_error!("{}: error loading {}: {err:#}", R::KIND, self.path.display());
                state.records.clear();
                state.next_id = 1;
            }
        }

        state.records.clone()
    }

    /// Overwrite the backing file with the current in-memory sequence.
    pub fn save(&self) {
        let mut state = self.write_state();
        if let Err(err) = self.persist(&mut state) {
            log_error!("{}: error saving {}: {err:#}", R::KIND, self.path.display());
        }
    }

    pub fn next_id(&self) -> u64 {
        self.read_state().next_id
    }

    /// Assign the next id, let `build` fill in the record, append and persist.
    pub fn add_with(&self, build: impl FnOnce(u64) -> R) -> R {
        let mut state = self.write_state();
        let id = state.next_id;
        let mut record = build(id);
        record.set_id(id);
        state.records.push(record.clone());
        state.next_id = id + 1;
        if let Err(err) = self.persist(&mut state) {
            log_error!("{}: error saving {}: {err:#}", R::KIND, self.path.display());
        }
        record
    }

    /// Remove the first record with `id`. The id counter is left untouched.
    pub fn remove(&self, id: u64) -> bool {
        let mut state = self.write_state();
        let Some(index) = state.records.iter().position(|record| record.id() == id) else {
            return false;
        };
        state.records.remove(index);
        if let Err(err) = self.persist(&mut state) {
            log_error!("{}: error saving {}: {err:#}", R::KIND, self.path.display());
        }
        true
    }

    pub fn clear(&self) {
        let mut state = self.write_state();
        state.records.clear();
        state.next_id = 1;
        if let Err(err) = self.persist(&mut state) {
            log_error!("{}: error saving {}: {err:#}", R::KIND, self.path.display());
        }
        log_info!("{}: all records removed, ids reset", R::KIND);
    }

    pub fn records(&self) -> Vec<R> {
        self.read_state().records.clone()
    }

    /// Records matching `predicate`, in stored order.
    pub fn query(&self, predicate: impl Fn(&R) -> bool) -> Vec<R> {
        self.read_state()
            .records
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.read_state().last_modified
    }

    fn persist(&self, state: &mut StoreState<R>) -> Result<()> {
        if let Some(cap) = self.options.retention {
            if state.records.len() > cap {
                let excess = state.records.len() - cap;
                state.records.drain(..excess);
                log_warn!("{}: retention cap {} reached, dropped {} oldest", R::KIND, cap, excess);
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let serialized = serde_json::to_string_pretty(&state.records)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        state.last_modified = Utc::now();
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState<R>> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState<R>> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn read_records<R: StoredRecord>(path: &Path) -> Result<Vec<R>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw: Vec<serde_json::Value> = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a JSON array", path.display()))?;

    let mut records = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<R>(value) {
            Ok(record) => records.push(record),
            Err(err) => log_warn!("{}: skipping entry {index}: {err}", R::KIND),
        }
    }
    Ok(records)
}

fn max_id<R: StoredRecord>(records: &[R]) -> u64 {
    records.iter().map(StoredRecord::id).max().unwrap_or(0)
}

/// Entries written without an id (id 0) get fresh ids above the current max.
fn assign_missing_ids<R: StoredRecord>(records: &mut [R]) {
    let mut next = max_id(records) + 1;
    for record in records.iter_mut().filter(|record| record.id() == 0) {
        record.set_id(next);
        next += 1;
    }
}
