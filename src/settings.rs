use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{alerts::Thresholds, history::DEFAULT_RETENTION};

pub const DATA_DIR_ENV: &str = "UMA_MONITOR_DATA_DIR";
pub const DEBUG_ENV: &str = "UMA_MONITOR_DEBUG";

/// `UMA_MONITOR_DEBUG=1` (or `true`) lowers the default log level to debug.
pub fn debug_mode() -> bool {
    is_debug_flag(std::env::var(DEBUG_ENV).ok().as_deref())
}

fn is_debug_flag(value: Option<&str>) -> bool {
    value.is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true"))
}

/// Where every backing file lives, derived from one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        let root = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        Self::new(root)
    }

    pub fn target_times(&self) -> PathBuf {
        self.root.join("horas.json")
    }

    pub fn history(&self) -> PathBuf {
        self.root.join("historial_registros.json")
    }

    pub fn alerts(&self) -> PathBuf {
        self.root.join("alertas.json")
    }

    pub fn users(&self) -> PathBuf {
        self.root.join("usuarios.json")
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn reports(&self) -> PathBuf {
        self.root.join("reportes")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    pub thresholds: Thresholds,
    pub producer_interval_ms: u64,
    pub alert_watch_interval_ms: u64,
    pub history_retention: usize,
    /// Defaults to `<data dir>/reportes` when unset.
    pub export_dir: Option<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            producer_interval_ms: 2_000,
            alert_watch_interval_ms: 500,
            history_retention: DEFAULT_RETENTION,
            export_dir: None,
        }
    }
}

impl MonitorSettings {
    pub fn export_dir_or(&self, fallback: &Path) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("settings file {} is invalid ({err}), using defaults", path.display());
                MonitorSettings::default()
            })
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> MonitorSettings {
        self.read().clone()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.read().thresholds.clone()
    }

    pub fn update_thresholds(&self, thresholds: Thresholds) -> Result<()> {
        let mut guard = self.write();
        guard.thresholds = thresholds;
        self.persist(&guard)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, MonitorSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, MonitorSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
