use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{error, info, warn};

use super::TargetTime;

/// The persisted target set: a JSON array of `"HH:MM"` strings.
pub struct TargetTimeFile {
    path: PathBuf,
}

impl TargetTimeFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files yield an empty set. Invalid and
    /// duplicate entries are dropped.
    pub fn load(&self) -> Vec<TargetTime> {
        if !self.path.exists() {
            return Vec::new();
        }

        match self.read() {
            Ok(targets) => {
                info!(
                    "Target times loaded: {}",
                    targets
                        .iter()
                        .map(TargetTime::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                targets
            }
            Err(err) => {
                error!("Error loading target times: {err:#}");
                Vec::new()
            }
        }
    }

    pub fn save(&self, targets: &[TargetTime]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let raw: Vec<String> = targets.iter().map(TargetTime::to_string).collect();
        fs::write(&self.path, serde_json::to_string(&raw)?)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn read(&self) -> Result<Vec<TargetTime>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let raw: Vec<String> = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a list of times", self.path.display()))?;

        let mut targets = Vec::with_capacity(raw.len());
        for value in raw {
            match value.parse::<TargetTime>() {
                Ok(target) if !targets.contains(&target) => targets.push(target),
                Ok(target) => warn!("duplicate target time {target} ignored"),
                Err(err) => warn!("{err:#}"),
            }
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_in_insertion_order() {
        let dir = TempDir::new().unwrap();
        let file = TargetTimeFile::new(dir.path().join("horas.json"));
        let targets = vec![
            TargetTime::new(14, 30).unwrap(),
            TargetTime::new(8, 0).unwrap(),
        ];
        file.save(&targets).unwrap();

        assert_eq!(fs::read_to_string(file.path()).unwrap(), r#"["14:30","08:00"]"#);
        assert_eq!(file.load(), targets);
    }

    #[test]
    fn drops_invalid_and_duplicate_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("horas.json");
        fs::write(&path, r#"["09:00", "bad", "09:00", "23:59"]"#).unwrap();

        let loaded = TargetTimeFile::new(&path).load();
        assert_eq!(
            loaded,
            vec![TargetTime::new(9, 0).unwrap(), TargetTime::new(23, 59).unwrap()]
        );
    }

    #[test]
    fn corrupt_or_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("horas.json");
        assert!(TargetTimeFile::new(&path).load().is_empty());

        fs::write(&path, "{").unwrap();
        assert!(TargetTimeFile::new(&path).load().is_empty());
    }
}
