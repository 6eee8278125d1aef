use std::{collections::HashSet, fmt, str::FromStr};

use anyhow::Context;
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerStatus {
    Active,
    Stopped,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        SchedulerStatus::Active
    }
}

/// A time of day, to the minute, that triggers an automatic recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetTime {
    hour: u32,
    minute: u32,
}

impl TargetTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Same hour and minute as `time`, ignoring seconds.
    pub fn matches(&self, time: NaiveTime) -> bool {
        time.hour() == self.hour && time.minute() == self.minute
    }
}

impl From<NaiveTime> for TargetTime {
    fn from(time: NaiveTime) -> Self {
        Self {
            hour: time.hour(),
            minute: time.minute(),
        }
    }
}

impl fmt::Display for TargetTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TargetTime {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .map(TargetTime::from)
            .with_context(|| format!("'{value}' is not an HH:MM time"))
    }
}

impl TryFrom<String> for TargetTime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetTime> for String {
    fn from(value: TargetTime) -> Self {
        value.to_string()
    }
}

/// Which (day, target) pairs already fired. Only today's entries are kept.
#[derive(Debug, Default)]
pub struct FiredKeys {
    keys: HashSet<(NaiveDate, TargetTime)>,
}

impl FiredKeys {
    /// Record a firing; false when this pair already fired.
    pub fn mark(&mut self, date: NaiveDate, target: TargetTime) -> bool {
        self.keys.insert((date, target))
    }

    pub fn purge_before(&mut self, today: NaiveDate) {
        self.keys.retain(|(date, _)| *date >= today);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub(crate) struct SchedulerState {
    pub status: SchedulerStatus,
    pub targets: Vec<TargetTime>,
    pub fired: FiredKeys,
}

impl SchedulerState {
    pub fn new(targets: Vec<TargetTime>) -> Self {
        Self {
            status: SchedulerStatus::Active,
            targets,
            fired: FiredKeys::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats() {
        let target: TargetTime = "9:05".parse().unwrap();
        assert_eq!(target, TargetTime::new(9, 5).unwrap());
        assert_eq!(target.to_string(), "09:05");
        assert!("24:00".parse::<TargetTime>().is_err());
        assert!("noon".parse::<TargetTime>().is_err());
        assert!(TargetTime::new(12, 60).is_none());
    }

    #[test]
    fn matches_ignores_seconds() {
        let target = TargetTime::new(14, 30).unwrap();
        assert!(target.matches(NaiveTime::from_hms_opt(14, 30, 59).unwrap()));
        assert!(!target.matches(NaiveTime::from_hms_opt(14, 31, 0).unwrap()));
    }

    #[test]
    fn fired_keys_purge_old_days() {
        let target = TargetTime::new(9, 0).unwrap();
        let day1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let mut fired = FiredKeys::default();

        assert!(fired.mark(day1, target));
        assert!(!fired.mark(day1, target));
        assert!(fired.mark(day2, target));

        fired.purge_before(day2);
        assert_eq!(fired.len(), 1);
        assert!(!fired.mark(day2, target));
        assert!(fired.mark(day1, target));
    }
}
