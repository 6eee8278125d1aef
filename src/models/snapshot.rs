use std::collections::BTreeMap;

use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

pub const TEMPERATURE: &str = "temperatura";
pub const HUMIDITY: &str = "humedad";
pub const PRESSURE_1: &str = "presion1";
pub const PRESSURE_2: &str = "presion2";
pub const PRESSURE_3: &str = "presion3";

pub const PRESSURE_CHANNELS: [&str; 3] = [PRESSURE_1, PRESSURE_2, PRESSURE_3];

/// Largest magnitude below which every whole `f64` is an exact integer.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Current value of every named channel at one point in time. Whole
/// readings are written as JSON integers (`31`, not `31.0`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, f64>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: &str, value: f64) -> Self {
        self.set(channel, value);
        self
    }

    pub fn set(&mut self, channel: &str, value: f64) {
        self.0.insert(channel.to_string(), value);
    }

    pub fn get(&self, channel: &str) -> Option<f64> {
        self.0.get(channel).copied()
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (channel, value) in &self.0 {
            match whole_number(*value) {
                Some(whole) => map.serialize_entry(channel, &whole)?,
                None => map.serialize_entry(channel, value)?,
            }
        }
        map.end()
    }
}

fn whole_number(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.abs() < EXACT_INTEGER_LIMIT).then_some(value as i64)
}
