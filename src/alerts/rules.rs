use serde::{Deserialize, Serialize};

use super::AlertStore;
use crate::models::{
    snapshot::{HUMIDITY, PRESSURE_CHANNELS, TEMPERATURE},
    AlertDraft, AlertRecord, AlertSeverity, Snapshot,
};

pub const SENSOR_PAGE: &str = "UMA";

/// Integer rounding used for every displayed and simulated reading: the
/// value is truncated toward zero and bumped by one once the remainder
/// reaches 0.6.
pub fn round_from_six(value: f64) -> f64 {
    let whole = value.trunc();
    if value - whole >= 0.6 {
        whole + 1.0
    } else {
        whole
    }
}

/// Upper limits per channel family. A reading strictly above its limit
/// raises an alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature: 30.0,
            humidity: 85.0,
            pressure: 108.0,
        }
    }
}

impl Thresholds {
    /// One draft per exceeding channel, in channel order temperature,
    /// humidity, pressure 1..3. Channels missing from the snapshot are
    /// ignored.
    pub fn evaluate(&self, snapshot: &Snapshot) -> Vec<AlertDraft> {
        let mut drafts = Vec::new();

        if let Some(value) = snapshot.get(TEMPERATURE).filter(|v| *v > self.temperature) {
            drafts.push(
                AlertDraft::new(
                    format!(
                        "Temperatura CRÍTICA: {value}°C (supera {}°C)",
                        self.temperature
                    ),
                    SENSOR_PAGE,
                )
                .element(TEMPERATURE)
                .value(value)
                .severity(AlertSeverity::Critical),
            );
        }

        if let Some(value) = snapshot.get(HUMIDITY).filter(|v| *v > self.humidity) {
            drafts.push(
                AlertDraft::new(
                    format!("Humedad ALTA: {value}% (superior a {}%)", self.humidity),
                    SENSOR_PAGE,
                )
                .element(HUMIDITY)
                .value(value)
                .severity(AlertSeverity::Warning),
            );
        }

        for channel in PRESSURE_CHANNELS {
            if let Some(value) = snapshot.get(channel).filter(|v| *v > self.pressure) {
                drafts.push(
                    AlertDraft::new(
                        format!("Presión ALTA: {value}Pa (supera {} Pa)", self.pressure),
                        SENSOR_PAGE,
                    )
                    .element(channel)
                    .value(value)
                    .severity(AlertSeverity::Warning),
                );
            }
        }

        drafts
    }

    pub fn raise(&self, alerts: &AlertStore, snapshot: &Snapshot) -> Vec<AlertRecord> {
        self.evaluate(snapshot)
            .into_iter()
            .map(|draft| alerts.add(draft))
            .collect()
    }
}
