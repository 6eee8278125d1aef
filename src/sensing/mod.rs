//! Simulated sensor readings: a 2-second producer that publishes the latest
//! snapshot and raises threshold alerts.

pub mod controller;
pub mod loop_worker;

use std::sync::RwLock;

use rand::Rng;

use crate::{
    alerts::round_from_six,
    models::{
        snapshot::{HUMIDITY, PRESSURE_CHANNELS, TEMPERATURE},
        Snapshot,
    },
};

pub use controller::SensingController;

/// Anything that can report the current channel values.
pub trait SnapshotSource: Send + Sync {
    fn current(&self) -> Snapshot;
}

/// The most recent snapshot produced by the sensing loop.
#[derive(Debug, Default)]
pub struct LatestSnapshot {
    inner: RwLock<Snapshot>,
}

impl LatestSnapshot {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn publish(&self, snapshot: Snapshot) {
        match self.inner.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

impl SnapshotSource for LatestSnapshot {
    fn current(&self) -> Snapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Uniform random readings in the plant's nominal ranges, rounded with
/// [`round_from_six`].
pub fn sample_snapshot<R: Rng + ?Sized>(rng: &mut R) -> Snapshot {
    let mut snapshot = Snapshot::new()
        .with(TEMPERATURE, round_from_six(rng.gen_range(15.0..35.0)))
        .with(HUMIDITY, round_from_six(rng.gen_range(30.0..90.0)));
    for channel in PRESSURE_CHANNELS {
        snapshot.set(channel, round_from_six(rng.gen_range(80.0..110.0)));
    }
    snapshot
}
