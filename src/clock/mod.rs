pub mod controller;
pub mod display;
pub mod state;
pub mod targets;

use std::sync::Mutex;

use chrono::{Duration, Local, NaiveDateTime};

pub use controller::Scheduler;
pub use display::spawn_display_ticker;
pub use state::{FiredKeys, SchedulerStatus, TargetTime};
pub use targets::TargetTimeFile;

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Used to drive the scheduler
/// through exact instants.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.guard() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.guard();
        *guard += by;
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, NaiveDateTime> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.guard()
    }
}
