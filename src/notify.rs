//! Ordered subscriber registries with per-subscriber failure isolation.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::Result;
use log::error;

pub type Callback<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

pub struct Subscribers<E: ?Sized> {
    name: &'static str,
    callbacks: Mutex<Vec<Callback<E>>>,
}

impl<E: ?Sized> Subscribers<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(callback));
    }

    /// Invoke every subscriber in registration order. A subscriber that
    /// errors or panics is logged and skipped; the rest still run. Returns
    /// the number of failed subscribers.
    pub fn notify(&self, event: &E) -> usize {
        // Snapshot the list so callbacks may subscribe without deadlocking.
        let callbacks: Vec<Callback<E>> = self.lock().clone();
        let mut failures = 0;

        for (index, callback) in callbacks.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    error!("{} subscriber #{index} failed: {err:#}", self.name);
                }
                Err(_) => {
                    failures += 1;
                    error!("{} subscriber #{index} panicked", self.name);
                }
            }
        }

        failures
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Callback<E>>> {
        match self.callbacks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
