use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{bail, Result};
use chrono::{NaiveDateTime, Timelike};
use log::{error, info};
use tokio::{
    task::JoinHandle,
    time::{self, Duration},
};

use super::{
    state::{SchedulerState, SchedulerStatus, TargetTime},
    Clock, TargetTimeFile,
};
use crate::{
    history::HistoryStore,
    models::{HistoryRecord, RecordKind, Snapshot},
    notify::Subscribers,
};

const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// The global clock: owns the target times, fires alarm subscribers once
/// per target per day and records snapshots into history.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    targets_file: TargetTimeFile,
    history: Arc<HistoryStore>,
    clock: Arc<dyn Clock>,
    alarm_subscribers: Subscribers<str>,
    history_subscribers: Subscribers<Option<HistoryRecord>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        targets_file: TargetTimeFile,
        history: Arc<HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let targets = targets_file.load();
        Self {
            state: Mutex::new(SchedulerState::new(targets)),
            targets_file,
            history,
            clock,
            alarm_subscribers: Subscribers::new("alarm"),
            history_subscribers: Subscribers::new("history"),
            ticker: Mutex::new(None),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn status(&self) -> SchedulerStatus {
        self.lock_state().status
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Subscribers receive the fired time as `HH:MM`.
    pub fn on_alarm<F>(&self, callback: F)
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.alarm_subscribers.subscribe(callback);
    }

    /// Subscribers receive the new record, or `None` after a bulk clear.
    pub fn on_history<F>(&self, callback: F)
    where
        F: Fn(&Option<HistoryRecord>) -> Result<()> + Send + Sync + 'static,
    {
        self.history_subscribers.subscribe(callback);
    }

    pub fn target_times(&self) -> Vec<TargetTime> {
        self.lock_state().targets.clone()
    }

    pub fn add_time(&self, target: TargetTime) -> bool {
        let mut state = self.lock_state();
        if state.targets.contains(&target) {
            return false;
        }
        state.targets.push(target);
        self.persist_targets(&state.targets);
        info!("Scheduler: target time added: {target}");
        true
    }

    pub fn remove_time(&self, target: TargetTime) -> bool {
        let mut state = self.lock_state();
        let Some(index) = state.targets.iter().position(|t| *t == target) else {
            return false;
        };
        state.targets.remove(index);
        self.persist_targets(&state.targets);
        info!("Scheduler: target time removed: {target}");
        true
    }

    /// Evaluate one instant. Returns the targets that fired.
    ///
    /// A target fires when its hour and minute match and the second is 0,
    /// and only if it has not fired yet on that calendar day. The state lock
    /// is released before subscribers run, so they may call back into the
    /// scheduler.
    pub fn tick_at(&self, now: NaiveDateTime) -> Vec<TargetTime> {
        let today = now.date();
        let time = now.time();

        let due: Vec<TargetTime> = {
            let mut guard = self.lock_state();
            let SchedulerState { targets, fired, .. } = &mut *guard;
            let mut due = Vec::new();
            if time.second() == 0 {
                for target in targets.iter() {
                    if target.matches(time) && fired.mark(today, *target) {
                        due.push(*target);
                    }
                }
            }
            fired.purge_before(today);
            due
        };

        for target in &due {
            info!("Scheduler: alarm {target}");
            self.alarm_subscribers.notify(target.to_string().as_str());
        }

        due
    }

    /// Append a snapshot to history, stamped with the scheduler's clock,
    /// then tell history subscribers.
    pub fn record_now(
        &self,
        snapshot: Snapshot,
        kind: RecordKind,
        source: impl Into<String>,
    ) -> HistoryRecord {
        let record = self.history.append(snapshot, kind, source, self.clock.now());
        self.history_subscribers.notify(&Some(record.clone()));
        record
    }

    pub fn clear_history(&self) {
        self.history.clear();
        info!("Scheduler: history cleared");
        self.history_subscribers.notify(&None);
    }

    /// Spawn the polling task. Calling it while running is a no-op; a
    /// stopped scheduler cannot be restarted.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.status() == SchedulerStatus::Stopped {
            bail!("scheduler already stopped");
        }

        let mut ticker = self.lock_ticker();
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let scheduler = Arc::clone(self);
        let tick_interval = self.tick_interval;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            loop {
                interval.tick().await;
                if scheduler.status() == SchedulerStatus::Stopped {
                    break;
                }

                // Clock reads run inside the guard as well.
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    scheduler.tick_at(scheduler.clock.now())
                }));
                if outcome.is_err() {
                    error!("Scheduler: tick failed, backing off");
                    time::sleep(ERROR_BACKOFF).await;
                }
            }
            info!("Scheduler: stopped");
        }));

        info!("Scheduler: started");
        Ok(())
    }

    /// Ask the polling task to exit on its next iteration.
    pub fn stop(&self) {
        self.lock_state().status = SchedulerStatus::Stopped;
    }

    /// Stop and wait for the polling task to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.lock_ticker().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("Scheduler: polling task failed to join: {err}");
            }
        }
    }

    fn persist_targets(&self, targets: &[TargetTime]) {
        if let Err(err) = self.targets_file.save(targets) {
            error!("Scheduler: error saving target times: {err:#}");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.ticker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, history::DEFAULT_RETENTION};
    use anyhow::bail;
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Panics for the first `failures` reads, then behaves like `inner`.
    struct FlakyClock {
        inner: ManualClock,
        failures: AtomicU32,
    }

    impl Clock for FlakyClock {
        fn now(&self) -> NaiveDateTime {
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                panic!("clock unavailable");
            }
            self.inner.now()
        }
    }

    fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn scheduler(dir: &TempDir, clock: Arc<ManualClock>) -> Arc<Scheduler> {
        let history = Arc::new(HistoryStore::open(
            dir.path().join("historial_registros.json"),
            DEFAULT_RETENTION,
        ));
        Arc::new(Scheduler::new(
            TargetTimeFile::new(dir.path().join("horas.json")),
            history,
            clock,
        ))
    }

    fn counter(scheduler: &Scheduler) -> Arc<Mutex<Vec<String>>> {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        scheduler.on_alarm(move |time| {
            sink.lock().unwrap().push(time.to_string());
            Ok(())
        });
        fired
    }

    #[test]
    fn add_and_remove_reject_duplicates_and_persist() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 8, 0, 0)));
        let scheduler = scheduler(&dir, clock.clone());
        let nine = TargetTime::new(9, 0).unwrap();

        assert!(scheduler.add_time(nine));
        assert!(!scheduler.add_time(nine));
        assert!(scheduler.add_time(TargetTime::new(17, 45).unwrap()));

        let reloaded = self::scheduler(&dir, clock);
        assert_eq!(reloaded.target_times().len(), 2);

        assert!(reloaded.remove_time(nine));
        assert!(!reloaded.remove_time(nine));
        assert_eq!(
            TargetTimeFile::new(dir.path().join("horas.json")).load(),
            vec![TargetTime::new(17, 45).unwrap()]
        );
    }

    #[test]
    fn fires_once_per_day() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 8, 59, 0)));
        let scheduler = scheduler(&dir, clock);
        scheduler.add_time(TargetTime::new(9, 0).unwrap());
        let fired = counter(&scheduler);

        // Sample every second of the matching minute, some of them twice.
        for second in 0..60 {
            scheduler.tick_at(at(1, 9, 0, second));
            scheduler.tick_at(at(1, 9, 0, second));
        }
        assert_eq!(*fired.lock().unwrap(), vec!["09:00"]);

        scheduler.tick_at(at(2, 9, 0, 0));
        assert_eq!(fired.lock().unwrap().len(), 2);
    }

    #[test]
    fn only_second_zero_fires() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 8, 0, 0)));
        let scheduler = scheduler(&dir, clock);
        scheduler.add_time(TargetTime::new(9, 0).unwrap());
        let fired = counter(&scheduler);

        assert!(scheduler.tick_at(at(1, 9, 0, 1)).is_empty());
        assert!(scheduler.tick_at(at(1, 8, 59, 0)).is_empty());
        assert!(fired.lock().unwrap().is_empty());
    }

    #[test]
    fn old_fired_keys_are_purged() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 8, 0, 0)));
        let scheduler = scheduler(&dir, clock);
        scheduler.add_time(TargetTime::new(9, 0).unwrap());

        scheduler.tick_at(at(1, 9, 0, 0));
        assert_eq!(scheduler.lock_state().fired.len(), 1);

        scheduler.tick_at(at(2, 0, 0, 5));
        assert!(scheduler.lock_state().fired.is_empty());
    }

    #[test]
    fn failing_alarm_subscriber_is_isolated() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 8, 0, 0)));
        let scheduler = scheduler(&dir, clock);
        scheduler.add_time(TargetTime::new(9, 0).unwrap());
        scheduler.on_alarm(|_| bail!("subscriber down"));
        let fired = counter(&scheduler);

        assert_eq!(scheduler.tick_at(at(1, 9, 0, 0)).len(), 1);
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[test]
    fn record_now_and_clear_notify_history_subscribers() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 14, 30, 0)));
        let scheduler = scheduler(&dir, clock);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            scheduler.on_history(move |record| {
                seen.lock().unwrap().push(record.as_ref().map(|r| r.id));
                Ok(())
            });
        }

        let record = scheduler.record_now(
            Snapshot::new().with("temperatura", 25.0),
            RecordKind::Manual,
            "Manual (Home)",
        );
        assert_eq!(record.date, "01/06/24");
        assert_eq!(record.time, "14:30");
        scheduler.clear_history();

        assert_eq!(*seen.lock().unwrap(), vec![Some(1), None]);
        assert!(scheduler.history().is_empty());
    }

    #[test]
    fn alarm_subscriber_can_record_through_scheduler() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 9, 0, 0)));
        let scheduler = scheduler(&dir, clock);
        scheduler.add_time(TargetTime::new(9, 0).unwrap());
        {
            let weak = Arc::downgrade(&scheduler);
            scheduler.on_alarm(move |time| {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.record_now(
                        Snapshot::new(),
                        RecordKind::Automatic,
                        format!("Alarma {time}"),
                    );
                }
                Ok(())
            });
        }

        scheduler.tick_at(at(1, 9, 0, 0));
        let records = scheduler.history().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "Alarma 09:00");
    }

    #[tokio::test(start_paused = true)]
    async fn polling_task_fires_and_stops() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 9, 0, 0)));
        let scheduler = scheduler(&dir, clock.clone());
        scheduler.add_time(TargetTime::new(9, 0).unwrap());
        let fired = counter(&scheduler);

        scheduler.start().unwrap();
        scheduler.start().unwrap();
        for _ in 0..3 {
            time::sleep(Duration::from_secs(1)).await;
            clock.advance(ChronoDuration::seconds(1));
        }
        scheduler.shutdown().await;

        assert_eq!(fired.lock().unwrap().len(), 1);
        assert_eq!(scheduler.status(), SchedulerStatus::Stopped);
        assert!(scheduler.start().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn targets_can_change_while_polling() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(1, 8, 59, 58)));
        let scheduler = scheduler(&dir, clock.clone());
        let nine = TargetTime::new(9, 0).unwrap();
        let nine_one = TargetTime::new(9, 1).unwrap();
        scheduler.add_time(nine_one);
        let fired = counter(&scheduler);

        scheduler.start().unwrap();
        let editor = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(250)).await;
                assert!(scheduler.add_time(nine));
                assert!(scheduler.remove_time(nine_one));
            })
        };

        // Move the clock half-way between ticks so every second is seen once.
        time::sleep(Duration::from_millis(500)).await;
        for _ in 0..70 {
            clock.advance(ChronoDuration::seconds(1));
            time::sleep(Duration::from_secs(1)).await;
        }
        editor.await.unwrap();
        scheduler.shutdown().await;

        assert_eq!(*fired.lock().unwrap(), vec!["09:00"]);
        assert_eq!(scheduler.target_times(), vec![nine]);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_survives_a_failing_tick() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FlakyClock {
            inner: ManualClock::new(at(1, 9, 0, 0)),
            failures: AtomicU32::new(1),
        });
        let history = Arc::new(HistoryStore::open(
            dir.path().join("historial_registros.json"),
            DEFAULT_RETENTION,
        ));
        let scheduler = Arc::new(Scheduler::new(
            TargetTimeFile::new(dir.path().join("horas.json")),
            history,
            clock.clone(),
        ));
        scheduler.add_time(TargetTime::new(9, 0).unwrap());
        let fired = counter(&scheduler);

        scheduler.start().unwrap();
        time::sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(scheduler.status(), SchedulerStatus::Active);

        time::sleep(Duration::from_secs(2)).await;
        scheduler.shutdown().await;

        assert_eq!(clock.failures.load(Ordering::SeqCst), 0);
        assert_eq!(*fired.lock().unwrap(), vec!["09:00"]);
    }
}
