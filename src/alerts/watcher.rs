use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::{
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{AlertFilter, AlertStore};
use crate::events::{DashboardEvent, UiSender};

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Polls the alert store's last-modified stamp and asks the UI to refresh
/// its alert list whenever it moves.
pub struct AlertWatcher {
    alerts: Arc<AlertStore>,
    ui: UiSender,
    interval: Duration,
    last_seen: DateTime<Utc>,
}

impl AlertWatcher {
    pub fn new(alerts: Arc<AlertStore>, ui: UiSender, interval: Duration) -> Self {
        let last_seen = alerts.last_modified();
        Self {
            alerts,
            ui,
            interval,
            last_seen,
        }
    }

    /// Returns true when a change was seen and forwarded.
    pub fn poll_once(&mut self) -> bool {
        let current = self.alerts.last_modified();
        if current == self.last_seen {
            return false;
        }
        self.last_seen = current;
        self.ui.emit(DashboardEvent::AlertsChanged {
            total: self.alerts.count(&AlertFilter::default()),
        });
        true
    }

    pub fn spawn(mut self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.poll_once();
                    }
                    _ = cancel_token.cancelled() => {
                        log_info!("alert watcher shutting down");
                        break;
                    }
                }
            }
        })
    }
}
