use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{sample_snapshot, LatestSnapshot};
use crate::{
    alerts::AlertStore,
    events::{DashboardEvent, UiSender},
    models::Snapshot,
    settings::SettingsStore,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Everything one sensing pass needs.
#[derive(Clone)]
pub struct SensingDeps {
    pub latest: Arc<LatestSnapshot>,
    pub alerts: Arc<AlertStore>,
    /// Thresholds are read on every pass so updates apply immediately.
    pub settings: Arc<SettingsStore>,
    pub ui: UiSender,
}

pub async fn sensing_loop(deps: SensingDeps, period: Duration, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = sample_snapshot(&mut rand::thread_rng());
                perform_sample(&deps, snapshot);
            }
            _ = cancel_token.cancelled() => {
                log_info!("sensing loop shutting down");
                break;
            }
        }
    }
}

/// Publish a reading, raise its threshold alerts and notify the UI.
pub fn perform_sample(deps: &SensingDeps, snapshot: Snapshot) {
    deps.latest.publish(snapshot.clone());

    let raised = deps.settings.thresholds().raise(&deps.alerts, &snapshot);
    log_debug!("sampled {:?}, {} alerts raised", snapshot, raised.len());

    deps.ui.emit(DashboardEvent::SnapshotUpdated(snapshot));
}
