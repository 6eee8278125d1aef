use std::sync::Arc;

use tokio::{
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::Clock;
use crate::events::{DashboardEvent, UiSender};

/// Emit the current `HH:MM:SS` every `period` for the on-screen clock.
pub fn spawn_display_ticker(
    clock: Arc<dyn Clock>,
    ui: UiSender,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = clock.now().format("%H:%M:%S").to_string();
                    ui.emit(DashboardEvent::Now(now));
                }
                _ = cancel_token.cancelled() => break,
            }
        }
    })
}
