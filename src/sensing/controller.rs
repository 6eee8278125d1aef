use anyhow::{bail, Context, Result};
use log::info;
use tokio::{task::JoinHandle, time::Duration};
use tokio_util::sync::CancellationToken;

use super::loop_worker::{sensing_loop, SensingDeps};

pub struct SensingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_sensing(&mut self, deps: SensingDeps, period: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("sensing already active");
        }

        info!("Starting snapshot producer every {}ms", period.as_millis());
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(deps, period, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop_sensing(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sensing loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}
