//! Periodic sync trigger with backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::SyncOrchestrator;
use crate::config::SyncSettings;
use crate::remote::EmergencyGateway;

const RETRY_BASE: Duration = Duration::from_secs(30);
const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    Retry,
}

/// Runs a sync pass plus retention purge on a fixed cadence.
pub struct SyncWorker<G> {
    orchestrator: Arc<SyncOrchestrator<G>>,
    settings: SyncSettings,
}

impl<G: EmergencyGateway> SyncWorker<G> {
    pub const fn new(orchestrator: Arc<SyncOrchestrator<G>>, settings: SyncSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    /// One unit of background work.
    ///
    /// The purge runs even when the sync pass fails; it only touches local rows.
    pub async fn do_work(&self) -> WorkOutcome {
        let outcome = self.orchestrator.sync_all().await;

        if let Err(error) = self
            .orchestrator
            .store()
            .purge_expired(self.settings.retention)
            .await
        {
            tracing::warn!("Retention purge failed: {}", error);
        }

        if outcome.is_failed() {
            WorkOutcome::Retry
        } else {
            WorkOutcome::Success
        }
    }

    /// Delay before the next attempt after `consecutive_retries` failures.
    pub fn next_delay(&self, consecutive_retries: u32) -> Duration {
        if consecutive_retries == 0 {
            return self.settings.interval;
        }
        let shift = (consecutive_retries - 1).min(MAX_BACKOFF_SHIFT);
        RETRY_BASE
            .saturating_mul(1 << shift)
            .min(self.settings.interval)
    }

    /// Work until `shutdown` resolves. The first pass runs immediately.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut retries = 0_u32;

        loop {
            match self.do_work().await {
                WorkOutcome::Success => retries = 0,
                WorkOutcome::Retry => retries = retries.saturating_add(1),
            }

            let delay = self.next_delay(retries);
            tracing::debug!("Next sync in {}s", delay.as_secs());

            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Sync worker stopped");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
