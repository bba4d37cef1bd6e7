//! Sync engine reconciling the local store with the remote gateway.
//!
//! A pass uploads local changes first and then downloads remote changes past
//! the download watermark. Per-record remote failures, including malformed
//! listed rows, are isolated and reported; authentication and local storage
//! failures abort the phase they occur in.

mod report;
mod worker;

pub use report::{PhaseOutcome, PhaseReport, RecordFailure, SyncError, SyncOutcome, SyncPhase};
pub use worker::{SyncWorker, WorkOutcome};

use tokio::sync::{watch, Mutex};

use crate::models::{LocalId, ReconcileOutcome};
use crate::remote::EmergencyGateway;
use crate::services::EmergencyStore;
use crate::state::SyncState;

pub struct SyncOrchestrator<G> {
    store: EmergencyStore,
    gateway: G,
    running: Mutex<()>,
    state: watch::Sender<SyncState>,
    progress: watch::Sender<f32>,
}

impl<G: EmergencyGateway> SyncOrchestrator<G> {
    pub fn new(store: EmergencyStore, gateway: G) -> Self {
        Self {
            store,
            gateway,
            running: Mutex::new(()),
            state: watch::channel(SyncState::Idle).0,
            progress: watch::channel(0.0).0,
        }
    }

    pub const fn store(&self) -> &EmergencyStore {
        &self.store
    }

    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Advisory sync state for UI indicators.
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Progress of the current pass in `0.0..=1.0`.
    pub fn progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    /// Run a full upload-then-download pass.
    ///
    /// Returns `Failed(AlreadyRunning)` immediately if another pass holds the
    /// lock; no records are touched in that case.
    pub async fn sync_all(&self) -> SyncOutcome {
        let Ok(_running) = self.running.try_lock() else {
            tracing::warn!("Sync requested while another pass is running");
            return SyncOutcome::Failed(SyncError::AlreadyRunning);
        };

        self.progress.send_replace(0.0);
        self.state.send_replace(SyncState::Uploading);
        let upload = self.upload_phase().await;

        self.progress.send_replace(0.5);
        self.state.send_replace(SyncState::Downloading);
        let download = self.download_phase().await;

        let outcome = SyncOutcome::from_phases(upload, download);
        self.progress.send_replace(1.0);
        if outcome.is_failed() {
            self.state.send_replace(SyncState::Failed);
            tracing::warn!("Sync pass failed: {}", outcome);
        } else {
            self.state.send_replace(SyncState::Synced);
            tracing::info!("Sync pass finished: {}", outcome);
        }
        outcome
    }

    /// Push pending local changes, oldest first.
    pub async fn upload_pending_emergencies(&self) -> Result<PhaseReport, SyncError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.upload_phase().await
    }

    /// Pull remote changes for the signed-in user and reconcile them.
    pub async fn download_emergencies(&self) -> Result<PhaseReport, SyncError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.download_phase().await
    }

    /// Soft-delete locally, then try to delete remotely right away.
    ///
    /// Returns `true` when nothing is left to push. A failed remote delete
    /// leaves the record queued for the next upload phase.
    pub async fn delete_emergency(&self, local_id: &LocalId) -> Result<bool, SyncError> {
        let record = self.store.soft_delete(local_id).await?;

        let Some(remote_id) = record.remote_id else {
            self.store.complete_remote_delete(local_id).await?;
            return Ok(true);
        };

        match self.gateway.delete(remote_id).await {
            Ok(()) => {
                self.store.complete_remote_delete(local_id).await?;
                Ok(true)
            }
            Err(error) => {
                tracing::warn!(
                    "Remote delete of emergency {} deferred: {}",
                    local_id,
                    error
                );
                Ok(false)
            }
        }
    }

    async fn upload_phase(&self) -> Result<PhaseReport, SyncError> {
        let mut report = PhaseReport::new(SyncPhase::Upload);

        for record in self.store.pending_uploads().await? {
            let local_id = record.local_id;
            self.store.mark_uploading(&local_id).await?;

            // Once a remote id is bound, retries go through update
            let result = match record.remote_id {
                Some(remote_id) => self.gateway.update(remote_id, &record).await,
                None => self.gateway.create(&record).await,
            };

            match result {
                Ok(remote) => {
                    self.store
                        .complete_upload(&local_id, record.sync_version, &remote)
                        .await?;
                    tracing::debug!(
                        "Uploaded emergency {} as remote {}",
                        local_id,
                        remote.remote_id
                    );
                    report.record_success();
                }
                Err(error) if error.is_authentication() => {
                    self.store.reset_to_pending(&local_id).await?;
                    return Err(SyncError::Authentication(error));
                }
                Err(error) => {
                    tracing::warn!("Upload of emergency {} failed: {}", local_id, error);
                    self.store.mark_upload_failed(&local_id).await?;
                    report.record_failure(RecordFailure::upload(&record, error));
                }
            }
        }

        for record in self.store.pending_deletions().await? {
            let local_id = record.local_id;
            let Some(remote_id) = record.remote_id else {
                self.store.complete_remote_delete(&local_id).await?;
                continue;
            };

            match self.gateway.delete(remote_id).await {
                Ok(()) => {
                    self.store.complete_remote_delete(&local_id).await?;
                    report.record_success();
                }
                Err(error) if error.is_authentication() => {
                    return Err(SyncError::Authentication(error));
                }
                Err(error) => {
                    tracing::warn!("Remote delete of emergency {} failed: {}", local_id, error);
                    self.store.mark_upload_failed(&local_id).await?;
                    report.record_failure(RecordFailure::upload(&record, error));
                }
            }
        }

        Ok(report)
    }

    async fn download_phase(&self) -> Result<PhaseReport, SyncError> {
        let mut report = PhaseReport::new(SyncPhase::Download);

        let user_id = self.gateway.current_user_id().await?;
        let since = self.store.latest_remote_update(&user_id).await?;
        let batch = self.gateway.list_for_user(&user_id, since).await?;
        let latest = batch.latest_update();

        for remote in &batch.records {
            match self.store.reconcile_from_remote(remote).await? {
                ReconcileOutcome::Conflict => tracing::warn!(
                    "Remote emergency {} conflicts with unsent local changes",
                    remote.remote_id
                ),
                outcome => tracing::trace!("Reconciled remote {}: {:?}", remote.remote_id, outcome),
            }
            report.record_success();
        }

        for row in batch.rejected {
            tracing::warn!(
                "Skipping malformed remote emergency {:?}: {}",
                row.remote_id,
                row.error
            );
            report.record_failure(RecordFailure::download(row));
        }

        // Upload acknowledgements never move the watermark, only listed rows do
        if let Some(latest) = latest {
            self.store.advance_watermark(&user_id, latest).await?;
        }

        Ok(report)
    }
}
