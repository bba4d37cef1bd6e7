//! Shared emergency store used by the sync engine and client shells.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use crate::db::{Database, EmergencyRepository, SqliteEmergencyRepository};
use crate::models::{
    ConflictResolution, EmergencyRecord, EmergencyUpdate, LocalId, NewEmergency,
    ReconcileOutcome, RemoteEmergency, SyncStatus,
};
use crate::util::unix_millis_now;
use crate::Result;

type Query<T> = Arc<dyn Fn(&SqliteEmergencyRepository<'_>) -> Result<T> + Send + Sync>;

/// Thread-safe handle to the local emergency cache.
///
/// Cloning shares the same database. Every mutation bumps a change counter so
/// [`LiveQuery`] subscribers re-run their query.
#[derive(Clone)]
pub struct EmergencyStore {
    db: Arc<Mutex<Database>>,
    changes: Arc<watch::Sender<u64>>,
}

impl EmergencyStore {
    /// Open a store backed by a database file at the given path.
    pub fn open_path(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_database(Database::open(db_path)?))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    fn from_database(db: Database) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            db: Arc::new(Mutex::new(db)),
            changes: Arc::new(changes),
        }
    }

    async fn with_repo<T>(
        &self,
        operation: impl FnOnce(&SqliteEmergencyRepository<'_>) -> Result<T>,
    ) -> Result<T> {
        let db = self.db.lock().await;
        let repo = SqliteEmergencyRepository::new(db.connection());
        operation(&repo)
    }

    async fn mutate<T>(
        &self,
        operation: impl FnOnce(&SqliteEmergencyRepository<'_>) -> Result<T>,
    ) -> Result<T> {
        let value = self.with_repo(operation).await?;
        self.notify();
        Ok(value)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Receiver that ticks after every committed mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Create an emergency locally; it starts pending upload.
    pub async fn create_emergency(&self, new: NewEmergency) -> Result<EmergencyRecord> {
        let record = self.mutate(|repo| repo.create(new)).await?;
        tracing::debug!("Created emergency {} locally", record.local_id);
        Ok(record)
    }

    /// Insert or update in place; returns the effective remote id.
    pub async fn upsert(&self, record: &EmergencyRecord) -> Result<Option<i64>> {
        self.mutate(|repo| repo.upsert(record)).await
    }

    /// Apply a local edit.
    pub async fn update_emergency(
        &self,
        local_id: &LocalId,
        update: &EmergencyUpdate,
    ) -> Result<EmergencyRecord> {
        self.mutate(|repo| repo.update(local_id, update)).await
    }

    pub async fn mark_for_upload(&self, local_id: &LocalId) -> Result<()> {
        self.mutate(|repo| repo.mark_for_upload(local_id)).await
    }

    pub async fn mark_uploading(&self, local_id: &LocalId) -> Result<()> {
        self.mutate(|repo| repo.mark_uploading(local_id)).await
    }

    pub async fn complete_upload(
        &self,
        local_id: &LocalId,
        uploaded_version: i64,
        remote: &RemoteEmergency,
    ) -> Result<()> {
        self.mutate(|repo| repo.complete_upload(local_id, uploaded_version, remote))
            .await
    }

    pub async fn mark_upload_failed(&self, local_id: &LocalId) -> Result<()> {
        self.mutate(|repo| repo.mark_upload_failed(local_id)).await
    }

    pub async fn reset_to_pending(&self, local_id: &LocalId) -> Result<()> {
        self.mutate(|repo| repo.reset_to_pending(local_id)).await
    }

    pub async fn complete_remote_delete(&self, local_id: &LocalId) -> Result<()> {
        self.mutate(|repo| repo.complete_remote_delete(local_id))
            .await
    }

    /// Merge one remote record; subscribers are only woken when something changed.
    pub async fn reconcile_from_remote(
        &self,
        remote: &RemoteEmergency,
    ) -> Result<ReconcileOutcome> {
        let outcome = self
            .with_repo(|repo| repo.reconcile_from_remote(remote))
            .await?;
        if outcome != ReconcileOutcome::Ignored {
            self.notify();
        }
        Ok(outcome)
    }

    pub async fn resolve_conflict(
        &self,
        local_id: &LocalId,
        resolution: ConflictResolution,
    ) -> Result<EmergencyRecord> {
        self.mutate(|repo| repo.resolve_conflict(local_id, resolution))
            .await
    }

    pub async fn get_emergency(&self, local_id: &LocalId) -> Result<Option<EmergencyRecord>> {
        self.with_repo(|repo| repo.get(local_id)).await
    }

    pub async fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<EmergencyRecord>> {
        self.with_repo(|repo| repo.get_by_remote_id(remote_id))
            .await
    }

    /// All non-deleted emergencies, newest first.
    pub async fn get_all_emergencies(&self) -> Result<Vec<EmergencyRecord>> {
        self.with_repo(|repo| repo.list_all()).await
    }

    /// A user's non-deleted emergencies, newest first.
    pub async fn get_user_emergencies(&self, user_id: &str) -> Result<Vec<EmergencyRecord>> {
        self.with_repo(|repo| repo.list_by_user(user_id)).await
    }

    pub async fn get_active_emergency(&self, user_id: &str) -> Result<Option<EmergencyRecord>> {
        self.with_repo(|repo| repo.active_for_user(user_id)).await
    }

    pub async fn pending_uploads(&self) -> Result<Vec<EmergencyRecord>> {
        self.with_repo(|repo| repo.pending_uploads()).await
    }

    pub async fn pending_deletions(&self) -> Result<Vec<EmergencyRecord>> {
        self.with_repo(|repo| repo.pending_deletions()).await
    }

    pub async fn list_by_sync_status(&self, status: SyncStatus) -> Result<Vec<EmergencyRecord>> {
        self.with_repo(|repo| repo.list_by_sync_status(status))
            .await
    }

    pub async fn list_conflicts(&self) -> Result<Vec<EmergencyRecord>> {
        self.list_by_sync_status(SyncStatus::Conflict).await
    }

    /// Download watermark for a user (Unix ms).
    pub async fn latest_remote_update(&self, user_id: &str) -> Result<Option<i64>> {
        self.with_repo(|repo| repo.latest_remote_update(user_id))
            .await
    }

    /// Record that downloads have seen remote rows up to `updated_at`.
    pub async fn advance_watermark(&self, user_id: &str, updated_at: i64) -> Result<()> {
        self.with_repo(|repo| repo.advance_watermark(user_id, updated_at))
            .await
    }

    pub async fn count_pending(&self) -> Result<usize> {
        self.with_repo(|repo| repo.count_pending()).await
    }

    /// Raw table scan, including soft-deleted rows.
    pub async fn scan_all(&self) -> Result<Vec<EmergencyRecord>> {
        self.with_repo(|repo| repo.scan_all()).await
    }

    pub async fn soft_delete(&self, local_id: &LocalId) -> Result<EmergencyRecord> {
        self.mutate(|repo| repo.soft_delete(local_id)).await
    }

    pub async fn hard_delete(&self, local_id: &LocalId) -> Result<()> {
        self.mutate(|repo| repo.hard_delete(local_id)).await
    }

    pub async fn purge_deleted_before(&self, cutoff_ms: i64) -> Result<usize> {
        let purged = self
            .with_repo(|repo| repo.purge_deleted_before(cutoff_ms))
            .await?;
        if purged > 0 {
            self.notify();
            tracing::info!("Purged {purged} soft-deleted emergencies");
        }
        Ok(purged)
    }

    /// Purge soft-deleted rows older than the retention window.
    pub async fn purge_expired(&self, retention: Duration) -> Result<usize> {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = unix_millis_now().saturating_sub(retention_ms);
        self.purge_deleted_before(cutoff).await
    }

    /// Live view of all non-deleted emergencies.
    pub fn watch_all(&self) -> LiveQuery<Vec<EmergencyRecord>> {
        self.live(|repo| repo.list_all())
    }

    /// Live view of a user's non-deleted emergencies.
    pub fn watch_user(&self, user_id: impl Into<String>) -> LiveQuery<Vec<EmergencyRecord>> {
        let user_id = user_id.into();
        self.live(move |repo| repo.list_by_user(&user_id))
    }

    /// Live view of a user's current open emergency.
    pub fn watch_active(&self, user_id: impl Into<String>) -> LiveQuery<Option<EmergencyRecord>> {
        let user_id = user_id.into();
        self.live(move |repo| repo.active_for_user(&user_id))
    }

    fn live<T>(
        &self,
        query: impl Fn(&SqliteEmergencyRepository<'_>) -> Result<T> + Send + Sync + 'static,
    ) -> LiveQuery<T> {
        LiveQuery {
            store: self.clone(),
            changes: self.subscribe_changes(),
            query: Arc::new(query),
            primed: false,
        }
    }
}

/// A query that re-emits a fresh snapshot after every store mutation.
pub struct LiveQuery<T> {
    store: EmergencyStore,
    changes: watch::Receiver<u64>,
    query: Query<T>,
    primed: bool,
}

impl<T> LiveQuery<T> {
    /// Next snapshot: the current one on first call, then one per change.
    ///
    /// Several mutations that land between two calls collapse into a single
    /// snapshot.
    pub async fn next(&mut self) -> Result<T> {
        if self.primed {
            // The sender lives as long as `self.store`, so this cannot fail
            self.changes.changed().await.ok();
        }
        self.primed = true;
        self.changes.borrow_and_update();

        let query = Arc::clone(&self.query);
        self.store.with_repo(|repo| query(repo)).await
    }

    /// One-shot snapshot.
    pub async fn first(mut self) -> Result<T> {
        self.next().await
    }
}
