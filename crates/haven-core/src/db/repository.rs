//! Emergency repository implementation

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::{
    ConflictResolution, EmergencyDetails, EmergencyRecord, EmergencyUpdate, GeoPoint, LocalId,
    Metadata, NewEmergency, ReconcileOutcome, RemoteEmergency, SyncStatus,
};
use crate::util::unix_millis_now;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "remote_id, local_id, user_id, emergency_type, status, latitude, longitude,
    address, message, priority, device_info, responder_info, created_at, updated_at,
    remote_created_at, remote_updated_at, sync_status, sync_version, needs_upload,
    needs_download, is_deleted, deleted_at, last_sync_at, retry_count, conflict_resolution";

/// Trait for emergency storage operations
///
/// Every method that reads and then writes a record runs inside a single
/// transaction so live-query readers never observe a half-applied change.
pub trait EmergencyRepository {
    /// Create a new emergency locally, pending upload
    fn create(&self, new: NewEmergency) -> Result<EmergencyRecord>;

    /// Insert or update in place, matching by remote id then local id.
    /// Returns the effective remote id.
    fn upsert(&self, record: &EmergencyRecord) -> Result<Option<i64>>;

    /// Apply a local edit, bumping the sync version
    fn update(&self, local_id: &LocalId, update: &EmergencyUpdate) -> Result<EmergencyRecord>;

    /// Flag a record as needing upload
    fn mark_for_upload(&self, local_id: &LocalId) -> Result<()>;

    /// Mark a record as being uploaded
    fn mark_uploading(&self, local_id: &LocalId) -> Result<()>;

    /// Record a successful create/update acknowledged by the backend
    fn complete_upload(
        &self,
        local_id: &LocalId,
        uploaded_version: i64,
        remote: &RemoteEmergency,
    ) -> Result<()>;

    /// Record a failed upload attempt
    fn mark_upload_failed(&self, local_id: &LocalId) -> Result<()>;

    /// Return an in-flight record to pending without counting a failure
    fn reset_to_pending(&self, local_id: &LocalId) -> Result<()>;

    /// Record that a soft delete has reached the backend
    fn complete_remote_delete(&self, local_id: &LocalId) -> Result<()>;

    /// Merge one remote record into the local cache
    fn reconcile_from_remote(&self, remote: &RemoteEmergency) -> Result<ReconcileOutcome>;

    /// Settle a flagged conflict explicitly
    fn resolve_conflict(
        &self,
        local_id: &LocalId,
        resolution: ConflictResolution,
    ) -> Result<EmergencyRecord>;

    /// Get a non-deleted emergency by local ID
    fn get(&self, local_id: &LocalId) -> Result<Option<EmergencyRecord>>;

    /// Get a non-deleted emergency by remote ID
    fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<EmergencyRecord>>;

    /// List all non-deleted emergencies, newest first
    fn list_all(&self) -> Result<Vec<EmergencyRecord>>;

    /// List a user's non-deleted emergencies, newest first
    fn list_by_user(&self, user_id: &str) -> Result<Vec<EmergencyRecord>>;

    /// The user's most recent open emergency, if any
    fn active_for_user(&self, user_id: &str) -> Result<Option<EmergencyRecord>>;

    /// Non-deleted records awaiting upload, oldest first
    fn pending_uploads(&self) -> Result<Vec<EmergencyRecord>>;

    /// Soft-deleted records whose deletion has not reached the backend
    fn pending_deletions(&self) -> Result<Vec<EmergencyRecord>>;

    /// List non-deleted records in a given sync status
    fn list_by_sync_status(&self, status: SyncStatus) -> Result<Vec<EmergencyRecord>>;

    /// Download watermark for a user (Unix ms), `None` before the first download
    fn latest_remote_update(&self, user_id: &str) -> Result<Option<i64>>;

    /// Move a user's download watermark forward; never moves it back
    fn advance_watermark(&self, user_id: &str, updated_at: i64) -> Result<()>;

    /// Number of records awaiting upload
    fn count_pending(&self) -> Result<usize>;

    /// Every row including soft-deleted ones
    fn scan_all(&self) -> Result<Vec<EmergencyRecord>>;

    /// Soft delete an emergency
    fn soft_delete(&self, local_id: &LocalId) -> Result<EmergencyRecord>;

    /// Physically remove a soft-deleted emergency
    fn hard_delete(&self, local_id: &LocalId) -> Result<()>;

    /// Physically remove soft-deleted emergencies deleted before the cutoff
    fn purge_deleted_before(&self, cutoff_ms: i64) -> Result<usize>;
}

/// `SQLite` implementation of `EmergencyRepository`
pub struct SqliteEmergencyRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteEmergencyRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn query_records(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<EmergencyRecord>> {
        query_records(self.conn, clause, params)
    }

    fn set_sync_fields(&self, sql: &str, local_id: &LocalId) -> Result<()> {
        let rows = self.conn.execute(sql, params![local_id.as_str()])?;
        if rows == 0 {
            return Err(Error::NotFound(local_id.to_string()));
        }
        Ok(())
    }
}

impl EmergencyRepository for SqliteEmergencyRepository<'_> {
    fn create(&self, new: NewEmergency) -> Result<EmergencyRecord> {
        if new.user_id.trim().is_empty() {
            return Err(Error::InvalidInput("Emergency user_id cannot be empty".into()));
        }
        if let Some(location) = &new.details.location {
            if !location.is_valid() {
                return Err(Error::InvalidInput(format!(
                    "Invalid coordinates: {}, {}",
                    location.latitude, location.longitude
                )));
            }
        }

        let record = EmergencyRecord::from_new(new);
        insert_record(self.conn, &record)?;
        Ok(record)
    }

    fn upsert(&self, record: &EmergencyRecord) -> Result<Option<i64>> {
        let tx = self.conn.unchecked_transaction()?;

        let existing = match record.remote_id {
            Some(remote_id) => find_by_remote_id(&tx, remote_id)?,
            None => None,
        };
        let existing = match existing {
            Some(existing) => Some(existing),
            None => find_by_local_id(&tx, &record.local_id)?,
        };

        let effective = if let Some(existing) = existing {
            let columns = DetailColumns::from_details(&record.details)?;
            tx.execute(
                "UPDATE emergencies SET
                    remote_id = COALESCE(remote_id, ?1),
                    user_id = ?2,
                    emergency_type = ?3,
                    status = ?4,
                    latitude = ?5,
                    longitude = ?6,
                    address = ?7,
                    message = ?8,
                    priority = ?9,
                    device_info = ?10,
                    responder_info = ?11,
                    updated_at = ?12,
                    remote_created_at = ?13,
                    remote_updated_at = ?14,
                    sync_status = ?15,
                    sync_version = MAX(sync_version, ?16),
                    needs_upload = ?17,
                    needs_download = ?18,
                    is_deleted = ?19,
                    deleted_at = ?20,
                    last_sync_at = ?21,
                    retry_count = ?22,
                    conflict_resolution = ?23
                 WHERE local_id = ?24",
                params![
                    record.remote_id,
                    record.user_id,
                    columns.emergency_type,
                    columns.status,
                    columns.latitude,
                    columns.longitude,
                    columns.address,
                    columns.message,
                    columns.priority,
                    columns.device_info,
                    columns.responder_info,
                    record.updated_at,
                    record.remote_created_at,
                    record.remote_updated_at,
                    record.sync_status.as_str(),
                    record.sync_version,
                    record.needs_upload,
                    record.needs_download,
                    record.is_deleted,
                    record.deleted_at,
                    record.last_sync_at,
                    record.retry_count,
                    record.conflict_resolution.map(ConflictResolution::as_str),
                    existing.local_id.as_str(),
                ],
            )?;
            existing.remote_id.or(record.remote_id)
        } else {
            insert_record(&tx, record)?;
            record.remote_id
        };

        tx.commit()?;
        Ok(effective)
    }

    fn update(&self, local_id: &LocalId, update: &EmergencyUpdate) -> Result<EmergencyRecord> {
        let tx = self.conn.unchecked_transaction()?;

        let mut record = find_by_local_id(&tx, local_id)?
            .filter(|record| !record.is_deleted)
            .ok_or_else(|| Error::NotFound(local_id.to_string()))?;

        if update.is_empty() {
            return Ok(record);
        }

        update.apply(&mut record.details);
        if let Some(location) = &record.details.location {
            if !location.is_valid() {
                return Err(Error::InvalidInput(format!(
                    "Invalid coordinates: {}, {}",
                    location.latitude, location.longitude
                )));
            }
        }

        let columns = DetailColumns::from_details(&record.details)?;
        let now = unix_millis_now();
        tx.execute(
            "UPDATE emergencies SET
                emergency_type = ?1,
                status = ?2,
                latitude = ?3,
                longitude = ?4,
                address = ?5,
                message = ?6,
                priority = ?7,
                device_info = ?8,
                responder_info = ?9,
                updated_at = ?10,
                sync_version = sync_version + 1,
                needs_upload = 1,
                sync_status = CASE WHEN sync_status = 'conflict' THEN 'conflict' ELSE 'pending' END
             WHERE local_id = ?11",
            params![
                columns.emergency_type,
                columns.status,
                columns.latitude,
                columns.longitude,
                columns.address,
                columns.message,
                columns.priority,
                columns.device_info,
                columns.responder_info,
                now,
                local_id.as_str(),
            ],
        )?;

        let updated =
            find_by_local_id(&tx, local_id)?.ok_or_else(|| Error::NotFound(local_id.to_string()))?;
        tx.commit()?;
        Ok(updated)
    }

    fn mark_for_upload(&self, local_id: &LocalId) -> Result<()> {
        self.set_sync_fields(
            "UPDATE emergencies SET needs_upload = 1, sync_status = 'pending' WHERE local_id = ?1",
            local_id,
        )
    }

    fn mark_uploading(&self, local_id: &LocalId) -> Result<()> {
        self.set_sync_fields(
            "UPDATE emergencies SET sync_status = 'uploading' WHERE local_id = ?1",
            local_id,
        )
    }

    fn complete_upload(
        &self,
        local_id: &LocalId,
        uploaded_version: i64,
        remote: &RemoteEmergency,
    ) -> Result<()> {
        // A local edit that landed mid-upload keeps the record pending
        let rows = self.conn.execute(
            "UPDATE emergencies SET
                remote_id = COALESCE(remote_id, ?1),
                remote_created_at = COALESCE(?2, remote_created_at),
                remote_updated_at = COALESCE(?3, remote_updated_at),
                last_sync_at = ?4,
                retry_count = 0,
                needs_upload = CASE WHEN sync_version = ?5 THEN 0 ELSE 1 END,
                sync_status = CASE WHEN sync_version = ?5 THEN 'synced' ELSE 'pending' END
             WHERE local_id = ?6",
            params![
                remote.remote_id,
                remote.created_at,
                remote.updated_at,
                unix_millis_now(),
                uploaded_version,
                local_id.as_str(),
            ],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(local_id.to_string()));
        }
        Ok(())
    }

    fn mark_upload_failed(&self, local_id: &LocalId) -> Result<()> {
        self.set_sync_fields(
            "UPDATE emergencies SET sync_status = 'failed', retry_count = retry_count + 1
             WHERE local_id = ?1",
            local_id,
        )
    }

    fn reset_to_pending(&self, local_id: &LocalId) -> Result<()> {
        self.set_sync_fields(
            "UPDATE emergencies SET sync_status = 'pending' WHERE local_id = ?1",
            local_id,
        )
    }

    fn complete_remote_delete(&self, local_id: &LocalId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE emergencies SET needs_upload = 0, sync_status = 'synced', last_sync_at = ?1,
                retry_count = 0
             WHERE local_id = ?2 AND is_deleted = 1",
            params![unix_millis_now(), local_id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(local_id.to_string()));
        }
        Ok(())
    }

    fn reconcile_from_remote(&self, remote: &RemoteEmergency) -> Result<ReconcileOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let now = unix_millis_now();

        let local = match find_by_remote_id(&tx, remote.remote_id)? {
            Some(local) => Some(local),
            None => match remote.local_id {
                Some(local_id) => find_by_local_id(&tx, &local_id)?,
                None => None,
            },
        };

        let outcome = match local {
            None => {
                insert_record(&tx, &EmergencyRecord::from_remote(remote, now))?;
                ReconcileOutcome::Inserted
            }
            Some(local) if local.sync_version >= remote.sync_version => {
                // Payload stays; only a missing remote id is bound
                if local.remote_id.is_none() {
                    tx.execute(
                        "UPDATE emergencies SET remote_id = ?1 WHERE local_id = ?2",
                        params![remote.remote_id, local.local_id.as_str()],
                    )?;
                }
                ReconcileOutcome::Ignored
            }
            Some(local) if local.needs_upload => {
                apply_remote(&tx, &local.local_id, remote, RemoteApply::Conflict, now)?;
                ReconcileOutcome::Conflict
            }
            Some(local) => {
                apply_remote(&tx, &local.local_id, remote, RemoteApply::Accept, now)?;
                ReconcileOutcome::Applied
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn resolve_conflict(
        &self,
        local_id: &LocalId,
        resolution: ConflictResolution,
    ) -> Result<EmergencyRecord> {
        let tx = self.conn.unchecked_transaction()?;

        let record =
            find_by_local_id(&tx, local_id)?.ok_or_else(|| Error::NotFound(local_id.to_string()))?;
        if record.sync_status != SyncStatus::Conflict {
            return Err(Error::InvalidInput(format!(
                "Emergency {local_id} is not in conflict (status: {})",
                record.sync_status
            )));
        }

        let now = unix_millis_now();
        match resolution {
            ConflictResolution::RemoteWins => tx.execute(
                "UPDATE emergencies SET needs_upload = 0, needs_download = 0,
                    sync_status = 'synced', last_sync_at = ?1, conflict_resolution = ?2
                 WHERE local_id = ?3",
                params![now, resolution.as_str(), local_id.as_str()],
            )?,
            // Stored data already equals the remote's, so re-assert it above the remote version
            ConflictResolution::LocalWins => tx.execute(
                "UPDATE emergencies SET needs_upload = 1, sync_status = 'pending',
                    sync_version = sync_version + 1, updated_at = ?1, conflict_resolution = ?2
                 WHERE local_id = ?3",
                params![now, resolution.as_str(), local_id.as_str()],
            )?,
            ConflictResolution::Manual => tx.execute(
                "UPDATE emergencies SET conflict_resolution = ?1 WHERE local_id = ?2",
                params![resolution.as_str(), local_id.as_str()],
            )?,
        };

        let resolved =
            find_by_local_id(&tx, local_id)?.ok_or_else(|| Error::NotFound(local_id.to_string()))?;
        tx.commit()?;
        Ok(resolved)
    }

    fn get(&self, local_id: &LocalId) -> Result<Option<EmergencyRecord>> {
        Ok(self
            .query_records(
                "WHERE local_id = ?1 AND is_deleted = 0",
                params![local_id.as_str()],
            )?
            .into_iter()
            .next())
    }

    fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<EmergencyRecord>> {
        Ok(self
            .query_records(
                "WHERE remote_id = ?1 AND is_deleted = 0",
                params![remote_id],
            )?
            .into_iter()
            .next())
    }

    fn list_all(&self) -> Result<Vec<EmergencyRecord>> {
        self.query_records("WHERE is_deleted = 0 ORDER BY created_at DESC", [])
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<EmergencyRecord>> {
        self.query_records(
            "WHERE user_id = ?1 AND is_deleted = 0 ORDER BY created_at DESC",
            params![user_id],
        )
    }

    fn active_for_user(&self, user_id: &str) -> Result<Option<EmergencyRecord>> {
        Ok(self
            .query_records(
                "WHERE user_id = ?1 AND status IN ('pending', 'active', 'cancelling')
                    AND is_deleted = 0
                 ORDER BY created_at DESC
                 LIMIT 1",
                params![user_id],
            )?
            .into_iter()
            .next())
    }

    fn pending_uploads(&self) -> Result<Vec<EmergencyRecord>> {
        self.query_records(
            "WHERE needs_upload = 1 AND is_deleted = 0 AND sync_status != 'conflict'
             ORDER BY created_at ASC, local_id ASC",
            [],
        )
    }

    fn pending_deletions(&self) -> Result<Vec<EmergencyRecord>> {
        self.query_records(
            "WHERE needs_upload = 1 AND is_deleted = 1 ORDER BY deleted_at ASC",
            [],
        )
    }

    fn list_by_sync_status(&self, status: SyncStatus) -> Result<Vec<EmergencyRecord>> {
        self.query_records(
            "WHERE sync_status = ?1 AND is_deleted = 0 ORDER BY created_at ASC",
            params![status.as_str()],
        )
    }

    fn latest_remote_update(&self, user_id: &str) -> Result<Option<i64>> {
        let watermark = self
            .conn
            .query_row(
                "SELECT last_remote_update FROM sync_watermarks WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(watermark)
    }

    fn advance_watermark(&self, user_id: &str, updated_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_watermarks (user_id, last_remote_update) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET
                last_remote_update = MAX(last_remote_update, excluded.last_remote_update)",
            params![user_id, updated_at],
        )?;
        Ok(())
    }

    fn count_pending(&self) -> Result<usize> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM emergencies WHERE needs_upload = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn scan_all(&self) -> Result<Vec<EmergencyRecord>> {
        self.query_records("ORDER BY created_at ASC", [])
    }

    fn soft_delete(&self, local_id: &LocalId) -> Result<EmergencyRecord> {
        let tx = self.conn.unchecked_transaction()?;
        let now = unix_millis_now();

        let rows = tx.execute(
            "UPDATE emergencies SET
                is_deleted = 1,
                deleted_at = ?1,
                updated_at = ?1,
                sync_version = sync_version + 1,
                needs_upload = 1,
                sync_status = 'pending'
             WHERE local_id = ?2 AND is_deleted = 0",
            params![now, local_id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(local_id.to_string()));
        }

        let deleted =
            find_by_local_id(&tx, local_id)?.ok_or_else(|| Error::NotFound(local_id.to_string()))?;
        tx.commit()?;
        Ok(deleted)
    }

    fn hard_delete(&self, local_id: &LocalId) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM emergencies WHERE local_id = ?1 AND is_deleted = 1",
            params![local_id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(local_id.to_string()));
        }
        Ok(())
    }

    fn purge_deleted_before(&self, cutoff_ms: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM emergencies WHERE is_deleted = 1 AND deleted_at < ?1",
            params![cutoff_ms],
        )?;
        Ok(rows)
    }
}

#[derive(Clone, Copy)]
enum RemoteApply {
    Accept,
    Conflict,
}

/// Replace a local row's payload with the remote's, keeping its identifiers
fn apply_remote(
    conn: &Connection,
    local_id: &LocalId,
    remote: &RemoteEmergency,
    mode: RemoteApply,
    now: i64,
) -> Result<()> {
    let columns = DetailColumns::from_details(&remote.details)?;
    let sync_sql = match mode {
        RemoteApply::Accept => {
            "sync_status = 'synced', needs_upload = 0, retry_count = 0, conflict_resolution = NULL"
        }
        RemoteApply::Conflict => "sync_status = 'conflict'",
    };
    let sql = format!(
        "UPDATE emergencies SET
            remote_id = COALESCE(remote_id, ?1),
            user_id = ?2,
            emergency_type = ?3,
            status = ?4,
            latitude = ?5,
            longitude = ?6,
            address = ?7,
            message = ?8,
            priority = ?9,
            device_info = ?10,
            responder_info = ?11,
            updated_at = COALESCE(?12, updated_at),
            remote_created_at = COALESCE(?13, remote_created_at),
            remote_updated_at = COALESCE(?12, remote_updated_at),
            sync_version = ?14,
            is_deleted = ?15,
            deleted_at = ?16,
            last_sync_at = COALESCE(?17, last_sync_at),
            needs_download = 0,
            {sync_sql}
         WHERE local_id = ?18"
    );
    let last_sync_at = match mode {
        RemoteApply::Accept => Some(now),
        RemoteApply::Conflict => None,
    };

    conn.execute(
        &sql,
        params![
            remote.remote_id,
            remote.user_id,
            columns.emergency_type,
            columns.status,
            columns.latitude,
            columns.longitude,
            columns.address,
            columns.message,
            columns.priority,
            columns.device_info,
            columns.responder_info,
            remote.updated_at,
            remote.created_at,
            remote.sync_version,
            remote.is_deleted,
            remote.deleted_at,
            last_sync_at,
            local_id.as_str(),
        ],
    )?;
    Ok(())
}

/// Column values for the replaceable payload
struct DetailColumns {
    emergency_type: &'static str,
    status: &'static str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<String>,
    message: Option<String>,
    priority: &'static str,
    device_info: String,
    responder_info: String,
}

impl DetailColumns {
    fn from_details(details: &EmergencyDetails) -> Result<Self> {
        Ok(Self {
            emergency_type: details.emergency_type.as_str(),
            status: details.status.as_str(),
            latitude: details.location.as_ref().map(|location| location.latitude),
            longitude: details.location.as_ref().map(|location| location.longitude),
            address: details
                .location
                .as_ref()
                .and_then(|location| location.address.clone()),
            message: details.message.clone(),
            priority: details.priority.as_str(),
            device_info: serde_json::to_string(&details.device_info)?,
            responder_info: serde_json::to_string(&details.responder_info)?,
        })
    }
}

fn insert_record(conn: &Connection, record: &EmergencyRecord) -> Result<()> {
    let columns = DetailColumns::from_details(&record.details)?;
    conn.execute(
        &format!(
            "INSERT INTO emergencies ({COLUMNS}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
            )"
        ),
        params![
            record.remote_id,
            record.local_id.as_str(),
            record.user_id,
            columns.emergency_type,
            columns.status,
            columns.latitude,
            columns.longitude,
            columns.address,
            columns.message,
            columns.priority,
            columns.device_info,
            columns.responder_info,
            record.created_at,
            record.updated_at,
            record.remote_created_at,
            record.remote_updated_at,
            record.sync_status.as_str(),
            record.sync_version,
            record.needs_upload,
            record.needs_download,
            record.is_deleted,
            record.deleted_at,
            record.last_sync_at,
            record.retry_count,
            record.conflict_resolution.map(ConflictResolution::as_str),
        ],
    )?;
    Ok(())
}

fn query_records(
    conn: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<EmergencyRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM emergencies {clause}"))?;
    let records = stmt
        .query_map(params, parse_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Raw lookup that also sees soft-deleted rows
fn find_by_local_id(conn: &Connection, local_id: &LocalId) -> Result<Option<EmergencyRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM emergencies WHERE local_id = ?1"),
            params![local_id.as_str()],
            parse_record,
        )
        .optional()?;
    Ok(record)
}

/// Raw lookup that also sees soft-deleted rows
fn find_by_remote_id(conn: &Connection, remote_id: i64) -> Result<Option<EmergencyRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM emergencies WHERE remote_id = ?1"),
            params![remote_id],
            parse_record,
        )
        .optional()?;
    Ok(record)
}

/// Parse an emergency from a database row
fn parse_record(row: &Row<'_>) -> rusqlite::Result<EmergencyRecord> {
    let local_id: String = row.get(1)?;
    let local_id = local_id
        .parse::<LocalId>()
        .map_err(|error| conversion_error(1, error.to_string()))?;

    let latitude: Option<f64> = row.get(5)?;
    let longitude: Option<f64> = row.get(6)?;
    let address: Option<String> = row.get(7)?;
    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
            address,
        }),
        _ => None,
    };

    let conflict_resolution: Option<String> = row.get(24)?;
    let conflict_resolution = conflict_resolution
        .map(|value| value.parse::<ConflictResolution>())
        .transpose()
        .map_err(|error| conversion_error(24, error))?;

    Ok(EmergencyRecord {
        remote_id: row.get(0)?,
        local_id,
        user_id: row.get(2)?,
        details: EmergencyDetails {
            emergency_type: parse_text(row, 3)?,
            status: parse_text(row, 4)?,
            location,
            message: row.get(8)?,
            priority: parse_text(row, 9)?,
            device_info: parse_metadata(row, 10)?,
            responder_info: parse_metadata(row, 11)?,
        },
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        remote_created_at: row.get(14)?,
        remote_updated_at: row.get(15)?,
        sync_status: parse_text(row, 16)?,
        sync_version: row.get(17)?,
        needs_upload: row.get(18)?,
        needs_download: row.get(19)?,
        is_deleted: row.get(20)?,
        deleted_at: row.get(21)?,
        last_sync_at: row.get(22)?,
        retry_count: row.get(23)?,
        conflict_resolution,
    })
}

fn parse_text<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|error| conversion_error(idx, error))
}

fn parse_metadata(row: &Row<'_>, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|error| conversion_error(idx, error.to_string()))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}
