//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate(conn, 1, MIGRATION_V1)?;
    }
    if version < 2 {
        migrate(conn, 2, MIGRATION_V2)?;
    }
    if version < 3 {
        migrate(conn, 3, MIGRATION_V3)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply one migration script and record its version atomically
fn migrate(conn: &Connection, version: i32, script: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(script)?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} (latest {CURRENT_VERSION})");
    Ok(())
}

/// Version 1: emergency cache with sync metadata
const MIGRATION_V1: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS emergencies (
        remote_id INTEGER UNIQUE,
        local_id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        emergency_type TEXT NOT NULL,
        status TEXT NOT NULL,
        latitude REAL,
        longitude REAL,
        address TEXT,
        message TEXT,
        priority TEXT NOT NULL,
        device_info TEXT NOT NULL DEFAULT '{}',
        responder_info TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        remote_created_at INTEGER,
        remote_updated_at INTEGER,
        sync_status TEXT NOT NULL DEFAULT 'pending',
        sync_version INTEGER NOT NULL DEFAULT 1,
        needs_upload INTEGER NOT NULL DEFAULT 0,
        needs_download INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        deleted_at INTEGER,
        last_sync_at INTEGER,
        retry_count INTEGER NOT NULL DEFAULT 0,
        conflict_resolution TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_emergencies_sync_status ON emergencies(sync_status);
    CREATE INDEX IF NOT EXISTS idx_emergencies_needs_upload ON emergencies(needs_upload);
    CREATE INDEX IF NOT EXISTS idx_emergencies_last_sync_at ON emergencies(last_sync_at);
    CREATE INDEX IF NOT EXISTS idx_emergencies_local_id ON emergencies(local_id);
    CREATE INDEX IF NOT EXISTS idx_emergencies_user_status_deleted
        ON emergencies(user_id, status, is_deleted);
";

/// Version 2: reject writes that would move `sync_version` backwards
const MIGRATION_V2: &str = "
    CREATE TRIGGER IF NOT EXISTS emergencies_version_guard BEFORE UPDATE ON emergencies
    FOR EACH ROW
    WHEN NEW.sync_version < OLD.sync_version
    BEGIN
        SELECT RAISE(ABORT, 'sync_version must not decrease');
    END;
";

/// Version 3: per-user download watermark, advanced only by downloads
const MIGRATION_V3: &str = "
    CREATE TABLE IF NOT EXISTS sync_watermarks (
        user_id TEXT PRIMARY KEY,
        last_remote_update INTEGER NOT NULL
    );
";

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_compound_index_exists() {
        let conn = setup();
        run(&conn).unwrap();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'index' AND name = 'idx_emergencies_user_status_deleted'
                )",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(exists);
    }

    #[test]
    fn test_version_guard_rejects_downgrade() {
        let conn = setup();
        run(&conn).unwrap();

        conn.execute(
            "INSERT INTO emergencies (local_id, user_id, emergency_type, status, priority,
                created_at, updated_at, sync_version)
             VALUES ('a', 'u', 'panic', 'active', 'critical', 0, 0, 3)",
            [],
        )
        .unwrap();

        let downgrade = conn.execute(
            "UPDATE emergencies SET sync_version = 2 WHERE local_id = 'a'",
            [],
        );
        assert!(downgrade.is_err());

        let upgrade = conn
            .execute(
                "UPDATE emergencies SET sync_version = 4 WHERE local_id = 'a'",
                [],
            )
            .unwrap();
        assert_eq!(upgrade, 1);
    }

    #[test]
    fn test_watermark_table_exists() {
        let conn = setup();
        run(&conn).unwrap();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = 'sync_watermarks'
                )",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(exists);
    }
}
