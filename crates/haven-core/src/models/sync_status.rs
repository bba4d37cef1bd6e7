//! Per-record sync metadata enums

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a record stands relative to the remote backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    #[default]
    Pending,
    Failed,
    Conflict,
    Uploading,
    Downloading,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
            Self::Uploading => "uploading",
            Self::Downloading => "downloading",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            "conflict" => Ok(Self::Conflict),
            "uploading" => Ok(Self::Uploading),
            "downloading" => Ok(Self::Downloading),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

/// How a flagged conflict should be (or was) settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    RemoteWins,
    LocalWins,
    Manual,
}

impl ConflictResolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoteWins => "remote_wins",
            Self::LocalWins => "local_wins",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "remote_wins" => Ok(Self::RemoteWins),
            "local_wins" => Ok(Self::LocalWins),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown conflict resolution '{other}'")),
        }
    }
}

/// What `reconcile_from_remote` did with an incoming remote record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No local copy existed; the remote record was inserted as synced.
    Inserted,
    /// The local copy was at least as new; nothing was written.
    Ignored,
    /// The remote record replaced a clean local copy.
    Applied,
    /// The remote record replaced a copy with unsynced local changes and was flagged.
    Conflict,
}
