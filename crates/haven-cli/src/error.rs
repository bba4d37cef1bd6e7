use std::io;

use haven_core::remote::GatewayError;
use haven_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] haven_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Emergency ID cannot be empty")]
    EmptyId,
    #[error("Emergency not found for id/prefix: {0}")]
    EmergencyNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("No user to raise the alert for. Pass --user or run `haven auth login`.")]
    NoUser,
    #[error(
        "Remote sync is not configured. Set HAVEN_SUPABASE_URL and HAVEN_SUPABASE_ANON_KEY, then run `haven auth login`."
    )]
    SyncNotConfigured,
}
