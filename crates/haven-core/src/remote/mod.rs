//! Remote emergency gateway.
//!
//! The sync engine talks to the backend only through [`EmergencyGateway`].
//! Implementations perform exactly one request per call and never retry;
//! retry policy belongs to the orchestrator and its worker.

mod dto;
mod supabase;

pub use dto::EmergencyRow;
pub use supabase::SupabaseEmergencyGateway;

use thiserror::Error;

use crate::models::{EmergencyRecord, RemoteEmergency};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No usable session; no request was sent.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),
    #[error("Remote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Remote rejected request: {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl GatewayError {
    /// Whether the failure means the caller has no valid credentials.
    ///
    /// The orchestrator aborts a whole phase on these instead of failing
    /// every record one by one.
    pub const fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated(_) | Self::Rejected { status: 401, .. }
        )
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// A listed row that could not be decoded into a [`RemoteEmergency`].
#[derive(Debug)]
pub struct RejectedRow {
    pub remote_id: Option<i64>,
    pub updated_at: Option<i64>,
    pub error: GatewayError,
}

/// Result of a listing: decoded records plus the rows that were unusable.
#[derive(Debug, Default)]
pub struct RemoteBatch {
    pub records: Vec<RemoteEmergency>,
    pub rejected: Vec<RejectedRow>,
}

impl RemoteBatch {
    /// Latest `updated_at` among every listed row, decoded or not.
    pub fn latest_update(&self) -> Option<i64> {
        self.records
            .iter()
            .map(|record| record.updated_at)
            .chain(self.rejected.iter().map(|row| row.updated_at))
            .flatten()
            .max()
    }
}

/// CRUD on the remote emergencies collection.
#[allow(async_fn_in_trait)]
pub trait EmergencyGateway {
    /// Id of the signed-in user.
    async fn current_user_id(&self) -> GatewayResult<String>;

    async fn create(&self, record: &EmergencyRecord) -> GatewayResult<RemoteEmergency>;

    async fn update(&self, remote_id: i64, record: &EmergencyRecord)
        -> GatewayResult<RemoteEmergency>;

    async fn delete(&self, remote_id: i64) -> GatewayResult<()>;

    /// Records owned by `user_id`, oldest update first.
    ///
    /// `since` is a Unix-millisecond watermark; records updated at or after
    /// it are returned. A malformed row lands in [`RemoteBatch::rejected`]
    /// instead of failing the listing.
    async fn list_for_user(&self, user_id: &str, since: Option<i64>)
        -> GatewayResult<RemoteBatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_classification() {
        assert!(GatewayError::Unauthenticated("no session".into()).is_authentication());
        assert!(GatewayError::Rejected {
            status: 401,
            message: "JWT expired".into()
        }
        .is_authentication());
        assert!(!GatewayError::Rejected {
            status: 500,
            message: "boom".into()
        }
        .is_authentication());
        assert!(!GatewayError::InvalidPayload("empty".into()).is_authentication());
    }

    #[test]
    fn batch_latest_update_counts_rejected_rows() {
        let batch = RemoteBatch {
            records: Vec::new(),
            rejected: vec![
                RejectedRow {
                    remote_id: Some(3),
                    updated_at: Some(7_000),
                    error: GatewayError::InvalidPayload("bad".into()),
                },
                RejectedRow {
                    remote_id: None,
                    updated_at: None,
                    error: GatewayError::InvalidPayload("not an object".into()),
                },
            ],
        };
        assert_eq!(batch.latest_update(), Some(7_000));
        assert_eq!(RemoteBatch::default().latest_update(), None);
    }
}
