//! Per-phase accounting and the overall result of a sync pass.

use std::fmt;

use thiserror::Error;

use crate::models::{EmergencyRecord, LocalId};
use crate::remote::{GatewayError, RejectedRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Upload,
    Download,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

/// A single record the backend refused or could not be reached for.
#[derive(Debug)]
pub struct RecordFailure {
    pub phase: SyncPhase,
    pub local_id: Option<LocalId>,
    pub remote_id: Option<i64>,
    pub error: GatewayError,
}

impl RecordFailure {
    pub(crate) fn upload(record: &EmergencyRecord, error: GatewayError) -> Self {
        Self {
            phase: SyncPhase::Upload,
            local_id: Some(record.local_id),
            remote_id: record.remote_id,
            error,
        }
    }

    pub(crate) fn download(row: RejectedRow) -> Self {
        Self {
            phase: SyncPhase::Download,
            local_id: None,
            remote_id: row.remote_id,
            error: row.error,
        }
    }
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.phase.as_str())?;
        if let Some(local_id) = &self.local_id {
            write!(f, " {local_id}")?;
        }
        if let Some(remote_id) = self.remote_id {
            write!(f, " (remote {remote_id})")?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Errors that stop a phase, or a whole pass, before every record was tried.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("A sync pass is already running")]
    AlreadyRunning,

    #[error("Authentication required: {0}")]
    Authentication(GatewayError),

    #[error("Local storage error: {0}")]
    Storage(#[from] crate::Error),

    #[error("Remote error: {0}")]
    Remote(GatewayError),

    #[error("All {} attempted records failed to sync", .errors.len())]
    AllRecordsFailed { errors: Vec<RecordFailure> },
}

impl From<GatewayError> for SyncError {
    fn from(error: GatewayError) -> Self {
        if error.is_authentication() {
            Self::Authentication(error)
        } else {
            Self::Remote(error)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Success,
    PartialSuccess,
    Failure,
}

#[derive(Debug)]
pub struct PhaseReport {
    pub phase: SyncPhase,
    pub attempted: usize,
    pub succeeded: usize,
    pub errors: Vec<RecordFailure>,
}

impl PhaseReport {
    #[must_use]
    pub const fn new(phase: SyncPhase) -> Self {
        Self {
            phase,
            attempted: 0,
            succeeded: 0,
            errors: Vec::new(),
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub(crate) fn record_failure(&mut self, failure: RecordFailure) {
        self.attempted += 1;
        self.errors.push(failure);
    }

    pub fn outcome(&self) -> PhaseOutcome {
        if self.errors.is_empty() {
            PhaseOutcome::Success
        } else if self.succeeded > 0 {
            PhaseOutcome::PartialSuccess
        } else {
            PhaseOutcome::Failure
        }
    }
}

/// Result of a full upload-then-download pass.
#[derive(Debug)]
pub enum SyncOutcome {
    Success {
        uploaded: usize,
        downloaded: usize,
    },
    PartialSuccess {
        succeeded: usize,
        failed: usize,
        errors: Vec<RecordFailure>,
    },
    Failed(SyncError),
}

impl SyncOutcome {
    /// Merge both phase results.
    ///
    /// A phase-level error wins over record counts, upload's first.
    pub fn from_phases(
        upload: Result<PhaseReport, SyncError>,
        download: Result<PhaseReport, SyncError>,
    ) -> Self {
        let (upload, download) = match (upload, download) {
            (Err(error), _) | (Ok(_), Err(error)) => return Self::Failed(error),
            (Ok(upload), Ok(download)) => (upload, download),
        };

        if upload.errors.is_empty() && download.errors.is_empty() {
            return Self::Success {
                uploaded: upload.succeeded,
                downloaded: download.succeeded,
            };
        }

        let succeeded = upload.succeeded + download.succeeded;
        let mut errors = upload.errors;
        errors.extend(download.errors);

        if succeeded == 0 {
            Self::Failed(SyncError::AllRecordsFailed { errors })
        } else {
            Self::PartialSuccess {
                succeeded,
                failed: errors.len(),
                errors,
            }
        }
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success {
                uploaded,
                downloaded,
            } => write!(f, "synced ({uploaded} uploaded, {downloaded} downloaded)"),
            Self::PartialSuccess {
                succeeded, failed, ..
            } => write!(f, "partially synced ({succeeded} ok, {failed} failed)"),
            Self::Failed(error) => write!(f, "sync failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEmergency;

    fn failure() -> RecordFailure {
        let record = EmergencyRecord::from_new(NewEmergency::panic("user-1"));
        RecordFailure::upload(
            &record,
            GatewayError::Rejected {
                status: 500,
                message: "boom".to_string(),
            },
        )
    }

    fn report(phase: SyncPhase, succeeded: usize, failed: usize) -> PhaseReport {
        let mut report = PhaseReport::new(phase);
        for _ in 0..succeeded {
            report.record_success();
        }
        for _ in 0..failed {
            report.record_failure(failure());
        }
        report
    }

    #[test]
    fn phase_outcome_classification() {
        assert_eq!(report(SyncPhase::Upload, 0, 0).outcome(), PhaseOutcome::Success);
        assert_eq!(report(SyncPhase::Upload, 2, 0).outcome(), PhaseOutcome::Success);
        assert_eq!(
            report(SyncPhase::Upload, 2, 1).outcome(),
            PhaseOutcome::PartialSuccess
        );
        assert_eq!(report(SyncPhase::Upload, 0, 3).outcome(), PhaseOutcome::Failure);
        assert_eq!(report(SyncPhase::Upload, 2, 1).attempted, 3);
    }

    #[test]
    fn clean_phases_merge_into_success() {
        let outcome = SyncOutcome::from_phases(
            Ok(report(SyncPhase::Upload, 2, 0)),
            Ok(report(SyncPhase::Download, 5, 0)),
        );
        assert!(matches!(
            outcome,
            SyncOutcome::Success {
                uploaded: 2,
                downloaded: 5
            }
        ));
    }

    #[test]
    fn record_errors_merge_across_phases() {
        let outcome = SyncOutcome::from_phases(
            Ok(report(SyncPhase::Upload, 1, 1)),
            Ok(report(SyncPhase::Download, 3, 0)),
        );
        match outcome {
            SyncOutcome::PartialSuccess {
                succeeded,
                failed,
                errors,
            } => {
                assert_eq!(succeeded, 4);
                assert_eq!(failed, 1);
                assert_eq!(errors[0].phase, SyncPhase::Upload);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn nothing_succeeding_is_failure() {
        let outcome = SyncOutcome::from_phases(
            Ok(report(SyncPhase::Upload, 0, 2)),
            Ok(report(SyncPhase::Download, 0, 0)),
        );
        assert!(matches!(
            outcome,
            SyncOutcome::Failed(SyncError::AllRecordsFailed { ref errors }) if errors.len() == 2
        ));
    }

    #[test]
    fn upload_phase_error_is_reported_first() {
        let outcome = SyncOutcome::from_phases(
            Err(SyncError::Authentication(GatewayError::Unauthenticated(
                "no session".to_string(),
            ))),
            Err(SyncError::Remote(GatewayError::InvalidPayload("x".to_string()))),
        );
        assert!(matches!(
            outcome,
            SyncOutcome::Failed(SyncError::Authentication(_))
        ));
    }

    #[test]
    fn gateway_errors_classify_into_sync_errors() {
        assert!(matches!(
            SyncError::from(GatewayError::Rejected {
                status: 401,
                message: "JWT expired".to_string()
            }),
            SyncError::Authentication(_)
        ));
        assert!(matches!(
            SyncError::from(GatewayError::InvalidPayload("bad".to_string())),
            SyncError::Remote(_)
        ));
    }
}
