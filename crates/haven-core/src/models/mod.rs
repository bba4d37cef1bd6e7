//! Data models for Haven

mod emergency;
mod sync_status;

pub use emergency::{
    EmergencyDetails, EmergencyRecord, EmergencyStatus, EmergencyType, EmergencyUpdate, GeoPoint,
    LocalId, Metadata, NewEmergency, Priority, RemoteEmergency,
};
pub use sync_status::{ConflictResolution, ReconcileOutcome, SyncStatus};
