//! Emergency model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::sync_status::{ConflictResolution, SyncStatus};

/// Free-form device or responder metadata, stored as a JSON object
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Device-local identifier for an emergency, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Create a new unique local ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of emergency being reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    #[default]
    Panic,
    Medical,
    Fire,
    Police,
    Accident,
    Other,
}

impl EmergencyType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Panic => "panic",
            Self::Medical => "medical",
            Self::Fire => "fire",
            Self::Police => "police",
            Self::Accident => "accident",
            Self::Other => "other",
        }
    }
}

impl FromStr for EmergencyType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "panic" => Ok(Self::Panic),
            "medical" => Ok(Self::Medical),
            "fire" => Ok(Self::Fire),
            "police" => Ok(Self::Police),
            "accident" => Ok(Self::Accident),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown emergency type '{other}'")),
        }
    }
}

/// Domain lifecycle of an emergency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Cancelled,
    Cancelling,
    Inactive,
}

impl EmergencyStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Cancelling => "cancelling",
            Self::Inactive => "inactive",
        }
    }

    /// Statuses that still demand attention from responders.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Active | Self::Cancelling)
    }
}

impl FromStr for EmergencyStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "cancelling" => Ok(Self::Cancelling),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown emergency status '{other}'")),
        }
    }
}

/// Urgency of an emergency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// A geolocation fix with an optional human-readable address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: None,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Whether the coordinates fall inside valid WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// The replaceable payload of an emergency.
///
/// Reconciliation swaps this as a whole; it is never merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmergencyDetails {
    pub emergency_type: EmergencyType,
    pub status: EmergencyStatus,
    pub location: Option<GeoPoint>,
    pub message: Option<String>,
    pub priority: Priority,
    #[serde(default)]
    pub device_info: Metadata,
    #[serde(default)]
    pub responder_info: Metadata,
}

/// An emergency as cached on this device, with its sync bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRecord {
    /// Backend identifier, bound on the first successful create
    pub remote_id: Option<i64>,
    /// Stable device-local identifier
    pub local_id: LocalId,
    /// Owning user
    pub user_id: String,
    pub details: EmergencyDetails,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local update timestamp (Unix ms)
    pub updated_at: i64,
    pub remote_created_at: Option<i64>,
    pub remote_updated_at: Option<i64>,
    pub sync_status: SyncStatus,
    /// Incremented by exactly one on every local mutation
    pub sync_version: i64,
    pub needs_upload: bool,
    pub needs_download: bool,
    /// Soft delete flag
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
    pub last_sync_at: Option<i64>,
    /// Consecutive failed upload attempts
    pub retry_count: u32,
    pub conflict_resolution: Option<ConflictResolution>,
}

impl EmergencyRecord {
    /// Build a fresh, never-synced record from local input.
    #[must_use]
    pub fn from_new(new: NewEmergency) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            remote_id: None,
            local_id: LocalId::new(),
            user_id: new.user_id,
            details: new.details,
            created_at: now,
            updated_at: now,
            remote_created_at: None,
            remote_updated_at: None,
            sync_status: SyncStatus::Pending,
            sync_version: 1,
            needs_upload: true,
            needs_download: false,
            is_deleted: false,
            deleted_at: None,
            last_sync_at: None,
            retry_count: 0,
            conflict_resolution: None,
        }
    }

    /// Build a synced record from a remote record seen for the first time.
    #[must_use]
    pub fn from_remote(remote: &RemoteEmergency, now_ms: i64) -> Self {
        Self {
            remote_id: Some(remote.remote_id),
            local_id: remote.local_id.unwrap_or_default(),
            user_id: remote.user_id.clone(),
            details: remote.details.clone(),
            created_at: remote.created_at.unwrap_or(now_ms),
            updated_at: remote.updated_at.unwrap_or(now_ms),
            remote_created_at: remote.created_at,
            remote_updated_at: remote.updated_at,
            sync_status: SyncStatus::Synced,
            sync_version: remote.sync_version,
            needs_upload: false,
            needs_download: false,
            is_deleted: remote.is_deleted,
            deleted_at: remote.deleted_at,
            last_sync_at: Some(now_ms),
            retry_count: 0,
            conflict_resolution: None,
        }
    }

    /// Whether this record has never been accepted by the backend.
    pub const fn is_local_only(&self) -> bool {
        self.remote_id.is_none()
    }
}

/// Input for creating an emergency locally
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmergency {
    pub user_id: String,
    pub details: EmergencyDetails,
}

impl NewEmergency {
    /// A panic alert: critical priority, active immediately.
    #[must_use]
    pub fn panic(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            details: EmergencyDetails {
                emergency_type: EmergencyType::Panic,
                status: EmergencyStatus::Active,
                priority: Priority::Critical,
                ..EmergencyDetails::default()
            },
        }
    }

    #[must_use]
    pub fn new(user_id: impl Into<String>, emergency_type: EmergencyType) -> Self {
        Self {
            user_id: user_id.into(),
            details: EmergencyDetails {
                emergency_type,
                ..EmergencyDetails::default()
            },
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.details.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.details.message = Some(message.into());
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.details.priority = priority;
        self
    }

    #[must_use]
    pub fn with_device_info(mut self, device_info: Metadata) -> Self {
        self.details.device_info = device_info;
        self
    }
}

/// A partial local edit; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmergencyUpdate {
    pub emergency_type: Option<EmergencyType>,
    pub status: Option<EmergencyStatus>,
    pub location: Option<Option<GeoPoint>>,
    pub message: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub device_info: Option<Metadata>,
    pub responder_info: Option<Metadata>,
}

impl EmergencyUpdate {
    #[must_use]
    pub fn status(status: EmergencyStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.emergency_type.is_none()
            && self.status.is_none()
            && self.location.is_none()
            && self.message.is_none()
            && self.priority.is_none()
            && self.device_info.is_none()
            && self.responder_info.is_none()
    }

    pub fn apply(&self, details: &mut EmergencyDetails) {
        if let Some(emergency_type) = self.emergency_type {
            details.emergency_type = emergency_type;
        }
        if let Some(status) = self.status {
            details.status = status;
        }
        if let Some(location) = &self.location {
            details.location.clone_from(location);
        }
        if let Some(message) = &self.message {
            details.message.clone_from(message);
        }
        if let Some(priority) = self.priority {
            details.priority = priority;
        }
        if let Some(device_info) = &self.device_info {
            details.device_info.clone_from(device_info);
        }
        if let Some(responder_info) = &self.responder_info {
            details.responder_info.clone_from(responder_info);
        }
    }
}

/// An emergency as decoded from the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEmergency {
    pub remote_id: i64,
    pub local_id: Option<LocalId>,
    pub user_id: String,
    pub details: EmergencyDetails,
    pub sync_version: i64,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_unique() {
        let id1 = LocalId::new();
        let id2 = LocalId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_local_id_parse() {
        let id = LocalId::new();
        let parsed: LocalId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn new_record_starts_pending_upload_at_version_one() {
        let record = EmergencyRecord::from_new(NewEmergency::panic("user-1"));
        assert!(record.is_local_only());
        assert!(record.needs_upload);
        assert_eq!(record.sync_version, 1);
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.details.priority, Priority::Critical);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn update_applies_only_set_fields() {
        let mut details = NewEmergency::panic("user-1")
            .with_message("help")
            .details;
        let update = EmergencyUpdate {
            status: Some(EmergencyStatus::Cancelling),
            location: Some(Some(GeoPoint::new(1.0, 2.0))),
            ..EmergencyUpdate::default()
        };
        update.apply(&mut details);

        assert_eq!(details.status, EmergencyStatus::Cancelling);
        assert_eq!(details.location, Some(GeoPoint::new(1.0, 2.0)));
        assert_eq!(details.message.as_deref(), Some("help"));
        assert_eq!(details.emergency_type, EmergencyType::Panic);
    }

    #[test]
    fn update_can_clear_optional_fields() {
        let mut details = NewEmergency::panic("user-1")
            .with_message("help")
            .details;
        let update = EmergencyUpdate {
            message: Some(None),
            ..EmergencyUpdate::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut details);
        assert_eq!(details.message, None);
    }

    #[test]
    fn geo_point_validation() {
        assert!(GeoPoint::new(51.5, -0.12).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
    }

    #[test]
    fn open_statuses() {
        assert!(EmergencyStatus::Active.is_open());
        assert!(EmergencyStatus::Cancelling.is_open());
        assert!(!EmergencyStatus::Completed.is_open());
        assert!(!EmergencyStatus::Inactive.is_open());
    }

    #[test]
    fn from_remote_is_synced_with_remote_version() {
        let remote = RemoteEmergency {
            remote_id: 7,
            local_id: None,
            user_id: "user-1".to_string(),
            details: EmergencyDetails::default(),
            sync_version: 4,
            created_at: Some(1_000),
            updated_at: Some(2_000),
            is_deleted: false,
            deleted_at: None,
        };
        let record = EmergencyRecord::from_remote(&remote, 5_000);
        assert_eq!(record.remote_id, Some(7));
        assert_eq!(record.sync_version, 4);
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert!(!record.needs_upload);
        assert_eq!(record.last_sync_at, Some(5_000));
        assert_eq!(record.remote_updated_at, Some(2_000));
    }
}
