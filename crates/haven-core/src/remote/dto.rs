//! Wire representation of an emergency row in the remote table.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GatewayError, RejectedRow, RemoteBatch};
use crate::models::{
    EmergencyDetails, EmergencyRecord, EmergencyStatus, EmergencyType, GeoPoint, LocalId,
    Metadata, Priority, RemoteEmergency,
};

const fn default_sync_version() -> i64 {
    1
}

/// One row of the emergencies table as PostgREST sends and accepts it.
///
/// Location is flattened into nullable columns; metadata maps are `jsonb`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub local_id: Option<String>,
    pub user_id: String,
    pub emergency_type: EmergencyType,
    pub status: EmergencyStatus,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub device_info: Metadata,
    #[serde(default)]
    pub responder_info: Metadata,
    #[serde(default = "default_sync_version")]
    pub sync_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&EmergencyRecord> for EmergencyRow {
    fn from(record: &EmergencyRecord) -> Self {
        let details = &record.details;
        let location = details.location.as_ref();
        Self {
            id: record.remote_id,
            local_id: Some(record.local_id.as_str()),
            user_id: record.user_id.clone(),
            emergency_type: details.emergency_type,
            status: details.status,
            latitude: location.map(|point| point.latitude),
            longitude: location.map(|point| point.longitude),
            address: location.and_then(|point| point.address.clone()),
            message: details.message.clone(),
            priority: details.priority,
            device_info: details.device_info.clone(),
            responder_info: details.responder_info.clone(),
            sync_version: record.sync_version,
            created_at: from_millis(record.created_at),
            updated_at: from_millis(record.updated_at),
            is_deleted: record.is_deleted,
            deleted_at: record.deleted_at.and_then(from_millis),
        }
    }
}

impl TryFrom<EmergencyRow> for RemoteEmergency {
    type Error = GatewayError;

    fn try_from(row: EmergencyRow) -> Result<Self, Self::Error> {
        let remote_id = row
            .id
            .ok_or_else(|| GatewayError::InvalidPayload("row is missing its id".to_string()))?;

        let local_id = row
            .local_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::parse::<LocalId>)
            .transpose()
            .map_err(|error| {
                GatewayError::InvalidPayload(format!("row {remote_id} has a bad local_id: {error}"))
            })?;

        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
                address: row.address,
            }),
            _ => None,
        };

        Ok(Self {
            remote_id,
            local_id,
            user_id: row.user_id,
            details: EmergencyDetails {
                emergency_type: row.emergency_type,
                status: row.status,
                location,
                message: row.message,
                priority: row.priority,
                device_info: row.device_info,
                responder_info: row.responder_info,
            },
            sync_version: row.sync_version,
            created_at: row.created_at.map(|at| at.timestamp_millis()),
            updated_at: row.updated_at.map(|at| at.timestamp_millis()),
            is_deleted: row.is_deleted,
            deleted_at: row.deleted_at.map(|at| at.timestamp_millis()),
        })
    }
}

/// Decode listed rows one at a time so a malformed row only rejects itself.
pub fn decode_listing(rows: Vec<Value>) -> RemoteBatch {
    let mut batch = RemoteBatch::default();
    for value in rows {
        let remote_id = value.get("id").and_then(Value::as_i64);
        let updated_at = value
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
            .map(|at| at.timestamp_millis());

        let decoded = serde_json::from_value::<EmergencyRow>(value)
            .map_err(|error| GatewayError::InvalidPayload(error.to_string()))
            .and_then(RemoteEmergency::try_from);
        match decoded {
            Ok(record) => batch.records.push(record),
            Err(error) => batch.rejected.push(RejectedRow {
                remote_id,
                updated_at,
                error,
            }),
        }
    }
    batch
}

/// RFC 3339 form of a Unix-millisecond watermark for `updated_at` filters.
pub fn watermark_param(millis: i64) -> Option<String> {
    from_millis(millis).map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::NewEmergency;

    #[test]
    fn decodes_postgrest_row() {
        let local_id = LocalId::new();
        let payload = json!({
            "id": 42,
            "local_id": local_id.as_str(),
            "user_id": "user-1",
            "emergency_type": "medical",
            "status": "active",
            "latitude": 52.52,
            "longitude": 13.405,
            "address": "Alexanderplatz",
            "message": null,
            "priority": "high",
            "device_info": { "battery": 12 },
            "sync_version": 3,
            "created_at": "2024-05-01T10:00:00+00:00",
            "updated_at": "2024-05-01T10:05:00.250+00:00",
            "is_deleted": false,
            "deleted_at": null
        });

        let row: EmergencyRow = serde_json::from_value(payload).unwrap();
        let remote = RemoteEmergency::try_from(row).unwrap();

        assert_eq!(remote.remote_id, 42);
        assert_eq!(remote.local_id, Some(local_id));
        assert_eq!(remote.sync_version, 3);
        assert_eq!(remote.details.emergency_type, EmergencyType::Medical);
        assert_eq!(
            remote.details.location,
            Some(GeoPoint::new(52.52, 13.405).with_address("Alexanderplatz"))
        );
        assert_eq!(remote.details.device_info.get("battery"), Some(&json!(12)));
        assert!(remote.details.responder_info.is_empty());
        assert_eq!(remote.updated_at, Some(1_714_557_900_250));
    }

    #[test]
    fn row_without_id_is_rejected() {
        let row = EmergencyRow::from(&EmergencyRecord::from_new(NewEmergency::panic("user-1")));
        assert!(row.id.is_none());
        assert!(matches!(
            RemoteEmergency::try_from(row),
            Err(GatewayError::InvalidPayload(_))
        ));
    }

    #[test]
    fn local_record_serializes_without_id() {
        let record = EmergencyRecord::from_new(
            NewEmergency::panic("user-1").with_location(GeoPoint::new(1.5, 2.5)),
        );
        let body = serde_json::to_value(EmergencyRow::from(&record)).unwrap();

        assert!(body.get("id").is_none());
        assert_eq!(body["local_id"], json!(record.local_id.as_str()));
        assert_eq!(body["latitude"], json!(1.5));
        assert_eq!(body["address"], json!(null));
        assert_eq!(body["priority"], json!("critical"));
        assert_eq!(body["device_info"], json!({}));
    }

    #[test]
    fn missing_coordinate_drops_location() {
        let payload = json!({
            "id": 7,
            "user_id": "user-1",
            "emergency_type": "fire",
            "status": "pending",
            "latitude": 10.0
        });
        let row: EmergencyRow = serde_json::from_value(payload).unwrap();
        let remote = RemoteEmergency::try_from(row).unwrap();
        assert_eq!(remote.details.location, None);
        assert_eq!(remote.local_id, None);
        assert_eq!(remote.sync_version, 1);
    }

    #[test]
    fn listing_keeps_good_rows_next_to_malformed_ones() {
        let good = LocalId::new();
        let batch = decode_listing(vec![
            json!({
                "id": 1,
                "local_id": good.as_str(),
                "user_id": "user-1",
                "emergency_type": "panic",
                "status": "active",
                "updated_at": "2024-05-01T10:00:00Z"
            }),
            json!({
                "id": 2,
                "local_id": "not-a-uuid",
                "user_id": "user-1",
                "emergency_type": "panic",
                "status": "active",
                "updated_at": "2024-05-01T10:05:00Z"
            }),
            json!({
                "id": 3,
                "user_id": "user-1",
                "emergency_type": "earthquake",
                "status": "active"
            }),
            json!("garbage"),
        ]);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].local_id, Some(good));

        let rejected = batch
            .rejected
            .iter()
            .map(|row| (row.remote_id, row.updated_at))
            .collect::<Vec<_>>();
        assert_eq!(
            rejected,
            vec![
                (Some(2), Some(1_714_557_900_000)),
                (Some(3), None),
                (None, None)
            ]
        );
        assert_eq!(batch.latest_update(), Some(1_714_557_900_000));
    }

    #[test]
    fn watermark_uses_utc_rfc3339() {
        assert_eq!(
            watermark_param(1_714_557_900_250).as_deref(),
            Some("2024-05-01T10:05:00.250Z")
        );
    }
}
