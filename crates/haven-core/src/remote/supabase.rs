//! PostgREST-backed gateway for the emergencies table.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::dto::{decode_listing, watermark_param, EmergencyRow};
use super::{EmergencyGateway, GatewayError, GatewayResult, RemoteBatch};
use crate::auth::{AuthSession, SessionPersistence};
use crate::config::RemoteConfig;
use crate::models::{EmergencyRecord, RemoteEmergency};

const RETURN_REPRESENTATION: &str = "return=representation";

/// Emergencies gateway authenticated with the stored Supabase session.
///
/// The session is read from `sessions` on every call and never refreshed
/// here; an expired token surfaces as [`GatewayError::Unauthenticated`].
#[derive(Clone)]
pub struct SupabaseEmergencyGateway<S: SessionPersistence> {
    collection_url: String,
    anon_key: String,
    client: Client,
    sessions: S,
}

impl<S: SessionPersistence> SupabaseEmergencyGateway<S> {
    pub fn new(config: &RemoteConfig, sessions: S) -> GatewayResult<Self> {
        if config.anon_key.trim().is_empty() {
            return Err(GatewayError::InvalidConfiguration(
                "anon key must not be empty".to_string(),
            ));
        }
        if config.table.trim().is_empty() {
            return Err(GatewayError::InvalidConfiguration(
                "table name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            collection_url: config.collection_url(),
            anon_key: config.anon_key.clone(),
            client: Client::builder().timeout(config.timeout).build()?,
            sessions,
        })
    }

    fn session(&self) -> GatewayResult<AuthSession> {
        let session = self
            .sessions
            .load_session()
            .map_err(|error| GatewayError::Unauthenticated(error.to_string()))?
            .ok_or_else(|| GatewayError::Unauthenticated("no stored session".to_string()))?;

        if session.is_expired() {
            return Err(GatewayError::Unauthenticated(
                "session has expired".to_string(),
            ));
        }
        Ok(session)
    }

    fn authorized(&self, request: RequestBuilder) -> GatewayResult<RequestBuilder> {
        let session = self.session()?;
        Ok(request
            .header("apikey", &self.anon_key)
            .bearer_auth(session.access_token)
            .header("Accept", "application/json"))
    }
}

impl<S: SessionPersistence> EmergencyGateway for SupabaseEmergencyGateway<S> {
    async fn current_user_id(&self) -> GatewayResult<String> {
        Ok(self.session()?.user.id)
    }

    async fn create(&self, record: &EmergencyRecord) -> GatewayResult<RemoteEmergency> {
        let mut row = EmergencyRow::from(record);
        row.id = None;
        let request = self.authorized(self.client.post(&self.collection_url))?;

        tracing::debug!(local_id = %record.local_id, "Creating remote emergency");
        send_single(request.json(&row)).await
    }

    async fn update(
        &self,
        remote_id: i64,
        record: &EmergencyRecord,
    ) -> GatewayResult<RemoteEmergency> {
        let mut row = EmergencyRow::from(record);
        row.id = None;
        let request = self
            .authorized(self.client.patch(&self.collection_url))?
            .query(&[("id", format!("eq.{remote_id}"))]);

        tracing::debug!(remote_id, version = record.sync_version, "Updating remote emergency");
        send_single(request.json(&row)).await
    }

    async fn delete(&self, remote_id: i64) -> GatewayResult<()> {
        let request = self
            .authorized(self.client.delete(&self.collection_url))?
            .query(&[("id", format!("eq.{remote_id}"))]);

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        tracing::debug!(remote_id, "Deleted remote emergency");
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str, since: Option<i64>) -> GatewayResult<RemoteBatch> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "updated_at.asc".to_string()),
        ];
        if let Some(watermark) = since.and_then(watermark_param) {
            query.push(("updated_at", format!("gte.{watermark}")));
        }

        let request = self
            .authorized(self.client.get(&self.collection_url))?
            .query(&query);
        let batch = decode_listing(send_rows(request).await?);
        tracing::debug!(
            user_id,
            count = batch.records.len(),
            rejected = batch.rejected.len(),
            "Listed remote emergencies"
        );
        Ok(batch)
    }
}

async fn send_rows<T: DeserializeOwned>(request: RequestBuilder) -> GatewayResult<Vec<T>> {
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(rejected(response).await);
    }
    Ok(response.json::<Vec<T>>().await?)
}

/// Send a write that asks PostgREST to echo the affected row back.
async fn send_single(request: RequestBuilder) -> GatewayResult<RemoteEmergency> {
    let row = send_rows::<EmergencyRow>(request.header("Prefer", RETURN_REPRESENTATION))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::InvalidPayload("response contained no rows".to_string()))?;
    RemoteEmergency::try_from(row)
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    error: Option<String>,
}

async fn rejected(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    GatewayError::Rejected {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestError>(body) {
        if let Some(message) = payload
            .message
            .or(payload.error)
            .or(payload.details)
            .or(payload.hint)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::{AuthUser, MemorySessionStore};
    use crate::models::NewEmergency;
    use crate::util::unix_timestamp_now;

    fn config(server: &MockServer) -> RemoteConfig {
        RemoteConfig {
            supabase_url: server.uri(),
            anon_key: "anon-key".to_string(),
            table: "emergencies".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    fn session(expires_at: i64) -> AuthSession {
        AuthSession {
            access_token: "access-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            expires_at,
            user: AuthUser {
                id: "user-1".to_string(),
                email: None,
            },
        }
    }

    fn signed_in(server: &MockServer) -> SupabaseEmergencyGateway<MemorySessionStore> {
        let store = MemorySessionStore::with_session(session(unix_timestamp_now() + 3_600));
        SupabaseEmergencyGateway::new(&config(server), store).unwrap()
    }

    fn row_json(id: i64, record: &EmergencyRecord) -> serde_json::Value {
        let mut value = serde_json::to_value(EmergencyRow::from(record)).unwrap();
        value["id"] = json!(id);
        value["updated_at"] = json!("2024-05-01T10:00:00+00:00");
        value
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_posts_record_and_decodes_representation() {
        let server = MockServer::start().await;
        let record = EmergencyRecord::from_new(NewEmergency::panic("user-1"));

        Mock::given(method("POST"))
            .and(path("/rest/v1/emergencies"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer access-token"))
            .and(header("prefer", "return=representation"))
            .and(body_partial_json(json!({
                "local_id": record.local_id.as_str(),
                "sync_version": 1
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([row_json(42, &record)])))
            .expect(1)
            .mount(&server)
            .await;

        let remote = signed_in(&server).create(&record).await.unwrap();
        assert_eq!(remote.remote_id, 42);
        assert_eq!(remote.local_id, Some(record.local_id));
        assert_eq!(remote.updated_at, Some(1_714_557_600_000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_and_delete_address_row_by_id() {
        let server = MockServer::start().await;
        let mut record = EmergencyRecord::from_new(NewEmergency::panic("user-1"));
        record.remote_id = Some(42);
        record.sync_version = 2;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/emergencies"))
            .and(query_param("id", "eq.42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row_json(42, &record)])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/emergencies"))
            .and(query_param("id", "eq.42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = signed_in(&server);
        let remote = gateway.update(42, &record).await.unwrap();
        assert_eq!(remote.sync_version, 2);
        gateway.delete(42).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_filters_by_user_and_watermark() {
        let server = MockServer::start().await;
        let record = EmergencyRecord::from_new(NewEmergency::panic("user-1"));

        Mock::given(method("GET"))
            .and(path("/rest/v1/emergencies"))
            .and(query_param("user_id", "eq.user-1"))
            .and(query_param("order", "updated_at.asc"))
            .and(query_param("updated_at", "gte.2024-05-01T10:05:00.250Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                row_json(1, &record),
                row_json(2, &EmergencyRecord::from_new(NewEmergency::panic("user-1")))
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let batch = signed_in(&server)
            .list_for_user("user-1", Some(1_714_557_900_250))
            .await
            .unwrap();
        let ids: Vec<i64> = batch.records.iter().map(|row| row.remote_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(batch.rejected.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_row_does_not_fail_the_listing() {
        let server = MockServer::start().await;
        let record = EmergencyRecord::from_new(NewEmergency::panic("user-1"));
        let mut broken = row_json(2, &record);
        broken["local_id"] = json!("not-a-uuid");
        broken["updated_at"] = json!("2024-05-01T10:05:00+00:00");

        Mock::given(method("GET"))
            .and(path("/rest/v1/emergencies"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([row_json(1, &record), broken])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let batch = signed_in(&server).list_for_user("user-1", None).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].remote_id, 1);

        assert_eq!(batch.rejected.len(), 1);
        let rejected = &batch.rejected[0];
        assert_eq!(rejected.remote_id, Some(2));
        assert_eq!(rejected.updated_at, Some(1_714_557_900_000));
        assert!(matches!(rejected.error, GatewayError::InvalidPayload(_)));
        assert_eq!(batch.latest_update(), Some(1_714_557_900_000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejection_carries_status_and_postgrest_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint",
                "details": null,
                "hint": null
            })))
            .mount(&server)
            .await;

        let record = EmergencyRecord::from_new(NewEmergency::panic("user-1"));
        match signed_in(&server).create(&record).await.unwrap_err() {
            GatewayError::Rejected { status, message } => {
                assert_eq!(status, 409);
                assert!(message.contains("duplicate key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_or_expired_session_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let anonymous =
            SupabaseEmergencyGateway::new(&config(&server), MemorySessionStore::default())
                .unwrap();
        let error = anonymous.list_for_user("user-1", None).await.unwrap_err();
        assert!(error.is_authentication());

        let expired = SupabaseEmergencyGateway::new(
            &config(&server),
            MemorySessionStore::with_session(session(unix_timestamp_now() - 10)),
        )
        .unwrap();
        assert!(expired.current_user_id().await.unwrap_err().is_authentication());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_representation_is_invalid_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&server)
            .await;

        let record = EmergencyRecord::from_new(NewEmergency::panic("user-1"));
        assert!(matches!(
            signed_in(&server).create(&record).await,
            Err(GatewayError::InvalidPayload(_))
        ));
    }

    #[test]
    fn parse_api_error_falls_back_to_body() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::FORBIDDEN, ""), "HTTP 403");
    }
}
