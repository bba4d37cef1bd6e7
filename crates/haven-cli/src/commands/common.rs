use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use haven_core::config::RemoteConfig;
use haven_core::models::EmergencyRecord;
use haven_core::remote::SupabaseEmergencyGateway;
use haven_core::{EmergencyStore, LocalId, SyncOrchestrator};
use serde::Serialize;

use crate::auth::{auth_client, SessionStore};
use crate::error::CliError;

pub type CliOrchestrator = SyncOrchestrator<SupabaseEmergencyGateway<SessionStore>>;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct EmergencyListItem {
    pub id: String,
    pub remote_id: Option<i64>,
    pub user_id: String,
    pub emergency_type: String,
    pub status: String,
    pub priority: String,
    pub message: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sync_status: String,
    pub sync_version: i64,
    pub needs_upload: bool,
    pub retry_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

pub fn emergency_to_list_item(record: &EmergencyRecord) -> EmergencyListItem {
    let now_ms = Utc::now().timestamp_millis();
    let location = record.details.location.as_ref();
    EmergencyListItem {
        id: record.local_id.to_string(),
        remote_id: record.remote_id,
        user_id: record.user_id.clone(),
        emergency_type: record.details.emergency_type.as_str().to_string(),
        status: record.details.status.as_str().to_string(),
        priority: record.details.priority.as_str().to_string(),
        message: record.details.message.clone(),
        latitude: location.map(|point| point.latitude),
        longitude: location.map(|point| point.longitude),
        sync_status: record.sync_status.as_str().to_string(),
        sync_version: record.sync_version,
        needs_upload: record.needs_upload,
        retry_count: record.retry_count,
        created_at: record.created_at,
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.created_at, now_ms),
    }
}

pub fn format_emergency_lines(records: &[EmergencyRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let details = &record.details;
            let mut line = format!(
                "{}  {:<8} {:<10} {:<8} {:<9} {}",
                short_id(&record.local_id),
                details.emergency_type.as_str(),
                details.status.as_str(),
                details.priority.as_str(),
                record.sync_status.as_str(),
                format_relative_time(record.created_at, now_ms)
            );
            if let Some(message) = details.message.as_deref() {
                line.push_str("  ");
                line.push_str(&preview(message, 40));
            }
            line
        })
        .collect()
}

pub fn short_id(local_id: &LocalId) -> String {
    local_id.to_string().chars().take(SHORT_ID_LEN).collect()
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let truncated = single_line
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    format!("{truncated}...")
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyId);
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Find a live emergency by full local id or unique prefix.
pub async fn resolve_emergency(
    store: &EmergencyStore,
    query: &str,
) -> Result<EmergencyRecord, CliError> {
    let query = normalize_identifier(query)?;

    if let Ok(local_id) = query.parse::<LocalId>() {
        if let Some(record) = store.get_emergency(&local_id).await? {
            return Ok(record);
        }
    }

    let mut matches = store
        .get_all_emergencies()
        .await?
        .into_iter()
        .filter(|record| record.local_id.to_string().starts_with(&query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::EmergencyNotFound(query)),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|record| short_id(&record.local_id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("HAVEN_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("haven").join("haven.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

pub fn open_store(db_path: &Path) -> Result<EmergencyStore, CliError> {
    Ok(EmergencyStore::open_path(db_path)?)
}

pub fn remote_config() -> Result<Option<RemoteConfig>, CliError> {
    Ok(RemoteConfig::from_env()?)
}

/// Build an orchestrator over `store`, refreshing a stale session first.
///
/// Returns `Ok(None)` when no remote backend is configured.
pub async fn connect_orchestrator(
    store: EmergencyStore,
) -> Result<Option<CliOrchestrator>, CliError> {
    let Some(config) = remote_config()? else {
        return Ok(None);
    };

    let client = auth_client(&config).map_err(|error| CliError::Auth(error.to_string()))?;
    if client
        .restore_session()
        .await
        .map_err(|error| CliError::Auth(error.to_string()))?
        .is_none()
    {
        tracing::info!("No stored session; sync will fail until `haven auth login`");
    }

    let gateway = SupabaseEmergencyGateway::new(&config, client.store().clone())?;
    Ok(Some(SyncOrchestrator::new(store, gateway)))
}

pub async fn require_orchestrator(store: EmergencyStore) -> Result<CliOrchestrator, CliError> {
    connect_orchestrator(store)
        .await?
        .ok_or(CliError::SyncNotConfigured)
}
