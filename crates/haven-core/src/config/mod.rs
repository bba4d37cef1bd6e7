//! Runtime configuration loaded from the environment.
//!
//! The remote backend is optional: with no `HAVEN_SUPABASE_*` variables set
//! the engine runs purely local. A partial remote configuration is an error
//! rather than a silent fallback.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_SUPABASE_URL: &str = "HAVEN_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "HAVEN_SUPABASE_ANON_KEY";
pub const ENV_EMERGENCIES_TABLE: &str = "HAVEN_EMERGENCIES_TABLE";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "HAVEN_HTTP_TIMEOUT_SECS";
pub const ENV_SYNC_INTERVAL_SECS: &str = "HAVEN_SYNC_INTERVAL_SECS";
pub const ENV_RETENTION_DAYS: &str = "HAVEN_RETENTION_DAYS";

const DEFAULT_TABLE: &str = "emergencies";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15 * 60;
const DEFAULT_RETENTION_DAYS: u64 = 30;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Supabase connection settings for the emergencies resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Project URL, without trailing slash.
    pub supabase_url: String,
    /// Public anon key sent as the `apikey` header.
    pub anon_key: String,
    /// PostgREST table holding emergencies.
    pub table: String,
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Load remote configuration from environment variables.
    ///
    /// Returns `Ok(None)` when neither the URL nor the anon key is set.
    pub fn from_env() -> Result<Option<Self>> {
        parse_remote_config(|key| env::var(key).ok())
    }

    /// Base URL of the REST collection, e.g. `https://x.supabase.co/rest/v1/emergencies`.
    #[must_use]
    pub fn collection_url(&self) -> String {
        format!("{}/rest/v1/{}", self.supabase_url, self.table)
    }
}

/// Scheduling knobs for the periodic sync worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    pub interval: Duration,
    /// How long soft-deleted records are kept before purge.
    pub retention: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_DAYS * SECONDS_PER_DAY),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        parse_sync_settings(|key| env::var(key).ok())
    }

    #[must_use]
    pub const fn with_retention_days(mut self, days: u64) -> Self {
        self.retention = Duration::from_secs(days * SECONDS_PER_DAY);
        self
    }
}

fn parse_remote_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<RemoteConfig>> {
    let supabase_url = normalize_text_option(lookup(ENV_SUPABASE_URL));
    let anon_key = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY));

    let (supabase_url, anon_key) = match (supabase_url, anon_key) {
        (None, None) => return Ok(None),
        (Some(url), Some(key)) => (url, key),
        (url, _) => {
            let missing = if url.is_none() {
                ENV_SUPABASE_URL
            } else {
                ENV_SUPABASE_ANON_KEY
            };
            return Err(Error::Config(format!(
                "Remote configuration is incomplete. Missing: {missing}"
            )));
        }
    };

    let supabase_url = supabase_url.trim_end_matches('/').to_string();
    if !is_http_url(&supabase_url) {
        return Err(Error::Config(format!(
            "{ENV_SUPABASE_URL} must start with http:// or https://"
        )));
    }

    let table = normalize_text_option(lookup(ENV_EMERGENCIES_TABLE))
        .unwrap_or_else(|| DEFAULT_TABLE.to_string());
    let timeout_secs = parse_seconds(&lookup, ENV_HTTP_TIMEOUT_SECS, DEFAULT_HTTP_TIMEOUT_SECS)?;

    Ok(Some(RemoteConfig {
        supabase_url,
        anon_key,
        table,
        timeout: Duration::from_secs(timeout_secs),
    }))
}

fn parse_sync_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<SyncSettings> {
    let interval = parse_seconds(&lookup, ENV_SYNC_INTERVAL_SECS, DEFAULT_SYNC_INTERVAL_SECS)?;
    let retention_days = parse_seconds(&lookup, ENV_RETENTION_DAYS, DEFAULT_RETENTION_DAYS)?;

    Ok(SyncSettings {
        interval: Duration::from_secs(interval),
        ..SyncSettings::default()
    }
    .with_retention_days(retention_days))
}

fn parse_seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64> {
    let Some(raw) = normalize_text_option(lookup(key)) else {
        return Ok(default);
    };

    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(Error::Config(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
        Ok(value) => Ok(value),
    }
}
