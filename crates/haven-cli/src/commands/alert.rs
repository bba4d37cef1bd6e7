use std::path::Path;

use haven_core::auth::SessionPersistence;
use haven_core::models::{EmergencyType, GeoPoint, NewEmergency, Priority};
use haven_core::EmergencyStore;

use crate::auth::SessionStore;
use crate::commands::common::{connect_orchestrator, open_store, remote_config, short_id};
use crate::error::CliError;

pub struct AlertArgs {
    pub emergency_type: EmergencyType,
    pub coordinates: Option<(f64, f64)>,
    pub address: Option<String>,
    pub message: Option<String>,
    pub priority: Option<Priority>,
    pub user: Option<String>,
    pub offline: bool,
}

pub async fn run_alert(args: AlertArgs, db_path: &Path) -> Result<(), CliError> {
    let user_id = resolve_user(args.user.clone())?;
    let new = build_new_emergency(user_id, &args)?;

    let store = open_store(db_path)?;
    let record = store.create_emergency(new).await?;
    println!("{}", record.local_id);

    if !args.offline {
        push_now(store).await;
    }
    Ok(())
}

pub fn build_new_emergency(user_id: String, args: &AlertArgs) -> Result<NewEmergency, CliError> {
    let mut new = if args.emergency_type == EmergencyType::Panic {
        NewEmergency::panic(user_id)
    } else {
        NewEmergency::new(user_id, args.emergency_type)
    };

    if let Some((latitude, longitude)) = args.coordinates {
        let mut point = GeoPoint::new(latitude, longitude);
        if !point.is_valid() {
            return Err(CliError::InvalidInput(format!(
                "Coordinates out of range: {latitude}, {longitude}"
            )));
        }
        if let Some(address) = args.address.as_deref().map(str::trim) {
            if !address.is_empty() {
                point = point.with_address(address);
            }
        }
        new = new.with_location(point);
    }
    if let Some(message) = args.message.as_deref().map(str::trim) {
        if !message.is_empty() {
            new = new.with_message(message);
        }
    }
    if let Some(priority) = args.priority {
        new = new.with_priority(priority);
    }
    Ok(new)
}

/// Explicit `--user`, else the user of the stored session.
fn resolve_user(explicit: Option<String>) -> Result<String, CliError> {
    if let Some(user) = explicit.map(|user| user.trim().to_string()) {
        if !user.is_empty() {
            return Ok(user);
        }
    }

    let Some(config) = remote_config()? else {
        return Err(CliError::NoUser);
    };
    SessionStore::for_project(&config)
        .load_session()
        .map_err(|error| CliError::Auth(error.to_string()))?
        .map(|session| session.user.id)
        .ok_or(CliError::NoUser)
}

/// Best effort: an alert is already safe locally, so sync problems only warn.
async fn push_now(store: EmergencyStore) {
    match connect_orchestrator(store).await {
        Ok(Some(orchestrator)) => match orchestrator.upload_pending_emergencies().await {
            Ok(report) if report.errors.is_empty() => {
                tracing::info!("Alert uploaded ({} record(s))", report.succeeded);
            }
            Ok(report) => {
                for failure in &report.errors {
                    let id = failure
                        .local_id
                        .as_ref()
                        .map_or_else(|| "-".to_string(), short_id);
                    eprintln!("Upload failed for {id}: {}", failure.error);
                }
            }
            Err(error) => eprintln!("Alert saved offline; upload skipped: {error}"),
        },
        Ok(None) => tracing::debug!("No remote configured; alert kept local"),
        Err(error) => eprintln!("Alert saved offline; sync unavailable: {error}"),
    }
}
