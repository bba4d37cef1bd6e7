use std::path::Path;

use haven_core::models::{EmergencyStatus, EmergencyUpdate};

use crate::commands::common::{connect_orchestrator, open_store, resolve_emergency};
use crate::error::CliError;

pub async fn run_cancel(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let record = resolve_emergency(&store, id).await?;
    if !record.details.status.is_open() {
        return Err(CliError::InvalidInput(format!(
            "Emergency {} is already {}",
            record.local_id,
            record.details.status.as_str()
        )));
    }

    let updated = store
        .update_emergency(
            &record.local_id,
            &EmergencyUpdate::status(EmergencyStatus::Cancelled),
        )
        .await?;
    println!("{}", updated.local_id);

    if let Some(orchestrator) = connect_orchestrator(store).await? {
        if let Err(error) = orchestrator.upload_pending_emergencies().await {
            eprintln!("Cancellation saved offline: {error}");
        }
    }
    Ok(())
}
