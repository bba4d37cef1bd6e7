use std::path::Path;

use haven_core::models::ConflictResolution;

use crate::commands::common::{open_store, resolve_emergency};
use crate::error::CliError;

pub async fn run_resolve(
    id: &str,
    strategy: ConflictResolution,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let record = resolve_emergency(&store, id).await?;
    let resolved = store.resolve_conflict(&record.local_id, strategy).await?;

    println!(
        "{} {} (v{})",
        resolved.local_id,
        resolved.sync_status.as_str(),
        resolved.sync_version
    );
    if resolved.needs_upload && strategy == ConflictResolution::LocalWins {
        println!("Local copy will overwrite the remote on the next `haven sync`.");
    }
    Ok(())
}
