use std::path::Path;

use haven_core::SyncOutcome;

use crate::commands::common::{open_store, require_orchestrator};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let orchestrator = require_orchestrator(open_store(db_path)?).await?;

    let outcome = match orchestrator.sync_all().await {
        SyncOutcome::Failed(error) => return Err(error.into()),
        outcome => outcome,
    };

    println!("Sync completed: {outcome}");
    if let SyncOutcome::PartialSuccess { errors, .. } = &outcome {
        for failure in errors {
            eprintln!("  {failure}");
        }
    }
    Ok(())
}
