use std::path::Path;

use crate::commands::common::{connect_orchestrator, open_store, resolve_emergency};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let record = resolve_emergency(&store, id).await?;

    let confirmed = match connect_orchestrator(store.clone()).await? {
        Some(orchestrator) => orchestrator.delete_emergency(&record.local_id).await?,
        None => {
            store.soft_delete(&record.local_id).await?;
            record.is_local_only()
        }
    };

    println!("{}", record.local_id);
    if !confirmed {
        eprintln!("Remote delete pending; it will be retried on the next sync.");
    }
    Ok(())
}
