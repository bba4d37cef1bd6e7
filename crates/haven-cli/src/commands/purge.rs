use std::path::Path;

use haven_core::config::SyncSettings;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_purge(days: Option<u64>, db_path: &Path) -> Result<(), CliError> {
    let settings = match days {
        Some(days) => SyncSettings::default().with_retention_days(days),
        None => SyncSettings::from_env()?,
    };

    let store = open_store(db_path)?;
    let purged = store.purge_expired(settings.retention).await?;
    println!("Purged {purged} deleted emergencies");
    Ok(())
}
