use std::path::Path;
use std::sync::Arc;

use haven_core::config::SyncSettings;
use haven_core::services::LiveQuery;
use haven_core::sync::SyncWorker;
use haven_core::EmergencyRecord;

use crate::commands::common::{open_store, require_orchestrator};
use crate::error::CliError;

pub async fn run_watch(db_path: &Path) -> Result<(), CliError> {
    let settings = SyncSettings::from_env()?;
    let store = open_store(db_path)?;
    let mut live = store.watch_all();
    let orchestrator = Arc::new(require_orchestrator(store).await?);
    let worker = SyncWorker::new(orchestrator, settings);

    println!(
        "Syncing every {}s. Press Ctrl-C to stop.",
        settings.interval.as_secs()
    );

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", error);
        }
    };

    tokio::select! {
        () = worker.run_until(shutdown) => Ok(()),
        result = print_changes(&mut live) => result,
    }
}

async fn print_changes(live: &mut LiveQuery<Vec<EmergencyRecord>>) -> Result<(), CliError> {
    loop {
        let records = live.next().await?;
        let pending = records.iter().filter(|record| record.needs_upload).count();
        let open = records
            .iter()
            .filter(|record| record.details.status.is_open())
            .count();
        println!(
            "{} emergencies ({open} open, {pending} awaiting upload)",
            records.len()
        );
    }
}
