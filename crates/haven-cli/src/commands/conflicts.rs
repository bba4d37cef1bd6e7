use std::path::Path;

use crate::commands::common::{
    emergency_to_list_item, format_emergency_lines, format_sync_timestamp, open_store,
    EmergencyListItem,
};
use crate::error::CliError;

pub async fn run_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let conflicts = store.list_conflicts().await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(emergency_to_list_item)
            .collect::<Vec<EmergencyListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts.");
        return Ok(());
    }

    for (line, record) in format_emergency_lines(&conflicts).iter().zip(&conflicts) {
        let remote_at = record
            .remote_updated_at
            .map_or_else(|| "-".to_string(), format_sync_timestamp);
        println!("{line}  remote_updated={remote_at} v{}", record.sync_version);
    }
    println!("Settle with `haven resolve <id> --strategy remote-wins|local-wins|manual`.");
    Ok(())
}
