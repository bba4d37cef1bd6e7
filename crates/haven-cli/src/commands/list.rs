use std::path::Path;

use crate::commands::common::{
    emergency_to_list_item, format_emergency_lines, open_store, EmergencyListItem,
};
use crate::error::CliError;

pub async fn run_list(user: Option<&str>, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let records = match user {
        Some(user_id) => store.get_user_emergencies(user_id).await?,
        None => store.get_all_emergencies().await?,
    };

    if as_json {
        let json_items = records
            .iter()
            .map(emergency_to_list_item)
            .collect::<Vec<EmergencyListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No emergencies recorded.");
    } else {
        for line in format_emergency_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}
