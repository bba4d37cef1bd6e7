use std::path::PathBuf;

use clap::Parser;
use haven_core::models::{
    ConflictResolution, EmergencyStatus, EmergencyType, NewEmergency, Priority,
};
use haven_core::EmergencyStore;
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands};
use crate::commands::alert::{build_new_emergency, AlertArgs};
use crate::commands::common::{
    emergency_to_list_item, format_relative_time, normalize_identifier, preview,
    resolve_db_path, resolve_emergency, short_id,
};
use crate::error::CliError;

fn alert_args() -> AlertArgs {
    AlertArgs {
        emergency_type: EmergencyType::Panic,
        coordinates: None,
        address: None,
        message: None,
        priority: None,
        user: None,
        offline: true,
    }
}

#[test]
fn format_relative_time_buckets() {
    let now = 10 * 24 * 3_600_000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h ago");
    assert_eq!(format_relative_time(now - 2 * 24 * 3_600_000, now), "2d ago");
    assert_eq!(format_relative_time(0, now), "1w ago");
    assert_eq!(format_relative_time(now + 1_000, now), "just now");
}

#[test]
fn preview_collapses_whitespace_and_truncates() {
    assert_eq!(preview("  trapped \n on  roof ", 40), "trapped on roof");
    assert_eq!(preview("abcdefghij", 8), "abcde...");
}

#[test]
fn normalize_identifier_rejects_blank() {
    assert!(matches!(normalize_identifier("  "), Err(CliError::EmptyId)));
    assert_eq!(normalize_identifier(" 01ABC ").unwrap(), "01abc");
}

#[test]
fn explicit_db_path_wins() {
    let path = PathBuf::from("/tmp/haven-test.db");
    assert_eq!(resolve_db_path(Some(path.clone())).unwrap(), path);
}

#[test]
fn alert_parses_type_location_and_priority() {
    let cli = Cli::try_parse_from([
        "haven", "alert", "--type", "medical", "--lat", "-33.92", "--lon", "18.42", "--priority",
        "high", "-m", "fell down stairs",
    ])
    .unwrap();

    match cli.command {
        Commands::Alert {
            emergency_type,
            lat,
            lon,
            priority,
            message,
            offline,
            ..
        } => {
            assert_eq!(emergency_type, EmergencyType::Medical);
            assert_eq!(lat.zip(lon), Some((-33.92, 18.42)));
            assert_eq!(priority, Some(Priority::High));
            assert_eq!(message.as_deref(), Some("fell down stairs"));
            assert!(!offline);
        }
        _ => panic!("expected alert command"),
    }
}

#[test]
fn alert_rejects_unknown_type_and_lone_coordinate() {
    assert!(Cli::try_parse_from(["haven", "alert", "--type", "flood"]).is_err());
    assert!(Cli::try_parse_from(["haven", "alert", "--lat", "1.0"]).is_err());
}

#[test]
fn resolve_accepts_dashed_strategy() {
    let cli =
        Cli::try_parse_from(["haven", "resolve", "0192", "--strategy", "local-wins"]).unwrap();
    match cli.command {
        Commands::Resolve { id, strategy } => {
            assert_eq!(id, "0192");
            assert_eq!(strategy, ConflictResolution::LocalWins);
        }
        _ => panic!("expected resolve command"),
    }
}

#[test]
fn panic_alert_defaults_to_active_critical() {
    let new = build_new_emergency("user-1".to_string(), &alert_args()).unwrap();
    assert_eq!(new.details.emergency_type, EmergencyType::Panic);
    assert_eq!(new.details.status, EmergencyStatus::Active);
    assert_eq!(new.details.priority, Priority::Critical);
}

#[test]
fn alert_builder_validates_coordinates_and_trims_text() {
    let mut args = alert_args();
    args.coordinates = Some((95.0, 10.0));
    assert!(build_new_emergency("user-1".to_string(), &args).is_err());

    args.coordinates = Some((52.5, 13.4));
    args.address = Some("   ".to_string());
    args.message = Some("  help  ".to_string());
    args.emergency_type = EmergencyType::Fire;
    let new = build_new_emergency("user-1".to_string(), &args).unwrap();

    let location = new.details.location.unwrap();
    assert_eq!(location.address, None);
    assert_eq!(new.details.message.as_deref(), Some("help"));
    assert_eq!(new.details.emergency_type, EmergencyType::Fire);
}

#[tokio::test]
async fn resolve_emergency_by_full_id_and_prefix() {
    let store = EmergencyStore::open_in_memory().unwrap();
    let record = store
        .create_emergency(NewEmergency::panic("user-1"))
        .await
        .unwrap();
    let full = record.local_id.to_string();

    let by_full = resolve_emergency(&store, &full).await.unwrap();
    assert_eq!(by_full.local_id, record.local_id);

    let by_prefix = resolve_emergency(&store, &short_id(&record.local_id))
        .await
        .unwrap();
    assert_eq!(by_prefix.local_id, record.local_id);

    assert!(matches!(
        resolve_emergency(&store, "ffffffff").await,
        Err(CliError::EmergencyNotFound(_))
    ));
}

#[tokio::test]
async fn resolve_emergency_reports_ambiguous_prefix() {
    let store = EmergencyStore::open_in_memory().unwrap();
    store
        .create_emergency(NewEmergency::panic("user-1"))
        .await
        .unwrap();
    store
        .create_emergency(NewEmergency::panic("user-1"))
        .await
        .unwrap();

    // UUID v7 ids share their leading timestamp digits
    match resolve_emergency(&store, "0").await {
        Err(CliError::AmbiguousId(message)) => assert!(message.contains("ambiguous")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn deleted_emergencies_cannot_be_resolved() {
    let store = EmergencyStore::open_in_memory().unwrap();
    let record = store
        .create_emergency(NewEmergency::panic("user-1"))
        .await
        .unwrap();
    store.soft_delete(&record.local_id).await.unwrap();

    assert!(resolve_emergency(&store, &record.local_id.to_string())
        .await
        .is_err());
}

#[test]
fn list_item_exposes_sync_fields() {
    let record = haven_core::EmergencyRecord::from_new(
        NewEmergency::panic("user-1").with_message("help"),
    );
    let item = emergency_to_list_item(&record);

    assert_eq!(item.id, record.local_id.to_string());
    assert_eq!(item.status, "active");
    assert_eq!(item.priority, "critical");
    assert_eq!(item.sync_status, "pending");
    assert_eq!(item.sync_version, 1);
    assert!(item.needs_upload);
    assert_eq!(item.remote_id, None);
}
