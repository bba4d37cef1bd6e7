//! haven-core - Core library for Haven
//!
//! This crate contains the emergency models, the offline-first local store,
//! the remote gateway, and the sync engine that reconciles the two. Client
//! shells (mobile, CLI) construct an [`EmergencyStore`] and a
//! [`SyncOrchestrator`] and drive them from their own triggers.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EmergencyRecord, LocalId, SyncStatus};
pub use services::EmergencyStore;
pub use state::SyncState;
pub use sync::{SyncOrchestrator, SyncOutcome};
