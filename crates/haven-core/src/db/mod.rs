//! Database layer for Haven

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{EmergencyRepository, SqliteEmergencyRepository};
