//! Async services shared by client shells

mod store;

pub use store::{EmergencyStore, LiveQuery};
