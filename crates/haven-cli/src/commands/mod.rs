pub mod alert;
pub mod auth_cmd;
pub mod cancel;
pub mod common;
pub mod completions;
pub mod conflicts;
pub mod delete;
pub mod list;
pub mod purge;
pub mod resolve;
pub mod sync;
pub mod watch;
