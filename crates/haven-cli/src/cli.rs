use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use haven_core::models::{ConflictResolution, EmergencyType, Priority};

#[derive(Parser)]
#[command(name = "haven")]
#[command(about = "Raise emergency alerts and keep them in sync, online or not")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Raise a new emergency
    #[command(alias = "panic")]
    Alert {
        /// Kind of emergency (panic, medical, fire, police, accident, other)
        #[arg(long = "type", value_name = "TYPE", default_value = "panic")]
        emergency_type: EmergencyType,
        /// Latitude of the current position
        #[arg(long, allow_negative_numbers = true, requires = "lon")]
        lat: Option<f64>,
        /// Longitude of the current position
        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        lon: Option<f64>,
        /// Human-readable address
        #[arg(long, requires = "lat")]
        address: Option<String>,
        /// Free-text message for responders
        #[arg(short, long)]
        message: Option<String>,
        /// Urgency (low, normal, high, critical); panic alerts default to critical
        #[arg(long)]
        priority: Option<Priority>,
        /// Owning user id (defaults to the signed-in user)
        #[arg(long, value_name = "ID")]
        user: Option<String>,
        /// Only record locally, do not attempt a sync
        #[arg(long)]
        offline: bool,
    },
    /// List cached emergencies
    List {
        /// Only show emergencies for this user
        #[arg(long, value_name = "ID")]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel an open emergency
    Cancel {
        /// Emergency ID or unique ID prefix
        id: String,
    },
    /// Delete an emergency
    Delete {
        /// Emergency ID or unique ID prefix
        id: String,
    },
    /// Run one upload and download pass against the backend
    Sync,
    /// Keep syncing on an interval and print local changes until Ctrl-C
    Watch,
    /// List emergencies flagged as conflicting with the backend
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Settle a conflict
    Resolve {
        /// Emergency ID or unique ID prefix
        id: String,
        /// remote-wins, local-wins or manual
        #[arg(long, value_name = "STRATEGY")]
        strategy: ConflictResolution,
    },
    /// Remove soft-deleted emergencies past the retention window
    Purge {
        /// Retention in days (defaults to HAVEN_RETENTION_DAYS or 30)
        #[arg(long)]
        days: Option<u64>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Authenticate with Supabase
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Login with Supabase email/password and store the session in the keychain
    Login {
        /// Supabase account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Supabase account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show the stored session
    Status,
    /// Logout and clear the stored session
    Logout,
}
