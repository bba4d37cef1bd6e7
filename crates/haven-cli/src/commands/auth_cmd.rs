use haven_core::auth::SessionPersistence;

use crate::auth::{auth_client, SessionStore};
use crate::cli::AuthCommands;
use crate::commands::common::remote_config;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands) -> Result<(), CliError> {
    let config = remote_config()?.ok_or(CliError::SyncNotConfigured)?;
    let client = auth_client(&config).map_err(|error| CliError::Auth(error.to_string()))?;

    match command {
        AuthCommands::Login { email, password } => {
            let session = client
                .sign_in(&email, &password)
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let email_label = session.user.email.as_deref().unwrap_or("(no email)");
            println!("Signed in as {email_label} (user {})", session.user.id);
        }
        AuthCommands::Status => {
            let session = client
                .restore_session()
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?;
            if let Some(session) = session {
                let email_label = session.user.email.as_deref().unwrap_or("(no email)");
                println!(
                    "Signed in as {} (user {}, expires_at={})",
                    email_label, session.user.id, session.expires_at
                );
            } else {
                println!("Not signed in.");
            }
        }
        AuthCommands::Logout => {
            if let Err(error) = client.sign_out().await {
                tracing::warn!("Remote sign-out failed, clearing local session: {}", error);
                SessionStore::for_project(&config)
                    .clear_session()
                    .map_err(|error| CliError::Auth(error.to_string()))?;
            }
            println!("Signed out");
        }
    }
    Ok(())
}
