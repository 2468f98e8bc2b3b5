use smartnotes_core::{AuthClient, ClientConfig, ExpiryReason};

use crate::auth::{clear_stored_session, session_manager};
use crate::cli::AuthCommands;
use crate::commands::common::format_timestamp;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, config: &ClientConfig) -> Result<(), CliError> {
    match command {
        AuthCommands::Login { email, password } => {
            let client = AuthClient::new(&config.api_base_url, config.request_timeout())?;
            let session = client.login(&email, &password).await?;
            let label = session
                .user
                .email
                .clone()
                .unwrap_or_else(|| email.trim().to_string());
            session_manager(config).sign_in(session)?;
            println!("Signed in to {} as {label}", config.api_base_url);
            Ok(())
        }
        AuthCommands::Register {
            username,
            email,
            password,
        } => {
            let client = AuthClient::new(&config.api_base_url, config.request_timeout())?;
            let user = client.register(&username, &email, &password).await?;
            println!(
                "Registered {} <{}>. Run `smartnotes auth login` to sign in.",
                user.username, user.email
            );
            Ok(())
        }
        AuthCommands::Status => {
            let manager = session_manager(config);
            match manager.current().filter(|_| manager.is_valid()) {
                Some(session) => {
                    let label = session
                        .user
                        .email
                        .or(session.user.username)
                        .unwrap_or_else(|| "(unknown user)".to_string());
                    println!(
                        "Signed in to {} as {} (expires {})",
                        config.api_base_url,
                        label,
                        format_timestamp(session.expires_at.saturating_mul(1000))
                    );
                }
                None => println!("Not signed in to {}.", config.api_base_url),
            }
            Ok(())
        }
        AuthCommands::Logout => {
            let manager = session_manager(config);
            if !manager.invalidate(ExpiryReason::SignedOut) {
                clear_stored_session(config)?;
            }
            println!("Signed out of {}", config.api_base_url);
            Ok(())
        }
    }
}
