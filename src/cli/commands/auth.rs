use std::io::Write;

use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{output_success, output_value};
use crate::cli::OutputFormat;
use crate::client::PortalClient;
use crate::session::{PortalRole, SessionManager, SessionState};

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login to the portal")]
    Login {
        #[arg(help = "Portal ID, e.g. T-100")]
        portal_id: String,
        #[arg(long, help = "Portal role (tenant or owner)")]
        role: PortalRole,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Logout from the portal")]
    Logout,

    #[command(about = "Show current authentication status (local, no network)")]
    Status,

    #[command(about = "Refresh the session token pair")]
    Refresh,

    #[command(about = "Show current user information from the server")]
    Whoami,
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let manager = SessionManager::new()?;

    match cmd {
        AuthCommands::Login { portal_id, role, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password()?,
            };

            let session = manager.login(&portal_id, &password, role).await?;
            output_success(
                &output_format,
                &format!("Logged in as {} ({})", session.user.name, session.user.role),
                Some(json!({
                    "portal_id": portal_id,
                    "property": session.user.property_title,
                    "expires_at": session.expires_at,
                })),
            )
        }
        AuthCommands::Logout => {
            manager.logout().await;
            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Status => {
            match manager.persisted_session() {
                Some(session) => {
                    let expired = session.is_expired(chrono::Utc::now());
                    output_success(
                        &output_format,
                        &format!(
                            "Session for {} ({}) - {}",
                            session.user.name,
                            session.user.role,
                            if expired { "expired" } else { "valid" }
                        ),
                        Some(json!({
                            "role": session.user.role,
                            "property": session.user.property_title,
                            "expires_at": session.expires_at,
                            "expired": expired,
                        })),
                    )
                }
                None => output_success(&output_format, "Not logged in", None),
            }
        }
        AuthCommands::Refresh => {
            manager.refresh_session().await?;
            let expires_at = manager.session().await.map(|s| s.expires_at);
            output_success(
                &output_format,
                "Session refreshed",
                Some(json!({ "expires_at": expires_at })),
            )
        }
        AuthCommands::Whoami => {
            if manager.restore().await == SessionState::Anonymous {
                anyhow::bail!("Not logged in");
            }
            let client = PortalClient::new(manager);
            let info = client.get("/portal/auth/info").await?;
            output_value(&info)
        }
    }
}

fn prompt_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    Ok(password)
}
