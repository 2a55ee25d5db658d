pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Portal CLI - tenant/owner portal client for the Estate platform")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Authentication and session management")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Authenticated requests against the portal API")]
    Api {
        #[command(subcommand)]
        cmd: commands::api::ApiCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    let result = match cli.command {
        Commands::Auth { cmd } => commands::auth::handle(cmd, output_format).await,
        Commands::Api { cmd } => commands::api::handle(cmd, output_format).await,
    };

    // Auth failures get a hint on how to recover instead of a bare error.
    if let Err(e) = &result {
        if let Some(portal_err) = e.downcast_ref::<crate::error::PortalError>() {
            if portal_err.is_auth_failure() {
                anyhow::bail!("{}. Run `portal auth login` to start a new session.", portal_err);
            }
        }
    }

    result
}
