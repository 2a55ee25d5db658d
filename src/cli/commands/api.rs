use std::io::Read;

use clap::Subcommand;
use serde_json::Value;

use crate::cli::utils::output_value;
use crate::cli::OutputFormat;
use crate::client::PortalClient;
use crate::session::{SessionManager, SessionState};

#[derive(Subcommand)]
pub enum ApiCommands {
    #[command(about = "GET an endpoint")]
    Get {
        #[arg(help = "Endpoint path, e.g. /portal/auth/info")]
        endpoint: String,
    },

    #[command(about = "POST to an endpoint with a JSON body from stdin")]
    Post {
        #[arg(help = "Endpoint path")]
        endpoint: String,
    },

    #[command(about = "PUT to an endpoint with a JSON body from stdin")]
    Put {
        #[arg(help = "Endpoint path")]
        endpoint: String,
    },

    #[command(about = "DELETE an endpoint")]
    Delete {
        #[arg(help = "Endpoint path")]
        endpoint: String,
    },
}

pub async fn handle(cmd: ApiCommands, _output_format: OutputFormat) -> anyhow::Result<()> {
    let manager = SessionManager::new()?;
    if manager.restore().await == SessionState::Anonymous {
        anyhow::bail!("Not logged in");
    }
    let client = PortalClient::new(manager);

    let response = match cmd {
        ApiCommands::Get { endpoint } => client.get(&endpoint).await?,
        ApiCommands::Post { endpoint } => client.post(&endpoint, read_body_from_stdin()?).await?,
        ApiCommands::Put { endpoint } => client.put(&endpoint, read_body_from_stdin()?).await?,
        ApiCommands::Delete { endpoint } => client.delete(&endpoint).await?,
    };

    output_value(&response)
}

fn read_body_from_stdin() -> anyhow::Result<Value> {
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    let body: Value = serde_json::from_str(&buffer)
        .map_err(|e| anyhow::anyhow!("stdin is not valid JSON: {}", e))?;
    Ok(body)
}
