use clap::Parser;
use estate_portal_rust::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so the CLI picks up ESTATE_PORTAL_API_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = estate_portal_rust::cli::run(cli).await {
        match std::env::var("CLI_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
