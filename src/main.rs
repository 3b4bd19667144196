use clap::Parser;
use std::path::PathBuf;

use searchbridge::api::{AppState, create_router};
use searchbridge::config::Config;

#[derive(Parser, Debug)]
#[command(name = "searchbridge", about = "Tavily-compatible search and extract API")]
struct Cli {
    /// Address to bind, overrides SERVER_HOST
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overrides SERVER_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Env file to load instead of `.env`
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.env_file {
        Some(path) => Config::from_env_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(true)
        .init();

    let state = AppState::from_config(&config)?;
    let router = create_router(state);

    let listener =
        tokio::net::TcpListener::bind((config.server_host.as_str(), config.server_port)).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
