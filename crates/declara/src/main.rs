mod routes;
mod state;

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use declara_core::StoragePaths;
use declara_portal::config::PortalConfig;
use declara_portal::driver::ChromiumSessionFactory;
use state::AppState;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Declaration converter and portal automation server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let storage = StoragePaths::from_env();
    let portal_config = PortalConfig::from_env();
    let state = AppState::new(
        storage,
        portal_config,
        Arc::new(ChromiumSessionFactory::default()),
    )?;

    let router = routes::app(state);
    let listener = TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, args.port)).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}
