use anyhow::Context;
use clap::{Parser, Subcommand};
use easel_core::{ArtStore, RepostDetector};
use easel_service::{config, Service};
use easel_store::SqliteStore;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "easel", about = "Admin tooling for the easel bot core")]
struct Cli {
    /// Path to the configuration file (default: ./config.yaml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply store schema migrations.
    Migrate,
    /// Verify connectivity of the configured backends.
    Check,
    /// Print an example configuration file.
    ExampleConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Command::ExampleConfig = cli.command {
        print!("{}", config::example());
        return Ok(());
    }

    let config = config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Migrate => {
            let store = SqliteStore::connect(&config.store.url)
                .await
                .context("failed to connect to the durable store")?;
            store.run_migrations().await?;
            info!(url = %config.store.url, "migrations applied");
        }
        Command::Check => {
            let service = Service::init(&config).await?;

            // Exercise one read per backend; absence is a healthy answer.
            service
                .store()
                .guild("healthcheck")
                .await
                .context("store probe failed")?;
            service
                .detector()
                .find("healthcheck", "0")
                .await
                .context("repost backend probe failed")?;

            info!("all backends reachable");
            service.close().await?;
        }
        Command::ExampleConfig => unreachable!(),
    }

    Ok(())
}
