use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cronwatch_client::SchedulerClient;
use cronwatch_store::store_from_env;
use cronwatch_sync::{JobService, SyncConfig, SyncEngine};

#[derive(Debug, Parser)]
#[command(name = "cronwatch-cli")]
#[command(about = "Scheduler mirror command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pull jobs and execution history from the external scheduler once.
    Sync,
    /// Serve the JSON API.
    Serve,
    /// Print aggregate counts over the local mirror.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let config = SyncConfig::from_env();
            let client = Arc::new(SchedulerClient::new(config.client_config())?);
            let store = store_from_env().await?;
            let engine = SyncEngine::new(client, store);
            let summary = engine.sync_jobs().await?;
            println!(
                "sync complete: jobs={} executions={} history_failures={}",
                summary.jobs_synced, summary.executions_synced, summary.history_failures
            );
        }
        Commands::Serve => {
            cronwatch_web::serve_from_env().await?;
        }
        Commands::Stats => {
            let config = SyncConfig::from_env();
            let client = Arc::new(SchedulerClient::new(config.client_config())?);
            let store = store_from_env().await?;
            let service = JobService::new(client, store);
            let stats = service.statistics().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
