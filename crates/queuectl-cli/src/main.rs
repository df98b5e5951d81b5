mod cli;
mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use queuectl_core::store::JobStore;
use queuectl_sqlite::SqliteStore;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let pool = queuectl_sqlite::connect(&cli.db).await?;
    queuectl_sqlite::run_migrations(&pool).await?;
    let store: Arc<dyn JobStore> = Arc::new(SqliteStore::new(pool));

    match cli.command {
        Command::Enqueue {
            id,
            command,
            max_retries,
            timeout_seconds,
            priority,
            run_at,
        } => commands::enqueue(&store, id, command, max_retries, timeout_seconds, priority, run_at).await,
        Command::ListJobs { state } => commands::list_jobs(&store, state).await,
        Command::Show { job_id } => commands::show(&store, &job_id).await,
        Command::Status => commands::status(&store).await,
        Command::Metrics => commands::metrics(&store).await,
        Command::Worker {
            count,
            lease_seconds,
            backoff_base,
            poll_interval,
        } => commands::worker(store, count, lease_seconds, backoff_base, poll_interval).await,
        Command::Dlq(cmd) => commands::dlq(&store, cmd).await,
        Command::Config(cmd) => commands::config(&store, cmd).await,
        Command::Rescue(cmd) => commands::rescue(&store, cmd).await,
    }
}
