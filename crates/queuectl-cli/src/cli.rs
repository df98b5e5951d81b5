//! Argument parsing. Subcommand set and flags mirror the original
//! `cli.py` exactly (`enqueue`, `list`, `show`, `status`, `metrics`,
//! `worker`, `dlq list|retry`, `config set|get|list`, `rescue leases`).

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "queuectl", author, version, about = "A persistent shell-command job queue")]
pub struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, global = true, default_value = "queuectl.db")]
    pub db: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a new job to the queue.
    Enqueue {
        #[arg(long)]
        id: String,
        #[arg(long)]
        command: String,
        /// Overrides the `default_max_retries` config value if set.
        #[arg(long)]
        max_retries: Option<i64>,
        #[arg(long)]
        timeout_seconds: Option<i64>,
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// ISO-8601 UTC timestamp, or `+N` for N seconds from now.
        #[arg(long)]
        run_at: Option<String>,
    },

    /// List jobs in the queue.
    #[command(name = "list")]
    ListJobs {
        #[arg(long)]
        state: Option<String>,
    },

    /// Show details of a single job.
    Show { job_id: String },

    /// Show a summary of job states.
    Status,

    /// Show job metrics (completed/failed/dead counts, average duration).
    Metrics,

    /// Start one or more worker loops; stops on Ctrl-C.
    Worker {
        #[arg(long, default_value_t = 1)]
        count: u32,
        #[arg(long)]
        lease_seconds: Option<i64>,
        #[arg(long)]
        backoff_base: Option<i64>,
        #[arg(long)]
        poll_interval: Option<f64>,
    },

    /// Dead-letter queue operations.
    #[command(subcommand)]
    Dlq(DlqCommand),

    /// Runtime configuration for workers and defaults.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Recovery tools for stuck jobs.
    #[command(subcommand)]
    Rescue(RescueCommand),
}

#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List jobs currently dead-lettered.
    List,
    /// Move a dead-lettered job back to pending.
    Retry { job_id: String },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Set { key: String, value: String },
    Get {
        key: String,
        #[arg(long)]
        default: Option<String>,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum RescueCommand {
    /// Clear leases older than the given threshold and return those jobs to pending.
    Leases {
        #[arg(long, default_value_t = 60)]
        older_than_seconds: i64,
    },
}
