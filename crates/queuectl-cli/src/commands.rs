//! Subcommand implementations. Each function owns exactly one
//! `cli.py` command's behavior, translated onto [`JobStore`] instead of
//! raw SQL.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use queuectl_core::model::{JobState, NewJob};
use queuectl_core::store::JobStore;
use queuectl_core::worker::{Shutdown, WorkerLoop};
use queuectl_core::EngineConfig;

use crate::cli::{ConfigCommand, DlqCommand, RescueCommand};

pub async fn enqueue(
    store: &Arc<dyn JobStore>,
    id: String,
    command: String,
    max_retries: Option<i64>,
    timeout_seconds: Option<i64>,
    priority: i64,
    run_at: Option<String>,
) -> Result<()> {
    let now = Utc::now();

    let max_retries = match max_retries {
        Some(n) => n,
        None => EngineConfig::load(store).await?.default_max_retries,
    };

    let run_at = match run_at {
        None => None,
        Some(raw) => Some(parse_run_at(&raw, now)?),
    };

    store
        .insert(
            NewJob {
                id: id.clone(),
                command,
                max_retries,
                priority,
                timeout_seconds,
                run_at,
            },
            now,
        )
        .await?;

    match run_at {
        Some(at) => println!("job {id} enqueued (priority={priority}, run_at={at})"),
        None => println!("job {id} enqueued (priority={priority})"),
    }
    Ok(())
}

fn parse_run_at(raw: &str, now: chrono::DateTime<Utc>) -> Result<chrono::DateTime<Utc>> {
    if let Some(delay) = raw.strip_prefix('+') {
        let seconds: i64 = delay
            .parse()
            .with_context(|| format!("invalid --run-at delay: {raw}"))?;
        Ok(now + chrono::Duration::seconds(seconds))
    } else {
        raw.parse()
            .with_context(|| format!("invalid --run-at timestamp: {raw}"))
    }
}

pub async fn list_jobs(store: &Arc<dyn JobStore>, state: Option<String>) -> Result<()> {
    let state = state.map(|s| s.parse::<JobState>()).transpose().map_err(anyhow::Error::msg)?;
    let jobs = store.list_jobs(state).await?;
    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }
    for job in jobs {
        let run_at = job.run_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
        let duration = job
            .duration_seconds
            .map(|d| format!("{d:.3}s"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{} | {} | state={} | attempts={}/{} | priority={} | run_at={} | duration={}",
            job.id, job.command, job.state, job.attempts, job.max_retries, job.priority, run_at, duration
        );
    }
    Ok(())
}

pub async fn show(store: &Arc<dyn JobStore>, job_id: &str) -> Result<()> {
    let Some(job) = store.get_job(job_id).await? else {
        println!("job {job_id} not found.");
        return Ok(());
    };

    println!("job {}", job.id);
    println!("  command: {}", job.command);
    println!("  state: {}", job.state);
    println!("  attempts: {}/{}", job.attempts, job.max_retries);
    println!("  priority: {}", job.priority);
    println!("  run_at: {}", job.run_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()));
    println!("  created: {}", job.created_at.to_rfc3339());
    println!("  started: {}", job.started_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()));
    println!("  finished: {}", job.finished_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()));
    match job.duration_seconds {
        Some(d) => println!("  duration: {d:.3}s"),
        None => println!("  duration: -"),
    }
    println!("  exit_code: {}", job.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()));
    println!("  error: {}", job.error.as_deref().unwrap_or("-"));
    println!("  output:");
    println!("{}", job.output.as_deref().unwrap_or("(no output)"));
    Ok(())
}

pub async fn status(store: &Arc<dyn JobStore>) -> Result<()> {
    let counts = store.status_counts().await?;
    if counts.is_empty() {
        println!("No jobs in the system yet.");
        return Ok(());
    }
    println!("job status summary:");
    for (state, count) in counts {
        println!("  {state}: {count}");
    }
    Ok(())
}

pub async fn metrics(store: &Arc<dyn JobStore>) -> Result<()> {
    let m = store.metrics().await?;
    println!("metrics summary");
    println!("  completed jobs: {}", m.completed);
    println!("  failed jobs: {}", m.failed);
    println!("  dead jobs: {}", m.dead);
    match m.average_duration_seconds {
        Some(d) => println!("  avg duration (s): {d:.3}"),
        None => println!("  avg duration: n/a"),
    }
    Ok(())
}

/// Starts `count` worker loops and blocks until Ctrl-C, then stops them
/// cooperatively and waits up to 5s per task (mirroring the original's
/// `t.join(timeout=5.0)` per worker thread).
pub async fn worker(
    store: Arc<dyn JobStore>,
    count: u32,
    lease_seconds: Option<i64>,
    backoff_base: Option<i64>,
    poll_interval: Option<f64>,
) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }

    let defaults = EngineConfig::load(&store).await?;
    let lease_seconds = lease_seconds.unwrap_or(defaults.lease_seconds);
    let backoff_base = backoff_base.unwrap_or(defaults.backoff_base);
    let poll_interval = poll_interval.unwrap_or(defaults.poll_interval);

    let (handle, shutdown) = Shutdown::new();
    let mut tasks = Vec::new();

    for i in 1..=count {
        let worker_id = format!("worker-{i}");
        println!(
            "starting {worker_id} (lease={lease_seconds}s, backoff_base={backoff_base}, poll={poll_interval}s)"
        );
        let loop_ = WorkerLoop::new(store.clone(), worker_id, lease_seconds, backoff_base, poll_interval);
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move { loop_.run(shutdown).await }));
    }

    println!("press Ctrl+C to stop workers gracefully.");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    println!("stopping workers...");
    handle.trigger();

    for task in tasks {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), task).await;
    }
    println!("workers stopped cleanly.");
    Ok(())
}

pub async fn dlq(store: &Arc<dyn JobStore>, cmd: DlqCommand) -> Result<()> {
    match cmd {
        DlqCommand::List => {
            let jobs = store.list_jobs(Some(JobState::Dead)).await?;
            if jobs.is_empty() {
                println!("No jobs in DLQ.");
                return Ok(());
            }
            for job in jobs {
                let run_at = job.run_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
                let duration = job
                    .duration_seconds
                    .map(|d| format!("{d:.3}s"))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{} | {} | attempts={} | priority={} | run_at={} | duration={} | error={}",
                    job.id,
                    job.command,
                    job.attempts,
                    job.priority,
                    run_at,
                    duration,
                    job.error.as_deref().unwrap_or("-")
                );
            }
        }
        DlqCommand::Retry { job_id } => {
            let moved = store.dlq_retry(&job_id, Utc::now()).await?;
            if moved {
                println!("job {job_id} moved back to pending.");
            } else {
                println!("job {job_id} is not dead; nothing to retry.");
            }
        }
    }
    Ok(())
}

pub async fn config(store: &Arc<dyn JobStore>, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Set { key, value } => {
            store.set_config(&key, &value, Utc::now()).await?;
            println!("config '{key}' set to '{value}'.");
        }
        ConfigCommand::Get { key, default } => match store.get_config(&key).await? {
            Some(value) => println!("{key}={value}"),
            None => match default {
                Some(default) => println!("{key}={default} (default)"),
                None => println!("{key} not set"),
            },
        },
        ConfigCommand::List => {
            let entries = store.list_config().await?;
            if entries.is_empty() {
                println!("No config keys set.");
                return Ok(());
            }
            for entry in entries {
                println!("{}={} (updated_at={})", entry.key, entry.value, entry.updated_at.to_rfc3339());
            }
        }
    }
    Ok(())
}

pub async fn rescue(store: &Arc<dyn JobStore>, cmd: RescueCommand) -> Result<()> {
    match cmd {
        RescueCommand::Leases { older_than_seconds } => {
            let ids = store.rescue_leases(older_than_seconds, Utc::now()).await?;
            if ids.is_empty() {
                println!("No expired leases found.");
            } else {
                println!("cleared leases and returned {} job(s) to pending: {}", ids.len(), ids.join(", "));
            }
        }
    }
    Ok(())
}
