//! The per-worker driver alternating claim → execute → settle, with
//! interruptible idle polling and cooperative shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::executor::Executor;
use crate::model::Outcome;
use crate::store::JobStore;

/// A broadcast-capable cooperative stop signal. Cloning a [`Shutdown`]
/// gives every worker its own receiver of the same underlying flag;
/// [`ShutdownHandle::trigger`] flips it for everyone at once.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> (ShutdownHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownHandle { tx }, Shutdown { rx })
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleeps for `duration` unless the stop signal is raised first, in
    /// which case it returns immediately.
    pub async fn interruptible_sleep(&mut self, duration: Duration) {
        let mut deadline = Box::pin(tokio::time::sleep(duration));
        tokio::select! {
            _ = &mut deadline => {}
            _ = self.rx.changed() => {}
        }
    }
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct WorkerLoop {
    store: Arc<dyn JobStore>,
    executor: Executor,
    worker_id: String,
    lease_seconds: i64,
    backoff_base: i64,
    poll_interval: Duration,
}

impl WorkerLoop {
    pub fn new(
        store: Arc<dyn JobStore>,
        worker_id: String,
        lease_seconds: i64,
        backoff_base: i64,
        poll_interval_seconds: f64,
    ) -> Self {
        Self {
            store,
            executor: Executor::new(),
            worker_id,
            lease_seconds,
            backoff_base,
            poll_interval: Duration::from_secs_f64(poll_interval_seconds.max(0.0)),
        }
    }

    /// The control loop:
    ///
    /// ```text
    /// while not stop_signal.raised:
    ///     job ← claim(worker_id, lease_seconds, now)
    ///     if job is none:
    ///         wait(poll_interval) interruptible by stop_signal
    ///     else:
    ///         outcome ← execute(job)
    ///         settle(job, outcome, now)
    /// ```
    ///
    /// Jobs are never killed on shutdown: a stop signal raised while a
    /// job is executing is only observed on the next loop iteration,
    /// after settlement.
    pub async fn run(&self, mut shutdown: Shutdown) {
        info!(worker_id = %self.worker_id, "worker starting");
        while !shutdown.is_raised() {
            match self.store.claim(&self.worker_id, self.lease_seconds, Utc::now()).await {
                Ok(Some(job)) => {
                    debug!(worker_id = %self.worker_id, job_id = %job.id, "claimed job");
                    let outcome = self.executor.execute(&job).await;
                    self.settle_with_retry(&job.id, job.attempts, job.max_retries, outcome).await;
                }
                Ok(None) => {
                    shutdown.interruptible_sleep(self.poll_interval).await;
                }
                Err(e) => {
                    // A failed claim attempt is treated the same as no
                    // job being ready; the loop continues after the
                    // normal poll interval rather than tearing down the
                    // worker over a transient store error.
                    warn!(worker_id = %self.worker_id, error = %e, "claim failed");
                    shutdown.interruptible_sleep(self.poll_interval).await;
                }
            }
        }
        info!(worker_id = %self.worker_id, "worker stopped");
    }

    /// Retries a failed settlement with bounded backoff. Giving up here
    /// means abandoning this one settlement and letting the lease expire
    /// so a rescue pass can reclaim the job, rather than tearing down
    /// the whole worker task, which would otherwise strand every other
    /// job it might still serve.
    async fn settle_with_retry(
        &self,
        job_id: &str,
        attempts_before: i64,
        max_retries: i64,
        outcome: Outcome,
    ) {
        const MAX_SETTLE_ATTEMPTS: u32 = 5;
        let mut backoff = Duration::from_millis(50);

        for attempt in 1..=MAX_SETTLE_ATTEMPTS {
            let result = self
                .store
                .settle(
                    job_id,
                    attempts_before,
                    max_retries,
                    outcome.clone(),
                    self.backoff_base,
                    Utc::now(),
                )
                .await;

            match result {
                Ok(()) => return,
                Err(e) if e.is_transient() && attempt < MAX_SETTLE_ATTEMPTS => {
                    warn!(
                        worker_id = %self.worker_id, job_id, attempt, error = %e,
                        "settle failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    log_settle_failure(&self.worker_id, job_id, &e);
                    return;
                }
            }
        }
    }
}

fn log_settle_failure(worker_id: &str, job_id: &str, error: &QueueError) {
    warn!(
        worker_id, job_id, %error,
        "settle failed after exhausting retries; lease will expire and rescue will reclaim the job"
    );
}
