//! The `JobStore` contract — the storage-backend-agnostic half of the
//! engine.
//!
//! This trait captures exactly the operations a claim/settle/rescue job
//! queue needs from its backing store, plus the small administrative
//! surface (dead-letter retry, config, read-only listings) the CLI needs
//! on top. A concrete implementation (`queuectl-sqlite::SqliteStore`) is
//! responsible for making each operation atomic under concurrent
//! callers; this trait only describes *what*, not *how*.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{ConfigEntry, Job, JobState, NewJob, Outcome};

/// Aggregate counts for `queuectl status`/`metrics` — consumed by the CLI,
/// not load-bearing for the engine's correctness, but naturally lives on
/// the same trait as the rest of the read surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub completed: i64,
    pub failed: i64,
    pub dead: i64,
    pub average_duration_seconds: Option<f64>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `pending` job. Fails with `QueueError::DuplicateId`
    /// if `id` already exists.
    async fn insert(&self, job: NewJob, now: DateTime<Utc>) -> Result<()>;

    /// Atomically selects and leases at most one ready job.
    async fn claim(
        &self,
        worker_id: &str,
        lease_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>>;

    /// Commits the terminal or retry transition for `outcome` against
    /// the job identified by `job_id`. `backoff_base` is engine
    /// configuration, not a job field, and is supplied by the caller
    /// (the worker loop) at settle time.
    async fn settle(
        &self,
        job_id: &str,
        attempts_before: i64,
        max_retries: i64,
        outcome: Outcome,
        backoff_base: i64,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns the ids of jobs whose lease is older than
    /// `older_than_seconds` past expiry, reverting each to `pending`.
    async fn rescue_leases(&self, older_than_seconds: i64, now: DateTime<Utc>)
        -> Result<Vec<String>>;

    /// Administrative retry. No-op (returns `false`) unless the job is
    /// currently `dead`.
    async fn dlq_retry(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn get_config(&self, key: &str) -> Result<Option<String>>;
    async fn set_config(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()>;
    async fn list_config(&self) -> Result<Vec<ConfigEntry>>;

    async fn get_job(&self, id: &str) -> Result<Option<Job>>;
    async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>>;
    async fn status_counts(&self) -> Result<Vec<(JobState, i64)>>;
    async fn metrics(&self) -> Result<Metrics>;
}
