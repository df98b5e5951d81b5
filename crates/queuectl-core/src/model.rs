//! The `Job` and `Config` entities from the data model, plus the small
//! value types (`JobState`, `Outcome`) that thread through the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of the `jobs` relation.
///
/// Field names and types follow the persisted schema directly — there is
/// no separate "domain model vs row" split here, since every field is
/// meaningful to callers (the CLI, tests) as well as to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: i64,
    pub priority: i64,
    pub run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub timeout_seconds: Option<i64>,
    pub worker_id: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i64>,
    pub error: Option<String>,
    pub output: Option<String>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `state` column. `Completed` and `Dead` are absorbing terminals under
/// the normal worker path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Failed,
    Completed,
    Dead,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Failed => "failed",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "failed" => Ok(JobState::Failed),
            "completed" => Ok(JobState::Completed),
            "dead" => Ok(JobState::Dead),
            other => Err(format!("unrecognized job state: {other}")),
        }
    }
}

/// Input to `JobStore::insert` — the submission-time fields of a job.
/// The store fills in `state`, `attempts`, `created_at`, `updated_at`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub command: String,
    pub max_retries: i64,
    pub priority: i64,
    pub timeout_seconds: Option<i64>,
    pub run_at: Option<DateTime<Utc>>,
}

/// What the executor reports back to be settled. Not an error type: a
/// nonzero exit or a timeout are ordinary business outcomes, not
/// failures of the executor itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed {
        exit_code: i64,
        output: String,
        duration_seconds: f64,
    },
    Failed {
        exit_code: i64,
        output: String,
        error: String,
        duration_seconds: f64,
    },
    TimedOut {
        duration_seconds: f64,
    },
}

impl Outcome {
    pub fn duration_seconds(&self) -> f64 {
        match self {
            Outcome::Completed {
                duration_seconds, ..
            }
            | Outcome::Failed {
                duration_seconds, ..
            }
            | Outcome::TimedOut { duration_seconds } => *duration_seconds,
        }
    }
}

/// A row of the `config` relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
