//! # queuectl-core
//!
//! The claim-execute-settle engine: a lease-based, priority-aware,
//! schedule-aware dispatcher that moves shell-command jobs through a
//! state machine under concurrent workers sharing one persistent store.
//!
//! This crate is storage-backend-agnostic — it defines the `Job`/`Config`
//! data model, the [`JobStore`] contract that a concrete backend must
//! satisfy, the subprocess [`Executor`], and the [`WorkerLoop`] that
//! drives Claimer → Executor → Settler. See `queuectl-sqlite` for the
//! shipped SQLite implementation.
//!
//! ## Guarantees
//!
//! - At-least-once execution: a job whose lease expires mid-attempt may
//!   be re-executed by another worker.
//! - Mutual exclusion is enforced entirely by the store's lease +
//!   conditional-update discipline; this crate holds no in-process locks
//!   across workers sharing a store.
//! - Terminal states (`completed`, `dead`) are absorbing under the
//!   normal worker path; only administrative `dlq_retry` or `rescue`
//!   reopens a row.
//!
//! ## What this crate is not
//!
//! - Not an exactly-once system.
//! - Not a cron/recurring scheduler.
//! - Not a log-streaming or output-tailing system — output is captured
//!   in full at completion.

pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod store;
pub mod worker;

pub use config::EngineConfig;
pub use error::{QueueError, Result};
pub use executor::Executor;
pub use model::{ConfigEntry, Job, JobState, NewJob, Outcome};
pub use store::{JobStore, Metrics};
pub use worker::{Shutdown, ShutdownHandle, WorkerLoop};
