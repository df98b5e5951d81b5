//! SQLite-backed [`queuectl_core::JobStore`].
//!
//! Grounded on `seesaw-job-postgres`'s `PgJobStore` (claim/settle/rescue
//! shape, backoff-on-failure, dead-letter threshold) adapted from
//! Postgres's `FOR UPDATE SKIP LOCKED` to SQLite's single-writer model:
//! `BEGIN IMMEDIATE` takes the write lock up front instead of row-level
//! locking, since SQLite has no row locks to skip.

pub mod schema;
pub mod store;

pub use schema::{connect, run_migrations};
pub use store::SqliteStore;
