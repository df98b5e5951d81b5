//! Connection setup and schema creation.
//!
//! Rather than replaying a staged migration history (there is none to
//! replay — this is a fresh implementation), the full `jobs`/`config`
//! column set is created directly via `CREATE TABLE IF NOT EXISTS`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use queuectl_core::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id                  TEXT PRIMARY KEY,
    command             TEXT NOT NULL,
    state               TEXT NOT NULL,
    attempts            INTEGER NOT NULL DEFAULT 0,
    max_retries         INTEGER NOT NULL DEFAULT 3,
    priority            INTEGER NOT NULL DEFAULT 0,
    run_at              TEXT,
    next_run_at         TEXT,
    timeout_seconds     INTEGER,
    worker_id           TEXT,
    lease_until         TEXT,
    started_at          TEXT,
    finished_at         TEXT,
    exit_code           INTEGER,
    error               TEXT,
    output              TEXT,
    duration_seconds    REAL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_claim_order ON jobs (priority DESC, created_at ASC);

CREATE TABLE IF NOT EXISTS config (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#;

/// Opens (creating if absent) the SQLite database at `path` in WAL
/// journal mode with `NORMAL` synchronous — concurrent readers,
/// serialized writers, matching `PRAGMA journal_mode=WAL; PRAGMA
/// synchronous=NORMAL;`.
///
/// `path` is either a `sqlite:`-scheme URI (`sqlite::memory:`,
/// `sqlite://relative/file.db`) or a bare filesystem path, which is how
/// the CLI's `--db` flag defaults (`queuectl.db`) — `SqliteConnectOptions`
/// only parses the former via [`FromStr`], so a bare path goes through
/// the `filename()` builder instead.
pub async fn connect(path: &str) -> Result<SqlitePool> {
    let options = if path.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(path)?
    } else {
        SqliteConnectOptions::new().filename(path)
    }
    .create_if_missing(true)
    .journal_mode(SqliteJournalMode::Wal)
    .synchronous(SqliteSynchronous::Normal)
    .busy_timeout(Duration::from_secs(5));

    // An in-memory SQLite database lives on its connection: a pool handing
    // out more than one connection for `:memory:` would scatter the schema
    // and every insert across unrelated, empty databases. Pin it to a
    // single connection so the whole pool shares the one database, which
    // is what the test suite (and `queuectl worker --db :memory:`, were
    // anyone to try it) actually needs.
    let max_connections = if path.contains(":memory:") { 1 } else { 8 };

    let pool = SqlitePoolOptions::new()
        // SQLite allows one writer at a time regardless of pool size;
        // a handful of connections lets readers (CLI `list`/`status`)
        // proceed without waiting behind a worker's claim transaction.
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // `SCHEMA` is several `;`-separated statements; `raw_sql` (rather
    // than `query`) is what sqlx expects for running a whole script.
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
