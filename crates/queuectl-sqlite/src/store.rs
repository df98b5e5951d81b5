//! `SqliteStore` — the one shipped [`JobStore`] implementation.
//!
//! The claim transaction is the load-bearing piece: it opens with
//! `BEGIN IMMEDIATE` (acquiring SQLite's RESERVED lock up front, so the
//! SELECT→UPDATE window is never exposed to a concurrent writer), selects
//! the single highest-priority/oldest ready candidate, and re-checks the
//! lease predicate on the UPDATE itself as a guard — correct even if
//! isolation were weaker than SQLite actually provides.
//!
//! Settlement and rescue don't need `BEGIN IMMEDIATE`: their writes are
//! single conditional UPDATEs (or, for the failure path, a read-then-write
//! inside one transaction keyed by `id`, which never contends with the
//! claim transaction for a *different* row).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use queuectl_core::error::{QueueError, Result};
use queuectl_core::model::{ConfigEntry, Job, JobState, NewJob, Outcome};
use queuectl_core::store::{JobStore, Metrics};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_job(
        executor: impl sqlx::SqliteExecutor<'_>,
        id: &str,
    ) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        row.map(row_to_job).transpose()
    }
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job> {
    let state: String = row.try_get("state")?;
    let state: JobState = state
        .parse()
        .map_err(|e| QueueError::SchemaMismatch(format!("jobs.state: {e}")))?;

    Ok(Job {
        id: row.try_get("id")?,
        command: row.try_get("command")?,
        state,
        attempts: row.try_get("attempts")?,
        max_retries: row.try_get("max_retries")?,
        priority: row.try_get("priority")?,
        run_at: row.try_get("run_at")?,
        next_run_at: row.try_get("next_run_at")?,
        timeout_seconds: row.try_get("timeout_seconds")?,
        worker_id: row.try_get("worker_id")?,
        lease_until: row.try_get("lease_until")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        exit_code: row.try_get("exit_code")?,
        error: row.try_get("error")?,
        output: row.try_get("output")?,
        duration_seconds: row.try_get("duration_seconds")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Starts a `BEGIN IMMEDIATE` transaction. `sqlx::Pool::begin` issues a
/// plain `BEGIN` (deferred), which would only acquire SQLite's write lock
/// lazily on the first write — too late to prevent two claimers both
/// passing their SELECT before either UPDATEs. `begin_with` lets us pick
/// the statement SQLite actually needs here.
async fn begin_immediate(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    let tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    Ok(tx)
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn insert(&self, job: NewJob, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, command, state, attempts, max_retries, priority,
                run_at, timeout_seconds, created_at, updated_at
            ) VALUES (?, ?, 'pending', 0, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.max_retries)
        .bind(job.priority)
        .bind(job.run_at)
        .bind(job.timeout_seconds)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(QueueError::DuplicateId(job.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn claim(
        &self,
        worker_id: &str,
        lease_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let lease_until = now + chrono::Duration::seconds(lease_seconds);
        let mut tx = begin_immediate(&self.pool).await?;

        let candidate = sqlx::query(
            r#"
            SELECT id FROM jobs
            WHERE (
                state = 'pending'
                OR (state = 'failed' AND next_run_at IS NOT NULL AND next_run_at <= ?)
            )
            AND (run_at IS NULL OR run_at <= ?)
            AND (lease_until IS NULL OR lease_until <= ?)
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };
        let id: String = row.try_get("id")?;

        // Guard predicate re-checked here even though `BEGIN IMMEDIATE`
        // already serialized us against other writers: it is what makes
        // the claim correct even under weaker isolation, and it costs
        // nothing extra in the common case.
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'processing',
                worker_id = ?,
                lease_until = ?,
                started_at = COALESCE(started_at, ?),
                updated_at = ?
            WHERE id = ? AND (lease_until IS NULL OR lease_until <= ?)
            "#,
        )
        .bind(worker_id)
        .bind(lease_until)
        .bind(now)
        .bind(now)
        .bind(&id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != 1 {
            tx.commit().await?;
            return Ok(None);
        }

        let job = Self::fetch_job(&mut *tx, &id).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn settle(
        &self,
        job_id: &str,
        attempts_before: i64,
        max_retries: i64,
        outcome: Outcome,
        backoff_base: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match outcome {
            Outcome::Completed {
                exit_code,
                output,
                duration_seconds,
            } => {
                // Success does not increment `attempts` — a clean first
                // try is distinguishable from one that needed retries.
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = 'completed', exit_code = ?, error = NULL, output = ?,
                        lease_until = NULL, finished_at = ?, updated_at = ?, duration_seconds = ?
                    WHERE id = ?
                    "#,
                )
                .bind(exit_code)
                .bind(output)
                .bind(now)
                .bind(now)
                .bind(duration_seconds)
                .bind(job_id)
                .execute(&self.pool)
                .await?;
                Ok(())
            }
            Outcome::Failed {
                exit_code,
                output,
                error,
                duration_seconds,
            } => {
                self.settle_failure(
                    job_id,
                    attempts_before,
                    max_retries,
                    exit_code,
                    Some(output),
                    error,
                    duration_seconds,
                    backoff_base,
                    now,
                )
                .await
            }
            Outcome::TimedOut { duration_seconds } => {
                self.settle_failure(
                    job_id,
                    attempts_before,
                    max_retries,
                    -1,
                    None,
                    "timeout".to_string(),
                    duration_seconds,
                    backoff_base,
                    now,
                )
                .await
            }
        }
    }

    async fn rescue_leases(
        &self,
        older_than_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let cutoff = now - chrono::Duration::seconds(older_than_seconds);

        let rows = sqlx::query(
            r#"
            SELECT id FROM jobs
            WHERE state = 'processing' AND lease_until IS NOT NULL AND lease_until <= ?
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows
            .into_iter()
            .map(|r| r.try_get::<String, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        if ids.is_empty() {
            return Ok(ids);
        }

        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "UPDATE jobs SET state='pending', worker_id=NULL, lease_until=NULL, updated_at=? \
             WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(now);
        for id in &ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;

        tracing::info!(count = ids.len(), "rescued expired leases");
        Ok(ids)
    }

    async fn dlq_retry(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET state='pending', attempts=0, error=NULL, next_run_at=NULL,
                worker_id=NULL, lease_until=NULL, updated_at=?
            WHERE id=? AND state='dead'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected == 1)
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get::<String, _>("value")).transpose()?)
    }

    async fn set_config(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO config (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_config(&self) -> Result<Vec<ConfigEntry>> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM config ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(ConfigEntry {
                    key: r.try_get("key")?,
                    value: r.try_get("value")?,
                    updated_at: r.try_get("updated_at")?,
                })
            })
            .collect()
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Self::fetch_job(&self.pool, id).await
    }

    async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let rows = match state {
            Some(state) => {
                sqlx::query("SELECT * FROM jobs WHERE state = ? ORDER BY created_at")
                    .bind(state.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(row_to_job).collect()
    }

    async fn status_counts(&self) -> Result<Vec<(JobState, i64)>> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS count FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                let state: String = r.try_get("state")?;
                let state = state
                    .parse()
                    .map_err(|e| QueueError::SchemaMismatch(format!("jobs.state: {e}")))?;
                Ok((state, r.try_get::<i64, _>("count")?))
            })
            .collect()
    }

    async fn metrics(&self) -> Result<Metrics> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM jobs WHERE state='completed') AS completed,
                (SELECT COUNT(*) FROM jobs WHERE state='failed') AS failed,
                (SELECT COUNT(*) FROM jobs WHERE state='dead') AS dead,
                (SELECT AVG(duration_seconds) FROM jobs WHERE state='completed' AND duration_seconds IS NOT NULL) AS avg_duration
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Metrics {
            completed: row.try_get("completed")?,
            failed: row.try_get("failed")?,
            dead: row.try_get("dead")?,
            average_duration_seconds: row.try_get("avg_duration")?,
        })
    }
}

impl SqliteStore {
    #[allow(clippy::too_many_arguments)]
    async fn settle_failure(
        &self,
        job_id: &str,
        attempts_before: i64,
        max_retries: i64,
        exit_code: i64,
        output: Option<String>,
        error: String,
        duration_seconds: f64,
        backoff_base: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let attempts = attempts_before + 1;

        if attempts >= max_retries {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state='dead', attempts=?, exit_code=?, error=?, output=?,
                    lease_until=NULL, finished_at=?, updated_at=?, duration_seconds=?
                WHERE id=?
                "#,
            )
            .bind(attempts)
            .bind(exit_code)
            .bind(&error)
            .bind(output)
            .bind(now)
            .bind(now)
            .bind(duration_seconds)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        } else {
            let next_run_at =
                queuectl_core::backoff::next_run_at(now, backoff_base, attempts);
            sqlx::query(
                r#"
                UPDATE jobs
                SET state='failed', attempts=?, exit_code=?, error=?, output=?,
                    next_run_at=?, lease_until=NULL, updated_at=?, duration_seconds=?
                WHERE id=?
                "#,
            )
            .bind(attempts)
            .bind(exit_code)
            .bind(&error)
            .bind(output)
            .bind(next_run_at)
            .bind(now)
            .bind(duration_seconds)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}
