//! End-to-end worker behavior: a real `WorkerLoop` driving a real
//! `SqliteStore` backed by a temp-file database, the way
//! `rust-srec`'s `tests/sqlite_claim_stress.rs` drives its job repository
//! against a tempfile-backed pool rather than mocking the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use queuectl_core::model::{Job, JobState, NewJob};
use queuectl_core::store::JobStore;
use queuectl_core::worker::{Shutdown, WorkerLoop};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> Arc<dyn JobStore> {
    let path = dir.path().join("queuectl.db");
    let pool = queuectl_sqlite::connect(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    queuectl_sqlite::run_migrations(&pool).await.unwrap();
    Arc::new(queuectl_sqlite::SqliteStore::new(pool))
}

fn new_job(id: &str, command: &str) -> NewJob {
    NewJob {
        id: id.to_string(),
        command: command.to_string(),
        max_retries: 3,
        priority: 0,
        timeout_seconds: None,
        run_at: None,
    }
}

/// Polls `get_job` until it reaches a terminal state or the deadline
/// passes, without coupling the test to the worker's own poll interval.
async fn wait_for_terminal(store: &Arc<dyn JobStore>, id: &str, deadline: Duration) -> Job {
    let start = tokio::time::Instant::now();
    loop {
        if let Some(job) = store.get_job(id).await.unwrap() {
            if job.state.is_terminal() {
                return job;
            }
        }
        if start.elapsed() > deadline {
            panic!("job {id} did not reach a terminal state within {deadline:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A trivially-successful job completes on the first attempt with
/// `attempts=0` (success never increments attempts) and a populated
/// `finished_at`/`duration_seconds`.
#[tokio::test]
async fn happy_path_completes_on_first_attempt() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.insert(new_job("a", "true"), Utc::now()).await.unwrap();

    let (handle, shutdown) = Shutdown::new();
    let worker = WorkerLoop::new(store.clone(), "w1".into(), 30, 2, 0.05);
    let task = tokio::spawn(async move { worker.run(shutdown).await });

    let job = wait_for_terminal(&store, "a", Duration::from_secs(5)).await;
    handle.trigger();
    task.await.unwrap();

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.exit_code, Some(0));
    assert_eq!(job.attempts, 0);
    assert_eq!(job.output.as_deref(), Some(""));
    assert!(job.duration_seconds.unwrap() >= 0.0);
    assert!(job.finished_at.is_some());
}

/// `false` always fails; with `max_retries=2` the job is re-claimed once
/// (after a 1-second backoff since `backoff_base=1`) and then
/// dead-lettered.
#[tokio::test]
async fn exhausting_retries_dead_letters() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .insert(
            NewJob {
                max_retries: 2,
                ..new_job("c", "false")
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let (handle, shutdown) = Shutdown::new();
    let worker = WorkerLoop::new(store.clone(), "w1".into(), 30, 1, 0.05);
    let task = tokio::spawn(async move { worker.run(shutdown).await });

    let job = wait_for_terminal(&store, "c", Duration::from_secs(10)).await;
    handle.trigger();
    task.await.unwrap();

    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 2);
    assert_eq!(job.exit_code, Some(1));
}

/// `sleep 10` with `timeout_seconds=1` is killed by the executor; the
/// settlement sees it as a failure with the `-1`/`"timeout"` sentinel and,
/// since `max_retries=1`, dead-letters it on the first attempt.
#[tokio::test]
async fn timeout_dead_letters_with_sentinel() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .insert(
            NewJob {
                max_retries: 1,
                timeout_seconds: Some(1),
                ..new_job("d", "sleep 10")
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let (handle, shutdown) = Shutdown::new();
    let worker = WorkerLoop::new(store.clone(), "w1".into(), 30, 2, 0.05);
    let task = tokio::spawn(async move { worker.run(shutdown).await });

    let job = wait_for_terminal(&store, "d", Duration::from_secs(10)).await;
    handle.trigger();
    task.await.unwrap();

    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.exit_code, Some(-1));
    assert_eq!(job.error.as_deref(), Some("timeout"));
    assert!(job.duration_seconds.unwrap() < 5.0);
}

/// The first "worker" claims the job and then vanishes (its lease is
/// never renewed or settled, modeling a process that died mid-execution).
/// `rescue_leases` returns it to `pending` without touching `attempts`;
/// a fresh worker then claims and completes it.
#[tokio::test]
async fn rescue_recovers_an_abandoned_lease() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.insert(new_job("e", "true"), Utc::now()).await.unwrap();

    let claimed = store.claim("crashed-worker", 2, Utc::now()).await.unwrap().unwrap();
    assert_eq!(claimed.attempts, 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let rescued = store.rescue_leases(0, Utc::now()).await.unwrap();
    assert_eq!(rescued, vec!["e".to_string()]);

    let reverted = store.get_job("e").await.unwrap().unwrap();
    assert_eq!(reverted.state, JobState::Pending);
    assert_eq!(reverted.attempts, 0);
    assert!(reverted.worker_id.is_none());

    let (handle, shutdown) = Shutdown::new();
    let worker = WorkerLoop::new(store.clone(), "fresh-worker".into(), 30, 2, 0.05);
    let task = tokio::spawn(async move { worker.run(shutdown).await });

    let job = wait_for_terminal(&store, "e", Duration::from_secs(5)).await;
    handle.trigger();
    task.await.unwrap();

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 0);
}

/// A worker idling on an empty queue exits promptly once shutdown is
/// raised, rather than waiting out a full poll interval.
#[tokio::test]
async fn idle_worker_shuts_down_promptly() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let (handle, shutdown) = Shutdown::new();
    let worker = WorkerLoop::new(store, "w1".into(), 30, 2, 30.0);
    let task = tokio::spawn(async move { worker.run(shutdown).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.trigger();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("worker should stop well before its 30s poll interval elapses")
        .unwrap();
}
