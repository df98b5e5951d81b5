//! Runs a claimed job's command as a child process, capturing combined
//! output and enforcing a per-attempt wall-clock timeout. Never touches
//! the store — it only reports what happened so the caller can settle it.

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::Duration;

use crate::model::{Job, Outcome};

/// Reserved for a command that never got a real exit status at all — the
/// shell could not be spawned, or reaping the child failed outright. Kept
/// distinct from `-1`, which is the dedicated timeout sentinel
/// ([`Outcome::TimedOut`]), and from the negative signal numbers used when
/// a child is killed by a signal, so a caller can tell the three apart by
/// inspecting `exit_code` alone.
const NO_EXIT_STATUS: i64 = i64::MIN;

/// Runs `job.command` through `sh -c`. Combined stdout+stderr become
/// `output`; stderr alone becomes `error` on a nonzero exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, job: &Job) -> Outcome {
        let start = Instant::now();

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&job.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                // The OS could not even start the command (missing
                // binary, permission denied, ...). Still an ordinary
                // failure rather than a distinct error class, but it
                // needs its own sentinel: a job dead-lettered with
                // `exit_code=-1` should unambiguously mean "timed out".
                return Outcome::Failed {
                    exit_code: NO_EXIT_STATUS,
                    output: String::new(),
                    error: e.to_string(),
                    duration_seconds: start.elapsed().as_secs_f64(),
                };
            }
        };

        let mut stdout = child.stdout.take().expect("piped stdout");
        let mut stderr = child.stderr.take().expect("piped stderr");
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();

        // Borrows `child`, `out_buf`, `err_buf` for the duration of the
        // wait. On timeout this future is dropped (ending the borrows)
        // so `child` remains available to kill below.
        let io_fut = async {
            let (r1, r2) = tokio::join!(
                stdout.read_to_end(&mut out_buf),
                stderr.read_to_end(&mut err_buf),
            );
            r1?;
            r2?;
            child.wait().await
        };

        let status = match job.timeout_seconds {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs.max(0) as u64), io_fut).await {
                    Ok(Ok(status)) => Ok(Some(status)),
                    Ok(Err(e)) => Err(e),
                    Err(_elapsed) => Ok(None),
                }
            }
            None => io_fut.await.map(Some),
        };

        let duration_seconds = start.elapsed().as_secs_f64();

        match status {
            Ok(Some(status)) => {
                let stdout = String::from_utf8_lossy(&out_buf);
                let stderr = String::from_utf8_lossy(&err_buf);
                let combined = format!("{stdout}{stderr}");
                match status.code() {
                    Some(0) => Outcome::Completed {
                        exit_code: 0,
                        output: combined,
                        duration_seconds,
                    },
                    Some(code) => Outcome::Failed {
                        exit_code: code as i64,
                        output: combined,
                        error: stderr.into_owned(),
                        duration_seconds,
                    },
                    // Signal-terminated: no exit code, but the kernel
                    // tells us which signal, so report it the way a
                    // shell would (negative signal number) rather than
                    // colliding with the timeout sentinel.
                    None => {
                        let signal = status.signal().unwrap_or(0) as i64;
                        Outcome::Failed {
                            exit_code: -signal,
                            output: combined,
                            error: format!("terminated by signal {signal}"),
                            duration_seconds,
                        }
                    }
                }
            }
            // Timed out: kill the child, discard whatever partial
            // output was captured, and report the sentinel. The Settler
            // maps this to exit_code=-1, reserved exclusively for timeout.
            Ok(None) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                Outcome::TimedOut { duration_seconds }
            }
            // The wait itself failed (e.g. I/O error reaping the
            // child) — treated the same as any other failure to
            // produce a result, with the same no-real-exit-code sentinel
            // as a spawn failure.
            Err(e) => Outcome::Failed {
                exit_code: NO_EXIT_STATUS,
                output: String::new(),
                error: e.to_string(),
                duration_seconds,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobState;
    use chrono::Utc;

    fn job_with(command: &str, timeout_seconds: Option<i64>) -> Job {
        let now = Utc::now();
        Job {
            id: "t".into(),
            command: command.into(),
            state: JobState::Processing,
            attempts: 0,
            max_retries: 3,
            priority: 0,
            run_at: None,
            next_run_at: None,
            timeout_seconds,
            worker_id: Some("w".into()),
            lease_until: None,
            started_at: Some(now),
            finished_at: None,
            exit_code: None,
            error: None,
            output: None,
            duration_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn successful_command_completes() {
        let outcome = Executor::new().execute(&job_with("true", None)).await;
        assert!(matches!(outcome, Outcome::Completed { exit_code: 0, .. }));
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_stderr() {
        let outcome = Executor::new()
            .execute(&job_with("echo oops 1>&2; exit 7", None))
            .await;
        match outcome {
            Outcome::Failed {
                exit_code, error, ..
            } => {
                assert_eq!(exit_code, 7);
                assert!(error.contains("oops"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn captures_combined_stdout_and_stderr() {
        let outcome = Executor::new()
            .execute(&job_with("echo out; echo err 1>&2", None))
            .await;
        match outcome {
            Outcome::Completed { output, .. } => {
                assert!(output.contains("out"));
                assert!(output.contains("err"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let outcome = Executor::new()
            .execute(&job_with("sleep 5", Some(1)))
            .await;
        assert!(matches!(outcome, Outcome::TimedOut { .. }));
    }

    #[tokio::test]
    async fn signal_terminated_child_reports_negative_signal_number() {
        let outcome = Executor::new()
            .execute(&job_with("kill -9 $$", None))
            .await;
        match outcome {
            Outcome::Failed { exit_code, .. } => assert_eq!(exit_code, -9),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
