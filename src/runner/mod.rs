//! Shell command execution engine
//!
//! Runs task commands through `sh` under a shared concurrency limit, either
//! line by line (default) or as a single generated batch script. A line
//! starting with `@` is best-effort: its failure is logged and ignored
//! instead of aborting the run.

mod script;
mod sink;

pub use script::BatchScript;
pub use sink::{BufferSink, LogSink, OutputSink};

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;

/// Execution failures surfaced to the dispatcher.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("command failed: {line}")]
    CommandFailed { line: String },

    #[error("can't prepare batch script: {0}")]
    PreparationFailed(#[source] std::io::Error),

    #[error("command timed out")]
    DeadlineExceeded,

    #[error("execution canceled")]
    Canceled,
}

/// A single command line with its suppression marker split off.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub command: &'a str,
    pub suppressed: bool,
}

/// Split the leading `@` best-effort marker from a command line.
pub fn parse_line(line: &str) -> ParsedLine<'_> {
    match line.strip_prefix('@') {
        Some(rest) => ParsedLine {
            command: rest.trim_start(),
            suppressed: true,
        },
        None => ParsedLine {
            command: line,
            suppressed: false,
        },
    }
}

/// Executes task commands with a system shell.
///
/// The limiter is owned by the runner and shared across all tasks: at most
/// `limit` subprocesses are alive at any instant, process-wide.
pub struct ShellRunner {
    batch_mode: bool,
    limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(batch_mode: bool, limit: usize, timeout: Duration) -> Self {
        Self {
            batch_mode,
            limiter: Arc::new(Semaphore::new(limit)),
            timeout,
        }
    }

    /// Run a task command, streaming combined stdout/stderr to `sink`.
    ///
    /// Blank commands succeed without taking a limiter permit. The permit is
    /// held as a drop guard for the whole execution, so it is released on
    /// every return path. Dropping the returned future (client disconnect,
    /// server shutdown) kills any spawned child via `kill_on_drop`.
    pub async fn run(&self, command: &str, sink: Arc<dyn OutputSink>) -> Result<(), RunError> {
        if command.trim().is_empty() {
            return Ok(());
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| RunError::Canceled)?;

        if self.batch_mode {
            self.run_batch(command, sink).await
        } else {
            self.run_lines(command, sink).await
        }
    }

    /// Stop accepting new executions; pending permit waiters get `Canceled`.
    pub fn shutdown(&self) {
        self.limiter.close();
    }

    /// Run each non-blank line as an independent `sh -c` invocation. The
    /// first failing non-suppressed line aborts the remaining lines.
    async fn run_lines(&self, command: &str, sink: Arc<dyn OutputSink>) -> Result<(), RunError> {
        for raw in command.lines() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let parsed = parse_line(raw);
            log::info!("execute {:?}", parsed.command);

            match run_shell(&["-c", parsed.command], sink.clone()).await {
                Ok(true) => {}
                Ok(false) if parsed.suppressed => {
                    log::warn!("suppressed failure of {:?}", parsed.command);
                }
                Ok(false) => {
                    return Err(RunError::CommandFailed {
                        line: parsed.command.to_string(),
                    });
                }
                Err(e) if parsed.suppressed => {
                    log::warn!("suppressed failure of {:?}: {}", parsed.command, e);
                }
                Err(e) => {
                    log::warn!("can't start {:?}: {}", parsed.command, e);
                    return Err(RunError::CommandFailed {
                        line: parsed.command.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run all lines as one generated script under the runner's own timeout.
    /// The deadline is re-rooted here: it does not inherit whatever budget
    /// the caller has left.
    async fn run_batch(&self, command: &str, sink: Arc<dyn OutputSink>) -> Result<(), RunError> {
        let script = BatchScript::prepare(command).map_err(RunError::PreparationFailed)?;
        let path = script.path().to_string_lossy().into_owned();
        log::info!("execute batch script {}", path);

        let result = tokio::time::timeout(self.timeout, run_shell(&[path.as_str()], sink)).await;
        script.remove();

        match result {
            Err(_) => Err(RunError::DeadlineExceeded),
            Ok(Err(e)) => {
                log::warn!("can't start batch script {}: {}", path, e);
                Err(RunError::CommandFailed {
                    line: command.to_string(),
                })
            }
            Ok(Ok(false)) => Err(RunError::CommandFailed {
                line: command.to_string(),
            }),
            Ok(Ok(true)) => Ok(()),
        }
    }
}

/// Spawn `sh` with the given arguments, pump stdout/stderr into the sink,
/// and report whether the process exited successfully. `Err` means the
/// process could not be started or awaited at all.
async fn run_shell(args: &[&str], sink: Arc<dyn OutputSink>) -> std::io::Result<bool> {
    let mut child = Command::new("sh")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, _, _) = tokio::join!(
        child.wait(),
        pump(stdout, sink.clone()),
        pump(stderr, sink.clone()),
    );
    Ok(status?.success())
}

/// Copy a child output stream into the sink until EOF.
async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, sink: Arc<dyn OutputSink>) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.write(&buf[..n]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn line_runner(limit: usize) -> ShellRunner {
        ShellRunner::new(false, limit, Duration::from_secs(10))
    }

    #[test]
    fn parse_line_splits_marker() {
        assert_eq!(
            parse_line("@rm -f stale.lock"),
            ParsedLine {
                command: "rm -f stale.lock",
                suppressed: true
            }
        );
        assert_eq!(
            parse_line("echo 123"),
            ParsedLine {
                command: "echo 123",
                suppressed: false
            }
        );
        assert_eq!(
            parse_line("@ echo spaced"),
            ParsedLine {
                command: "echo spaced",
                suppressed: true
            }
        );
    }

    #[tokio::test]
    async fn run_captures_output() {
        let runner = line_runner(4);
        let sink = Arc::new(BufferSink::new());
        runner.run("echo 123", sink.clone()).await.unwrap();
        assert_eq!(sink.contents(), "123\n");
    }

    #[tokio::test]
    async fn empty_command_is_noop() {
        // limit 0 proves no permit is taken for a blank command
        let runner = line_runner(0);
        let sink = Arc::new(BufferSink::new());
        runner.run("  \n ", sink.clone()).await.unwrap();
        assert_eq!(sink.contents(), "");
    }

    #[tokio::test]
    async fn failing_command_errors() {
        let runner = line_runner(4);
        let sink = Arc::new(BufferSink::new());
        let err = runner
            .run("no-such-command-xyz 123", sink.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::CommandFailed { .. }));
        assert!(sink.contents().contains("not found"));
    }

    #[tokio::test]
    async fn suppressed_failure_is_ok() {
        let runner = line_runner(4);
        let sink = Arc::new(BufferSink::new());
        runner
            .run("@no-such-command-xyz 123", sink.clone())
            .await
            .unwrap();
        assert!(sink.contents().contains("not found"));
    }

    #[tokio::test]
    async fn multiline_runs_in_order() {
        let runner = line_runner(4);
        let sink = Arc::new(BufferSink::new());
        runner.run("echo 123\necho 567\n", sink.clone()).await.unwrap();
        assert_eq!(sink.contents(), "123\n567\n");
    }

    #[tokio::test]
    async fn failing_line_aborts_remaining() {
        let runner = line_runner(4);
        let sink = Arc::new(BufferSink::new());
        let err = runner
            .run("echo 123\nno-such-command-xyz\necho 567", sink.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::CommandFailed { .. }));
        let out = sink.contents();
        assert!(out.contains("123\n"));
        assert!(!out.contains("567"));
    }

    #[tokio::test]
    async fn suppressed_line_continues() {
        let runner = line_runner(4);
        let sink = Arc::new(BufferSink::new());
        runner
            .run("echo 123\n@no-such-command-xyz\necho 567", sink.clone())
            .await
            .unwrap();
        let out = sink.contents();
        assert!(out.contains("123\n"));
        assert!(out.contains("567\n"));
    }

    #[tokio::test]
    async fn batch_runs_all_lines() {
        let runner = ShellRunner::new(true, 4, Duration::from_secs(10));
        let sink = Arc::new(BufferSink::new());
        runner.run("echo 123\necho 345", sink.clone()).await.unwrap();
        assert_eq!(sink.contents(), "123\n345\n");
    }

    #[tokio::test]
    async fn batch_suppressed_line_continues() {
        let runner = ShellRunner::new(true, 4, Duration::from_secs(10));
        let sink = Arc::new(BufferSink::new());
        runner
            .run("@no-such-command-xyz\necho done", sink.clone())
            .await
            .unwrap();
        assert!(sink.contents().contains("done"));
    }

    #[tokio::test]
    async fn batch_times_out() {
        let runner = ShellRunner::new(true, 4, Duration::from_millis(100));
        let sink = Arc::new(BufferSink::new());
        let start = Instant::now();
        let err = runner
            .run("sleep 1 && sleep 1 && echo 123\necho 345", sink)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn concurrency_limit_serializes() {
        let runner = Arc::new(line_runner(1));
        let sink = Arc::new(BufferSink::new());
        let start = Instant::now();
        let a = {
            let (runner, sink) = (runner.clone(), sink.clone());
            tokio::spawn(async move { runner.run("sleep 0.4", sink).await })
        };
        let b = {
            let (runner, sink) = (runner.clone(), sink.clone());
            tokio::spawn(async move { runner.run("sleep 0.4", sink).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(750));
    }

    #[tokio::test]
    async fn concurrency_limit_allows_parallel() {
        let runner = Arc::new(line_runner(2));
        let sink = Arc::new(BufferSink::new());
        let start = Instant::now();
        let a = {
            let (runner, sink) = (runner.clone(), sink.clone());
            tokio::spawn(async move { runner.run("sleep 0.4", sink).await })
        };
        let b = {
            let (runner, sink) = (runner.clone(), sink.clone());
            tokio::spawn(async move { runner.run("sleep 0.4", sink).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_millis(750));
    }

    #[tokio::test]
    async fn shutdown_cancels_pending() {
        let runner = line_runner(1);
        runner.shutdown();
        let sink = Arc::new(BufferSink::new());
        let err = runner.run("echo 123", sink).await.unwrap_err();
        assert!(matches!(err, RunError::Canceled));
    }
}
