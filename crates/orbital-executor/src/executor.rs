// SPDX-License-Identifier: MIT

//! Spawns the agent subprocess and aggregates its streamed output
//! (spec.md §4.5).

use crate::config::ExecutorConfig;
use crate::env;
use async_trait::async_trait;
use orbital_parser::EventParser;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn agent subprocess: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("agent subprocess exited with status {code:?}: {stderr_tail}")]
    NonZeroExit {
        code: Option<i32>,
        stderr_tail: String,
    },
    #[error("agent subprocess cancelled")]
    Cancelled,
    #[error("agent subprocess timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("io error reading agent subprocess output: {0}")]
    Io(#[source] std::io::Error),
}

/// Aggregated result of one subprocess invocation (spec.md §4.5).
#[derive(Debug, Clone, Default)]
pub struct ExecutorOutcome {
    pub raw_output: String,
    pub cost_usd: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub duration_ms: u64,
}

/// Sink receiving unmodified stdout lines as they arrive, for live
/// streaming to subscribers (spec.md §4.5, §4.9).
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Run one agent subprocess invocation to completion.
    ///
    /// `cancel` is observed between output lines; when it flips `true` the
    /// child is killed and `Err(ExecutorError::Cancelled)` is returned.
    async fn run(
        &self,
        config: &ExecutorConfig,
        prompt: &str,
        is_gate: bool,
        sink: Option<OutputSink>,
        cancel: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError>;
}

/// Production executor spawning the real agent binary.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentExecutor for ProcessExecutor {
    async fn run(
        &self,
        config: &ExecutorConfig,
        prompt: &str,
        is_gate: bool,
        sink: Option<OutputSink>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        if *cancel.borrow() {
            return Err(ExecutorError::Cancelled);
        }

        let mut args = config.build_args(is_gate);
        args.push("-p".to_string());
        args.push(prompt.to_string());

        let mut cmd = Command::new(&config.command);
        cmd.args(&args)
            .current_dir(&config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(
            command = %config.command,
            working_dir = %config.working_dir.display(),
            is_gate,
            "spawning agent subprocess"
        );

        let mut child = cmd.spawn().map_err(ExecutorError::Spawn)?;
        let stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");

        // Drain stderr concurrently with the stdout loop below: if the
        // child fills its stderr pipe before closing stdout, reading the
        // two serially would deadlock the child on a full pipe while this
        // task waits on a stdout EOF that never comes.
        let stderr_task: tokio::task::JoinHandle<Vec<u8>> = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut reader = BufReader::new(stdout).lines();
        let mut parser = EventParser::new();
        let mut raw_output = String::new();

        let timeout = env::run_timeout();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        let _ = child.kill().await;
                        return Err(ExecutorError::Cancelled);
                    }
                }

                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(ExecutorError::Timeout(timeout));
                }

                line = reader.next_line() => {
                    match line.map_err(ExecutorError::Io)? {
                        Some(line) => {
                            if let Some(sink) = &sink {
                                sink(&line);
                            }
                            parser.feed_line(&line);
                            for warning in parser.drain_warnings() {
                                tracing::warn!(%warning, "agent stream parser warning");
                            }
                            raw_output.push_str(&line);
                            raw_output.push('\n');
                        }
                        None => break,
                    }
                }
            }
        }

        let status = child.wait().await.map_err(ExecutorError::Io)?;
        let stderr_buf = stderr_task.await.unwrap_or_default();
        let stderr_text = String::from_utf8_lossy(&stderr_buf);

        if !status.success() {
            let tail_bytes = env::stderr_tail_bytes();
            let stderr_tail = tail_of(&stderr_text, tail_bytes);
            return Err(ExecutorError::NonZeroExit {
                code: status.code(),
                stderr_tail,
            });
        }

        if let Err(err) = parser.validate() {
            tracing::warn!(error = %err, "agent stream had no recognized events");
        }

        let stats = parser.stats();
        Ok(ExecutorOutcome {
            raw_output,
            cost_usd: stats.cost_usd,
            tokens_in: stats.tokens_in,
            tokens_out: stats.tokens_out,
            duration_ms: stats.duration_ms,
        })
    }
}

fn tail_of(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        s.to_string()
    } else {
        let start = s.len() - max_bytes;
        let boundary = (start..s.len())
            .find(|&i| s.is_char_boundary(i))
            .unwrap_or(start);
        s[boundary..].to_string()
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
