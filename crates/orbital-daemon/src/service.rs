// SPDX-License-Identifier: MIT

//! Unix-socket listener: accepts connections, dispatches requests to the
//! [`Runner`]/[`Registry`] pair (spec.md §4.11).

use crate::protocol::{self, ProtocolError, Request, Response};
use crate::registry::Registry;
use crate::runner::{Runner, RunnerConfig, RunnerError, StartRequest};
use orbital_core::{Session, SessionConfig, SessionId};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Shared context every connection handler dispatches against.
pub struct ServiceCtx {
    pub registry: Registry,
    pub runner: Arc<Runner>,
    pub request_timeout: std::time::Duration,
}

impl ServiceCtx {
    pub fn new(executor: Arc<dyn orbital_executor::AgentExecutor>, config: RunnerConfig) -> Self {
        let registry = Registry::new();
        let runner = Arc::new(Runner::new(registry.clone(), executor, config));
        Self {
            registry,
            runner,
            request_timeout: crate::env::ipc_timeout(),
        }
    }
}

/// Listener task accepting connections and spawning a handler per connection.
pub struct Listener {
    socket: UnixListener,
    ctx: Arc<ServiceCtx>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ServiceCtx>) -> Self {
        Self { socket, ctx }
    }

    /// Accept connections until the socket itself errors out. Each
    /// connection runs in its own task so a slow/streaming client never
    /// blocks others (spec.md §4.11).
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _addr)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {
                                    tracing::debug!("client disconnected");
                                }
                                ConnectionError::Protocol(ProtocolError::Timeout) => {
                                    tracing::warn!("connection timed out");
                                }
                                other => tracing::error!(error = %other, "connection error"),
                            }
                        }
                    });
                }
                Err(e) => tracing::error!(error = %e, "accept error"),
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ServiceCtx) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = protocol::read_request(&mut reader, ctx.request_timeout).await?;
    tracing::debug!(request = ?request, "received request");

    if let Request::StreamOutput { id } = request {
        return stream_output(&mut writer, ctx, &id).await;
    }

    let response = handle_request(request, ctx).await;
    protocol::write_response(&mut writer, &response, ctx.request_timeout).await?;
    Ok(())
}

/// Subscribe to a session's output and forward every message until the
/// subscriber drops the connection or the session reaches a terminal status
/// (spec.md §4.9 `Subscribe`, §4.11 `StreamOutput`).
async fn stream_output(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    ctx: &ServiceCtx,
    id: &str,
) -> Result<(), ConnectionError> {
    let session_id = SessionId::from(id.to_string());
    let mut sub = match ctx.registry.subscribe(&session_id) {
        Ok(sub) => sub,
        Err(e) => {
            let response = Response::Error { message: e.to_string() };
            protocol::write_response(writer, &response, ctx.request_timeout).await?;
            return Ok(());
        }
    };

    loop {
        tokio::select! {
            biased;
            msg = sub.receiver.recv() => {
                match msg {
                    Some(message) => {
                        let response = Response::OutputMessage { message };
                        protocol::write_response(writer, &response, ctx.request_timeout).await?;
                    }
                    None => break,
                }
            }
            changed = sub.completion.changed() => {
                if changed.is_err() {
                    break;
                }
                if *sub.completion.borrow() {
                    // Drain anything still buffered before signalling the end.
                    while let Ok(message) = sub.receiver.try_recv() {
                        let response = Response::OutputMessage { message };
                        protocol::write_response(writer, &response, ctx.request_timeout).await?;
                    }
                    break;
                }
            }
        }
    }

    let response = Response::StreamEnded;
    protocol::write_response(writer, &response, ctx.request_timeout).await?;
    Ok(())
}

async fn handle_request(request: Request, ctx: &ServiceCtx) -> Response {
    match request {
        Request::StartSession {
            spec_files,
            project_root,
            use_worktree,
            worktree_name,
            model,
            checker_model,
            workflow_name,
            system_prompt,
            max_iterations,
            max_budget_usd,
        } => {
            let defaults = ctx.runner.config_defaults();
            let config = SessionConfig {
                model: model.unwrap_or_else(|| defaults.default_model.clone()),
                checker_model: checker_model.unwrap_or_else(|| defaults.default_checker_model.clone()),
                workflow_name: workflow_name.unwrap_or_else(|| defaults.default_workflow.clone()),
                system_prompt,
            };
            let req = StartRequest {
                spec_files: spec_files.into_iter().map(PathBuf::from).collect(),
                project_root: PathBuf::from(project_root),
                use_worktree,
                worktree_name,
                config,
                max_iterations: max_iterations.unwrap_or(defaults.default_max_iterations),
                max_budget_usd: max_budget_usd.unwrap_or(defaults.default_max_budget_usd),
                context_files: Vec::new(),
                notes_path: None,
            };
            match ctx.runner.start(req).await {
                Ok(session) => Response::SessionStarted { session: Box::new(session) },
                Err(e) => error_response(e),
            }
        }

        Request::StopSession { id } => {
            let session_id = SessionId::from(id.clone());
            match ctx.runner.stop(&session_id) {
                Ok(()) => Response::SessionStopped { id },
                Err(e) => error_response(e),
            }
        }

        Request::ResumeSession { id } => {
            let session_id = SessionId::from(id);
            match ctx.runner.resume(&session_id).await {
                Ok(session) => Response::SessionResumed { session: Box::new(session) },
                Err(e) => error_response(e),
            }
        }

        Request::TriggerMerge { id } => {
            let session_id = SessionId::from(id.clone());
            match ctx.runner.merge(&session_id).await {
                Ok(()) => Response::MergeTriggered { id },
                Err(e) => error_response(e),
            }
        }

        Request::SendChat { id, message } => {
            let session_id = SessionId::from(id.clone());
            match ctx.runner.chat(&session_id, &message).await {
                Ok(text) => Response::ChatReply { id, text },
                Err(e) => error_response(e),
            }
        }

        Request::ListSessions => {
            let sessions: Vec<Session> = ctx.registry.list();
            Response::Sessions { sessions }
        }

        Request::StreamOutput { .. } => {
            // Handled before dispatch; unreachable via this path.
            Response::Error {
                message: "stream_output must be handled by the connection loop".to_string(),
            }
        }
    }
}

fn error_response(e: RunnerError) -> Response {
    Response::Error { message: e.to_string() }
}
