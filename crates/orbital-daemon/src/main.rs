// SPDX-License-Identifier: MIT

//! orbitald: the Orbital session daemon.
//!
//! Binds a Unix socket under `<project>/.orbital/` and dispatches
//! StartSession/StopSession/ResumeSession/TriggerMerge/SendChat/
//! ListSessions/StreamOutput requests against an in-memory session
//! registry (spec.md §4.9-§4.11).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;

use orbital_daemon::runner::{interrupt_all_running, RunnerConfig};
use orbital_daemon::service::{Listener, ServiceCtx};
use orbital_daemon::env;
use orbital_executor::ProcessExecutor;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match std::env::args().nth(1).as_deref() {
        Some("--version" | "-V") => {
            println!("orbitald {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help" | "-h") => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    let project_root = project_root_from_args()?;
    let socket_path = env::socket_path(&project_root);
    let log_guard = setup_logging(&project_root)?;

    info!(project_root = %project_root.display(), socket = %socket_path.display(), "starting orbitald");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix_listener = UnixListener::bind(&socket_path)?;

    let executor: Arc<dyn orbital_executor::AgentExecutor> = Arc::new(ProcessExecutor);
    let ctx = Arc::new(ServiceCtx::new(executor, RunnerConfig::default()));
    let registry_for_shutdown = ctx.registry.clone();

    let listener = Listener::new(unix_listener, Arc::clone(&ctx));
    tokio::spawn(listener.run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    println!("READY");
    info!(socket = %socket_path.display(), "orbitald ready");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    // Every still-running session transitions to interrupted; nothing
    // further is persisted (spec.md §5).
    interrupt_all_running(&registry_for_shutdown);
    let _ = std::fs::remove_file(&socket_path);
    drop(log_guard);
    info!("orbitald stopped");
    Ok(())
}

fn print_help() {
    println!("orbitald {}", env!("CARGO_PKG_VERSION"));
    println!("Orbital session daemon - drives autonomous code-modification agent sessions");
    println!();
    println!("USAGE:");
    println!("    orbitald [project-root]");
    println!();
    println!("The daemon is typically started by the `orbital` CLI and should not be");
    println!("invoked directly. It listens on a Unix socket under <project>/.orbital/");
    println!("for commands.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
}

/// Project root to operate against: the first non-flag argument, or the
/// current working directory.
fn project_root_from_args() -> std::io::Result<PathBuf> {
    match std::env::args().nth(1) {
        Some(arg) if !arg.starts_with('-') => std::fs::canonicalize(arg),
        _ => std::env::current_dir(),
    }
}

/// Rotating file logger under `<project>/.orbital/logs/daemon.log`
/// (SPEC_FULL.md §2).
fn setup_logging(
    project_root: &std::path::Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let logs_dir = project_root.join(".orbital").join("logs");
    std::fs::create_dir_all(&logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "daemon.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
