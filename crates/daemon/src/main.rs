// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ASA Daemon (asad)
//!
//! Background process that owns the durable store, the admission queue,
//! and the worker pool. The HTTP surface runs alongside and talks to the
//! [`service::Service`] facade.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use asa_adapters::{CommandGit, HttpLlmProvider, LexicalIndex, LocalSandbox, NoopForge};
use asa_core::SystemClock;
use asa_daemon::{Config, Service};
use asa_engine::{OrchestratorDeps, TaskQueue, WorkerPool};
use asa_gateway::PromptStore;
use asa_storage::Store;
use fs2::FileExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Queue poll wait per worker loop iteration.
const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot + WAL-truncate interval.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

/// Terminal-handle TTL sweep interval.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("asad {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("asad {}", env!("CARGO_PKG_VERSION"));
                println!("ASA daemon - autonomous bug-fixing service");
                println!();
                println!("USAGE:");
                println!("    asad");
                println!();
                println!("Configuration is environment-driven; see the recognized");
                println!("MAX_*, *_TIMEOUT_SECONDS, and ASA_* variables.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: asad [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    std::fs::create_dir_all(&config.state_dir)?;

    // Single-instance lock
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        eprintln!("asad is already running (lock: {})", config.lock_path.display());
        std::process::exit(1);
    }

    rotate_log_if_needed(&config.log_path);
    let _log_guard = setup_logging(&config)?;

    info!("starting asad");

    let clock = SystemClock;
    let store = Store::open(&config.state_dir)?;

    let queue = Arc::new(TaskQueue::new(
        store.clone(),
        config.queue_limits.clone(),
        clock.clone(),
    ));
    match queue.reseed() {
        Ok(requeued) if requeued > 0 => info!(requeued, "re-seeded queue from store"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "queue re-seed failed"),
    }

    let prompts = Arc::new(match &config.prompts_dir {
        Some(dir) => PromptStore::from_dir(dir),
        None => PromptStore::builtin(),
    });

    let deps = OrchestratorDeps {
        store: store.clone(),
        provider: HttpLlmProvider::new(config.api_base_url.clone(), config.api_key.clone()),
        sandbox: LocalSandbox,
        git: CommandGit,
        forge: NoopForge,
        index: LexicalIndex::new(),
        prompts,
        budget: config.budget.clone(),
        config: config.engine.clone(),
        clock: clock.clone(),
    };

    let pool = WorkerPool::spawn(
        config.workers,
        Arc::clone(&queue),
        deps,
        WORKER_POLL_INTERVAL,
    );
    info!(workers = config.workers, "worker pool started");

    let service = Service::new(store.clone(), Arc::clone(&queue), clock, config.workers);
    let stats = service.stats();
    info!(
        queued = stats.queued,
        max_queue_size = stats.max_queue_size,
        max_concurrent_jobs = stats.max_concurrent_jobs,
        "daemon ready"
    );
    println!("READY");

    spawn_checkpoint(store.clone());
    spawn_purge(Arc::clone(&queue));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    pool.shutdown().await;
    if let Err(e) = store.checkpoint() {
        error!(error = %e, "final checkpoint failed");
    }
    info!("asad stopped");
    Ok(())
}

/// Spawn the periodic snapshot + WAL truncation task.
fn spawn_checkpoint(store: Store) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
        interval.tick().await; // immediate first tick is a no-op
        loop {
            interval.tick().await;
            match tokio::task::spawn_blocking({
                let store = store.clone();
                move || store.checkpoint()
            })
            .await
            {
                Ok(Ok(seq)) => tracing::debug!(seq, "checkpoint complete"),
                Ok(Err(e)) => tracing::warn!(error = %e, "checkpoint failed"),
                Err(e) => tracing::warn!(error = %e, "checkpoint task panicked"),
            }
        }
    });
}

/// Spawn the periodic terminal-handle TTL sweep.
fn spawn_purge(queue: Arc<TaskQueue<SystemClock>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            queue.purge_expired();
        }
    });
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (asad.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `asad.log` -> `asad.log.1` -> `asad.log.2` -> `asad.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently
/// ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let dir = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent"))?;
    let name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;
    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
