// src/lib.rs

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod job;
pub mod logbuf;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod shell;
pub mod task;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::ConfigFile;
use crate::errors::{OrchestratorError, Result};
use crate::orchestrator::Orchestrator;
use crate::registry::JsonSnapshotStore;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - snapshot store / registry / executors
/// - startup recovery reconciliation
/// - the HTTP API server
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_and_validate(&args.config)?;
    apply_overrides(&mut cfg, &args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let addr: SocketAddr = cfg
        .server
        .listen
        .parse()
        .map_err(|_| OrchestratorError::Config(format!("invalid listen address: {}", cfg.server.listen)))?;

    let store = JsonSnapshotStore::new(cfg.snapshot_path());
    let orchestrator = Arc::new(Orchestrator::with_builtin_handlers(cfg, Box::new(store)));
    orchestrator.init()?;

    let app = api::router(orchestrator.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "taskwarden API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Running shells survive on purpose; they are re-attached next start.
    orchestrator.shutdown();
    info!("taskwarden exiting");
    Ok(())
}

/// CLI flags override their config counterparts.
fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) -> Result<()> {
    if let Some(listen) = &args.listen {
        listen
            .parse::<SocketAddr>()
            .map_err(|_| OrchestratorError::Config(format!("invalid --listen address: {listen}")))?;
        cfg.server.listen = listen.clone();
    }
    if let Some(dir) = &args.state_dir {
        cfg.state.dir = Some(dir.clone());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("failed to listen for Ctrl+C: {e}");
        return;
    }
    info!("shutdown requested");
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("taskwarden dry-run");
    println!("  server.listen = {}", cfg.server.listen);
    println!("  state.dir = {}", cfg.state_dir().display());
    println!("  limits.max_shells = {}", cfg.limits.max_shells);
    println!("  limits.max_jobs = {}", cfg.limits.max_jobs);
    println!("  limits.job_queue_length = {}", cfg.limits.job_queue_length);
    println!(
        "  shell.stop_grace_period_secs = {}",
        cfg.shell.stop_grace_period_secs
    );
    println!("  shell.log_buffer_lines = {}", cfg.shell.log_buffer_lines);
    println!("  job.extract_tool = {}", cfg.job.extract_tool);
    println!("  retention.max_finished = {}", cfg.retention.max_finished);
    println!("  retention.max_age_secs = {}", cfg.retention.max_age_secs);
    println!(
        "  auth = {}",
        if cfg.effective_auth_token().is_some() {
            "token configured"
        } else {
            "disabled"
        }
    );
}
