mod cli;
mod nginx_gen;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log2metrics_aggregate::Aggregator;
use log2metrics_core::constants::COUNTER_QUEUE_SIZE;
use log2metrics_core::{Config, LogStrategy};
use log2metrics_export::Exporter;
use log2metrics_jobs::JobManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::CliArgs;

fn desired_strategies(config: &Config) -> Vec<Arc<LogStrategy>> {
    config.log_strategies.iter().cloned().map(Arc::new).collect()
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    Config::load_file(path).with_context(|| format!("failed to load config file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args.config_file)?;
    info!(
        config_file = %args.config_file.display(),
        strategies = config.log_strategies.len(),
        http_addr = %config.http_addr,
        "log2metrics-agent starting",
    );

    if !config.log_collecting.enable {
        info!("log_collecting.enable is false; exiting without starting any job");
        return Ok(());
    }

    log2metrics_export::install_http_exporter(&config.http_addr)
        .context("failed to install the Prometheus HTTP exporter")?;

    let cancel = CancellationToken::new();
    let (point_tx, point_rx) = mpsc::channel(COUNTER_QUEUE_SIZE);

    let aggregator = Arc::new(Aggregator::new());
    let strategies = desired_strategies(&config);
    let exporter = Arc::new(Exporter::new(aggregator.clone(), &strategies));
    let job_manager = Arc::new(JobManager::new(point_tx));

    job_manager.sync(strategies).await;

    let mut aggregator_task = tokio::spawn({
        let aggregator = aggregator.clone();
        let cancel = cancel.clone();
        async move { aggregator.run(point_rx, cancel).await }
    });

    let mut exporter_task = tokio::spawn({
        let exporter = exporter.clone();
        let cancel = cancel.clone();
        async move { exporter.run(cancel).await }
    });

    let mut nginx_gen_task = {
        let local = &config.local_config;
        if local.nginx_log_generating {
            let file_paths: Vec<String> = config
                .log_strategies
                .iter()
                .map(|s| s.file_path.clone())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            let rate = local.rate_per_second;
            let cancel = cancel.clone();
            Some(tokio::spawn(async move { nginx_gen::run(file_paths, rate, cancel).await }))
        } else {
            None
        }
    };

    // The Supervisor's termination rule: the first task to exit (or a
    // termination signal) cancels the shared token; everything else observes
    // cancellation independently. A pipeline stage exiting early is not
    // survivable — it brings the whole agent down deliberately. Each arm's
    // `JoinHandle` is only ever awaited once: here in the select if it wins
    // the race, or below (via `cause`) if it doesn't — polling a `JoinHandle`
    // again after it has already resolved is not something to rely on.
    let cause = tokio::select! {
        _ = wait_for_shutdown_signal() => ShutdownCause::Signal,
        res = &mut aggregator_task => {
            log_task_exit("aggregator", res);
            ShutdownCause::Aggregator
        }
        res = &mut exporter_task => {
            log_task_exit("exporter", res);
            ShutdownCause::Exporter
        }
        res = join_or_pending(&mut nginx_gen_task) => {
            log_task_exit("nginx log generator", res);
            ShutdownCause::NginxGen
        }
    };

    if matches!(cause, ShutdownCause::Signal) {
        info!("shutdown signal received, stopping");
    }
    cancel.cancel();

    job_manager.stop_all().await;
    if !matches!(cause, ShutdownCause::Aggregator) {
        let _ = aggregator_task.await;
    }
    if !matches!(cause, ShutdownCause::Exporter) {
        let _ = exporter_task.await;
    }
    if !matches!(cause, ShutdownCause::NginxGen) {
        if let Some(task) = nginx_gen_task {
            let _ = task.await;
        }
    }

    info!("log2metrics-agent stopped");
    Ok(())
}

enum ShutdownCause {
    Signal,
    Aggregator,
    Exporter,
    NginxGen,
}

fn log_task_exit(name: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => warn!(task = name, "pipeline task exited unexpectedly, shutting down"),
        Err(e) => error!(task = name, error = %e, "pipeline task panicked, shutting down"),
    }
}

/// Awaits `handle` if present, otherwise never resolves. Lets an absent
/// optional task (the nginx generator when disabled) sit in a `select!` arm
/// without racing a ghost future.
async fn join_or_pending(handle: &mut Option<tokio::task::JoinHandle<()>>) -> Result<(), tokio::task::JoinError> {
    match handle {
        Some(h) => h.await,
        None => std::future::pending().await,
    }
}

/// Waits for Ctrl-C, or SIGTERM/SIGHUP on unix. A SIGHUP is treated the same
/// as a shutdown request — this agent does not support config hot-reload,
/// following the config layer's "loaded once at startup" contract.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        let mut hup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGHUP handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
            _ = hup.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
