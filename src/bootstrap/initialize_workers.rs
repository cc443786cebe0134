//! # Workers
//! Starts consumption once the broker is reachable, runs the periodic stats
//! reporter, and tears everything down on SIGINT / SIGTERM.
use std::{sync::Arc, time::Duration};

use log::{info, warn};
use tokio::{signal::unix::SignalKind, task::JoinHandle, time::sleep};

use super::AppState;
use crate::{
    constants::{SHUTDOWN_DRAIN_TIMEOUT, STARTUP_READY_MAX_POLLS, STARTUP_READY_POLL_INTERVAL},
    jobs::{WorkerStats, WorkerStatsSnapshot},
    models::StartupError,
    queue::QueueConsumer,
};

/// Connects, waits for the broker, starts consuming and launches the stats
/// reporter. On error nothing is consuming; the caller should close the
/// consumer and exit.
pub async fn initialize_workers(app_state: &AppState) -> Result<JoinHandle<()>, StartupError> {
    app_state.consumer.connect();
    wait_until_ready(
        &app_state.consumer,
        STARTUP_READY_MAX_POLLS,
        STARTUP_READY_POLL_INTERVAL,
    )
    .await?;

    app_state.consumer.start_consuming().await?;
    info!(
        "Worker started. Waiting for jobs on queue: {}",
        app_state.config.queue_name
    );

    Ok(spawn_stats_reporter(
        Arc::clone(&app_state.stats),
        app_state.config.stats_interval,
    ))
}

/// Polls readiness up to `max_polls` times, `interval` apart.
pub async fn wait_until_ready(
    consumer: &QueueConsumer,
    max_polls: u32,
    interval: Duration,
) -> Result<(), StartupError> {
    for _ in 0..max_polls {
        if consumer.is_ready() {
            return Ok(());
        }
        sleep(interval).await;
    }
    if consumer.is_ready() {
        return Ok(());
    }
    Err(StartupError::BrokerNotReady(
        (interval * max_polls).as_secs(),
    ))
}

/// Logs a stats snapshot every `interval`, first one after a full period.
pub fn spawn_stats_reporter(stats: Arc<WorkerStats>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("{}", format_stats(&stats.snapshot()));
        }
    })
}

pub fn format_stats(snapshot: &WorkerStatsSnapshot) -> String {
    format!(
        "[Stats] Processed: {} | Success: {} | Failed: {} | Retried: {} | Uptime: {}s",
        snapshot.total_processed,
        snapshot.successful,
        snapshot.failed,
        snapshot.retried,
        snapshot.uptime_ms / 1000
    )
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let mut sigint = tokio::signal::unix::signal(SignalKind::interrupt())
        .expect("Failed to create SIGINT signal");
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())
        .expect("Failed to create SIGTERM signal");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT."),
        _ = sigterm.recv() => info!("Received SIGTERM."),
    };
}

/// Stops taking deliveries, gives running jobs a bounded window to settle,
/// then closes the broker session.
pub async fn shutdown(app_state: &AppState, stats_reporter: Option<JoinHandle<()>>) {
    info!("Shutting down worker...");
    if let Some(reporter) = stats_reporter {
        reporter.abort();
    }

    app_state.consumer.stop_accepting();
    if !app_state.consumer.drain(SHUTDOWN_DRAIN_TIMEOUT).await {
        warn!("Unsettled deliveries will be redelivered by the broker");
    }
    app_state.consumer.close().await;

    info!("{}", format_stats(&app_state.stats.snapshot()));
    info!("Worker shutdown complete");
}
