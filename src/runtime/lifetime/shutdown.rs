//! Graceful shutdown: waits for Ctrl+C, then drains buffered clicks so the
//! in-memory buffer loses nothing on exit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::analytics::{ReconcileOptions, Reconciler};

const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const TASK_TIMEOUT_SECS: u64 = 10;

pub async fn listen_for_shutdown(reconciler: Arc<Reconciler>, max_batch_size: usize) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, draining buffered clicks...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }

    let shutdown_result = timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        perform_shutdown_tasks(reconciler, max_batch_size),
    )
    .await;

    match shutdown_result {
        Ok(()) => {
            info!("All shutdown tasks completed successfully");
        }
        Err(_) => {
            error!(
                "Shutdown tasks timed out after {} seconds! Forcing exit.",
                SHUTDOWN_TIMEOUT_SECS
            );
        }
    }
}

/// One final reconcile over the whole buffer. Bounded by its own timeout so
/// a stuck database cannot hold the process open.
async fn perform_shutdown_tasks(reconciler: Arc<Reconciler>, max_batch_size: usize) {
    let options = ReconcileOptions {
        max_batch_size,
        dry_run: false,
    };

    match timeout(
        Duration::from_secs(TASK_TIMEOUT_SECS),
        reconciler.reconcile(DateTime::UNIX_EPOCH, Utc::now(), &options),
    )
    .await
    {
        Ok(report) if report.success > 0 || report.failed > 0 => {
            info!(
                "Final reconcile: {} clicks persisted, {} failed",
                report.success, report.failed
            );
        }
        Ok(_) => {
            info!("Click buffer already empty");
        }
        Err(_) => {
            error!(
                "Final reconcile timed out after {} seconds",
                TASK_TIMEOUT_SECS
            );
        }
    }
}
