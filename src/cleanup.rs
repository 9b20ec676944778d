//! Scheduled cleanup tasks for expired/aged-out data.

use crate::db::Database;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, audit_retention_days: u32) {
    // Drop revocation rows whose backing token has expired anyway
    match db.revoked_tokens().delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired revoked tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up revoked tokens: {}", e),
    }

    // Enforce the audit retention window
    match db.audit_logs().delete_older_than(audit_retention_days).await {
        Ok(count) if count > 0 => info!("Cleaned up {} aged-out audit records", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up audit records: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    audit_retention_days: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db, audit_retention_days).await;
        }
    })
}
