//! Audit log retention sweep (§4.8)
//!
//! Every forwarded command and event is already persisted by the router via
//! [`crate::db::MessageLogRepo::append`]. This module only owns the
//! retention horizon: a sweep at startup, then once every 24 hours,
//! cancellable at shutdown.

use std::time::Duration;

use tokio::sync::watch;

use crate::db::MessageLogRepo;

/// Default retention horizon in days
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Rows deleted per sweep transaction, to avoid a single long-running
/// delete against the store
const SWEEP_CHUNK_SIZE: i64 = 500;

/// Interval between scheduled sweeps
const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Run the retention sweep once now, logging the outcome
pub fn sweep_once(message_log: &MessageLogRepo, retention_days: i64) {
    match message_log.sweep_expired(retention_days, SWEEP_CHUNK_SIZE) {
        Ok(deleted) => tracing::info!(deleted, retention_days, "retention sweep complete"),
        Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
    }
}

/// Spawn the recurring retention sweep: once immediately, then every 24h
/// until `shutdown` fires
pub fn spawn_scheduler(message_log: MessageLogRepo, retention_days: i64, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        sweep_once(&message_log, retention_days);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("retention sweep scheduler shutting down");
                        return;
                    }
                }
                () = tokio::time::sleep(SWEEP_INTERVAL) => {
                    sweep_once(&message_log, retention_days);
                }
            }
        }
    });
}
