//! Retention job: sessions and credentials older than the configured age
//! are removed on a fixed interval.
//!
//! Deletion is idempotent and keyed on creation time only, so the task is
//! safe to run concurrently with live traffic and with a second replica
//! (the deployment supplies mutual exclusion where double-running matters).

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::CleanupConfig;
use crate::storage::{SessionStore, TanStore};

pub fn start_cleanup_task(
    sessions: Arc<dyn SessionStore>,
    tans: Arc<dyn TanStore>,
    config: CleanupConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let cutoff = Utc::now() - ChronoDuration::days(config.days);

            match sessions.delete_created_before(cutoff).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Removed expired sessions");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Session cleanup failed"),
            }

            match tans.delete_created_before(cutoff).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Removed expired credentials");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Credential cleanup failed"),
            }
        }
    })
}
