//! Stuck Claim Reaper Task
//!
//! Background task that periodically releases recalculation claims whose
//! job never finished, so the field is retried on its next stale read.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CachedFieldError, Result};
use crate::policy::Clock;
use crate::recalc::RecalcStats;
use crate::storage::AuxiliaryStorage;

/// Releases every claim older than `stuck_after`. Returns how many went.
pub async fn reap_stuck_claims(
    storage: &dyn AuxiliaryStorage,
    clock: &dyn Clock,
    stats: &RecalcStats,
    stuck_after: Duration,
) -> Result<usize> {
    let age = TimeDelta::from_std(stuck_after)
        .map_err(|e| CachedFieldError::Configuration(format!("stuck flag timeout: {}", e)))?;
    let cutoff = clock.now_utc() - age;

    let released = storage.release_stuck_claims(cutoff).await?;
    for key in &released {
        warn!(
            "released stuck claim on {}.{} (claimed before {})",
            key.object, key.field, cutoff
        );
    }
    stats.record_reaped(released.len());
    Ok(released.len())
}

/// Spawns a background task that periodically releases stuck claims.
///
/// # Arguments
/// * `storage` - auxiliary storage shared with the workers
/// * `clock` - source of "now" for claim ages
/// * `stats` - receives the reaped count
/// * `interval_secs` - seconds between passes
/// * `stuck_after_secs` - claim age after which a claim counts as stuck
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_reaper_task(
    storage: Arc<dyn AuxiliaryStorage>,
    clock: Arc<dyn Clock>,
    stats: Arc<RecalcStats>,
    interval_secs: u64,
    stuck_after_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);
    let stuck_after = Duration::from_secs(stuck_after_secs);

    tokio::spawn(async move {
        info!(
            "Starting stuck-claim reaper every {} seconds (timeout {} seconds)",
            interval_secs, stuck_after_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match reap_stuck_claims(storage.as_ref(), clock.as_ref(), &stats, stuck_after).await {
                Ok(0) => debug!("Reaper: no stuck claims"),
                Ok(released) => info!("Reaper: released {} stuck claims", released),
                Err(err) => warn!("Reaper pass failed: {}", err),
            }
        }
    })
}
