//! Background jobs: expiry sweep and proximity rescan.
//!
//! Both run on a fixed `tokio::time::interval` until their
//! [`CancellationToken`] is triggered. Storage calls go through
//! [`with_backoff`] so a briefly unavailable database does not cost a whole
//! interval.

use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::alerting::{rescan_active_incidents, sweep_expired};
use crate::retry::{RetryConfig, with_backoff};
use crate::storage::Storage;

/// Delete expired incidents every `interval`.
pub async fn run_expiry_sweep(
    storage: Storage,
    interval: Duration,
    dedup_ttl: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Expiry sweep started");

    let retry = RetryConfig::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Expiry sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                let now = Utc::now().timestamp_millis();
                match with_backoff(&retry, "expiry_sweep", &cancel, || sweep_expired(&storage, now, dedup_ttl)).await {
                    Ok(report) if report.deleted_incidents.is_empty() && report.pruned_alerts == 0 => {
                        tracing::debug!("Expiry sweep: nothing to remove");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }
    }
}

/// Re-check active incidents against fresh presence every `interval`.
pub async fn run_proximity_rescan(
    storage: Storage,
    interval: Duration,
    radius_meters: f64,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        radius_meters,
        "Proximity rescan started"
    );

    let retry = RetryConfig::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Proximity rescan stopping");
                break;
            }
            _ = ticker.tick() => {
                let now = Utc::now().timestamp_millis();
                let result = with_backoff(&retry, "proximity_rescan", &cancel, || {
                    rescan_active_incidents(&storage, radius_meters, now)
                })
                .await;
                match result {
                    Ok(0) => tracing::debug!("Proximity rescan: no new alerts"),
                    Ok(new_alerts) => tracing::info!(new_alerts, "Proximity rescan dispatched alerts"),
                    Err(e) => tracing::error!(error = %e, "Proximity rescan failed"),
                }
            }
        }
    }
}
