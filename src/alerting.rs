//! Proximity alert dispatch and incident lifecycle operations over storage.
//!
//! The decisions themselves live in [`crate::proximity`] and
//! [`crate::lifecycle`]; this module loads their inputs from [`Storage`]
//! and commits their outputs with the storage layer's atomic primitives.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geo::GeoCoordinate;
use crate::lifecycle::end_disaster;
use crate::model::{AlertKey, CreateIncidentRequest, CreateIncidentResponse, Incident};
use crate::proximity::notify_if_nearby;
use crate::storage::Storage;

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_incidents: Vec<String>,
    pub pruned_alerts: u64,
}

/// Store a new report and alert nearby users straight away.
pub async fn report_incident(
    storage: &Storage,
    request: CreateIncidentRequest,
    radius_meters: f64,
    now: i64,
) -> Result<CreateIncidentResponse> {
    let location = GeoCoordinate::new(request.latitude, request.longitude)?;
    let incident = Incident::new(
        &request.reporter_id,
        request.reporter_name.as_deref(),
        location,
        &request.description,
        request.image_base64,
        now,
    )?;

    storage.insert_incident(&incident).await?;
    info!(incident_id = %incident.id, "Incident reported");

    let alerted = dispatch_proximity_alerts(storage, &incident, radius_meters, now).await?;

    Ok(CreateIncidentResponse {
        incident,
        alerted: alerted.len(),
    })
}

/// Alert every nearby user who has not yet been alerted about `incident`.
///
/// Each recipient is claimed in the alert log before being returned, so two
/// overlapping passes over the same incident never both report a user. A
/// claim fails once the stored incident is no longer active, which covers
/// callers holding a stale copy of `incident`.
pub async fn dispatch_proximity_alerts(
    storage: &Storage,
    incident: &Incident,
    radius_meters: f64,
    now: i64,
) -> Result<Vec<String>> {
    if !incident.is_active() {
        return Ok(Vec::new());
    }

    let candidates = storage.list_presences().await?;
    let already_notified = storage.notified_keys(&incident.id).await?;

    let outcome = notify_if_nearby(
        incident,
        &candidates,
        &incident.reporter_id,
        already_notified,
        radius_meters,
    );

    let mut delivered = Vec::with_capacity(outcome.recipients.len());
    for user_id in outcome.recipients {
        let key = AlertKey::new(incident.id.as_str(), user_id.as_str());
        if storage.claim_alert(&key, now).await? {
            delivered.push(user_id);
        } else {
            debug!(incident_id = %incident.id, user_id = %user_id, "Alert already claimed");
        }
    }

    if !delivered.is_empty() {
        info!(
            incident_id = %incident.id,
            recipients = delivered.len(),
            "Proximity alerts dispatched"
        );
    }

    Ok(delivered)
}

/// Re-evaluate every active incident against current presence.
///
/// Picks up users who moved into range after the report was published.
/// Returns the number of new alerts.
pub async fn rescan_active_incidents(
    storage: &Storage,
    radius_meters: f64,
    now: i64,
) -> Result<usize> {
    let incidents = storage.list_active_incidents().await?;

    let mut total = 0;
    for incident in &incidents {
        total += dispatch_proximity_alerts(storage, incident, radius_meters, now)
            .await?
            .len();
    }

    debug!(
        incidents = incidents.len(),
        new_alerts = total,
        "Proximity rescan complete"
    );
    Ok(total)
}

/// End an incident on behalf of `user_id`, who is at `location`.
///
/// Checks run against the stored incident first; the write is then a
/// conditional update so a concurrent end by someone else surfaces as
/// [`Error::NotActive`] instead of overwriting `ended_at`.
pub async fn end_incident(
    storage: &Storage,
    incident_id: &str,
    user_id: &str,
    location: GeoCoordinate,
    now: i64,
) -> Result<Incident> {
    let mut incident = storage.get_incident(incident_id).await?;
    end_disaster(&mut incident, user_id, location, now)?;

    if !storage.mark_inactive(incident_id, now, user_id).await? {
        return match storage.find_incident(incident_id).await? {
            Some(_) => Err(Error::NotActive {
                id: incident_id.to_string(),
            }),
            None => Err(Error::not_found("Incident", incident_id)),
        };
    }

    info!(incident_id, ended_by = user_id, "Incident ended");
    Ok(incident)
}

/// Remove expired incidents and prune stale alert log entries.
pub async fn sweep_expired(storage: &Storage, now: i64, dedup_ttl: Duration) -> Result<SweepReport> {
    let deleted_incidents = storage.delete_expired_incidents(now).await?;

    let ttl_ms = i64::try_from(dedup_ttl.as_millis()).unwrap_or(i64::MAX);
    let pruned_alerts = storage.prune_alert_log(now.saturating_sub(ttl_ms)).await?;

    if !deleted_incidents.is_empty() || pruned_alerts > 0 {
        info!(
            deleted = deleted_incidents.len(),
            pruned_alerts, "Expired incidents swept"
        );
    }

    Ok(SweepReport {
        deleted_incidents,
        pruned_alerts,
    })
}
