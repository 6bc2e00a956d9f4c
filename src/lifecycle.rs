//! Incident lifecycle: `Active -> Inactive -> Expired`.
//!
//! `Active` and `Inactive` are stored on the incident. `Expired` is derived:
//! an inactive incident whose [`EXPIRY_WINDOW_MS`] has elapsed is eligible
//! for removal by the periodic sweep. There is no way back to `Active`.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::geo::{GeoCoordinate, distance_meters};
use crate::model::{Incident, IncidentStatus};

/// Maximum distance from an incident at which a user may end it.
pub const END_RADIUS_METERS: f64 = 1000.0;

/// How long an ended incident stays visible before removal (24 hours).
pub const EXPIRY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Derived lifecycle state of an incident at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Visible and open to interaction. Alerts fire.
    Active,
    /// Ended, still visible, read-only.
    Inactive,
    /// Ended more than [`EXPIRY_WINDOW_MS`] ago; eligible for removal.
    Expired,
}

impl LifecycleState {
    pub fn of(incident: &Incident, now: i64) -> Self {
        match incident.status {
            IncidentStatus::Active => LifecycleState::Active,
            IncidentStatus::Inactive if is_expired(incident, now) => LifecycleState::Expired,
            IncidentStatus::Inactive => LifecycleState::Inactive,
        }
    }
}

/// Mark `incident` as ended by `acting_user_id`, who is at `acting_location`.
///
/// # Errors
///
/// - [`Error::NotActive`] if the incident has already ended.
/// - [`Error::TooFar`] if the acting user is more than
///   [`END_RADIUS_METERS`] away.
/// - [`Error::InvalidArgument`] if `now` precedes the incident's creation.
///
/// On error the incident is left untouched.
pub fn end_disaster(
    incident: &mut Incident,
    acting_user_id: &str,
    acting_location: GeoCoordinate,
    now: i64,
) -> Result<()> {
    if incident.status != IncidentStatus::Active {
        return Err(Error::NotActive {
            id: incident.id.clone(),
        });
    }

    let distance = distance_meters(acting_location, incident.location);
    if distance > END_RADIUS_METERS {
        return Err(Error::TooFar {
            distance_meters: distance,
            limit_meters: END_RADIUS_METERS,
        });
    }

    if now < incident.created_at {
        return Err(Error::InvalidArgument(format!(
            "end time {now} precedes creation time {}",
            incident.created_at
        )));
    }

    incident.status = IncidentStatus::Inactive;
    incident.ended_at = Some(now);
    incident.ended_by = Some(acting_user_id.to_string());

    Ok(())
}

/// Whether a user at `location` would be allowed to end `incident` now.
pub fn can_end(incident: &Incident, location: GeoCoordinate) -> bool {
    incident.is_active() && distance_meters(location, incident.location) <= END_RADIUS_METERS
}

/// Whether `incident` ended more than [`EXPIRY_WINDOW_MS`] before `now`.
pub fn is_expired(incident: &Incident, now: i64) -> bool {
    match (incident.status, incident.ended_at) {
        (IncidentStatus::Inactive, Some(ended_at)) => now - ended_at > EXPIRY_WINDOW_MS,
        _ => false,
    }
}

/// Reject likes, comments and sharing once an incident has ended.
pub fn ensure_interactive(incident: &Incident) -> Result<()> {
    if incident.is_active() {
        Ok(())
    } else {
        Err(Error::NotActive {
            id: incident.id.clone(),
        })
    }
}
