//! Proximity alert decisions.
//!
//! [`notify_if_nearby`] decides who should hear about an incident. It is
//! pure: delivery and persistence of the dedup set belong to the caller
//! (see [`crate::alerting`]).

use std::collections::HashSet;

use crate::geo::distance_meters;
use crate::model::{AlertKey, Incident, UserPresence};

/// Default alert radius around an incident.
pub const DEFAULT_ALERT_RADIUS_METERS: f64 = 1000.0;

/// Result of a proximity evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyOutcome {
    /// Users to alert, in candidate order. Callers must not rely on ordering.
    pub recipients: Vec<String>,
    /// The input dedup set plus one key per recipient.
    pub already_notified: HashSet<AlertKey>,
}

/// Select the users that should be alerted about `incident`.
///
/// A candidate is selected when all of the following hold:
///
/// - it is not `exclude_user_id` (reporters are not alerted about their
///   own reports)
/// - it has a known location
/// - `(incident.id, user_id)` is not in `already_notified`
/// - it is within `radius_meters` of the incident (inclusive)
///
/// Inactive incidents select nobody. Duplicate candidates for the same user
/// are collapsed.
pub fn notify_if_nearby(
    incident: &Incident,
    candidates: &[UserPresence],
    exclude_user_id: &str,
    already_notified: HashSet<AlertKey>,
    radius_meters: f64,
) -> NotifyOutcome {
    let mut outcome = NotifyOutcome {
        recipients: Vec::new(),
        already_notified,
    };

    if !incident.is_active() {
        return outcome;
    }

    for candidate in candidates {
        if candidate.user_id == exclude_user_id {
            continue;
        }
        let Some(location) = candidate.location else {
            continue;
        };

        let key = AlertKey::new(incident.id.as_str(), candidate.user_id.as_str());
        if outcome.already_notified.contains(&key) {
            continue;
        }

        if distance_meters(incident.location, location) <= radius_meters {
            outcome.recipients.push(candidate.user_id.clone());
            outcome.already_notified.insert(key);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoCoordinate;
    use crate::lifecycle::end_disaster;

    fn presence(user_id: &str, location: Option<(f64, f64)>) -> UserPresence {
        UserPresence {
            user_id: user_id.to_string(),
            location: location.map(|(lat, lon)| GeoCoordinate::new(lat, lon).unwrap()),
            updated_at: 0,
        }
    }

    fn incident_at_origin() -> Incident {
        Incident::new(
            "r1",
            None,
            GeoCoordinate::new(0.0, 0.0).unwrap(),
            "Flash flood",
            None,
            0,
        )
        .unwrap()
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    #[test]
    fn test_excludes_reporter_and_unset_locations() {
        let incident = incident_at_origin();
        let candidates = vec![
            presence("a", Some((0.0, 0.005))),
            presence("r1", Some((0.0, 0.005))),
            presence("b", Some((0.0, 0.0))),
            presence("c", None),
        ];

        let outcome = notify_if_nearby(
            &incident,
            &candidates,
            "r1",
            HashSet::new(),
            DEFAULT_ALERT_RADIUS_METERS,
        );

        assert_eq!(sorted(outcome.recipients), vec!["a", "b"]);
        assert_eq!(outcome.already_notified.len(), 2);
        assert!(
            outcome
                .already_notified
                .contains(&AlertKey::new(incident.id.as_str(), "a"))
        );
    }

    #[test]
    fn test_excludes_candidates_outside_radius() {
        let incident = incident_at_origin();
        // 0.01 deg of longitude at the equator is ~1.1 km.
        let candidates = vec![presence("near", Some((0.0, 0.008))), presence("far", Some((0.0, 0.01)))];

        let outcome = notify_if_nearby(
            &incident,
            &candidates,
            "r1",
            HashSet::new(),
            DEFAULT_ALERT_RADIUS_METERS,
        );

        assert_eq!(outcome.recipients, vec!["near"]);
    }

    #[test]
    fn test_never_realerts_carried_forward_pairs() {
        let incident = incident_at_origin();
        let candidates = vec![presence("a", Some((0.0, 0.005)))];

        let first = notify_if_nearby(
            &incident,
            &candidates,
            "r1",
            HashSet::new(),
            DEFAULT_ALERT_RADIUS_METERS,
        );
        assert_eq!(first.recipients, vec!["a"]);

        let more = vec![
            presence("a", Some((0.0, 0.001))),
            presence("d", Some((0.001, 0.0))),
        ];
        let second = notify_if_nearby(
            &incident,
            &more,
            "r1",
            first.already_notified,
            DEFAULT_ALERT_RADIUS_METERS,
        );

        assert_eq!(second.recipients, vec!["d"]);
        assert_eq!(second.already_notified.len(), 2);
    }

    #[test]
    fn test_dedup_is_per_incident() {
        let first = incident_at_origin();
        let second = incident_at_origin();
        let candidates = vec![presence("a", Some((0.0, 0.0)))];

        let seen = notify_if_nearby(
            &first,
            &candidates,
            "r1",
            HashSet::new(),
            DEFAULT_ALERT_RADIUS_METERS,
        )
        .already_notified;
        let outcome = notify_if_nearby(
            &second,
            &candidates,
            "r1",
            seen,
            DEFAULT_ALERT_RADIUS_METERS,
        );

        assert_eq!(outcome.recipients, vec!["a"]);
    }

    #[test]
    fn test_duplicate_candidates_collapse() {
        let incident = incident_at_origin();
        let candidates = vec![presence("a", Some((0.0, 0.0))), presence("a", Some((0.0, 0.001)))];

        let outcome = notify_if_nearby(
            &incident,
            &candidates,
            "r1",
            HashSet::new(),
            DEFAULT_ALERT_RADIUS_METERS,
        );

        assert_eq!(outcome.recipients, vec!["a"]);
    }

    #[test]
    fn test_inactive_incident_alerts_nobody() {
        let mut incident = incident_at_origin();
        let here = incident.location;
        end_disaster(&mut incident, "r1", here, 1).unwrap();

        let outcome = notify_if_nearby(
            &incident,
            &[presence("a", Some((0.0, 0.0)))],
            "r1",
            HashSet::new(),
            DEFAULT_ALERT_RADIUS_METERS,
        );

        assert!(outcome.recipients.is_empty());
        assert!(outcome.already_notified.is_empty());
    }
}
