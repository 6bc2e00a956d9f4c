//! Data models for DisasterZone.
//!
//! Timestamps are epoch milliseconds (UTC), assigned by the server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geo::GeoCoordinate;
use crate::lifecycle::LifecycleState;

/// Number of characters kept by [`preview`] before the ellipsis.
pub const PREVIEW_CHARS: usize = 20;

/// Display name used when a reporter or commenter has none.
pub const ANONYMOUS: &str = "Anonymous";

/// Stored status of an incident.
///
/// `Expired` is not stored; see [`LifecycleState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Inactive,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(IncidentStatus::Active),
            "inactive" => Ok(IncidentStatus::Inactive),
            other => Err(Error::InvalidArgument(format!(
                "unknown incident status '{other}'"
            ))),
        }
    }
}

/// A single disaster report.
///
/// `reporter_id`, `location` and `created_at` never change after creation.
/// `ended_at` and `ended_by` are `Some` exactly when `status` is
/// [`IncidentStatus::Inactive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub reporter_id: String,
    pub reporter_name: String,
    pub location: GeoCoordinate,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    pub created_at: i64,
    pub status: IncidentStatus,
    pub ended_at: Option<i64>,
    pub ended_by: Option<String>,
}

impl Incident {
    /// Create a new active incident with a fresh identifier.
    pub fn new(
        reporter_id: &str,
        reporter_name: Option<&str>,
        location: GeoCoordinate,
        description: &str,
        image_base64: Option<String>,
        now: i64,
    ) -> Result<Self> {
        let reporter_id = reporter_id.trim();
        if reporter_id.is_empty() {
            return Err(Error::InvalidArgument(
                "reporter id must not be empty".to_string(),
            ));
        }
        let description = description.trim();
        if description.is_empty() {
            return Err(Error::InvalidArgument(
                "description must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            reporter_id: reporter_id.to_string(),
            reporter_name: display_name(reporter_name),
            location,
            description: description.to_string(),
            image_base64,
            created_at: now,
            status: IncidentStatus::Active,
            ended_at: None,
            ended_by: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == IncidentStatus::Active
    }

    /// Short form of the description for notifications and list rows.
    pub fn preview(&self) -> String {
        preview(&self.description)
    }
}

/// Truncate `text` to [`PREVIEW_CHARS`] characters, appending `...` when cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn display_name(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ANONYMOUS.to_string(),
    }
}

/// Last-known location of a user.
///
/// `location` is `None` while the user has never reported a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPresence {
    pub user_id: String,
    pub location: Option<GeoCoordinate>,
    pub updated_at: i64,
}

/// Dedup key marking that `user_id` has been alerted about `incident_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    pub incident_id: String,
    pub user_id: String,
}

impl AlertKey {
    pub fn new(incident_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            incident_id: incident_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// A proximity alert that has been delivered to a user.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveredAlert {
    pub incident_id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub notified_at: i64,
}

impl DeliveredAlert {
    pub const TITLE: &'static str = "DANGER NEARBY";

    pub fn new(incident_id: String, user_id: String, description: &str, notified_at: i64) -> Self {
        Self {
            incident_id,
            user_id,
            title: Self::TITLE.to_string(),
            message: format!("New disaster report: {description}"),
            notified_at,
        }
    }
}

/// A comment on an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub incident_id: String,
    pub user_id: String,
    pub username: String,
    pub text: String,
    pub created_at: i64,
}

impl Comment {
    pub fn new(
        incident_id: &str,
        user_id: &str,
        username: Option<&str>,
        text: &str,
        now: i64,
    ) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidArgument(
                "comment text must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            incident_id: incident_id.to_string(),
            user_id: user_id.to_string(),
            username: display_name(username),
            text: text.to_string(),
            created_at: now,
        })
    }
}

/// What kind of interaction produced a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "like" => Ok(NotificationKind::Like),
            "comment" => Ok(NotificationKind::Comment),
            other => Err(Error::InvalidArgument(format!(
                "unknown notification kind '{other}'"
            ))),
        }
    }
}

/// An entry in a reporter's interaction inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub incident_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: i64,
}

impl Notification {
    /// Build the inbox entry telling the reporter of `incident` about an
    /// interaction by `sender_id`.
    ///
    /// Returns `None` when the reporter interacted with their own report.
    pub fn for_interaction(
        incident: &Incident,
        sender_id: &str,
        kind: NotificationKind,
        sender_name: &str,
        now: i64,
    ) -> Option<Self> {
        if incident.reporter_id == sender_id {
            return None;
        }

        let message = match kind {
            NotificationKind::Like => {
                format!("Someone liked your report: {}", incident.preview())
            }
            NotificationKind::Comment => format!("{sender_name} commented on your report"),
        };

        Some(Self {
            id: Uuid::new_v4().to_string(),
            recipient_id: incident.reporter_id.clone(),
            sender_id: sender_id.to_string(),
            incident_id: incident.id.clone(),
            kind,
            message,
            created_at: now,
        })
    }
}

/// Request body for `POST /incidents`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateIncidentRequest {
    pub reporter_id: String,
    #[serde(default)]
    pub reporter_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// Response for `POST /incidents`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIncidentResponse {
    pub incident: Incident,
    /// Number of nearby users alerted by the immediate scan.
    pub alerted: usize,
}

/// Request body for `POST /incidents/:id/end`.
#[derive(Debug, Clone, Deserialize)]
pub struct EndIncidentRequest {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Request body for `PUT /users/:user_id/presence`.
///
/// Missing coordinates, or the `(0, 0)` placeholder, clear the location.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceRequest {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Request body for `POST /incidents/:id/comments`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentRequest {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub text: String,
}

/// Request body for `POST /incidents/:id/likes`.
#[derive(Debug, Clone, Deserialize)]
pub struct LikeRequest {
    pub user_id: String,
}

/// Response for `POST /incidents/:id/likes`.
#[derive(Debug, Clone, Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

/// Response for `GET /incidents/:id/share`.
#[derive(Debug, Clone, Serialize)]
pub struct ShareResponse {
    pub incident_id: String,
    pub code: String,
}

/// An incident as shown on the feed or detail screen.
///
/// `distance_meters` and `can_end` are only present when the viewer's
/// location was supplied.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentView {
    #[serde(flatten)]
    pub incident: Incident,
    pub state: LifecycleState,
    pub like_count: i64,
    pub comment_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_end: Option<bool>,
}

/// Query parameters for `GET /incidents`.
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub active_only: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Viewer location for `GET /incidents/:id`.
#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> GeoCoordinate {
        GeoCoordinate::new(3.139, 101.6869).unwrap()
    }

    #[test]
    fn test_new_incident_is_active() {
        let incident =
            Incident::new("r1", Some("Aina"), location(), "Flooding on Jalan Ampang", None, 1_000)
                .unwrap();

        assert_eq!(incident.status, IncidentStatus::Active);
        assert_eq!(incident.ended_at, None);
        assert_eq!(incident.ended_by, None);
        assert_eq!(incident.created_at, 1_000);
        assert_eq!(incident.reporter_name, "Aina");
    }

    #[test]
    fn test_incident_ids_are_unique() {
        let a = Incident::new("r1", None, location(), "flood", None, 0).unwrap();
        let b = Incident::new("r1", None, location(), "flood", None, 0).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.reporter_name, ANONYMOUS);
    }

    #[test]
    fn test_empty_description_rejected() {
        let result = Incident::new("r1", None, location(), "   ", None, 0);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_preview_truncates_long_text() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("exactly twenty chars"), "exactly twenty chars");
        assert_eq!(
            preview("Landslide blocking the north road"),
            "Landslide blocking t..."
        );
        // Multi-byte characters must not be split.
        assert_eq!(preview(&"é".repeat(25)), format!("{}...", "é".repeat(20)));
    }

    #[test]
    fn test_interaction_notification_messages() {
        let incident = Incident::new(
            "owner",
            None,
            location(),
            "Landslide blocking the north road",
            None,
            0,
        )
        .unwrap();

        let like = Notification::for_interaction(&incident, "u2", NotificationKind::Like, "Ben", 5)
            .unwrap();
        assert_eq!(like.recipient_id, "owner");
        assert_eq!(like.message, "Someone liked your report: Landslide blocking t...");

        let comment =
            Notification::for_interaction(&incident, "u2", NotificationKind::Comment, "Ben", 5)
                .unwrap();
        assert_eq!(comment.message, "Ben commented on your report");
    }

    #[test]
    fn test_no_notification_for_own_report() {
        let incident = Incident::new("owner", None, location(), "flood", None, 0).unwrap();
        assert!(
            Notification::for_interaction(&incident, "owner", NotificationKind::Like, "x", 0)
                .is_none()
        );
    }

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!(
            "inactive".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::Inactive
        );
        assert!("ended".parse::<IncidentStatus>().is_err());
    }
}
