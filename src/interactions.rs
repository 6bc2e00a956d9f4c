//! Feed, comments, likes, sharing and presence updates.
//!
//! Likes, comments and share codes are only available while an incident is
//! active. Reporters get an inbox notification when someone else likes or
//! comments on their report.

use tracing::info;

use crate::error::Result;
use crate::geo::{GeoCoordinate, distance_meters};
use crate::lifecycle::{LifecycleState, can_end, ensure_interactive};
use crate::model::{
    Comment, CommentRequest, Incident, IncidentView, LikeResponse, Notification,
    NotificationKind, PresenceRequest, ShareResponse, UserPresence,
};
use crate::share::{parse_share_code, share_code};
use crate::storage::Storage;

/// Attach derived state and interaction counts to an incident.
///
/// With a `viewer` location the view also carries the viewer's distance to
/// the incident and whether they may end it from there.
pub async fn incident_view(
    storage: &Storage,
    incident: Incident,
    viewer: Option<GeoCoordinate>,
    now: i64,
) -> Result<IncidentView> {
    let like_count = storage.count_likes(&incident.id).await?;
    let comment_count = storage.count_comments(&incident.id).await?;

    Ok(IncidentView {
        state: LifecycleState::of(&incident, now),
        distance_meters: viewer.map(|v| distance_meters(v, incident.location)),
        can_end: viewer.map(|v| can_end(&incident, v)),
        incident,
        like_count,
        comment_count,
    })
}

/// Non-expired incidents, newest first.
pub async fn feed(
    storage: &Storage,
    active_only: bool,
    viewer: Option<GeoCoordinate>,
    now: i64,
) -> Result<Vec<IncidentView>> {
    let incidents = storage.list_visible_incidents(now, active_only).await?;

    let mut views = Vec::with_capacity(incidents.len());
    for incident in incidents {
        views.push(incident_view(storage, incident, viewer, now).await?);
    }
    Ok(views)
}

/// Like or unlike an incident. Only a new like notifies the reporter.
pub async fn toggle_like(
    storage: &Storage,
    incident_id: &str,
    user_id: &str,
    now: i64,
) -> Result<LikeResponse> {
    let incident = storage.get_incident(incident_id).await?;
    ensure_interactive(&incident)?;

    let liked = storage.toggle_like(incident_id, user_id, now).await?;
    if liked {
        if let Some(notification) =
            Notification::for_interaction(&incident, user_id, NotificationKind::Like, "", now)
        {
            storage.insert_notification(&notification).await?;
        }
    }

    let like_count = storage.count_likes(incident_id).await?;
    Ok(LikeResponse { liked, like_count })
}

/// Add a comment and notify the reporter.
pub async fn add_comment(
    storage: &Storage,
    incident_id: &str,
    request: CommentRequest,
    now: i64,
) -> Result<Comment> {
    let incident = storage.get_incident(incident_id).await?;
    ensure_interactive(&incident)?;

    let comment = Comment::new(
        incident_id,
        &request.user_id,
        request.username.as_deref(),
        &request.text,
        now,
    )?;
    storage.insert_comment(&comment).await?;

    if let Some(notification) = Notification::for_interaction(
        &incident,
        &comment.user_id,
        NotificationKind::Comment,
        &comment.username,
        now,
    ) {
        storage.insert_notification(&notification).await?;
    }

    info!(incident_id, comment_id = %comment.id, "Comment added");
    Ok(comment)
}

pub async fn list_comments(storage: &Storage, incident_id: &str) -> Result<Vec<Comment>> {
    // 404 for unknown incidents rather than an empty list.
    storage.get_incident(incident_id).await?;
    storage.list_comments(incident_id).await
}

/// Share code for an active incident.
pub async fn share_incident(storage: &Storage, incident_id: &str) -> Result<ShareResponse> {
    let incident = storage.get_incident(incident_id).await?;
    ensure_interactive(&incident)?;

    Ok(ShareResponse {
        code: share_code(&incident.id),
        incident_id: incident.id,
    })
}

/// Look up the incident a scanned share code points at.
pub async fn resolve_share_code(storage: &Storage, code: &str) -> Result<Incident> {
    let incident_id = parse_share_code(code)?;
    storage.get_incident(incident_id).await
}

/// Record a user's latest location. `(0, 0)` or omitting both coordinates
/// clears it; sending only one is rejected.
pub async fn update_presence(
    storage: &Storage,
    user_id: &str,
    request: PresenceRequest,
    now: i64,
) -> Result<UserPresence> {
    let location = GeoCoordinate::from_optional(request.latitude, request.longitude)?;

    let presence = UserPresence {
        user_id: user_id.to_string(),
        location,
        updated_at: now,
    };
    storage.upsert_presence(&presence).await?;

    Ok(presence)
}
