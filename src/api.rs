//! HTTP API handlers for DisasterZone.
//!
//! The acting user is identified by the `user_id`/`reporter_id` supplied in
//! the request; authentication happens in front of this service.
//!
//! Domain failures are returned as JSON `{ "error", "code" }` bodies via
//! [`Error`]'s `IntoResponse` implementation.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::alerting::{end_incident, report_incident};
use crate::error::Error;
use crate::geo::GeoCoordinate;
use crate::interactions;
use crate::model::{
    Comment, CommentRequest, CreateIncidentRequest, CreateIncidentResponse, DeliveredAlert,
    EndIncidentRequest, FeedQuery, IncidentView, LikeRequest, LikeResponse, Notification,
    PresenceRequest, ShareResponse, UserPresence, ViewerQuery,
};
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub alert_radius_meters: f64,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// POST /incidents - Publish a new incident report.
///
/// # Request Body
///
/// ```json
/// {
///     "reporter_id": "uid-123",
///     "reporter_name": "Aina",
///     "latitude": 3.139,
///     "longitude": 101.6869,
///     "description": "Flash flood on Jalan Ampang"
/// }
/// ```
///
/// Nearby users are alerted before the response is sent.
///
/// # Response
///
/// `201 Created` with the stored incident and the number of users alerted.
#[instrument(skip(state, request), fields(reporter_id))]
pub async fn post_incident(
    State(state): State<AppState>,
    Json(request): Json<CreateIncidentRequest>,
) -> Result<(StatusCode, Json<CreateIncidentResponse>), Error> {
    tracing::Span::current().record("reporter_id", request.reporter_id.as_str());

    match report_incident(&state.storage, request, state.alert_radius_meters, now_millis()).await {
        Ok(response) => {
            info!(
                incident_id = %response.incident.id,
                alerted = response.alerted,
                "Incident published"
            );
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(e) => {
            warn!(error = %e, "Failed to publish incident");
            Err(e)
        }
    }
}

/// GET /incidents - The feed of non-expired incidents, newest first.
///
/// # Query Parameters
///
/// - `active_only` (optional): only incidents that have not been ended (default: false)
/// - `latitude`, `longitude` (optional): the viewer's location; adds
///   `distance_meters` and `can_end` to each incident
#[instrument(skip(state))]
pub async fn get_incidents(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<IncidentView>>, Error> {
    let viewer = GeoCoordinate::from_optional(query.latitude, query.longitude)?;
    let views =
        interactions::feed(&state.storage, query.active_only, viewer, now_millis()).await?;
    info!(count = views.len(), "Feed queried");
    Ok(Json(views))
}

/// GET /incidents/:id - One incident with its derived state and counts.
///
/// Accepts the same optional `latitude`/`longitude` viewer query as the feed.
#[instrument(skip(state))]
pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<IncidentView>, Error> {
    let viewer = GeoCoordinate::from_optional(query.latitude, query.longitude)?;
    let incident = state.storage.get_incident(&id).await?;
    let view = interactions::incident_view(&state.storage, incident, viewer, now_millis()).await?;
    Ok(Json(view))
}

/// POST /incidents/:id/end - Mark a disaster as ended.
///
/// # Request Body
///
/// ```json
/// { "user_id": "uid-456", "latitude": 3.1391, "longitude": 101.6870 }
/// ```
///
/// # Errors
///
/// - `403 TOO_FAR` if the user is more than 1 km from the incident
/// - `409 NOT_ACTIVE` if it has already been ended
#[instrument(skip(state, request))]
pub async fn post_end_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EndIncidentRequest>,
) -> Result<Json<IncidentView>, Error> {
    let location = GeoCoordinate::new(request.latitude, request.longitude)?;
    let now = now_millis();

    match end_incident(&state.storage, &id, &request.user_id, location, now).await {
        Ok(incident) => {
            let view =
                interactions::incident_view(&state.storage, incident, Some(location), now)
                    .await?;
            Ok(Json(view))
        }
        Err(e) => {
            warn!(incident_id = %id, error = %e, "Failed to end incident");
            Err(e)
        }
    }
}

/// GET /incidents/:id/share - Share code to render as a QR image.
#[instrument(skip(state))]
pub async fn get_share_code(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShareResponse>, Error> {
    Ok(Json(interactions::share_incident(&state.storage, &id).await?))
}

/// GET /share/:code - Resolve a scanned share code.
#[instrument(skip(state))]
pub async fn get_shared_incident(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<IncidentView>, Error> {
    let incident = interactions::resolve_share_code(&state.storage, &code).await?;
    let view = interactions::incident_view(&state.storage, incident, None, now_millis()).await?;
    Ok(Json(view))
}

/// GET /incidents/:id/comments - Comments, oldest first.
#[instrument(skip(state))]
pub async fn get_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Comment>>, Error> {
    Ok(Json(interactions::list_comments(&state.storage, &id).await?))
}

/// POST /incidents/:id/comments - Comment on an active incident.
#[instrument(skip(state, request))]
pub async fn post_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), Error> {
    let comment = interactions::add_comment(&state.storage, &id, request, now_millis()).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// POST /incidents/:id/likes - Toggle the caller's like.
#[instrument(skip(state, request))]
pub async fn post_like(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<LikeRequest>,
) -> Result<Json<LikeResponse>, Error> {
    let response =
        interactions::toggle_like(&state.storage, &id, &request.user_id, now_millis()).await?;
    info!(incident_id = %id, liked = response.liked, "Like toggled");
    Ok(Json(response))
}

/// PUT /users/:user_id/presence - Report the caller's current location.
///
/// Omitting the coordinates, or sending `(0, 0)`, marks the location unknown.
#[instrument(skip(state, request))]
pub async fn put_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PresenceRequest>,
) -> Result<Json<UserPresence>, Error> {
    let presence =
        interactions::update_presence(&state.storage, &user_id, request, now_millis()).await?;
    Ok(Json(presence))
}

/// GET /users/:user_id/alerts - Proximity alerts delivered to a user.
#[instrument(skip(state))]
pub async fn get_user_alerts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<DeliveredAlert>>, Error> {
    Ok(Json(state.storage.list_alerts_for_user(&user_id).await?))
}

/// GET /users/:user_id/notifications - Likes and comments on a user's reports.
#[instrument(skip(state))]
pub async fn get_user_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Notification>>, Error> {
    Ok(Json(state.storage.list_notifications(&user_id).await?))
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
