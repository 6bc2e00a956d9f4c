//! DisasterZone - proximity alerting for community disaster reports.
//!
//! # Overview
//!
//! Users publish incident reports (a location and a description). Everyone
//! whose last-known location is within 1 km is alerted once per incident.
//! Anyone within 1 km may later mark the disaster as ended; 24 hours after
//! that the incident is removed by a periodic sweep.
//!
//! # Modules
//!
//! - [`geo`]: Coordinates and Haversine distance
//! - [`model`]: Incidents, presence, comments, notifications and API payloads
//! - [`lifecycle`]: The `Active -> Inactive -> Expired` state machine
//! - [`proximity`]: Who to alert about an incident
//! - [`storage`]: SQLite storage layer
//! - [`alerting`]: Alert dispatch, ending incidents and the expiry sweep
//! - [`interactions`]: Feed, likes, comments, share codes and presence
//! - [`worker`]: Periodic background jobs
//! - [`api`]: HTTP API handlers

pub mod alerting;
pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod interactions;
pub mod lifecycle;
pub mod model;
pub mod proximity;
pub mod retry;
pub mod share;
pub mod storage;
pub mod worker;

use axum::Router;
use axum::routing::{get, post, put};

use crate::api::AppState;

/// Build the HTTP router with every endpoint mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/incidents", post(api::post_incident).get(api::get_incidents))
        .route("/incidents/:id", get(api::get_incident))
        .route("/incidents/:id/end", post(api::post_end_incident))
        .route("/incidents/:id/share", get(api::get_share_code))
        .route(
            "/incidents/:id/comments",
            get(api::get_comments).post(api::post_comment),
        )
        .route("/incidents/:id/likes", post(api::post_like))
        .route("/share/:code", get(api::get_shared_incident))
        .route("/users/:user_id/presence", put(api::put_presence))
        .route("/users/:user_id/alerts", get(api::get_user_alerts))
        .route(
            "/users/:user_id/notifications",
            get(api::get_user_notifications),
        )
        .route("/health", get(api::health_check))
        .with_state(state)
}
