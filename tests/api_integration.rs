//! Integration tests for DisasterZone API endpoints.
//!
//! These tests verify the full request/response cycle through the HTTP API.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use disasterzone::api::AppState;
use disasterzone::storage::Storage;

async fn create_test_server() -> TestServer {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let state = AppState {
        storage,
        alert_radius_meters: 1000.0,
    };

    TestServer::new(disasterzone::router(state)).unwrap()
}

async fn set_presence(server: &TestServer, user_id: &str, lat: f64, lon: f64) {
    server
        .put(&format!("/users/{user_id}/presence"))
        .json(&json!({ "latitude": lat, "longitude": lon }))
        .await
        .assert_status_ok();
}

async fn publish(server: &TestServer, reporter_id: &str, lat: f64, lon: f64) -> Value {
    let response = server
        .post("/incidents")
        .json(&json!({
            "reporter_id": reporter_id,
            "reporter_name": "Reporter",
            "latitude": lat,
            "longitude": lon,
            "description": "Flash flood near the river bank"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_publish_alerts_nearby_users() {
    let server = create_test_server().await;
    set_presence(&server, "a", 0.0, 0.005).await;
    set_presence(&server, "r1", 0.0, 0.005).await;
    set_presence(&server, "far", 0.0, 0.05).await;
    set_presence(&server, "c", 0.0, 0.0).await;

    let body = publish(&server, "r1", 0.0, 0.001).await;

    assert_eq!(body["alerted"], 1);
    assert_eq!(body["incident"]["status"], "active");

    let alerts: Value = server.get("/users/a/alerts").await.json();
    assert_eq!(alerts.as_array().unwrap().len(), 1);
    assert_eq!(alerts[0]["title"], "DANGER NEARBY");
    assert_eq!(
        alerts[0]["message"],
        "New disaster report: Flash flood near the river bank"
    );

    for user in ["r1", "far", "c"] {
        let alerts: Value = server.get(&format!("/users/{user}/alerts")).await.json();
        assert!(alerts.as_array().unwrap().is_empty(), "{user} was alerted");
    }
}

#[tokio::test]
async fn test_publish_rejects_invalid_input() {
    let server = create_test_server().await;

    let response = server
        .post("/incidents")
        .json(&json!({
            "reporter_id": "r1",
            "latitude": 95.0,
            "longitude": 0.0,
            "description": "flood"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let response = server
        .post("/incidents")
        .json(&json!({
            "reporter_id": "r1",
            "latitude": 1.0,
            "longitude": 1.0,
            "description": ""
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_end_incident_lifecycle() {
    let server = create_test_server().await;
    let body = publish(&server, "r1", 3.139, 101.6869).await;
    let id = body["incident"]["id"].as_str().unwrap().to_string();

    // ~2 km away
    let response = server
        .post(&format!("/incidents/{id}/end"))
        .json(&json!({ "user_id": "u2", "latitude": 3.157, "longitude": 101.6869 }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "TOO_FAR");

    let response = server
        .post(&format!("/incidents/{id}/end"))
        .json(&json!({ "user_id": "u2", "latitude": 3.139, "longitude": 101.6869 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "inactive");
    assert_eq!(body["state"], "inactive");
    assert_eq!(body["ended_by"], "u2");
    assert!(body["ended_at"].as_i64().is_some());

    let response = server
        .post(&format!("/incidents/{id}/end"))
        .json(&json!({ "user_id": "u3", "latitude": 3.139, "longitude": 101.6869 }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_ACTIVE");
}

#[tokio::test]
async fn test_unknown_incident_is_not_found() {
    let server = create_test_server().await;

    let response = server.get("/incidents/does-not-exist").await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = server
        .post("/incidents/does-not-exist/end")
        .json(&json!({ "user_id": "u", "latitude": 0.0, "longitude": 0.0 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feed_filters_and_counts() {
    let server = create_test_server().await;
    let first = publish(&server, "r1", 10.0, 10.0).await;
    let second = publish(&server, "r2", 20.0, 20.0).await;
    let first_id = first["incident"]["id"].as_str().unwrap();

    server
        .post(&format!("/incidents/{first_id}/likes"))
        .json(&json!({ "user_id": "fan" }))
        .await
        .assert_status_ok();
    server
        .post(&format!("/incidents/{first_id}/end"))
        .json(&json!({ "user_id": "r1", "latitude": 10.0, "longitude": 10.0 }))
        .await
        .assert_status_ok();

    let feed: Value = server.get("/incidents").await.json();
    assert_eq!(feed.as_array().unwrap().len(), 2);
    let liked = feed
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["id"] == first["incident"]["id"])
        .unwrap();
    assert_eq!(liked["like_count"], 1);
    assert_eq!(liked["state"], "inactive");

    let active: Value = server.get("/incidents?active_only=true").await.json();
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["id"], second["incident"]["id"]);
}

#[tokio::test]
async fn test_comments_likes_and_notifications() {
    let server = create_test_server().await;
    let body = publish(&server, "owner", 1.0, 1.0).await;
    let id = body["incident"]["id"].as_str().unwrap().to_string();

    let response = server
        .post(&format!("/incidents/{id}/comments"))
        .json(&json!({ "user_id": "helper", "username": "Dana", "text": "Roads are blocked" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let like: Value = server
        .post(&format!("/incidents/{id}/likes"))
        .json(&json!({ "user_id": "helper" }))
        .await
        .json();
    assert_eq!(like["liked"], true);
    assert_eq!(like["like_count"], 1);

    let comments: Value = server.get(&format!("/incidents/{id}/comments")).await.json();
    assert_eq!(comments[0]["text"], "Roads are blocked");
    assert_eq!(comments[0]["username"], "Dana");

    let inbox: Value = server.get("/users/owner/notifications").await.json();
    let kinds: Vec<&str> = inbox
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert_eq!(inbox.as_array().unwrap().len(), 2);
    assert!(kinds.contains(&"like"));
    assert!(kinds.contains(&"comment"));
}

#[tokio::test]
async fn test_share_code_flow() {
    let server = create_test_server().await;
    let body = publish(&server, "owner", 1.0, 1.0).await;
    let id = body["incident"]["id"].as_str().unwrap().to_string();

    let share: Value = server.get(&format!("/incidents/{id}/share")).await.json();
    let code = share["code"].as_str().unwrap();
    assert_eq!(code, format!("DISASTER_ZONE|{id}"));

    let resolved = server.get(&format!("/share/{}", code.replace('|', "%7C"))).await;
    resolved.assert_status_ok();
    let resolved: Value = resolved.json();
    assert_eq!(resolved["id"], id);

    let response = server.get("/share/not-a-code").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_SHARE_CODE");
}

#[tokio::test]
async fn test_presence_placeholder_is_unset() {
    let server = create_test_server().await;

    let response = server
        .put("/users/u1/presence")
        .json(&json!({ "latitude": 0.0, "longitude": 0.0 }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["location"].is_null());
}

#[tokio::test]
async fn test_viewer_location_adds_distance_and_can_end() {
    let server = create_test_server().await;
    let body = publish(&server, "r1", 3.139, 101.6869).await;
    let id = body["incident"]["id"].as_str().unwrap().to_string();

    let plain: Value = server.get(&format!("/incidents/{id}")).await.json();
    assert!(plain.get("distance_meters").is_none());
    assert!(plain.get("can_end").is_none());

    // ~500 m north
    let near: Value = server
        .get(&format!("/incidents/{id}?latitude=3.1435&longitude=101.6869"))
        .await
        .json();
    assert!(near["distance_meters"].as_f64().unwrap() < 1000.0);
    assert_eq!(near["can_end"], true);

    // ~2 km north
    let feed: Value = server
        .get("/incidents?latitude=3.157&longitude=101.6869")
        .await
        .json();
    assert!(feed[0]["distance_meters"].as_f64().unwrap() > 1900.0);
    assert_eq!(feed[0]["can_end"], false);

    let response = server.get("/incidents?latitude=3.157").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_presence_with_one_coordinate_is_rejected() {
    let server = create_test_server().await;

    let response = server
        .put("/users/u1/presence")
        .json(&json!({ "latitude": 3.139 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}
