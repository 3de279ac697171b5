// Integration tests for GET /api/engine/status and GET /api/engine/options

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use botfleet::api::{create_engine_router, EngineAppState};
use botfleet::config::ControlConfig;
use botfleet::control::ControlChannel;
use botfleet::message::Message;
use botfleet::registry::{Registry, SqliteRegistry};
use rusqlite::Connection;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn create_test_app(control: Arc<ControlChannel>, registry: SqliteRegistry) -> Router {
    create_engine_router(Arc::new(EngineAppState { control, registry }))
}

fn control() -> Arc<ControlChannel> {
    Arc::new(ControlChannel::new(&ControlConfig::default()))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// GET /api/engine/status follows engine control messages.
#[tokio::test]
async fn test_status_reflects_engine_flag() {
    let dir = TempDir::new().unwrap();
    let registry = SqliteRegistry::new(dir.path().join("registry.db"));
    let control = control();
    let app = create_test_app(Arc::clone(&control), registry);

    let response = app
        .clone()
        .oneshot(get_request("/api/engine/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["running"], true);

    control
        .dispatch(Message::new("engineControl").with_sub_kind("stop"))
        .await
        .unwrap();

    let response = app.oneshot(get_request("/api/engine/status")).await.unwrap();
    assert_eq!(body_json(response).await["running"], false);
}

/// GET /api/engine/options lists parsed destinations and agents.
#[tokio::test]
async fn test_options_lists_parsed_placements() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.db");
    let registry = SqliteRegistry::new(&path);
    drop(registry.open().unwrap());

    Connection::open(&path)
        .unwrap()
        .execute_batch(
            r#"
            INSERT INTO positions (uuid, name, object_type, object_class, location, position)
            VALUES ('cube-1', 'Bed', 'Bed', 'furniture', 'Isabel (10, 20, 30)', '(10, 20, 30.5)');
            INSERT INTO positions (uuid, name, object_type, object_class, location, position)
            VALUES ('cube-2', 'Broken', 'Bed', 'furniture', 'nowhere', '(1, 2, 3)');
            INSERT INTO positions (uuid, name, object_type, object_class, location, position)
            VALUES ('ctl-1', 'Controller', 'Bot Controller', 'none', 'Isabel (1, 1, 1)', '(1, 1, 1)');
            INSERT INTO agents (uuid, name, owner_key, location, position)
            VALUES ('agent-1', 'Bot One', 'owner-1', 'Isabel (5, 6, 7)', '(5, 6, 7)');
            "#,
        )
        .unwrap();

    let app = create_test_app(control(), registry);
    let response = app.oneshot(get_request("/api/engine/options")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let options = body_json(response).await;
    let destinations = options["destinations"].as_array().unwrap();
    assert_eq!(destinations.len(), 1);
    assert_eq!(destinations[0]["id"], "cube-1");
    assert_eq!(destinations[0]["region"], "Isabel");
    assert_eq!(destinations[0]["position"]["z"], 30.5);

    let agents = options["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["id"], "owner-1");
    assert_eq!(agents[0]["name"], "Bot One");
}

/// An unreachable registry is reported as 503, not a panic.
#[tokio::test]
async fn test_options_registry_unavailable() {
    let registry = SqliteRegistry::new("/nonexistent/dir/registry.db");
    let app = create_test_app(control(), registry);

    let response = app.oneshot(get_request("/api/engine/options")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await["error"].is_string());
}
