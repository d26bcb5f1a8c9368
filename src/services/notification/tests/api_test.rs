//! Admin HTTP API tests against the full router

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::*;
use notification_engine::routes::create_router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn router(engine: &notification_engine::NotificationEngine) -> Router {
    create_router(Arc::new(engine.clone()))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

fn campaign_body() -> Value {
    json!({
        "name": "API campaign",
        "channels": ["in_app"],
        "targeting": {"type": "filtered", "predicates": [{"predicate": "opted_into", "value": "marketing"}]},
        "template": {"subject": "Hi {{first_name}}", "body": "New arrivals are in."}
    })
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    let app = router(&engine);

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["channels"]["in_app"], true);

    let (status, body) = call(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("notification_engine_"));
}

#[tokio::test]
async fn test_unhealthy_channel_degrades_health() {
    let TestEngine { engine, .. } = build_engine(
        test_config(),
        vec![adapter(&FailingChannel::new(notify_shared::Channel::Email))],
    );
    let (status, body) = call(&router(&engine), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_campaign_start_runs_in_background() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    seed_users(&engine, 3).await;
    let app = router(&engine);

    let (status, created) = call(&app, Method::POST, "/api/v1/campaigns", Some(campaign_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "draft");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, started) =
        call(&app, Method::POST, &format!("/api/v1/campaigns/{}/start", id), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(started["status"], "active");

    let mut campaign = Value::Null;
    for _ in 0..50 {
        let (_, current) = call(&app, Method::GET, &format!("/api/v1/campaigns/{}", id), None).await;
        if current["status"] == "completed" {
            campaign = current;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(campaign["counters"]["delivered"], 3);

    let (status, stats) =
        call(&app, Method::GET, &format!("/api/v1/campaigns/{}/stats", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["records"]["delivered"], 3);

    let (status, recipients) =
        call(&app, Method::GET, &format!("/api/v1/campaigns/{}/recipients", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recipients.as_array().unwrap().len(), 3);

    let (status, body) =
        call(&app, Method::POST, &format!("/api/v1/campaigns/{}/start", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_campaign_errors_map_to_status_codes() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    let app = router(&engine);

    let (status, body) = call(&app, Method::GET, "/api/v1/campaigns/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let mut invalid = campaign_body();
    invalid["channels"] = json!([]);
    let (status, body) = call(&app, Method::POST, "/api/v1/campaigns", Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, created) = call(&app, Method::POST, "/api/v1/campaigns", Some(campaign_body())).await;
    let id = created["id"].as_str().unwrap();
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/api/v1/campaigns/{}/status", id),
        Some(json!({"status": "completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, cancelled) = call(
        &app,
        Method::PUT,
        &format!("/api/v1/campaigns/{}/status", id),
        Some(json!({"status": "cancelled"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, listed) = call(&app, Method::GET, "/api/v1/campaigns?status=cancelled", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_notification_endpoints() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    seed_users(&engine, 1).await;
    let app = router(&engine);

    let (status, sent) = call(
        &app,
        Method::POST,
        "/api/v1/notifications",
        Some(json!({
            "user_id": "u0",
            "title": "Back in stock",
            "body": "Hi {{first_name}}, your size is back.",
            "channels": ["in_app"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["status"], "delivered");
    let id = sent["id"].as_str().unwrap();

    let (status, inbox) = call(&app, Method::GET, "/api/v1/users/u0/inbox", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox[0]["body"], "Hi Customer, your size is back.");

    let (status, listed) =
        call(&app, Method::GET, "/api/v1/users/u0/notifications?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/notifications/{}", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, read) =
        call(&app, Method::POST, &format!("/api/v1/notifications/{}/read", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["status"], "read");

    let record_id = format!("{}:u0:in_app", id);
    let (status, record) =
        call(&app, Method::GET, &format!("/api/v1/deliveries/{}", record_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["state"], "read");

    let (status, clicked) =
        call(&app, Method::POST, &format!("/api/v1/deliveries/{}/click", record_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!clicked["clicked_at"].is_null());
}

#[tokio::test]
async fn test_schedule_endpoints() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    let app = router(&engine);

    let (status, entry) = call(
        &app,
        Method::POST,
        "/api/v1/schedules",
        Some(json!({
            "payload": {
                "kind": "notification",
                "request": {
                    "user_id": "u0",
                    "title": "Weekly digest",
                    "body": "Your digest is ready.",
                    "channels": ["in_app"]
                }
            },
            "trigger_at": "2030-01-01T09:00:00Z",
            "recurrence": {"frequency": "weekly", "end_at": null, "max_occurrences": 4}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["status"], "scheduled");
    let id = entry["id"].as_str().unwrap();

    let (status, listed) = call(&app, Method::GET, "/api/v1/schedules?status=scheduled", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["pagination"]["total"], 1);

    let (status, cancelled) =
        call(&app, Method::DELETE, &format!("/api/v1/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
