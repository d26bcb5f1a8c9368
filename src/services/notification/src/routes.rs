//! HTTP routes for the engine's admin API
//!
//! - Campaign CRUD, status changes, stats and recipient breakdown
//! - Notification send/read/cancel and per-user listings
//! - Delivery records (resend, read, click)
//! - Schedules
//! - Health and metrics endpoints

use crate::handlers::{
    campaigns_handler, deliveries_handler, health_handler, metrics_handler,
    notifications_handler, schedules_handler,
};
use crate::NotificationEngine;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Build the main router
pub fn create_router(engine: Arc<NotificationEngine>) -> Router {
    let timeout = Duration::from_secs(engine.config().server.request_timeout_seconds.max(1));
    let metrics_path = engine.config().metrics.endpoint.clone();

    let api_router = create_api_router(Arc::clone(&engine));
    let health_router = Router::new()
        .route("/health", get(health_handler))
        .route(&metrics_path, get(metrics_handler))
        .with_state(engine);

    Router::new()
        .merge(api_router)
        .merge(health_router)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(timeout))
                .into_inner(),
        )
}

fn create_api_router(engine: Arc<NotificationEngine>) -> Router {
    Router::new()
        // Campaigns
        .route(
            "/api/v1/campaigns",
            post(campaigns_handler::create_campaign).get(campaigns_handler::list_campaigns),
        )
        .route("/api/v1/campaigns/:id", get(campaigns_handler::get_campaign))
        .route(
            "/api/v1/campaigns/:id/start",
            post(campaigns_handler::start_campaign),
        )
        .route(
            "/api/v1/campaigns/:id/pause",
            post(campaigns_handler::pause_campaign),
        )
        .route(
            "/api/v1/campaigns/:id/cancel",
            post(campaigns_handler::cancel_campaign),
        )
        .route(
            "/api/v1/campaigns/:id/status",
            put(campaigns_handler::update_status),
        )
        .route(
            "/api/v1/campaigns/:id/stats",
            get(campaigns_handler::get_stats),
        )
        .route(
            "/api/v1/campaigns/:id/recipients",
            get(campaigns_handler::get_recipients),
        )
        // Notifications
        .route(
            "/api/v1/notifications",
            post(notifications_handler::send_notification),
        )
        .route(
            "/api/v1/notifications/:id",
            get(notifications_handler::get_notification)
                .delete(notifications_handler::cancel_notification),
        )
        .route(
            "/api/v1/notifications/:id/read",
            post(notifications_handler::mark_read),
        )
        .route(
            "/api/v1/users/:user_id/notifications",
            get(notifications_handler::list_for_user),
        )
        .route(
            "/api/v1/users/:user_id/inbox",
            get(notifications_handler::get_inbox),
        )
        // Delivery records
        .route(
            "/api/v1/deliveries/:id",
            get(deliveries_handler::get_delivery),
        )
        .route(
            "/api/v1/deliveries/:id/resend",
            post(deliveries_handler::resend),
        )
        .route(
            "/api/v1/deliveries/:id/read",
            post(deliveries_handler::mark_read),
        )
        .route(
            "/api/v1/deliveries/:id/click",
            post(deliveries_handler::record_click),
        )
        // Schedules
        .route(
            "/api/v1/schedules",
            post(schedules_handler::create_schedule).get(schedules_handler::list_schedules),
        )
        .route(
            "/api/v1/schedules/:id",
            get(schedules_handler::get_schedule).delete(schedules_handler::cancel_schedule),
        )
        .with_state(engine)
}
