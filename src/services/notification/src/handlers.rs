//! Request handlers for the engine's admin API
//!
//! - Campaign handlers (CRUD, status changes, stats)
//! - Notification handlers
//! - Delivery record handlers (resend, read, click)
//! - Schedule handlers
//! - Health and metrics handlers

use crate::error::{NotificationError, Result};
use crate::NotificationEngine;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use notify_database::Pagination;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    fn pagination(&self) -> Pagination {
        let default = Pagination::default();
        Pagination::new(
            self.page.unwrap_or(default.page),
            self.limit.unwrap_or(default.limit),
        )
    }
}

pub mod campaigns_handler {
    use super::*;
    use notify_shared::{CampaignStatus, CreateCampaignRequest, UpdateCampaignStatusRequest};

    #[derive(Debug, Deserialize)]
    pub struct CampaignListQuery {
        pub status: Option<CampaignStatus>,
        pub page: Option<u32>,
        pub limit: Option<u32>,
    }

    pub async fn create_campaign(
        State(engine): State<Arc<NotificationEngine>>,
        Json(request): Json<CreateCampaignRequest>,
    ) -> Result<impl IntoResponse> {
        info!(name = %request.name, "Creating campaign");
        let campaign = engine.create_campaign(request).await?;
        Ok((StatusCode::CREATED, Json(campaign)))
    }

    pub async fn list_campaigns(
        State(engine): State<Arc<NotificationEngine>>,
        Query(query): Query<CampaignListQuery>,
    ) -> Result<impl IntoResponse> {
        let pagination = PageQuery {
            page: query.page,
            limit: query.limit,
        }
        .pagination();
        Ok(Json(engine.list_campaigns(query.status, pagination).await?))
    }

    pub async fn get_campaign(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.get_campaign(&id).await?))
    }

    /// Claims the campaign and dispatches it in the background
    pub async fn start_campaign(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        match engine.start_campaign(&id).await {
            Ok(campaign) => {
                info!(campaign_id = %id, "Campaign dispatch accepted");
                Ok((StatusCode::ACCEPTED, Json(campaign)))
            }
            Err(e) => {
                error!(campaign_id = %id, "Failed to start campaign: {}", e);
                Err(e)
            }
        }
    }

    pub async fn pause_campaign(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.pause_campaign(&id).await?))
    }

    pub async fn cancel_campaign(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.cancel_campaign(&id).await?))
    }

    pub async fn update_status(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
        Json(request): Json<UpdateCampaignStatusRequest>,
    ) -> Result<impl IntoResponse> {
        let campaign = match request.status {
            CampaignStatus::Active => engine.start_campaign(&id).await?,
            CampaignStatus::Paused => engine.pause_campaign(&id).await?,
            CampaignStatus::Cancelled => engine.cancel_campaign(&id).await?,
            other => {
                return Err(NotificationError::validation(
                    "status",
                    format!("cannot set campaign status to {}", other),
                ))
            }
        };
        Ok(Json(campaign))
    }

    pub async fn get_stats(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.campaign_stats(&id).await?))
    }

    pub async fn get_recipients(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.campaign_recipients(&id).await?))
    }
}

pub mod notifications_handler {
    use super::*;
    use notify_shared::{CreateNotificationRequest, NotificationStatus};

    #[derive(Debug, Deserialize)]
    pub struct UserNotificationsQuery {
        pub status: Option<NotificationStatus>,
        pub page: Option<u32>,
        pub limit: Option<u32>,
    }

    pub async fn send_notification(
        State(engine): State<Arc<NotificationEngine>>,
        Json(request): Json<CreateNotificationRequest>,
    ) -> Result<impl IntoResponse> {
        info!(user_id = %request.user_id, channels = ?request.channels, "Sending notification");
        let notification = engine.send_notification(request).await?;
        Ok((StatusCode::CREATED, Json(notification)))
    }

    pub async fn get_notification(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.get_notification(&id).await?))
    }

    pub async fn mark_read(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.mark_notification_read(&id).await?))
    }

    pub async fn cancel_notification(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.cancel_notification(&id).await?))
    }

    pub async fn list_for_user(
        State(engine): State<Arc<NotificationEngine>>,
        Path(user_id): Path<String>,
        Query(query): Query<UserNotificationsQuery>,
    ) -> Result<impl IntoResponse> {
        let pagination = PageQuery {
            page: query.page,
            limit: query.limit,
        }
        .pagination();
        Ok(Json(
            engine
                .list_notifications(&user_id, query.status, pagination)
                .await?,
        ))
    }

    pub async fn get_inbox(
        State(engine): State<Arc<NotificationEngine>>,
        Path(user_id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.inbox(&user_id).await?))
    }
}

pub mod deliveries_handler {
    use super::*;

    pub async fn get_delivery(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.get_delivery(&id).await?))
    }

    pub async fn resend(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.resend(&id).await?))
    }

    pub async fn mark_read(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.mark_delivery_read(&id).await?))
    }

    pub async fn record_click(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.record_click(&id).await?))
    }
}

pub mod schedules_handler {
    use super::*;
    use notify_shared::{CreateScheduleRequest, ScheduleStatus};

    #[derive(Debug, Deserialize)]
    pub struct ScheduleListQuery {
        pub status: Option<ScheduleStatus>,
        pub page: Option<u32>,
        pub limit: Option<u32>,
    }

    pub async fn create_schedule(
        State(engine): State<Arc<NotificationEngine>>,
        Json(request): Json<CreateScheduleRequest>,
    ) -> Result<impl IntoResponse> {
        let entry = engine.schedule(request).await?;
        Ok((StatusCode::CREATED, Json(entry)))
    }

    pub async fn list_schedules(
        State(engine): State<Arc<NotificationEngine>>,
        Query(query): Query<ScheduleListQuery>,
    ) -> Result<impl IntoResponse> {
        let pagination = PageQuery {
            page: query.page,
            limit: query.limit,
        }
        .pagination();
        Ok(Json(engine.list_schedules(query.status, pagination).await?))
    }

    pub async fn get_schedule(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.get_schedule(&id).await?))
    }

    pub async fn cancel_schedule(
        State(engine): State<Arc<NotificationEngine>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(engine.cancel_schedule(&id).await?))
    }
}

/// Health check handler
pub async fn health_handler(State(engine): State<Arc<NotificationEngine>>) -> impl IntoResponse {
    let health = engine.health_check().await;
    let status = if health["status"] == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// Prometheus text exposition
pub async fn metrics_handler(
    State(engine): State<Arc<NotificationEngine>>,
) -> Result<impl IntoResponse> {
    let body = engine.metrics().export_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
