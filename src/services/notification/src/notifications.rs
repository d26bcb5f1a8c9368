//! Single-recipient transactional notifications
//!
//! Notifications share the delivery state machine with campaigns: each
//! channel gets a `DeliveryRecord` owned by the notification, and the
//! notification's own status is settled from those records.

use crate::audience::AudienceResolver;
use crate::delivery::{ChannelAttempt, DeliveryJob, SendPipeline};
use crate::error::{NotificationError, Result};
use chrono::Utc;
use notify_database::{Filter, PagedResult, Pagination, Query, RecordStore, Sort, TypedCollection};
use notify_shared::{
    Channel, CreateNotificationRequest, DeliveryMetadata, DeliveryRecord, DeliveryState, Notification,
    NotificationOrigin, NotificationStatus, OrderMetadata, OrderSummary, OwnerKind,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

pub const NOTIFICATIONS_COLLECTION: &str = "notifications";

const ADMIN_CHANNELS: [Channel; 2] = [Channel::InApp, Channel::Email];
const ORDER_CHANNELS: [Channel; 3] = [Channel::InApp, Channel::Email, Channel::WhatsApp];

#[derive(Clone)]
pub struct NotificationService {
    notifications: TypedCollection<Notification>,
    audience: AudienceResolver,
    pipeline: SendPipeline,
    admin_user_ids: Arc<Vec<String>>,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        audience: AudienceResolver,
        pipeline: SendPipeline,
        admin_user_ids: Vec<String>,
    ) -> Self {
        Self {
            notifications: TypedCollection::new(store, NOTIFICATIONS_COLLECTION),
            audience,
            pipeline,
            admin_user_ids: Arc::new(admin_user_ids),
        }
    }

    pub async fn create(
        &self,
        request: CreateNotificationRequest,
        origin: NotificationOrigin,
    ) -> Result<Notification> {
        request.validate()?;

        let mut channels: Vec<Channel> = Vec::with_capacity(request.channels.len());
        for channel in request.channels {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }

        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id,
            title: request.title,
            body: request.body,
            channels,
            status: NotificationStatus::Pending,
            metadata: request.metadata,
            origin,
            error: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
            delivered_at: None,
            read_at: None,
        };

        self.notifications.insert(&notification.id, &notification).await?;
        debug!(notification_id = %notification.id, user_id = %notification.user_id, "Notification created");
        Ok(notification)
    }

    /// Create and deliver in one step.
    pub async fn send(
        &self,
        request: CreateNotificationRequest,
        origin: NotificationOrigin,
    ) -> Result<Notification> {
        let notification = self.create(request, origin).await?;
        self.deliver(&notification.id).await
    }

    /// Deliver a pending notification on every one of its channels.
    ///
    /// Already-claimed, settled or cancelled notifications are returned as they are.
    pub async fn deliver(&self, id: &str) -> Result<Notification> {
        let now = Utc::now();
        let claim = self
            .notifications
            .update_if(
                id,
                &[Filter::eq("status", NotificationStatus::Pending)],
                json!({"status": NotificationStatus::Sent, "sent_at": now, "updated_at": now}),
            )
            .await?;

        let notification = match claim {
            Some(claimed) => claimed,
            None => return self.get(id).await,
        };

        let recipient = match self.audience.resolve_one(&notification.user_id).await {
            Ok(recipient) => recipient,
            Err(NotificationError::NotFound { resource }) => {
                warn!(notification_id = id, user_id = %notification.user_id, "Notification recipient not found");
                return self.settle_failed(id, &format!("Not found: {}", resource)).await;
            }
            Err(e) => return Err(e),
        };

        let job = DeliveryJob {
            owner_kind: OwnerKind::Notification,
            owner_id: &notification.id,
            title_template: &notification.title,
            body_template: &notification.body,
            metadata: notification.metadata.as_ref(),
        };
        let attempts = self
            .pipeline
            .deliver_all(job, &recipient, &notification.channels)
            .await;

        let delivered = attempts.iter().filter(|a| a.is_delivered()).count();
        info!(
            notification_id = id,
            user_id = %notification.user_id,
            delivered,
            channels = attempts.len(),
            "Notification delivered"
        );

        self.settle(id, &attempts).await
    }

    pub async fn get(&self, id: &str) -> Result<Notification> {
        self.notifications
            .get(id)
            .await?
            .ok_or_else(|| NotificationError::not_found(format!("notification {}", id)))
    }

    /// A user's notifications, newest first
    pub async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<NotificationStatus>,
        pagination: Pagination,
    ) -> Result<PagedResult<Notification>> {
        let mut query = Query::new()
            .filter(Filter::eq("user_id", user_id))
            .sort(Sort::desc("created_at"))
            .page(pagination);
        if let Some(status) = status {
            query = query.filter(Filter::eq("status", status));
        }
        Ok(self.notifications.query(&query).await?)
    }

    /// Cancel a notification that has not been picked up for delivery.
    pub async fn cancel(&self, id: &str) -> Result<Notification> {
        let now = Utc::now();
        let cancelled = self
            .notifications
            .update_if(
                id,
                &[Filter::eq("status", NotificationStatus::Pending)],
                json!({"status": NotificationStatus::Cancelled, "updated_at": now}),
            )
            .await?;

        match cancelled {
            Some(notification) => {
                info!(notification_id = id, "Notification cancelled");
                Ok(notification)
            }
            None => {
                let current = self.get(id).await?;
                Err(NotificationError::conflict(format!(
                    "notification {} is {} and cannot be cancelled",
                    id, current.status
                )))
            }
        }
    }

    /// Mark a delivered notification read, along with its delivered records.
    pub async fn mark_read(&self, id: &str) -> Result<Notification> {
        let current = self.get(id).await?;
        match current.status {
            NotificationStatus::Read => return Ok(current),
            NotificationStatus::Delivered => {}
            other => {
                return Err(NotificationError::conflict(format!(
                    "notification {} is {} and cannot be marked read",
                    id, other
                )))
            }
        }

        let tracker = self.pipeline.tracker();
        for channel in &current.channels {
            let record_id = DeliveryRecord::key(&current.id, &current.user_id, *channel);
            if let Some(record) = tracker.get_record(&record_id).await? {
                if record.state == DeliveryState::Delivered {
                    tracker.mark_read(&record_id).await?;
                }
            }
        }

        let now = Utc::now();
        match self
            .notifications
            .update_if(
                id,
                &[Filter::eq("status", NotificationStatus::Delivered)],
                json!({"status": NotificationStatus::Read, "read_at": now, "updated_at": now}),
            )
            .await?
        {
            Some(read) => Ok(read),
            None => self.get(id).await,
        }
    }

    /// Re-send one notification delivery that never reached a terminal state.
    pub async fn resend(&self, record_id: &str) -> Result<DeliveryRecord> {
        let tracker = self.pipeline.tracker();
        let record = tracker
            .get_record(record_id)
            .await?
            .ok_or_else(|| NotificationError::not_found(format!("delivery {}", record_id)))?;
        if record.state.is_terminal() {
            return Ok(record);
        }
        if record.owner_kind != OwnerKind::Notification {
            return Err(NotificationError::validation(
                "record_id",
                "not a notification delivery",
            ));
        }

        let notification = self.get(&record.owner_id).await?;
        let recipient = self.audience.resolve_one(&record.recipient_id).await?;
        let job = DeliveryJob {
            owner_kind: OwnerKind::Notification,
            owner_id: &notification.id,
            title_template: &notification.title,
            body_template: &notification.body,
            metadata: notification.metadata.as_ref(),
        };
        self.pipeline.deliver(job, &recipient, record.channel).await;

        let records = tracker.records_for(&notification.id).await?;
        if records.len() == notification.channels.len()
            && records.iter().all(|r| r.state.is_terminal())
        {
            let attempts: Vec<ChannelAttempt> = records
                .iter()
                .map(|r| ChannelAttempt::Skipped {
                    channel: r.channel,
                    state: r.state,
                })
                .collect();
            let errors = records.iter().filter_map(|r| r.error.clone()).collect::<Vec<_>>();
            self.settle_with(&notification.id, &attempts, errors).await?;
        }

        tracker
            .get_record(record_id)
            .await?
            .ok_or_else(|| NotificationError::internal(format!("delivery {} vanished", record_id)))
    }

    /// Alert every configured admin. Failures are logged, not returned.
    pub async fn notify_admins(
        &self,
        title: &str,
        body: &str,
        metadata: Option<DeliveryMetadata>,
    ) -> Vec<Notification> {
        let channels = self.available_channels(&ADMIN_CHANNELS);
        if channels.is_empty() || self.admin_user_ids.is_empty() {
            debug!("No admin recipients or channels configured");
            return Vec::new();
        }

        let mut sent = Vec::with_capacity(self.admin_user_ids.len());
        for admin_id in self.admin_user_ids.iter() {
            let request = CreateNotificationRequest {
                user_id: admin_id.clone(),
                title: title.to_string(),
                body: body.to_string(),
                channels: channels.clone(),
                metadata: metadata.clone(),
            };
            match self.send(request, NotificationOrigin::BusinessEvent).await {
                Ok(notification) => sent.push(notification),
                Err(e) => warn!(admin_id = %admin_id, "Admin alert failed: {}", e),
            }
        }
        sent
    }

    /// Order confirmation to the customer plus an alert to admins.
    pub async fn notify_order_placed(&self, order: &OrderSummary) -> Result<Notification> {
        let amount = format_amount(order.amount_minor, &order.currency);
        let metadata = DeliveryMetadata::Order(OrderMetadata {
            order_id: order.order_id.clone(),
            amount_minor: order.amount_minor,
            currency: order.currency.clone(),
        });

        let request = CreateNotificationRequest {
            user_id: order.user_id.clone(),
            title: "Order confirmed".to_string(),
            body: format!(
                "Hi {{{{first_name}}}}, your order {} for {} has been placed. We'll let you know when it ships.",
                order.order_id, amount
            ),
            channels: self.available_channels(&ORDER_CHANNELS),
            metadata: Some(metadata.clone()),
        };
        let notification = self.send(request, NotificationOrigin::BusinessEvent).await?;

        self.notify_admins(
            &format!("New order {}", order.order_id),
            &format!("Order {} placed by user {} for {}.", order.order_id, order.user_id, amount),
            Some(metadata),
        )
        .await;

        Ok(notification)
    }

    /// Delivery records of one notification, in creation order
    pub async fn deliveries(&self, id: &str) -> Result<Vec<DeliveryRecord>> {
        self.pipeline.tracker().records_for(id).await
    }

    /// The subset of `wanted` with a registered adapter, in the given order
    pub fn available_channels(&self, wanted: &[Channel]) -> Vec<Channel> {
        let registered = self.pipeline.channels().channels();
        wanted
            .iter()
            .copied()
            .filter(|c| registered.contains(c))
            .collect()
    }

    async fn settle(&self, id: &str, attempts: &[ChannelAttempt]) -> Result<Notification> {
        let errors = attempts
            .iter()
            .filter_map(|a| match a {
                ChannelAttempt::Completed { outcome, .. } => outcome.error.clone(),
                ChannelAttempt::Skipped { .. } | ChannelAttempt::InFlight { .. } => None,
            })
            .collect();
        self.settle_with(id, attempts, errors).await
    }

    async fn settle_with(
        &self,
        id: &str,
        attempts: &[ChannelAttempt],
        errors: Vec<String>,
    ) -> Result<Notification> {
        if attempts.iter().any(ChannelAttempt::is_delivered) {
            let now = Utc::now();
            let error = (!errors.is_empty()).then(|| errors.join("; "));
            let patch = json!({
                "status": NotificationStatus::Delivered,
                "delivered_at": now,
                "updated_at": now,
                "error": error,
            });
            self.apply_settlement(id, patch).await
        } else {
            let reason = if errors.is_empty() {
                "no channel delivered".to_string()
            } else {
                errors.join("; ")
            };
            self.settle_failed(id, &reason).await
        }
    }

    async fn settle_failed(&self, id: &str, reason: &str) -> Result<Notification> {
        let patch = json!({
            "status": NotificationStatus::Failed,
            "error": reason,
            "updated_at": Utc::now(),
        });
        self.apply_settlement(id, patch).await
    }

    async fn apply_settlement(&self, id: &str, patch: serde_json::Value) -> Result<Notification> {
        let guard = [Filter::is_in(
            "status",
            [NotificationStatus::Pending, NotificationStatus::Sent],
        )];
        match self.notifications.update_if(id, &guard, patch).await? {
            Some(settled) => Ok(settled),
            None => self.get(id).await,
        }
    }
}

/// `1999, "INR"` -> `"INR 19.99"`
pub fn format_amount(amount_minor: i64, currency: &str) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{} {}{}.{:02}", currency, sign, abs / 100, abs % 100)
}
