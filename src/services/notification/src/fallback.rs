//! Composite operations with a single-notification fallback
//!
//! A composite operation (order confirmation, invoice delivery) marks channel successes on a
//! `CompositeProgress` handle as it goes. If it fails before any success, the
//! coordinator creates exactly one fallback notification on the configured
//! channel. Callers always get a `CompositeOutcome` value back, never an error.

use crate::error::{NotificationError, Result};
use crate::metrics::EngineMetrics;
use crate::notifications::NotificationService;
use async_trait::async_trait;
use notify_shared::{
    Channel, CreateNotificationRequest, DeliveryMetadata, Invoice, InvoiceMetadata,
    Notification, NotificationOrigin, NotificationStatus, OrderSummary,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

const INVOICE_CHANNELS: [Channel; 3] = [Channel::Email, Channel::WhatsApp, Channel::InApp];

/// Success marks shared between a composite operation and the coordinator
#[derive(Debug, Clone, Default)]
pub struct CompositeProgress {
    successes: Arc<Mutex<Vec<Channel>>>,
}

impl CompositeProgress {
    pub fn mark_success(&self, channel: Channel) {
        let mut successes = self.successes.lock();
        if !successes.contains(&channel) {
            successes.push(channel);
        }
    }

    pub fn successes(&self) -> Vec<Channel> {
        self.successes.lock().clone()
    }

    pub fn any_success(&self) -> bool {
        !self.successes.lock().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompositeOutcome {
    Completed {
        successes: Vec<Channel>,
    },
    PartiallyCompleted {
        successes: Vec<Channel>,
        error: String,
    },
    FellBack {
        error: String,
        notification_id: Option<String>,
        fallback_error: Option<String>,
    },
}

impl CompositeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::PartiallyCompleted { .. } => "partially_completed",
            Self::FellBack {
                fallback_error: None,
                ..
            } => "fell_back",
            Self::FellBack { .. } => "fallback_failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// What the fallback notification says
#[derive(Debug, Clone)]
pub struct FallbackMessage {
    pub title: String,
    pub body: String,
    pub metadata: Option<DeliveryMetadata>,
}

/// Renders invoices; PDF generation lives outside the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InvoiceGenerator: Send + Sync {
    async fn generate(&self, order: &OrderSummary) -> Result<Invoice>;
}

#[derive(Clone)]
pub struct FallbackCoordinator {
    notifications: NotificationService,
    metrics: EngineMetrics,
    fallback_channel: Channel,
}

impl FallbackCoordinator {
    pub fn new(
        notifications: NotificationService,
        metrics: EngineMetrics,
        fallback_channel: Channel,
    ) -> Self {
        Self {
            notifications,
            metrics,
            fallback_channel,
        }
    }

    /// Run `operation`, degrading to one fallback notification for `user_id`
    /// when it fails before marking any success.
    pub async fn execute<F, Fut>(
        &self,
        operation: &str,
        user_id: &str,
        fallback: FallbackMessage,
        op: F,
    ) -> CompositeOutcome
    where
        F: FnOnce(CompositeProgress) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let progress = CompositeProgress::default();
        let result = op(progress.clone()).await;

        let outcome = match result {
            Ok(()) => CompositeOutcome::Completed {
                successes: progress.successes(),
            },
            Err(e) if progress.any_success() => CompositeOutcome::PartiallyCompleted {
                successes: progress.successes(),
                error: e.to_string(),
            },
            Err(e) => self.fall_back(user_id, fallback, e).await,
        };

        match &outcome {
            CompositeOutcome::Completed { successes } => {
                info!(operation, user_id, ?successes, "Composite operation completed")
            }
            CompositeOutcome::PartiallyCompleted { successes, error } => {
                warn!(operation, user_id, ?successes, error = %error, "Composite operation partially completed")
            }
            CompositeOutcome::FellBack {
                error,
                notification_id,
                fallback_error: None,
            } => warn!(
                operation,
                user_id,
                error = %error,
                notification_id = notification_id.as_deref().unwrap_or_default(),
                "Composite operation fell back"
            ),
            CompositeOutcome::FellBack {
                error,
                fallback_error: Some(fallback_error),
                ..
            } => error!(
                operation,
                user_id,
                error = %error,
                fallback_error = %fallback_error,
                "Composite operation and its fallback both failed"
            ),
        }
        self.metrics.record_composite_outcome(outcome.label());
        outcome
    }

    async fn fall_back(
        &self,
        user_id: &str,
        fallback: FallbackMessage,
        cause: NotificationError,
    ) -> CompositeOutcome {
        let request = CreateNotificationRequest {
            user_id: user_id.to_string(),
            title: fallback.title,
            body: fallback.body,
            channels: vec![self.fallback_channel],
            metadata: fallback.metadata,
        };

        let (notification_id, fallback_error) = match self
            .notifications
            .send(request, NotificationOrigin::Fallback)
            .await
        {
            Ok(notification) if notification.status == NotificationStatus::Failed => {
                let reason = notification
                    .error
                    .clone()
                    .unwrap_or_else(|| "fallback delivery failed".to_string());
                (Some(notification.id), Some(reason))
            }
            Ok(notification) => (Some(notification.id), None),
            Err(e) => (None, Some(e.to_string())),
        };

        CompositeOutcome::FellBack {
            error: cause.to_string(),
            notification_id,
            fallback_error,
        }
    }

    /// Generate the invoice, send it on email, WhatsApp and in-app, then alert admins.
    pub async fn deliver_invoice(
        &self,
        order: &OrderSummary,
        generator: &dyn InvoiceGenerator,
    ) -> CompositeOutcome {
        let fallback = FallbackMessage {
            title: format!("Your invoice for order {}", order.order_id),
            body: format!(
                "We couldn't send the invoice for order {} right now. You can download it from your order history.",
                order.order_id
            ),
            metadata: None,
        };

        self.execute("deliver_invoice", &order.user_id, fallback, |progress| async move {
            let invoice = generator.generate(order).await?;
            let metadata = DeliveryMetadata::Invoice(InvoiceMetadata {
                invoice_id: invoice.invoice_id.clone(),
                order_id: order.order_id.clone(),
                invoice_url: invoice.url.clone(),
            });

            let link = invoice
                .url
                .as_deref()
                .map(|url| format!(" Download it here: {}", url))
                .unwrap_or_default();
            let request = CreateNotificationRequest {
                user_id: order.user_id.clone(),
                title: format!("Invoice {} for order {}", invoice.invoice_id, order.order_id),
                body: format!(
                    "Hi {{{{first_name}}}}, your invoice {} is ready.{}",
                    invoice.invoice_id, link
                ),
                channels: self.notifications.available_channels(&INVOICE_CHANNELS),
                metadata: Some(metadata.clone()),
            };
            let notification = self
                .notifications
                .send(request, NotificationOrigin::BusinessEvent)
                .await?;
            let delivered = self
                .track_channels(&notification, &progress, "invoice delivery")
                .await;

            self.notifications
                .notify_admins(
                    &format!("Invoice {} issued", invoice.invoice_id),
                    &format!(
                        "Invoice {} for order {} was sent to user {}.",
                        invoice.invoice_id, order.order_id, order.user_id
                    ),
                    Some(metadata),
                )
                .await;

            delivered
        })
        .await
    }

    /// Order confirmation to the customer plus an admin alert.
    pub async fn order_placed(&self, order: &OrderSummary) -> CompositeOutcome {
        let fallback = FallbackMessage {
            title: "Order received".to_string(),
            body: format!(
                "We received your order {}. Details are in your order history.",
                order.order_id
            ),
            metadata: None,
        };

        self.execute("order_placed", &order.user_id, fallback, |progress| async move {
            let notification = self.notifications.notify_order_placed(order).await?;
            self.track_channels(&notification, &progress, "order confirmation")
                .await
        })
        .await
    }

    /// Mark each delivered channel of `notification`; error if any channel
    /// or the notification as a whole failed.
    async fn track_channels(
        &self,
        notification: &Notification,
        progress: &CompositeProgress,
        service: &str,
    ) -> Result<()> {
        let mut failures = Vec::new();
        for record in self.notifications.deliveries(&notification.id).await? {
            if record.state.is_delivered() {
                progress.mark_success(record.channel);
            } else {
                failures.push(format!(
                    "{}: {}",
                    record.channel,
                    record.error.unwrap_or_else(|| record.state.to_string())
                ));
            }
        }

        if failures.is_empty() && notification.status == NotificationStatus::Failed {
            failures.push(
                notification
                    .error
                    .clone()
                    .unwrap_or_else(|| "notification failed".to_string()),
            );
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::external_service(service, failures.join("; ")))
        }
    }
}
