//! # Notification Engine
//!
//! Multi-channel notification and campaign delivery engine for the storefront:
//! - Campaigns fanned out to a targeted audience in throttled batches
//! - In-app, email (SMTP), WhatsApp and push channels
//! - Per-recipient, per-channel delivery tracking with live progress and ETA
//! - Transactional notifications (order placed, invoices, admin alerts)
//! - Fallback notifications when a composite delivery fails outright
//! - One-off and recurring schedules
//!
//! ## Usage
//!
//! ```rust,no_run
//! use notification_engine::{EngineConfig, NotificationEngine};
//! use notify_database::InMemoryStore;
//! use notify_shared::{Channel, CreateCampaignRequest, MessageTemplate, TargetingSpec};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = NotificationEngine::new(EngineConfig::from_env()?, Arc::new(InMemoryStore::new()))?;
//!
//!     let campaign = engine
//!         .create_campaign(CreateCampaignRequest {
//!             name: "Weekend sale".to_string(),
//!             channels: vec![Channel::InApp, Channel::Email],
//!             targeting: TargetingSpec::All,
//!             template: MessageTemplate {
//!                 subject: "Hi {{first_name}}".to_string(),
//!                 body: "Everything is 20% off until Sunday.".to_string(),
//!             },
//!         })
//!         .await?;
//!
//!     let report = engine.run_campaign(&campaign.id).await?;
//!     println!("{} delivered", report.counters.delivered);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod audience;
pub mod campaign;
pub mod channels;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod metrics;
pub mod notifications;
pub mod personalization;
pub mod progress;
pub mod routes;
pub mod scheduler;
pub mod tracker;

pub use config::EngineConfig;
pub use error::{NotificationError, Result};

use audience::AudienceResolver;
use campaign::CampaignService;
use channels::{ChannelRegistry, InAppChannel, InboxMessage};
use delivery::SendPipeline;
use dispatcher::{BatchDispatcher, DispatchEvent, DispatchSettings, ProgressBroadcaster, ProgressObserver};
use fallback::{CompositeOutcome, FallbackCoordinator, InvoiceGenerator};
use metrics::EngineMetrics;
use notifications::NotificationService;
use notify_database::{PagedResult, Pagination, RecordStore};
use notify_shared::{
    AggregateStats, Campaign, CampaignStatus, CreateCampaignRequest, CreateNotificationRequest,
    CreateScheduleRequest, DeliveryRecord, DispatchReport, Notification, NotificationOrigin,
    NotificationStatus, OrderSummary, OwnerKind, RecipientBreakdown, ScheduleEntry, ScheduleStatus,
    UserProfile,
};
use scheduler::{ScheduleFiring, Scheduler};
use tokio::sync::broadcast;
use tracker::DeliveryTracker;
use tracing::info;

/// Engine facade wiring every component over one record store
#[derive(Clone)]
pub struct NotificationEngine {
    config: Arc<EngineConfig>,
    metrics: EngineMetrics,
    channels: ChannelRegistry,
    tracker: DeliveryTracker,
    audience: AudienceResolver,
    campaigns: CampaignService,
    dispatcher: BatchDispatcher,
    notifications: NotificationService,
    fallback: FallbackCoordinator,
    scheduler: Scheduler,
    broadcaster: ProgressBroadcaster,
    inbox: InAppChannel,
}

impl NotificationEngine {
    /// Validate `config` and build the channel adapters it enables
    pub fn new(config: EngineConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        config.validate()?;
        let channels = ChannelRegistry::from_config(&config, store.clone())?;
        Self::with_channels(config, store, channels)
    }

    /// Build the engine around an explicit set of adapters
    pub fn with_channels(
        config: EngineConfig,
        store: Arc<dyn RecordStore>,
        channels: ChannelRegistry,
    ) -> Result<Self> {
        let metrics = EngineMetrics::new(&config.metrics)?;
        let tracker = DeliveryTracker::new(store.clone());
        let audience = AudienceResolver::new(store.clone());
        let campaigns = CampaignService::new(store.clone());
        let pipeline = SendPipeline::new(
            tracker.clone(),
            channels.clone(),
            metrics.clone(),
            config.send_timeout(),
        );
        let dispatcher = BatchDispatcher::new(
            campaigns.clone(),
            audience.clone(),
            pipeline.clone(),
            metrics.clone(),
            DispatchSettings::from(&config),
        );
        let notifications = NotificationService::new(
            store.clone(),
            audience.clone(),
            pipeline,
            config.fallback.admin_user_ids.clone(),
        );
        let fallback =
            FallbackCoordinator::new(notifications.clone(), metrics.clone(), config.fallback.channel);
        let broadcaster = ProgressBroadcaster::default();
        let scheduler = Scheduler::new(
            store.clone(),
            campaigns.clone(),
            dispatcher.clone(),
            notifications.clone(),
            Arc::new(broadcaster.clone()),
            metrics.clone(),
            &config.scheduler,
        );

        info!(channels = ?channels.channels(), "Notification engine initialized");

        Ok(Self {
            config: Arc::new(config),
            metrics,
            channels,
            tracker,
            audience,
            campaigns,
            dispatcher,
            notifications,
            fallback,
            scheduler,
            broadcaster,
            inbox: InAppChannel::new(store),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    // ---- users -------------------------------------------------------------

    pub async fn register_users(&self, profiles: &[UserProfile]) -> Result<usize> {
        for profile in profiles {
            self.audience.register_user(profile).await?;
        }
        Ok(profiles.len())
    }

    pub async fn inbox(&self, user_id: &str) -> Result<Vec<InboxMessage>> {
        self.inbox.inbox_for(user_id).await
    }

    // ---- campaigns ---------------------------------------------------------

    pub async fn create_campaign(&self, request: CreateCampaignRequest) -> Result<Campaign> {
        self.campaigns.create(request).await
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Campaign> {
        self.campaigns.get(id).await
    }

    pub async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
        pagination: Pagination,
    ) -> Result<PagedResult<Campaign>> {
        self.campaigns.list(status, pagination).await
    }

    /// Start (or resume) a campaign in the background; progress goes to the broadcaster.
    pub async fn start_campaign(&self, id: &str) -> Result<Campaign> {
        let observer: Arc<dyn ProgressObserver> = Arc::new(self.broadcaster.clone());
        let (campaign, _handle) = self.dispatcher.spawn_campaign(id, observer).await?;
        Ok(campaign)
    }

    /// Run a campaign on the calling task and wait for it to finish.
    pub async fn run_campaign(&self, id: &str) -> Result<DispatchReport> {
        self.dispatcher.run_campaign(id, &self.broadcaster).await
    }

    pub async fn run_campaign_with(
        &self,
        id: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<DispatchReport> {
        self.dispatcher.run_campaign(id, observer).await
    }

    pub async fn pause_campaign(&self, id: &str) -> Result<Campaign> {
        self.campaigns.transition(id, CampaignStatus::Paused).await
    }

    pub async fn cancel_campaign(&self, id: &str) -> Result<Campaign> {
        self.campaigns.transition(id, CampaignStatus::Cancelled).await
    }

    pub async fn campaign_stats(&self, id: &str) -> Result<AggregateStats> {
        let campaign = self.campaigns.get(id).await?;
        self.tracker.get_aggregate_stats(&campaign.id).await
    }

    pub async fn campaign_recipients(&self, id: &str) -> Result<Vec<RecipientBreakdown>> {
        let campaign = self.campaigns.get(id).await?;
        self.tracker.get_recipient_breakdown(&campaign.id).await
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<DispatchEvent> {
        self.broadcaster.subscribe()
    }

    pub fn subscribe_campaign_progress(&self, id: &str) -> broadcast::Receiver<DispatchEvent> {
        self.broadcaster.subscribe_campaign(id)
    }

    // ---- deliveries --------------------------------------------------------

    pub async fn get_delivery(&self, record_id: &str) -> Result<DeliveryRecord> {
        self.tracker
            .get_record(record_id)
            .await?
            .ok_or_else(|| NotificationError::not_found(format!("delivery {}", record_id)))
    }

    /// Re-send a delivery that never reached a terminal state; terminal records are returned as is.
    pub async fn resend(&self, record_id: &str) -> Result<DeliveryRecord> {
        let record = self.get_delivery(record_id).await?;
        match record.owner_kind {
            OwnerKind::Campaign => self.dispatcher.resend(record_id).await,
            OwnerKind::Notification => self.notifications.resend(record_id).await,
        }
    }

    pub async fn mark_delivery_read(&self, record_id: &str) -> Result<DeliveryRecord> {
        self.tracker.mark_read(record_id).await
    }

    pub async fn record_click(&self, record_id: &str) -> Result<DeliveryRecord> {
        self.tracker.record_click(record_id).await
    }

    // ---- notifications -----------------------------------------------------

    pub async fn send_notification(&self, request: CreateNotificationRequest) -> Result<Notification> {
        self.notifications.send(request, NotificationOrigin::Manual).await
    }

    pub async fn get_notification(&self, id: &str) -> Result<Notification> {
        self.notifications.get(id).await
    }

    pub async fn list_notifications(
        &self,
        user_id: &str,
        status: Option<NotificationStatus>,
        pagination: Pagination,
    ) -> Result<PagedResult<Notification>> {
        self.notifications.list_for_user(user_id, status, pagination).await
    }

    pub async fn cancel_notification(&self, id: &str) -> Result<Notification> {
        self.notifications.cancel(id).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<Notification> {
        self.notifications.mark_read(id).await
    }

    /// Order confirmation plus admin alert, degrading to a fallback notice.
    pub async fn order_placed(&self, order: &OrderSummary) -> CompositeOutcome {
        self.fallback.order_placed(order).await
    }

    pub async fn deliver_invoice(
        &self,
        order: &OrderSummary,
        generator: &dyn InvoiceGenerator,
    ) -> CompositeOutcome {
        self.fallback.deliver_invoice(order, generator).await
    }

    pub async fn notify_admins(&self, title: &str, body: &str) -> Vec<Notification> {
        self.notifications.notify_admins(title, body, None).await
    }

    // ---- schedules ---------------------------------------------------------

    pub async fn schedule(&self, request: CreateScheduleRequest) -> Result<ScheduleEntry> {
        self.scheduler.schedule(request).await
    }

    pub async fn get_schedule(&self, id: &str) -> Result<ScheduleEntry> {
        self.scheduler.get(id).await
    }

    pub async fn list_schedules(
        &self,
        status: Option<ScheduleStatus>,
        pagination: Pagination,
    ) -> Result<PagedResult<ScheduleEntry>> {
        self.scheduler.list(status, pagination).await
    }

    pub async fn cancel_schedule(&self, id: &str) -> Result<ScheduleEntry> {
        self.scheduler.cancel(id).await
    }

    pub async fn tick_scheduler(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<ScheduleFiring>> {
        self.scheduler.tick(now).await
    }

    /// Start the background scheduler if it is enabled in config
    pub fn start_scheduler(&self) -> bool {
        if !self.config.scheduler.enabled {
            info!("Scheduler disabled in configuration");
            return false;
        }
        self.scheduler.start()
    }

    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }

    // ---- health ------------------------------------------------------------

    pub async fn health_check(&self) -> serde_json::Value {
        let channels = self.channels.health().await;
        let status = if channels.values().all(|ok| *ok) {
            "healthy"
        } else {
            "degraded"
        };
        let channels: serde_json::Map<String, serde_json::Value> = channels
            .into_iter()
            .map(|(channel, ok)| (channel.to_string(), serde_json::Value::Bool(ok)))
            .collect();

        serde_json::json!({
            "status": status,
            "service": "notification-engine",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now(),
            "channels": channels,
            "scheduler_running": self.scheduler.is_running(),
            "progress_subscribers": self.broadcaster.subscriber_count(),
            "metrics": self.metrics.get_health_metrics(),
        })
    }
}
