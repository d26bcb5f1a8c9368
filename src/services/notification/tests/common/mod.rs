//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use notification_engine::channels::{
    ChannelAdapter, ChannelInfo, ChannelRegistry, InAppChannel, SendReceipt,
};
use notification_engine::{EngineConfig, NotificationEngine, NotificationError, Result};
use notify_database::{InMemoryStore, RecordStore};
use notify_shared::{
    AuthMethod, Channel, CreateCampaignRequest, DeliveryMetadata, MessageTemplate,
    NotificationPreferences, PreferenceFlag, Recipient, TargetPredicate, TargetingSpec,
    UserProfile,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const ADMIN_ID: &str = "admin-1";

/// One message an adapter accepted
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub user_id: String,
    pub title: String,
    pub body: String,
}

/// Adapter that accepts everything and remembers what it was given
pub struct RecordingChannel {
    channel: Channel,
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingChannel {
    pub fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, user_id: &str) -> usize {
        self.sent.lock().iter().filter(|m| m.user_id == user_id).count()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        recipient: &Recipient,
        title: &str,
        body: &str,
        _metadata: Option<&DeliveryMetadata>,
    ) -> Result<SendReceipt> {
        let mut sent = self.sent.lock();
        sent.push(SentMessage {
            user_id: recipient.user_id.clone(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(SendReceipt::new(format!("{}-{}", self.channel, sent.len())))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn channel_info(&self) -> ChannelInfo {
        info(self.channel, "Recording")
    }
}

/// Adapter whose provider always rejects the send
pub struct FailingChannel {
    channel: Channel,
}

impl FailingChannel {
    pub fn new(channel: Channel) -> Arc<Self> {
        Arc::new(Self { channel })
    }
}

#[async_trait]
impl ChannelAdapter for FailingChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        _recipient: &Recipient,
        _title: &str,
        _body: &str,
        _metadata: Option<&DeliveryMetadata>,
    ) -> Result<SendReceipt> {
        Err(NotificationError::external_service(
            self.channel.as_str(),
            "provider rejected the message",
        ))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn channel_info(&self) -> ChannelInfo {
        info(self.channel, "Failing")
    }
}

/// Adapter that takes `delay` to answer; sends are recorded when they start
pub struct SlowChannel {
    channel: Channel,
    delay: Duration,
    started: Mutex<Vec<String>>,
}

impl SlowChannel {
    pub fn new(channel: Channel, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            channel,
            delay,
            started: Mutex::new(Vec::new()),
        })
    }

    /// User ids in the order their sends started
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl ChannelAdapter for SlowChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        recipient: &Recipient,
        _title: &str,
        _body: &str,
        _metadata: Option<&DeliveryMetadata>,
    ) -> Result<SendReceipt> {
        self.started.lock().push(recipient.user_id.clone());
        tokio::time::sleep(self.delay).await;
        Ok(SendReceipt::new(format!("slow-{}", recipient.user_id)))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn channel_info(&self) -> ChannelInfo {
        info(self.channel, "Slow")
    }
}

fn info(channel: Channel, name: &str) -> ChannelInfo {
    ChannelInfo {
        channel,
        name: name.to_string(),
        description: format!("{} test adapter", name),
        enabled: true,
        supports_markup: !channel.is_plain_text(),
    }
}

/// Config with no throttling, a short send timeout and one admin
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.email.enabled = false;
    config.dispatch.inter_batch_delay_ms = 0;
    config.dispatch.send_timeout_seconds = 1;
    config.scheduler.enabled = false;
    config.fallback.admin_user_ids = vec![ADMIN_ID.to_string()];
    config
}

/// Type-erase an adapter handle for [`build_engine`]
pub fn adapter<A: ChannelAdapter + 'static>(adapter: &Arc<A>) -> Arc<dyn ChannelAdapter> {
    adapter.clone()
}

pub struct TestEngine {
    pub engine: NotificationEngine,
    pub store: Arc<dyn RecordStore>,
}

/// Engine with the real in-app inbox plus the given adapters
pub fn build_engine(
    config: EngineConfig,
    adapters: Vec<Arc<dyn ChannelAdapter>>,
) -> TestEngine {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryStore::new());
    let mut channels = ChannelRegistry::new().with(Arc::new(InAppChannel::new(store.clone())));
    for adapter in adapters {
        channels.register(adapter);
    }
    let engine = NotificationEngine::with_channels(config, store.clone(), channels)
        .expect("engine builds");
    TestEngine { engine, store }
}

pub fn user(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: Some(format!("Customer {}", id)),
        email: Some(format!("{}@example.com", id)),
        phone: Some("+15550100".to_string()),
        push_token: None,
        auth_method: AuthMethod::Password,
        preferences: NotificationPreferences {
            marketing: true,
            ..NotificationPreferences::default()
        },
        is_admin: false,
        last_active_at: Some(Utc::now()),
        created_at: Utc::now(),
    }
}

pub fn admin() -> UserProfile {
    UserProfile {
        is_admin: true,
        preferences: NotificationPreferences::default(),
        ..user(ADMIN_ID)
    }
}

/// Register `count` marketing-opted customers named `u0..`, plus the admin
pub async fn seed_users(engine: &NotificationEngine, count: usize) -> Vec<UserProfile> {
    let profiles: Vec<UserProfile> = (0..count).map(|i| user(&format!("u{}", i))).collect();
    engine.register_users(&profiles).await.expect("users seeded");
    engine.register_users(&[admin()]).await.expect("admin seeded");
    profiles
}

/// Everyone opted into marketing; excludes the admin
pub fn marketing_audience() -> TargetingSpec {
    TargetingSpec::Filtered {
        predicates: vec![TargetPredicate::OptedInto(PreferenceFlag::Marketing)],
    }
}

pub fn campaign_request(name: &str, channels: Vec<Channel>) -> CreateCampaignRequest {
    CreateCampaignRequest {
        name: name.to_string(),
        channels,
        targeting: marketing_audience(),
        template: MessageTemplate {
            subject: "Hi {{first_name}}".to_string(),
            body: "Hello {{name}}, the weekend sale is live.".to_string(),
        },
    }
}
