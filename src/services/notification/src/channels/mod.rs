//! Delivery channels module
//!
//! One adapter per [`Channel`] variant:
//! - In-app inbox (record store)
//! - Email (SMTP)
//! - WhatsApp/SMS (provider HTTP API)
//! - Push (provider HTTP API)
//!
//! The dispatcher looks adapters up by enum tag through [`ChannelRegistry`].

use crate::config::EngineConfig;
use crate::error::{NotificationError, Result};
use async_trait::async_trait;
use notify_database::RecordStore;
use notify_shared::{Channel, DeliveryMetadata, Recipient};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub mod email;
pub mod format;
pub mod in_app;
pub mod push;
pub mod whatsapp;

pub use email::EmailChannel;
pub use in_app::{InAppChannel, InboxMessage};
pub use push::PushChannel;
pub use whatsapp::WhatsAppChannel;

/// Trait that all delivery channels implement
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The channel this adapter delivers on
    fn channel(&self) -> Channel;

    /// Deliver one rendered message to one recipient.
    ///
    /// Adapters do not dedupe; callers never hand them a terminal record.
    async fn send(
        &self,
        recipient: &Recipient,
        title: &str,
        body: &str,
        metadata: Option<&DeliveryMetadata>,
    ) -> Result<SendReceipt>;

    /// Check if the channel is healthy and ready to send
    async fn health_check(&self) -> Result<bool>;

    /// Get channel-specific delivery information
    fn channel_info(&self) -> ChannelInfo;
}

/// Provider acknowledgement for one accepted send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: String,
}

impl SendReceipt {
    pub fn new(provider_message_id: impl Into<String>) -> Self {
        Self {
            provider_message_id: provider_message_id.into(),
        }
    }
}

/// Normalized per-channel result as seen by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn delivered(provider_message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_message_id: Some(provider_message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<SendReceipt>> for SendOutcome {
    fn from(result: Result<SendReceipt>) -> Self {
        match result {
            Ok(receipt) => SendOutcome::delivered(receipt.provider_message_id),
            Err(e) => SendOutcome::failed(e.to_string()),
        }
    }
}

/// Information about a delivery channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel: Channel,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub supports_markup: bool,
}

/// Enum-keyed adapter lookup
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for its channel
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.channel(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Build the adapters enabled in `config`
    pub fn from_config(config: &EngineConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        let mut registry = Self::new();

        if config.in_app.enabled {
            registry.register(Arc::new(InAppChannel::new(store)));
        }

        if config.email.enabled {
            registry.register(Arc::new(EmailChannel::new(&config.email)?));
        }

        if config.whatsapp.enabled {
            registry.register(Arc::new(WhatsAppChannel::new(&config.whatsapp)?));
        }

        if config.push.enabled {
            registry.register(Arc::new(PushChannel::new(&config.push)?));
        }

        if registry.adapters.is_empty() {
            warn!("No delivery channels enabled");
        } else {
            info!(channels = ?registry.channels(), "Delivery channels registered");
        }

        Ok(registry)
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel).cloned()
    }

    pub fn require(&self, channel: Channel) -> Result<Arc<dyn ChannelAdapter>> {
        self.get(channel)
            .ok_or(NotificationError::ChannelUnavailable { channel })
    }

    /// Registered channels in declaration order
    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.adapters.contains_key(c))
            .collect()
    }

    pub fn channel_infos(&self) -> Vec<ChannelInfo> {
        self.channels()
            .into_iter()
            .filter_map(|c| self.adapters.get(&c).map(|a| a.channel_info()))
            .collect()
    }

    /// Run every adapter's health check
    pub async fn health(&self) -> HashMap<Channel, bool> {
        let mut results = HashMap::new();
        for (channel, adapter) in &self.adapters {
            let healthy = match adapter.health_check().await {
                Ok(healthy) => healthy,
                Err(e) => {
                    warn!(channel = %channel, "Channel health check error: {}", e);
                    false
                }
            };
            results.insert(*channel, healthy);
        }
        results
    }
}
