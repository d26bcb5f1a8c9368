//! Push notification channel using an FCM-style HTTP API

use crate::channels::format::{to_plain_text, truncate_chars};
use crate::channels::{ChannelAdapter, ChannelInfo, SendReceipt};
use crate::config::PushConfig;
use crate::error::{NotificationError, Result};
use async_trait::async_trait;
use notify_shared::{Channel, DeliveryMetadata, Recipient};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Push channel sending to device tokens
#[derive(Clone)]
pub struct PushChannel {
    config: PushConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    results: Vec<PushResult>,
}

#[derive(Debug, Deserialize)]
struct PushResult {
    message_id: Option<String>,
    error: Option<String>,
}

impl PushChannel {
    pub fn new(config: &PushConfig) -> Result<Self> {
        info!(api_url = %config.api_url, "Initializing push channel");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    fn payload(
        &self,
        token: &str,
        title: &str,
        body: &str,
        metadata: Option<&DeliveryMetadata>,
    ) -> Result<serde_json::Value> {
        let data = match metadata {
            Some(metadata) => serde_json::to_value(metadata)?,
            None => json!({}),
        };

        Ok(json!({
            "to": token,
            "notification": {
                "title": to_plain_text(title),
                "body": truncate_chars(&to_plain_text(body), self.config.max_body_chars),
            },
            "data": data,
        }))
    }
}

#[async_trait]
impl ChannelAdapter for PushChannel {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(
        &self,
        recipient: &Recipient,
        title: &str,
        body: &str,
        metadata: Option<&DeliveryMetadata>,
    ) -> Result<SendReceipt> {
        let token = recipient
            .address_for(Channel::Push)
            .ok_or_else(|| NotificationError::missing_contact(&recipient.user_id, Channel::Push))?;

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("key={}", self.config.server_key))
            .json(&self.payload(token, title, body, metadata)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(user_id = %recipient.user_id, %status, "Push provider rejected message");
            return Err(NotificationError::push(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let parsed: PushResponse = response.json().await?;
        match parsed.results.into_iter().next() {
            Some(PushResult {
                message_id: Some(id),
                ..
            }) => {
                debug!(user_id = %recipient.user_id, message_id = %id, "Push accepted");
                Ok(SendReceipt::new(id))
            }
            Some(PushResult {
                error: Some(error), ..
            }) => Err(NotificationError::push(error)),
            _ => Err(NotificationError::push("provider response had no result")),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.config.server_key.is_empty())
    }

    fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            channel: Channel::Push,
            name: "Push".to_string(),
            description: "Mobile push, plain text and truncated".to_string(),
            enabled: self.config.enabled,
            supports_markup: false,
        }
    }
}
