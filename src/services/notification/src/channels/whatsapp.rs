//! WhatsApp/SMS channel using a WhatsApp Business-style HTTP API

use crate::channels::format::to_whatsapp;
use crate::channels::{ChannelAdapter, ChannelInfo, SendReceipt};
use crate::config::WhatsAppConfig;
use crate::error::{NotificationError, Result};
use async_trait::async_trait;
use notify_shared::{Channel, DeliveryMetadata, Recipient};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

impl WhatsAppChannel {
    pub fn new(config: &WhatsAppConfig) -> Result<Self> {
        info!(api_url = %config.api_url, "Initializing WhatsApp channel");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }
}

/// Digits only; the provider expects international numbers without `+`.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Title in bold above the converted body.
pub fn compose_text(title: &str, body: &str) -> String {
    let body = to_whatsapp(body);
    let title = to_whatsapp(title);
    if title.is_empty() {
        body
    } else {
        format!("*{}*\n\n{}", title, body)
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppChannel {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
    }

    async fn send(
        &self,
        recipient: &Recipient,
        title: &str,
        body: &str,
        _metadata: Option<&DeliveryMetadata>,
    ) -> Result<SendReceipt> {
        let phone = recipient
            .address_for(Channel::WhatsApp)
            .map(normalize_phone)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                NotificationError::missing_contact(&recipient.user_id, Channel::WhatsApp)
            })?;

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": phone,
            "type": "text",
            "text": { "body": compose_text(title, body) },
        });

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(user_id = %recipient.user_id, %status, "WhatsApp provider rejected message");
            return Err(NotificationError::whatsapp(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let parsed: MessagesResponse = response.json().await?;
        let message_id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| NotificationError::whatsapp("provider response had no message id"))?;

        debug!(user_id = %recipient.user_id, message_id = %message_id, "WhatsApp message accepted");
        Ok(SendReceipt::new(message_id))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.config.access_token.is_empty() && !self.config.phone_number_id.is_empty())
    }

    fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            channel: Channel::WhatsApp,
            name: "WhatsApp".to_string(),
            description: "WhatsApp/SMS text messages, markup converted".to_string(),
            enabled: self.config.enabled,
            supports_markup: false,
        }
    }
}
