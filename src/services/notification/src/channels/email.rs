//! Email channel implementation using SMTP

use crate::channels::format::has_markup;
use crate::channels::{ChannelAdapter, ChannelInfo, SendReceipt};
use crate::config::EmailConfig;
use crate::error::{NotificationError, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use notify_shared::{Channel, DeliveryMetadata, Recipient};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Email channel sending through an SMTP relay
#[derive(Clone)]
pub struct EmailChannel {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        info!(host = %config.smtp_host, port = config.smtp_port, "Initializing email channel");

        let from_mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::config(format!("Invalid from email address: {}", e)))?;

        let mut transport_builder = if config.smtp_use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host).map_err(|e| {
                NotificationError::config(format!("Failed to create SMTP relay: {}", e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        transport_builder = transport_builder.port(config.smtp_port);

        if !config.smtp_username.is_empty() && !config.smtp_password.is_empty() {
            let creds =
                Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
            transport_builder = transport_builder.credentials(creds);
        }

        transport_builder =
            transport_builder.pool_config(PoolConfig::new().max_size(10).min_idle(2));

        transport_builder =
            transport_builder.timeout(Some(Duration::from_secs(config.timeout_seconds)));

        Ok(Self {
            config: config.clone(),
            transport: transport_builder.build(),
            from_mailbox,
        })
    }

    /// Build the message and return it with its Message-ID
    fn build_message(&self, to: &str, name: Option<&str>, subject: &str, body: &str) -> Result<(Message, String)> {
        let address: lettre::Address = to
            .parse()
            .map_err(|e| NotificationError::email(format!("Invalid recipient email: {}", e)))?;
        let to_mailbox = Mailbox::new(name.map(str::to_string), address);

        let domain = self
            .config
            .from_email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("localhost");
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

        let mut message_builder = Message::builder()
            .from(self.from_mailbox.clone())
            .to(to_mailbox)
            .subject(subject)
            .message_id(Some(message_id.clone()));

        if let Some(ref reply_to) = self.config.reply_to {
            let reply_to_mailbox = reply_to
                .parse::<Mailbox>()
                .map_err(|e| NotificationError::email(format!("Invalid reply-to email: {}", e)))?;
            message_builder = message_builder.reply_to(reply_to_mailbox);
        }

        let content_type = if has_markup(body) {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let message = message_builder
            .header(content_type)
            .body(body.to_string())
            .map_err(|e| NotificationError::email(format!("Failed to build email message: {}", e)))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl ChannelAdapter for EmailChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        recipient: &Recipient,
        title: &str,
        body: &str,
        _metadata: Option<&DeliveryMetadata>,
    ) -> Result<SendReceipt> {
        let to = recipient
            .address_for(Channel::Email)
            .ok_or_else(|| NotificationError::missing_contact(&recipient.user_id, Channel::Email))?;

        let (message, message_id) = self.build_message(to, recipient.name.as_deref(), title, body)?;

        match self.transport.send(message).await {
            Ok(_response) => {
                info!(user_id = %recipient.user_id, message_id = %message_id, "Email sent");
                Ok(SendReceipt::new(message_id))
            }
            Err(e) => {
                error!(user_id = %recipient.user_id, "Failed to send email: {}", e);
                Err(NotificationError::email(format!("SMTP error: {}", e)))
            }
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!("Email channel health check failed: not connected");
                Ok(false)
            }
            Err(e) => {
                error!("Email channel health check error: {}", e);
                Ok(false)
            }
        }
    }

    fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            channel: Channel::Email,
            name: "Email".to_string(),
            description: "SMTP email, HTML when the body carries markup".to_string(),
            enabled: self.config.enabled,
            supports_markup: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_shared::NotificationPreferences;

    fn create_test_config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_use_starttls: false,
            from_email: "orders@shop.test".to_string(),
            from_name: "Shop".to_string(),
            reply_to: Some("help@shop.test".to_string()),
            timeout_seconds: 5,
        }
    }

    fn recipient(email: Option<&str>) -> Recipient {
        Recipient {
            user_id: "u1".to_string(),
            name: Some("Asha Rao".to_string()),
            email: email.map(str::to_string),
            phone: None,
            push_token: None,
            preferences: NotificationPreferences::default(),
        }
    }

    // The pooled transport spawns its maintenance task, so these need a runtime.
    #[tokio::test]
    async fn test_build_html_and_plain_messages() {
        let channel = EmailChannel::new(&create_test_config()).unwrap();

        let (message, message_id) = channel
            .build_message("asha@example.com", Some("Asha Rao"), "Sale", "<p>50% off</p>")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("Reply-To: help@shop.test"));
        assert!(message_id.ends_with("@shop.test>"));

        let (message, _) = channel
            .build_message("asha@example.com", None, "Sale", "50% off")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/plain"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_address() {
        let channel = EmailChannel::new(&create_test_config()).unwrap();
        let err = channel
            .build_message("not-an-email", None, "Sale", "body")
            .unwrap_err();
        assert!(matches!(err, NotificationError::Email { .. }));
    }

    #[tokio::test]
    async fn test_missing_email_fails_before_smtp() {
        let channel = EmailChannel::new(&create_test_config()).unwrap();
        let err = channel
            .send(&recipient(None), "Sale", "body", None)
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::MissingContact { .. }));
    }

    #[tokio::test]
    async fn test_channel_info() {
        let channel = EmailChannel::new(&create_test_config()).unwrap();
        let info = channel.channel_info();
        assert_eq!(info.channel, Channel::Email);
        assert!(info.enabled);
        assert!(info.supports_markup);
    }
}
