//! Configuration module for the notification engine
//!
//! This module provides configuration structures and defaults for the
//! dispatcher, every delivery channel, the scheduler and the admin server.

use notify_shared::Channel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NotificationError, Result};

/// Main configuration structure for the notification engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Admin HTTP server configuration
    pub server: ServerConfig,

    /// Batch dispatch and throttling
    pub dispatch: DispatchConfig,

    /// Email configuration
    pub email: EmailConfig,

    /// WhatsApp/SMS provider configuration
    pub whatsapp: WhatsAppConfig,

    /// Push notification configuration
    pub push: PushConfig,

    /// In-app inbox configuration
    pub in_app: InAppConfig,

    /// Scheduling configuration
    pub scheduler: SchedulerConfig,

    /// Fallback notifications and admin alerts
    pub fallback: FallbackConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
}

/// Batch dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub send_timeout_seconds: u64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_use_starttls: bool,
    pub from_email: String,
    pub from_name: String,
    pub reply_to: Option<String>,
    pub timeout_seconds: u64,
}

/// WhatsApp Business-style HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub api_url: String,
    pub phone_number_id: String,
    pub access_token: String,
    pub timeout_seconds: u64,
}

/// Push provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub enabled: bool,
    pub api_url: String,
    pub server_key: String,
    pub max_body_chars: usize,
    pub timeout_seconds: u64,
}

/// In-app inbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InAppConfig {
    pub enabled: bool,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub check_interval_seconds: u64,
}

/// Fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Channel used for the single fallback notification
    pub channel: Channel,
    /// Users that receive admin alerts
    pub admin_user_ids: Vec<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub namespace: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8086,
            request_timeout_seconds: 30,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            inter_batch_delay_ms: 2000,
            send_timeout_seconds: 30,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            smtp_use_starttls: std::env::var("SMTP_USE_STARTTLS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            from_email: std::env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "orders@storefront.local".to_string()),
            from_name: std::env::var("FROM_NAME").unwrap_or_else(|_| "Storefront".to_string()),
            reply_to: std::env::var("REPLY_TO_EMAIL").ok(),
            timeout_seconds: 30,
        }
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Disabled by default due to cost
            api_url: std::env::var("WHATSAPP_API_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v18.0".to_string()),
            phone_number_id: std::env::var("WHATSAPP_PHONE_NUMBER_ID").unwrap_or_default(),
            access_token: std::env::var("WHATSAPP_ACCESS_TOKEN").unwrap_or_default(),
            timeout_seconds: 30,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: std::env::var("PUSH_API_URL")
                .unwrap_or_else(|_| "https://fcm.googleapis.com/fcm/send".to_string()),
            server_key: std::env::var("FCM_SERVER_KEY").unwrap_or_default(),
            max_body_chars: 178,
            timeout_seconds: 30,
        }
    }
}

impl Default for InAppConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 60,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            channel: Channel::InApp,
            admin_user_ids: Vec::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
            namespace: "notification_engine".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, `NOTIFY__*` environment variables
    /// and the file named by `NOTIFY_CONFIG_FILE`, in that order.
    pub fn from_env() -> Result<Self> {
        let file = std::env::var("NOTIFY_CONFIG_FILE").ok();
        Self::load(file.as_deref())
    }

    /// Same layering as [`EngineConfig::from_env`] with an explicit file.
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut cfg = config::Config::builder();

        // Start with default configuration
        cfg = cfg.add_source(config::Config::try_from(&EngineConfig::default())?);

        cfg = cfg.add_source(
            config::Environment::with_prefix("NOTIFY")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("fallback.admin_user_ids")
                .try_parsing(true),
        );

        if let Some(config_file) = config_file {
            cfg = cfg.add_source(config::File::with_name(config_file).required(false));
        }

        Ok(cfg.build()?.try_deserialize()?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(NotificationError::config(
                "Server port must be greater than 0",
            ));
        }

        if self.dispatch.batch_size == 0 {
            return Err(NotificationError::config(
                "Dispatch batch size must be greater than 0",
            ));
        }

        if self.dispatch.send_timeout_seconds == 0 {
            return Err(NotificationError::config(
                "Per-send timeout must be greater than 0",
            ));
        }

        if self.email.enabled {
            if self.email.smtp_host.is_empty() {
                return Err(NotificationError::config(
                    "SMTP host is required when email is enabled",
                ));
            }
            if self.email.from_email.is_empty() {
                return Err(NotificationError::config(
                    "From email is required when email is enabled",
                ));
            }
        }

        if self.whatsapp.enabled
            && (self.whatsapp.phone_number_id.is_empty() || self.whatsapp.access_token.is_empty())
        {
            return Err(NotificationError::config(
                "WhatsApp phone number id and access token are required when WhatsApp is enabled",
            ));
        }

        if self.push.enabled && self.push.server_key.is_empty() {
            return Err(NotificationError::config(
                "Push server key is required when push is enabled",
            ));
        }

        if !self.is_channel_enabled(self.fallback.channel) {
            return Err(NotificationError::config(format!(
                "Fallback channel {} is not enabled",
                self.fallback.channel
            )));
        }

        if !self.metrics.endpoint.starts_with('/') || self.metrics.endpoint.len() < 2 {
            return Err(NotificationError::config(
                "Metrics endpoint must be an absolute path such as /metrics",
            ));
        }

        if self.scheduler.enabled && self.scheduler.check_interval_seconds == 0 {
            return Err(NotificationError::config(
                "Scheduler check interval must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch.inter_batch_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.send_timeout_seconds)
    }

    /// Get the provider timeout for a channel
    pub fn channel_timeout(&self, channel: Channel) -> Duration {
        let seconds = match channel {
            Channel::Email => self.email.timeout_seconds,
            Channel::WhatsApp => self.whatsapp.timeout_seconds,
            Channel::Push => self.push.timeout_seconds,
            Channel::InApp => self.dispatch.send_timeout_seconds,
        };
        Duration::from_secs(seconds)
    }

    /// Check if a channel is enabled
    pub fn is_channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::InApp => self.in_app.enabled,
            Channel::Email => self.email.enabled,
            Channel::WhatsApp => self.whatsapp.enabled,
            Channel::Push => self.push.enabled,
        }
    }
}
