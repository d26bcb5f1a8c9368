//! Error handling for the notification engine
//!
//! This module defines the error types surfaced by the engine and its admin
//! API, plus conversions from the libraries the engine talks to.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use notify_database::DatabaseError;
use notify_shared::{CampaignStatus, Channel};
use serde_json::json;
use thiserror::Error;

/// Result type alias for notification engine operations
pub type Result<T> = std::result::Result<T, NotificationError>;

/// Main error type for the notification engine
#[derive(Error, Debug)]
pub enum NotificationError {
    /// Record store errors
    #[error("Database error: {message}")]
    Database { message: String },

    /// Email delivery errors
    #[error("Email error: {message}")]
    Email { message: String },

    /// WhatsApp/SMS delivery errors
    #[error("WhatsApp error: {message}")]
    WhatsApp { message: String },

    /// Push notification errors
    #[error("Push notification error: {message}")]
    Push { message: String },

    /// Recipient lacks the contact detail a channel needs
    #[error("Recipient {recipient_id} has no {contact} for {channel}")]
    MissingContact {
        recipient_id: String,
        channel: Channel,
        contact: String,
    },

    /// Channel has no registered adapter
    #[error("Channel unavailable: {channel}")]
    ChannelUnavailable { channel: Channel },

    /// Targeting resolved to nobody
    #[error("No recipients matched the targeting for campaign {campaign_id}")]
    NoRecipients { campaign_id: String },

    /// Campaign status change outside the allowed transitions
    #[error("Invalid campaign transition: {from} -> {to}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Not found errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Conflict errors (e.g., a campaign that is already running)
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Network/connection errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// External service errors
    #[error("External service error: {service}: {message}")]
    ExternalService { service: String, message: String },

    /// Internal engine errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Service unavailable errors
    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },
}

impl NotificationError {
    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            NotificationError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NotificationError::Email { .. } => StatusCode::BAD_GATEWAY,
            NotificationError::WhatsApp { .. } => StatusCode::BAD_GATEWAY,
            NotificationError::Push { .. } => StatusCode::BAD_GATEWAY,
            NotificationError::MissingContact { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            NotificationError::ChannelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            NotificationError::NoRecipients { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            NotificationError::InvalidTransition { .. } => StatusCode::CONFLICT,
            NotificationError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NotificationError::Validation { .. } => StatusCode::BAD_REQUEST,
            NotificationError::NotFound { .. } => StatusCode::NOT_FOUND,
            NotificationError::Conflict { .. } => StatusCode::CONFLICT,
            NotificationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            NotificationError::Network { .. } => StatusCode::BAD_GATEWAY,
            NotificationError::Serialization { .. } => StatusCode::BAD_REQUEST,
            NotificationError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            NotificationError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NotificationError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            NotificationError::Database { .. } => "DATABASE_ERROR",
            NotificationError::Email { .. } => "EMAIL_ERROR",
            NotificationError::WhatsApp { .. } => "WHATSAPP_ERROR",
            NotificationError::Push { .. } => "PUSH_ERROR",
            NotificationError::MissingContact { .. } => "MISSING_CONTACT",
            NotificationError::ChannelUnavailable { .. } => "CHANNEL_UNAVAILABLE",
            NotificationError::NoRecipients { .. } => "NO_RECIPIENTS",
            NotificationError::InvalidTransition { .. } => "INVALID_TRANSITION",
            NotificationError::Config { .. } => "CONFIG_ERROR",
            NotificationError::Validation { .. } => "VALIDATION_ERROR",
            NotificationError::NotFound { .. } => "NOT_FOUND",
            NotificationError::Conflict { .. } => "CONFLICT",
            NotificationError::Timeout { .. } => "TIMEOUT",
            NotificationError::Network { .. } => "NETWORK_ERROR",
            NotificationError::Serialization { .. } => "SERIALIZATION_ERROR",
            NotificationError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            NotificationError::Internal { .. } => "INTERNAL_ERROR",
            NotificationError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            NotificationError::Database { .. } => true,
            NotificationError::Email { .. } => true,
            NotificationError::WhatsApp { .. } => true,
            NotificationError::Push { .. } => true,
            NotificationError::MissingContact { .. } => false,
            NotificationError::ChannelUnavailable { .. } => false,
            NotificationError::NoRecipients { .. } => false,
            NotificationError::InvalidTransition { .. } => false,
            NotificationError::Config { .. } => false,
            NotificationError::Validation { .. } => false,
            NotificationError::NotFound { .. } => false,
            NotificationError::Conflict { .. } => false,
            NotificationError::Timeout { .. } => true,
            NotificationError::Network { .. } => true,
            NotificationError::Serialization { .. } => false,
            NotificationError::ExternalService { .. } => true,
            NotificationError::Internal { .. } => true,
            NotificationError::ServiceUnavailable { .. } => true,
        }
    }
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

// Conversion implementations for external error types

impl From<DatabaseError> for NotificationError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { collection, id } => NotificationError::NotFound {
                resource: format!("{}/{}", collection, id),
            },
            DatabaseError::Conflict { collection, id } => NotificationError::Conflict {
                message: format!("{}/{} already exists", collection, id),
            },
            DatabaseError::Serialization(e) => NotificationError::Serialization {
                message: e.to_string(),
            },
            other => NotificationError::Database {
                message: other.to_string(),
            },
        }
    }
}

impl From<lettre::error::Error> for NotificationError {
    fn from(err: lettre::error::Error) -> Self {
        NotificationError::Email {
            message: err.to_string(),
        }
    }
}

impl From<lettre::address::AddressError> for NotificationError {
    fn from(err: lettre::address::AddressError) -> Self {
        NotificationError::Email {
            message: format!("invalid address: {}", err),
        }
    }
}

impl From<lettre::transport::smtp::Error> for NotificationError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        NotificationError::Email {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NotificationError::Timeout {
                operation: "HTTP request".to_string(),
            }
        } else if err.is_connect() {
            NotificationError::Network {
                message: err.to_string(),
            }
        } else {
            NotificationError::ExternalService {
                service: "HTTP".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for NotificationError {
    fn from(err: config::ConfigError) -> Self {
        NotificationError::Config {
            message: err.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for NotificationError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        NotificationError::Timeout {
            operation: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = Vec::new();
        let message = err
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                fields.push(field.to_string());
                let field_errors: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| "Invalid value".to_string())
                    })
                    .collect();
                format!("{}: {}", field, field_errors.join(", "))
            })
            .collect::<Vec<String>>()
            .join("; ");

        // Nested struct errors do not show up in field_errors().
        let message = if message.is_empty() {
            err.to_string()
        } else {
            message
        };

        let field = match fields.len() {
            0 => "request".to_string(),
            1 => fields.remove(0),
            _ => "multiple".to_string(),
        };

        NotificationError::Validation { field, message }
    }
}

// Utility functions for creating specific error types

impl NotificationError {
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn email<S: Into<String>>(message: S) -> Self {
        Self::Email {
            message: message.into(),
        }
    }

    pub fn whatsapp<S: Into<String>>(message: S) -> Self {
        Self::WhatsApp {
            message: message.into(),
        }
    }

    pub fn push<S: Into<String>>(message: S) -> Self {
        Self::Push {
            message: message.into(),
        }
    }

    pub fn missing_contact(recipient_id: &str, channel: Channel) -> Self {
        Self::MissingContact {
            recipient_id: recipient_id.to_string(),
            channel,
            contact: channel.required_contact().to_string(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn external_service<S1: Into<String>, S2: Into<String>>(service: S1, message: S2) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn service_unavailable<S: Into<String>>(service: S) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
        }
    }
}
