//! Core domain types: channels, users, recipients and typed delivery metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Channels
// =============================================================================

/// A delivery mechanism. Adapters are selected by this tag, never by string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
    #[serde(rename = "whatsapp")]
    WhatsApp,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::InApp,
        Channel::Email,
        Channel::WhatsApp,
        Channel::Push,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Email => "email",
            Self::WhatsApp => "whatsapp",
            Self::Push => "push",
        }
    }

    /// The contact detail a recipient must have for this channel.
    pub fn required_contact(&self) -> ContactKind {
        match self {
            Self::InApp => ContactKind::UserId,
            Self::Email => ContactKind::EmailAddress,
            Self::WhatsApp => ContactKind::PhoneNumber,
            Self::Push => ContactKind::DeviceToken,
        }
    }

    /// Plain-text channels cannot render markup.
    pub fn is_plain_text(&self) -> bool {
        matches!(self, Self::WhatsApp | Self::Push)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_app" | "inapp" | "in-app" => Ok(Self::InApp),
            "email" => Ok(Self::Email),
            "whatsapp" | "sms" => Ok(Self::WhatsApp),
            "push" => Ok(Self::Push),
            other => Err(UnknownVariant {
                kind: "channel",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    UserId,
    EmailAddress,
    PhoneNumber,
    DeviceToken,
}

impl fmt::Display for ContactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserId => write!(f, "user id"),
            Self::EmailAddress => write!(f, "email address"),
            Self::PhoneNumber => write!(f, "phone number"),
            Self::DeviceToken => write!(f, "push device token"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// =============================================================================
// Users and Recipients
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    PhoneOtp,
    Google,
    Guest,
}

/// Preference flags a targeting predicate can require.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceFlag {
    Email,
    #[serde(rename = "whatsapp")]
    WhatsApp,
    Push,
    Marketing,
}

impl PreferenceFlag {
    /// Dotted field path of the flag inside a stored user profile.
    pub fn field_path(&self) -> &'static str {
        match self {
            Self::Email => "preferences.email",
            Self::WhatsApp => "preferences.whatsapp",
            Self::Push => "preferences.push",
            Self::Marketing => "preferences.marketing",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPreferences {
    pub email: bool,
    pub whatsapp: bool,
    pub push: bool,
    pub marketing: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            whatsapp: true,
            push: true,
            marketing: false,
        }
    }
}

impl NotificationPreferences {
    pub fn is_set(&self, flag: PreferenceFlag) -> bool {
        match flag {
            PreferenceFlag::Email => self.email,
            PreferenceFlag::WhatsApp => self.whatsapp,
            PreferenceFlag::Push => self.push,
            PreferenceFlag::Marketing => self.marketing,
        }
    }
}

/// Stored customer profile, as read from the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub preferences: NotificationPreferences,
    #[serde(default)]
    pub is_admin: bool,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A resolved recipient; immutable for the lifetime of one dispatch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub push_token: Option<String>,
    pub preferences: NotificationPreferences,
}

impl Recipient {
    /// Contact used by `channel`, if the recipient has one.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        let address = match channel {
            Channel::InApp => Some(self.user_id.as_str()),
            Channel::Email => self.email.as_deref(),
            Channel::WhatsApp => self.phone.as_deref(),
            Channel::Push => self.push_token.as_deref(),
        };
        address.filter(|a| !a.trim().is_empty())
    }
}

impl From<UserProfile> for Recipient {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_id: profile.id,
            name: profile.name,
            email: profile.email,
            phone: profile.phone,
            push_token: profile.push_token,
            preferences: profile.preferences,
        }
    }
}

// =============================================================================
// Typed delivery metadata
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryMetadata {
    Order(OrderMetadata),
    Invoice(InvoiceMetadata),
    Campaign(CampaignMetadata),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderMetadata {
    pub order_id: String,
    /// Order total in minor currency units (cents, paise).
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceMetadata {
    pub invoice_id: String,
    pub order_id: String,
    pub invoice_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignMetadata {
    pub campaign_id: String,
    pub batch_index: usize,
}

impl DeliveryMetadata {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Order(_) => "order",
            Self::Invoice(_) => "invoice",
            Self::Campaign(_) => "campaign",
        }
    }
}
