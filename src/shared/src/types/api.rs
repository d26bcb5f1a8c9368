//! Campaign, notification, delivery and schedule records plus request types
//! for the engine's CRUD surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::Validate;

use super::core::*;

// =============================================================================
// Targeting
// =============================================================================

/// Audience selection: everyone, or the users matching every predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetingSpec {
    All,
    Filtered { predicates: Vec<TargetPredicate> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "predicate", content = "value", rename_all = "snake_case")]
pub enum TargetPredicate {
    AuthMethod(AuthMethod),
    OptedInto(PreferenceFlag),
    LastActiveSince(DateTime<Utc>),
    RecipientIds(Vec<String>),
}

// =============================================================================
// Campaigns
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Active)
                | (Draft, Cancelled)
                | (Scheduled, Active)
                | (Scheduled, Cancelled)
                | (Active, Paused)
                | (Active, Completed)
                | (Active, Failed)
                | (Active, Cancelled)
                | (Paused, Active)
                | (Paused, Cancelled)
        )
    }

    /// Statuses a dispatch run may start (or resume) from.
    pub fn startable() -> [CampaignStatus; 3] {
        [Self::Draft, Self::Scheduled, Self::Paused]
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct MessageTemplate {
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub subject: String,
    #[validate(length(min = 1, message = "body must not be empty"))]
    pub body: String,
}

/// Per-recipient rollup counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignCounters {
    pub audience_size: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub opened: u64,
    pub clicked: u64,
}

impl CampaignCounters {
    /// Field-wise maximum, so counters never move backwards mid-run.
    pub fn merge_max(&self, other: &CampaignCounters) -> CampaignCounters {
        CampaignCounters {
            audience_size: self.audience_size.max(other.audience_size),
            sent: self.sent.max(other.sent),
            delivered: self.delivered.max(other.delivered),
            failed: self.failed.max(other.failed),
            opened: self.opened.max(other.opened),
            clicked: self.clicked.max(other.clicked),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub channels: Vec<Channel>,
    pub targeting: TargetingSpec,
    pub template: MessageTemplate,
    #[serde(default)]
    pub counters: CampaignCounters,
    pub failure_reason: Option<String>,
    pub schedule_entry_id: Option<String>,
    /// Token of the dispatch run that currently owns the campaign; replaced on every claim.
    #[serde(default)]
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct CreateCampaignRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "at least one channel is required"))]
    pub channels: Vec<Channel>,
    pub targeting: TargetingSpec,
    #[validate]
    pub template: MessageTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCampaignStatusRequest {
    pub status: CampaignStatus,
}

// =============================================================================
// Delivery records
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Campaign,
    Notification,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent,
    Delivered,
    Failed,
    Read,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Read => "read",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Read)
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered | Self::Read)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record for one (owner, recipient, channel) send attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryRecord {
    pub id: String,
    pub owner_kind: OwnerKind,
    pub owner_id: String,
    pub recipient_id: String,
    pub channel: Channel,
    pub state: DeliveryState,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    pub fn key(owner_id: &str, recipient_id: &str, channel: Channel) -> String {
        format!("{}:{}:{}", owner_id, recipient_id, channel)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryCounts {
    pub total: u64,
    pub pending: u64,
    /// Everything past `pending`.
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub read: u64,
    pub clicked: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregateStats {
    pub owner_id: String,
    /// Counts over individual delivery records.
    pub records: DeliveryCounts,
    /// Per-recipient rollup (see `CampaignCounters`).
    pub recipients: DeliveryCounts,
    pub by_channel: BTreeMap<Channel, DeliveryCounts>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelDelivery {
    pub channel: Channel,
    pub state: DeliveryState,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipientBreakdown {
    pub recipient_id: String,
    pub channels: Vec<ChannelDelivery>,
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Read,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Read => "read",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationOrigin {
    BusinessEvent,
    Schedule { entry_id: String },
    Fallback,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub channels: Vec<Channel>,
    pub status: NotificationStatus,
    pub metadata: Option<DeliveryMetadata>,
    pub origin: NotificationOrigin,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct CreateNotificationRequest {
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "body must not be empty"))]
    pub body: String,
    #[validate(length(min = 1, message = "at least one channel is required"))]
    pub channels: Vec<Channel>,
    pub metadata: Option<DeliveryMetadata>,
}

// =============================================================================
// Business events
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSummary {
    pub order_id: String,
    pub user_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub invoice_id: String,
    pub order_id: String,
    pub url: Option<String>,
    pub issued_at: DateTime<Utc>,
}

// =============================================================================
// Scheduling
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub end_at: Option<DateTime<Utc>>,
    pub max_occurrences: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "request", rename_all = "snake_case")]
pub enum SchedulePayload {
    Campaign(CreateCampaignRequest),
    Notification(CreateNotificationRequest),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Completed,
    Cancelled,
    Expired,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: String,
    pub payload: SchedulePayload,
    pub trigger_at: DateTime<Utc>,
    pub recurrence: Option<Recurrence>,
    pub status: ScheduleStatus,
    pub occurrences: u32,
    /// Ids of the campaigns or notifications produced by each firing.
    #[serde(default)]
    pub runs: Vec<String>,
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Error from the most recent firing, cleared by the next successful one.
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateScheduleRequest {
    pub payload: SchedulePayload,
    pub trigger_at: DateTime<Utc>,
    pub recurrence: Option<Recurrence>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_transitions() {
        use CampaignStatus::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Paused));
        assert!(!Draft.can_transition_to(Completed));
        for status in [Completed, Failed, Cancelled] {
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn test_counters_merge_is_monotonic() {
        let before = CampaignCounters {
            audience_size: 10,
            sent: 5,
            delivered: 4,
            failed: 1,
            opened: 2,
            clicked: 0,
        };
        let stale = CampaignCounters {
            audience_size: 10,
            sent: 3,
            delivered: 3,
            failed: 0,
            opened: 0,
            clicked: 1,
        };
        let merged = before.merge_max(&stale);
        assert_eq!(merged.sent, 5);
        assert_eq!(merged.delivered, 4);
        assert_eq!(merged.clicked, 1);
    }

    #[test]
    fn test_targeting_serde_shape() {
        let spec = TargetingSpec::Filtered {
            predicates: vec![
                TargetPredicate::OptedInto(PreferenceFlag::Marketing),
                TargetPredicate::RecipientIds(vec!["u1".to_string()]),
            ],
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["type"], "filtered");
        assert_eq!(value["predicates"][0]["predicate"], "opted_into");
        assert_eq!(value["predicates"][0]["value"], "marketing");

        let all: TargetingSpec = serde_json::from_str(r#"{"type":"all"}"#).unwrap();
        assert_eq!(all, TargetingSpec::All);
    }

    #[test]
    fn test_campaign_request_validation() {
        let mut request = CreateCampaignRequest {
            name: "Diwali sale".to_string(),
            channels: vec![Channel::Email],
            targeting: TargetingSpec::All,
            template: MessageTemplate {
                subject: "Hi {{first_name}}".to_string(),
                body: "Sale starts now".to_string(),
            },
        };
        assert!(request.validate().is_ok());

        request.channels.clear();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_delivery_state_flags() {
        assert!(!DeliveryState::Pending.is_terminal());
        assert!(!DeliveryState::Sent.is_terminal());
        assert!(DeliveryState::Failed.is_terminal());
        assert!(DeliveryState::Read.is_delivered());
        assert_eq!(
            DeliveryRecord::key("c1", "u1", Channel::WhatsApp),
            "c1:u1:whatsapp"
        );
    }
}
