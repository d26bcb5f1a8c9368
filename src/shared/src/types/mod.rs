//! Shared type definitions for the storefront notification engine
//!
//! Every record the engine persists or exchanges with its admin surface is
//! defined here so that the store, the engine and its callers agree on one
//! shape.

pub mod api;
pub mod core;
pub mod events;

pub use core::{
    AuthMethod, CampaignMetadata, Channel, ContactKind, DeliveryMetadata, InvoiceMetadata,
    NotificationPreferences, OrderMetadata, PreferenceFlag, Recipient, UnknownVariant,
    UserProfile,
};

pub use api::{
    AggregateStats, Campaign, CampaignCounters, CampaignStatus, ChannelDelivery,
    CreateCampaignRequest, CreateNotificationRequest, CreateScheduleRequest, DeliveryCounts,
    DeliveryRecord, DeliveryState, Frequency, Invoice, MessageTemplate, Notification,
    NotificationOrigin, NotificationStatus, OrderSummary, OwnerKind, RecipientBreakdown,
    Recurrence, ScheduleEntry, SchedulePayload, ScheduleStatus, TargetPredicate, TargetingSpec,
    UpdateCampaignStatusRequest,
};

pub use events::{BatchCompleted, DispatchReport, ProgressSnapshot};
