//! In-app inbox channel backed by the record store

use crate::channels::{ChannelAdapter, ChannelInfo, SendReceipt};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify_database::{Filter, RecordStore, Sort, TypedCollection};
use notify_shared::{Channel, DeliveryMetadata, Recipient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const INBOX_COLLECTION: &str = "inbox";

/// A message shown in the storefront's in-app inbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboxMessage {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub metadata: Option<DeliveryMetadata>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InAppChannel {
    inbox: TypedCollection<InboxMessage>,
}

impl InAppChannel {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            inbox: TypedCollection::new(store, INBOX_COLLECTION),
        }
    }

    /// Inbox messages for one user, newest first
    pub async fn inbox_for(&self, user_id: &str) -> Result<Vec<InboxMessage>> {
        Ok(self
            .inbox
            .find_all(
                vec![Filter::eq("user_id", user_id)],
                Some(Sort::desc("created_at")),
            )
            .await?)
    }
}

#[async_trait]
impl ChannelAdapter for InAppChannel {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn send(
        &self,
        recipient: &Recipient,
        title: &str,
        body: &str,
        metadata: Option<&DeliveryMetadata>,
    ) -> Result<SendReceipt> {
        let message = InboxMessage {
            id: Uuid::new_v4().to_string(),
            user_id: recipient.user_id.clone(),
            title: title.to_string(),
            body: body.to_string(),
            metadata: metadata.cloned(),
            read: false,
            created_at: Utc::now(),
        };

        self.inbox.insert(&message.id, &message).await?;
        debug!(user_id = %recipient.user_id, message_id = %message.id, "Inbox message stored");

        Ok(SendReceipt::new(message.id))
    }

    async fn health_check(&self) -> Result<bool> {
        self.inbox.count(&[]).await?;
        Ok(true)
    }

    fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            channel: Channel::InApp,
            name: "In-app".to_string(),
            description: "Storefront inbox messages".to_string(),
            enabled: true,
            supports_markup: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_database::InMemoryStore;
    use notify_shared::{NotificationPreferences, OrderMetadata};

    fn recipient() -> Recipient {
        Recipient {
            user_id: "u1".to_string(),
            name: Some("Asha".to_string()),
            email: None,
            phone: None,
            push_token: None,
            preferences: NotificationPreferences::default(),
        }
    }

    #[tokio::test]
    async fn test_send_writes_inbox_message() {
        let channel = InAppChannel::new(Arc::new(InMemoryStore::new()));
        let metadata = DeliveryMetadata::Order(OrderMetadata {
            order_id: "ord-9".to_string(),
            amount_minor: 129900,
            currency: "INR".to_string(),
        });

        let receipt = channel
            .send(&recipient(), "Order placed", "Thanks!", Some(&metadata))
            .await
            .unwrap();

        let inbox = channel.inbox_for("u1").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, receipt.provider_message_id);
        assert_eq!(inbox[0].metadata, Some(metadata));
        assert!(!inbox[0].read);
        assert!(channel.inbox_for("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let channel = InAppChannel::new(Arc::new(InMemoryStore::new()));
        assert!(channel.health_check().await.unwrap());
        assert_eq!(channel.channel(), Channel::InApp);
    }
}
