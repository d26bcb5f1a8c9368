//! Delivery tracker: the only writer of `DeliveryRecord` state
//!
//! State machine: `pending -> sent -> {delivered, failed}`, `delivered -> read`.
//! Every transition is a guarded `update_if`, so concurrent writers can race
//! without corrupting a record and terminal records never move.

use crate::channels::SendOutcome;
use crate::error::{NotificationError, Result};
use chrono::Utc;
use notify_database::{DatabaseError, Filter, RecordStore, TypedCollection};
use notify_shared::{
    AggregateStats, Channel, ChannelDelivery, DeliveryCounts, DeliveryRecord, DeliveryState,
    OwnerKind, RecipientBreakdown,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const DELIVERIES_COLLECTION: &str = "deliveries";

#[derive(Clone)]
pub struct DeliveryTracker {
    records: TypedCollection<DeliveryRecord>,
}

impl DeliveryTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            records: TypedCollection::new(store, DELIVERIES_COLLECTION),
        }
    }

    /// Create the record for (owner, recipient, channel), or return the existing one.
    pub async fn record_attempt(
        &self,
        owner_kind: OwnerKind,
        owner_id: &str,
        recipient_id: &str,
        channel: Channel,
    ) -> Result<DeliveryRecord> {
        let id = DeliveryRecord::key(owner_id, recipient_id, channel);
        if let Some(existing) = self.records.get(&id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let record = DeliveryRecord {
            id: id.clone(),
            owner_kind,
            owner_id: owner_id.to_string(),
            recipient_id: recipient_id.to_string(),
            channel,
            state: DeliveryState::Pending,
            provider_message_id: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            sent_at: None,
            delivered_at: None,
            failed_at: None,
            read_at: None,
            clicked_at: None,
        };

        match self.records.insert(&id, &record).await {
            Ok(()) => Ok(record),
            // Lost the race to a concurrent attempt; theirs is the record.
            Err(DatabaseError::Conflict { .. }) => self
                .records
                .get(&id)
                .await?
                .ok_or_else(|| NotificationError::internal(format!("delivery {} vanished", id))),
            Err(e) => Err(e.into()),
        }
    }

    /// `pending -> sent`, counting one attempt. A record stuck in `sent` may
    /// be attempted again. Returns `None` for terminal records.
    pub async fn mark_sent(&self, record_id: &str) -> Result<Option<DeliveryRecord>> {
        let current = self.require(record_id).await?;
        if current.state.is_terminal() {
            return Ok(None);
        }

        let now = Utc::now();
        let guard = [
            Filter::is_in("state", [DeliveryState::Pending, DeliveryState::Sent]),
            Filter::eq("attempts", current.attempts),
        ];
        let patch = json!({
            "state": DeliveryState::Sent,
            "attempts": current.attempts + 1,
            "sent_at": now,
            "updated_at": now,
        });

        Ok(self.records.update_if(record_id, &guard, patch).await?)
    }

    /// Apply a send outcome; terminal records are left unchanged (`None`).
    pub async fn record_result(
        &self,
        record_id: &str,
        outcome: &SendOutcome,
    ) -> Result<Option<DeliveryRecord>> {
        let current = self.require(record_id).await?;
        if current.state.is_terminal() {
            debug!(record_id, state = %current.state, "Ignoring result for terminal record");
            return Ok(None);
        }

        let now = Utc::now();
        let guard = [Filter::is_in(
            "state",
            [DeliveryState::Pending, DeliveryState::Sent],
        )];
        let patch = if outcome.success {
            json!({
                "state": DeliveryState::Delivered,
                "provider_message_id": outcome.provider_message_id,
                "error": null,
                "sent_at": current.sent_at.unwrap_or(now),
                "delivered_at": now,
                "updated_at": now,
            })
        } else {
            json!({
                "state": DeliveryState::Failed,
                "error": outcome.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                "failed_at": now,
                "updated_at": now,
            })
        };

        Ok(self.records.update_if(record_id, &guard, patch).await?)
    }

    /// `delivered -> read`; idempotent for records already read.
    pub async fn mark_read(&self, record_id: &str) -> Result<DeliveryRecord> {
        let current = self.require(record_id).await?;
        match current.state {
            DeliveryState::Read => Ok(current),
            DeliveryState::Delivered => {
                let now = Utc::now();
                let guard = [Filter::eq("state", DeliveryState::Delivered)];
                let patch = json!({"state": DeliveryState::Read, "read_at": now, "updated_at": now});
                match self.records.update_if(record_id, &guard, patch).await? {
                    Some(updated) => Ok(updated),
                    None => self.require(record_id).await,
                }
            }
            other => Err(NotificationError::conflict(format!(
                "delivery {} is {} and cannot be marked read",
                record_id, other
            ))),
        }
    }

    /// Record the first click; a click on a delivered record also marks it read.
    pub async fn record_click(&self, record_id: &str) -> Result<DeliveryRecord> {
        let current = self.require(record_id).await?;
        if !current.state.is_delivered() {
            return Err(NotificationError::conflict(format!(
                "delivery {} is {} and cannot be clicked",
                record_id, current.state
            )));
        }
        if current.clicked_at.is_some() {
            return Ok(current);
        }

        let now = Utc::now();
        let guard = [Filter::eq("clicked_at", serde_json::Value::Null)];
        let patch = match current.state {
            DeliveryState::Delivered => json!({
                "state": DeliveryState::Read,
                "read_at": now,
                "clicked_at": now,
                "updated_at": now,
            }),
            _ => json!({"clicked_at": now, "updated_at": now}),
        };

        match self.records.update_if(record_id, &guard, patch).await? {
            Some(updated) => Ok(updated),
            None => self.require(record_id).await,
        }
    }

    pub async fn get_record(&self, record_id: &str) -> Result<Option<DeliveryRecord>> {
        Ok(self.records.get(record_id).await?)
    }

    /// Every record of an owner, in creation order
    pub async fn records_for(&self, owner_id: &str) -> Result<Vec<DeliveryRecord>> {
        Ok(self
            .records
            .find_all(vec![Filter::eq("owner_id", owner_id)], None)
            .await?)
    }

    pub async fn get_aggregate_stats(&self, owner_id: &str) -> Result<AggregateStats> {
        let records = self.records_for(owner_id).await?;

        let mut stats = AggregateStats {
            owner_id: owner_id.to_string(),
            ..AggregateStats::default()
        };

        let mut per_recipient: Vec<(&str, Vec<&DeliveryRecord>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for record in &records {
            tally(&mut stats.records, record);
            tally(stats.by_channel.entry(record.channel).or_default(), record);

            let slot = *index.entry(record.recipient_id.as_str()).or_insert_with(|| {
                per_recipient.push((record.recipient_id.as_str(), Vec::new()));
                per_recipient.len() - 1
            });
            per_recipient[slot].1.push(record);
        }

        for (_, recipient_records) in &per_recipient {
            let rollup = &mut stats.recipients;
            rollup.total += 1;

            let all_terminal = recipient_records.iter().all(|r| r.state.is_terminal());
            if all_terminal {
                rollup.sent += 1;
                if recipient_records.iter().any(|r| r.state.is_delivered()) {
                    rollup.delivered += 1;
                } else {
                    rollup.failed += 1;
                }
            } else {
                rollup.pending += 1;
            }
            if recipient_records.iter().any(|r| r.state == DeliveryState::Read) {
                rollup.read += 1;
            }
            if recipient_records.iter().any(|r| r.clicked_at.is_some()) {
                rollup.clicked += 1;
            }
        }

        Ok(stats)
    }

    /// Per-recipient channel states, in first-attempt order
    pub async fn get_recipient_breakdown(&self, owner_id: &str) -> Result<Vec<RecipientBreakdown>> {
        let records = self.records_for(owner_id).await?;

        let mut breakdown: Vec<RecipientBreakdown> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in records {
            let slot = match index.get(&record.recipient_id) {
                Some(slot) => *slot,
                None => {
                    index.insert(record.recipient_id.clone(), breakdown.len());
                    breakdown.push(RecipientBreakdown {
                        recipient_id: record.recipient_id.clone(),
                        channels: Vec::new(),
                    });
                    breakdown.len() - 1
                }
            };
            breakdown[slot].channels.push(ChannelDelivery {
                channel: record.channel,
                state: record.state,
                provider_message_id: record.provider_message_id,
                error: record.error,
                updated_at: record.updated_at,
            });
        }

        Ok(breakdown)
    }

    async fn require(&self, record_id: &str) -> Result<DeliveryRecord> {
        self.records
            .get(record_id)
            .await?
            .ok_or_else(|| NotificationError::not_found(format!("delivery {}", record_id)))
    }
}

fn tally(counts: &mut DeliveryCounts, record: &DeliveryRecord) {
    counts.total += 1;
    match record.state {
        DeliveryState::Pending => counts.pending += 1,
        DeliveryState::Sent => counts.sent += 1,
        DeliveryState::Delivered => {
            counts.sent += 1;
            counts.delivered += 1;
        }
        DeliveryState::Read => {
            counts.sent += 1;
            counts.delivered += 1;
            counts.read += 1;
        }
        DeliveryState::Failed => {
            counts.sent += 1;
            counts.failed += 1;
        }
    }
    if record.clicked_at.is_some() {
        counts.clicked += 1;
    }
}
