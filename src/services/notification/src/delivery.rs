//! Per-channel send pipeline shared by campaigns and single notifications
//!
//! For one (owner, recipient, channel): fetch or create the delivery record,
//! skip terminal records, fail fast on a missing contact, render, send under
//! the per-send timeout and record the outcome.
//!
//! A record has at most one sender at a time. In-process senders are kept
//! apart by the in-flight set; across processes the guarded `mark_sent`
//! decides, and a sender that loses it does not call the provider.

use crate::channels::{ChannelRegistry, SendOutcome};
use crate::error::NotificationError;
use crate::metrics::EngineMetrics;
use crate::personalization::render;
use crate::tracker::DeliveryTracker;
use chrono::Utc;
use dashmap::DashSet;
use futures::future::join_all;
use notify_shared::{Channel, DeliveryMetadata, DeliveryState, OwnerKind, Recipient};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What happened on one channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelAttempt {
    /// A send (or an immediate failure) was recorded in this run
    Completed {
        channel: Channel,
        outcome: SendOutcome,
    },
    /// The record was already terminal; nothing was sent
    Skipped {
        channel: Channel,
        state: DeliveryState,
    },
    /// Another sender holds the record; nothing was sent
    InFlight { channel: Channel },
}

impl ChannelAttempt {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Completed { channel, .. }
            | Self::Skipped { channel, .. }
            | Self::InFlight { channel } => *channel,
        }
    }

    /// Delivered now or earlier
    pub fn is_delivered(&self) -> bool {
        match self {
            Self::Completed { outcome, .. } => outcome.success,
            Self::Skipped { state, .. } => state.is_delivered(),
            Self::InFlight { .. } => false,
        }
    }
}

/// Owner and message shared by every channel of one delivery
#[derive(Debug, Clone, Copy)]
pub struct DeliveryJob<'a> {
    pub owner_kind: OwnerKind,
    pub owner_id: &'a str,
    pub title_template: &'a str,
    pub body_template: &'a str,
    pub metadata: Option<&'a DeliveryMetadata>,
}

/// Removes its record id from the in-flight set when dropped
struct InFlightGuard {
    in_flight: Arc<DashSet<String>>,
    record_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.record_id);
    }
}

#[derive(Clone)]
pub struct SendPipeline {
    tracker: DeliveryTracker,
    channels: ChannelRegistry,
    metrics: EngineMetrics,
    send_timeout: Duration,
    in_flight: Arc<DashSet<String>>,
}

impl SendPipeline {
    pub fn new(
        tracker: DeliveryTracker,
        channels: ChannelRegistry,
        metrics: EngineMetrics,
        send_timeout: Duration,
    ) -> Self {
        Self {
            tracker,
            channels,
            metrics,
            send_timeout,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Whether a send for `record_id` is running in this process
    pub fn is_in_flight(&self, record_id: &str) -> bool {
        self.in_flight.contains(record_id)
    }

    fn claim_in_flight(&self, record_id: &str) -> Option<InFlightGuard> {
        self.in_flight
            .insert(record_id.to_string())
            .then(|| InFlightGuard {
                in_flight: Arc::clone(&self.in_flight),
                record_id: record_id.to_string(),
            })
    }

    /// Every channel concurrently; no channel's failure stops another.
    pub async fn deliver_all(
        &self,
        job: DeliveryJob<'_>,
        recipient: &Recipient,
        channels: &[Channel],
    ) -> Vec<ChannelAttempt> {
        join_all(
            channels
                .iter()
                .map(|channel| self.deliver(job, recipient, *channel)),
        )
        .await
    }

    pub async fn deliver(
        &self,
        job: DeliveryJob<'_>,
        recipient: &Recipient,
        channel: Channel,
    ) -> ChannelAttempt {
        let record = match self
            .tracker
            .record_attempt(job.owner_kind, job.owner_id, &recipient.user_id, channel)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                // Without a record the send could repeat on resume; count it failed.
                warn!(owner_id = job.owner_id, user_id = %recipient.user_id, %channel, "Tracker write failed: {}", e);
                return ChannelAttempt::Completed {
                    channel,
                    outcome: SendOutcome::failed(format!("tracker unavailable: {}", e)),
                };
            }
        };

        if record.state.is_terminal() {
            debug!(record_id = %record.id, state = %record.state, "Skipping terminal delivery");
            return ChannelAttempt::Skipped {
                channel,
                state: record.state,
            };
        }

        let Some(_in_flight) = self.claim_in_flight(&record.id) else {
            debug!(record_id = %record.id, "Delivery already in flight, not sending again");
            return ChannelAttempt::InFlight { channel };
        };

        let outcome = if recipient.address_for(channel).is_none() {
            self.metrics.record_skipped(channel);
            SendOutcome::failed(
                NotificationError::missing_contact(&recipient.user_id, channel).to_string(),
            )
        } else {
            match self.send(job, recipient, channel, &record.id).await {
                Some(outcome) => outcome,
                None => return self.lost_claim(&record.id, channel).await,
            }
        };

        if !outcome.success {
            warn!(
                record_id = %record.id,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Delivery failed"
            );
        }

        if let Err(e) = self.tracker.record_result(&record.id, &outcome).await {
            warn!(record_id = %record.id, "Failed to record delivery result: {}", e);
        }

        ChannelAttempt::Completed { channel, outcome }
    }

    /// The `mark_sent` guard went to another sender, or the record turned terminal.
    async fn lost_claim(&self, record_id: &str, channel: Channel) -> ChannelAttempt {
        match self.tracker.get_record(record_id).await {
            Ok(Some(record)) if record.state.is_terminal() => ChannelAttempt::Skipped {
                channel,
                state: record.state,
            },
            _ => ChannelAttempt::InFlight { channel },
        }
    }

    /// Mark a channel failed without sending (e.g. the send task died).
    pub async fn fail(&self, job: DeliveryJob<'_>, recipient_id: &str, channel: Channel, reason: &str) {
        match self
            .tracker
            .record_attempt(job.owner_kind, job.owner_id, recipient_id, channel)
            .await
        {
            Ok(record) => {
                if let Err(e) = self
                    .tracker
                    .record_result(&record.id, &SendOutcome::failed(reason))
                    .await
                {
                    warn!(record_id = %record.id, "Failed to record delivery result: {}", e);
                }
            }
            Err(e) => warn!(owner_id = job.owner_id, recipient_id, "Tracker write failed: {}", e),
        }
    }

    async fn send(
        &self,
        job: DeliveryJob<'_>,
        recipient: &Recipient,
        channel: Channel,
        record_id: &str,
    ) -> Option<SendOutcome> {
        let adapter = match self.channels.require(channel) {
            Ok(adapter) => adapter,
            Err(e) => return Some(SendOutcome::failed(e.to_string())),
        };

        let now = Utc::now();
        let title = render(job.title_template, recipient, now);
        let body = render(job.body_template, recipient, now);

        match self.tracker.mark_sent(record_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(record_id, "Delivery claimed by another sender");
                return None;
            }
            Err(e) => {
                warn!(record_id, "Failed to mark delivery sent: {}", e);
                return Some(SendOutcome::failed(format!("tracker unavailable: {}", e)));
            }
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            self.send_timeout,
            adapter.send(recipient, &title, &body, job.metadata),
        )
        .await
        {
            Ok(result) => SendOutcome::from(result),
            Err(_) => SendOutcome::failed(
                NotificationError::timeout(format!(
                    "{} send after {}s",
                    channel,
                    self.send_timeout.as_secs_f64()
                ))
                .to_string(),
            ),
        };

        self.metrics
            .record_delivery(channel, outcome.success, started.elapsed().as_secs_f64());
        Some(outcome)
    }
}
