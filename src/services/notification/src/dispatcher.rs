//! Batch dispatcher
//!
//! Runs one campaign: claim it, resolve the audience, send batch by batch with
//! every (recipient, channel) of a batch in flight at once, refresh counters
//! and progress after each batch, and sleep between batches. Campaign status
//! and run token are re-read at every batch boundary, so a pause, a cancel or
//! a newer claim of the same campaign stops the run.

use crate::audience::AudienceResolver;
use crate::campaign::{counters_from_stats, CampaignService};
use crate::config::EngineConfig;
use crate::delivery::{ChannelAttempt, DeliveryJob, SendPipeline};
use crate::error::{NotificationError, Result};
use crate::metrics::EngineMetrics;
use crate::progress::{batch_count, ProgressEstimator};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use notify_shared::{
    BatchCompleted, Campaign, CampaignCounters, CampaignMetadata, CampaignStatus, Channel,
    DeliveryMetadata, DeliveryRecord, DispatchReport, OwnerKind, ProgressSnapshot, Recipient,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives progress once per batch, after counters are written and before
/// the next batch starts.
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn on_batch_completed(&self, event: &BatchCompleted);

    async fn on_run_finished(&self, _report: &DispatchReport) {}
}

pub struct NoopObserver;

#[async_trait]
impl ProgressObserver for NoopObserver {
    async fn on_batch_completed(&self, _event: &BatchCompleted) {}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    BatchCompleted(BatchCompleted),
    RunFinished(DispatchReport),
}

impl DispatchEvent {
    pub fn campaign_id(&self) -> &str {
        match self {
            Self::BatchCompleted(event) => &event.campaign_id,
            Self::RunFinished(report) => &report.campaign_id,
        }
    }
}

/// Fan-out of dispatch events to any number of subscribers, globally or per campaign.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    all: broadcast::Sender<DispatchEvent>,
    campaigns: Arc<DashMap<String, broadcast::Sender<DispatchEvent>>>,
    capacity: usize,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _) = broadcast::channel(capacity);
        Self {
            all,
            campaigns: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.all.subscribe()
    }

    /// Per-campaign receiver. Channels whose receivers are all gone are
    /// pruned here, so ids that never run do not accumulate.
    pub fn subscribe_campaign(&self, campaign_id: &str) -> broadcast::Receiver<DispatchEvent> {
        self.campaigns.retain(|_, sender| sender.receiver_count() > 0);
        self.campaigns
            .entry(campaign_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.all.receiver_count()
    }

    fn publish(&self, event: DispatchEvent) {
        if let Some(sender) = self.campaigns.get(event.campaign_id()) {
            // No receivers is fine.
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event);
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ProgressObserver for ProgressBroadcaster {
    async fn on_batch_completed(&self, event: &BatchCompleted) {
        self.publish(DispatchEvent::BatchCompleted(event.clone()));
    }

    async fn on_run_finished(&self, report: &DispatchReport) {
        self.publish(DispatchEvent::RunFinished(report.clone()));
        self.campaigns.remove(&report.campaign_id);
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            inter_batch_delay: Duration::from_millis(2000),
        }
    }
}

impl From<&EngineConfig> for DispatchSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.dispatch.batch_size.max(1),
            inter_batch_delay: config.inter_batch_delay(),
        }
    }
}

/// How a claimed run ended
struct RunOutcome {
    report: DispatchReport,
    /// A newer claim took the campaign over; that run reports the result.
    superseded: bool,
}

#[derive(Clone)]
pub struct BatchDispatcher {
    campaigns: CampaignService,
    audience: AudienceResolver,
    pipeline: SendPipeline,
    metrics: EngineMetrics,
    settings: DispatchSettings,
}

impl BatchDispatcher {
    pub fn new(
        campaigns: CampaignService,
        audience: AudienceResolver,
        pipeline: SendPipeline,
        metrics: EngineMetrics,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            campaigns,
            audience,
            pipeline,
            metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Run a campaign to completion, or until it is paused or cancelled.
    ///
    /// Errors after the claim (audience query failure, empty audience) mark
    /// the campaign failed before they are returned. Delivery records already
    /// written are kept.
    pub async fn run_campaign(
        &self,
        campaign_id: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<DispatchReport> {
        let campaign = self.claim(campaign_id).await?;
        self.drive(campaign, observer).await
    }

    /// Claim the campaign, then run it on a background task.
    pub async fn spawn_campaign(
        &self,
        campaign_id: &str,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<(Campaign, JoinHandle<Result<DispatchReport>>)> {
        let campaign = self.claim(campaign_id).await?;
        let dispatcher = self.clone();
        let claimed = campaign.clone();
        let handle = tokio::spawn(async move { dispatcher.drive(claimed, observer.as_ref()).await });
        Ok((campaign, handle))
    }

    async fn claim(&self, campaign_id: &str) -> Result<Campaign> {
        let campaign = self.campaigns.claim_for_dispatch(campaign_id).await?;
        self.metrics.campaign_started();
        info!(campaign_id, name = %campaign.name, "Campaign dispatch started");
        Ok(campaign)
    }

    async fn drive(&self, campaign: Campaign, observer: &dyn ProgressObserver) -> Result<DispatchReport> {
        let campaign_id = campaign.id.as_str();
        match self.run_claimed(&campaign, observer).await {
            Ok(RunOutcome {
                report,
                superseded: true,
            }) => {
                self.metrics.campaign_superseded();
                info!(
                    campaign_id,
                    batches = report.batches_processed,
                    "Campaign run superseded by a newer claim"
                );
                Ok(report)
            }
            Ok(RunOutcome { report, .. }) => {
                self.metrics.campaign_finished(report.final_status);
                info!(
                    campaign_id,
                    status = %report.final_status,
                    batches = report.batches_processed,
                    total_batches = report.total_batches,
                    "Campaign dispatch finished"
                );
                observer.on_run_finished(&report).await;
                Ok(report)
            }
            Err(e) => {
                error!(campaign_id, "Campaign dispatch failed: {}", e);
                let run_id = campaign.run_id.as_deref();
                let failed = match self.campaigns.fail(campaign_id, run_id, &e.to_string()).await {
                    Ok(failed) => failed,
                    Err(mark_err) => {
                        warn!(campaign_id, "Failed to mark campaign failed: {}", mark_err);
                        None
                    }
                };
                if failed.is_none() && self.is_superseded(&campaign).await {
                    self.metrics.campaign_superseded();
                    return Err(e);
                }
                self.metrics.campaign_finished(CampaignStatus::Failed);

                let counters = failed
                    .map(|c| c.counters)
                    .unwrap_or_else(|| campaign.counters.clone());
                let report = DispatchReport {
                    campaign_id: campaign_id.to_string(),
                    final_status: CampaignStatus::Failed,
                    batches_processed: 0,
                    total_batches: 0,
                    counters,
                    last_progress: None,
                    stopped_early: false,
                };
                observer.on_run_finished(&report).await;
                Err(e)
            }
        }
    }

    async fn is_superseded(&self, campaign: &Campaign) -> bool {
        match self.campaigns.get(&campaign.id).await {
            Ok(current) => current.run_id != campaign.run_id,
            Err(_) => false,
        }
    }

    async fn run_claimed(
        &self,
        campaign: &Campaign,
        observer: &dyn ProgressObserver,
    ) -> Result<RunOutcome> {
        let recipients = self.audience.resolve(&campaign.targeting).await?;
        if recipients.is_empty() {
            return Err(NotificationError::NoRecipients {
                campaign_id: campaign.id.clone(),
            });
        }

        let audience_size = recipients.len() as u64;
        let mut counters = self
            .write_counters(
                &campaign.id,
                &CampaignCounters {
                    audience_size,
                    ..CampaignCounters::default()
                },
            )
            .await
            .unwrap_or_else(|| CampaignCounters {
                audience_size,
                ..campaign.counters.clone()
            });

        let batch_size = self.settings.batch_size.max(1);
        let total_batches = batch_count(recipients.len(), batch_size);
        let estimator = ProgressEstimator::new(Utc::now(), audience_size, total_batches);

        let mut batches_processed = 0;
        let mut completed_count = 0u64;
        let mut last_progress: Option<ProgressSnapshot> = None;
        let mut stopped_early = false;
        let mut superseded = false;
        let mut final_status = CampaignStatus::Active;

        for (batch_index, batch) in recipients.chunks(batch_size).enumerate() {
            let current = self.campaigns.get(&campaign.id).await?;
            final_status = current.status;
            if current.run_id != campaign.run_id {
                info!(campaign_id = %campaign.id, batch_index, "Campaign claimed by a newer run, stopping");
                superseded = true;
                stopped_early = true;
                break;
            }
            let status = current.status;
            if status != CampaignStatus::Active {
                info!(campaign_id = %campaign.id, %status, batch_index, "Campaign no longer active, stopping");
                stopped_early = true;
                break;
            }

            let (batch_delivered, batch_failed) =
                self.dispatch_batch(campaign, batch_index, batch).await;
            self.metrics.record_batch();
            batches_processed += 1;
            completed_count += batch.len() as u64;

            match self.pipeline.tracker().get_aggregate_stats(&campaign.id).await {
                Ok(stats) => {
                    let fresh = counters_from_stats(audience_size, &stats);
                    counters = self
                        .write_counters(&campaign.id, &fresh)
                        .await
                        .unwrap_or_else(|| counters.merge_max(&fresh));
                }
                Err(e) => warn!(campaign_id = %campaign.id, "Failed to aggregate delivery stats: {}", e),
            }

            let progress = estimator.snapshot(completed_count, batches_processed, Utc::now());
            let event = BatchCompleted {
                campaign_id: campaign.id.clone(),
                batch_index,
                batch_size: batch.len(),
                batch_delivered,
                batch_failed,
                counters: counters.clone(),
                progress: progress.clone(),
                completed_at: Utc::now(),
            };
            debug!(
                campaign_id = %campaign.id,
                batch_index,
                percent = progress.percent_complete,
                rate = progress.send_rate_per_minute,
                "Batch completed"
            );
            observer.on_batch_completed(&event).await;
            last_progress = Some(progress);

            let is_last = batch_index + 1 == total_batches;
            if !is_last && !self.settings.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_batch_delay).await;
            }
        }

        if !stopped_early {
            match self
                .campaigns
                .complete_if_active(&campaign.id, campaign.run_id.as_deref())
                .await?
            {
                Some(completed) => final_status = completed.status,
                // A pause, cancel or newer claim landed after the last batch.
                None => {
                    let current = self.campaigns.get(&campaign.id).await?;
                    stopped_early = true;
                    superseded = current.run_id != campaign.run_id;
                    final_status = current.status;
                }
            }
        }

        Ok(RunOutcome {
            report: DispatchReport {
                campaign_id: campaign.id.clone(),
                final_status,
                batches_processed,
                total_batches,
                counters,
                last_progress,
                stopped_early,
            },
            superseded,
        })
    }

    /// Send one batch. Returns (recipients delivered, recipients failed).
    async fn dispatch_batch(
        &self,
        campaign: &Campaign,
        batch_index: usize,
        batch: &[Recipient],
    ) -> (u64, u64) {
        let handles: Vec<_> = batch
            .iter()
            .cloned()
            .map(|recipient| {
                let pipeline = self.pipeline.clone();
                let campaign_id = campaign.id.clone();
                let channels = campaign.channels.clone();
                let subject = campaign.template.subject.clone();
                let body = campaign.template.body.clone();
                tokio::spawn(async move {
                    let metadata = DeliveryMetadata::Campaign(CampaignMetadata {
                        campaign_id: campaign_id.clone(),
                        batch_index,
                    });
                    let job = DeliveryJob {
                        owner_kind: OwnerKind::Campaign,
                        owner_id: &campaign_id,
                        title_template: &subject,
                        body_template: &body,
                        metadata: Some(&metadata),
                    };
                    pipeline.deliver_all(job, &recipient, &channels).await
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        let mut delivered = 0;
        let mut failed = 0;
        for (recipient, result) in batch.iter().zip(results) {
            match result {
                Ok(attempts) => {
                    if attempts.iter().any(ChannelAttempt::is_delivered) {
                        delivered += 1;
                    } else {
                        failed += 1;
                    }
                }
                Err(join_err) => {
                    error!(campaign_id = %campaign.id, user_id = %recipient.user_id, "Send task aborted: {}", join_err);
                    self.fail_recipient(campaign, &recipient.user_id, &join_err.to_string())
                        .await;
                    failed += 1;
                }
            }
        }
        (delivered, failed)
    }

    async fn fail_recipient(&self, campaign: &Campaign, recipient_id: &str, reason: &str) {
        let job = DeliveryJob {
            owner_kind: OwnerKind::Campaign,
            owner_id: &campaign.id,
            title_template: &campaign.template.subject,
            body_template: &campaign.template.body,
            metadata: None,
        };
        for channel in &campaign.channels {
            self.pipeline.fail(job, recipient_id, *channel, reason).await;
        }
    }

    async fn write_counters(&self, campaign_id: &str, counters: &CampaignCounters) -> Option<CampaignCounters> {
        match self.campaigns.update_counters(campaign_id, counters).await {
            Ok(updated) => Some(updated.counters),
            Err(e) => {
                warn!(campaign_id, "Failed to update campaign counters: {}", e);
                None
            }
        }
    }

    /// Re-send one campaign delivery. Terminal records are returned unchanged.
    pub async fn resend(&self, record_id: &str) -> Result<DeliveryRecord> {
        let tracker = self.pipeline.tracker();
        let record = tracker
            .get_record(record_id)
            .await?
            .ok_or_else(|| NotificationError::not_found(format!("delivery {}", record_id)))?;

        if record.state.is_terminal() {
            debug!(record_id, state = %record.state, "Resend skipped for terminal record");
            return Ok(record);
        }
        if record.owner_kind != OwnerKind::Campaign {
            return Err(NotificationError::validation(
                "record_id",
                "only campaign deliveries are resent by the dispatcher",
            ));
        }

        let campaign = self.campaigns.get(&record.owner_id).await?;
        let recipient = self.audience.resolve_one(&record.recipient_id).await?;
        self.resend_to(&campaign, &recipient, record.channel).await;

        if let Ok(stats) = tracker.get_aggregate_stats(&campaign.id).await {
            let fresh = counters_from_stats(campaign.counters.audience_size, &stats);
            self.write_counters(&campaign.id, &fresh).await;
        }

        tracker
            .get_record(record_id)
            .await?
            .ok_or_else(|| NotificationError::internal(format!("delivery {} vanished", record_id)))
    }

    async fn resend_to(&self, campaign: &Campaign, recipient: &Recipient, channel: Channel) {
        let job = DeliveryJob {
            owner_kind: OwnerKind::Campaign,
            owner_id: &campaign.id,
            title_template: &campaign.template.subject,
            body_template: &campaign.template.body,
            metadata: None,
        };
        let attempt = self.pipeline.deliver(job, recipient, channel).await;
        info!(campaign_id = %campaign.id, user_id = %recipient.user_id, %channel, delivered = attempt.is_delivered(), "Delivery resent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelAdapter, ChannelInfo, ChannelRegistry, SendReceipt};
    use crate::config::MetricsConfig;
    use crate::tracker::DeliveryTracker;
    use notify_database::{InMemoryStore, RecordStore, TypedCollection};
    use notify_shared::{
        AuthMethod, CreateCampaignRequest, MessageTemplate, NotificationPreferences, TargetingSpec,
        UserProfile,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl ChannelAdapter for CountingChannel {
        fn channel(&self) -> Channel {
            Channel::Email
        }

        async fn send(
            &self,
            recipient: &Recipient,
            _title: &str,
            _body: &str,
            _metadata: Option<&DeliveryMetadata>,
        ) -> Result<SendReceipt> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(SendReceipt::new(format!("{}-{}", recipient.user_id, n)))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn channel_info(&self) -> ChannelInfo {
            ChannelInfo {
                channel: Channel::Email,
                name: "Counting".to_string(),
                description: "Counts sends".to_string(),
                enabled: true,
                supports_markup: false,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<BatchCompleted>>,
    }

    #[async_trait]
    impl ProgressObserver for Recorder {
        async fn on_batch_completed(&self, event: &BatchCompleted) {
            self.events.lock().push(event.clone());
        }
    }

    async fn setup(users: usize) -> (BatchDispatcher, CampaignService, Arc<CountingChannel>) {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryStore::new());
        let profiles: TypedCollection<UserProfile> = TypedCollection::new(store.clone(), "users");
        for i in 0..users {
            let profile = UserProfile {
                id: format!("u{}", i),
                name: Some(format!("User {}", i)),
                email: Some(format!("u{}@example.com", i)),
                phone: None,
                push_token: None,
                auth_method: AuthMethod::Password,
                preferences: NotificationPreferences::default(),
                is_admin: false,
                last_active_at: None,
                created_at: Utc::now(),
            };
            profiles.insert(&profile.id.clone(), &profile).await.unwrap();
        }

        let adapter = Arc::new(CountingChannel {
            sends: AtomicUsize::new(0),
        });
        let channels = ChannelRegistry::new().with(adapter.clone());
        let metrics = EngineMetrics::new(&MetricsConfig::default()).unwrap();
        let pipeline = SendPipeline::new(
            DeliveryTracker::new(store.clone()),
            channels,
            metrics.clone(),
            Duration::from_secs(5),
        );
        let campaigns = CampaignService::new(store.clone());
        let dispatcher = BatchDispatcher::new(
            campaigns.clone(),
            AudienceResolver::new(store),
            pipeline,
            metrics,
            DispatchSettings {
                batch_size: 4,
                inter_batch_delay: Duration::ZERO,
            },
        );
        (dispatcher, campaigns, adapter)
    }

    async fn campaign(campaigns: &CampaignService) -> Campaign {
        campaigns
            .create(CreateCampaignRequest {
                name: "Weekend".to_string(),
                channels: vec![Channel::Email],
                targeting: TargetingSpec::All,
                template: MessageTemplate {
                    subject: "Hi {{first_name}}".to_string(),
                    body: "Deals inside".to_string(),
                },
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_reports_each_batch() {
        let (dispatcher, campaigns, adapter) = setup(10).await;
        let campaign = campaign(&campaigns).await;
        let recorder = Recorder::default();

        let report = dispatcher.run_campaign(&campaign.id, &recorder).await.unwrap();
        assert_eq!(report.final_status, CampaignStatus::Completed);
        assert_eq!(report.total_batches, 3);
        assert_eq!(report.batches_processed, 3);
        assert_eq!(report.counters.sent, 10);
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 10);

        let events = recorder.events.lock();
        let sizes: Vec<usize> = events.iter().map(|e| e.batch_size).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(events.last().unwrap().progress.percent_complete, 100);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let (dispatcher, campaigns, _) = setup(2).await;
        let campaign = campaign(&campaigns).await;
        dispatcher.run_campaign(&campaign.id, &NoopObserver).await.unwrap();

        let err = dispatcher
            .run_campaign(&campaign.id, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_retired_run_stops_without_sending() {
        let (dispatcher, campaigns, adapter) = setup(3).await;
        let campaign = campaign(&campaigns).await;
        let first = campaigns.claim_for_dispatch(&campaign.id).await.unwrap();
        campaigns
            .transition(&campaign.id, CampaignStatus::Paused)
            .await
            .unwrap();
        let second = campaigns.claim_for_dispatch(&campaign.id).await.unwrap();

        let recorder = Recorder::default();
        let report = dispatcher.drive(first, &recorder).await.unwrap();
        assert!(report.stopped_early);
        assert_eq!(report.batches_processed, 0);
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 0);
        assert!(recorder.events.lock().is_empty());

        let current = campaigns.get(&campaign.id).await.unwrap();
        assert_eq!(current.status, CampaignStatus::Active);
        assert_eq!(current.run_id, second.run_id);

        let report = dispatcher.drive(second, &recorder).await.unwrap();
        assert_eq!(report.final_status, CampaignStatus::Completed);
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resend_skips_terminal_records() {
        let (dispatcher, campaigns, adapter) = setup(1).await;
        let campaign = campaign(&campaigns).await;
        dispatcher.run_campaign(&campaign.id, &NoopObserver).await.unwrap();

        let record_id = DeliveryRecord::key(&campaign.id, "u0", Channel::Email);
        let record = dispatcher.resend(&record_id).await.unwrap();
        assert!(record.state.is_delivered());
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcaster_fans_out() {
        let broadcaster = ProgressBroadcaster::new(8);
        let mut global = broadcaster.subscribe();
        let mut scoped = broadcaster.subscribe_campaign("c1");

        let report = DispatchReport {
            campaign_id: "c1".to_string(),
            final_status: CampaignStatus::Completed,
            batches_processed: 1,
            total_batches: 1,
            counters: CampaignCounters::default(),
            last_progress: None,
            stopped_early: false,
        };
        broadcaster.on_run_finished(&report).await;

        assert_eq!(global.recv().await.unwrap(), DispatchEvent::RunFinished(report.clone()));
        assert_eq!(scoped.recv().await.unwrap().campaign_id(), "c1");
        assert!(broadcaster.campaigns.get("c1").is_none());
    }

    #[tokio::test]
    async fn test_abandoned_campaign_subscriptions_are_pruned() {
        let broadcaster = ProgressBroadcaster::new(8);
        drop(broadcaster.subscribe_campaign("never-runs"));
        let _kept = broadcaster.subscribe_campaign("c2");

        assert!(broadcaster.campaigns.get("never-runs").is_none());
        assert!(broadcaster.campaigns.get("c2").is_some());

        let _again = broadcaster.subscribe_campaign("c3");
        assert!(broadcaster.campaigns.get("c2").is_some());
        assert_eq!(broadcaster.campaigns.len(), 2);
    }
}
