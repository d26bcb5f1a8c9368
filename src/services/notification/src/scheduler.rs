//! Scheduler for deferred and recurring campaigns and notifications
//!
//! Entries live in the record store. A firing claims the entry with one
//! guarded update that already writes its post-firing state (next trigger,
//! completion or expiry), so one trigger never fires twice even with several
//! tick loops running, and a failed payload or store write never leaves the
//! entry unschedulable. Each tick fires at most one occurrence per entry.

use crate::campaign::CampaignService;
use crate::config::SchedulerConfig;
use crate::dispatcher::{BatchDispatcher, ProgressObserver};
use crate::error::{NotificationError, Result};
use crate::metrics::EngineMetrics;
use crate::notifications::NotificationService;
use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use notify_database::{Filter, PagedResult, Pagination, Query, RecordStore, Sort, TypedCollection};
use notify_shared::{
    CreateScheduleRequest, Frequency, NotificationOrigin, Recurrence, ScheduleEntry,
    SchedulePayload, ScheduleStatus,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

pub const SCHEDULES_COLLECTION: &str = "schedules";

/// Result of firing one entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleFiring {
    pub entry_id: String,
    /// Campaign or notification produced by this firing
    pub run_id: Option<String>,
    /// Entry status after the firing
    pub status: ScheduleStatus,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    entries: TypedCollection<ScheduleEntry>,
    campaigns: CampaignService,
    dispatcher: BatchDispatcher,
    notifications: NotificationService,
    observer: Arc<dyn ProgressObserver>,
    metrics: EngineMetrics,
    check_interval: Duration,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        campaigns: CampaignService,
        dispatcher: BatchDispatcher,
        notifications: NotificationService,
        observer: Arc<dyn ProgressObserver>,
        metrics: EngineMetrics,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                entries: TypedCollection::new(store, SCHEDULES_COLLECTION),
                campaigns,
                dispatcher,
                notifications,
                observer,
                metrics,
                check_interval: Duration::from_secs(config.check_interval_seconds.max(1)),
                running: Mutex::new(None),
            }),
        }
    }

    pub async fn schedule(&self, request: CreateScheduleRequest) -> Result<ScheduleEntry> {
        match &request.payload {
            SchedulePayload::Campaign(campaign) => campaign.validate()?,
            SchedulePayload::Notification(notification) => notification.validate()?,
        }
        if let Some(Recurrence {
            max_occurrences: Some(0),
            ..
        }) = request.recurrence
        {
            return Err(NotificationError::validation(
                "recurrence.max_occurrences",
                "must be at least 1",
            ));
        }

        let now = Utc::now();
        let entry = ScheduleEntry {
            id: Uuid::new_v4().to_string(),
            payload: request.payload,
            trigger_at: request.trigger_at,
            recurrence: request.recurrence,
            status: ScheduleStatus::Scheduled,
            occurrences: 0,
            runs: Vec::new(),
            last_fired_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        self.inner.entries.insert(&entry.id, &entry).await?;
        info!(entry_id = %entry.id, trigger_at = %entry.trigger_at, recurring = entry.recurrence.is_some(), "Entry scheduled");
        Ok(entry)
    }

    /// Cancel an entry that is waiting for its trigger.
    pub async fn cancel(&self, id: &str) -> Result<ScheduleEntry> {
        let patch = json!({"status": ScheduleStatus::Cancelled, "updated_at": Utc::now()});
        match self
            .inner
            .entries
            .update_if(id, &[Filter::eq("status", ScheduleStatus::Scheduled)], patch)
            .await?
        {
            Some(cancelled) => {
                info!(entry_id = id, "Schedule entry cancelled");
                Ok(cancelled)
            }
            None => {
                let current = self.get(id).await?;
                Err(NotificationError::conflict(format!(
                    "schedule entry {} is {} and cannot be cancelled",
                    id, current.status
                )))
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<ScheduleEntry> {
        self.inner
            .entries
            .get(id)
            .await?
            .ok_or_else(|| NotificationError::not_found(format!("schedule entry {}", id)))
    }

    pub async fn list(
        &self,
        status: Option<ScheduleStatus>,
        pagination: Pagination,
    ) -> Result<PagedResult<ScheduleEntry>> {
        let mut query = Query::new().sort(Sort::asc("trigger_at")).page(pagination);
        if let Some(status) = status {
            query = query.filter(Filter::eq("status", status));
        }
        Ok(self.inner.entries.query(&query).await?)
    }

    /// Scheduled entries whose trigger is at or before `now`, earliest first
    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleEntry>> {
        Ok(self
            .inner
            .entries
            .find_all(
                vec![
                    Filter::eq("status", ScheduleStatus::Scheduled),
                    Filter::lte("trigger_at", now),
                ],
                Some(Sort::asc("trigger_at")),
            )
            .await?)
    }

    /// Fire every due entry once.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleFiring>> {
        let due = self.list_due(now).await?;
        if !due.is_empty() {
            debug!(count = due.len(), "Firing due schedule entries");
        }

        let mut firings = Vec::with_capacity(due.len());
        for entry in due {
            match self.fire(&entry, now).await {
                Ok(Some(firing)) => firings.push(firing),
                Ok(None) => debug!(entry_id = %entry.id, "Entry claimed elsewhere"),
                Err(e) => error!(entry_id = %entry.id, "Failed to fire schedule entry: {}", e),
            }
        }
        Ok(firings)
    }

    async fn fire(&self, entry: &ScheduleEntry, now: DateTime<Utc>) -> Result<Option<ScheduleFiring>> {
        let guard = [
            Filter::eq("status", ScheduleStatus::Scheduled),
            Filter::eq("trigger_at", entry.trigger_at),
        ];

        if let Some(end_at) = entry.recurrence.as_ref().and_then(|r| r.end_at) {
            if entry.trigger_at > end_at {
                let patch = json!({"status": ScheduleStatus::Expired, "updated_at": now});
                if self.inner.entries.update_if(&entry.id, &guard, patch).await?.is_none() {
                    return Ok(None);
                }
                warn!(entry_id = %entry.id, trigger_at = %entry.trigger_at, %end_at, "Schedule entry expired");
                return Ok(Some(ScheduleFiring {
                    entry_id: entry.id.clone(),
                    run_id: None,
                    status: ScheduleStatus::Expired,
                    error: None,
                }));
            }
        }

        let occurrences = entry.occurrences + 1;
        let (status, next_trigger) = advance(entry, occurrences);
        let mut claim = json!({
            "status": status,
            "occurrences": occurrences,
            "last_fired_at": now,
            "updated_at": now,
        });
        if let Some(next) = next_trigger {
            claim["trigger_at"] = json!(next);
        }
        let Some(claimed) = self.inner.entries.update_if(&entry.id, &guard, claim).await? else {
            return Ok(None);
        };

        let (run_id, error) = self.run_payload(&claimed).await;
        self.record_outcome(&claimed, run_id.as_deref(), error.as_deref())
            .await;

        info!(
            entry_id = %claimed.id,
            occurrence = occurrences,
            %status,
            next_trigger = ?next_trigger,
            failed = error.is_some(),
            "Schedule entry fired"
        );
        Ok(Some(ScheduleFiring {
            entry_id: claimed.id,
            run_id,
            status,
            error,
        }))
    }

    /// Append the produced run and remember the error. The entry has already
    /// advanced, so a failed write only loses this bookkeeping.
    async fn record_outcome(&self, entry: &ScheduleEntry, run_id: Option<&str>, error: Option<&str>) {
        let mut runs = entry.runs.clone();
        runs.extend(run_id.map(str::to_string));
        let patch = json!({
            "runs": runs,
            "last_error": error,
            "updated_at": Utc::now(),
        });
        if let Err(e) = self.inner.entries.update(&entry.id, patch).await {
            error!(entry_id = %entry.id, run_id, "Failed to record schedule firing: {}", e);
        }
    }

    /// Hand the payload to its service. Returns the produced id and any run error.
    async fn run_payload(&self, entry: &ScheduleEntry) -> (Option<String>, Option<String>) {
        match &entry.payload {
            SchedulePayload::Campaign(request) => {
                let campaign = match self
                    .inner
                    .campaigns
                    .create_from_schedule(request.clone(), Some(entry.id.clone()))
                    .await
                {
                    Ok(campaign) => campaign,
                    Err(e) => {
                        self.inner.metrics.record_schedule_firing("campaign", false);
                        return (None, Some(e.to_string()));
                    }
                };

                let result = self
                    .inner
                    .dispatcher
                    .run_campaign(&campaign.id, self.inner.observer.as_ref())
                    .await;
                self.inner
                    .metrics
                    .record_schedule_firing("campaign", result.is_ok());
                match result {
                    Ok(_) => (Some(campaign.id), None),
                    Err(e) => {
                        warn!(entry_id = %entry.id, campaign_id = %campaign.id, "Scheduled campaign failed: {}", e);
                        (Some(campaign.id), Some(e.to_string()))
                    }
                }
            }
            SchedulePayload::Notification(request) => {
                let origin = NotificationOrigin::Schedule {
                    entry_id: entry.id.clone(),
                };
                let result = self.inner.notifications.send(request.clone(), origin).await;
                self.inner
                    .metrics
                    .record_schedule_firing("notification", result.is_ok());
                match result {
                    Ok(notification) => (Some(notification.id), None),
                    Err(e) => {
                        warn!(entry_id = %entry.id, "Scheduled notification failed: {}", e);
                        (None, Some(e.to_string()))
                    }
                }
            }
        }
    }

    /// Start the background tick loop. Returns false if it is already running.
    pub fn start(&self) -> bool {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let scheduler = self.clone();
        let period = self.inner.check_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.tick(Utc::now()).await {
                            error!("Scheduler tick failed: {}", e);
                        }
                    }
                }
            }
            info!("Scheduler loop stopped");
        });

        *running = Some((token, handle));
        info!(interval_secs = period.as_secs(), "Scheduler started");
        true
    }

    /// Stop the loop and wait for an in-flight tick to finish.
    pub async fn stop(&self) {
        let running = self.inner.running.lock().take();
        if let Some((token, handle)) = running {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.lock().is_some()
    }
}

/// Status and next trigger after `occurrences` firings
fn advance(entry: &ScheduleEntry, occurrences: u32) -> (ScheduleStatus, Option<DateTime<Utc>>) {
    let Some(recurrence) = &entry.recurrence else {
        return (ScheduleStatus::Completed, None);
    };
    if recurrence
        .max_occurrences
        .is_some_and(|max| occurrences >= max)
    {
        return (ScheduleStatus::Completed, None);
    }
    match next_trigger(entry.trigger_at, recurrence.frequency) {
        Some(next) if recurrence.end_at.map_or(true, |end| next <= end) => {
            (ScheduleStatus::Scheduled, Some(next))
        }
        _ => (ScheduleStatus::Completed, None),
    }
}

/// Next occurrence after `from`. Monthly steps clamp to the month's last day.
pub fn next_trigger(from: DateTime<Utc>, frequency: Frequency) -> Option<DateTime<Utc>> {
    match frequency {
        Frequency::Daily => from.checked_add_signed(ChronoDuration::days(1)),
        Frequency::Weekly => from.checked_add_signed(ChronoDuration::weeks(1)),
        Frequency::Monthly => from.checked_add_months(Months::new(1)),
    }
}
