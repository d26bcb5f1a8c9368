//! Schedule firing through the engine, driven by explicit ticks

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::*;
use notification_engine::channels::{ChannelRegistry, InAppChannel};
use notification_engine::scheduler::SCHEDULES_COLLECTION;
use notification_engine::{NotificationEngine, NotificationError};
use notify_database::{DatabaseError, Filter, InMemoryStore, PagedResult, Query, RecordStore};
use notify_shared::{
    CampaignStatus, Channel, CreateNotificationRequest, CreateScheduleRequest, Frequency,
    NotificationOrigin, Recurrence, SchedulePayload, ScheduleStatus,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// In-memory store whose unguarded schedule updates always fail
struct ScheduleUpdatesFail {
    inner: InMemoryStore,
}

#[async_trait]
impl RecordStore for ScheduleUpdatesFail {
    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), DatabaseError> {
        self.inner.insert(collection, id, record).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DatabaseError> {
        self.inner.get(collection, id).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, DatabaseError> {
        if collection == SCHEDULES_COLLECTION {
            return Err(DatabaseError::Backend("schedules offline".to_string()));
        }
        self.inner.update(collection, id, patch).await
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        guard: &[Filter],
        patch: Value,
    ) -> Result<Option<Value>, DatabaseError> {
        self.inner.update_if(collection, id, guard, patch).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<PagedResult<Value>, DatabaseError> {
        self.inner.query(collection, query).await
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64, DatabaseError> {
        self.inner.count(collection, filters).await
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn reminder() -> SchedulePayload {
    SchedulePayload::Notification(CreateNotificationRequest {
        user_id: "u0".to_string(),
        title: "Daily deals".to_string(),
        body: "Hi {{first_name}}, today's deals are up.".to_string(),
        channels: vec![Channel::InApp],
        metadata: None,
    })
}

fn daily(max_occurrences: Option<u32>, end_at: Option<DateTime<Utc>>) -> Option<Recurrence> {
    Some(Recurrence {
        frequency: Frequency::Daily,
        end_at,
        max_occurrences,
    })
}

#[tokio::test]
async fn test_daily_schedule_fires_three_times_then_completes() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    seed_users(&engine, 1).await;

    let entry = engine
        .schedule(CreateScheduleRequest {
            payload: reminder(),
            trigger_at: t0(),
            recurrence: daily(Some(3), None),
        })
        .await
        .unwrap();

    assert!(engine.tick_scheduler(t0() - Duration::hours(1)).await.unwrap().is_empty());

    let mut statuses = Vec::new();
    for day in 0..3 {
        let firings = engine
            .tick_scheduler(t0() + Duration::days(day))
            .await
            .unwrap();
        assert_eq!(firings.len(), 1);
        assert!(firings[0].error.is_none());
        statuses.push(firings[0].status);
    }
    assert_eq!(
        statuses,
        vec![
            ScheduleStatus::Scheduled,
            ScheduleStatus::Scheduled,
            ScheduleStatus::Completed
        ]
    );

    let stored = engine.get_schedule(&entry.id).await.unwrap();
    assert_eq!(stored.status, ScheduleStatus::Completed);
    assert_eq!(stored.occurrences, 3);
    assert_eq!(stored.runs.len(), 3);
    assert_eq!(stored.runs.iter().collect::<HashSet<_>>().len(), 3);
    assert_eq!(stored.last_fired_at, Some(t0() + Duration::days(2)));

    let notification = engine.get_notification(&stored.runs[0]).await.unwrap();
    assert_eq!(
        notification.origin,
        NotificationOrigin::Schedule {
            entry_id: entry.id.clone()
        }
    );
    assert_eq!(engine.inbox("u0").await.unwrap().len(), 3);

    assert!(engine
        .tick_scheduler(t0() + Duration::days(3))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_end_date_stops_recurrence() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    seed_users(&engine, 1).await;

    let end_at = t0() + Duration::days(1) + Duration::hours(1);
    let entry = engine
        .schedule(CreateScheduleRequest {
            payload: reminder(),
            trigger_at: t0(),
            recurrence: daily(None, Some(end_at)),
        })
        .await
        .unwrap();

    let first = engine.tick_scheduler(t0()).await.unwrap();
    assert_eq!(first[0].status, ScheduleStatus::Scheduled);
    let second = engine.tick_scheduler(t0() + Duration::days(1)).await.unwrap();
    assert_eq!(second[0].status, ScheduleStatus::Completed);

    assert_eq!(engine.get_schedule(&entry.id).await.unwrap().occurrences, 2);
}

#[tokio::test]
async fn test_trigger_past_end_date_expires() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    seed_users(&engine, 1).await;

    let entry = engine
        .schedule(CreateScheduleRequest {
            payload: reminder(),
            trigger_at: t0(),
            recurrence: daily(None, Some(t0() - Duration::days(1))),
        })
        .await
        .unwrap();

    let firings = engine.tick_scheduler(t0()).await.unwrap();
    assert_eq!(firings[0].status, ScheduleStatus::Expired);
    assert!(firings[0].run_id.is_none());
    assert!(engine.inbox("u0").await.unwrap().is_empty());
    assert_eq!(
        engine.get_schedule(&entry.id).await.unwrap().status,
        ScheduleStatus::Expired
    );
}

#[tokio::test]
async fn test_scheduled_campaign_runs_to_completion() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    seed_users(&engine, 4).await;

    let entry = engine
        .schedule(CreateScheduleRequest {
            payload: SchedulePayload::Campaign(campaign_request("Morning", vec![Channel::InApp])),
            trigger_at: t0(),
            recurrence: None,
        })
        .await
        .unwrap();

    let firings = engine.tick_scheduler(t0()).await.unwrap();
    assert_eq!(firings[0].status, ScheduleStatus::Completed);
    let campaign_id = firings[0].run_id.clone().unwrap();

    let campaign = engine.get_campaign(&campaign_id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.schedule_entry_id.as_deref(), Some(entry.id.as_str()));
    assert_eq!(campaign.counters.delivered, 4);
}

#[tokio::test]
async fn test_failing_payload_keeps_recurring() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    // Only the admin exists, so the marketing audience is empty.
    seed_users(&engine, 0).await;

    let entry = engine
        .schedule(CreateScheduleRequest {
            payload: SchedulePayload::Campaign(campaign_request("Nobody home", vec![Channel::InApp])),
            trigger_at: t0(),
            recurrence: daily(Some(2), None),
        })
        .await
        .unwrap();

    let first = engine.tick_scheduler(t0()).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status, ScheduleStatus::Scheduled);
    assert!(first[0].error.is_some());

    let stored = engine.get_schedule(&entry.id).await.unwrap();
    assert_eq!(stored.status, ScheduleStatus::Scheduled);
    assert_eq!(stored.trigger_at, t0() + Duration::days(1));
    assert_eq!(stored.occurrences, 1);
    assert!(stored.last_error.is_some());
    let failed_campaign = engine.get_campaign(&stored.runs[0]).await.unwrap();
    assert_eq!(failed_campaign.status, CampaignStatus::Failed);

    let second = engine.tick_scheduler(t0() + Duration::days(1)).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].status, ScheduleStatus::Completed);
    assert_eq!(engine.get_schedule(&entry.id).await.unwrap().occurrences, 2);
}

#[tokio::test]
async fn test_lost_bookkeeping_write_does_not_strand_entry() {
    let store: Arc<dyn RecordStore> = Arc::new(ScheduleUpdatesFail {
        inner: InMemoryStore::new(),
    });
    let channels = ChannelRegistry::new().with(Arc::new(InAppChannel::new(store.clone())));
    let engine = NotificationEngine::with_channels(test_config(), store, channels).unwrap();
    seed_users(&engine, 1).await;

    let entry = engine
        .schedule(CreateScheduleRequest {
            payload: reminder(),
            trigger_at: t0(),
            recurrence: daily(Some(2), None),
        })
        .await
        .unwrap();

    let first = engine.tick_scheduler(t0()).await.unwrap();
    assert_eq!(first[0].status, ScheduleStatus::Scheduled);
    assert!(first[0].run_id.is_some());

    let stored = engine.get_schedule(&entry.id).await.unwrap();
    assert_eq!(stored.status, ScheduleStatus::Scheduled);
    assert_eq!(stored.trigger_at, t0() + Duration::days(1));

    let second = engine.tick_scheduler(t0() + Duration::days(1)).await.unwrap();
    assert_eq!(second[0].status, ScheduleStatus::Completed);
    assert_eq!(engine.inbox("u0").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancelled_entry_never_fires() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    seed_users(&engine, 1).await;

    let entry = engine
        .schedule(CreateScheduleRequest {
            payload: reminder(),
            trigger_at: t0(),
            recurrence: daily(None, None),
        })
        .await
        .unwrap();

    let cancelled = engine.cancel_schedule(&entry.id).await.unwrap();
    assert_eq!(cancelled.status, ScheduleStatus::Cancelled);
    assert!(engine.tick_scheduler(t0()).await.unwrap().is_empty());

    let err = engine.cancel_schedule(&entry.id).await.unwrap_err();
    assert!(matches!(err, NotificationError::Conflict { .. }));
}

#[tokio::test]
async fn test_zero_max_occurrences_is_rejected() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());

    let err = engine
        .schedule(CreateScheduleRequest {
            payload: reminder(),
            trigger_at: t0(),
            recurrence: daily(Some(0), None),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NotificationError::Validation { .. }));
}

#[tokio::test]
async fn test_background_runner_respects_config() {
    let TestEngine { engine, .. } = build_engine(test_config(), Vec::new());
    assert!(!engine.start_scheduler());

    let mut config = test_config();
    config.scheduler.enabled = true;
    config.scheduler.check_interval_seconds = 1;
    let TestEngine { engine, .. } = build_engine(config, Vec::new());
    assert!(engine.start_scheduler());
    assert!(!engine.start_scheduler());
    assert_eq!(engine.health_check().await["scheduler_running"], true);

    engine.stop_scheduler().await;
    assert_eq!(engine.health_check().await["scheduler_running"], false);
}
