//! Campaign records: CRUD, guarded status transitions and counter updates

use crate::error::{NotificationError, Result};
use chrono::Utc;
use notify_database::{Filter, PagedResult, Pagination, Query, RecordStore, Sort, TypedCollection};
use notify_shared::{AggregateStats, Campaign, CampaignCounters, CampaignStatus, CreateCampaignRequest};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

pub const CAMPAIGNS_COLLECTION: &str = "campaigns";

const COUNTER_UPDATE_RETRIES: usize = 5;

#[derive(Clone)]
pub struct CampaignService {
    campaigns: TypedCollection<Campaign>,
}

impl CampaignService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            campaigns: TypedCollection::new(store, CAMPAIGNS_COLLECTION),
        }
    }

    pub async fn create(&self, request: CreateCampaignRequest) -> Result<Campaign> {
        self.create_from_schedule(request, None).await
    }

    /// Create a draft campaign, optionally tagged with the schedule entry that produced it.
    pub async fn create_from_schedule(
        &self,
        request: CreateCampaignRequest,
        schedule_entry_id: Option<String>,
    ) -> Result<Campaign> {
        request.validate()?;

        let mut channels = Vec::with_capacity(request.channels.len());
        for channel in request.channels {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            status: CampaignStatus::Draft,
            channels,
            targeting: request.targeting,
            template: request.template,
            counters: CampaignCounters::default(),
            failure_reason: None,
            schedule_entry_id,
            run_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            last_activity_at: None,
        };

        self.campaigns.insert(&campaign.id, &campaign).await?;
        info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign created");
        Ok(campaign)
    }

    pub async fn get(&self, id: &str) -> Result<Campaign> {
        self.campaigns
            .get(id)
            .await?
            .ok_or_else(|| NotificationError::not_found(format!("campaign {}", id)))
    }

    /// Newest first, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<CampaignStatus>,
        pagination: Pagination,
    ) -> Result<PagedResult<Campaign>> {
        let mut query = Query::new().sort(Sort::desc("created_at")).page(pagination);
        if let Some(status) = status {
            query = query.filter(Filter::eq("status", status));
        }
        Ok(self.campaigns.query(&query).await?)
    }

    /// Apply an allowed status transition as a compare-and-update on the current status.
    pub async fn transition(&self, id: &str, to: CampaignStatus) -> Result<Campaign> {
        let current = self.get(id).await?;
        if current.status == to {
            return Ok(current);
        }
        if !current.status.can_transition_to(to) {
            return Err(NotificationError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let now = Utc::now();
        let mut patch = json!({"status": to, "updated_at": now});
        if to == CampaignStatus::Active && current.started_at.is_none() {
            patch["started_at"] = json!(now);
        }
        if to.is_terminal() {
            patch["completed_at"] = json!(now);
        }

        match self
            .campaigns
            .update_if(id, &[Filter::eq("status", current.status)], patch)
            .await?
        {
            Some(updated) => {
                info!(campaign_id = id, from = %current.status, to = %to, "Campaign status changed");
                Ok(updated)
            }
            None => Err(NotificationError::conflict(format!(
                "campaign {} changed status concurrently",
                id
            ))),
        }
    }

    /// Claim a campaign for a dispatch run: draft/scheduled/paused -> active.
    ///
    /// Exactly one concurrent caller wins; the rest see `Conflict` or
    /// `InvalidTransition`. The claim stamps a fresh `run_id`, which retires
    /// any older run still winding down after a pause.
    pub async fn claim_for_dispatch(&self, id: &str) -> Result<Campaign> {
        let now = Utc::now();
        let guard = [Filter::is_in("status", CampaignStatus::startable())];
        let patch = json!({
            "status": CampaignStatus::Active,
            "run_id": Uuid::new_v4().to_string(),
            "updated_at": now,
            "last_activity_at": now,
        });

        match self.campaigns.update_if(id, &guard, patch).await? {
            Some(mut claimed) => {
                if claimed.started_at.is_none() {
                    claimed = self.campaigns.update(id, json!({"started_at": now})).await?;
                }
                Ok(claimed)
            }
            None => {
                let current = self.get(id).await?;
                if current.status == CampaignStatus::Active {
                    Err(NotificationError::conflict(format!(
                        "campaign {} is already running",
                        id
                    )))
                } else {
                    Err(NotificationError::InvalidTransition {
                        from: current.status,
                        to: CampaignStatus::Active,
                    })
                }
            }
        }
    }

    /// `active -> completed` for the run holding `run_id`, unless a pause,
    /// cancel or newer claim got there first.
    pub async fn complete_if_active(&self, id: &str, run_id: Option<&str>) -> Result<Option<Campaign>> {
        let now = Utc::now();
        let guard = [
            Filter::eq("status", CampaignStatus::Active),
            Filter::eq("run_id", run_id),
        ];
        let patch = json!({
            "status": CampaignStatus::Completed,
            "completed_at": now,
            "updated_at": now,
        });
        Ok(self.campaigns.update_if(id, &guard, patch).await?)
    }

    /// Mark a non-terminal campaign failed, as long as `run_id` still owns it.
    pub async fn fail(&self, id: &str, run_id: Option<&str>, reason: &str) -> Result<Option<Campaign>> {
        let now = Utc::now();
        let guard = [
            Filter::is_in(
                "status",
                [
                    CampaignStatus::Draft,
                    CampaignStatus::Scheduled,
                    CampaignStatus::Active,
                    CampaignStatus::Paused,
                ],
            ),
            Filter::eq("run_id", run_id),
        ];
        let patch = json!({
            "status": CampaignStatus::Failed,
            "failure_reason": reason,
            "completed_at": now,
            "updated_at": now,
        });

        let failed = self.campaigns.update_if(id, &guard, patch).await?;
        if failed.is_some() {
            warn!(campaign_id = id, reason, "Campaign failed");
        }
        Ok(failed)
    }

    /// Merge counters with a field-wise max and bump `last_activity_at`.
    pub async fn update_counters(&self, id: &str, counters: &CampaignCounters) -> Result<Campaign> {
        for _ in 0..COUNTER_UPDATE_RETRIES {
            let current = self.get(id).await?;
            let merged = current.counters.merge_max(counters);
            let now = Utc::now();
            let guard = [Filter::eq("counters", &current.counters)];
            let patch = json!({
                "counters": merged,
                "last_activity_at": now,
                "updated_at": now,
            });
            if let Some(updated) = self.campaigns.update_if(id, &guard, patch).await? {
                return Ok(updated);
            }
        }
        Err(NotificationError::conflict(format!(
            "campaign {} counters kept changing",
            id
        )))
    }
}

/// Campaign counters from the tracker's per-recipient rollup.
pub fn counters_from_stats(audience_size: u64, stats: &AggregateStats) -> CampaignCounters {
    CampaignCounters {
        audience_size,
        sent: stats.recipients.sent,
        delivered: stats.recipients.delivered,
        failed: stats.recipients.failed,
        opened: stats.recipients.read,
        clicked: stats.recipients.clicked,
    }
}
