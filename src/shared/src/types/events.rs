//! Progress and dispatch events published by the batch dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::api::{CampaignCounters, CampaignStatus};

/// Advisory progress figures, recomputed once per completed batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub completed_count: u64,
    pub total_count: u64,
    pub completed_batches: usize,
    pub total_batches: usize,
    pub percent_complete: u8,
    pub send_rate_per_minute: f64,
    pub elapsed_seconds: f64,
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// Published to progress observers after each batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchCompleted {
    pub campaign_id: String,
    pub batch_index: usize,
    pub batch_size: usize,
    pub batch_delivered: u64,
    pub batch_failed: u64,
    pub counters: CampaignCounters,
    pub progress: ProgressSnapshot,
    pub completed_at: DateTime<Utc>,
}

/// Summary of one dispatch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchReport {
    pub campaign_id: String,
    pub final_status: CampaignStatus,
    pub batches_processed: usize,
    pub total_batches: usize,
    pub counters: CampaignCounters,
    pub last_progress: Option<ProgressSnapshot>,
    /// Set when the run stopped at a batch boundary because of a pause or cancel.
    pub stopped_early: bool,
}
