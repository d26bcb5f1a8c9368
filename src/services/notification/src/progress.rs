//! Progress and ETA estimation for a dispatch run
//!
//! Figures are advisory and recomputed once per completed batch.

use chrono::{DateTime, Duration, Utc};
use notify_shared::ProgressSnapshot;

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    started_at: DateTime<Utc>,
    total_count: u64,
    total_batches: usize,
}

impl ProgressEstimator {
    pub fn new(started_at: DateTime<Utc>, total_count: u64, total_batches: usize) -> Self {
        Self {
            started_at,
            total_count,
            total_batches,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Snapshot after `completed_batches` batches covering `completed_count` recipients.
    pub fn snapshot(
        &self,
        completed_count: u64,
        completed_batches: usize,
        now: DateTime<Utc>,
    ) -> ProgressSnapshot {
        // Clamp so a sub-millisecond first batch cannot divide by zero.
        let elapsed_ms = (now - self.started_at).num_milliseconds().max(1);
        let elapsed_minutes = elapsed_ms as f64 / 60_000.0;
        let send_rate_per_minute = completed_count as f64 / elapsed_minutes;

        let percent_complete = if self.total_batches == 0 {
            100
        } else {
            let ratio = completed_batches.min(self.total_batches) as f64 / self.total_batches as f64;
            (ratio * 100.0).round() as u8
        };

        let remaining = self.total_count.saturating_sub(completed_count);
        let estimated_completion = if completed_count == 0 {
            None
        } else {
            let remaining_ms = (remaining as f64 / send_rate_per_minute) * 60_000.0;
            Some(now + Duration::milliseconds(remaining_ms.round() as i64))
        };

        ProgressSnapshot {
            completed_count,
            total_count: self.total_count,
            completed_batches,
            total_batches: self.total_batches,
            percent_complete,
            send_rate_per_minute,
            elapsed_seconds: elapsed_ms as f64 / 1000.0,
            estimated_completion,
        }
    }
}

/// Number of batches needed for `total` recipients.
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    total.div_ceil(batch_size)
}
