//! Metrics collection module for the notification engine
//!
//! Prometheus collectors for:
//! - Per-channel delivery outcomes and send latency
//! - Batch and campaign progress
//! - Fallback and scheduler activity

use crate::config::MetricsConfig;
use crate::error::{NotificationError, Result};
use notify_shared::{CampaignStatus, Channel};

use prometheus::core::Collector;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for the notification engine
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Arc<Registry>,

    deliveries_total: IntCounterVec,
    send_duration: HistogramVec,
    batches_total: IntCounter,
    campaigns_finished: IntCounterVec,
    active_campaigns: IntGauge,
    fallback_outcomes: IntCounterVec,
    schedule_firings: IntCounterVec,
}

fn register<C>(registry: &Registry, collector: C, name: &str) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| NotificationError::internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(collector)
}

fn create_error(name: &str, e: prometheus::Error) -> NotificationError {
    NotificationError::internal(format!("Failed to create {}: {}", name, e))
}

impl EngineMetrics {
    /// Create a new metrics collector
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        info!(namespace = %config.namespace, "Initializing engine metrics");

        let registry = Registry::new();
        let ns = config.namespace.as_str();

        let deliveries_total = IntCounterVec::new(
            Opts::new("deliveries_total", "Delivery attempts by channel and outcome").namespace(ns),
            &["channel", "outcome"],
        )
        .map_err(|e| create_error("deliveries_total", e))?;

        let send_duration = HistogramVec::new(
            HistogramOpts::new("send_duration_seconds", "Time spent in channel adapters")
                .namespace(ns)
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["channel"],
        )
        .map_err(|e| create_error("send_duration_seconds", e))?;

        let batches_total = IntCounter::with_opts(
            Opts::new("batches_processed_total", "Campaign batches processed").namespace(ns),
        )
        .map_err(|e| create_error("batches_processed_total", e))?;

        let campaigns_finished = IntCounterVec::new(
            Opts::new("campaigns_finished_total", "Dispatch runs by final status").namespace(ns),
            &["status"],
        )
        .map_err(|e| create_error("campaigns_finished_total", e))?;

        let active_campaigns = IntGauge::with_opts(
            Opts::new("active_campaigns", "Campaigns currently being dispatched").namespace(ns),
        )
        .map_err(|e| create_error("active_campaigns", e))?;

        let fallback_outcomes = IntCounterVec::new(
            Opts::new("composite_outcomes_total", "Composite delivery outcomes").namespace(ns),
            &["outcome"],
        )
        .map_err(|e| create_error("composite_outcomes_total", e))?;

        let schedule_firings = IntCounterVec::new(
            Opts::new("schedule_firings_total", "Scheduled entries fired").namespace(ns),
            &["kind", "outcome"],
        )
        .map_err(|e| create_error("schedule_firings_total", e))?;

        Ok(Self {
            deliveries_total: register(&registry, deliveries_total, "deliveries_total")?,
            send_duration: register(&registry, send_duration, "send_duration_seconds")?,
            batches_total: register(&registry, batches_total, "batches_processed_total")?,
            campaigns_finished: register(&registry, campaigns_finished, "campaigns_finished_total")?,
            active_campaigns: register(&registry, active_campaigns, "active_campaigns")?,
            fallback_outcomes: register(&registry, fallback_outcomes, "composite_outcomes_total")?,
            schedule_firings: register(&registry, schedule_firings, "schedule_firings_total")?,
            registry: Arc::new(registry),
        })
    }

    pub fn record_delivery(&self, channel: Channel, success: bool, duration_secs: f64) {
        let outcome = if success { "delivered" } else { "failed" };
        self.deliveries_total
            .with_label_values(&[channel.as_str(), outcome])
            .inc();
        self.send_duration
            .with_label_values(&[channel.as_str()])
            .observe(duration_secs);
    }

    /// Channel skipped before any provider call (missing contact).
    pub fn record_skipped(&self, channel: Channel) {
        self.deliveries_total
            .with_label_values(&[channel.as_str(), "missing_contact"])
            .inc();
    }

    pub fn record_batch(&self) {
        self.batches_total.inc();
    }

    pub fn campaign_started(&self) {
        self.active_campaigns.inc();
    }

    pub fn campaign_finished(&self, status: CampaignStatus) {
        self.active_campaigns.dec();
        self.campaigns_finished
            .with_label_values(&[status.as_str()])
            .inc();
    }

    /// A run handed its campaign to a newer claim; that run records the outcome.
    pub fn campaign_superseded(&self) {
        self.active_campaigns.dec();
    }

    pub fn record_composite_outcome(&self, outcome: &str) {
        self.fallback_outcomes.with_label_values(&[outcome]).inc();
    }

    pub fn record_schedule_firing(&self, kind: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.schedule_firings
            .with_label_values(&[kind, outcome])
            .inc();
    }

    /// Get Prometheus registry for metrics endpoint
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics(&self) -> Result<String> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| NotificationError::internal(format!("Failed to encode metrics: {}", e)))
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self, operation: &str) -> MetricsTimer {
        MetricsTimer {
            operation: operation.to_string(),
            start_time: Instant::now(),
        }
    }

    /// Summed metric values, keyed by metric family name
    pub fn get_health_metrics(&self) -> serde_json::Value {
        let mut health_data = serde_json::json!({});

        for mf in self.registry.gather() {
            let name = mf.get_name();
            let mut values = Vec::new();

            for metric in mf.get_metric() {
                if metric.has_counter() {
                    values.push(metric.get_counter().get_value());
                } else if metric.has_gauge() {
                    values.push(metric.get_gauge().get_value());
                } else if metric.has_histogram() {
                    values.push(metric.get_histogram().get_sample_count() as f64);
                }
            }

            if !values.is_empty() {
                health_data[name] = serde_json::json!(values.iter().sum::<f64>());
            }
        }

        health_data
    }
}

/// Timer for measuring operation duration
pub struct MetricsTimer {
    operation: String,
    start_time: Instant,
}

impl MetricsTimer {
    /// Elapsed seconds so far
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        debug!(
            "Operation '{}' completed in {:.3}s",
            self.operation,
            self.start_time.elapsed().as_secs_f64()
        );
    }
}
