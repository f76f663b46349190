//! Prometheus metrics for stability decorators

use crate::error::{Result, StabilityError};
use prometheus::{
    CounterVec, Encoder, IntGaugeVec, TextEncoder, register_counter_vec, register_int_gauge_vec,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// How a decorated call ended, from the decorator's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Inner operation invoked and succeeded
    Success,
    /// Inner operation invoked and failed
    Failure,
    /// Rejected without invoking the inner operation (breaker open, no tokens)
    Rejected,
    /// Served from a debounce cache
    Cached,
    /// Abandoned because the context was done
    Cancelled,
    /// A failed attempt that will be retried
    Retried,
}

impl Outcome {
    /// Label value used in the `outcome` dimension
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Rejected => "rejected",
            Outcome::Cached => "cached",
            Outcome::Cancelled => "cancelled",
            Outcome::Retried => "retried",
        }
    }
}

/// All stability metrics
pub struct Metrics {
    /// Decorated calls (by decorator, outcome)
    pub calls: CounterVec,

    /// Live background tasks (by decorator)
    pub background_tasks: IntGaugeVec,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns the existing instance if already initialized.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            calls: register_counter_vec!(
                "stability_calls_total",
                "Total decorated calls",
                &["decorator", "outcome"]
            )
            .map_err(|e| StabilityError::Config(format!("metrics calls: {e}")))?,

            background_tasks: register_int_gauge_vec!(
                "stability_background_tasks",
                "Background tasks currently alive",
                &["decorator"]
            )
            .map_err(|e| StabilityError::Config(format!("metrics background_tasks: {e}")))?,
        };

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| StabilityError::Config("failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    /// Record a call outcome
    pub fn record_outcome(&self, decorator: &str, outcome: Outcome) {
        self.calls
            .with_label_values(&[decorator, outcome.as_str()])
            .inc();
    }

    /// Track a background task starting
    pub fn task_started(&self, decorator: &str) {
        self.background_tasks.with_label_values(&[decorator]).inc();
    }

    /// Track a background task exiting
    pub fn task_stopped(&self, decorator: &str) {
        self.background_tasks.with_label_values(&[decorator]).dec();
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Record an outcome if metrics are initialized, otherwise skip
pub fn try_record_outcome(decorator: &str, outcome: Outcome) {
    if let Some(m) = Metrics::get() {
        m.record_outcome(decorator, outcome);
    }
}

/// Track a task start if metrics are initialized, otherwise skip
pub fn try_task_started(decorator: &str) {
    if let Some(m) = Metrics::get() {
        m.task_started(decorator);
    }
}

/// Track a task exit if metrics are initialized, otherwise skip
pub fn try_task_stopped(decorator: &str) {
    if let Some(m) = Metrics::get() {
        m.task_stopped(decorator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        // init() returns the same instance on repeated calls
        let _ = Metrics::init();
        if let Some(metrics) = Metrics::get() {
            metrics.record_outcome("throttle", Outcome::Rejected);
            metrics.task_started("throttle");
            metrics.task_stopped("throttle");
        }

        let text = gather();
        assert!(text.contains("stability_calls_total"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Rejected.as_str(), "rejected");
        assert_eq!(Outcome::Cached.as_str(), "cached");
    }
}
