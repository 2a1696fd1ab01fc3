//! Metrics collection for Style Warden.
//!
//! This module records gateway, scoring and calibration metrics through the
//! `metrics` facade. With no recorder installed every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::Once;

static REGISTER: Once = Once::new();

/// Handle for recording engine metrics.
///
/// Cheap to construct and copy; metric descriptions are registered once per
/// process the first time a handle is created.
#[derive(Debug, Clone, Copy)]
pub struct EngineMetrics {
    _private: (),
}

impl EngineMetrics {
    /// Creates a metrics handle, registering descriptions on first use.
    pub fn new() -> Self {
        REGISTER.call_once(Self::register_metrics);
        Self { _private: () }
    }

    /// Registers metric descriptions.
    fn register_metrics() {
        describe_counter!(
            "sw_gateway_candidates_total",
            "Total number of candidates evaluated by the confidence gateway"
        );
        describe_counter!(
            "sw_gateway_suppressed_total",
            "Total number of candidates suppressed by the confidence gateway"
        );
        describe_histogram!(
            "sw_evidence_score",
            "Distribution of computed evidence scores"
        );
        describe_histogram!(
            "sw_gateway_decision_seconds",
            "Time spent deciding a single candidate"
        );
        describe_counter!(
            "sw_config_reloads_total",
            "Total number of configuration or override reload attempts"
        );
        describe_counter!(
            "sw_tuner_cycles_total",
            "Total number of reliability tuner cycles"
        );
        describe_gauge!(
            "sw_tuner_categories_evaluated",
            "Number of categories with enough feedback in the last tuner cycle"
        );
        describe_gauge!(
            "sw_tuner_categories_adjusted",
            "Number of categories adjusted by the last tuner cycle"
        );
        describe_counter!(
            "sw_feedback_records_skipped_total",
            "Total number of malformed feedback records skipped"
        );
    }

    /// Records a gateway decision for one candidate.
    ///
    /// `decision` is the computed decision ("pass" or "suppress"); `enforced`
    /// is false when the gateway mode let the candidate through anyway.
    pub fn record_gateway_decision(&self, category: &str, decision: &str, enforced: bool) {
        counter!(
            "sw_gateway_candidates_total",
            "category" => category.to_string(),
            "decision" => decision.to_string(),
            "enforced" => enforced.to_string()
        )
        .increment(1);

        if decision == "suppress" && enforced {
            counter!("sw_gateway_suppressed_total", "category" => category.to_string())
                .increment(1);
        }
    }

    /// Records decision latency.
    pub fn record_decision_latency(&self, latency_secs: f64) {
        histogram!("sw_gateway_decision_seconds").record(latency_secs);
    }

    /// Records a computed evidence score.
    pub fn record_evidence(&self, category: &str, score: f64) {
        histogram!("sw_evidence_score", "category" => category.to_string()).record(score);
    }

    /// Records a configuration or override reload attempt.
    pub fn record_config_reload(&self, component: &str, success: bool) {
        let status = if success { "success" } else { "failure" };
        counter!(
            "sw_config_reloads_total",
            "component" => component.to_string(),
            "status" => status
        )
        .increment(1);
    }

    /// Records skipped feedback records.
    pub fn record_feedback_skipped(&self, count: usize) {
        counter!("sw_feedback_records_skipped_total").increment(count as u64);
    }

    /// Records the outcome of a tuner cycle.
    pub fn record_tuner_cycle(&self, categories_evaluated: usize, categories_adjusted: usize) {
        let outcome = if categories_adjusted > 0 {
            "adjusted"
        } else {
            "unchanged"
        };
        counter!("sw_tuner_cycles_total", "outcome" => outcome).increment(1);
        gauge!("sw_tuner_categories_evaluated").set(categories_evaluated as f64);
        gauge!("sw_tuner_categories_adjusted").set(categories_adjusted as f64);
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = EngineMetrics::new();
        metrics.record_gateway_decision("spelling", "pass", true);
        metrics.record_gateway_decision("ambiguity", "suppress", false);
        metrics.record_evidence("spelling", 0.42);
        metrics.record_decision_latency(0.0001);
        metrics.record_config_reload("gateway", true);
        metrics.record_feedback_skipped(3);
        metrics.record_tuner_cycle(4, 1);
    }

    #[test]
    fn test_handles_are_interchangeable() {
        let a = EngineMetrics::new();
        let b = EngineMetrics::default();
        a.record_tuner_cycle(0, 0);
        b.record_tuner_cycle(1, 0);
    }
}
