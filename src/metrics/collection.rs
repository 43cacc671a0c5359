//! Collection phase metrics
//!
//! Outcomes and throughput of primary and secondary collectors.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct CollectionMetrics;

impl CollectionMetrics {
    pub fn record_collector_success(namespace: &str, duration_secs: f64) {
        ::metrics::counter!(
            phase_metric!(counter, "collection", "collectors_succeeded"),
            "namespace" => namespace.to_string()
        )
        .increment(1);
        Self::record_duration(namespace, duration_secs);
    }

    /// `reason` is the tag of the failure, e.g. `timeout` or `panic`.
    pub fn record_collector_failure(namespace: &str, reason: &'static str, duration_secs: f64) {
        ::metrics::counter!(
            phase_metric!(counter, "collection", "collectors_failed"),
            "namespace" => namespace.to_string(),
            "reason" => reason
        )
        .increment(1);
        Self::record_duration(namespace, duration_secs);
    }

    pub fn record_writes(namespace: &str, written: usize, rejected: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "collection", "observations_written"),
            "namespace" => namespace.to_string()
        )
        .increment(written as u64);
        ::metrics::counter!(
            phase_metric!(counter, "collection", "observations_rejected"),
            "namespace" => namespace.to_string()
        )
        .increment(rejected as u64);
    }

    pub fn record_individuals_loaded(count: usize) {
        ::metrics::gauge!(phase_metric!(gauge, "collection", "individuals")).set(count as f64);
    }

    fn record_duration(namespace: &str, duration_secs: f64) {
        ::metrics::histogram!(
            phase_metric!(histogram, "collection", "collector_duration_seconds"),
            "namespace" => namespace.to_string()
        )
        .record(duration_secs);
    }
}

impl PhaseMetrics for CollectionMetrics {
    fn register_metrics() {
        for doc in Self::metrics_documentation() {
            match doc.metric_type {
                MetricType::Counter => ::metrics::describe_counter!(doc.name, doc.help),
                MetricType::Histogram => ::metrics::describe_histogram!(doc.name, doc.help),
                MetricType::Gauge => ::metrics::describe_gauge!(doc.name, doc.help),
            }
        }
    }

    fn phase_name() -> &'static str {
        "collection"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "collection", "collectors_succeeded"),
                metric_type: MetricType::Counter,
                help: "Collectors that completed successfully",
                labels: vec!["namespace"],
            },
            MetricDoc {
                name: phase_metric!(counter, "collection", "collectors_failed"),
                metric_type: MetricType::Counter,
                help: "Collectors that failed, by failure reason",
                labels: vec!["namespace", "reason"],
            },
            MetricDoc {
                name: phase_metric!(counter, "collection", "observations_written"),
                metric_type: MetricType::Counter,
                help: "Attribute observations accepted by the store",
                labels: vec!["namespace"],
            },
            MetricDoc {
                name: phase_metric!(counter, "collection", "observations_rejected"),
                metric_type: MetricType::Counter,
                help: "Attribute writes rejected by the store",
                labels: vec!["namespace"],
            },
            MetricDoc {
                name: phase_metric!(gauge, "collection", "individuals"),
                metric_type: MetricType::Gauge,
                help: "Individuals produced by the primary collector in the last session",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "collection", "collector_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall-clock time spent per collector",
                labels: vec!["namespace"],
            },
        ]
    }
}
