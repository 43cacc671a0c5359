//! Requirement evaluation metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct EvaluationMetrics;

impl EvaluationMetrics {
    pub fn record_query(candidates: usize, matched: usize, unsatisfiable: bool) {
        ::metrics::counter!(phase_metric!(counter, "evaluation", "queries")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "evaluation", "candidates"))
            .record(candidates as f64);
        ::metrics::histogram!(phase_metric!(histogram, "evaluation", "matches"))
            .record(matched as f64);
        if unsatisfiable {
            ::metrics::counter!(phase_metric!(counter, "evaluation", "unsatisfiable")).increment(1);
        }
    }
}

impl PhaseMetrics for EvaluationMetrics {
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
        "evaluation"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "evaluation", "queries"),
                metric_type: MetricType::Counter,
                help: "Requirement queries evaluated",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "evaluation", "unsatisfiable"),
                metric_type: MetricType::Counter,
                help: "Queries that matched no individual",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "evaluation", "candidates"),
                metric_type: MetricType::Histogram,
                help: "Individuals considered per query",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "evaluation", "matches"),
                metric_type: MetricType::Histogram,
                help: "Individuals returned per query",
                labels: vec![],
            },
        ]
    }
}
