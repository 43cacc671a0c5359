//! Metrics infrastructure, organised by phase.
//!
//! Each phase defines its metrics in a dedicated submodule. Names follow
//! `profiler_{phase}_{metric}` with a `_total` suffix on counters. Without an
//! installed recorder every call is a no-op, so library users and tests pay nothing.

pub mod collection;
pub mod evaluation;

pub use collection::CollectionMetrics;
pub use evaluation::EvaluationMetrics;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Once;
use tracing::{debug, info, warn};

/// Address for the Prometheus HTTP exporter, e.g. `127.0.0.1:9898`.
pub const METRICS_ADDR_ENV: &str = "PROFILER_METRICS_ADDR";

static INIT: Once = Once::new();

/// Installs the Prometheus exporter when `PROFILER_METRICS_ADDR` is set.
///
/// Idempotent. Must be called from within a tokio runtime.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str = match std::env::var(METRICS_ADDR_ENV) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => {
                debug!("{} not set, metrics exporter disabled", METRICS_ADDR_ENV);
                return;
            }
        };
        let addr = match addr_str.trim().parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Invalid metrics addr '{}': {}", addr_str, e);
                return;
            }
        };
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus HTTP exporter started at http://{}/metrics", addr);
                register_all_metrics();
            }
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    });
}

/// Implemented by each phase's metrics collection.
pub trait PhaseMetrics {
    /// Describe all metrics for this phase with the installed recorder.
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("profiler_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("profiler_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("profiler_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

/// Registers every phase and reports name conflicts between them.
pub fn register_all_metrics() -> usize {
    let mut all: HashMap<&'static str, &'static str> = HashMap::new();
    let mut conflicts = 0;
    conflicts += register_phase::<CollectionMetrics>(&mut all);
    conflicts += register_phase::<EvaluationMetrics>(&mut all);
    info!(
        "Registered {} metrics across all phases ({} conflicts)",
        all.len(),
        conflicts
    );
    conflicts
}

fn register_phase<T: PhaseMetrics>(all: &mut HashMap<&'static str, &'static str>) -> usize {
    T::register_metrics();
    let mut conflicts = 0;
    for doc in T::metrics_documentation() {
        if let Some(existing_phase) = all.insert(doc.name, T::phase_name()) {
            warn!(
                "Metric name conflict: '{}' defined by both '{}' and '{}'",
                doc.name,
                existing_phase,
                T::phase_name()
            );
            conflicts += 1;
        }
    }
    conflicts
}
