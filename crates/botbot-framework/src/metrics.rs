//! Metric names.
//!
//! Recorded through the `metrics` facade; without an installed recorder they
//! cost nothing.

/// Gauge: inbound queue length, sampled after every pop.
pub const QUEUE_DEPTH: &str = "plugins.q";

/// Histogram: milliseconds between receipt at the bridge and ingestion.
pub const TRANSPORT_LATENCY: &str = "plugins.latency";

/// Histogram name for one plugin's invocation time in milliseconds.
pub fn plugin_timer(slug: &str) -> String {
    format!("plugins.{slug}")
}
