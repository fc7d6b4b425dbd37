//! Prometheus metrics for the collection loops and the publisher.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Start the Prometheus exporter; metrics are served at `/metrics`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Per-loop counters and cycle timing.
///
/// * `bridge_loop_cycles_total` - completed iterations
/// * `bridge_loop_failures_total` - iterations that returned an error
/// * `bridge_loop_cycle_seconds` - iteration duration
#[derive(Clone)]
pub struct LoopMetrics {
    cycles: Counter,
    failures: Counter,
    cycle_duration: Histogram,
    loop_name: &'static str,
}

impl LoopMetrics {
    pub fn new(loop_name: &'static str) -> Self {
        Self {
            cycles: counter!("bridge_loop_cycles_total", "loop" => loop_name),
            failures: counter!("bridge_loop_failures_total", "loop" => loop_name),
            cycle_duration: histogram!("bridge_loop_cycle_seconds", "loop" => loop_name),
            loop_name,
        }
    }

    pub fn record_success(&self, duration: Duration) {
        self.cycles.increment(1);
        self.cycle_duration.record(duration.as_secs_f64());
    }

    pub fn record_failure(&self, duration: Duration) {
        self.cycles.increment(1);
        self.failures.increment(1);
        self.cycle_duration.record(duration.as_secs_f64());
    }

    pub fn loop_name(&self) -> &'static str {
        self.loop_name
    }
}

/// Snapshot publication and feed coverage.
#[derive(Clone)]
pub struct PublishMetrics {
    snapshots_published: Counter,
    history_published: Counter,
    missing_symbols: Gauge,
}

impl PublishMetrics {
    pub fn new() -> Self {
        Self {
            snapshots_published: counter!("bridge_snapshots_published_total"),
            history_published: counter!("bridge_history_series_published_total"),
            missing_symbols: gauge!("bridge_missing_symbols"),
        }
    }

    pub fn snapshot_published(&self) {
        self.snapshots_published.increment(1);
    }

    pub fn history_published(&self, series: u64) {
        self.history_published.increment(series);
    }

    pub fn set_missing_symbols(&self, count: usize) {
        self.missing_symbols.set(count as f64);
    }
}

impl Default for PublishMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        let metrics = LoopMetrics::new("primary");
        metrics.record_success(Duration::from_millis(5));
        metrics.record_failure(Duration::from_millis(7));
        assert_eq!(metrics.loop_name(), "primary");

        let publish = PublishMetrics::default();
        publish.snapshot_published();
        publish.set_missing_symbols(3);
    }
}
