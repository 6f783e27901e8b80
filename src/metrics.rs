//! Prometheus metrics: a small struct of cheaply-`Clone`-able handles
//! registered once at startup, plus a `Drop`-based measurer so a reconcile
//! cycle's duration and outcome are recorded however it returns.

use std::time::Instant;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResourceKindLabel {
    pub kind: String,
}

#[derive(Clone)]
pub struct Metrics {
    reconcile_cycles_total: Counter,
    reconcile_failures_total: Counter,
    reconcile_duration_seconds: Histogram,
    configmap_rotations_total: Counter,
    watch_stream_restarts_total: Family<ResourceKindLabel, Counter>,
    ready: Gauge,
}

impl Metrics {
    pub fn register(registry: &mut Registry) -> Self {
        let reconcile_cycles_total = Counter::default();
        registry.register("ingrate_reconcile_cycles", "Total reconcile cycles completed", reconcile_cycles_total.clone());

        let reconcile_failures_total = Counter::default();
        registry.register("ingrate_reconcile_failures", "Total reconcile cycles that returned an error", reconcile_failures_total.clone());

        let reconcile_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 12));
        registry.register("ingrate_reconcile_duration_seconds", "Reconcile cycle duration", reconcile_duration_seconds.clone());

        let configmap_rotations_total = Counter::default();
        registry.register("ingrate_configmap_rotations", "Total new ConfigMap versions created", configmap_rotations_total.clone());

        let watch_stream_restarts_total = Family::default();
        registry.register("ingrate_watch_stream_restarts", "Watch stream restarts, by resource kind", watch_stream_restarts_total.clone());

        let ready = Gauge::default();
        registry.register("ingrate_ready", "1 once the first snapshot has been observed", ready.clone());

        Self { reconcile_cycles_total, reconcile_failures_total, reconcile_duration_seconds, configmap_rotations_total, watch_stream_restarts_total, ready }
    }

    pub fn mark_ready(&self) {
        self.ready.set(1);
    }

    pub fn mark_configmap_rotation(&self) {
        self.configmap_rotations_total.inc();
    }

    pub fn mark_watch_restart(&self, kind: &'static str) {
        self.watch_stream_restarts_total.get_or_create(&ResourceKindLabel { kind: kind.to_string() }).inc();
    }

    pub fn measure_reconcile(&self) -> ReconcileMeasurer {
        ReconcileMeasurer { metrics: self.clone(), start: Instant::now(), failed: false }
    }
}

/// Records cycle count, duration, and failure-or-not on drop, so every
/// return path through [`crate::reconcile::Reconciler::reconcile`] is
/// measured without the reconciler calling back into metrics itself.
pub struct ReconcileMeasurer {
    metrics: Metrics,
    start: Instant,
    failed: bool,
}

impl ReconcileMeasurer {
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        self.metrics.reconcile_cycles_total.inc();
        self.metrics.reconcile_duration_seconds.observe(self.start.elapsed().as_secs_f64());
        if self.failed {
            self.metrics.reconcile_failures_total.inc();
        }
    }
}
