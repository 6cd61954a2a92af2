//! Controller metrics
//!
//! Prometheus metrics for the reconcile loop, exposed on the metrics address.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Controller metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Ingress reconciliations by result (success, error, permanent_error, skipped)
    pub static ref RECONCILIATIONS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_reconciliations_total",
            "Total number of Ingress reconciliations",
        );
        let counter = IntCounterVec::new(opts, &["result"]).unwrap_or_else(|e| {
            eprintln!("WARN: failed to create ingress_reconciliations_total counter: {e}");
            IntCounterVec::new(Opts::new("dummy", "dummy"), &["result"]).unwrap()
        });
        if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
            eprintln!("WARN: failed to register ingress_reconciliations_total counter: {e}");
        }
        counter
    };

    /// Ingress reconciliation duration
    pub static ref RECONCILE_DURATION: HistogramVec = {
        let opts = HistogramOpts::new(
            "ingress_reconciliation_duration_seconds",
            "Ingress reconciliation duration in seconds",
        );
        let histogram = HistogramVec::new(opts, &["namespace"]).unwrap_or_else(|e| {
            eprintln!("WARN: failed to create ingress_reconciliation_duration histogram: {e}");
            HistogramVec::new(HistogramOpts::new("dummy", "dummy"), &["namespace"]).unwrap()
        });
        if let Err(e) = REGISTRY.register(Box::new(histogram.clone())) {
            eprintln!("WARN: failed to register ingress_reconciliation_duration histogram: {e}");
        }
        histogram
    };
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        eprintln!("WARN: failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
