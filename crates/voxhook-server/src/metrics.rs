//! Prometheus metrics for webhook traffic and cache maintenance.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use voxhook_types::{CacheKind, RequestType};

/// Metric handles plus the registry they are exposed from.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    request_duration: HistogramVec,
    invocations: IntCounterVec,
    purged: IntCounter,
}

impl Metrics {
    /// Creates a fresh registry with every metric registered.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if a metric definition is rejected.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("voxhook_requests_total", "Webhook requests handled"),
            &["path", "type"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "voxhook_request_duration_seconds",
                "Time spent answering a webhook request",
            ),
            &["type"],
        )?;
        let invocations = IntCounterVec::new(
            Opts::new(
                "voxhook_tool_invocations_total",
                "Tool and function invocations by outcome",
            ),
            &["kind", "outcome"],
        )?;
        let purged = IntCounter::new(
            "voxhook_cache_purged_total",
            "Cache entries evicted by the age-based purge",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(invocations.clone()))?;
        registry.register(Box::new(purged.clone()))?;

        Ok(Self {
            registry,
            requests,
            request_duration,
            invocations,
            purged,
        })
    }

    pub fn observe_request(&self, path: &str, request_type: RequestType, elapsed: Duration) {
        self.requests
            .with_label_values(&[path, request_type.as_str()])
            .inc();
        self.request_duration
            .with_label_values(&[request_type.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn observe_invocation(&self, kind: CacheKind, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.invocations
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
    }

    pub fn observe_purge(&self, count: usize) {
        self.purged.inc_by(count as u64);
    }

    /// Renders every metric in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
