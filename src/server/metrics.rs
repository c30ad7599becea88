//! Prometheus metrics for the planning service.

use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Request counters and plan latency, registered on a private registry.
#[derive(Clone)]
pub struct ServerMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    plan_duration_seconds: Histogram,
}

impl ServerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("vram_planner_requests_total", "Requests by route and outcome"),
            &["route", "outcome"],
        )?;
        let plan_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "vram_planner_plan_duration_seconds",
                "Time spent producing a deployment plan",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(plan_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            plan_duration_seconds,
        })
    }

    pub fn record_request(&self, route: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.requests_total
            .with_label_values(&[route, outcome])
            .inc();
    }

    pub fn observe_plan(&self, seconds: f64) {
        self.plan_duration_seconds.observe(seconds);
    }

    pub fn request_count(&self, route: &str, outcome: &str) -> u64 {
        self.requests_total
            .with_label_values(&[route, outcome])
            .get()
    }

    /// Text exposition format.
    pub fn prometheus_output(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        let metrics = ServerMetrics::new().unwrap();
        metrics.record_request("/v1/plan", true);
        metrics.record_request("/v1/plan", true);
        metrics.record_request("/v1/plan", false);

        assert_eq!(metrics.request_count("/v1/plan", "ok"), 2);
        assert_eq!(metrics.request_count("/v1/plan", "error"), 1);
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = ServerMetrics::new().unwrap();
        metrics.record_request("/v1/memory", true);
        metrics.observe_plan(0.002);

        let text = metrics.prometheus_output().unwrap();
        assert!(text.contains("# TYPE vram_planner_requests_total counter"));
        assert!(text.contains(r#"vram_planner_requests_total{outcome="ok",route="/v1/memory"} 1"#));
        assert!(text.contains("vram_planner_plan_duration_seconds_count 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = ServerMetrics::new().unwrap();
        let b = ServerMetrics::new().unwrap();
        a.record_request("/health", true);
        assert_eq!(b.request_count("/health", "ok"), 0);
    }
}
