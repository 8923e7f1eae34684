// Prometheus metrics for the governance layer
//
// Exposed on the /metrics HTTP endpoint:
// - Request durations and counts (by route and final status; rate-limited
//   requests show up here as completed 429s)
// - Rate limiter rejections
// - Active connections
// - Worker pool restarts, live workers, crash-loop escalations
// - Default process metrics (cpu, memory, fds) on Linux

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Request metrics
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("http_request_duration_seconds", "Request duration in seconds"),
        &["route", "status"]
    ).expect("Failed to create request duration metric");

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("http_requests_total", "Total requests handled"),
        &["route", "status"]
    ).expect("Failed to create requests total metric");

    pub static ref DB_QUERIES_TOTAL: IntCounter = IntCounter::new(
        "db_queries_total",
        "Database queries issued by the business handlers"
    ).expect("Failed to create db queries metric");

    pub static ref RATE_LIMITED_REQUESTS_TOTAL: IntCounter = IntCounter::new(
        "rate_limited_requests_total",
        "Requests rejected by the rate limiter"
    ).expect("Failed to create rate limited metric");

    pub static ref ACTIVE_CONNECTIONS: IntGauge = IntGauge::new(
        "active_connections",
        "Requests currently in flight"
    ).expect("Failed to create active connections metric");

    // Worker pool metrics
    pub static ref LIVE_WORKERS: IntGauge = IntGauge::new(
        "live_workers",
        "Worker processes currently alive"
    ).expect("Failed to create live workers metric");

    pub static ref WORKER_RESTARTS_TOTAL: IntCounter = IntCounter::new(
        "worker_restarts_total",
        "Worker processes restarted after an exit"
    ).expect("Failed to create worker restarts metric");

    pub static ref CRASH_LOOP_ESCALATIONS_TOTAL: IntCounter = IntCounter::new(
        "crash_loop_escalations_total",
        "Pool slots abandoned by the crash-loop detector"
    ).expect("Failed to create crash loop escalations metric");
}

/// Register all metrics - must be called once at startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DB_QUERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMITED_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_CONNECTIONS.clone()))?;
    REGISTRY.register(Box::new(LIVE_WORKERS.clone()))?;
    REGISTRY.register(Box::new(WORKER_RESTARTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CRASH_LOOP_ESCALATIONS_TOTAL.clone()))?;

    #[cfg(target_os = "linux")]
    REGISTRY.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;

    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metrics() {
        let _ = init();

        HTTP_REQUESTS_TOTAL
            .with_label_values(&["/api/equipment", "200"])
            .inc();
        RATE_LIMITED_REQUESTS_TOTAL.inc();

        let families = REGISTRY.gather();
        assert!(!families.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_metrics_exported() {
        let _ = init();
        let text = gather_metrics().unwrap();
        assert!(text.contains("process_cpu_seconds_total"));
    }

    #[test]
    fn test_worker_metrics() {
        LIVE_WORKERS.set(4);
        assert_eq!(LIVE_WORKERS.get(), 4);

        let before = WORKER_RESTARTS_TOTAL.get();
        WORKER_RESTARTS_TOTAL.inc();
        assert_eq!(WORKER_RESTARTS_TOTAL.get(), before + 1);
    }
}
