use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all signflow metrics
const PREFIX: &str = "signflow";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Scheduler
    pub static ref JOB_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_runs_total"), "Scheduled job executions by outcome"),
        &["job_id", "outcome"]
    ).expect("Failed to create job_runs_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Scheduled job duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["job_id"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_job_running"), "1 while a job is executing"),
        &["job_id"]
    ).expect("Failed to create job_running metric");

    // Signing workflow
    pub static ref WEBHOOK_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_webhook_events_total"), "Inbound signing webhooks by outcome"),
        &["outcome"]
    ).expect("Failed to create webhook_events_total metric");

    pub static ref NOTIFICATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_total"), "Notification deliveries by final status"),
        &["status"]
    ).expect("Failed to create notifications_total metric");

    pub static ref NOTIFICATIONS_IN_FLIGHT: IntGauge = IntGauge::new(
        format!("{PREFIX}_notifications_in_flight"),
        "Notification deliveries currently tracked"
    ).expect("Failed to create notifications_in_flight metric");
}

/// Register all metrics. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(WEBHOOK_EVENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_IN_FLIGHT.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Collapse ids out of a request path so label cardinality stays bounded.
pub fn categorize_endpoint(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let looks_like_id = segment.len() >= 32
                || segment.chars().all(|c| c.is_ascii_digit())
                || segment.chars().filter(|c| *c == '-').count() >= 4;
            if looks_like_id {
                ":id"
            } else {
                segment
            }
        })
        .collect();
    format!("/{}", segments.join("/"))
}

pub fn record_job_run(job_id: &str, outcome: &str, duration: Duration) {
    JOB_RUNS_TOTAL.with_label_values(&[job_id, outcome]).inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_job_running(job_id: &str, running: bool) {
    JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_webhook_outcome(outcome: &str) {
    WEBHOOK_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_notification_outcome(status: &str) {
    NOTIFICATIONS_TOTAL.with_label_values(&[status]).inc();
}

pub fn notification_delivery_started() {
    NOTIFICATIONS_IN_FLIGHT.inc();
}

pub fn notification_delivery_finished() {
    NOTIFICATIONS_IN_FLIGHT.dec();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
