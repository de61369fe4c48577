use std::time::Instant;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};

// --- General request metrics ---
pub const GATEWAY_REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const GATEWAY_REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";

// --- Resolution + routing metrics ---
pub const GATEWAY_ROUTE_ATTEMPTS_TOTAL: &str = "gateway_route_attempts_total";
pub const GATEWAY_RESOLUTIONS_TOTAL: &str = "gateway_resolutions_total";
pub const GATEWAY_ROUTE_CACHE_EVENTS_TOTAL: &str = "gateway_route_cache_events_total";

/// Register metric metadata with the installed recorder. Call once at
/// startup, after the Prometheus recorder is in place.
pub fn describe_metrics() {
    describe_counter!(
        GATEWAY_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        GATEWAY_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        GATEWAY_ROUTE_ATTEMPTS_TOTAL,
        Unit::Count,
        "Proxy attempts against backend routes, labeled by source tag and outcome."
    );
    describe_counter!(
        GATEWAY_RESOLUTIONS_TOTAL,
        Unit::Count,
        "Resolution API calls, labeled by API version and outcome."
    );
    describe_counter!(
        GATEWAY_ROUTE_CACHE_EVENTS_TOTAL,
        Unit::Count,
        "Route cache hits and misses."
    );
}

pub fn increment_request_total(method: &str, status: u16) {
    counter!(
        GATEWAY_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_request_duration(method: &str, duration: std::time::Duration) {
    histogram!(
        GATEWAY_REQUEST_DURATION_SECONDS,
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn increment_route_attempt(source: &str, outcome: &str) {
    counter!(
        GATEWAY_ROUTE_ATTEMPTS_TOTAL,
        "source" => source.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn increment_resolution(version: &str, outcome: &str) {
    counter!(
        GATEWAY_RESOLUTIONS_TOTAL,
        "version" => version.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn increment_cache_event(event: &str) {
    counter!(
        GATEWAY_ROUTE_CACHE_EVENTS_TOTAL,
        "event" => event.to_string()
    )
    .increment(1);
}

/// Helper struct for measuring request duration easily using RAII
pub struct RequestTimer {
    start: Instant,
    method: String,
}

impl RequestTimer {
    pub fn new(method: String) -> Self {
        Self {
            start: Instant::now(),
            method,
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.method, self.start.elapsed());
    }
}
