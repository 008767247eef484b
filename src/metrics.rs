use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("curator_requests_total", "Total number of recommend requests").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("curator_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref VALIDATION_FAILURES: Counter =
        register_counter!("curator_validation_failures_total", "Requests with an invalid body").unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("curator_upstream_failures_total", "Failed Gemini calls").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "curator_upstream_latency_seconds",
        "Gemini round trip latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_KEYS: Gauge =
        register_gauge!("curator_rate_limit_keys", "Users currently tracked by the rate limiter").unwrap();
}
