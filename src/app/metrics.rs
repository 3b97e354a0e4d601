use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::time::Duration;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus client default histogram buckets, in seconds.
pub const DEFAULT_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

type RequestLabels = (String, String, u16);

#[derive(Debug, Default)]
struct Histogram {
    /// Non-cumulative per-bucket counts; the last slot is `+Inf`.
    counts: [u64; DEFAULT_BUCKETS.len() + 1],
    count: u64,
    sum: f64,
}

/// `http_requests_total` and `http_request_duration_seconds`, rendered in
/// the Prometheus text format.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests: Mutex<BTreeMap<RequestLabels, u64>>,
    latency: Mutex<Histogram>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        {
            let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            *requests
                .entry((method.to_string(), endpoint.to_string(), status))
                .or_insert(0) += 1;
        }

        let seconds = duration.as_secs_f64();
        let slot = DEFAULT_BUCKETS
            .iter()
            .position(|upper| seconds <= *upper)
            .unwrap_or(DEFAULT_BUCKETS.len());

        let mut latency = self.latency.lock().unwrap_or_else(|e| e.into_inner());
        latency.counts[slot] += 1;
        latency.count += 1;
        latency.sum += seconds;
    }

    pub fn request_count(&self, method: &str, endpoint: &str, status: u16) -> u64 {
        let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        requests
            .get(&(method.to_string(), endpoint.to_string(), status))
            .copied()
            .unwrap_or(0)
    }

    pub fn observed_requests(&self) -> u64 {
        self.latency.lock().unwrap_or_else(|e| e.into_inner()).count
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP http_requests_total Total HTTP requests\n");
        out.push_str("# TYPE http_requests_total counter\n");
        {
            let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            for ((method, endpoint, status), value) in requests.iter() {
                let _ = writeln!(
                    out,
                    "http_requests_total{{method=\"{}\",endpoint=\"{}\",status=\"{}\"}} {}",
                    escape_label(method),
                    escape_label(endpoint),
                    status,
                    value
                );
            }
        }

        out.push_str("# HELP http_request_duration_seconds HTTP request latency\n");
        out.push_str("# TYPE http_request_duration_seconds histogram\n");
        let latency = self.latency.lock().unwrap_or_else(|e| e.into_inner());
        let mut cumulative = 0;
        for (upper, count) in DEFAULT_BUCKETS.iter().zip(latency.counts.iter()) {
            cumulative += count;
            let _ = writeln!(
                out,
                "http_request_duration_seconds_bucket{{le=\"{}\"}} {}",
                upper, cumulative
            );
        }
        let _ = writeln!(
            out,
            "http_request_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            latency.count
        );
        let _ = writeln!(out, "http_request_duration_seconds_sum {}", latency.sum);
        let _ = writeln!(out, "http_request_duration_seconds_count {}", latency.count);

        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
