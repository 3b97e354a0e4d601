use crate::app::metrics::RequestMetrics;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Logs each request, records it in the request metrics and reports the
/// handling time in `X-Process-Time`.
pub async fn track_requests(
    State(metrics): State<Arc<RequestMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::info!("Incoming request: {} {}", method, uri);

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    metrics.record(method.as_str(), uri.path(), status, elapsed);

    tracing::info!(
        "Request completed: {} {} - Status: {} - Duration: {:.4}s",
        method,
        uri.path(),
        status,
        elapsed.as_secs_f64()
    );

    if let Ok(value) = HeaderValue::from_str(&elapsed.as_secs_f64().to_string()) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}
