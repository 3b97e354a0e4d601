use crate::app::error::{ApiError, ApiResult};
use crate::app::metrics::{self, RequestMetrics};
use crate::app::middleware::track_requests;
use crate::domain::ports::Application;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Bounds of the uniform random delay applied by `/slow`, in seconds.
    pub slow_min_secs: f64,
    pub slow_max_secs: f64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            slow_min_secs: 1.0,
            slow_max_secs: 3.0,
        }
    }
}

#[derive(Clone)]
struct DemoState {
    settings: Arc<DemoSettings>,
    metrics: Arc<RequestMetrics>,
}

/// The bundled `main:app` application.
#[derive(Clone, Default)]
pub struct DemoApp {
    settings: Arc<DemoSettings>,
    metrics: Arc<RequestMetrics>,
}

impl DemoApp {
    pub fn new(settings: DemoSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            metrics: Arc::new(RequestMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<RequestMetrics> {
        self.metrics.clone()
    }
}

impl Application for DemoApp {
    fn router(&self) -> Router {
        let state = DemoState {
            settings: self.settings.clone(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(root))
            .route("/health", get(health_check))
            .route("/slow", get(slow_endpoint))
            .route("/error", get(error_endpoint))
            .route("/users/{user_id}", get(get_user))
            .route("/metrics", get(metrics_handler))
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                self.metrics.clone(),
                track_requests,
            ))
            .with_state(state)
    }
}

fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[tracing::instrument(name = "root_handler", skip_all, fields(endpoint = "/"))]
async fn root() -> Json<Value> {
    tracing::info!("Root endpoint accessed");
    Json(json!({ "message": "Hello World!", "timestamp": timestamp() }))
}

#[tracing::instrument(name = "health_check", skip_all, fields(endpoint = "/health"))]
async fn health_check() -> Json<Value> {
    tracing::info!("Health check requested");
    Json(json!({ "status": "healthy", "timestamp": timestamp() }))
}

#[tracing::instrument(
    name = "slow_endpoint",
    skip_all,
    fields(endpoint = "/slow", delay_seconds = tracing::field::Empty)
)]
async fn slow_endpoint(State(state): State<DemoState>) -> Json<Value> {
    let (min, max) = (state.settings.slow_min_secs, state.settings.slow_max_secs);
    let delay = if max > min {
        rand::random_range(min..max)
    } else {
        min
    };
    tracing::Span::current().record("delay_seconds", delay);

    tracing::info!("Slow endpoint called, simulating {:.2}s delay", delay);
    tokio::time::sleep(Duration::from_secs_f64(delay.max(0.0))).await;
    tracing::info!("Slow endpoint completed");

    Json(json!({
        "message": "This was slow!",
        "delay": delay,
        "timestamp": timestamp(),
    }))
}

#[tracing::instrument(name = "error_endpoint", skip_all, fields(endpoint = "/error"))]
async fn error_endpoint() -> impl IntoResponse {
    tracing::error!("Error endpoint accessed - simulating server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Simulated server error", "timestamp": timestamp() })),
    )
}

#[tracing::instrument(
    name = "get_user",
    skip_all,
    fields(endpoint = "/users/{user_id}", user_id = tracing::field::Empty)
)]
async fn get_user(Path(raw_id): Path<String>) -> ApiResult<Json<Value>> {
    let user_id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::invalid_integer("path", "user_id", &raw_id))?;
    tracing::Span::current().record("user_id", user_id);

    tracing::info!("Fetching user {}", user_id);
    let user = json!({
        "id": user_id,
        "name": format!("User {}", user_id),
        "email": format!("user{}@example.com", user_id),
        "timestamp": timestamp(),
    });
    tracing::info!("User {} data retrieved successfully", user_id);

    Ok(Json(user))
}

async fn metrics_handler(State(state): State<DemoState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, metrics::CONTENT_TYPE)],
        state.metrics.render(),
    )
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn fast_app() -> DemoApp {
        DemoApp::new(DemoSettings {
            slow_min_secs: 0.01,
            slow_max_secs: 0.02,
        })
    }

    async fn get(app: &DemoApp, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let app = fast_app();

        let (status, _, body) = get(&app, "/").await;
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Hello World!");
        assert!(json["timestamp"].is_string());

        let (status, _, body) = get(&app, "/health").await;
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_slow_reports_delay_within_bounds() {
        let app = fast_app();
        let (status, _, body) = get(&app, "/slow").await;
        let json: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "This was slow!");
        let delay = json["delay"].as_f64().unwrap();
        assert!((0.01..=0.02).contains(&delay));
    }

    #[tokio::test]
    async fn test_error_endpoint_returns_500() {
        let app = fast_app();
        let (status, _, body) = get(&app, "/error").await;
        let json: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Simulated server error");
    }

    #[tokio::test]
    async fn test_get_user() {
        let app = fast_app();
        let (status, _, body) = get(&app, "/users/42").await;
        let json: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], 42);
        assert_eq!(json["name"], "User 42");
        assert_eq!(json["email"], "user42@example.com");
    }

    #[tokio::test]
    async fn test_get_user_rejects_non_integer() {
        let app = fast_app();
        let (status, _, body) = get(&app, "/users/abc").await;
        let json: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["detail"][0]["loc"][1], "user_id");
        assert_eq!(json["detail"][0]["input"], "abc");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let app = fast_app();
        let (status, _, body) = get(&app, "/nope").await;
        let json: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["detail"], "Not Found");
        assert_eq!(app.metrics().request_count("GET", "/nope", 404), 1);
    }

    #[tokio::test]
    async fn test_middleware_sets_process_time_and_counts() {
        let app = fast_app();
        let (_, headers, _) = get(&app, "/").await;
        let _ = get(&app, "/error").await;

        let process_time: f64 = headers
            .get("x-process-time")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(process_time >= 0.0);

        let metrics = app.metrics();
        assert_eq!(metrics.request_count("GET", "/", 200), 1);
        assert_eq!(metrics.request_count("GET", "/error", 500), 1);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exposes_counters() {
        let app = fast_app();
        let _ = get(&app, "/users/1").await;
        let (status, headers, body) = get(&app, "/metrics").await;
        let body = String::from_utf8(body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], metrics::CONTENT_TYPE);
        assert!(body.contains(
            "http_requests_total{method=\"GET\",endpoint=\"/users/1\",status=\"200\"} 1"
        ));
        assert!(body.contains("# TYPE http_request_duration_seconds histogram"));
    }
}
