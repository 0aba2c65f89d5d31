//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Recorders for auth attempts, orders and factory fulfillment

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const AUTH_ATTEMPTS_TOTAL: &str = "auth_attempts_total";
pub const ORDERS_TOTAL: &str = "pizza_orders_total";
pub const PIZZAS_SOLD_TOTAL: &str = "pizzas_sold_total";
pub const REVENUE_TOTAL: &str = "pizza_revenue_total";
pub const ORDER_CREATION_SECONDS: &str = "pizza_order_creation_seconds";
pub const ORDER_FAILURES_TOTAL: &str = "pizza_order_failures_total";
pub const FACTORY_LATENCY_SECONDS: &str = "pizza_factory_latency_seconds";
pub const USERS_TOTAL: &str = "pizza_users_total";
pub const ACTIVE_SESSIONS: &str = "pizza_active_sessions";

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Call once during startup; a second install fails.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

/// Register help text for every metric with the current recorder.
fn describe_metrics() {
    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        AUTH_ATTEMPTS_TOTAL,
        "Login attempts by outcome (success/failed)"
    );
    describe_counter!(ORDERS_TOTAL, "Total number of orders placed");
    describe_counter!(PIZZAS_SOLD_TOTAL, "Total number of pizzas ordered");
    describe_gauge!(REVENUE_TOTAL, "Sum of the prices of all ordered pizzas");
    describe_histogram!(
        ORDER_CREATION_SECONDS,
        "Time to persist an order in seconds"
    );
    describe_counter!(
        ORDER_FAILURES_TOTAL,
        "Orders the factory failed to fulfill"
    );
    describe_histogram!(
        FACTORY_LATENCY_SECONDS,
        "Factory fulfillment call duration in seconds"
    );
    describe_gauge!(USERS_TOTAL, "Number of registered users");
    describe_gauge!(ACTIVE_SESSIONS, "Number of open sessions");
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Refresh the user and session gauges from the database.
async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user")
        .fetch_one(&state.db)
        .await
    {
        gauge!(USERS_TOTAL).set(count as f64);
    }

    if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM auth")
        .fetch_one(&state.db)
        .await
    {
        gauge!(ACTIVE_SESSIONS).set(count as f64);
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Use the matched route template so ids don't explode label cardinality
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failed"
    }
}

/// Record a login attempt.
pub fn record_auth_attempt(success: bool) {
    counter!(AUTH_ATTEMPTS_TOTAL, "status" => outcome(success)).increment(1);
}

/// Record a persisted order with `pizzas` items totalling `revenue`.
pub fn record_order_placed(pizzas: usize, revenue: f64, latency_secs: f64) {
    counter!(ORDERS_TOTAL).increment(1);
    counter!(PIZZAS_SOLD_TOTAL).increment(pizzas as u64);
    // Counters are integral; revenue is tracked as a monotonically increasing gauge
    gauge!(REVENUE_TOTAL).increment(revenue);
    histogram!(ORDER_CREATION_SECONDS).record(latency_secs);
}

/// Record the outcome of a factory fulfillment call.
pub fn record_fulfillment(success: bool, latency_secs: f64) {
    if !success {
        counter!(ORDER_FAILURES_TOTAL).increment(1);
    }
    histogram!(FACTORY_LATENCY_SECONDS, "status" => outcome(success)).record(latency_secs);
}
