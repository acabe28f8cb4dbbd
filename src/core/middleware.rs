//! HTTP middleware for request metrics.

use crate::core::metrics::get_metrics;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Record request count and duration per path and status code.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let metrics = get_metrics();
    metrics
        .request_count
        .with_label_values(&[&path, &status])
        .inc();
    metrics
        .request_duration
        .with_label_values(&[&path])
        .observe(started.elapsed().as_secs_f64());

    response
}
