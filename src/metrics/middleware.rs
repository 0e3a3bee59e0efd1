//! HTTP middleware recording request count, latency and in-flight requests

use super::*;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Paths that would only measure the scraper itself
const EXCLUDED_PATHS: &[&str] = &["/metrics"];

/// Axum middleware function for metrics collection
///
/// # Example
/// ```no_run
/// use axum::{Router, middleware, routing::get};
/// use avatar_live_hub::metrics::track_metrics;
///
/// let app: Router = Router::new()
///     .route("/health", get(|| async { "OK" }))
///     .route_layer(middleware::from_fn(track_metrics));
/// ```
pub async fn track_metrics(req: Request, next: Next) -> Response {
    // Label by route template so ids do not explode cardinality
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    if EXCLUDED_PATHS.contains(&path.as_str()) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    HTTP_CONNECTIONS_ACTIVE.inc();

    let start = Instant::now();
    let response = next.run(req).await;

    HTTP_CONNECTIONS_ACTIVE.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}
