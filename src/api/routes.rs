use crate::api::{handlers, AppState};
use crate::metrics::track_metrics;
use crate::websocket;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router, including the `/ws` upgrade route
pub fn build_router(state: AppState) -> Router {
    let ws_state = state.websocket.clone();

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        // Viewer presence
        .route("/v1/viewers", get(handlers::all_viewer_counts))
        .route("/v1/viewers/:stream_id", get(handlers::viewer_count))
        // Stream lifecycle
        .route("/v1/streams", get(handlers::list_streams))
        .route("/v1/streams/:stream_id", get(handlers::get_stream))
        .route("/v1/streams/:stream_id/heartbeat", post(handlers::record_heartbeat))
        .route("/v1/streams/:stream_id/status", put(handlers::set_status))
        .route("/v1/streams/:stream_id/events", post(handlers::publish_event))
        // Add state
        .with_state(state)
        .route_layer(middleware::from_fn(track_metrics))
        .merge(websocket::router(ws_state))
        // Add middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
