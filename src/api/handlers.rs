use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{StreamId, StreamLivenessRecord};
use crate::presence::announce_status;
use crate::state::StatusChange;
use crate::websocket::{BroadcastGateway, LiveEvent, OutboundEvent};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use validator::Validate;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        sweeps_running: state.presence.is_running(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub sweeps_running: bool,
}

/// Readiness: the store answers and both sweeps are running
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    if let Err(e) = state.store.ping().await {
        warn!(error = %e, "Readiness probe failed");
        return Err(e);
    }

    if !state.presence.is_running() {
        return Err(AppError::Storage("presence sweeps are not running".to_string()));
    }

    health_check(State(state)).await
}

/// Prometheus metrics endpoint
///
/// Returns metrics in Prometheus text exposition format
pub async fn metrics() -> (StatusCode, String) {
    let metrics = crate::metrics::gather_metrics();
    (StatusCode::OK, metrics)
}

/// Viewer counts for every stream with at least one viewer
pub async fn all_viewer_counts(
    State(state): State<AppState>,
) -> Json<BTreeMap<StreamId, usize>> {
    Json(state.presence.registry().all_counts())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewerCountResponse {
    pub stream_id: StreamId,
    pub count: usize,
}

pub async fn viewer_count(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<Json<ViewerCountResponse>> {
    let stream_id = StreamId::parse(stream_id)?;
    let count = state.presence.registry().viewer_count(&stream_id);

    Ok(Json(ViewerCountResponse { stream_id, count }))
}

pub async fn list_streams(
    State(state): State<AppState>,
) -> Result<Json<Vec<StreamLivenessRecord>>> {
    Ok(Json(state.store.list().await?))
}

pub async fn get_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<Json<StreamLivenessRecord>> {
    let stream_id = StreamId::parse(stream_id)?;

    state
        .store
        .get(&stream_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Stream {} not found", stream_id)))
}

/// Heartbeat from the stream owner; revives an offline stream
pub async fn record_heartbeat(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<Json<StreamLivenessRecord>> {
    let stream_id = StreamId::parse(stream_id)?;

    let record = state.store.record_heartbeat(&stream_id, Utc::now()).await?;
    debug!(
        stream_id = %record.stream_id,
        last_heartbeat_at = %record.last_heartbeat_at,
        "Heartbeat recorded"
    );

    announce_status(state.gateway(), &record).await;
    Ok(Json(record))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetStatusRequest {
    pub is_live: bool,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
}

/// Explicit start/stop from the stream owner
pub async fn set_status(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<StreamLivenessRecord>> {
    let stream_id = StreamId::parse(stream_id)?;
    request.validate()?;

    let update = StatusChange {
        is_live: request.is_live,
        title: request.title,
    };
    let record = state.store.set_status(&stream_id, update, Utc::now()).await?;

    info!(stream_id = %stream_id, is_live = record.is_live, "Stream status set");
    announce_status(state.gateway(), &record).await;
    Ok(Json(record))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub channel: String,
}

/// Relay an interaction or avatar event to the stream's viewers
pub async fn publish_event(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Json(event): Json<LiveEvent>,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    let stream_id = StreamId::parse(stream_id)?;
    event.validate()?;

    let channel = stream_id.live_event_channel(event.kind());
    state
        .gateway()
        .publish_to_channel(&channel, OutboundEvent::Live(event))
        .await;

    Ok((StatusCode::ACCEPTED, Json(PublishResponse { channel })))
}
