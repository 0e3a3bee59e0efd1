use avatar_live_hub::{
    api::{build_router, AppState},
    config::Config,
    presence::PresenceService,
    state::create_store,
    websocket::{ConnectionManager, EventBroadcaster, WebSocketState},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "avatar_live_hub={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        service = %config.observability.service_name,
        "Starting Avatar Live Hub v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = avatar_live_hub::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("Prometheus metrics initialized");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Initialize storage backend
    tracing::info!("Storage backend: {:?}", config.state.backend);
    let store = create_store(&config.state).await?;
    tracing::info!("Storage backend initialized");

    // Transport
    let connections = Arc::new(ConnectionManager::new());
    let broadcaster = Arc::new(EventBroadcaster::new(
        connections,
        config.websocket.broadcast_capacity,
    ));

    // Presence core and its sweeps
    let presence = Arc::new(PresenceService::new(
        config.presence.clone(),
        store.clone(),
        broadcaster.clone(),
    ));
    presence.start()?;
    tracing::info!("Presence sweeps started");

    let ws_state = Arc::new(WebSocketState::new(
        config.websocket.clone(),
        broadcaster,
        presence.event_handler(),
    ));

    // Spawn WebSocket cleanup task
    let cleanup_state = ws_state.clone();
    let cleanup_handle = tokio::spawn(async move {
        avatar_live_hub::websocket::cleanup_task(cleanup_state).await;
    });
    tracing::info!("WebSocket cleanup task started");

    let app_state = AppState::new(store, presence.clone(), ws_state);
    let app = build_router(app_state).layer(TimeoutLayer::new(Duration::from_secs(
        config.server.request_timeout_secs,
    )));

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   REST API: http://{}/v1/streams", http_addr);
    tracing::info!("   WebSocket: ws://{}/ws", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(
        http_listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutting down gracefully...");

    // Sweeps publish through the broadcaster, so they stop first
    presence.shutdown().await;
    cleanup_handle.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
