//! WebSocket metrics
//!
//! Transport-level Prometheus metrics, registered in the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};

lazy_static! {
    /// Active WebSocket connections
    pub static ref WS_ACTIVE_CONNECTIONS: IntGauge = register_int_gauge!(
        "websocket_active_connections",
        "Number of active WebSocket connections"
    )
    .unwrap();

    /// Total WebSocket connections
    pub static ref WS_TOTAL_CONNECTIONS: IntCounter = register_int_counter!(
        "websocket_total_connections",
        "Total number of WebSocket connections established"
    )
    .unwrap();

    /// Messages sent to clients
    pub static ref WS_MESSAGES_SENT: IntCounter = register_int_counter!(
        "websocket_messages_sent_total",
        "Total number of messages sent to WebSocket clients"
    )
    .unwrap();

    /// Messages received from clients
    pub static ref WS_MESSAGES_RECEIVED: IntCounter = register_int_counter!(
        "websocket_messages_received_total",
        "Total number of messages received from WebSocket clients"
    )
    .unwrap();

    /// Message send errors
    pub static ref WS_SEND_ERRORS: IntCounter = register_int_counter!(
        "websocket_send_errors_total",
        "Total number of errors sending messages to clients"
    )
    .unwrap();

    /// Session duration histogram
    pub static ref WS_SESSION_DURATION: Histogram = register_histogram!(
        "websocket_session_duration_seconds",
        "Duration of WebSocket sessions in seconds"
    )
    .unwrap();
}

/// Record a new connection
pub fn record_connection() {
    WS_ACTIVE_CONNECTIONS.inc();
    WS_TOTAL_CONNECTIONS.inc();
}

/// Record a disconnection
pub fn record_disconnection(duration_secs: f64) {
    WS_ACTIVE_CONNECTIONS.dec();
    WS_SESSION_DURATION.observe(duration_secs);
}

/// Record a message sent
pub fn record_message_sent() {
    WS_MESSAGES_SENT.inc();
}

/// Record a message received
pub fn record_message_received() {
    WS_MESSAGES_RECEIVED.inc();
}

/// Record a send error
pub fn record_send_error() {
    WS_SEND_ERRORS.inc();
}
