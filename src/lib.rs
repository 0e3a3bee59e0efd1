//! Avatar Live Hub
//!
//! Real-time backend for virtual-avatar livestreams. Tracks which WebSocket
//! connections are watching which stream, publishes viewer counts, and demotes
//! streams whose owner stopped sending heartbeats.
//!
//! The crate is organised around three collaborating pieces:
//!
//! - [`presence`]: the presence registry, the viewer-count emitter and the
//!   liveness monitor, plus the periodic sweep lifecycle that drives them
//! - [`websocket`]: the transport, including the [`websocket::BroadcastGateway`]
//!   the presence core publishes through
//! - [`state`]: the [`state::StreamLifecycleStore`] holding persisted liveness
//!   records (in-memory, Sled or Redis)

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod presence;
pub mod state;
pub mod websocket;

pub use error::{AppError, Result};
