//! Viewer presence and stream liveness
//!
//! [`PresenceRegistry`] tracks who watches what. [`CountEmitter`] publishes
//! viewer counts on a 5 second sweep and on every membership change.
//! [`LivenessMonitor`] demotes streams whose heartbeat lapsed on a 15 second
//! sweep. [`PresenceService`] wires them together and owns both timers.

pub mod emitter;
pub mod handler;
pub mod liveness;
pub mod registry;
pub mod sweep;

pub use emitter::CountEmitter;
pub use handler::PresenceEventHandler;
pub use liveness::{announce_status, LivenessMonitor, SweepReport};
pub use registry::{MembershipChange, PresenceRegistry};
pub use sweep::{PeriodicSweep, Sweep, SweepHandle};

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::PresenceConfig;
use crate::error::{AppError, Result};
use crate::state::StreamLifecycleStore;
use crate::websocket::broadcaster::BroadcastGateway;

/// Presence core plus the lifecycle of its two sweeps
pub struct PresenceService {
    registry: Arc<PresenceRegistry>,
    emitter: CountEmitter,
    monitor: LivenessMonitor,
    config: PresenceConfig,
    handles: Mutex<Vec<SweepHandle>>,
}

impl PresenceService {
    pub fn new(
        config: PresenceConfig,
        store: Arc<dyn StreamLifecycleStore>,
        gateway: Arc<dyn BroadcastGateway>,
    ) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let emitter = CountEmitter::new(registry.clone(), gateway.clone());
        let monitor = LivenessMonitor::new(store, gateway, config.heartbeat_timeout());

        Self {
            registry,
            emitter,
            monitor,
            config,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start both sweeps
    pub fn start(&self) -> Result<()> {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return Err(AppError::Internal(
                "Presence sweeps already running".to_string(),
            ));
        }

        info!(
            count_interval_secs = self.config.count_interval_secs,
            liveness_interval_secs = self.config.liveness_interval_secs,
            heartbeat_timeout_secs = self.config.heartbeat_timeout_secs,
            "Starting presence sweeps"
        );

        handles.push(PeriodicSweep::start(
            Arc::new(self.emitter.clone()),
            self.config.count_interval(),
        ));
        handles.push(PeriodicSweep::start(
            Arc::new(self.monitor.clone()),
            self.config.liveness_interval(),
        ));
        Ok(())
    }

    /// Stop both sweeps and wait for them to exit
    ///
    /// Must complete before the broadcaster is torn down.
    pub async fn shutdown(&self) {
        let handles: Vec<SweepHandle> = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            warn!("Presence sweeps were not running");
            return;
        }

        for handle in handles {
            let name = handle.name();
            handle.stop().await;
            info!(sweep = name, "Sweep stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handles.lock().iter().any(SweepHandle::is_running)
    }

    /// Handler for transport connection events
    pub fn event_handler(&self) -> PresenceEventHandler {
        PresenceEventHandler::new(self.registry.clone(), self.emitter.clone())
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    pub fn emitter(&self) -> &CountEmitter {
        &self.emitter
    }

    pub fn monitor(&self) -> &LivenessMonitor {
        &self.monitor
    }
}
