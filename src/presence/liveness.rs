//! Heartbeat-based stream liveness
//!
//! The monitor only ever performs the `Live -> Offline` transition. Going
//! live again happens on the owner's write path (heartbeat or explicit
//! status), which calls [`announce_status`] itself.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics;
use crate::models::StreamLivenessRecord;
use crate::state::StreamLifecycleStore;
use crate::websocket::{
    broadcaster::BroadcastGateway,
    events::{OutboundEvent, STATUS_UPDATE_EVENT},
};

use super::sweep::Sweep;

/// Outcome of one liveness sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Stale records returned by the store
    pub examined: usize,
    pub demoted: usize,
    /// Records a fresher heartbeat saved from demotion
    pub conflicts: usize,
}

/// Publish a record change: the full record globally, the heartbeat payload
/// on the stream's heartbeat channel
pub async fn announce_status(gateway: &dyn BroadcastGateway, record: &StreamLivenessRecord) {
    gateway
        .publish_global(STATUS_UPDATE_EVENT, OutboundEvent::status_update(record.clone()))
        .await;
    gateway
        .publish_to_channel(
            &record.stream_id.heartbeat_channel(),
            OutboundEvent::heartbeat(record),
        )
        .await;
}

/// Demotes streams whose heartbeat lapsed
#[derive(Clone)]
pub struct LivenessMonitor {
    store: Arc<dyn StreamLifecycleStore>,
    gateway: Arc<dyn BroadcastGateway>,
    heartbeat_timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(
        store: Arc<dyn StreamLifecycleStore>,
        gateway: Arc<dyn BroadcastGateway>,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            heartbeat_timeout,
        }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Demote every live record older than the timeout as of `now`
    ///
    /// A store error aborts the rest of the sweep and is returned; records
    /// already demoted stay demoted and their events are already out.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let stale = self.store.find_stale(now, self.heartbeat_timeout).await?;
        let mut report = SweepReport {
            examined: stale.len(),
            ..Default::default()
        };

        for record in stale {
            let demoted = self
                .store
                .mark_offline(&record.stream_id, record.last_heartbeat_at, now)
                .await?;

            match demoted {
                Some(updated) => {
                    info!(
                        stream_id = %updated.stream_id,
                        last_heartbeat_at = %updated.last_heartbeat_at,
                        "Stream heartbeat lapsed, marked offline"
                    );
                    metrics::record_demotion();
                    announce_status(self.gateway.as_ref(), &updated).await;
                    report.demoted += 1;
                }
                None => {
                    info!(
                        stream_id = %record.stream_id,
                        "Stream changed since stale query, skipping demotion"
                    );
                    metrics::record_demotion_conflict();
                    report.conflicts += 1;
                }
            }
        }

        debug!(
            examined = report.examined,
            demoted = report.demoted,
            conflicts = report.conflicts,
            "Liveness sweep finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl Sweep for LivenessMonitor {
    fn name(&self) -> &'static str {
        "liveness"
    }

    async fn run_once(&self) -> Result<()> {
        self.sweep().await.map(|_| ())
    }
}
