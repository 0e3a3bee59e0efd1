//! Viewer presence registry
//!
//! Maps each connection to the one stream it watches and each stream to the
//! set of connections watching it. Both maps sit behind a single mutex so
//! `join`, `leave` and `disconnect` are atomic to readers.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::models::{ConnectionId, StreamId};

/// Whether a registry operation altered membership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Changed,
    Unchanged,
}

impl MembershipChange {
    pub fn is_changed(self) -> bool {
        self == MembershipChange::Changed
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    connection_to_stream: HashMap<ConnectionId, StreamId>,
    stream_to_connections: HashMap<StreamId, HashSet<ConnectionId>>,
}

impl RegistryInner {
    /// Remove `connection` from `stream`'s set, dropping the set once empty
    fn remove_member(&mut self, connection: &ConnectionId, stream: &StreamId) -> bool {
        let Some(members) = self.stream_to_connections.get_mut(stream) else {
            return false;
        };
        let removed = members.remove(connection);
        if members.is_empty() {
            self.stream_to_connections.remove(stream);
        }
        removed
    }
}

/// In-memory presence bookkeeping
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: Mutex<RegistryInner>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `stream`, leaving any other stream first
    pub fn join(&self, connection: &ConnectionId, stream: &StreamId) -> MembershipChange {
        let mut inner = self.inner.lock();

        let mut changed = false;
        if let Some(previous) = inner.connection_to_stream.get(connection).cloned() {
            if previous != *stream {
                changed |= inner.remove_member(connection, &previous);
                debug!(
                    connection_id = %connection,
                    from = %previous,
                    to = %stream,
                    "Connection switching streams"
                );
            }
        }

        changed |= inner
            .stream_to_connections
            .entry(stream.clone())
            .or_default()
            .insert(connection.clone());
        inner
            .connection_to_stream
            .insert(connection.clone(), stream.clone());

        if changed {
            MembershipChange::Changed
        } else {
            MembershipChange::Unchanged
        }
    }

    /// Stop watching `stream`; unknown connections or streams are a no-op
    pub fn leave(&self, connection: &ConnectionId, stream: &StreamId) -> MembershipChange {
        let mut inner = self.inner.lock();

        let removed = inner.remove_member(connection, stream);
        // A stale stream id must not erase the connection's current stream
        if inner.connection_to_stream.get(connection) == Some(stream) {
            inner.connection_to_stream.remove(connection);
        }

        if removed {
            MembershipChange::Changed
        } else {
            MembershipChange::Unchanged
        }
    }

    /// Purge `connection` from both maps; returns the stream it was watching
    pub fn disconnect(&self, connection: &ConnectionId) -> Option<StreamId> {
        let mut inner = self.inner.lock();

        let stream = inner.connection_to_stream.remove(connection)?;
        inner.remove_member(connection, &stream);
        Some(stream)
    }

    /// Number of connections watching `stream`
    pub fn viewer_count(&self, stream: &StreamId) -> usize {
        self.inner
            .lock()
            .stream_to_connections
            .get(stream)
            .map_or(0, HashSet::len)
    }

    /// Viewer counts of every tracked stream; streams with no viewers are absent
    pub fn all_counts(&self) -> BTreeMap<StreamId, usize> {
        self.inner
            .lock()
            .stream_to_connections
            .iter()
            .map(|(stream, members)| (stream.clone(), members.len()))
            .collect()
    }

    /// Stream currently watched by `connection`
    pub fn stream_of(&self, connection: &ConnectionId) -> Option<StreamId> {
        self.inner.lock().connection_to_stream.get(connection).cloned()
    }

    /// Whether `connection` is in `stream`'s set
    pub fn is_watching(&self, connection: &ConnectionId, stream: &StreamId) -> bool {
        self.inner
            .lock()
            .stream_to_connections
            .get(stream)
            .is_some_and(|members| members.contains(connection))
    }

    pub fn tracked_streams(&self) -> Vec<StreamId> {
        self.inner.lock().stream_to_connections.keys().cloned().collect()
    }

    /// Number of connections watching any stream
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connection_to_stream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().stream_to_connections.is_empty()
    }

    /// Verify the two maps agree with each other
    pub fn check_invariants(&self) -> Result<(), String> {
        let inner = self.inner.lock();

        for (connection, stream) in &inner.connection_to_stream {
            let present = inner
                .stream_to_connections
                .get(stream)
                .is_some_and(|members| members.contains(connection));
            if !present {
                return Err(format!(
                    "connection {} maps to {} but is not in its set",
                    connection, stream
                ));
            }
        }

        let mut seen = HashSet::new();
        for (stream, members) in &inner.stream_to_connections {
            if members.is_empty() {
                return Err(format!("stream {} has an empty connection set", stream));
            }
            for connection in members {
                if !seen.insert(connection) {
                    return Err(format!("connection {} is in more than one set", connection));
                }
                if inner.connection_to_stream.get(connection) != Some(stream) {
                    return Err(format!(
                        "connection {} is in {}'s set but maps elsewhere",
                        connection, stream
                    ));
                }
            }
        }

        Ok(())
    }
}
