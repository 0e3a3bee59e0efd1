use avatar_live_hub::{
    models::{ConnectionId, StreamId},
    presence::{MembershipChange, PresenceRegistry},
};
use std::collections::BTreeMap;

fn conn(id: &str) -> ConnectionId {
    ConnectionId::from(id)
}

fn stream(id: &str) -> StreamId {
    StreamId::from(id)
}

#[test]
fn test_invariant_holds_across_mixed_operations() {
    let registry = PresenceRegistry::new();
    let streams = ["a", "b", "c"];

    // Deterministic pseudo-random walk over join/leave/disconnect
    let mut seed: u32 = 7;
    for step in 0..500 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let c = conn(&format!("c{}", (seed >> 8) % 12));
        let s = stream(streams[((seed >> 16) % 3) as usize]);

        match (seed >> 4) % 3 {
            0 => {
                registry.join(&c, &s);
            }
            1 => {
                registry.leave(&c, &s);
            }
            _ => {
                registry.disconnect(&c);
            }
        }

        registry
            .check_invariants()
            .unwrap_or_else(|e| panic!("invariant broken at step {}: {}", step, e));
    }
}

#[test]
fn test_switching_streams_moves_exactly_one_viewer() {
    let registry = PresenceRegistry::new();
    registry.join(&conn("other-1"), &stream("s1"));
    registry.join(&conn("other-2"), &stream("s2"));
    registry.join(&conn("c"), &stream("s1"));

    let s1_before = registry.viewer_count(&stream("s1"));
    let s2_before = registry.viewer_count(&stream("s2"));

    registry.join(&conn("c"), &stream("s2"));

    assert_eq!(registry.viewer_count(&stream("s1")), s1_before - 1);
    assert_eq!(registry.viewer_count(&stream("s2")), s2_before + 1);
    assert!(!registry.is_watching(&conn("c"), &stream("s1")));
    assert_eq!(registry.stream_of(&conn("c")), Some(stream("s2")));
}

#[test]
fn test_leave_is_idempotent() {
    let registry = PresenceRegistry::new();
    registry.join(&conn("c1"), &stream("a"));
    registry.join(&conn("c2"), &stream("a"));

    assert_eq!(registry.leave(&conn("c1"), &stream("a")), MembershipChange::Changed);
    let once = (registry.all_counts(), registry.stream_of(&conn("c1")));

    assert_eq!(registry.leave(&conn("c1"), &stream("a")), MembershipChange::Unchanged);
    let twice = (registry.all_counts(), registry.stream_of(&conn("c1")));

    assert_eq!(once, twice);
}

#[test]
fn test_leave_with_stale_stream_is_tolerated() {
    let registry = PresenceRegistry::new();
    registry.join(&conn("c"), &stream("a"));

    assert_eq!(registry.leave(&conn("c"), &stream("b")), MembershipChange::Unchanged);
    assert_eq!(registry.leave(&conn("ghost"), &stream("a")), MembershipChange::Unchanged);
    assert_eq!(registry.viewer_count(&stream("a")), 1);
    registry.check_invariants().unwrap();
}

#[test]
fn test_disconnect_cleans_up() {
    let registry = PresenceRegistry::new();
    registry.join(&conn("c1"), &stream("a"));
    registry.join(&conn("c2"), &stream("a"));
    let before = registry.viewer_count(&stream("a"));

    assert_eq!(registry.disconnect(&conn("c1")), Some(stream("a")));

    assert_eq!(registry.viewer_count(&stream("a")), before - 1);
    assert_eq!(registry.stream_of(&conn("c1")), None);
    assert!(!registry.is_watching(&conn("c1"), &stream("a")));
    assert_eq!(registry.disconnect(&conn("c1")), None);
}

#[test]
fn test_count_aggregation() {
    let registry = PresenceRegistry::new();
    let a_viewers = ["a1", "a2", "a3"];
    let b_viewers = ["b1", "b2"];

    for id in a_viewers {
        registry.join(&conn(id), &stream("A"));
    }
    for id in b_viewers {
        registry.join(&conn(id), &stream("B"));
    }

    let expected: BTreeMap<StreamId, usize> =
        [(stream("A"), 3), (stream("B"), 2)].into_iter().collect();
    assert_eq!(registry.all_counts(), expected);

    for id in a_viewers.iter().chain(b_viewers.iter()) {
        registry.disconnect(&conn(id));
    }

    assert!(registry.all_counts().is_empty());
    assert!(registry.is_empty());
    assert_eq!(registry.viewer_count(&stream("A")), 0);
}
