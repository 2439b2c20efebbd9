//! Integration tests for stepweave-watcher
//!
//! - Registration: flattening, damping, rejection, clamping, capacity
//! - Observe: decay, companion promotion, pruning, window tuning
//! - Ghost lifecycle and consolidation
//! - Snapshot round-trip

use proptest::prelude::*;
use std::sync::Arc;
use stepweave_core::metrics::names;
use stepweave_core::{Error, InMemoryMetrics, StateVector, WatcherConfig};
use stepweave_watcher::*;

fn watcher() -> RelationWatcher {
    RelationWatcher::new(&WatcherConfig::default()).unwrap()
}

fn tags(list: &[&str]) -> Vec<Member> {
    list.iter().map(|t| Member::from(*t)).collect()
}

fn no_ghost() -> RegisterFlags {
    RegisterFlags {
        no_ghost: true,
        ..Default::default()
    }
}

fn exempt() -> RegisterFlags {
    RegisterFlags {
        exempt: true,
        no_ghost: true,
        ..Default::default()
    }
}

fn negated(v: StateVector) -> StateVector {
    StateVector::new(v.as_slice().iter().map(|x| -x).collect()).unwrap()
}

// ============================================================
// Registration
// ============================================================

#[test]
fn minimal_relation_at_full_context_keeps_strength() {
    let w = watcher();
    assert_eq!(w.context_ratio(), 1.0);
    let id = w.register(tags(&["a", "b"]), 0.9, 1.0, RegisterFlags::default()).unwrap();
    let r = w.relation(id).unwrap();
    assert!((r.strength - 0.9).abs() < 1e-9);
    assert!(r.transient);
    assert!(r.is_minimal());
}

#[test]
fn minimal_relation_at_zero_context_is_damped() {
    let w = watcher();
    w.register(tags(&["p", "q"]), 0.5, 1.0, exempt()).unwrap();
    assert_eq!(w.context_ratio(), 0.0);
    let id = w.register(tags(&["a", "b"]), 0.9, 1.0, RegisterFlags::default()).unwrap();
    assert!((w.relation(id).unwrap().strength - 0.54).abs() < 1e-9);
}

#[test]
fn exempt_minimal_relation_is_not_transient() {
    let w = watcher();
    w.register(tags(&["p", "q"]), 0.5, 1.0, exempt()).unwrap();
    let id = w.register(tags(&["x", "y"]), 0.7, 1.0, exempt()).unwrap();
    let r = w.relation(id).unwrap();
    assert!(!r.transient);
    assert_eq!(r.strength, 0.7);
}

#[test]
fn singleton_is_rejected_and_counted() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let w = watcher().with_metrics(metrics.clone());
    let err = w.register(tags(&["x"]), 0.5, 1.0, RegisterFlags::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidRelation(_)));
    assert!(w.register(tags(&["x", "x"]), 0.5, 1.0, RegisterFlags::default()).is_err());
    assert!(w.register(vec![], 0.5, 1.0, RegisterFlags::default()).is_err());
    assert_eq!(w.len(), 0);
    assert_eq!(metrics.counter(names::RELATION_REJECTED), 3);
}

#[test]
fn singleton_override_flag() {
    let w = watcher();
    let flags = RegisterFlags {
        allow_singleton: true,
        ..Default::default()
    };
    let id = w.register(tags(&["x"]), 0.5, 1.0, flags).unwrap();
    assert_eq!(w.relation(id).unwrap().arity(), 1);
}

#[test]
fn strength_and_priority_are_clamped() {
    let w = watcher();
    let a = w.register(tags(&["a", "b", "c"]), 7.0, 100.0, no_ghost()).unwrap();
    let b = w.register(tags(&["d", "e", "f"]), -2.0, -1.0, no_ghost()).unwrap();
    let c = w.register(tags(&["g", "h", "i"]), f64::NAN, f64::INFINITY, no_ghost()).unwrap();
    let max_priority = WatcherConfig::default().max_priority;
    assert_eq!(w.relation(a).unwrap().strength, 1.0);
    assert_eq!(w.relation(a).unwrap().priority_weight, max_priority);
    assert_eq!(w.relation(b).unwrap().strength, 0.0);
    assert_eq!(w.relation(b).unwrap().priority_weight, 0.0);
    assert_eq!(w.relation(c).unwrap().strength, 0.0);
}

#[test]
fn nested_members_become_substructures() {
    let w = watcher();
    let members = vec![Member::from("a"), Member::from(vec!["c", "b"])];
    let id = w.register(members, 0.8, 1.0, RegisterFlags::default()).unwrap();
    let r = w.relation(id).unwrap();
    assert_eq!(r.members, vec!["[b+c]", "a"]);
    assert_eq!(r.substructures["[b+c]"], vec!["b", "c"]);
}

#[test]
fn minimal_relation_spawns_companion_ghost() {
    let w = watcher();
    let id = w.register(tags(&["a", "b"]), 0.9, 1.0, RegisterFlags::default()).unwrap();
    let tag = w.relation(id).unwrap().companion.unwrap();
    let ghost = w.ghost(&tag).unwrap();
    assert_eq!(ghost.companion_of, Some(id));
    assert_eq!(ghost.strength, WatcherConfig::default().ghost_seed_strength);
}

#[test]
fn full_table_evicts_weakest() {
    let config = WatcherConfig {
        max_relations: 2,
        ..Default::default()
    };
    let metrics = Arc::new(InMemoryMetrics::new());
    let w = RelationWatcher::new(&config).unwrap().with_metrics(metrics.clone());
    let weak = w.register(tags(&["a", "b"]), 0.1, 1.0, exempt()).unwrap();
    let strong = w.register(tags(&["c", "d"]), 0.9, 1.0, exempt()).unwrap();
    let newest = w.register(tags(&["e", "f"]), 0.5, 1.0, exempt()).unwrap();
    assert_eq!(w.len(), 2);
    assert!(w.relation(weak).is_none());
    assert!(w.relation(strong).is_some());
    assert!(w.relation(newest).is_some());
    assert_eq!(metrics.counter(names::RELATION_EVICTED), 1);
}

// ============================================================
// Observe
// ============================================================

#[test]
fn transient_relations_decay_higher_order_do_not() {
    let w = watcher();
    let minimal = w.register(tags(&["a", "b"]), 0.9, 1.0, no_ghost()).unwrap();
    let higher = w.register(tags(&["c", "d", "e"]), 0.9, 1.0, no_ghost()).unwrap();
    let signal = StateVector::new(vec![0.3, -0.2, 0.1, 0.4]).unwrap();

    let mut last = w.relation(minimal).unwrap().strength;
    for _ in 0..5 {
        let report = w.observe(&signal);
        assert!(report.decay_rate >= 0.85 && report.decay_rate <= 0.99);
        let now = w.relation(minimal).unwrap().strength;
        assert!(now < last);
        last = now;
    }
    assert_eq!(w.relation(higher).unwrap().strength, 0.9);
    assert_eq!(w.cycle(), 5);
}

#[test]
fn weak_relations_are_pruned() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let w = watcher().with_metrics(metrics.clone());
    let id = w.register(tags(&["a", "b"]), 1e-4, 1.0, no_ghost()).unwrap();
    let report = w.observe(&StateVector::new(vec![1.0, 0.5]).unwrap());
    assert_eq!(report.pruned, vec![id]);
    assert!(w.is_empty());
    assert_eq!(metrics.counter(names::RELATION_PRUNED), 1);
}

#[test]
fn companion_seen_in_signal_promotes_relation() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let w = watcher().with_metrics(metrics.clone());
    let id = w.register(tags(&["a", "b"]), 0.9, 1.0, RegisterFlags::default()).unwrap();
    let ghost_tag = w.relation(id).unwrap().companion.unwrap();

    let signal = embed_tags(&["a", "b"], 8).unwrap();
    let report = w.observe(&signal);
    assert_eq!(report.promoted, vec![id]);

    let r = w.relation(id).unwrap();
    assert_eq!(r.arity(), 3);
    assert!(r.contains(&ghost_tag));
    assert!(!r.transient);
    assert!(w.ghost(&ghost_tag).is_none());
    assert_eq!(metrics.counter(names::GHOST_PROMOTED), 1);
    assert_eq!(metrics.counter(names::RELATION_PROMOTED), 1);
}

#[test]
fn unseen_companion_leaves_relation_transient() {
    let w = watcher();
    let id = w.register(tags(&["a", "b"]), 0.9, 1.0, RegisterFlags::default()).unwrap();
    let signal = negated(embed_tags(&["a", "b"], 8).unwrap());
    let report = w.observe(&signal);
    assert!(report.promoted.is_empty());
    assert!(w.relation(id).unwrap().transient);
}

#[test]
fn context_ratio_tracks_arities() {
    let w = watcher();
    w.register(tags(&["a", "b"]), 0.5, 1.0, no_ghost()).unwrap();
    assert_eq!(w.context_ratio(), 0.0);
    w.register(tags(&["a", "b", "c"]), 0.5, 1.0, no_ghost()).unwrap();
    assert_eq!(w.context_ratio(), 0.5);
}

#[test]
fn saturated_window_grows() {
    let config = WatcherConfig {
        tune_every: 1,
        window_size: 8,
        window_min: 4,
        window_max: 64,
        ..Default::default()
    };
    let w = RelationWatcher::new(&config).unwrap();
    for pair in [["a", "b"], ["c", "d"], ["e", "f"], ["g", "h"]] {
        w.register(tags(&pair), 0.9, 1.0, no_ghost()).unwrap();
    }
    let report = w.observe(&StateVector::new(vec![1.0, 0.0, 0.5]).unwrap());
    assert_eq!(report.window_size, 12);
    assert_eq!(w.window_size(), 12);
}

#[test]
fn drifting_relations_shrink_window() {
    let config = WatcherConfig {
        tune_every: 1,
        drift_gap: 0,
        window_size: 8,
        window_min: 4,
        window_max: 64,
        ..Default::default()
    };
    let w = RelationWatcher::new(&config).unwrap();
    w.register(tags(&["a", "b", "c"]), 0.9, 1.0, no_ghost()).unwrap();
    let signal = negated(embed_tags(&["a", "b", "c"], 6).unwrap());
    let report = w.observe(&signal);
    assert_eq!(report.window_size, 5);
}

#[test]
fn window_respects_bounds() {
    let config = WatcherConfig {
        tune_every: 1,
        window_size: 8,
        window_min: 4,
        window_max: 10,
        ..Default::default()
    };
    let w = RelationWatcher::new(&config).unwrap();
    w.register(tags(&["a", "b"]), 0.9, 1.0, no_ghost()).unwrap();
    let signal = StateVector::new(vec![1.0, 0.0]).unwrap();
    for _ in 0..3 {
        w.observe(&signal);
    }
    assert_eq!(w.window_size(), 10);
}

// ============================================================
// Consolidation and ghosts
// ============================================================

#[test]
fn consolidate_builds_higher_order_relation() {
    let w = watcher();
    let ab = w.register(tags(&["a", "b"]), 0.6, 1.0, no_ghost()).unwrap();
    let bc = w.register(tags(&["b", "c"]), 0.4, 2.0, no_ghost()).unwrap();
    let merged = w.consolidate(&[ab, bc]).unwrap().unwrap();
    let r = w.relation(merged).unwrap();
    assert_eq!(r.members, vec!["a", "b", "c"]);
    assert!(!r.transient);
    assert_eq!(r.priority_weight, 2.0);
    assert_eq!(w.len(), 3);
}

#[test]
fn consolidate_needs_three_members() {
    let w = watcher();
    let ab = w.register(tags(&["a", "b"]), 0.6, 1.0, no_ghost()).unwrap();
    assert_eq!(w.consolidate(&[ab]).unwrap(), None);
    assert!(matches!(
        w.consolidate(&[ab, RelationId(999)]),
        Err(Error::UnknownRelation(999))
    ));
}

#[test]
fn reinforced_ghost_ascends_and_spawns_offspring() {
    let w = watcher();
    w.register_ghost("g", &["a".to_string(), "b".to_string()], 0.3).unwrap();
    let signal = embed_tags(&["a", "b"], 8).unwrap();

    let mut ascended = None;
    for _ in 0..10 {
        if let Some(id) = w.reinforce("g", &signal) {
            ascended = Some(id);
            break;
        }
    }
    let id = ascended.expect("ghost should ascend");
    assert_eq!(w.relation(id).unwrap().members, vec!["a", "b", "g"]);
    assert!(w.ghost("g").is_none());
    let child = w.ghost("g'").unwrap();
    assert_eq!(child.generation, 1);
    assert!((child.strength - 0.15).abs() < 1e-9);
}

#[test]
fn reinforce_caps_strength_and_ignores_unknown() {
    let w = watcher();
    let signal = StateVector::new(vec![1.0, 0.0]).unwrap();
    assert!(w.reinforce("missing", &signal).is_none());
    w.register_ghost("g", &["a".to_string()], 0.5).unwrap();
    w.reinforce("g", &signal);
    let strength = w.ghost("g").unwrap().strength;
    assert!(strength > 0.5 && strength <= 1.0);
}

#[test]
fn empty_ghost_tag_rejected() {
    assert!(watcher().register_ghost("  ", &[], 0.5).is_err());
}

#[test]
fn unseen_ghosts_decay_and_are_evicted() {
    let config = WatcherConfig {
        drift_gap: 0,
        ghost_decay: 0.5,
        ghost_floor: 0.5,
        ..Default::default()
    };
    let metrics = Arc::new(InMemoryMetrics::new());
    let w = RelationWatcher::new(&config).unwrap().with_metrics(metrics.clone());
    w.register_ghost("h", &["zz".to_string()], 0.6).unwrap();
    let signal = negated(embed_tags(&["zz"], 4).unwrap());
    let report = w.observe(&signal);
    assert_eq!(report.ghosts_evicted, 1);
    assert!(w.ghost("h").is_none());
    assert_eq!(metrics.counter(names::GHOST_EVICTED), 1);
    assert_eq!(w.decay_unseen(), 0);
}

// ============================================================
// Snapshots
// ============================================================

#[test]
fn snapshot_round_trip_through_disk() {
    let w = watcher();
    w.register(tags(&["a", "b"]), 0.9, 1.0, RegisterFlags::default()).unwrap();
    w.register(tags(&["c", "d", "e"]), 0.7, 2.0, no_ghost()).unwrap();
    w.register_ghost("g", &["a".to_string()], 0.4).unwrap();
    w.observe(&StateVector::new(vec![0.2, 0.1, -0.3]).unwrap());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watcher.json");
    let snapshot = w.to_snapshot();
    snapshot.save(&path).unwrap();
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = WatcherSnapshot::load(&path).unwrap();
    assert_eq!(loaded, snapshot);
    let restored = RelationWatcher::from_snapshot(loaded, &WatcherConfig::default()).unwrap();
    assert_eq!(restored.relations(), w.relations());
    assert_eq!(restored.ghosts(), w.ghosts());
    assert_eq!(restored.context_ratio(), w.context_ratio());
    assert_eq!(restored.cycle(), w.cycle());

    let next = restored.register(tags(&["x", "y", "z"]), 0.5, 1.0, no_ghost()).unwrap();
    assert!(w.relations().iter().all(|r| r.id != next));
}

#[test]
fn snapshot_version_is_checked() {
    let mut snapshot = watcher().to_snapshot();
    snapshot.version = SNAPSHOT_VERSION + 1;
    assert!(matches!(
        RelationWatcher::from_snapshot(snapshot, &WatcherConfig::default()),
        Err(Error::SnapshotVersion { .. })
    ));
}

#[test]
fn snapshot_values_are_clamped_on_load() {
    let w = watcher();
    let id = w.register(tags(&["a", "b", "c"]), 0.5, 1.0, no_ghost()).unwrap();
    let mut snapshot = w.to_snapshot();
    snapshot.relations[0].strength = 3.0;
    snapshot.decay_rate = 7.0;
    let restored = RelationWatcher::from_snapshot(snapshot, &WatcherConfig::default()).unwrap();
    assert_eq!(restored.relation(id).unwrap().strength, 1.0);
    assert!(restored.decay_rate() < 1.0);
}

#[test]
fn snapshot_duplicate_members_drop_relation_and_unlink_ghost() {
    let w = watcher();
    let id = w.register(tags(&["a", "b"]), 0.9, 1.0, RegisterFlags::default()).unwrap();
    let companion = w.relation(id).unwrap().companion.unwrap();

    let mut snapshot = w.to_snapshot();
    snapshot.relations[0].members = vec!["a".to_string(), "a".to_string()];
    let restored = RelationWatcher::from_snapshot(snapshot, &WatcherConfig::default()).unwrap();

    assert!(restored.is_empty());
    assert_eq!(restored.ghost(&companion).unwrap().companion_of, None);
}

// ============================================================
// Properties
// ============================================================

proptest! {
    #[test]
    fn stored_strength_is_always_in_unit_interval(
        strength in prop_oneof![
            -1e6f64..1e6,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY)
        ],
        priority in -10f64..10.0,
        arity in 2usize..5,
        exempt_flag in any::<bool>(),
    ) {
        let w = watcher();
        let members: Vec<Member> = (0..arity).map(|i| Member::from(format!("t{}", i))).collect();
        let flags = RegisterFlags { exempt: exempt_flag, ..Default::default() };
        let id = w.register(members, strength, priority, flags).unwrap();
        let s = w.relation(id).unwrap().strength;
        prop_assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn decay_is_monotone_without_reinforcement(
        strengths in prop::collection::vec(0.0f64..1.0, 1..6),
        signal in prop::collection::vec(-1.0f64..1.0, 2..6),
        cycles in 1usize..12,
    ) {
        let w = watcher();
        for (i, s) in strengths.iter().enumerate() {
            let members = vec![Member::from(format!("a{}", i)), Member::from(format!("b{}", i))];
            w.register(members, *s, 1.0, no_ghost()).unwrap();
        }
        let signal = StateVector::new(signal).unwrap();
        let mut before = w.relations();
        for _ in 0..cycles {
            w.observe(&signal);
            let after = w.relations();
            for r in &after {
                let prev = before.iter().find(|p| p.id == r.id).unwrap();
                prop_assert!(r.strength <= prev.strength);
            }
            before = after;
        }
    }
}
