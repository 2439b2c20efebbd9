//! Integration tests for the stepweave engine
//!
//! - Wiring from configuration
//! - Tick and seed input files
//! - Cycles, checkpoints, snapshots and journal export

use std::io::Write;
use stepweave::core::{Error, StepweaveConfig, Tick};
use stepweave::watcher::{Member, RegisterFlags, WatcherSnapshot};
use stepweave::{initial_vector, load_relation_seeds, load_ticks, Engine, RelationSeed};

fn config() -> StepweaveConfig {
    let mut config = StepweaveConfig::default();
    config.agent.seed = Some(11);
    config
}

fn engine(config: StepweaveConfig) -> Engine {
    Engine::new(config, initial_vector(4).unwrap()).unwrap()
}

fn seed(members: &[&str], strength: f64) -> RelationSeed {
    RelationSeed {
        members: members.iter().map(|m| Member::from(*m)).collect(),
        strength,
        priority: 1.0,
        flags: RegisterFlags::default(),
    }
}

fn seeds() -> Vec<RelationSeed> {
    vec![
        seed(&["a", "b", "c"], 0.9),
        seed(&["c", "d", "e"], 0.7),
        seed(&["e", "f"], 0.8),
    ]
}

// ============================================================
// Construction
// ============================================================

#[test]
fn initial_vector_is_harmonic() {
    let v = initial_vector(4).unwrap();
    assert_eq!(v.as_slice(), &[1.0, 0.5, 1.0 / 3.0, 0.25]);
    assert!(matches!(initial_vector(0), Err(Error::EmptyVector)));
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = config();
    config.kernel.rho = 1.5;
    assert!(Engine::new(config, initial_vector(4).unwrap()).is_err());
}

#[test]
fn fresh_engine_summary() {
    let engine = engine(config());
    let summary = engine.summary();
    assert_eq!(summary.cycles, 0);
    assert_eq!(summary.relations, 0);
    assert_eq!(summary.state.dim(), 4);
    assert_eq!(summary.depth, config().agent.max_depth);
}

// ============================================================
// Input
// ============================================================

#[test]
fn seeds_register_and_invalid_ones_are_skipped() {
    let engine = engine(config());
    let mut list = seeds();
    list.push(seed(&["lonely"], 0.5));
    assert_eq!(engine.register_seeds(list), 3);
    assert_eq!(engine.watcher().len(), 3);
}

#[test]
fn ticks_are_counted_by_outcome() {
    let engine = engine(config());
    let ticks = vec![Tick::new(1, "a"), Tick::new(2, "b"), Tick::new(2, "dup"), Tick::new(3, "c")];
    let summary = engine.ingest_ticks(&ticks);
    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.rejected, 1);
    assert_eq!(engine.kernel().journal_stats().entries, 3);
}

#[test]
fn unsigned_ticks_rejected_when_auth_required() {
    let mut config = config();
    config.journal.auth_secret = Some("s3cret".into());
    let engine = engine(config);
    let summary = engine.ingest_ticks(&[Tick::new(1, "a"), Tick::new(2, "b").signed("s3cret")]);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.rejected, 1);
}

#[test]
fn load_ticks_skips_malformed_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ticks.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{}", serde_json::to_string(&Tick::new(1, "a")).unwrap()).unwrap();
    writeln!(file, "not json").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "{}", serde_json::to_string(&Tick::new(2, "b")).unwrap()).unwrap();
    drop(file);

    let ticks = load_ticks(&path).unwrap();
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[1].tag, "b");
}

#[test]
fn load_ticks_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_ticks(&dir.path().join("absent.jsonl")),
        Err(Error::IoError(_))
    ));
}

#[test]
fn relation_seed_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seeds.json");
    std::fs::write(&path, serde_json::to_string(&seeds()).unwrap()).unwrap();
    let loaded = load_relation_seeds(&path).unwrap();
    assert_eq!(loaded, seeds());
}

// ============================================================
// Cycles
// ============================================================

#[test]
fn cycles_advance_the_kernel() {
    let mut engine = engine(config());
    engine.register_seeds(seeds());
    for _ in 0..5 {
        let report = engine.run_cycle().unwrap();
        assert!(!report.fallback);
        assert!(report.candidates > 0);
    }
    let summary = engine.summary();
    assert_eq!(summary.cycles, 5);
    assert_eq!(summary.kernel_steps, 5);
    assert!(summary.synergy_entries > 0);
    assert!(summary.state.as_slice().iter().all(|x| x.is_finite()));
}

#[test]
fn empty_engine_falls_back() {
    let mut engine = engine(config());
    let report = engine.run_cycle().unwrap();
    assert!(report.fallback);
    assert_eq!(report.candidates, 0);
}

#[test]
fn same_seed_same_trajectory() {
    let mut config = config();
    config.agent.latency_budget_ms = 1e9;
    let run = || {
        let mut engine = engine(config.clone());
        engine.register_seeds(seeds());
        for _ in 0..4 {
            engine.run_cycle().unwrap();
        }
        engine.kernel().current()
    };
    assert_eq!(run(), run());
}

#[test]
fn harmonic_term_is_attached_from_config() {
    let mut config = config();
    config.agent.harmonic_weight = 0.2;
    let mut engine = engine(config);
    engine.register_seeds(seeds());
    assert!(engine.run_cycle().is_ok());
}

// ============================================================
// Persistence
// ============================================================

#[test]
fn checkpoint_restores_cycle_count_and_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");

    let mut first = engine(config());
    first.register_seeds(seeds());
    for _ in 0..3 {
        first.run_cycle().unwrap();
    }
    first.save_checkpoint(&path).unwrap();

    let mut second = engine(config());
    second.restore_checkpoint(&path).unwrap();
    assert_eq!(second.agent().cycle_count(), 3);
    assert_eq!(second.kernel().current(), first.kernel().current());
    assert_eq!(second.agent().synergy().len(), first.agent().synergy().len());
}

#[test]
fn checkpoint_with_other_dimension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");
    engine(config()).save_checkpoint(&path).unwrap();

    let mut wide = Engine::new(config(), initial_vector(6).unwrap()).unwrap();
    assert!(matches!(
        wide.restore_checkpoint(&path),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn snapshot_seeds_a_new_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watcher.json");

    let first = engine(config());
    first.register_seeds(seeds());
    first.save_snapshot(&path).unwrap();

    let snapshot = WatcherSnapshot::load(&path).unwrap();
    let second =
        Engine::with_snapshot(config(), initial_vector(4).unwrap(), Some(snapshot)).unwrap();
    assert_eq!(second.watcher().len(), 3);
}

#[test]
fn exported_journal_verifies_and_tampering_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.json");

    let engine = engine(config());
    engine.ingest_ticks(&[Tick::new(1, "a"), Tick::new(2, "b")]);
    assert_eq!(engine.export_journal(&path).unwrap(), 2);
    assert!(engine.import_journal(&path).unwrap().is_empty());

    let mut entries: Vec<stepweave::kernel::JournalEntry> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    entries[1].payload.push(b'!');
    std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();
    assert_eq!(engine.import_journal(&path).unwrap(), vec![2]);
}
