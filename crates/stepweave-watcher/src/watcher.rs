//! RelationWatcher: relation and ghost tables behind one mutex
//!
//! Every public operation locks once, does its work, and returns. No
//! operation calls back into another component while the lock is held.

use crate::context::ContextWindow;
use crate::ghost::Ghost;
use crate::relation::{flatten, member_signature, Member, RegisterFlags, Relation, RelationId};
use crate::snapshot::{WatcherSnapshot, SNAPSHOT_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use stepweave_core::metrics::{self, names};
use stepweave_core::{Component, Error, MetricsSink, Result, StateVector, WatcherConfig};
use tracing::{debug, info, warn};

pub struct RelationWatcher {
    inner: Mutex<WatcherState>,
    config: WatcherConfig,
    metrics: Arc<dyn MetricsSink>,
}

struct WatcherState {
    relations: BTreeMap<RelationId, Relation>,
    by_signature: HashMap<String, RelationId>,
    ghosts: BTreeMap<String, Ghost>,
    window: ContextWindow,
    decay_rate: f64,
    cycle: u64,
    next_id: u64,
    event_ema: f64,
    events: u64,
}

/// What one `observe` cycle did.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserveReport {
    pub cycle: u64,
    pub decay_rate: f64,
    pub decayed: usize,
    /// Relations extended by their companion ghost.
    pub promoted: Vec<RelationId>,
    /// Relations created or extended by standalone ghosts ascending.
    pub ascended: Vec<RelationId>,
    pub pruned: Vec<RelationId>,
    pub ghosts_evicted: usize,
    pub context_ratio: f64,
    pub window_size: usize,
}

/// A relation about to be inserted.
struct Draft {
    members: Vec<String>,
    substructures: BTreeMap<String, Vec<String>>,
    strength: f64,
    priority: f64,
    transient: bool,
    exempt: bool,
    companion: bool,
}

impl Component for RelationWatcher {
    const NAME: &'static str = "RelationWatcher";
    const OPERATIONS: &'static [&'static str] = &[
        "register",
        "observe",
        "mark_used",
        "consolidate",
        "register_ghost",
        "reinforce",
        "decay_unseen",
        "to_snapshot",
        "from_snapshot",
        "context_ratio",
    ];
}

impl RelationWatcher {
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(WatcherState {
                relations: BTreeMap::new(),
                by_signature: HashMap::new(),
                ghosts: BTreeMap::new(),
                window: ContextWindow::new(
                    config.window_size.clamp(config.window_min, config.window_max),
                ),
                decay_rate: config.max_decay_rate,
                cycle: 0,
                next_id: 1,
                event_ema: 0.0,
                events: 0,
            }),
            config: config.clone(),
            metrics: metrics::noop(),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, WatcherState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a relation. Minimal relations are damped by the current
    /// context ratio and marked transient unless `flags.exempt` is set.
    pub fn register(
        &self,
        members: Vec<Member>,
        strength: f64,
        priority_weight: f64,
        flags: RegisterFlags,
    ) -> Result<RelationId> {
        let (tags, substructures) = flatten(members);
        if tags.is_empty() || (tags.len() < 2 && !flags.allow_singleton) {
            self.metrics.incr(names::RELATION_REJECTED, 1);
            warn!("relation rejected: {} unique member(s) {:?}", tags.len(), tags);
            return Err(Error::invalid_relation(format!(
                "need at least 2 unique members, got {}",
                tags.len()
            )));
        }

        let mut state = self.lock();
        let mut strength = finite_or_zero(strength).clamp(0.0, 1.0);
        let priority = finite_or_zero(priority_weight).clamp(0.0, self.config.max_priority);
        let minimal = tags.len() == 2 && !flags.exempt;
        if minimal {
            strength *= 0.6 + 0.4 * state.window.ratio();
        }

        let id = self.insert(
            &mut state,
            Draft {
                members: tags,
                substructures,
                strength,
                priority,
                transient: minimal,
                exempt: flags.exempt,
                companion: minimal && self.config.companion_ghosts && !flags.no_ghost,
            },
        );
        Ok(id)
    }

    fn insert(&self, state: &mut WatcherState, draft: Draft) -> RelationId {
        let arity = draft.members.len();
        state.window.push(arity);
        state.events += 1;
        let cycle = state.cycle;

        let signature = member_signature(&draft.members);
        if let Some(&id) = state.by_signature.get(&signature) {
            if let Some(existing) = state.relations.get_mut(&id) {
                existing.strength = existing.strength.max(draft.strength);
                existing.priority_weight = existing.priority_weight.max(draft.priority);
                existing.transient &= draft.transient;
                existing.exempt |= draft.exempt;
                existing.last_seen_cycle = cycle;
                existing.substructures.extend(draft.substructures);
                debug!("relation {} re-registered, strength {:.4}", id, existing.strength);
                return id;
            }
        }

        while state.relations.len() >= self.config.max_relations {
            let weakest = state
                .relations
                .values()
                .min_by(|a, b| a.strength.total_cmp(&b.strength))
                .map(|r| r.id);
            match weakest {
                Some(id) => {
                    remove_relation(state, id);
                    self.metrics.incr(names::RELATION_EVICTED, 1);
                    info!("relation table full, evicted {}", id);
                }
                None => break,
            }
        }

        let id = RelationId(state.next_id);
        state.next_id += 1;
        let mut relation = Relation {
            id,
            members: draft.members,
            strength: draft.strength,
            priority_weight: draft.priority,
            substructures: draft.substructures,
            transient: draft.transient,
            exempt: draft.exempt,
            created_cycle: cycle,
            last_seen_cycle: cycle,
            companion: None,
        };

        if draft.companion {
            let ghost = Ghost::companion(
                &signature,
                id,
                &relation.members,
                self.config.ghost_seed_strength,
                cycle,
            );
            if !relation.contains(&ghost.tag) {
                relation.companion = Some(ghost.tag.clone());
                state.ghosts.insert(ghost.tag.clone(), ghost);
            }
        }

        debug!(
            "registered {} {:?} strength={:.4} transient={}",
            id, relation.members, relation.strength, relation.transient
        );
        state.by_signature.insert(signature, id);
        state.relations.insert(id, relation);
        id
    }

    // ------------------------------------------------------------------
    // Observe cycle
    // ------------------------------------------------------------------

    /// Advance one cycle against `signal`.
    pub fn observe(&self, signal: &StateVector) -> ObserveReport {
        let mut state = self.lock();
        state.cycle += 1;
        let cycle = state.cycle;
        let alpha = self.config.event_ema_alpha.clamp(0.0, 1.0);
        state.event_ema = alpha * state.events as f64 + (1.0 - alpha) * state.event_ema;
        state.events = 0;

        // More contradiction pressure means slower decay.
        let ctx = state.window.ratio();
        let activity = state.event_ema / (1.0 + state.event_ema);
        let pressure = (0.5 * ctx + 0.5 * activity).clamp(0.0, 1.0);
        let (lo, hi) = (self.config.min_decay_rate, self.config.max_decay_rate);
        state.decay_rate = lo + (hi - lo) * pressure;
        let rate = state.decay_rate;

        let mut report = ObserveReport {
            cycle,
            decay_rate: rate,
            ..Default::default()
        };

        let dim = signal.dim();
        let mut companions_seen = Vec::new();
        for relation in state.relations.values_mut() {
            if relation
                .embed(dim)
                .map(|v| v.cosine(signal) >= self.config.seen_cutoff)
                .unwrap_or(false)
            {
                relation.last_seen_cycle = cycle;
            }
            if relation.transient {
                relation.strength *= rate;
                report.decayed += 1;
                if let Some(tag) = &relation.companion {
                    companions_seen.push((relation.id, tag.clone()));
                }
            }
        }
        if report.decayed > 0 {
            self.metrics.incr(names::RELATION_DECAYED, report.decayed as u64);
        }

        for (id, tag) in companions_seen {
            let seen = state
                .ghosts
                .get(&tag)
                .map(|g| g.similarity(signal) >= self.config.seen_cutoff)
                .unwrap_or(false);
            if seen && self.promote_companion(&mut state, id, &tag) {
                report.promoted.push(id);
            }
        }

        let standalone: Vec<String> = state
            .ghosts
            .values()
            .filter(|g| g.companion_of.is_none() && g.similarity(signal) >= self.config.seen_cutoff)
            .map(|g| g.tag.clone())
            .collect();
        for tag in standalone {
            if let Some(id) = self.reinforce_locked(&mut state, &tag, signal) {
                report.ascended.push(id);
            }
        }

        report.ghosts_evicted = self.decay_unseen_locked(&mut state);

        let floor = self.config.prune_floor;
        let doomed: Vec<RelationId> = state
            .relations
            .values()
            .filter(|r| r.strength < floor)
            .map(|r| r.id)
            .collect();
        for id in doomed {
            remove_relation(&mut state, id);
            self.metrics.incr(names::RELATION_PRUNED, 1);
            debug!("pruned {} below floor {}", id, floor);
            report.pruned.push(id);
        }

        if self.config.tune_every > 0 && cycle % self.config.tune_every == 0 {
            self.autotune(&mut state);
        }

        report.context_ratio = state.window.ratio();
        report.window_size = state.window.capacity();
        self.metrics.gauge(names::CONTEXT_RATIO, report.context_ratio);
        report
    }

    /// Fold the companion ghost into its relation. Returns false if either
    /// side is gone.
    fn promote_companion(&self, state: &mut WatcherState, id: RelationId, tag: &str) -> bool {
        if !state.relations.contains_key(&id) || state.ghosts.remove(tag).is_none() {
            return false;
        }
        let cycle = state.cycle;
        let Some(mut relation) = state.relations.remove(&id) else {
            return false;
        };
        state.by_signature.remove(&relation.signature());
        relation.add_member(tag);
        relation.transient = false;
        relation.companion = None;
        relation.last_seen_cycle = cycle;
        state.window.push(relation.arity());
        state.events += 1;
        self.metrics.incr(names::RELATION_PROMOTED, 1);
        self.metrics.incr(names::GHOST_PROMOTED, 1);
        info!("{} promoted to higher order via ghost {}", id, tag);

        let signature = relation.signature();
        match state.by_signature.get(&signature).copied() {
            Some(other) => {
                if let Some(existing) = state.relations.get_mut(&other) {
                    existing.strength = existing.strength.max(relation.strength);
                    existing.priority_weight =
                        existing.priority_weight.max(relation.priority_weight);
                    existing.last_seen_cycle = cycle;
                }
            }
            None => {
                state.by_signature.insert(signature, id);
                state.relations.insert(id, relation);
            }
        }
        true
    }

    fn autotune(&self, state: &mut WatcherState) {
        let ctx = state.window.ratio();
        let saturation = state.window.minimal_fraction();
        let size = state.window.capacity();
        let cycle = state.cycle;
        let gap = self.config.drift_gap as f64 * (1.0 + ctx);
        let drifting = state
            .relations
            .values()
            .any(|r| r.age(cycle) as f64 > gap);

        let multiplier = self.config.window_multiplier.max(1.0);
        let resized = if saturation > 0.5 + 0.25 * ctx {
            (size as f64 * multiplier).ceil() as usize
        } else if drifting {
            (size as f64 / multiplier).floor() as usize
        } else {
            size
        }
        .clamp(self.config.window_min, self.config.window_max);

        if resized != size {
            state.window.resize(resized);
            debug!(
                "context window {} -> {} (saturation {:.2}, drift {})",
                size, resized, saturation, drifting
            );
        }
    }

    // ------------------------------------------------------------------
    // Agent-facing bookkeeping
    // ------------------------------------------------------------------

    /// Record that these relations were chosen this cycle.
    pub fn mark_used(&self, ids: &[RelationId]) {
        let mut state = self.lock();
        let cycle = state.cycle;
        let mut arities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = state.relations.get_mut(id) {
                r.last_seen_cycle = cycle;
                arities.push(r.arity());
            }
        }
        state.events += arities.len() as u64;
        for arity in arities {
            state.window.push(arity);
        }
    }

    /// Merge the members of `ids` into one higher-order relation. The
    /// originals are kept. Returns None when the union has fewer than three
    /// members.
    pub fn consolidate(&self, ids: &[RelationId]) -> Result<Option<RelationId>> {
        let mut state = self.lock();
        let mut members = Vec::new();
        let mut substructures = BTreeMap::new();
        let mut strength: f64 = 0.0;
        let mut priority: f64 = 0.0;
        for id in ids {
            let r = state.relations.get(id).ok_or(Error::UnknownRelation(id.0))?;
            members.extend(r.members.iter().cloned());
            substructures.extend(r.substructures.clone());
            strength = strength.max(r.strength);
            priority = priority.max(r.priority_weight);
        }
        members.sort();
        members.dedup();
        if members.len() < 3 {
            return Ok(None);
        }

        let id = self.insert(
            &mut state,
            Draft {
                members,
                substructures,
                strength,
                priority,
                transient: false,
                exempt: false,
                companion: false,
            },
        );
        self.metrics.incr(names::RELATION_PROMOTED, 1);
        info!("consolidated {:?} into {}", ids, id);
        Ok(Some(id))
    }

    // ------------------------------------------------------------------
    // Ghost lifecycle
    // ------------------------------------------------------------------

    /// Add a standalone ghost, or raise an existing one's strength.
    pub fn register_ghost(&self, tag: &str, origin: &[String], strength: f64) -> Result<()> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(Error::invalid_relation("ghost tag must not be empty"));
        }
        let mut state = self.lock();
        let cycle = state.cycle;
        let strength = finite_or_zero(strength).clamp(0.0, 1.0);
        match state.ghosts.get_mut(tag) {
            Some(g) => {
                g.strength = g.strength.max(strength);
                g.last_seen = cycle;
            }
            None => {
                debug!("ghost {} registered at {:.4}", tag, strength);
                state
                    .ghosts
                    .insert(tag.to_string(), Ghost::new(tag, origin.to_vec(), strength, cycle));
            }
        }
        Ok(())
    }

    /// Grow a ghost toward ascension. Returns the relation it ascended
    /// into, if it crossed the threshold.
    pub fn reinforce(&self, tag: &str, signal: &StateVector) -> Option<RelationId> {
        let mut state = self.lock();
        self.reinforce_locked(&mut state, tag, signal)
    }

    fn reinforce_locked(
        &self,
        state: &mut WatcherState,
        tag: &str,
        signal: &StateVector,
    ) -> Option<RelationId> {
        let cycle = state.cycle;
        let ghost = state.ghosts.get_mut(tag)?;
        // Aligned signals get the full growth factor, unrelated ones half.
        let alignment = ghost.similarity(signal).max(0.0);
        let factor = 1.0 + (self.config.ghost_growth - 1.0) * (0.5 + 0.5 * alignment);
        ghost.strength = (ghost.strength * factor).min(1.0);
        ghost.last_seen = cycle;
        if ghost.strength < self.config.ascension_threshold {
            return None;
        }
        self.ascend(state, tag)
    }

    fn ascend(&self, state: &mut WatcherState, tag: &str) -> Option<RelationId> {
        let ghost = state.ghosts.get(tag)?.clone();
        let cycle = state.cycle;

        if let Some(rid) = ghost.companion_of {
            if self.promote_companion(state, rid, tag) {
                return Some(rid);
            }
        }

        state.ghosts.remove(tag);
        let mut members = ghost.origin.clone();
        members.push(ghost.tag.clone());
        members.sort();
        members.dedup();
        let minimal = members.len() == 2;
        let id = if members.len() >= 2 {
            Some(self.insert(
                state,
                Draft {
                    members,
                    substructures: BTreeMap::new(),
                    strength: ghost.strength,
                    priority: 1.0_f64.min(self.config.max_priority),
                    transient: minimal,
                    exempt: false,
                    companion: false,
                },
            ))
        } else {
            None
        };
        self.metrics.incr(names::GHOST_PROMOTED, 1);
        info!("ghost {} ascended into {:?}", tag, id);

        if self.config.spawn_offspring {
            if let Some(child) = ghost.offspring(self.config.ghost_seed_strength, cycle) {
                if !state.ghosts.contains_key(&child.tag) {
                    debug!("ghost {} spawned offspring {}", tag, child.tag);
                    state.ghosts.insert(child.tag.clone(), child);
                }
            }
        }
        id
    }

    /// Decay ghosts unseen for longer than the drift gap; evict those that
    /// fall below the floor. Returns the number evicted.
    pub fn decay_unseen(&self) -> usize {
        let mut state = self.lock();
        self.decay_unseen_locked(&mut state)
    }

    fn decay_unseen_locked(&self, state: &mut WatcherState) -> usize {
        let cycle = state.cycle;
        let mut evicted = Vec::new();
        for ghost in state.ghosts.values_mut() {
            if ghost.unseen_for(cycle) > self.config.drift_gap {
                ghost.strength *= self.config.ghost_decay;
                if ghost.strength < self.config.ghost_floor {
                    evicted.push(ghost.tag.clone());
                }
            }
        }
        for tag in &evicted {
            if let Some(ghost) = state.ghosts.remove(tag) {
                if let Some(r) = ghost.companion_of.and_then(|id| state.relations.get_mut(&id)) {
                    r.companion = None;
                }
            }
            self.metrics.incr(names::GHOST_EVICTED, 1);
            debug!("ghost {} evicted", tag);
        }
        evicted.len()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn context_ratio(&self) -> f64 {
        self.lock().window.ratio()
    }

    pub fn relations(&self) -> Vec<Relation> {
        self.lock().relations.values().cloned().collect()
    }

    pub fn relation(&self, id: RelationId) -> Option<Relation> {
        self.lock().relations.get(&id).cloned()
    }

    pub fn ghost(&self, tag: &str) -> Option<Ghost> {
        self.lock().ghosts.get(tag).cloned()
    }

    pub fn ghosts(&self) -> Vec<Ghost> {
        self.lock().ghosts.values().cloned().collect()
    }

    pub fn cycle(&self) -> u64 {
        self.lock().cycle
    }

    pub fn decay_rate(&self) -> f64 {
        self.lock().decay_rate
    }

    pub fn window_size(&self) -> usize {
        self.lock().window.capacity()
    }

    pub fn len(&self) -> usize {
        self.lock().relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().relations.is_empty()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn to_snapshot(&self) -> WatcherSnapshot {
        let state = self.lock();
        WatcherSnapshot {
            version: SNAPSHOT_VERSION,
            relations: state.relations.values().cloned().collect(),
            ghosts: state.ghosts.clone(),
            window: state.window.entries(),
            window_size: state.window.capacity(),
            decay_rate: state.decay_rate,
            cycle: state.cycle,
            next_id: state.next_id,
            event_ema: state.event_ema,
        }
    }

    /// Rebuild a watcher from a snapshot. Out-of-range values are clamped;
    /// relations with fewer than two unique members are dropped, and
    /// companion links to anything missing are cleared.
    pub fn from_snapshot(snapshot: WatcherSnapshot, config: &WatcherConfig) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::SnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let watcher = Self::new(config)?;
        {
            let mut state = watcher.lock();
            let window_size = snapshot.window_size.clamp(config.window_min, config.window_max);
            state.window = ContextWindow::from_entries(snapshot.window, window_size);
            state.decay_rate = finite_or_zero(snapshot.decay_rate)
                .clamp(config.min_decay_rate, config.max_decay_rate);
            state.cycle = snapshot.cycle;
            state.event_ema = finite_or_zero(snapshot.event_ema).max(0.0);

            let mut max_id = 0;
            for mut relation in snapshot.relations {
                relation.members.sort();
                relation.members.dedup();
                if relation.members.len() < 2 {
                    warn!("snapshot relation {} dropped: too few members", relation.id);
                    continue;
                }
                relation.strength = finite_or_zero(relation.strength).clamp(0.0, 1.0);
                relation.priority_weight =
                    finite_or_zero(relation.priority_weight).clamp(0.0, config.max_priority);
                max_id = max_id.max(relation.id.0);
                state.by_signature.insert(relation.signature(), relation.id);
                state.relations.insert(relation.id, relation);
            }
            state.next_id = snapshot.next_id.max(max_id + 1);

            for (tag, mut ghost) in snapshot.ghosts {
                ghost.strength = finite_or_zero(ghost.strength).clamp(0.0, 1.0);
                if let Some(id) = ghost.companion_of {
                    if !state.relations.contains_key(&id) {
                        debug!("ghost {} lost its companion relation {}", tag, id);
                        ghost.companion_of = None;
                    }
                }
                state.ghosts.insert(tag, ghost);
            }
            let WatcherState {
                relations, ghosts, ..
            } = &mut *state;
            for relation in relations.values_mut() {
                if relation.companion.as_ref().is_some_and(|tag| !ghosts.contains_key(tag)) {
                    relation.companion = None;
                }
            }
            info!(
                "watcher restored: {} relations, {} ghosts, cycle {}",
                state.relations.len(),
                state.ghosts.len(),
                state.cycle
            );
        }
        Ok(watcher)
    }
}

fn remove_relation(state: &mut WatcherState, id: RelationId) -> Option<Relation> {
    let relation = state.relations.remove(&id)?;
    state.by_signature.remove(&relation.signature());
    if let Some(tag) = &relation.companion {
        state.ghosts.remove(tag);
    }
    Some(relation)
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
