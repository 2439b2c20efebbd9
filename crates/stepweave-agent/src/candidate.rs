//! Candidate paths and bounded enumeration
//!
//! The relation pool is first cut to a beam of the heaviest relations, then
//! unordered combinations of size 1..=depth are generated in lexicographic
//! order until the path cap is reached.

use stepweave_core::sha256_hex;
use stepweave_watcher::{Relation, RelationId};

/// A relation together with the watcher it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct PathRelation {
    pub watcher: usize,
    pub relation: Relation,
    /// Cycles since the relation was last seen, on its watcher's clock.
    pub age: u64,
    pub max_priority: f64,
}

impl PathRelation {
    pub fn clamped_priority(&self) -> f64 {
        self.relation.priority_weight.clamp(0.0, self.max_priority)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathCandidate {
    pub relations: Vec<PathRelation>,
    signature: String,
}

impl PathCandidate {
    pub fn new(relations: Vec<PathRelation>) -> Self {
        let signature = path_signature(&relations);
        Self {
            relations,
            signature,
        }
    }

    /// Stable key for synergy memory; independent of relation order.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Relation ids grouped by watcher index.
    pub fn ids_for(&self, watcher: usize) -> Vec<RelationId> {
        self.relations
            .iter()
            .filter(|p| p.watcher == watcher)
            .map(|p| p.relation.id)
            .collect()
    }

    /// Every distinct tag in the path, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .relations
            .iter()
            .flat_map(|p| p.relation.members.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }
}

fn path_signature(relations: &[PathRelation]) -> String {
    let mut parts: Vec<String> = relations
        .iter()
        .map(|p| format!("{}:{}", p.watcher, p.relation.signature()))
        .collect();
    parts.sort();
    sha256_hex(parts.join("|").as_bytes())[..16].to_string()
}

/// `strength × (1 + curvature_bias) × clamp(priority)`, reduced for
/// transient or minimal relations.
pub fn relation_weight(p: &PathRelation, curvature_bias: f64) -> f64 {
    let r = &p.relation;
    let mut weight = r.strength * (1.0 + curvature_bias) * p.clamped_priority();
    if r.transient || r.is_minimal() {
        weight *= 0.9;
    }
    weight
}

/// Combinations of the `beam_width` heaviest relations, sizes 1..=`depth`,
/// at most `max_paths` in total.
pub fn enumerate_paths(
    mut pool: Vec<PathRelation>,
    depth: usize,
    beam_width: usize,
    max_paths: usize,
    curvature_bias: f64,
) -> Vec<PathCandidate> {
    pool.sort_by(|a, b| {
        relation_weight(b, curvature_bias)
            .total_cmp(&relation_weight(a, curvature_bias))
            .then(a.watcher.cmp(&b.watcher))
            .then(a.relation.id.cmp(&b.relation.id))
    });
    pool.truncate(beam_width);

    let mut paths = Vec::new();
    for k in 1..=depth.min(pool.len()) {
        let mut idx: Vec<usize> = (0..k).collect();
        loop {
            if paths.len() >= max_paths {
                return paths;
            }
            paths.push(PathCandidate::new(idx.iter().map(|&i| pool[i].clone()).collect()));

            // Advance to the next k-combination.
            let n = pool.len();
            let Some(pos) = (0..k).rev().find(|&i| idx[i] < n - k + i) else {
                break;
            };
            idx[pos] += 1;
            for j in pos + 1..k {
                idx[j] = idx[j - 1] + 1;
            }
        }
    }
    paths
}
