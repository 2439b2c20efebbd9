//! Tick journal: bounded, tamper-evident event ring buffer
//!
//! Ticks are accepted strictly in sequence order. Each accepted tick becomes
//! a payload plus a SHA-256 integrity tag; re-hashing the stored payloads
//! exposes any corruption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use stepweave_core::metrics::names;
use stepweave_core::{sha256_hex, JournalConfig, MemoryProvider, MetricsSink, Tick};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence_id: u64,
    pub payload: Vec<u8>,
    pub integrity_tag: String,
}

impl JournalEntry {
    pub fn verify(&self) -> bool {
        sha256_hex(&self.payload) == self.integrity_tag
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// `sequence_id` not above the last accepted id.
    Stale { last: u64 },
    Auth(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted { sequence_id: u64, truncated: bool },
    Rejected(RejectReason),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalStats {
    pub entries: usize,
    pub last_sequence_id: Option<u64>,
    pub stale_rejections: u64,
    pub auth_failures: u64,
    pub truncations: u64,
    pub evictions: u64,
}

/// What gets hashed and stored for an accepted tick.
#[derive(Serialize)]
struct PayloadRecord<'a> {
    sequence_id: u64,
    tag: &'a str,
    source_hash: &'a str,
    source_verified: bool,
    timestamp: DateTime<Utc>,
    related: Vec<String>,
}

#[derive(Debug)]
pub struct Journal {
    entries: VecDeque<JournalEntry>,
    capacity: usize,
    stats: JournalStats,
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(4_096)),
            capacity: capacity.max(1),
            stats: JournalStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> JournalStats {
        JournalStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    pub fn ingest(
        &mut self,
        tick: &Tick,
        config: &JournalConfig,
        memory: Option<&dyn MemoryProvider>,
        metrics: &dyn MetricsSink,
    ) -> IngestOutcome {
        if let Some(last) = self.stats.last_sequence_id {
            if tick.sequence_id <= last {
                self.stats.stale_rejections += 1;
                metrics.incr(names::SEQUENCE_REJECTED, 1);
                debug!("tick {} rejected: last accepted {}", tick.sequence_id, last);
                return IngestOutcome::Rejected(RejectReason::Stale { last });
            }
        }

        if let (Some(secret), false) = (config.auth_secret.as_deref(), config.low_latency) {
            if let Err(e) = tick.verify_auth(secret) {
                self.stats.auth_failures += 1;
                metrics.incr(names::AUTH_FAILURES, 1);
                warn!("tick {} dropped: {}", tick.sequence_id, e);
                return IngestOutcome::Rejected(RejectReason::Auth(e.to_string()));
            }
        }

        let related = match memory {
            Some(m) if config.enrich_top_k > 0 => m.retrieve(&tick.tag, config.enrich_top_k),
            _ => Vec::new(),
        };
        let record = PayloadRecord {
            sequence_id: tick.sequence_id,
            tag: &tick.tag,
            source_hash: &tick.integrity_hash,
            source_verified: sha256_hex(tick.tag.as_bytes()) == tick.integrity_hash,
            timestamp: tick.timestamp,
            related,
        };
        let mut payload =
            serde_json::to_vec(&record).unwrap_or_else(|_| tick.tag.clone().into_bytes());

        let truncated = payload.len() > config.max_payload_bytes;
        if truncated {
            info!(
                "tick {} payload truncated {} -> {} bytes",
                tick.sequence_id,
                payload.len(),
                config.max_payload_bytes
            );
            payload.truncate(config.max_payload_bytes);
            self.stats.truncations += 1;
            metrics.incr(names::JOURNAL_TRUNCATED, 1);
        }

        let entry = JournalEntry {
            sequence_id: tick.sequence_id,
            integrity_tag: sha256_hex(&payload),
            payload,
        };
        self.push(entry, metrics);
        self.stats.last_sequence_id = Some(tick.sequence_id);
        IngestOutcome::Accepted {
            sequence_id: tick.sequence_id,
            truncated,
        }
    }

    fn push(&mut self, entry: JournalEntry, metrics: &dyn MetricsSink) {
        while self.entries.len() >= self.capacity {
            if let Some(old) = self.entries.pop_front() {
                self.stats.evictions += 1;
                metrics.incr(names::JOURNAL_EVICTED, 1);
                debug!("journal evicted entry {}", old.sequence_id);
            }
        }
        self.entries.push_back(entry);
    }

    pub fn export_entries(&self) -> Vec<JournalEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Sequence ids whose payload no longer matches its integrity tag.
    pub fn verify_entries(&self) -> Vec<u64> {
        corrupted(self.entries.iter())
    }

    /// Replace the buffer with previously exported entries. Entries are
    /// kept in sequence order; the newest `capacity` survive. Integrity is
    /// not re-checked here so tampering stays visible to `verify_entries`.
    /// The last accepted sequence id never moves backwards.
    pub fn import_entries(&mut self, mut entries: Vec<JournalEntry>) {
        entries.sort_by_key(|e| e.sequence_id);
        entries.dedup_by_key(|e| e.sequence_id);
        let skip = entries.len().saturating_sub(self.capacity);
        self.entries = entries.into_iter().skip(skip).collect();
        self.stats.last_sequence_id = self
            .stats
            .last_sequence_id
            .max(self.entries.back().map(|e| e.sequence_id));
    }
}

/// Sequence ids in `entries` that fail verification.
pub fn corrupted<'a>(entries: impl IntoIterator<Item = &'a JournalEntry>) -> Vec<u64> {
    entries
        .into_iter()
        .filter(|e| !e.verify())
        .map(|e| e.sequence_id)
        .collect()
}
