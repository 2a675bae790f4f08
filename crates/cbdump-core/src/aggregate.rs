//! Grouped callback counts.
//!
//! Counting and ordering are separate steps: [`Tally`] only accumulates, and
//! [`Tally::sorted`] produces the descending view (ties broken by key) and
//! applies the limit afterwards.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use tracing::debug;

use crate::error::FormatError;
use crate::snapshot::Snapshot;
use crate::walk::{CallbackRef, WalkStats};

/// Running count per key.
#[derive(Debug, Clone)]
pub struct Tally<K> {
    counts: HashMap<K, u64>,
}

impl<K> Default for Tally<K> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Ord + Copy> Tally<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn get(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Entries by descending count, then ascending key, truncated to `limit`.
    pub fn sorted(&self, limit: Option<usize>) -> Vec<(K, u64)> {
        let mut entries: Vec<(K, u64)> = self.counts.iter().map(|(k, c)| (*k, *c)).collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }
}

impl<K: Hash + Eq + Ord + Copy> FromIterator<K> for Tally<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for key in iter {
            tally.add(key);
        }
        tally
    }
}

/// Restricts which pairs are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairFilter {
    pub volume: Option<u32>,
    pub host: Option<u32>,
}

impl PairFilter {
    pub fn matches(&self, pair: &CallbackRef) -> bool {
        self.volume.is_none_or(|v| v == pair.file.volume)
            && self.host.is_none_or(|h| h == pair.callback.host_head)
    }
}

/// Everything one traversal of a snapshot produces.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub by_host_volume: Tally<(u32, u32)>,
    pub by_host: Tally<u32>,
    pub by_volume: Tally<u32>,
    /// Pairs counted (after filtering).
    pub pairs: u64,
    pub walk: WalkStats,
}

impl Aggregate {
    /// Folds one pair into all tables.
    pub fn record(&mut self, pair: &CallbackRef) {
        let host = pair.callback.host_head;
        let volume = pair.file.volume;
        self.by_host_volume.add((host, volume));
        self.by_host.add(host);
        self.by_volume.add(volume);
        self.pairs += 1;
    }

    pub fn distinct_hosts(&self) -> usize {
        self.by_host.len()
    }

    pub fn distinct_volumes(&self) -> usize {
        self.by_volume.len()
    }

    /// Walks `snapshot` once and counts every pair.
    pub fn collect(snapshot: &Snapshot) -> Result<Self, FormatError> {
        Self::collect_filtered(snapshot, PairFilter::default(), |_| {})
    }

    /// Walks `snapshot` once, counting pairs accepted by `filter` and handing
    /// each of them to `visit` in walk order.
    pub fn collect_filtered(
        snapshot: &Snapshot,
        filter: PairFilter,
        mut visit: impl FnMut(&CallbackRef),
    ) -> Result<Self, FormatError> {
        let mut agg = Aggregate::default();
        let mut walk = snapshot.walk();
        for pair in walk.by_ref() {
            let pair = pair?;
            if filter.matches(&pair) {
                agg.record(&pair);
                visit(&pair);
            }
        }
        agg.walk = walk.stats();
        debug!(
            pairs = agg.pairs,
            hosts = agg.distinct_hosts(),
            volumes = agg.distinct_volumes(),
            "aggregate: walk complete"
        );
        Ok(agg)
    }
}
