use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identity of a candidate pair, independent of which side each record is on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <> {}", self.first, self.second)
    }
}

/// Pairs merged or rejected during the current run.
#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    pairs: HashSet<PairKey>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the pair was already recorded.
    pub fn insert(&mut self, key: PairKey) -> bool {
        self.pairs.insert(key)
    }

    pub fn contains(&self, key: &PairKey) -> bool {
        self.pairs.contains(key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Failed attempts per pair during the current run.
#[derive(Debug, Clone, Default)]
pub struct FailureLedger {
    counts: HashMap<PairKey, u32>,
}

impl FailureLedger {
    /// Record one failure; returns the new total for the pair.
    pub fn record(&mut self, key: &PairKey) -> u32 {
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, key: &PairKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }
}
