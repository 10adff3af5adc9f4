//! Tab-keyed, generation-scoped URL -> IP facts.
//!
//! Every entry point takes the lock once, so a reader sees a tab either
//! before or after a whole write, never in between. A navigation begins a
//! new generation which empties the tab's facts before the listener for
//! that navigation is registered.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use tabtrace_core::{now_millis, Fact, TabId, TimingRecord};

/// Conceptual lifecycle of a tab. A tab with no state at all has been
/// evicted (or was never seen).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TabPhase {
    Idle,
    Observing,
    Assembled,
}

/// Result of offering a fact to the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored(Fact),
    /// No generation has begun for the tab (never navigated or evicted).
    NoGeneration,
    /// The host completion time predates the current generation.
    Stale,
    /// The generation already holds the maximum number of distinct URLs.
    CapReached,
}

#[derive(Clone, Copy, Debug)]
struct Generation {
    id: u64,
    started_at: i64,
}

#[derive(Debug)]
struct TabSlot {
    generation: Option<Generation>,
    facts: HashMap<String, Fact>,
    record: Option<TimingRecord>,
    phase: TabPhase,
}

impl TabSlot {
    fn empty() -> Self {
        Self {
            generation: None,
            facts: HashMap::new(),
            record: None,
            phase: TabPhase::Idle,
        }
    }
}

#[derive(Default)]
struct Inner {
    tabs: HashMap<TabId, TabSlot>,
    /// Tabs evicted since startup whose durable rows may still exist.
    evicted: HashSet<TabId>,
    next_generation: u64,
}

/// Counts exposed through the stats query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub tabs: usize,
    pub facts: usize,
    pub records: usize,
}

pub struct CorrelationCache {
    inner: RwLock<Inner>,
    max_urls_per_tab: usize,
}

impl CorrelationCache {
    pub fn new(max_urls_per_tab: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_urls_per_tab,
        }
    }

    /// Discard the tab's facts and open a fresh generation. The previous
    /// timing record is kept until the next one overwrites it.
    pub fn begin_generation(&self, tab_id: TabId) -> u64 {
        let mut inner = self.inner.write();
        inner.next_generation += 1;
        let generation = Generation {
            id: inner.next_generation,
            started_at: now_millis(),
        };

        inner.evicted.remove(&tab_id);
        let slot = inner.tabs.entry(tab_id).or_insert_with(TabSlot::empty);
        slot.facts.clear();
        slot.generation = Some(generation);
        slot.phase = TabPhase::Observing;
        debug!(%tab_id, generation = generation.id, "generation begun");
        generation.id
    }

    /// Insert or overwrite the fact for `(tab_id, url)`.
    ///
    /// `host_time` is the host's completion timestamp in epoch
    /// milliseconds, when it supplied one.
    pub fn record(&self, tab_id: TabId, url: &str, ip: &str, host_time: Option<f64>) -> RecordOutcome {
        let mut inner = self.inner.write();
        let Some(slot) = inner.tabs.get_mut(&tab_id) else {
            return RecordOutcome::NoGeneration;
        };
        let Some(generation) = slot.generation else {
            return RecordOutcome::NoGeneration;
        };

        if host_time.is_some_and(|t| (t as i64) < generation.started_at) {
            return RecordOutcome::Stale;
        }
        if !slot.facts.contains_key(url) && slot.facts.len() >= self.max_urls_per_tab {
            return RecordOutcome::CapReached;
        }

        let fact = Fact::new(tab_id, url, ip);
        slot.facts.insert(url.to_string(), fact.clone());
        RecordOutcome::Stored(fact)
    }

    /// Copy of the current generation's facts, or `None` when the tab has
    /// no generation in memory.
    pub fn snapshot(&self, tab_id: TabId) -> Option<HashMap<String, String>> {
        let inner = self.inner.read();
        let slot = inner.tabs.get(&tab_id)?;
        slot.generation?;
        Some(
            slot.facts
                .iter()
                .map(|(url, fact)| (url.clone(), fact.ip.clone()))
                .collect(),
        )
    }

    /// Store the assembled record for its tab and mark the tab assembled.
    pub fn store_record(&self, record: TimingRecord) {
        let mut inner = self.inner.write();
        inner.evicted.remove(&record.tab_id);
        let slot = inner.tabs.entry(record.tab_id).or_insert_with(TabSlot::empty);
        if slot.generation.is_some() {
            slot.phase = TabPhase::Assembled;
        }
        slot.record = Some(record);
    }

    pub fn record_for(&self, tab_id: TabId) -> Option<TimingRecord> {
        self.inner.read().tabs.get(&tab_id)?.record.clone()
    }

    pub fn phase(&self, tab_id: TabId) -> Option<TabPhase> {
        self.inner.read().tabs.get(&tab_id).map(|slot| slot.phase)
    }

    pub fn has_generation(&self, tab_id: TabId) -> bool {
        self.inner
            .read()
            .tabs
            .get(&tab_id)
            .is_some_and(|slot| slot.generation.is_some())
    }

    /// Drop every fact and the record for the tab. Returns whether any
    /// state existed.
    ///
    /// The tab stays marked as evicted until a new generation or record
    /// arrives, or [`forget_eviction`](Self::forget_eviction) confirms its
    /// durable rows are gone.
    pub fn evict(&self, tab_id: TabId) -> bool {
        let mut inner = self.inner.write();
        inner.evicted.insert(tab_id);
        inner.tabs.remove(&tab_id).is_some()
    }

    /// Whether the tab was evicted and nothing has replaced its state since.
    /// Durable rows of such a tab must not be served.
    pub fn is_evicted(&self, tab_id: TabId) -> bool {
        self.inner.read().evicted.contains(&tab_id)
    }

    pub fn forget_eviction(&self, tab_id: TabId) {
        self.inner.write().evicted.remove(&tab_id);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            tabs: inner.tabs.len(),
            facts: inner.tabs.values().map(|slot| slot.facts.len()).sum(),
            records: inner.tabs.values().filter(|slot| slot.record.is_some()).count(),
        }
    }
}
