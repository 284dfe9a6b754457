// Budfs generative filesystem overlay.
// Copyright 2025 Martin Pool.

//! Tallies of overlay events: cache traffic, producer runs, evictions.

use std::fmt::{self, Debug};
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// One kind of overlay event.
#[derive(Debug, Clone, Copy, Eq, PartialEq, EnumIter)]
pub enum Counter {
    /// A producer callback actually ran.
    ///
    /// Includes re-runs after invalidation, but not reads served from
    /// cache.
    ProducerRuns,
    /// A read was answered from the entry cache.
    CacheHits,
    /// A read found no cached entry.
    CacheMisses,
    /// A cache entry was evicted by a change sweep or a rebind.
    Invalidations,
    /// An operation consulted the backing filesystem.
    BackingReads,
    /// A deferred hook ran at close.
    DeferredHooks,
}

/// Atomic tallies of overlay events.
///
/// Every overlay event is a single increment: there is no bulk add and no
/// way to write an absolute value, so a tally only ever grows.
#[derive(Default)]
pub struct Counters {
    producer_runs: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    invalidations: AtomicUsize,
    backing_reads: AtomicUsize,
    deferred_hooks: AtomicUsize,
}

impl Counters {
    fn tally(&self, counter: Counter) -> &AtomicUsize {
        match counter {
            Counter::ProducerRuns => &self.producer_runs,
            Counter::CacheHits => &self.cache_hits,
            Counter::CacheMisses => &self.cache_misses,
            Counter::Invalidations => &self.invalidations,
            Counter::BackingReads => &self.backing_reads,
            Counter::DeferredHooks => &self.deferred_hooks,
        }
    }

    /// Record one event.
    pub fn inc(&self, counter: Counter) {
        self.tally(counter).fetch_add(1, Relaxed);
    }

    /// Read one tally.
    pub fn get(&self, counter: Counter) -> usize {
        self.tally(counter).load(Relaxed)
    }

    /// Every tally at one moment, for logging or assertions.
    pub fn snapshot(&self) -> Vec<(Counter, usize)> {
        Counter::iter().map(|c| (c, self.get(c))).collect()
    }
}

impl Debug for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Idle tallies are noise; show only what moved.
        f.debug_map()
            .entries(self.snapshot().into_iter().filter(|(_, n)| *n > 0))
            .finish()
    }
}
