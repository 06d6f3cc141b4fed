use crate::{
    data::{Exemplar, Labels},
    instrument::{Counter, Registry},
};
use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use parking_lot::RwLock;
use thiserror::Error;

/// Marks the end of a per-series chain in the ring.
const SENTINEL: usize = usize::MAX;

/// Errors surfaced by [`CircularExemplarStore::add_exemplar`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ExemplarError {
    /// The exemplar's timestamp is not newer than the series' current tail.
    #[error("out of order exemplar")]
    OutOfOrder,
}

struct ExemplarMetrics {
    out_of_order: Counter,
}

impl ExemplarMetrics {
    fn new(registry: &Registry) -> ExemplarMetrics {
        ExemplarMetrics {
            out_of_order: registry.counter("spillway_exemplar_out_of_order_total", &[]),
        }
    }
}

/// A slot in the ring.
///
/// `next` holds the slot index of the same series' next-newer exemplar, or
/// `SENTINEL` at the chain tail.  Chains are raw indices into the arena, never
/// owning pointers.
struct CircularBufferEntry {
    exemplar: Exemplar,
    series: Labels,
    next: usize,
}

/// Where a series' oldest and newest live entries sit in the ring.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct IndexEntry {
    first: usize,
    last: usize,
}

struct StoreInner {
    exemplars: Vec<Option<CircularBufferEntry>>,
    next_index: usize,
    index: HashMap<String, IndexEntry, FnvBuildHasher>,
}

/// Fixed-capacity in-memory exemplar storage.
///
/// Exemplars live in a circular buffer; a per-series index chains each
/// series' entries oldest to newest through the intrusive `next` links.  When
/// the ring wraps, the displaced entry's series index is repaired before the
/// slot is reused, so every indexed series always reaches a valid chain.
///
/// One reader/writer lock covers the buffer and the index: `select` shares it,
/// `add_exemplar` and `reset` take it exclusively.
pub struct CircularExemplarStore {
    metrics: ExemplarMetrics,
    inner: RwLock<StoreInner>,
}

impl CircularExemplarStore {
    /// Creates a store holding at most `capacity` exemplars.
    ///
    /// A capacity of zero disables the store: `add_exemplar` accepts and
    /// discards everything, `select` always comes back empty.  This is the
    /// configuration off-switch for exemplar storage.
    pub fn new(capacity: usize, registry: &Registry) -> CircularExemplarStore {
        let mut exemplars = Vec::with_capacity(capacity);
        exemplars.resize_with(capacity, || None);

        CircularExemplarStore {
            metrics: ExemplarMetrics::new(registry),
            inner: RwLock::new(StoreInner {
                exemplars,
                next_index: 0,
                index: HashMap::default(),
            }),
        }
    }

    /// Appends an exemplar to the given series.
    ///
    /// An exemplar equal to the series' current tail is accepted and
    /// discarded; repeated scrapes re-deliver the tail and appending it again
    /// is a no-op.  An exemplar whose timestamp is not strictly newer than the
    /// tail's fails with [`ExemplarError::OutOfOrder`].
    pub fn add_exemplar(&self, series: &Labels, e: Exemplar) -> Result<(), ExemplarError> {
        let mut inner = self.inner.write();
        if inner.exemplars.is_empty() {
            return Ok(());
        }

        let key = series.canonical();
        let existing = inner.index.get(&key).copied();

        if let Some(entry) = existing {
            let last = inner.exemplars[entry.last]
                .as_ref()
                .expect("indexed slot is occupied");
            if last.exemplar.equals(&e) {
                return Ok(());
            }
            if e.ts <= last.exemplar.ts {
                self.metrics.out_of_order.inc();
                return Err(ExemplarError::OutOfOrder);
            }
        }

        // The eviction can remove or rewrite this series' own index entry
        // when the ring wraps onto its chain; the linking below goes by the
        // pre-eviction copy in `existing`.
        let slot = inner.next_index;
        inner.index_gc(slot);
        inner.exemplars[slot] = Some(CircularBufferEntry {
            exemplar: e,
            series: series.clone(),
            next: SENTINEL,
        });

        match existing {
            None => {
                inner.index.insert(key, IndexEntry { first: slot, last: slot });
            },
            Some(old) => {
                if old.last != slot {
                    inner.exemplars[old.last]
                        .as_mut()
                        .expect("chain tail slot is occupied")
                        .next = slot;
                }
                let entry = inner
                    .index
                    .entry(key)
                    .or_insert(IndexEntry { first: slot, last: slot });
                entry.last = slot;
            },
        }

        inner.next_index = (inner.next_index + 1) % inner.exemplars.len();
        Ok(())
    }

    /// Returns, in insertion order, the series' exemplars with timestamps in
    /// `start..=end` (both ends inclusive).
    ///
    /// Insertion order is timestamp-ascending by the store's append rules.
    pub fn select(&self, start: i64, end: i64, series: &Labels) -> Vec<Exemplar> {
        let inner = self.inner.read();
        let mut out = Vec::new();

        let entry = match inner.index.get(&series.canonical()) {
            Some(entry) => entry,
            None => return out,
        };

        // A chain is at most `capacity` long; bounding the walk keeps a
        // corrupted historical buffer state from looping forever.
        let mut i = entry.first;
        for _ in 0..inner.exemplars.len() {
            let e = match inner.exemplars[i].as_ref() {
                Some(e) => e,
                None => break,
            };
            if e.exemplar.ts > end {
                break;
            }
            if e.exemplar.ts >= start {
                out.push(e.exemplar.clone());
            }
            if e.next == SENTINEL {
                break;
            }
            i = e.next;
        }
        out
    }

    /// Drops every stored exemplar and clears the index.  For use in tests.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        for slot in inner.exemplars.iter_mut() {
            *slot = None;
        }
        inner.index.clear();
        inner.next_index = 0;
    }
}

impl StoreInner {
    /// Repairs the index for the series occupying `slot` before the slot is
    /// overwritten: the series' `first` advances to the displaced entry's
    /// successor, or the series leaves the index when the displaced entry is
    /// its tail.  A displaced slot whose series is already unindexed is left
    /// alone rather than resurrected.
    fn index_gc(&mut self, slot: usize) {
        let (key, next) = match self.exemplars[slot].as_ref() {
            Some(entry) => (entry.series.canonical(), entry.next),
            None => return,
        };

        if next == SENTINEL {
            self.index.remove(&key);
        } else if let Some(entry) = self.index.get_mut(&key) {
            entry.first = next;
        }
    }
}
