//! The keyed slot store underneath the registry.
//!
//! Each cached entity lives in a [Slot]: an atomically swappable value plus a per-key populate
//! lock. Readers only ever touch the [arc_swap::ArcSwapOption], so lookups of a fresh entry are
//! lock-free; writers (the populate path and the refresh sweep) serialize on the slot's own
//! mutex, never on a store-wide lock. The [Store] itself is just the map of slots - a slot,
//! once created for a key, is never removed, which is what lets late callers of a concurrent
//! population simply re-check the slot after acquiring its lock.
#[cfg(test)]
use mock_instant::global::Instant;
#[cfg(not(test))]
use std::time::Instant;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A value together with its cache bookkeeping.
pub struct Cached<T> {
    value: T,
    last_updated: DateTime<Utc>,
    fetched_at: Instant,
}

impl<T> Cached<T> {
    /// Returns the cached value itself.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the wall-clock instant at which this value was stored.
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

/// Holds one cache entry: the current value (if any) and the populate lock for its key.
pub struct Slot<T> {
    populate: tokio::sync::Mutex<()>,
    value: ArcSwapOption<Cached<T>>,
    stale: AtomicBool,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Slot {
            populate: tokio::sync::Mutex::new(()),
            value: ArcSwapOption::new(None),
            stale: AtomicBool::new(false),
        }
    }

    /// Returns the current value regardless of its age. This is what the stale-if-error
    /// fallback serves.
    pub fn current(&self) -> Option<Arc<Cached<T>>> {
        self.value.load_full()
    }

    /// Returns the current value only if it may still be served without consulting the
    /// directory: not invalidated, not older than `ttl`, and caching enabled at all.
    pub fn fresh(&self, ttl: Duration) -> Option<Arc<Cached<T>>> {
        if ttl.is_zero() || self.stale.load(Ordering::Acquire) {
            return None;
        }

        self.current().filter(|cached| !cached.expired(ttl))
    }

    /// Determines if this slot holds a value which the refresh sweep should renew.
    pub fn needs_refresh(&self, ttl: Duration) -> bool {
        match self.current() {
            Some(cached) => self.stale.load(Ordering::Acquire) || cached.expired(ttl),
            None => false,
        }
    }

    /// Swaps in a freshly resolved value and returns the stored entry.
    ///
    /// `last_updated` is taken from the wall clock but never moves backwards relative to the
    /// previous entry, so observers see a monotonic update timestamp.
    pub fn store(&self, value: T) -> Arc<Cached<T>> {
        let mut last_updated = Utc::now();
        if let Some(previous) = self.current() {
            last_updated = last_updated.max(previous.last_updated);
        }

        let cached = Arc::new(Cached {
            value,
            last_updated,
            fetched_at: Instant::now(),
        });
        self.value.store(Some(cached.clone()));
        self.stale.store(false, Ordering::Release);

        cached
    }

    /// Marks the entry as stale so that the next access or sweep repopulates it. The current
    /// value stays available as fallback.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// Acquires the populate lock of this slot.
    ///
    /// Callers are expected to re-check [fresh](Slot::fresh) once the lock is held, as a
    /// concurrent populate might have completed while waiting.
    pub async fn begin_populate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.populate.lock().await
    }
}

/// Maps keys to their slots.
pub struct Store<T> {
    slots: Mutex<HashMap<String, Arc<Slot<T>>>>,
}

impl<T> Store<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Store {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the slot for the given key, creating it if this key is seen for the first time.
    pub fn slot(&self, key: &str) -> Arc<Slot<T>> {
        let mut slots = self.slots.lock().unwrap();
        match slots.get(key) {
            Some(slot) => slot.clone(),
            None => {
                let slot = Arc::new(Slot::new());
                let _ = slots.insert(key.to_owned(), slot.clone());
                slot
            }
        }
    }

    /// Returns the slot for the given key without creating one.
    pub fn peek(&self, key: &str) -> Option<Arc<Slot<T>>> {
        self.slots.lock().unwrap().get(key).cloned()
    }

    /// Removes the mapping for the given key if it still points at this slot and the slot
    /// never received a value.
    ///
    /// This keeps failed lookups for arbitrary identifiers from registering phantom keys: the
    /// slot is created up front so that concurrent misses share one population, but if that
    /// population yields nothing, the key must not surface in listings (or accumulate in the
    /// map) afterwards.
    pub fn discard_if_empty(&self, key: &str, slot: &Arc<Slot<T>>) {
        let mut slots = self.slots.lock().unwrap();
        let matches = slots
            .get(key)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false);
        if matches && slot.current().is_none() {
            let _ = slots.remove(key);
        }
    }

    /// Re-registers a slot under the given key unless another one took its place.
    ///
    /// A caller which was waiting on a population that failed (and whose slot was therefore
    /// discarded) may still resolve successfully afterwards; its value must become visible
    /// under the key again.
    pub fn register(&self, key: &str, slot: &Arc<Slot<T>>) {
        let mut slots = self.slots.lock().unwrap();
        let _ = slots.entry(key.to_owned()).or_insert_with(|| slot.clone());
    }

    /// Enumerates all known keys in sorted order, so that listings are stable.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns all slots together with their keys, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, Arc<Slot<T>>)> {
        let mut entries: Vec<(String, Arc<Slot<T>>)> = self
            .slots
            .lock()
            .unwrap()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();
        entries.sort_by(|(left, _), (right, _)| left.cmp(right));
        entries
    }
}
