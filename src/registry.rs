//! The typed subscriber table shared by both centers.
//!
//! One lock guards four parallel structures: per-[`TypeKey`] lists of owned
//! and observed handlers, a per-key map of callbacks keyed by
//! [`SubscriptionHandle`], and a global reverse index from handle to key.
//! Every operation is short; no user code ever runs under the registry lock.
//! Dispatch works from an iteration-safe `Snapshot` taken here.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::event::TypeKey;
use crate::handler::{ErasedCallback, ErasedHandler};

/// Identifier of a callback or static registration.
///
/// Handles are allocated monotonically for the lifetime of a center and are
/// never reused; zero is a valid handle. The only operation a handle supports
/// is unregistration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Returns the raw handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Subscribers registered for one event type.
///
/// `callbacks` is a `BTreeMap` so that iteration follows handle order, which
/// equals insertion order because handles are monotonic.
#[derive(Default)]
struct SubscriberSet {
    owned: Vec<Arc<dyn ErasedHandler>>,
    observed: Vec<Arc<dyn ErasedHandler>>,
    callbacks: BTreeMap<SubscriptionHandle, ErasedCallback>,
}

impl SubscriberSet {
    fn is_empty(&self) -> bool {
        self.owned.is_empty() && self.observed.is_empty() && self.callbacks.is_empty()
    }
}

#[derive(Default)]
struct Tables {
    subscribers: FxHashMap<TypeKey, SubscriberSet>,
    /// Reverse index kept in lockstep with the forward callback maps, so that
    /// unregistration by handle needs no linear search.
    handle_index: FxHashMap<SubscriptionHandle, TypeKey>,
    next_handle: u64,
}

/// Iteration-safe copies of one key's subscriber collections, taken under the
/// registry lock and consumed outside it.
#[derive(Default)]
pub(crate) struct Snapshot {
    pub(crate) owned: Vec<Arc<dyn ErasedHandler>>,
    pub(crate) observed: Vec<Arc<dyn ErasedHandler>>,
    pub(crate) callbacks: Vec<ErasedCallback>,
}

pub(crate) struct Registry {
    tables: Mutex<Tables>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    pub(crate) fn register_owned(&self, key: TypeKey, slot: Arc<dyn ErasedHandler>) {
        let mut tables = self.tables.lock().unwrap();
        tables.subscribers.entry(key).or_default().owned.push(slot);
    }

    pub(crate) fn register_observed(&self, key: TypeKey, slot: Arc<dyn ErasedHandler>) {
        let mut tables = self.tables.lock().unwrap();
        tables.subscribers.entry(key).or_default().observed.push(slot);
    }

    pub(crate) fn register_callback(
        &self,
        key: TypeKey,
        callback: ErasedCallback,
    ) -> SubscriptionHandle {
        let mut tables = self.tables.lock().unwrap();
        let handle = SubscriptionHandle(tables.next_handle);
        tables.next_handle += 1;
        tables
            .subscribers
            .entry(key)
            .or_default()
            .callbacks
            .insert(handle, callback);
        tables.handle_index.insert(handle, key);
        handle
    }

    /// Removes the first entry matching `target` from the owned list and from
    /// the observed list independently, and prunes expired observations while
    /// the lock is held.
    pub(crate) fn unregister_handler(&self, key: TypeKey, target: *const ()) {
        let mut tables = self.tables.lock().unwrap();
        let Some(set) = tables.subscribers.get_mut(&key) else {
            return;
        };
        if let Some(position) = set.owned.iter().position(|slot| slot.target() == target) {
            set.owned.remove(position);
        }
        if let Some(position) = set.observed.iter().position(|slot| slot.target() == target) {
            set.observed.remove(position);
        }
        set.observed.retain(|slot| !slot.expired());
        if set.is_empty() {
            tables.subscribers.remove(&key);
        }
    }

    /// Unknown handles are a silent no-op.
    pub(crate) fn unregister_handle(&self, handle: SubscriptionHandle) {
        let mut tables = self.tables.lock().unwrap();
        let Some(key) = tables.handle_index.remove(&handle) else {
            return;
        };
        let Some(set) = tables.subscribers.get_mut(&key) else {
            return;
        };
        set.callbacks.remove(&handle);
        if set.is_empty() {
            tables.subscribers.remove(&key);
        }
    }

    pub(crate) fn unregister_all(&self, key: TypeKey) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(set) = tables.subscribers.remove(&key) {
            for handle in set.callbacks.keys() {
                tables.handle_index.remove(handle);
            }
        }
    }

    pub(crate) fn snapshot(&self, key: TypeKey) -> Snapshot {
        let tables = self.tables.lock().unwrap();
        match tables.subscribers.get(&key) {
            Some(set) => Snapshot {
                owned: set.owned.clone(),
                observed: set.observed.clone(),
                callbacks: set.callbacks.values().cloned().collect(),
            },
            None => Snapshot::default(),
        }
    }

    /// Drops observed entries whose target no longer exists.
    pub(crate) fn prune_expired(&self, key: TypeKey) {
        let mut tables = self.tables.lock().unwrap();
        let Some(set) = tables.subscribers.get_mut(&key) else {
            return;
        };
        set.observed.retain(|slot| !slot.expired());
        if set.is_empty() {
            tables.subscribers.remove(&key);
        }
    }
}

#[cfg(test)]
impl Registry {
    /// (owned, observed, callbacks) counts for one key.
    pub(crate) fn subscriber_counts(&self, key: TypeKey) -> (usize, usize, usize) {
        let tables = self.tables.lock().unwrap();
        match tables.subscribers.get(&key) {
            Some(set) => (set.owned.len(), set.observed.len(), set.callbacks.len()),
            None => (0, 0, 0),
        }
    }

    pub(crate) fn handle_index_len(&self) -> usize {
        self.tables.lock().unwrap().handle_index.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Weak;

    use super::*;
    use crate::event::ErasedEvent;
    use crate::handler::{erase_callback, EventHandler, ObservedSlot, OwnedSlot};

    #[derive(Debug)]
    struct Sample(u32);

    #[derive(Default)]
    struct Recorder {
        seen: AtomicU32,
    }

    impl EventHandler<Sample> for Recorder {
        fn on_event(&self, event: &Sample) {
            self.seen.fetch_add(event.0, Ordering::SeqCst);
        }
    }

    fn key() -> TypeKey {
        TypeKey::of::<Sample>()
    }

    fn noop_callback() -> ErasedCallback {
        erase_callback(|_: &Sample| {})
    }

    #[test]
    fn handles_are_monotonic_and_unique() {
        let registry = Registry::new();
        let first = registry.register_callback(key(), noop_callback());
        let second = registry.register_callback(key(), noop_callback());
        assert!(second > first);

        registry.unregister_handle(first);
        let third = registry.register_callback(key(), noop_callback());
        assert!(third > second, "freed handles must never be reissued");
    }

    #[test]
    fn forward_map_and_reverse_index_stay_in_lockstep() {
        let registry = Registry::new();
        let handles: Vec<_> = (0..4)
            .map(|_| registry.register_callback(key(), noop_callback()))
            .collect();
        assert_eq!(registry.handle_index_len(), 4);
        assert_eq!(registry.subscriber_counts(key()).2, 4);

        registry.unregister_handle(handles[1]);
        assert_eq!(registry.handle_index_len(), 3);
        assert_eq!(registry.subscriber_counts(key()).2, 3);

        registry.unregister_all(key());
        assert_eq!(registry.handle_index_len(), 0);
        assert_eq!(registry.subscriber_counts(key()), (0, 0, 0));
    }

    #[test]
    fn unknown_handle_is_a_silent_noop() {
        let registry = Registry::new();
        let handle = registry.register_callback(key(), noop_callback());
        registry.unregister_handle(handle);
        // Unregistering twice must not disturb anything.
        registry.unregister_handle(handle);
        assert_eq!(registry.handle_index_len(), 0);
    }

    #[test]
    fn identity_unregistration_removes_first_occurrence_per_list() {
        let registry = Registry::new();
        let handler = Arc::new(Recorder::default());
        let target = Arc::as_ptr(&handler) as *const ();

        registry.register_owned(key(), Arc::new(OwnedSlot::<Sample, _>::new(handler.clone())));
        registry.register_owned(key(), Arc::new(OwnedSlot::<Sample, _>::new(handler.clone())));
        registry.register_observed(
            key(),
            Arc::new(ObservedSlot::<Sample, _>::new(Arc::downgrade(&handler))),
        );

        registry.unregister_handler(key(), target);
        assert_eq!(registry.subscriber_counts(key()), (1, 0, 0));

        registry.unregister_handler(key(), target);
        assert_eq!(registry.subscriber_counts(key()), (0, 0, 0));
    }

    #[test]
    fn pruning_drops_only_expired_observations() {
        let registry = Registry::new();
        let live = Arc::new(Recorder::default());
        let dead = Arc::new(Recorder::default());
        let dead_weak: Weak<Recorder> = Arc::downgrade(&dead);

        registry.register_observed(
            key(),
            Arc::new(ObservedSlot::<Sample, _>::new(Arc::downgrade(&live))),
        );
        registry.register_observed(key(), Arc::new(ObservedSlot::<Sample, _>::new(dead_weak)));

        drop(dead);
        registry.prune_expired(key());
        assert_eq!(registry.subscriber_counts(key()), (0, 1, 0));
    }

    #[test]
    fn snapshots_are_independent_of_later_mutation() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let handle = {
            let counter = Arc::clone(&counter);
            registry.register_callback(
                key(),
                erase_callback(move |event: &Sample| {
                    counter.fetch_add(event.0, Ordering::SeqCst);
                }),
            )
        };

        let snapshot = registry.snapshot(key());
        registry.unregister_handle(handle);

        for callback in &snapshot.callbacks {
            callback.call(&ErasedEvent::new(Sample(2)));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let empty = registry.snapshot(key());
        assert!(empty.owned.is_empty() && empty.observed.is_empty() && empty.callbacks.is_empty());
    }
}
