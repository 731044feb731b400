//! The synchronous event center.
//!
//! [`SyncEventCenter`] shares the asynchronous center's data model but owns
//! only a registry: `publish` dispatches inline on the caller's thread before
//! returning. There is no worker, so the timed publication variants have
//! nothing to honor them and are dropped.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::dispatch::dispatch;
use crate::event::{ErasedEvent, Event, TypeKey};
use crate::handler::{erase_callback, EventHandler, ObservedSlot, OwnedSlot, StaticHandler};
use crate::registry::{Registry, SubscriptionHandle};
use crate::LOG_TARGET;

static INSTANCE: Mutex<Option<SyncEventCenter>> = Mutex::new(None);

/// Cheaply clonable handle to the process-wide synchronous event center.
#[derive(Clone)]
pub struct SyncEventCenter {
    registry: Arc<Registry>,
}

impl SyncEventCenter {
    /// Returns the current singleton, creating a fresh one if none exists.
    pub fn instance() -> SyncEventCenter {
        INSTANCE
            .lock()
            .unwrap()
            .get_or_insert_with(SyncEventCenter::fresh)
            .clone()
    }

    /// Releases the singleton. A subsequent [`instance`](Self::instance) call
    /// returns a fresh center with an empty registry.
    pub fn destroy() {
        INSTANCE.lock().unwrap().take();
    }

    fn fresh() -> SyncEventCenter {
        SyncEventCenter {
            registry: Arc::new(Registry::new()),
        }
    }

    /// Dispatches `event` to every subscriber inline, on the calling thread.
    pub fn publish<E: Event>(&self, event: E) {
        self.submit_erased(ErasedEvent::new(event));
    }

    /// Dropped: the synchronous center has no worker to honor a delay.
    pub fn publish_delayed<E: Event>(&self, _event: E, _delay: Duration) {
        debug!(
            target: LOG_TARGET,
            "discarding delayed publication of {}: synchronous center has no worker",
            TypeKey::of::<E>(),
        );
    }

    /// Dropped: the synchronous center has no worker to honor a deadline.
    pub fn publish_at<E: Event>(&self, _event: E, _deadline: Instant) {
        debug!(
            target: LOG_TARGET,
            "discarding timed publication of {}: synchronous center has no worker",
            TypeKey::of::<E>(),
        );
    }

    /// Nothing is ever queued, so there is nothing to cancel.
    pub fn cancel_all(&self) {}

    pub(crate) fn submit_erased(&self, event: ErasedEvent) {
        dispatch(&self.registry, &event);
    }

    /// Registers a handler object the center holds strongly until it is
    /// explicitly unregistered.
    pub fn register_owned<E, H>(&self, handler: Arc<H>)
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.registry
            .register_owned(TypeKey::of::<E>(), Arc::new(OwnedSlot::<E, H>::new(handler)));
    }

    /// Registers a handler object the center only observes.
    pub fn register_observed<E, H>(&self, handler: &Arc<H>)
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.registry.register_observed(
            TypeKey::of::<E>(),
            Arc::new(ObservedSlot::<E, H>::new(Arc::downgrade(handler))),
        );
    }

    /// Registers a value-captured callback and returns its handle.
    pub fn register_callback<E>(
        &self,
        callback: impl Fn(&E) + Send + Sync + 'static,
    ) -> SubscriptionHandle
    where
        E: Event,
    {
        self.registry
            .register_callback(TypeKey::of::<E>(), erase_callback(callback))
    }

    /// Registers the event type's own static dispatch function as a callback.
    pub fn register_static<E: StaticHandler>(&self) -> SubscriptionHandle {
        self.register_callback::<E>(E::on_event)
    }

    /// Removes `handler` from the owned and observed lists for `E`.
    pub fn unregister_handler<E, H>(&self, handler: &Arc<H>)
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.registry
            .unregister_handler(TypeKey::of::<E>(), Arc::as_ptr(handler) as *const ());
    }

    /// Removes the callback or static registration behind `handle`. Unknown
    /// handles are a silent no-op.
    pub fn unregister(&self, handle: SubscriptionHandle) {
        self.registry.unregister_handle(handle);
    }

    /// Drops every subscriber registered for `E`.
    pub fn unregister_all<E: Event>(&self) {
        self.registry.unregister_all(TypeKey::of::<E>());
    }
}

#[cfg(test)]
impl SyncEventCenter {
    /// A private center bypassing the singleton, for test isolation.
    pub(crate) fn standalone() -> SyncEventCenter {
        SyncEventCenter::fresh()
    }
}
