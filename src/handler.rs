//! [`EventHandler`] represents objects that can be registered with a center to
//! receive typed events; [`StaticHandler`] lets an event type dispatch to
//! itself through an associated function.
//!
//! Internally every subscription flavor is narrowed to one of two erased
//! shapes so the registry can store them side by side:
//!
//! - `ErasedHandler` - an owned or observed handler object behind a vtable,
//!   delivering through a key-guarded downcast.
//! - `ErasedCallback` - a value-captured callable wrapped so that it accepts
//!   the erased event and performs the same guard itself.
//!
//! You do not implement the erased traits manually; the centers build the
//! adapters when a typed registration is made.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::event::{ErasedEvent, Event};

/// A subscriber object for events of type `E`.
///
/// Handlers are invoked by shared reference, possibly from a dedicated worker
/// thread, hence the `Send + Sync` bounds.
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    /// Handle one published event.
    fn on_event(&self, event: &E);
}

/// An event type that carries its own stateless dispatch function.
///
/// Registering with `register_static::<E>()` is equivalent to registering the
/// callback `|event: &E| E::on_event(event)`; it exists to give such types a
/// canonical [`SubscriptionHandle`](crate::SubscriptionHandle).
pub trait StaticHandler: Event {
    /// Handle one published event of this type.
    fn on_event(event: &Self);
}

/// Outcome of delivering to an erased handler slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The handler ran (or the slot intentionally skipped a foreign key).
    Invoked,
    /// The observed target no longer exists; the slot is prunable.
    Expired,
}

/// Type-erased view of an owned or observed handler registration.
pub(crate) trait ErasedHandler: Send + Sync {
    fn deliver(&self, event: &ErasedEvent) -> Delivery;

    /// Stable address of the underlying handler object, for identity-based
    /// unregistration.
    fn target(&self) -> *const ();

    fn expired(&self) -> bool;
}

/// Erased form of a value-captured callback registration.
#[derive(Clone)]
pub(crate) struct ErasedCallback(Arc<dyn Fn(&ErasedEvent) + Send + Sync>);

impl ErasedCallback {
    pub(crate) fn call(&self, event: &ErasedEvent) {
        (*self.0)(event)
    }
}

/// Wraps a typed callback into an [`ErasedCallback`] performing the
/// key-guarded downcast.
pub(crate) fn erase_callback<E, F>(callback: F) -> ErasedCallback
where
    E: Event,
    F: Fn(&E) + Send + Sync + 'static,
{
    ErasedCallback(Arc::new(move |event: &ErasedEvent| {
        if let Some(event) = event.downcast_ref::<E>() {
            callback(event);
        }
    }))
}

/// A strongly held handler registration. The center keeps the object alive
/// until it is explicitly unregistered.
pub(crate) struct OwnedSlot<E, H> {
    handler: Arc<H>,
    _event: PhantomData<fn(&E)>,
}

impl<E, H> OwnedSlot<E, H> {
    pub(crate) fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            _event: PhantomData,
        }
    }
}

impl<E: Event, H: EventHandler<E>> ErasedHandler for OwnedSlot<E, H> {
    fn deliver(&self, event: &ErasedEvent) -> Delivery {
        if let Some(event) = event.downcast_ref::<E>() {
            self.handler.on_event(event);
        }
        Delivery::Invoked
    }

    fn target(&self) -> *const () {
        Arc::as_ptr(&self.handler) as *const ()
    }

    fn expired(&self) -> bool {
        false
    }
}

/// A weakly held handler registration. The external owner controls the
/// handler's lifetime; delivery upgrades the reference only across one
/// invocation.
pub(crate) struct ObservedSlot<E, H> {
    handler: Weak<H>,
    _event: PhantomData<fn(&E)>,
}

impl<E, H> ObservedSlot<E, H> {
    pub(crate) fn new(handler: Weak<H>) -> Self {
        Self {
            handler,
            _event: PhantomData,
        }
    }
}

impl<E: Event, H: EventHandler<E>> ErasedHandler for ObservedSlot<E, H> {
    fn deliver(&self, event: &ErasedEvent) -> Delivery {
        let Some(handler) = self.handler.upgrade() else {
            return Delivery::Expired;
        };
        if let Some(event) = event.downcast_ref::<E>() {
            handler.on_event(event);
        }
        Delivery::Invoked
    }

    fn target(&self) -> *const () {
        self.handler.as_ptr() as *const ()
    }

    fn expired(&self) -> bool {
        self.handler.strong_count() == 0
    }
}
