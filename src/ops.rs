//! Abstract publication seam shared by both centers.
//!
//! # Primary Implementors
//!
//! [`EventCenter`] and [`SyncEventCenter`] implement [`EventSink`]. Code that
//! only needs to emit events should prefer `impl EventSink` (or
//! `&dyn EventSink`) over a concrete center in its signatures to make it easy
//! to test; with the `mock` feature enabled, `MockEventSink` stands in for a
//! live center.
//!
//! [`Publish`] layers the typed convenience method on top: it erases the
//! event and forwards to [`EventSink::submit`], and is blanket-implemented
//! for every sink.

use std::time::Instant;

use crate::center::EventCenter;
use crate::event::{ErasedEvent, Event};
use crate::sync::SyncEventCenter;

/// Type-erased, immediate publication operations common to both delivery
/// disciplines.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Publishes an already-erased event value for immediate delivery.
    fn submit(&self, event: ErasedEvent);

    /// Discards every pending scheduled publication, where the discipline has
    /// a queue to clear.
    fn cancel_all(&self);
}

impl EventSink for EventCenter {
    fn submit(&self, event: ErasedEvent) {
        self.submit_erased(event, Instant::now());
    }

    fn cancel_all(&self) {
        EventCenter::cancel_all(self);
    }
}

impl EventSink for SyncEventCenter {
    fn submit(&self, event: ErasedEvent) {
        self.submit_erased(event);
    }

    fn cancel_all(&self) {
        SyncEventCenter::cancel_all(self);
    }
}

/// Typed publication over any [`EventSink`].
pub trait Publish: EventSink {
    /// Erases `event` and submits it for immediate delivery.
    fn publish<E: Event>(&self, event: E) {
        self.submit(ErasedEvent::new(event));
    }
}

impl<T: EventSink + ?Sized> Publish for T {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Debug)]
    struct Metered(u64);

    #[test]
    fn publish_reaches_subscribers_through_the_erased_seam() {
        let center = SyncEventCenter::standalone();
        let total = Arc::new(AtomicU64::new(0));
        let handle = {
            let total = Arc::clone(&total);
            center.register_callback(move |event: &Metered| {
                total.fetch_add(event.0, Ordering::SeqCst);
            })
        };

        let sink: &dyn EventSink = &center;
        sink.publish(Metered(21));
        sink.publish(Metered(21));
        assert_eq!(total.load(Ordering::SeqCst), 42);

        center.unregister(handle);
    }

    #[cfg(feature = "mock")]
    #[test]
    fn mock_sink_observes_typed_publication() {
        let mut sink = MockEventSink::new();
        sink.expect_submit()
            .withf(|event| event.downcast_ref::<Metered>().is_some_and(|m| m.0 == 7))
            .times(1)
            .return_const(());

        sink.publish(Metered(7));
    }
}
