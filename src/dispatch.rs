//! Delivery of one erased event to every subscriber of its type.
//!
//! Dispatch never runs under a lock: it works from a registry `Snapshot`
//! and invokes subscribers in the fixed order owned, observed, callbacks,
//! preserving insertion order within each group. Every invocation crosses a
//! fault boundary and a latency watchdog, so one misbehaving subscriber can
//! neither starve nor kill the rest.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use log::{error, warn};
use thiserror::Error;

use crate::event::{ErasedEvent, TypeKey};
use crate::handler::Delivery;
use crate::registry::Registry;
use crate::LOG_TARGET;

/// Invocation duration above which a watchdog warning is written to the
/// diagnostic sink. Observational only; the handler is never interrupted.
pub const SLOW_HANDLER_THRESHOLD: Duration = Duration::from_millis(500);

/// Subscription flavor named in diagnostic lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Category {
    Owned,
    Observed,
    Callback,
}

impl Category {
    fn as_str(self) -> &'static str {
        match self {
            Category::Owned => "Owned",
            Category::Observed => "Observed",
            Category::Callback => "Callback",
        }
    }
}

/// What a subscriber invocation died of.
#[derive(Debug, Error)]
enum HandlerFault {
    #[error("{0}")]
    Message(String),
    #[error("opaque panic payload")]
    Opaque,
}

impl HandlerFault {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            return Self::Message((*message).to_owned());
        }
        match payload.downcast::<String>() {
            Ok(message) => Self::Message(*message),
            Err(_) => Self::Opaque,
        }
    }
}

/// Delivers `event` to every current subscriber of its key.
///
/// Expired observations are skipped during the loop and pruned from the
/// registry afterwards, once the snapshot has been fully consumed.
pub(crate) fn dispatch(registry: &Registry, event: &ErasedEvent) {
    let key = event.key();
    let snapshot = registry.snapshot(key);

    for slot in &snapshot.owned {
        invoke(Category::Owned, key, || slot.deliver(event));
    }

    let mut saw_expired = false;
    for slot in &snapshot.observed {
        if let Some(Delivery::Expired) = invoke(Category::Observed, key, || slot.deliver(event)) {
            saw_expired = true;
        }
    }

    for callback in &snapshot.callbacks {
        invoke(Category::Callback, key, || callback.call(event));
    }

    if saw_expired {
        registry.prune_expired(key);
    }
}

/// Runs one subscriber invocation inside the fault boundary and the watchdog.
/// Returns `None` when the invocation panicked.
fn invoke<T>(category: Category, key: TypeKey, run: impl FnOnce() -> T) -> Option<T> {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(run));
    let elapsed = started.elapsed();

    if elapsed > SLOW_HANDLER_THRESHOLD {
        warn!(
            target: LOG_TARGET,
            "{} subscriber for {key} took {}ms (threshold {}ms)",
            category.as_str(),
            elapsed.as_millis(),
            SLOW_HANDLER_THRESHOLD.as_millis(),
        );
    }

    match outcome {
        Ok(value) => Some(value),
        Err(payload) => {
            let fault = HandlerFault::from_payload(payload);
            error!(
                target: LOG_TARGET,
                "exception in {} subscriber for {key}: {fault}",
                category.as_str(),
            );
            None
        }
    }
}
