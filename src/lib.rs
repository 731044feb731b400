//! An in-process, type-indexed publish/subscribe bus for Rust.
//!
//! This crate delivers strongly-typed event values from any publisher thread
//! to a dynamic set of subscribers, keyed by the event's type. It favors
//! availability over caller-observable failure: subscribers are decoupled
//! from publishers and have no return channel, so faults are contained and
//! logged rather than propagated.
//!
//! # Key Features
//!
//! - **Type-indexed routing**: any `T: Any + Send` value is an event; its
//!   [`TypeKey`] selects the subscribers.
//! - **Four subscription flavors**: owned handler objects, observed (weakly
//!   held) handler objects, inline callables, and static per-type
//!   dispatchers.
//! - **Three publication modes**: immediate, delayed, and time-pointed, the
//!   latter two served by a min-heap of deadlines on a dedicated worker.
//! - **Two delivery disciplines**: [`EventCenter`] dispatches from a lazily
//!   spawned worker thread; [`SyncEventCenter`] dispatches inline on the
//!   caller.
//! - **Fault isolation**: every subscriber invocation crosses a
//!   `catch_unwind` boundary and a latency watchdog; one bad handler never
//!   takes down the rest.
//!
//! # Core Concepts
//!
//! - [`EventCenter`] / [`SyncEventCenter`]: process-wide singletons owning
//!   the subscriber registry (and, for the asynchronous center, the time
//!   queue and worker).
//! - [`EventHandler`]: a handler object registered for one event type.
//! - [`SubscriptionHandle`]: the never-reused identifier returned by callback
//!   and static registrations, used for unregistration.
//! - [`EventSink`] / [`Publish`]: the erased publication seam, mockable via
//!   the `mock` feature.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::mpsc;
//! use std::time::Duration;
//!
//! use eventc::EventCenter;
//!
//! #[derive(Debug)]
//! struct Tick {
//!     round: u32,
//! }
//!
//! let center = EventCenter::instance();
//!
//! let (tx, rx) = mpsc::channel();
//! let handle = center.register_callback(move |tick: &Tick| {
//!     let _ = tx.send(tick.round);
//! });
//!
//! center.publish(Tick { round: 1 });
//! assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(1));
//!
//! center.unregister(handle);
//! EventCenter::destroy();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

mod center;
mod dispatch;
mod event;
mod handler;
mod ops;
mod queue;
mod registry;
mod sync;

pub use crate::center::EventCenter;
pub use crate::dispatch::SLOW_HANDLER_THRESHOLD;
pub use crate::event::{ErasedEvent, Event, TypeKey};
pub use crate::handler::{EventHandler, StaticHandler};
#[cfg(feature = "mock")]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub use crate::ops::MockEventSink;
pub use crate::ops::{EventSink, Publish};
pub use crate::registry::SubscriptionHandle;
pub use crate::sync::SyncEventCenter;

/// Target used for every line written to the diagnostic sink.
pub(crate) const LOG_TARGET: &str = "eventc";
