//! The asynchronous event center.
//!
//! [`EventCenter`] is a process-wide singleton owning the subscriber registry,
//! the time queue, and a lazily created worker thread. Publication from any
//! thread stages the erased event in the queue's handoff buffer; the worker
//! merges, sleeps until the earliest deadline, and dispatches outside every
//! lock.
//!
//! # Lifecycle
//!
//! The singleton is created on first access under a creation lock. The worker
//! thread is not spawned until the first publication, and
//! [`EventCenter::destroy`] is the only teardown: it joins the worker and
//! releases the singleton, so a later access starts over with empty state.
//! Destruction is an explicit operation rather than a drop impl because
//! joining the worker needs deterministic sequencing.
//!
//! # Locking
//!
//! Three locks exist: the registry lock, the queue lock, and the worker lock
//! (spawn/join serialization). When two are needed the order is worker lock
//! then queue lock; the queue and registry locks are never held together, and
//! no lock is held across a subscriber invocation.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;

use crate::dispatch::dispatch;
use crate::event::{ErasedEvent, Event, TypeKey};
use crate::handler::{erase_callback, EventHandler, ObservedSlot, OwnedSlot, StaticHandler};
use crate::queue::TimeQueue;
use crate::registry::{Registry, SubscriptionHandle};
use crate::LOG_TARGET;

static INSTANCE: Mutex<Option<EventCenter>> = Mutex::new(None);

/// Cheaply clonable handle to the process-wide asynchronous event center.
///
/// All methods take `&self`; handles can be cloned into publisher and
/// registration threads freely.
#[derive(Clone)]
pub struct EventCenter {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Registry,
    queue: TimeQueue,
    worker: Mutex<WorkerState>,
}

#[derive(Default)]
struct WorkerState {
    running: bool,
    thread: Option<JoinHandle<()>>,
}

impl EventCenter {
    /// Returns the current singleton, creating a fresh one if none exists.
    pub fn instance() -> EventCenter {
        INSTANCE
            .lock()
            .unwrap()
            .get_or_insert_with(EventCenter::fresh)
            .clone()
    }

    /// Joins the worker thread and releases the singleton.
    ///
    /// Waits for any in-progress dispatch to finish. Entries scheduled in the
    /// future are discarded. A subsequent [`instance`](Self::instance) call
    /// returns a fresh center with empty registry and queue.
    pub fn destroy() {
        let center = INSTANCE.lock().unwrap().take();
        if let Some(center) = center {
            center.join_worker();
        }
    }

    fn fresh() -> EventCenter {
        EventCenter {
            shared: Arc::new(Shared {
                registry: Registry::new(),
                queue: TimeQueue::new(),
                worker: Mutex::new(WorkerState::default()),
            }),
        }
    }

    /// Publishes `event` for dispatch at the next worker iteration.
    pub fn publish<E: Event>(&self, event: E) {
        self.submit_erased(ErasedEvent::new(event), Instant::now());
    }

    /// Publishes `event` for dispatch no earlier than `delay` from now.
    pub fn publish_delayed<E: Event>(&self, event: E, delay: Duration) {
        self.submit_erased(ErasedEvent::new(event), Instant::now() + delay);
    }

    /// Publishes `event` for dispatch no earlier than `deadline`.
    ///
    /// A deadline already in the past is dispatched at the worker's next
    /// iteration, never inline on the publishing thread.
    pub fn publish_at<E: Event>(&self, event: E, deadline: Instant) {
        self.submit_erased(ErasedEvent::new(event), deadline);
    }

    /// Discards every pending and future-scheduled publication.
    ///
    /// Events whose dispatch has already begun run to completion. The
    /// registry is untouched.
    pub fn cancel_all(&self) {
        self.shared.queue.cancel_all();
    }

    pub(crate) fn submit_erased(&self, event: ErasedEvent, due: Instant) {
        self.ensure_worker();
        self.shared.queue.enqueue(event, due);
    }

    /// Registers a handler object the center holds strongly until it is
    /// explicitly unregistered.
    pub fn register_owned<E, H>(&self, handler: Arc<H>)
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.shared
            .registry
            .register_owned(TypeKey::of::<E>(), Arc::new(OwnedSlot::<E, H>::new(handler)));
    }

    /// Registers a handler object the center only observes. Dropping the last
    /// external strong reference ends the subscription; the stale entry is
    /// skipped and pruned on a later dispatch.
    pub fn register_observed<E, H>(&self, handler: &Arc<H>)
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.shared.registry.register_observed(
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
        self.shared
            .registry
            .register_callback(TypeKey::of::<E>(), erase_callback(callback))
    }

    /// Registers the event type's own static dispatch function as a callback.
    pub fn register_static<E: StaticHandler>(&self) -> SubscriptionHandle {
        self.register_callback::<E>(E::on_event)
    }

    /// Removes `handler` from the owned and observed lists for `E`.
    ///
    /// Matching is by object identity; the first matching occurrence in each
    /// list is removed.
    pub fn unregister_handler<E, H>(&self, handler: &Arc<H>)
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.shared
            .registry
            .unregister_handler(TypeKey::of::<E>(), Arc::as_ptr(handler) as *const ());
    }

    /// Removes the callback or static registration behind `handle`. Unknown
    /// handles are a silent no-op.
    pub fn unregister(&self, handle: SubscriptionHandle) {
        self.shared.registry.unregister_handle(handle);
    }

    /// Drops every subscriber registered for `E`.
    pub fn unregister_all<E: Event>(&self) {
        self.shared.registry.unregister_all(TypeKey::of::<E>());
    }

    /// Spawns the worker on first use; later calls are a cheap flag check.
    fn ensure_worker(&self) {
        let mut worker = self.shared.worker.lock().unwrap();
        if worker.running {
            return;
        }
        self.shared.queue.reset_shutdown();
        let shared = Arc::clone(&self.shared);
        let thread = thread::Builder::new()
            .name("eventc-worker".into())
            .spawn(move || worker_main(shared))
            .expect("failed to spawn event worker thread");
        worker.thread = Some(thread);
        worker.running = true;
    }

    fn join_worker(&self) {
        let mut worker = self.shared.worker.lock().unwrap();
        if !worker.running {
            return;
        }
        self.shared.queue.begin_shutdown();
        if let Some(thread) = worker.thread.take() {
            let _ = thread.join();
        }
        worker.running = false;
    }
}

fn worker_main(shared: Arc<Shared>) {
    debug!(target: LOG_TARGET, "worker thread started");
    while let Some(batch) = shared.queue.next_batch() {
        for scheduled in batch {
            dispatch(&shared.registry, &scheduled.event);
        }
    }
    debug!(target: LOG_TARGET, "worker thread stopped");
}
