//! Scheduled-event storage between publishers and the worker.
//!
//! Publishers only ever append to a small handoff buffer under the queue lock
//! and signal the condition variable, so publication cost does not grow with
//! the number of pending events. The worker alone merges the buffer into a
//! min-heap ordered by execution time and waits out the gap to the earliest
//! deadline.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use crate::event::ErasedEvent;

/// One pending publication.
pub(crate) struct Scheduled {
    pub(crate) due: Instant,
    seq: u64,
    pub(crate) event: ErasedEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    /// Reversed so the max-heap pops earliest deadline first; the enqueue
    /// sequence number breaks ties in arrival order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    inbox: Vec<Scheduled>,
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
    shutdown: bool,
}

pub(crate) struct TimeQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl TimeQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        }
    }

    /// Appends to the handoff buffer and wakes the worker. This is the entire
    /// critical section a publisher ever enters.
    pub(crate) fn enqueue(&self, event: ErasedEvent, due: Instant) {
        let mut state = self.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.inbox.push(Scheduled { due, seq, event });
        self.available.notify_one();
    }

    /// Discards every pending entry, both staged and scheduled.
    pub(crate) fn cancel_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.inbox.clear();
        state.heap.clear();
    }

    pub(crate) fn begin_shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.available.notify_all();
    }

    pub(crate) fn reset_shutdown(&self) {
        self.state.lock().unwrap().shutdown = false;
    }

    /// Worker-only. Blocks until at least one entry is due, then pops and
    /// returns everything due at that moment, earliest first.
    ///
    /// Returns `None` once shutdown has been signalled and no further entry is
    /// due: entries scheduled strictly in the future are abandoned with the
    /// queue rather than waited out, which bounds teardown latency.
    pub(crate) fn next_batch(&self) -> Option<Vec<Scheduled>> {
        let mut state = self.state.lock().unwrap();
        loop {
            // Merge staged entries before looking at the heap, so late
            // arrivals with near deadlines are not overslept.
            {
                let QueueState { inbox, heap, .. } = &mut *state;
                heap.extend(inbox.drain(..));
            }

            let now = Instant::now();
            match state.heap.peek().map(|entry| entry.due) {
                None => {
                    if state.shutdown {
                        return None;
                    }
                    state = self
                        .available
                        .wait_while(state, |queue| {
                            !queue.shutdown && queue.inbox.is_empty()
                        })
                        .unwrap();
                }
                Some(due) if due > now => {
                    if state.shutdown {
                        return None;
                    }
                    let (guard, _timeout) = self
                        .available
                        .wait_timeout_while(state, due - now, |queue| {
                            !queue.shutdown && queue.inbox.is_empty()
                        })
                        .unwrap();
                    state = guard;
                }
                Some(_) => {
                    let mut batch = Vec::new();
                    while state
                        .heap
                        .peek()
                        .is_some_and(|entry| entry.due <= now)
                    {
                        batch.push(state.heap.pop().unwrap());
                    }
                    return Some(batch);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn entry_value(scheduled: &Scheduled) -> u32 {
        *scheduled.event.downcast_ref::<u32>().unwrap()
    }

    fn drain(queue: &TimeQueue, expected: usize) -> Vec<u32> {
        let mut values = Vec::new();
        while values.len() < expected {
            let batch = queue.next_batch().expect("queue shut down unexpectedly");
            values.extend(batch.iter().map(entry_value));
        }
        values
    }

    #[test]
    fn earliest_deadline_pops_first() {
        let queue = TimeQueue::new();
        let now = Instant::now();
        queue.enqueue(ErasedEvent::new(3u32), now + Duration::from_millis(60));
        queue.enqueue(ErasedEvent::new(1u32), now + Duration::from_millis(10));
        queue.enqueue(ErasedEvent::new(2u32), now + Duration::from_millis(35));

        assert_eq!(drain(&queue, 3), vec![1, 2, 3]);
    }

    #[test]
    fn equal_deadlines_keep_arrival_order() {
        let queue = TimeQueue::new();
        let due = Instant::now() + Duration::from_millis(5);
        for value in 0u32..5 {
            queue.enqueue(ErasedEvent::new(value), due);
        }

        assert_eq!(drain(&queue, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overdue_entries_are_returned_immediately() {
        let queue = TimeQueue::new();
        let started = Instant::now();
        queue.enqueue(ErasedEvent::new(9u32), started - Duration::from_millis(50));

        let batch = queue.next_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn cancel_all_discards_staged_and_scheduled_entries() {
        let queue = TimeQueue::new();
        queue.enqueue(
            ErasedEvent::new(1u32),
            Instant::now() + Duration::from_millis(10),
        );
        queue.cancel_all();
        queue.begin_shutdown();
        assert!(queue.next_batch().is_none());
    }

    #[test]
    fn shutdown_still_delivers_entries_already_due() {
        let queue = TimeQueue::new();
        queue.enqueue(ErasedEvent::new(4u32), Instant::now());
        queue.begin_shutdown();

        let batch = queue.next_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(queue.next_batch().is_none());
    }

    #[test]
    fn shutdown_abandons_future_entries() {
        let queue = TimeQueue::new();
        queue.enqueue(
            ErasedEvent::new(4u32),
            Instant::now() + Duration::from_secs(3600),
        );
        queue.begin_shutdown();

        let started = Instant::now();
        assert!(queue.next_batch().is_none());
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
