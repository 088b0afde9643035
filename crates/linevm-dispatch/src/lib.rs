//! Event FIFO for one VM instance. The library of handlers/dispatchers is
//! shared, read-only, and owned by the host — this type only ever borrows
//! it, the same way `linevm-sched` borrows its `RuntimeHooks` per call
//! instead of storing them.

use linevm_events::{Event, EventLibrary};
use std::collections::VecDeque;

/// FIFO of not-yet-handled events for one VM instance.
#[derive(Debug, Default)]
pub struct EventDispatcher<P> {
    queue: VecDeque<Event<P>>,
}

impl<P> EventDispatcher<P> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Append to the FIFO.
    pub fn queue_event(&mut self, event: Event<P>) {
        self.queue.push_back(event);
    }

    /// Run every dispatcher registered for `event.event_id` immediately,
    /// without touching the FIFO.
    pub fn trigger_event<V>(&self, vm: &mut V, lib: &EventLibrary<V, P>, event: &Event<P>) {
        lib.dispatch(vm, event);
    }

    /// Run the single handler registered for `event.event_id`.
    pub fn handle_event<V>(&self, vm: &mut V, lib: &EventLibrary<V, P>, event: &Event<P>) {
        lib.handle(vm, event);
    }

    /// One tick's worth of draining: snapshot the queue length on entry and
    /// call `handle_event` on exactly that many elements, in FIFO order.
    /// Events a handler enqueues mid-drain wait for the next tick.
    pub fn drain_tick<V>(&mut self, vm: &mut V, lib: &EventLibrary<V, P>) -> usize {
        let snapshot = self.queue.len();
        for _ in 0..snapshot {
            let event = self.queue.pop_front().expect("snapshot bounds the loop");
            self.handle_event(vm, lib, &event);
        }
        tracing::trace!(handled = snapshot, remaining = self.queue.len(), "tick drained");
        snapshot
    }
}
