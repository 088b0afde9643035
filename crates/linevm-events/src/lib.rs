//! Event type and event library.
//!
//! The runtime moves events by value and never reads the payload itself —
//! `payload`'s shape is entirely the host's choice.

use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

/// `(event_id, payload)`. Moved by value through the dispatcher's FIFO.
#[derive(Debug, Clone)]
pub struct Event<P> {
    pub event_id: u32,
    pub payload: P,
}

impl<P> Event<P> {
    pub fn new(event_id: u32, payload: P) -> Self {
        Self { event_id, payload }
    }
}

/// `(vm, &event) -> ()`, invoked exactly once per drained event. May carry
/// its own mutable captured state between calls.
pub type Handler<V, P> = Box<dyn FnMut(&mut V, &Event<P>)>;

/// `(vm, &event) -> ()`, one of an event kind's ordered dispatch functions.
pub type Dispatcher<V, P> = Box<dyn FnMut(&mut V, &Event<P>)>;

pub struct EventEntry<V, P> {
    pub name: String,
    pub description: String,
    // `RefCell`-wrapped for the same reason as `linevm_instr::InstructionEntry`:
    // `handle`/`dispatch` stay `&self` even though calling a `FnMut` needs a
    // mutable borrow of the boxed closure itself.
    handler: RefCell<Handler<V, P>>,
    dispatchers: Vec<RefCell<Dispatcher<V, P>>>,
}

impl<V, P> std::fmt::Debug for EventEntry<V, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("dispatcher_count", &self.dispatchers.len())
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LibraryError {
    #[error("event name '{0}' is already registered")]
    DuplicateName(String),
}

/// Append-only registry mapping event id -> handler + dispatcher chain.
#[derive(Debug, Default)]
pub struct EventLibrary<V, P> {
    entries: Vec<EventEntry<V, P>>,
    by_name: HashMap<String, u32>,
}

impl<V, P> EventLibrary<V, P> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Handler<V, P>,
    ) -> Result<u32, LibraryError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(LibraryError::DuplicateName(name));
        }
        let id = self.entries.len() as u32;
        self.by_name.insert(name.clone(), id);
        self.entries.push(EventEntry {
            name,
            description: description.into(),
            handler: RefCell::new(handler),
            dispatchers: Vec::new(),
        });
        Ok(id)
    }

    /// Append a dispatch function to an already-registered event kind.
    pub fn add_dispatcher(&mut self, event_id: u32, dispatcher: Dispatcher<V, P>) {
        if let Some(entry) = self.entries.get_mut(event_id as usize) {
            entry.dispatchers.push(RefCell::new(dispatcher));
        }
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, event_id: u32) -> Option<&EventEntry<V, P>> {
        self.entries.get(event_id as usize)
    }

    /// Invoke the single registered handler for `event.event_id`.
    ///
    /// An event with no registered handler is a no-op: an invalid address
    /// or unreferenced kind degrades silently rather than panicking.
    pub fn handle(&self, vm: &mut V, event: &Event<P>) {
        match self.get(event.event_id) {
            Some(entry) => (entry.handler.borrow_mut())(vm, event),
            None => tracing::trace!(event_id = event.event_id, "no-op: unhandled event kind"),
        }
    }

    /// Run every dispatcher registered for `event.event_id`, in order.
    pub fn dispatch(&self, vm: &mut V, event: &Event<P>) {
        if let Some(entry) = self.get(event.event_id) {
            for dispatcher in &entry.dispatchers {
                (dispatcher.borrow_mut())(vm, event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
