//! Instruction library — an append-only registry binding opcode ids to
//! executor closures and a small closed set of boolean properties.
//!
//! Generic over the host's concrete VM type `V`, so this crate never needs
//! to know what a "VM" is — it only needs somewhere to call back into.

use bitflags::bitflags;
use linevm_program::{Instruction, Tag};
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

bitflags! {
    /// Closed set of boolean tags an instruction can carry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Properties: u8 {
        const NONE = 0;
        /// Defines a module boundary; the tag of the next instruction's
        /// first tag field becomes that module's address.
        const MODULE_DEF = 1 << 0;
        /// Opens a nested block (increments scan depth in `find_end_of_block`).
        const BLOCK_OPEN = 1 << 1;
        /// Closes a block (decrements scan depth).
        const BLOCK_CLOSE = 1 << 2;
    }
}

/// `(vm, &instruction) -> ()`. Instruction executors may mutate any VM
/// state except the slot identity of the currently-executing thread, and may
/// carry their own mutable captured state between calls.
pub type Executor<V, T> = Box<dyn FnMut(&mut V, &Instruction<T>)>;

pub struct InstructionEntry<V, T: Tag> {
    pub name: String,
    pub properties: Properties,
    pub description: String,
    // `RefCell`-wrapped so `execute` can stay `&self` — the library is
    // shared by reference across every cooperating VM, and `FnMut` needs a
    // mutable borrow of the boxed closure for the duration of the call only.
    executor: RefCell<Executor<V, T>>,
}

impl<V, T: Tag> std::fmt::Debug for InstructionEntry<V, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionEntry")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LibraryError {
    #[error("instruction name '{0}' is already registered")]
    DuplicateName(String),
}

/// Append-only registry mapping opcode id -> executor + properties.
///
/// Shared (by non-owning reference) across every VM instance in an
/// experiment; never mutated once execution of any of those VMs has begun.
#[derive(Debug, Default)]
pub struct InstructionLibrary<V, T: Tag> {
    entries: Vec<InstructionEntry<V, T>>,
    by_name: HashMap<String, u32>,
}

impl<V, T: Tag> InstructionLibrary<V, T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a new instruction, returning its assigned opcode id.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        properties: Properties,
        description: impl Into<String>,
        executor: Executor<V, T>,
    ) -> Result<u32, LibraryError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(LibraryError::DuplicateName(name));
        }
        let id = self.entries.len() as u32;
        self.by_name.insert(name.clone(), id);
        self.entries.push(InstructionEntry {
            name,
            properties,
            description: description.into(),
            executor: RefCell::new(executor),
        });
        tracing::debug!(opcode_id = id, "registered instruction");
        Ok(id)
    }

    pub fn get(&self, opcode_id: u32) -> Option<&InstructionEntry<V, T>> {
        self.entries.get(opcode_id as usize)
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn has_property(&self, opcode_id: u32, property: Properties) -> bool {
        self.get(opcode_id)
            .is_some_and(|e| e.properties.contains(property))
    }

    /// Execute `instr` against `vm`. A reference to an unregistered opcode
    /// is an invalid-address case and is silently a no-op.
    pub fn execute(&self, vm: &mut V, instr: &Instruction<T>) {
        match self.get(instr.opcode_id) {
            Some(entry) => (entry.executor.borrow_mut())(vm, instr),
            None => tracing::trace!(opcode_id = instr.opcode_id, "no-op: unregistered opcode"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
