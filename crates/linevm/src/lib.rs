//! Tag-addressed event-driven virtual machine.
//!
//! This crate assembles the leaf crates (program, instruction/event
//! libraries, compiler, resolver, flow engine, thread, scheduler, dispatch)
//! behind one `Vm` facade, plus the configuration and host-trait surface a
//! user of the runtime actually needs.

mod config;
mod vm;

pub use config::{ConfigError, VmConfig};
pub use vm::Vm;

pub use linevm_dispatch::EventDispatcher;
pub use linevm_events::{Event, EventLibrary};
pub use linevm_flow::{MemoryModel, MemoryState};
pub use linevm_instr::{InstructionLibrary, Properties};
pub use linevm_program::tag::{BitTag, IntTag};
pub use linevm_program::{Instruction, Module, ModuleId, Pos, Program, Tag};
pub use linevm_resolver::Resolver;
pub use linevm_sched::{RuntimeHooks, Scheduler, SlotId};
pub use linevm_thread::{RunState, Thread};
