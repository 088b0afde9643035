//! Linear program value types for the linevm runtime.
//!
//! This crate is the leaf of the dependency graph: `Tag`, `Instruction`,
//! `Program`, and `Module` carry no knowledge of execution, scheduling, or
//! instruction semantics. Everything here has value semantics — programs are
//! copied and compared structurally, never aliased.

mod codec;
mod instruction;
mod module;
mod program;
pub mod tag;

pub use codec::{CodecError, FromBytes, ToBytes};
pub use instruction::Instruction;
pub use module::Module;
pub use program::Program;
pub use tag::Tag;

/// Position within a [`Program`].
pub type Pos = usize;

/// Small integer operand carried by an [`Instruction`].
pub type Arg = i32;

/// Opaque module identifier, stable for the lifetime of a compiled program.
pub type ModuleId = u32;
