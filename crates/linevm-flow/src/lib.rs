//! Per-thread control-flow engine: the call-frame/flow-record stack shape
//! and the single-step algorithm that drives it.

mod block;
mod memory;
mod ops;
mod record;
mod step;

pub use block::find_end_of_block;
pub use memory::{MemoryModel, MemoryState};
pub use ops::{break_flow, call, close_flow, open_flow, return_from_call};
pub use record::{CallFrame, FlowKind, FlowRecord};
pub use step::{step, StepOutcome};
