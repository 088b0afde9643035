//! A thread: a priority-tagged call stack plus its lifecycle state. Wraps
//! `linevm_flow::step` so "call stack emptied" and "was killed by the
//! scheduler" both collapse to the same `DEAD` state.

use linevm_instr::InstructionLibrary;
use linevm_program::{Module, Program, Tag};

pub use linevm_flow::{CallFrame, MemoryModel, MemoryState, StepOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Pending,
    Dead,
}

/// One thread slot. `priority` is read by the scheduler's admission logic;
/// the thread itself never inspects it.
#[derive(Debug, Clone)]
pub struct Thread<M: MemoryState> {
    pub exec_state: Vec<CallFrame<M>>,
    pub priority: f64,
    pub run_state: RunState,
}

impl<M: MemoryState> Thread<M> {
    /// A freshly acquired slot: empty call stack, PENDING, given priority.
    /// The host's `init_thread` hook is expected to push the first call
    /// frame immediately after this.
    pub fn new(priority: f64) -> Self {
        Self {
            exec_state: Vec::new(),
            priority,
            run_state: RunState::Pending,
        }
    }

    /// Reuse a reclaimed slot for a new spawn.
    pub fn reset(&mut self, priority: f64) {
        self.exec_state.clear();
        self.priority = priority;
        self.run_state = RunState::Pending;
    }

    /// DEAD iff explicitly killed or the call stack has run empty.
    pub fn is_dead(&self) -> bool {
        self.run_state == RunState::Dead || self.exec_state.is_empty()
    }

    pub fn kill(&mut self) {
        self.run_state = RunState::Dead;
    }

    pub fn activate(&mut self) {
        if self.run_state != RunState::Dead {
            self.run_state = RunState::Running;
        }
    }
}

/// Advance `thread` by one step and re-derive its `run_state`: dying mid-step
/// (call stack emptied) demotes it to `DEAD` the same way an explicit kill
/// does.
pub fn step_thread<V, T, Mem>(
    vm: &mut V,
    thread: &mut Thread<Mem::State>,
    program: &Program<T>,
    modules: &[Module<T>],
    instr_lib: &InstructionLibrary<V, T>,
    memory_model: &Mem,
) -> StepOutcome
where
    T: Tag,
    Mem: MemoryModel,
{
    let outcome = linevm_flow::step(
        vm,
        &mut thread.exec_state,
        program,
        modules,
        instr_lib,
        memory_model,
    );
    if thread.exec_state.is_empty() {
        thread.run_state = RunState::Dead;
    }
    outcome
}
