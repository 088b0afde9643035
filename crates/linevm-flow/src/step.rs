//! The single-step algorithm: advance a thread's call stack by exactly one
//! atomic unit — an instruction executed, a flow closed, or the thread
//! dying.

use linevm_instr::InstructionLibrary;
use linevm_program::{Module, Pos, Program, Tag};

use crate::memory::{MemoryModel, MemoryState};
use crate::ops::{close_flow, return_from_call};
use crate::record::CallFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// `program[pos]` executed.
    Executed { pos: Pos },
    /// The program wrapped from its final module back to position 0.
    Wrapped,
    /// The flow addressed a module that no longer exists (stale after a
    /// recompile) and was closed without executing anything. Closes from an
    /// ordinary IP-left-its-module boundary loop back into the next flow
    /// instead, so they never surface this variant.
    FlowClosed,
    /// The call stack emptied; the thread is dead.
    ThreadDead,
}

/// Advance `call_stack` by exactly one step: retry on an empty flow stack
/// (returning from the call),
/// execute when the IP is still a member of its module, wrap when the
/// module is circular and the IP fell off its end, otherwise close the
/// flow and retry.
pub fn step<V, T, Mem>(
    vm: &mut V,
    call_stack: &mut Vec<CallFrame<Mem::State>>,
    program: &Program<T>,
    modules: &[Module<T>],
    instr_lib: &InstructionLibrary<V, T>,
    memory_model: &Mem,
) -> StepOutcome
where
    T: Tag,
    Mem: MemoryModel,
{
    loop {
        if call_stack.is_empty() {
            return StepOutcome::ThreadDead;
        }

        let flow_is_empty = call_stack.last().unwrap().flow_stack.is_empty();
        if flow_is_empty {
            return_from_call(call_stack, memory_model);
            continue;
        }

        let top = *call_stack.last().unwrap().flow_stack.last().unwrap();
        let (mp, ip) = (top.mp, top.ip);

        let Some(module) = modules.get(mp as usize) else {
            // The module this flow addressed no longer exists (program was
            // recompiled out from under a live thread); unwind rather than
            // index out of range.
            close_flow(call_stack.last_mut().unwrap());
            return StepOutcome::FlowClosed;
        };

        if module.members.contains(&ip) {
            call_stack
                .last_mut()
                .unwrap()
                .flow_stack
                .last_mut()
                .unwrap()
                .ip = ip + 1;
            instr_lib.execute(vm, &program[ip]);
            return StepOutcome::Executed { pos: ip };
        } else if ip >= program.size() && module.wraps() && module.members.contains(&0) {
            call_stack
                .last_mut()
                .unwrap()
                .flow_stack
                .last_mut()
                .unwrap()
                .ip = 1;
            instr_lib.execute(vm, &program[0]);
            return StepOutcome::Wrapped;
        } else {
            close_flow(call_stack.last_mut().unwrap());
            continue;
        }
    }
}
