//! Open, close, break, call, and return — the operations that mutate a
//! thread's call stack. These are exposed standalone (not folded into
//! `step`) so a host's instruction executors can invoke them directly, and
//! so the generic single-step loop can call `close_flow` on its own unwind
//! path without any extra indirection.

use linevm_program::{Module, ModuleId, Pos, Tag};

use crate::memory::{MemoryModel, MemoryState};
use crate::record::{CallFrame, FlowKind, FlowRecord};

/// Push a new BASIC/WHILE/ROUTINE flow onto the frame's flow stack.
pub fn open_flow<M: MemoryState>(
    frame: &mut CallFrame<M>,
    kind: FlowKind,
    mp: ModuleId,
    begin: Pos,
    end: Pos,
) {
    frame.flow_stack.push(FlowRecord::new(kind, mp, begin, end));
}

/// Close the frame's top flow, per the per-kind contract in the control-flow
/// table: BASIC/WHILE resume the flow beneath them, ROUTINE leaves it
/// untouched, CALL either loops (circular frame) or empties the flow stack
/// (triggering `return_from_call` on the next scheduler step).
pub fn close_flow<M: MemoryState>(frame: &mut CallFrame<M>) {
    let Some(popped) = frame.flow_stack.pop() else {
        return;
    };
    match popped.kind {
        FlowKind::Basic => {
            if let Some(top) = frame.flow_stack.last_mut() {
                top.mp = popped.mp;
                top.ip = popped.ip;
            }
        }
        FlowKind::While => {
            if let Some(top) = frame.flow_stack.last_mut() {
                top.mp = popped.mp;
                top.ip = popped.begin;
            }
        }
        FlowKind::Routine => {
            // Flow beneath resumes exactly where it left off.
        }
        FlowKind::Call => {
            if frame.circular {
                frame.flow_stack.push(FlowRecord {
                    ip: popped.begin,
                    ..popped
                });
            }
        }
    }
}

/// Break out of the frame's top flow early. BASIC/WHILE jump to just past
/// the flow's closing instruction; ROUTINE/CALL behave exactly as `close`.
pub fn break_flow<T: Tag, M: MemoryState>(frame: &mut CallFrame<M>, modules: &[Module<T>]) {
    let Some(popped) = frame.flow_stack.pop() else {
        return;
    };
    match popped.kind {
        FlowKind::Basic | FlowKind::While => {
            if let Some(top) = frame.flow_stack.last_mut() {
                top.mp = popped.mp;
                let mut resume_ip = popped.end;
                let still_in_module = modules
                    .get(popped.mp as usize)
                    .is_some_and(|m| m.members.contains(&resume_ip));
                if still_in_module {
                    resume_ip += 1;
                }
                top.ip = resume_ip;
            }
        }
        FlowKind::Routine => {}
        FlowKind::Call => {
            if frame.circular {
                frame.flow_stack.push(FlowRecord {
                    ip: popped.begin,
                    ..popped
                });
            }
        }
    }
}

/// Call a module: push a fresh frame with a new CALL flow, unless the call
/// stack is already at `max_call_depth` (dropped silently) or `module_id`
/// does not name a module (also silent — an invalid address per the
/// addressing contract).
pub fn call<T: Tag, Mem: MemoryModel>(
    call_stack: &mut Vec<CallFrame<Mem::State>>,
    memory_model: &Mem,
    modules: &[Module<T>],
    module_id: ModuleId,
    circular: bool,
    max_call_depth: usize,
) -> bool {
    if call_stack.len() >= max_call_depth {
        tracing::trace!(max_call_depth, "call dropped: max call depth reached");
        return false;
    }
    let Some(module) = modules.get(module_id as usize) else {
        tracing::trace!(module_id, "call dropped: no such module");
        return false;
    };

    let mut callee_state = memory_model.new_state();
    if let Some(caller) = call_stack.last_mut() {
        memory_model.on_call(&mut caller.memory, &mut callee_state);
    }

    let mut frame = CallFrame::new(callee_state, circular);
    open_flow(&mut frame, FlowKind::Call, module_id, module.begin, module.end);
    call_stack.push(frame);
    true
}

/// Pop the top call frame. If a caller remains beneath it, invoke the
/// memory model's return hook.
pub fn return_from_call<Mem: MemoryModel>(
    call_stack: &mut Vec<CallFrame<Mem::State>>,
    memory_model: &Mem,
) {
    let Some(mut returning) = call_stack.pop() else {
        return;
    };
    if let Some(caller) = call_stack.last_mut() {
        memory_model.on_return(&mut returning.memory, &mut caller.memory);
    }
}
