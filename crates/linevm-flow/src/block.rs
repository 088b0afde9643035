//! Block boundary discovery.

use linevm_instr::{InstructionLibrary, Properties};
use linevm_program::{Module, ModuleId, Pos, Program, Tag};

/// Scan forward from `start_ip` inside module `mp`, tracking nesting depth
/// starting at 1: `+1` on a BLOCK_OPEN-property instruction, `-1` on a
/// BLOCK_CLOSE-property one. Returns the position whose decrement first
/// brings depth to zero.
///
/// Bounded by the module's own membership size, so a malformed program with
/// an unclosed block cannot loop forever — it returns `None` instead.
pub fn find_end_of_block<V, T: Tag>(
    instr_lib: &InstructionLibrary<V, T>,
    program: &Program<T>,
    modules: &[Module<T>],
    mp: ModuleId,
    start_ip: Pos,
) -> Option<Pos> {
    let module = modules.get(mp as usize)?;
    if program.is_empty() {
        return None;
    }

    let mut depth: i64 = 1;
    let mut ip = start_ip % program.size();
    for _ in 0..module.members.len() {
        if !module.members.contains(&ip) {
            return None;
        }
        let instr = &program[ip];
        if instr_lib.has_property(instr.opcode_id, Properties::BLOCK_OPEN) {
            depth += 1;
        }
        if instr_lib.has_property(instr.opcode_id, Properties::BLOCK_CLOSE) {
            depth -= 1;
            if depth == 0 {
                return Some(ip);
            }
        }
        ip = program.wrap(ip);
    }
    None
}
