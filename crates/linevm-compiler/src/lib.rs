//! Module compiler — the one-pass analysis that turns a flat [`Program`]
//! into a list of [`Module`]s with begin/end spans and membership sets,
//! including wrap-around for the final module.

use linevm_instr::{InstructionLibrary, Properties};
use linevm_program::{Module, ModuleId, Pos, Program, Tag};
use std::collections::BTreeSet;
use thiserror::Error;

/// A non-fatal problem noticed while compiling. Reported, never aborted on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Diagnostic {
    /// A `MODULE_DEF` instruction carried no tag; `default_tag` was
    /// substituted so compilation could still produce a usable module.
    #[error("MODULE_DEF instruction at position {position} has no tag; using default tag")]
    MissingModuleTag { position: Pos },
}

/// Output of [`compile`]: the module list plus any diagnostics collected
/// along the way.
#[derive(Debug, Clone)]
pub struct CompiledProgram<T: Tag> {
    pub modules: Vec<Module<T>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T: Tag> CompiledProgram<T> {
    pub fn module(&self, id: ModuleId) -> Option<&Module<T>> {
        self.modules.get(id as usize)
    }
}

/// Compile `program` into modules, using `default_tag` for the no-module
/// fallback and for any `MODULE_DEF` instruction that carries no tag.
pub fn compile<V, T: Tag>(
    program: &Program<T>,
    instr_lib: &InstructionLibrary<V, T>,
    default_tag: &T,
) -> CompiledProgram<T> {
    let size = program.size();
    let mut modules: Vec<Module<T>> = Vec::new();
    let mut dangling: BTreeSet<Pos> = BTreeSet::new();
    let mut diagnostics = Vec::new();
    let mut first_def_pos: Option<Pos> = None;

    for pos in 0..size {
        let instr = &program[pos];
        if instr_lib.has_property(instr.opcode_id, Properties::MODULE_DEF) {
            if first_def_pos.is_none() {
                first_def_pos = Some(pos);
            }
            if let Some(prev) = modules.last_mut() {
                prev.end = pos.saturating_sub(1);
            }

            let tag = match instr.primary_tag() {
                Some(t) => t.clone(),
                None => {
                    diagnostics.push(Diagnostic::MissingModuleTag { position: pos });
                    tracing::warn!(position = pos, "MODULE_DEF instruction has no tag");
                    default_tag.clone()
                }
            };

            let id = modules.len() as ModuleId;
            let begin = program.wrap(pos);
            modules.push(Module::new(id, begin, begin, tag, BTreeSet::new()));
        } else if let Some(open) = modules.last_mut() {
            open.members.insert(pos);
        } else {
            dangling.insert(pos);
        }
    }

    if modules.is_empty() {
        let members: BTreeSet<Pos> = (0..size).collect();
        modules.push(Module::new(0, 0, size, default_tag.clone(), members));
    } else {
        let first_def = first_def_pos.expect("modules implies a MODULE_DEF was seen");
        let final_end = if first_def > 0 { first_def - 1 } else { size };
        let last = modules.last_mut().expect("modules is non-empty");
        last.end = final_end;
        last.members.extend(dangling.iter().copied());
    }

    tracing::debug!(module_count = modules.len(), "compiled program");
    CompiledProgram {
        modules,
        diagnostics,
    }
}
