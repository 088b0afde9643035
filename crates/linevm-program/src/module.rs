//! The `Module` value type produced by the module compiler.

use crate::{ModuleId, Pos, Tag};
use std::collections::BTreeSet;

/// A contiguous (possibly wrap-around) span of instructions addressed by tag.
///
/// `begin` is the position of the first instruction *after* the defining
/// instruction; `end` is the position of the last member. For the final
/// module in a wrap-around program `end < begin`, and `members` may include
/// positions on both sides of the wrap.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Module<T: Tag> {
    pub id: ModuleId,
    pub begin: Pos,
    pub end: Pos,
    pub tag: T,
    pub members: BTreeSet<Pos>,
    /// Regulator bias applied to this module's match score, and the number
    /// of ticks remaining before it reverts to `1.0`. `None` means the
    /// regulator capability is unused for this module (equivalent to an
    /// always-inactive regulator at its default value).
    pub regulator: f64,
    pub regulator_decay: u32,
}

impl<T: Tag> Module<T> {
    pub fn new(id: ModuleId, begin: Pos, end: Pos, tag: T, members: BTreeSet<Pos>) -> Self {
        Self {
            id,
            begin,
            end,
            tag,
            members,
            regulator: 1.0,
            regulator_decay: 0,
        }
    }

    /// Whether this module wraps around the end of the program (`end < begin`).
    pub fn wraps(&self) -> bool {
        self.end < self.begin
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.members.contains(&pos)
    }
}
