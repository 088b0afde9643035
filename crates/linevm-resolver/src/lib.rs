//! Tag-based module resolver: a cached best-match lookup from tag to
//! module id, with optional per-module regulation.

use linevm_compiler::CompiledProgram;
use linevm_program::{Module, ModuleId, Tag};
use std::cell::RefCell;
use std::collections::HashMap;

/// Resolves tags to module ids against the current compiled program.
///
/// Owns the module list (including each module's live regulator state) and
/// a best-match cache keyed by tag. Any call that changes the module list or
/// a regulator value invalidates the cache, keeping it coherent with the set
/// of modules currently compiled.
pub struct Resolver<T: Tag> {
    modules: Vec<Module<T>>,
    cache: RefCell<HashMap<T, Vec<ModuleId>>>,
}

impl<T: Tag> Resolver<T> {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Replace the module list wholesale (called after every `compile`).
    /// Regulator state does not carry over — a recompiled program means a
    /// new module list, with fresh defaults.
    pub fn set_modules(&mut self, compiled: CompiledProgram<T>) {
        self.modules = compiled.modules;
        self.invalidate_cache();
        tracing::debug!(module_count = self.modules.len(), "resolver modules replaced");
    }

    pub fn modules(&self) -> &[Module<T>] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module<T>> {
        self.modules.get(id as usize)
    }

    fn invalidate_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Up to `n` module ids, ranked by descending match score. Memoized by
    /// `tag` until the next cache invalidation.
    pub fn find_module_matches(&self, tag: &T, n: usize) -> Vec<ModuleId> {
        if let Some(cached) = self.cache.borrow().get(tag) {
            return cached.iter().take(n).copied().collect();
        }

        let mut scored: Vec<(f64, ModuleId)> = self
            .modules
            .iter()
            .map(|m| (score(tag, m), m.id))
            .collect();
        // Descending score, ties broken by ascending module id for
        // deterministic output across ticks on identical input.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(a.1.cmp(&b.1)));

        let ranked: Vec<ModuleId> = scored.into_iter().map(|(_, id)| id).collect();
        let result = ranked.iter().take(n).copied().collect();
        self.cache.borrow_mut().insert(tag.clone(), ranked);
        result
    }

    /// Replace a module's regulator value and reset its decay counter to
    /// [`SET_REGULATOR_DECAY_TICKS`].
    pub fn set_regulator(&mut self, module_id: ModuleId, value: f64) {
        if let Some(m) = self.modules.get_mut(module_id as usize) {
            m.regulator = value;
            m.regulator_decay = SET_REGULATOR_DECAY_TICKS;
            self.invalidate_cache();
        }
    }

    /// `new = target * budge + old * (1 - budge)`, `budge` clamped to `[0, 1]`.
    pub fn adjust_regulator(&mut self, module_id: ModuleId, target: f64, budge: f64) {
        let budge = budge.clamp(0.0, 1.0);
        if let Some(m) = self.modules.get_mut(module_id as usize) {
            m.regulator = target * budge + m.regulator * (1.0 - budge);
            self.invalidate_cache();
        }
    }

    /// Current regulator value, without side effects.
    pub fn sense_regulator(&self, module_id: ModuleId) -> f64 {
        self.modules
            .get(module_id as usize)
            .map(|m| m.regulator)
            .unwrap_or(1.0)
    }

    /// Per-tick decay: every module with a nonzero decay counter ticks down
    /// by one; at zero, its regulator reverts to the neutral value `1.0`.
    pub fn tick_regulators(&mut self) {
        let mut changed = false;
        for m in &mut self.modules {
            if m.regulator_decay > 0 {
                m.regulator_decay -= 1;
                if m.regulator_decay == 0 {
                    m.regulator = 1.0;
                }
                changed = true;
            }
        }
        if changed {
            self.invalidate_cache();
        }
    }
}

impl<T: Tag> Default for Resolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Ticks a regulator set via [`Resolver::set_regulator`] stays boosted before
/// reverting to neutral. The reset duration isn't caller-supplied — the
/// two-argument contract only says "resets the counter" — so it's a fixed
/// constant here rather than a third parameter.
const SET_REGULATOR_DECAY_TICKS: u32 = 10;

/// Match score: raw tag similarity, additively biased by the module's
/// regulator (`ln(regulator)` so the neutral default of `1.0` contributes
/// zero, values above `1.0` boost the score, and values below `1.0` damp it
/// without flipping the sign of a negative similarity).
fn score<T: Tag>(tag: &T, module: &Module<T>) -> f64 {
    tag.similarity(&module.tag) + module.regulator.ln()
}
