//! Thread scheduler: a bounded pool of slot-addressed threads with
//! priority-based admission, preemption, and a stable per-tick execution
//! order.
//!
//! Draining the event FIFO is not this crate's job — that belongs to
//! `linevm-dispatch`. The umbrella VM calls the dispatcher's drain, then
//! [`Scheduler::process_single`], which covers admission and stepping.

use linevm_program::ModuleId;
use linevm_thread::{MemoryState, Thread};
use std::collections::{BTreeSet, VecDeque};

pub type SlotId = u32;

/// The two host hooks the scheduler invokes: set up a freshly spawned
/// thread's first call frame, and advance one already-admitted thread by
/// one step. Both carry the thread's own slot id, so a host VM can publish
/// it as the "current thread handle" instruction executors read back, and
/// invalidate that handle once the call returns.
pub trait RuntimeHooks<V, M: MemoryState> {
    fn init_thread(&self, vm: &mut V, slot_id: SlotId, thread: &mut Thread<M>, module_id: ModuleId);
    fn step_thread(&self, vm: &mut V, slot_id: SlotId, thread: &mut Thread<M>);
}

/// Bounded pool of thread slots. Generic over the host's memory state type
/// only — the VM type and hooks are supplied per call, never stored, so a
/// `Scheduler` has no cyclic reference back to its host.
pub struct Scheduler<M: MemoryState> {
    threads: Vec<Option<Thread<M>>>,
    active: BTreeSet<SlotId>,
    exec_order: Vec<SlotId>,
    unused: Vec<SlotId>,
    pending: VecDeque<SlotId>,
    is_executing: bool,
    max_active_threads: usize,
    max_thread_space: usize,
    use_thread_priority: bool,
}

impl<M: MemoryState> Default for Scheduler<M> {
    /// An empty, zero-capacity scheduler. Only useful as a placeholder for
    /// the `mem::take`/swap-back pattern a host VM facade needs to pass
    /// itself as the `vm` argument to its own scheduler field.
    fn default() -> Self {
        Self::new(0, 0, false)
    }
}

impl<M: MemoryState> Scheduler<M> {
    pub fn new(max_active_threads: usize, max_thread_space: usize, use_thread_priority: bool) -> Self {
        Self {
            threads: Vec::new(),
            active: BTreeSet::new(),
            exec_order: Vec::new(),
            unused: Vec::new(),
            pending: VecDeque::new(),
            is_executing: false,
            max_active_threads,
            max_thread_space,
            use_thread_priority,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn exec_order(&self) -> &[SlotId] {
        &self.exec_order
    }

    pub fn thread(&self, id: SlotId) -> Option<&Thread<M>> {
        self.threads.get(id as usize).and_then(|s| s.as_ref())
    }

    pub fn thread_mut(&mut self, id: SlotId) -> Option<&mut Thread<M>> {
        self.threads.get_mut(id as usize).and_then(|s| s.as_mut())
    }

    fn acquire_slot(&mut self) -> Option<SlotId> {
        if let Some(id) = self.unused.pop() {
            return Some(id);
        }
        if self.threads.len() < self.max_thread_space {
            let id = self.threads.len() as SlotId;
            self.threads.push(None);
            Some(id)
        } else {
            None
        }
    }

    /// Acquire a slot, reset it, run the host's `init_thread` hook, and mark
    /// it PENDING. Returns `None` on capacity exhaustion — a silent soft
    /// failure, not an error.
    pub fn spawn_by_id<V, H: RuntimeHooks<V, M>>(
        &mut self,
        vm: &mut V,
        hooks: &H,
        module_id: ModuleId,
        priority: f64,
    ) -> Option<SlotId> {
        assert!(
            !self.is_executing,
            "spawn attempted while the scheduler is mid-step: contract violation"
        );
        let Some(slot_id) = self.acquire_slot() else {
            tracing::trace!(module_id, "spawn dropped: thread space exhausted");
            return None;
        };
        let thread = self.threads[slot_id as usize].get_or_insert_with(|| Thread::new(priority));
        thread.reset(priority);
        hooks.init_thread(vm, slot_id, thread, module_id);
        self.pending.push_back(slot_id);
        tracing::trace!(slot_id, module_id, priority, "thread spawned, pending admission");
        Some(slot_id)
    }

    /// Kill every PENDING thread and return their slots to `unused`.
    pub fn remove_all_pending(&mut self) -> Vec<SlotId> {
        let removed: Vec<SlotId> = self.pending.drain(..).collect();
        for &id in &removed {
            self.kill_pending_slot(id);
        }
        removed
    }

    fn priority_of(&self, id: SlotId) -> f64 {
        self.threads[id as usize].as_ref().map(|t| t.priority).unwrap_or(0.0)
    }

    fn activate_slot(&mut self, id: SlotId) {
        if let Some(t) = self.threads[id as usize].as_mut() {
            t.activate();
        }
        self.active.insert(id);
        self.exec_order.push(id);
    }

    fn kill_pending_slot(&mut self, id: SlotId) {
        if let Some(t) = self.threads[id as usize].as_mut() {
            t.kill();
        }
        self.unused.push(id);
    }

    fn kill_active_slot(&mut self, id: SlotId) {
        if let Some(t) = self.threads[id as usize].as_mut() {
            t.kill();
        }
        self.active.remove(&id);
        self.exec_order.retain(|&x| x != id);
        self.unused.push(id);
    }

    /// Admission, run once at the top of every tick before stepping.
    fn activate_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        if !self.use_thread_priority || self.pending.len() + self.active.len() <= self.max_active_threads {
            while let Some(id) = self.pending.pop_front() {
                if self.active.len() < self.max_active_threads {
                    self.activate_slot(id);
                } else {
                    self.kill_pending_slot(id);
                }
            }
            return;
        }
        self.preempt();
    }

    /// Priority preemption: promote the highest-priority pending threads,
    /// displacing lower-priority active ones when the pending side strictly
    /// outranks them. Ties break on slot id — lower id first for kills,
    /// higher id first for promotions.
    fn preempt(&mut self) {
        let mut pending_ids: Vec<SlotId> = self.pending.drain(..).collect();
        pending_ids.sort_by(|&a, &b| {
            self.priority_of(b)
                .partial_cmp(&self.priority_of(a))
                .unwrap()
                .then(b.cmp(&a))
        });

        let max_pending_priority = self.priority_of(pending_ids[0]);
        let mut active_candidates: Vec<SlotId> = self
            .active
            .iter()
            .copied()
            .filter(|&id| self.priority_of(id) < max_pending_priority)
            .collect();
        active_candidates.sort_by(|&a, &b| {
            self.priority_of(a)
                .partial_cmp(&self.priority_of(b))
                .unwrap()
                .then(a.cmp(&b))
        });

        let mut pi = 0usize;
        let mut ai = 0usize;
        let mut promoted: Vec<SlotId> = Vec::new();
        let mut killed: Vec<SlotId> = Vec::new();

        let mut room = self.max_active_threads.saturating_sub(self.active.len());
        while room > 0 && pi < pending_ids.len() {
            promoted.push(pending_ids[pi]);
            pi += 1;
            room -= 1;
        }

        while pi < pending_ids.len() && ai < active_candidates.len() {
            let pending_priority = self.priority_of(pending_ids[pi]);
            let active_priority = self.priority_of(active_candidates[ai]);
            if pending_priority > active_priority {
                killed.push(active_candidates[ai]);
                promoted.push(pending_ids[pi]);
                pi += 1;
                ai += 1;
            } else {
                break;
            }
        }

        for &id in &killed {
            self.kill_active_slot(id);
        }
        for &id in &promoted {
            self.activate_slot(id);
        }
        for &id in &pending_ids[pi..] {
            self.kill_pending_slot(id);
        }

        tracing::debug!(
            promoted = promoted.len(),
            killed = killed.len(),
            "priority preemption resolved"
        );
    }

    /// One hardware tick: admit pending, then step every RUNNING thread in
    /// `exec_order`, removing any that die along the way.
    pub fn process_single<V, H: RuntimeHooks<V, M>>(&mut self, vm: &mut V, hooks: &H) {
        self.is_executing = true;
        self.activate_pending();

        let mut i = 0;
        while i < self.exec_order.len() {
            let id = self.exec_order[i];
            let already_dead = self
                .threads
                .get(id as usize)
                .and_then(|s| s.as_ref())
                .map(|t| t.is_dead())
                .unwrap_or(true);
            if already_dead {
                self.exec_order.remove(i);
                self.active.remove(&id);
                self.unused.push(id);
                continue;
            }

            let thread = self.threads[id as usize].as_mut().unwrap();
            hooks.step_thread(vm, id, thread);

            let now_dead = self.threads[id as usize].as_ref().unwrap().is_dead();
            if now_dead {
                self.exec_order.remove(i);
                self.active.remove(&id);
                self.unused.push(id);
                continue;
            }
            i += 1;
        }

        self.is_executing = false;
    }

    /// `k` hardware ticks in sequence.
    pub fn process<V, H: RuntimeHooks<V, M>>(&mut self, vm: &mut V, hooks: &H, k: usize) {
        for _ in 0..k {
            self.process_single(vm, hooks);
        }
    }

    /// Lower or raise the active-thread cap. Lowering kills threads from the
    /// tail of `exec_order` (youngest-first) until the limit holds.
    pub fn set_active_limit(&mut self, n: usize) {
        self.max_active_threads = n;
        while self.active.len() > n {
            let Some(id) = self.exec_order.pop() else {
                break;
            };
            if let Some(t) = self.threads[id as usize].as_mut() {
                t.kill();
            }
            self.active.remove(&id);
            self.unused.push(id);
        }
    }

    /// Resize slot storage. Shrinking erases every slot id `>= n` from every
    /// tracker (active, exec_order, unused, pending).
    pub fn set_thread_capacity(&mut self, n: usize) {
        self.max_thread_space = n;
        if self.threads.len() > n {
            self.threads.truncate(n);
        }
        self.active.retain(|&id| (id as usize) < n);
        self.exec_order.retain(|&id| (id as usize) < n);
        self.unused.retain(|&id| (id as usize) < n);
        self.pending.retain(|&id| (id as usize) < n);
    }
}
