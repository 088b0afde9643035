//! The VM ("Hardware") facade: owns the compiled program, the resolver's
//! match cache and regulators, the thread pool, and the event FIFO; borrows
//! the (shared, read-only) instruction and event libraries.

use linevm_compiler::compile;
use linevm_dispatch::EventDispatcher;
use linevm_events::{Event, EventLibrary};
use linevm_instr::InstructionLibrary;
use linevm_program::{ModuleId, Program, Tag};
use linevm_resolver::Resolver;
use linevm_sched::{RuntimeHooks, Scheduler, SlotId};
use linevm_thread::{CallFrame, MemoryModel, Thread};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::VmConfig;

/// One runtime instance: a compiled program, its modules, a thread pool, and
/// an event queue. `instr_lib`/`event_lib` are borrowed because they're
/// shared, read-only registries across every cooperating VM in an
/// experiment; everything else is uniquely owned.
pub struct Vm<'a, T: Tag, Mem: MemoryModel, P> {
    instr_lib: &'a InstructionLibrary<Self, T>,
    event_lib: &'a EventLibrary<Self, P>,
    resolver: Resolver<T>,
    scheduler: Scheduler<Mem::State>,
    dispatcher: EventDispatcher<P>,
    program: Program<T>,
    memory_model: Mem,
    config: VmConfig<T>,
    rng: StdRng,
    /// The slot id of the thread currently being stepped, valid only for the
    /// duration of that thread's `step_thread` call. Lets instruction
    /// executors reach their own call frame despite `execute`'s signature
    /// never passing it directly.
    current_thread: Option<SlotId>,
    /// `true` for the duration of a `with_scheduler` call: `scheduler` is
    /// checked out to a local variable and `self.scheduler` holds only the
    /// zero-capacity placeholder. Scheduler-mutating calls made while this
    /// is set (i.e. from inside an instruction executor mid-step) queue
    /// into `deferred_scheduler_ops` instead of touching the placeholder.
    scheduler_checked_out: bool,
    deferred_scheduler_ops: Vec<DeferredSchedulerOp>,
}

/// A scheduler mutation requested while `scheduler` was checked out from
/// `self.scheduler` — queued here and replayed against the real scheduler
/// right after it's done stepping, landing as PENDING for the *next* tick's
/// admission. Spawning from inside an executor is well-defined this way;
/// the other scheduler-admin calls get the same treatment so none of them
/// is silently lost against the placeholder.
enum DeferredSchedulerOp {
    Spawn { module_id: ModuleId, priority: f64 },
    RemoveAllPending,
    SetActiveLimit(usize),
    SetThreadCapacity(usize),
}

/// Zero-sized adapter satisfying `linevm_sched::RuntimeHooks`. Holds no
/// state of its own — everything it touches comes through the `vm: &mut V`
/// parameter the scheduler hands it, so it never aliases the VM it steps.
struct VmHooks;

impl<'a, T, Mem, P> RuntimeHooks<Vm<'a, T, Mem, P>, Mem::State> for VmHooks
where
    T: Tag,
    Mem: MemoryModel + Default,
{
    fn init_thread(
        &self,
        vm: &mut Vm<'a, T, Mem, P>,
        slot_id: SlotId,
        thread: &mut Thread<Mem::State>,
        module_id: ModuleId,
    ) {
        let modules = vm.resolver.modules().to_vec();
        let memory_model = std::mem::take(&mut vm.memory_model);
        let max_call_depth = vm.config.max_call_depth;

        vm.current_thread = Some(slot_id);

        // A freshly spawned thread's root call is not circular — it falls
        // through once and dies, unless its own body re-enters itself
        // explicitly via an instruction executor.
        linevm_flow::call(&mut thread.exec_state, &memory_model, &modules, module_id, false, max_call_depth);
        thread.activate();

        vm.memory_model = memory_model;
        vm.current_thread = None;
    }

    fn step_thread(&self, vm: &mut Vm<'a, T, Mem, P>, slot_id: SlotId, thread: &mut Thread<Mem::State>) {
        let instr_lib = vm.instr_lib;
        let modules = vm.resolver.modules().to_vec();
        let program = std::mem::take(&mut vm.program);
        let memory_model = std::mem::take(&mut vm.memory_model);

        vm.current_thread = Some(slot_id);

        linevm_thread::step_thread(vm, thread, &program, &modules, instr_lib, &memory_model);

        vm.program = program;
        vm.memory_model = memory_model;
        vm.current_thread = None;
    }
}

impl<'a, T, Mem, P> Vm<'a, T, Mem, P>
where
    T: Tag,
    Mem: MemoryModel + Default,
{
    /// Compile `program`, build a fresh resolver and scheduler from
    /// `config`, and seed the VM's own PRNG. Panics if
    /// `config.default_module_tag` is unset — compiling requires a
    /// fallback tag for the no-`MODULE_DEF` case.
    pub fn new(
        instr_lib: &'a InstructionLibrary<Self, T>,
        event_lib: &'a EventLibrary<Self, P>,
        program: Program<T>,
        memory_model: Mem,
        config: VmConfig<T>,
        seed: u64,
    ) -> Self {
        let default_tag = config
            .default_module_tag
            .clone()
            .expect("VmConfig::default_module_tag must be set before constructing a Vm");
        let compiled = compile(&program, instr_lib, &default_tag);
        let mut resolver = Resolver::new();
        resolver.set_modules(compiled);
        let scheduler = Scheduler::new(
            config.max_active_threads,
            config.max_thread_space,
            config.use_thread_priority,
        );

        Self {
            instr_lib,
            event_lib,
            resolver,
            scheduler,
            dispatcher: EventDispatcher::new(),
            program,
            memory_model,
            config,
            rng: StdRng::seed_from_u64(seed),
            current_thread: None,
            scheduler_checked_out: false,
            deferred_scheduler_ops: Vec::new(),
        }
    }

    pub fn config(&self) -> &VmConfig<T> {
        &self.config
    }

    pub fn program(&self) -> &Program<T> {
        &self.program
    }

    pub fn resolver(&self) -> &Resolver<T> {
        &self.resolver
    }

    /// Exposed so instruction executors can drive [`linevm_flow::find_end_of_block`]
    /// themselves — executors may read whatever VM state they need.
    pub fn instr_lib(&self) -> &InstructionLibrary<Self, T> {
        self.instr_lib
    }

    /// The scheduler's read-only view. While a tick is stepping threads
    /// (i.e. called reentrantly from inside an instruction executor), this
    /// is the zero-capacity placeholder, not live state — the real
    /// scheduler is checked out for the duration of the step. Call it
    /// between ticks to see the real thread pool.
    pub fn scheduler(&self) -> &Scheduler<Mem::State> {
        &self.scheduler
    }

    pub fn memory_model(&self) -> &Mem {
        &self.memory_model
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Inherent rather than part of `RuntimeHooks`, since it never varies
    /// per host.
    pub fn find_module_matches(&self, tag: &T, n: usize) -> Vec<ModuleId> {
        self.resolver.find_module_matches(tag, n)
    }

    /// The call frame on top of the currently-executing thread's flow stack.
    /// Only `Some` from inside an instruction executor's `execute` call;
    /// `None` outside of stepping.
    pub fn current_call_frame_mut(&mut self) -> Option<&mut CallFrame<Mem::State>> {
        let id = self.current_thread?;
        self.scheduler.thread_mut(id)?.exec_state.last_mut()
    }

    /// Check `scheduler` out to a local variable for the duration of `f`,
    /// leaving a zero-capacity placeholder in `self.scheduler` so `f` can
    /// still hold `&mut Self` without aliasing the scheduler it's driving.
    ///
    /// `f` runs with `vm.scheduler_checked_out` set, so any scheduler call
    /// made reentrantly from inside it (an instruction executor calling
    /// `spawn_by_id`, say) queues into `deferred_scheduler_ops` instead of
    /// reaching the placeholder. Once `f` returns, those queued ops are
    /// replayed against the real scheduler before it's handed back — a
    /// spawn requested mid-step lands PENDING, admitted on the next tick,
    /// rather than silently disappearing.
    fn with_scheduler<R>(&mut self, f: impl FnOnce(&mut Self, &mut Scheduler<Mem::State>) -> R) -> R {
        let mut scheduler = std::mem::take(&mut self.scheduler);

        self.scheduler_checked_out = true;
        let result = f(self, &mut scheduler);
        self.scheduler_checked_out = false;

        for op in std::mem::take(&mut self.deferred_scheduler_ops) {
            match op {
                DeferredSchedulerOp::Spawn { module_id, priority } => {
                    scheduler.spawn_by_id(self, &VmHooks, module_id, priority);
                }
                DeferredSchedulerOp::RemoveAllPending => {
                    scheduler.remove_all_pending();
                }
                DeferredSchedulerOp::SetActiveLimit(n) => scheduler.set_active_limit(n),
                DeferredSchedulerOp::SetThreadCapacity(n) => scheduler.set_thread_capacity(n),
            }
        }

        self.scheduler = scheduler;
        result
    }

    /// Acquire a slot, run `init_thread`, and mark it PENDING. `None` on
    /// capacity exhaustion — a silent soft failure, not an error.
    ///
    /// Called reentrantly (from inside an instruction executor, itself
    /// running inside a tick's `with_scheduler` window), this can't report
    /// a slot id yet — the spawn is queued and only takes effect once the
    /// current step finishes, so it always returns `None` in that case.
    pub fn spawn_by_id(&mut self, module_id: ModuleId, priority: f64) -> Option<SlotId> {
        if self.scheduler_checked_out {
            self.deferred_scheduler_ops
                .push(DeferredSchedulerOp::Spawn { module_id, priority });
            tracing::trace!(module_id, "spawn requested mid-step: deferred to next tick's admission");
            return None;
        }
        self.with_scheduler(|vm, scheduler| scheduler.spawn_by_id(vm, &VmHooks, module_id, priority))
    }

    /// Resolve `tag` to up to `n` modules and attempt to spawn each.
    pub fn spawn_by_tag(&mut self, tag: &T, n: usize, priority: f64) -> Vec<SlotId> {
        let module_ids = self.find_module_matches(tag, n);
        module_ids
            .into_iter()
            .filter_map(|module_id| self.spawn_by_id(module_id, priority))
            .collect()
    }

    /// Called reentrantly, the removal is deferred and this returns an
    /// empty list — the caller can't be told which slots were freed until
    /// the deferred op actually runs.
    pub fn remove_all_pending(&mut self) -> Vec<SlotId> {
        if self.scheduler_checked_out {
            self.deferred_scheduler_ops.push(DeferredSchedulerOp::RemoveAllPending);
            return Vec::new();
        }
        self.scheduler.remove_all_pending()
    }

    pub fn set_active_limit(&mut self, n: usize) {
        if self.scheduler_checked_out {
            self.deferred_scheduler_ops.push(DeferredSchedulerOp::SetActiveLimit(n));
            return;
        }
        self.scheduler.set_active_limit(n);
    }

    pub fn set_thread_capacity(&mut self, n: usize) {
        if self.scheduler_checked_out {
            self.deferred_scheduler_ops
                .push(DeferredSchedulerOp::SetThreadCapacity(n));
            return;
        }
        self.scheduler.set_thread_capacity(n);
    }

    /// Append to the event FIFO.
    pub fn queue_event(&mut self, event: Event<P>) {
        self.dispatcher.queue_event(event);
    }

    /// Run every dispatcher registered for `event.event_id` immediately,
    /// bypassing the FIFO.
    pub fn trigger_event(&mut self, event: &Event<P>) {
        let lib = self.event_lib;
        lib.dispatch(self, event);
    }

    /// Run the single handler registered for `event.event_id`.
    pub fn handle_event(&mut self, event: &Event<P>) {
        let lib = self.event_lib;
        lib.handle(self, event);
    }

    /// One hardware tick: drain the event FIFO, admit pending threads, step
    /// every running thread, then decay regulators.
    pub fn tick(&mut self) {
        let lib = self.event_lib;
        let mut dispatcher = std::mem::take(&mut self.dispatcher);
        dispatcher.drain_tick(self, lib);
        self.dispatcher = dispatcher;

        self.with_scheduler(|vm, scheduler| scheduler.process_single(vm, &VmHooks));

        self.resolver.tick_regulators();
    }

    /// `k` hardware ticks in sequence. The host's way of budgeting
    /// long-running computation — the runtime itself imposes no per-step
    /// time budget.
    pub fn process(&mut self, k: usize) {
        for _ in 0..k {
            self.tick();
        }
    }

    /// Wipe all runtime execution state (threads, event queue, the memory
    /// model's global state) while keeping the compiled program and its
    /// modules untouched.
    pub fn reset_hardware(&mut self) {
        self.scheduler = Scheduler::new(
            self.config.max_active_threads,
            self.config.max_thread_space,
            self.config.use_thread_priority,
        );
        self.dispatcher = EventDispatcher::new();
        self.memory_model.reset_global();
        tracing::debug!("hardware reset");
    }

    /// Recompile against a new program, replace the resolver's module list,
    /// and reset hardware state (threads would otherwise reference dead
    /// module ids).
    pub fn reset_program(&mut self, program: Program<T>) {
        let default_tag = self
            .config
            .default_module_tag
            .clone()
            .expect("VmConfig::default_module_tag must be set to recompile");
        let compiled = compile(&program, self.instr_lib, &default_tag);
        self.resolver.set_modules(compiled);
        self.program = program;
        self.reset_hardware();
    }
}
