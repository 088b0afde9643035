//! End-to-end scenarios driving the assembled `Vm` rather than any one leaf
//! crate in isolation.

use linevm::{
    Event, EventLibrary, Instruction, InstructionLibrary, IntTag, MemoryModel, MemoryState,
    Program, Properties, Vm, VmConfig,
};

#[derive(Debug, Clone, PartialEq)]
struct Regs {
    r0: i64,
}

impl Default for Regs {
    fn default() -> Self {
        Regs { r0: 0 }
    }
}

impl MemoryState for Regs {
    fn reset(&mut self) {
        self.r0 = 0;
    }
}

/// Every spawned frame starts with `r0 = 3` — the while-loop scenario needs
/// a nonzero starting count and nothing else in this file cares about the
/// value, so one shared model keeps the test bodies short.
#[derive(Debug, Default)]
struct RegsModel;

impl MemoryModel for RegsModel {
    type State = Regs;
    fn new_state(&self) -> Regs {
        Regs { r0: 3 }
    }
    fn on_call(&self, _caller: &mut Regs, _callee: &mut Regs) {}
    fn on_return(&self, _returning: &mut Regs, _caller: &mut Regs) {}
    fn reset_global(&mut self) {}
}

fn base_config() -> VmConfig<IntTag> {
    let mut config = VmConfig::default();
    config.default_module_tag = Some(IntTag(0));
    config
}

#[test]
fn spawn_by_tag_runs_then_dies_after_four_ticks() {
    let mut lib = InstructionLibrary::<Vm<'_, IntTag, RegsModel, ()>, IntTag>::new();
    let module_def = lib
        .register("module-def", Properties::MODULE_DEF, "", Box::new(|_, _| {}))
        .unwrap();
    let nop = lib
        .register("nop", Properties::NONE, "", Box::new(|_, _| {}))
        .unwrap();
    let block_close = lib
        .register(
            "block-close",
            Properties::BLOCK_CLOSE,
            "",
            Box::new(|vm: &mut Vm<'_, IntTag, RegsModel, ()>, _| {
                if let Some(frame) = vm.current_call_frame_mut() {
                    linevm_flow::close_flow(frame);
                }
            }),
        )
        .unwrap();

    // [MODULE_DEF(tag=10), NOP, NOP, BLOCK_CLOSE]
    let program = Program::from_instructions(vec![
        Instruction::new(module_def, vec![], vec![IntTag(10)]),
        Instruction::bare(nop),
        Instruction::bare(nop),
        Instruction::bare(block_close),
    ]);

    let event_lib = EventLibrary::<Vm<'_, IntTag, RegsModel, ()>, ()>::new();
    let mut vm = Vm::new(&lib, &event_lib, program, RegsModel, base_config(), 1);

    let spawned = vm.spawn_by_tag(&IntTag(10), 1, 1.0);
    assert_eq!(spawned.len(), 1);

    vm.tick();
    assert_eq!(vm.scheduler().exec_order(), &[0]);
    assert!(!vm.scheduler().thread(0).unwrap().is_dead());

    vm.process(3);
    assert!(vm.scheduler().thread(0).unwrap().is_dead());
}

#[test]
fn priority_preemption_kills_the_lower_id_tied_active_thread() {
    let mut lib = InstructionLibrary::<Vm<'_, IntTag, RegsModel, ()>, IntTag>::new();
    let module_def = lib
        .register("module-def", Properties::MODULE_DEF, "", Box::new(|_, _| {}))
        .unwrap();
    let nop = lib
        .register("nop", Properties::NONE, "", Box::new(|_, _| {}))
        .unwrap();

    // Five bare NOPs and no BLOCK_CLOSE: the thread stays alive long enough
    // to observe preemption without racing its own natural death.
    let program = Program::from_instructions(vec![
        Instruction::new(module_def, vec![], vec![IntTag(1)]),
        Instruction::bare(nop),
        Instruction::bare(nop),
        Instruction::bare(nop),
        Instruction::bare(nop),
        Instruction::bare(nop),
    ]);

    let event_lib = EventLibrary::<Vm<'_, IntTag, RegsModel, ()>, ()>::new();
    let mut config = base_config();
    config.max_active_threads = 2;
    let mut vm = Vm::new(&lib, &event_lib, program, RegsModel, config, 2);

    vm.spawn_by_tag(&IntTag(1), 1, 1.0);
    vm.spawn_by_tag(&IntTag(1), 1, 1.0);
    vm.tick();
    assert_eq!(vm.scheduler().active_count(), 2);

    vm.spawn_by_id(0, 2.0);
    vm.tick();

    assert_eq!(vm.scheduler().active_count(), 2);
    assert!(vm.scheduler().thread(0).unwrap().is_dead());
    assert!(!vm.scheduler().thread(1).unwrap().is_dead());
    assert!(!vm.scheduler().thread(2).unwrap().is_dead());
}

#[test]
fn while_loop_decrements_exactly_three_times() {
    let mut lib = InstructionLibrary::<Vm<'_, IntTag, RegsModel, ()>, IntTag>::new();
    let module_def = lib
        .register("module-def", Properties::MODULE_DEF, "", Box::new(|_, _| {}))
        .unwrap();
    let while_op = lib
        .register(
            "while",
            Properties::BLOCK_OPEN,
            "",
            Box::new(|vm: &mut Vm<'_, IntTag, RegsModel, ()>, _instr: &Instruction<IntTag>| {
                let extracted = match vm.current_call_frame_mut() {
                    Some(frame) => match frame.effective_position() {
                        Some((mp, ip)) => Some((mp, ip, frame.memory.r0)),
                        None => None,
                    },
                    None => None,
                };
                let Some((mp, body_start, r0)) = extracted else {
                    return;
                };

                let modules = vm.resolver().modules().to_vec();
                let Some(close_pos) =
                    linevm_flow::find_end_of_block(vm.instr_lib(), vm.program(), &modules, mp, body_start)
                else {
                    return;
                };

                if r0 > 0 {
                    let header_pos = body_start.saturating_sub(1);
                    if let Some(frame) = vm.current_call_frame_mut() {
                        linevm_flow::open_flow(frame, linevm_flow::FlowKind::While, mp, header_pos, close_pos);
                        // `open_flow` seeds the new record's `ip` at `begin`
                        // (the header, already executed); advance it to the
                        // body so the next step runs DEC, not WHILE again.
                        if let Some(top) = frame.flow_stack.last_mut() {
                            top.ip = body_start;
                        }
                    }
                } else if let Some(frame) = vm.current_call_frame_mut() {
                    if let Some(top) = frame.flow_stack.last_mut() {
                        top.ip = close_pos + 1;
                    }
                }
            }),
        )
        .unwrap();
    let dec = lib
        .register(
            "dec",
            Properties::NONE,
            "",
            Box::new(|vm: &mut Vm<'_, IntTag, RegsModel, ()>, _| {
                if let Some(frame) = vm.current_call_frame_mut() {
                    frame.memory.r0 -= 1;
                }
            }),
        )
        .unwrap();
    let block_close = lib
        .register(
            "block-close",
            Properties::BLOCK_CLOSE,
            "",
            Box::new(|vm: &mut Vm<'_, IntTag, RegsModel, ()>, _| {
                if let Some(frame) = vm.current_call_frame_mut() {
                    linevm_flow::close_flow(frame);
                }
            }),
        )
        .unwrap();

    // [MODULE_DEF(tag=1), WHILE(r0), DEC(r0), BLOCK_CLOSE]
    let program = Program::from_instructions(vec![
        Instruction::new(module_def, vec![], vec![IntTag(1)]),
        Instruction::bare(while_op),
        Instruction::bare(dec),
        Instruction::bare(block_close),
    ]);

    let event_lib = EventLibrary::<Vm<'_, IntTag, RegsModel, ()>, ()>::new();
    let mut vm = Vm::new(&lib, &event_lib, program, RegsModel, base_config(), 3);

    vm.spawn_by_tag(&IntTag(1), 1, 1.0);
    // One WHILE/DEC/BLOCK_CLOSE cycle per 3 steps, three cycles to unwind
    // r0 from 3 to 0, plus the final failing WHILE check and the thread's
    // own death: comfortably inside 16 ticks.
    vm.process(16);

    assert!(vm.scheduler().thread(0).unwrap().is_dead());
}

#[test]
fn wraparound_module_executes_b_then_a_before_closing() {
    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counters {
        a: i64,
        b: i64,
    }
    impl MemoryState for Counters {
        fn reset(&mut self) {
            self.a = 0;
            self.b = 0;
        }
    }
    #[derive(Debug, Default)]
    struct CountersModel;
    impl MemoryModel for CountersModel {
        type State = Counters;
        fn new_state(&self) -> Counters {
            Counters::default()
        }
        fn on_call(&self, _c: &mut Counters, _cal: &mut Counters) {}
        fn on_return(&self, _r: &mut Counters, _c: &mut Counters) {}
        fn reset_global(&mut self) {}
    }

    let mut lib = InstructionLibrary::<Vm<'_, IntTag, CountersModel, ()>, IntTag>::new();
    let module_def = lib
        .register("module-def", Properties::MODULE_DEF, "", Box::new(|_, _| {}))
        .unwrap();
    let instr_a = lib
        .register(
            "instr-a",
            Properties::NONE,
            "",
            Box::new(|vm: &mut Vm<'_, IntTag, CountersModel, ()>, _| {
                if let Some(frame) = vm.current_call_frame_mut() {
                    frame.memory.a += 1;
                }
            }),
        )
        .unwrap();
    let instr_b = lib
        .register(
            "instr-b",
            Properties::NONE,
            "",
            Box::new(|vm: &mut Vm<'_, IntTag, CountersModel, ()>, _| {
                if let Some(frame) = vm.current_call_frame_mut() {
                    frame.memory.b += 1;
                }
            }),
        )
        .unwrap();

    // [INSTR_A, MODULE_DEF(tag=5), INSTR_B] -> module begin=2, end=0,
    // members={2,0}.
    let program = Program::from_instructions(vec![
        Instruction::bare(instr_a),
        Instruction::new(module_def, vec![], vec![IntTag(5)]),
        Instruction::bare(instr_b),
    ]);

    let event_lib = EventLibrary::<Vm<'_, IntTag, CountersModel, ()>, ()>::new();
    let mut config = VmConfig::default();
    config.default_module_tag = Some(IntTag(0));
    let mut vm = Vm::new(&lib, &event_lib, program, CountersModel, config, 4);

    let module = &vm.resolver().modules()[0];
    assert_eq!((module.begin, module.end), (2, 0));
    assert!(module.wraps());

    vm.spawn_by_id(0, 1.0);
    vm.process(2);
    assert_eq!(vm.scheduler().thread(0).unwrap().exec_state[0].memory, Counters { a: 1, b: 1 });

    vm.process(2);
    assert!(vm.scheduler().thread(0).unwrap().is_dead());
}

#[test]
fn event_handler_spawns_a_thread_by_tag() {
    let mut lib = InstructionLibrary::<Vm<'_, IntTag, RegsModel, IntTag>, IntTag>::new();
    let module_def = lib
        .register("module-def", Properties::MODULE_DEF, "", Box::new(|_, _| {}))
        .unwrap();
    let nop = lib
        .register("nop", Properties::NONE, "", Box::new(|_, _| {}))
        .unwrap();

    let program = Program::from_instructions(vec![
        Instruction::new(module_def, vec![], vec![IntTag(10)]),
        Instruction::bare(nop),
    ]);

    let mut event_lib = EventLibrary::<Vm<'_, IntTag, RegsModel, IntTag>, IntTag>::new();
    let spawn_request = event_lib
        .register(
            "spawn-request",
            "",
            Box::new(|vm: &mut Vm<'_, IntTag, RegsModel, IntTag>, event: &Event<IntTag>| {
                vm.spawn_by_tag(&event.payload, 1, 1.0);
            }),
        )
        .unwrap();

    let mut vm = Vm::new(&lib, &event_lib, program, RegsModel, base_config(), 5);

    assert!(vm.scheduler().exec_order().is_empty());
    vm.queue_event(Event::new(spawn_request, IntTag(10)));
    vm.tick();

    assert_eq!(vm.scheduler().exec_order(), &[0]);
}

#[test]
fn spawn_from_inside_an_executor_is_deferred_to_the_next_tick() {
    let mut lib = InstructionLibrary::<Vm<'_, IntTag, RegsModel, ()>, IntTag>::new();
    let module_def = lib
        .register("module-def", Properties::MODULE_DEF, "", Box::new(|_, _| {}))
        .unwrap();
    let nop = lib
        .register("nop", Properties::NONE, "", Box::new(|_, _| {}))
        .unwrap();
    let spawn_other = lib
        .register(
            "spawn-other",
            Properties::NONE,
            "",
            Box::new(|vm: &mut Vm<'_, IntTag, RegsModel, ()>, _| {
                // Reentrant: this runs from inside the scheduler's own step,
                // so the real scheduler is checked out and this spawn can't
                // be admitted until the checkout ends.
                let slot = vm.spawn_by_id(1, 1.0);
                assert!(slot.is_none(), "a reentrant spawn can't report a slot synchronously");
            }),
        )
        .unwrap();

    // Module 0: spawns module 1 from its own second instruction, then idles
    // on NOPs so it's still alive by the time module 1 should show up.
    let program = Program::from_instructions(vec![
        Instruction::new(module_def, vec![], vec![IntTag(1)]),
        Instruction::bare(spawn_other),
        Instruction::bare(nop),
        Instruction::bare(nop),
        Instruction::bare(nop),
        Instruction::new(module_def, vec![], vec![IntTag(2)]),
        Instruction::bare(nop),
        Instruction::bare(nop),
        Instruction::bare(nop),
        Instruction::bare(nop),
    ]);

    let event_lib = EventLibrary::<Vm<'_, IntTag, RegsModel, ()>, ()>::new();
    let mut vm = Vm::new(&lib, &event_lib, program, RegsModel, base_config(), 7);

    vm.spawn_by_id(0, 1.0);

    vm.tick();
    // Module 0 just ran its spawn_other instruction; module 1's spawn was
    // queued rather than admitted mid-step, so it isn't running yet.
    assert_eq!(vm.scheduler().exec_order(), &[0]);

    vm.tick();
    // Queued at the end of the previous tick, it's PENDING now and gets
    // admitted at the start of this tick's activation pass.
    assert_eq!(vm.scheduler().exec_order(), &[0, 1]);
    assert!(!vm.scheduler().thread(0).unwrap().is_dead());
    assert!(!vm.scheduler().thread(1).unwrap().is_dead());
}

#[test]
fn routine_close_does_not_move_the_callers_ip() {
    use linevm_flow::{close_flow, open_flow, CallFrame, FlowKind};

    #[derive(Debug, Default)]
    struct NoMemory;
    impl MemoryState for NoMemory {
        fn reset(&mut self) {}
    }

    // [CALL(mp=0, ip=5), ROUTINE(mp=1, ip=0)] -- closing the routine must
    // leave the caller's position exactly where it was.
    let mut frame = CallFrame::new(NoMemory, false);
    open_flow(&mut frame, FlowKind::Call, 0, 0, 10);
    frame.flow_stack.last_mut().unwrap().ip = 5;
    open_flow(&mut frame, FlowKind::Routine, 1, 0, 3);

    close_flow(&mut frame);

    assert_eq!(frame.flow_stack.len(), 1);
    let call_flow = frame.flow_stack[0];
    assert_eq!((call_flow.mp, call_flow.ip), (0, 5));
}
