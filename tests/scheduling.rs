mod common;

use common::*;
use coop_jvm::class::{ClassAst, ClassBuilder, Condition, Instruction::*, NumKind, ValueKind};
use coop_jvm::consts::{FieldAccessFlag, MethodAccessFlag};
use coop_jvm::runtime::{Blocker, Completion, ThreadStatus, Value, VmConfig};

const OBJECT: &str = "java/lang/Object";
const THREAD: &str = "java/lang/Thread";

/// `work()` calls `increment()` 1000 times; `increment` is synchronized on
/// the class unless `racy`.
fn counter_class(racy: bool) -> ClassAst {
    let mut counter = ClassBuilder::new("Counter");
    counter.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "count", "I");
    let count = counter.field_ref("Counter", "count", "I");
    let increment = counter.method_ref("Counter", "increment", "()V");
    let flags = if racy {
        PUBLIC_STATIC
    } else {
        PUBLIC_STATIC | MethodAccessFlag::SYNCHRONIZED
    };
    counter.method(
        flags,
        "increment",
        "()V",
        code(
            2,
            0,
            vec![GetStatic(count), Iconst(1), Add(NumKind::Int), PutStatic(count), Return(None)],
        ),
    );
    counter.method(
        PUBLIC_STATIC,
        "work",
        "()V",
        code(
            2,
            1,
            vec![
                Iconst(0),
                Store(ValueKind::Int, 0),
                Load(ValueKind::Int, 0),
                Iconst(1000),
                IfIcmp(Condition::Ge, 8),
                InvokeStatic(increment),
                Iinc(0, 1),
                Goto(2),
                Return(None),
            ],
        ),
    );
    counter.build()
}

fn run_counter(config: VmConfig, racy: bool) -> coop_jvm::Vm {
    let mut vm = vm_with(config, vec![counter_class(racy)]);
    let first = vm.spawn("Counter", "work", "()V", vec![]).expect("spawn");
    let second = vm.spawn("Counter", "work", "()V", vec![]).expect("spawn");
    assert!(!vm.run_until_idle());
    for id in [first, second] {
        assert_eq!(vm.thread_status(id), Some(ThreadStatus::Terminated));
    }
    vm
}

#[test]
fn test_synchronized_counter_has_no_lost_updates() {
    let vm = run_counter(VmConfig::default(), false);
    assert_eq!(static_int(&vm, "Counter", "count:I"), 2000);
}

#[test]
fn test_unsynchronized_counter_loses_updates() {
    let vm = run_counter(VmConfig::default(), true);
    assert!(static_int(&vm, "Counter", "count:I") < 2000);
}

#[test]
fn test_interleaving_is_reproducible() {
    let config = VmConfig::default().with_trace(true);
    let first = run_counter(config.clone(), true);
    let second = run_counter(config, true);
    assert!(!first.trace().is_empty());
    assert_eq!(first.trace(), second.trace());
    assert_eq!(
        static_int(&first, "Counter", "count:I"),
        static_int(&second, "Counter", "count:I")
    );
    // consecutive turns alternate between the two workers
    let threads: Vec<_> = first.trace().iter().take(6).map(|e| e.thread).collect();
    assert_ne!(threads[0], threads[1]);
}

/// A class with a static `lock` object created by its initializer.
fn lock_class(name: &str) -> ClassBuilder {
    let mut class = ClassBuilder::new(name);
    class.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "lock", "Ljava/lang/Object;");
    let lock = class.field_ref(name, "lock", "Ljava/lang/Object;");
    let object = class.class_ref(OBJECT);
    let init = class.method_ref(OBJECT, "<init>", "()V");
    class.method(
        MethodAccessFlag::STATIC,
        "<clinit>",
        "()V",
        code(2, 0, vec![New(object), Dup, InvokeSpecial(init), PutStatic(lock), Return(None)]),
    );
    class
}

#[test]
fn test_blocked_threads_acquire_in_arrival_order() {
    let mut sync = lock_class("Fifo");
    sync.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "order", "I");
    let lock = sync.field_ref("Fifo", "lock", "Ljava/lang/Object;");
    let order = sync.field_ref("Fifo", "order", "I");
    let sleep = sync.method_ref(THREAD, "sleep", "(J)V");
    sync.method(
        PUBLIC_STATIC,
        "hold",
        "()V",
        code(
            2,
            0,
            vec![
                GetStatic(lock),
                MonitorEnter,
                Lconst(200),
                InvokeStatic(sleep),
                GetStatic(lock),
                MonitorExit,
                Return(None),
            ],
        ),
    );
    sync.method(
        PUBLIC_STATIC,
        "enter",
        "(IJ)V",
        code(
            2,
            3,
            vec![
                Load(ValueKind::Long, 1),
                InvokeStatic(sleep),
                GetStatic(lock),
                MonitorEnter,
                GetStatic(order),
                Iconst(10),
                Mul(NumKind::Int),
                Load(ValueKind::Int, 0),
                Add(NumKind::Int),
                PutStatic(order),
                GetStatic(lock),
                MonitorExit,
                Return(None),
            ],
        ),
    );
    let mut vm = vm(vec![sync.build()]);
    let holder = vm.spawn("Fifo", "hold", "()V", vec![]).expect("spawn");
    let first = vm
        .spawn("Fifo", "enter", "(IJ)V", vec![Value::Int(1), Value::Long(50)])
        .expect("spawn");
    let second = vm
        .spawn("Fifo", "enter", "(IJ)V", vec![Value::Int(2), Value::Long(60)])
        .expect("spawn");

    let mut turns = 0;
    while vm.thread_status(second) != Some(ThreadStatus::Blocked) {
        assert!(vm.step(), "went idle before both contenders queued");
        turns += 1;
        assert!(turns < 10_000);
    }
    assert_eq!(vm.thread_status(first), Some(ThreadStatus::Blocked));
    assert_eq!(vm.thread_status(holder), Some(ThreadStatus::Waiting));

    assert!(!vm.run_until_idle());
    assert_eq!(static_int(&vm, "Fifo", "order:I"), 12);
}

#[test]
fn test_deadlock_leaves_both_threads_blocked() {
    let mut class = lock_class("Deadlock");
    class.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "other", "Ljava/lang/Object;");
    let a = class.field_ref("Deadlock", "lock", "Ljava/lang/Object;");
    let b = class.field_ref("Deadlock", "other", "Ljava/lang/Object;");
    let object = class.class_ref(OBJECT);
    let init = class.method_ref(OBJECT, "<init>", "()V");
    let sleep = class.method_ref(THREAD, "sleep", "(J)V");
    let make_b = class.method_ref("Deadlock", "prepare", "()V");
    class.method(
        PUBLIC_STATIC,
        "prepare",
        "()V",
        code(2, 0, vec![New(object), Dup, InvokeSpecial(init), PutStatic(b), Return(None)]),
    );
    let locking = |first, second| {
        code(
            2,
            0,
            vec![
                GetStatic(first),
                MonitorEnter,
                Lconst(20),
                InvokeStatic(sleep),
                GetStatic(second),
                MonitorEnter,
                GetStatic(second),
                MonitorExit,
                GetStatic(first),
                MonitorExit,
                Return(None),
            ],
        )
    };
    class.method(PUBLIC_STATIC, "left", "()V", locking(a, b));
    class.method(PUBLIC_STATIC, "right", "()V", locking(b, a));
    class.method(
        PUBLIC_STATIC,
        "setup",
        "()V",
        code(0, 0, vec![InvokeStatic(make_b), Return(None)]),
    );

    let mut vm = vm(vec![class.build()]);
    run_static(&mut vm, "Deadlock", "setup", "()V");
    let left = vm.spawn("Deadlock", "left", "()V", vec![]).expect("spawn");
    let right = vm.spawn("Deadlock", "right", "()V", vec![]).expect("spawn");
    assert!(!vm.run_until_idle());

    for id in [left, right] {
        assert_eq!(vm.thread_status(id), Some(ThreadStatus::Blocked));
        assert!(vm.completion(id).is_none());
        let thread = vm.threads().iter().find(|t| t.id() == id).expect("thread");
        assert!(matches!(thread.blocker(), Some(Blocker::Monitor(_))));
    }
    let backtrace = vm.backtrace(left).expect("backtrace");
    assert_eq!(backtrace[0].method_name, "left");
    assert_eq!(backtrace[0].pc, 5);
}

/// `Gate.hold` owns the `Gate` class monitor and needs `Slow`, whose
/// initializer needs that same monitor.
fn initializer_deadlock_classes() -> Vec<ClassAst> {
    let synchronized = PUBLIC_STATIC | MethodAccessFlag::SYNCHRONIZED;
    let mut gate = ClassBuilder::new("Gate");
    let hold = gate.method_ref("Gate", "hold", "()V");
    let touch = gate.method_ref("Slow", "touch", "()V");
    gate.method(PUBLIC_STATIC, "run", "()V", code(0, 0, vec![InvokeStatic(hold), Return(None)]));
    gate.method(
        synchronized,
        "hold",
        "()V",
        code(0, 0, vec![InvokeStatic(touch), Return(None)]),
    );
    gate.method(synchronized, "ping", "()V", code(0, 0, vec![Return(None)]));

    let mut slow = ClassBuilder::new("Slow");
    let ping = slow.method_ref("Gate", "ping", "()V");
    slow.method(
        MethodAccessFlag::STATIC,
        "<clinit>",
        "()V",
        code(0, 0, vec![InvokeStatic(ping), Return(None)]),
    );
    slow.method(PUBLIC_STATIC, "touch", "()V", code(0, 0, vec![Return(None)]));
    vec![gate.build(), slow.build()]
}

#[test]
fn test_deadlock_through_class_initialization_settles() {
    let config = VmConfig::default().with_max_turns(10_000);
    let mut vm = vm_with(config, initializer_deadlock_classes());
    let holder = vm.spawn("Gate", "run", "()V", vec![]).expect("spawn");
    let initializer = vm.spawn("Slow", "touch", "()V", vec![]).expect("spawn");
    assert!(!vm.run_until_idle());

    let thread = |id| vm.threads().iter().find(|t| t.id() == id).expect("thread");
    assert_eq!(thread(holder).status(), ThreadStatus::Waiting);
    match thread(holder).blocker() {
        Some(Blocker::ClassInit(class)) => assert_eq!(class.name(), "Slow"),
        other => panic!("unexpected blocker {other:?}"),
    }
    assert_eq!(thread(initializer).status(), ThreadStatus::Blocked);
    assert!(matches!(thread(initializer).blocker(), Some(Blocker::Monitor(_))));
    assert_eq!(vm.backtrace(initializer).expect("backtrace")[0].method_name, "<clinit>");
}

#[test]
fn test_class_init_waiter_resumes_after_initializer() {
    let mut late = ClassBuilder::new("Late");
    late.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "value", "I");
    let value = late.field_ref("Late", "value", "I");
    let sleep = late.method_ref(THREAD, "sleep", "(J)V");
    late.method(
        MethodAccessFlag::STATIC,
        "<clinit>",
        "()V",
        code(
            2,
            0,
            vec![Lconst(30), InvokeStatic(sleep), Iconst(5), PutStatic(value), Return(None)],
        ),
    );
    late.method(
        PUBLIC_STATIC,
        "read",
        "()I",
        code(1, 0, vec![GetStatic(value), Return(Some(ValueKind::Int))]),
    );

    let mut vm = vm(vec![late.build()]);
    let first = vm.spawn("Late", "read", "()I", vec![]).expect("spawn");
    let second = vm.spawn("Late", "read", "()I", vec![]).expect("spawn");
    assert!(vm.step());
    assert!(vm.step());
    let waiting = vm.threads().iter().find(|t| t.id() == second).expect("thread");
    assert_eq!(waiting.status(), ThreadStatus::Waiting);
    assert!(matches!(waiting.blocker(), Some(Blocker::ClassInit(_))));

    assert!(!vm.run_until_idle());
    for id in [first, second] {
        assert_eq!(vm.completion(id), Some(&Completion::Returned(Some(Value::Int(5)))));
    }
}

#[test]
fn test_wait_and_notify_hand_over_a_value() {
    let mut mailbox = lock_class("Mailbox");
    mailbox.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "value", "I");
    let lock = mailbox.field_ref("Mailbox", "lock", "Ljava/lang/Object;");
    let value = mailbox.field_ref("Mailbox", "value", "I");
    let wait = mailbox.method_ref(OBJECT, "wait", "()V");
    let notify = mailbox.method_ref(OBJECT, "notify", "()V");
    let sleep = mailbox.method_ref(THREAD, "sleep", "(J)V");
    mailbox.method(
        PUBLIC_STATIC,
        "take",
        "()I",
        code(
            2,
            1,
            vec![
                GetStatic(lock),
                Dup,
                Store(ValueKind::Reference, 0),
                MonitorEnter,
                GetStatic(value),
                If(Condition::Ne, 10),
                GetStatic(lock),
                InvokeVirtual(wait),
                Goto(4),
                Nop,
                GetStatic(value),
                Load(ValueKind::Reference, 0),
                MonitorExit,
                Return(Some(ValueKind::Int)),
            ],
        ),
    );
    mailbox.method(
        PUBLIC_STATIC,
        "put",
        "()V",
        code(
            2,
            1,
            vec![
                Lconst(100),
                InvokeStatic(sleep),
                GetStatic(lock),
                Dup,
                Store(ValueKind::Reference, 0),
                MonitorEnter,
                Iconst(7),
                PutStatic(value),
                GetStatic(lock),
                InvokeVirtual(notify),
                Load(ValueKind::Reference, 0),
                MonitorExit,
                Return(None),
            ],
        ),
    );
    let mut vm = vm(vec![mailbox.build()]);
    let consumer = vm.spawn("Mailbox", "take", "()I", vec![]).expect("spawn");
    let producer = vm.spawn("Mailbox", "put", "()V", vec![]).expect("spawn");

    let mut turns = 0;
    while vm.thread_status(consumer) != Some(ThreadStatus::Waiting) {
        assert!(vm.step());
        turns += 1;
        assert!(turns < 1_000);
    }
    assert!(matches!(
        vm.threads().iter().find(|t| t.id() == consumer).and_then(|t| t.blocker()),
        Some(Blocker::Wait { deadline: None, .. })
    ));

    assert!(!vm.run_until_idle());
    assert_eq!(returned_int(vm.completion(consumer).expect("consumer finished")), 7);
    assert_eq!(vm.thread_status(producer), Some(ThreadStatus::Terminated));
}

#[test]
fn test_notify_without_owning_monitor() {
    let mut class = ClassBuilder::new("Rogue");
    let object = class.class_ref(OBJECT);
    let init = class.method_ref(OBJECT, "<init>", "()V");
    let notify = class.method_ref(OBJECT, "notify", "()V");
    class.method(
        PUBLIC_STATIC,
        "poke",
        "()V",
        code(
            2,
            0,
            vec![New(object), Dup, InvokeSpecial(init), InvokeVirtual(notify), Return(None)],
        ),
    );
    let mut vm = vm(vec![class.build()]);
    let completion = run_static(&mut vm, "Rogue", "poke", "()V");
    assert_eq!(thrown(&completion).type_name, "java/lang/IllegalMonitorStateException");
}

#[test]
fn test_started_thread_runs_its_target_and_joins() {
    let mut worker = ClassBuilder::new("Worker");
    worker.implements("java/lang/Runnable");
    worker.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "count", "I");
    let count = worker.field_ref("Worker", "count", "I");
    default_constructor(&mut worker, OBJECT);
    worker.method(
        PUBLIC,
        "run",
        "()V",
        code(
            2,
            1,
            vec![GetStatic(count), Iconst(1), Add(NumKind::Int), PutStatic(count), Return(None)],
        ),
    );

    let mut main = ClassBuilder::new("Spawner");
    let thread = main.class_ref(THREAD);
    let worker_class = main.class_ref("Worker");
    let worker_init = main.method_ref("Worker", "<init>", "()V");
    let thread_init = main.method_ref(THREAD, "<init>", "(Ljava/lang/Runnable;)V");
    let start = main.method_ref(THREAD, "start", "()V");
    let join = main.method_ref(THREAD, "join", "()V");
    let count = main.field_ref("Worker", "count", "I");
    main.method(
        PUBLIC_STATIC,
        "go",
        "()I",
        code(
            4,
            1,
            vec![
                New(thread),
                Dup,
                New(worker_class),
                Dup,
                InvokeSpecial(worker_init),
                InvokeSpecial(thread_init),
                Store(ValueKind::Reference, 0),
                Load(ValueKind::Reference, 0),
                InvokeVirtual(start),
                Load(ValueKind::Reference, 0),
                InvokeVirtual(join),
                GetStatic(count),
                Return(Some(ValueKind::Int)),
            ],
        ),
    );
    let mut vm = vm(vec![worker.build(), main.build()]);
    let completion = run_static(&mut vm, "Spawner", "go", "()I");
    assert_eq!(returned_int(&completion), 1);
    assert_eq!(vm.threads().len(), 2);
    assert!(vm.threads().iter().all(|t| t.status() == ThreadStatus::Terminated));
}

#[test]
fn test_sleeping_thread_lets_others_run() {
    let mut class = ClassBuilder::new("Sleeper");
    class.field(FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC, "log", "I");
    let log = class.field_ref("Sleeper", "log", "I");
    let sleep = class.method_ref(THREAD, "sleep", "(J)V");
    class.method(
        PUBLIC_STATIC,
        "mark",
        "(IJ)V",
        code(
            2,
            3,
            vec![
                Load(ValueKind::Long, 1),
                InvokeStatic(sleep),
                GetStatic(log),
                Iconst(10),
                Mul(NumKind::Int),
                Load(ValueKind::Int, 0),
                Add(NumKind::Int),
                PutStatic(log),
                Return(None),
            ],
        ),
    );
    let mut vm = vm(vec![class.build()]);
    vm.spawn("Sleeper", "mark", "(IJ)V", vec![Value::Int(1), Value::Long(500)])
        .expect("spawn");
    vm.spawn("Sleeper", "mark", "(IJ)V", vec![Value::Int(2), Value::Long(5)])
        .expect("spawn");
    assert!(!vm.run_until_idle());
    assert_eq!(static_int(&vm, "Sleeper", "log:I"), 21);
}

#[test]
fn test_turn_budget_stops_a_spinning_thread() {
    let mut class = ClassBuilder::new("Spin");
    class.method(PUBLIC_STATIC, "forever", "()V", code(0, 0, vec![Goto(0)]));
    let mut vm = vm_with(VmConfig::default().with_max_turns(500), vec![class.build()]);
    let id = vm.spawn("Spin", "forever", "()V", vec![]).expect("spawn");
    assert!(vm.run_until_idle());
    assert_eq!(vm.thread_status(id), Some(ThreadStatus::Runnable));
}
