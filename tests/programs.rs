mod common;

use common::*;
use coop_jvm::class::{ClassBuilder, Instruction::*, NumKind, ValueKind};
use coop_jvm::consts::{FieldAccessFlag, MethodAccessFlag};
use coop_jvm::runtime::{
    Completion, Exception, NativeEnv, NativeResult, StdStream, ThreadStatus, Value, VmConfig,
};

const MAIN: &str = "([Ljava/lang/String;)V";
const PRINT_STREAM: &str = "java/io/PrintStream";
const OUT: &str = "Ljava/io/PrintStream;";

#[test]
fn test_hello_world() {
    let mut hello = ClassBuilder::new("Hello");
    let out = hello.field_ref("java/lang/System", "out", OUT);
    let greeting = hello.string("Hello, world!");
    let println = hello.method_ref(PRINT_STREAM, "println", "(Ljava/lang/String;)V");
    hello.method(
        PUBLIC_STATIC,
        "main",
        MAIN,
        code(2, 1, vec![GetStatic(out), Ldc(greeting), InvokeVirtual(println), Return(None)]),
    );
    let mut vm = vm(vec![hello.build()]);
    let termination = vm.run("Hello", &[]).expect("run");
    assert_eq!(termination.exit_status, 0);
    assert_eq!(termination.main, Some(Completion::Returned(None)));
    assert_eq!(termination.threads[0].name, "main");
    assert!(!termination.exhausted);
    assert_eq!(vm.captured_output(StdStream::Out), "Hello, world!\n");
}

#[test]
fn test_main_receives_arguments() {
    let mut echo = ClassBuilder::new("Echo");
    let out = echo.field_ref("java/lang/System", "out", OUT);
    let println = echo.method_ref(PRINT_STREAM, "println", "(Ljava/lang/String;)V");
    let println_int = echo.method_ref(PRINT_STREAM, "println", "(I)V");
    echo.method(
        PUBLIC_STATIC,
        "main",
        MAIN,
        code(
            3,
            1,
            vec![
                GetStatic(out),
                Load(ValueKind::Reference, 0),
                ArrayLength,
                InvokeVirtual(println_int),
                GetStatic(out),
                Load(ValueKind::Reference, 0),
                Iconst(1),
                ArrayLoad(coop_jvm::class::ArrayKind::Reference),
                InvokeVirtual(println),
                Return(None),
            ],
        ),
    );
    let mut vm = vm(vec![echo.build()]);
    let termination = vm.run("Echo", &["first", "second"]).expect("run");
    assert_eq!(termination.exit_status, 0);
    assert_eq!(vm.captured_output(StdStream::Out), "2\nsecond\n");
}

#[test]
fn test_uncaught_exception_in_main_exits_with_one() {
    let mut class = ClassBuilder::new("Boom");
    let exception = class.class_ref("java/lang/IllegalStateException");
    let message = class.string("boom");
    let init =
        class.method_ref("java/lang/IllegalStateException", "<init>", "(Ljava/lang/String;)V");
    class.method(
        PUBLIC_STATIC,
        "main",
        MAIN,
        code(3, 1, vec![New(exception), Dup, Ldc(message), InvokeSpecial(init), AThrow]),
    );
    let mut vm = vm(vec![class.build()]);
    let termination = vm.run("Boom", &[]).expect("run");
    assert_eq!(termination.exit_status, 1);
    let thrown = thrown(termination.main.as_ref().expect("main finished"));
    assert_eq!(thrown.type_name, "java/lang/IllegalStateException");
    assert_eq!(thrown.to_string(), "java.lang.IllegalStateException: boom");
}

#[test]
fn test_missing_main_class() {
    let mut vm = vm(vec![]);
    let termination = vm.run("Nowhere", &[]).expect("run");
    assert_eq!(termination.exit_status, 1);
    let thrown = thrown(termination.main.as_ref().expect("main result"));
    assert_eq!(thrown.type_name, "java/lang/NoClassDefFoundError");
    assert_eq!(thrown.message.as_deref(), Some("Nowhere"));
}

#[test]
fn test_missing_main_method() {
    let class = ClassBuilder::new("NoMain");
    let mut vm = vm(vec![class.build()]);
    let termination = vm.run("NoMain", &[]).expect("run");
    let thrown = thrown(termination.main.as_ref().expect("main result"));
    assert_eq!(thrown.type_name, "java/lang/NoSuchMethodError");
}

#[test]
fn test_system_exit_status_wins() {
    let mut class = ClassBuilder::new("Quit");
    let exit = class.method_ref("java/lang/System", "exit", "(I)V");
    class.method(
        PUBLIC_STATIC,
        "main",
        MAIN,
        code(1, 1, vec![Iconst(3), InvokeStatic(exit), Goto(0)]),
    );
    let mut vm = vm(vec![class.build()]);
    let termination = vm.run("Quit", &[]).expect("run");
    assert_eq!(termination.exit_status, 3);
    assert!(termination.main.is_none());
    assert_eq!(termination.threads[0].status, ThreadStatus::Runnable);
}

#[test]
fn test_aborted_thread_exit_status() {
    let mut class = ClassBuilder::new("Broken");
    class.method(PUBLIC_STATIC, "main", MAIN, code(1, 1, vec![Swap, Return(None)]));
    let mut vm = vm(vec![class.build()]);
    let termination = vm.run("Broken", &[]).expect("run");
    assert_eq!(termination.exit_status, coop_jvm::consts::EXIT_FATAL);
    assert!(matches!(termination.main, Some(Completion::Aborted(_))));
}

/// `Shape.area()I` implemented by `Square`; `Base.value()I` overridden by
/// `Derived`, which also shadows `Base.tag`.
fn shapes() -> Vec<coop_jvm::class::ClassAst> {
    let mut shape = ClassBuilder::new_interface("Shape");
    shape.abstract_method("area", "()I");

    let mut square = ClassBuilder::new("Square");
    square.implements("Shape");
    square.field(FieldAccessFlag::PRIVATE, "side", "I");
    let side = square.field_ref("Square", "side", "I");
    let object_init = square.method_ref("java/lang/Object", "<init>", "()V");
    square.method(
        MethodAccessFlag::PUBLIC,
        "<init>",
        "(I)V",
        code(
            2,
            2,
            vec![
                Load(ValueKind::Reference, 0),
                InvokeSpecial(object_init),
                Load(ValueKind::Reference, 0),
                Load(ValueKind::Int, 1),
                PutField(side),
                Return(None),
            ],
        ),
    );
    square.method(
        MethodAccessFlag::PUBLIC,
        "area",
        "()I",
        code(
            2,
            1,
            vec![
                Load(ValueKind::Reference, 0),
                GetField(side),
                Dup,
                Mul(NumKind::Int),
                Return(Some(ValueKind::Int)),
            ],
        ),
    );

    let mut base = ClassBuilder::new("Base");
    base.field(FieldAccessFlag::PUBLIC, "tag", "I");
    default_constructor(&mut base, "java/lang/Object");
    base.method(
        MethodAccessFlag::PUBLIC,
        "value",
        "()I",
        code(1, 1, vec![Iconst(1), Return(Some(ValueKind::Int))]),
    );

    let mut derived = ClassBuilder::new("Derived");
    derived.extends("Base");
    derived.field(FieldAccessFlag::PUBLIC, "tag", "I");
    default_constructor(&mut derived, "Base");
    derived.method(
        MethodAccessFlag::PUBLIC,
        "value",
        "()I",
        code(1, 1, vec![Iconst(2), Return(Some(ValueKind::Int))]),
    );

    let mut main = ClassBuilder::new("Shapes");
    let square_class = main.class_ref("Square");
    let square_init = main.method_ref("Square", "<init>", "(I)V");
    let area = main.interface_method_ref("Shape", "area", "()I");
    let derived_class = main.class_ref("Derived");
    let derived_init = main.method_ref("Derived", "<init>", "()V");
    let value = main.method_ref("Base", "value", "()I");
    let base_tag = main.field_ref("Base", "tag", "I");
    let derived_tag = main.field_ref("Derived", "tag", "I");
    main.method(
        PUBLIC_STATIC,
        "area",
        "()I",
        code(
            3,
            0,
            vec![
                New(square_class),
                Dup,
                Iconst(5),
                InvokeSpecial(square_init),
                InvokeInterface(area),
                Return(Some(ValueKind::Int)),
            ],
        ),
    );
    main.method(
        PUBLIC_STATIC,
        "value",
        "()I",
        code(
            2,
            0,
            vec![
                New(derived_class),
                Dup,
                InvokeSpecial(derived_init),
                InvokeVirtual(value),
                Return(Some(ValueKind::Int)),
            ],
        ),
    );
    // writes 3 into Base.tag and 4 into Derived.tag, then reads Base.tag
    main.method(
        PUBLIC_STATIC,
        "shadow",
        "()I",
        code(
            3,
            1,
            vec![
                New(derived_class),
                Dup,
                InvokeSpecial(derived_init),
                Store(ValueKind::Reference, 0),
                Load(ValueKind::Reference, 0),
                Iconst(3),
                PutField(base_tag),
                Load(ValueKind::Reference, 0),
                Iconst(4),
                PutField(derived_tag),
                Load(ValueKind::Reference, 0),
                GetField(base_tag),
                Return(Some(ValueKind::Int)),
            ],
        ),
    );
    vec![shape.build(), square.build(), base.build(), derived.build(), main.build()]
}

#[test]
fn test_interface_dispatch() {
    let mut vm = vm(shapes());
    assert_eq!(returned_int(&run_static(&mut vm, "Shapes", "area", "()I")), 25);
}

#[test]
fn test_virtual_dispatch_picks_override() {
    let mut vm = vm(shapes());
    assert_eq!(returned_int(&run_static(&mut vm, "Shapes", "value", "()I")), 2);
}

#[test]
fn test_shadowed_fields_are_distinct() {
    let mut vm = vm(shapes());
    assert_eq!(returned_int(&run_static(&mut vm, "Shapes", "shadow", "()I")), 3);
}

fn native_magic(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let base = env.arg(0)?.as_int()?;
    Ok(Some(Value::Int(base * 2 + 1)))
}

fn native_refuse(_env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Err(Exception::new_vm_msg("java/lang/UnsupportedOperationException", "refused").into())
}

fn magic_classes() -> Vec<coop_jvm::class::ClassAst> {
    let mut magic = ClassBuilder::new("Magic");
    magic.native_method(PUBLIC_STATIC, "magic", "(I)I");
    let call = magic.method_ref("Magic", "magic", "(I)I");
    magic.method(
        PUBLIC_STATIC,
        "call",
        "()I",
        code(1, 0, vec![Iconst(20), InvokeStatic(call), Return(Some(ValueKind::Int))]),
    );
    vec![magic.build()]
}

#[test]
fn test_registered_native_is_called() {
    let mut vm = vm(magic_classes());
    vm.natives().register("Magic", "magic", "(I)I", native_magic);
    assert_eq!(returned_int(&run_static(&mut vm, "Magic", "call", "()I")), 41);
    assert_eq!(vm.natives().natives_for("Magic").len(), 1);
}

#[test]
fn test_native_exception_reaches_bytecode() {
    let mut vm = vm(magic_classes());
    vm.natives().register("Magic", "magic", "(I)I", native_refuse);
    let completion = run_static(&mut vm, "Magic", "call", "()I");
    let thrown = thrown(&completion);
    assert_eq!(thrown.type_name, "java/lang/UnsupportedOperationException");
    assert_eq!(thrown.message.as_deref(), Some("refused"));
}

#[test]
fn test_unregistered_native_fails_to_link() {
    let mut vm = vm(magic_classes());
    let err = vm.spawn("Magic", "call", "()I", vec![]).unwrap_err();
    assert!(err.to_string().contains("UnsatisfiedLinkError"), "{err}");

    let mut lazy = vm_with(VmConfig::default().with_eager_native_linking(false), magic_classes());
    let completion = run_static(&mut lazy, "Magic", "call", "()I");
    assert_eq!(thrown(&completion).type_name, "java/lang/UnsatisfiedLinkError");
}

#[test]
fn test_string_building() {
    let mut class = ClassBuilder::new("Builder");
    let builder = class.class_ref("java/lang/StringBuilder");
    let init = class.method_ref("java/lang/StringBuilder", "<init>", "()V");
    let append_string = class.method_ref(
        "java/lang/StringBuilder",
        "append",
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
    );
    let append_int =
        class.method_ref("java/lang/StringBuilder", "append", "(I)Ljava/lang/StringBuilder;");
    let to_string = class.method_ref("java/lang/StringBuilder", "toString", "()Ljava/lang/String;");
    let label = class.string("n=");
    let out = class.field_ref("java/lang/System", "out", OUT);
    let println = class.method_ref(PRINT_STREAM, "println", "(Ljava/lang/String;)V");
    class.method(
        PUBLIC_STATIC,
        "main",
        MAIN,
        code(
            3,
            1,
            vec![
                GetStatic(out),
                New(builder),
                Dup,
                InvokeSpecial(init),
                Ldc(label),
                InvokeVirtual(append_string),
                Iconst(42),
                InvokeVirtual(append_int),
                InvokeVirtual(to_string),
                InvokeVirtual(println),
                Return(None),
            ],
        ),
    );
    let mut vm = vm(vec![class.build()]);
    let termination = vm.run("Builder", &[]).expect("run");
    assert_eq!(termination.exit_status, 0);
    assert_eq!(vm.captured_output(StdStream::Out), "n=42\n");
}
