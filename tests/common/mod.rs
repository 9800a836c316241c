#![allow(dead_code)]

use coop_jvm::class::{ClassAst, ClassBuilder, CodeAst, Instruction};
use coop_jvm::consts::MethodAccessFlag;
use coop_jvm::runtime::{Completion, InMemoryClassPath, ThrownValue, Value, Vm, VmConfig};

pub const PUBLIC: MethodAccessFlag = MethodAccessFlag::PUBLIC;
pub const PUBLIC_STATIC: MethodAccessFlag =
    MethodAccessFlag::PUBLIC.union(MethodAccessFlag::STATIC);

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn vm(classes: Vec<ClassAst>) -> Vm {
    vm_with(VmConfig::default(), classes)
}

pub fn vm_with(config: VmConfig, classes: Vec<ClassAst>) -> Vm {
    init_logging();
    let class_path: InMemoryClassPath = classes.into_iter().collect();
    Vm::with_config(config.with_captured_output(true), class_path)
}

/// Runs `class.method` on a fresh root thread until the VM goes idle.
pub fn run_static(vm: &mut Vm, class: &str, method: &str, descriptor: &str) -> Completion {
    let id = vm.spawn(class, method, descriptor, vec![]).expect("spawn");
    vm.run_until_idle();
    vm.completion(id).cloned().expect("thread did not finish")
}

pub fn thrown(completion: &Completion) -> &ThrownValue {
    match completion {
        Completion::Threw(thrown) => thrown,
        other => panic!("expected an uncaught exception, got {other:?}"),
    }
}

pub fn returned_int(completion: &Completion) -> i32 {
    match completion {
        Completion::Returned(Some(Value::Int(v))) => *v,
        other => panic!("expected an int result, got {other:?}"),
    }
}

pub fn static_int(vm: &Vm, class: &str, key: &str) -> i32 {
    let class = vm.runtime().load_class(class).expect("class");
    match class.get_static(key) {
        Some(Value::Int(v)) => v,
        other => panic!("{key} is {other:?}"),
    }
}

pub fn code(max_stack: u16, max_locals: u16, instructions: Vec<Instruction>) -> CodeAst {
    CodeAst::new(max_stack, max_locals, instructions)
}

/// `<init>()V` that only chains to `super_class`.
pub fn default_constructor(builder: &mut ClassBuilder, super_class: &str) {
    let init = builder.method_ref(super_class, "<init>", "()V");
    builder.method(
        PUBLIC,
        "<init>",
        "()V",
        code(
            1,
            1,
            vec![
                Instruction::Load(coop_jvm::class::ValueKind::Reference, 0),
                Instruction::InvokeSpecial(init),
                Instruction::Return(None),
            ],
        ),
    );
}
