use super::{NativeEnv, java_string};
use crate::class::{ClassAst, ClassBuilder, CodeAst, Instruction, ValueKind};
use crate::consts::{FieldAccessFlag, MethodAccessFlag};
use crate::runtime::{
    Exception, NativeRegistry, NativeResult, ObjectRef, THREAD_NAME, THREAD_TARGET, Value,
    VmError,
    famous_classes::{
        ILLEGAL_ARGUMENT_EXCEPTION, ILLEGAL_THREAD_STATE_EXCEPTION, NO_SUCH_METHOD_ERROR,
        RUNNABLE, THREAD,
    },
    thread::{Suspend, Thread, ThreadId},
};

/// Marks a `java/lang/Thread` whose `start` has been called.
#[derive(Debug, Clone, Copy)]
struct Started;

pub(super) fn classes() -> Vec<ClassAst> {
    let public = MethodAccessFlag::PUBLIC;
    let public_static = MethodAccessFlag::PUBLIC | MethodAccessFlag::STATIC;
    let mut thread = ClassBuilder::new(THREAD);
    thread
        .implements(RUNNABLE)
        .field(FieldAccessFlag::PRIVATE, "name", "Ljava/lang/String;")
        .field(FieldAccessFlag::PRIVATE, "target", "Ljava/lang/Runnable;")
        .native_method(public, "<init>", "()V")
        .native_method(public, "<init>", "(Ljava/lang/Runnable;)V")
        .native_method(public, "<init>", "(Ljava/lang/Runnable;Ljava/lang/String;)V")
        .native_method(public, "start", "()V")
        .native_method(MethodAccessFlag::PUBLIC | MethodAccessFlag::FINAL, "join", "()V")
        .native_method(public, "getName", "()Ljava/lang/String;")
        .native_method(public, "getId", "()J")
        .native_method(public_static, "currentThread", "()Ljava/lang/Thread;")
        .native_method(public_static, "sleep", "(J)V")
        .native_method(public_static, "yield", "()V");

    // run() calls target.run() when a Runnable was given
    let target = thread.field_ref(THREAD, "target", "Ljava/lang/Runnable;");
    let run = thread.interface_method_ref(RUNNABLE, "run", "()V");
    thread.method(
        public,
        "run",
        "()V",
        CodeAst::new(
            2,
            1,
            vec![
                Instruction::Load(ValueKind::Reference, 0),
                Instruction::GetField(target),
                Instruction::Dup,
                Instruction::IfNull(6),
                Instruction::InvokeInterface(run),
                Instruction::Return(None),
                Instruction::Pop,
                Instruction::Return(None),
            ],
        ),
    );

    let mut runnable = ClassBuilder::new_interface(RUNNABLE);
    runnable.abstract_method("run", "()V");
    vec![runnable.build(), thread.build()]
}

pub(super) fn register_natives(registry: &NativeRegistry) {
    registry.register(THREAD, "<init>", "()V", native_thread_init);
    registry.register(THREAD, "<init>", "(Ljava/lang/Runnable;)V", native_thread_init_target);
    registry.register(
        THREAD,
        "<init>",
        "(Ljava/lang/Runnable;Ljava/lang/String;)V",
        native_thread_init_target_name,
    );
    registry.register(THREAD, "start", "()V", native_thread_start);
    registry.register(THREAD, "join", "()V", native_thread_join);
    registry.register(THREAD, "getName", "()Ljava/lang/String;", native_thread_get_name);
    registry.register(THREAD, "getId", "()J", native_thread_get_id);
    registry.register(
        THREAD,
        "currentThread",
        "()Ljava/lang/Thread;",
        native_thread_current_thread,
    );
    registry.register(THREAD, "sleep", "(J)V", native_thread_sleep);
    registry.register(THREAD, "yield", "()V", native_thread_yield);
}

/// Gives the new thread object its id, which also names it.
fn init(
    env: &mut NativeEnv<'_>,
    target: Option<ObjectRef>,
    name: Option<&str>,
) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    let id = env.runtime.next_thread_id();
    let name = match name {
        Some(name) => name.to_string(),
        None => format!("Thread-{}", id.0),
    };
    this.put_field(THREAD_NAME, Value::from_ref(env.runtime.new_string(&name)?))?;
    this.put_field(THREAD_TARGET, Value::Reference(target))?;
    env.runtime.bind_thread_object(id, this);
    Ok(None)
}

fn native_thread_init(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    init(env, None, None)
}

fn native_thread_init_target(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let target = env.arg(0)?.as_reference()?;
    init(env, target, None)
}

fn native_thread_init_target_name(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let target = env.arg(0)?.as_reference()?;
    let name = env.string_arg(1)?;
    init(env, target, name.as_deref())
}

fn thread_id(object: &ObjectRef) -> Result<ThreadId, VmError> {
    object
        .extension::<ThreadId>()
        .ok_or_else(|| VmError::Unsupported("Thread used before its constructor ran".to_string()))
}

/// Schedules `this.run()` on a new thread, after the current one in
/// round-robin order.
fn native_thread_start(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    if this.extension::<Started>().is_some() {
        return Err(Exception::new_vm(ILLEGAL_THREAD_STATE_EXCEPTION).into());
    }
    let id = thread_id(&this)?;
    let run = this
        .class()
        .find_method("run", "()V")
        .ok_or_else(|| Exception::new_vm_msg(NO_SUCH_METHOD_ERROR, "run"))?;
    let name = thread_name(&this)?;
    this.set_extension(Started);
    env.spawn(Thread::new(id, name, run, vec![Value::from_ref(this)]));
    Ok(None)
}

fn thread_name(object: &ObjectRef) -> NativeResult<String> {
    match object.get_field(THREAD_NAME)?.as_reference()? {
        Some(name) => Ok(java_string(&name)?.to_string()),
        None => Ok(String::new()),
    }
}

fn native_thread_join(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let target = thread_id(&env.this()?)?;
    env.suspend(Suspend::Join(target));
    Ok(None)
}

fn native_thread_get_name(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    Ok(Some(this.get_field(THREAD_NAME)?))
}

fn native_thread_get_id(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let id = thread_id(&env.this()?)?;
    Ok(Some(Value::Long(id.0 as i64)))
}

fn native_thread_current_thread(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(Value::from_ref(env.runtime.thread_object(env.thread)?)))
}

// sleep time is measured on the scheduler's logical clock
fn native_thread_sleep(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let millis = env.arg(0)?.as_long()?;
    if millis < 0 {
        return Err(
            Exception::new_vm_msg(ILLEGAL_ARGUMENT_EXCEPTION, "timeout value is negative").into(),
        );
    }
    env.suspend(if millis == 0 {
        Suspend::Yield
    } else {
        Suspend::Sleep(millis as u64)
    });
    Ok(None)
}

fn native_thread_yield(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    env.suspend(Suspend::Yield);
    Ok(None)
}
