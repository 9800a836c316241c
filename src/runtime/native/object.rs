use super::NativeEnv;
use crate::class::{ClassAst, ClassBuilder};
use crate::consts::MethodAccessFlag;
use crate::runtime::{
    Exception, NativeRegistry, NativeResult, Value,
    famous_classes::{
        CLONE_NOT_SUPPORTED_EXCEPTION, CLONEABLE, ILLEGAL_ARGUMENT_EXCEPTION, OBJECT, SERIALIZABLE,
    },
    inheritance::is_assignable_to,
    thread::Suspend,
};
use std::sync::Arc;

pub(super) fn classes() -> Vec<ClassAst> {
    let public = MethodAccessFlag::PUBLIC;
    let final_ = MethodAccessFlag::PUBLIC | MethodAccessFlag::FINAL;
    let mut object = ClassBuilder::new(OBJECT);
    object
        .root()
        .native_method(public, "<init>", "()V")
        .native_method(public, "hashCode", "()I")
        .native_method(public, "equals", "(Ljava/lang/Object;)Z")
        .native_method(public, "toString", "()Ljava/lang/String;")
        .native_method(MethodAccessFlag::PROTECTED, "clone", "()Ljava/lang/Object;")
        .native_method(final_, "getClass", "()Ljava/lang/Class;")
        .native_method(final_, "wait", "()V")
        .native_method(final_, "wait", "(J)V")
        .native_method(final_, "notify", "()V")
        .native_method(final_, "notifyAll", "()V");
    vec![
        object.build(),
        ClassBuilder::new_interface(CLONEABLE).build(),
        ClassBuilder::new_interface(SERIALIZABLE).build(),
    ]
}

pub(super) fn register_natives(registry: &NativeRegistry) {
    registry.register(OBJECT, "<init>", "()V", super::native_nop);
    registry.register(OBJECT, "hashCode", "()I", native_object_hash_code);
    registry.register(OBJECT, "equals", "(Ljava/lang/Object;)Z", native_object_equals);
    registry.register(OBJECT, "toString", "()Ljava/lang/String;", native_object_to_string);
    registry.register(OBJECT, "clone", "()Ljava/lang/Object;", native_object_clone);
    registry.register(OBJECT, "getClass", "()Ljava/lang/Class;", native_object_get_class);
    registry.register(OBJECT, "wait", "()V", native_object_wait);
    registry.register(OBJECT, "wait", "(J)V", native_object_wait_timeout);
    registry.register(OBJECT, "notify", "()V", native_object_notify);
    registry.register(OBJECT, "notifyAll", "()V", native_object_notify_all);
}

// public native int hashCode();
fn native_object_hash_code(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(Value::Int(env.this()?.identity_hash())))
}

fn native_object_equals(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    let same = env
        .arg(0)?
        .as_reference()?
        .is_some_and(|other| Arc::ptr_eq(&this, &other));
    Ok(Some(Value::from(same)))
}

fn native_object_to_string(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    env.new_string(&format!(
        "{}@{:x}",
        this.class_name().replace('/', "."),
        this.identity_hash()
    ))
}

// protected native Object clone() throws CloneNotSupportedException;
fn native_object_clone(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    let cloneable = env.runtime.load_class(CLONEABLE)?;
    if !is_assignable_to(this.class(), &cloneable) {
        return Err(Exception::new_vm_msg(
            CLONE_NOT_SUPPORTED_EXCEPTION,
            this.class_name().replace('/', "."),
        )
        .into());
    }
    Ok(Some(Value::from_ref(env.runtime.heap.clone_object(&this))))
}

fn native_object_get_class(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    Ok(Some(Value::from_ref(env.runtime.class_object(this.class())?)))
}

// public final void wait() throws InterruptedException
fn native_object_wait(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    wait(env, None)
}

fn native_object_wait_timeout(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let millis = env.arg(0)?.as_long()?;
    if millis < 0 {
        return Err(
            Exception::new_vm_msg(ILLEGAL_ARGUMENT_EXCEPTION, "timeout value is negative").into(),
        );
    }
    wait(env, (millis > 0).then_some(millis as u64))
}

/// Releases the monitor completely and parks the thread in its wait set;
/// the scheduler restores the recursion count once the thread is notified.
fn wait(env: &mut NativeEnv<'_>, millis: Option<u64>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    let (count, promoted) = this.monitor().lock().wait(env.thread)?;
    env.woken(promoted);
    env.suspend(Suspend::Wait {
        monitor: this,
        count,
        millis,
    });
    Ok(None)
}

fn native_object_notify(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    let notified = this.monitor().lock().notify(env.thread)?;
    env.notified(notified);
    Ok(None)
}

fn native_object_notify_all(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    let notified = this.monitor().lock().notify_all(env.thread)?;
    env.notified(notified);
    Ok(None)
}
