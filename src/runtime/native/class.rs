use super::NativeEnv;
use crate::class::{ClassAst, ClassBuilder};
use crate::consts::{ClassAccessFlag, MethodAccessFlag};
use crate::runtime::{
    Class, ClassMirror, NativeRegistry, NativeResult, Value, VmError, famous_classes::CLASS,
    inheritance::is_assignable_to,
};
use std::sync::Arc;

pub(super) fn classes() -> Vec<ClassAst> {
    let public = MethodAccessFlag::PUBLIC;
    let mut class = ClassBuilder::new(CLASS);
    class
        .access_flags(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::SUPER)
        .native_method(public, "getName", "()Ljava/lang/String;")
        .native_method(public, "getSuperclass", "()Ljava/lang/Class;")
        .native_method(public, "isInterface", "()Z")
        .native_method(public, "isArray", "()Z")
        .native_method(public, "isInstance", "(Ljava/lang/Object;)Z");
    vec![class.build()]
}

pub(super) fn register_natives(registry: &NativeRegistry) {
    registry.register(CLASS, "getName", "()Ljava/lang/String;", native_class_get_name);
    registry.register(CLASS, "getSuperclass", "()Ljava/lang/Class;", native_class_get_superclass);
    registry.register(CLASS, "isInterface", "()Z", native_class_is_interface);
    registry.register(CLASS, "isArray", "()Z", native_class_is_array);
    registry.register(CLASS, "isInstance", "(Ljava/lang/Object;)Z", native_class_is_instance);
}

fn mirrored(env: &NativeEnv<'_>) -> NativeResult<Arc<Class>> {
    let mirror = env.this()?.extension::<ClassMirror>().ok_or(VmError::TypeMismatch {
        expected: "java/lang/Class",
        found: "other object",
    })?;
    Ok(mirror.0)
}

// public String getName();
fn native_class_get_name(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let class = mirrored(env)?;
    env.new_string(&class.name().replace('/', "."))
}

fn native_class_get_superclass(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let class = mirrored(env)?;
    match class.super_class().filter(|_| !class.is_interface()) {
        Some(super_class) => Ok(Some(Value::from_ref(env.runtime.class_object(super_class)?))),
        None => Ok(Some(Value::null())),
    }
}

fn native_class_is_interface(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(Value::from(mirrored(env)?.is_interface())))
}

fn native_class_is_array(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(Value::from(mirrored(env)?.is_array())))
}

fn native_class_is_instance(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let class = mirrored(env)?;
    let result = env
        .arg(0)?
        .as_reference()?
        .is_some_and(|object| is_assignable_to(object.class(), &class));
    Ok(Some(Value::from(result)))
}
