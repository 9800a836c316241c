use super::{NativeEnv, java_string};
use crate::class::{ClassAst, ClassBuilder};
use crate::consts::{FieldAccessFlag, MethodAccessFlag};
use crate::runtime::{
    CAUSE, DETAIL_MESSAGE, NativeRegistry, NativeResult, ObjectRef, StdStream, Value,
    famous_classes::{SERIALIZABLE, THROWABLE, THROWABLE_HIERARCHY},
};

const CONSTRUCTORS: &[&str] = &[
    "()V",
    "(Ljava/lang/String;)V",
    "(Ljava/lang/String;Ljava/lang/Throwable;)V",
    "(Ljava/lang/Throwable;)V",
];

/// Every built-in throwable declares the four standard constructors; only
/// `Throwable` itself declares fields and accessors.
pub(super) fn classes() -> Vec<ClassAst> {
    let public = MethodAccessFlag::PUBLIC;
    THROWABLE_HIERARCHY
        .iter()
        .map(|(name, super_class)| {
            let mut class = ClassBuilder::new(name);
            class.extends(super_class);
            for descriptor in CONSTRUCTORS {
                class.native_method(public, "<init>", descriptor);
            }
            if *name == THROWABLE {
                class
                    .implements(SERIALIZABLE)
                    .field(FieldAccessFlag::PRIVATE, "detailMessage", "Ljava/lang/String;")
                    .field(FieldAccessFlag::PRIVATE, "cause", "Ljava/lang/Throwable;")
                    .native_method(public, "getMessage", "()Ljava/lang/String;")
                    .native_method(public, "getLocalizedMessage", "()Ljava/lang/String;")
                    .native_method(public, "getCause", "()Ljava/lang/Throwable;")
                    .native_method(
                        public,
                        "initCause",
                        "(Ljava/lang/Throwable;)Ljava/lang/Throwable;",
                    )
                    .native_method(public, "toString", "()Ljava/lang/String;")
                    .native_method(public, "printStackTrace", "()V")
                    .native_method(public, "fillInStackTrace", "()Ljava/lang/Throwable;");
            }
            class.build()
        })
        .collect()
}

pub(super) fn register_natives(registry: &NativeRegistry) {
    for (name, _) in THROWABLE_HIERARCHY {
        registry.register(name, "<init>", "()V", native_throwable_init);
        registry.register(name, "<init>", "(Ljava/lang/String;)V", native_throwable_init_message);
        registry.register(
            name,
            "<init>",
            "(Ljava/lang/String;Ljava/lang/Throwable;)V",
            native_throwable_init_message_cause,
        );
        registry.register(name, "<init>", "(Ljava/lang/Throwable;)V", native_throwable_init_cause);
    }
    registry.register(
        THROWABLE,
        "getMessage",
        "()Ljava/lang/String;",
        native_throwable_get_message,
    );
    registry.register(
        THROWABLE,
        "getLocalizedMessage",
        "()Ljava/lang/String;",
        native_throwable_get_message,
    );
    registry.register(THROWABLE, "getCause", "()Ljava/lang/Throwable;", native_throwable_get_cause);
    registry.register(
        THROWABLE,
        "initCause",
        "(Ljava/lang/Throwable;)Ljava/lang/Throwable;",
        native_throwable_init_cause_method,
    );
    registry.register(THROWABLE, "toString", "()Ljava/lang/String;", native_throwable_to_string);
    registry.register(THROWABLE, "printStackTrace", "()V", native_throwable_print_stack_trace);
    registry.register(
        THROWABLE,
        "fillInStackTrace",
        "()Ljava/lang/Throwable;",
        native_throwable_fill_in_stack_trace,
    );
}

fn set_fields(env: &NativeEnv<'_>, message: Value, cause: Value) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    this.put_field(DETAIL_MESSAGE, message)?;
    this.put_field(CAUSE, cause)?;
    Ok(None)
}

fn native_throwable_init(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    set_fields(env, Value::null(), Value::null())
}

fn native_throwable_init_message(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let message = env.arg(0)?.clone();
    set_fields(env, message, Value::null())
}

fn native_throwable_init_message_cause(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let message = env.arg(0)?.clone();
    let cause = env.arg(1)?.clone();
    set_fields(env, message, cause)
}

// Throwable(Throwable cause): the message is cause.toString()
fn native_throwable_init_cause(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let cause = env.arg(0)?.as_reference()?;
    let message = match &cause {
        Some(cause) => Value::from_ref(env.runtime.new_string(&describe(cause)?)?),
        None => Value::null(),
    };
    set_fields(env, message, Value::Reference(cause))
}

/// `java.lang.Foo: message`, or just the class name without a message.
fn describe(throwable: &ObjectRef) -> NativeResult<String> {
    let name = throwable.class_name().replace('/', ".");
    match throwable.get_field(DETAIL_MESSAGE)?.as_reference()? {
        Some(message) => Ok(format!("{name}: {}", java_string(&message)?)),
        None => Ok(name),
    }
}

fn native_throwable_get_message(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(env.this()?.get_field(DETAIL_MESSAGE)?))
}

fn native_throwable_get_cause(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(env.this()?.get_field(CAUSE)?))
}

fn native_throwable_init_cause_method(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    this.put_field(CAUSE, env.arg(0)?.clone())?;
    Ok(Some(Value::from_ref(this)))
}

fn native_throwable_to_string(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let text = describe(&env.this()?)?;
    env.new_string(&text)
}

fn native_throwable_print_stack_trace(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let thrown = env.runtime.thrown_value(&env.this()?);
    env.runtime.print(StdStream::Err, &format!("{thrown}\n"));
    Ok(None)
}

fn native_throwable_fill_in_stack_trace(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(Value::from_ref(env.this()?)))
}
