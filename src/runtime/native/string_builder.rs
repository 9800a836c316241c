use super::string::{Primitive, primitive_text};
use super::{NativeEnv, NativeFunction};
use crate::class::{ClassAst, ClassBuilder, CodeAst, Instruction, ValueKind};
use crate::consts::{ClassAccessFlag, MethodAccessFlag};
use crate::runtime::{
    Exception, NativeRegistry, NativeResult, Value, VmError,
    famous_classes::{NULL_POINTER_EXCEPTION, STRING, STRING_BUILDER},
};

/// Host payload of a `java/lang/StringBuilder`.
#[derive(Debug, Clone, Default)]
struct Buffer(String);

const SELF: &str = "Ljava/lang/StringBuilder;";

macro_rules! append_natives {
    ($($suffix:ident: $descriptor:literal => $kind:ident),* $(,)?) => {
        paste::paste! {
            $(
                fn [<native_append_ $suffix>](env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
                    let text = primitive_text(env.arg(0)?, Primitive::$kind)?;
                    append(env, &text)
                }
            )*

            const APPEND_NATIVES: &[(&str, NativeFunction)] = &[
                $((concat!("(", $descriptor, ")Ljava/lang/StringBuilder;"), [<native_append_ $suffix>])),*
            ];
        }
    };
}

append_natives!(
    int: "I" => Int,
    long: "J" => Long,
    char: "C" => Char,
    boolean: "Z" => Boolean,
    float: "F" => Float,
    double: "D" => Double,
);

pub(super) fn classes() -> Vec<ClassAst> {
    let public = MethodAccessFlag::PUBLIC;
    let mut builder = ClassBuilder::new(STRING_BUILDER);
    builder
        .access_flags(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::SUPER)
        .native_method(public, "<init>", "()V")
        .native_method(public, "<init>", "(Ljava/lang/String;)V")
        .native_method(public, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
        .native_method(public, "length", "()I")
        .native_method(public, "toString", "()Ljava/lang/String;");
    for (descriptor, _) in APPEND_NATIVES {
        builder.native_method(public, "append", descriptor);
    }

    let value_of = builder.method_ref(STRING, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;");
    let append_string = builder.method_ref(
        STRING_BUILDER,
        "append",
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
    );
    builder.method(
        public,
        "append",
        &format!("(Ljava/lang/Object;){SELF}"),
        CodeAst::new(
            2,
            2,
            vec![
                Instruction::Load(ValueKind::Reference, 0),
                Instruction::Load(ValueKind::Reference, 1),
                Instruction::InvokeStatic(value_of),
                Instruction::InvokeVirtual(append_string),
                Instruction::Return(Some(ValueKind::Reference)),
            ],
        ),
    );
    vec![builder.build()]
}

pub(super) fn register_natives(registry: &NativeRegistry) {
    registry.register(STRING_BUILDER, "<init>", "()V", native_init);
    registry.register(STRING_BUILDER, "<init>", "(Ljava/lang/String;)V", native_init_string);
    registry.register(
        STRING_BUILDER,
        "append",
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
        native_append_string,
    );
    registry.register(STRING_BUILDER, "length", "()I", native_length);
    registry.register(STRING_BUILDER, "toString", "()Ljava/lang/String;", native_to_string);
    for (descriptor, function) in APPEND_NATIVES {
        registry.register(STRING_BUILDER, "append", descriptor, *function);
    }
}

fn native_init(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    env.this()?.set_extension(Buffer::default());
    Ok(None)
}

fn native_init_string(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let initial = env
        .string_arg(0)?
        .ok_or_else(|| Exception::new_vm(NULL_POINTER_EXCEPTION))?;
    env.this()?.set_extension(Buffer(initial.to_string()));
    Ok(None)
}

fn native_append_string(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let text = env.string_arg(0)?;
    append(env, text.as_deref().unwrap_or("null"))
}

fn append(env: &mut NativeEnv<'_>, text: &str) -> NativeResult<Option<Value>> {
    let this = env.this()?;
    this.with_extension_mut(|buffer: &mut Buffer| buffer.0.push_str(text))
        .ok_or(uninitialized())?;
    Ok(Some(Value::from_ref(this)))
}

fn native_length(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let buffer = env.this()?.extension::<Buffer>().ok_or(uninitialized())?;
    Ok(Some(Value::Int(buffer.0.encode_utf16().count() as i32)))
}

fn native_to_string(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let buffer = env.this()?.extension::<Buffer>().ok_or(uninitialized())?;
    env.new_string(&buffer.0)
}

fn uninitialized() -> VmError {
    VmError::Unsupported("StringBuilder used before its constructor ran".to_string())
}
