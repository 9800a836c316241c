use super::string::{Primitive, primitive_text};
use super::{NativeEnv, NativeFunction};
use crate::class::{ClassAst, ClassBuilder, CodeAst, Instruction, ValueKind};
use crate::consts::MethodAccessFlag;
use crate::runtime::{
    NativeRegistry, NativeResult, StdStream, Value, VmError,
    famous_classes::{PRINT_STREAM, STRING},
};

macro_rules! print_natives {
    ($($suffix:ident: $descriptor:literal => $kind:ident),* $(,)?) => {
        paste::paste! {
            $(
                fn [<native_print_ $suffix>](env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
                    let text = primitive_text(env.arg(0)?, Primitive::$kind)?;
                    write(env, &text, false)
                }

                fn [<native_println_ $suffix>](env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
                    let text = primitive_text(env.arg(0)?, Primitive::$kind)?;
                    write(env, &text, true)
                }
            )*

            const PRINT_NATIVES: &[(&str, &str, NativeFunction)] = &[
                $(
                    ("print", concat!("(", $descriptor, ")V"), [<native_print_ $suffix>]),
                    ("println", concat!("(", $descriptor, ")V"), [<native_println_ $suffix>]),
                )*
                ("print", "(Ljava/lang/String;)V", native_print_string),
                ("println", "(Ljava/lang/String;)V", native_println_string),
                ("println", "()V", native_println),
                ("flush", "()V", super::native_nop),
            ];
        }
    };
}

print_natives!(
    int: "I" => Int,
    long: "J" => Long,
    char: "C" => Char,
    boolean: "Z" => Boolean,
    float: "F" => Float,
    double: "D" => Double,
);

pub(super) fn classes() -> Vec<ClassAst> {
    let public = MethodAccessFlag::PUBLIC;
    let mut print_stream = ClassBuilder::new(PRINT_STREAM);
    for (name, descriptor, _) in PRINT_NATIVES {
        print_stream.native_method(public, name, descriptor);
    }

    // print(Object) and println(Object) go through String.valueOf(Object)
    let value_of =
        print_stream.method_ref(STRING, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;");
    for name in ["print", "println"] {
        let target = print_stream.method_ref(PRINT_STREAM, name, "(Ljava/lang/String;)V");
        print_stream.method(
            public,
            name,
            "(Ljava/lang/Object;)V",
            CodeAst::new(
                2,
                2,
                vec![
                    Instruction::Load(ValueKind::Reference, 0),
                    Instruction::Load(ValueKind::Reference, 1),
                    Instruction::InvokeStatic(value_of),
                    Instruction::InvokeVirtual(target),
                    Instruction::Return(None),
                ],
            ),
        );
    }
    vec![print_stream.build()]
}

pub(super) fn register_natives(registry: &NativeRegistry) {
    for (name, descriptor, function) in PRINT_NATIVES {
        registry.register(PRINT_STREAM, name, descriptor, *function);
    }
}

fn native_print_string(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let text = env.string_arg(0)?;
    write(env, text.as_deref().unwrap_or("null"), false)
}

fn native_println_string(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let text = env.string_arg(0)?;
    write(env, text.as_deref().unwrap_or("null"), true)
}

fn native_println(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    write(env, "", true)
}

fn write(env: &mut NativeEnv<'_>, text: &str, newline: bool) -> NativeResult<Option<Value>> {
    let stream = env
        .this()?
        .extension::<StdStream>()
        .ok_or(VmError::Unsupported("PrintStream is not attached to a stream".to_string()))?;
    if newline {
        env.runtime.print(stream, &format!("{text}\n"));
    } else {
        env.runtime.print(stream, text);
    }
    Ok(None)
}
