use super::{NativeEnv, NativeFunction, java_string};
use crate::class::{ClassAst, ClassBuilder, CodeAst, Instruction, ValueKind};
use crate::consts::{ClassAccessFlag, MethodAccessFlag};
use crate::runtime::{
    Exception, NativeRegistry, NativeResult, Value, VmError,
    famous_classes::{
        NULL_POINTER_EXCEPTION, OBJECT, SERIALIZABLE, STRING, STRING_INDEX_OUT_OF_BOUNDS_EXCEPTION,
    },
};

/// Primitive types with a textual form.
#[derive(Debug, Clone, Copy)]
pub(super) enum Primitive {
    Int,
    Long,
    Char,
    Boolean,
    Float,
    Double,
}

/// `value` rendered the way `String.valueOf` renders a `kind`.
pub(super) fn primitive_text(value: &Value, kind: Primitive) -> Result<String, VmError> {
    Ok(match kind {
        Primitive::Int => value.as_int()?.to_string(),
        Primitive::Long => value.as_long()?.to_string(),
        Primitive::Char => char::from_u32(value.as_int()? as u16 as u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string(),
        Primitive::Boolean => value.as_bool()?.to_string(),
        Primitive::Float => {
            let v = value.as_float()?;
            floating_text(v as f64, v.is_finite(), || v.to_string(), || format!("{v:e}"))
        }
        Primitive::Double => {
            let v = value.as_double()?;
            floating_text(v, v.is_finite(), || v.to_string(), || format!("{v:e}"))
        }
    })
}

/// Plain notation between 10^-3 and 10^7, computerized scientific notation
/// outside, always with a fractional digit.
fn floating_text(
    magnitude: f64,
    finite: bool,
    plain: impl FnOnce() -> String,
    scientific: impl FnOnce() -> String,
) -> String {
    if magnitude.is_nan() {
        return "NaN".to_string();
    }
    if !finite {
        return if magnitude > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let abs = magnitude.abs();
    if abs == 0.0 || (1e-3..1e7).contains(&abs) {
        let text = plain();
        if text.contains('.') { text } else { format!("{text}.0") }
    } else {
        let text = scientific();
        let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
        if mantissa.contains('.') {
            format!("{mantissa}E{exponent}")
        } else {
            format!("{mantissa}.0E{exponent}")
        }
    }
}

const VALUE_OF: &[(&str, Primitive, NativeFunction)] = &[
    ("(I)Ljava/lang/String;", Primitive::Int, native_string_value_of_int),
    ("(J)Ljava/lang/String;", Primitive::Long, native_string_value_of_long),
    ("(C)Ljava/lang/String;", Primitive::Char, native_string_value_of_char),
    ("(Z)Ljava/lang/String;", Primitive::Boolean, native_string_value_of_boolean),
    ("(F)Ljava/lang/String;", Primitive::Float, native_string_value_of_float),
    ("(D)Ljava/lang/String;", Primitive::Double, native_string_value_of_double),
];

macro_rules! value_of_natives {
    ($($suffix:ident => $kind:ident),* $(,)?) => {
        paste::paste! {
            $(
                fn [<native_string_value_of_ $suffix>](env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
                    let text = primitive_text(env.arg(0)?, Primitive::$kind)?;
                    env.new_string(&text)
                }
            )*
        }
    };
}

value_of_natives!(
    int => Int,
    long => Long,
    char => Char,
    boolean => Boolean,
    float => Float,
    double => Double,
);

pub(super) fn classes() -> Vec<ClassAst> {
    let public = MethodAccessFlag::PUBLIC;
    let public_static = MethodAccessFlag::PUBLIC | MethodAccessFlag::STATIC;
    let mut string = ClassBuilder::new(STRING);
    string
        .access_flags(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::SUPER)
        .implements(SERIALIZABLE)
        .native_method(public, "length", "()I")
        .native_method(public, "isEmpty", "()Z")
        .native_method(public, "charAt", "(I)C")
        .native_method(public, "equals", "(Ljava/lang/Object;)Z")
        .native_method(public, "hashCode", "()I")
        .native_method(public, "toString", "()Ljava/lang/String;")
        .native_method(public, "concat", "(Ljava/lang/String;)Ljava/lang/String;")
        .native_method(public, "intern", "()Ljava/lang/String;");
    for (descriptor, _, _) in VALUE_OF {
        string.native_method(public_static, "valueOf", descriptor);
    }

    // String.valueOf(Object) dispatches to a possibly bytecode toString()
    let null = string.string("null");
    let to_string = string.method_ref(OBJECT, "toString", "()Ljava/lang/String;");
    string.method(
        public_static,
        "valueOf",
        "(Ljava/lang/Object;)Ljava/lang/String;",
        CodeAst::new(
            1,
            1,
            vec![
                Instruction::Load(ValueKind::Reference, 0),
                Instruction::IfNonNull(4),
                Instruction::Ldc(null),
                Instruction::Return(Some(ValueKind::Reference)),
                Instruction::Load(ValueKind::Reference, 0),
                Instruction::InvokeVirtual(to_string),
                Instruction::Return(Some(ValueKind::Reference)),
            ],
        ),
    );
    vec![string.build()]
}

pub(super) fn register_natives(registry: &NativeRegistry) {
    registry.register(STRING, "length", "()I", native_string_length);
    registry.register(STRING, "isEmpty", "()Z", native_string_is_empty);
    registry.register(STRING, "charAt", "(I)C", native_string_char_at);
    registry.register(STRING, "equals", "(Ljava/lang/Object;)Z", native_string_equals);
    registry.register(STRING, "hashCode", "()I", native_string_hash_code);
    registry.register(STRING, "toString", "()Ljava/lang/String;", native_string_to_string);
    registry.register(
        STRING,
        "concat",
        "(Ljava/lang/String;)Ljava/lang/String;",
        native_string_concat,
    );
    registry.register(STRING, "intern", "()Ljava/lang/String;", native_string_intern);
    for (descriptor, _, function) in VALUE_OF {
        registry.register(STRING, "valueOf", descriptor, *function);
    }
}

fn this_str(env: &NativeEnv<'_>) -> NativeResult<std::sync::Arc<str>> {
    Ok(java_string(&env.this()?)?)
}

// lengths and indices count UTF-16 code units
fn native_string_length(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let length = this_str(env)?.encode_utf16().count();
    Ok(Some(Value::Int(length as i32)))
}

fn native_string_is_empty(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(Value::from(this_str(env)?.is_empty())))
}

fn native_string_char_at(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let value = this_str(env)?;
    let index = env.arg(0)?.as_int()?;
    let unit = usize::try_from(index)
        .ok()
        .and_then(|i| value.encode_utf16().nth(i));
    match unit {
        Some(unit) => Ok(Some(Value::Int(unit as i32))),
        None => Err(Exception::new_vm_msg(
            STRING_INDEX_OUT_OF_BOUNDS_EXCEPTION,
            format!(
                "Index {index} out of bounds for length {}",
                value.encode_utf16().count()
            ),
        )
        .into()),
    }
}

fn native_string_equals(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let value = this_str(env)?;
    let equal = match env.arg(0)?.as_reference()? {
        Some(other) => java_string(&other).is_ok_and(|other| other == value),
        None => false,
    };
    Ok(Some(Value::from(equal)))
}

// s[0]*31^(n-1) + s[1]*31^(n-2) + ... + s[n-1]
fn native_string_hash_code(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let hash = this_str(env)?
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32));
    Ok(Some(Value::Int(hash)))
}

fn native_string_to_string(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(Some(Value::from_ref(env.this()?)))
}

fn native_string_concat(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let value = this_str(env)?;
    let Some(other) = env.string_arg(0)? else {
        return Err(Exception::new_vm(NULL_POINTER_EXCEPTION).into());
    };
    if other.is_empty() {
        return Ok(Some(Value::from_ref(env.this()?)));
    }
    env.new_string(&format!("{value}{other}"))
}

fn native_string_intern(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let value = this_str(env)?;
    Ok(Some(Value::from_ref(env.runtime.intern_string(&value)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_text() {
        let cases = [
            (Value::Int(-7), Primitive::Int, "-7"),
            (Value::Long(1 << 40), Primitive::Long, "1099511627776"),
            (Value::Int(65), Primitive::Char, "A"),
            (Value::Int(0), Primitive::Boolean, "false"),
            (Value::Double(1.0), Primitive::Double, "1.0"),
            (Value::Double(0.1), Primitive::Double, "0.1"),
            (Value::Double(-0.0), Primitive::Double, "-0.0"),
            (Value::Double(1e10), Primitive::Double, "1.0E10"),
            (Value::Double(1.5e-5), Primitive::Double, "1.5E-5"),
            (Value::Double(f64::NAN), Primitive::Double, "NaN"),
            (Value::Double(f64::NEG_INFINITY), Primitive::Double, "-Infinity"),
            (Value::Float(2.5), Primitive::Float, "2.5"),
        ];
        for (value, kind, expected) in cases {
            assert_eq!(primitive_text(&value, kind).unwrap(), expected, "{value:?}");
        }
    }

    #[test]
    fn test_primitive_text_type_mismatch() {
        assert!(primitive_text(&Value::Long(1), Primitive::Int).is_err());
    }
}
