use super::NativeEnv;
use crate::class::{ClassAst, ClassBuilder};
use crate::consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag};
use crate::runtime::{
    Exception, NativeRegistry, NativeResult, StdStream, Value,
    famous_classes::{
        ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, ARRAY_STORE_EXCEPTION, PRINT_STREAM, SYSTEM,
    },
    inheritance::is_assignable_to,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const OUT: &str = "out:Ljava/io/PrintStream;";
const ERR: &str = "err:Ljava/io/PrintStream;";

pub(super) fn classes() -> Vec<ClassAst> {
    let public_static = MethodAccessFlag::PUBLIC | MethodAccessFlag::STATIC;
    let stream_field = FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC | FieldAccessFlag::FINAL;
    let mut system = ClassBuilder::new(SYSTEM);
    system
        .access_flags(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::SUPER)
        .field(stream_field, "out", "Ljava/io/PrintStream;")
        .field(stream_field, "err", "Ljava/io/PrintStream;")
        .native_method(MethodAccessFlag::STATIC, "<clinit>", "()V")
        .native_method(
            public_static,
            "arraycopy",
            "(Ljava/lang/Object;ILjava/lang/Object;II)V",
        )
        .native_method(public_static, "identityHashCode", "(Ljava/lang/Object;)I")
        .native_method(public_static, "currentTimeMillis", "()J")
        .native_method(public_static, "nanoTime", "()J")
        .native_method(public_static, "exit", "(I)V")
        .native_method(public_static, "lineSeparator", "()Ljava/lang/String;");
    vec![system.build()]
}

pub(super) fn register_natives(registry: &NativeRegistry) {
    registry.register(SYSTEM, "<clinit>", "()V", native_system_clinit);
    registry.register(
        SYSTEM,
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
        native_system_arraycopy,
    );
    registry.register(
        SYSTEM,
        "identityHashCode",
        "(Ljava/lang/Object;)I",
        native_system_identity_hash_code,
    );
    registry.register(SYSTEM, "currentTimeMillis", "()J", native_system_current_time_millis);
    registry.register(SYSTEM, "nanoTime", "()J", native_system_nano_time);
    registry.register(SYSTEM, "exit", "(I)V", native_system_exit);
    registry.register(
        SYSTEM,
        "lineSeparator",
        "()Ljava/lang/String;",
        native_system_line_separator,
    );
}

fn native_system_clinit(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    for (field, stream) in [(OUT, StdStream::Out), (ERR, StdStream::Err)] {
        let print_stream = env.runtime.new_object(PRINT_STREAM)?;
        print_stream.set_extension(stream);
        env.class.put_static(field, Value::from_ref(print_stream));
    }
    Ok(None)
}

//     public static native void arraycopy(Object src,  int  srcPos,
//                                         Object dest, int destPos,
//                                         int length);
fn native_system_arraycopy(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let src = env.arg(0)?.as_object()?;
    let src_pos = env.arg(1)?.as_int()?;
    let dest = env.arg(2)?.as_object()?;
    let dest_pos = env.arg(3)?.as_int()?;
    let length = env.arg(4)?.as_int()?;

    let (Some(src_type), Some(dest_type)) = (
        src.class().component_type.as_ref(),
        dest.class().component_type.as_ref(),
    ) else {
        return Err(Exception::new_vm_msg(
            ARRAY_STORE_EXCEPTION,
            "arraycopy: argument is not an array",
        )
        .into());
    };
    if (src_type.is_primitive() || dest_type.is_primitive()) && src_type != dest_type {
        return Err(Exception::new_vm_msg(
            ARRAY_STORE_EXCEPTION,
            format!("arraycopy: type mismatch: can not copy {src_type}[] into {dest_type}[]"),
        )
        .into());
    }

    let src_len = src.array_length().unwrap_or_default() as i64;
    let dest_len = dest.array_length().unwrap_or_default() as i64;
    let out_of_bounds = |message: String| -> NativeResult<Option<Value>> {
        Err(Exception::new_vm_msg(ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, message).into())
    };
    if length < 0 {
        return out_of_bounds(format!("arraycopy: length {length} is negative"));
    }
    if src_pos < 0 || src_pos as i64 + length as i64 > src_len {
        return out_of_bounds(format!(
            "arraycopy: last source index {} out of bounds for length {src_len}",
            src_pos as i64 + length as i64
        ));
    }
    if dest_pos < 0 || dest_pos as i64 + length as i64 > dest_len {
        return out_of_bounds(format!(
            "arraycopy: last destination index {} out of bounds for length {dest_len}",
            dest_pos as i64 + length as i64
        ));
    }

    let (src_pos, dest_pos, length) = (src_pos as usize, dest_pos as usize, length as usize);
    let values = src
        .with_elements(|e| e[src_pos..src_pos + length].to_vec())
        .unwrap_or_default();
    // elements before the first incompatible one are still copied
    let mut copied = values.len();
    let checked_type = dest
        .class()
        .array_element_type
        .as_ref()
        .filter(|_| !Arc::ptr_eq(&src, &dest));
    if let Some(element_type) = checked_type {
        copied = values
            .iter()
            .position(|v| match v {
                Value::Reference(Some(object)) => !is_assignable_to(object.class(), element_type),
                _ => false,
            })
            .unwrap_or(values.len());
    }
    dest.with_elements_mut(|e| e[dest_pos..dest_pos + copied].clone_from_slice(&values[..copied]));
    if copied < values.len() {
        return Err(Exception::new_vm_msg(
            ARRAY_STORE_EXCEPTION,
            "arraycopy: element type mismatch",
        )
        .into());
    }
    Ok(None)
}

fn native_system_identity_hash_code(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let hash = env
        .arg(0)?
        .as_reference()?
        .map_or(0, |object| object.identity_hash());
    Ok(Some(Value::Int(hash)))
}

fn native_system_current_time_millis(_: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(Some(Value::Long(now.as_millis() as i64)))
}

fn native_system_nano_time(_: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(Some(Value::Long(now.as_nanos() as i64)))
}

fn native_system_exit(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    let status = env.arg(0)?.as_int()?;
    env.exit(status);
    Ok(None)
}

fn native_system_line_separator(env: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    env.new_string("\n")
}

