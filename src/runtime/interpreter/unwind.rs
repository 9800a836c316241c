use super::{Frame, resolve_class_ref};
use crate::runtime::{
    ObjectRef, Runtime, VmError,
    famous_classes::{ERROR, EXCEPTION_IN_INITIALIZER_ERROR},
    inheritance::{is_assignable_to, is_subclass_named},
};
use tracing::warn;

/// The handler in `frame` that covers its pc and accepts `thrown`.
///
/// Entries are tried in table order and the first match wins, so an inner
/// handler listed before an outer one shadows it for the overlapping range.
pub(crate) fn find_handler(runtime: &Runtime, frame: &Frame, thrown: &ObjectRef) -> Option<usize> {
    let pc = frame.pc;
    for entry in &frame.code.exception_table {
        if pc < entry.start || pc >= entry.end {
            continue;
        }
        let Some(catch_type) = entry.catch_type else {
            return Some(entry.handler);
        };
        match resolve_class_ref(runtime, frame.class(), catch_type) {
            Ok(class) if is_assignable_to(thrown.class(), &class) => return Some(entry.handler),
            Ok(_) => {}
            Err(fault) => warn!(
                method = ?frame.method,
                catch_type,
                %fault,
                "skipping handler with unresolvable catch type"
            ),
        }
    }
    None
}

/// What escapes a failed `<clinit>`: errors pass through unchanged, any
/// other throwable is wrapped in an `ExceptionInInitializerError`.
pub(crate) fn initializer_failure(
    runtime: &Runtime,
    thrown: ObjectRef,
) -> Result<ObjectRef, VmError> {
    if is_subclass_named(thrown.class(), ERROR) {
        return Ok(thrown);
    }
    runtime
        .new_throwable(EXCEPTION_IN_INITIALIZER_ERROR, None, Some(thrown))
        .map_err(|fault| VmError::Materialize {
            class_name: EXCEPTION_IN_INITIALIZER_ERROR.to_string(),
            reason: fault.to_string(),
        })
}
