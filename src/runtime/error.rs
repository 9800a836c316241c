use crate::runtime::{ObjectRef, ThreadId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A violated engine invariant. Never catchable by bytecode: the offending
/// thread is aborted and the error surfaces in its completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("operand stack overflow (max stack {max})")]
    StackOverflow { max: usize },
    #[error("pc {pc} is outside the {len} instructions of the method")]
    InvalidPc { pc: usize, len: usize },
    #[error("local variable {index} is outside the {max} local slots")]
    InvalidLocal { index: usize, max: usize },
    #[error("expected {expected} but found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("malformed exception table in {method}: {reason}")]
    MalformedExceptionTable { method: String, reason: String },
    #[error("branch target {target} in {method} is not an instruction offset")]
    InvalidBranchTarget { method: String, target: u32 },
    #[error("constant pool entry {index} of {class} is not {expected}")]
    InvalidConstant {
        class: String,
        index: u16,
        expected: &'static str,
    },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("could not materialize {class_name}: {reason}")]
    Materialize { class_name: String, reason: String },
    #[error("no such thread {0}")]
    NoSuchThread(ThreadId),
}

/// A throwable travelling through the unwinder.
///
/// Engine-raised exceptions stay symbolic until a handler or the thread's
/// owner needs the object, which keeps raising them cheap and lets a fault
/// be raised before the throwable's class is even loaded.
#[derive(Debug, Clone)]
pub enum Exception {
    VmException {
        class_name: Arc<str>,
        message: Option<String>,
    },
    UserException(ObjectRef),
}

impl Exception {
    pub fn new_vm(class_name: &str) -> Self {
        Exception::VmException {
            class_name: class_name.into(),
            message: None,
        }
    }

    pub fn new_vm_msg(class_name: &str, message: impl Into<String>) -> Self {
        Exception::VmException {
            class_name: class_name.into(),
            message: Some(message.into()),
        }
    }

    pub fn new(object: ObjectRef) -> Self {
        Exception::UserException(object)
    }

    pub fn class_name(&self) -> Arc<str> {
        match self {
            Exception::VmException { class_name, .. } => Arc::clone(class_name),
            Exception::UserException(object) => Arc::clone(&object.class().class_name),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exception::VmException {
                class_name,
                message: Some(message),
            } => write!(f, "{}: {message}", class_name.replace('/', ".")),
            Exception::VmException { class_name, .. } => f.write_str(&class_name.replace('/', ".")),
            Exception::UserException(object) => {
                f.write_str(&object.class().class_name.replace('/', "."))
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum Fault {
    #[error("{0}")]
    Throw(Exception),
    #[error(transparent)]
    Fatal(#[from] VmError),
}

impl From<Exception> for Fault {
    fn from(exception: Exception) -> Self {
        Fault::Throw(exception)
    }
}

pub type NativeResult<T> = Result<T, Fault>;

/// The shape of a throwable as reported to the embedder once it left the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrownValue {
    /// Internal class name, `java/lang/ArithmeticException`.
    pub type_name: String,
    pub message: Option<String>,
    pub cause: Option<Box<ThrownValue>>,
}

impl fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name.replace('/', "."))?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\nCaused by: {cause}")?;
        }
        Ok(())
    }
}
