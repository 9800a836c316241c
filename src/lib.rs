//! A cooperative, deterministic interpreter for JVM-style class files.
//!
//! Classes come in as already-parsed [`class::ClassAst`] values through a
//! [`runtime::ClassProvider`]; the [`runtime::Vm`] links them lazily, runs
//! every logical thread on a single host thread in round-robin turns, and
//! reports how each thread ended.

pub mod class;
pub mod consts;
pub mod descriptor;
pub mod runtime;

pub use runtime::{
    ClassProvider, Completion, Exception, Fault, InMemoryClassPath, NativeRegistry, ThreadId,
    ThreadStatus, ThrownValue, Termination, Value, Vm, VmConfig, VmError,
};
