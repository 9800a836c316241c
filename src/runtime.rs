mod class_loader;
mod config;
mod error;
mod famous_classes;
mod heap;
mod inheritance;
mod interpreter;
mod native;
mod scheduler;
mod structs;
mod thread;
mod value;
mod vm;

pub use class_loader::{ClassLoader, ClassProvider, InMemoryClassPath};
pub use config::VmConfig;
pub use error::*;
pub use heap::{ClassMirror, Heap, JavaString};
pub use native::{NativeEnv, NativeFunction, NativeKey, NativeRegistry};
pub use scheduler::TraceEntry;
pub use structs::*;
pub use thread::{Blocker, Completion, StackTraceElement, Thread, ThreadId, ThreadStatus};
pub use value::{ObjectRef, Value};
pub use vm::{Termination, ThreadReport, Vm};

use dashmap::DashMap;
use famous_classes::{CLASS, STRING, THREAD, THROWABLE};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering::Relaxed};

/// Everything shared by the threads of one VM: loaded classes, the heap,
/// the native table and the standard streams. Passed by reference into
/// every engine operation instead of living in globals, so independent
/// VMs can coexist in one process.
pub struct Runtime {
    pub(crate) config: VmConfig,
    pub(crate) class_loader: ClassLoader,
    pub(crate) heap: Heap,
    pub(crate) natives: NativeRegistry,
    output: Output,
    next_thread_id: AtomicU32,
    thread_objects: DashMap<ThreadId, ObjectRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Out,
    Err,
}

#[derive(Default)]
struct Output {
    captured: Option<(Mutex<String>, Mutex<String>)>,
}

impl Runtime {
    pub(crate) fn new(config: VmConfig, provider: Box<dyn ClassProvider>) -> Self {
        let output = Output {
            captured: config
                .capture_output
                .then(|| (Mutex::new(String::new()), Mutex::new(String::new()))),
        };
        Self {
            class_loader: ClassLoader::new(provider, config.eager_native_linking),
            heap: Heap::new(),
            natives: NativeRegistry::with_builtins(),
            output,
            next_thread_id: AtomicU32::new(0),
            thread_objects: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn load_class(&self, name: &str) -> NativeResult<Arc<Class>> {
        self.class_loader.resolve_class(name, &self.natives)
    }

    pub fn new_object(&self, class_name: &str) -> NativeResult<ObjectRef> {
        let class = self.load_class(class_name)?;
        Ok(self.heap.allocate(&class)?)
    }

    /// A new array of class `array_class_name`, e.g. `[I`.
    pub fn new_array(&self, array_class_name: &str, length: i32) -> NativeResult<ObjectRef> {
        let class = self.load_class(array_class_name)?;
        Ok(self.heap.allocate_array(&class, length)?)
    }

    pub fn new_string(&self, value: &str) -> NativeResult<ObjectRef> {
        let class = self.load_class(STRING)?;
        Ok(self.heap.new_string(&class, value))
    }

    pub fn intern_string(&self, value: &str) -> NativeResult<ObjectRef> {
        let class = self.load_class(STRING)?;
        Ok(self.heap.intern_string(&class, value))
    }

    pub fn class_object(&self, class: &Arc<Class>) -> NativeResult<ObjectRef> {
        let class_class = self.load_class(CLASS)?;
        Ok(self.heap.class_object(&class_class, class))
    }

    /// A throwable of `class_name` with its message and cause fields set,
    /// without running any constructor.
    pub fn new_throwable(
        &self,
        class_name: &str,
        message: Option<&str>,
        cause: Option<ObjectRef>,
    ) -> NativeResult<ObjectRef> {
        let object = self.new_object(class_name)?;
        if let Some(message) = message {
            let message = self.new_string(message)?;
            object.put_field(DETAIL_MESSAGE, Value::from_ref(message))?;
        }
        object.put_field(CAUSE, Value::Reference(cause))?;
        Ok(object)
    }

    /// The heap object for `exception`, allocating engine-raised ones.
    pub(crate) fn materialize(&self, exception: Exception) -> Result<ObjectRef, VmError> {
        match exception {
            Exception::UserException(object) => Ok(object),
            Exception::VmException {
                class_name,
                message,
            } => self
                .new_throwable(&class_name, message.as_deref(), None)
                .map_err(|fault| VmError::Materialize {
                    class_name: class_name.to_string(),
                    reason: fault.to_string(),
                }),
        }
    }

    /// Type, message and cause chain of a throwable object.
    pub fn thrown_value(&self, object: &ObjectRef) -> ThrownValue {
        let mut seen = vec![Arc::clone(object)];
        self.thrown_value_inner(object, &mut seen)
    }

    fn thrown_value_inner(&self, object: &ObjectRef, seen: &mut Vec<ObjectRef>) -> ThrownValue {
        let is_throwable = inheritance::is_subclass_named(object.class(), THROWABLE);
        let message = is_throwable
            .then(|| object.get_field(DETAIL_MESSAGE).ok())
            .flatten()
            .and_then(|v| v.as_reference().ok().flatten())
            .and_then(|s| s.extension::<JavaString>())
            .map(|s| s.0.to_string());
        let cause = is_throwable
            .then(|| object.get_field(CAUSE).ok())
            .flatten()
            .and_then(|v| v.as_reference().ok().flatten())
            .filter(|c| !seen.iter().any(|s| Arc::ptr_eq(s, c)));
        let cause = cause.map(|c| {
            seen.push(Arc::clone(&c));
            Box::new(self.thrown_value_inner(&c, seen))
        });
        ThrownValue {
            type_name: object.class_name().to_string(),
            message,
            cause,
        }
    }

    pub(crate) fn next_thread_id(&self) -> ThreadId {
        ThreadId(self.next_thread_id.fetch_add(1, Relaxed))
    }

    pub(crate) fn bind_thread_object(&self, thread: ThreadId, object: ObjectRef) {
        object.set_extension(thread);
        self.thread_objects.insert(thread, object);
    }

    /// A `java/lang/Thread` named `name` standing for `thread`.
    pub(crate) fn new_thread_object(
        &self,
        thread: ThreadId,
        name: &str,
    ) -> NativeResult<ObjectRef> {
        let object = self.new_object(THREAD)?;
        object.put_field(THREAD_NAME, Value::from_ref(self.new_string(name)?))?;
        self.bind_thread_object(thread, Arc::clone(&object));
        Ok(object)
    }

    /// The `java/lang/Thread` object of `thread`, created on first request
    /// for threads not started from bytecode.
    pub(crate) fn thread_object(&self, thread: ThreadId) -> NativeResult<ObjectRef> {
        if let Some(object) = self.thread_objects.get(&thread) {
            return Ok(Arc::clone(object.value()));
        }
        self.new_thread_object(thread, &format!("Thread-{}", thread.0))
    }

    pub fn print(&self, stream: StdStream, text: &str) {
        match (&self.output.captured, stream) {
            (Some((out, _)), StdStream::Out) => out.lock().push_str(text),
            (Some((_, err)), StdStream::Err) => err.lock().push_str(text),
            (None, StdStream::Out) => {
                let _ = std::io::stdout().lock().write_all(text.as_bytes());
            }
            (None, StdStream::Err) => {
                let _ = std::io::stderr().lock().write_all(text.as_bytes());
            }
        }
    }

    pub fn captured_output(&self, stream: StdStream) -> String {
        match (&self.output.captured, stream) {
            (Some((out, _)), StdStream::Out) => out.lock().clone(),
            (Some((_, err)), StdStream::Err) => err.lock().clone(),
            (None, _) => String::new(),
        }
    }
}

pub(crate) const DETAIL_MESSAGE: &str = "java/lang/Throwable.detailMessage:Ljava/lang/String;";
pub(crate) const CAUSE: &str = "java/lang/Throwable.cause:Ljava/lang/Throwable;";
pub(crate) const THREAD_NAME: &str = "java/lang/Thread.name:Ljava/lang/String;";
pub(crate) const THREAD_TARGET: &str = "java/lang/Thread.target:Ljava/lang/Runnable;";


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::runtime_with;

    #[test]
    fn test_identity_hash_is_monotonic_per_runtime() {
        let runtime = runtime_with(vec![]);
        let a = runtime.new_object("java/lang/Object").unwrap();
        let b = runtime.new_object("java/lang/Object").unwrap();
        assert!(b.identity_hash() > a.identity_hash());
        let other = runtime_with(vec![]);
        let c = other.new_object("java/lang/Object").unwrap();
        assert_eq!(c.identity_hash(), 1);
    }

    #[test]
    fn test_interned_strings_are_shared() {
        let runtime = runtime_with(vec![]);
        let a = runtime.intern_string("hello").unwrap();
        let b = runtime.intern_string("hello").unwrap();
        let c = runtime.new_string("hello").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(&*c.extension::<JavaString>().unwrap().0, "hello");
    }

    #[test]
    fn test_array_bounds_do_not_mutate() {
        let runtime = runtime_with(vec![]);
        let array = runtime.new_array("[I", 3).unwrap();
        array.array_store(1, Value::Int(5)).unwrap();
        for index in [-1, 3] {
            let Err(Fault::Throw(exception)) = array.array_store(index, Value::Int(9)) else {
                panic!("expected ArrayIndexOutOfBoundsException");
            };
            assert_eq!(
                &*exception.class_name(),
                famous_classes::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION
            );
        }
        let elements = array.with_elements(|e| e.to_vec()).unwrap();
        assert_eq!(elements, vec![Value::Int(0), Value::Int(5), Value::Int(0)]);
    }

    #[test]
    fn test_negative_array_size() {
        let runtime = runtime_with(vec![]);
        let Err(Fault::Throw(exception)) = runtime.new_array("[J", -1) else {
            panic!("expected NegativeArraySizeException");
        };
        assert_eq!(exception.to_string(), "java.lang.NegativeArraySizeException: -1");
    }

    #[test]
    fn test_undeclared_field_is_a_fault() {
        let runtime = runtime_with(vec![]);
        let object = runtime.new_object("java/lang/Object").unwrap();
        assert!(matches!(
            object.get_field("missing:I"),
            Err(Fault::Throw(Exception::VmException { .. }))
        ));
    }

    #[test]
    fn test_thrown_value_with_cause() {
        let runtime = runtime_with(vec![]);
        let cause = runtime
            .new_throwable("java/lang/ArithmeticException", Some("/ by zero"), None)
            .unwrap();
        let outer = runtime
            .new_throwable("java/lang/ExceptionInInitializerError", None, Some(cause))
            .unwrap();
        let thrown = runtime.thrown_value(&outer);
        assert_eq!(thrown.type_name, "java/lang/ExceptionInInitializerError");
        assert_eq!(thrown.message, None);
        let cause = thrown.cause.unwrap();
        assert_eq!(cause.message.as_deref(), Some("/ by zero"));
    }

    #[test]
    fn test_class_object_is_canonical() {
        let runtime = runtime_with(vec![]);
        let string = runtime.load_class("java/lang/String").unwrap();
        let a = runtime.class_object(&string).unwrap();
        let b = runtime.class_object(&string).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.extension::<ClassMirror>().unwrap().0.name(), "java/lang/String");
    }
}
