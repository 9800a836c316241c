mod class;
mod object;
mod print_stream;
mod string;
mod string_builder;
mod system;
mod thread;
mod throwable;

use crate::class::ClassAst;
use crate::runtime::{
    Class, Exception, JavaString, NativeResult, ObjectRef, Runtime, Value, VmError,
    famous_classes::NULL_POINTER_EXCEPTION,
    thread::{Effects, Suspend, Thread, ThreadId},
};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A host function standing in for a method body. A returned value is
/// pushed on the caller's stack unless the method returns `void`.
pub type NativeFunction = fn(&mut NativeEnv<'_>) -> NativeResult<Option<Value>>;

/// What a native function sees of the call and the VM.
pub struct NativeEnv<'a> {
    pub runtime: &'a Runtime,
    /// Class declaring the native method.
    pub class: Arc<Class>,
    pub this: Option<ObjectRef>,
    pub args: Vec<Value>,
    pub thread: ThreadId,
    pub(crate) effects: &'a mut Effects,
}

impl<'a> NativeEnv<'a> {
    pub(crate) fn new(
        runtime: &'a Runtime,
        class: Arc<Class>,
        this: Option<ObjectRef>,
        args: Vec<Value>,
        thread: ThreadId,
        effects: &'a mut Effects,
    ) -> Self {
        Self {
            runtime,
            class,
            this,
            args,
            thread,
            effects,
        }
    }

    pub fn arg(&self, index: usize) -> Result<&Value, VmError> {
        self.args.get(index).ok_or(VmError::StackUnderflow)
    }

    /// The receiver; static natives have none.
    pub fn this(&self) -> NativeResult<ObjectRef> {
        self.this
            .clone()
            .ok_or_else(|| Exception::new_vm(NULL_POINTER_EXCEPTION).into())
    }

    /// Contents of the string argument at `index`, `None` for null.
    pub fn string_arg(&self, index: usize) -> NativeResult<Option<Arc<str>>> {
        match self.arg(index)?.as_reference()? {
            Some(object) => Ok(Some(java_string(&object)?)),
            None => Ok(None),
        }
    }

    pub fn new_string(&self, value: &str) -> NativeResult<Option<Value>> {
        Ok(Some(Value::from_ref(self.runtime.new_string(value)?)))
    }

    /// Ends the VM with `status` once the current step completes.
    pub fn exit(&mut self, status: i32) {
        self.effects.exit = Some(status);
    }

    pub(crate) fn suspend(&mut self, suspend: Suspend) {
        self.effects.suspend = Some(suspend);
    }

    pub(crate) fn notified(&mut self, threads: impl IntoIterator<Item = ThreadId>) {
        self.effects.notified.extend(threads);
    }

    pub(crate) fn woken(&mut self, threads: impl IntoIterator<Item = ThreadId>) {
        self.effects.woken.extend(threads);
    }

    pub(crate) fn spawn(&mut self, thread: Thread) {
        self.effects.spawned.push(thread);
    }
}

/// Contents of a `java/lang/String` object.
pub(crate) fn java_string(object: &ObjectRef) -> Result<Arc<str>, VmError> {
    object
        .extension::<JavaString>()
        .map(|s| s.0)
        .ok_or(VmError::TypeMismatch {
            expected: "java/lang/String",
            found: "other object",
        })
}

/// `class/name(descriptor)`, e.g. `java/lang/Object/hashCode()I`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeKey(String);

impl NativeKey {
    pub fn new(class: &str, name: &str, descriptor: &str) -> Self {
        Self(format!("{class}/{name}{descriptor}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn belongs_to(&self, class: &str) -> bool {
        self.0
            .strip_prefix(class)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.split_once('('))
            .is_some_and(|(name, _)| !name.contains('/'))
    }
}

impl fmt::Display for NativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host functions by `(class, name, descriptor)`. Consulted before a method's
/// bytecode, so a registration replaces any body the class provides.
#[derive(Default)]
pub struct NativeRegistry {
    functions: DashMap<NativeKey, NativeFunction>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the natives of the built-in classes.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        object::register_natives(&registry);
        class::register_natives(&registry);
        string::register_natives(&registry);
        string_builder::register_natives(&registry);
        system::register_natives(&registry);
        print_stream::register_natives(&registry);
        thread::register_natives(&registry);
        throwable::register_natives(&registry);
        registry
    }

    /// Registers `function`, replacing an earlier registration for the same
    /// method.
    pub fn register(&self, class: &str, name: &str, descriptor: &str, function: NativeFunction) {
        let key = NativeKey::new(class, name, descriptor);
        if self.functions.insert(key, function).is_some() {
            debug!(class, name, descriptor, "native function replaced");
        }
    }

    pub fn lookup(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFunction> {
        self.functions
            .get(&NativeKey::new(class, name, descriptor))
            .map(|f| *f.value())
    }

    pub fn contains(&self, class: &str, name: &str, descriptor: &str) -> bool {
        self.functions
            .contains_key(&NativeKey::new(class, name, descriptor))
    }

    /// Keys registered for `class`, sorted.
    pub fn natives_for(&self, class: &str) -> Vec<NativeKey> {
        let mut keys: Vec<_> = self
            .functions
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.belongs_to(class))
            .collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        keys
    }
}

/// Class definitions backing the built-in natives.
pub(crate) fn builtin_classes() -> Vec<ClassAst> {
    let mut classes = vec![];
    classes.extend(object::classes());
    classes.extend(class::classes());
    classes.extend(string::classes());
    classes.extend(string_builder::classes());
    classes.extend(system::classes());
    classes.extend(print_stream::classes());
    classes.extend(thread::classes());
    classes.extend(throwable::classes());
    classes
}

fn native_nop(_: &mut NativeEnv<'_>) -> NativeResult<Option<Value>> {
    Ok(None)
}
