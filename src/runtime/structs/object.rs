use crate::runtime::{
    Class, Exception, Monitor, NativeResult, Value, VmError,
    famous_classes::{ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, NO_SUCH_FIELD_ERROR},
};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A heap instance or array.
pub struct Object {
    class: Arc<Class>,
    hash: i32,
    body: ObjectBody,
    monitor: OnceCell<Mutex<Monitor>>,
    // host state attached by natives, one value per type
    extensions: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

enum ObjectBody {
    Fields(RwLock<Box<[Value]>>),
    Array(RwLock<Box<[Value]>>),
}

impl Object {
    /// An instance with every slot of the class's field layout at its default.
    pub(in crate::runtime) fn new_instance(class: Arc<Class>, hash: i32) -> Self {
        let fields = class
            .field_layout
            .slots()
            .iter()
            .map(|slot| Value::default_for(&slot.field_type))
            .collect();
        Self::with_body(class, hash, ObjectBody::Fields(RwLock::new(fields)))
    }

    /// `class` must be an array class.
    pub(in crate::runtime) fn new_array(class: Arc<Class>, hash: i32, length: usize) -> Self {
        let default = class
            .component_type
            .as_ref()
            .map(Value::default_for)
            .unwrap_or_else(Value::null);
        let elements = vec![default; length].into_boxed_slice();
        Self::with_body(class, hash, ObjectBody::Array(RwLock::new(elements)))
    }

    /// A copy of the fields or elements under a fresh identity. Monitor
    /// state and host extensions stay with the original.
    pub(in crate::runtime) fn duplicate(&self, hash: i32) -> Self {
        let body = match &self.body {
            ObjectBody::Fields(fields) => ObjectBody::Fields(RwLock::new(fields.read().clone())),
            ObjectBody::Array(elements) => ObjectBody::Array(RwLock::new(elements.read().clone())),
        };
        Self::with_body(Arc::clone(&self.class), hash, body)
    }

    fn with_body(class: Arc<Class>, hash: i32, body: ObjectBody) -> Self {
        Self {
            class,
            hash,
            body,
            monitor: OnceCell::new(),
            extensions: Mutex::new(HashMap::new()),
        }
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        &self.class.class_name
    }

    pub fn identity_hash(&self) -> i32 {
        self.hash
    }

    pub fn is_array(&self) -> bool {
        matches!(self.body, ObjectBody::Array(_))
    }

    /// Reads a field by `name:descriptor` (most derived declaration) or
    /// `Declaring.name:descriptor`.
    pub fn get_field(&self, key: &str) -> NativeResult<Value> {
        let slot = self.field_slot(key)?;
        Ok(self.get_slot(slot)?)
    }

    pub fn put_field(&self, key: &str, value: Value) -> NativeResult<()> {
        let slot = self.field_slot(key)?;
        Ok(self.put_slot(slot, value)?)
    }

    fn field_slot(&self, key: &str) -> Result<usize, Exception> {
        self.class.field_layout.slot(key).ok_or_else(|| {
            Exception::new_vm_msg(NO_SUCH_FIELD_ERROR, format!("{}.{key}", self.class.class_name))
        })
    }

    pub(crate) fn get_slot(&self, index: usize) -> Result<Value, VmError> {
        let ObjectBody::Fields(fields) = &self.body else {
            return Err(VmError::TypeMismatch {
                expected: "instance",
                found: "array",
            });
        };
        fields.read().get(index).cloned().ok_or(VmError::TypeMismatch {
            expected: "declared field",
            found: "foreign field slot",
        })
    }

    pub(crate) fn put_slot(&self, index: usize, value: Value) -> Result<(), VmError> {
        let ObjectBody::Fields(fields) = &self.body else {
            return Err(VmError::TypeMismatch {
                expected: "instance",
                found: "array",
            });
        };
        let mut fields = fields.write();
        let slot = fields.get_mut(index).ok_or(VmError::TypeMismatch {
            expected: "declared field",
            found: "foreign field slot",
        })?;
        *slot = value;
        Ok(())
    }

    fn elements(&self) -> Result<&RwLock<Box<[Value]>>, VmError> {
        match &self.body {
            ObjectBody::Array(elements) => Ok(elements),
            ObjectBody::Fields(_) => Err(VmError::TypeMismatch {
                expected: "array",
                found: "instance",
            }),
        }
    }

    pub fn array_length(&self) -> Option<usize> {
        self.elements().ok().map(|e| e.read().len())
    }

    pub fn array_load(&self, index: i32) -> NativeResult<Value> {
        let elements = self.elements()?.read();
        let slot = checked_index(index, elements.len())?;
        Ok(elements[slot].clone())
    }

    /// Bounds are checked before anything is written.
    pub fn array_store(&self, index: i32, value: Value) -> NativeResult<()> {
        let mut elements = self.elements()?.write();
        let slot = checked_index(index, elements.len())?;
        elements[slot] = value;
        Ok(())
    }

    pub fn with_elements<R>(&self, f: impl FnOnce(&[Value]) -> R) -> Option<R> {
        self.elements().ok().map(|e| f(&e.read()))
    }

    pub fn with_elements_mut<R>(&self, f: impl FnOnce(&mut [Value]) -> R) -> Option<R> {
        self.elements().ok().map(|e| f(&mut e.write()))
    }

    /// The object's monitor, attached on first use.
    pub fn monitor(&self) -> &Mutex<Monitor> {
        self.monitor.get_or_init(Default::default)
    }

    pub fn set_extension<T: Any + Send + Sync>(&self, value: T) {
        self.extensions
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn extension<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.extensions
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn with_extension_mut<T: Any + Send + Sync, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut extensions = self.extensions.lock();
        let value = extensions.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()?;
        Some(f(value))
    }
}

fn checked_index(index: i32, length: usize) -> Result<usize, Exception> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < length)
        .ok_or_else(|| {
            Exception::new_vm_msg(
                ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
                format!("Index {index} out of bounds for length {length}"),
            )
        })
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:x}", self.class.class_name, self.hash)
    }
}
