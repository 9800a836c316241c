mod reflection;
mod string_table;

pub use reflection::ClassMirror;
pub use string_table::JavaString;

use crate::runtime::{
    Class, Exception, Object, ObjectRef,
    famous_classes::{INSTANTIATION_ERROR, NEGATIVE_ARRAY_SIZE_EXCEPTION},
};
use reflection::ClassTable;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering::Relaxed};
use string_table::StringTable;

/// Allocation front end. Objects are reference counted, so the heap only
/// keeps what must stay canonical: interned strings and class mirrors.
pub struct Heap {
    next_hash: AtomicI32,
    string_table: StringTable,
    class_table: ClassTable,
}

impl Heap {
    pub(in crate::runtime) fn new() -> Self {
        Self {
            next_hash: AtomicI32::new(1),
            string_table: StringTable::new(),
            class_table: ClassTable::new(),
        }
    }

    fn next_hash(&self) -> i32 {
        self.next_hash.fetch_add(1, Relaxed)
    }

    /// A zero-initialized instance of `class`.
    pub fn allocate(&self, class: &Arc<Class>) -> Result<ObjectRef, Exception> {
        if class.is_interface() || class.is_abstract() {
            return Err(Exception::new_vm_msg(INSTANTIATION_ERROR, class.name()));
        }
        Ok(Arc::new(Object::new_instance(Arc::clone(class), self.next_hash())))
    }

    /// `array_class` must be an array class such as `[I`.
    pub fn allocate_array(
        &self,
        array_class: &Arc<Class>,
        length: i32,
    ) -> Result<ObjectRef, Exception> {
        let Ok(length) = usize::try_from(length) else {
            return Err(Exception::new_vm_msg(
                NEGATIVE_ARRAY_SIZE_EXCEPTION,
                length.to_string(),
            ));
        };
        Ok(Arc::new(Object::new_array(
            Arc::clone(array_class),
            self.next_hash(),
            length,
        )))
    }

    /// Shallow copy of `object` with its own identity hash.
    pub fn clone_object(&self, object: &ObjectRef) -> ObjectRef {
        Arc::new(object.duplicate(self.next_hash()))
    }

    pub(in crate::runtime) fn new_string(
        &self,
        string_class: &Arc<Class>,
        value: &str,
    ) -> ObjectRef {
        let object = Arc::new(Object::new_instance(Arc::clone(string_class), self.next_hash()));
        object.set_extension(JavaString(value.into()));
        object
    }

    /// The canonical string object for `value`.
    pub(in crate::runtime) fn intern_string(
        &self,
        string_class: &Arc<Class>,
        value: &str,
    ) -> ObjectRef {
        self.string_table
            .get_or_insert_with(value, || self.new_string(string_class, value))
    }

    /// The `java/lang/Class` object mirroring `class`.
    pub(in crate::runtime) fn class_object(
        &self,
        class_class: &Arc<Class>,
        class: &Arc<Class>,
    ) -> ObjectRef {
        self.class_table.get_or_insert_with(class, || {
            let object = Arc::new(Object::new_instance(Arc::clone(class_class), self.next_hash()));
            object.set_extension(ClassMirror(Arc::clone(class)));
            object
        })
    }
}
