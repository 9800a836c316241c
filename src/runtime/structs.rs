use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use constant_pool::*;
pub use monitor::*;
pub use object::*;

use crate::{
    class::Instruction,
    consts::{ClassAccessFlag, MethodAccessFlag},
    descriptor::{FieldType, MethodDescriptor},
    runtime::{ThreadId, Value, VmError},
};

mod constant_pool;
mod monitor;
mod object;

/// A linked class. Immutable after linking except for static storage and
/// initialization state.
pub struct Class {
    pub(crate) constant_pool: Vec<ConstantPoolInfo>,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) class_name: Arc<str>,
    pub(crate) super_class: Option<Arc<Class>>,
    pub(crate) interfaces: Vec<Arc<Class>>,
    pub(crate) static_fields_info: Vec<FieldInfo>,
    pub(crate) instance_fields_info: Vec<FieldInfo>,
    // instance slots of this class and all superclasses
    pub(crate) field_layout: FieldLayout,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) static_fields: Vec<RwLock<Value>>,
    // only for arrays
    pub(crate) component_type: Option<FieldType>,
    // only for arrays of reference type
    pub(crate) array_element_type: Option<Arc<Class>>,
    // every callable method keyed by `name + descriptor`: own methods,
    // inherited ones, and default methods of superinterfaces
    pub(crate) vtable: HashMap<Arc<str>, VtableIndex>,
    pub(crate) source_file: Option<Arc<str>>,
    pub(in crate::runtime) init_state: Mutex<InitState>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InitState {
    Uninitialized,
    InProgress(ThreadId),
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub enum VtableIndex {
    InThisClass(usize),
    OtherClass { class: Arc<Class>, index: usize },
}

pub(crate) fn method_key(name: &str, descriptor: &str) -> String {
    format!("{name}{descriptor}")
}

/// A method together with the class declaring it.
#[derive(Clone)]
pub struct ResolvedMethod {
    pub(crate) class: Arc<Class>,
    pub(crate) index: usize,
}

impl ResolvedMethod {
    pub fn method(&self) -> &MethodInfo {
        &self.class.methods[self.index]
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn qualified_name(&self) -> String {
        let method = self.method();
        format!("{}.{}{}", self.class.class_name, method.name, method.descriptor_str)
    }
}

impl fmt::Debug for ResolvedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

impl Class {
    pub fn name(&self) -> &str {
        &self.class_name
    }

    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<Class>] {
        &self.interfaces
    }

    pub fn init_state(&self) -> InitState {
        *self.init_state.lock()
    }

    pub(crate) fn set_init_state(&self, state: InitState) {
        *self.init_state.lock() = state;
    }

    pub(crate) fn get_constant(&self, index: u16) -> Result<&ConstantPoolInfo, VmError> {
        index
            .checked_sub(1)
            .and_then(|i| self.constant_pool.get(i as usize))
            .ok_or_else(|| VmError::InvalidConstant {
                class: self.class_name.to_string(),
                index,
                expected: "a valid entry",
            })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::ABSTRACT)
    }

    pub fn is_array(&self) -> bool {
        self.class_name.starts_with('[')
    }

    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name.as_ref() == name && m.descriptor_str.as_ref() == descriptor)
    }

    /// Looks `name + descriptor` up in the linearized method table, falling
    /// back to the declared methods for constructors and initializers.
    pub fn find_method(self: &Arc<Self>, name: &str, descriptor: &str) -> Option<ResolvedMethod> {
        match self.vtable.get(method_key(name, descriptor).as_str()) {
            Some(VtableIndex::InThisClass(index)) => Some(ResolvedMethod {
                class: Arc::clone(self),
                index: *index,
            }),
            Some(VtableIndex::OtherClass { class, index }) => Some(ResolvedMethod {
                class: Arc::clone(class),
                index: *index,
            }),
            None => match self.declared_method(name, descriptor) {
                Some(index) => Some(ResolvedMethod {
                    class: Arc::clone(self),
                    index,
                }),
                // static methods are not in the vtable but still resolve
                // through superclasses
                None => self.super_class.as_ref()?.find_method(name, descriptor),
            },
        }
    }

    pub(crate) fn get_static_field(&self, index: usize) -> Value {
        self.static_fields[index].read().clone()
    }

    pub(crate) fn set_static_field(&self, index: usize, value: Value) {
        *self.static_fields[index].write() = value;
    }

    pub fn static_field_index(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.static_fields_info
            .iter()
            .find(|f| f.name.as_ref() == name && f.descriptor_str.as_ref() == descriptor)
            .map(|f| f.index)
    }

    /// Reads a static field declared by this class, keyed `name:descriptor`.
    pub fn get_static(&self, key: &str) -> Option<Value> {
        let (name, descriptor) = key.split_once(':')?;
        let index = self.static_field_index(name, descriptor)?;
        Some(self.get_static_field(index))
    }

    pub fn put_static(&self, key: &str, value: Value) -> bool {
        let Some((name, descriptor)) = key.split_once(':') else {
            return false;
        };
        let Some(index) = self.static_field_index(name, descriptor) else {
            return false;
        };
        self.set_static_field(index, value);
        true
    }

    pub fn field_layout(&self) -> &FieldLayout {
        &self.field_layout
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("class_name", &self.class_name)
            .field("super_class", &self.super_class.as_ref().map(|c| &c.class_name))
            .field("methods", &self.methods.len())
            .field("init_state", &self.init_state())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: FieldType,
    pub(crate) descriptor_str: Arc<str>,
    pub(crate) index: usize,
    // `ConstantValue` constant pool index, statics only
    pub(crate) constant_value: Option<u16>,
}

/// Instance slot assignment, inherited slots first.
///
/// Every slot answers to `Declaring.name:descriptor`; the bare
/// `name:descriptor` key names the most derived declaration, so a subclass
/// redeclaring a field shadows the inherited one without removing it.
#[derive(Debug, Clone, Default)]
pub struct FieldLayout {
    slots: Vec<FieldSlot>,
    by_key: HashMap<Arc<str>, usize>,
}

#[derive(Debug, Clone)]
pub struct FieldSlot {
    pub(crate) field_type: FieldType,
}

impl FieldLayout {
    pub(crate) fn extend(
        parent: Option<&FieldLayout>,
        class_name: &str,
        fields: &[FieldInfo],
    ) -> Self {
        let mut layout = parent.cloned().unwrap_or_default();
        for field in fields {
            let index = layout.slots.len();
            layout.slots.push(FieldSlot {
                field_type: field.descriptor.clone(),
            });
            let key = format!("{}:{}", field.name, field.descriptor_str);
            layout
                .by_key
                .insert(format!("{class_name}.{key}").into(), index);
            layout.by_key.insert(key.into(), index);
        }
        layout
    }

    pub fn slot(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug)]
pub struct MethodInfo {
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: MethodDescriptor,
    pub(crate) descriptor_str: Arc<str>,
    pub(crate) code: Option<Arc<Code>>,
}

impl MethodInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor_str
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::ABSTRACT)
    }

    pub fn is_private(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::PRIVATE)
    }

    pub fn is_synchronized(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::SYNCHRONIZED)
    }

    /// Operand stack entries consumed by an invocation, receiver included.
    pub(crate) fn arg_count(&self) -> usize {
        self.descriptor.parameters.len() + usize::from(!self.is_static())
    }
}

/// Linked bytecode: branch targets and handler ranges are instruction indices.
#[derive(Debug)]
pub struct Code {
    pub(crate) max_stack: usize,
    pub(crate) max_locals: usize,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) offsets: Vec<u32>,
    pub(crate) exception_table: Vec<ExceptionHandler>,
    pub(crate) line_numbers: Vec<(usize, u16)>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExceptionHandler {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) handler: usize,
    /// `None` catches everything.
    pub(crate) catch_type: Option<u16>,
}

impl Code {
    pub fn line_number(&self, pc: usize) -> Option<u16> {
        self.line_numbers
            .iter()
            .take_while(|(start, _)| *start <= pc)
            .last()
            .map(|(_, line)| *line)
    }

    pub fn offset_of(&self, pc: usize) -> Option<u32> {
        self.offsets.get(pc).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, descriptor: &str, field_type: FieldType) -> FieldInfo {
        FieldInfo {
            name: name.into(),
            descriptor: field_type,
            descriptor_str: descriptor.into(),
            index: 0,
            constant_value: None,
        }
    }

    #[test]
    fn test_field_layout_shadowing() {
        let base = FieldLayout::extend(
            None,
            "A",
            &[field("x", "I", FieldType::Int), field("y", "J", FieldType::Long)],
        );
        let derived = FieldLayout::extend(Some(&base), "B", &[field("x", "I", FieldType::Int)]);
        assert_eq!(derived.len(), 3);
        assert_eq!(derived.slot("x:I"), Some(2));
        assert_eq!(derived.slot("B.x:I"), Some(2));
        assert_eq!(derived.slot("A.x:I"), Some(0));
        assert_eq!(derived.slot("y:J"), Some(1));
        assert_eq!(derived.slot("z:I"), None);
        assert_eq!(base.slot("x:I"), Some(0));
    }

    #[test]
    fn test_line_number_lookup() {
        let code = Code {
            max_stack: 0,
            max_locals: 0,
            instructions: vec![Instruction::Nop; 6],
            offsets: (0..6).collect(),
            exception_table: vec![],
            line_numbers: vec![(0, 10), (3, 12)],
        };
        assert_eq!(code.line_number(2), Some(10));
        assert_eq!(code.line_number(5), Some(12));
    }
}
