use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::runtime::{Class, NativeResult, ResolvedMethod};

/// Runtime constant pool entry. Symbolic references resolve on first use
/// and the result is cached in the entry.
#[derive(Debug)]
pub enum ConstantPoolInfo {
    Empty,
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(CpClassInfo),
    String(Arc<str>),
    Fieldref(CpFieldRef),
    Methodref(CpMethodRef),
    InterfaceMethodref(CpMethodRef),
    NameAndType,
    MethodHandle,
    MethodType,
    InvokeDynamic { name: Arc<str> },
}

#[derive(Debug)]
pub struct CpClassInfo {
    pub(crate) name: Arc<str>,
    pub(crate) class: OnceCell<Arc<Class>>,
}

impl CpClassInfo {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            class: OnceCell::new(),
        }
    }

    pub(crate) fn get_or_load_class(
        &self,
        resolver: impl FnOnce() -> NativeResult<Arc<Class>>,
    ) -> NativeResult<Arc<Class>> {
        Ok(Arc::clone(self.class.get_or_try_init(resolver)?))
    }
}

#[derive(Debug)]
pub struct CpFieldRef {
    pub(crate) class: CpClassInfo,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor_str: Arc<str>,
    pub(crate) resolved: OnceCell<FieldResolve>,
}

#[derive(Debug, Clone)]
pub enum FieldResolve {
    Instance { class: Arc<Class>, slot: usize },
    Static { class: Arc<Class>, index: usize },
}

#[derive(Debug)]
pub struct CpMethodRef {
    pub(crate) class: CpClassInfo,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor_str: Arc<str>,
    pub(crate) resolved: OnceCell<ResolvedMethod>,
}
