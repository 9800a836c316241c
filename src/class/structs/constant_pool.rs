use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPoolInfo {
    /// The unusable slot after a `Long` or `Double`.
    Empty,
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(Arc<str>),
    String(Arc<str>),
    Fieldref(MemberRef),
    Methodref(MemberRef),
    InterfaceMethodref(MemberRef),
    NameAndType {
        name: Arc<str>,
        descriptor: Arc<str>,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType(Arc<str>),
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name: Arc<str>,
        descriptor: Arc<str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub class: Arc<str>,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
}

impl MemberRef {
    pub fn new(class: &str, name: &str, descriptor: &str) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}
