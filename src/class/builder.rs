use super::{ClassAst, CodeAst, ConstantPoolInfo, FieldAst, MemberRef, MethodAst};
use crate::consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag};
use std::sync::Arc;

/// Assembles a [`ClassAst`] in memory. Used for the built-in classes and by
/// embedders that generate code without going through a class file.
///
/// Constant pool entries are deduplicated, so asking twice for the same
/// reference returns the same index.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    ast: ClassAst,
}

impl ClassBuilder {
    /// A public class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        Self {
            ast: ClassAst {
                name: name.into(),
                super_class: Some("java/lang/Object".into()),
                interfaces: vec![],
                access_flags: ClassAccessFlag::PUBLIC | ClassAccessFlag::SUPER,
                constant_pool: vec![],
                fields: vec![],
                methods: vec![],
                source_file: None,
            },
        }
    }

    pub fn new_interface(name: &str) -> Self {
        let mut builder = Self::new(name);
        builder.ast.access_flags =
            ClassAccessFlag::PUBLIC | ClassAccessFlag::INTERFACE | ClassAccessFlag::ABSTRACT;
        builder
    }

    pub fn extends(&mut self, super_class: &str) -> &mut Self {
        self.ast.super_class = Some(super_class.into());
        self
    }

    pub fn root(&mut self) -> &mut Self {
        self.ast.super_class = None;
        self
    }

    pub fn implements(&mut self, interface: &str) -> &mut Self {
        self.ast.interfaces.push(interface.into());
        self
    }

    pub fn access_flags(&mut self, access_flags: ClassAccessFlag) -> &mut Self {
        self.ast.access_flags = access_flags;
        self
    }

    pub fn source_file(&mut self, source_file: &str) -> &mut Self {
        self.ast.source_file = Some(source_file.into());
        self
    }

    pub fn field(
        &mut self,
        access_flags: FieldAccessFlag,
        name: &str,
        descriptor: &str,
    ) -> &mut Self {
        self.ast.fields.push(FieldAst {
            access_flags,
            name: name.into(),
            descriptor: descriptor.into(),
            constant_value: None,
        });
        self
    }

    /// A static field initialized from a `ConstantValue` entry at link time.
    pub fn constant_field(
        &mut self,
        name: &str,
        descriptor: &str,
        value: ConstantPoolInfo,
    ) -> &mut Self {
        let index = self.constant(value);
        self.ast.fields.push(FieldAst {
            access_flags: FieldAccessFlag::PUBLIC
                | FieldAccessFlag::STATIC
                | FieldAccessFlag::FINAL,
            name: name.into(),
            descriptor: descriptor.into(),
            constant_value: Some(index),
        });
        self
    }

    pub fn method(
        &mut self,
        access_flags: MethodAccessFlag,
        name: &str,
        descriptor: &str,
        code: CodeAst,
    ) -> &mut Self {
        self.ast.methods.push(MethodAst {
            access_flags,
            name: name.into(),
            descriptor: descriptor.into(),
            code: Some(code),
        });
        self
    }

    pub fn native_method(
        &mut self,
        access_flags: MethodAccessFlag,
        name: &str,
        descriptor: &str,
    ) -> &mut Self {
        self.ast.methods.push(MethodAst {
            access_flags: access_flags | MethodAccessFlag::NATIVE,
            name: name.into(),
            descriptor: descriptor.into(),
            code: None,
        });
        self
    }

    pub fn abstract_method(&mut self, name: &str, descriptor: &str) -> &mut Self {
        self.ast.methods.push(MethodAst {
            access_flags: MethodAccessFlag::PUBLIC | MethodAccessFlag::ABSTRACT,
            name: name.into(),
            descriptor: descriptor.into(),
            code: None,
        });
        self
    }

    /// Returns the 1-based index of `info`, appending it when absent. Wide
    /// constants are followed by an `Empty` slot.
    pub fn constant(&mut self, info: ConstantPoolInfo) -> u16 {
        if let Some(pos) = self.ast.constant_pool.iter().position(|c| *c == info) {
            return pos as u16 + 1;
        }
        let wide = matches!(info, ConstantPoolInfo::Long(_) | ConstantPoolInfo::Double(_));
        self.ast.constant_pool.push(info);
        let index = self.ast.constant_pool.len() as u16;
        if wide {
            self.ast.constant_pool.push(ConstantPoolInfo::Empty);
        }
        index
    }

    pub fn class_ref(&mut self, name: &str) -> u16 {
        self.constant(ConstantPoolInfo::Class(Arc::from(name)))
    }

    pub fn string(&mut self, value: &str) -> u16 {
        self.constant(ConstantPoolInfo::String(Arc::from(value)))
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.constant(ConstantPoolInfo::Integer(value))
    }

    pub fn long(&mut self, value: i64) -> u16 {
        self.constant(ConstantPoolInfo::Long(value))
    }

    pub fn double(&mut self, value: f64) -> u16 {
        self.constant(ConstantPoolInfo::Double(value))
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.constant(ConstantPoolInfo::Fieldref(MemberRef::new(class, name, descriptor)))
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.constant(ConstantPoolInfo::Methodref(MemberRef::new(class, name, descriptor)))
    }

    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.constant(ConstantPoolInfo::InterfaceMethodref(MemberRef::new(
            class, name, descriptor,
        )))
    }

    pub fn name(&self) -> &str {
        &self.ast.name
    }

    pub fn build(&self) -> ClassAst {
        self.ast.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_dedup_and_wide_slots() {
        let mut builder = ClassBuilder::new("Main");
        let a = builder.method_ref("Main", "f", "()V");
        let wide = builder.long(7);
        let b = builder.method_ref("Main", "f", "()V");
        let after = builder.integer(1);
        assert_eq!(a, 1);
        assert_eq!(a, b);
        assert_eq!(wide, 2);
        assert_eq!(after, 4);
        let ast = builder.build();
        assert_eq!(ast.constant(3), Some(&ConstantPoolInfo::Empty));
        assert_eq!(ast.constant(0), None);
    }
}
