mod bootstrap;

pub(crate) use bootstrap::BootstrapProvider;

use crate::class::{self, ClassAst, CodeAst, MethodAst};
use crate::consts::{ClassAccessFlag, FieldAccessFlag};
use crate::descriptor::{self, FieldType};
use crate::runtime::{
    Class, Code, ConstantPoolInfo, CpClassInfo, CpFieldRef, CpMethodRef, Exception,
    ExceptionHandler, FieldInfo, FieldLayout, InitState, MethodInfo, NativeRegistry, NativeResult,
    Value, VmError, VtableIndex,
    famous_classes::{
        CLASS_CIRCULARITY_ERROR, CLASS_FORMAT_ERROR, CLONEABLE, INCOMPATIBLE_CLASS_CHANGE_ERROR,
        NO_CLASS_DEF_FOUND_ERROR, OBJECT, SERIALIZABLE, UNSATISFIED_LINK_ERROR,
    },
    method_key,
};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Source of class ASTs, typically backed by a class-file parser over a
/// class path.
pub trait ClassProvider: Send + Sync {
    fn find_class(&self, name: &str) -> Option<ClassAst>;
}

impl<F> ClassProvider for F
where
    F: Fn(&str) -> Option<ClassAst> + Send + Sync,
{
    fn find_class(&self, name: &str) -> Option<ClassAst> {
        self(name)
    }
}

/// A class path held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClassPath {
    classes: HashMap<String, ClassAst>,
}

impl InMemoryClassPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: ClassAst) -> &mut Self {
        self.classes.insert(class.name.to_string(), class);
        self
    }
}

impl FromIterator<ClassAst> for InMemoryClassPath {
    fn from_iter<T: IntoIterator<Item = ClassAst>>(iter: T) -> Self {
        let mut class_path = Self::new();
        for class in iter {
            class_path.insert(class);
        }
        class_path
    }
}

impl ClassProvider for InMemoryClassPath {
    fn find_class(&self, name: &str) -> Option<ClassAst> {
        self.classes.get(name).cloned()
    }
}

/// Defines each class at most once per name and links it against its
/// supertypes. Constant pool references stay symbolic until executed, so
/// only the superclass and interface chain is loaded eagerly.
pub struct ClassLoader {
    providers: Vec<Box<dyn ClassProvider>>,
    class_registry: DashMap<String, Arc<OnceCell<Arc<Class>>>>,
    // names whose definition is on the current resolution path
    loading: Mutex<Vec<String>>,
    eager_native_linking: bool,
}

impl ClassLoader {
    pub(crate) fn new(user: Box<dyn ClassProvider>, eager_native_linking: bool) -> Self {
        Self {
            providers: vec![Box::new(BootstrapProvider::new()), user],
            class_registry: DashMap::new(),
            loading: Mutex::new(vec![]),
            eager_native_linking,
        }
    }

    /// The class if it has already been defined.
    pub fn loaded_class(&self, name: &str) -> Option<Arc<Class>> {
        let cell = self.class_registry.get(name)?;
        cell.value().get().cloned()
    }

    pub(crate) fn resolve_class(
        &self,
        name: &str,
        natives: &NativeRegistry,
    ) -> NativeResult<Arc<Class>> {
        if let Some(class) = self.loaded_class(name) {
            return Ok(class);
        }
        {
            let mut loading = self.loading.lock();
            if loading.iter().any(|n| n == name) {
                return Err(Exception::new_vm_msg(CLASS_CIRCULARITY_ERROR, name).into());
            }
            loading.push(name.to_string());
        }
        let cell = Arc::clone(
            self.class_registry
                .entry(name.to_string())
                .or_default()
                .value(),
        );
        let result = cell
            .get_or_try_init(|| self.define_class(name, natives))
            .cloned();
        self.loading.lock().retain(|n| n != name);
        result
    }

    fn define_class(&self, name: &str, natives: &NativeRegistry) -> NativeResult<Arc<Class>> {
        if name.starts_with('[') {
            return self.define_array(name, natives);
        }
        let ast = self
            .providers
            .iter()
            .find_map(|p| p.find_class(name))
            .ok_or_else(|| Exception::new_vm_msg(NO_CLASS_DEF_FOUND_ERROR, name))?;
        if ast.name.as_ref() != name {
            return Err(Exception::new_vm_msg(
                NO_CLASS_DEF_FOUND_ERROR,
                format!("{name} (wrong name: {})", ast.name),
            )
            .into());
        }

        let super_class = match &ast.super_class {
            Some(super_name) => {
                let super_class = self.resolve_class(super_name, natives)?;
                if super_class.is_interface() {
                    return Err(Exception::new_vm_msg(
                        INCOMPATIBLE_CLASS_CHANGE_ERROR,
                        format!("class {name} has interface {super_name} as super class"),
                    )
                    .into());
                }
                Some(super_class)
            }
            None if name == OBJECT => None,
            None => {
                return Err(Exception::new_vm_msg(
                    CLASS_FORMAT_ERROR,
                    format!("{name} has no superclass"),
                )
                .into());
            }
        };
        let interfaces = ast
            .interfaces
            .iter()
            .map(|interface_name| {
                let interface = self.resolve_class(interface_name, natives)?;
                if !interface.is_interface() {
                    return Err(Exception::new_vm_msg(
                        INCOMPATIBLE_CLASS_CHANGE_ERROR,
                        format!(
                            "class {name} can not implement {interface_name}, \
                             because it is not an interface"
                        ),
                    )
                    .into());
                }
                Ok(interface)
            })
            .collect::<NativeResult<Vec<_>>>()?;

        let constant_pool = link_constant_pool(&ast)?;
        let (static_fields_info, instance_fields_info) = link_fields(&ast)?;
        let field_layout = FieldLayout::extend(
            super_class.as_ref().map(|c| &c.field_layout),
            name,
            &instance_fields_info,
        );
        let static_fields = static_fields_info
            .iter()
            .map(|f| RwLock::new(Value::default_for(&f.descriptor)))
            .collect();
        let methods = ast
            .methods
            .iter()
            .map(|m| link_method(&ast.name, m))
            .collect::<NativeResult<Vec<_>>>()?;

        let mut class = Class {
            constant_pool,
            access_flags: ast.access_flags,
            class_name: Arc::clone(&ast.name),
            super_class,
            interfaces,
            static_fields_info,
            instance_fields_info,
            field_layout,
            methods,
            static_fields,
            component_type: None,
            array_element_type: None,
            vtable: HashMap::new(),
            source_file: ast.source_file.clone(),
            init_state: Mutex::new(InitState::Uninitialized),
        };
        build_vtable(&mut class);

        if self.eager_native_linking {
            for method in class.methods.iter().filter(|m| m.is_native()) {
                if !natives.contains(name, &method.name, &method.descriptor_str) {
                    return Err(Exception::new_vm_msg(
                        UNSATISFIED_LINK_ERROR,
                        format!("'{}' {name}.{}", method.descriptor_str, method.name),
                    )
                    .into());
                }
            }
        }

        debug!(
            class = name,
            super_class = ?class.super_class.as_ref().map(|c| &c.class_name),
            methods = class.methods.len(),
            "defined class"
        );
        Ok(Arc::new(class))
    }

    fn define_array(&self, name: &str, natives: &NativeRegistry) -> NativeResult<Arc<Class>> {
        let Some(FieldType::Array(component)) = FieldType::from_class_name(name) else {
            return Err(Exception::new_vm_msg(NO_CLASS_DEF_FOUND_ERROR, name).into());
        };
        let array_element_type = match component.class_name() {
            Some(element_name) => Some(self.resolve_class(&element_name, natives)?),
            None => None,
        };
        let object = self.resolve_class(OBJECT, natives)?;
        let interfaces = vec![
            self.resolve_class(CLONEABLE, natives)?,
            self.resolve_class(SERIALIZABLE, natives)?,
        ];
        let vtable = object
            .vtable
            .iter()
            .map(|(key, entry)| (Arc::clone(key), rebase(entry, &object)))
            .collect();
        Ok(Arc::new(Class {
            constant_pool: vec![],
            access_flags: ClassAccessFlag::PUBLIC
                | ClassAccessFlag::FINAL
                | ClassAccessFlag::ABSTRACT,
            class_name: name.into(),
            super_class: Some(object),
            interfaces,
            static_fields_info: vec![],
            instance_fields_info: vec![],
            field_layout: FieldLayout::default(),
            methods: vec![],
            static_fields: vec![],
            component_type: Some(*component),
            array_element_type,
            vtable,
            source_file: None,
            init_state: Mutex::new(InitState::Done),
        }))
    }
}

fn class_format_error(message: String) -> Exception {
    Exception::new_vm_msg(CLASS_FORMAT_ERROR, message)
}

fn link_constant_pool(ast: &ClassAst) -> NativeResult<Vec<ConstantPoolInfo>> {
    ast.constant_pool
        .iter()
        .map(|info| {
            Ok(match info {
                class::ConstantPoolInfo::Empty => ConstantPoolInfo::Empty,
                class::ConstantPoolInfo::Utf8(s) => ConstantPoolInfo::Utf8(Arc::clone(s)),
                class::ConstantPoolInfo::Integer(i) => ConstantPoolInfo::Integer(*i),
                class::ConstantPoolInfo::Float(f) => ConstantPoolInfo::Float(*f),
                class::ConstantPoolInfo::Long(l) => ConstantPoolInfo::Long(*l),
                class::ConstantPoolInfo::Double(d) => ConstantPoolInfo::Double(*d),
                class::ConstantPoolInfo::Class(name) => {
                    ConstantPoolInfo::Class(CpClassInfo::new(Arc::clone(name)))
                }
                class::ConstantPoolInfo::String(s) => ConstantPoolInfo::String(Arc::clone(s)),
                class::ConstantPoolInfo::Fieldref(member) => {
                    if descriptor::field_type(&member.descriptor).is_none() {
                        return Err(class_format_error(format!(
                            "invalid field descriptor {}",
                            member.descriptor
                        ))
                        .into());
                    }
                    ConstantPoolInfo::Fieldref(CpFieldRef {
                        class: CpClassInfo::new(Arc::clone(&member.class)),
                        name: Arc::clone(&member.name),
                        descriptor_str: Arc::clone(&member.descriptor),
                        resolved: OnceCell::new(),
                    })
                }
                class::ConstantPoolInfo::Methodref(member) => {
                    ConstantPoolInfo::Methodref(link_method_ref(member)?)
                }
                class::ConstantPoolInfo::InterfaceMethodref(member) => {
                    ConstantPoolInfo::InterfaceMethodref(link_method_ref(member)?)
                }
                class::ConstantPoolInfo::NameAndType { .. } => ConstantPoolInfo::NameAndType,
                class::ConstantPoolInfo::MethodHandle { .. } => ConstantPoolInfo::MethodHandle,
                class::ConstantPoolInfo::MethodType(_) => ConstantPoolInfo::MethodType,
                class::ConstantPoolInfo::InvokeDynamic { name, .. } => {
                    ConstantPoolInfo::InvokeDynamic {
                        name: Arc::clone(name),
                    }
                }
            })
        })
        .collect()
}

fn link_method_ref(member: &class::MemberRef) -> NativeResult<CpMethodRef> {
    if descriptor::method_descriptor(&member.descriptor).is_none() {
        return Err(
            class_format_error(format!("invalid method descriptor {}", member.descriptor)).into(),
        );
    }
    Ok(CpMethodRef {
        class: CpClassInfo::new(Arc::clone(&member.class)),
        name: Arc::clone(&member.name),
        descriptor_str: Arc::clone(&member.descriptor),
        resolved: OnceCell::new(),
    })
}

fn link_fields(ast: &ClassAst) -> NativeResult<(Vec<FieldInfo>, Vec<FieldInfo>)> {
    let mut static_fields = vec![];
    let mut instance_fields = vec![];
    for field in &ast.fields {
        let descriptor = descriptor::field_type(&field.descriptor).ok_or_else(|| {
            class_format_error(format!(
                "invalid descriptor {} for field {}.{}",
                field.descriptor, ast.name, field.name
            ))
        })?;
        let is_static = field.access_flags.contains(FieldAccessFlag::STATIC);
        let target = if is_static {
            &mut static_fields
        } else {
            &mut instance_fields
        };
        target.push(FieldInfo {
            name: Arc::clone(&field.name),
            descriptor,
            descriptor_str: Arc::clone(&field.descriptor),
            index: target.len(),
            constant_value: field.constant_value.filter(|_| is_static),
        });
    }
    Ok((static_fields, instance_fields))
}

fn link_method(class_name: &str, method: &MethodAst) -> NativeResult<MethodInfo> {
    let qualified = format!("{class_name}.{}{}", method.name, method.descriptor);
    let descriptor = descriptor::method_descriptor(&method.descriptor)
        .ok_or_else(|| class_format_error(format!("invalid descriptor of {qualified}")))?;
    let has_body = !method.access_flags.intersects(
        crate::consts::MethodAccessFlag::NATIVE | crate::consts::MethodAccessFlag::ABSTRACT,
    );
    let code = match (&method.code, has_body) {
        (Some(code), true) => Some(Arc::new(link_code(&qualified, code)?)),
        (None, false) => None,
        (Some(_), false) => {
            return Err(
                class_format_error(format!("native or abstract {qualified} has code")).into(),
            );
        }
        (None, true) => {
            return Err(class_format_error(format!("{qualified} has no code")).into());
        }
    };
    Ok(MethodInfo {
        access_flags: method.access_flags,
        name: Arc::clone(&method.name),
        descriptor,
        descriptor_str: Arc::clone(&method.descriptor),
        code,
    })
}

/// Rewrites byte offsets into instruction indices.
fn link_code(method: &str, code: &CodeAst) -> Result<Code, VmError> {
    let offsets: Vec<u32> = code.instructions.iter().map(|(offset, _)| *offset).collect();
    if offsets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(VmError::Unsupported(format!(
            "instruction offsets of {method} are not ascending"
        )));
    }
    let index_of: HashMap<u32, usize> = offsets.iter().enumerate().map(|(i, o)| (*o, i)).collect();

    let instructions = code
        .instructions
        .iter()
        .map(|(_, instruction)| {
            let mut invalid = 0;
            instruction
                .map_targets(|target| {
                    let index = index_of.get(&target).map(|i| *i as u32);
                    if index.is_none() {
                        invalid = target;
                    }
                    index
                })
                .ok_or_else(|| VmError::InvalidBranchTarget {
                    method: method.to_string(),
                    target: invalid,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let malformed = |reason: String| VmError::MalformedExceptionTable {
        method: method.to_string(),
        reason,
    };
    let last_offset = offsets.last().copied();
    let exception_table = code
        .exception_table
        .iter()
        .map(|item| {
            let start = *index_of.get(&item.start_pc).ok_or_else(|| {
                malformed(format!("start {} is not an instruction", item.start_pc))
            })?;
            let end = match index_of.get(&item.end_pc) {
                Some(end) => *end,
                // the range may extend to the end of the code
                None if last_offset.is_some_and(|last| item.end_pc > last) => instructions.len(),
                None => return Err(malformed(format!("end {} is not an instruction", item.end_pc))),
            };
            if start >= end {
                return Err(malformed(format!(
                    "empty range [{}, {})",
                    item.start_pc, item.end_pc
                )));
            }
            let handler = *index_of.get(&item.handler_pc).ok_or_else(|| {
                malformed(format!("handler {} is not an instruction", item.handler_pc))
            })?;
            Ok(ExceptionHandler {
                start,
                end,
                handler,
                catch_type: (item.catch_type != 0).then_some(item.catch_type),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut line_numbers: Vec<(usize, u16)> = code
        .line_numbers
        .iter()
        .filter_map(|l| index_of.get(&l.start_pc).map(|i| (*i, l.line_number)))
        .collect();
    line_numbers.sort_unstable();

    Ok(Code {
        max_stack: code.max_stack as usize,
        max_locals: code.max_locals as usize,
        instructions,
        offsets,
        exception_table,
        line_numbers,
    })
}

fn rebase(entry: &VtableIndex, owner: &Arc<Class>) -> VtableIndex {
    match entry {
        VtableIndex::InThisClass(index) => VtableIndex::OtherClass {
            class: Arc::clone(owner),
            index: *index,
        },
        other => other.clone(),
    }
}

fn is_virtual(method: &MethodInfo) -> bool {
    !method.is_static()
        && !method.is_private()
        && method.name.as_ref() != "<init>"
        && method.name.as_ref() != "<clinit>"
}

/// Linearizes method resolution once: inherited entries first, overridden
/// by this class's own methods, then default methods of superinterfaces
/// fill the gaps or replace abstract entries.
fn build_vtable(class: &mut Class) {
    let mut vtable: HashMap<Arc<str>, VtableIndex> = HashMap::new();
    // interfaces do not inherit Object's methods
    if let Some(super_class) = class.super_class.as_ref().filter(|_| !class.is_interface()) {
        for (key, entry) in &super_class.vtable {
            vtable.insert(Arc::clone(key), rebase(entry, super_class));
        }
    }

    for (i, method) in class.methods.iter().enumerate() {
        if is_virtual(method) {
            let key = method_key(&method.name, &method.descriptor_str);
            vtable.insert(key.into(), VtableIndex::InThisClass(i));
        }
    }

    let methods = &class.methods;
    let is_abstract = |entry: &VtableIndex| match entry {
        VtableIndex::InThisClass(i) => methods[*i].is_abstract(),
        VtableIndex::OtherClass { class, index } => class.methods[*index].is_abstract(),
    };
    for interface in &class.interfaces {
        for (key, entry) in &interface.vtable {
            let candidate = rebase(entry, interface);
            match vtable.get(key) {
                Some(existing) if !(is_abstract(existing) && !is_abstract(&candidate)) => {}
                _ => {
                    vtable.insert(Arc::clone(key), candidate);
                }
            }
        }
    }
    class.vtable = vtable;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassBuilder, Instruction, ValueKind};
    use crate::consts::MethodAccessFlag;
    use crate::runtime::Fault;

    fn loader(classes: Vec<ClassAst>) -> (ClassLoader, NativeRegistry) {
        let class_path: InMemoryClassPath = classes.into_iter().collect();
        (
            ClassLoader::new(Box::new(class_path), true),
            NativeRegistry::with_builtins(),
        )
    }

    fn returning(value: i32) -> CodeAst {
        CodeAst::new(
            1,
            1,
            vec![Instruction::Iconst(value), Instruction::Return(Some(ValueKind::Int))],
        )
    }

    #[test]
    fn test_resolve_is_cached() {
        let (loader, natives) = loader(vec![ClassBuilder::new("A").build()]);
        let a1 = loader.resolve_class("A", &natives).unwrap();
        let a2 = loader.resolve_class("A", &natives).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(a1.super_class().unwrap().name(), OBJECT);
    }

    #[test]
    fn test_missing_class() {
        let (loader, natives) = loader(vec![]);
        let Err(Fault::Throw(exception)) = loader.resolve_class("Nope", &natives) else {
            panic!("expected NoClassDefFoundError");
        };
        assert_eq!(&*exception.class_name(), NO_CLASS_DEF_FOUND_ERROR);
    }

    #[test]
    fn test_hierarchy_cycle() {
        let mut a = ClassBuilder::new("A");
        a.extends("B");
        let mut b = ClassBuilder::new("B");
        b.extends("A");
        let (loader, natives) = loader(vec![a.build(), b.build()]);
        let Err(Fault::Throw(exception)) = loader.resolve_class("A", &natives) else {
            panic!("expected ClassCircularityError");
        };
        assert_eq!(&*exception.class_name(), CLASS_CIRCULARITY_ERROR);
        // the failed attempt leaves nothing half-defined behind
        assert!(loader.loaded_class("A").is_none());
        assert!(loader.loaded_class("B").is_none());
    }

    #[test]
    fn test_vtable_override_and_default_method() {
        let mut greeter = ClassBuilder::new_interface("Greeter");
        greeter
            .method(MethodAccessFlag::PUBLIC, "greet", "()I", returning(7))
            .abstract_method("name", "()I");
        let mut base = ClassBuilder::new("Base");
        base.implements("Greeter")
            .method(MethodAccessFlag::PUBLIC, "name", "()I", returning(1))
            .method(MethodAccessFlag::PUBLIC, "id", "()I", returning(1));
        let mut derived = ClassBuilder::new("Derived");
        derived
            .extends("Base")
            .method(MethodAccessFlag::PUBLIC, "id", "()I", returning(2));
        let (loader, natives) = loader(vec![greeter.build(), base.build(), derived.build()]);

        let derived = loader.resolve_class("Derived", &natives).unwrap();
        assert_eq!(derived.find_method("id", "()I").unwrap().class().name(), "Derived");
        assert_eq!(derived.find_method("name", "()I").unwrap().class().name(), "Base");
        assert_eq!(derived.find_method("greet", "()I").unwrap().class().name(), "Greeter");
        assert_eq!(
            derived.find_method("hashCode", "()I").unwrap().class().name(),
            OBJECT
        );
        assert!(derived.find_method("missing", "()V").is_none());
    }

    #[test]
    fn test_code_linking_translates_offsets() {
        let code = CodeAst::with_offsets(
            1,
            1,
            vec![
                (0, Instruction::Iconst(0)),
                (1, Instruction::If(crate::class::Condition::Eq, 7)),
                (4, Instruction::Iconst(1)),
                (5, Instruction::Return(Some(ValueKind::Int))),
                (7, Instruction::Iconst(2)),
                (8, Instruction::Return(Some(ValueKind::Int))),
            ],
        )
        .handler(1, 9, 7, 0);
        let linked = link_code("A.f()I", &code).unwrap();
        assert_eq!(
            linked.instructions[1],
            Instruction::If(crate::class::Condition::Eq, 4)
        );
        assert_eq!(linked.exception_table[0].start, 1);
        assert_eq!(linked.exception_table[0].end, 6);
        assert_eq!(linked.exception_table[0].handler, 4);
        assert!(linked.exception_table[0].catch_type.is_none());
    }

    #[test]
    fn test_bad_branch_target_is_fatal() {
        let code = CodeAst::with_offsets(0, 0, vec![(0, Instruction::Goto(3))]);
        assert_eq!(
            link_code("A.f()V", &code).unwrap_err(),
            VmError::InvalidBranchTarget {
                method: "A.f()V".to_string(),
                target: 3,
            }
        );
        let code = CodeAst::new(0, 0, vec![Instruction::Nop, Instruction::Return(None)])
            .handler(1, 1, 0, 0);
        assert!(matches!(
            link_code("A.f()V", &code),
            Err(VmError::MalformedExceptionTable { .. })
        ));
    }

    #[test]
    fn test_unregistered_native_fails_at_link() {
        let mut class = ClassBuilder::new("Host");
        class.native_method(MethodAccessFlag::STATIC, "poke", "()V");
        let (loader, natives) = loader(vec![class.build()]);
        let Err(Fault::Throw(exception)) = loader.resolve_class("Host", &natives) else {
            panic!("expected UnsatisfiedLinkError");
        };
        assert_eq!(&*exception.class_name(), UNSATISFIED_LINK_ERROR);
    }

    #[test]
    fn test_array_class() {
        let (loader, natives) = loader(vec![]);
        let array = loader.resolve_class("[[Ljava/lang/String;", &natives).unwrap();
        assert_eq!(array.super_class().unwrap().name(), OBJECT);
        assert_eq!(
            array.array_element_type.as_ref().unwrap().name(),
            "[Ljava/lang/String;"
        );
        assert_eq!(array.init_state(), InitState::Done);
    }
}
