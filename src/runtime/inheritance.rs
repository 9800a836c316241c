use crate::runtime::{
    Class,
    famous_classes::{CLONEABLE, OBJECT, SERIALIZABLE},
};
use std::sync::Arc;

/// Whether a value of class `source` may be stored where `target` is expected.
pub(crate) fn is_assignable_to(source: &Arc<Class>, target: &Arc<Class>) -> bool {
    if Arc::ptr_eq(source, target) || source.class_name == target.class_name {
        return true;
    }
    if let Some(source_type) = &source.component_type {
        // source is array
        if let Some(target_type) = &target.component_type {
            // target is array
            if source_type.is_primitive() || target_type.is_primitive() {
                return source_type == target_type;
            }
            return match (&source.array_element_type, &target.array_element_type) {
                (Some(source_element), Some(target_element)) => {
                    is_assignable_to(source_element, target_element)
                }
                _ => false,
            };
        }
        // target is not array
        if target.is_interface() {
            target.class_name.as_ref() == CLONEABLE || target.class_name.as_ref() == SERIALIZABLE
        } else {
            target.class_name.as_ref() == OBJECT
        }
    } else if target.is_interface() {
        is_class_implements(source, target)
    } else {
        is_same_or_sub_class_of(source, target)
    }
}

/// Walks superclasses and superinterfaces transitively.
pub(crate) fn is_class_implements(class: &Arc<Class>, interface: &Arc<Class>) -> bool {
    if class.interfaces.iter().any(|i| {
        i.class_name == interface.class_name || is_class_implements(i, interface)
    }) {
        return true;
    }
    match &class.super_class {
        Some(super_class) => is_class_implements(super_class, interface),
        None => false,
    }
}

pub(crate) fn is_same_or_sub_class_of(source: &Arc<Class>, target: &Arc<Class>) -> bool {
    let mut current = Some(source);
    while let Some(class) = current {
        if class.class_name == target.class_name {
            return true;
        }
        current = class.super_class.as_ref();
    }
    false
}

pub(crate) fn is_subclass_named(class: &Arc<Class>, name: &str) -> bool {
    let mut current = Some(class);
    while let Some(c) = current {
        if c.class_name.as_ref() == name {
            return true;
        }
        current = c.super_class.as_ref();
    }
    false
}
