use crate::runtime::{Class, ObjectRef};
use dashmap::DashMap;
use std::sync::Arc;

/// Host payload of a `java/lang/Class` instance.
#[derive(Debug, Clone)]
pub struct ClassMirror(pub Arc<Class>);

pub(super) struct ClassTable {
    map: DashMap<Arc<str>, ObjectRef>,
}

impl ClassTable {
    pub(super) fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    pub(super) fn get_or_insert_with(
        &self,
        class: &Arc<Class>,
        create: impl FnOnce() -> ObjectRef,
    ) -> ObjectRef {
        if let Some(existing) = self.map.get(class.name()) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.map
                .entry(Arc::clone(&class.class_name))
                .or_insert_with(create)
                .value(),
        )
    }
}
