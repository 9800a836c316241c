use crate::runtime::ObjectRef;
use dashmap::DashMap;
use std::sync::Arc;

/// Host payload of a `java/lang/String` instance.
#[derive(Debug, Clone)]
pub struct JavaString(pub Arc<str>);

pub(super) struct StringTable {
    map: DashMap<Arc<str>, ObjectRef>,
}

impl StringTable {
    pub(super) fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    pub(super) fn get_or_insert_with(
        &self,
        value: &str,
        create: impl FnOnce() -> ObjectRef,
    ) -> ObjectRef {
        if let Some(existing) = self.map.get(value) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.map.entry(value.into()).or_insert_with(create).value())
    }
}
