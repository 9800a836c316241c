use super::ClassProvider;
use crate::class::ClassAst;
use crate::runtime::native::builtin_classes;
use std::collections::HashMap;

/// Serves the built-in classes. Consulted before the user class path, so
/// user code cannot replace `java/lang` classes.
pub(crate) struct BootstrapProvider {
    classes: HashMap<String, ClassAst>,
}

impl BootstrapProvider {
    pub(crate) fn new() -> Self {
        Self {
            classes: builtin_classes()
                .into_iter()
                .map(|class| (class.name.to_string(), class))
                .collect(),
        }
    }
}

impl ClassProvider for BootstrapProvider {
    fn find_class(&self, name: &str) -> Option<ClassAst> {
        self.classes.get(name).cloned()
    }
}
