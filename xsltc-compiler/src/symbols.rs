use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use xsltc_name::QName;

use crate::functions::FunctionTable;
use crate::syntax::VariableId;
use crate::types::Type;

/// Name of the dispatch method of a mode.
pub(crate) fn mode_method_name(mode: Option<&QName>) -> String {
    match mode {
        None => "applyTemplates".to_string(),
        Some(mode) => format!("applyTemplates:{}", mode),
    }
}

/// Name of the dispatch method restricted to templates with a precedence
/// in `[min, max)`.
pub(crate) fn import_method_name(mode: Option<&QName>, min: u32, max: u32) -> String {
    format!("{}_{}_{}", mode_method_name(mode), max, min)
}

pub(crate) fn template_method_name(name: &QName) -> String {
    format!("template:{}", name)
}

#[derive(Debug, Clone)]
pub(crate) struct LocalBinding {
    pub(crate) name: QName,
    pub(crate) id: VariableId,
    pub(crate) ty: Type,
}

#[derive(Debug, Clone)]
pub(crate) struct GlobalBinding {
    /// Field of the main unit holding the value.
    pub(crate) field: u16,
    pub(crate) ty: Type,
}

/// A template that can be called by name.
#[derive(Debug, Clone)]
pub(crate) struct NamedTemplate {
    /// Index into the stylesheet's templates.
    pub(crate) template: usize,
    pub(crate) method: String,
    /// Declared parameters in order. They are passed as method arguments
    /// when `direct` is set, and through the parameter frame otherwise.
    pub(crate) params: Vec<QName>,
    pub(crate) direct: bool,
}

/// Everything names resolve to: top-level declarations, the function
/// library and the stack of local bindings in scope.
#[derive(Debug)]
pub(crate) struct SymbolTable {
    pub(crate) functions: FunctionTable,
    globals: HashMap<QName, GlobalBinding>,
    keys: HashSet<QName>,
    named_templates: HashMap<QName, NamedTemplate>,
    scope: Vec<LocalBinding>,
}

impl SymbolTable {
    pub(crate) fn new() -> Self {
        SymbolTable {
            functions: FunctionTable::new(),
            globals: HashMap::new(),
            keys: HashSet::new(),
            named_templates: HashMap::new(),
            scope: Vec::new(),
        }
    }

    pub(crate) fn add_global(&mut self, name: QName, field: u16) {
        self.globals.insert(
            name,
            GlobalBinding {
                field,
                ty: Type::Reference,
            },
        );
    }

    pub(crate) fn set_global_type(&mut self, name: &QName, ty: Type) {
        if let Some(global) = self.globals.get_mut(name) {
            global.ty = ty;
        }
    }

    pub(crate) fn global(&self, name: &QName) -> Option<&GlobalBinding> {
        self.globals.get(name)
    }

    pub(crate) fn add_key(&mut self, name: QName) {
        self.keys.insert(name);
    }

    pub(crate) fn has_key(&self, name: &QName) -> bool {
        self.keys.contains(name)
    }

    pub(crate) fn add_named_template(&mut self, name: QName, template: NamedTemplate) {
        self.named_templates.insert(name, template);
    }

    pub(crate) fn named_template(&self, name: &QName) -> Option<&NamedTemplate> {
        self.named_templates.get(name)
    }

    pub(crate) fn named_templates(&self) -> impl Iterator<Item = (&QName, &NamedTemplate)> {
        self.named_templates.iter()
    }

    /// Mark the current depth of the local scope.
    pub(crate) fn enter_scope(&self) -> usize {
        self.scope.len()
    }

    /// Drop every binding made since `mark`.
    pub(crate) fn leave_scope(&mut self, mark: usize) {
        self.scope.truncate(mark);
    }

    /// Bind a local, returning the binding it shadows, if any.
    pub(crate) fn declare_local(&mut self, binding: LocalBinding) -> Option<LocalBinding> {
        let shadowed = self.lookup_local(&binding.name).cloned();
        self.scope.push(binding);
        shadowed
    }

    pub(crate) fn lookup_local(&self, name: &QName) -> Option<&LocalBinding> {
        self.scope.iter().rev().find(|binding| &binding.name == name)
    }

    /// Whether `name` is bound since `mark`.
    pub(crate) fn bound_since(&self, mark: usize, name: &QName) -> bool {
        self.scope[mark.min(self.scope.len())..]
            .iter()
            .any(|binding| &binding.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(name: &str, id: usize) -> LocalBinding {
        LocalBinding {
            name: QName::unprefixed(name),
            id: VariableId(id),
            ty: Type::String,
        }
    }

    #[test]
    fn test_inner_binding_shadows_outer() {
        let mut symbols = SymbolTable::new();
        assert!(symbols.declare_local(binding("x", 1)).is_none());
        let mark = symbols.enter_scope();
        let shadowed = symbols.declare_local(binding("x", 2));
        assert_eq!(shadowed.map(|b| b.id), Some(VariableId(1)));
        assert_eq!(
            symbols.lookup_local(&QName::unprefixed("x")).map(|b| b.id),
            Some(VariableId(2))
        );
        assert!(symbols.bound_since(mark, &QName::unprefixed("x")));
        symbols.leave_scope(mark);
        assert_eq!(
            symbols.lookup_local(&QName::unprefixed("x")).map(|b| b.id),
            Some(VariableId(1))
        );
    }

    #[test]
    fn test_method_names() {
        let mode = QName::uri_qualified("urn:m", "m");
        assert_eq!(mode_method_name(None), "applyTemplates");
        assert_eq!(mode_method_name(Some(&mode)), "applyTemplates:Q{urn:m}m");
        assert_eq!(import_method_name(None, 1, 3), "applyTemplates_3_1");
        assert_eq!(
            template_method_name(&QName::unprefixed("t")),
            "template:t"
        );
    }
}
