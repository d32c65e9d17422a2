use ahash::{HashMap, HashMapExt};
use xsltc_bytecode::dom::NTYPES;
use xsltc_bytecode::{NameEntry, NameKind};
use xsltc_name::{QName, QNameId, QNameTable};

use crate::error::{Diagnostics, ErrorCode};
use crate::syntax::VariableId;

/// Registries shared by every phase of one compilation: interned names,
/// expanded type ids, namespace ids and helper unit serials.
#[derive(Debug)]
pub struct CompilationContext {
    pub(crate) names: QNameTable,
    name_entries: Vec<NameEntry>,
    name_ids: HashMap<NameEntry, i32>,
    namespaces: Vec<String>,
    namespace_ids: HashMap<String, i32>,
    helper_serial: usize,
    variable_serial: usize,
    translet_name: String,
    pub(crate) diagnostics: Diagnostics,
}

impl CompilationContext {
    pub fn new(translet_name: &str) -> Self {
        CompilationContext {
            names: QNameTable::new(),
            name_entries: Vec::new(),
            name_ids: HashMap::new(),
            namespaces: Vec::new(),
            namespace_ids: HashMap::new(),
            helper_serial: 0,
            variable_serial: 0,
            translet_name: translet_name.to_string(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn translet_name(&self) -> &str {
        &self.translet_name
    }

    pub fn intern(&mut self, name: &QName) -> QNameId {
        self.names.intern(name)
    }

    fn register_name(&mut self, entry: NameEntry) -> i32 {
        if let Some(id) = self.name_ids.get(&entry) {
            return *id;
        }
        if let Some(namespace) = &entry.namespace {
            self.register_namespace(namespace);
        }
        let id = NTYPES + self.name_entries.len() as i32;
        log::trace!("registered type {} for {:?}", id, entry);
        self.name_ids.insert(entry.clone(), id);
        self.name_entries.push(entry);
        id
    }

    /// Expanded type id of an element name.
    pub fn register_element(&mut self, name: &QName) -> i32 {
        self.intern(name);
        self.register_name(NameEntry {
            kind: NameKind::Element,
            namespace: name.namespace().map(str::to_string),
            local: name.local_name().to_string(),
        })
    }

    pub fn register_attribute(&mut self, name: &QName) -> i32 {
        self.intern(name);
        self.register_name(NameEntry {
            kind: NameKind::Attribute,
            namespace: name.namespace().map(str::to_string),
            local: name.local_name().to_string(),
        })
    }

    /// Type id for `ns:*` (or `@ns:*` when `attribute` is set).
    pub fn register_namespace_wildcard(&mut self, uri: &str, attribute: bool) -> i32 {
        self.register_name(NameEntry {
            kind: if attribute {
                NameKind::AttributeNamespaceWildcard
            } else {
                NameKind::NamespaceWildcard
            },
            namespace: Some(uri.to_string()),
            local: "*".to_string(),
        })
    }

    pub fn register_namespace(&mut self, uri: &str) -> i32 {
        if let Some(id) = self.namespace_ids.get(uri) {
            return *id;
        }
        self.namespaces.push(uri.to_string());
        let id = self.namespaces.len() as i32;
        self.namespace_ids.insert(uri.to_string(), id);
        id
    }

    pub fn name_entries(&self) -> &[NameEntry] {
        &self.name_entries
    }

    pub fn name_entry(&self, type_id: i32) -> Option<&NameEntry> {
        usize::try_from(type_id - NTYPES)
            .ok()
            .and_then(|index| self.name_entries.get(index))
    }

    /// Number of type ids in use: the fixed kinds plus registered names.
    pub fn type_count(&self) -> i32 {
        NTYPES + self.name_entries.len() as i32
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn namespace_id(&self, uri: &str) -> Option<i32> {
        self.namespace_ids.get(uri).copied()
    }

    /// A fresh name for a helper unit, `<translet>$<serial>`.
    pub fn next_helper_name(&mut self) -> String {
        self.helper_serial += 1;
        format!("{}${}", self.translet_name, self.helper_serial)
    }

    pub(crate) fn next_variable_id(&mut self) -> VariableId {
        self.variable_serial += 1;
        VariableId(self.variable_serial)
    }

    pub fn report(&mut self, code: ErrorCode, detail: impl Into<String>, line: Option<u32>) {
        self.diagnostics.report(code, detail, line)
    }

    pub fn abort(
        &mut self,
        code: ErrorCode,
        detail: impl Into<String>,
        line: Option<u32>,
    ) -> crate::error::Abort {
        self.diagnostics.abort(code, detail, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ids_start_after_fixed_kinds() {
        let mut context = CompilationContext::new("T");
        let a = context.register_element(&QName::unprefixed("a"));
        let at_a = context.register_attribute(&QName::unprefixed("a"));
        assert_eq!(a, NTYPES);
        assert_eq!(at_a, NTYPES + 1);
        assert_eq!(context.register_element(&QName::unprefixed("a")), a);
        assert_eq!(context.type_count(), NTYPES + 2);
    }

    #[test]
    fn test_namespace_ids_start_at_one() {
        let mut context = CompilationContext::new("T");
        let wildcard = context.register_namespace_wildcard("urn:x", false);
        assert_eq!(context.namespace_id("urn:x"), Some(1));
        assert_eq!(
            context.name_entry(wildcard).map(|entry| entry.kind),
            Some(NameKind::NamespaceWildcard)
        );
        assert_eq!(context.register_namespace("urn:y"), 2);
    }

    #[test]
    fn test_helper_names() {
        let mut context = CompilationContext::new("GregorSamsa");
        assert_eq!(context.next_helper_name(), "GregorSamsa$1");
        assert_eq!(context.next_helper_name(), "GregorSamsa$2");
    }
}
