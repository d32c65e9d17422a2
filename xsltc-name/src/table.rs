use ahash::{HashMap, HashMapExt};

use crate::QName;

/// Interned identity of a [`QName`]. Two ids are equal exactly when the
/// names they were interned from are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QNameId(u32);

impl QNameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Append-only table of interned qualified names. Ids are handed out in
/// interning order and never change.
#[derive(Debug, Clone, Default)]
pub struct QNameTable {
    names: Vec<QName>,
    ids: HashMap<QName, QNameId>,
}

impl QNameTable {
    pub fn new() -> Self {
        QNameTable {
            names: Vec::new(),
            ids: HashMap::new(),
        }
    }

    pub fn intern(&mut self, name: &QName) -> QNameId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = QNameId(self.names.len() as u32);
        self.names.push(name.clone());
        self.ids.insert(name.clone(), id);
        id
    }

    pub fn get(&self, name: &QName) -> Option<QNameId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: QNameId) -> &QName {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = QNameTable::new();
        let a = table.intern(&QName::unprefixed("a"));
        let b = table.intern(&QName::uri_qualified("urn:x", "a"));
        let a2 = table.intern(&QName::unprefixed("a"));
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.name(b).namespace(), Some("urn:x"));
    }

    #[test]
    fn test_prefix_does_not_split_identity() {
        let mut table = QNameTable::new();
        let a = table.intern(&QName::new(
            "a".to_string(),
            Some("urn:x".to_string()),
            Some("p".to_string()),
        ));
        let b = table.get(&QName::uri_qualified("urn:x", "a"));
        assert_eq!(Some(a), b);
    }
}
