use ahash::{HashMap, HashMapExt};
use xot::Node;

use crate::dom::Dom;

/// The indexes `xsl:key` declarations build, by key name and value.
#[derive(Debug, Default)]
pub struct KeyIndex {
    keys: HashMap<String, HashMap<String, Vec<Node>>>,
}

impl KeyIndex {
    pub fn new() -> Self {
        KeyIndex {
            keys: HashMap::new(),
        }
    }

    pub fn add(&mut self, name: &str, value: String, node: Node) {
        let nodes = self
            .keys
            .entry(name.to_string())
            .or_default()
            .entry(value)
            .or_default();
        if nodes.last() != Some(&node) {
            nodes.push(node);
        }
    }

    /// Nodes with any of `values` under key `name`, in document order.
    pub fn lookup<'a>(&self, dom: &Dom, name: &str, values: impl IntoIterator<Item = &'a str>) -> Vec<Node> {
        let Some(index) = self.keys.get(name) else {
            return Vec::new();
        };
        let mut nodes = values
            .into_iter()
            .filter_map(|value| index.get(value))
            .flatten()
            .copied()
            .collect::<Vec<_>>();
        dom.sort(&mut nodes);
        nodes
    }

    pub fn contains<'a>(&self, name: &str, values: impl IntoIterator<Item = &'a str>, node: Node) -> bool {
        let Some(index) = self.keys.get(name) else {
            return false;
        };
        values
            .into_iter()
            .filter_map(|value| index.get(value))
            .any(|nodes| nodes.contains(&node))
    }
}

#[cfg(test)]
mod tests {
    use xsltc_bytecode::Axis;

    use super::*;

    #[test]
    fn test_lookup_is_in_document_order() {
        let dom = Dom::parse("<a><b/><c/></a>").unwrap();
        let a = dom.axis(Axis::Child, dom.root())[0];
        let children = dom.axis(Axis::Child, a);
        let mut index = KeyIndex::new();
        index.add("k", "2".to_string(), children[1]);
        index.add("k", "1".to_string(), children[0]);
        index.add("k", "1".to_string(), children[0]);
        assert_eq!(index.lookup(&dom, "k", ["2", "1"]), children);
        assert!(index.contains("k", ["1"], children[0]));
        assert!(!index.contains("k", ["1"], children[1]));
        assert!(index.lookup(&dom, "other", ["1"]).is_empty());
    }
}
