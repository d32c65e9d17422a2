//! The source tree a translet runs against.
//!
//! A [`Dom`] owns a parsed `xot` document and annotates every node with
//! its position in document order, attributes directly after their
//! element and before its children. A [`TypeTable`] maps the names in
//! the document to the type and namespace ids a translet was compiled
//! with.

use std::cmp::Ordering;

use ahash::{HashMap, HashMapExt};
use xot::{Node, Xot};
use xsltc_bytecode::dom::{
    ATTRIBUTE_NODE, COMMENT_NODE, DOCUMENT_NODE, ELEMENT_NODE, NAMESPACE_NODE, NO_NAMESPACE,
    NTYPES, PROCESSING_INSTRUCTION_NODE, TEXT_NODE,
};
use xsltc_bytecode::{Axis, NameKind, StepSpec, StepTest, Translet};
use xsltc_name::XML_NAMESPACE;

use crate::error::{Error, Result};

pub struct Dom {
    xot: Xot,
    root: Node,
    order: HashMap<Node, usize>,
    /// Elements by the value of their `id` or `xml:id` attribute.
    ids: HashMap<String, Node>,
}

impl Dom {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut xot = Xot::new();
        let root = xot.parse(xml).map_err(|e| Error::Parse(e.to_string()))?;
        Ok(Self::new(xot, root))
    }

    /// Wrap an already parsed document.
    pub fn new(xot: Xot, root: Node) -> Self {
        let mut dom = Dom {
            xot,
            root,
            order: HashMap::new(),
            ids: HashMap::new(),
        };
        dom.annotate();
        dom
    }

    fn annotate(&mut self) {
        let xot = &self.xot;
        let mut order = HashMap::new();
        let mut ids = HashMap::new();
        for node in xot.axis(xot::Axis::DescendantOrSelf, self.root) {
            order.insert(node, order.len());
            if !xot.is_element(node) {
                continue;
            }
            for attribute in xot.axis(xot::Axis::Attribute, node) {
                order.insert(attribute, order.len());
                if let xot::Value::Attribute(value) = xot.value(attribute) {
                    let (local, namespace) = xot.name_ns_str(value.name());
                    let is_id = local == "id" && (namespace.is_empty() || namespace == XML_NAMESPACE);
                    if is_id {
                        ids.entry(value.value().to_string()).or_insert(node);
                    }
                }
            }
        }
        self.order = order;
        self.ids = ids;
    }

    pub fn xot(&self) -> &Xot {
        &self.xot
    }

    pub fn root(&self) -> Node {
        self.root
    }

    /// All nodes, attributes included, in document order.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes = self.order.keys().copied().collect::<Vec<_>>();
        self.sort(&mut nodes);
        nodes
    }

    pub fn order(&self, node: Node) -> usize {
        self.order.get(&node).copied().unwrap_or(usize::MAX)
    }

    pub fn compare(&self, a: Node, b: Node) -> Ordering {
        self.order(a).cmp(&self.order(b))
    }

    /// Sort into document order and drop duplicates.
    pub fn sort(&self, nodes: &mut Vec<Node>) {
        nodes.sort_by_key(|node| self.order(*node));
        nodes.dedup();
    }

    pub fn kind(&self, node: Node) -> i32 {
        match self.xot.value(node) {
            xot::Value::Document => DOCUMENT_NODE,
            xot::Value::Element(_) => ELEMENT_NODE,
            xot::Value::Attribute(_) => ATTRIBUTE_NODE,
            xot::Value::Text(_) => TEXT_NODE,
            xot::Value::Comment(_) => COMMENT_NODE,
            xot::Value::ProcessingInstruction(_) => PROCESSING_INSTRUCTION_NODE,
            xot::Value::Namespace(_) => NAMESPACE_NODE,
        }
    }

    /// The parent; the element for an attribute.
    pub fn parent(&self, node: Node) -> Option<Node> {
        self.xot.parent(node)
    }

    pub fn string_value(&self, node: Node) -> String {
        match self.xot.value(node) {
            xot::Value::Document | xot::Value::Element(_) => self
                .xot
                .descendants(node)
                .filter_map(|n| self.xot.text_str(n))
                .collect(),
            xot::Value::Attribute(attribute) => attribute.value().to_string(),
            xot::Value::Text(text) => text.get().to_string(),
            xot::Value::Comment(comment) => comment.get().to_string(),
            xot::Value::ProcessingInstruction(pi) => pi.data().unwrap_or("").to_string(),
            xot::Value::Namespace(namespace) => {
                self.xot.namespace_str(namespace.namespace()).to_string()
            }
        }
    }

    /// Local name and namespace URI ("" for none) of an element,
    /// attribute or processing instruction.
    pub fn name_parts(&self, node: Node) -> Option<(&str, &str)> {
        let name = self.xot.node_name(node)?;
        Some(self.xot.name_ns_str(name))
    }

    pub fn local_name(&self, node: Node) -> &str {
        self.name_parts(node).map(|(local, _)| local).unwrap_or("")
    }

    pub fn namespace_uri(&self, node: Node) -> &str {
        self.name_parts(node)
            .map(|(_, namespace)| namespace)
            .unwrap_or("")
    }

    /// The name as written in the document, with its prefix.
    pub fn qualified_name(&self, node: Node) -> String {
        let Some(name) = self.xot.node_name(node) else {
            return String::new();
        };
        let local = self.xot.local_name_str(name);
        let namespace = self.xot.namespace_for_name(name);
        if namespace == self.xot.no_namespace() {
            return local.to_string();
        }
        let context = if self.xot.is_attribute_node(node) {
            self.parent(node).unwrap_or(node)
        } else {
            node
        };
        match self.xot.prefix_for_namespace(context, namespace) {
            Some(prefix) if !self.xot.prefix_str(prefix).is_empty() => {
                format!("{}:{}", self.xot.prefix_str(prefix), local)
            }
            _ => local.to_string(),
        }
    }

    pub fn generate_id(&self, node: Node) -> String {
        // alphanumeric, starting with a letter
        format!("id{}", self.order(node))
    }

    pub fn element_by_id(&self, id: &str) -> Option<Node> {
        self.ids.get(id).copied()
    }

    /// Whether an element carries an ID attribute with one of `values`.
    pub fn has_id(&self, node: Node, values: &[&str]) -> bool {
        values
            .iter()
            .any(|value| self.element_by_id(value) == Some(node))
    }

    /// The `xml:lang` in scope for a node.
    pub fn language(&self, node: Node) -> Option<&str> {
        let element = if self.xot.is_element(node) {
            Some(node)
        } else {
            self.parent(node)
        };
        let mut current = element;
        while let Some(node) = current {
            for attribute in self.xot.axis(xot::Axis::Attribute, node) {
                if let xot::Value::Attribute(value) = self.xot.value(attribute) {
                    if self.xot.name_ns_str(value.name()) == ("lang", XML_NAMESPACE) {
                        return Some(value.value());
                    }
                }
            }
            current = self.parent(node);
        }
        None
    }

    /// Nodes along an axis, in axis order.
    pub fn axis(&self, axis: Axis, node: Node) -> Vec<Node> {
        let axis = match axis {
            Axis::Ancestor => xot::Axis::Ancestor,
            Axis::AncestorOrSelf => xot::Axis::AncestorOrSelf,
            Axis::Attribute => xot::Axis::Attribute,
            Axis::Child => xot::Axis::Child,
            Axis::Descendant => xot::Axis::Descendant,
            Axis::DescendantOrSelf => xot::Axis::DescendantOrSelf,
            Axis::Following => xot::Axis::Following,
            Axis::FollowingSibling => xot::Axis::FollowingSibling,
            Axis::Parent => xot::Axis::Parent,
            Axis::Preceding => xot::Axis::Preceding,
            Axis::PrecedingSibling => xot::Axis::PrecedingSibling,
            Axis::Self_ => xot::Axis::Self_,
            // namespace nodes are never selected
            Axis::Namespace => return Vec::new(),
        };
        self.xot.axis(axis, node).collect()
    }

    /// Nodes along the axis of `step` that pass its node test, in axis
    /// order.
    pub fn step(&self, step: &StepSpec, node: Node) -> Vec<Node> {
        let principal = if step.axis == Axis::Attribute {
            ATTRIBUTE_NODE
        } else {
            ELEMENT_NODE
        };
        self.axis(step.axis, node)
            .into_iter()
            .filter(|node| self.node_test(&step.test, principal, *node))
            .collect()
    }

    fn node_test(&self, test: &StepTest, principal: i32, node: Node) -> bool {
        let kind = self.kind(node);
        match test {
            StepTest::Node => true,
            StepTest::Principal => kind == principal,
            StepTest::Text => kind == TEXT_NODE,
            StepTest::Comment => kind == COMMENT_NODE,
            StepTest::ProcessingInstruction(target) => {
                kind == PROCESSING_INSTRUCTION_NODE
                    && target
                        .as_deref()
                        .map_or(true, |target| self.local_name(node) == target)
            }
            StepTest::Name { namespace, local } => {
                kind == principal
                    && self.name_parts(node)
                        == Some((local.as_str(), namespace.as_deref().unwrap_or("")))
            }
            StepTest::NamespaceWildcard(uri) => {
                kind == principal && self.namespace_uri(node) == uri
            }
        }
    }
}

/// The type and namespace ids of a translet, resolved against the names
/// of one document.
#[derive(Debug, Default)]
pub struct TypeTable {
    types: HashMap<Node, i32>,
    namespaces: HashMap<Node, i32>,
}

impl TypeTable {
    pub fn new(dom: &Dom, translet: &Translet) -> Self {
        let mut names = HashMap::new();
        for (index, entry) in translet.names.iter().enumerate() {
            let attribute = match entry.kind {
                NameKind::Element => false,
                NameKind::Attribute => true,
                NameKind::NamespaceWildcard | NameKind::AttributeNamespaceWildcard => continue,
            };
            let namespace = entry.namespace.as_deref().unwrap_or("");
            names.insert(
                (attribute, namespace, entry.local.as_str()),
                NTYPES + index as i32,
            );
        }
        let namespace_ids = translet
            .namespaces
            .iter()
            .enumerate()
            .map(|(index, uri)| (uri.as_str(), index as i32 + 1))
            .collect::<HashMap<_, _>>();

        let mut table = TypeTable::default();
        for node in dom.nodes() {
            let kind = dom.kind(node);
            if kind != ELEMENT_NODE && kind != ATTRIBUTE_NODE {
                continue;
            }
            let Some((local, namespace)) = dom.name_parts(node) else {
                continue;
            };
            if let Some(type_id) = names.get(&(kind == ATTRIBUTE_NODE, namespace, local)) {
                table.types.insert(node, *type_id);
            }
            if let Some(namespace_id) = namespace_ids.get(namespace) {
                table.namespaces.insert(node, *namespace_id);
            }
        }
        table
    }

    /// The expanded type id of a node: its registered name's id, or its
    /// kind.
    pub fn type_of(&self, dom: &Dom, node: Node) -> i32 {
        self.types
            .get(&node)
            .copied()
            .unwrap_or_else(|| dom.kind(node))
    }

    pub fn namespace_of(&self, node: Node) -> i32 {
        self.namespaces.get(&node).copied().unwrap_or(NO_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use xsltc_bytecode::{NameEntry, OutputProperties};

    use super::*;

    fn first_element(dom: &Dom) -> Node {
        dom.axis(Axis::Child, dom.root())[0]
    }

    #[test]
    fn test_attributes_come_between_element_and_children() {
        let dom = Dom::parse(r#"<a x="1"><b/></a>"#).unwrap();
        let a = first_element(&dom);
        let x = dom.axis(Axis::Attribute, a)[0];
        let b = dom.axis(Axis::Child, a)[0];
        assert!(dom.order(a) < dom.order(x));
        assert!(dom.order(x) < dom.order(b));
        assert_eq!(dom.parent(x), Some(a));
    }

    #[test]
    fn test_string_value_concatenates_text() {
        let dom = Dom::parse(r#"<a>one<b>two</b><!--no-->three</a>"#).unwrap();
        assert_eq!(dom.string_value(dom.root()), "onetwothree");
    }

    #[test]
    fn test_step_name_test_uses_principal_kind() {
        let dom = Dom::parse(r#"<a b="1"><b/><c/><b/></a>"#).unwrap();
        let a = first_element(&dom);
        let step = StepSpec {
            axis: Axis::Child,
            test: StepTest::Name {
                namespace: None,
                local: "b".to_string(),
            },
        };
        assert_eq!(dom.step(&step, a).len(), 2);
        let step = StepSpec {
            axis: Axis::Attribute,
            test: StepTest::Principal,
        };
        assert_eq!(dom.step(&step, a).len(), 1);
    }

    #[test]
    fn test_qualified_name_keeps_prefix() {
        let dom = Dom::parse(r#"<p:a xmlns:p="urn:p" p:x="1"/>"#).unwrap();
        let a = first_element(&dom);
        let x = dom.axis(Axis::Attribute, a)[0];
        assert_eq!(dom.qualified_name(a), "p:a");
        assert_eq!(dom.qualified_name(x), "p:x");
        assert_eq!(dom.local_name(a), "a");
        assert_eq!(dom.namespace_uri(a), "urn:p");
    }

    #[test]
    fn test_ids_and_language() {
        let dom = Dom::parse(r#"<a xml:lang="en"><b id="one"/><c xml:id="two"/></a>"#).unwrap();
        let a = first_element(&dom);
        let b = dom.axis(Axis::Child, a)[0];
        assert_eq!(dom.element_by_id("one"), Some(b));
        assert!(dom.element_by_id("two").is_some());
        assert!(dom.has_id(b, &["zero", "one"]));
        assert_eq!(dom.language(b), Some("en"));
    }

    #[test]
    fn test_type_table_maps_registered_names() {
        let dom = Dom::parse(r#"<a xmlns:p="urn:p"><p:b/><c/></a>"#).unwrap();
        let translet = Translet {
            classes: Vec::new(),
            names: vec![NameEntry {
                kind: NameKind::Element,
                namespace: Some("urn:p".to_string()),
                local: "b".to_string(),
            }],
            namespaces: vec!["urn:p".to_string()],
            output: OutputProperties::default(),
        };
        let types = TypeTable::new(&dom, &translet);
        let a = first_element(&dom);
        let children = dom.axis(Axis::Child, a);
        assert_eq!(types.type_of(&dom, children[0]), NTYPES);
        assert_eq!(types.namespace_of(children[0]), 1);
        assert_eq!(types.type_of(&dom, children[1]), ELEMENT_NODE);
        assert_eq!(types.type_of(&dom, dom.root()), DOCUMENT_NODE);
    }
}
