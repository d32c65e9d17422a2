use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use xot::Node;

use crate::dom::Dom;
use crate::error::{Error, Result};
use crate::output::{self, OutputEvent};

/// An instance of a generated unit: the translet or a helper.
#[derive(Debug, Clone)]
pub struct Object {
    pub class: usize,
    pub fields: Vec<Value>,
}

/// A cursor over a node list, as `IterNext` advances it.
#[derive(Debug, Clone)]
pub struct NodeIterator {
    nodes: Rc<Vec<Node>>,
    index: usize,
}

impl NodeIterator {
    pub fn new(nodes: Rc<Vec<Node>>) -> Self {
        NodeIterator { nodes, index: 0 }
    }

    pub fn next_node(&mut self) -> Option<Node> {
        let node = self.nodes.get(self.index).copied()?;
        self.index += 1;
        Some(node)
    }

    /// One-based position of the node last returned.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn last(&self) -> usize {
        self.nodes.len()
    }
}

/// A value on the operand stack or in a local slot.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Node(Node),
    NodeSet(Rc<Vec<Node>>),
    /// A result tree fragment, as the events that built it.
    ResultTree(Rc<Vec<OutputEvent>>),
    Iterator(Rc<RefCell<NodeIterator>>),
    Builder(Rc<RefCell<Vec<Node>>>),
    Object(Rc<RefCell<Object>>),
    /// An object handed out by foreign code.
    Host(Rc<dyn Any>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Node(_) => "node",
            Value::NodeSet(_) => "node-set",
            Value::ResultTree(_) => "result tree fragment",
            Value::Iterator(_) => "iterator",
            Value::Builder(_) => "node-set builder",
            Value::Object(_) => "object",
            Value::Host(_) => "host object",
        }
    }

    fn type_error(&self, expected: &'static str) -> Error {
        Error::Type {
            expected,
            found: self.type_name(),
        }
    }

    pub fn node_set(nodes: Vec<Node>) -> Value {
        Value::NodeSet(Rc::new(nodes))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(value) => *value,
            Value::Number(value) => *value != 0.0 && !value.is_nan(),
            Value::String(value) => !value.is_empty(),
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::Node(_)
            | Value::ResultTree(_)
            | Value::Iterator(_)
            | Value::Builder(_)
            | Value::Object(_)
            | Value::Host(_) => true,
        }
    }

    pub fn to_number(&self, dom: &Dom) -> f64 {
        match self {
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(value) => *value,
            _ => parse_number(&self.to_string_value(dom)),
        }
    }

    pub fn to_string_value(&self, dom: &Dom) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(value) => value.to_string(),
            Value::Number(value) => number_to_string(*value),
            Value::String(value) => value.clone(),
            Value::Node(node) => dom.string_value(*node),
            Value::NodeSet(nodes) => nodes
                .first()
                .map(|node| dom.string_value(*node))
                .unwrap_or_default(),
            Value::ResultTree(events) => output::text(events),
            Value::Iterator(_)
            | Value::Builder(_)
            | Value::Object(_)
            | Value::Host(_) => String::new(),
        }
    }

    pub fn to_node_set(&self) -> Result<Rc<Vec<Node>>> {
        match self {
            Value::Null => Ok(Rc::new(Vec::new())),
            Value::Node(node) => Ok(Rc::new(vec![*node])),
            Value::NodeSet(nodes) => Ok(nodes.clone()),
            Value::ResultTree(_) => Err(Error::ResultTreeToNodeSet),
            _ => Err(self.type_error("node-set")),
        }
    }

    /// The first node, or none for an empty node-set.
    pub fn to_node(&self) -> Result<Option<Node>> {
        match self {
            Value::Null => Ok(None),
            Value::Node(node) => Ok(Some(*node)),
            Value::NodeSet(nodes) => Ok(nodes.first().copied()),
            _ => Err(self.type_error("node")),
        }
    }

    pub fn as_iterator(&self) -> Result<Option<Rc<RefCell<NodeIterator>>>> {
        match self {
            Value::Null => Ok(None),
            Value::Iterator(iterator) => Ok(Some(iterator.clone())),
            _ => Err(self.type_error("iterator")),
        }
    }

    pub fn as_builder(&self) -> Result<Rc<RefCell<Vec<Node>>>> {
        match self {
            Value::Builder(builder) => Ok(builder.clone()),
            _ => Err(self.type_error("node-set builder")),
        }
    }

    pub fn as_object(&self) -> Result<Rc<RefCell<Object>>> {
        match self {
            Value::Object(object) => Ok(object.clone()),
            _ => Err(self.type_error("object")),
        }
    }

    /// The string values of a node-like value, or `None` when the value
    /// is not node-like.
    fn node_strings(&self, dom: &Dom) -> Option<Vec<String>> {
        match self {
            Value::Node(node) => Some(vec![dom.string_value(*node)]),
            Value::NodeSet(nodes) => Some(nodes.iter().map(|n| dom.string_value(*n)).collect()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// XPath 1.0 `number()` of a string: optional minus, digits with an
/// optional fraction, surrounded by whitespace. Anything else is NaN.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim_matches(is_xml_whitespace);
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let mut digits = 0;
    let mut dots = 0;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return f64::NAN,
        }
    }
    if digits == 0 || dots > 1 {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// XPath 1.0 `string()` of a number.
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if value == 0.0 {
        "0".to_string()
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn swap(self) -> Self {
        match self {
            Comparison::Lt => Comparison::Gt,
            Comparison::Le => Comparison::Ge,
            Comparison::Gt => Comparison::Lt,
            Comparison::Ge => Comparison::Le,
            other => other,
        }
    }

    fn numbers(self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
        }
    }
}

/// Compare two values the way XPath 1.0 compares them, node-sets
/// included.
pub fn compare(dom: &Dom, comparison: Comparison, left: &Value, right: &Value) -> bool {
    match (left.node_strings(dom), right.node_strings(dom)) {
        (Some(left), Some(right)) => left.iter().any(|a| {
            right
                .iter()
                .any(|b| compare_atomic(dom, comparison, &Value::from(a.as_str()), &Value::from(b.as_str())))
        }),
        (Some(nodes), None) => compare_nodes(dom, comparison, &nodes, right),
        (None, Some(nodes)) => compare_nodes(dom, comparison.swap(), &nodes, left),
        (None, None) => compare_atomic(dom, comparison, left, right),
    }
}

fn compare_nodes(dom: &Dom, comparison: Comparison, nodes: &[String], other: &Value) -> bool {
    match other {
        Value::Boolean(_) => compare_atomic(dom, comparison, &Value::Boolean(!nodes.is_empty()), other),
        Value::Number(number) => nodes
            .iter()
            .any(|text| comparison.numbers(parse_number(text), *number)),
        _ => nodes
            .iter()
            .any(|text| compare_atomic(dom, comparison, &Value::from(text.as_str()), other)),
    }
}

fn compare_atomic(dom: &Dom, comparison: Comparison, left: &Value, right: &Value) -> bool {
    match comparison {
        Comparison::Eq | Comparison::Ne => {
            let equal = if matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_)) {
                left.to_boolean() == right.to_boolean()
            } else if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
                return comparison.numbers(left.to_number(dom), right.to_number(dom));
            } else {
                left.to_string_value(dom) == right.to_string_value(dom)
            };
            equal == (comparison == Comparison::Eq)
        }
        _ => comparison.numbers(left.to_number(dom), right.to_number(dom)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 12.5 "), 12.5);
        assert_eq!(parse_number("-3"), -3.0);
        assert_eq!(parse_number(".5"), 0.5);
        assert!(parse_number("1e3").is_nan());
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("").is_nan());
        assert!(parse_number("1.2.3").is_nan());
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.25), "0.25");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_node_set_comparisons() {
        let dom = Dom::parse("<a><b>1</b><b>2</b></a>").unwrap();
        let a = dom.axis(xsltc_bytecode::Axis::Child, dom.root())[0];
        let bs = Value::node_set(dom.axis(xsltc_bytecode::Axis::Child, a));
        assert!(compare(&dom, Comparison::Eq, &bs, &Value::Number(2.0)));
        assert!(compare(&dom, Comparison::Ne, &bs, &Value::Number(2.0)));
        assert!(compare(&dom, Comparison::Lt, &Value::Number(1.5), &bs));
        assert!(!compare(&dom, Comparison::Gt, &Value::Number(1.0), &bs));
        assert!(compare(&dom, Comparison::Eq, &bs, &Value::from("1")));
        assert!(compare(&dom, Comparison::Eq, &bs, &Value::Boolean(true)));
        let empty = Value::node_set(Vec::new());
        assert!(!compare(&dom, Comparison::Eq, &empty, &Value::from("")));
        assert!(!compare(&dom, Comparison::Ne, &empty, &Value::from("")));
    }

    #[test]
    fn test_atomic_comparisons() {
        let dom = Dom::parse("<a/>").unwrap();
        assert!(compare(&dom, Comparison::Eq, &Value::from("1.0"), &Value::Number(1.0)));
        assert!(!compare(&dom, Comparison::Eq, &Value::from("1.0"), &Value::from("1")));
        assert!(compare(&dom, Comparison::Eq, &Value::from("x"), &Value::Boolean(true)));
        assert!(compare(&dom, Comparison::Ne, &Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(compare(&dom, Comparison::Le, &Value::from("2"), &Value::Number(2.0)));
    }

    #[test]
    fn test_result_tree_is_not_a_node_set() {
        let tree = Value::ResultTree(Rc::new(Vec::new()));
        assert_eq!(tree.to_node_set(), Err(Error::ResultTreeToNodeSet));
        assert!(tree.to_boolean());
    }

    #[test]
    fn test_iterator_positions() {
        let dom = Dom::parse("<a><b/><c/></a>").unwrap();
        let a = dom.axis(xsltc_bytecode::Axis::Child, dom.root())[0];
        let mut iterator = NodeIterator::new(Rc::new(dom.axis(xsltc_bytecode::Axis::Child, a)));
        assert_eq!(iterator.last(), 2);
        assert!(iterator.next_node().is_some());
        assert_eq!(iterator.position(), 1);
        assert!(iterator.next_node().is_some());
        assert!(iterator.next_node().is_none());
    }
}
