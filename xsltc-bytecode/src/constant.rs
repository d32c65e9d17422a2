use ordered_float::OrderedFloat;

use crate::foreign::ForeignMethodRef;

/// An entry in a method's constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Null,
    Boolean(bool),
    Number(OrderedFloat<f64>),
    String(String),
    /// A generated unit, by name.
    Class(String),
    Method(MethodRef),
    Foreign(ForeignMethodRef),
    Step(StepSpec),
    Sort(SortSpec),
    Counter(NumberSpec),
}

/// Symbolic reference to a method, resolved when the translet is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    /// Number of arguments, not counting the receiver.
    pub arity: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    Self_,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepTest {
    /// `node()`
    Node,
    /// `*`: any node of the axis' principal kind.
    Principal,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
    Name {
        namespace: Option<String>,
        local: String,
    },
    /// `prefix:*`
    NamespaceWildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepSpec {
    pub axis: Axis,
    pub test: StepTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDataType {
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortLevel {
    pub data_type: SortDataType,
    pub descending: bool,
    /// `Some(true)` for `case-order="upper-first"`.
    pub upper_first: Option<bool>,
    pub lang: Option<String>,
}

/// Static description of an `xsl:sort` group. Key extraction lives in the
/// comparator helper unit named by `class`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub class: String,
    pub levels: Vec<SortLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberLevel {
    Single,
    Multiple,
    Any,
}

/// Static description of an `xsl:number`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NumberSpec {
    pub level: NumberLevel,
    /// Whether the counter helper implements `matchesCount`; otherwise
    /// nodes like the current node are counted.
    pub has_count: bool,
    pub has_from: bool,
    pub format: String,
    pub grouping_separator: Option<String>,
    pub grouping_size: Option<u32>,
}
