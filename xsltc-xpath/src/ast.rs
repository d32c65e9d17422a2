use ordered_float::OrderedFloat;
use xsltc_name::QName;

use crate::span::Spanned;

pub type ExprS = Spanned<Expr>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Literal(String),
    Number(OrderedFloat<f64>),
    VarRef(QName),
    FunctionCall(FunctionCall),
    Binary(BinaryExpr),
    Negate(Box<ExprS>),
    Filter(FilterExpr),
    Path(PathExpr),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCall {
    pub name: QName,
    pub arguments: Vec<ExprS>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Union,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
        )
    }

    /// The name under which the operator's signatures are registered.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Union => "|",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryExpr {
    pub operator: BinaryOperator,
    pub left: Box<ExprS>,
    pub right: Box<ExprS>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterExpr {
    pub primary: Box<ExprS>,
    pub predicates: Vec<ExprS>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStart {
    /// Starts at the context node.
    Relative,
    /// Starts at the root of the context node's document.
    Root,
    /// Starts at the nodes a filter expression evaluates to.
    Expr(Box<ExprS>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpr {
    pub start: PathStart,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<ExprS>,
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

impl Axis {
    pub fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "following" => Axis::Following,
            "following-sibling" => Axis::FollowingSibling,
            "namespace" => Axis::Namespace,
            "parent" => Axis::Parent,
            "preceding" => Axis::Preceding,
            "preceding-sibling" => Axis::PrecedingSibling,
            "self" => Axis::Self_,
            _ => return None,
        })
    }

    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::Parent
                | Axis::Preceding
                | Axis::PrecedingSibling
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTest {
    Name(QName),
    /// `prefix:*`
    NamespaceWildcard(String),
    /// `*`
    Wildcard,
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

impl NodeTest {
    pub fn from_node_type(name: &str, literal: Option<String>) -> Option<NodeTest> {
        Some(match name {
            "node" => NodeTest::Node,
            "text" => NodeTest::Text,
            "comment" => NodeTest::Comment,
            "processing-instruction" => NodeTest::ProcessingInstruction(literal),
            _ => return None,
        })
    }
}

impl Step {
    pub fn new(axis: Axis, node_test: NodeTest) -> Self {
        Step {
            axis,
            node_test,
            predicates: Vec::new(),
        }
    }

    /// The step `//` abbreviates.
    pub fn descendant_or_self() -> Self {
        Step::new(Axis::DescendantOrSelf, NodeTest::Node)
    }
}

impl Expr {
    /// The context node, `.`.
    pub fn context_item() -> Expr {
        Expr::Path(PathExpr {
            start: PathStart::Relative,
            steps: vec![Step::new(Axis::Self_, NodeTest::Node)],
        })
    }

    /// Visit every variable this expression references, outermost first.
    pub fn variables<'a>(&'a self, found: &mut Vec<&'a QName>) {
        match self {
            Expr::Literal(_) | Expr::Number(_) => {}
            Expr::VarRef(name) => found.push(name),
            Expr::FunctionCall(call) => {
                for argument in &call.arguments {
                    argument.value.variables(found);
                }
            }
            Expr::Binary(binary) => {
                binary.left.value.variables(found);
                binary.right.value.variables(found);
            }
            Expr::Negate(inner) => inner.value.variables(found),
            Expr::Filter(filter) => {
                filter.primary.value.variables(found);
                for predicate in &filter.predicates {
                    predicate.value.variables(found);
                }
            }
            Expr::Path(path) => {
                if let PathStart::Expr(start) = &path.start {
                    start.value.variables(found);
                }
                for step in &path.steps {
                    for predicate in &step.predicates {
                        predicate.value.variables(found);
                    }
                }
            }
        }
    }

    /// Visit every function call this expression makes.
    pub fn function_calls<'a>(&'a self, found: &mut Vec<&'a FunctionCall>) {
        match self {
            Expr::Literal(_) | Expr::Number(_) | Expr::VarRef(_) => {}
            Expr::FunctionCall(call) => {
                found.push(call);
                for argument in &call.arguments {
                    argument.value.function_calls(found);
                }
            }
            Expr::Binary(binary) => {
                binary.left.value.function_calls(found);
                binary.right.value.function_calls(found);
            }
            Expr::Negate(inner) => inner.value.function_calls(found),
            Expr::Filter(filter) => {
                filter.primary.value.function_calls(found);
                for predicate in &filter.predicates {
                    predicate.value.function_calls(found);
                }
            }
            Expr::Path(path) => {
                if let PathStart::Expr(start) = &path.start {
                    start.value.function_calls(found);
                }
                for step in &path.steps {
                    for predicate in &step.predicates {
                        predicate.value.function_calls(found);
                    }
                }
            }
        }
    }
}
