use ordered_float::OrderedFloat;
use xsltc_bytecode::{Axis, ForeignMethodRef, StepSpec, StepTest};
use xsltc_name::QName;
use xsltc_xpath::ast::{self, BinaryOperator, NodeTest};
use xsltc_xpath::pattern::PatternAxis;

use crate::functions::{FunctionImpl, PrimOp};
use crate::syntax::VariableId;
use crate::types::Type;

/// An expression after type checking. Every implicit conversion is an
/// explicit [`TExprKind::Cast`].
#[derive(Debug, Clone, PartialEq)]
pub struct TExpr {
    pub kind: TExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableRef {
    Local { id: VariableId, name: QName },
    /// A global variable or parameter, by field of the main unit.
    Global(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    ContextNode,
    Root,
    Expr(Box<TExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TStep {
    pub spec: StepSpec,
    /// Boolean typed; numeric predicates are already rewritten.
    pub predicates: Vec<TExpr>,
}

/// Operators of a general comparison, evaluated with XPath semantics at
/// run time.
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
    pub(crate) fn from_operator(operator: BinaryOperator) -> Option<Comparison> {
        Some(match operator {
            BinaryOperator::Eq => Comparison::Eq,
            BinaryOperator::Ne => Comparison::Ne,
            BinaryOperator::Lt => Comparison::Lt,
            BinaryOperator::Le => Comparison::Le,
            BinaryOperator::Gt => Comparison::Gt,
            BinaryOperator::Ge => Comparison::Ge,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TExprKind {
    String(String),
    Number(OrderedFloat<f64>),
    Boolean(bool),
    Variable(VariableRef),
    /// `.`
    ContextNode,
    /// Convert the operand to this expression's type.
    Cast(Box<TExpr>),
    Call(FunctionImpl, Vec<TExpr>),
    Foreign(ForeignMethodRef, Vec<TExpr>),
    PrimOp(PrimOp, Box<TExpr>, Box<TExpr>),
    Compare(Comparison, Box<TExpr>, Box<TExpr>),
    And(Box<TExpr>, Box<TExpr>),
    Or(Box<TExpr>, Box<TExpr>),
    Negate(Box<TExpr>),
    Union(Box<TExpr>, Box<TExpr>),
    Filter {
        primary: Box<TExpr>,
        predicates: Vec<TExpr>,
    },
    Path {
        start: PathStart,
        steps: Vec<TStep>,
    },
}

impl TExpr {
    pub fn new(kind: TExprKind, ty: Type) -> Self {
        TExpr { kind, ty }
    }

    pub fn string(value: impl Into<String>) -> Self {
        TExpr::new(TExprKind::String(value.into()), Type::String)
    }

    pub fn boolean(value: bool) -> Self {
        TExpr::new(TExprKind::Boolean(value), Type::Boolean)
    }

    /// Stand-in for an expression that failed to check.
    pub fn void() -> Self {
        TExpr::new(TExprKind::String(String::new()), Type::Void)
    }

    /// Convert to `target`, wrapping in a cast when the type differs.
    pub fn cast(self, target: &Type) -> TExpr {
        if &self.ty == target || *target == Type::Reference {
            return self;
        }
        TExpr::new(TExprKind::Cast(Box::new(self)), target.clone())
    }

    /// Local variables this expression reads, in first reference order
    /// and without repeats.
    pub fn collect_locals(&self, found: &mut Vec<(VariableId, QName)>) {
        match &self.kind {
            TExprKind::String(_)
            | TExprKind::Number(_)
            | TExprKind::Boolean(_)
            | TExprKind::ContextNode => {}
            TExprKind::Variable(VariableRef::Local { id, name }) => {
                if !found.iter().any(|(seen, _)| seen == id) {
                    found.push((*id, name.clone()));
                }
            }
            TExprKind::Variable(VariableRef::Global(_)) => {}
            TExprKind::Cast(inner) | TExprKind::Negate(inner) => inner.collect_locals(found),
            TExprKind::Call(_, arguments) | TExprKind::Foreign(_, arguments) => {
                for argument in arguments {
                    argument.collect_locals(found);
                }
            }
            TExprKind::PrimOp(_, left, right)
            | TExprKind::Compare(_, left, right)
            | TExprKind::And(left, right)
            | TExprKind::Or(left, right)
            | TExprKind::Union(left, right) => {
                left.collect_locals(found);
                right.collect_locals(found);
            }
            TExprKind::Filter {
                primary,
                predicates,
            } => {
                primary.collect_locals(found);
                for predicate in predicates {
                    predicate.collect_locals(found);
                }
            }
            TExprKind::Path { start, steps } => {
                if let PathStart::Expr(start) = start {
                    start.collect_locals(found);
                }
                for step in steps {
                    for predicate in &step.predicates {
                        predicate.collect_locals(found);
                    }
                }
            }
        }
    }
}

fn step_axis(axis: ast::Axis) -> Axis {
    match axis {
        ast::Axis::Ancestor => Axis::Ancestor,
        ast::Axis::AncestorOrSelf => Axis::AncestorOrSelf,
        ast::Axis::Attribute => Axis::Attribute,
        ast::Axis::Child => Axis::Child,
        ast::Axis::Descendant => Axis::Descendant,
        ast::Axis::DescendantOrSelf => Axis::DescendantOrSelf,
        ast::Axis::Following => Axis::Following,
        ast::Axis::FollowingSibling => Axis::FollowingSibling,
        ast::Axis::Namespace => Axis::Namespace,
        ast::Axis::Parent => Axis::Parent,
        ast::Axis::Preceding => Axis::Preceding,
        ast::Axis::PrecedingSibling => Axis::PrecedingSibling,
        ast::Axis::Self_ => Axis::Self_,
    }
}

fn step_test(test: &NodeTest) -> StepTest {
    match test {
        NodeTest::Name(name) => StepTest::Name {
            namespace: name.namespace().map(str::to_string),
            local: name.local_name().to_string(),
        },
        NodeTest::NamespaceWildcard(uri) => StepTest::NamespaceWildcard(uri.clone()),
        NodeTest::Wildcard => StepTest::Principal,
        NodeTest::Node => StepTest::Node,
        NodeTest::Text => StepTest::Text,
        NodeTest::Comment => StepTest::Comment,
        NodeTest::ProcessingInstruction(target) => StepTest::ProcessingInstruction(target.clone()),
    }
}

pub(crate) fn step_spec(axis: ast::Axis, test: &NodeTest) -> StepSpec {
    StepSpec {
        axis: step_axis(axis),
        test: step_test(test),
    }
}

/// The step that selects the siblings a pattern step is positioned among.
pub(crate) fn pattern_step_spec(axis: PatternAxis, test: &NodeTest) -> StepSpec {
    StepSpec {
        axis: match axis {
            PatternAxis::Child => Axis::Child,
            PatternAxis::Attribute => Axis::Attribute,
        },
        test: step_test(test),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(id: usize, name: &str) -> TExpr {
        TExpr::new(
            TExprKind::Variable(VariableRef::Local {
                id: VariableId(id),
                name: QName::unprefixed(name),
            }),
            Type::Reference,
        )
    }

    #[test]
    fn test_collect_locals_first_reference_order() {
        // $x * 2 + $y - $x
        let expr = TExpr::new(
            TExprKind::PrimOp(
                PrimOp::Sub,
                Box::new(TExpr::new(
                    TExprKind::PrimOp(
                        PrimOp::Add,
                        Box::new(local(3, "x").cast(&Type::Real)),
                        Box::new(local(1, "y").cast(&Type::Real)),
                    ),
                    Type::Real,
                )),
                Box::new(local(3, "x").cast(&Type::Real)),
            ),
            Type::Real,
        );
        let mut found = Vec::new();
        expr.collect_locals(&mut found);
        let names = found
            .iter()
            .map(|(_, name)| name.local_name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_cast_to_same_type_is_identity() {
        let expr = TExpr::string("a");
        assert_eq!(expr.clone().cast(&Type::String), expr);
        assert!(matches!(expr.cast(&Type::Real).kind, TExprKind::Cast(_)));
    }
}
