use xsltc_bytecode::Builtin;
use xsltc_name::XSLT_NAMESPACE;
use xsltc_xpath::ast::{
    self, Axis, BinaryExpr, BinaryOperator, Expr, ExprS, FunctionCall, NodeTest, PathExpr,
};

use super::foreign::foreign_package;
use super::texpr::{step_spec, Comparison, PathStart, TExpr, TExprKind, TStep, VariableRef};
use super::Checker;
use crate::error::ErrorCode;
use crate::functions::{ContextArgument, FunctionImpl, PrimOp};
use crate::types::Type;

/// XSLT instructions `element-available()` reports.
const AVAILABLE_INSTRUCTIONS: &[&str] = &[
    "apply-imports",
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "for-each",
    "if",
    "message",
    "number",
    "otherwise",
    "param",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
    "when",
    "with-param",
];

fn context_node() -> TExpr {
    TExpr::new(TExprKind::ContextNode, Type::Node)
}

fn is_context_item(path: &PathExpr) -> bool {
    matches!(path.start, ast::PathStart::Relative)
        && path.steps.len() == 1
        && path.steps[0].axis == Axis::Self_
        && path.steps[0].node_test == NodeTest::Node
        && path.steps[0].predicates.is_empty()
}

/// Split the `Q{uri}local` form names are expanded to.
fn split_expanded(name: &str) -> (Option<&str>, &str) {
    name.strip_prefix("Q{")
        .and_then(|rest| rest.split_once('}'))
        .map(|(uri, local)| (Some(uri), local))
        .unwrap_or((None, name))
}

impl Checker<'_> {
    pub(crate) fn expression(&mut self, expr: &ExprS) -> TExpr {
        match &expr.value {
            Expr::Literal(value) => TExpr::string(value.clone()),
            Expr::Number(value) => {
                let integral = value.0.fract() == 0.0 && value.0.abs() < 2_147_483_648.0;
                let ty = if integral { Type::Int } else { Type::Real };
                TExpr::new(TExprKind::Number(*value), ty)
            }
            Expr::VarRef(name) => {
                if self.in_key {
                    self.report(ErrorCode::VariableInKey, name.to_lexical());
                }
                if let Some(local) = self.symbols.lookup_local(name) {
                    return TExpr::new(
                        TExprKind::Variable(VariableRef::Local {
                            id: local.id,
                            name: name.clone(),
                        }),
                        local.ty.clone(),
                    );
                }
                if let Some(global) = self.symbols.global(name) {
                    return TExpr::new(
                        TExprKind::Variable(VariableRef::Global(global.field)),
                        global.ty.clone(),
                    );
                }
                self.report(ErrorCode::UnresolvedVariable, name.to_lexical());
                TExpr::void()
            }
            Expr::FunctionCall(call) => self.function_call(call),
            Expr::Binary(binary) => self.binary(binary),
            Expr::Negate(inner) => {
                let inner = self.expression(inner);
                let inner = self.convert(inner, &Type::Real);
                TExpr::new(TExprKind::Negate(Box::new(inner)), Type::Real)
            }
            Expr::Filter(filter) => {
                let primary = self.expression(&filter.primary);
                if filter.predicates.is_empty() {
                    return primary;
                }
                let primary = self.convert(primary, &Type::NodeSet);
                let predicates = filter
                    .predicates
                    .iter()
                    .map(|predicate| self.predicate(predicate))
                    .collect();
                TExpr::new(
                    TExprKind::Filter {
                        primary: Box::new(primary),
                        predicates,
                    },
                    Type::NodeSet,
                )
            }
            Expr::Path(path) => self.path(path),
        }
    }

    /// Convert `expr` to `target`, reporting when no conversion exists.
    pub(crate) fn convert(&mut self, expr: TExpr, target: &Type) -> TExpr {
        if !expr.ty.can_convert_to(target) {
            self.report(
                ErrorCode::TypeCheck,
                format!("cannot convert {} to {}", expr.ty, target),
            );
            return TExpr::void();
        }
        expr.cast(target)
    }

    /// A predicate as a boolean. A number `n` means `position() = n`.
    pub(crate) fn predicate(&mut self, predicate: &ExprS) -> TExpr {
        let checked = self.expression(predicate);
        if checked.ty.is_number() || checked.ty == Type::Reference {
            let position = TExpr::new(TExprKind::Call(FunctionImpl::Position, Vec::new()), Type::Int);
            return TExpr::new(
                TExprKind::PrimOp(
                    PrimOp::Eq,
                    Box::new(position.cast(&Type::Real)),
                    Box::new(checked.cast(&Type::Real)),
                ),
                Type::Boolean,
            );
        }
        self.convert(checked, &Type::Boolean)
    }

    fn path(&mut self, path: &PathExpr) -> TExpr {
        if is_context_item(path) {
            return context_node();
        }
        let start = match &path.start {
            ast::PathStart::Relative => PathStart::ContextNode,
            ast::PathStart::Root => PathStart::Root,
            ast::PathStart::Expr(start) => {
                let start = self.expression(start);
                PathStart::Expr(Box::new(self.convert(start, &Type::NodeSet)))
            }
        };
        let steps = path
            .steps
            .iter()
            .map(|step| TStep {
                spec: step_spec(step.axis, &step.node_test),
                predicates: step
                    .predicates
                    .iter()
                    .map(|predicate| self.predicate(predicate))
                    .collect(),
            })
            .collect();
        TExpr::new(TExprKind::Path { start, steps }, Type::NodeSet)
    }

    fn binary(&mut self, binary: &BinaryExpr) -> TExpr {
        let left = self.expression(&binary.left);
        let right = self.expression(&binary.right);
        match binary.operator {
            BinaryOperator::And | BinaryOperator::Or => {
                let left = Box::new(self.convert(left, &Type::Boolean));
                let right = Box::new(self.convert(right, &Type::Boolean));
                let kind = if binary.operator == BinaryOperator::And {
                    TExprKind::And(left, right)
                } else {
                    TExprKind::Or(left, right)
                };
                TExpr::new(kind, Type::Boolean)
            }
            BinaryOperator::Union => {
                let node_like = |ty: &Type| matches!(ty, Type::NodeSet | Type::Node | Type::Reference);
                if !node_like(&left.ty) || !node_like(&right.ty) {
                    self.report(
                        ErrorCode::TypeCheck,
                        format!("cannot take the union of {} and {}", left.ty, right.ty),
                    );
                    return TExpr::void();
                }
                TExpr::new(
                    TExprKind::Union(
                        Box::new(left.cast(&Type::NodeSet)),
                        Box::new(right.cast(&Type::NodeSet)),
                    ),
                    Type::NodeSet,
                )
            }
            operator if operator.is_comparison() => self.comparison(operator, left, right),
            operator => self.arithmetic(operator, left, right),
        }
    }

    fn comparison(&mut self, operator: BinaryOperator, left: TExpr, right: TExpr) -> TExpr {
        let general = |ty: &Type| ty.is_node_like() || *ty == Type::Reference;
        if general(&left.ty) || general(&right.ty) {
            let Some(comparison) = Comparison::from_operator(operator) else {
                self.report(ErrorCode::Internal, format!("{:?} is not a comparison", operator));
                return TExpr::void();
            };
            return TExpr::new(
                TExprKind::Compare(comparison, Box::new(left), Box::new(right)),
                Type::Boolean,
            );
        }
        let both_int = left.ty == Type::Int && right.ty == Type::Int;
        let number = if both_int { Type::Int } else { Type::Real };
        let equality = matches!(operator, BinaryOperator::Eq | BinaryOperator::Ne);
        let operand = if !equality {
            number
        } else if left.ty == Type::Boolean || right.ty == Type::Boolean {
            Type::Boolean
        } else if left.ty.is_number() || right.ty.is_number() {
            number
        } else {
            Type::String
        };
        self.primitive(operator, left, right, &[operand.clone(), operand])
    }

    fn arithmetic(&mut self, operator: BinaryOperator, left: TExpr, right: TExpr) -> TExpr {
        let operands = [left.ty.clone(), right.ty.clone()];
        self.primitive(operator, left, right, &operands)
    }

    /// Resolve an operator signature for `operands` and convert both sides
    /// to its parameters.
    fn primitive(
        &mut self,
        operator: BinaryOperator,
        left: TExpr,
        right: TExpr,
        operands: &[Type],
    ) -> TExpr {
        let signature = self
            .symbols
            .functions
            .lookup_operator(operator.symbol(), operands)
            .cloned();
        let Some(signature) = signature else {
            self.report(
                ErrorCode::TypeCheck,
                format!("{} {} {}", left.ty, operator.symbol(), right.ty),
            );
            return TExpr::void();
        };
        let left = self.convert(left, &signature.params[0]);
        let right = self.convert(right, &signature.params[1]);
        TExpr::new(
            TExprKind::PrimOp(signature.implementation, Box::new(left), Box::new(right)),
            signature.result,
        )
    }

    fn function_call(&mut self, call: &FunctionCall) -> TExpr {
        if let Some(namespace) = call.name.namespace() {
            if let Some(package) = foreign_package(namespace) {
                return self.foreign_call(package, call);
            }
            self.report(ErrorCode::UnresolvedFunction, call.name.to_string());
            return TExpr::void();
        }
        let name = call.name.local_name();
        let arity = call.arguments.len();
        if name == "document" || (name == "format-number" && arity == 3) {
            self.report(ErrorCode::UnsupportedFunction, format!("{}#{}", name, arity));
            return TExpr::void();
        }
        if !self.symbols.functions.has_arity(name, arity) {
            self.report(ErrorCode::UnresolvedFunction, format!("{}#{}", name, arity));
            return TExpr::void();
        }
        match name {
            "true" => return TExpr::boolean(true),
            "false" => return TExpr::boolean(false),
            "element-available" | "function-available" => {
                return self.available(name == "element-available", &call.arguments[0]);
            }
            _ => {}
        }
        let mut arguments = call
            .arguments
            .iter()
            .map(|argument| self.expression(argument))
            .collect::<Vec<_>>();
        if arguments.is_empty() {
            match self.symbols.functions.context_argument(name) {
                ContextArgument::Node => arguments.push(context_node()),
                ContextArgument::StringValue => arguments.push(context_node().cast(&Type::String)),
                ContextArgument::None => {}
            }
        }
        match name {
            "concat" => {
                let arguments = arguments
                    .into_iter()
                    .map(|argument| self.convert(argument, &Type::String))
                    .collect();
                return TExpr::new(TExprKind::Call(FunctionImpl::Concat, arguments), Type::String);
            }
            "lang" => {
                let mut arguments = arguments
                    .into_iter()
                    .map(|argument| self.convert(argument, &Type::String))
                    .collect::<Vec<_>>();
                arguments.push(context_node());
                return TExpr::new(
                    TExprKind::Call(FunctionImpl::Builtin(Builtin::Lang), arguments),
                    Type::Boolean,
                );
            }
            "id" | "key" => return self.lookup_call(name, arguments),
            _ => {}
        }
        let types = arguments.iter().map(|a| a.ty.clone()).collect::<Vec<_>>();
        let signature = self.symbols.functions.lookup_function(name, &types).cloned();
        let Some(signature) = signature else {
            let types = types.iter().map(|t| t.to_string()).collect::<Vec<_>>();
            self.report(
                ErrorCode::TypeCheck,
                format!("{}({})", name, types.join(", ")),
            );
            return TExpr::void();
        };
        let mut arguments = arguments
            .into_iter()
            .zip(&signature.params)
            .map(|(argument, param)| self.convert(argument, param))
            .collect::<Vec<_>>();
        match signature.implementation {
            FunctionImpl::String | FunctionImpl::Number | FunctionImpl::Boolean => {
                match arguments.pop() {
                    Some(argument) => argument.cast(&signature.result),
                    None => TExpr::void(),
                }
            }
            implementation => {
                TExpr::new(TExprKind::Call(implementation, arguments), signature.result)
            }
        }
    }

    /// `id()` and `key()`: a value argument that is not statically a node
    /// set stays unconverted, the run time decides how to look it up.
    fn lookup_call(&mut self, name: &str, arguments: Vec<TExpr>) -> TExpr {
        let builtin = if name == "id" { Builtin::Id } else { Builtin::Key };
        let value_index = arguments.len() - 1;
        let arguments = arguments
            .into_iter()
            .enumerate()
            .map(|(index, argument)| {
                if index < value_index {
                    self.convert(argument, &Type::String)
                } else if argument.ty.is_node_like() && argument.ty != Type::ResultTree {
                    argument.cast(&Type::NodeSet)
                } else if argument.ty == Type::Reference {
                    argument
                } else {
                    self.convert(argument, &Type::String)
                }
            })
            .collect();
        TExpr::new(TExprKind::Call(FunctionImpl::Builtin(builtin), arguments), Type::NodeSet)
    }

    fn available(&mut self, element: bool, argument: &ExprS) -> TExpr {
        let Expr::Literal(name) = &argument.value else {
            self.report(
                ErrorCode::UnsupportedFunction,
                "availability test of a computed name",
            );
            return TExpr::void();
        };
        let (namespace, local) = split_expanded(name);
        let available = if element {
            namespace == Some(XSLT_NAMESPACE) && AVAILABLE_INSTRUCTIONS.contains(&local)
        } else {
            match namespace {
                None => self.symbols.functions.is_function(local) && local != "document",
                Some(namespace) => foreign_package(namespace).is_some(),
            }
        };
        TExpr::boolean(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::extension::ExtensionRegistry;
    use crate::symbols::{LocalBinding, SymbolTable};
    use crate::syntax::VariableId;
    use ordered_float::OrderedFloat;
    use xsltc_name::{Namespaces, QName};
    use xsltc_xpath::parse_expression;

    fn check_with(text: &str, setup: impl FnOnce(&mut SymbolTable)) -> (TExpr, Vec<ErrorCode>) {
        let mut context = CompilationContext::new("T");
        let mut symbols = SymbolTable::new();
        setup(&mut symbols);
        let extensions = ExtensionRegistry::new();
        let expr = parse_expression(text, &Namespaces::default()).unwrap();
        let checked = Checker::new(&mut context, &mut symbols, &extensions).expression(&expr);
        let codes = context.diagnostics.errors().map(|d| d.code).collect();
        (checked, codes)
    }

    fn check(text: &str) -> (TExpr, Vec<ErrorCode>) {
        check_with(text, |_| {})
    }

    #[test]
    fn test_literal_number_types() {
        assert_eq!(check("3").0.ty, Type::Int);
        assert_eq!(check("3.5").0.ty, Type::Real);
        assert_eq!(check("1 + 2").0.ty, Type::Int);
        assert_eq!(check("1 div 2").0.ty, Type::Real);
        assert_eq!(check("1 + 'a'").0.ty, Type::Real);
    }

    #[test]
    fn test_comparisons() {
        let (expr, _) = check("a = 'x'");
        assert!(matches!(expr.kind, TExprKind::Compare(Comparison::Eq, _, _)));
        let (expr, _) = check("'a' = 1");
        let TExprKind::PrimOp(PrimOp::Eq, left, right) = expr.kind else {
            panic!("expected a primitive comparison");
        };
        assert_eq!(left.ty, Type::Real);
        assert_eq!(right.ty, Type::Real);
        let (expr, _) = check("true() != 'x'");
        let TExprKind::PrimOp(PrimOp::Ne, _, right) = expr.kind else {
            panic!("expected a primitive comparison");
        };
        assert_eq!(right.ty, Type::Boolean);
    }

    #[test]
    fn test_numeric_predicate_compares_position() {
        let (expr, _) = check("a[2]");
        let TExprKind::Path { steps, .. } = expr.kind else {
            panic!("expected a path");
        };
        assert!(matches!(
            steps[0].predicates[0].kind,
            TExprKind::PrimOp(PrimOp::Eq, _, _)
        ));
    }

    #[test]
    fn test_context_forms() {
        let (expr, _) = check("string-length()");
        let TExprKind::Call(_, arguments) = expr.kind else {
            panic!("expected a call");
        };
        assert_eq!(arguments[0].ty, Type::String);
        let (expr, _) = check("string()");
        assert_eq!(expr.ty, Type::String);
        assert!(matches!(expr.kind, TExprKind::Cast(_)));
        assert_eq!(check(".").0.kind, TExprKind::ContextNode);
    }

    #[test]
    fn test_unknown_and_unsupported_functions() {
        assert_eq!(check("nope()").1, vec![ErrorCode::UnresolvedFunction]);
        assert_eq!(check("substring('a')").1, vec![ErrorCode::UnresolvedFunction]);
        assert_eq!(check("document('a.xml')").1, vec![ErrorCode::UnsupportedFunction]);
        assert_eq!(
            check("format-number(1, '0', 'd')").1,
            vec![ErrorCode::UnsupportedFunction]
        );
    }

    #[test]
    fn test_result_tree_is_not_a_node_set() {
        let (_, codes) = check_with("count($t)", |symbols| {
            symbols.declare_local(LocalBinding {
                name: QName::unprefixed("t"),
                id: VariableId(1),
                ty: Type::ResultTree,
            });
        });
        assert_eq!(codes, vec![ErrorCode::TypeCheck]);
    }

    #[test]
    fn test_availability_is_folded() {
        assert_eq!(check("function-available('concat')").0, TExpr::boolean(true));
        assert_eq!(check("function-available('document')").0, TExpr::boolean(false));
    }

    #[test]
    fn test_key_with_reference_value() {
        let (expr, codes) = check_with("key('k', $p)", |symbols| {
            symbols.declare_local(LocalBinding {
                name: QName::unprefixed("p"),
                id: VariableId(1),
                ty: Type::Reference,
            });
        });
        assert!(codes.is_empty());
        let TExprKind::Call(_, arguments) = expr.kind else {
            panic!("expected a call");
        };
        assert_eq!(arguments[1].ty, Type::Reference);
    }

    #[test]
    fn test_union_of_strings() {
        assert_eq!(check("'a' | 'b'").1, vec![ErrorCode::TypeCheck]);
    }

    #[test]
    fn test_literal_number_value() {
        assert_eq!(
            check("2.5").0.kind,
            TExprKind::Number(OrderedFloat(2.5))
        );
    }
}
