//! Binding calls in the Java extension namespaces to foreign classes.

use xsltc_bytecode::{ForeignCallKind, ForeignMethodRef, ForeignType};
use xsltc_name::XALAN_JAVA_NAMESPACE;
use xsltc_xpath::ast::FunctionCall;

use super::texpr::{TExpr, TExprKind};
use super::Checker;
use crate::error::ErrorCode;
use crate::extension::ForeignClass;
use crate::types::{foreign_distance, internal_type, Type};

/// The package (or class) an extension namespace designates, if the
/// namespace is one of the Java extension namespaces.
pub(crate) fn foreign_package(uri: &str) -> Option<&str> {
    if let Some(rest) = uri.strip_prefix("java:") {
        return Some(rest);
    }
    if uri == XALAN_JAVA_NAMESPACE {
        return Some("");
    }
    uri.strip_prefix(XALAN_JAVA_NAMESPACE)
        .and_then(|rest| rest.strip_prefix('/'))
}

struct Candidate<'c> {
    kind: ForeignCallKind,
    params: &'c [ForeignType],
    return_type: ForeignType,
    distance: u32,
}

impl Checker<'_> {
    pub(crate) fn foreign_call(&mut self, package: &str, call: &FunctionCall) -> TExpr {
        let local = call.name.local_name();
        let (class_names, method) = match local.rsplit_once('.') {
            Some((suffix, method)) => {
                let mut names = Vec::new();
                if !package.is_empty() {
                    names.push(format!("{}.{}", package, suffix));
                }
                names.push(suffix.to_string());
                (names, method)
            }
            None => (vec![package.to_string()], local),
        };
        let extensions = self.extensions;
        let Some(class) = class_names.iter().find_map(|name| extensions.class(name)) else {
            self.report(
                ErrorCode::UnresolvedFunction,
                format!("no class {} for {}", class_names.join(" or "), call.name),
            );
            return TExpr::void();
        };
        let arguments = call
            .arguments
            .iter()
            .map(|argument| self.expression(argument))
            .collect::<Vec<_>>();
        let candidate = if method == "new" {
            self.best_constructor(class, &arguments)
        } else {
            self.best_method(class, method, &arguments)
        };
        let Some(candidate) = candidate else {
            let types = arguments
                .iter()
                .map(|argument| argument.ty.to_string())
                .collect::<Vec<_>>();
            self.report(
                ErrorCode::ArgumentConversion,
                format!("{}.{}({})", class.name, method, types.join(", ")),
            );
            return TExpr::void();
        };
        log::trace!(
            "bound {} to {:?} {}.{} at distance {}",
            call.name,
            candidate.kind,
            class.name,
            method,
            candidate.distance
        );
        let ty = match candidate.kind {
            ForeignCallKind::Constructor => Type::Object(class.name.clone()),
            _ => internal_type(&candidate.return_type),
        };
        let mut bound = Vec::with_capacity(arguments.len());
        let mut arguments = arguments.into_iter();
        if candidate.kind == ForeignCallKind::Instance {
            bound.extend(arguments.next());
        }
        for (argument, param) in arguments.zip(candidate.params) {
            bound.push(foreign_argument(argument, param));
        }
        let reference = ForeignMethodRef {
            class: class.name.clone(),
            method: method.to_string(),
            kind: candidate.kind,
            params: candidate.params.to_vec(),
            return_type: candidate.return_type,
        };
        TExpr::new(TExprKind::Foreign(reference, bound), ty)
    }

    fn distance(&self, arguments: &[TExpr], params: &[ForeignType]) -> Option<u32> {
        arguments
            .iter()
            .zip(params)
            .try_fold(0, |total, (argument, param)| {
                Some(total + foreign_distance(&argument.ty, param, self.extensions)?)
            })
    }

    fn best_constructor<'c>(
        &self,
        class: &'c ForeignClass,
        arguments: &[TExpr],
    ) -> Option<Candidate<'c>> {
        let mut best: Option<Candidate<'c>> = None;
        for params in &class.constructors {
            if params.len() != arguments.len() {
                continue;
            }
            let Some(distance) = self.distance(arguments, params) else {
                continue;
            };
            if best.as_ref().map_or(true, |best| distance < best.distance) {
                best = Some(Candidate {
                    kind: ForeignCallKind::Constructor,
                    params,
                    return_type: ForeignType::Class(class.name.clone()),
                    distance,
                });
            }
        }
        best
    }

    /// Static methods take all arguments; instance methods take the first
    /// argument as receiver. A zero argument call may also bind a
    /// parameterless instance method, invoked without a receiver.
    fn best_method<'c>(
        &self,
        class: &'c ForeignClass,
        name: &str,
        arguments: &[TExpr],
    ) -> Option<Candidate<'c>> {
        let mut best: Option<Candidate<'c>> = None;
        for method in class.methods_named(name) {
            let params = method.params.as_slice();
            let (kind, distance) = if method.is_static {
                if params.len() != arguments.len() {
                    continue;
                }
                (ForeignCallKind::Static, self.distance(arguments, params))
            } else if arguments.is_empty() {
                if !params.is_empty() {
                    continue;
                }
                (ForeignCallKind::Static, Some(0))
            } else {
                if params.len() != arguments.len() - 1 {
                    continue;
                }
                let receiver_fits = match &arguments[0].ty {
                    Type::Object(receiver) => {
                        self.extensions.is_assignable(receiver, &class.name)
                    }
                    Type::Reference => true,
                    _ => false,
                };
                if !receiver_fits {
                    continue;
                }
                (
                    ForeignCallKind::Instance,
                    self.distance(&arguments[1..], params),
                )
            };
            let Some(distance) = distance else {
                continue;
            };
            if best.as_ref().map_or(true, |best| distance < best.distance) {
                best = Some(Candidate {
                    kind,
                    params,
                    return_type: method.return_type.clone(),
                    distance,
                });
            }
        }
        best
    }
}

/// Convert an argument to the internal type closest to `param`.
fn foreign_argument(argument: TExpr, param: &ForeignType) -> TExpr {
    match param {
        param if param.is_numeric() => {
            if argument.ty == Type::Int {
                argument
            } else {
                argument.cast(&Type::Real)
            }
        }
        ForeignType::Boolean | ForeignType::BoxedBoolean => argument.cast(&Type::Boolean),
        ForeignType::String => argument.cast(&Type::String),
        ForeignType::Node | ForeignType::NodeList if argument.ty != Type::ResultTree => {
            argument.cast(&Type::NodeSet)
        }
        _ => argument,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::extension::ExtensionRegistry;
    use crate::symbols::SymbolTable;
    use xsltc_name::Namespaces;
    use xsltc_xpath::parse_expression;

    fn registry() -> ExtensionRegistry {
        ExtensionRegistry::new()
            .with_class(
                ForeignClass::new("java.lang.Math")
                    .with_static_method("max", vec![ForeignType::Int, ForeignType::Int], ForeignType::Int)
                    .with_static_method(
                        "max",
                        vec![ForeignType::Double, ForeignType::Double],
                        ForeignType::Double,
                    ),
            )
            .with_class(
                ForeignClass::new("java.util.Date")
                    .with_constructor(vec![])
                    .with_method("getTime", vec![], ForeignType::Long)
                    .with_method("toString", vec![], ForeignType::String),
            )
            .with_class(
                ForeignClass::new("p.Over")
                    .with_static_method("f", vec![ForeignType::Short], ForeignType::String)
                    .with_static_method("f", vec![ForeignType::Int], ForeignType::String)
                    .with_static_method("any", vec![], ForeignType::Object)
                    .with_static_method("g", vec![ForeignType::String], ForeignType::Void)
                    .with_static_method("g", vec![ForeignType::Double], ForeignType::Void),
            )
            .with_class(
                ForeignClass::new("p.Revo")
                    .with_static_method("g", vec![ForeignType::Double], ForeignType::Void)
                    .with_static_method("g", vec![ForeignType::String], ForeignType::Void),
            )
            .with_class(ForeignClass::new("p.Base"))
            .with_class(
                ForeignClass::new("p.Sub")
                    .with_supertype("p.Base")
                    .with_constructor(vec![]),
            )
            .with_class(
                ForeignClass::new("p.Pick")
                    .with_static_method(
                        "h",
                        vec![ForeignType::Class("p.Base".to_string())],
                        ForeignType::String,
                    )
                    .with_static_method("h", vec![ForeignType::Object], ForeignType::String),
            )
    }

    fn check(text: &str) -> (TExpr, Vec<ErrorCode>) {
        let mut context = CompilationContext::new("T");
        let mut symbols = SymbolTable::new();
        let extensions = registry();
        let mut namespaces = Namespaces::default();
        namespaces.add("math", "java:java.lang.Math");
        namespaces.add("java", "http://xml.apache.org/xalan/java");
        namespaces.add("util", "java:java.util");
        namespaces.add("p", "java:p");
        let expr = parse_expression(text, &namespaces).unwrap();
        let checked = Checker::new(&mut context, &mut symbols, &extensions).expression(&expr);
        let codes = context.diagnostics.errors().map(|d| d.code).collect();
        (checked, codes)
    }

    fn reference(expr: &TExpr) -> &ForeignMethodRef {
        match &expr.kind {
            TExprKind::Foreign(reference, _) => reference,
            other => panic!("not a foreign call: {:?}", other),
        }
    }

    #[test]
    fn test_int_arguments_prefer_int_overload() {
        let (expr, codes) = check("math:max(1, 2)");
        assert!(codes.is_empty());
        assert_eq!(reference(&expr).params, vec![ForeignType::Int, ForeignType::Int]);
        let (expr, _) = check("math:max(1.5, 2)");
        assert_eq!(
            reference(&expr).params,
            vec![ForeignType::Double, ForeignType::Double]
        );
        assert_eq!(expr.ty, Type::Real);
    }

    #[test]
    fn test_class_in_local_name() {
        let (expr, codes) = check("java:java.lang.Math.max(1, 2)");
        assert!(codes.is_empty());
        assert_eq!(reference(&expr).class, "java.lang.Math");
        let (expr, _) = check("util:Date.new()");
        assert_eq!(reference(&expr).kind, ForeignCallKind::Constructor);
        assert_eq!(expr.ty, Type::Object("java.util.Date".to_string()));
    }

    #[test]
    fn test_instance_call_on_constructed_object() {
        let (expr, codes) = check("util:Date.getTime(util:Date.new())");
        assert!(codes.is_empty());
        assert_eq!(reference(&expr).kind, ForeignCallKind::Instance);
        assert_eq!(expr.ty, Type::Real);
    }

    #[test]
    fn test_zero_argument_instance_method_called_statically() {
        let (expr, codes) = check("util:Date.toString()");
        assert!(codes.is_empty());
        assert_eq!(reference(&expr).kind, ForeignCallKind::Static);
    }

    #[test]
    fn test_closest_overload_wins() {
        let (expr, _) = check("p:Over.f(3)");
        assert_eq!(reference(&expr).params, vec![ForeignType::Int]);
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        // an untyped value is at distance 1 from both overloads
        let (expr, _) = check("p:Over.g(p:Over.any())");
        assert_eq!(reference(&expr).params, vec![ForeignType::String]);
        let (expr, _) = check("p:Revo.g(p:Over.any())");
        assert_eq!(reference(&expr).params, vec![ForeignType::Double]);
    }

    #[test]
    fn test_object_parameter_beats_supertype() {
        let (expr, codes) = check("p:Pick.h(p:Sub.new())");
        assert!(codes.is_empty());
        assert_eq!(reference(&expr).params, vec![ForeignType::Object]);
    }

    #[test]
    fn test_no_applicable_candidate() {
        let (_, codes) = check("math:max('a', 'b')");
        assert_eq!(codes, vec![ErrorCode::ArgumentConversion]);
        let (_, codes) = check("java:no.Such.thing()");
        assert_eq!(codes, vec![ErrorCode::UnresolvedFunction]);
    }
}
