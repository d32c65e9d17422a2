//! Signatures of operators and core library functions.
//!
//! Each name maps to its signatures in registration order. Resolution
//! takes an exact match if there is one, otherwise the first signature whose
//! parameters the arguments can be converted to.

use ahash::{HashMap, HashMapExt};
use xsltc_bytecode::Builtin;

use crate::types::Type;

/// How a resolved function is lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionImpl {
    Builtin(Builtin),
    Position,
    Last,
    Current,
    String,
    Number,
    Boolean,
    Not,
    True,
    False,
    Concat,
    /// `element-available` and `function-available`, folded when compiled.
    Available { element: bool },
}

/// Primitive operation an operator resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature<T> {
    pub params: Vec<Type>,
    pub result: Type,
    pub implementation: T,
}

/// Zero argument forms that operate on the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextArgument {
    None,
    /// The context node is the only argument.
    Node,
    /// The string value of the context node is the only argument.
    StringValue,
}

#[derive(Debug)]
pub struct FunctionTable {
    functions: HashMap<&'static str, Vec<Signature<FunctionImpl>>>,
    operators: HashMap<&'static str, Vec<Signature<PrimOp>>>,
}

fn sig<T>(params: &[Type], result: Type, implementation: T) -> Signature<T> {
    Signature {
        params: params.to_vec(),
        result,
        implementation,
    }
}

impl FunctionTable {
    pub fn new() -> Self {
        let mut table = FunctionTable {
            functions: HashMap::new(),
            operators: HashMap::new(),
        };
        table.register_operators();
        table.register_functions();
        table
    }

    fn operator(&mut self, symbol: &'static str, signature: Signature<PrimOp>) {
        self.operators.entry(symbol).or_default().push(signature);
    }

    fn function(&mut self, name: &'static str, signature: Signature<FunctionImpl>) {
        self.functions.entry(name).or_default().push(signature);
    }

    fn register_operators(&mut self) {
        use Type::*;
        let arithmetic = [
            ("+", PrimOp::Add),
            ("-", PrimOp::Sub),
            ("*", PrimOp::Mul),
            ("%", PrimOp::Mod),
        ];
        for (symbol, op) in arithmetic {
            self.operator(symbol, sig(&[Real, Real], Real, op));
            self.operator(symbol, sig(&[Int, Int], Int, op));
        }
        self.operator("/", sig(&[Real, Real], Real, PrimOp::Div));
        let equality = [("=", PrimOp::Eq), ("!=", PrimOp::Ne)];
        for (symbol, op) in equality {
            self.operator(symbol, sig(&[Boolean, Boolean], Boolean, op));
            self.operator(symbol, sig(&[Real, Real], Boolean, op));
            self.operator(symbol, sig(&[Int, Int], Boolean, op));
            self.operator(symbol, sig(&[String, String], Boolean, op));
        }
        let relational = [
            ("<", PrimOp::Lt),
            ("<=", PrimOp::Le),
            (">", PrimOp::Gt),
            (">=", PrimOp::Ge),
        ];
        for (symbol, op) in relational {
            self.operator(symbol, sig(&[Real, Real], Boolean, op));
            self.operator(symbol, sig(&[Int, Int], Boolean, op));
        }
    }

    fn register_functions(&mut self) {
        use FunctionImpl as F;
        use Type::*;
        self.function("last", sig(&[], Int, F::Last));
        self.function("position", sig(&[], Int, F::Position));
        self.function("count", sig(&[NodeSet], Int, F::Builtin(Builtin::Count)));
        self.function("id", sig(&[NodeSet], NodeSet, F::Builtin(Builtin::Id)));
        self.function("id", sig(&[String], NodeSet, F::Builtin(Builtin::Id)));
        for (name, builtin) in [
            ("local-name", Builtin::LocalName),
            ("namespace-uri", Builtin::NamespaceUri),
            ("name", Builtin::Name),
            ("generate-id", Builtin::GenerateId),
        ] {
            self.function(name, sig(&[NodeSet], String, F::Builtin(builtin)));
        }
        self.function("string", sig(&[String], String, F::String));
        self.function("concat", sig(&[String, String], String, F::Concat));
        for (name, builtin) in [
            ("starts-with", Builtin::StartsWith),
            ("contains", Builtin::Contains),
        ] {
            self.function(name, sig(&[String, String], Boolean, F::Builtin(builtin)));
        }
        for (name, builtin) in [
            ("substring-before", Builtin::SubstringBefore),
            ("substring-after", Builtin::SubstringAfter),
        ] {
            self.function(name, sig(&[String, String], String, F::Builtin(builtin)));
        }
        self.function(
            "substring",
            sig(&[String, Real], String, F::Builtin(Builtin::Substring2)),
        );
        self.function(
            "substring",
            sig(&[String, Real, Real], String, F::Builtin(Builtin::Substring3)),
        );
        self.function(
            "string-length",
            sig(&[String], Int, F::Builtin(Builtin::StringLength)),
        );
        self.function(
            "normalize-space",
            sig(&[String], String, F::Builtin(Builtin::NormalizeSpace)),
        );
        self.function(
            "translate",
            sig(&[String, String, String], String, F::Builtin(Builtin::Translate)),
        );
        self.function("boolean", sig(&[Boolean], Boolean, F::Boolean));
        self.function("not", sig(&[Boolean], Boolean, F::Not));
        self.function("true", sig(&[], Boolean, F::True));
        self.function("false", sig(&[], Boolean, F::False));
        self.function("lang", sig(&[String], Boolean, F::Builtin(Builtin::Lang)));
        self.function("number", sig(&[Real], Real, F::Number));
        self.function("sum", sig(&[NodeSet], Real, F::Builtin(Builtin::Sum)));
        for (name, builtin) in [
            ("floor", Builtin::Floor),
            ("ceiling", Builtin::Ceiling),
            ("round", Builtin::Round),
        ] {
            self.function(name, sig(&[Real], Real, F::Builtin(builtin)));
        }
        self.function("key", sig(&[String, NodeSet], NodeSet, F::Builtin(Builtin::Key)));
        self.function("key", sig(&[String, String], NodeSet, F::Builtin(Builtin::Key)));
        self.function("current", sig(&[], Node, F::Current));
        self.function(
            "format-number",
            sig(&[Real, String], String, F::Builtin(Builtin::FormatNumber)),
        );
        self.function(
            "system-property",
            sig(&[String], String, F::Builtin(Builtin::SystemProperty)),
        );
        self.function(
            "unparsed-entity-uri",
            sig(&[String], String, F::Builtin(Builtin::UnparsedEntityUri)),
        );
        self.function(
            "element-available",
            sig(&[String], Boolean, F::Available { element: true }),
        );
        self.function(
            "function-available",
            sig(&[String], Boolean, F::Available { element: false }),
        );
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Whether a function of this name takes `arity` arguments.
    pub fn has_arity(&self, name: &str, arity: usize) -> bool {
        if name == "concat" {
            return arity >= 2;
        }
        if arity == 0 && self.context_argument(name) != ContextArgument::None {
            return true;
        }
        self.functions
            .get(name)
            .is_some_and(|signatures| signatures.iter().any(|s| s.params.len() == arity))
    }

    /// What a zero argument call of `name` implicitly passes.
    pub fn context_argument(&self, name: &str) -> ContextArgument {
        match name {
            "string" | "number" | "local-name" | "namespace-uri" | "name" | "generate-id" => {
                ContextArgument::Node
            }
            "string-length" | "normalize-space" => ContextArgument::StringValue,
            _ => ContextArgument::None,
        }
    }

    pub fn lookup_function(
        &self,
        name: &str,
        arguments: &[Type],
    ) -> Option<&Signature<FunctionImpl>> {
        lookup(self.functions.get(name)?, arguments)
    }

    pub fn lookup_operator(&self, symbol: &str, arguments: &[Type]) -> Option<&Signature<PrimOp>> {
        lookup(self.operators.get(symbol)?, arguments)
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a, T>(signatures: &'a [Signature<T>], arguments: &[Type]) -> Option<&'a Signature<T>> {
    let same_arity = || {
        signatures
            .iter()
            .filter(move |signature| signature.params.len() == arguments.len())
    };
    same_arity()
        .find(|signature| signature.params.as_slice() == arguments)
        .or_else(|| {
            same_arity().find(|signature| {
                signature
                    .params
                    .iter()
                    .zip(arguments)
                    .all(|(param, argument)| argument.can_convert_to(param))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_wins() {
        let table = FunctionTable::new();
        let signature = table
            .lookup_operator("+", &[Type::Int, Type::Int])
            .unwrap();
        assert_eq!(signature.result, Type::Int);
    }

    #[test]
    fn test_first_convertible_signature() {
        let table = FunctionTable::new();
        let signature = table
            .lookup_operator("+", &[Type::Int, Type::Real])
            .unwrap();
        assert_eq!(signature.params, vec![Type::Real, Type::Real]);
        let signature = table.lookup_function("id", &[Type::Node]).unwrap();
        assert_eq!(signature.params, vec![Type::NodeSet]);
        let signature = table.lookup_function("id", &[Type::Int]).unwrap();
        assert_eq!(signature.params, vec![Type::String]);
    }

    #[test]
    fn test_result_tree_does_not_match_node_set_parameter() {
        let table = FunctionTable::new();
        assert!(table.lookup_function("count", &[Type::ResultTree]).is_none());
    }

    #[test]
    fn test_arities() {
        let table = FunctionTable::new();
        assert!(table.has_arity("concat", 5));
        assert!(!table.has_arity("concat", 1));
        assert!(table.has_arity("name", 0));
        assert!(table.has_arity("substring", 3));
        assert!(!table.has_arity("substring", 4));
    }
}
