//! Calls from a translet into host code.
//!
//! Extension functions are bound to [`ForeignMethodRef`]s at compile
//! time. At run time a [`ForeignBindings`] implementation receives the
//! converted arguments and produces the result.

use std::fmt;

use ahash::{HashMap, HashMapExt};
use xsltc_bytecode::{ForeignMethodRef, ForeignType};

use crate::dom::Dom;
use crate::value::Value;

pub type ForeignResult = std::result::Result<Value, String>;

pub trait ForeignBindings {
    /// Call `method`. `receiver` is set for instance methods. Arguments
    /// arrive converted to the parameter types of `method`.
    fn call(
        &self,
        dom: &Dom,
        method: &ForeignMethodRef,
        receiver: Option<&Value>,
        arguments: &[Value],
    ) -> ForeignResult;
}

/// No extension functions at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBindings;

impl ForeignBindings for NoBindings {
    fn call(
        &self,
        _dom: &Dom,
        method: &ForeignMethodRef,
        _receiver: Option<&Value>,
        _arguments: &[Value],
    ) -> ForeignResult {
        Err(format!("{}.{} is not bound", method.class, method.method))
    }
}

type ForeignFunction = Box<dyn Fn(&Dom, Option<&Value>, &[Value]) -> ForeignResult>;

/// Bindings made of closures, keyed by class and method name.
#[derive(Default)]
pub struct FunctionBindings {
    functions: HashMap<(String, String), ForeignFunction>,
}

impl FunctionBindings {
    pub fn new() -> Self {
        FunctionBindings {
            functions: HashMap::new(),
        }
    }

    pub fn with_function<F>(mut self, class: &str, method: &str, function: F) -> Self
    where
        F: Fn(&Dom, Option<&Value>, &[Value]) -> ForeignResult + 'static,
    {
        self.functions.insert(
            (class.to_string(), method.to_string()),
            Box::new(function),
        );
        self
    }
}

impl fmt::Debug for FunctionBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBindings")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ForeignBindings for FunctionBindings {
    fn call(
        &self,
        dom: &Dom,
        method: &ForeignMethodRef,
        receiver: Option<&Value>,
        arguments: &[Value],
    ) -> ForeignResult {
        let key = (method.class.clone(), method.method.clone());
        match self.functions.get(&key) {
            Some(function) => function(dom, receiver, arguments),
            None => Err(format!("{}.{} is not bound", method.class, method.method)),
        }
    }
}

/// Convert an argument to what a parameter of type `ty` expects.
pub(crate) fn argument(dom: &Dom, value: Value, ty: &ForeignType) -> Value {
    match ty {
        ty if ty.is_numeric() => {
            let number = value.to_number(dom);
            match ty {
                ForeignType::Double | ForeignType::BoxedDouble | ForeignType::Float => {
                    Value::Number(number)
                }
                _ if number.is_nan() => Value::Number(0.0),
                _ => Value::Number(number.trunc()),
            }
        }
        ForeignType::Boolean | ForeignType::BoxedBoolean => Value::Boolean(value.to_boolean()),
        ForeignType::String => Value::String(value.to_string_value(dom)),
        ForeignType::Node => match value.to_node() {
            Ok(Some(node)) => Value::Node(node),
            _ => Value::Null,
        },
        ForeignType::NodeList => match value.to_node_set() {
            Ok(nodes) => Value::NodeSet(nodes),
            Err(_) => value,
        },
        _ => value,
    }
}

/// Convert a result to the value a translet works with.
pub(crate) fn result(dom: &Dom, value: Value, ty: &ForeignType) -> Value {
    match ty {
        ForeignType::Void => Value::Null,
        ty if ty.is_numeric() => Value::Number(value.to_number(dom)),
        ForeignType::Boolean | ForeignType::BoxedBoolean => Value::Boolean(value.to_boolean()),
        ForeignType::String => Value::String(value.to_string_value(dom)),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use xsltc_bytecode::ForeignCallKind;

    use super::*;

    fn method(params: Vec<ForeignType>, return_type: ForeignType) -> ForeignMethodRef {
        ForeignMethodRef {
            class: "Calc".to_string(),
            method: "twice".to_string(),
            kind: ForeignCallKind::Static,
            params,
            return_type,
        }
    }

    #[test]
    fn test_function_bindings_dispatch_by_name() {
        let dom = Dom::parse("<a/>").unwrap();
        let bindings = FunctionBindings::new().with_function("Calc", "twice", |dom, _, args| {
            Ok(Value::Number(args[0].to_number(dom) * 2.0))
        });
        let twice = method(vec![ForeignType::Double], ForeignType::Double);
        let result = bindings
            .call(&dom, &twice, None, &[Value::Number(4.0)])
            .unwrap();
        assert_eq!(result.to_number(&dom), 8.0);
        let mut other = twice.clone();
        other.method = "thrice".to_string();
        assert!(bindings.call(&dom, &other, None, &[]).is_err());
        assert!(NoBindings.call(&dom, &twice, None, &[]).is_err());
    }

    #[test]
    fn test_integral_arguments_are_truncated() {
        let dom = Dom::parse("<a/>").unwrap();
        let converted = argument(&dom, Value::from("2.7"), &ForeignType::Int);
        assert_eq!(converted.to_number(&dom), 2.0);
        let converted = argument(&dom, Value::from("x"), &ForeignType::Long);
        assert_eq!(converted.to_number(&dom), 0.0);
        let converted = argument(&dom, Value::Number(1.0), &ForeignType::String);
        assert_eq!(converted.to_string_value(&dom), "1");
        assert!(result(&dom, Value::Number(1.0), &ForeignType::Void).is_null());
    }
}
