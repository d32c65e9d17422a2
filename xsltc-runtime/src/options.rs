use std::fmt;
use std::rc::Rc;

use crate::foreign::{ForeignBindings, NoBindings};
use crate::value::Value;

/// Settings for one transformation.
#[derive(Clone)]
pub struct TransformOptions {
    /// Values for global parameters, by expanded name (`local` or
    /// `Q{uri}local`).
    pub(crate) params: Vec<(String, Value)>,
    pub(crate) bindings: Rc<dyn ForeignBindings>,
}

impl TransformOptions {
    pub fn new() -> Self {
        TransformOptions {
            params: Vec::new(),
            bindings: Rc::new(NoBindings),
        }
    }

    /// Pass a global parameter. A later value for the same name wins.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.params.retain(|(existing, _)| *existing != name);
        self.params.push((name, value.into()));
        self
    }

    pub fn bindings(mut self, bindings: impl ForeignBindings + 'static) -> Self {
        self.bindings = Rc::new(bindings);
        self
    }

    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformOptions")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_param_wins() {
        let options = TransformOptions::new().param("a", 1.0).param("a", "two");
        assert_eq!(options.params().len(), 1);
        assert!(matches!(&options.params()[0].1, Value::String(s) if s == "two"));
    }
}
