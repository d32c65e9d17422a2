use ahash::{HashMap, HashMapExt};
use xsltc_bytecode::ForeignType;

const OBJECT_CLASS: &str = "java.lang.Object";

/// A method a foreign class exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignMethod {
    pub name: String,
    pub is_static: bool,
    pub params: Vec<ForeignType>,
    pub return_type: ForeignType,
}

/// Compile-time description of a foreign class. Methods and constructors
/// keep their declaration order, which decides ties during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignClass {
    pub name: String,
    pub supertypes: Vec<String>,
    pub constructors: Vec<Vec<ForeignType>>,
    pub methods: Vec<ForeignMethod>,
}

impl ForeignClass {
    pub fn new(name: &str) -> Self {
        ForeignClass {
            name: name.to_string(),
            supertypes: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_supertype(mut self, supertype: &str) -> Self {
        self.supertypes.push(supertype.to_string());
        self
    }

    pub fn with_constructor(mut self, params: Vec<ForeignType>) -> Self {
        self.constructors.push(params);
        self
    }

    pub fn with_static_method(
        mut self,
        name: &str,
        params: Vec<ForeignType>,
        return_type: ForeignType,
    ) -> Self {
        self.methods.push(ForeignMethod {
            name: name.to_string(),
            is_static: true,
            params,
            return_type,
        });
        self
    }

    pub fn with_method(
        mut self,
        name: &str,
        params: Vec<ForeignType>,
        return_type: ForeignType,
    ) -> Self {
        self.methods.push(ForeignMethod {
            name: name.to_string(),
            is_static: false,
            params,
            return_type,
        });
        self
    }

    pub fn methods_named<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = &'a ForeignMethod> + 'a {
        let name = name.to_string();
        self.methods.iter().filter(move |method| method.name == name)
    }
}

/// The foreign classes a stylesheet may bind to.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    classes: HashMap<String, ForeignClass>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        ExtensionRegistry {
            classes: HashMap::new(),
        }
    }

    pub fn register(&mut self, class: ForeignClass) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn with_class(mut self, class: ForeignClass) -> Self {
        self.register(class);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ForeignClass> {
        self.classes.get(name)
    }

    /// Whether a value of class `from` may be passed where `to` is
    /// expected.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == OBJECT_CLASS {
            return true;
        }
        let mut pending = vec![from.to_string()];
        let mut seen = Vec::new();
        while let Some(current) = pending.pop() {
            if seen.contains(&current) {
                continue;
            }
            if let Some(class) = self.classes.get(&current) {
                for supertype in &class.supertypes {
                    if supertype == to {
                        return true;
                    }
                    pending.push(supertype.clone());
                }
            }
            seen.push(current);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignable_through_supertypes() {
        let registry = ExtensionRegistry::new()
            .with_class(ForeignClass::new("a.Base"))
            .with_class(ForeignClass::new("a.Mid").with_supertype("a.Base"))
            .with_class(ForeignClass::new("a.Leaf").with_supertype("a.Mid"));
        assert!(registry.is_assignable("a.Leaf", "a.Base"));
        assert!(registry.is_assignable("a.Leaf", "java.lang.Object"));
        assert!(!registry.is_assignable("a.Base", "a.Leaf"));
    }
}
