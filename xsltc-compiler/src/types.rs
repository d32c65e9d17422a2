use std::fmt;

use xsltc_bytecode::ForeignType;

use crate::extension::ExtensionRegistry;

/// Static type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Boolean,
    /// A number, the XPath default.
    Real,
    /// A number known to be integral, such as `position()` or a literal
    /// without a fraction. Only foreign binding tells it apart from `Real`.
    Int,
    String,
    NodeSet,
    Node,
    ResultTree,
    /// Any value; conversions are checked at run time.
    Reference,
    /// A foreign object of the named class.
    Object(String),
}

impl Type {
    pub fn is_number(&self) -> bool {
        matches!(self, Type::Real | Type::Int)
    }

    /// Whether general comparison has to treat the value as nodes.
    pub fn is_node_like(&self) -> bool {
        matches!(self, Type::NodeSet | Type::Node | Type::ResultTree)
    }

    /// Whether a value of this type may be implicitly converted to
    /// `target`.
    pub fn can_convert_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            (_, Type::Reference) => true,
            (Type::Reference, _) => true,
            (Type::Real, Type::Int) | (Type::Int, Type::Real) => true,
            (Type::Object(_), Type::String) => true,
            (Type::Object(_), _) => false,
            (_, Type::Boolean | Type::Real | Type::Int | Type::String) => true,
            (Type::Node | Type::Void, Type::NodeSet) => true,
            (Type::NodeSet, Type::Node) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Boolean => write!(f, "boolean"),
            Type::Real => write!(f, "real"),
            Type::Int => write!(f, "int"),
            Type::String => write!(f, "string"),
            Type::NodeSet => write!(f, "node-set"),
            Type::Node => write!(f, "node"),
            Type::ResultTree => write!(f, "result-tree"),
            Type::Reference => write!(f, "reference"),
            Type::Object(class) => write!(f, "object({})", class),
        }
    }
}

fn mapped_distance(from: &Type, to: &ForeignType) -> Option<u32> {
    use ForeignType::*;
    let table: &[(ForeignType, u32)] = match from {
        Type::Boolean => &[(Boolean, 0), (BoxedBoolean, 1), (Object, 2)],
        Type::Real => &[
            (Double, 0),
            (BoxedDouble, 1),
            (Float, 2),
            (Long, 3),
            (Int, 4),
            (Short, 5),
            (Byte, 6),
            (Char, 7),
            (Object, 8),
        ],
        Type::Int => &[
            (Int, 0),
            (Short, 1),
            (Double, 2),
            (BoxedDouble, 3),
            (Float, 4),
            (Long, 5),
            (Byte, 6),
            (Char, 7),
            (Object, 8),
        ],
        Type::String => &[(String, 0), (Object, 1)],
        Type::NodeSet | Type::Node | Type::ResultTree => {
            &[(NodeList, 0), (Node, 1), (Object, 2), (String, 3)]
        }
        Type::Reference | Type::Object(_) => &[(Object, 0)],
        Type::Void => &[],
    };
    table
        .iter()
        .find(|(foreign, _)| foreign == to)
        .map(|(_, distance)| *distance)
}

/// How natural it is to pass a value of internal type `from` as foreign
/// type `to`. `None` means it cannot be passed at all.
pub fn foreign_distance(from: &Type, to: &ForeignType, registry: &ExtensionRegistry) -> Option<u32> {
    if let Some(distance) = mapped_distance(from, to) {
        return Some(distance);
    }
    match from {
        // checked when the call happens
        Type::Reference => Some(1),
        Type::Object(class) => {
            let target = to.name();
            if class == target {
                Some(0)
            } else if registry.is_assignable(class, target) {
                Some(1)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// The internal type a foreign result is seen as.
pub fn internal_type(foreign: &ForeignType) -> Type {
    match foreign {
        ForeignType::Boolean | ForeignType::BoxedBoolean => Type::Boolean,
        ForeignType::Double
        | ForeignType::BoxedDouble
        | ForeignType::Float
        | ForeignType::Long
        | ForeignType::Int
        | ForeignType::Short
        | ForeignType::Byte
        | ForeignType::Char => Type::Real,
        ForeignType::String => Type::String,
        ForeignType::NodeList | ForeignType::Node => Type::NodeSet,
        ForeignType::Object => Type::Reference,
        ForeignType::Void => Type::Void,
        ForeignType::Class(name) => Type::Object(name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ForeignClass;

    #[test]
    fn test_number_distances() {
        let registry = ExtensionRegistry::new();
        assert_eq!(foreign_distance(&Type::Real, &ForeignType::Double, &registry), Some(0));
        assert_eq!(foreign_distance(&Type::Real, &ForeignType::Int, &registry), Some(4));
        assert_eq!(foreign_distance(&Type::Int, &ForeignType::Int, &registry), Some(0));
        assert_eq!(foreign_distance(&Type::Int, &ForeignType::Double, &registry), Some(2));
        assert_eq!(foreign_distance(&Type::Real, &ForeignType::String, &registry), None);
    }

    #[test]
    fn test_node_distances() {
        let registry = ExtensionRegistry::new();
        for ty in [Type::NodeSet, Type::Node, Type::ResultTree] {
            assert_eq!(foreign_distance(&ty, &ForeignType::NodeList, &registry), Some(0));
            assert_eq!(foreign_distance(&ty, &ForeignType::String, &registry), Some(3));
        }
    }

    #[test]
    fn test_object_distances() {
        let registry = ExtensionRegistry::new()
            .with_class(ForeignClass::new("p.Base"))
            .with_class(ForeignClass::new("p.Sub").with_supertype("p.Base"));
        let sub = Type::Object("p.Sub".to_string());
        let class = |name: &str| ForeignType::Class(name.to_string());
        assert_eq!(foreign_distance(&sub, &class("p.Sub"), &registry), Some(0));
        assert_eq!(foreign_distance(&sub, &class("p.Base"), &registry), Some(1));
        assert_eq!(foreign_distance(&sub, &class("p.Other"), &registry), None);
        assert_eq!(foreign_distance(&sub, &ForeignType::Object, &registry), Some(0));
        assert_eq!(
            foreign_distance(&Type::Reference, &class("p.Other"), &registry),
            Some(1)
        );
    }

    #[test]
    fn test_result_tree_never_becomes_node_set() {
        assert!(!Type::ResultTree.can_convert_to(&Type::NodeSet));
        assert!(Type::ResultTree.can_convert_to(&Type::String));
        assert!(Type::Reference.can_convert_to(&Type::NodeSet));
        assert!(!Type::String.can_convert_to(&Type::NodeSet));
    }

    #[test]
    fn test_foreign_results() {
        assert_eq!(internal_type(&ForeignType::Int), Type::Real);
        assert_eq!(internal_type(&ForeignType::Object), Type::Reference);
        assert_eq!(
            internal_type(&ForeignType::Class("p.Sub".to_string())),
            Type::Object("p.Sub".to_string())
        );
    }
}
