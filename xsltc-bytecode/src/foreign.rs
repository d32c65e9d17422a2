/// Host-side types foreign functions are declared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ForeignType {
    Boolean,
    BoxedBoolean,
    Double,
    /// A boxed number.
    BoxedDouble,
    Float,
    Long,
    Int,
    Short,
    Byte,
    Char,
    String,
    NodeList,
    Node,
    Object,
    Void,
    /// Any other host class, by name.
    Class(String),
}

impl ForeignType {
    pub fn name(&self) -> &str {
        match self {
            ForeignType::Boolean => "boolean",
            ForeignType::BoxedBoolean => "java.lang.Boolean",
            ForeignType::Double => "double",
            ForeignType::BoxedDouble => "java.lang.Double",
            ForeignType::Float => "float",
            ForeignType::Long => "long",
            ForeignType::Int => "int",
            ForeignType::Short => "short",
            ForeignType::Byte => "byte",
            ForeignType::Char => "char",
            ForeignType::String => "java.lang.String",
            ForeignType::NodeList => "org.w3c.dom.NodeList",
            ForeignType::Node => "org.w3c.dom.Node",
            ForeignType::Object => "java.lang.Object",
            ForeignType::Void => "void",
            ForeignType::Class(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ForeignType::Double
                | ForeignType::BoxedDouble
                | ForeignType::Float
                | ForeignType::Long
                | ForeignType::Int
                | ForeignType::Short
                | ForeignType::Byte
                | ForeignType::Char
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForeignCallKind {
    Static,
    /// The receiver is the first argument on the stack.
    Instance,
    Constructor,
}

/// A resolved foreign method or constructor, as the call site binds it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignMethodRef {
    pub class: String,
    pub method: String,
    pub kind: ForeignCallKind,
    pub params: Vec<ForeignType>,
    pub return_type: ForeignType,
}
