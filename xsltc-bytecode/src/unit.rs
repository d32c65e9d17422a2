use crate::constant::Constant;

/// Largest code array a single method may have.
pub const MAX_METHOD_SIZE: usize = 65535;
pub const MAX_BRANCH_OFFSET: isize = 32767;
pub const MIN_BRANCH_OFFSET: isize = -32768;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchTable {
    pub keys: Vec<i32>,
    /// Absolute code offsets, one per key.
    pub targets: Vec<u32>,
    pub default: u32,
}

impl SwitchTable {
    pub fn target(&self, key: i32) -> u32 {
        match self.keys.binary_search(&key) {
            Ok(index) => self.targets[index],
            Err(_) => self.default,
        }
    }
}

/// A local variable record with its liveness range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub name: String,
    pub slot: u16,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodGen {
    pub name: String,
    pub params: Vec<String>,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// Stylesheet line per code byte, 0 where unknown.
    pub lines: Vec<u32>,
    pub constants: Vec<Constant>,
    pub switch_tables: Vec<SwitchTable>,
    pub locals: Vec<LocalVariable>,
}

impl MethodGen {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn line_at(&self, offset: usize) -> Option<u32> {
        self.lines.get(offset).copied().filter(|line| *line != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldGen {
    pub name: String,
}

/// A generated unit: the translet itself or one of its helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassGen {
    pub name: String,
    pub superclass: Option<String>,
    pub fields: Vec<FieldGen>,
    pub methods: Vec<MethodGen>,
}

impl ClassGen {
    pub fn new(name: impl Into<String>, superclass: Option<String>) -> Self {
        ClassGen {
            name: name.into(),
            superclass,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Add a field, returning its index. Adding a name twice returns the
    /// existing index.
    pub fn define_field(&mut self, name: impl Into<String>) -> u16 {
        let name = name.into();
        if let Some(index) = self.field_index(&name) {
            return index;
        }
        self.fields.push(FieldGen { name });
        (self.fields.len() - 1) as u16
    }

    pub fn field_index(&self, name: &str) -> Option<u16> {
        self.fields
            .iter()
            .position(|field| field.name == name)
            .map(|index| index as u16)
    }

    pub fn define_method(&mut self, method: MethodGen) {
        self.methods.push(method);
    }

    pub fn method(&self, name: &str) -> Option<&MethodGen> {
        self.methods.iter().find(|method| method.name == name)
    }

    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|method| method.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Element,
    Attribute,
    /// `ns:*`
    NamespaceWildcard,
    /// `ns:@*`
    AttributeNamespaceWildcard,
}

/// A registered name. Its expanded type id is `NTYPES` plus its index in
/// [`Translet::names`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameEntry {
    pub kind: NameKind,
    pub namespace: Option<String>,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputProperties {
    pub method: Option<String>,
    pub encoding: Option<String>,
    pub indent: bool,
    pub omit_xml_declaration: Option<bool>,
}

/// Everything compilation produces for one stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translet {
    /// The main unit comes first, helper units follow.
    pub classes: Vec<ClassGen>,
    pub names: Vec<NameEntry>,
    /// Namespace id `i + 1` is `namespaces[i]`.
    pub namespaces: Vec<String>,
    pub output: OutputProperties,
}

impl Translet {
    pub fn main_class(&self) -> &ClassGen {
        &self.classes[0]
    }

    pub fn class(&self, name: &str) -> Option<&ClassGen> {
        self.classes.iter().find(|class| class.name == name)
    }

    pub fn class_index(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|class| class.name == name)
    }
}
