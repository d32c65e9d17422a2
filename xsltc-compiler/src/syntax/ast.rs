//! Stylesheet syntax tree, generic over the expression type: parsing
//! produces `ExprS` expressions, type checking rebuilds the tree with typed
//! expressions.

use rust_decimal::Decimal;
use xsltc_bytecode::{NumberLevel, OutputProperties, SortDataType};
use xsltc_name::QName;
use xsltc_xpath::pattern::Pattern;

/// Identity of one variable or parameter binding. Two bindings with the
/// same name are still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    pub value: T,
    pub line: Option<u32>,
}

impl<T> Located<T> {
    pub fn new(value: T, line: Option<u32>) -> Self {
        Located { value, line }
    }
}

pub type Body<E> = Vec<Located<Instruction<E>>>;

/// One parsed stylesheet document. Includes are kept in place and spliced
/// when the import tree is flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct Module<E> {
    pub href: Option<String>,
    pub imports: Vec<Located<String>>,
    pub declarations: Vec<Declaration<E>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration<E> {
    Template(Template<E>),
    Variable(VariableDecl<E>),
    Key(KeyDecl<E>),
    Output(OutputProperties),
    Include(Located<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template<E> {
    pub pattern: Option<Pattern<E>>,
    pub name: Option<QName>,
    pub mode: Option<QName>,
    pub priority: Option<Decimal>,
    pub params: Vec<VariableDecl<E>>,
    pub body: Body<E>,
    /// Import precedence, assigned when the import tree is flattened.
    pub precedence: u32,
    /// Lowest precedence in the import subtree of the declaring
    /// stylesheet; `apply-imports` considers `[import_min, precedence)`.
    pub import_min: u32,
    /// Declaration order across all stylesheets.
    pub position: usize,
    pub line: Option<u32>,
}

impl<E> Template<E> {
    /// Named templates without a match pattern take their parameters as
    /// method arguments.
    pub fn takes_parameters_directly(&self) -> bool {
        self.name.is_some() && self.pattern.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue<E> {
    Select(E),
    Content(Body<E>),
    /// Neither `select` nor content: the empty string.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl<E> {
    pub id: VariableId,
    pub name: QName,
    pub value: VariableValue<E>,
    pub is_param: bool,
    pub precedence: u32,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyDecl<E> {
    pub name: QName,
    pub pattern: Pattern<E>,
    pub use_expr: E,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithParam<E> {
    pub name: QName,
    pub value: VariableValue<E>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort<E> {
    pub select: E,
    pub data_type: SortDataType,
    pub descending: bool,
    pub upper_first: Option<bool>,
    pub lang: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AvtPart<E> {
    Literal(String),
    Expr(E),
}

/// Attribute value template.
pub type Avt<E> = Vec<AvtPart<E>>;

#[derive(Debug, Clone, PartialEq)]
pub enum NameTemplate<E> {
    /// Known when compiling; the namespace is already resolved.
    Static(QName),
    Dynamic {
        name: Avt<E>,
        namespace: Option<Avt<E>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyTemplates<E> {
    pub select: Option<E>,
    pub mode: Option<QName>,
    pub sorts: Vec<Sort<E>>,
    pub params: Vec<WithParam<E>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct When<E> {
    pub test: E,
    pub body: Body<E>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralElement<E> {
    pub name: QName,
    pub attributes: Vec<(QName, Avt<E>)>,
    pub body: Body<E>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberInstruction<E> {
    pub level: NumberLevel,
    pub count: Option<Pattern<E>>,
    pub from: Option<Pattern<E>>,
    pub value: Option<E>,
    pub format: String,
    pub grouping_separator: Option<String>,
    pub grouping_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction<E> {
    ApplyTemplates(ApplyTemplates<E>),
    CallTemplate {
        name: QName,
        params: Vec<WithParam<E>>,
    },
    ApplyImports,
    ForEach {
        select: E,
        sorts: Vec<Sort<E>>,
        body: Body<E>,
    },
    If {
        test: E,
        body: Body<E>,
    },
    Choose {
        whens: Vec<When<E>>,
        otherwise: Option<Body<E>>,
    },
    ValueOf {
        select: E,
    },
    Text(String),
    LiteralElement(LiteralElement<E>),
    Element {
        name: NameTemplate<E>,
        body: Body<E>,
    },
    Attribute {
        name: NameTemplate<E>,
        body: Body<E>,
    },
    Comment(Body<E>),
    ProcessingInstruction {
        name: Avt<E>,
        body: Body<E>,
    },
    Copy(Body<E>),
    CopyOf {
        select: E,
    },
    Variable(VariableDecl<E>),
    Number(NumberInstruction<E>),
    Message {
        terminate: bool,
        body: Body<E>,
    },
}

impl<E> VariableValue<E> {
    pub fn body(&self) -> Option<&Body<E>> {
        match self {
            VariableValue::Content(body) => Some(body),
            _ => None,
        }
    }
}

impl<E> Instruction<E> {
    /// The instruction bodies directly nested in this instruction,
    /// including variable and parameter content.
    pub fn bodies(&self) -> Vec<&Body<E>> {
        match self {
            Instruction::ApplyTemplates(apply) => apply
                .params
                .iter()
                .filter_map(|param| param.value.body())
                .collect(),
            Instruction::CallTemplate { params, .. } => {
                params.iter().filter_map(|param| param.value.body()).collect()
            }
            Instruction::ForEach { body, .. }
            | Instruction::If { body, .. }
            | Instruction::Element { body, .. }
            | Instruction::Attribute { body, .. }
            | Instruction::Comment(body)
            | Instruction::ProcessingInstruction { body, .. }
            | Instruction::Copy(body)
            | Instruction::Message { body, .. } => vec![body],
            Instruction::LiteralElement(element) => vec![&element.body],
            Instruction::Choose { whens, otherwise } => whens
                .iter()
                .map(|when| &when.body)
                .chain(otherwise.iter())
                .collect(),
            Instruction::Variable(decl) => decl.value.body().into_iter().collect(),
            Instruction::ApplyImports
            | Instruction::ValueOf { .. }
            | Instruction::Text(_)
            | Instruction::CopyOf { .. }
            | Instruction::Number(_) => Vec::new(),
        }
    }
}

/// Visit every instruction of `body`, nested ones included, in document
/// order.
pub fn walk_body<'a, E>(body: &'a Body<E>, visit: &mut impl FnMut(&'a Instruction<E>)) {
    for instruction in body {
        visit(&instruction.value);
        for nested in instruction.value.bodies() {
            walk_body(nested, visit);
        }
    }
}
