use std::fmt;

use strum::EnumMessage;
use strum_macros::{Display, EnumMessage};

/// How bad a diagnostic is. Anything but a warning prevents output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum Severity {
    Internal,
    Unsupported,
    Fatal,
    Error,
    Warning,
}

/// Compiler diagnostic code.
///
/// The first paragraph of each variant's documentation is its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumMessage)]
pub enum ErrorCode {
    /// Internal compiler error.
    ///
    /// An invariant of the compiler was violated.
    Internal,
    /// Method too large.
    ///
    /// A generated method exceeds the maximum code size or branch
    /// displacement.
    MethodTooLarge,

    /// Unsupported element.
    ///
    /// The stylesheet uses an XSLT element this compiler does not implement.
    UnsupportedElement,
    /// Unsupported function.
    ///
    /// The stylesheet calls a function this compiler does not implement.
    UnsupportedFunction,
    /// Unsupported attribute value template.
    ///
    /// An attribute that must be known at compile time contains an
    /// expression.
    UnsupportedValueTemplate,

    /// Stylesheet could not be parsed.
    ///
    /// The stylesheet is not well-formed XML.
    StylesheetParse,
    /// Stylesheet could not be resolved.
    ///
    /// An imported or included stylesheet could not be found.
    StylesheetNotFound,
    /// Not a stylesheet.
    ///
    /// The document element is not `xsl:stylesheet` or `xsl:transform`.
    NotAStylesheet,
    /// Circular import.
    ///
    /// A stylesheet imports or includes itself, directly or indirectly.
    CircularImport,
    /// Undeclared namespace prefix.
    ///
    /// A qualified name uses a prefix that has no namespace declaration in
    /// scope.
    UndeclaredPrefix,
    /// XPath syntax error.
    ///
    /// An expression or pattern is not valid XPath 1.0.
    XPathParse,

    /// Unknown XSLT element.
    ///
    /// An element in the XSLT namespace is not defined by XSLT 1.0.
    UnknownElement,
    /// Misplaced element.
    ///
    /// An XSLT element appears somewhere it is not allowed.
    MisplacedElement,
    /// Missing required attribute.
    ///
    /// An XSLT element lacks an attribute it requires.
    MissingAttribute,
    /// Invalid attribute value.
    ///
    /// An attribute has a value outside of its allowed set.
    InvalidAttributeValue,
    /// Invalid pattern.
    ///
    /// A match pattern cannot be used here.
    InvalidPattern,
    /// Unresolved variable.
    ///
    /// A variable reference does not refer to a variable or parameter in
    /// scope.
    UnresolvedVariable,
    /// Unresolved function.
    ///
    /// A function call does not refer to a known function with that number
    /// of arguments.
    UnresolvedFunction,
    /// Unresolved template.
    ///
    /// `xsl:call-template` names a template that does not exist.
    UnresolvedTemplate,
    /// Unresolved key.
    ///
    /// A key pattern names a key that is not declared.
    UnresolvedKey,
    /// Type error.
    ///
    /// No conversion exists between the type of an expression and the type
    /// required by its context.
    TypeCheck,
    /// Argument conversion error.
    ///
    /// No candidate of an extension function accepts the argument types.
    ArgumentConversion,
    /// Circular variable.
    ///
    /// Global variables or keys depend on each other.
    CircularVariable,
    /// Duplicate template.
    ///
    /// Two templates with the same name have the same import precedence.
    DuplicateTemplate,
    /// Duplicate variable.
    ///
    /// Two global variables with the same name have the same import
    /// precedence, or a local variable repeats a parameter of the same
    /// template.
    DuplicateVariable,
    /// Variable in key.
    ///
    /// The `match` or `use` attribute of `xsl:key` references a variable.
    VariableInKey,

    /// Ignored XSLT element.
    ///
    /// An unknown XSLT element was ignored under forwards-compatible
    /// processing.
    IgnoredElement,
    /// Superfluous attribute.
    ///
    /// An attribute is not allowed on this XSLT element and was ignored.
    SuperfluousAttribute,
    /// Shadowed variable.
    ///
    /// A local variable shadows another local variable of the same name.
    ShadowedVariable,
}

impl ErrorCode {
    pub fn severity(self) -> Severity {
        use ErrorCode::*;
        match self {
            Internal | MethodTooLarge => Severity::Internal,
            UnsupportedElement | UnsupportedFunction | UnsupportedValueTemplate => {
                Severity::Unsupported
            }
            StylesheetParse | StylesheetNotFound | NotAStylesheet | CircularImport
            | UndeclaredPrefix | XPathParse => Severity::Fatal,
            IgnoredElement | SuperfluousAttribute | ShadowedVariable => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn message(&self) -> &str {
        self.documentation_pieces().0
    }

    pub fn note(&self) -> &str {
        self.documentation_pieces().1
    }

    fn documentation_pieces(&self) -> (&str, &str) {
        if let Some(documentation) = self.get_documentation() {
            let mut pieces = documentation.splitn(2, "\n\n");
            let first = pieces.next().unwrap_or("");
            let second = pieces.next().unwrap_or("");
            (first, second)
        } else {
            ("", "")
        }
    }
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    /// Line in the stylesheet the problem was found on.
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, detail: impl Into<String>, line: Option<u32>) -> Self {
        Diagnostic {
            severity: code.severity(),
            code,
            message: detail.into(),
            line,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.code.message(), self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Marks a phase that stopped early. The diagnostic that caused it has
/// already been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abort;

pub type CompileResult<T> = Result<T, Abort>;

/// Append-only list of diagnostics for one compilation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, code: ErrorCode, detail: impl Into<String>, line: Option<u32>) {
        let diagnostic = Diagnostic::new(code, detail, line);
        log::debug!("diagnostic: {}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Record a diagnostic that ends the current phase.
    pub fn abort(&mut self, code: ErrorCode, detail: impl Into<String>, line: Option<u32>) -> Abort {
        self.report(code, detail, line);
        Abort
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|diagnostic| diagnostic.severity != Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|diagnostic| diagnostic.severity != Severity::Warning)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|diagnostic| diagnostic.severity == Severity::Warning)
    }

    pub fn into_parts(self) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
        self.entries
            .into_iter()
            .partition(|diagnostic| diagnostic.severity != Severity::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_message_from_documentation() {
        assert_eq!(ErrorCode::CircularVariable.message(), "Circular variable.");
        assert_eq!(
            ErrorCode::CircularVariable.note(),
            "Global variables or keys depend on each other."
        );
    }

    #[test]
    fn test_warnings_do_not_count_as_errors() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(ErrorCode::SuperfluousAttribute, "foo", Some(3));
        assert!(!diagnostics.has_errors());
        diagnostics.report(ErrorCode::UnresolvedVariable, "$x", None);
        assert!(diagnostics.has_errors());
        let (errors, warnings) = diagnostics.into_parts();
        assert_eq!(errors.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line, Some(3));
    }
}
