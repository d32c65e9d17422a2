use std::fmt;

/// Something that went wrong while running a translet.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The source document could not be parsed.
    #[error("cannot parse source document: {0}")]
    Parse(String),
    /// `xsl:message terminate="yes"`.
    #[error("terminated by xsl:message: {0}")]
    Terminated(String),
    #[error("no unit named {0}")]
    UnknownClass(String),
    #[error("no method {1} in unit {0}")]
    UnknownMethod(String, String),
    #[error("invalid instruction at offset {0}")]
    InvalidInstruction(usize),
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("call stack overflow")]
    StackOverflow,
    #[error("no local in slot {0}")]
    InvalidLocal(u16),
    #[error("no constant {0}")]
    InvalidConstant(u16),
    #[error("no switch table {0}")]
    InvalidSwitch(u16),
    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
    /// A result tree fragment used where a node-set is needed.
    #[error("result tree fragments cannot be converted to node-sets")]
    ResultTreeToNodeSet,
    #[error("unbalanced output: {0}")]
    Output(String),
    #[error("no foreign binding for {0}")]
    UnboundForeign(String),
    #[error("foreign call {method} failed: {message}")]
    Foreign { method: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// An error with the method and code offset it was raised at.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedError {
    pub error: Error,
    /// The method that was running, as `unit.method`.
    pub method: Option<String>,
    pub offset: Option<usize>,
    /// Stylesheet line of the instruction, when known.
    pub line: Option<u32>,
}

impl SpannedError {
    pub fn new(error: Error) -> Self {
        SpannedError {
            error,
            method: None,
            offset: None,
            line: None,
        }
    }
}

impl From<Error> for SpannedError {
    fn from(error: Error) -> Self {
        SpannedError::new(error)
    }
}

impl fmt::Display for SpannedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(method) = &self.method {
            write!(f, " in {}", method)?;
        }
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        } else if let Some(offset) = self.offset {
            write!(f, " (offset {})", offset)?;
        }
        Ok(())
    }
}

impl std::error::Error for SpannedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type SpannedResult<T> = std::result::Result<T, SpannedError>;
