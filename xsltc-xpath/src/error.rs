use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParserError {
    #[error("unrecognized token")]
    InvalidToken { span: Span },
    #[error("unexpected {found}")]
    UnexpectedToken { span: Span, found: String },
    #[error("unexpected end of expression")]
    UnexpectedEnd { span: Span },
    #[error("undeclared namespace prefix '{prefix}'")]
    UnknownPrefix { span: Span, prefix: String },
    #[error("invalid pattern: {reason}")]
    InvalidPattern { span: Span, reason: &'static str },
}

impl ParserError {
    pub fn span(&self) -> Span {
        match self {
            Self::InvalidToken { span } => *span,
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEnd { span } => *span,
            Self::UnknownPrefix { span, .. } => *span,
            Self::InvalidPattern { span, .. } => *span,
        }
    }
}
