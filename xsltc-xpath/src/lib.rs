pub mod ast;
mod error;
mod lexer;
mod parser;
pub mod pattern;
mod span;

pub use error::ParserError;
pub use lexer::{lexer, Token};
pub use parser::{parse_expression, parse_pattern};
pub use pattern::Pattern;
pub use span::{Span, Spanned};
