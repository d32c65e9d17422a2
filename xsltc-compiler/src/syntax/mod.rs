mod ast;
mod avt;
mod parser;
mod tree;

pub use ast::*;
pub(crate) use parser::StylesheetParser;
