use xsltc_name::NamespaceLookup;
use xsltc_xpath::ast::ExprS;
use xsltc_xpath::{parse_expression, ParserError};

use crate::syntax::ast::{Avt, AvtPart};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AvtError {
    /// A `{` without its `}`, or a lone `}`.
    Unbalanced,
    XPath(ParserError),
}

impl From<ParserError> for AvtError {
    fn from(e: ParserError) -> Self {
        AvtError::XPath(e)
    }
}

/// Split an attribute value template into literal text and expressions.
/// `{{` and `}}` stand for literal braces.
pub(crate) fn parse_avt(
    value: &str,
    namespaces: impl NamespaceLookup + Copy,
) -> Result<Avt<ExprS>, AvtError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(AvtError::Unbalanced),
            '{' => {
                let mut expression = String::new();
                let mut quote = None;
                let mut closed = false;
                for c in chars.by_ref() {
                    match quote {
                        Some(q) if c == q => quote = None,
                        Some(_) => {}
                        None if c == '\'' || c == '"' => quote = Some(c),
                        None if c == '}' => {
                            closed = true;
                            break;
                        }
                        None => {}
                    }
                    expression.push(c);
                }
                if !closed {
                    return Err(AvtError::Unbalanced);
                }
                if !literal.is_empty() {
                    parts.push(AvtPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(AvtPart::Expr(parse_expression(&expression, namespaces)?));
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(AvtPart::Literal(literal));
    }
    Ok(parts)
}

/// The text of a template without expressions.
pub(crate) fn static_value<E>(avt: &Avt<E>) -> Option<String> {
    let mut value = String::new();
    for part in avt {
        match part {
            AvtPart::Literal(text) => value.push_str(text),
            AvtPart::Expr(_) => return None,
        }
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use xsltc_name::Namespaces;
    use xsltc_xpath::ast::Expr;

    use super::*;

    #[test]
    fn test_literal_and_expressions() {
        let namespaces = Namespaces::default();
        let avt = parse_avt("a{{b}}{@c}d", &namespaces).unwrap();
        assert_eq!(avt.len(), 3);
        assert_eq!(avt[0], AvtPart::Literal("a{b}".to_string()));
        assert!(matches!(&avt[1], AvtPart::Expr(e) if matches!(e.value, Expr::Path(_))));
        assert_eq!(avt[2], AvtPart::Literal("d".to_string()));
        assert_eq!(static_value(&avt), None);
    }

    #[test]
    fn test_brace_inside_string_literal() {
        let namespaces = Namespaces::default();
        let avt = parse_avt("{concat('}', 'x')}", &namespaces).unwrap();
        assert_eq!(avt.len(), 1);
    }

    #[test]
    fn test_unbalanced() {
        let namespaces = Namespaces::default();
        assert_eq!(parse_avt("{1", &namespaces), Err(AvtError::Unbalanced));
        assert_eq!(parse_avt("a}", &namespaces), Err(AvtError::Unbalanced));
    }
}
