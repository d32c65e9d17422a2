use logos::{Lexer, Logos};

/// XPath 1.0 tokens. Operator names (`and`, `div`, ...), node types and
/// axis names lex as plain names; the parser tells them apart by position.
#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(subpattern name_start = r"[A-Za-z_\u{c0}-\u{d6}\u{d8}-\u{f6}\u{f8}-\u{2ff}\u{370}-\u{37d}\u{37f}-\u{1fff}\u{200c}-\u{200d}\u{2070}-\u{218f}\u{2c00}-\u{2fef}\u{3001}-\u{d7ff}\u{f900}-\u{fdfc}\u{fdf0}-\u{fffd}\u{10000}-\u{effff}]")]
#[logos(subpattern name_char = r"(?&name_start)|[\-\.0-9\u{b7}\u{300}-\u{36F}\u{203f}-\u{2040}]")]
#[logos(subpattern ncname = r"(?&name_start)(?&name_char)*")]
pub enum Token<'a> {
    #[regex(r"[0-9]+(\.[0-9]*)?|\.[0-9]+", number_literal)]
    Number(f64),
    #[regex(r#""[^"]*"|'[^']*'"#, string_literal)]
    Literal(&'a str),
    #[regex(r"(?&ncname)", priority = 2)]
    NCName(&'a str),
    #[regex(r"(?&ncname):(?&ncname)", priority = 3)]
    QName(&'a str),
    #[regex(r"(?&ncname):\*", prefix_wildcard, priority = 3)]
    PrefixWildcard(&'a str),

    #[token("$")]
    Dollar,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("@")]
    At,
    #[token(",")]
    Comma,
    #[token("::")]
    DoubleColon,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("|")]
    Pipe,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Asterisk,
    #[token("=")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("<")]
    LessThan,
    #[token("<=")]
    LessThanEqual,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanEqual,
}

fn number_literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn string_literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[1..slice.len() - 1]
}

fn prefix_wildcard<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[..slice.len() - 2]
}

pub fn lexer(input: &str) -> Lexer<'_, Token<'_>> {
    Token::lexer(input)
}

impl Token<'_> {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Literal(s) => format!("literal '{}'", s),
            Token::NCName(s) | Token::QName(s) => format!("name '{}'", s),
            Token::PrefixWildcard(s) => format!("'{}:*'", s),
            other => format!("{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        lexer(input).map(|t| t.unwrap()).collect()
    }

    #[test]
    fn test_axis_is_not_qname() {
        assert_eq!(
            tokens("child::foo"),
            vec![Token::NCName("child"), Token::DoubleColon, Token::NCName("foo")]
        );
    }

    #[test]
    fn test_qname_and_wildcard() {
        assert_eq!(
            tokens("x:foo | x:*"),
            vec![Token::QName("x:foo"), Token::Pipe, Token::PrefixWildcard("x")]
        );
    }

    #[test]
    fn test_numbers_and_literals() {
        assert_eq!(
            tokens("1.5 + .5 - 'a'"),
            vec![
                Token::Number(1.5),
                Token::Plus,
                Token::Number(0.5),
                Token::Minus,
                Token::Literal("a")
            ]
        );
    }

    #[test]
    fn test_dotdot() {
        assert_eq!(tokens("../a"), vec![Token::DotDot, Token::Slash, Token::NCName("a")]);
    }
}
