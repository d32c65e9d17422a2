use ordered_float::OrderedFloat;
use xsltc_name::{NamespaceLookup, QName};

use crate::ast::{
    Axis, BinaryExpr, BinaryOperator, Expr, ExprS, FilterExpr, FunctionCall, NodeTest, PathExpr,
    PathStart, Step,
};
use crate::error::ParserError;
use crate::lexer::{lexer, Token};
use crate::pattern::{
    IdKeyPattern, LocationPathPattern, Pattern, PatternAxis, PatternRoot, Separator, StepPattern,
};
use crate::span::{Span, Spanned};

type Result<T> = std::result::Result<T, ParserError>;

/// Parse an XPath 1.0 expression. Prefixes are resolved against
/// `namespaces`; unprefixed names are in no namespace.
pub fn parse_expression(input: &str, namespaces: impl NamespaceLookup) -> Result<ExprS> {
    let mut parser = Parser::new(input, namespaces)?;
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse an XSLT 1.0 match pattern.
pub fn parse_pattern(input: &str, namespaces: impl NamespaceLookup) -> Result<Pattern<ExprS>> {
    let mut parser = Parser::new(input, namespaces)?;
    let pattern = parser.pattern()?;
    parser.finish()?;
    Ok(pattern)
}

struct Parser<'a, N> {
    tokens: Vec<(Token<'a>, Span)>,
    position: usize,
    end: usize,
    namespaces: N,
}

impl<'a, N: NamespaceLookup> Parser<'a, N> {
    fn new(input: &'a str, namespaces: N) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut lex = lexer(input);
        while let Some(token) = lex.next() {
            let span: Span = lex.span().into();
            match token {
                Ok(token) => tokens.push((token, span)),
                Err(()) => return Err(ParserError::InvalidToken { span }),
            }
        }
        Ok(Parser {
            tokens,
            position: 0,
            end: input.len(),
            namespaces,
        })
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.position + offset).map(|(t, _)| t)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.position)
            .map(|(_, span)| *span)
            .unwrap_or(Span::new(self.end, self.end))
    }

    fn previous_end(&self) -> usize {
        if self.position == 0 {
            0
        } else {
            self.tokens[self.position - 1].1.end
        }
    }

    fn advance(&mut self) -> Result<(Token<'a>, Span)> {
        match self.tokens.get(self.position) {
            Some(entry) => {
                self.position += 1;
                Ok(entry.clone())
            }
            None => Err(self.unexpected()),
        }
    }

    fn eat(&mut self, token: &Token<'a>) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token<'a>) -> Result<Span> {
        if self.peek() == Some(&token) {
            let (_, span) = self.advance()?;
            Ok(span)
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ParserError {
        match self.tokens.get(self.position) {
            Some((token, span)) => ParserError::UnexpectedToken {
                span: *span,
                found: token.describe(),
            },
            None => ParserError::UnexpectedEnd {
                span: Span::new(self.end, self.end),
            },
        }
    }

    fn finish(&self) -> Result<()> {
        if self.position < self.tokens.len() {
            Err(self.unexpected())
        } else {
            Ok(())
        }
    }

    fn spanned(&self, value: Expr, start: usize) -> ExprS {
        Spanned::new(value, Span::new(start, self.previous_end()))
    }

    fn qname(&self, lexical: &str, span: Span) -> Result<QName> {
        QName::parse(lexical, &self.namespaces).map_err(|e| match e {
            xsltc_name::Error::MissingPrefix(prefix) => ParserError::UnknownPrefix { span, prefix },
        })
    }

    /// The first argument of `key()`, `element-available()` and
    /// `function-available()` is a QName resolved against the namespaces
    /// in scope here; a literal with a prefix becomes `Q{uri}local`.
    fn expand_name_argument(
        &self,
        function: &QName,
        arguments: &mut [ExprS],
        span: Span,
    ) -> Result<()> {
        if function.namespace().is_some()
            || !matches!(
                function.local_name(),
                "key" | "element-available" | "function-available"
            )
        {
            return Ok(());
        }
        if let Some(Expr::Literal(lexical)) = arguments.first().map(|argument| &argument.value) {
            if lexical.contains(':') {
                let expanded = self.qname(lexical, span)?.to_string();
                arguments[0].value = Expr::Literal(expanded);
            }
        }
        Ok(())
    }

    fn is_name_operator(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::NCName(n)) if *n == name)
    }

    // expressions, lowest precedence first

    fn expr(&mut self) -> Result<ExprS> {
        self.or_expr()
    }

    fn binary(&self, operator: BinaryOperator, left: ExprS, right: ExprS) -> ExprS {
        let span = left.span.join(right.span);
        Spanned::new(
            Expr::Binary(BinaryExpr {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            }),
            span,
        )
    }

    fn or_expr(&mut self) -> Result<ExprS> {
        let mut left = self.and_expr()?;
        while self.is_name_operator("or") {
            self.position += 1;
            let right = self.and_expr()?;
            left = self.binary(BinaryOperator::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<ExprS> {
        let mut left = self.equality_expr()?;
        while self.is_name_operator("and") {
            self.position += 1;
            let right = self.equality_expr()?;
            left = self.binary(BinaryOperator::And, left, right);
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> Result<ExprS> {
        let mut left = self.relational_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Equal) => BinaryOperator::Eq,
                Some(Token::NotEqual) => BinaryOperator::Ne,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.relational_expr()?;
            left = self.binary(operator, left, right);
        }
    }

    fn relational_expr(&mut self) -> Result<ExprS> {
        let mut left = self.additive_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::LessThan) => BinaryOperator::Lt,
                Some(Token::LessThanEqual) => BinaryOperator::Le,
                Some(Token::GreaterThan) => BinaryOperator::Gt,
                Some(Token::GreaterThanEqual) => BinaryOperator::Ge,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.additive_expr()?;
            left = self.binary(operator, left, right);
        }
    }

    fn additive_expr(&mut self) -> Result<ExprS> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Plus) => BinaryOperator::Add,
                Some(Token::Minus) => BinaryOperator::Sub,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.multiplicative_expr()?;
            left = self.binary(operator, left, right);
        }
    }

    fn multiplicative_expr(&mut self) -> Result<ExprS> {
        let mut left = self.unary_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Asterisk) => BinaryOperator::Mul,
                Some(Token::NCName("div")) => BinaryOperator::Div,
                Some(Token::NCName("mod")) => BinaryOperator::Mod,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.unary_expr()?;
            left = self.binary(operator, left, right);
        }
    }

    fn unary_expr(&mut self) -> Result<ExprS> {
        if self.peek() == Some(&Token::Minus) {
            let start = self.current_span().start;
            self.position += 1;
            let inner = self.unary_expr()?;
            return Ok(self.spanned(Expr::Negate(Box::new(inner)), start));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> Result<ExprS> {
        let mut left = self.path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.path_expr()?;
            left = self.binary(BinaryOperator::Union, left, right);
        }
        Ok(left)
    }

    fn is_node_type_call(&self) -> bool {
        matches!(
            (self.peek(), self.peek_at(1)),
            (Some(Token::NCName("node" | "text" | "comment" | "processing-instruction")), Some(Token::LeftParen))
        )
    }

    fn is_primary_start(&self) -> bool {
        match self.peek() {
            Some(Token::Dollar | Token::LeftParen | Token::Literal(_) | Token::Number(_)) => true,
            Some(Token::NCName(_) | Token::QName(_)) => {
                self.peek_at(1) == Some(&Token::LeftParen) && !self.is_node_type_call()
            }
            _ => false,
        }
    }

    fn is_step_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Dot
                    | Token::DotDot
                    | Token::At
                    | Token::Asterisk
                    | Token::PrefixWildcard(_)
                    | Token::NCName(_)
                    | Token::QName(_)
            )
        )
    }

    fn path_expr(&mut self) -> Result<ExprS> {
        let start = self.current_span().start;
        match self.peek() {
            Some(Token::Slash) => {
                self.position += 1;
                let mut steps = Vec::new();
                if self.is_step_start() {
                    self.relative_path(&mut steps)?;
                }
                Ok(self.spanned(
                    Expr::Path(PathExpr {
                        start: PathStart::Root,
                        steps,
                    }),
                    start,
                ))
            }
            Some(Token::DoubleSlash) => {
                self.position += 1;
                let mut steps = vec![Step::descendant_or_self()];
                self.relative_path(&mut steps)?;
                Ok(self.spanned(
                    Expr::Path(PathExpr {
                        start: PathStart::Root,
                        steps,
                    }),
                    start,
                ))
            }
            _ if self.is_primary_start() => {
                let filter = self.filter_expr()?;
                let mut steps = Vec::new();
                match self.peek() {
                    Some(Token::Slash) => {
                        self.position += 1;
                    }
                    Some(Token::DoubleSlash) => {
                        self.position += 1;
                        steps.push(Step::descendant_or_self());
                    }
                    _ => return Ok(filter),
                }
                self.relative_path(&mut steps)?;
                Ok(self.spanned(
                    Expr::Path(PathExpr {
                        start: PathStart::Expr(Box::new(filter)),
                        steps,
                    }),
                    start,
                ))
            }
            _ => {
                let mut steps = Vec::new();
                self.relative_path(&mut steps)?;
                Ok(self.spanned(
                    Expr::Path(PathExpr {
                        start: PathStart::Relative,
                        steps,
                    }),
                    start,
                ))
            }
        }
    }

    fn relative_path(&mut self, steps: &mut Vec<Step>) -> Result<()> {
        steps.push(self.step()?);
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.position += 1;
                }
                Some(Token::DoubleSlash) => {
                    self.position += 1;
                    steps.push(Step::descendant_or_self());
                }
                _ => return Ok(()),
            }
            steps.push(self.step()?);
        }
    }

    fn step(&mut self) -> Result<Step> {
        if self.eat(&Token::Dot) {
            return Ok(Step::new(Axis::Self_, NodeTest::Node));
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }
        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::NCName(name)), Some(Token::DoubleColon)) =
            (self.peek(), self.peek_at(1))
        {
            let span = self.current_span();
            let axis = Axis::from_name(name).ok_or_else(|| ParserError::UnexpectedToken {
                span,
                found: format!("axis '{}'", name),
            })?;
            self.position += 2;
            axis
        } else {
            Axis::Child
        };
        let node_test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(Step {
            axis,
            node_test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest> {
        if self.is_node_type_call() {
            let (token, _) = self.advance()?;
            let name = match token {
                Token::NCName(name) => name,
                _ => return Err(self.unexpected()),
            };
            self.expect(Token::LeftParen)?;
            let literal = if name == "processing-instruction" {
                match self.peek() {
                    Some(Token::Literal(literal)) => {
                        let literal = literal.to_string();
                        self.position += 1;
                        Some(literal)
                    }
                    _ => None,
                }
            } else {
                None
            };
            self.expect(Token::RightParen)?;
            return NodeTest::from_node_type(name, literal).ok_or_else(|| self.unexpected());
        }
        let (token, span) = self.advance()?;
        match token {
            Token::Asterisk => Ok(NodeTest::Wildcard),
            Token::PrefixWildcard(prefix) => {
                let namespace = self.namespaces.by_prefix(prefix).ok_or_else(|| {
                    ParserError::UnknownPrefix {
                        span,
                        prefix: prefix.to_string(),
                    }
                })?;
                Ok(NodeTest::NamespaceWildcard(namespace.to_string()))
            }
            Token::NCName(name) | Token::QName(name) => Ok(NodeTest::Name(self.qname(name, span)?)),
            _ => {
                self.position -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn predicates(&mut self) -> Result<Vec<ExprS>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LeftBracket) {
            predicates.push(self.expr()?);
            self.expect(Token::RightBracket)?;
        }
        Ok(predicates)
    }

    fn filter_expr(&mut self) -> Result<ExprS> {
        let start = self.current_span().start;
        let primary = self.primary_expr()?;
        let predicates = self.predicates()?;
        if predicates.is_empty() {
            Ok(primary)
        } else {
            Ok(self.spanned(
                Expr::Filter(FilterExpr {
                    primary: Box::new(primary),
                    predicates,
                }),
                start,
            ))
        }
    }

    fn primary_expr(&mut self) -> Result<ExprS> {
        let start = self.current_span().start;
        let (token, span) = self.advance()?;
        let value = match token {
            Token::Dollar => {
                let (token, span) = self.advance()?;
                match token {
                    Token::NCName(name) | Token::QName(name) => Expr::VarRef(self.qname(name, span)?),
                    _ => {
                        self.position -= 1;
                        return Err(self.unexpected());
                    }
                }
            }
            Token::LeftParen => {
                let inner = self.expr()?;
                self.expect(Token::RightParen)?;
                return Ok(Spanned::new(inner.value, Span::new(start, self.previous_end())));
            }
            Token::Literal(literal) => Expr::Literal(literal.to_string()),
            Token::Number(number) => Expr::Number(OrderedFloat(number)),
            Token::NCName(name) | Token::QName(name) => {
                let name = self.qname(name, span)?;
                self.expect(Token::LeftParen)?;
                let mut arguments = Vec::new();
                if !self.eat(&Token::RightParen) {
                    loop {
                        arguments.push(self.expr()?);
                        if self.eat(&Token::RightParen) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                self.expand_name_argument(&name, &mut arguments, span)?;
                Expr::FunctionCall(FunctionCall { name, arguments })
            }
            _ => {
                self.position -= 1;
                return Err(self.unexpected());
            }
        };
        Ok(self.spanned(value, start))
    }

    // patterns

    fn pattern(&mut self) -> Result<Pattern<ExprS>> {
        let mut pattern = self.location_path_pattern()?;
        while self.eat(&Token::Pipe) {
            let right = self.location_path_pattern()?;
            pattern = Pattern::Alternative(Box::new(pattern), Box::new(right));
        }
        Ok(pattern)
    }

    fn location_path_pattern(&mut self) -> Result<Pattern<ExprS>> {
        match self.peek() {
            Some(Token::Slash) => {
                self.position += 1;
                let mut steps = Vec::new();
                if self.is_step_start() {
                    self.relative_path_pattern(Separator::Parent, &mut steps)?;
                }
                Ok(Pattern::LocationPath(LocationPathPattern {
                    root: PatternRoot::Root,
                    steps,
                }))
            }
            Some(Token::DoubleSlash) => {
                self.position += 1;
                let mut steps = Vec::new();
                self.relative_path_pattern(Separator::Ancestor, &mut steps)?;
                Ok(Pattern::LocationPath(LocationPathPattern {
                    root: PatternRoot::Relative,
                    steps,
                }))
            }
            Some(Token::NCName("id" | "key")) if self.peek_at(1) == Some(&Token::LeftParen) => {
                let id_key = self.id_key_pattern()?;
                let separator = match self.peek() {
                    Some(Token::Slash) => Separator::Parent,
                    Some(Token::DoubleSlash) => Separator::Ancestor,
                    _ => return Ok(Pattern::IdKey(id_key)),
                };
                self.position += 1;
                let mut steps = Vec::new();
                self.relative_path_pattern(separator, &mut steps)?;
                Ok(Pattern::LocationPath(LocationPathPattern {
                    root: PatternRoot::IdKey(id_key),
                    steps,
                }))
            }
            _ => {
                let mut steps = Vec::new();
                self.relative_path_pattern(Separator::Parent, &mut steps)?;
                Ok(Pattern::LocationPath(LocationPathPattern {
                    root: PatternRoot::Relative,
                    steps,
                }))
            }
        }
    }

    fn literal(&mut self) -> Result<String> {
        match self.advance()? {
            (Token::Literal(literal), _) => Ok(literal.to_string()),
            _ => {
                self.position -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn id_key_pattern(&mut self) -> Result<IdKeyPattern> {
        let (token, _) = self.advance()?;
        self.expect(Token::LeftParen)?;
        let id_key = if token == Token::NCName("id") {
            IdKeyPattern::Id(self.literal()?)
        } else {
            let span = self.current_span();
            let name = self.literal()?;
            let name = self.qname(&name, span)?;
            self.expect(Token::Comma)?;
            IdKeyPattern::Key(name, self.literal()?)
        };
        self.expect(Token::RightParen)?;
        Ok(id_key)
    }

    fn relative_path_pattern(
        &mut self,
        first: Separator,
        steps: &mut Vec<StepPattern<ExprS>>,
    ) -> Result<()> {
        steps.push(self.step_pattern(first)?);
        loop {
            let separator = match self.peek() {
                Some(Token::Slash) => Separator::Parent,
                Some(Token::DoubleSlash) => Separator::Ancestor,
                _ => return Ok(()),
            };
            self.position += 1;
            steps.push(self.step_pattern(separator)?);
        }
    }

    fn step_pattern(&mut self, separator: Separator) -> Result<StepPattern<ExprS>> {
        let axis = if self.eat(&Token::At) {
            PatternAxis::Attribute
        } else if let (Some(Token::NCName(name)), Some(Token::DoubleColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = match *name {
                "child" => PatternAxis::Child,
                "attribute" => PatternAxis::Attribute,
                _ => {
                    return Err(ParserError::InvalidPattern {
                        span: self.current_span(),
                        reason: "only the child and attribute axes are allowed in patterns",
                    })
                }
            };
            self.position += 2;
            axis
        } else {
            PatternAxis::Child
        };
        let node_test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(StepPattern {
            axis,
            node_test,
            predicates,
            separator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsltc_name::Namespaces;

    fn namespaces() -> Namespaces {
        let mut namespaces = Namespaces::default();
        namespaces.add("x", "urn:x");
        namespaces
    }

    fn parse(input: &str) -> Expr {
        parse_expression(input, &namespaces()).unwrap().value
    }

    #[test]
    fn test_operator_names_in_operator_position() {
        let expr = parse("div div div");
        match expr {
            Expr::Binary(binary) => {
                assert_eq!(binary.operator, BinaryOperator::Div);
                assert!(matches!(binary.left.value, Expr::Path(_)));
                assert!(matches!(binary.right.value, Expr::Path(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        // `or` binds loosest, so the top node is the `or`
        match parse("1 = 1 and 2 or 3") {
            Expr::Binary(binary) => {
                assert_eq!(binary.operator, BinaryOperator::Or);
                match binary.left.value {
                    Expr::Binary(inner) => assert_eq!(inner.operator, BinaryOperator::And),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_abbreviated_path() {
        match parse("//a/@b") {
            Expr::Path(path) => {
                assert_eq!(path.start, PathStart::Root);
                assert_eq!(path.steps.len(), 3);
                assert_eq!(path.steps[0], Step::descendant_or_self());
                assert_eq!(path.steps[2].axis, Axis::Attribute);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_versus_node_type() {
        match parse("count(text())") {
            Expr::FunctionCall(call) => {
                assert_eq!(call.name, QName::unprefixed("count"));
                match &call.arguments[0].value {
                    Expr::Path(path) => assert_eq!(path.steps[0].node_test, NodeTest::Text),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_filter_then_path() {
        match parse("$v[1]/x:a") {
            Expr::Path(path) => {
                assert!(matches!(path.start, PathStart::Expr(_)));
                assert_eq!(
                    path.steps[0].node_test,
                    NodeTest::Name(QName::uri_qualified("urn:x", "a"))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_prefix() {
        let err = parse_expression("y:a", &namespaces()).unwrap_err();
        assert!(matches!(err, ParserError::UnknownPrefix { .. }));
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(parse_expression("1 2", &namespaces()).is_err());
    }

    #[test]
    fn test_pattern_alternatives() {
        let pattern = parse_pattern("a | b/c | /", &namespaces()).unwrap();
        let alternatives = pattern.alternatives();
        assert_eq!(alternatives.len(), 3);
        match alternatives[2] {
            Pattern::LocationPath(path) => assert!(path.is_root()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pattern_ancestor_separator() {
        match parse_pattern("a//b[@c]", &namespaces()).unwrap() {
            Pattern::LocationPath(path) => {
                assert_eq!(path.steps.len(), 2);
                assert_eq!(path.steps[1].separator, Separator::Ancestor);
                assert_eq!(path.steps[1].predicates.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pattern_id_key() {
        assert_eq!(
            parse_pattern("key('k', 'v')", &namespaces()).unwrap(),
            Pattern::IdKey(IdKeyPattern::Key(QName::unprefixed("k"), "v".to_string()))
        );
        match parse_pattern("id('x')/a", &namespaces()).unwrap() {
            Pattern::LocationPath(path) => {
                assert_eq!(path.root, PatternRoot::IdKey(IdKeyPattern::Id("x".to_string())))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_name_arguments_are_expanded() {
        match parse("key('x:k', 'v')") {
            Expr::FunctionCall(call) => {
                assert_eq!(call.arguments[0].value, Expr::Literal("Q{urn:x}k".to_string()))
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse("concat('x:k', 'v')") {
            Expr::FunctionCall(call) => {
                assert_eq!(call.arguments[0].value, Expr::Literal("x:k".to_string()))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pattern_rejects_other_axes() {
        let err = parse_pattern("ancestor::a", &namespaces()).unwrap_err();
        assert!(matches!(err, ParserError::InvalidPattern { .. }));
    }
}
