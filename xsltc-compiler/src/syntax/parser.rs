use std::str::FromStr;

use rust_decimal::Decimal;
use xsltc_bytecode::{NumberLevel, OutputProperties, SortDataType};
use xsltc_name::{QName, XSLT_NAMESPACE};
use xsltc_xpath::ast::{Expr, ExprS};
use xsltc_xpath::pattern::Pattern;
use xsltc_xpath::{parse_expression, parse_pattern, ParserError, Span, Spanned};

use crate::context::CompilationContext;
use crate::error::{CompileResult, ErrorCode};
use crate::source::SourceEvent;
use crate::syntax::ast::*;
use crate::syntax::avt::{parse_avt, static_value, AvtError};
use crate::syntax::tree::{build_tree, SourceElement, SourceNode};

type E = ExprS;

const UNSUPPORTED_DECLARATIONS: &[&str] = &[
    "attribute-set",
    "namespace-alias",
    "decimal-format",
    "strip-space",
    "preserve-space",
];

/// Functions whose first argument names something by QName.
const NAME_ARGUMENT_FUNCTIONS: &[&str] = &["key", "element-available", "function-available"];

/// Recursive descent over the element tree of one stylesheet.
pub(crate) struct StylesheetParser<'a> {
    context: &'a mut CompilationContext,
    forwards_compatible: bool,
}

fn dummy_expression() -> ExprS {
    Spanned::new(Expr::Literal(String::new()), Span::new(0, 0))
}

fn line_of(element: &SourceElement) -> Option<u32> {
    (element.line != 0).then_some(element.line)
}

impl<'a> StylesheetParser<'a> {
    pub(crate) fn new(context: &'a mut CompilationContext) -> Self {
        StylesheetParser {
            context,
            forwards_compatible: false,
        }
    }

    pub(crate) fn parse_module(
        &mut self,
        events: Vec<SourceEvent>,
        href: Option<&str>,
    ) -> CompileResult<Module<E>> {
        let Some(root) = build_tree(events) else {
            return Err(self.context.abort(
                ErrorCode::StylesheetParse,
                href.unwrap_or("stylesheet").to_string(),
                None,
            ));
        };
        if !(root.is_xsl("stylesheet") || root.is_xsl("transform")) {
            let simplified = root
                .attributes
                .iter()
                .any(|(name, _)| name.namespace() == Some(XSLT_NAMESPACE) && name.local_name() == "version");
            if simplified {
                return Err(self.context.abort(
                    ErrorCode::UnsupportedElement,
                    "literal result element as stylesheet",
                    line_of(&root),
                ));
            }
            return Err(self.context.abort(
                ErrorCode::NotAStylesheet,
                root.name.to_lexical(),
                line_of(&root),
            ));
        }
        self.check_attributes(
            &root,
            &[
                "version",
                "id",
                "extension-element-prefixes",
                "exclude-result-prefixes",
            ],
        );
        match self.required(&root, "version") {
            Some(version) => {
                self.forwards_compatible = match f64::from_str(version.trim()) {
                    Ok(number) => number > 1.0,
                    Err(_) => {
                        self.context.report(
                            ErrorCode::InvalidAttributeValue,
                            format!("version=\"{}\"", version),
                            line_of(&root),
                        );
                        false
                    }
                };
            }
            None => self.forwards_compatible = false,
        }
        log::debug!(
            "parsing stylesheet {} (forwards compatible: {})",
            href.unwrap_or("<principal>"),
            self.forwards_compatible
        );

        let mut module = Module {
            href: href.map(str::to_string),
            imports: Vec::new(),
            declarations: Vec::new(),
        };
        for child in &root.children {
            let element = match child {
                SourceNode::Element(element) => element,
                SourceNode::Text(text) => {
                    self.context.report(
                        ErrorCode::MisplacedElement,
                        format!("text \"{}\" at the top level", text.trim()),
                        line_of(&root),
                    );
                    continue;
                }
            };
            if !element.is_in_xsl_namespace() {
                // user defined top-level elements are allowed and ignored
                continue;
            }
            let line = line_of(element);
            match element.name.local_name() {
                "import" => {
                    self.check_attributes(element, &["href"]);
                    if !module.declarations.is_empty() {
                        self.context.report(
                            ErrorCode::MisplacedElement,
                            "xsl:import must come before all other declarations",
                            line,
                        );
                    }
                    if let Some(href) = self.required(element, "href") {
                        module.imports.push(Located::new(href.to_string(), line));
                    }
                }
                "include" => {
                    self.check_attributes(element, &["href"]);
                    if let Some(href) = self.required(element, "href") {
                        module
                            .declarations
                            .push(Declaration::Include(Located::new(href.to_string(), line)));
                    }
                }
                "template" => {
                    if let Some(template) = self.template(element)? {
                        module.declarations.push(Declaration::Template(template));
                    }
                }
                "variable" | "param" => {
                    let is_param = element.name.local_name() == "param";
                    if let Some(variable) = self.variable(element, is_param)? {
                        module.declarations.push(Declaration::Variable(variable));
                    }
                }
                "key" => {
                    if let Some(key) = self.key(element) {
                        module.declarations.push(Declaration::Key(key));
                    }
                }
                "output" => {
                    let output = self.output(element);
                    module.declarations.push(Declaration::Output(output));
                }
                local if UNSUPPORTED_DECLARATIONS.contains(&local) => {
                    self.context.report(
                        ErrorCode::UnsupportedElement,
                        format!("xsl:{}", local),
                        line,
                    );
                }
                local => self.unknown_element(local, line),
            }
        }
        Ok(module)
    }

    fn unknown_element(&mut self, local: &str, line: Option<u32>) {
        if self.forwards_compatible {
            self.context
                .report(ErrorCode::IgnoredElement, format!("xsl:{}", local), line);
        } else {
            self.context
                .report(ErrorCode::UnknownElement, format!("xsl:{}", local), line);
        }
    }

    fn check_attributes(&mut self, element: &SourceElement, allowed: &[&str]) {
        for (name, _) in &element.attributes {
            if name.namespace().is_none() && !allowed.contains(&name.local_name()) {
                self.context.report(
                    ErrorCode::SuperfluousAttribute,
                    format!(
                        "{} on xsl:{}",
                        name.local_name(),
                        element.name.local_name()
                    ),
                    line_of(element),
                );
            }
        }
    }

    fn required<'e>(&mut self, element: &'e SourceElement, name: &str) -> Option<&'e str> {
        let value = element.attribute(name);
        if value.is_none() {
            self.context.report(
                ErrorCode::MissingAttribute,
                format!("{} on xsl:{}", name, element.name.local_name()),
                line_of(element),
            );
        }
        value
    }

    fn parser_error(&mut self, error: ParserError, text: &str, line: Option<u32>) {
        match error {
            ParserError::UnknownPrefix { prefix, .. } => {
                self.context
                    .report(ErrorCode::UndeclaredPrefix, prefix, line)
            }
            other => self
                .context
                .report(ErrorCode::XPathParse, format!("{} in \"{}\"", other, text), line),
        }
    }

    fn expression(&mut self, element: &SourceElement, text: &str) -> ExprS {
        match parse_expression(text, &element.namespaces) {
            Ok(mut expr) => {
                self.expand_name_arguments(element, &mut expr);
                expr
            }
            Err(error) => {
                self.parser_error(error, text, line_of(element));
                dummy_expression()
            }
        }
    }

    fn required_expression(&mut self, element: &SourceElement, name: &str) -> ExprS {
        match self.required(element, name) {
            Some(text) => self.expression(element, text),
            None => dummy_expression(),
        }
    }

    fn pattern(&mut self, element: &SourceElement, text: &str) -> Option<Pattern<E>> {
        match parse_pattern(text, &element.namespaces) {
            Ok(mut pattern) => {
                self.expand_pattern_names(element, &mut pattern);
                Some(pattern)
            }
            Err(error) => {
                self.parser_error(error, text, line_of(element));
                None
            }
        }
    }

    fn expand_pattern_names(&mut self, element: &SourceElement, pattern: &mut Pattern<E>) {
        match pattern {
            Pattern::Alternative(left, right) => {
                self.expand_pattern_names(element, left);
                self.expand_pattern_names(element, right);
            }
            Pattern::IdKey(_) => {}
            Pattern::LocationPath(path) => {
                for step in &mut path.steps {
                    for predicate in &mut step.predicates {
                        self.expand_name_arguments(element, predicate);
                    }
                }
            }
        }
    }

    /// Replace literal QName arguments of `key()` and the availability
    /// functions by expanded names, while the prefixes are still known.
    fn expand_name_arguments(&mut self, element: &SourceElement, expr: &mut ExprS) {
        match &mut expr.value {
            Expr::Literal(_) | Expr::Number(_) | Expr::VarRef(_) => {}
            Expr::FunctionCall(call) => {
                if call.name.namespace().is_none()
                    && NAME_ARGUMENT_FUNCTIONS.contains(&call.name.local_name())
                {
                    if let Some(Expr::Literal(lexical)) =
                        call.arguments.first_mut().map(|argument| &mut argument.value)
                    {
                        match QName::parse(lexical.trim(), &element.namespaces) {
                            Ok(name) => *lexical = name.to_string(),
                            Err(xsltc_name::Error::MissingPrefix(prefix)) => self.context.report(
                                ErrorCode::UndeclaredPrefix,
                                prefix,
                                line_of(element),
                            ),
                        }
                    }
                }
                for argument in &mut call.arguments {
                    self.expand_name_arguments(element, argument);
                }
            }
            Expr::Binary(binary) => {
                self.expand_name_arguments(element, &mut binary.left);
                self.expand_name_arguments(element, &mut binary.right);
            }
            Expr::Negate(inner) => self.expand_name_arguments(element, inner),
            Expr::Filter(filter) => {
                self.expand_name_arguments(element, &mut filter.primary);
                for predicate in &mut filter.predicates {
                    self.expand_name_arguments(element, predicate);
                }
            }
            Expr::Path(path) => {
                if let xsltc_xpath::ast::PathStart::Expr(start) = &mut path.start {
                    self.expand_name_arguments(element, start);
                }
                for step in &mut path.steps {
                    for predicate in &mut step.predicates {
                        self.expand_name_arguments(element, predicate);
                    }
                }
            }
        }
    }

    fn qname(&mut self, element: &SourceElement, lexical: &str) -> Option<QName> {
        match QName::parse(lexical.trim(), &element.namespaces) {
            Ok(name) => Some(name),
            Err(xsltc_name::Error::MissingPrefix(prefix)) => {
                self.context
                    .report(ErrorCode::UndeclaredPrefix, prefix, line_of(element));
                None
            }
        }
    }

    fn optional_qname(&mut self, element: &SourceElement, attribute: &str) -> Option<QName> {
        let lexical = element.attribute(attribute)?;
        self.qname(element, lexical)
    }

    fn avt(&mut self, element: &SourceElement, text: &str) -> Avt<E> {
        match parse_avt(text, &element.namespaces) {
            Ok(mut avt) => {
                for part in &mut avt {
                    if let AvtPart::Expr(expr) = part {
                        self.expand_name_arguments(element, expr);
                    }
                }
                avt
            }
            Err(AvtError::Unbalanced) => {
                self.context.report(
                    ErrorCode::XPathParse,
                    format!("unbalanced braces in \"{}\"", text),
                    line_of(element),
                );
                Vec::new()
            }
            Err(AvtError::XPath(error)) => {
                self.parser_error(error, text, line_of(element));
                Vec::new()
            }
        }
    }

    /// An attribute that may not contain expressions.
    fn static_attribute(&mut self, element: &SourceElement, name: &str) -> Option<String> {
        let text = element.attribute(name)?;
        if text.contains('{') {
            let avt = self.avt(element, text);
            match static_value(&avt) {
                Some(value) => return Some(value),
                None => {
                    self.context.report(
                        ErrorCode::UnsupportedValueTemplate,
                        format!("{}=\"{}\"", name, text),
                        line_of(element),
                    );
                    return None;
                }
            }
        }
        Some(text.to_string())
    }

    fn yes_no(&mut self, element: &SourceElement, name: &str) -> Option<bool> {
        match element.attribute(name)? {
            "yes" => Some(true),
            "no" => Some(false),
            other => {
                self.context.report(
                    ErrorCode::InvalidAttributeValue,
                    format!("{}=\"{}\"", name, other),
                    line_of(element),
                );
                None
            }
        }
    }

    fn template(&mut self, element: &SourceElement) -> CompileResult<Option<Template<E>>> {
        self.check_attributes(element, &["match", "name", "mode", "priority"]);
        let line = line_of(element);
        let pattern = match element.attribute("match") {
            Some(text) => match self.pattern(element, text) {
                Some(pattern) => Some(pattern),
                None => return Ok(None),
            },
            None => None,
        };
        let name = self.optional_qname(element, "name");
        if pattern.is_none() && element.attribute("name").is_none() {
            self.context.report(
                ErrorCode::MissingAttribute,
                "match or name on xsl:template",
                line,
            );
            return Ok(None);
        }
        let mode = if pattern.is_some() {
            self.optional_qname(element, "mode")
        } else {
            None
        };
        let priority = match element.attribute("priority") {
            Some(text) => match Decimal::from_str(text.trim()) {
                Ok(priority) => Some(priority),
                Err(_) => {
                    self.context.report(
                        ErrorCode::InvalidAttributeValue,
                        format!("priority=\"{}\"", text),
                        line,
                    );
                    None
                }
            },
            None => None,
        };
        let mut params = Vec::new();
        let mut rest = Vec::new();
        let mut in_params = true;
        for child in &element.children {
            match child {
                SourceNode::Element(child_element) if child_element.is_xsl("param") && in_params => {
                    if let Some(param) = self.variable(child_element, true)? {
                        params.push(param);
                    }
                }
                other => {
                    in_params = false;
                    rest.push(other.clone());
                }
            }
        }
        let body = self.nodes(&rest)?;
        Ok(Some(Template {
            pattern,
            name,
            mode,
            priority,
            params,
            body,
            precedence: 0,
            import_min: 0,
            position: 0,
            line,
        }))
    }

    fn variable_value(
        &mut self,
        element: &SourceElement,
    ) -> CompileResult<VariableValue<E>> {
        let has_content = !element.children.is_empty();
        Ok(match element.attribute("select") {
            Some(text) => {
                if has_content {
                    self.context.report(
                        ErrorCode::MisplacedElement,
                        format!(
                            "content of xsl:{} with a select attribute",
                            element.name.local_name()
                        ),
                        line_of(element),
                    );
                }
                VariableValue::Select(self.expression(element, text))
            }
            None if has_content => VariableValue::Content(self.body(element)?),
            None => VariableValue::Empty,
        })
    }

    fn variable(
        &mut self,
        element: &SourceElement,
        is_param: bool,
    ) -> CompileResult<Option<VariableDecl<E>>> {
        self.check_attributes(element, &["name", "select"]);
        let Some(lexical) = self.required(element, "name") else {
            return Ok(None);
        };
        let Some(name) = self.qname(element, lexical) else {
            return Ok(None);
        };
        let value = self.variable_value(element)?;
        Ok(Some(VariableDecl {
            id: self.context.next_variable_id(),
            name,
            value,
            is_param,
            precedence: 0,
            line: line_of(element),
        }))
    }

    fn key(&mut self, element: &SourceElement) -> Option<KeyDecl<E>> {
        self.check_attributes(element, &["name", "match", "use"]);
        let name = self.required(element, "name");
        let match_text = self.required(element, "match");
        let use_text = self.required(element, "use");
        let name = self.qname(element, name?)?;
        let pattern = self.pattern(element, match_text?)?;
        let use_expr = self.expression(element, use_text?);
        Some(KeyDecl {
            name,
            pattern,
            use_expr,
            line: line_of(element),
        })
    }

    fn output(&mut self, element: &SourceElement) -> OutputProperties {
        self.check_attributes(
            element,
            &[
                "method",
                "version",
                "encoding",
                "omit-xml-declaration",
                "standalone",
                "doctype-public",
                "doctype-system",
                "cdata-section-elements",
                "indent",
                "media-type",
            ],
        );
        OutputProperties {
            method: element.attribute("method").map(str::to_string),
            encoding: element.attribute("encoding").map(str::to_string),
            indent: self.yes_no(element, "indent").unwrap_or(false),
            omit_xml_declaration: self.yes_no(element, "omit-xml-declaration"),
        }
    }

    fn body(&mut self, element: &SourceElement) -> CompileResult<Body<E>> {
        self.nodes(&element.children)
    }

    fn nodes(&mut self, nodes: &[SourceNode]) -> CompileResult<Body<E>> {
        let mut body = Vec::new();
        for node in nodes {
            match node {
                SourceNode::Text(text) => {
                    body.push(Located::new(Instruction::Text(text.clone()), None))
                }
                SourceNode::Element(element) => {
                    if element.is_in_xsl_namespace() {
                        body.extend(self.instruction(element)?);
                    } else {
                        let literal = self.literal_element(element)?;
                        body.push(Located::new(literal, line_of(element)));
                    }
                }
            }
        }
        Ok(body)
    }

    fn literal_element(&mut self, element: &SourceElement) -> CompileResult<Instruction<E>> {
        let mut attributes = Vec::new();
        for (name, value) in &element.attributes {
            if name.namespace() == Some(XSLT_NAMESPACE) {
                if name.local_name() == "use-attribute-sets" {
                    self.context.report(
                        ErrorCode::UnsupportedElement,
                        "xsl:use-attribute-sets",
                        line_of(element),
                    );
                }
                continue;
            }
            let avt = self.avt(element, value);
            attributes.push((name.clone(), avt));
        }
        Ok(Instruction::LiteralElement(LiteralElement {
            name: element.name.clone(),
            attributes,
            body: self.body(element)?,
        }))
    }

    /// Parse one XSLT instruction. Ignored instructions produce nothing;
    /// unknown ones under forwards-compatible processing produce their
    /// fallback.
    fn instruction(&mut self, element: &SourceElement) -> CompileResult<Vec<Located<Instruction<E>>>> {
        let line = line_of(element);
        let instruction = match element.name.local_name() {
            "apply-templates" => {
                self.check_attributes(element, &["select", "mode"]);
                let select = element
                    .attribute("select")
                    .map(|text| self.expression(element, text));
                let mode = self.optional_qname(element, "mode");
                let mut sorts = Vec::new();
                let mut params = Vec::new();
                for child in &element.children {
                    match child {
                        SourceNode::Element(child) if child.is_xsl("sort") => {
                            sorts.push(self.sort(child))
                        }
                        SourceNode::Element(child) if child.is_xsl("with-param") => {
                            if let Some(param) = self.with_param(child)? {
                                params.push(param);
                            }
                        }
                        _ => self.misplaced_child(element),
                    }
                }
                Instruction::ApplyTemplates(ApplyTemplates {
                    select,
                    mode,
                    sorts,
                    params,
                })
            }
            "call-template" => {
                self.check_attributes(element, &["name"]);
                let Some(lexical) = self.required(element, "name") else {
                    return Ok(Vec::new());
                };
                let Some(name) = self.qname(element, lexical) else {
                    return Ok(Vec::new());
                };
                let mut params = Vec::new();
                for child in &element.children {
                    match child {
                        SourceNode::Element(child) if child.is_xsl("with-param") => {
                            if let Some(param) = self.with_param(child)? {
                                params.push(param);
                            }
                        }
                        _ => self.misplaced_child(element),
                    }
                }
                Instruction::CallTemplate { name, params }
            }
            "apply-imports" => {
                self.check_attributes(element, &[]);
                Instruction::ApplyImports
            }
            "for-each" => {
                self.check_attributes(element, &["select"]);
                let select = self.required_expression(element, "select");
                let (sorts, rest) = self.leading_sorts(element);
                Instruction::ForEach {
                    select,
                    sorts,
                    body: self.nodes(&rest)?,
                }
            }
            "if" => {
                self.check_attributes(element, &["test"]);
                Instruction::If {
                    test: self.required_expression(element, "test"),
                    body: self.body(element)?,
                }
            }
            "choose" => {
                self.check_attributes(element, &[]);
                let mut whens = Vec::new();
                let mut otherwise = None;
                for child in &element.children {
                    match child {
                        SourceNode::Element(child) if child.is_xsl("when") && otherwise.is_none() => {
                            self.check_attributes(child, &["test"]);
                            whens.push(When {
                                test: self.required_expression(child, "test"),
                                body: self.body(child)?,
                            });
                        }
                        SourceNode::Element(child) if child.is_xsl("otherwise") && otherwise.is_none() => {
                            self.check_attributes(child, &[]);
                            otherwise = Some(self.body(child)?);
                        }
                        _ => self.misplaced_child(element),
                    }
                }
                if whens.is_empty() {
                    self.context.report(
                        ErrorCode::MissingAttribute,
                        "xsl:choose needs at least one xsl:when",
                        line,
                    );
                }
                Instruction::Choose { whens, otherwise }
            }
            "value-of" => {
                self.check_attributes(element, &["select", "disable-output-escaping"]);
                Instruction::ValueOf {
                    select: self.required_expression(element, "select"),
                }
            }
            "text" => {
                self.check_attributes(element, &["disable-output-escaping"]);
                let mut text = String::new();
                for child in &element.children {
                    match child {
                        SourceNode::Text(t) => text.push_str(t),
                        SourceNode::Element(_) => self.misplaced_child(element),
                    }
                }
                if text.is_empty() {
                    return Ok(Vec::new());
                }
                Instruction::Text(text)
            }
            "element" => {
                self.check_attributes(element, &["name", "namespace", "use-attribute-sets"]);
                if element.attribute("use-attribute-sets").is_some() {
                    self.context
                        .report(ErrorCode::UnsupportedElement, "use-attribute-sets", line);
                }
                let Some(name) = self.name_template(element, true) else {
                    return Ok(Vec::new());
                };
                Instruction::Element {
                    name,
                    body: self.body(element)?,
                }
            }
            "attribute" => {
                self.check_attributes(element, &["name", "namespace"]);
                let Some(name) = self.name_template(element, false) else {
                    return Ok(Vec::new());
                };
                Instruction::Attribute {
                    name,
                    body: self.body(element)?,
                }
            }
            "comment" => {
                self.check_attributes(element, &[]);
                Instruction::Comment(self.body(element)?)
            }
            "processing-instruction" => {
                self.check_attributes(element, &["name"]);
                let Some(text) = self.required(element, "name") else {
                    return Ok(Vec::new());
                };
                let name = self.avt(element, text);
                Instruction::ProcessingInstruction {
                    name,
                    body: self.body(element)?,
                }
            }
            "copy" => {
                self.check_attributes(element, &["use-attribute-sets"]);
                if element.attribute("use-attribute-sets").is_some() {
                    self.context
                        .report(ErrorCode::UnsupportedElement, "use-attribute-sets", line);
                }
                Instruction::Copy(self.body(element)?)
            }
            "copy-of" => {
                self.check_attributes(element, &["select"]);
                Instruction::CopyOf {
                    select: self.required_expression(element, "select"),
                }
            }
            "variable" => match self.variable(element, false)? {
                Some(variable) => Instruction::Variable(variable),
                None => return Ok(Vec::new()),
            },
            "number" => Instruction::Number(self.number(element)),
            "message" => {
                self.check_attributes(element, &["terminate"]);
                Instruction::Message {
                    terminate: self.yes_no(element, "terminate").unwrap_or(false),
                    body: self.body(element)?,
                }
            }
            "fallback" => return Ok(Vec::new()),
            local @ ("param" | "sort" | "with-param" | "when" | "otherwise" | "template"
            | "import" | "include" | "key" | "output") => {
                self.context.report(
                    ErrorCode::MisplacedElement,
                    format!("xsl:{}", local),
                    line,
                );
                return Ok(Vec::new());
            }
            local => {
                if self.forwards_compatible {
                    let mut fallback = Vec::new();
                    for child in element.child_elements() {
                        if child.is_xsl("fallback") {
                            fallback.extend(self.body(child)?);
                        }
                    }
                    if fallback.is_empty() {
                        self.context
                            .report(ErrorCode::IgnoredElement, format!("xsl:{}", local), line);
                    }
                    return Ok(fallback);
                }
                self.unknown_element(local, line);
                return Ok(Vec::new());
            }
        };
        Ok(vec![Located::new(instruction, line)])
    }

    fn misplaced_child(&mut self, element: &SourceElement) {
        self.context.report(
            ErrorCode::MisplacedElement,
            format!("content of xsl:{}", element.name.local_name()),
            line_of(element),
        );
    }

    fn leading_sorts(&mut self, element: &SourceElement) -> (Vec<Sort<E>>, Vec<SourceNode>) {
        let mut sorts = Vec::new();
        let mut rest = Vec::new();
        for child in &element.children {
            match child {
                SourceNode::Element(child_element) if child_element.is_xsl("sort") => {
                    if rest.is_empty() {
                        sorts.push(self.sort(child_element));
                    } else {
                        self.context.report(
                            ErrorCode::MisplacedElement,
                            "xsl:sort",
                            line_of(child_element),
                        );
                    }
                }
                other => rest.push(other.clone()),
            }
        }
        (sorts, rest)
    }

    fn with_param(&mut self, element: &SourceElement) -> CompileResult<Option<WithParam<E>>> {
        self.check_attributes(element, &["name", "select"]);
        let Some(lexical) = self.required(element, "name") else {
            return Ok(None);
        };
        let Some(name) = self.qname(element, lexical) else {
            return Ok(None);
        };
        Ok(Some(WithParam {
            name,
            value: self.variable_value(element)?,
        }))
    }

    fn sort(&mut self, element: &SourceElement) -> Sort<E> {
        self.check_attributes(
            element,
            &["select", "lang", "data-type", "order", "case-order"],
        );
        let select = match element.attribute("select") {
            Some(text) => self.expression(element, text),
            None => Spanned::new(Expr::context_item(), Span::new(0, 0)),
        };
        let data_type = match self.static_attribute(element, "data-type").as_deref() {
            Some("number") => SortDataType::Number,
            Some("text") | None => SortDataType::Text,
            Some(other) if other.contains(':') => SortDataType::Text,
            Some(other) => {
                self.context.report(
                    ErrorCode::InvalidAttributeValue,
                    format!("data-type=\"{}\"", other),
                    line_of(element),
                );
                SortDataType::Text
            }
        };
        let descending = match self.static_attribute(element, "order").as_deref() {
            Some("descending") => true,
            Some("ascending") | None => false,
            Some(other) => {
                self.context.report(
                    ErrorCode::InvalidAttributeValue,
                    format!("order=\"{}\"", other),
                    line_of(element),
                );
                false
            }
        };
        let upper_first = match self.static_attribute(element, "case-order").as_deref() {
            Some("upper-first") => Some(true),
            Some("lower-first") => Some(false),
            None => None,
            Some(other) => {
                self.context.report(
                    ErrorCode::InvalidAttributeValue,
                    format!("case-order=\"{}\"", other),
                    line_of(element),
                );
                None
            }
        };
        let lang = self.static_attribute(element, "lang");
        Sort {
            select,
            data_type,
            descending,
            upper_first,
            lang,
        }
    }

    fn number(&mut self, element: &SourceElement) -> NumberInstruction<E> {
        self.check_attributes(
            element,
            &[
                "level",
                "count",
                "from",
                "value",
                "format",
                "lang",
                "letter-value",
                "grouping-separator",
                "grouping-size",
            ],
        );
        let level = match element.attribute("level") {
            Some("multiple") => NumberLevel::Multiple,
            Some("any") => NumberLevel::Any,
            Some("single") | None => NumberLevel::Single,
            Some(other) => {
                self.context.report(
                    ErrorCode::InvalidAttributeValue,
                    format!("level=\"{}\"", other),
                    line_of(element),
                );
                NumberLevel::Single
            }
        };
        let count = element
            .attribute("count")
            .and_then(|text| self.pattern(element, text));
        let from = element
            .attribute("from")
            .and_then(|text| self.pattern(element, text));
        let value = element
            .attribute("value")
            .map(|text| self.expression(element, text));
        let format = self
            .static_attribute(element, "format")
            .unwrap_or_else(|| "1".to_string());
        let grouping_separator = self.static_attribute(element, "grouping-separator");
        let grouping_size = match self.static_attribute(element, "grouping-size") {
            Some(text) => match text.trim().parse::<u32>() {
                Ok(size) => Some(size),
                Err(_) => {
                    self.context.report(
                        ErrorCode::InvalidAttributeValue,
                        format!("grouping-size=\"{}\"", text),
                        line_of(element),
                    );
                    None
                }
            },
            None => None,
        };
        NumberInstruction {
            level,
            count,
            from,
            value,
            format,
            grouping_separator,
            grouping_size,
        }
    }

    /// The name of `xsl:element` or `xsl:attribute`. Only element names
    /// take the default namespace.
    fn name_template(
        &mut self,
        element: &SourceElement,
        is_element: bool,
    ) -> Option<NameTemplate<E>> {
        let text = self.required(element, "name")?;
        let name = self.avt(element, text);
        let namespace = element
            .attribute("namespace")
            .map(|text| self.avt(element, text));
        let static_name = static_value(&name);
        let static_namespace = namespace.as_ref().map(static_value);
        match (static_name, static_namespace) {
            (Some(lexical), None) => {
                let (prefix, local) = match lexical.split_once(':') {
                    Some((prefix, local)) => (Some(prefix), local),
                    None => (None, lexical.as_str()),
                };
                let name = match prefix {
                    Some(_) => self.qname(element, &lexical)?,
                    None if is_element => QName::new(
                        local.to_string(),
                        element.namespaces.default_element_namespace().map(str::to_string),
                        None,
                    ),
                    None => QName::unprefixed(local),
                };
                Some(NameTemplate::Static(name))
            }
            (Some(lexical), Some(Some(uri))) => {
                let (prefix, local) = match lexical.split_once(':') {
                    Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
                    None => (None, lexical),
                };
                Some(NameTemplate::Static(QName::new(local, Some(uri), prefix)))
            }
            _ => Some(NameTemplate::Dynamic { name, namespace }),
        }
    }
}
