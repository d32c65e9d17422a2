//! Orders global variables, parameters and keys so that everything is
//! initialized after what it depends on.

use xsltc_name::QName;
use xsltc_xpath::ast::{Expr, ExprS};
use xsltc_xpath::pattern::Pattern;

use crate::context::CompilationContext;
use crate::error::ErrorCode;
use crate::loader::Stylesheet;
use crate::syntax::{AvtPart, Body, Instruction, NameTemplate, VariableValue};

/// A top-level declaration that is initialized when the transformation
/// starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TopLevel {
    Global(usize),
    Key(usize),
}

#[derive(Debug, Default)]
struct References<'a> {
    variables: Vec<&'a QName>,
    /// Names of keys looked up with a literal name.
    keys: Vec<String>,
}

impl<'a> References<'a> {
    fn expression(&mut self, expr: &'a ExprS) {
        expr.value.variables(&mut self.variables);
        let mut calls = Vec::new();
        expr.value.function_calls(&mut calls);
        for call in calls {
            let is_key = call.name.namespace().is_none() && call.name.local_name() == "key";
            if let (true, Some(Expr::Literal(name))) =
                (is_key, call.arguments.first().map(|argument| &argument.value))
            {
                self.keys.push(name.clone());
            }
        }
    }

    fn pattern(&mut self, pattern: &'a Pattern<ExprS>) {
        for predicate in pattern.predicates() {
            self.expression(predicate);
        }
    }

    fn value(&mut self, value: &'a VariableValue<ExprS>) {
        match value {
            VariableValue::Select(expr) => self.expression(expr),
            VariableValue::Content(body) => self.body(body),
            VariableValue::Empty => {}
        }
    }

    fn avt(&mut self, avt: &'a [AvtPart<ExprS>]) {
        for part in avt {
            if let AvtPart::Expr(expr) = part {
                self.expression(expr);
            }
        }
    }

    fn name(&mut self, name: &'a NameTemplate<ExprS>) {
        if let NameTemplate::Dynamic { name, namespace } = name {
            self.avt(name);
            if let Some(namespace) = namespace {
                self.avt(namespace);
            }
        }
    }

    fn body(&mut self, body: &'a Body<ExprS>) {
        for instruction in body {
            match &instruction.value {
                Instruction::ApplyTemplates(apply) => {
                    if let Some(select) = &apply.select {
                        self.expression(select);
                    }
                    for sort in &apply.sorts {
                        self.expression(&sort.select);
                    }
                    for param in &apply.params {
                        self.value(&param.value);
                    }
                }
                Instruction::CallTemplate { params, .. } => {
                    for param in params {
                        self.value(&param.value);
                    }
                }
                Instruction::ApplyImports | Instruction::Text(_) => {}
                Instruction::ForEach {
                    select,
                    sorts,
                    body,
                } => {
                    self.expression(select);
                    for sort in sorts {
                        self.expression(&sort.select);
                    }
                    self.body(body);
                }
                Instruction::If { test, body } => {
                    self.expression(test);
                    self.body(body);
                }
                Instruction::Choose { whens, otherwise } => {
                    for when in whens {
                        self.expression(&when.test);
                        self.body(&when.body);
                    }
                    if let Some(otherwise) = otherwise {
                        self.body(otherwise);
                    }
                }
                Instruction::ValueOf { select } | Instruction::CopyOf { select } => {
                    self.expression(select)
                }
                Instruction::LiteralElement(element) => {
                    for (_, avt) in &element.attributes {
                        self.avt(avt);
                    }
                    self.body(&element.body);
                }
                Instruction::Element { name, body } | Instruction::Attribute { name, body } => {
                    self.name(name);
                    self.body(body);
                }
                Instruction::ProcessingInstruction { name, body } => {
                    self.avt(name);
                    self.body(body);
                }
                Instruction::Comment(body)
                | Instruction::Copy(body)
                | Instruction::Message { body, .. } => self.body(body),
                Instruction::Variable(decl) => self.value(&decl.value),
                Instruction::Number(number) => {
                    for pattern in [&number.count, &number.from].into_iter().flatten() {
                        self.pattern(pattern);
                    }
                    if let Some(value) = &number.value {
                        self.expression(value);
                    }
                }
            }
        }
    }
}

fn describe(stylesheet: &Stylesheet<ExprS>, item: TopLevel) -> String {
    match item {
        TopLevel::Global(index) => format!("${}", stylesheet.globals[index].name.to_lexical()),
        TopLevel::Key(index) => format!("key {}", stylesheet.keys[index].name.to_lexical()),
    }
}

/// Order globals and keys by their dependencies. Items caught in a cycle
/// are reported and appended in declaration order so that checking can
/// continue.
pub(crate) fn resolve_order(
    stylesheet: &Stylesheet<ExprS>,
    context: &mut CompilationContext,
) -> Vec<TopLevel> {
    let items = (0..stylesheet.globals.len())
        .map(TopLevel::Global)
        .chain((0..stylesheet.keys.len()).map(TopLevel::Key))
        .collect::<Vec<_>>();
    let dependencies = items
        .iter()
        .map(|item| {
            let mut references = References::default();
            match *item {
                TopLevel::Global(index) => references.value(&stylesheet.globals[index].value),
                TopLevel::Key(index) => {
                    let key = &stylesheet.keys[index];
                    references.pattern(&key.pattern);
                    references.expression(&key.use_expr);
                }
            }
            items
                .iter()
                .copied()
                .filter(|candidate| match *candidate {
                    TopLevel::Global(index) => references
                        .variables
                        .contains(&&stylesheet.globals[index].name),
                    TopLevel::Key(index) => references
                        .keys
                        .contains(&stylesheet.keys[index].name.to_string()),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut resolved: Vec<TopLevel> = Vec::with_capacity(items.len());
    let mut pending = (0..items.len()).collect::<Vec<_>>();
    loop {
        let before = pending.len();
        pending.retain(|&index| {
            let ready = dependencies[index]
                .iter()
                .all(|dependency| resolved.contains(dependency));
            if ready {
                resolved.push(items[index]);
            }
            !ready
        });
        if pending.is_empty() {
            break;
        }
        if pending.len() == before {
            let cycle = pending
                .iter()
                .map(|&index| describe(stylesheet, items[index]))
                .collect::<Vec<_>>();
            let line = match items[pending[0]] {
                TopLevel::Global(index) => stylesheet.globals[index].line,
                TopLevel::Key(index) => stylesheet.keys[index].line,
            };
            context.report(ErrorCode::CircularVariable, cycle.join(", "), line);
            resolved.extend(pending.iter().map(|&index| items[index]));
            break;
        }
    }
    log::trace!("initialization order {:?}", resolved);
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::source::{StylesheetSource, XotSource};

    fn order(body: &str) -> (Vec<String>, CompilationContext) {
        let text = format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
            body
        );
        let mut context = CompilationContext::new("T");
        let events = XotSource::new(text).events().unwrap();
        let stylesheet = Loader::new(&mut context, None).load(events).unwrap();
        let order = resolve_order(&stylesheet, &mut context)
            .into_iter()
            .map(|item| describe(&stylesheet, item))
            .collect();
        (order, context)
    }

    #[test]
    fn test_forward_references_are_initialized_first() {
        let (order, context) = order(
            r#"<xsl:variable name="a" select="$b + 1"/><xsl:variable name="b" select="$c"/><xsl:variable name="c" select="1"/>"#,
        );
        assert!(!context.diagnostics.has_errors());
        assert_eq!(order, vec!["$c", "$b", "$a"]);
    }

    #[test]
    fn test_variables_using_keys_come_after_them() {
        let (order, _) = order(
            r#"<xsl:variable name="v"><xsl:value-of select="key('k', 'x')"/></xsl:variable><xsl:key name="k" match="a" use="@id"/>"#,
        );
        assert_eq!(order, vec!["key k", "$v"]);
    }

    #[test]
    fn test_cycle_is_reported_once() {
        let (order, context) = order(
            r#"<xsl:variable name="a" select="$b"/><xsl:variable name="b" select="$a"/><xsl:variable name="c" select="2"/>"#,
        );
        let errors = context.diagnostics.errors().collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::CircularVariable);
        assert_eq!(errors[0].message, "$a, $b");
        assert_eq!(order, vec!["$c", "$a", "$b"]);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let (_, context) = order(r#"<xsl:variable name="a" select="$a"/>"#);
        assert_eq!(
            context.diagnostics.errors().next().map(|d| d.code),
            Some(ErrorCode::CircularVariable)
        );
    }
}
