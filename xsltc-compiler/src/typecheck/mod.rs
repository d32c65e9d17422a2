//! Type checking: resolves names, infers expression types and makes every
//! conversion explicit, producing a stylesheet over [`TExpr`].

mod expr;
mod foreign;
mod texpr;

use std::convert::Infallible;

use xsltc_xpath::ast::{ExprS, NodeTest};
use xsltc_xpath::pattern::{IdKeyPattern, Pattern, PatternAxis, PatternRoot};

use crate::context::CompilationContext;
use crate::dependency::TopLevel;
use crate::error::ErrorCode;
use crate::extension::ExtensionRegistry;
use crate::loader::Stylesheet;
use crate::symbols::{LocalBinding, SymbolTable};
use crate::syntax::{
    ApplyTemplates, AvtPart, Body, Instruction, KeyDecl, LiteralElement, Located, NameTemplate,
    NumberInstruction, Sort, Template, VariableDecl, VariableId, VariableValue, When, WithParam,
};
use crate::types::Type;

pub use texpr::{Comparison, PathStart, TExpr, TExprKind, TStep, VariableRef};
pub(crate) use texpr::pattern_step_spec;

/// Static type of a variable or parameter binding.
pub(crate) fn binding_type(decl: &VariableDecl<TExpr>) -> Type {
    if decl.is_param {
        return Type::Reference;
    }
    match &decl.value {
        VariableValue::Select(expr) => expr.ty.clone(),
        VariableValue::Content(_) => Type::ResultTree,
        VariableValue::Empty => Type::String,
    }
}

pub(crate) struct Checker<'a> {
    pub(crate) context: &'a mut CompilationContext,
    pub(crate) symbols: &'a mut SymbolTable,
    pub(crate) extensions: &'a ExtensionRegistry,
    line: Option<u32>,
    in_match_template: bool,
    in_key: bool,
    template_params: Vec<VariableId>,
}

impl<'a> Checker<'a> {
    pub(crate) fn new(
        context: &'a mut CompilationContext,
        symbols: &'a mut SymbolTable,
        extensions: &'a ExtensionRegistry,
    ) -> Self {
        Checker {
            context,
            symbols,
            extensions,
            line: None,
            in_match_template: false,
            in_key: false,
            template_params: Vec::new(),
        }
    }

    pub(crate) fn report(&mut self, code: ErrorCode, detail: impl Into<String>) {
        self.context.report(code, detail, self.line);
    }

    /// Check globals and keys in `order`, then every template.
    pub(crate) fn check(
        &mut self,
        stylesheet: &Stylesheet<ExprS>,
        order: &[TopLevel],
    ) -> Stylesheet<TExpr> {
        let mut globals = vec![None; stylesheet.globals.len()];
        let mut keys = vec![None; stylesheet.keys.len()];
        for item in order {
            match *item {
                TopLevel::Global(index) => {
                    globals[index] = Some(self.global(&stylesheet.globals[index]));
                }
                TopLevel::Key(index) => {
                    keys[index] = Some(self.key(&stylesheet.keys[index]));
                }
            }
        }
        let templates = stylesheet
            .templates
            .iter()
            .map(|template| self.template(template))
            .collect();
        log::debug!(
            "type checked {} templates with {} diagnostics so far",
            stylesheet.templates.len(),
            self.context.diagnostics.errors().count()
        );
        Stylesheet {
            templates,
            globals: globals.into_iter().flatten().collect(),
            keys: keys.into_iter().flatten().collect(),
            named: stylesheet.named.clone(),
            output: stylesheet.output.clone(),
        }
    }

    fn global(&mut self, decl: &VariableDecl<ExprS>) -> VariableDecl<TExpr> {
        self.line = decl.line;
        self.in_match_template = false;
        self.template_params.clear();
        let value = self.variable_value(&decl.value);
        let checked = VariableDecl {
            id: decl.id,
            name: decl.name.clone(),
            value,
            is_param: decl.is_param,
            precedence: decl.precedence,
            line: decl.line,
        };
        self.symbols
            .set_global_type(&decl.name, binding_type(&checked));
        checked
    }

    fn key(&mut self, decl: &KeyDecl<ExprS>) -> KeyDecl<TExpr> {
        self.line = decl.line;
        self.in_key = true;
        let pattern = self.pattern(&decl.pattern);
        let use_expr = self.expression(&decl.use_expr);
        self.in_key = false;
        KeyDecl {
            name: decl.name.clone(),
            pattern,
            use_expr,
            line: decl.line,
        }
    }

    fn template(&mut self, template: &Template<ExprS>) -> Template<TExpr> {
        self.line = template.line;
        self.in_match_template = template.pattern.is_some();
        let pattern = template.pattern.as_ref().map(|pattern| self.pattern(pattern));
        let mark = self.symbols.enter_scope();
        self.template_params.clear();
        let mut params = Vec::with_capacity(template.params.len());
        for param in &template.params {
            self.line = param.line;
            if self.symbols.bound_since(mark, &param.name) {
                self.report(ErrorCode::DuplicateVariable, param.name.to_lexical());
            }
            let value = self.variable_value(&param.value);
            self.symbols.declare_local(LocalBinding {
                name: param.name.clone(),
                id: param.id,
                ty: Type::Reference,
            });
            self.template_params.push(param.id);
            params.push(VariableDecl {
                id: param.id,
                name: param.name.clone(),
                value,
                is_param: true,
                precedence: param.precedence,
                line: param.line,
            });
        }
        let body = self.body(&template.body);
        self.symbols.leave_scope(mark);
        Template {
            pattern,
            name: template.name.clone(),
            mode: template.mode.clone(),
            priority: template.priority,
            params,
            body,
            precedence: template.precedence,
            import_min: template.import_min,
            position: template.position,
            line: template.line,
        }
    }

    pub(crate) fn pattern(&mut self, pattern: &Pattern<ExprS>) -> Pattern<TExpr> {
        self.register_pattern_names(pattern);
        let checked: Result<Pattern<TExpr>, Infallible> =
            pattern.try_map(&mut |predicate| Ok(self.predicate(predicate)));
        match checked {
            Ok(checked) => checked,
            Err(never) => match never {},
        }
    }

    /// Give every name a pattern tests a type id, and check key names.
    fn register_pattern_names(&mut self, pattern: &Pattern<ExprS>) {
        match pattern {
            Pattern::Alternative(left, right) => {
                self.register_pattern_names(left);
                self.register_pattern_names(right);
            }
            Pattern::IdKey(id_key) => self.check_key_name(id_key),
            Pattern::LocationPath(path) => {
                if let PatternRoot::IdKey(id_key) = &path.root {
                    self.check_key_name(id_key);
                }
                for step in &path.steps {
                    let attribute = step.axis == PatternAxis::Attribute;
                    match &step.node_test {
                        NodeTest::Name(name) if attribute => {
                            self.context.register_attribute(name);
                        }
                        NodeTest::Name(name) => {
                            self.context.register_element(name);
                        }
                        NodeTest::NamespaceWildcard(uri) => {
                            self.context.register_namespace_wildcard(uri, attribute);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn check_key_name(&mut self, id_key: &IdKeyPattern) {
        if let IdKeyPattern::Key(name, _) = id_key {
            if !self.symbols.has_key(name) {
                self.report(ErrorCode::UnresolvedKey, name.to_lexical());
            }
        }
    }

    fn variable_value(&mut self, value: &VariableValue<ExprS>) -> VariableValue<TExpr> {
        match value {
            VariableValue::Select(expr) => VariableValue::Select(self.expression(expr)),
            VariableValue::Content(body) => VariableValue::Content(self.body(body)),
            VariableValue::Empty => VariableValue::Empty,
        }
    }

    /// Check a sequence of instructions in a scope of its own.
    fn body(&mut self, body: &Body<ExprS>) -> Body<TExpr> {
        let mark = self.symbols.enter_scope();
        let checked = body
            .iter()
            .map(|instruction| self.instruction(instruction))
            .collect();
        self.symbols.leave_scope(mark);
        checked
    }

    fn local_variable(&mut self, decl: &VariableDecl<ExprS>) -> VariableDecl<TExpr> {
        let value = self.variable_value(&decl.value);
        let checked = VariableDecl {
            id: decl.id,
            name: decl.name.clone(),
            value,
            is_param: false,
            precedence: decl.precedence,
            line: decl.line,
        };
        let binding = LocalBinding {
            name: decl.name.clone(),
            id: decl.id,
            ty: binding_type(&checked),
        };
        if let Some(shadowed) = self.symbols.declare_local(binding) {
            if self.template_params.contains(&shadowed.id) {
                self.report(ErrorCode::DuplicateVariable, decl.name.to_lexical());
            } else {
                self.report(ErrorCode::ShadowedVariable, decl.name.to_lexical());
            }
        }
        checked
    }

    fn with_params(&mut self, params: &[WithParam<ExprS>]) -> Vec<WithParam<TExpr>> {
        params
            .iter()
            .map(|param| WithParam {
                name: param.name.clone(),
                value: self.variable_value(&param.value),
            })
            .collect()
    }

    fn sorts(&mut self, sorts: &[Sort<ExprS>]) -> Vec<Sort<TExpr>> {
        sorts
            .iter()
            .map(|sort| {
                let select = self.expression(&sort.select);
                let target = match sort.data_type {
                    xsltc_bytecode::SortDataType::Number => Type::Real,
                    xsltc_bytecode::SortDataType::Text => Type::String,
                };
                Sort {
                    select: self.convert(select, &target),
                    data_type: sort.data_type,
                    descending: sort.descending,
                    upper_first: sort.upper_first,
                    lang: sort.lang.clone(),
                }
            })
            .collect()
    }

    fn avt(&mut self, avt: &[AvtPart<ExprS>]) -> Vec<AvtPart<TExpr>> {
        avt.iter()
            .map(|part| match part {
                AvtPart::Literal(text) => AvtPart::Literal(text.clone()),
                AvtPart::Expr(expr) => {
                    let checked = self.expression(expr);
                    AvtPart::Expr(self.convert(checked, &Type::String))
                }
            })
            .collect()
    }

    fn name_template(&mut self, name: &NameTemplate<ExprS>) -> NameTemplate<TExpr> {
        match name {
            NameTemplate::Static(name) => NameTemplate::Static(name.clone()),
            NameTemplate::Dynamic { name, namespace } => NameTemplate::Dynamic {
                name: self.avt(name),
                namespace: namespace.as_ref().map(|namespace| self.avt(namespace)),
            },
        }
    }

    fn node_set(&mut self, expr: &ExprS) -> TExpr {
        let checked = self.expression(expr);
        self.convert(checked, &Type::NodeSet)
    }

    fn boolean(&mut self, expr: &ExprS) -> TExpr {
        let checked = self.expression(expr);
        self.convert(checked, &Type::Boolean)
    }

    fn instruction(
        &mut self,
        instruction: &Located<Instruction<ExprS>>,
    ) -> Located<Instruction<TExpr>> {
        if instruction.line.is_some() {
            self.line = instruction.line;
        }
        let checked = match &instruction.value {
            Instruction::ApplyTemplates(apply) => {
                Instruction::ApplyTemplates(ApplyTemplates {
                    select: apply.select.as_ref().map(|select| self.node_set(select)),
                    mode: apply.mode.clone(),
                    sorts: self.sorts(&apply.sorts),
                    params: self.with_params(&apply.params),
                })
            }
            Instruction::CallTemplate { name, params } => {
                if self.symbols.named_template(name).is_none() {
                    self.report(ErrorCode::UnresolvedTemplate, name.to_lexical());
                }
                Instruction::CallTemplate {
                    name: name.clone(),
                    params: self.with_params(params),
                }
            }
            Instruction::ApplyImports => {
                if !self.in_match_template {
                    self.report(
                        ErrorCode::MisplacedElement,
                        "xsl:apply-imports outside of a template rule",
                    );
                }
                Instruction::ApplyImports
            }
            Instruction::ForEach {
                select,
                sorts,
                body,
            } => Instruction::ForEach {
                select: self.node_set(select),
                sorts: self.sorts(sorts),
                body: self.body(body),
            },
            Instruction::If { test, body } => Instruction::If {
                test: self.boolean(test),
                body: self.body(body),
            },
            Instruction::Choose { whens, otherwise } => Instruction::Choose {
                whens: whens
                    .iter()
                    .map(|when| When {
                        test: self.boolean(&when.test),
                        body: self.body(&when.body),
                    })
                    .collect(),
                otherwise: otherwise.as_ref().map(|body| self.body(body)),
            },
            Instruction::ValueOf { select } => {
                let checked = self.expression(select);
                Instruction::ValueOf {
                    select: self.convert(checked, &Type::String),
                }
            }
            Instruction::Text(text) => Instruction::Text(text.clone()),
            Instruction::LiteralElement(element) => Instruction::LiteralElement(LiteralElement {
                name: element.name.clone(),
                attributes: element
                    .attributes
                    .iter()
                    .map(|(name, avt)| (name.clone(), self.avt(avt)))
                    .collect(),
                body: self.body(&element.body),
            }),
            Instruction::Element { name, body } => Instruction::Element {
                name: self.name_template(name),
                body: self.body(body),
            },
            Instruction::Attribute { name, body } => Instruction::Attribute {
                name: self.name_template(name),
                body: self.body(body),
            },
            Instruction::Comment(body) => Instruction::Comment(self.body(body)),
            Instruction::ProcessingInstruction { name, body } => {
                Instruction::ProcessingInstruction {
                    name: self.avt(name),
                    body: self.body(body),
                }
            }
            Instruction::Copy(body) => Instruction::Copy(self.body(body)),
            Instruction::CopyOf { select } => Instruction::CopyOf {
                select: self.expression(select),
            },
            Instruction::Variable(decl) => Instruction::Variable(self.local_variable(decl)),
            Instruction::Number(number) => Instruction::Number(NumberInstruction {
                level: number.level,
                count: number.count.as_ref().map(|pattern| self.pattern(pattern)),
                from: number.from.as_ref().map(|pattern| self.pattern(pattern)),
                value: number.value.as_ref().map(|value| {
                    let checked = self.expression(value);
                    self.convert(checked, &Type::Real)
                }),
                format: number.format.clone(),
                grouping_separator: number.grouping_separator.clone(),
                grouping_size: number.grouping_size,
            }),
            Instruction::Message { terminate, body } => Instruction::Message {
                terminate: *terminate,
                body: self.body(body),
            },
        };
        Located::new(checked, instruction.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::source::{StylesheetSource, XotSource};
    use crate::symbols::NamedTemplate;

    const XSL: &str = r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#;

    fn check(body: &str) -> (Stylesheet<TExpr>, CompilationContext) {
        let text = format!(
            r#"<xsl:stylesheet version="1.0" {}>{}</xsl:stylesheet>"#,
            XSL, body
        );
        let mut context = CompilationContext::new("T");
        let events = XotSource::new(text).events().unwrap();
        let stylesheet = Loader::new(&mut context, None).load(events).unwrap();
        let mut symbols = SymbolTable::new();
        for (index, global) in stylesheet.globals.iter().enumerate() {
            symbols.add_global(global.name.clone(), index as u16);
        }
        for key in &stylesheet.keys {
            symbols.add_key(key.name.clone());
        }
        for (name, index) in &stylesheet.named {
            symbols.add_named_template(
                name.clone(),
                NamedTemplate {
                    template: *index,
                    method: crate::symbols::template_method_name(name),
                    params: Vec::new(),
                    direct: true,
                },
            );
        }
        let order = crate::dependency::resolve_order(&stylesheet, &mut context);
        let extensions = ExtensionRegistry::new();
        let checked = Checker::new(&mut context, &mut symbols, &extensions).check(&stylesheet, &order);
        (checked, context)
    }

    fn codes(context: &CompilationContext) -> Vec<ErrorCode> {
        context
            .diagnostics
            .errors()
            .chain(context.diagnostics.warnings())
            .map(|diagnostic| diagnostic.code)
            .collect()
    }

    #[test]
    fn test_pattern_names_are_registered() {
        let (_, context) = check(r#"<xsl:template match="a/@b | ns:*" xmlns:ns="urn:ns"/>"#);
        let kinds = context
            .name_entries()
            .iter()
            .map(|entry| (entry.kind, entry.local.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                (xsltc_bytecode::NameKind::Element, "a".to_string()),
                (xsltc_bytecode::NameKind::Attribute, "b".to_string()),
                (xsltc_bytecode::NameKind::NamespaceWildcard, "*".to_string()),
            ]
        );
    }

    #[test]
    fn test_unresolved_names() {
        let (_, context) = check(
            r#"<xsl:template match="key('nokey', 'x')"><xsl:value-of select="$nothing"/><xsl:call-template name="nobody"/></xsl:template>"#,
        );
        assert_eq!(
            codes(&context),
            vec![
                ErrorCode::UnresolvedKey,
                ErrorCode::UnresolvedVariable,
                ErrorCode::UnresolvedTemplate
            ]
        );
    }

    #[test]
    fn test_shadowing() {
        let (_, context) = check(
            r#"<xsl:template match="a"><xsl:param name="p"/><xsl:variable name="v" select="1"/><xsl:for-each select="b"><xsl:variable name="v" select="2"/></xsl:for-each><xsl:variable name="p" select="3"/></xsl:template>"#,
        );
        assert_eq!(
            codes(&context),
            vec![ErrorCode::DuplicateVariable, ErrorCode::ShadowedVariable]
        );
    }

    #[test]
    fn test_sibling_scopes_do_not_shadow() {
        let (_, context) = check(
            r#"<xsl:template match="a"><xsl:if test="1"><xsl:variable name="v" select="1"/></xsl:if><xsl:if test="1"><xsl:variable name="v" select="2"/></xsl:if></xsl:template>"#,
        );
        assert!(codes(&context).is_empty());
    }

    #[test]
    fn test_apply_imports_in_named_template() {
        let (_, context) = check(r#"<xsl:template name="n"><xsl:apply-imports/></xsl:template>"#);
        assert_eq!(codes(&context), vec![ErrorCode::MisplacedElement]);
    }

    #[test]
    fn test_variables_in_keys() {
        let (_, context) = check(
            r#"<xsl:variable name="v" select="1"/><xsl:key name="k" match="a[$v]" use="@id"/>"#,
        );
        assert_eq!(codes(&context), vec![ErrorCode::VariableInKey]);
    }

    #[test]
    fn test_global_types_follow_values() {
        let (stylesheet, _) = check(
            r#"<xsl:variable name="s" select="'x'"/><xsl:variable name="t"><a/></xsl:variable><xsl:param name="p" select="1"/>"#,
        );
        let types = stylesheet
            .globals
            .iter()
            .map(binding_type)
            .collect::<Vec<_>>();
        assert_eq!(types, vec![Type::String, Type::ResultTree, Type::Reference]);
    }
}
