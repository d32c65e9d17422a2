//! Loads the principal stylesheet with its imports and includes, and
//! flattens them into one list of declarations with import precedences.

use std::rc::Rc;

use ahash::{HashMap, HashMapExt};
use xsltc_bytecode::OutputProperties;
use xsltc_name::QName;
use xsltc_xpath::ast::ExprS;

use crate::context::CompilationContext;
use crate::error::{CompileResult, ErrorCode};
use crate::source::{SourceEvent, StylesheetResolver, StylesheetSource, XotSource};
use crate::syntax::{
    Declaration, KeyDecl, Located, Module, StylesheetParser, Template, VariableDecl,
};

/// All declarations of a stylesheet and its imports. Templates are in
/// declaration order; their positions count up in that order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Stylesheet<E> {
    pub(crate) templates: Vec<Template<E>>,
    /// Winning global variables and parameters, in declaration order.
    pub(crate) globals: Vec<VariableDecl<E>>,
    pub(crate) keys: Vec<KeyDecl<E>>,
    /// For each template name, the index of the template that wins.
    pub(crate) named: HashMap<QName, usize>,
    pub(crate) output: OutputProperties,
}

impl<E> Stylesheet<E> {
    pub(crate) fn empty() -> Self {
        Stylesheet {
            templates: Vec::new(),
            globals: Vec::new(),
            keys: Vec::new(),
            named: HashMap::new(),
            output: OutputProperties::default(),
        }
    }
}

pub(crate) struct Loader<'a> {
    context: &'a mut CompilationContext,
    resolver: Option<Rc<dyn StylesheetResolver>>,
    /// hrefs of the stylesheets being loaded, for cycle detection.
    loading: Vec<String>,
    next_precedence: u32,
    stylesheet: Stylesheet<ExprS>,
    global_precedence: HashMap<QName, (u32, usize)>,
    named_precedence: HashMap<QName, u32>,
}

impl<'a> Loader<'a> {
    pub(crate) fn new(
        context: &'a mut CompilationContext,
        resolver: Option<Rc<dyn StylesheetResolver>>,
    ) -> Self {
        Loader {
            context,
            resolver,
            loading: Vec::new(),
            next_precedence: 1,
            stylesheet: Stylesheet::empty(),
            global_precedence: HashMap::new(),
            named_precedence: HashMap::new(),
        }
    }

    pub(crate) fn load(mut self, events: Vec<SourceEvent>) -> CompileResult<Stylesheet<ExprS>> {
        let module = StylesheetParser::new(self.context).parse_module(events, None)?;
        self.process(module)?;
        log::debug!(
            "loaded {} templates, {} globals, {} keys",
            self.stylesheet.templates.len(),
            self.stylesheet.globals.len(),
            self.stylesheet.keys.len()
        );
        Ok(self.stylesheet)
    }

    fn parse_href(&mut self, href: &Located<String>) -> CompileResult<Module<ExprS>> {
        if self.loading.contains(&href.value) {
            return Err(self.context.abort(
                ErrorCode::CircularImport,
                href.value.clone(),
                href.line,
            ));
        }
        let text = self
            .resolver
            .as_ref()
            .and_then(|resolver| resolver.resolve(&href.value));
        let Some(text) = text else {
            return Err(self.context.abort(
                ErrorCode::StylesheetNotFound,
                href.value.clone(),
                href.line,
            ));
        };
        let events = XotSource::new(text).events().map_err(|e| {
            self.context.abort(
                ErrorCode::StylesheetParse,
                format!("{}: {}", href.value, e),
                href.line,
            )
        })?;
        StylesheetParser::new(self.context).parse_module(events, Some(&href.value))
    }

    /// Replace includes by the declarations of the included modules,
    /// collecting the imports of every module involved.
    fn splice_includes(
        &mut self,
        module: Module<ExprS>,
        imports: &mut Vec<Located<String>>,
        declarations: &mut Vec<Declaration<ExprS>>,
    ) -> CompileResult<()> {
        imports.extend(module.imports);
        for declaration in module.declarations {
            match declaration {
                Declaration::Include(href) => {
                    let included = self.parse_href(&href)?;
                    self.loading.push(href.value.clone());
                    let result = self.splice_includes(included, imports, declarations);
                    self.loading.pop();
                    result?;
                }
                other => declarations.push(other),
            }
        }
        Ok(())
    }

    fn process(&mut self, module: Module<ExprS>) -> CompileResult<()> {
        let import_min = self.next_precedence;
        let mut imports = Vec::new();
        let mut declarations = Vec::new();
        if let Some(href) = &module.href {
            self.loading.push(href.clone());
        }
        let href = module.href.clone();
        self.splice_includes(module, &mut imports, &mut declarations)?;
        for import in imports {
            let imported = self.parse_href(&import)?;
            self.process(imported)?;
        }
        let precedence = self.next_precedence;
        self.next_precedence += 1;
        log::trace!(
            "precedence {} (imports from {}) for {}",
            precedence,
            import_min,
            href.as_deref().unwrap_or("<principal>")
        );
        for declaration in declarations {
            self.declare(declaration, precedence, import_min);
        }
        if href.is_some() {
            self.loading.pop();
        }
        Ok(())
    }

    fn declare(&mut self, declaration: Declaration<ExprS>, precedence: u32, import_min: u32) {
        match declaration {
            Declaration::Template(mut template) => {
                template.precedence = precedence;
                template.import_min = import_min;
                template.position = self.stylesheet.templates.len();
                let index = self.stylesheet.templates.len();
                if let Some(name) = template.name.clone() {
                    match self.named_precedence.get(&name) {
                        Some(existing) if *existing == precedence => self.context.report(
                            ErrorCode::DuplicateTemplate,
                            name.to_lexical(),
                            template.line,
                        ),
                        _ => {
                            self.named_precedence.insert(name.clone(), precedence);
                            self.stylesheet.named.insert(name, index);
                        }
                    }
                }
                self.stylesheet.templates.push(template);
            }
            Declaration::Variable(mut variable) => {
                variable.precedence = precedence;
                match self.global_precedence.get(&variable.name) {
                    Some((existing, _)) if *existing == precedence => self.context.report(
                        ErrorCode::DuplicateVariable,
                        variable.name.to_lexical(),
                        variable.line,
                    ),
                    Some((_, index)) => {
                        // an importing stylesheet overrides
                        let index = *index;
                        self.global_precedence
                            .insert(variable.name.clone(), (precedence, index));
                        self.stylesheet.globals[index] = variable;
                    }
                    None => {
                        let index = self.stylesheet.globals.len();
                        self.global_precedence
                            .insert(variable.name.clone(), (precedence, index));
                        self.stylesheet.globals.push(variable);
                    }
                }
            }
            Declaration::Key(key) => self.stylesheet.keys.push(key),
            Declaration::Output(output) => {
                let merged = &mut self.stylesheet.output;
                if output.method.is_some() {
                    merged.method = output.method;
                }
                if output.encoding.is_some() {
                    merged.encoding = output.encoding;
                }
                if output.omit_xml_declaration.is_some() {
                    merged.omit_xml_declaration = output.omit_xml_declaration;
                }
                merged.indent = merged.indent || output.indent;
            }
            Declaration::Include(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;
    use crate::source::MemoryResolver;

    const XSL: &str = r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#;

    fn stylesheet(body: &str) -> String {
        format!(r#"<xsl:stylesheet version="1.0" {}>{}</xsl:stylesheet>"#, XSL, body)
    }

    fn load(
        principal: &str,
        resolver: MemoryResolver,
    ) -> (CompileResult<Stylesheet<ExprS>>, Diagnostics) {
        let mut context = CompilationContext::new("T");
        let events = XotSource::new(principal).events().unwrap();
        let result = Loader::new(&mut context, Some(Rc::new(resolver))).load(events);
        (result, context.diagnostics)
    }

    #[test]
    fn test_imports_get_lower_precedence() {
        let resolver = MemoryResolver::new()
            .with("a.xsl", &stylesheet(r#"<xsl:import href="b.xsl"/><xsl:template match="a"/>"#))
            .with("b.xsl", &stylesheet(r#"<xsl:template match="b"/>"#))
            .with("c.xsl", &stylesheet(r#"<xsl:template match="c"/>"#));
        let principal = stylesheet(
            r#"<xsl:import href="a.xsl"/><xsl:import href="c.xsl"/><xsl:template match="p"/>"#,
        );
        let (result, diagnostics) = load(&principal, resolver);
        assert!(!diagnostics.has_errors());
        let stylesheet = result.unwrap();
        let summary = stylesheet
            .templates
            .iter()
            .map(|t| (t.precedence, t.import_min, t.position))
            .collect::<Vec<_>>();
        // b, a, c, principal
        assert_eq!(summary, vec![(1, 1, 0), (2, 1, 1), (3, 3, 2), (4, 1, 3)]);
    }

    #[test]
    fn test_include_shares_precedence_and_imports_first() {
        let resolver = MemoryResolver::new()
            .with(
                "inc.xsl",
                &stylesheet(r#"<xsl:import href="imp.xsl"/><xsl:template match="i"/>"#),
            )
            .with("imp.xsl", &stylesheet(r#"<xsl:template match="m"/>"#));
        let principal = stylesheet(
            r#"<xsl:template match="before"/><xsl:include href="inc.xsl"/><xsl:template match="after"/>"#,
        );
        let (result, _) = load(&principal, resolver);
        let stylesheet = result.unwrap();
        let precedences = stylesheet
            .templates
            .iter()
            .map(|t| t.precedence)
            .collect::<Vec<_>>();
        assert_eq!(precedences, vec![1, 2, 2, 2]);
    }

    #[test]
    fn test_circular_import() {
        let resolver = MemoryResolver::new()
            .with("a.xsl", &stylesheet(r#"<xsl:import href="b.xsl"/>"#))
            .with("b.xsl", &stylesheet(r#"<xsl:import href="a.xsl"/>"#));
        let principal = stylesheet(r#"<xsl:import href="a.xsl"/>"#);
        let (result, diagnostics) = load(&principal, resolver);
        assert!(result.is_err());
        let errors = diagnostics.errors().collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::CircularImport);
    }

    #[test]
    fn test_missing_import() {
        let principal = stylesheet(r#"<xsl:import href="nowhere.xsl"/>"#);
        let (result, diagnostics) = load(&principal, MemoryResolver::new());
        assert!(result.is_err());
        assert_eq!(
            diagnostics.errors().next().map(|d| d.code),
            Some(ErrorCode::StylesheetNotFound)
        );
    }

    #[test]
    fn test_global_override_and_duplicates() {
        let resolver = MemoryResolver::new().with(
            "a.xsl",
            &stylesheet(r#"<xsl:variable name="v" select="1"/><xsl:variable name="w" select="1"/>"#),
        );
        let principal = stylesheet(
            r#"<xsl:import href="a.xsl"/><xsl:variable name="v" select="2"/><xsl:template name="t"/><xsl:template name="t"/>"#,
        );
        let (result, diagnostics) = load(&principal, resolver);
        let stylesheet = result.unwrap();
        assert_eq!(stylesheet.globals.len(), 2);
        assert_eq!(stylesheet.globals[0].precedence, 2);
        let errors = diagnostics.errors().collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::DuplicateTemplate);
    }
}
