//! Runs the phases of one compilation and assembles the translet.

use xsltc_bytecode::dom::THIS_SLOT;
use xsltc_bytecode::{
    Axis, ClassGen, Constant, Instruction, JumpCondition, MethodBuilder, MethodGen, StepSpec,
    StepTest, Translet,
};
use xsltc_name::QName;

use crate::context::CompilationContext;
use crate::dependency::{resolve_order, TopLevel};
use crate::error::{Abort, CompileResult, Diagnostic, ErrorCode};
use crate::loader::{Loader, Stylesheet};
use crate::mode::{dispatch_method, Mode};
use crate::options::CompilerOptions;
use crate::source::{StylesheetSource, XotSource};
use crate::symbols::{
    import_method_name, mode_method_name, template_method_name, NamedTemplate, SymbolTable,
};
use crate::syntax::{walk_body, Instruction as Xsl, VariableDecl};
use crate::translate::{
    named_template_method, CodegenError, CodegenResult, Frame, MethodCompiler, Position,
    TransletAccess, Translation,
};
use crate::typecheck::{Checker, TExpr};

/// Superclass of every main unit.
pub const TRANSLET_CLASS: &str = "AbstractTranslet";
/// Entry point of a translet; it takes the document root.
pub const TRANSFORM_METHOD: &str = "transform";

/// What a compilation produced.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The generated units, `None` when there are errors.
    pub translet: Option<Translet>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl CompileOutput {
    /// The main unit followed by its helpers, empty when compilation
    /// failed.
    pub fn units(&self) -> &[ClassGen] {
        self.translet
            .as_ref()
            .map(|translet| translet.classes.as_slice())
            .unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.translet.is_some()
    }
}

/// Compile a stylesheet.
pub fn compile(source: &dyn StylesheetSource, options: &CompilerOptions) -> CompileOutput {
    let mut context = CompilationContext::new(&options.translet_name);
    let translet = run(source, options, &mut context).ok();
    let (errors, warnings) = context.diagnostics.into_parts();
    log::debug!(
        "compiled {} with {} errors and {} warnings",
        options.translet_name,
        errors.len(),
        warnings.len()
    );
    CompileOutput {
        translet: translet.filter(|_| errors.is_empty()),
        errors,
        warnings,
    }
}

/// Compile stylesheet text.
pub fn compile_str(text: &str, options: &CompilerOptions) -> CompileOutput {
    compile(&XotSource::new(text), options)
}

fn run(
    source: &dyn StylesheetSource,
    options: &CompilerOptions,
    context: &mut CompilationContext,
) -> CompileResult<Translet> {
    let events = source
        .events()
        .map_err(|error| context.abort(ErrorCode::StylesheetParse, error.to_string(), None))?;
    let stylesheet = Loader::new(context, options.resolver.clone()).load(events)?;
    let order = resolve_order(&stylesheet, context);

    let mut main = ClassGen::new(context.translet_name(), Some(TRANSLET_CLASS.to_string()));
    let mut symbols = SymbolTable::new();
    for global in &stylesheet.globals {
        let field = main.define_field(global.name.to_string());
        symbols.add_global(global.name.clone(), field);
    }
    for key in &stylesheet.keys {
        symbols.add_key(key.name.clone());
    }
    for (name, index) in &stylesheet.named {
        let template = &stylesheet.templates[*index];
        symbols.add_named_template(
            name.clone(),
            NamedTemplate {
                template: *index,
                method: template_method_name(name),
                params: template.params.iter().map(|param| param.name.clone()).collect(),
                direct: template.takes_parameters_directly(),
            },
        );
    }

    let checked =
        Checker::new(context, &mut symbols, &options.extensions).check(&stylesheet, &order);
    if context.diagnostics.has_errors() {
        log::debug!("not translating: type checking reported errors");
        return Err(Abort);
    }

    let mut translation = Translation::new(context, &symbols, &checked);
    match translate(&mut translation, &order, main, options.debug) {
        Ok(translet) => Ok(translet),
        Err(error) => Err(error.report(context)),
    }
}

fn translate(
    t: &mut Translation,
    order: &[TopLevel],
    mut main: ClassGen,
    debug: bool,
) -> CodegenResult<Translet> {
    let stylesheet = t.stylesheet;
    main.define_method(transform_method(t, order)?);

    for mode in mode_names(stylesheet) {
        let name = mode_method_name(mode.as_ref());
        let collected = Mode::collect(stylesheet, mode.as_ref(), None);
        main.define_method(dispatch_method(t, &collected, name)?);
    }

    let mut named = t
        .symbols
        .named_templates()
        .map(|(_, named)| named.clone())
        .collect::<Vec<_>>();
    named.sort_by_key(|named| named.template);
    for named in &named {
        main.define_method(named_template_method(t, named)?);
    }

    // apply-imports in a compiled template may ask for further windows
    let mut done = 0;
    while done < t.import_windows.len() {
        let window = t.import_windows[done].clone();
        done += 1;
        let name = import_method_name(window.mode.as_ref(), window.min, window.max);
        let collected = Mode::collect(
            stylesheet,
            window.mode.as_ref(),
            Some((window.min, window.max)),
        );
        main.define_method(dispatch_method(t, &collected, name)?);
    }

    let mut classes = vec![main];
    classes.append(&mut t.helpers);
    if !debug {
        for class in &mut classes {
            for method in &mut class.methods {
                method.locals.clear();
            }
        }
    }
    log::debug!("translet {} has {} units", t.translet_name(), classes.len());
    Ok(Translet {
        classes,
        names: t.context.name_entries().to_vec(),
        namespaces: t.context.namespaces().to_vec(),
        output: stylesheet.output.clone(),
    })
}

/// The default mode, then every other mode in the order it is first
/// named by a template or an `apply-templates`.
fn mode_names<E>(stylesheet: &Stylesheet<E>) -> Vec<Option<QName>> {
    let mut modes = vec![None];
    let mut add = |mode: &Option<QName>| {
        if !modes.contains(mode) {
            modes.push(mode.clone());
        }
    };
    for template in &stylesheet.templates {
        if template.pattern.is_some() {
            add(&template.mode);
        }
        let mut bodies = vec![&template.body];
        bodies.extend(template.params.iter().filter_map(|param| param.value.body()));
        for body in bodies {
            walk_body(body, &mut |instruction| {
                if let Xsl::ApplyTemplates(apply) = instruction {
                    add(&apply.mode);
                }
            });
        }
    }
    for global in &stylesheet.globals {
        if let Some(body) = global.value.body() {
            walk_body(body, &mut |instruction| {
                if let Xsl::ApplyTemplates(apply) = instruction {
                    add(&apply.mode);
                }
            });
        }
    }
    modes
}

fn descendants_or_self() -> StepSpec {
    StepSpec {
        axis: Axis::DescendantOrSelf,
        test: StepTest::Node,
    }
}

/// Initialize globals and build key indexes in `order`, then process
/// the root in the default mode.
fn transform_method(t: &mut Translation, order: &[TopLevel]) -> CodegenResult<MethodGen> {
    let stylesheet = t.stylesheet;
    let builder = MethodBuilder::new(TRANSFORM_METHOD, vec!["document".to_string()]);
    let frame = Frame::new(1, Position::One, TransletAccess::This);
    let mut compiler = MethodCompiler::new(t, builder, frame);
    for item in order {
        match *item {
            TopLevel::Global(index) => {
                let decl = stylesheet.globals.get(index).ok_or_else(|| {
                    CodegenError::Internal(format!("no global {}", index))
                })?;
                compiler.global(decl)?;
            }
            TopLevel::Key(index) => {
                compiler.key_index(index)?;
            }
        }
    }
    let translet = compiler.t.translet_name();
    compiler.builder.set_line(None);
    compiler.emit(Instruction::PushParamFrame);
    compiler.emit(Instruction::Load(THIS_SLOT));
    compiler.emit(Instruction::Load(1));
    compiler.emit(Instruction::ToNodeSet);
    compiler.emit(Instruction::Iterate);
    compiler.invoke(&translet, &mode_method_name(None), 1)?;
    compiler.emit(Instruction::Pop);
    compiler.emit(Instruction::PopParamFrame);
    compiler.emit(Instruction::Return);
    compiler.finish()
}

impl<'t, 'a> MethodCompiler<'t, 'a> {
    /// Store the value of a global variable or parameter in its field.
    /// A parameter takes the value the transformation was given, if any.
    fn global(&mut self, decl: &VariableDecl<TExpr>) -> CodegenResult<()> {
        let symbols = self.t.symbols;
        let field = symbols
            .global(&decl.name)
            .map(|global| global.field)
            .ok_or_else(|| CodegenError::Internal(format!("no field for ${}", decl.name)))?;
        self.builder.set_line(decl.line);
        self.emit(Instruction::Load(THIS_SLOT));
        if decl.is_param {
            let name = self.constant(Constant::String(decl.name.to_string()))?;
            self.emit(Instruction::GetParam(name));
            self.emit(Instruction::Dup);
            self.emit(Instruction::IsNull);
            let passed = self.builder.emit_jump_forward(JumpCondition::False);
            self.emit(Instruction::Pop);
            self.variable_value(&decl.value)?;
            self.builder.patch_jump_here(passed);
        } else {
            self.variable_value(&decl.value)?;
        }
        self.emit(Instruction::PutField(field));
        Ok(())
    }

    /// Add every node of the document matching key `index` to its index,
    /// under the values of its `use` expression.
    fn key_index(&mut self, index: usize) -> CodegenResult<()> {
        let stylesheet = self.t.stylesheet;
        let key = stylesheet
            .keys
            .get(index)
            .ok_or_else(|| CodegenError::Internal(format!("no key {}", index)))?;
        self.builder.set_line(key.line);
        let name = self.constant(Constant::String(key.name.to_string()))?;
        let iterator = self.builder.allocate_local("key iterator")?;
        let node = self.builder.allocate_local("key node")?;

        self.step_from(self.frame.node, descendants_or_self())?;
        self.emit(Instruction::Dup);
        let attributes = self.constant(Constant::Step(StepSpec {
            axis: Axis::Attribute,
            test: StepTest::Node,
        }))?;
        self.emit(Instruction::Step(attributes));
        self.emit(Instruction::Union);
        self.emit(Instruction::Iterate);
        self.emit(Instruction::Store(iterator));

        let top = self.builder.label_here();
        self.emit(Instruction::IterNext(iterator, node));
        let done = self.builder.emit_jump_forward(JumpCondition::False);
        let lists = self.match_pattern(&key.pattern, node, false)?;
        self.patch_here(lists.true_list);
        self.emit(Instruction::Load(node));
        self.with_current(node, Position::One, |compiler| {
            compiler.expression(&key.use_expr)
        })?;
        self.emit(Instruction::KeyIndexAdd(name));
        self.builder.emit_jump(JumpCondition::Always, top);
        self.patch_to(lists.false_list, top);
        self.builder.patch_jump_here(done);

        self.builder.release_local(node);
        self.builder.release_local(iterator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use xsltc_bytecode::instruction::decode_instructions;

    use super::*;

    const XSL: &str = r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#;

    fn compile_body(body: &str) -> CompileOutput {
        let text = format!(
            r#"<xsl:stylesheet version="1.0" {}>{}</xsl:stylesheet>"#,
            XSL, body
        );
        compile_str(&text, &CompilerOptions::new().translet_name("T"))
    }

    fn method_names(output: &CompileOutput) -> Vec<String> {
        output.units()[0]
            .methods
            .iter()
            .map(|method| method.name.clone())
            .collect()
    }

    #[test]
    fn test_methods_of_a_translet() {
        let output = compile_body(
            r#"<xsl:template match="/"><xsl:apply-templates mode="m"/><xsl:call-template name="t"/></xsl:template>
<xsl:template match="a" mode="m"/>
<xsl:template name="t"/>"#,
        );
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert_eq!(
            method_names(&output),
            vec![
                "transform",
                "applyTemplates",
                "applyTemplates:m",
                "template:t"
            ]
        );
    }

    #[test]
    fn test_global_initialized_before_dispatch() {
        let output = compile_body(
            r#"<xsl:variable name="a" select="$b"/><xsl:param name="b" select="1"/>"#,
        );
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        let main = &output.units()[0];
        assert_eq!(
            main.fields.iter().map(|field| field.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let transform = main.method("transform").unwrap();
        let puts = decode_instructions(&transform.code)
            .into_iter()
            .filter_map(|(_, instruction)| match instruction {
                Instruction::PutField(field) => Some(field),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(puts, vec![1, 0]);
        assert!(transform.locals.is_empty());
    }

    #[test]
    fn test_apply_imports_window_method() {
        let output = compile_str(
            &format!(
                r#"<xsl:stylesheet version="1.0" {}><xsl:import href="base.xsl"/><xsl:template match="a"><xsl:apply-imports/></xsl:template></xsl:stylesheet>"#,
                XSL
            ),
            &CompilerOptions::new().translet_name("T").resolver(
                crate::source::MemoryResolver::new().with(
                    "base.xsl",
                    &format!(
                        r#"<xsl:stylesheet version="1.0" {}><xsl:template match="a">base</xsl:template></xsl:stylesheet>"#,
                        XSL
                    ),
                ),
            ),
        );
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert!(method_names(&output).contains(&"applyTemplates_2_1".to_string()));
    }

    #[test]
    fn test_errors_produce_no_units() {
        let output = compile_body(
            r#"<xsl:variable name="a" select="$b"/><xsl:variable name="b" select="$a"/>"#,
        );
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].code, ErrorCode::CircularVariable);
        assert!(output.units().is_empty());
    }

    #[test]
    fn test_debug_keeps_local_tables() {
        let text = format!(
            r#"<xsl:stylesheet version="1.0" {}><xsl:template match="/"><xsl:variable name="v" select="1"/><xsl:value-of select="$v"/></xsl:template></xsl:stylesheet>"#,
            XSL
        );
        let output = compile_str(&text, &CompilerOptions::new().debug(true));
        let dispatch = output.units()[0].method("applyTemplates").unwrap();
        assert!(dispatch.locals.iter().any(|local| local.name == "v"));
    }
}
