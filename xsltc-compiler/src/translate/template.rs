use xsltc_bytecode::{Constant, Instruction, JumpCondition, MethodBuilder, MethodGen};

use super::{
    CodegenError, CodegenResult, Frame, MethodCompiler, Position, TransletAccess, Translation,
};
use crate::symbols::NamedTemplate;
use crate::syntax::{Template, VariableDecl, VariableValue};
use crate::typecheck::TExpr;

/// How a template receives its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamSource {
    /// Looked up by name in the caller's parameter frame.
    Frame,
    /// Passed as method arguments starting at this slot, null when the
    /// caller did not pass them.
    Arguments(u16),
}

impl<'t, 'a> MethodCompiler<'t, 'a> {
    /// Push the value of a variable, parameter or `with-param`.
    pub(crate) fn variable_value(&mut self, value: &VariableValue<TExpr>) -> CodegenResult<()> {
        match value {
            VariableValue::Select(expr) => self.expression(expr),
            VariableValue::Content(body) => {
                self.emit(Instruction::PushOutput);
                self.body(body)?;
                self.emit(Instruction::PopOutput);
                Ok(())
            }
            VariableValue::Empty => self.push_string(""),
        }
    }

    /// Bind one template parameter, evaluating its default when no value
    /// was passed.
    fn parameter(
        &mut self,
        param: &VariableDecl<TExpr>,
        source: ParamSource,
        index: usize,
    ) -> CodegenResult<u16> {
        let slot = match source {
            ParamSource::Frame => {
                let name = self.constant(Constant::String(param.name.to_string()))?;
                let slot = self.builder.allocate_local(&param.name.to_string())?;
                self.emit(Instruction::GetParam(name));
                self.emit(Instruction::Dup);
                self.emit(Instruction::IsNull);
                let passed = self.builder.emit_jump_forward(JumpCondition::False);
                self.emit(Instruction::Pop);
                self.variable_value(&param.value)?;
                self.builder.patch_jump_here(passed);
                self.emit(Instruction::Store(slot));
                slot
            }
            ParamSource::Arguments(first) => {
                let offset = u16::try_from(index)
                    .map_err(|_| CodegenError::Internal("too many template parameters".into()))?;
                let slot = first + offset;
                self.emit(Instruction::Load(slot));
                self.emit(Instruction::IsNull);
                let passed = self.builder.emit_jump_forward(JumpCondition::False);
                self.variable_value(&param.value)?;
                self.emit(Instruction::Store(slot));
                self.builder.patch_jump_here(passed);
                slot
            }
        };
        self.frame.locals.insert(param.id, slot);
        Ok(slot)
    }

    /// Compile the parameters and body of template `index` into the
    /// current method.
    pub(crate) fn template(&mut self, index: usize, source: ParamSource) -> CodegenResult<()> {
        let stylesheet = self.t.stylesheet;
        let template = stylesheet.templates.get(index).ok_or_else(|| {
            CodegenError::Internal(format!("no template {}", index))
        })?;
        log::trace!("compiling template {} into {}", index, self.builder.name());
        let saved = self.frame.template.replace(index);
        self.builder.set_line(template.line);
        let mut allocated = Vec::new();
        for (i, param) in template.params.iter().enumerate() {
            let slot = self.parameter(param, source, i)?;
            if source == ParamSource::Frame {
                allocated.push(slot);
            }
        }
        self.body(&template.body)?;
        for param in &template.params {
            self.frame.locals.remove(&param.id);
        }
        for slot in allocated.into_iter().rev() {
            self.builder.release_local(slot);
        }
        self.frame.template = saved;
        Ok(())
    }
}

/// Compile the method of a named template. It takes the current node and
/// the iterator of the current node list, then the parameters when they
/// are passed directly.
pub(crate) fn named_template_method(
    t: &mut Translation,
    named: &NamedTemplate,
) -> CodegenResult<MethodGen> {
    let stylesheet = t.stylesheet;
    let template: &Template<TExpr> = stylesheet.templates.get(named.template).ok_or_else(|| {
        CodegenError::Internal(format!("no template for {}", named.method))
    })?;
    let mut params = vec!["node".to_string(), "iterator".to_string()];
    let source = if named.direct {
        params.extend(template.params.iter().map(|param| param.name.to_string()));
        ParamSource::Arguments(3)
    } else {
        ParamSource::Frame
    };
    let builder = MethodBuilder::new(named.method.clone(), params);
    let frame = Frame::new(1, Position::Iterator(2), TransletAccess::This);
    let mut compiler = MethodCompiler::new(t, builder, frame);
    compiler.template(named.template, source)?;
    compiler.emit(Instruction::Return);
    compiler.finish()
}

#[cfg(test)]
mod tests {
    use xsltc_bytecode::instruction::decode_instructions;
    use xsltc_name::QName;

    use super::*;
    use crate::context::CompilationContext;
    use crate::loader::Stylesheet;
    use crate::symbols::SymbolTable;
    use crate::syntax::{Instruction as Xsl, Located, VariableId};

    fn named(params: Vec<VariableDecl<TExpr>>) -> Stylesheet<TExpr> {
        let mut stylesheet = Stylesheet::empty();
        stylesheet.templates.push(Template {
            pattern: None,
            name: Some(QName::unprefixed("t")),
            mode: None,
            priority: None,
            params,
            body: vec![Located::new(Xsl::Text("x".to_string()), None)],
            precedence: 1,
            import_min: 1,
            position: 0,
            line: None,
        });
        stylesheet
    }

    fn param(id: usize, name: &str) -> VariableDecl<TExpr> {
        VariableDecl {
            id: VariableId(id),
            name: QName::unprefixed(name),
            value: VariableValue::Select(TExpr::string("d")),
            is_param: true,
            precedence: 1,
            line: None,
        }
    }

    fn compile(stylesheet: &Stylesheet<TExpr>, direct: bool) -> MethodGen {
        let mut context = CompilationContext::new("T");
        let symbols = SymbolTable::new();
        let mut translation = Translation::new(&mut context, &symbols, stylesheet);
        let named = NamedTemplate {
            template: 0,
            method: "template:t".to_string(),
            params: vec![QName::unprefixed("p")],
            direct,
        };
        named_template_method(&mut translation, &named).unwrap()
    }

    #[test]
    fn test_direct_parameters_are_arguments() {
        let stylesheet = named(vec![param(1, "p")]);
        let method = compile(&stylesheet, true);
        assert_eq!(method.params, vec!["node", "iterator", "p"]);
        let instructions = decode_instructions(&method.code)
            .into_iter()
            .map(|(_, instruction)| instruction)
            .collect::<Vec<_>>();
        assert_eq!(instructions[0], Instruction::Load(3));
        assert_eq!(instructions[1], Instruction::IsNull);
        assert!(!instructions
            .iter()
            .any(|instruction| matches!(instruction, Instruction::GetParam(_))));
    }

    #[test]
    fn test_frame_parameters_are_looked_up_by_name() {
        let stylesheet = named(vec![param(1, "p")]);
        let method = compile(&stylesheet, false);
        assert_eq!(method.params, vec!["node", "iterator"]);
        assert!(method.constants.contains(&Constant::String("p".to_string())));
        let instructions = decode_instructions(&method.code)
            .into_iter()
            .map(|(_, instruction)| instruction)
            .collect::<Vec<_>>();
        assert!(matches!(instructions[0], Instruction::GetParam(_)));
        assert_eq!(instructions.last(), Some(&Instruction::Return));
    }
}
