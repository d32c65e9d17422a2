use xsltc_bytecode::{Axis, Constant, Instruction, JumpCondition, StepSpec, StepTest};
use xsltc_name::QName;

use super::{CodegenError, CodegenResult, ImportWindow, MethodCompiler, Position};
use crate::symbols::{import_method_name, mode_method_name};
use crate::syntax::{
    self, ApplyTemplates, Avt, AvtPart, Body, LiteralElement, NameTemplate, Sort, WithParam,
};
use crate::typecheck::TExpr;

/// `child::node()`, what `apply-templates` selects by default.
fn children() -> StepSpec {
    StepSpec {
        axis: Axis::Child,
        test: StepTest::Node,
    }
}

impl<'t, 'a> MethodCompiler<'t, 'a> {
    /// Compile a sequence of instructions. Variables declared in it are in
    /// scope until its end.
    pub(crate) fn body(&mut self, body: &Body<TExpr>) -> CodegenResult<()> {
        let mut scoped = Vec::new();
        for instruction in body {
            if instruction.line.is_some() {
                self.builder.set_line(instruction.line);
            }
            if let syntax::Instruction::Variable(decl) = &instruction.value {
                self.variable_value(&decl.value)?;
                let slot = self.builder.allocate_local(&decl.name.to_string())?;
                self.emit(Instruction::Store(slot));
                self.frame.locals.insert(decl.id, slot);
                scoped.push((decl.id, slot));
            } else {
                self.instruction(&instruction.value)?;
            }
        }
        for (id, slot) in scoped.into_iter().rev() {
            self.frame.locals.remove(&id);
            self.builder.release_local(slot);
        }
        Ok(())
    }

    fn instruction(&mut self, instruction: &syntax::Instruction<TExpr>) -> CodegenResult<()> {
        use syntax::Instruction as Xsl;
        match instruction {
            Xsl::ApplyTemplates(apply) => self.apply_templates(apply)?,
            Xsl::CallTemplate { name, params } => self.call_template(name, params)?,
            Xsl::ApplyImports => self.apply_imports()?,
            Xsl::ForEach {
                select,
                sorts,
                body,
            } => self.for_each(select, sorts, body)?,
            Xsl::If { test, body } => {
                let lists = self.condition(test)?;
                self.patch_here(lists.true_list);
                self.body(body)?;
                self.patch_here(lists.false_list);
            }
            Xsl::Choose { whens, otherwise } => {
                let mut done = Vec::new();
                for when in whens {
                    let lists = self.condition(&when.test)?;
                    self.patch_here(lists.true_list);
                    self.body(&when.body)?;
                    done.push(self.builder.emit_jump_forward(JumpCondition::Always));
                    self.patch_here(lists.false_list);
                }
                if let Some(otherwise) = otherwise {
                    self.body(otherwise)?;
                }
                self.patch_here(done);
            }
            Xsl::ValueOf { select } => {
                self.expression(select)?;
                self.emit(Instruction::Characters);
            }
            Xsl::Text(text) => {
                if !text.is_empty() {
                    self.push_string(text)?;
                    self.emit(Instruction::Characters);
                }
            }
            Xsl::LiteralElement(element) => self.literal_element(element)?,
            Xsl::Element { name, body } => {
                self.name_template(name)?;
                self.emit(Instruction::StartElement);
                self.body(body)?;
                self.emit(Instruction::EndElement);
            }
            Xsl::Attribute { name, body } => {
                self.name_template(name)?;
                self.captured_text(body)?;
                self.emit(Instruction::Attribute);
            }
            Xsl::Comment(body) => {
                self.captured_text(body)?;
                self.emit(Instruction::Comment);
            }
            Xsl::ProcessingInstruction { name, body } => {
                self.avt(name)?;
                self.captured_text(body)?;
                self.emit(Instruction::ProcessingInstruction);
            }
            Xsl::Copy(body) => {
                self.emit(Instruction::Load(self.frame.current));
                self.emit(Instruction::ShallowCopy);
                let skip = self.builder.emit_jump_forward(JumpCondition::False);
                self.body(body)?;
                self.builder.patch_jump_here(skip);
                self.emit(Instruction::EndCopy);
            }
            Xsl::CopyOf { select } => {
                self.expression(select)?;
                self.emit(Instruction::CopyOf);
            }
            Xsl::Variable(decl) => {
                return Err(CodegenError::Internal(format!(
                    "variable ${} outside of a body",
                    decl.name
                )))
            }
            Xsl::Number(number) => self.number(number)?,
            Xsl::Message { terminate, body } => {
                self.captured_text(body)?;
                self.emit(Instruction::Message(u8::from(*terminate)));
            }
        }
        Ok(())
    }

    /// Run `body` into a fresh output and push its string value.
    fn captured_text(&mut self, body: &Body<TExpr>) -> CodegenResult<()> {
        self.emit(Instruction::PushOutput);
        self.body(body)?;
        self.emit(Instruction::PopOutput);
        self.emit(Instruction::ToString);
        Ok(())
    }

    /// Push the string value of an attribute value template.
    fn avt(&mut self, avt: &Avt<TExpr>) -> CodegenResult<()> {
        match avt.as_slice() {
            [] => self.push_string("")?,
            [AvtPart::Literal(text)] => self.push_string(text)?,
            [AvtPart::Expr(expr)] => self.expression(expr)?,
            parts => {
                let count = u8::try_from(parts.len()).map_err(|_| {
                    CodegenError::Internal("attribute value template too long".into())
                })?;
                for part in parts {
                    match part {
                        AvtPart::Literal(text) => self.push_string(text)?,
                        AvtPart::Expr(expr) => self.expression(expr)?,
                    }
                }
                self.emit(Instruction::Concat(count));
            }
        }
        Ok(())
    }

    /// Push a lexical name and its namespace, the empty string for none.
    fn static_name(&mut self, name: &QName) -> CodegenResult<()> {
        self.push_string(&name.to_lexical())?;
        self.push_string(name.namespace().unwrap_or(""))
    }

    /// Push the name of a constructed node. A computed name without a
    /// namespace attribute gets a null namespace, resolved against the
    /// result tree at run time.
    fn name_template(&mut self, name: &NameTemplate<TExpr>) -> CodegenResult<()> {
        match name {
            NameTemplate::Static(name) => self.static_name(name),
            NameTemplate::Dynamic { name, namespace } => {
                self.avt(name)?;
                match namespace {
                    Some(namespace) => self.avt(namespace),
                    None => self.push_constant(Constant::Null),
                }
            }
        }
    }

    fn literal_element(&mut self, element: &LiteralElement<TExpr>) -> CodegenResult<()> {
        self.static_name(&element.name)?;
        self.emit(Instruction::StartElement);
        for (name, value) in &element.attributes {
            self.static_name(name)?;
            self.avt(value)?;
            self.emit(Instruction::Attribute);
        }
        self.body(&element.body)?;
        self.emit(Instruction::EndElement);
        Ok(())
    }

    fn with_params(&mut self, params: &[WithParam<TExpr>]) -> CodegenResult<()> {
        for param in params {
            self.variable_value(&param.value)?;
            let name = self.constant(Constant::String(param.name.to_string()))?;
            self.emit(Instruction::AddParam(name));
        }
        Ok(())
    }

    /// Push the iterator of the current node list, null outside of one.
    fn load_iterator(&mut self) -> CodegenResult<()> {
        match self.frame.position {
            Position::Iterator(slot) => self.emit(Instruction::Load(slot)),
            Position::Locals { .. } | Position::One => self.push_constant(Constant::Null)?,
        }
        Ok(())
    }

    fn apply_templates(&mut self, apply: &ApplyTemplates<TExpr>) -> CodegenResult<()> {
        let translet = self.t.translet_name();
        self.emit(Instruction::PushParamFrame);
        self.with_params(&apply.params)?;
        self.load_translet();
        match &apply.select {
            Some(select) => self.expression(select)?,
            None => self.step_from(self.frame.node, children())?,
        }
        if !apply.sorts.is_empty() {
            self.sort(&apply.sorts)?;
        }
        self.emit(Instruction::Iterate);
        self.invoke(&translet, &mode_method_name(apply.mode.as_ref()), 1)?;
        self.emit(Instruction::Pop);
        self.emit(Instruction::PopParamFrame);
        Ok(())
    }

    fn call_template(&mut self, name: &QName, params: &[WithParam<TExpr>]) -> CodegenResult<()> {
        let symbols = self.t.symbols;
        let named = symbols
            .named_template(name)
            .ok_or_else(|| CodegenError::Internal(format!("no template named {}", name)))?;
        let translet = self.t.translet_name();
        if named.direct {
            self.load_translet();
            self.emit(Instruction::Load(self.frame.current));
            self.load_iterator()?;
            for declared in &named.params {
                match params.iter().find(|param| &param.name == declared) {
                    Some(param) => self.variable_value(&param.value)?,
                    None => self.push_constant(Constant::Null)?,
                }
            }
            let arity = u16::try_from(named.params.len() + 2)
                .map_err(|_| CodegenError::Internal("too many template parameters".into()))?;
            self.invoke(&translet, &named.method, arity)?;
            self.emit(Instruction::Pop);
        } else {
            self.emit(Instruction::PushParamFrame);
            self.with_params(params)?;
            self.load_translet();
            self.emit(Instruction::Load(self.frame.current));
            self.load_iterator()?;
            self.invoke(&translet, &named.method, 2)?;
            self.emit(Instruction::Pop);
            self.emit(Instruction::PopParamFrame);
        }
        Ok(())
    }

    /// Process the current node with the templates the enclosing template
    /// rule overrides.
    fn apply_imports(&mut self) -> CodegenResult<()> {
        let stylesheet = self.t.stylesheet;
        let template = self
            .frame
            .template
            .and_then(|index| stylesheet.templates.get(index))
            .ok_or_else(|| CodegenError::Internal("apply-imports outside of a template".into()))?;
        let window = ImportWindow {
            mode: template.mode.clone(),
            min: template.import_min,
            max: template.precedence,
        };
        let method = import_method_name(window.mode.as_ref(), window.min, window.max);
        self.t.request_window(window);
        let translet = self.t.translet_name();
        self.emit(Instruction::PushParamFrame);
        self.load_translet();
        self.emit(Instruction::Load(self.frame.current));
        self.emit(Instruction::ToNodeSet);
        self.emit(Instruction::Iterate);
        self.invoke(&translet, &method, 1)?;
        self.emit(Instruction::Pop);
        self.emit(Instruction::PopParamFrame);
        Ok(())
    }

    fn for_each(
        &mut self,
        select: &TExpr,
        sorts: &[Sort<TExpr>],
        body: &Body<TExpr>,
    ) -> CodegenResult<()> {
        self.expression(select)?;
        if !sorts.is_empty() {
            self.sort(sorts)?;
        }
        let iterator = self.builder.allocate_local("for-each iterator")?;
        let node = self.builder.allocate_local("for-each node")?;
        self.emit(Instruction::Iterate);
        self.emit(Instruction::Store(iterator));
        let top = self.builder.label_here();
        self.emit(Instruction::IterNext(iterator, node));
        let done = self.builder.emit_jump_forward(JumpCondition::False);
        self.with_current(node, Position::Iterator(iterator), |compiler| {
            compiler.body(body)
        })?;
        self.builder.emit_jump(JumpCondition::Always, top);
        self.builder.patch_jump_here(done);
        self.builder.release_local(node);
        self.builder.release_local(iterator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use xsltc_bytecode::instruction::decode_instructions;
    use xsltc_bytecode::{MethodBuilder, MethodGen};

    use super::*;
    use crate::context::CompilationContext;
    use crate::loader::Stylesheet;
    use crate::symbols::SymbolTable;
    use crate::syntax::{Located, VariableDecl, VariableId, VariableValue, When};
    use crate::translate::{Frame, TransletAccess, Translation};
    use crate::typecheck::{TExprKind, VariableRef};
    use crate::types::Type;

    fn compile(body: Body<TExpr>) -> (MethodGen, Vec<ImportWindow>) {
        let mut context = CompilationContext::new("T");
        let symbols = SymbolTable::new();
        let stylesheet = Stylesheet::empty();
        let mut translation = Translation::new(&mut context, &symbols, &stylesheet);
        let builder = MethodBuilder::new("m", vec!["node".to_string()]);
        let frame = Frame::new(1, Position::One, TransletAccess::This);
        let mut compiler = MethodCompiler::new(&mut translation, builder, frame);
        compiler.body(&body).unwrap();
        compiler.emit(Instruction::Return);
        let method = compiler.finish().unwrap();
        (method, translation.import_windows)
    }

    fn instructions(method: &MethodGen) -> Vec<Instruction> {
        decode_instructions(&method.code)
            .into_iter()
            .map(|(_, instruction)| instruction)
            .collect()
    }

    fn located(instruction: syntax::Instruction<TExpr>) -> Located<syntax::Instruction<TExpr>> {
        Located::new(instruction, Some(1))
    }

    #[test]
    fn test_apply_templates_default_select() {
        let (method, _) = compile(vec![located(syntax::Instruction::ApplyTemplates(
            ApplyTemplates {
                select: None,
                mode: None,
                sorts: Vec::new(),
                params: Vec::new(),
            },
        ))]);
        assert!(method.constants.contains(&Constant::Step(children())));
        let instructions = instructions(&method);
        assert_eq!(instructions[0], Instruction::PushParamFrame);
        assert!(instructions.contains(&Instruction::Iterate));
        assert!(method.constants.iter().any(|constant| matches!(
            constant,
            Constant::Method(method) if method.name == "applyTemplates" && method.arity == 1
        )));
    }

    #[test]
    fn test_choose_jumps_past_otherwise() {
        let when = |value: bool, text: &str| When {
            test: TExpr::boolean(value),
            body: vec![located(syntax::Instruction::Text(text.to_string()))],
        };
        let (method, _) = compile(vec![located(syntax::Instruction::Choose {
            whens: vec![when(true, "a")],
            otherwise: Some(vec![located(syntax::Instruction::Text("b".to_string()))]),
        })]);
        let instructions = instructions(&method);
        // "a", jump over "b", "b"
        assert!(matches!(instructions[0], Instruction::Const(_)));
        assert_eq!(instructions[1], Instruction::Characters);
        assert!(matches!(instructions[2], Instruction::Jump(_)));
        assert_eq!(instructions[4], Instruction::Characters);
    }

    #[test]
    fn test_variable_slot_is_released_at_end_of_body() {
        let decl = VariableDecl {
            id: VariableId(1),
            name: QName::unprefixed("v"),
            value: VariableValue::Select(TExpr::string("x")),
            is_param: false,
            precedence: 0,
            line: None,
        };
        let reference = TExpr::new(
            TExprKind::Variable(VariableRef::Local {
                id: VariableId(1),
                name: QName::unprefixed("v"),
            }),
            Type::String,
        );
        let (method, _) = compile(vec![
            located(syntax::Instruction::Variable(decl)),
            located(syntax::Instruction::ValueOf { select: reference }),
        ]);
        assert_eq!(
            instructions(&method)[..4],
            [
                Instruction::Const(0),
                Instruction::Store(2),
                Instruction::Load(2),
                Instruction::Characters
            ]
        );
        let local = method.locals.iter().find(|local| local.name == "v").unwrap();
        assert!(local.end < method.code.len());
    }

    #[test]
    fn test_literal_element_with_attribute_value_template() {
        let element = LiteralElement {
            name: QName::unprefixed("out"),
            attributes: vec![(
                QName::unprefixed("id"),
                vec![
                    AvtPart::Literal("n-".to_string()),
                    AvtPart::Expr(TExpr::string("1")),
                ],
            )],
            body: Vec::new(),
        };
        let (method, _) = compile(vec![located(syntax::Instruction::LiteralElement(element))]);
        let instructions = instructions(&method);
        assert!(instructions.contains(&Instruction::StartElement));
        assert!(instructions.contains(&Instruction::Concat(2)));
        assert!(instructions.contains(&Instruction::Attribute));
        assert!(instructions.contains(&Instruction::EndElement));
    }
}
