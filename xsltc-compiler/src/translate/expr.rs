use xsltc_bytecode::dom::THIS_SLOT;
use xsltc_bytecode::{Constant, Instruction, JumpCondition, StepSpec};

use super::{BranchLists, CodegenError, CodegenResult, MethodCompiler, Position};
use crate::functions::{FunctionImpl, PrimOp};
use crate::typecheck::{Comparison, PathStart, TExpr, TExprKind, TStep, VariableRef};
use crate::types::Type;

/// The instruction that converts the top of the stack to `target`.
pub(crate) fn conversion(target: &Type) -> Option<Instruction> {
    match target {
        Type::Boolean => Some(Instruction::ToBoolean),
        Type::Real | Type::Int => Some(Instruction::ToNumber),
        Type::String => Some(Instruction::ToString),
        Type::NodeSet => Some(Instruction::ToNodeSet),
        Type::Node => Some(Instruction::ToNode),
        Type::Void | Type::ResultTree | Type::Reference | Type::Object(_) => None,
    }
}

fn primop_instruction(op: PrimOp) -> Instruction {
    match op {
        PrimOp::Add => Instruction::Add,
        PrimOp::Sub => Instruction::Sub,
        PrimOp::Mul => Instruction::Mul,
        PrimOp::Div => Instruction::Div,
        PrimOp::Mod => Instruction::Mod,
        PrimOp::Eq => Instruction::Eq,
        PrimOp::Ne => Instruction::Ne,
        PrimOp::Lt => Instruction::Lt,
        PrimOp::Le => Instruction::Le,
        PrimOp::Gt => Instruction::Gt,
        PrimOp::Ge => Instruction::Ge,
    }
}

fn comparison_instruction(comparison: Comparison) -> Instruction {
    match comparison {
        Comparison::Eq => Instruction::GenEq,
        Comparison::Ne => Instruction::GenNe,
        Comparison::Lt => Instruction::GenLt,
        Comparison::Le => Instruction::GenLe,
        Comparison::Gt => Instruction::GenGt,
        Comparison::Ge => Instruction::GenGe,
    }
}

impl MethodCompiler<'_, '_> {
    /// Emit code leaving the value of `expr` on the stack.
    pub(crate) fn expression(&mut self, expr: &TExpr) -> CodegenResult<()> {
        match &expr.kind {
            TExprKind::String(value) => self.push_string(value)?,
            TExprKind::Number(value) => self.push_constant(Constant::Number(*value))?,
            TExprKind::Boolean(value) => self.push_constant(Constant::Boolean(*value))?,
            TExprKind::Variable(variable) => self.load_variable(variable)?,
            TExprKind::ContextNode => self.emit(Instruction::Load(self.frame.node)),
            TExprKind::Cast(inner) => {
                self.expression(inner)?;
                if let Some(instruction) = conversion(&expr.ty) {
                    self.emit(instruction);
                }
            }
            TExprKind::Call(implementation, arguments) => {
                self.call(*implementation, arguments, &expr.ty)?
            }
            TExprKind::Foreign(reference, arguments) => {
                for argument in arguments {
                    self.expression(argument)?;
                }
                let reference = self.constant(Constant::Foreign(reference.clone()))?;
                self.emit(Instruction::InvokeForeign(reference));
            }
            TExprKind::PrimOp(op, left, right) => {
                self.expression(left)?;
                self.expression(right)?;
                self.emit(primop_instruction(*op));
            }
            TExprKind::Compare(comparison, left, right) => {
                self.expression(left)?;
                self.expression(right)?;
                self.emit(comparison_instruction(*comparison));
            }
            TExprKind::And(..) | TExprKind::Or(..) => self.materialize(expr)?,
            TExprKind::Negate(inner) => {
                self.expression(inner)?;
                self.emit(Instruction::Negate);
            }
            TExprKind::Union(left, right) => {
                self.expression(left)?;
                self.emit(Instruction::ToNodeSet);
                self.expression(right)?;
                self.emit(Instruction::ToNodeSet);
                self.emit(Instruction::Union);
            }
            TExprKind::Filter {
                primary,
                predicates,
            } => {
                self.expression(primary)?;
                self.emit(Instruction::ToNodeSet);
                for predicate in predicates {
                    self.filter(predicate)?;
                }
            }
            TExprKind::Path { start, steps } => self.path(start, steps)?,
        }
        Ok(())
    }

    fn load_variable(&mut self, variable: &VariableRef) -> CodegenResult<()> {
        match variable {
            VariableRef::Local { id, name } => {
                if let Some(slot) = self.frame.locals.get(id).copied() {
                    self.emit(Instruction::Load(slot));
                } else if let Some(field) = self.frame.captured.get(id).copied() {
                    self.emit(Instruction::Load(THIS_SLOT));
                    self.emit(Instruction::GetField(field));
                } else {
                    return Err(CodegenError::Internal(format!(
                        "variable ${} has no slot in {}",
                        name,
                        self.builder.name()
                    )));
                }
            }
            VariableRef::Global(field) => {
                self.load_translet();
                self.emit(Instruction::GetField(*field));
            }
        }
        Ok(())
    }

    pub(crate) fn load_position(&mut self) -> CodegenResult<()> {
        match self.frame.position {
            Position::Iterator(iterator) => self.emit(Instruction::IterPosition(iterator)),
            Position::Locals { position, .. } => self.emit(Instruction::Load(position)),
            Position::One => self.push_number(1.0)?,
        }
        Ok(())
    }

    pub(crate) fn load_last(&mut self) -> CodegenResult<()> {
        match self.frame.position {
            Position::Iterator(iterator) => self.emit(Instruction::IterLast(iterator)),
            Position::Locals { last, .. } => self.emit(Instruction::Load(last)),
            Position::One => self.push_number(1.0)?,
        }
        Ok(())
    }

    fn call(
        &mut self,
        implementation: FunctionImpl,
        arguments: &[TExpr],
        result: &Type,
    ) -> CodegenResult<()> {
        match implementation {
            FunctionImpl::Position => self.load_position()?,
            FunctionImpl::Last => self.load_last()?,
            FunctionImpl::Current => self.emit(Instruction::Load(self.frame.current)),
            FunctionImpl::True => self.push_constant(Constant::Boolean(true))?,
            FunctionImpl::False => self.push_constant(Constant::Boolean(false))?,
            FunctionImpl::Not => {
                let [argument] = arguments else {
                    return Err(CodegenError::Internal("not() takes one argument".into()));
                };
                self.expression(argument)?;
                self.emit(Instruction::Not);
            }
            FunctionImpl::String | FunctionImpl::Number | FunctionImpl::Boolean => {
                for argument in arguments {
                    self.expression(argument)?;
                }
                if let Some(instruction) = conversion(result) {
                    self.emit(instruction);
                }
            }
            FunctionImpl::Concat => {
                let count = u8::try_from(arguments.len()).map_err(|_| {
                    CodegenError::Internal("concat() with too many arguments".into())
                })?;
                for argument in arguments {
                    self.expression(argument)?;
                }
                self.emit(Instruction::Concat(count));
            }
            FunctionImpl::Builtin(builtin) => {
                for argument in arguments {
                    self.expression(argument)?;
                }
                self.emit(Instruction::CallBuiltin(builtin.id()));
            }
            FunctionImpl::Available { .. } => {
                return Err(CodegenError::Internal(
                    "availability test was not folded".into(),
                ))
            }
        }
        Ok(())
    }

    /// Evaluate a boolean expression as a condition. Code placed right
    /// after it runs when the condition holds.
    pub(crate) fn condition(&mut self, expr: &TExpr) -> CodegenResult<BranchLists> {
        let mut lists = BranchLists::default();
        match &expr.kind {
            TExprKind::And(left, right) => {
                let left = self.condition(left)?;
                self.patch_here(left.true_list);
                lists.false_list.extend(left.false_list);
                lists.extend(self.condition(right)?);
            }
            TExprKind::Or(left, right) => {
                let left = self.condition(left)?;
                lists.true_list.extend(left.true_list);
                let jump = self.builder.emit_jump_forward(JumpCondition::Always);
                lists.true_list.push(jump);
                self.patch_here(left.false_list);
                lists.extend(self.condition(right)?);
            }
            TExprKind::Call(FunctionImpl::Not, arguments) if arguments.len() == 1 => {
                let inner = self.condition(&arguments[0])?;
                lists.false_list.extend(inner.true_list);
                let jump = self.builder.emit_jump_forward(JumpCondition::Always);
                lists.false_list.push(jump);
                self.patch_here(inner.false_list);
            }
            TExprKind::Boolean(true) => {}
            TExprKind::Boolean(false) => {
                let jump = self.builder.emit_jump_forward(JumpCondition::Always);
                lists.false_list.push(jump);
            }
            _ => {
                self.expression(expr)?;
                if expr.ty != Type::Boolean {
                    self.emit(Instruction::ToBoolean);
                }
                let jump = self.builder.emit_jump_forward(JumpCondition::False);
                lists.false_list.push(jump);
            }
        }
        Ok(lists)
    }

    /// Turn a condition into a boolean value on the stack.
    fn materialize(&mut self, expr: &TExpr) -> CodegenResult<()> {
        let lists = self.condition(expr)?;
        self.patch_here(lists.true_list);
        self.push_constant(Constant::Boolean(true))?;
        let end = self.builder.emit_jump_forward(JumpCondition::Always);
        self.patch_here(lists.false_list);
        self.push_constant(Constant::Boolean(false))?;
        self.builder.patch_jump_here(end);
        Ok(())
    }

    fn path(&mut self, start: &PathStart, steps: &[TStep]) -> CodegenResult<()> {
        match start {
            PathStart::ContextNode => self.emit(Instruction::Load(self.frame.node)),
            PathStart::Root => {
                self.emit(Instruction::Load(self.frame.node));
                self.emit(Instruction::Root);
            }
            PathStart::Expr(start) => {
                self.expression(start)?;
                self.emit(Instruction::ToNodeSet);
            }
        }
        if steps.is_empty() {
            self.emit(Instruction::ToNodeSet);
        }
        for step in steps {
            let spec = self.constant(Constant::Step(step.spec.clone()))?;
            if step.predicates.is_empty() {
                self.emit(Instruction::Step(spec));
            } else {
                self.predicated_step(spec, &step.predicates)?;
            }
        }
        Ok(())
    }

    /// A step with predicates. Positions count along the axis from each
    /// input node separately, so the step runs once per input node.
    fn predicated_step(&mut self, spec: u16, predicates: &[TExpr]) -> CodegenResult<()> {
        let input = self.builder.allocate_local("step input")?;
        let node = self.builder.allocate_local("step node")?;
        let result = self.builder.allocate_local("step result")?;
        self.emit(Instruction::Iterate);
        self.emit(Instruction::Store(input));
        self.emit(Instruction::BuildNew);
        self.emit(Instruction::Store(result));
        let top = self.builder.label_here();
        self.emit(Instruction::IterNext(input, node));
        let done = self.builder.emit_jump_forward(JumpCondition::False);
        self.emit(Instruction::Load(result));
        self.emit(Instruction::Load(node));
        self.emit(Instruction::AxisStep(spec));
        for predicate in predicates {
            self.filter(predicate)?;
        }
        self.emit(Instruction::BuildAppend);
        self.builder.emit_jump(JumpCondition::Always, top);
        self.builder.patch_jump_here(done);
        self.emit(Instruction::Load(result));
        self.emit(Instruction::BuildComplete);
        self.emit(Instruction::DocOrder);
        self.builder.release_local(result);
        self.builder.release_local(node);
        self.builder.release_local(input);
        Ok(())
    }

    /// Keep the nodes of the node-set on the stack for which `predicate`
    /// holds, preserving their order.
    pub(crate) fn filter(&mut self, predicate: &TExpr) -> CodegenResult<()> {
        let iterator = self.builder.allocate_local("filter iterator")?;
        let node = self.builder.allocate_local("filter node")?;
        let result = self.builder.allocate_local("filter result")?;
        self.emit(Instruction::Iterate);
        self.emit(Instruction::Store(iterator));
        self.emit(Instruction::BuildNew);
        self.emit(Instruction::Store(result));
        let top = self.builder.label_here();
        self.emit(Instruction::IterNext(iterator, node));
        let done = self.builder.emit_jump_forward(JumpCondition::False);
        let lists = self.with_context(node, Position::Iterator(iterator), |compiler| {
            compiler.condition(predicate)
        })?;
        self.patch_here(lists.true_list);
        self.emit(Instruction::Load(result));
        self.emit(Instruction::Load(node));
        self.emit(Instruction::BuildPush);
        self.builder.emit_jump(JumpCondition::Always, top);
        self.patch_to(lists.false_list, top);
        self.builder.patch_jump_here(done);
        self.emit(Instruction::Load(result));
        self.emit(Instruction::BuildComplete);
        self.builder.release_local(result);
        self.builder.release_local(node);
        self.builder.release_local(iterator);
        Ok(())
    }

    /// Push the result of a single step from the node in `slot`.
    pub(crate) fn step_from(&mut self, slot: u16, spec: StepSpec) -> CodegenResult<()> {
        let spec = self.constant(Constant::Step(spec))?;
        self.emit(Instruction::Load(slot));
        self.emit(Instruction::Step(spec));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ordered_float::OrderedFloat;
    use xsltc_bytecode::instruction::decode_instructions;
    use xsltc_bytecode::{MethodBuilder, MethodGen};

    use super::*;
    use crate::context::CompilationContext;
    use crate::loader::Stylesheet;
    use crate::symbols::SymbolTable;
    use crate::translate::{Frame, TransletAccess, Translation};

    fn compile(expr: &TExpr) -> MethodGen {
        let mut context = CompilationContext::new("T");
        let symbols = SymbolTable::new();
        let stylesheet = Stylesheet::empty();
        let mut translation = Translation::new(&mut context, &symbols, &stylesheet);
        let builder = MethodBuilder::new("m", vec!["node".to_string()]);
        let frame = Frame::new(1, Position::One, TransletAccess::This);
        let mut compiler = MethodCompiler::new(&mut translation, builder, frame);
        compiler.expression(expr).unwrap();
        compiler.emit(Instruction::ReturnValue);
        compiler.finish().unwrap()
    }

    fn instructions(method: &MethodGen) -> Vec<Instruction> {
        decode_instructions(&method.code)
            .into_iter()
            .map(|(_, instruction)| instruction)
            .collect()
    }

    fn number(value: f64) -> TExpr {
        TExpr::new(TExprKind::Number(OrderedFloat(value)), Type::Real)
    }

    fn less(left: f64, right: f64) -> TExpr {
        TExpr::new(
            TExprKind::PrimOp(PrimOp::Lt, Box::new(number(left)), Box::new(number(right))),
            Type::Boolean,
        )
    }

    #[test]
    fn test_and_skips_right_operand() {
        let expr = TExpr::new(
            TExprKind::And(Box::new(less(1.0, 2.0)), Box::new(less(3.0, 4.0))),
            Type::Boolean,
        );
        let method = compile(&expr);
        let decoded = decode_instructions(&method.code);
        // the left operand's false branch lands on `Const false`, past the
        // right operand
        let (offset, first_branch) = decoded
            .iter()
            .find(|(_, i)| matches!(i, Instruction::JumpIfFalse(_)))
            .cloned()
            .unwrap();
        let Instruction::JumpIfFalse(displacement) = first_branch else {
            unreachable!()
        };
        let target = (offset as isize + 3 + displacement as isize) as usize;
        let landing = decoded.iter().find(|(o, _)| *o == target).unwrap();
        let false_constant = method
            .constants
            .iter()
            .position(|c| c == &Constant::Boolean(false))
            .unwrap() as u16;
        assert_eq!(landing.1, Instruction::Const(false_constant));
        assert_eq!(
            instructions(&method)
                .iter()
                .filter(|i| matches!(i, Instruction::JumpIfFalse(_)))
                .count(),
            2
        );
    }

    #[test]
    fn test_or_jumps_over_right_operand() {
        let expr = TExpr::new(
            TExprKind::Or(Box::new(less(1.0, 2.0)), Box::new(less(3.0, 4.0))),
            Type::Boolean,
        );
        let instructions = instructions(&compile(&expr));
        assert_eq!(
            &instructions[..4],
            &[
                Instruction::Const(0),
                Instruction::Const(1),
                Instruction::Lt,
                Instruction::JumpIfFalse(3),
            ]
        );
        assert!(matches!(instructions[4], Instruction::Jump(_)));
    }

    #[test]
    fn test_position_outside_iteration_is_one() {
        let expr = TExpr::new(TExprKind::Call(FunctionImpl::Position, vec![]), Type::Int);
        let method = compile(&expr);
        assert_eq!(method.constants, vec![Constant::Number(OrderedFloat(1.0))]);
    }

    #[test]
    fn test_cast_emits_conversion() {
        let expr = number(1.0).cast(&Type::String);
        assert_eq!(
            instructions(&compile(&expr)),
            vec![
                Instruction::Const(0),
                Instruction::ToString,
                Instruction::ReturnValue
            ]
        );
    }

    #[test]
    fn test_unbound_local_is_internal_error() {
        let mut context = CompilationContext::new("T");
        let symbols = SymbolTable::new();
        let stylesheet = Stylesheet::empty();
        let mut translation = Translation::new(&mut context, &symbols, &stylesheet);
        let builder = MethodBuilder::new("m", vec![]);
        let frame = Frame::new(0, Position::One, TransletAccess::This);
        let mut compiler = MethodCompiler::new(&mut translation, builder, frame);
        let expr = TExpr::new(
            TExprKind::Variable(VariableRef::Local {
                id: crate::syntax::VariableId(7),
                name: xsltc_name::QName::unprefixed("x"),
            }),
            Type::Reference,
        );
        assert!(matches!(
            compiler.expression(&expr),
            Err(CodegenError::Internal(_))
        ));
    }
}
