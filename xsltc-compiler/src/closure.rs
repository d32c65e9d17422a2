//! Helper units for `xsl:sort` and `xsl:number`.
//!
//! Sort keys and number patterns are evaluated by the runtime outside the
//! method that uses them, so each use compiles into a helper unit. Local
//! variables the helper reads are captured: the helper gets one field per
//! distinct binding, in first reference order, and the call site writes
//! the current values into those fields right after construction.

use ahash::HashMap;
use xsltc_bytecode::dom::THIS_SLOT;
use xsltc_bytecode::{
    ClassGen, Constant, Instruction, MethodBuilder, MethodGen, MethodRef, NumberSpec, SortLevel,
    SortSpec,
};
use xsltc_name::QName;
use xsltc_xpath::pattern::Pattern;

use crate::syntax::{NumberInstruction, Sort, VariableId};
use crate::translate::{
    CodegenError, CodegenResult, Frame, MethodCompiler, Position, TransletAccess,
};
use crate::typecheck::TExpr;

pub const SORT_RECORD_CLASS: &str = "NodeSortRecord";
pub const NODE_COUNTER_CLASS: &str = "NodeCounter";
pub(crate) const CONSTRUCTOR: &str = "<init>";
pub const EXTRACT_VALUE: &str = "extractValue";
pub const MATCHES_COUNT: &str = "matchesCount";
pub const MATCHES_FROM: &str = "matchesFrom";

/// A captured variable and the helper field that holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Capture {
    pub(crate) id: VariableId,
    pub(crate) name: QName,
    pub(crate) field: u16,
}

/// Distinct local bindings read by `exprs`, in first reference order.
fn referenced_locals<'e>(exprs: impl IntoIterator<Item = &'e TExpr>) -> Vec<(VariableId, QName)> {
    let mut found = Vec::new();
    for expr in exprs {
        expr.collect_locals(&mut found);
    }
    found
}

fn pattern_predicates(pattern: Option<&Pattern<TExpr>>) -> Vec<&TExpr> {
    pattern.map(|pattern| pattern.predicates()).unwrap_or_default()
}

/// Define a field per captured binding. Bindings sharing a name get
/// distinct fields.
fn define_captures(class: &mut ClassGen, locals: Vec<(VariableId, QName)>) -> Vec<Capture> {
    locals
        .into_iter()
        .map(|(id, name)| {
            let base = name.local_name().to_string();
            let field_name = if class.field_index(&base).is_some() {
                format!("{}${}", base, id.0)
            } else {
                base
            };
            Capture {
                id,
                name,
                field: class.define_field(field_name),
            }
        })
        .collect()
}

fn helper_frame(node: u16, position: Position, captures: &[Capture]) -> Frame {
    let mut frame = Frame::new(node, position, TransletAccess::Field);
    frame.captured = captures
        .iter()
        .map(|capture| (capture.id, capture.field))
        .collect::<HashMap<_, _>>();
    frame
}

/// `<init>(translet)` stores the translet in field 0.
fn constructor() -> CodegenResult<MethodGen> {
    let mut builder = MethodBuilder::new(CONSTRUCTOR, vec!["translet".to_string()]);
    builder.emit(Instruction::Load(THIS_SLOT));
    builder.emit(Instruction::Load(1));
    builder.emit(Instruction::PutField(0));
    builder.emit(Instruction::Return);
    Ok(builder.finish()?)
}

impl MethodCompiler<'_, '_> {
    /// Compile the comparator helper for a group of sort keys and push a
    /// new instance of it.
    pub(crate) fn sort_helper(&mut self, sorts: &[Sort<TExpr>]) -> CodegenResult<SortSpec> {
        let name = self.t.context.next_helper_name();
        let mut class = ClassGen::new(name.clone(), Some(SORT_RECORD_CLASS.to_string()));
        class.define_field("translet");
        let captures = define_captures(
            &mut class,
            referenced_locals(sorts.iter().map(|sort| &sort.select)),
        );
        class.define_method(constructor()?);

        let params = ["level", "node", "position", "last"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let builder = MethodBuilder::new(EXTRACT_VALUE, params);
        let frame = helper_frame(2, Position::Locals { position: 3, last: 4 }, &captures);
        let mut extract = MethodCompiler::new(&mut *self.t, builder, frame);
        let default = extract.builder.new_label();
        extract.emit(Instruction::Load(1));
        let levels = (0..sorts.len() as i32).collect::<Vec<_>>();
        let switch = extract.builder.emit_switch(levels, default);
        for (level, sort) in sorts.iter().enumerate() {
            let label = extract.builder.label_here();
            extract.builder.set_switch_target(switch, level as i32, label);
            extract.expression(&sort.select)?;
            extract.emit(Instruction::ReturnValue);
        }
        extract.builder.place_label(default);
        extract.push_string("")?;
        extract.emit(Instruction::ReturnValue);
        class.define_method(extract.finish()?);

        log::trace!(
            "sort helper {} with {} levels captures {:?}",
            name,
            sorts.len(),
            captures.iter().map(|c| c.name.to_string()).collect::<Vec<_>>()
        );
        self.t.helpers.push(class);
        self.instantiate(&name, &captures)?;
        Ok(SortSpec {
            class: name,
            levels: sorts
                .iter()
                .map(|sort| SortLevel {
                    data_type: sort.data_type,
                    descending: sort.descending,
                    upper_first: sort.upper_first,
                    lang: sort.lang.clone(),
                })
                .collect(),
        })
    }

    /// Compile the counter helper of an `xsl:number` with `count` or
    /// `from` patterns and push a new instance of it; push null when there
    /// are neither.
    pub(crate) fn number_helper(
        &mut self,
        number: &NumberInstruction<TExpr>,
    ) -> CodegenResult<NumberSpec> {
        let spec = NumberSpec {
            level: number.level,
            has_count: number.count.is_some(),
            has_from: number.from.is_some(),
            format: number.format.clone(),
            grouping_separator: number.grouping_separator.clone(),
            grouping_size: number.grouping_size,
        };
        if number.count.is_none() && number.from.is_none() {
            self.push_constant(Constant::Null)?;
            return Ok(spec);
        }
        let name = self.t.context.next_helper_name();
        let mut class = ClassGen::new(name.clone(), Some(NODE_COUNTER_CLASS.to_string()));
        class.define_field("translet");
        let predicates = pattern_predicates(number.count.as_ref())
            .into_iter()
            .chain(pattern_predicates(number.from.as_ref()));
        let captures = define_captures(&mut class, referenced_locals(predicates));
        class.define_method(constructor()?);
        for (method, pattern) in [(MATCHES_COUNT, &number.count), (MATCHES_FROM, &number.from)] {
            let Some(pattern) = pattern else {
                continue;
            };
            let builder = MethodBuilder::new(method, vec!["node".to_string()]);
            let frame = helper_frame(1, Position::One, &captures);
            let mut matcher = MethodCompiler::new(&mut *self.t, builder, frame);
            let lists = matcher.match_pattern(pattern, 1, false)?;
            matcher.patch_here(lists.true_list);
            matcher.push_constant(Constant::Boolean(true))?;
            matcher.emit(Instruction::ReturnValue);
            matcher.patch_here(lists.false_list);
            matcher.push_constant(Constant::Boolean(false))?;
            matcher.emit(Instruction::ReturnValue);
            class.define_method(matcher.finish()?);
        }
        self.t.helpers.push(class);
        self.instantiate(&name, &captures)?;
        Ok(spec)
    }

    /// Construct a helper and copy the captured values into it.
    fn instantiate(&mut self, class: &str, captures: &[Capture]) -> CodegenResult<()> {
        let class_constant = self.constant(Constant::Class(class.to_string()))?;
        self.emit(Instruction::New(class_constant));
        self.emit(Instruction::Dup);
        self.load_translet();
        let init = self.constant(Constant::Method(MethodRef {
            class: class.to_string(),
            name: CONSTRUCTOR.to_string(),
            arity: 1,
        }))?;
        self.emit(Instruction::Invoke(init));
        self.emit(Instruction::Pop);
        for capture in captures {
            let slot = self.frame.locals.get(&capture.id).copied().ok_or_else(|| {
                CodegenError::Internal(format!("captured ${} is not in scope", capture.name))
            })?;
            self.emit(Instruction::Dup);
            self.emit(Instruction::Load(slot));
            self.emit(Instruction::PutField(capture.field));
        }
        Ok(())
    }

    /// Sort the node-set on the stack.
    pub(crate) fn sort(&mut self, sorts: &[Sort<TExpr>]) -> CodegenResult<()> {
        let spec = self.sort_helper(sorts)?;
        let spec = self.constant(Constant::Sort(spec))?;
        self.emit(Instruction::Sort(spec));
        Ok(())
    }

    /// Emit the number an `xsl:number` formats.
    pub(crate) fn number(&mut self, number: &NumberInstruction<TExpr>) -> CodegenResult<()> {
        if let Some(value) = &number.value {
            let spec = NumberSpec {
                level: number.level,
                has_count: false,
                has_from: false,
                format: number.format.clone(),
                grouping_separator: number.grouping_separator.clone(),
                grouping_size: number.grouping_size,
            };
            self.expression(value)?;
            let spec = self.constant(Constant::Counter(spec))?;
            self.emit(Instruction::FormatNumber(spec));
        } else {
            self.emit(Instruction::Load(self.frame.node));
            let spec = self.number_helper(number)?;
            let spec = self.constant(Constant::Counter(spec))?;
            self.emit(Instruction::Number(spec));
        }
        self.emit(Instruction::Characters);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ordered_float::OrderedFloat;
    use xsltc_bytecode::instruction::decode_instructions;
    use xsltc_bytecode::{NumberLevel, SortDataType};

    use super::*;
    use crate::context::CompilationContext;
    use crate::functions::PrimOp;
    use crate::loader::Stylesheet;
    use crate::symbols::SymbolTable;
    use crate::translate::Translation;
    use crate::typecheck::{TExprKind, VariableRef};
    use crate::types::Type;

    fn local(id: usize, name: &str) -> TExpr {
        TExpr::new(
            TExprKind::Variable(VariableRef::Local {
                id: VariableId(id),
                name: QName::unprefixed(name),
            }),
            Type::Reference,
        )
    }

    fn times(left: TExpr, right: TExpr) -> TExpr {
        TExpr::new(
            TExprKind::PrimOp(
                PrimOp::Mul,
                Box::new(left.cast(&Type::Real)),
                Box::new(right.cast(&Type::Real)),
            ),
            Type::Real,
        )
    }

    fn sort(select: TExpr) -> Sort<TExpr> {
        Sort {
            select,
            data_type: SortDataType::Number,
            descending: false,
            upper_first: None,
            lang: None,
        }
    }

    #[test]
    fn test_captures_in_first_reference_order() {
        let mut context = CompilationContext::new("T");
        let symbols = SymbolTable::new();
        let stylesheet = Stylesheet::empty();
        let mut translation = Translation::new(&mut context, &symbols, &stylesheet);
        let builder = MethodBuilder::new("m", vec!["node".to_string()]);
        let mut frame = Frame::new(1, Position::One, TransletAccess::This);
        frame.locals.insert(VariableId(5), 2);
        frame.locals.insert(VariableId(9), 3);
        let mut compiler = MethodCompiler::new(&mut translation, builder, frame);
        // $x * $y, then $x * 2
        let sorts = vec![
            sort(times(local(5, "x"), local(9, "y"))),
            sort(times(
                local(5, "x"),
                TExpr::new(TExprKind::Number(OrderedFloat(2.0)), Type::Real),
            )),
        ];
        compiler.emit(Instruction::Load(1));
        compiler.sort(&sorts).unwrap();
        compiler.emit(Instruction::Return);
        compiler.finish().unwrap();

        let helper = &translation.helpers[0];
        assert_eq!(helper.name, "T$1");
        assert_eq!(helper.superclass.as_deref(), Some(SORT_RECORD_CLASS));
        let fields = helper
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["translet", "x", "y"]);
        let extract = helper.method(EXTRACT_VALUE).unwrap();
        assert_eq!(extract.switch_tables[0].keys, vec![0, 1]);
    }

    #[test]
    fn test_number_without_patterns_has_no_helper() {
        let mut context = CompilationContext::new("T");
        let symbols = SymbolTable::new();
        let stylesheet = Stylesheet::empty();
        let mut translation = Translation::new(&mut context, &symbols, &stylesheet);
        let builder = MethodBuilder::new("m", vec!["node".to_string()]);
        let frame = Frame::new(1, Position::One, TransletAccess::This);
        let mut compiler = MethodCompiler::new(&mut translation, builder, frame);
        let number = NumberInstruction {
            level: NumberLevel::Single,
            count: None,
            from: None,
            value: None,
            format: "1".to_string(),
            grouping_separator: None,
            grouping_size: None,
        };
        compiler.number(&number).unwrap();
        compiler.emit(Instruction::Return);
        let method = compiler.finish().unwrap();
        assert!(translation.helpers.is_empty());
        let instructions = decode_instructions(&method.code)
            .into_iter()
            .map(|(_, instruction)| instruction)
            .collect::<Vec<_>>();
        assert!(matches!(instructions[0], Instruction::Load(1)));
        assert!(matches!(instructions[1], Instruction::Const(_)));
        assert!(matches!(instructions[2], Instruction::Number(_)));
        assert!(matches!(instructions[3], Instruction::Characters));
    }
}
