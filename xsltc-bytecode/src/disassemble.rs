use std::fmt::Write;

use crate::constant::Constant;
use crate::instruction::{decode_instructions, Instruction};
use crate::unit::MethodGen;

fn describe_constant(constant: &Constant) -> String {
    match constant {
        Constant::Null => "null".to_string(),
        Constant::Boolean(b) => b.to_string(),
        Constant::Number(n) => n.to_string(),
        Constant::String(s) => format!("{:?}", s),
        Constant::Class(name) => format!("class {}", name),
        Constant::Method(method) => format!("{}.{}/{}", method.class, method.name, method.arity),
        Constant::Foreign(foreign) => format!("foreign {}.{}", foreign.class, foreign.method),
        Constant::Step(step) => format!("{:?}::{:?}", step.axis, step.test),
        Constant::Sort(sort) => format!("sort {} ({} levels)", sort.class, sort.levels.len()),
        Constant::Counter(number) => format!("number {:?} {:?}", number.level, number.format),
    }
}

fn constant_operand(instruction: &Instruction) -> Option<u16> {
    match instruction {
        Instruction::Const(c)
        | Instruction::New(c)
        | Instruction::Invoke(c)
        | Instruction::InvokeForeign(c)
        | Instruction::Step(c)
        | Instruction::AxisStep(c)
        | Instruction::AddParam(c)
        | Instruction::GetParam(c)
        | Instruction::KeyIndexAdd(c)
        | Instruction::KeyMatches(c)
        | Instruction::Sort(c)
        | Instruction::Number(c)
        | Instruction::FormatNumber(c) => Some(*c),
        _ => None,
    }
}

/// Render a method's code one instruction per line, resolving constant
/// operands, jump targets and switch tables.
pub fn disassemble(method: &MethodGen) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "method {}({}) locals={}",
        method.name,
        method.params.join(", "),
        method.max_locals
    );
    for (offset, instruction) in decode_instructions(&method.code) {
        let _ = write!(out, "{:5}  {:?}", offset, instruction);
        match &instruction {
            Instruction::Jump(displacement)
            | Instruction::JumpIfTrue(displacement)
            | Instruction::JumpIfFalse(displacement) => {
                let target = offset as isize + 3 + *displacement as isize;
                let _ = write!(out, " -> {}", target);
            }
            Instruction::Switch(table) => {
                if let Some(table) = method.switch_tables.get(*table as usize) {
                    let cases = table
                        .keys
                        .iter()
                        .zip(&table.targets)
                        .map(|(key, target)| format!("{}: {}", key, target))
                        .collect::<Vec<_>>();
                    let _ = write!(out, " [{}] default {}", cases.join(", "), table.default);
                }
            }
            _ => {
                if let Some(constant) =
                    constant_operand(&instruction).and_then(|c| method.constants.get(c as usize))
                {
                    let _ = write!(out, " ; {}", describe_constant(constant));
                }
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{JumpCondition, MethodBuilder};

    #[test]
    fn test_disassemble_loop() {
        let mut builder = MethodBuilder::new("loop", vec!["it".to_string()]);
        let top = builder.label_here();
        let done = builder.new_label();
        builder.emit(Instruction::IterNext(1, 2));
        builder.emit_jump(JumpCondition::False, done);
        builder
            .emit_constant(Constant::String("hi".to_string()))
            .unwrap();
        builder.emit(Instruction::Characters);
        builder.emit_jump(JumpCondition::Always, top);
        builder.place_label(done);
        builder.emit(Instruction::Return);
        let method = builder.finish().unwrap();
        insta::assert_snapshot!(disassemble(&method), @r###"
        method loop(it) locals=2
            0  IterNext(1, 2)
            5  JumpIfFalse(7) -> 15
            8  Const(0) ; "hi"
           11  Characters
           12  Jump(-15) -> 0
           15  Return
        "###);
    }
}
