use ahash::{HashMap, HashMapExt};

use crate::constant::Constant;
use crate::error::BytecodeError;
use crate::instruction::{encode_instruction, instruction_size, Instruction};
use crate::unit::{
    LocalVariable, MethodGen, SwitchTable, MAX_BRANCH_OFFSET, MAX_METHOD_SIZE, MIN_BRANCH_OFFSET,
};

/// A position in the code that branches can target before it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// A branch whose target is still open.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForwardJumpRef(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwitchRef(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpCondition {
    Always,
    True,
    False,
}

#[derive(Debug)]
struct SwitchBuilder {
    keys: Vec<i32>,
    targets: HashMap<i32, Label>,
    default: Label,
}

/// Emits the body of one method. Branches are placeholders patched to
/// labels; offsets are resolved when the method is finished.
#[derive(Debug)]
pub struct MethodBuilder {
    name: String,
    params: Vec<String>,
    compiled: Vec<u8>,
    lines: Vec<u32>,
    line: u32,
    constants: Vec<Constant>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    switches: Vec<SwitchBuilder>,
    locals: Vec<LocalVariable>,
    live: HashMap<u16, usize>,
    free_slots: Vec<u16>,
    next_slot: u16,
}

impl MethodBuilder {
    /// Start a method. Slot 0 holds the receiver, the parameters follow.
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        let mut builder = MethodBuilder {
            name: name.into(),
            params: Vec::new(),
            compiled: Vec::new(),
            lines: Vec::new(),
            line: 0,
            constants: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            switches: Vec::new(),
            locals: Vec::new(),
            live: HashMap::new(),
            free_slots: Vec::new(),
            next_slot: 0,
        };
        builder.open_local("this");
        for param in &params {
            builder.open_local(param);
        }
        builder.params = params;
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> usize {
        self.compiled.len()
    }

    /// Attribute subsequently emitted code to a stylesheet line.
    pub fn set_line(&mut self, line: Option<u32>) {
        self.line = line.unwrap_or(0);
    }

    pub fn emit(&mut self, instruction: Instruction) {
        for _ in 0..instruction_size(&instruction) {
            self.lines.push(self.line);
        }
        encode_instruction(instruction, &mut self.compiled);
    }

    pub fn add_constant(&mut self, constant: Constant) -> Result<u16, BytecodeError> {
        if let Some(index) = self.constants.iter().position(|c| c == &constant) {
            return Ok(index as u16);
        }
        let constant_id = self.constants.len();
        if constant_id > (u16::MAX as usize) {
            return Err(BytecodeError::TooManyConstants(self.name.clone()));
        }
        self.constants.push(constant);
        Ok(constant_id as u16)
    }

    pub fn emit_constant(&mut self, constant: Constant) -> Result<(), BytecodeError> {
        let constant_id = self.add_constant(constant)?;
        self.emit(Instruction::Const(constant_id));
        Ok(())
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn place_label(&mut self, label: Label) {
        self.labels[label.0] = Some(self.compiled.len());
    }

    pub fn is_placed(&self, label: Label) -> bool {
        self.labels[label.0].is_some()
    }

    /// A fresh label placed at the current position.
    pub fn label_here(&mut self) -> Label {
        let label = self.new_label();
        self.place_label(label);
        label
    }

    pub fn emit_jump_forward(&mut self, condition: JumpCondition) -> ForwardJumpRef {
        let index = self.compiled.len();
        match condition {
            JumpCondition::True => self.emit(Instruction::JumpIfTrue(0)),
            JumpCondition::False => self.emit(Instruction::JumpIfFalse(0)),
            JumpCondition::Always => self.emit(Instruction::Jump(0)),
        }
        ForwardJumpRef(index)
    }

    /// Point an open branch at `label`. The label may be placed before or
    /// after the branch, now or later.
    pub fn patch_jump(&mut self, jump_ref: ForwardJumpRef, label: Label) {
        self.fixups.push((jump_ref.0, label));
    }

    /// Point an open branch at the current position.
    pub fn patch_jump_here(&mut self, jump_ref: ForwardJumpRef) {
        let label = self.label_here();
        self.patch_jump(jump_ref, label);
    }

    pub fn emit_jump(&mut self, condition: JumpCondition, label: Label) {
        let jump_ref = self.emit_jump_forward(condition);
        self.patch_jump(jump_ref, label);
    }

    /// Emit a `Switch` on the integer on top of the stack. Keys without a
    /// target set later go to `default`.
    pub fn emit_switch(&mut self, mut keys: Vec<i32>, default: Label) -> SwitchRef {
        keys.sort_unstable();
        keys.dedup();
        let index = self.switches.len();
        self.switches.push(SwitchBuilder {
            keys,
            targets: HashMap::new(),
            default,
        });
        self.emit(Instruction::Switch(index as u16));
        SwitchRef(index)
    }

    pub fn set_switch_target(&mut self, switch: SwitchRef, key: i32, label: Label) {
        self.switches[switch.0].targets.insert(key, label);
    }

    fn open_local(&mut self, name: &str) -> u16 {
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot = self.next_slot.saturating_add(1);
                slot
            }
        };
        self.locals.push(LocalVariable {
            name: name.to_string(),
            slot,
            start: self.compiled.len(),
            end: usize::MAX,
        });
        self.live.insert(slot, self.locals.len() - 1);
        slot
    }

    /// Allocate a local slot, live from here until released.
    pub fn allocate_local(&mut self, name: &str) -> Result<u16, BytecodeError> {
        if self.free_slots.is_empty() && self.next_slot == u16::MAX {
            return Err(BytecodeError::TooManyLocals(self.name.clone()));
        }
        Ok(self.open_local(name))
    }

    /// End a local's liveness range and make its slot reusable.
    pub fn release_local(&mut self, slot: u16) {
        if let Some(index) = self.live.remove(&slot) {
            self.locals[index].end = self.compiled.len();
            self.free_slots.push(slot);
        }
    }

    fn resolve(&self, label: Label) -> Result<usize, BytecodeError> {
        self.labels[label.0].ok_or_else(|| BytecodeError::UnplacedLabel(self.name.clone()))
    }

    pub fn finish(mut self) -> Result<MethodGen, BytecodeError> {
        if self.compiled.len() > MAX_METHOD_SIZE {
            return Err(BytecodeError::MethodTooLarge(self.name.clone()));
        }
        for (position, label) in std::mem::take(&mut self.fixups) {
            let target = self.resolve(label)? as isize;
            // offsets are relative to the end of the 3 byte jump
            let offset = target - (position as isize + 3);
            if !(MIN_BRANCH_OFFSET..=MAX_BRANCH_OFFSET).contains(&offset) {
                return Err(BytecodeError::BranchOutOfRange(self.name.clone()));
            }
            let offset_bytes = (offset as i16).to_le_bytes();
            self.compiled[position + 1] = offset_bytes[0];
            self.compiled[position + 2] = offset_bytes[1];
        }
        let mut switch_tables = Vec::with_capacity(self.switches.len());
        for switch in &self.switches {
            let mut targets = Vec::with_capacity(switch.keys.len());
            for key in &switch.keys {
                let label = switch.targets.get(key).copied().unwrap_or(switch.default);
                targets.push(self.resolve(label)? as u32);
            }
            switch_tables.push(SwitchTable {
                keys: switch.keys.clone(),
                targets,
                default: self.resolve(switch.default)? as u32,
            });
        }
        let end = self.compiled.len();
        for local in &mut self.locals {
            if local.end == usize::MAX {
                local.end = end;
            }
        }
        Ok(MethodGen {
            name: self.name,
            params: self.params,
            max_locals: self.next_slot,
            code: self.compiled,
            lines: self.lines,
            constants: self.constants,
            switch_tables,
            locals: self.locals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::decode_instructions;

    #[test]
    fn test_forward_and_backward_labels() {
        let mut builder = MethodBuilder::new("m", vec!["it".to_string()]);
        let top = builder.label_here();
        let exit = builder.new_label();
        builder.emit(Instruction::IterNext(1, 2));
        builder.emit_jump(JumpCondition::False, exit);
        builder.emit_jump(JumpCondition::Always, top);
        builder.place_label(exit);
        builder.emit(Instruction::Return);
        let method = builder.finish().unwrap();
        let decoded = decode_instructions(&method.code);
        assert_eq!(
            decoded,
            vec![
                (0, Instruction::IterNext(1, 2)),
                (5, Instruction::JumpIfFalse(3)),
                (8, Instruction::Jump(-11)),
                (11, Instruction::Return),
            ]
        );
    }

    #[test]
    fn test_unplaced_label_is_an_error() {
        let mut builder = MethodBuilder::new("m", vec![]);
        let nowhere = builder.new_label();
        builder.emit_jump(JumpCondition::Always, nowhere);
        assert_eq!(
            builder.finish(),
            Err(BytecodeError::UnplacedLabel("m".to_string()))
        );
    }

    #[test]
    fn test_branch_out_of_range() {
        let mut builder = MethodBuilder::new("m", vec![]);
        let end = builder.new_label();
        builder.emit_jump(JumpCondition::Always, end);
        for _ in 0..40000 {
            builder.emit(Instruction::Pop);
        }
        builder.place_label(end);
        assert_eq!(
            builder.finish(),
            Err(BytecodeError::BranchOutOfRange("m".to_string()))
        );
    }

    #[test]
    fn test_switch_targets_and_default() {
        let mut builder = MethodBuilder::new("m", vec![]);
        let default = builder.new_label();
        let three = builder.new_label();
        let switch = builder.emit_switch(vec![3, 1, 3], default);
        builder.set_switch_target(switch, 3, three);
        builder.place_label(three);
        builder.emit(Instruction::Pop);
        builder.place_label(default);
        builder.emit(Instruction::Return);
        let method = builder.finish().unwrap();
        let table = &method.switch_tables[0];
        assert_eq!(table.keys, vec![1, 3]);
        assert_eq!(table.target(3), 3);
        assert_eq!(table.target(1), 4);
        assert_eq!(table.target(99), 4);
    }

    #[test]
    fn test_local_slots_are_reused_after_release() {
        let mut builder = MethodBuilder::new("m", vec!["node".to_string()]);
        let a = builder.allocate_local("a").unwrap();
        assert_eq!(a, 2);
        builder.emit(Instruction::Pop);
        builder.release_local(a);
        let b = builder.allocate_local("b").unwrap();
        assert_eq!(b, 2);
        builder.emit(Instruction::Return);
        let method = builder.finish().unwrap();
        assert_eq!(method.max_locals, 3);
        let a_record = method.locals.iter().find(|l| l.name == "a").unwrap();
        assert_eq!((a_record.start, a_record.end), (0, 1));
        let b_record = method.locals.iter().find(|l| l.name == "b").unwrap();
        assert_eq!((b_record.start, b_record.end), (1, 2));
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let mut builder = MethodBuilder::new("m", vec![]);
        let a = builder.add_constant(Constant::String("x".to_string())).unwrap();
        let b = builder.add_constant(Constant::Null).unwrap();
        let c = builder.add_constant(Constant::String("x".to_string())).unwrap();
        assert_eq!((a, b, c), (0, 1, 0));
    }
}
