#[macro_use]
extern crate num_derive;

mod builder;
mod constant;
mod disassemble;
pub mod dom;
mod error;
mod foreign;
pub mod instruction;
mod library;
mod unit;

pub use builder::{ForwardJumpRef, JumpCondition, Label, MethodBuilder, SwitchRef};
pub use constant::{
    Axis, Constant, MethodRef, NumberLevel, NumberSpec, SortDataType, SortLevel, SortSpec,
    StepSpec, StepTest,
};
pub use disassemble::disassemble;
pub use error::BytecodeError;
pub use foreign::{ForeignCallKind, ForeignMethodRef, ForeignType};
pub use instruction::Instruction;
pub use library::Builtin;
pub use unit::{
    ClassGen, FieldGen, LocalVariable, MethodGen, NameEntry, NameKind, OutputProperties,
    SwitchTable, Translet, MAX_BRANCH_OFFSET, MAX_METHOD_SIZE, MIN_BRANCH_OFFSET,
};
