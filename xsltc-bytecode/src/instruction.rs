use num_traits::{FromPrimitive, ToPrimitive};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    // stack and locals
    Const(u16),
    Pop,
    Dup,
    Swap,
    Load(u16),
    Store(u16),
    GetField(u16),
    PutField(u16),
    New(u16),
    Invoke(u16),
    InvokeForeign(u16),
    Return,
    ReturnValue,
    // control flow
    Jump(i16),
    JumpIfTrue(i16),
    JumpIfFalse(i16),
    Switch(u16),
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    // comparison of primitive operands
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // general comparison, node-sets and references
    GenEq,
    GenNe,
    GenLt,
    GenLe,
    GenGt,
    GenGe,
    // booleans
    Not,
    IsNull,
    // conversions
    ToBoolean,
    ToNumber,
    ToString,
    ToNodeSet,
    ToNode,
    // tree access
    NodeType,
    NodeKind,
    NamespaceType,
    Parent,
    Root,
    NodeEq,
    Step(u16),
    AxisStep(u16),
    Union,
    DocOrder,
    // iteration
    Iterate,
    IterNext(u16, u16),
    IterPosition(u16),
    IterLast(u16),
    // node-set construction
    BuildNew,
    BuildPush,
    BuildAppend,
    BuildComplete,
    // function library
    CallBuiltin(u16),
    Concat(u8),
    // output
    StartElement,
    EndElement,
    Attribute,
    Characters,
    Comment,
    ProcessingInstruction,
    ShallowCopy,
    EndCopy,
    CopyOf,
    PushOutput,
    PopOutput,
    Message(u8),
    // parameters
    PushParamFrame,
    PopParamFrame,
    AddParam(u16),
    GetParam(u16),
    // keys and ids
    KeyIndexAdd(u16),
    KeyMatches(u16),
    IdMatches,
    // sorting and numbering
    Sort(u16),
    Number(u16),
    FormatNumber(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToPrimitive, FromPrimitive)]
pub enum EncodedInstruction {
    Const,
    Pop,
    Dup,
    Swap,
    Load,
    Store,
    GetField,
    PutField,
    New,
    Invoke,
    InvokeForeign,
    Return,
    ReturnValue,
    Jump,
    JumpIfTrue,
    JumpIfFalse,
    Switch,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    GenEq,
    GenNe,
    GenLt,
    GenLe,
    GenGt,
    GenGe,
    Not,
    IsNull,
    ToBoolean,
    ToNumber,
    ToString,
    ToNodeSet,
    ToNode,
    NodeType,
    NodeKind,
    NamespaceType,
    Parent,
    Root,
    NodeEq,
    Step,
    AxisStep,
    Union,
    DocOrder,
    Iterate,
    IterNext,
    IterPosition,
    IterLast,
    BuildNew,
    BuildPush,
    BuildAppend,
    BuildComplete,
    CallBuiltin,
    Concat,
    StartElement,
    EndElement,
    Attribute,
    Characters,
    Comment,
    ProcessingInstruction,
    ShallowCopy,
    EndCopy,
    CopyOf,
    PushOutput,
    PopOutput,
    Message,
    PushParamFrame,
    PopParamFrame,
    AddParam,
    GetParam,
    KeyIndexAdd,
    KeyMatches,
    IdMatches,
    Sort,
    Number,
    FormatNumber,
}

/// Decode a single instruction from the start of the slice, returning it
/// with its size in bytes.
pub fn decode_instruction(bytes: &[u8]) -> Option<(Instruction, usize)> {
    let encoded_instruction = EncodedInstruction::from_u8(*bytes.first()?)?;
    Some(match encoded_instruction {
        EncodedInstruction::Const => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Const(operand), 3)
        }
        EncodedInstruction::Pop => (Instruction::Pop, 1),
        EncodedInstruction::Dup => (Instruction::Dup, 1),
        EncodedInstruction::Swap => (Instruction::Swap, 1),
        EncodedInstruction::Load => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Load(operand), 3)
        }
        EncodedInstruction::Store => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Store(operand), 3)
        }
        EncodedInstruction::GetField => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::GetField(operand), 3)
        }
        EncodedInstruction::PutField => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::PutField(operand), 3)
        }
        EncodedInstruction::New => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::New(operand), 3)
        }
        EncodedInstruction::Invoke => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Invoke(operand), 3)
        }
        EncodedInstruction::InvokeForeign => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::InvokeForeign(operand), 3)
        }
        EncodedInstruction::Return => (Instruction::Return, 1),
        EncodedInstruction::ReturnValue => (Instruction::ReturnValue, 1),
        EncodedInstruction::Jump => {
            let operand = i16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Jump(operand), 3)
        }
        EncodedInstruction::JumpIfTrue => {
            let operand = i16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::JumpIfTrue(operand), 3)
        }
        EncodedInstruction::JumpIfFalse => {
            let operand = i16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::JumpIfFalse(operand), 3)
        }
        EncodedInstruction::Switch => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Switch(operand), 3)
        }
        EncodedInstruction::Add => (Instruction::Add, 1),
        EncodedInstruction::Sub => (Instruction::Sub, 1),
        EncodedInstruction::Mul => (Instruction::Mul, 1),
        EncodedInstruction::Div => (Instruction::Div, 1),
        EncodedInstruction::Mod => (Instruction::Mod, 1),
        EncodedInstruction::Negate => (Instruction::Negate, 1),
        EncodedInstruction::Eq => (Instruction::Eq, 1),
        EncodedInstruction::Ne => (Instruction::Ne, 1),
        EncodedInstruction::Lt => (Instruction::Lt, 1),
        EncodedInstruction::Le => (Instruction::Le, 1),
        EncodedInstruction::Gt => (Instruction::Gt, 1),
        EncodedInstruction::Ge => (Instruction::Ge, 1),
        EncodedInstruction::GenEq => (Instruction::GenEq, 1),
        EncodedInstruction::GenNe => (Instruction::GenNe, 1),
        EncodedInstruction::GenLt => (Instruction::GenLt, 1),
        EncodedInstruction::GenLe => (Instruction::GenLe, 1),
        EncodedInstruction::GenGt => (Instruction::GenGt, 1),
        EncodedInstruction::GenGe => (Instruction::GenGe, 1),
        EncodedInstruction::Not => (Instruction::Not, 1),
        EncodedInstruction::IsNull => (Instruction::IsNull, 1),
        EncodedInstruction::ToBoolean => (Instruction::ToBoolean, 1),
        EncodedInstruction::ToNumber => (Instruction::ToNumber, 1),
        EncodedInstruction::ToString => (Instruction::ToString, 1),
        EncodedInstruction::ToNodeSet => (Instruction::ToNodeSet, 1),
        EncodedInstruction::ToNode => (Instruction::ToNode, 1),
        EncodedInstruction::NodeType => (Instruction::NodeType, 1),
        EncodedInstruction::NodeKind => (Instruction::NodeKind, 1),
        EncodedInstruction::NamespaceType => (Instruction::NamespaceType, 1),
        EncodedInstruction::Parent => (Instruction::Parent, 1),
        EncodedInstruction::Root => (Instruction::Root, 1),
        EncodedInstruction::NodeEq => (Instruction::NodeEq, 1),
        EncodedInstruction::Step => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Step(operand), 3)
        }
        EncodedInstruction::AxisStep => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::AxisStep(operand), 3)
        }
        EncodedInstruction::Union => (Instruction::Union, 1),
        EncodedInstruction::DocOrder => (Instruction::DocOrder, 1),
        EncodedInstruction::Iterate => (Instruction::Iterate, 1),
        EncodedInstruction::IterNext => {
            let first = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            let second = u16::from_le_bytes([*bytes.get(3)?, *bytes.get(4)?]);
            (Instruction::IterNext(first, second), 5)
        }
        EncodedInstruction::IterPosition => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::IterPosition(operand), 3)
        }
        EncodedInstruction::IterLast => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::IterLast(operand), 3)
        }
        EncodedInstruction::BuildNew => (Instruction::BuildNew, 1),
        EncodedInstruction::BuildPush => (Instruction::BuildPush, 1),
        EncodedInstruction::BuildAppend => (Instruction::BuildAppend, 1),
        EncodedInstruction::BuildComplete => (Instruction::BuildComplete, 1),
        EncodedInstruction::CallBuiltin => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::CallBuiltin(operand), 3)
        }
        EncodedInstruction::Concat => (Instruction::Concat(*bytes.get(1)?), 2),
        EncodedInstruction::StartElement => (Instruction::StartElement, 1),
        EncodedInstruction::EndElement => (Instruction::EndElement, 1),
        EncodedInstruction::Attribute => (Instruction::Attribute, 1),
        EncodedInstruction::Characters => (Instruction::Characters, 1),
        EncodedInstruction::Comment => (Instruction::Comment, 1),
        EncodedInstruction::ProcessingInstruction => (Instruction::ProcessingInstruction, 1),
        EncodedInstruction::ShallowCopy => (Instruction::ShallowCopy, 1),
        EncodedInstruction::EndCopy => (Instruction::EndCopy, 1),
        EncodedInstruction::CopyOf => (Instruction::CopyOf, 1),
        EncodedInstruction::PushOutput => (Instruction::PushOutput, 1),
        EncodedInstruction::PopOutput => (Instruction::PopOutput, 1),
        EncodedInstruction::Message => (Instruction::Message(*bytes.get(1)?), 2),
        EncodedInstruction::PushParamFrame => (Instruction::PushParamFrame, 1),
        EncodedInstruction::PopParamFrame => (Instruction::PopParamFrame, 1),
        EncodedInstruction::AddParam => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::AddParam(operand), 3)
        }
        EncodedInstruction::GetParam => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::GetParam(operand), 3)
        }
        EncodedInstruction::KeyIndexAdd => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::KeyIndexAdd(operand), 3)
        }
        EncodedInstruction::KeyMatches => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::KeyMatches(operand), 3)
        }
        EncodedInstruction::IdMatches => (Instruction::IdMatches, 1),
        EncodedInstruction::Sort => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Sort(operand), 3)
        }
        EncodedInstruction::Number => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::Number(operand), 3)
        }
        EncodedInstruction::FormatNumber => {
            let operand = u16::from_le_bytes([*bytes.get(1)?, *bytes.get(2)?]);
            (Instruction::FormatNumber(operand), 3)
        }
    })
}

pub fn decode_instructions(bytes: &[u8]) -> Vec<(usize, Instruction)> {
    let mut instructions = Vec::new();
    let mut ip = 0;
    while ip < bytes.len() {
        match decode_instruction(&bytes[ip..]) {
            Some((instruction, instruction_size)) => {
                instructions.push((ip, instruction));
                ip += instruction_size;
            }
            None => break,
        }
    }
    instructions
}

fn opcode(encoded: EncodedInstruction) -> u8 {
    // the encoded enum has far fewer than 256 variants
    encoded.to_u8().unwrap_or(u8::MAX)
}

pub fn encode_instruction(instruction: Instruction, bytes: &mut Vec<u8>) {
    match instruction {
        Instruction::Const(operand) => {
            bytes.push(opcode(EncodedInstruction::Const));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Pop => bytes.push(opcode(EncodedInstruction::Pop)),
        Instruction::Dup => bytes.push(opcode(EncodedInstruction::Dup)),
        Instruction::Swap => bytes.push(opcode(EncodedInstruction::Swap)),
        Instruction::Load(operand) => {
            bytes.push(opcode(EncodedInstruction::Load));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Store(operand) => {
            bytes.push(opcode(EncodedInstruction::Store));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::GetField(operand) => {
            bytes.push(opcode(EncodedInstruction::GetField));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::PutField(operand) => {
            bytes.push(opcode(EncodedInstruction::PutField));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::New(operand) => {
            bytes.push(opcode(EncodedInstruction::New));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Invoke(operand) => {
            bytes.push(opcode(EncodedInstruction::Invoke));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::InvokeForeign(operand) => {
            bytes.push(opcode(EncodedInstruction::InvokeForeign));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Return => bytes.push(opcode(EncodedInstruction::Return)),
        Instruction::ReturnValue => bytes.push(opcode(EncodedInstruction::ReturnValue)),
        Instruction::Jump(operand) => {
            bytes.push(opcode(EncodedInstruction::Jump));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::JumpIfTrue(operand) => {
            bytes.push(opcode(EncodedInstruction::JumpIfTrue));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::JumpIfFalse(operand) => {
            bytes.push(opcode(EncodedInstruction::JumpIfFalse));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Switch(operand) => {
            bytes.push(opcode(EncodedInstruction::Switch));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Add => bytes.push(opcode(EncodedInstruction::Add)),
        Instruction::Sub => bytes.push(opcode(EncodedInstruction::Sub)),
        Instruction::Mul => bytes.push(opcode(EncodedInstruction::Mul)),
        Instruction::Div => bytes.push(opcode(EncodedInstruction::Div)),
        Instruction::Mod => bytes.push(opcode(EncodedInstruction::Mod)),
        Instruction::Negate => bytes.push(opcode(EncodedInstruction::Negate)),
        Instruction::Eq => bytes.push(opcode(EncodedInstruction::Eq)),
        Instruction::Ne => bytes.push(opcode(EncodedInstruction::Ne)),
        Instruction::Lt => bytes.push(opcode(EncodedInstruction::Lt)),
        Instruction::Le => bytes.push(opcode(EncodedInstruction::Le)),
        Instruction::Gt => bytes.push(opcode(EncodedInstruction::Gt)),
        Instruction::Ge => bytes.push(opcode(EncodedInstruction::Ge)),
        Instruction::GenEq => bytes.push(opcode(EncodedInstruction::GenEq)),
        Instruction::GenNe => bytes.push(opcode(EncodedInstruction::GenNe)),
        Instruction::GenLt => bytes.push(opcode(EncodedInstruction::GenLt)),
        Instruction::GenLe => bytes.push(opcode(EncodedInstruction::GenLe)),
        Instruction::GenGt => bytes.push(opcode(EncodedInstruction::GenGt)),
        Instruction::GenGe => bytes.push(opcode(EncodedInstruction::GenGe)),
        Instruction::Not => bytes.push(opcode(EncodedInstruction::Not)),
        Instruction::IsNull => bytes.push(opcode(EncodedInstruction::IsNull)),
        Instruction::ToBoolean => bytes.push(opcode(EncodedInstruction::ToBoolean)),
        Instruction::ToNumber => bytes.push(opcode(EncodedInstruction::ToNumber)),
        Instruction::ToString => bytes.push(opcode(EncodedInstruction::ToString)),
        Instruction::ToNodeSet => bytes.push(opcode(EncodedInstruction::ToNodeSet)),
        Instruction::ToNode => bytes.push(opcode(EncodedInstruction::ToNode)),
        Instruction::NodeType => bytes.push(opcode(EncodedInstruction::NodeType)),
        Instruction::NodeKind => bytes.push(opcode(EncodedInstruction::NodeKind)),
        Instruction::NamespaceType => bytes.push(opcode(EncodedInstruction::NamespaceType)),
        Instruction::Parent => bytes.push(opcode(EncodedInstruction::Parent)),
        Instruction::Root => bytes.push(opcode(EncodedInstruction::Root)),
        Instruction::NodeEq => bytes.push(opcode(EncodedInstruction::NodeEq)),
        Instruction::Step(operand) => {
            bytes.push(opcode(EncodedInstruction::Step));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::AxisStep(operand) => {
            bytes.push(opcode(EncodedInstruction::AxisStep));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Union => bytes.push(opcode(EncodedInstruction::Union)),
        Instruction::DocOrder => bytes.push(opcode(EncodedInstruction::DocOrder)),
        Instruction::Iterate => bytes.push(opcode(EncodedInstruction::Iterate)),
        Instruction::IterNext(first, second) => {
            bytes.push(opcode(EncodedInstruction::IterNext));
            bytes.extend_from_slice(&first.to_le_bytes());
            bytes.extend_from_slice(&second.to_le_bytes());
        }
        Instruction::IterPosition(operand) => {
            bytes.push(opcode(EncodedInstruction::IterPosition));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::IterLast(operand) => {
            bytes.push(opcode(EncodedInstruction::IterLast));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::BuildNew => bytes.push(opcode(EncodedInstruction::BuildNew)),
        Instruction::BuildPush => bytes.push(opcode(EncodedInstruction::BuildPush)),
        Instruction::BuildAppend => bytes.push(opcode(EncodedInstruction::BuildAppend)),
        Instruction::BuildComplete => bytes.push(opcode(EncodedInstruction::BuildComplete)),
        Instruction::CallBuiltin(operand) => {
            bytes.push(opcode(EncodedInstruction::CallBuiltin));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Concat(operand) => {
            bytes.push(opcode(EncodedInstruction::Concat));
            bytes.push(operand);
        }
        Instruction::StartElement => bytes.push(opcode(EncodedInstruction::StartElement)),
        Instruction::EndElement => bytes.push(opcode(EncodedInstruction::EndElement)),
        Instruction::Attribute => bytes.push(opcode(EncodedInstruction::Attribute)),
        Instruction::Characters => bytes.push(opcode(EncodedInstruction::Characters)),
        Instruction::Comment => bytes.push(opcode(EncodedInstruction::Comment)),
        Instruction::ProcessingInstruction => bytes.push(opcode(EncodedInstruction::ProcessingInstruction)),
        Instruction::ShallowCopy => bytes.push(opcode(EncodedInstruction::ShallowCopy)),
        Instruction::EndCopy => bytes.push(opcode(EncodedInstruction::EndCopy)),
        Instruction::CopyOf => bytes.push(opcode(EncodedInstruction::CopyOf)),
        Instruction::PushOutput => bytes.push(opcode(EncodedInstruction::PushOutput)),
        Instruction::PopOutput => bytes.push(opcode(EncodedInstruction::PopOutput)),
        Instruction::Message(operand) => {
            bytes.push(opcode(EncodedInstruction::Message));
            bytes.push(operand);
        }
        Instruction::PushParamFrame => bytes.push(opcode(EncodedInstruction::PushParamFrame)),
        Instruction::PopParamFrame => bytes.push(opcode(EncodedInstruction::PopParamFrame)),
        Instruction::AddParam(operand) => {
            bytes.push(opcode(EncodedInstruction::AddParam));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::GetParam(operand) => {
            bytes.push(opcode(EncodedInstruction::GetParam));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::KeyIndexAdd(operand) => {
            bytes.push(opcode(EncodedInstruction::KeyIndexAdd));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::KeyMatches(operand) => {
            bytes.push(opcode(EncodedInstruction::KeyMatches));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::IdMatches => bytes.push(opcode(EncodedInstruction::IdMatches)),
        Instruction::Sort(operand) => {
            bytes.push(opcode(EncodedInstruction::Sort));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::Number(operand) => {
            bytes.push(opcode(EncodedInstruction::Number));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
        Instruction::FormatNumber(operand) => {
            bytes.push(opcode(EncodedInstruction::FormatNumber));
            bytes.extend_from_slice(&operand.to_le_bytes());
        }
    }
}

// size in bytes for an instruction
pub fn instruction_size(instruction: &Instruction) -> usize {
    match instruction {
        Instruction::Pop
        | Instruction::Dup
        | Instruction::Swap
        | Instruction::Return
        | Instruction::ReturnValue
        | Instruction::Add
        | Instruction::Sub
        | Instruction::Mul
        | Instruction::Div
        | Instruction::Mod
        | Instruction::Negate
        | Instruction::Eq
        | Instruction::Ne
        | Instruction::Lt
        | Instruction::Le
        | Instruction::Gt
        | Instruction::Ge
        | Instruction::GenEq
        | Instruction::GenNe
        | Instruction::GenLt
        | Instruction::GenLe
        | Instruction::GenGt
        | Instruction::GenGe
        | Instruction::Not
        | Instruction::IsNull
        | Instruction::ToBoolean
        | Instruction::ToNumber
        | Instruction::ToString
        | Instruction::ToNodeSet
        | Instruction::ToNode
        | Instruction::NodeType
        | Instruction::NodeKind
        | Instruction::NamespaceType
        | Instruction::Parent
        | Instruction::Root
        | Instruction::NodeEq
        | Instruction::Union
        | Instruction::DocOrder
        | Instruction::Iterate
        | Instruction::BuildNew
        | Instruction::BuildPush
        | Instruction::BuildAppend
        | Instruction::BuildComplete
        | Instruction::StartElement
        | Instruction::EndElement
        | Instruction::Attribute
        | Instruction::Characters
        | Instruction::Comment
        | Instruction::ProcessingInstruction
        | Instruction::ShallowCopy
        | Instruction::EndCopy
        | Instruction::CopyOf
        | Instruction::PushOutput
        | Instruction::PopOutput
        | Instruction::PushParamFrame
        | Instruction::PopParamFrame
        | Instruction::IdMatches => 1,
        Instruction::Concat(_)
        | Instruction::Message(_) => 2,
        Instruction::Const(_)
        | Instruction::Load(_)
        | Instruction::Store(_)
        | Instruction::GetField(_)
        | Instruction::PutField(_)
        | Instruction::New(_)
        | Instruction::Invoke(_)
        | Instruction::InvokeForeign(_)
        | Instruction::Jump(_)
        | Instruction::JumpIfTrue(_)
        | Instruction::JumpIfFalse(_)
        | Instruction::Switch(_)
        | Instruction::Step(_)
        | Instruction::AxisStep(_)
        | Instruction::IterPosition(_)
        | Instruction::IterLast(_)
        | Instruction::CallBuiltin(_)
        | Instruction::AddParam(_)
        | Instruction::GetParam(_)
        | Instruction::KeyIndexAdd(_)
        | Instruction::KeyMatches(_)
        | Instruction::Sort(_)
        | Instruction::Number(_)
        | Instruction::FormatNumber(_) => 3,
        Instruction::IterNext(..) => 5,
    }
}

pub fn read_instruction(bytes: &[u8], ip: &mut usize) -> Option<EncodedInstruction> {
    let byte = *bytes.get(*ip)?;
    *ip += 1;
    EncodedInstruction::from_u8(byte)
}

pub fn read_u16(bytes: &[u8], ip: &mut usize) -> u16 {
    let value = u16::from_le_bytes([bytes[*ip], bytes[*ip + 1]]);
    *ip += 2;
    value
}

pub fn read_i16(bytes: &[u8], ip: &mut usize) -> i16 {
    let value = i16::from_le_bytes([bytes[*ip], bytes[*ip + 1]]);
    *ip += 2;
    value
}

pub fn read_u8(bytes: &[u8], ip: &mut usize) -> u8 {
    let byte = bytes[*ip];
    *ip += 1;
    byte
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_operands() {
        let mut bytes = Vec::new();
        encode_instruction(Instruction::Jump(-7), &mut bytes);
        encode_instruction(Instruction::IterNext(1, 300), &mut bytes);
        encode_instruction(Instruction::Concat(3), &mut bytes);
        assert_eq!(bytes.len(), 3 + 5 + 2);
        let decoded = decode_instructions(&bytes);
        assert_eq!(
            decoded,
            vec![
                (0, Instruction::Jump(-7)),
                (3, Instruction::IterNext(1, 300)),
                (8, Instruction::Concat(3)),
            ]
        );
    }

    #[test]
    fn test_sizes_match_encoding() {
        for instruction in [
            Instruction::Pop,
            Instruction::Message(1),
            Instruction::Switch(2),
            Instruction::IterNext(0, 0),
        ] {
            let mut bytes = Vec::new();
            encode_instruction(instruction.clone(), &mut bytes);
            assert_eq!(bytes.len(), instruction_size(&instruction));
        }
    }
}
