use std::cell::RefCell;
use std::rc::Rc;

use xot::Node;
use xsltc_bytecode::dom::{
    ATTRIBUTE_NODE, COMMENT_NODE, DOCUMENT_NODE, ELEMENT_NODE, NO_TYPE,
    PROCESSING_INSTRUCTION_NODE, TEXT_NODE,
};
use xsltc_bytecode::instruction::{read_i16, read_instruction, read_u16, read_u8, EncodedInstruction};
use xsltc_bytecode::{
    Builtin, Constant, ForeignCallKind, ForeignMethodRef, MethodGen, NumberSpec, SortDataType,
    SortSpec, StepSpec,
};

use super::program::Program;
use super::state::State;
use crate::builtins;
use crate::dom::{Dom, TypeTable};
use crate::error::{Error, Result, SpannedError, SpannedResult};
use crate::foreign;
use crate::keys::KeyIndex;
use crate::number::{self, Counter, SameName};
use crate::options::TransformOptions;
use crate::output::{local_of, prefix_of, OutputEvent};
use crate::sort::{sort_nodes, SortKey};
use crate::value::{compare, number_to_string, Comparison, NodeIterator, Object, Value};

const TRANSFORM: &str = "transform";
const EXTRACT_VALUE: &str = "extractValue";
const MATCHES_COUNT: &str = "matchesCount";
const MATCHES_FROM: &str = "matchesFrom";

pub(crate) struct Interpreter<'a> {
    program: Program<'a>,
    dom: &'a Dom,
    types: TypeTable,
    options: &'a TransformOptions,
    keys: KeyIndex,
    state: State,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(program: Program<'a>, dom: &'a Dom, options: &'a TransformOptions) -> Self {
        let types = TypeTable::new(dom, program.translet());
        Interpreter {
            program,
            dom,
            types,
            options,
            keys: KeyIndex::new(),
            state: State::new(),
        }
    }

    /// Run the translet over the whole document, returning the events of
    /// the main result.
    pub(crate) fn transform(mut self) -> SpannedResult<Vec<OutputEvent>> {
        self.transform_actual().map_err(|e| self.err(e))
    }

    fn transform_actual(&mut self) -> Result<Vec<OutputEvent>> {
        let main = 0;
        let fields = self.program.class(main)?.fields.len();
        let translet = Value::Object(Rc::new(RefCell::new(Object {
            class: main,
            fields: vec![Value::Null; fields],
        })));
        log::debug!(
            "transforming with {} and {} parameters",
            self.program.class(main)?.name,
            self.options.params.len()
        );
        self.state.push_param_frame();
        for (name, value) in &self.options.params {
            self.state.add_param(name, value.clone())?;
        }
        let method = self.program.method_index(main, TRANSFORM)?;
        self.call_method(translet, main, method, vec![Value::Node(self.dom.root())])?;
        self.state.pop_param_frame()?;
        self.state.finish_output()
    }

    fn err(&self, error: Error) -> SpannedError {
        let mut spanned = SpannedError::new(error);
        if let Ok(frame) = self.state.frame() {
            if let (Ok(class), Ok(method)) = (
                self.program.class(frame.class),
                self.program.method(frame.class, frame.method),
            ) {
                spanned.method = Some(format!("{}.{}", class.name, method.name));
                spanned.line = method.line_at(frame.start);
            }
            spanned.offset = Some(frame.start);
        }
        spanned
    }

    /// Call a method from native code and return its result.
    fn call_method(
        &mut self,
        receiver: Value,
        class: usize,
        method: usize,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        let depth = self.state.depth();
        let locals = self.program.method(class, method)?.max_locals as usize;
        let arity = arguments.len();
        self.state.push(receiver);
        for argument in arguments {
            self.state.push(argument);
        }
        self.state.push_frame(class, method, arity, locals)?;
        self.run(depth)?;
        self.state.pop()
    }

    fn call_helper(&mut self, helper: &Value, name: &str, arguments: Vec<Value>) -> Result<Value> {
        let class = helper.as_object()?.borrow().class;
        let method = self.program.method_index(class, name)?;
        self.call_method(helper.clone(), class, method, arguments)
    }

    fn current_method(&self) -> Result<&'a MethodGen> {
        let frame = self.state.frame()?;
        self.program.method(frame.class, frame.method)
    }

    fn read_instruction(&mut self) -> Result<EncodedInstruction> {
        let method = self.current_method()?;
        let frame = self.state.frame_mut()?;
        frame.start = frame.ip;
        read_instruction(&method.code, &mut frame.ip).ok_or(Error::InvalidInstruction(frame.start))
    }

    fn read_u16(&mut self) -> Result<u16> {
        let method = self.current_method()?;
        let frame = self.state.frame_mut()?;
        if frame.ip + 2 > method.code.len() {
            return Err(Error::InvalidInstruction(frame.start));
        }
        Ok(read_u16(&method.code, &mut frame.ip))
    }

    fn read_i16(&mut self) -> Result<i16> {
        let method = self.current_method()?;
        let frame = self.state.frame_mut()?;
        if frame.ip + 2 > method.code.len() {
            return Err(Error::InvalidInstruction(frame.start));
        }
        Ok(read_i16(&method.code, &mut frame.ip))
    }

    fn read_u8(&mut self) -> Result<u8> {
        let method = self.current_method()?;
        let frame = self.state.frame_mut()?;
        if frame.ip >= method.code.len() {
            return Err(Error::InvalidInstruction(frame.start));
        }
        Ok(read_u8(&method.code, &mut frame.ip))
    }

    fn constant(&self, index: u16) -> Result<&'a Constant> {
        self.current_method()?
            .constants
            .get(index as usize)
            .ok_or(Error::InvalidConstant(index))
    }

    fn string_constant(&self, index: u16) -> Result<&'a str> {
        match self.constant(index)? {
            Constant::String(value) => Ok(value),
            _ => Err(Error::InvalidConstant(index)),
        }
    }

    fn step_constant(&self, index: u16) -> Result<&'a StepSpec> {
        match self.constant(index)? {
            Constant::Step(step) => Ok(step),
            _ => Err(Error::InvalidConstant(index)),
        }
    }

    fn counter_constant(&self, index: u16) -> Result<&'a NumberSpec> {
        match self.constant(index)? {
            Constant::Counter(spec) => Ok(spec),
            _ => Err(Error::InvalidConstant(index)),
        }
    }

    /// Run until the frame depth drops back to `stop_depth`.
    fn run(&mut self, stop_depth: usize) -> Result<()> {
        // every method ends with a return instruction
        loop {
            let instruction = self.read_instruction()?;
            match instruction {
                EncodedInstruction::Const => {
                    let index = self.read_u16()?;
                    let value = match self.constant(index)? {
                        Constant::Null => Value::Null,
                        Constant::Boolean(value) => Value::Boolean(*value),
                        Constant::Number(value) => Value::Number(value.0),
                        Constant::String(value) => Value::String(value.clone()),
                        _ => return Err(Error::InvalidConstant(index)),
                    };
                    self.state.push(value);
                }
                EncodedInstruction::Pop => {
                    self.state.pop()?;
                }
                EncodedInstruction::Dup => {
                    let value = self.state.top()?.clone();
                    self.state.push(value);
                }
                EncodedInstruction::Swap => {
                    let b = self.state.pop()?;
                    let a = self.state.pop()?;
                    self.state.push(b);
                    self.state.push(a);
                }
                EncodedInstruction::Load => {
                    let index = self.read_u16()?;
                    let value = self.state.local(index)?;
                    self.state.push(value);
                }
                EncodedInstruction::Store => {
                    let index = self.read_u16()?;
                    let value = self.state.pop()?;
                    self.state.set_local(index, value)?;
                }
                EncodedInstruction::GetField => {
                    let index = self.read_u16()?;
                    let object = self.state.pop()?.as_object()?;
                    let value = object
                        .borrow()
                        .fields
                        .get(index as usize)
                        .cloned()
                        .unwrap_or(Value::Null);
                    self.state.push(value);
                }
                EncodedInstruction::PutField => {
                    let index = self.read_u16()? as usize;
                    let value = self.state.pop()?;
                    let object = self.state.pop()?.as_object()?;
                    let mut object = object.borrow_mut();
                    if object.fields.len() <= index {
                        object.fields.resize(index + 1, Value::Null);
                    }
                    object.fields[index] = value;
                }
                EncodedInstruction::New => {
                    let index = self.read_u16()?;
                    let Constant::Class(name) = self.constant(index)? else {
                        return Err(Error::InvalidConstant(index));
                    };
                    let class = self.program.class_index(name)?;
                    let fields = self.program.class(class)?.fields.len();
                    self.state.push(Value::Object(Rc::new(RefCell::new(Object {
                        class,
                        fields: vec![Value::Null; fields],
                    }))));
                }
                EncodedInstruction::Invoke => {
                    let index = self.read_u16()?;
                    let Constant::Method(reference) = self.constant(index)? else {
                        return Err(Error::InvalidConstant(index));
                    };
                    let (class, method) = self.program.resolve(reference)?;
                    let locals = self.program.method(class, method)?.max_locals as usize;
                    self.state
                        .push_frame(class, method, reference.arity as usize, locals)?;
                }
                EncodedInstruction::InvokeForeign => {
                    let index = self.read_u16()?;
                    let Constant::Foreign(reference) = self.constant(index)? else {
                        return Err(Error::InvalidConstant(index));
                    };
                    self.invoke_foreign(reference)?;
                }
                EncodedInstruction::Return => {
                    self.state.pop_frame(Value::Null)?;
                    if self.state.depth() <= stop_depth {
                        break;
                    }
                }
                EncodedInstruction::ReturnValue => {
                    let value = self.state.pop()?;
                    self.state.pop_frame(value)?;
                    if self.state.depth() <= stop_depth {
                        break;
                    }
                }
                EncodedInstruction::Jump => {
                    let displacement = self.read_i16()?;
                    self.state.jump(displacement)?;
                }
                EncodedInstruction::JumpIfTrue => {
                    let displacement = self.read_i16()?;
                    if self.state.pop()?.to_boolean() {
                        self.state.jump(displacement)?;
                    }
                }
                EncodedInstruction::JumpIfFalse => {
                    let displacement = self.read_i16()?;
                    if !self.state.pop()?.to_boolean() {
                        self.state.jump(displacement)?;
                    }
                }
                EncodedInstruction::Switch => {
                    let index = self.read_u16()?;
                    let table = self
                        .current_method()?
                        .switch_tables
                        .get(index as usize)
                        .ok_or(Error::InvalidSwitch(index))?;
                    let key = self.state.pop()?.to_number(self.dom);
                    let key = if key.is_finite() { key as i32 } else { i32::MIN };
                    self.state.frame_mut()?.ip = table.target(key) as usize;
                }
                EncodedInstruction::Add => self.arithmetic(|a, b| a + b)?,
                EncodedInstruction::Sub => self.arithmetic(|a, b| a - b)?,
                EncodedInstruction::Mul => self.arithmetic(|a, b| a * b)?,
                EncodedInstruction::Div => self.arithmetic(|a, b| a / b)?,
                EncodedInstruction::Mod => self.arithmetic(|a, b| a % b)?,
                EncodedInstruction::Negate => {
                    let value = self.state.pop()?.to_number(self.dom);
                    self.state.push(Value::Number(-value));
                }
                EncodedInstruction::Eq | EncodedInstruction::GenEq => {
                    self.compare(Comparison::Eq)?
                }
                EncodedInstruction::Ne | EncodedInstruction::GenNe => {
                    self.compare(Comparison::Ne)?
                }
                EncodedInstruction::Lt | EncodedInstruction::GenLt => {
                    self.compare(Comparison::Lt)?
                }
                EncodedInstruction::Le | EncodedInstruction::GenLe => {
                    self.compare(Comparison::Le)?
                }
                EncodedInstruction::Gt | EncodedInstruction::GenGt => {
                    self.compare(Comparison::Gt)?
                }
                EncodedInstruction::Ge | EncodedInstruction::GenGe => {
                    self.compare(Comparison::Ge)?
                }
                EncodedInstruction::Not => {
                    let value = self.state.pop()?;
                    self.state.push(Value::Boolean(!value.to_boolean()));
                }
                EncodedInstruction::IsNull => {
                    let value = self.state.pop()?;
                    self.state.push(Value::Boolean(value.is_null()));
                }
                EncodedInstruction::ToBoolean => {
                    let value = self.state.pop()?;
                    self.state.push(Value::Boolean(value.to_boolean()));
                }
                EncodedInstruction::ToNumber => {
                    let value = self.state.pop()?;
                    self.state.push(Value::Number(value.to_number(self.dom)));
                }
                EncodedInstruction::ToString => {
                    let value = self.state.pop()?;
                    self.state.push(Value::String(value.to_string_value(self.dom)));
                }
                EncodedInstruction::ToNodeSet => {
                    let value = self.state.pop()?;
                    self.state.push(Value::NodeSet(value.to_node_set()?));
                }
                EncodedInstruction::ToNode => {
                    let node = self.state.pop()?.to_node()?;
                    self.state.push(node.map_or(Value::Null, Value::Node));
                }
                EncodedInstruction::NodeType => {
                    let node = self.state.pop()?.to_node()?;
                    let type_id = node.map_or(NO_TYPE, |node| self.types.type_of(self.dom, node));
                    self.state.push(Value::Number(type_id as f64));
                }
                EncodedInstruction::NodeKind => {
                    let node = self.state.pop()?.to_node()?;
                    let kind = node.map_or(NO_TYPE, |node| self.dom.kind(node));
                    self.state.push(Value::Number(kind as f64));
                }
                EncodedInstruction::NamespaceType => {
                    let node = self.state.pop()?.to_node()?;
                    let namespace = node.map_or(NO_TYPE, |node| self.types.namespace_of(node));
                    self.state.push(Value::Number(namespace as f64));
                }
                EncodedInstruction::Parent => {
                    let node = self.state.pop()?.to_node()?;
                    let parent = node.and_then(|node| self.dom.parent(node));
                    self.state.push(parent.map_or(Value::Null, Value::Node));
                }
                EncodedInstruction::Root => {
                    self.state.pop()?;
                    self.state.push(Value::Node(self.dom.root()));
                }
                EncodedInstruction::NodeEq => {
                    let b = self.state.pop()?.to_node()?;
                    let a = self.state.pop()?.to_node()?;
                    self.state
                        .push(Value::Boolean(a.is_some() && a == b));
                }
                EncodedInstruction::Step => {
                    let index = self.read_u16()?;
                    let step = self.step_constant(index)?;
                    let input = self.state.pop()?.to_node_set()?;
                    let mut nodes = input
                        .iter()
                        .flat_map(|node| self.dom.step(step, *node))
                        .collect::<Vec<_>>();
                    self.dom.sort(&mut nodes);
                    self.state.push(Value::node_set(nodes));
                }
                EncodedInstruction::AxisStep => {
                    let index = self.read_u16()?;
                    let step = self.step_constant(index)?;
                    let node = self.state.pop()?.to_node()?;
                    let nodes = node.map_or_else(Vec::new, |node| self.dom.step(step, node));
                    self.state.push(Value::node_set(nodes));
                }
                EncodedInstruction::Union => {
                    let b = self.state.pop()?.to_node_set()?;
                    let a = self.state.pop()?.to_node_set()?;
                    let mut nodes = a.iter().chain(b.iter()).copied().collect::<Vec<_>>();
                    self.dom.sort(&mut nodes);
                    self.state.push(Value::node_set(nodes));
                }
                EncodedInstruction::DocOrder => {
                    let mut nodes = self.state.pop()?.to_node_set()?.as_ref().clone();
                    self.dom.sort(&mut nodes);
                    self.state.push(Value::node_set(nodes));
                }
                EncodedInstruction::Iterate => {
                    let nodes = self.state.pop()?.to_node_set()?;
                    self.state
                        .push(Value::Iterator(Rc::new(RefCell::new(NodeIterator::new(nodes)))));
                }
                EncodedInstruction::IterNext => {
                    let iterator = self.read_u16()?;
                    let slot = self.read_u16()?;
                    let next = match self.state.local(iterator)?.as_iterator()? {
                        Some(iterator) => iterator.borrow_mut().next_node(),
                        None => None,
                    };
                    match next {
                        Some(node) => {
                            self.state.set_local(slot, Value::Node(node))?;
                            self.state.push(Value::Boolean(true));
                        }
                        None => self.state.push(Value::Boolean(false)),
                    }
                }
                EncodedInstruction::IterPosition => {
                    let iterator = self.read_u16()?;
                    let position = match self.state.local(iterator)?.as_iterator()? {
                        Some(iterator) => iterator.borrow().position(),
                        None => 1,
                    };
                    self.state.push(Value::Number(position as f64));
                }
                EncodedInstruction::IterLast => {
                    let iterator = self.read_u16()?;
                    let last = match self.state.local(iterator)?.as_iterator()? {
                        Some(iterator) => iterator.borrow().last(),
                        None => 1,
                    };
                    self.state.push(Value::Number(last as f64));
                }
                EncodedInstruction::BuildNew => {
                    self.state
                        .push(Value::Builder(Rc::new(RefCell::new(Vec::new()))));
                }
                EncodedInstruction::BuildPush => {
                    let node = self.state.pop()?.to_node()?;
                    let builder = self.state.pop()?.as_builder()?;
                    builder.borrow_mut().extend(node);
                }
                EncodedInstruction::BuildAppend => {
                    let nodes = self.state.pop()?.to_node_set()?;
                    let builder = self.state.pop()?.as_builder()?;
                    builder.borrow_mut().extend(nodes.iter().copied());
                }
                EncodedInstruction::BuildComplete => {
                    let builder = self.state.pop()?.as_builder()?;
                    let nodes = builder.borrow().clone();
                    self.state.push(Value::node_set(nodes));
                }
                EncodedInstruction::CallBuiltin => {
                    let id = self.read_u16()?;
                    let builtin = Builtin::from_id(id)
                        .ok_or_else(|| Error::InvalidInstruction(self.instruction_start()))?;
                    let arguments = self.state.pop_many(builtin.arity())?;
                    let value = builtins::call(self.dom, &self.keys, builtin, &arguments)?;
                    self.state.push(value);
                }
                EncodedInstruction::Concat => {
                    let count = self.read_u8()? as usize;
                    let values = self.state.pop_many(count)?;
                    let text = values
                        .iter()
                        .map(|value| value.to_string_value(self.dom))
                        .collect::<String>();
                    self.state.push(Value::String(text));
                }
                EncodedInstruction::StartElement => {
                    let namespace = self.state.pop()?;
                    let name = self.state.pop()?.to_string_value(self.dom);
                    let (name, namespace) = self.resolve_name(name, namespace, true);
                    self.state
                        .emit(OutputEvent::StartElement { name, namespace })?;
                }
                EncodedInstruction::EndElement => {
                    self.state.emit(OutputEvent::EndElement)?;
                }
                EncodedInstruction::Attribute => {
                    let value = self.state.pop()?.to_string_value(self.dom);
                    let namespace = self.state.pop()?;
                    let name = self.state.pop()?.to_string_value(self.dom);
                    let (name, namespace) = self.resolve_name(name, namespace, false);
                    self.state.emit(OutputEvent::Attribute {
                        name,
                        namespace,
                        value,
                    })?;
                }
                EncodedInstruction::Characters => {
                    let text = self.state.pop()?.to_string_value(self.dom);
                    if !text.is_empty() {
                        self.state.emit(OutputEvent::Characters(text))?;
                    }
                }
                EncodedInstruction::Comment => {
                    let text = self.state.pop()?.to_string_value(self.dom);
                    self.state.emit(OutputEvent::Comment(text))?;
                }
                EncodedInstruction::ProcessingInstruction => {
                    let data = self.state.pop()?.to_string_value(self.dom);
                    let target = self.state.pop()?.to_string_value(self.dom);
                    self.state
                        .emit(OutputEvent::ProcessingInstruction { target, data })?;
                }
                EncodedInstruction::ShallowCopy => {
                    let node = self.state.pop()?.to_node()?;
                    let process_content = self.shallow_copy(node)?;
                    self.state.push(Value::Boolean(process_content));
                }
                EncodedInstruction::EndCopy => {
                    if self.state.pop_copy()? {
                        self.state.emit(OutputEvent::EndElement)?;
                    }
                }
                EncodedInstruction::CopyOf => {
                    let value = self.state.pop()?;
                    self.copy_of(&value)?;
                }
                EncodedInstruction::PushOutput => {
                    self.state.push_output();
                }
                EncodedInstruction::PopOutput => {
                    let events = self.state.pop_output()?;
                    self.state.push(Value::ResultTree(Rc::new(events)));
                }
                EncodedInstruction::Message => {
                    let terminate = self.read_u8()? != 0;
                    let text = self.state.pop()?.to_string_value(self.dom);
                    log::info!("{}", text);
                    if terminate {
                        return Err(Error::Terminated(text));
                    }
                }
                EncodedInstruction::PushParamFrame => {
                    self.state.push_param_frame();
                }
                EncodedInstruction::PopParamFrame => {
                    self.state.pop_param_frame()?;
                }
                EncodedInstruction::AddParam => {
                    let index = self.read_u16()?;
                    let name = self.string_constant(index)?;
                    let value = self.state.pop()?;
                    self.state.add_param(name, value)?;
                }
                EncodedInstruction::GetParam => {
                    let index = self.read_u16()?;
                    let name = self.string_constant(index)?;
                    let value = self.state.param(name);
                    self.state.push(value);
                }
                EncodedInstruction::KeyIndexAdd => {
                    let index = self.read_u16()?;
                    let name = self.string_constant(index)?;
                    let value = self.state.pop()?;
                    let node = self.state.pop()?.to_node()?;
                    if let Some(node) = node {
                        for value in builtins::lookup_values(self.dom, &value) {
                            self.keys.add(name, value, node);
                        }
                    }
                }
                EncodedInstruction::KeyMatches => {
                    let index = self.read_u16()?;
                    let name = self.string_constant(index)?;
                    let value = self.state.pop()?;
                    let node = self.state.pop()?.to_node()?;
                    let values = builtins::lookup_values(self.dom, &value);
                    let matches = node.is_some_and(|node| {
                        self.keys
                            .contains(name, values.iter().map(String::as_str), node)
                    });
                    self.state.push(Value::Boolean(matches));
                }
                EncodedInstruction::IdMatches => {
                    let value = self.state.pop()?;
                    let node = self.state.pop()?.to_node()?;
                    let tokens = builtins::id_tokens(self.dom, &value);
                    let tokens = tokens.iter().map(String::as_str).collect::<Vec<_>>();
                    let matches = node.is_some_and(|node| self.dom.has_id(node, &tokens));
                    self.state.push(Value::Boolean(matches));
                }
                EncodedInstruction::Sort => {
                    let index = self.read_u16()?;
                    let Constant::Sort(spec) = self.constant(index)? else {
                        return Err(Error::InvalidConstant(index));
                    };
                    let helper = self.state.pop()?;
                    let nodes = self.state.pop()?.to_node_set()?;
                    let sorted = self.sort(spec, &helper, &nodes)?;
                    self.state.push(Value::node_set(sorted));
                }
                EncodedInstruction::Number => {
                    let index = self.read_u16()?;
                    let spec = self.counter_constant(index)?;
                    let helper = self.state.pop()?;
                    let node = self.state.pop()?.to_node()?;
                    let text = match node {
                        Some(node) => {
                            let numbers = self.count(spec, &helper, node)?;
                            number::format_numbers(&numbers, spec)
                        }
                        None => String::new(),
                    };
                    self.state.push(Value::String(text));
                }
                EncodedInstruction::FormatNumber => {
                    let index = self.read_u16()?;
                    let spec = self.counter_constant(index)?;
                    let value = self.state.pop()?.to_number(self.dom);
                    let text = match number::value_number(value) {
                        Some(number) => number::format_numbers(&[number], spec),
                        None => number_to_string(value.round()),
                    };
                    self.state.push(Value::String(text));
                }
            }
        }
        Ok(())
    }

    fn instruction_start(&self) -> usize {
        self.state.frame().map_or(0, |frame| frame.start)
    }

    fn arithmetic(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<()> {
        let b = self.state.pop()?.to_number(self.dom);
        let a = self.state.pop()?.to_number(self.dom);
        self.state.push(Value::Number(op(a, b)));
        Ok(())
    }

    fn compare(&mut self, comparison: Comparison) -> Result<()> {
        let b = self.state.pop()?;
        let a = self.state.pop()?;
        self.state
            .push(Value::Boolean(compare(self.dom, comparison, &a, &b)));
        Ok(())
    }

    /// The output name and namespace of a constructed node. A null
    /// namespace means the prefix is looked up in the output.
    fn resolve_name(&self, name: String, namespace: Value, element: bool) -> (String, Option<String>) {
        let namespace = match namespace {
            Value::Null => {
                let prefix = prefix_of(&name);
                if prefix.is_empty() && !element {
                    None
                } else {
                    self.state.resolve_prefix(prefix)
                }
            }
            value => Some(value.to_string_value(self.dom)).filter(|uri| !uri.is_empty()),
        };
        match namespace {
            Some(namespace) => (name, Some(namespace)),
            None => (local_of(&name).to_string(), None),
        }
    }

    fn invoke_foreign(&mut self, reference: &ForeignMethodRef) -> Result<()> {
        let arguments = self.state.pop_many(reference.params.len())?;
        let receiver = match reference.kind {
            ForeignCallKind::Instance => Some(self.state.pop()?),
            ForeignCallKind::Static | ForeignCallKind::Constructor => None,
        };
        let arguments = arguments
            .into_iter()
            .zip(&reference.params)
            .map(|(value, ty)| foreign::argument(self.dom, value, ty))
            .collect::<Vec<_>>();
        log::trace!(
            "calling {:?} {}.{} with {} arguments",
            reference.kind,
            reference.class,
            reference.method,
            arguments.len()
        );
        let result = self
            .options
            .bindings
            .call(self.dom, reference, receiver.as_ref(), &arguments)
            .map_err(|message| Error::Foreign {
                method: format!("{}.{}", reference.class, reference.method),
                message,
            })?;
        self.state
            .push(foreign::result(self.dom, result, &reference.return_type));
        Ok(())
    }

    /// `xsl:copy`: output a copy of `node` without its children, and say
    /// whether the content of the instruction should be processed.
    fn shallow_copy(&mut self, node: Option<Node>) -> Result<bool> {
        let Some(node) = node else {
            self.state.push_copy(false);
            return Ok(false);
        };
        match self.dom.kind(node) {
            ELEMENT_NODE => {
                let name = self.dom.qualified_name(node);
                let namespace = Some(self.dom.namespace_uri(node).to_string())
                    .filter(|uri| !uri.is_empty());
                self.state
                    .emit(OutputEvent::StartElement { name, namespace })?;
                self.state.push_copy(true);
                Ok(true)
            }
            DOCUMENT_NODE => {
                self.state.push_copy(false);
                Ok(true)
            }
            _ => {
                self.copy_node(node)?;
                self.state.push_copy(false);
                Ok(false)
            }
        }
    }

    fn copy_of(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Node(_) | Value::NodeSet(_) => {
                for node in value.to_node_set()?.iter() {
                    self.copy_node(*node)?;
                }
                Ok(())
            }
            Value::ResultTree(events) => {
                for event in events.iter() {
                    self.state.emit(event.clone())?;
                }
                Ok(())
            }
            Value::Null => Ok(()),
            value => {
                let text = value.to_string_value(self.dom);
                if text.is_empty() {
                    return Ok(());
                }
                self.state.emit(OutputEvent::Characters(text))
            }
        }
    }

    /// Deep copy of a source node into the output.
    fn copy_node(&mut self, node: Node) -> Result<()> {
        let dom = self.dom;
        match dom.kind(node) {
            DOCUMENT_NODE => {
                for child in dom.axis(xsltc_bytecode::Axis::Child, node) {
                    self.copy_node(child)?;
                }
            }
            ELEMENT_NODE => {
                let namespace =
                    Some(dom.namespace_uri(node).to_string()).filter(|uri| !uri.is_empty());
                self.state.emit(OutputEvent::StartElement {
                    name: dom.qualified_name(node),
                    namespace,
                })?;
                for attribute in dom.axis(xsltc_bytecode::Axis::Attribute, node) {
                    self.copy_node(attribute)?;
                }
                for child in dom.axis(xsltc_bytecode::Axis::Child, node) {
                    self.copy_node(child)?;
                }
                self.state.emit(OutputEvent::EndElement)?;
            }
            ATTRIBUTE_NODE => {
                let namespace =
                    Some(dom.namespace_uri(node).to_string()).filter(|uri| !uri.is_empty());
                self.state.emit(OutputEvent::Attribute {
                    name: dom.qualified_name(node),
                    namespace,
                    value: dom.string_value(node),
                })?;
            }
            TEXT_NODE => {
                let text = dom.string_value(node);
                if !text.is_empty() {
                    self.state.emit(OutputEvent::Characters(text))?;
                }
            }
            COMMENT_NODE => {
                self.state
                    .emit(OutputEvent::Comment(dom.string_value(node)))?;
            }
            PROCESSING_INSTRUCTION_NODE => {
                self.state.emit(OutputEvent::ProcessingInstruction {
                    target: dom.local_name(node).to_string(),
                    data: dom.string_value(node),
                })?;
            }
            _ => {}
        }
        Ok(())
    }

    fn sort(&mut self, spec: &SortSpec, helper: &Value, nodes: &[Node]) -> Result<Vec<Node>> {
        let last = nodes.len();
        let mut keys = Vec::with_capacity(last);
        for (index, node) in nodes.iter().enumerate() {
            let mut row = Vec::with_capacity(spec.levels.len());
            for (level_index, level) in spec.levels.iter().enumerate() {
                let value = self.call_helper(
                    helper,
                    EXTRACT_VALUE,
                    vec![
                        Value::Number(level_index as f64),
                        Value::Node(*node),
                        Value::Number((index + 1) as f64),
                        Value::Number(last as f64),
                    ],
                )?;
                row.push(match level.data_type {
                    SortDataType::Text => SortKey::Text(value.to_string_value(self.dom)),
                    SortDataType::Number => SortKey::Number(value.to_number(self.dom)),
                });
            }
            keys.push(row);
        }
        Ok(sort_nodes(nodes, &keys, &spec.levels))
    }

    fn count(&mut self, spec: &NumberSpec, helper: &Value, node: Node) -> Result<Vec<u64>> {
        let dom = self.dom;
        let mut same = SameName::new(dom, node);
        if helper.is_null() {
            return number::count(dom, spec.level, node, &mut same);
        }
        let mut counter = HelperCounter {
            interpreter: self,
            helper,
            same,
            has_count: spec.has_count,
            has_from: spec.has_from,
        };
        number::count(dom, spec.level, node, &mut counter)
    }
}

/// Counting through the `matchesCount` and `matchesFrom` methods of a
/// counter helper.
struct HelperCounter<'i, 'a> {
    interpreter: &'i mut Interpreter<'a>,
    helper: &'i Value,
    same: SameName<'a>,
    has_count: bool,
    has_from: bool,
}

impl Counter for HelperCounter<'_, '_> {
    fn matches_count(&mut self, node: Node) -> Result<bool> {
        if !self.has_count {
            return self.same.matches_count(node);
        }
        let matched = self
            .interpreter
            .call_helper(self.helper, MATCHES_COUNT, vec![Value::Node(node)])?;
        Ok(matched.to_boolean())
    }

    fn matches_from(&mut self, node: Node) -> Result<bool> {
        if !self.has_from {
            return Ok(false);
        }
        let matched = self
            .interpreter
            .call_helper(self.helper, MATCHES_FROM, vec![Value::Node(node)])?;
        Ok(matched.to_boolean())
    }
}
