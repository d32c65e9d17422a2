use arrayvec::ArrayVec;

use crate::error::{Error, Result};
use crate::output::{OutputEvent, OutputHandler, Recorder};
use crate::value::Value;

const FRAMES_MAX: usize = 1024;

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) class: usize,
    pub(crate) method: usize,
    /// Stack index of local slot 0, the receiver.
    base: usize,
    pub(crate) ip: usize,
    /// Offset of the instruction being executed.
    pub(crate) start: usize,
}

/// Operand stack, call frames and the stacks of output, parameter and
/// copy state a transformation runs with.
#[derive(Debug)]
pub(crate) struct State {
    stack: Vec<Value>,
    frames: ArrayVec<Frame, FRAMES_MAX>,
    outputs: Vec<Recorder>,
    params: Vec<Vec<(String, Value)>>,
    /// Per `ShallowCopy`: whether it started an element.
    copies: Vec<bool>,
}

impl State {
    pub(crate) fn new() -> Self {
        State {
            stack: Vec::new(),
            frames: ArrayVec::new(),
            outputs: vec![Recorder::new()],
            params: Vec::new(),
            copies: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> Result<Value> {
        let base = self.frames.last().map_or(0, |frame| frame.base);
        if self.stack.len() <= base && !self.frames.is_empty() {
            return Err(Error::StackUnderflow);
        }
        self.stack.pop().ok_or(Error::StackUnderflow)
    }

    /// Pop `count` values, returned in the order they were pushed.
    pub(crate) fn pop_many(&mut self, count: usize) -> Result<Vec<Value>> {
        if self.stack.len() < count {
            return Err(Error::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    pub(crate) fn top(&self) -> Result<&Value> {
        self.stack.last().ok_or(Error::StackUnderflow)
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn frame(&self) -> Result<&Frame> {
        self.frames.last().ok_or(Error::StackUnderflow)
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or(Error::StackUnderflow)
    }

    /// Enter a method whose receiver and `arity` arguments are on top of
    /// the stack; its other locals start out null.
    pub(crate) fn push_frame(
        &mut self,
        class: usize,
        method: usize,
        arity: usize,
        locals: usize,
    ) -> Result<()> {
        if self.frames.is_full() {
            return Err(Error::StackOverflow);
        }
        if self.stack.len() < arity + 1 {
            return Err(Error::StackUnderflow);
        }
        let base = self.stack.len() - (arity + 1);
        while self.stack.len() < base + locals {
            self.stack.push(Value::Null);
        }
        self.frames.push(Frame {
            class,
            method,
            base,
            ip: 0,
            start: 0,
        });
        Ok(())
    }

    /// Leave the current method, leaving `value` where its receiver was.
    pub(crate) fn pop_frame(&mut self, value: Value) -> Result<()> {
        let frame = self.frames.pop().ok_or(Error::StackUnderflow)?;
        self.stack.truncate(frame.base);
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn local(&self, index: u16) -> Result<Value> {
        let base = self.frame()?.base;
        self.stack
            .get(base + index as usize)
            .cloned()
            .ok_or(Error::InvalidLocal(index))
    }

    pub(crate) fn set_local(&mut self, index: u16, value: Value) -> Result<()> {
        let base = self.frame()?.base;
        let slot = self
            .stack
            .get_mut(base + index as usize)
            .ok_or(Error::InvalidLocal(index))?;
        *slot = value;
        Ok(())
    }

    pub(crate) fn jump(&mut self, displacement: i16) -> Result<()> {
        let frame = self.frame_mut()?;
        frame.ip = (frame.ip as isize + displacement as isize) as usize;
        Ok(())
    }

    pub(crate) fn output(&mut self) -> Result<&mut Recorder> {
        self.outputs
            .last_mut()
            .ok_or_else(|| Error::Output("no output".into()))
    }

    pub(crate) fn emit(&mut self, event: OutputEvent) -> Result<()> {
        self.output()?.handle(&event)
    }

    pub(crate) fn push_output(&mut self) {
        self.outputs.push(Recorder::new());
    }

    pub(crate) fn pop_output(&mut self) -> Result<Vec<OutputEvent>> {
        if self.outputs.len() < 2 {
            return Err(Error::Output("no result tree fragment to finish".into()));
        }
        let recorder = self
            .outputs
            .pop()
            .ok_or_else(|| Error::Output("no output".into()))?;
        if recorder.depth() > 0 {
            return Err(Error::Output("element left open in result tree fragment".into()));
        }
        Ok(recorder.into_events())
    }

    /// The main result, once the transformation is done.
    pub(crate) fn finish_output(&mut self) -> Result<Vec<OutputEvent>> {
        match self.outputs.pop() {
            Some(recorder) if self.outputs.is_empty() => Ok(recorder.into_events()),
            _ => Err(Error::Output("result tree fragment left open".into())),
        }
    }

    /// The namespace a prefix is bound to in the output being written.
    pub(crate) fn resolve_prefix(&self, prefix: &str) -> Option<String> {
        self.outputs
            .iter()
            .rev()
            .find_map(|recorder| recorder.resolve(prefix))
            .filter(|uri| !uri.is_empty())
            .map(str::to_string)
    }

    pub(crate) fn push_param_frame(&mut self) {
        self.params.push(Vec::new());
    }

    pub(crate) fn pop_param_frame(&mut self) -> Result<()> {
        self.params
            .pop()
            .map(|_| ())
            .ok_or(Error::StackUnderflow)
    }

    pub(crate) fn add_param(&mut self, name: &str, value: Value) -> Result<()> {
        let frame = self.params.last_mut().ok_or(Error::StackUnderflow)?;
        frame.retain(|(existing, _)| existing != name);
        frame.push((name.to_string(), value));
        Ok(())
    }

    pub(crate) fn param(&self, name: &str) -> Value {
        self.params
            .last()
            .and_then(|frame| frame.iter().find(|(existing, _)| existing == name))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null)
    }

    pub(crate) fn push_copy(&mut self, started: bool) {
        self.copies.push(started);
    }

    pub(crate) fn pop_copy(&mut self) -> Result<bool> {
        self.copies
            .pop()
            .ok_or_else(|| Error::Output("end of a copy that was never started".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_hold_receiver_arguments_and_locals() {
        let mut state = State::new();
        state.push(Value::Null);
        state.push(Value::Number(1.0));
        state.push_frame(0, 0, 1, 3).unwrap();
        assert!(matches!(state.local(1).unwrap(), Value::Number(n) if n == 1.0));
        assert!(state.local(2).unwrap().is_null());
        state.set_local(2, Value::from("x")).unwrap();
        state.push(Value::Boolean(true));
        state.pop_frame(Value::Number(2.0)).unwrap();
        assert_eq!(state.depth(), 0);
        assert!(matches!(state.pop().unwrap(), Value::Number(n) if n == 2.0));
    }

    #[test]
    fn test_param_frames_shadow() {
        let mut state = State::new();
        state.push_param_frame();
        state.add_param("p", Value::from("outer")).unwrap();
        state.push_param_frame();
        assert!(state.param("p").is_null());
        state.pop_param_frame().unwrap();
        assert!(matches!(state.param("p"), Value::String(s) if s == "outer"));
    }

    #[test]
    fn test_fragments_nest() {
        let mut state = State::new();
        state.push_output();
        state.emit(OutputEvent::Characters("x".into())).unwrap();
        assert_eq!(state.pop_output().unwrap().len(), 1);
        assert!(state.pop_output().is_err());
        assert!(state.finish_output().unwrap().is_empty());
    }
}
