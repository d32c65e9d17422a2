use xsltc_bytecode::Translet;

use crate::dom::Dom;
use crate::error::{Error, SpannedResult};
use crate::interpreter::{Interpreter, Program};
use crate::options::TransformOptions;
use crate::output::{serialize, OutputEvent};

/// Transform an XML document with a compiled translet and serialize the
/// result with the translet's output properties.
pub fn transform(translet: &Translet, xml: &str, options: &TransformOptions) -> SpannedResult<String> {
    let dom = Dom::parse(xml)?;
    transform_dom(translet, &dom, options)
}

pub fn transform_dom(
    translet: &Translet,
    dom: &Dom,
    options: &TransformOptions,
) -> SpannedResult<String> {
    let events = transform_events(translet, dom, options)?;
    Ok(serialize(&events, &translet.output)?)
}

/// The result of a transformation, before serialization.
pub fn transform_events(
    translet: &Translet,
    dom: &Dom,
    options: &TransformOptions,
) -> SpannedResult<Vec<OutputEvent>> {
    if translet.classes.is_empty() {
        return Err(Error::UnknownClass("translet".to_string()).into());
    }
    let program = Program::new(translet);
    Interpreter::new(program, dom, options).transform()
}
