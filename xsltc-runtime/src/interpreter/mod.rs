/// Running translets: the program a translet is loaded into, the state of
/// a run, and the instruction loop.
mod interpret;
mod program;
mod state;

pub(crate) use interpret::Interpreter;
pub(crate) use program::Program;
