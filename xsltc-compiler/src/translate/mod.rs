//! Lowering of the typed stylesheet to bytecode.
//!
//! A [`MethodCompiler`] emits one method. Its [`Frame`] says where the
//! context node, the current node and the context position live, and
//! which local slot or closure field holds each variable in scope.

mod expr;
mod instruction;
mod pattern;
mod template;

use ahash::{HashMap, HashMapExt};
use thiserror::Error;
use xsltc_bytecode::dom::THIS_SLOT;
use xsltc_bytecode::{
    BytecodeError, ClassGen, Constant, ForwardJumpRef, Instruction, Label, MethodBuilder,
    MethodGen, MethodRef,
};
use xsltc_name::QName;

use crate::context::CompilationContext;
use crate::error::{Abort, ErrorCode};
use crate::loader::Stylesheet;
use crate::symbols::SymbolTable;
use crate::syntax::VariableId;
use crate::typecheck::TExpr;

pub(crate) use template::{named_template_method, ParamSource};

#[derive(Debug, Error)]
pub(crate) enum CodegenError {
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
    #[error("{0}")]
    Internal(String),
}

pub(crate) type CodegenResult<T> = Result<T, CodegenError>;

impl CodegenError {
    /// Record this error as a diagnostic.
    pub(crate) fn report(self, context: &mut CompilationContext) -> Abort {
        let code = match &self {
            CodegenError::Bytecode(
                BytecodeError::MethodTooLarge(_) | BytecodeError::BranchOutOfRange(_),
            ) => ErrorCode::MethodTooLarge,
            _ => ErrorCode::Internal,
        };
        context.abort(code, self.to_string(), None)
    }
}

/// Templates of `mode` with a precedence in `[min, max)`, the set an
/// `apply-imports` in a template of precedence `max` selects from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportWindow {
    pub(crate) mode: Option<QName>,
    pub(crate) min: u32,
    pub(crate) max: u32,
}

/// State shared by every method of one translet.
pub(crate) struct Translation<'a> {
    pub(crate) context: &'a mut CompilationContext,
    pub(crate) symbols: &'a SymbolTable,
    pub(crate) stylesheet: &'a Stylesheet<TExpr>,
    pub(crate) helpers: Vec<ClassGen>,
    pub(crate) import_windows: Vec<ImportWindow>,
}

impl<'a> Translation<'a> {
    pub(crate) fn new(
        context: &'a mut CompilationContext,
        symbols: &'a SymbolTable,
        stylesheet: &'a Stylesheet<TExpr>,
    ) -> Self {
        Translation {
            context,
            symbols,
            stylesheet,
            helpers: Vec::new(),
            import_windows: Vec::new(),
        }
    }

    pub(crate) fn translet_name(&self) -> String {
        self.context.translet_name().to_string()
    }

    pub(crate) fn request_window(&mut self, window: ImportWindow) {
        if !self.import_windows.contains(&window) {
            log::trace!(
                "import window [{}, {}) requested for mode {:?}",
                window.min,
                window.max,
                window.mode
            );
            self.import_windows.push(window);
        }
    }
}

/// Where `position()` and `last()` come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Position {
    /// The iterator in this slot drives the context.
    Iterator(u16),
    /// Both are passed in as arguments.
    Locals { position: u16, last: u16 },
    /// A context of one node.
    One,
}

/// How a method reaches the translet object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransletAccess {
    /// The method belongs to the translet.
    This,
    /// The method belongs to a helper that keeps the translet in field 0.
    Field,
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) node: u16,
    pub(crate) current: u16,
    pub(crate) position: Position,
    pub(crate) translet: TransletAccess,
    pub(crate) locals: HashMap<VariableId, u16>,
    /// Variables a helper captured, by field.
    pub(crate) captured: HashMap<VariableId, u16>,
    /// Template whose body is being compiled.
    pub(crate) template: Option<usize>,
}

impl Frame {
    pub(crate) fn new(node: u16, position: Position, translet: TransletAccess) -> Self {
        Frame {
            node,
            current: node,
            position,
            translet,
            locals: HashMap::new(),
            captured: HashMap::new(),
            template: None,
        }
    }
}

/// Pending branches of a compiled condition. Code following the
/// condition runs when it holds; `false_list` jumps go elsewhere and
/// `true_list` jumps must be sent to where the true path continues.
#[derive(Debug, Default)]
pub(crate) struct BranchLists {
    pub(crate) true_list: Vec<ForwardJumpRef>,
    pub(crate) false_list: Vec<ForwardJumpRef>,
}

impl BranchLists {
    pub(crate) fn extend(&mut self, other: BranchLists) {
        self.true_list.extend(other.true_list);
        self.false_list.extend(other.false_list);
    }
}

pub(crate) struct MethodCompiler<'t, 'a> {
    pub(crate) t: &'t mut Translation<'a>,
    pub(crate) builder: MethodBuilder,
    pub(crate) frame: Frame,
}

impl<'t, 'a> MethodCompiler<'t, 'a> {
    pub(crate) fn new(t: &'t mut Translation<'a>, builder: MethodBuilder, frame: Frame) -> Self {
        MethodCompiler { t, builder, frame }
    }

    pub(crate) fn finish(self) -> CodegenResult<MethodGen> {
        let method = self.builder.finish()?;
        log::trace!("finished {} ({} bytes)", method.name, method.code.len());
        Ok(method)
    }

    pub(crate) fn emit(&mut self, instruction: Instruction) {
        self.builder.emit(instruction);
    }

    pub(crate) fn constant(&mut self, constant: Constant) -> CodegenResult<u16> {
        Ok(self.builder.add_constant(constant)?)
    }

    pub(crate) fn push_constant(&mut self, constant: Constant) -> CodegenResult<()> {
        Ok(self.builder.emit_constant(constant)?)
    }

    pub(crate) fn push_string(&mut self, value: &str) -> CodegenResult<()> {
        self.push_constant(Constant::String(value.to_string()))
    }

    pub(crate) fn push_number(&mut self, value: f64) -> CodegenResult<()> {
        self.push_constant(Constant::Number(value.into()))
    }

    pub(crate) fn load_translet(&mut self) {
        self.emit(Instruction::Load(THIS_SLOT));
        if self.frame.translet == TransletAccess::Field {
            self.emit(Instruction::GetField(0));
        }
    }

    /// Invoke a method. The receiver and `arity` arguments must be on the
    /// stack; the result replaces them.
    pub(crate) fn invoke(&mut self, class: &str, name: &str, arity: u16) -> CodegenResult<()> {
        let method = self.constant(Constant::Method(MethodRef {
            class: class.to_string(),
            name: name.to_string(),
            arity,
        }))?;
        self.emit(Instruction::Invoke(method));
        Ok(())
    }

    pub(crate) fn patch_here(&mut self, jumps: Vec<ForwardJumpRef>) {
        for jump in jumps {
            self.builder.patch_jump_here(jump);
        }
    }

    pub(crate) fn patch_to(&mut self, jumps: Vec<ForwardJumpRef>, label: Label) {
        for jump in jumps {
            self.builder.patch_jump(jump, label);
        }
    }

    /// Run `f` with a different context node and position; the current
    /// node stays.
    pub(crate) fn with_context<T>(
        &mut self,
        node: u16,
        position: Position,
        f: impl FnOnce(&mut Self) -> CodegenResult<T>,
    ) -> CodegenResult<T> {
        let saved = (self.frame.node, self.frame.position);
        self.frame.node = node;
        self.frame.position = position;
        let result = f(self);
        (self.frame.node, self.frame.position) = saved;
        result
    }

    /// Like [`Self::with_context`], also making `node` the current node.
    pub(crate) fn with_current<T>(
        &mut self,
        node: u16,
        position: Position,
        f: impl FnOnce(&mut Self) -> CodegenResult<T>,
    ) -> CodegenResult<T> {
        let saved = self.frame.current;
        self.frame.current = node;
        let result = self.with_context(node, position, f);
        self.frame.current = saved;
        result
    }
}
