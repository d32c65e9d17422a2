#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BytecodeError {
    #[error("too many constants in method {0}")]
    TooManyConstants(String),
    #[error("too many local variables in method {0}")]
    TooManyLocals(String),
    #[error("branch target out of range in method {0}")]
    BranchOutOfRange(String),
    #[error("method {0} exceeds the maximum method size")]
    MethodTooLarge(String),
    #[error("branch to a label that was never placed in method {0}")]
    UnplacedLabel(String),
}
