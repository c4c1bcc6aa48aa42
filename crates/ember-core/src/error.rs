//! Engine error types

use thiserror::Error;

/// Errors reported by engine operations
///
/// The export surface degrades every one of these to a log line; inside the
/// crate they are ordinary `Result` values so each policy stays testable.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No function with this name has been begun
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A function or JIT symbol with this name already exists
    #[error("function {0} has been registered")]
    DuplicateFunction(String),

    /// Two formal parameters share a name
    #[error("duplicate argument {argument} in function {function}")]
    DuplicateArgument { function: String, argument: String },

    /// A variable operand names nothing in scope
    #[error("unbound variable {variable} in function {function}")]
    UnboundVariable { function: String, variable: String },

    /// The function has already been finished
    #[error("function {0} is already finished")]
    FunctionClosed(String),

    /// `loop_end` was issued with no open loop
    #[error("no open loop in function {0}")]
    NoOpenLoop(String),

    /// A byte that should name a data type does not
    #[error("invalid data type tag: {0}")]
    InvalidDataType(u8),

    /// A byte that should name an arithmetic operation does not
    #[error("invalid operation tag: {0}")]
    InvalidOperation(u8),

    /// An operand buffer could not be decoded
    #[error("invalid operand buffer: {0}")]
    InvalidOperand(String),

    /// Argument count and argument names disagree
    #[error("expected {expected} arguments, got {got}")]
    ArgumentMismatch { expected: usize, got: usize },

    /// A packed argument or result buffer has the wrong length
    #[error("buffer size mismatch: expected {expected} bytes, got {got}")]
    BufferSize { expected: usize, got: usize },

    /// The function exists but has no finalized code
    #[error("function {0} has not been compiled")]
    NotCompiled(String),

    /// Cranelift rejected or failed to compile some code
    #[error("Cranelift compilation error: {0}")]
    Cranelift(String),

    /// The JIT could not be constructed for the host
    #[error("failed to construct the execution engine: {0}")]
    EngineInit(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
