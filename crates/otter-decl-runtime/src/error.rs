//! Runtime errors

use std::fmt;

use otter_decl_bytecode::BytecodeError;
use thiserror::Error;

/// File name reported for exceptions that carry none
pub const UNKNOWN_FILE: &str = "<Unknown File>";

/// An uncaught script exception
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Exception text
    pub message: String,
    /// Source file, [`UNKNOWN_FILE`] when the engine did not know it
    pub file: String,
    /// 1-based line, 0 when unknown
    pub line: u32,
}

impl ScriptError {
    /// Create an error, substituting the unknown-file marker for an empty file name
    pub fn new(message: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        let file = file.into();
        Self {
            message: message.into(),
            file: if file.is_empty() { UNKNOWN_FILE.to_string() } else { file },
            line,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

/// Errors raised while preparing or running bindings
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Script compilation or evaluation failed
    #[error("Script error: {0}")]
    Script(ScriptError),

    /// A binding payload could not be decoded
    #[error("Payload error: {0}")]
    Payload(#[from] BytecodeError),

    /// The expression was destroyed while it was being evaluated
    #[error("Expression deleted during evaluation")]
    Deleted,
}

impl From<ScriptError> for RuntimeError {
    fn from(err: ScriptError) -> Self {
        Self::Script(err)
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
