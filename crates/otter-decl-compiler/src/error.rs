//! Compilation errors

use std::fmt;

use thiserror::Error;

use otter_decl_bytecode::BytecodeError;

/// A user-facing compile diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Url of the compiled document
    pub url: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Description
    pub description: String,
}

impl Diagnostic {
    /// Create a diagnostic; the description is trimmed
    pub fn new(url: impl Into<String>, line: u32, column: u32, description: impl AsRef<str>) -> Self {
        Self {
            url: url.into(),
            line,
            column,
            description: description.as_ref().trim().to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.url, self.line, self.column, self.description)
    }
}

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// One or more diagnostics were reported
    #[error("Compilation failed with {} error(s); first: {}", .0.len(), first(.0))]
    Failed(Vec<Diagnostic>),

    /// A binding body could not be parsed
    #[error("Rewrite error: {0}")]
    Rewrite(String),

    /// Artifact encoding failed
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
}

impl CompileError {
    /// Reported diagnostics, empty for non-diagnostic errors
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Failed(list) => list,
            _ => &[],
        }
    }
}

fn first(list: &[Diagnostic]) -> String {
    list.first().map(ToString::to_string).unwrap_or_default()
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Marker for a step that already recorded its diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reported;

/// Result of a single resolution step
pub(crate) type Step<T = ()> = Result<T, Reported>;
