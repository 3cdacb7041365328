//! Script engine capability
//!
//! The runtime does not interpret script itself. The embedder supplies an
//! engine that compiles binding sources and runs them against a context
//! (id lookup) and a scope object (unqualified property lookup).

use crate::error::ScriptError;

/// How an expression's function is resolved against its context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// One closure per artifact; context and scope are installed around each call
    Shared,
    /// One function per expression, bound to its context and scope when created
    Program,
}

/// A script engine able to run binding programs
pub trait ScriptEngine {
    /// Script value
    type Value: Clone + std::fmt::Debug;
    /// Compiled, context-free program
    type Program;
    /// Callable function
    type Function: Clone;
    /// Id lookup context
    type Context: Clone;
    /// Object unqualified names resolve against
    type Scope: Clone;

    /// Compile `source`, reporting errors against `file` and `line`
    fn compile(&self, source: &str, file: &str, line: u32) -> Result<Self::Program, ScriptError>;

    /// Evaluate a shared-closure program to the function it defines
    ///
    /// The function resolves names through whatever shared context and scope
    /// are installed when it is called.
    fn instantiate_shared(&self, program: &Self::Program) -> Result<Self::Function, ScriptError>;

    /// Evaluate a program to a function bound to `context` and `scope`
    fn instantiate(
        &self,
        program: &Self::Program,
        context: &Self::Context,
        scope: &Self::Scope,
    ) -> Result<Self::Function, ScriptError>;

    /// Install the shared context and scope, returning the previous pair
    fn swap_shared(&self, shared: Option<(Self::Context, Self::Scope)>) -> Option<(Self::Context, Self::Scope)>;

    /// Call a function; an uncaught exception is returned as an error
    fn call(&self, function: &Self::Function) -> Result<Self::Value, ScriptError>;

    /// Whether `value` is the undefined value
    fn is_undefined(&self, value: &Self::Value) -> bool;
}
