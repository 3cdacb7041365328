//! # Otter Declarative Runtime
//!
//! Reactive evaluation of the bindings produced by the declarative compiler.
//!
//! ## Contents
//!
//! - **Capture**: a per-thread toggle recording which properties an evaluation reads
//! - **Notifiers**: change sources and the guard endpoints listening to them
//! - **Expressions**: script evaluation with dependency tracking and exception capture
//! - **Bindings**: expressions wired to a target property, with loop detection
//! - **Program caches**: per-artifact tables of compiled binding programs
//!
//! The script engine itself is supplied by the embedder through [`ScriptEngine`].

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod binding;
pub mod cache;
pub mod capture;
pub mod engine;
pub mod error;
pub mod expression;
pub mod notifier;
pub mod property;

pub use binding::{Binding, BindingTarget};
pub use cache::ProgramCache;
pub use capture::{CaptureScope, CapturedProperty};
pub use engine::{EvaluationMode, ScriptEngine};
pub use error::{RuntimeError, RuntimeResult, ScriptError};
pub use expression::{Evaluation, Expression};
pub use notifier::{Notifier, NotifierEndpoint, NotifyCallback};
pub use property::Property;
