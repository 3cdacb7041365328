//! # Otter Declarative Compiler
//!
//! Compiles a parsed declarative object tree into an instantiation artifact:
//! synthesized dynamic types for objects declaring their own members, and a
//! linear instruction stream that builds the object graph.
//!
//! ## Pipeline
//!
//! 1. Resolve the document's type table against a [`TypeRegistry`]
//! 2. Walk the tree, resolving properties, ids, signals and bindings
//! 3. Synthesize dynamic types (structural pass, then the alias pass)
//! 4. Rewrite bindings into function literals, or hand them to a [`BindingOptimizer`]
//! 5. Emit instructions, back-patching deferred blocks and component lengths

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod compiler;
pub mod convert;
pub mod custom;
mod emitter;
pub mod error;
pub mod literal;
pub mod meta;
pub mod optimizer;
pub mod options;
pub mod registry;
mod resolver;
pub mod rewrite;
pub mod state;
mod synth;
pub mod tree;

pub use compiler::{CompiledDocument, Compiler};
pub use custom::{CustomNode, CustomParser, CustomParserContext, CustomProperty, CustomValue};
pub use error::{CompileError, CompileResult, Diagnostic};
pub use meta::{MetaEnum, MetaMethod, MetaObject, MetaProperty, MethodKind, PropertyType};
pub use optimizer::{BindingOptimizer, BindingSite};
pub use options::CompilerOptions;
pub use registry::{AttachedType, CompositeType, InMemoryRegistry, RegisteredType, TypeRegistry};
pub use state::ComponentStats;
pub use tree::{
    Document, DynamicMethod, DynamicPropertyKind, DynamicSignal, Literal, Location, ObjectId, PropertyId, Span,
    ValueContent, ValueId, ValueKind,
};
