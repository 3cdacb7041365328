//! # Otter Declarative Bytecode
//!
//! Artifact format produced by the declarative object compiler and consumed by
//! the instantiation VM and the binding runtime.
//!
//! ## Contents
//!
//! - **Instructions**: a typed, line-tagged instruction stream (`Instruction`, `Instr`)
//! - **Pools**: interned strings, urls, byte arrays and packed numeric arrays
//! - **Descriptors**: relocatable dynamic-type descriptors and their synthesis data
//! - **Property caches**: name to index tables with versioned availability
//! - **Binding payloads**: rewritten binding bodies packed for the blob tables

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod component;
pub mod descriptor;
pub mod error;
pub mod instruction;
pub mod operand;
pub mod payload;
pub mod pool;

pub use cache::{CacheEntry, CacheFlags, PropertyCache};
pub use component::{ArtifactType, ArtifactTypeKind, CompiledComponent, ContextCache, CustomTypeData, ImportedScript};
pub use descriptor::{
    AliasTarget, DynamicTypeDescriptor, MethodData, MethodSlot, PropertySlot, SignalSlot, SlotStorage,
    SynthesisData, ALIAS_FLAG_PTR,
};
pub use error::BytecodeError;
pub use instruction::{Instr, Instruction, Opcode, SavedProperty};
pub use operand::{DataIndex, FloatDataIndex, IntDataIndex, StringIndex, TypeIndex, UrlIndex};
pub use payload::{BindingPayload, ProgramRef, SHARED_PROGRAM_BIT};
pub use pool::DataPool;

/// Artifact format version
pub const ARTIFACT_VERSION: u32 = 1;

/// Magic bytes for serialized artifacts
pub const ARTIFACT_MAGIC: [u8; 8] = *b"OTDECL\0\0";
