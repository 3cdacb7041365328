//! Packed binding payloads
//!
//! Layout: program index (`u32`, little endian, high bit set for the shared
//! closure table), source length in UTF-16 units (`u32`), then the rewritten
//! source as UTF-16LE.

use crate::error::{BytecodeError, Result};

/// High bit of the program index selecting the shared closure table
pub const SHARED_PROGRAM_BIT: u32 = 0x8000_0000;

/// Which compiled-program table a binding uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramRef {
    /// Closure evaluated once per artifact and shared by all instances
    SharedClosure(u32),
    /// Program compiled once per artifact, evaluated per binding
    Program(u32),
}

impl ProgramRef {
    /// Encode as a tagged program index
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::SharedClosure(idx) => idx | SHARED_PROGRAM_BIT,
            Self::Program(idx) => idx,
        }
    }

    /// Decode a tagged program index
    pub const fn from_raw(raw: u32) -> Self {
        if raw & SHARED_PROGRAM_BIT != 0 {
            Self::SharedClosure(raw & !SHARED_PROGRAM_BIT)
        } else {
            Self::Program(raw)
        }
    }

    /// Slot index within the selected table
    pub const fn slot(self) -> u32 {
        match self {
            Self::SharedClosure(idx) | Self::Program(idx) => idx,
        }
    }
}

/// A rewritten binding body ready for the script engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPayload {
    /// Program table slot
    pub program: ProgramRef,
    /// Rewritten, self-contained function source
    pub source: String,
}

impl BindingPayload {
    /// Create a payload
    pub fn new(program: ProgramRef, source: impl Into<String>) -> Self {
        Self {
            program,
            source: source.into(),
        }
    }

    /// Pack for the byte-array table
    pub fn encode(&self) -> Vec<u8> {
        let units: Vec<u16> = self.source.encode_utf16().collect();
        let mut bytes = Vec::with_capacity(8 + units.len() * 2);
        bytes.extend_from_slice(&self.program.to_raw().to_le_bytes());
        bytes.extend_from_slice(&(units.len() as u32).to_le_bytes());
        for unit in units {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    /// Unpack from the byte-array table
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(BytecodeError::UnexpectedEnd);
        }
        let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let body = &bytes[8..];
        if body.len() != len * 2 {
            return Err(BytecodeError::MalformedPayload(format!(
                "expected {} source units, found {} bytes",
                len,
                body.len()
            )));
        }
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let source =
            String::from_utf16(&units).map_err(|e| BytecodeError::MalformedPayload(e.to_string()))?;
        Ok(Self {
            program: ProgramRef::from_raw(raw),
            source,
        })
    }
}
