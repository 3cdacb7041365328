//! Compiled component artifact

use std::fmt;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::cache::PropertyCache;
use crate::error::{BytecodeError, Result};
use crate::instruction::{Instr, Instruction};
use crate::operand::StringIndex;
use crate::pool::DataPool;
use crate::{ARTIFACT_MAGIC, ARTIFACT_VERSION};

/// Kind of a referenced type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactTypeKind {
    /// Type provided by the native registry
    Native {
        /// Registry id of the type
        type_id: u32,
    },
    /// Type defined by another compiled document
    Composite {
        /// Url of the defining document
        url: String,
    },
}

/// A type referenced by creation instructions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactType {
    /// Name the document used for the type
    pub class_name: String,
    /// Where the type comes from
    pub kind: ArtifactTypeKind,
}

/// Entry in the custom-type conversion table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTypeData {
    /// Literal text to convert
    pub index: StringIndex,
    /// Type code of the target property
    pub type_code: u32,
}

/// Id name to id index lookup table for one component scope
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextCache {
    ids: Vec<(String, u32)>,
}

impl ContextCache {
    /// Build from ids in id-index order
    pub fn new(ids: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Index of an id
    pub fn index_of(&self, id: &str) -> Option<u32> {
        self.ids.iter().find(|(name, _)| name == id).map(|(_, idx)| *idx)
    }

    /// Ids in table order
    pub fn ids(&self) -> &[(String, u32)] {
        &self.ids
    }
}

/// An imported script block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedScript {
    /// Name the script is reachable under
    pub qualifier: String,
    /// Url the script was loaded from
    pub url: String,
    /// Script source
    pub source: String,
}

/// The result of compiling one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledComponent {
    /// Url of the compiled document
    pub url: String,
    /// Referenced types
    pub types: Vec<ArtifactType>,
    /// Instruction stream
    pub bytecode: Vec<Instr>,
    /// Interned data
    pub pool: DataPool,
    /// Custom-type conversion table
    pub custom_type_data: Vec<CustomTypeData>,
    /// Id lookup tables
    pub context_caches: Vec<ContextCache>,
    /// Property caches for synthesized types
    pub property_caches: Vec<PropertyCache>,
    /// Index of the document root's property cache
    pub root_property_cache: Option<u32>,
    /// Imported scripts
    pub scripts: Vec<ImportedScript>,
    /// Number of shared-closure table slots
    pub cached_closures: u32,
    /// Number of per-binding program table slots
    pub cached_programs: u32,
}

impl CompiledComponent {
    /// Create an empty artifact for a document
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Drop all compiled state, keeping the url
    pub fn reset(&mut self) {
        let url = std::mem::take(&mut self.url);
        *self = Self::new(url);
    }

    /// Append an instruction, returns its index
    pub fn emit(&mut self, line: u32, op: Instruction) -> usize {
        self.bytecode.push(Instr::new(line, op));
        self.bytecode.len() - 1
    }

    /// Index the next instruction will get
    pub fn next_index(&self) -> usize {
        self.bytecode.len()
    }

    /// Mutable access for back-patching
    pub fn instruction_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.bytecode.get_mut(index).map(|instr| &mut instr.op)
    }

    /// Add an id lookup table, returns its index
    pub fn add_context_cache(&mut self, cache: ContextCache) -> u32 {
        self.context_caches.push(cache);
        (self.context_caches.len() - 1) as u32
    }

    /// Add a property cache, returns its index
    pub fn add_property_cache(&mut self, cache: PropertyCache) -> u32 {
        self.property_caches.push(cache);
        (self.property_caches.len() - 1) as u32
    }

    /// Add a custom-type conversion entry, returns its index
    pub fn add_custom_type_data(&mut self, data: CustomTypeData) -> u32 {
        self.custom_type_data.push(data);
        (self.custom_type_data.len() - 1) as u32
    }

    /// The document root's property cache
    pub fn root_cache(&self) -> Option<&PropertyCache> {
        self.root_property_cache
            .and_then(|idx| self.property_caches.get(idx as usize))
    }

    /// Human-readable listing of the instruction stream
    pub fn disassemble(&self) -> String {
        self.to_string()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&ARTIFACT_MAGIC);
        bytes.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());

        let data = serde_json::to_vec(self)?;
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&data);

        Ok(bytes)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 16 {
            return Err(BytecodeError::UnexpectedEnd);
        }
        if bytes[0..8] != ARTIFACT_MAGIC {
            return Err(BytecodeError::InvalidMagic);
        }

        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let version = word(8);
        if version != ARTIFACT_VERSION {
            return Err(BytecodeError::UnsupportedVersion(version));
        }

        let data_len = word(12) as usize;
        if bytes.len() < 16 + data_len {
            return Err(BytecodeError::UnexpectedEnd);
        }
        Ok(serde_json::from_slice(&bytes[16..16 + data_len])?)
    }

    /// Write the artifact to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read an artifact from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for CompiledComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.url)?;
        writeln!(f, "Index\tLine\tOperation\t\tData")?;
        writeln!(f, "-------------------------------------------------------------------------------")?;
        for (idx, instr) in self.bytecode.iter().enumerate() {
            writeln!(f, "{idx}\t{instr}")?;
        }
        writeln!(f, "-------------------------------------------------------------------------------")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::TypeIndex;

    fn sample() -> CompiledComponent {
        let mut component = CompiledComponent::new("file:///main.qml");
        component.types.push(ArtifactType {
            class_name: "Item".into(),
            kind: ArtifactTypeKind::Native { type_id: 0 },
        });
        let id = component.pool.add_string("root");
        component.emit(
            1,
            Instruction::CreateObject {
                type_index: TypeIndex(0),
                data: None,
                binding_bits: None,
                column: 1,
            },
        );
        component.emit(1, Instruction::SetId { value: id, index: 0 });
        component.emit(1, Instruction::SetDefault);
        component
    }

    #[test]
    fn test_serialization() {
        let component = sample();
        let bytes = component.to_bytes().unwrap();
        assert_eq!(&bytes[0..8], &ARTIFACT_MAGIC);

        let restored = CompiledComponent::from_bytes(&bytes).unwrap();
        assert_eq!(restored, component);
    }

    #[test]
    fn test_rejects_bad_headers() {
        let mut bytes = sample().to_bytes().unwrap();
        assert!(matches!(
            CompiledComponent::from_bytes(&bytes[..10]),
            Err(BytecodeError::UnexpectedEnd)
        ));

        bytes[8] = 99;
        assert!(matches!(
            CompiledComponent::from_bytes(&bytes),
            Err(BytecodeError::UnsupportedVersion(99))
        ));

        bytes[0] = b'X';
        assert!(matches!(
            CompiledComponent::from_bytes(&bytes),
            Err(BytecodeError::InvalidMagic)
        ));
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_stream_round_trip_and_io_errors() {
        let component = sample();
        let mut buffer = Vec::new();
        component.write_to(&mut buffer).unwrap();
        let restored = CompiledComponent::read_from(&mut buffer.as_slice()).unwrap();
        assert_eq!(restored, component);

        let err = component.write_to(&mut Broken).unwrap_err();
        assert!(matches!(&err, BytecodeError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe));
        assert_eq!(err.to_string(), "IO error: closed");
        assert!(matches!(CompiledComponent::read_from(&mut Broken), Err(BytecodeError::Io(_))));
    }

    #[test]
    fn test_patch_and_reset() {
        let mut component = sample();
        let at = component.emit(2, Instruction::Defer { defer_count: 0 });
        if let Some(Instruction::Defer { defer_count }) = component.instruction_mut(at) {
            *defer_count = 4;
        }
        assert_eq!(component.bytecode[at].op, Instruction::Defer { defer_count: 4 });

        component.reset();
        assert!(component.bytecode.is_empty());
        assert!(component.types.is_empty());
        assert_eq!(component.url, "file:///main.qml");
    }

    #[test]
    fn test_context_cache_and_disassembly() {
        let mut component = sample();
        let idx = component.add_context_cache(ContextCache::new([("root".to_string(), 0)]));
        assert_eq!(component.context_caches[idx as usize].index_of("root"), Some(0));
        assert_eq!(component.context_caches[idx as usize].index_of("other"), None);

        let listing = component.disassemble();
        assert!(listing.contains("CREATE"));
        assert!(listing.contains("SETID"));
    }
}
