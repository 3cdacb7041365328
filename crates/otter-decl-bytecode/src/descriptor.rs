//! Relocatable dynamic-type descriptors
//!
//! An object that declares its own properties, signals or methods gets a
//! descriptor layered on its native base type. The descriptor only refers to
//! its base by class name and to other objects by id index, so it can be
//! stored in an artifact and rebuilt against the right base type later.
//!
//! Slot layout is fixed once the structural pass has run: value properties
//! first, then alias properties, each with one notify signal in the same
//! order, then declared signals, then methods. The alias pass only fills in
//! the alias slots.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Alias target flag: the aliased property holds an object pointer
pub const ALIAS_FLAG_PTR: u32 = 0x0000_0001;

/// Storage behind a property slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStorage {
    /// Plain storage of a registered property type
    Value {
        /// Type code of the stored value
        type_code: u32,
    },
    /// Pointer to an object of the slot's type name
    Object,
    /// Read-only list of objects of the slot's type name
    List,
    /// Forwarded to another object's property; `None` until the alias pass ran
    Alias(Option<AliasTarget>),
}

/// Where an alias slot forwards to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTarget {
    /// Id index of the target object in the component's context
    pub context_index: u32,
    /// Property index, with the value-type sub-property in bits 16..24 and
    /// the value type code in bits 24..32 when present. `None` aliases the
    /// object itself.
    pub property_index: Option<u32>,
    /// `ALIAS_FLAG_*` bits
    pub flags: u32,
    /// Type code of the aliased property
    pub type_code: u32,
}

impl AliasTarget {
    /// Encode a target property index, optionally through a value-type sub-property
    pub fn encode_property(property: u32, value_type: Option<(u32, u32)>) -> u32 {
        match value_type {
            Some((sub_index, type_code)) => property | (type_code << 24) | (sub_index << 16),
            None => property,
        }
    }

    /// Index of the aliased property on the target object
    pub fn core_index(&self) -> Option<u32> {
        self.property_index.map(|idx| {
            if idx & 0xFF00_0000 != 0 {
                idx & 0xFFFF
            } else {
                idx
            }
        })
    }

    /// Value-type sub-property index, if the alias reaches into a value type
    pub fn value_type_index(&self) -> Option<u32> {
        self.property_index
            .filter(|idx| idx & 0xFF00_0000 != 0)
            .map(|idx| (idx >> 16) & 0xFF)
    }

    /// Whether the aliased property holds an object
    pub fn is_pointer(&self) -> bool {
        self.flags & ALIAS_FLAG_PTR != 0
    }
}

/// A property slot in a dynamic type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySlot {
    /// Property name
    pub name: String,
    /// Exposed type name (empty for an unresolved alias)
    pub type_name: String,
    /// Storage kind
    pub storage: SlotStorage,
    /// Whether scripts may write the property
    pub writable: bool,
    /// Index of the notify signal within the descriptor's signals
    pub notify_signal: u32,
}

impl PropertySlot {
    /// Whether this slot is an alias
    pub fn is_alias(&self) -> bool {
        matches!(self.storage, SlotStorage::Alias(_))
    }
}

/// A signal slot in a dynamic type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSlot {
    /// Signal name
    pub name: String,
    /// Parameter type names
    pub parameter_types: Vec<String>,
    /// Parameter names
    pub parameter_names: Vec<String>,
}

impl SignalSlot {
    /// Signal with no parameters
    pub fn notify(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_types: Vec::new(),
            parameter_names: Vec::new(),
        }
    }

    /// Normalized signature, e.g. `moved(int,int)`
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.parameter_types.join(","))
    }
}

/// A script method slot in a dynamic type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSlot {
    /// Method name
    pub name: String,
    /// Parameter names
    pub parameter_names: Vec<String>,
}

impl MethodSlot {
    /// Normalized signature; every parameter is untyped
    pub fn signature(&self) -> String {
        let params = vec!["var"; self.parameter_names.len()];
        format!("{}({})", self.name, params.join(","))
    }
}

/// Dynamic type layered on a native base type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DynamicTypeDescriptor {
    /// Synthesized class name
    pub class_name: String,
    /// Class name of the base type
    pub base_class: String,
    /// Name of the declared default property
    pub default_property: Option<String>,
    /// Property slots (value properties, then aliases)
    pub properties: Vec<PropertySlot>,
    /// Signal slots (one notify per property slot, then declared signals)
    pub signals: Vec<SignalSlot>,
    /// Method slots
    pub methods: Vec<MethodSlot>,
}

impl DynamicTypeDescriptor {
    /// Create an empty descriptor
    pub fn new(class_name: impl Into<String>, base_class: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            base_class: base_class.into(),
            ..Self::default()
        }
    }

    /// Number of alias slots
    pub fn alias_count(&self) -> usize {
        self.properties.iter().filter(|p| p.is_alias()).count()
    }

    /// Number of alias slots whose target is still unknown
    pub fn unresolved_alias_count(&self) -> usize {
        self.properties
            .iter()
            .filter(|p| matches!(p.storage, SlotStorage::Alias(None)))
            .count()
    }

    /// Find a property slot by name
    pub fn property(&self, name: &str) -> Option<(usize, &PropertySlot)> {
        self.properties.iter().enumerate().find(|(_, p)| p.name == name)
    }

    /// Serialize for the byte-array table
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the byte-array table
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Per-method data needed to run a script method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodData {
    /// Number of declared parameters
    pub parameter_count: u32,
    /// Offset of the wrapped body in `SynthesisData::method_bodies`
    pub body_offset: u32,
    /// Length of the wrapped body in bytes
    pub body_length: u32,
    /// Source line of the declaration
    pub line: u32,
}

/// Runtime data backing a dynamic type: alias targets and method bodies
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SynthesisData {
    /// Number of storage-backed properties
    pub value_property_count: u32,
    /// Alias targets in alias slot order
    pub aliases: Vec<AliasTarget>,
    /// Number of declared signals
    pub signal_count: u32,
    /// Method data in method slot order
    pub methods: Vec<MethodData>,
    /// Concatenated wrapped method bodies
    pub method_bodies: String,
}

impl SynthesisData {
    /// Append a method with its wrapped body
    pub fn push_method(&mut self, parameter_count: u32, body: &str, line: u32) {
        let body_offset = self.method_bodies.len() as u32;
        self.method_bodies.push_str(body);
        self.methods.push(MethodData {
            parameter_count,
            body_offset,
            body_length: body.len() as u32,
            line,
        });
    }

    /// Wrapped body of the method at `index`
    pub fn method_body(&self, index: usize) -> Option<&str> {
        let data = self.methods.get(index)?;
        let start = data.body_offset as usize;
        self.method_bodies.get(start..start + data.body_length as usize)
    }

    /// Serialize for the byte-array table
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the byte-array table
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
