//! Instantiation instructions
//!
//! A compiled component is a flat stream of these instructions. The VM keeps a
//! stack of objects under construction; most instructions operate on the top of
//! that stack. Every instruction is tagged with the source line it came from.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operand::{DataIndex, FloatDataIndex, IntDataIndex, StringIndex, TypeIndex, UrlIndex};

/// Instruction opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Setup ====================
    /// Allocate binding and life-cycle tables for the (sub)program
    Init = 0x00,
    /// Create an object through the general path
    CreateObject = 0x01,
    /// Create a plain native object through its create function
    CreateSimpleObject = 0x02,
    /// Register the top object under an id
    SetId = 0x03,
    /// Mark the top object as the default result
    SetDefault = 0x04,
    /// Create a component wrapping the next `count` instructions
    CreateComponent = 0x05,
    /// Attach a synthesized dynamic type to the top object
    StoreMetaObject = 0x06,
    /// Skip `defer_count` instructions until the object completes
    Defer = 0x07,
    /// Register the top object for construction notifications
    BeginObject = 0x08,
    /// Load an imported script block into the context
    StoreImportedScript = 0x09,

    // ==================== Literal stores ====================
    /// Store a string into a variant property
    StoreVariant = 0x10,
    /// Store an integer into a variant property
    StoreVariantInteger = 0x11,
    /// Store a double into a variant property
    StoreVariantDouble = 0x12,
    /// Store a bool into a variant property
    StoreVariantBool = 0x13,
    /// Store a string
    StoreString = 0x14,
    /// Store a resolved url
    StoreUrl = 0x15,
    /// Store a single precision float
    StoreFloat = 0x16,
    /// Store a double
    StoreDouble = 0x17,
    /// Store a bool
    StoreBool = 0x18,
    /// Store an integer (also used for enumerations)
    StoreInteger = 0x19,
    /// Store an ARGB color
    StoreColor = 0x1A,
    /// Store a date as a julian day
    StoreDate = 0x1B,
    /// Store a time from packed int data
    StoreTime = 0x1C,
    /// Store a date-time from packed int data
    StoreDateTime = 0x1D,
    /// Store an integer point
    StorePoint = 0x1E,
    /// Store a float point
    StorePointF = 0x1F,
    /// Store an integer size
    StoreSize = 0x20,
    /// Store a float size
    StoreSizeF = 0x21,
    /// Store an integer rect
    StoreRect = 0x22,
    /// Store a float rect
    StoreRectF = 0x23,
    /// Store a 3D vector
    StoreVector3D = 0x24,
    /// Convert a string through a registered custom converter and store it
    AssignCustomType = 0x25,
    /// Store a script string (source + scope)
    StoreScriptString = 0x26,

    // ==================== Objects ====================
    /// Pop the top object and store it into an object property
    StoreObject = 0x30,
    /// Pop the top object and store it into a variant property
    StoreVariantObject = 0x31,
    /// Pop the top object and store it into an interface property
    StoreInterface = 0x32,
    /// Pop the top object and connect it as a signal handler object
    AssignSignalObject = 0x33,
    /// Connect a handler expression to a signal
    StoreSignal = 0x34,
    /// Pop the top object and install it as a value source
    StoreValueSource = 0x35,
    /// Pop the top object and install it as a value interceptor
    StoreValueInterceptor = 0x36,

    // ==================== Bindings ====================
    /// Install a script binding
    StoreBinding = 0x40,
    /// Install a script binding on an alias property
    StoreBindingOnAlias = 0x41,
    /// Install an optimized binding
    StoreCompiledBinding = 0x42,

    // ==================== Sub-scopes ====================
    /// Push the attached object for an attached type id
    FetchAttached = 0x50,
    /// Push a list property
    FetchList = 0x51,
    /// Push the object held by a property
    FetchObject = 0x52,
    /// Push a value type read from a property
    FetchValueType = 0x53,
    /// Pop a pushed object
    PopFetchedObject = 0x54,
    /// Pop a pushed list
    PopList = 0x55,
    /// Write back and pop a pushed value type
    PopValueType = 0x56,
    /// Pop the top object and append it to an interface list
    AssignObjectList = 0x57,
    /// Pop the top object and append it to an object list
    StoreObjectList = 0x58,
}

impl Opcode {
    /// Decode opcode from byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Init),
            0x01 => Some(Self::CreateObject),
            0x02 => Some(Self::CreateSimpleObject),
            0x03 => Some(Self::SetId),
            0x04 => Some(Self::SetDefault),
            0x05 => Some(Self::CreateComponent),
            0x06 => Some(Self::StoreMetaObject),
            0x07 => Some(Self::Defer),
            0x08 => Some(Self::BeginObject),
            0x09 => Some(Self::StoreImportedScript),
            0x10 => Some(Self::StoreVariant),
            0x11 => Some(Self::StoreVariantInteger),
            0x12 => Some(Self::StoreVariantDouble),
            0x13 => Some(Self::StoreVariantBool),
            0x14 => Some(Self::StoreString),
            0x15 => Some(Self::StoreUrl),
            0x16 => Some(Self::StoreFloat),
            0x17 => Some(Self::StoreDouble),
            0x18 => Some(Self::StoreBool),
            0x19 => Some(Self::StoreInteger),
            0x1A => Some(Self::StoreColor),
            0x1B => Some(Self::StoreDate),
            0x1C => Some(Self::StoreTime),
            0x1D => Some(Self::StoreDateTime),
            0x1E => Some(Self::StorePoint),
            0x1F => Some(Self::StorePointF),
            0x20 => Some(Self::StoreSize),
            0x21 => Some(Self::StoreSizeF),
            0x22 => Some(Self::StoreRect),
            0x23 => Some(Self::StoreRectF),
            0x24 => Some(Self::StoreVector3D),
            0x25 => Some(Self::AssignCustomType),
            0x26 => Some(Self::StoreScriptString),
            0x30 => Some(Self::StoreObject),
            0x31 => Some(Self::StoreVariantObject),
            0x32 => Some(Self::StoreInterface),
            0x33 => Some(Self::AssignSignalObject),
            0x34 => Some(Self::StoreSignal),
            0x35 => Some(Self::StoreValueSource),
            0x36 => Some(Self::StoreValueInterceptor),
            0x40 => Some(Self::StoreBinding),
            0x41 => Some(Self::StoreBindingOnAlias),
            0x42 => Some(Self::StoreCompiledBinding),
            0x50 => Some(Self::FetchAttached),
            0x51 => Some(Self::FetchList),
            0x52 => Some(Self::FetchObject),
            0x53 => Some(Self::FetchValueType),
            0x54 => Some(Self::PopFetchedObject),
            0x55 => Some(Self::PopList),
            0x56 => Some(Self::PopValueType),
            0x57 => Some(Self::AssignObjectList),
            0x58 => Some(Self::StoreObjectList),
            _ => None,
        }
    }

    /// Encode opcode to byte
    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Get opcode name for disassembly
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::CreateObject => "CREATE",
            Self::CreateSimpleObject => "CREATE_SIMPLE",
            Self::SetId => "SETID",
            Self::SetDefault => "SET_DEFAULT",
            Self::CreateComponent => "COMPONENT",
            Self::StoreMetaObject => "STORE_META",
            Self::Defer => "DEFER",
            Self::BeginObject => "BEGIN",
            Self::StoreImportedScript => "STORE_IMPORTED_SCRIPT",
            Self::StoreVariant => "STORE_VARIANT",
            Self::StoreVariantInteger => "STORE_VARIANT_INTEGER",
            Self::StoreVariantDouble => "STORE_VARIANT_DOUBLE",
            Self::StoreVariantBool => "STORE_VARIANT_BOOL",
            Self::StoreString => "STORE_STRING",
            Self::StoreUrl => "STORE_URL",
            Self::StoreFloat => "STORE_FLOAT",
            Self::StoreDouble => "STORE_DOUBLE",
            Self::StoreBool => "STORE_BOOL",
            Self::StoreInteger => "STORE_INTEGER",
            Self::StoreColor => "STORE_COLOR",
            Self::StoreDate => "STORE_DATE",
            Self::StoreTime => "STORE_TIME",
            Self::StoreDateTime => "STORE_DATETIME",
            Self::StorePoint => "STORE_POINT",
            Self::StorePointF => "STORE_POINTF",
            Self::StoreSize => "STORE_SIZE",
            Self::StoreSizeF => "STORE_SIZEF",
            Self::StoreRect => "STORE_RECT",
            Self::StoreRectF => "STORE_RECTF",
            Self::StoreVector3D => "STORE_VECTOR3D",
            Self::AssignCustomType => "ASSIGN_CUSTOMTYPE",
            Self::StoreScriptString => "STORE_SCRIPT_STRING",
            Self::StoreObject => "STORE_OBJECT",
            Self::StoreVariantObject => "STORE_VARIANT_OBJECT",
            Self::StoreInterface => "STORE_INTERFACE",
            Self::AssignSignalObject => "ASSIGN_SIGNAL_OBJECT",
            Self::StoreSignal => "STORE_SIGNAL",
            Self::StoreValueSource => "STORE_VALUE_SOURCE",
            Self::StoreValueInterceptor => "STORE_VALUE_INTERCEPTOR",
            Self::StoreBinding => "STORE_BINDING",
            Self::StoreBindingOnAlias => "STORE_BINDING_ALIAS",
            Self::StoreCompiledBinding => "STORE_COMPILED_BINDING",
            Self::FetchAttached => "FETCH_ATTACHED",
            Self::FetchList => "FETCH_LIST",
            Self::FetchObject => "FETCH",
            Self::FetchValueType => "FETCH_VALUE",
            Self::PopFetchedObject => "POP",
            Self::PopList => "POP_LIST",
            Self::PopValueType => "POP_VALUE",
            Self::AssignObjectList => "ASSIGN_OBJECT_LIST",
            Self::StoreObjectList => "STORE_OBJECT_LIST",
        }
    }
}

/// Property description saved for bindings, value sources and interceptors.
///
/// `value_type` is set when the target is a sub-property of a value type; the
/// core index then names the owning property and `sub_index` the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedProperty {
    /// Property index on the target object
    pub core_index: u32,
    /// Type code of the property
    pub type_code: u32,
    /// Value-type sub-property (sub index, value type code)
    pub value_type: Option<(u32, u32)>,
}

impl SavedProperty {
    /// Describe a plain property
    pub const fn new(core_index: u32, type_code: u32) -> Self {
        Self {
            core_index,
            type_code,
            value_type: None,
        }
    }

    /// Describe a value-type sub-property of `owner`
    pub const fn value_type(owner: u32, owner_type: u32, sub_index: u32, sub_type: u32) -> Self {
        Self {
            core_index: owner,
            type_code: sub_type,
            value_type: Some((sub_index, owner_type)),
        }
    }

    /// Encode for the byte-array table
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&self.core_index.to_le_bytes());
        bytes.extend_from_slice(&self.type_code.to_le_bytes());
        let (sub, owner_type) = self.value_type.unwrap_or((u32::MAX, u32::MAX));
        bytes.extend_from_slice(&sub.to_le_bytes());
        bytes.extend_from_slice(&owner_type.to_le_bytes());
        bytes
    }

    /// Decode from the byte-array table
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 16 {
            return None;
        }
        let word = |i: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            u32::from_le_bytes(buf)
        };
        let value_type = match (word(2), word(3)) {
            (u32::MAX, u32::MAX) => None,
            (sub, owner_type) => Some((sub, owner_type)),
        };
        Some(Self {
            core_index: word(0),
            type_code: word(1),
            value_type,
        })
    }
}

/// A decoded instruction with its operands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Instruction {
    // Setup
    Init {
        bindings_size: u32,
        parser_status_size: u32,
        context_cache: Option<u32>,
        compiled_binding: Option<DataIndex>,
    },
    CreateObject {
        type_index: TypeIndex,
        data: Option<DataIndex>,
        binding_bits: Option<DataIndex>,
        column: u32,
    },
    CreateSimpleObject {
        type_index: TypeIndex,
        create: u32,
        type_size: u32,
        column: u32,
    },
    SetId {
        value: StringIndex,
        index: u32,
    },
    SetDefault,
    CreateComponent {
        count: u32,
        end_line: u32,
        column: u32,
    },
    StoreMetaObject {
        data: DataIndex,
        alias_data: DataIndex,
        property_cache: Option<u32>,
    },
    Defer {
        defer_count: u32,
    },
    BeginObject {
        cast_value: i32,
    },
    StoreImportedScript {
        value: u32,
    },

    // Literal stores
    StoreVariant {
        property: u32,
        value: StringIndex,
    },
    StoreVariantInteger {
        property: u32,
        value: i32,
    },
    StoreVariantDouble {
        property: u32,
        value: f64,
    },
    StoreVariantBool {
        property: u32,
        value: bool,
    },
    StoreString {
        property: u32,
        value: StringIndex,
    },
    StoreUrl {
        property: u32,
        value: UrlIndex,
    },
    StoreFloat {
        property: u32,
        value: f32,
    },
    StoreDouble {
        property: u32,
        value: f64,
    },
    StoreBool {
        property: u32,
        value: bool,
    },
    StoreInteger {
        property: u32,
        value: i32,
    },
    StoreColor {
        property: u32,
        value: u32,
    },
    StoreDate {
        property: u32,
        value: i64,
    },
    StoreTime {
        property: u32,
        value: IntDataIndex,
    },
    StoreDateTime {
        property: u32,
        value: IntDataIndex,
    },
    StorePoint {
        property: u32,
        value: FloatDataIndex,
    },
    StorePointF {
        property: u32,
        value: FloatDataIndex,
    },
    StoreSize {
        property: u32,
        value: FloatDataIndex,
    },
    StoreSizeF {
        property: u32,
        value: FloatDataIndex,
    },
    StoreRect {
        property: u32,
        value: FloatDataIndex,
    },
    StoreRectF {
        property: u32,
        value: FloatDataIndex,
    },
    StoreVector3D {
        property: u32,
        value: FloatDataIndex,
    },
    AssignCustomType {
        property: u32,
        value: u32,
    },
    StoreScriptString {
        property: u32,
        value: StringIndex,
        scope: u32,
    },

    // Objects
    StoreObject {
        property: u32,
    },
    StoreVariantObject {
        property: u32,
    },
    StoreInterface {
        property: u32,
    },
    AssignSignalObject {
        signal: StringIndex,
    },
    StoreSignal {
        signal_index: u32,
        value: StringIndex,
        context: u32,
        name: StringIndex,
    },
    StoreValueSource {
        property: DataIndex,
        owner: u32,
        cast_value: i32,
    },
    StoreValueInterceptor {
        property: DataIndex,
        owner: u32,
        cast_value: i32,
    },

    // Bindings
    StoreBinding {
        property: DataIndex,
        value: DataIndex,
        context: u32,
        owner: u32,
    },
    StoreBindingOnAlias {
        property: DataIndex,
        value: DataIndex,
        context: u32,
        owner: u32,
    },
    StoreCompiledBinding {
        property: u32,
        value: u32,
        context: u32,
        owner: u32,
    },

    // Sub-scopes
    FetchAttached {
        id: u32,
    },
    FetchList {
        property: u32,
        element_type: StringIndex,
        is_interface: bool,
    },
    FetchObject {
        property: u32,
    },
    FetchValueType {
        property: u32,
        value_type: u32,
        binding_skip_list: u32,
    },
    PopFetchedObject,
    PopList,
    PopValueType {
        property: u32,
        value_type: u32,
    },
    AssignObjectList,
    StoreObjectList,
}

impl Instruction {
    /// Get the opcode for this instruction
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Init { .. } => Opcode::Init,
            Self::CreateObject { .. } => Opcode::CreateObject,
            Self::CreateSimpleObject { .. } => Opcode::CreateSimpleObject,
            Self::SetId { .. } => Opcode::SetId,
            Self::SetDefault => Opcode::SetDefault,
            Self::CreateComponent { .. } => Opcode::CreateComponent,
            Self::StoreMetaObject { .. } => Opcode::StoreMetaObject,
            Self::Defer { .. } => Opcode::Defer,
            Self::BeginObject { .. } => Opcode::BeginObject,
            Self::StoreImportedScript { .. } => Opcode::StoreImportedScript,
            Self::StoreVariant { .. } => Opcode::StoreVariant,
            Self::StoreVariantInteger { .. } => Opcode::StoreVariantInteger,
            Self::StoreVariantDouble { .. } => Opcode::StoreVariantDouble,
            Self::StoreVariantBool { .. } => Opcode::StoreVariantBool,
            Self::StoreString { .. } => Opcode::StoreString,
            Self::StoreUrl { .. } => Opcode::StoreUrl,
            Self::StoreFloat { .. } => Opcode::StoreFloat,
            Self::StoreDouble { .. } => Opcode::StoreDouble,
            Self::StoreBool { .. } => Opcode::StoreBool,
            Self::StoreInteger { .. } => Opcode::StoreInteger,
            Self::StoreColor { .. } => Opcode::StoreColor,
            Self::StoreDate { .. } => Opcode::StoreDate,
            Self::StoreTime { .. } => Opcode::StoreTime,
            Self::StoreDateTime { .. } => Opcode::StoreDateTime,
            Self::StorePoint { .. } => Opcode::StorePoint,
            Self::StorePointF { .. } => Opcode::StorePointF,
            Self::StoreSize { .. } => Opcode::StoreSize,
            Self::StoreSizeF { .. } => Opcode::StoreSizeF,
            Self::StoreRect { .. } => Opcode::StoreRect,
            Self::StoreRectF { .. } => Opcode::StoreRectF,
            Self::StoreVector3D { .. } => Opcode::StoreVector3D,
            Self::AssignCustomType { .. } => Opcode::AssignCustomType,
            Self::StoreScriptString { .. } => Opcode::StoreScriptString,
            Self::StoreObject { .. } => Opcode::StoreObject,
            Self::StoreVariantObject { .. } => Opcode::StoreVariantObject,
            Self::StoreInterface { .. } => Opcode::StoreInterface,
            Self::AssignSignalObject { .. } => Opcode::AssignSignalObject,
            Self::StoreSignal { .. } => Opcode::StoreSignal,
            Self::StoreValueSource { .. } => Opcode::StoreValueSource,
            Self::StoreValueInterceptor { .. } => Opcode::StoreValueInterceptor,
            Self::StoreBinding { .. } => Opcode::StoreBinding,
            Self::StoreBindingOnAlias { .. } => Opcode::StoreBindingOnAlias,
            Self::StoreCompiledBinding { .. } => Opcode::StoreCompiledBinding,
            Self::FetchAttached { .. } => Opcode::FetchAttached,
            Self::FetchList { .. } => Opcode::FetchList,
            Self::FetchObject { .. } => Opcode::FetchObject,
            Self::FetchValueType { .. } => Opcode::FetchValueType,
            Self::PopFetchedObject => Opcode::PopFetchedObject,
            Self::PopList => Opcode::PopList,
            Self::PopValueType { .. } => Opcode::PopValueType,
            Self::AssignObjectList => Opcode::AssignObjectList,
            Self::StoreObjectList => Opcode::StoreObjectList,
        }
    }
}

/// An instruction together with the source line that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    /// 1-based source line
    pub line: u32,
    /// The instruction
    pub op: Instruction,
}

impl Instr {
    /// Tag an instruction with a line
    pub const fn new(line: u32, op: Instruction) -> Self {
        Self { line, op }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{:<24}\t{:?}", self.line, self.op.opcode().name(), self.op)
    }
}
