//! Reflective type model
//!
//! `MetaObject` is the compiler's view of a type: ordered properties, methods
//! (signals, slots, script methods), enumerations and class info, layered on an
//! optional super class. Property and method indices are absolute across the
//! whole class chain, base first.

use std::sync::Arc;

use otter_decl_bytecode::{
    CacheEntry, CacheFlags, DynamicTypeDescriptor, PropertyCache, SlotStorage,
};

/// Class info key naming the default property
pub const DEFAULT_PROPERTY_INFO: &str = "DefaultProperty";

/// Class info key listing deferred property names (comma separated)
pub const DEFERRED_PROPERTIES_INFO: &str = "DeferredPropertyNames";

/// Declared type of a property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Untyped value
    Variant,
    /// Boolean
    Bool,
    /// Signed 32-bit integer
    Int,
    /// Unsigned 32-bit integer
    UInt,
    /// Single precision float
    Float,
    /// Double precision float
    Double,
    /// String
    String,
    /// Url, resolved against the document
    Url,
    /// ARGB color
    Color,
    /// Calendar date
    Date,
    /// Time of day
    Time,
    /// Date and time
    DateTime,
    /// Integer point
    Point,
    /// Float point
    PointF,
    /// Integer size
    Size,
    /// Float size
    SizeF,
    /// Integer rect
    Rect,
    /// Float rect
    RectF,
    /// 3D vector
    Vector3D,
    /// Unevaluated script text with its scope
    ScriptString,
    /// Pointer to an object of the named class
    Object(String),
    /// List of objects of the named class
    List(String),
    /// Registered user type (code, name)
    Custom(u32, String),
}

impl PropertyType {
    /// Stable numeric code used in instructions
    pub fn code(&self) -> u32 {
        match self {
            Self::Variant => 0,
            Self::Bool => 1,
            Self::Int => 2,
            Self::UInt => 3,
            Self::Double => 6,
            Self::String => 10,
            Self::Date => 14,
            Self::Time => 15,
            Self::DateTime => 16,
            Self::Url => 17,
            Self::Rect => 19,
            Self::RectF => 20,
            Self::Size => 21,
            Self::SizeF => 22,
            Self::Point => 25,
            Self::PointF => 26,
            Self::Color => 67,
            Self::Vector3D => 83,
            Self::Float => 135,
            Self::Object(_) => 136,
            Self::ScriptString => 200,
            Self::List(_) => 201,
            Self::Custom(code, _) => *code,
        }
    }

    /// Type name as written in declarations and descriptors
    pub fn name(&self) -> String {
        match self {
            Self::Variant => "variant".into(),
            Self::Bool => "bool".into(),
            Self::Int => "int".into(),
            Self::UInt => "uint".into(),
            Self::Float => "float".into(),
            Self::Double => "real".into(),
            Self::String => "string".into(),
            Self::Url => "url".into(),
            Self::Color => "color".into(),
            Self::Date => "date".into(),
            Self::Time => "time".into(),
            Self::DateTime => "datetime".into(),
            Self::Point => "point".into(),
            Self::PointF => "pointf".into(),
            Self::Size => "size".into(),
            Self::SizeF => "sizef".into(),
            Self::Rect => "rect".into(),
            Self::RectF => "rectf".into(),
            Self::Vector3D => "vector3d".into(),
            Self::ScriptString => "script".into(),
            Self::Object(class) => format!("{class}*"),
            Self::List(class) => format!("list<{class}>"),
            Self::Custom(_, name) => name.clone(),
        }
    }

    /// Parse a name produced by [`PropertyType::name`]
    ///
    /// Unknown names map to `Variant`; custom type codes are not recoverable
    /// from a name alone.
    pub fn from_name(name: &str) -> Self {
        if let Some(class) = name.strip_suffix('*') {
            return Self::Object(class.to_string());
        }
        if let Some(inner) = name.strip_prefix("list<").and_then(|n| n.strip_suffix('>')) {
            return Self::List(inner.to_string());
        }
        match name {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "uint" => Self::UInt,
            "float" => Self::Float,
            "real" | "double" => Self::Double,
            "string" => Self::String,
            "url" => Self::Url,
            "color" => Self::Color,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::DateTime,
            "point" => Self::Point,
            "pointf" => Self::PointF,
            "size" => Self::Size,
            "sizef" => Self::SizeF,
            "rect" => Self::Rect,
            "rectf" => Self::RectF,
            "vector3d" => Self::Vector3D,
            "script" => Self::ScriptString,
            _ => Self::Variant,
        }
    }

    /// Parse a descriptor type name, keeping the code of a registered user type
    pub fn from_name_and_code(name: &str, code: u32) -> Self {
        match Self::from_name(name) {
            Self::Variant if name != "variant" && code != 0 => Self::Custom(code, name.to_string()),
            ty => ty,
        }
    }

    /// Whether the type is a list of objects
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Element class of a list type
    pub fn list_element(&self) -> Option<&str> {
        match self {
            Self::List(class) => Some(class),
            _ => None,
        }
    }
}

/// An enumeration or flag set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEnum {
    /// Enumeration name
    pub name: String,
    /// Whether values may be combined with `|`
    pub is_flag: bool,
    /// Keys and values in declaration order
    pub keys: Vec<(String, i32)>,
}

impl MetaEnum {
    /// Create an enumeration
    pub fn new<K: Into<String>>(name: impl Into<String>, keys: impl IntoIterator<Item = (K, i32)>) -> Self {
        Self {
            name: name.into(),
            is_flag: false,
            keys: keys.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Mark as a flag set
    pub fn flags(mut self) -> Self {
        self.is_flag = true;
        self
    }

    /// Value of a single key
    pub fn key_to_value(&self, key: &str) -> Option<i32> {
        self.keys.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    /// Value of `A|B|C`; every key must exist
    pub fn keys_to_value(&self, keys: &str) -> Option<i32> {
        keys.split('|')
            .map(|key| self.key_to_value(key.trim()))
            .try_fold(0, |acc, value| value.map(|v| acc | v))
    }
}

/// A property of a meta object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaProperty {
    /// Property name
    pub name: String,
    /// Declared type
    pub ty: PropertyType,
    /// Scripts and literals may write the property
    pub writable: bool,
    /// Visible to the declarative language
    pub scriptable: bool,
    /// Cannot be overridden by a dynamic property
    pub is_final: bool,
    /// Absolute index of the notify signal
    pub notify: Option<u32>,
    /// Enumeration for enum- or flag-typed properties
    pub enumerator: Option<MetaEnum>,
    /// Minor version that introduced the property
    pub revision: u32,
}

impl MetaProperty {
    /// Writable, scriptable property without notify signal
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            writable: true,
            scriptable: true,
            is_final: false,
            notify: None,
            enumerator: None,
            revision: 0,
        }
    }

    /// Read-only variant
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Mark final
    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Hide from the declarative language
    pub fn unscriptable(mut self) -> Self {
        self.scriptable = false;
        self
    }

    /// Enum-typed property
    pub fn with_enum(mut self, enumerator: MetaEnum) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    /// Introduced in a later minor version
    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    /// Whether the property holds an enumeration
    pub fn is_enum_type(&self) -> bool {
        self.enumerator.is_some()
    }

    /// Whether the property holds a flag set
    pub fn is_flag_type(&self) -> bool {
        self.enumerator.as_ref().is_some_and(|e| e.is_flag)
    }
}

/// Kind of a meta method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Change or event signal
    Signal,
    /// Native slot
    Slot,
    /// Script method declared by a dynamic type
    Method,
}

/// A signal, slot or method of a meta object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaMethod {
    /// Method name
    pub name: String,
    /// Method kind
    pub kind: MethodKind,
    /// Parameter type names
    pub parameter_types: Vec<String>,
    /// Parameter names
    pub parameter_names: Vec<String>,
    /// Minor version that introduced the method
    pub revision: u32,
}

impl MetaMethod {
    /// Parameterless signal
    pub fn signal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Signal,
            parameter_types: Vec::new(),
            parameter_names: Vec::new(),
            revision: 0,
        }
    }

    /// Parameterless slot
    pub fn slot(name: impl Into<String>) -> Self {
        Self {
            kind: MethodKind::Slot,
            ..Self::signal(name)
        }
    }

    /// Add a typed parameter
    pub fn param(mut self, ty: impl Into<String>, name: impl Into<String>) -> Self {
        self.parameter_types.push(ty.into());
        self.parameter_names.push(name.into());
        self
    }

    /// Introduced in a later minor version
    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    /// Normalized signature
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.parameter_types.join(","))
    }
}

/// Reflective description of a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaObject {
    class_name: String,
    super_class: Option<Arc<MetaObject>>,
    properties: Vec<MetaProperty>,
    methods: Vec<MetaMethod>,
    enums: Vec<MetaEnum>,
    class_info: Vec<(String, String)>,
}

impl MetaObject {
    /// Start building a class
    pub fn builder(class_name: impl Into<String>) -> MetaObjectBuilder {
        MetaObjectBuilder::new(class_name)
    }

    /// Class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Super class
    pub fn super_class(&self) -> Option<&Arc<MetaObject>> {
        self.super_class.as_ref()
    }

    /// Absolute index of this class's first own property
    pub fn property_offset(&self) -> u32 {
        self.super_class.as_ref().map_or(0, |s| s.property_count())
    }

    /// Number of properties including inherited ones
    pub fn property_count(&self) -> u32 {
        self.property_offset() + self.properties.len() as u32
    }

    /// Absolute index of this class's first own method
    pub fn method_offset(&self) -> u32 {
        self.super_class.as_ref().map_or(0, |s| s.method_count())
    }

    /// Number of methods including inherited ones
    pub fn method_count(&self) -> u32 {
        self.method_offset() + self.methods.len() as u32
    }

    /// Property by absolute index
    pub fn property(&self, index: u32) -> Option<&MetaProperty> {
        let offset = self.property_offset();
        if index >= offset {
            self.properties.get((index - offset) as usize)
        } else {
            self.super_class.as_ref()?.property(index)
        }
    }

    /// Method by absolute index
    pub fn method(&self, index: u32) -> Option<&MetaMethod> {
        let offset = self.method_offset();
        if index >= offset {
            self.methods.get((index - offset) as usize)
        } else {
            self.super_class.as_ref()?.method(index)
        }
    }

    /// Absolute index of the most derived property with this name
    pub fn index_of_property(&self, name: &str) -> Option<u32> {
        match self.properties.iter().rposition(|p| p.name == name) {
            Some(pos) => Some(self.property_offset() + pos as u32),
            None => self.super_class.as_ref()?.index_of_property(name),
        }
    }

    /// Absolute index of the most derived method with this name
    pub fn index_of_method(&self, name: &str) -> Option<u32> {
        match self.methods.iter().rposition(|m| m.name == name) {
            Some(pos) => Some(self.method_offset() + pos as u32),
            None => self.super_class.as_ref()?.index_of_method(name),
        }
    }

    /// Absolute index of the most derived signal with this name
    pub fn index_of_signal(&self, name: &str) -> Option<u32> {
        match self
            .methods
            .iter()
            .rposition(|m| m.name == name && m.kind == MethodKind::Signal)
        {
            Some(pos) => Some(self.method_offset() + pos as u32),
            None => self.super_class.as_ref()?.index_of_signal(name),
        }
    }

    /// Class info value, most derived first
    pub fn class_info(&self, key: &str) -> Option<&str> {
        self.class_info
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .or_else(|| self.super_class.as_ref()?.class_info(key))
    }

    /// Declared default property (absolute index, property)
    pub fn default_property(&self) -> Option<(u32, &MetaProperty)> {
        let name = self.class_info(DEFAULT_PROPERTY_INFO)?;
        let index = self.index_of_property(name)?;
        Some((index, self.property(index)?))
    }

    /// Names listed as deferred
    pub fn deferred_properties(&self) -> Vec<String> {
        self.class_info(DEFERRED_PROPERTIES_INFO)
            .map(|names| {
                names
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Enumerations of this class and its supers, most derived first
    pub fn enumerators(&self) -> Vec<&MetaEnum> {
        let mut all: Vec<&MetaEnum> = self.enums.iter().collect();
        if let Some(super_class) = &self.super_class {
            all.extend(super_class.enumerators());
        }
        all
    }

    /// Value of an enumeration key, searching the last declared enumeration
    /// of the most derived class first
    pub fn enum_value(&self, key: &str) -> Option<i32> {
        self.enums
            .iter()
            .rev()
            .find_map(|e| e.key_to_value(key))
            .or_else(|| self.super_class.as_ref()?.enum_value(key))
    }

    /// Whether this class is, or derives from, `class_name`
    pub fn inherits(&self, class_name: &str) -> bool {
        self.class_name == class_name
            || self.super_class.as_ref().is_some_and(|s| s.inherits(class_name))
    }

    /// Rebuild a dynamic type from its descriptor on top of `base`
    ///
    /// Alias slots whose target is still unknown are not exposed as
    /// properties; their notify signals are.
    pub fn from_descriptor(base: Arc<MetaObject>, desc: &DynamicTypeDescriptor) -> Arc<MetaObject> {
        let method_offset = base.method_count();
        let mut properties = Vec::with_capacity(desc.properties.len());
        for slot in &desc.properties {
            let ty = match &slot.storage {
                SlotStorage::Alias(None) => continue,
                SlotStorage::Alias(Some(target)) => PropertyType::from_name_and_code(&slot.type_name, target.type_code),
                SlotStorage::Value { type_code } => PropertyType::from_name_and_code(&slot.type_name, *type_code),
                SlotStorage::Object | SlotStorage::List => PropertyType::from_name(&slot.type_name),
            };
            let mut prop = MetaProperty::new(slot.name.clone(), ty);
            prop.writable = slot.writable;
            prop.notify = Some(method_offset + slot.notify_signal);
            properties.push(prop);
        }

        let mut methods: Vec<MetaMethod> = desc
            .signals
            .iter()
            .map(|s| MetaMethod {
                name: s.name.clone(),
                kind: MethodKind::Signal,
                parameter_types: s.parameter_types.clone(),
                parameter_names: s.parameter_names.clone(),
                revision: 0,
            })
            .collect();
        methods.extend(desc.methods.iter().map(|m| MetaMethod {
            name: m.name.clone(),
            kind: MethodKind::Method,
            parameter_types: vec!["var".to_string(); m.parameter_names.len()],
            parameter_names: m.parameter_names.clone(),
            revision: 0,
        }));

        let mut class_info = Vec::new();
        if let Some(default) = &desc.default_property {
            class_info.push((DEFAULT_PROPERTY_INFO.to_string(), default.clone()));
        }

        Arc::new(MetaObject {
            class_name: desc.class_name.clone(),
            super_class: Some(base),
            properties,
            methods,
            enums: Vec::new(),
            class_info,
        })
    }
}

/// Builder for [`MetaObject`]
#[derive(Debug)]
pub struct MetaObjectBuilder {
    class_name: String,
    super_class: Option<Arc<MetaObject>>,
    properties: Vec<(MetaProperty, Option<String>)>,
    methods: Vec<MetaMethod>,
    enums: Vec<MetaEnum>,
    class_info: Vec<(String, String)>,
}

impl MetaObjectBuilder {
    /// Start a class
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            super_class: None,
            properties: Vec::new(),
            methods: Vec::new(),
            enums: Vec::new(),
            class_info: Vec::new(),
        }
    }

    /// Set the super class
    pub fn super_class(mut self, super_class: Arc<MetaObject>) -> Self {
        self.super_class = Some(super_class);
        self
    }

    /// Add a property without notify signal
    pub fn property(mut self, property: MetaProperty) -> Self {
        self.properties.push((property, None));
        self
    }

    /// Add a property notified by the named signal
    pub fn notified_property(mut self, property: MetaProperty, signal: impl Into<String>) -> Self {
        self.properties.push((property, Some(signal.into())));
        self
    }

    /// Add a method
    pub fn method(mut self, method: MetaMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Add an enumeration
    pub fn enumeration(mut self, enumeration: MetaEnum) -> Self {
        self.enums.push(enumeration);
        self
    }

    /// Add class info
    pub fn class_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.class_info.push((key.into(), value.into()));
        self
    }

    /// Declare the default property
    pub fn default_property(self, name: impl Into<String>) -> Self {
        self.class_info(DEFAULT_PROPERTY_INFO, name)
    }

    /// Finish the class; notify names resolve against the finished method table
    pub fn build(self) -> Arc<MetaObject> {
        let (properties, notify_names): (Vec<_>, Vec<_>) = self.properties.into_iter().unzip();
        let mut meta = MetaObject {
            class_name: self.class_name,
            super_class: self.super_class,
            properties,
            methods: self.methods,
            enums: self.enums,
            class_info: self.class_info,
        };
        let resolved: Vec<Option<u32>> = notify_names
            .iter()
            .map(|name| name.as_deref().and_then(|n| meta.index_of_signal(n)))
            .collect();
        for (prop, notify) in meta.properties.iter_mut().zip(resolved) {
            if notify.is_some() {
                prop.notify = notify;
            }
        }
        Arc::new(meta)
    }
}

/// Property cache for a class chain, base entries first
pub fn property_cache(meta: &MetaObject, allowed_revision: Option<u32>) -> PropertyCache {
    let mut cache = match meta.super_class() {
        Some(super_class) => property_cache(super_class, allowed_revision),
        None => PropertyCache::new(),
    };
    cache.allowed_revision = allowed_revision;
    append_own_entries(&mut cache, meta, false);
    cache
}

/// Extend a base cache with the members of a synthesized type
///
/// Signals and methods are flagged as script-visible dynamic members, alias
/// slots as aliases.
pub fn dynamic_property_cache(
    base: &PropertyCache,
    synth: &MetaObject,
    desc: &DynamicTypeDescriptor,
) -> PropertyCache {
    let mut cache = base.clone();
    let first_new = cache.len();
    append_own_entries(&mut cache, synth, true);
    let aliases: Vec<&str> = desc
        .properties
        .iter()
        .filter(|p| p.is_alias())
        .map(|p| p.name.as_str())
        .collect();
    let new_entries: Vec<CacheEntry> = cache.entries()[first_new..]
        .iter()
        .cloned()
        .map(|mut entry| {
            if !entry.flags.is_function && aliases.contains(&entry.name.as_str()) {
                entry.flags.is_alias = true;
            }
            entry
        })
        .collect();
    let mut rebuilt = PropertyCache::new();
    rebuilt.allowed_revision = base.allowed_revision;
    for entry in cache.entries()[..first_new].iter().cloned().chain(new_entries) {
        rebuilt.push(entry);
    }
    rebuilt
}

fn append_own_entries(cache: &mut PropertyCache, meta: &MetaObject, dynamic: bool) {
    let property_offset = meta.property_offset();
    for (i, prop) in meta.properties.iter().enumerate() {
        cache.push(CacheEntry {
            name: prop.name.clone(),
            core_index: property_offset + i as u32,
            notify_index: prop.notify,
            type_code: prop.ty.code(),
            flags: CacheFlags {
                is_writable: prop.writable,
                ..CacheFlags::default()
            },
            revision: prop.revision,
        });
    }
    let method_offset = meta.method_offset();
    for (i, method) in meta.methods.iter().enumerate() {
        let is_signal = method.kind == MethodKind::Signal;
        cache.push(CacheEntry {
            name: method.name.clone(),
            core_index: method_offset + i as u32,
            notify_index: None,
            type_code: 0,
            flags: CacheFlags {
                is_function: true,
                is_signal,
                is_vme_signal: dynamic && is_signal,
                is_vme_function: dynamic && method.kind == MethodKind::Method,
                ..CacheFlags::default()
            },
            revision: method.revision,
        });
    }
}
