//! Object tree arena
//!
//! The parser hands the compiler a [`Document`]: objects, properties and
//! values stored in flat arenas and addressed by index. Resolution results are
//! written to the `ann` side-table of each node; the structural fields are left
//! as the parser built them, except where default-property values are merged
//! or a wrapper component is synthesized.

use std::sync::Arc;

use indexmap::IndexMap;

use otter_decl_bytecode::{DynamicTypeDescriptor, ImportedScript, PropertyCache, SynthesisData};

use crate::literal::LiteralStore;
use crate::meta::{MetaObject, PropertyType};
use crate::registry::CompositeType;

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Arena slot
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

node_id!(
    /// Index of an object node
    ObjectId
);
node_id!(
    /// Index of a property node
    PropertyId
);
node_id!(
    /// Index of a value node
    ValueId
);

/// A source position (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Location {
    /// Line
    pub line: u32,
    /// Column
    pub column: u32,
}

impl Location {
    /// Create a location
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A source range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// First character
    pub start: Location,
    /// Last character
    pub end: Location,
}

impl Span {
    /// Create a span
    pub const fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// A span covering a single position
    pub const fn at(line: u32, column: u32) -> Self {
        let loc = Location::new(line, column);
        Self { start: loc, end: loc }
    }
}

/// A typed constant written in the document
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `true` / `false`
    Bool(bool),
    /// Numeric literal
    Number(f64),
    /// Quoted string
    String(String),
}

impl Literal {
    /// Text form used by literal conversion
    pub fn as_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
        }
    }
}

/// What was written on the right-hand side of an assignment
#[derive(Debug, Clone, PartialEq)]
pub enum ValueContent {
    /// A constant
    Literal(Literal),
    /// Script expression or statement text
    Script(String),
    /// A nested object
    Object(ObjectId),
}

impl ValueContent {
    /// Whether the value is script text
    pub fn is_script(&self) -> bool {
        matches!(self, Self::Script(_))
    }

    /// Whether the value is a string literal
    pub fn is_string(&self) -> bool {
        matches!(self, Self::Literal(Literal::String(_)))
    }

    /// Whether the value is a numeric literal
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Literal(Literal::Number(_)))
    }

    /// Whether the value is a boolean literal
    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Literal(Literal::Bool(_)))
    }

    /// Numeric literal value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Literal(Literal::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// Nested object
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Literal text, or the script source for scripts
    pub fn as_string(&self) -> String {
        match self {
            Self::Literal(lit) => lit.as_string(),
            Self::Script(source) => source.clone(),
            Self::Object(_) => String::new(),
        }
    }

    /// Script source that evaluates to this value
    pub fn as_script(&self) -> String {
        match self {
            Self::Literal(Literal::String(s)) => format!("\"{}\"", escape_string(s)),
            Self::Literal(lit) => lit.as_string(),
            Self::Script(source) => source.clone(),
            Self::Object(_) => String::new(),
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Resolved role of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Stored as a constant
    Literal,
    /// A nested object assigned to the property
    CreatedObject,
    /// An expression installed as a binding
    PropertyBinding,
    /// Object connected as a signal handler
    SignalObject,
    /// Handler expression connected to a signal
    SignalExpression,
    /// The object's id
    Id,
    /// Object installed as a value source
    ValueSource,
    /// Object installed as a value interceptor
    ValueInterceptor,
}

/// Resolution results for a value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueAnnotations {
    /// Role assigned by the resolver
    pub kind: Option<ValueKind>,
    /// Checked literal conversion, consumed by the emitter
    pub literal: Option<LiteralStore>,
}

/// One assigned value
#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    /// Right-hand side
    pub content: ValueContent,
    /// Position of the value
    pub location: Location,
    /// Resolution results
    pub ann: ValueAnnotations,
}

/// Resolution results for a property
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyAnnotations {
    /// Property index (attached type id for attached properties)
    pub index: Option<u32>,
    /// Declared type
    pub ty: Option<PropertyType>,
    /// Instantiated after the owner completes
    pub is_deferred: bool,
    /// Targets an alias slot of the component root
    pub is_alias: bool,
    /// Sub-property of a value type
    pub is_value_type_sub_property: bool,
}

/// A named assignment target on an object
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyNode {
    /// Property name (resolved name for the default property)
    pub name: String,
    /// Position of the name
    pub location: Location,
    /// Owning object
    pub parent: ObjectId,
    /// Whether this is the default-property slot
    pub is_default: bool,
    /// Assigned values in source order
    pub values: Vec<ValueId>,
    /// Objects assigned with `Type on property`
    pub on_values: Vec<ValueId>,
    /// Sub-scope for grouped, attached and value-type access
    pub value: Option<ObjectId>,
    /// Resolution results
    pub ann: PropertyAnnotations,
}

/// Declared type of a dynamic property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicPropertyKind {
    /// `property variant`
    Variant,
    /// `property int`
    Int,
    /// `property bool`
    Bool,
    /// `property real`
    Real,
    /// `property string`
    String,
    /// `property url`
    Url,
    /// `property color`
    Color,
    /// `property time`
    Time,
    /// `property date`
    Date,
    /// `property datetime`
    DateTime,
    /// `property alias`
    Alias,
    /// Object of a named type
    Custom(String),
    /// `property list<Type>`
    CustomList(String),
}

/// A `property` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicProperty {
    /// Property name
    pub name: String,
    /// Declared kind
    pub kind: DynamicPropertyKind,
    /// Declared with `default`
    pub is_default: bool,
    /// Initial value (alias location for aliases)
    pub default_value: Option<PropertyId>,
    /// Position of the declaration
    pub location: Location,
}

/// A `signal` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicSignal {
    /// Signal name
    pub name: String,
    /// Parameter type names
    pub parameter_types: Vec<String>,
    /// Parameter names
    pub parameter_names: Vec<String>,
    /// Position of the declaration
    pub location: Location,
}

/// A `function` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicMethod {
    /// Method name
    pub name: String,
    /// Parameter names
    pub parameter_names: Vec<String>,
    /// Body source including braces
    pub body: String,
    /// Position of the declaration
    pub location: Location,
}

/// Progress of dynamic type synthesis for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthState {
    /// No descriptor built
    #[default]
    Unsynthesized,
    /// Structural pass done, alias targets pending
    StructuralPass,
    /// Alias targets being resolved
    AliasPass,
    /// Descriptor complete
    Final,
}

/// Resolution and synthesis results for an object
#[derive(Debug, Clone, Default)]
pub struct ObjectAnnotations {
    /// Static type
    pub meta: Option<Arc<MetaObject>>,
    /// Synthesized dynamic type
    pub synth_meta: Option<Arc<MetaObject>>,
    /// Property cache of the synthesized type
    pub synth_cache: Option<Arc<PropertyCache>>,
    /// Synthesized type descriptor
    pub descriptor: Option<DynamicTypeDescriptor>,
    /// Alias targets and method bodies of the synthesized type
    pub synth_data: Option<SynthesisData>,
    /// Synthesis progress
    pub synth_state: SynthState,
    /// Id, if declared
    pub id: Option<String>,
    /// Sequential id index within the component
    pub id_index: Option<u32>,
    /// Cast offset of the construction-notification interface
    pub parser_status_cast: Option<i32>,
    /// One bit per property index that carries a value
    pub binding_bits: Vec<u8>,
    /// Payload produced by the type's custom parser
    pub custom_data: Option<Vec<u8>>,
    /// Literal, object and binding assignments
    pub value_properties: Vec<PropertyId>,
    /// Signal handlers
    pub signal_properties: Vec<PropertyId>,
    /// Attached-property scopes
    pub attached_properties: Vec<PropertyId>,
    /// Grouped-property scopes
    pub grouped_properties: Vec<PropertyId>,
    /// Value-type property scopes
    pub value_type_properties: Vec<PropertyId>,
    /// Script-string properties with their scope depth
    pub script_string_properties: Vec<(PropertyId, u32)>,
}

impl ObjectAnnotations {
    /// Set the binding bit for a property index, padding to whole words
    pub fn set_binding_bit(&mut self, bit: u32) {
        let byte = (bit / 8) as usize;
        let needed = 4 * (1 + byte / 4);
        if self.binding_bits.len() < needed {
            self.binding_bits.resize(needed, 0);
        }
        self.binding_bits[byte] |= 1 << (bit % 8);
    }

    /// Effective type: synthesized if present, else static
    pub fn effective_meta(&self) -> Option<&Arc<MetaObject>> {
        self.synth_meta.as_ref().or(self.meta.as_ref())
    }
}

/// An instantiable object or a property sub-scope
#[derive(Debug, Clone)]
pub struct ObjectNode {
    /// Index into the document's type table; `None` for sub-scopes
    pub type_index: Option<usize>,
    /// Source range
    pub location: Span,
    /// Explicit properties in source order
    pub properties: IndexMap<String, PropertyId>,
    /// Values assigned without a property name
    pub default_property: Option<PropertyId>,
    /// `property` declarations
    pub dynamic_properties: Vec<DynamicProperty>,
    /// `signal` declarations
    pub dynamic_signals: Vec<DynamicSignal>,
    /// `function` declarations
    pub dynamic_methods: Vec<DynamicMethod>,
    /// Resolution results
    pub ann: ObjectAnnotations,
}

impl ObjectNode {
    fn new(type_index: Option<usize>, location: Span) -> Self {
        Self {
            type_index,
            location,
            properties: IndexMap::new(),
            default_property: None,
            dynamic_properties: Vec::new(),
            dynamic_signals: Vec::new(),
            dynamic_methods: Vec::new(),
            ann: ObjectAnnotations::default(),
        }
    }

    /// Whether the object declares properties, signals or methods
    pub fn has_dynamic_members(&self) -> bool {
        !self.dynamic_properties.is_empty()
            || !self.dynamic_signals.is_empty()
            || !self.dynamic_methods.is_empty()
    }
}

/// An entry of the document's type table
#[derive(Debug, Clone)]
pub struct TypeSlot {
    /// Name as written (possibly namespace qualified)
    pub name: String,
    /// Previously compiled document providing the type
    pub composite: Option<Arc<CompositeType>>,
}

/// A parsed declarative document
#[derive(Debug, Clone)]
pub struct Document {
    /// Document url
    pub url: String,
    /// Referenced type names
    pub types: Vec<TypeSlot>,
    /// Imported script blocks
    pub scripts: Vec<ImportedScript>,
    root: Option<ObjectId>,
    objects: Vec<ObjectNode>,
    properties: Vec<PropertyNode>,
    values: Vec<ValueNode>,
}

impl Document {
    /// Empty document
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            types: Vec::new(),
            scripts: Vec::new(),
            root: None,
            objects: Vec::new(),
            properties: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Root object
    pub fn root(&self) -> Option<ObjectId> {
        self.root
    }

    /// Set the root object
    pub fn set_root(&mut self, obj: ObjectId) {
        self.root = Some(obj);
    }

    /// Type table index for a name, adding it if new
    pub fn add_type(&mut self, name: &str) -> usize {
        if let Some(pos) = self.types.iter().position(|t| t.name == name) {
            return pos;
        }
        self.types.push(TypeSlot {
            name: name.to_string(),
            composite: None,
        });
        self.types.len() - 1
    }

    /// Register a type name provided by a compiled document
    pub fn add_composite_type(&mut self, name: &str, composite: Arc<CompositeType>) -> usize {
        let index = self.add_type(name);
        self.types[index].composite = Some(composite);
        index
    }

    /// Create an object of a named type
    pub fn create_object(&mut self, type_name: &str, location: Span) -> ObjectId {
        let type_index = self.add_type(type_name);
        self.push_object(ObjectNode::new(Some(type_index), location))
    }

    pub(crate) fn push_object(&mut self, node: ObjectNode) -> ObjectId {
        self.objects.push(node);
        ObjectId((self.objects.len() - 1) as u32)
    }

    pub(crate) fn new_object_node(type_index: Option<usize>, location: Span) -> ObjectNode {
        ObjectNode::new(type_index, location)
    }

    /// Property `name` of `obj`, created if missing
    pub fn ensure_property(&mut self, obj: ObjectId, name: &str, location: Location) -> PropertyId {
        if let Some(id) = self.objects[obj.index()].properties.get(name) {
            return *id;
        }
        let id = self.push_property(obj, name, location, false);
        self.objects[obj.index()].properties.insert(name.to_string(), id);
        id
    }

    /// The default-property slot of `obj`, created if missing
    pub fn ensure_default_property(&mut self, obj: ObjectId, location: Location) -> PropertyId {
        if let Some(id) = self.objects[obj.index()].default_property {
            return id;
        }
        let id = self.push_property(obj, "", location, true);
        self.objects[obj.index()].default_property = Some(id);
        id
    }

    fn push_property(&mut self, parent: ObjectId, name: &str, location: Location, is_default: bool) -> PropertyId {
        self.properties.push(PropertyNode {
            name: name.to_string(),
            location,
            parent,
            is_default,
            values: Vec::new(),
            on_values: Vec::new(),
            value: None,
            ann: PropertyAnnotations::default(),
        });
        PropertyId((self.properties.len() - 1) as u32)
    }

    /// Sub-scope object of a grouped or attached property
    pub fn ensure_sub_scope(&mut self, prop: PropertyId) -> ObjectId {
        if let Some(obj) = self.properties[prop.index()].value {
            return obj;
        }
        let loc = self.properties[prop.index()].location;
        let obj = self.push_object(ObjectNode::new(None, Span::new(loc, loc)));
        self.properties[prop.index()].value = Some(obj);
        obj
    }

    fn push_value(&mut self, content: ValueContent, location: Location) -> ValueId {
        self.values.push(ValueNode {
            content,
            location,
            ann: ValueAnnotations::default(),
        });
        ValueId((self.values.len() - 1) as u32)
    }

    /// Assign a literal
    pub fn add_literal(&mut self, prop: PropertyId, literal: Literal, location: Location) -> ValueId {
        let id = self.push_value(ValueContent::Literal(literal), location);
        self.properties[prop.index()].values.push(id);
        id
    }

    /// Assign a script expression
    pub fn add_script(&mut self, prop: PropertyId, source: &str, location: Location) -> ValueId {
        let id = self.push_value(ValueContent::Script(source.to_string()), location);
        self.properties[prop.index()].values.push(id);
        id
    }

    /// Assign a nested object
    pub fn add_object(&mut self, prop: PropertyId, child: ObjectId) -> ValueId {
        let location = self.objects[child.index()].location.start;
        let id = self.push_value(ValueContent::Object(child), location);
        self.properties[prop.index()].values.push(id);
        id
    }

    /// Assign a nested object with `Type on property`
    pub fn add_on_object(&mut self, prop: PropertyId, child: ObjectId) -> ValueId {
        let location = self.objects[child.index()].location.start;
        let id = self.push_value(ValueContent::Object(child), location);
        self.properties[prop.index()].on_values.push(id);
        id
    }

    /// Declare a dynamic property, returns its position
    pub fn add_dynamic_property(
        &mut self,
        obj: ObjectId,
        name: &str,
        kind: DynamicPropertyKind,
        is_default: bool,
        location: Location,
    ) -> usize {
        let list = &mut self.objects[obj.index()].dynamic_properties;
        list.push(DynamicProperty {
            name: name.to_string(),
            kind,
            is_default,
            default_value: None,
            location,
        });
        list.len() - 1
    }

    /// Value holder for a dynamic property's initializer
    pub fn dynamic_property_value(&mut self, obj: ObjectId, index: usize) -> PropertyId {
        if let Some(id) = self.objects[obj.index()].dynamic_properties[index].default_value {
            return id;
        }
        let (name, location) = {
            let p = &self.objects[obj.index()].dynamic_properties[index];
            (p.name.clone(), p.location)
        };
        let id = self.push_property(obj, &name, location, false);
        self.objects[obj.index()].dynamic_properties[index].default_value = Some(id);
        id
    }

    /// Declare a signal
    pub fn add_dynamic_signal(&mut self, obj: ObjectId, signal: DynamicSignal) {
        self.objects[obj.index()].dynamic_signals.push(signal);
    }

    /// Declare a method
    pub fn add_dynamic_method(&mut self, obj: ObjectId, method: DynamicMethod) {
        self.objects[obj.index()].dynamic_methods.push(method);
    }

    /// Add an imported script block
    pub fn add_imported_script(&mut self, qualifier: &str, url: &str, source: &str) {
        self.scripts.push(ImportedScript {
            qualifier: qualifier.to_string(),
            url: url.to_string(),
            source: source.to_string(),
        });
    }

    /// Object node
    pub fn object(&self, id: ObjectId) -> &ObjectNode {
        &self.objects[id.index()]
    }

    /// Mutable object node
    pub fn object_mut(&mut self, id: ObjectId) -> &mut ObjectNode {
        &mut self.objects[id.index()]
    }

    /// Property node
    pub fn property(&self, id: PropertyId) -> &PropertyNode {
        &self.properties[id.index()]
    }

    /// Mutable property node
    pub fn property_mut(&mut self, id: PropertyId) -> &mut PropertyNode {
        &mut self.properties[id.index()]
    }

    /// Value node
    pub fn value(&self, id: ValueId) -> &ValueNode {
        &self.values[id.index()]
    }

    /// Mutable value node
    pub fn value_mut(&mut self, id: ValueId) -> &mut ValueNode {
        &mut self.values[id.index()]
    }

    /// Number of objects in the arena
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// All object ids in arena order
    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.objects.len() as u32).map(ObjectId)
    }

    /// First object, in arena order, whose type is `type_index`
    pub fn first_object_of_type(&self, type_index: usize) -> Option<ObjectId> {
        self.objects
            .iter()
            .position(|o| o.type_index == Some(type_index))
            .map(|pos| ObjectId(pos as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_are_unique_per_name() {
        let mut doc = Document::new("file:///main.qml");
        let root = doc.create_object("Item", Span::at(1, 1));
        let a = doc.ensure_property(root, "width", Location::new(2, 5));
        let b = doc.ensure_property(root, "width", Location::new(3, 5));
        assert_eq!(a, b);
        assert_eq!(doc.object(root).properties.len(), 1);
        assert_eq!(doc.add_type("Item"), 0);
    }

    #[test]
    fn test_value_text_forms() {
        let number = ValueContent::Literal(Literal::Number(10.0));
        assert_eq!(number.as_string(), "10");
        let text = ValueContent::Literal(Literal::String("say \"hi\"".into()));
        assert_eq!(text.as_script(), "\"say \\\"hi\\\"\"");
        assert_eq!(ValueContent::Script("a.b".into()).as_string(), "a.b");
    }

    #[test]
    fn test_binding_bits_pad_to_words() {
        let mut ann = ObjectAnnotations::default();
        ann.set_binding_bit(3);
        assert_eq!(ann.binding_bits, vec![0b1000, 0, 0, 0]);
        ann.set_binding_bit(33);
        assert_eq!(ann.binding_bits.len(), 8);
        assert_eq!(ann.binding_bits[4], 0b10);
    }
}
