//! Custom parser capability
//!
//! Some element types read their own property language (list models, state
//! change sets). Assignments the compiler cannot map to real properties are
//! converted into [`CustomProperty`] trees and handed to the type's
//! [`CustomParser`], whose payload is stored with the object's creation.

use std::fmt;
use std::sync::Arc;

use crate::error::{CompileResult, Diagnostic};
use crate::registry::{RegisteredType, TypeRegistry};
use crate::rewrite;
use crate::tree::{Document, Literal, Location, ObjectId, PropertyId, ValueContent};

/// A property as seen by a custom parser
#[derive(Debug, Clone, PartialEq)]
pub struct CustomProperty {
    /// Property name
    pub name: String,
    /// Position of the name
    pub location: Location,
    /// More than one value was assigned
    pub is_list: bool,
    /// Assigned values in source order
    pub values: Vec<CustomValue>,
}

/// A value as seen by a custom parser
#[derive(Debug, Clone, PartialEq)]
pub enum CustomValue {
    /// Constant
    Literal(Literal),
    /// Script text
    Script(String),
    /// Nested object
    Object(CustomNode),
    /// Sub-property of a grouped assignment
    Property(CustomProperty),
}

/// A nested object as seen by a custom parser
#[derive(Debug, Clone, PartialEq)]
pub struct CustomNode {
    /// Type name as written
    pub type_name: String,
    /// Position of the object
    pub location: Location,
    /// Properties, default property last
    pub properties: Vec<CustomProperty>,
}

/// Services available to a custom parser while it compiles
pub struct CustomParserContext<'a> {
    registry: &'a dyn TypeRegistry,
    url: &'a str,
    errors: Vec<Diagnostic>,
}

impl<'a> CustomParserContext<'a> {
    pub(crate) fn new(registry: &'a dyn TypeRegistry, url: &'a str) -> Self {
        Self {
            registry,
            url,
            errors: Vec::new(),
        }
    }

    /// Report an error at a source position
    pub fn error(&mut self, location: Location, description: impl AsRef<str>) {
        self.errors
            .push(Diagnostic::new(self.url, location.line, location.column, description));
    }

    /// Resolve an element name
    pub fn resolve_type(&self, name: &str) -> Option<Arc<RegisteredType>> {
        self.registry.resolve_type(name)
    }

    /// Value of a `Type.Key` enumeration reference
    pub fn evaluate_enum(&self, script: &str) -> Option<i32> {
        let (type_name, key) = script.split_once('.')?;
        if type_name.is_empty() {
            return None;
        }
        let meta = match self.registry.resolve_type(type_name) {
            Some(ty) => ty.meta.clone(),
            None if type_name == "Qt" => self.registry.global_enums()?,
            None => return None,
        };
        meta.enum_value(key)
    }

    /// Rewrite a script for later evaluation as a binding named `name`
    pub fn rewrite_binding(&self, expression: &str, name: &str) -> CompileResult<String> {
        Ok(rewrite::rewrite_binding(expression, name)?.source)
    }

    pub(crate) fn into_errors(self) -> Vec<Diagnostic> {
        self.errors
    }
}

impl fmt::Debug for CustomParserContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomParserContext")
            .field("url", &self.url)
            .field("errors", &self.errors)
            .finish()
    }
}

/// A type that parses its own property language
pub trait CustomParser: Send + Sync + fmt::Debug {
    /// Attached properties stay with the compiler instead of the parser
    fn accepts_attached_properties(&self) -> bool {
        false
    }

    /// Compile the collected properties into an opaque payload
    fn compile(&self, ctx: &mut CustomParserContext<'_>, properties: &[CustomProperty]) -> Vec<u8>;
}

/// Convert a property node for a custom parser
pub(crate) fn custom_property(doc: &Document, prop: PropertyId) -> CustomProperty {
    let node = doc.property(prop);
    let values = match node.value {
        Some(sub) => custom_node(doc, sub)
            .properties
            .into_iter()
            .map(CustomValue::Property)
            .collect(),
        None => node
            .values
            .iter()
            .map(|v| match &doc.value(*v).content {
                ValueContent::Literal(lit) => CustomValue::Literal(lit.clone()),
                ValueContent::Script(source) => CustomValue::Script(source.clone()),
                ValueContent::Object(obj) => CustomValue::Object(custom_node(doc, *obj)),
            })
            .collect(),
    };
    CustomProperty {
        name: node.name.clone(),
        location: node.location,
        is_list: node.values.len() > 1,
        values,
    }
}

fn custom_node(doc: &Document, obj: ObjectId) -> CustomNode {
    let node = doc.object(obj);
    let mut properties: Vec<CustomProperty> = node
        .properties
        .values()
        .map(|p| custom_property(doc, *p))
        .collect();
    if let Some(default) = node.default_property {
        properties.push(custom_property(doc, default));
    }
    CustomNode {
        type_name: node
            .type_index
            .and_then(|i| doc.types.get(i))
            .map(|t| t.name.clone())
            .unwrap_or_default(),
        location: node.location.start,
        properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{MetaEnum, MetaObject};
    use crate::registry::InMemoryRegistry;
    use crate::tree::Span;

    #[test]
    fn test_nested_conversion() {
        let mut doc = Document::new("file:///a.qml");
        let model = doc.create_object("ListModel", Span::at(1, 1));
        let element = doc.create_object("ListElement", Span::at(2, 5));
        let name = doc.ensure_property(element, "name", Location::new(2, 19));
        doc.add_literal(name, Literal::String("apple".into()), Location::new(2, 25));
        let default = doc.ensure_default_property(model, Location::new(2, 5));
        doc.add_object(default, element);

        let converted = custom_property(&doc, default);
        assert!(!converted.is_list);
        let CustomValue::Object(node) = &converted.values[0] else {
            panic!("expected object");
        };
        assert_eq!(node.type_name, "ListElement");
        assert_eq!(node.properties[0].name, "name");
        assert_eq!(
            node.properties[0].values,
            vec![CustomValue::Literal(Literal::String("apple".into()))]
        );
    }

    #[test]
    fn test_evaluate_enum() {
        let mut registry = InMemoryRegistry::new();
        let qt = MetaObject::builder("Qt")
            .enumeration(MetaEnum::new("Orientation", [("Horizontal", 1), ("Vertical", 2)]))
            .build();
        registry.set_global_enums(qt);
        let ctx = CustomParserContext::new(&registry, "file:///a.qml");
        assert_eq!(ctx.evaluate_enum("Qt.Vertical"), Some(2));
        assert_eq!(ctx.evaluate_enum("Qt.Diagonal"), None);
        assert_eq!(ctx.evaluate_enum("Nope.Vertical"), None);
    }

    #[test]
    fn test_errors_carry_url() {
        let registry = InMemoryRegistry::new();
        let mut ctx = CustomParserContext::new(&registry, "file:///a.qml");
        ctx.error(Location::new(4, 2), " bad role ");
        let errors = ctx.into_errors();
        assert_eq!(errors[0].to_string(), "file:///a.qml:4:2: bad role");
    }
}
