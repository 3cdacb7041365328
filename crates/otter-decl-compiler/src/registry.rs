//! Type registry interface
//!
//! The compiler never owns type information. Element names, attached types,
//! value types and interfaces are looked up through [`TypeRegistry`];
//! [`InMemoryRegistry`] is a plain table implementation for hosts and tests.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use otter_decl_bytecode::PropertyCache;

use crate::custom::CustomParser;
use crate::meta::{MetaObject, PropertyType};

/// Script globals that ids and dynamic members may not shadow
pub const RESERVED_GLOBALS: &[&str] = &[
    "NaN",
    "Infinity",
    "undefined",
    "eval",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "decodeURI",
    "decodeURIComponent",
    "encodeURI",
    "encodeURIComponent",
    "escape",
    "unescape",
    "print",
    "gc",
    "console",
    "version",
];

/// Type contributing attached properties
#[derive(Debug, Clone)]
pub struct AttachedType {
    /// Id used by the fetch-attached instruction
    pub id: u32,
    /// Type of the attached object
    pub meta: Arc<MetaObject>,
}

/// A natively registered element type
#[derive(Debug, Clone)]
pub struct RegisteredType {
    /// Registry id
    pub type_id: u32,
    /// Module the element was imported from
    pub module: String,
    /// Element name
    pub element_name: String,
    /// Imported major version
    pub major_version: u32,
    /// Imported minor version
    pub minor_version: u32,
    /// Reflective type
    pub meta: Arc<MetaObject>,
    /// Native create-function handle; `None` when not creatable
    pub create_function: Option<u32>,
    /// Allocation size for the simple-create path
    pub create_size: u32,
    /// Why the type cannot be created
    pub no_creation_reason: Option<String>,
    /// Carries an extension object
    pub extended: bool,
    /// Members are filtered by the imported minor version
    pub revisioned: bool,
    /// Cast offset of the construction-notification interface
    pub parser_status_cast: Option<i32>,
    /// Cast offset of the value-source interface
    pub value_source_cast: Option<i32>,
    /// Cast offset of the value-interceptor interface
    pub value_interceptor_cast: Option<i32>,
    /// Attached-property provider
    pub attached: Option<AttachedType>,
    /// Parser for the type's own property language
    pub custom_parser: Option<Arc<dyn CustomParser>>,
}

impl RegisteredType {
    /// Creatable, unversioned type
    pub fn new(
        type_id: u32,
        module: impl Into<String>,
        element_name: impl Into<String>,
        meta: Arc<MetaObject>,
    ) -> Self {
        Self {
            type_id,
            module: module.into(),
            element_name: element_name.into(),
            major_version: 1,
            minor_version: 0,
            meta,
            create_function: Some(type_id),
            create_size: 0,
            no_creation_reason: None,
            extended: false,
            revisioned: false,
            parser_status_cast: None,
            value_source_cast: None,
            value_interceptor_cast: None,
            attached: None,
            custom_parser: None,
        }
    }

    /// Set the imported version
    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    /// Filter members by the imported minor version
    pub fn revisioned(mut self) -> Self {
        self.revisioned = true;
        self
    }

    /// Mark uncreatable
    pub fn uncreatable(mut self, reason: Option<&str>) -> Self {
        self.create_function = None;
        self.no_creation_reason = reason.map(str::to_string);
        self
    }

    /// Set the allocation size
    pub fn size(mut self, size: u32) -> Self {
        self.create_size = size;
        self
    }

    /// Mark as carrying an extension object
    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }

    /// Participate in construction notifications
    pub fn parser_status(mut self, cast: i32) -> Self {
        self.parser_status_cast = Some(cast);
        self
    }

    /// Act as a value source
    pub fn value_source(mut self, cast: i32) -> Self {
        self.value_source_cast = Some(cast);
        self
    }

    /// Act as a value interceptor
    pub fn value_interceptor(mut self, cast: i32) -> Self {
        self.value_interceptor_cast = Some(cast);
        self
    }

    /// Provide attached properties
    pub fn attached(mut self, id: u32, meta: Arc<MetaObject>) -> Self {
        self.attached = Some(AttachedType { id, meta });
        self
    }

    /// Use a custom parser
    pub fn custom_parser(mut self, parser: Arc<dyn CustomParser>) -> Self {
        self.custom_parser = Some(parser);
        self
    }

    /// Whether instances may be created
    pub fn is_creatable(&self) -> bool {
        self.create_function.is_some()
    }

    /// `module/Element`
    pub fn qml_type_name(&self) -> String {
        format!("{}/{}", self.module, self.element_name)
    }
}

/// A type defined by a previously compiled document
#[derive(Debug, Clone)]
pub struct CompositeType {
    /// Url of the defining document
    pub url: String,
    /// Type of the document root (synthesized if it declares members)
    pub root_meta: Arc<MetaObject>,
    /// Property cache of the document root
    pub root_cache: Arc<PropertyCache>,
}

/// Lookup surface the compiler needs from the host
pub trait TypeRegistry {
    /// Resolve an element name as written, possibly `Namespace.Element`
    fn resolve_type(&self, name: &str) -> Option<Arc<RegisteredType>>;

    /// Whether a name is an import namespace
    fn is_namespace(&self, name: &str) -> bool;

    /// Resolve an element inside an import namespace
    fn resolve_in_namespace(&self, namespace: &str, name: &str) -> Option<Arc<RegisteredType>> {
        self.resolve_type(&format!("{namespace}.{name}"))
    }

    /// Registered element whose reflective type is exactly `class_name`
    fn type_for_class(&self, class_name: &str) -> Option<Arc<RegisteredType>>;

    /// Reflective type for a class name used in property types
    fn meta_for_class(&self, class_name: &str) -> Option<Arc<MetaObject>>;

    /// Reflective type of a registered value type
    fn value_type(&self, ty: &PropertyType) -> Option<Arc<MetaObject>>;

    /// Whether a class is an interface
    fn is_interface(&self, _class_name: &str) -> bool {
        false
    }

    /// Whether a string converter is registered for a type code
    fn has_string_converter(&self, _type_code: u32) -> bool {
        false
    }

    /// Global enumeration namespace (`Qt`)
    fn global_enums(&self) -> Option<Arc<MetaObject>> {
        None
    }

    /// The wrapper component element
    fn component_type(&self) -> Option<Arc<RegisteredType>>;

    /// Whether a name shadows a script global
    fn is_reserved_name(&self, name: &str) -> bool {
        RESERVED_GLOBALS.contains(&name)
    }
}

/// Table-backed [`TypeRegistry`]
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    types: FxHashMap<String, Arc<RegisteredType>>,
    by_class: FxHashMap<String, Arc<RegisteredType>>,
    classes: FxHashMap<String, Arc<MetaObject>>,
    namespaces: FxHashSet<String>,
    value_types: FxHashMap<u32, Arc<MetaObject>>,
    interfaces: FxHashSet<String>,
    converters: FxHashSet<u32>,
    global_enums: Option<Arc<MetaObject>>,
    component: Option<Arc<RegisteredType>>,
}

impl InMemoryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an element under its element name
    pub fn register(&mut self, ty: RegisteredType) -> Arc<RegisteredType> {
        let name = ty.element_name.clone();
        self.insert(name, ty)
    }

    /// Register an element under `namespace.Element`
    pub fn register_in_namespace(&mut self, namespace: &str, ty: RegisteredType) -> Arc<RegisteredType> {
        self.namespaces.insert(namespace.to_string());
        let name = format!("{namespace}.{}", ty.element_name);
        self.insert(name, ty)
    }

    fn insert(&mut self, name: String, ty: RegisteredType) -> Arc<RegisteredType> {
        let ty = Arc::new(ty);
        self.register_class(ty.meta.clone());
        self.by_class
            .entry(ty.meta.class_name().to_string())
            .or_insert_with(|| ty.clone());
        self.types.insert(name, ty.clone());
        ty
    }

    /// Register a class and its super classes for property-type lookups
    pub fn register_class(&mut self, meta: Arc<MetaObject>) {
        let mut current = Some(meta);
        while let Some(meta) = current {
            current = meta.super_class().cloned();
            self.classes.entry(meta.class_name().to_string()).or_insert(meta);
        }
    }

    /// Register the wrapper component element
    pub fn register_component(&mut self, ty: RegisteredType) -> Arc<RegisteredType> {
        let ty = self.register(ty);
        self.component = Some(ty.clone());
        ty
    }

    /// Register a value type for a property type code
    pub fn register_value_type(&mut self, type_code: u32, meta: Arc<MetaObject>) {
        self.value_types.insert(type_code, meta);
    }

    /// Mark a class as an interface
    pub fn register_interface(&mut self, class_name: &str) {
        self.interfaces.insert(class_name.to_string());
    }

    /// Register a string converter for a type code
    pub fn register_string_converter(&mut self, type_code: u32) {
        self.converters.insert(type_code);
    }

    /// Set the global enumeration namespace
    pub fn set_global_enums(&mut self, meta: Arc<MetaObject>) {
        self.global_enums = Some(meta);
    }
}

impl TypeRegistry for InMemoryRegistry {
    fn resolve_type(&self, name: &str) -> Option<Arc<RegisteredType>> {
        self.types.get(name).cloned()
    }

    fn is_namespace(&self, name: &str) -> bool {
        self.namespaces.contains(name)
    }

    fn type_for_class(&self, class_name: &str) -> Option<Arc<RegisteredType>> {
        self.by_class.get(class_name).cloned()
    }

    fn meta_for_class(&self, class_name: &str) -> Option<Arc<MetaObject>> {
        self.classes.get(class_name).cloned()
    }

    fn value_type(&self, ty: &PropertyType) -> Option<Arc<MetaObject>> {
        self.value_types.get(&ty.code()).cloned()
    }

    fn is_interface(&self, class_name: &str) -> bool {
        self.interfaces.contains(class_name)
    }

    fn has_string_converter(&self, type_code: u32) -> bool {
        self.converters.contains(&type_code)
    }

    fn global_enums(&self) -> Option<Arc<MetaObject>> {
        self.global_enums.clone()
    }

    fn component_type(&self) -> Option<Arc<RegisteredType>> {
        self.component.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaProperty;

    fn item() -> Arc<MetaObject> {
        let base = MetaObject::builder("QObject").build();
        MetaObject::builder("Item")
            .super_class(base)
            .property(MetaProperty::new("width", PropertyType::Double))
            .build()
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = InMemoryRegistry::new();
        registry.register(RegisteredType::new(1, "QtQuick", "Item", item()));
        registry.register_in_namespace("Ext", RegisteredType::new(2, "Ext", "Widget", item()));

        assert_eq!(registry.resolve_type("Item").map(|t| t.type_id), Some(1));
        assert_eq!(registry.resolve_in_namespace("Ext", "Widget").map(|t| t.type_id), Some(2));
        assert!(registry.is_namespace("Ext"));
        assert!(registry.meta_for_class("QObject").is_some());
        assert_eq!(registry.type_for_class("Item").map(|t| t.type_id), Some(1));
        assert_eq!(
            registry.resolve_type("Item").map(|t| t.qml_type_name()),
            Some("QtQuick/Item".to_string())
        );
    }

    #[test]
    fn test_reserved_names() {
        let registry = InMemoryRegistry::new();
        assert!(registry.is_reserved_name("eval"));
        assert!(!registry.is_reserved_name("label"));
        assert!(registry.component_type().is_none());
    }

    #[test]
    fn test_uncreatable() {
        let ty = RegisteredType::new(3, "QtQuick", "Abstract", item()).uncreatable(Some("abstract"));
        assert!(!ty.is_creatable());
        assert_eq!(ty.no_creation_reason.as_deref(), Some("abstract"));
    }
}
