#![allow(dead_code)]

use std::sync::Arc;

use otter_decl_bytecode::{CompiledComponent, Instruction, Opcode};
use otter_decl_compiler::meta::DEFERRED_PROPERTIES_INFO;
use otter_decl_compiler::{
    BindingOptimizer, BindingSite, CustomParser, CustomParserContext, CustomProperty, InMemoryRegistry, Location,
    MetaEnum, MetaMethod, MetaObject, MetaProperty, PropertyType, RegisteredType, Span,
};

pub const FONT_TYPE: u32 = 64;
pub const KEYS_ATTACHED_ID: u32 = 3;
pub const ANIMATION_SOURCE_CAST: i32 = 8;
pub const ITEM_STATUS_CAST: i32 = 16;

// Absolute property indices of the test classes
pub const ITEM_WIDTH: u32 = 1;
pub const ITEM_HEIGHT: u32 = 2;
pub const ITEM_X: u32 = 3;
pub const ITEM_DATA: u32 = 5;
pub const TEXT_TEXT: u32 = 6;
pub const TEXT_FONT: u32 = 8;
pub const TEXT_HALIGN: u32 = 9;
pub const RECT_COLOR: u32 = 6;
pub const LOADER_SOURCE_ITEM: u32 = 6;
pub const LIST_VIEW_DELEGATE: u32 = 6;

/// Collects unknown property names; `bad` is rejected
#[derive(Debug)]
pub struct RoleParser;

impl CustomParser for RoleParser {
    fn compile(&self, ctx: &mut CustomParserContext<'_>, properties: &[CustomProperty]) -> Vec<u8> {
        let mut roles = Vec::new();
        for property in properties {
            if property.name == "bad" {
                ctx.error(property.location, "bad role");
            }
            roles.push(property.name.clone());
        }
        roles.join(",").into_bytes()
    }
}

/// Accepts bindings that read `id.property` paths
#[derive(Debug, Default)]
pub struct PathOptimizer {
    compiled: Vec<String>,
}

impl BindingOptimizer for PathOptimizer {
    fn begin_component(&mut self) {
        self.compiled.clear();
    }

    fn compile(&mut self, site: &BindingSite<'_>) -> Option<u32> {
        let expression = site.expression.trim();
        let (head, rest) = expression.split_once('.')?;
        let simple = rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
        if !simple || !site.ids.iter().any(|id| id == head) {
            return None;
        }
        self.compiled.push(expression.to_string());
        Some(self.compiled.len() as u32 - 1)
    }

    fn finish_component(&mut self) -> Option<Vec<u8>> {
        (!self.compiled.is_empty()).then(|| self.compiled.join(";").into_bytes())
    }
}

pub fn registry() -> InMemoryRegistry {
    let qobject = MetaObject::builder("QObject")
        .property(MetaProperty::new("objectName", PropertyType::String))
        .build();
    let item = MetaObject::builder("Item")
        .super_class(qobject.clone())
        .method(MetaMethod::signal("widthChanged"))
        .method(MetaMethod::signal("clicked").param("int", "button"))
        .notified_property(MetaProperty::new("width", PropertyType::Double), "widthChanged")
        .property(MetaProperty::new("height", PropertyType::Double))
        .property(MetaProperty::new("x", PropertyType::Double))
        .property(MetaProperty::new("visible", PropertyType::Bool))
        .property(MetaProperty::new("data", PropertyType::List("QObject".into())))
        .default_property("data")
        .build();
    let halign = MetaEnum::new("HAlignment", [("AlignLeft", 1), ("AlignRight", 2), ("AlignHCenter", 4)]);
    let text = MetaObject::builder("Text")
        .super_class(item.clone())
        .property(MetaProperty::new("text", PropertyType::String))
        .property(MetaProperty::new("color", PropertyType::Color))
        .property(MetaProperty::new("font", PropertyType::Custom(FONT_TYPE, "font".into())))
        .property(MetaProperty::new("horizontalAlignment", PropertyType::Int).with_enum(halign.clone()))
        .enumeration(halign)
        .build();
    let rectangle = MetaObject::builder("Rectangle")
        .super_class(item.clone())
        .property(MetaProperty::new("color", PropertyType::Color))
        .property(MetaProperty::new("radius", PropertyType::Double))
        .build();
    let loader = MetaObject::builder("Loader")
        .super_class(item.clone())
        .property(MetaProperty::new("sourceItem", PropertyType::Object("Item".into())))
        .class_info(DEFERRED_PROPERTIES_INFO, "sourceItem")
        .build();
    let component = MetaObject::builder("QDeclarativeComponent")
        .super_class(qobject.clone())
        .build();
    let list_view = MetaObject::builder("ListView")
        .super_class(item.clone())
        .property(MetaProperty::new(
            "delegate",
            PropertyType::Object("QDeclarativeComponent".into()),
        ))
        .build();
    let list_model = MetaObject::builder("ListModel")
        .super_class(qobject.clone())
        .property(MetaProperty::new("count", PropertyType::Int).read_only())
        .build();
    let animation = MetaObject::builder("NumberAnimation")
        .super_class(qobject.clone())
        .property(MetaProperty::new("to", PropertyType::Double))
        .build();
    let keys = MetaObject::builder("KeysAttached")
        .super_class(qobject.clone())
        .method(MetaMethod::signal("pressed").param("QVariant", "event"))
        .property(MetaProperty::new("enabled", PropertyType::Bool))
        .build();
    let font = MetaObject::builder("Font")
        .property(MetaProperty::new("pixelSize", PropertyType::Int))
        .property(MetaProperty::new("bold", PropertyType::Bool))
        .build();
    let qt = MetaObject::builder("Qt")
        .enumeration(MetaEnum::new("Orientation", [("Horizontal", 1), ("Vertical", 2)]))
        .build();

    let mut registry = InMemoryRegistry::new();
    registry.register(RegisteredType::new(10, "QtQuick", "QtObject", qobject));
    registry.register(RegisteredType::new(1, "QtQuick", "Item", item).parser_status(ITEM_STATUS_CAST));
    registry.register(RegisteredType::new(2, "QtQuick", "Text", text));
    registry.register(RegisteredType::new(3, "QtQuick", "Rectangle", rectangle));
    registry.register_component(RegisteredType::new(4, "QtQuick", "Component", component));
    registry.register(RegisteredType::new(5, "QtQuick", "ListView", list_view));
    registry.register(RegisteredType::new(6, "QtQuick", "ListModel", list_model).custom_parser(Arc::new(RoleParser)));
    registry.register(RegisteredType::new(7, "QtQuick", "NumberAnimation", animation).value_source(ANIMATION_SOURCE_CAST));
    registry.register(
        RegisteredType::new(8, "QtQuick", "Keys", keys.clone())
            .uncreatable(Some("Keys is only available via attached properties"))
            .attached(KEYS_ATTACHED_ID, keys),
    );
    registry.register(RegisteredType::new(9, "QtQuick", "Loader", loader));
    registry.register_value_type(FONT_TYPE, font);
    registry.set_global_enums(qt);
    registry
}

pub fn loc(line: u32, column: u32) -> Location {
    Location::new(line, column)
}

pub fn at(line: u32, column: u32) -> Span {
    Span::at(line, column)
}

pub fn ops(component: &CompiledComponent) -> Vec<Instruction> {
    component.bytecode.iter().map(|instr| instr.op.clone()).collect()
}

pub fn opcodes(component: &CompiledComponent) -> Vec<Opcode> {
    component.bytecode.iter().map(|instr| instr.op.opcode()).collect()
}

pub fn count_ops(component: &CompiledComponent, pred: impl Fn(&Instruction) -> bool) -> usize {
    component.bytecode.iter().filter(|instr| pred(&instr.op)).count()
}
