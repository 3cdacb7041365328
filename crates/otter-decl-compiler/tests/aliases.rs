mod common;

use std::sync::Arc;

use otter_decl_bytecode::{
    ALIAS_FLAG_PTR, AliasTarget, DynamicTypeDescriptor, Instruction, Opcode, PropertySlot, SavedProperty, SignalSlot,
    SlotStorage, SynthesisData,
};
use otter_decl_compiler::{
    CompiledDocument, Compiler, Document, DynamicMethod, DynamicPropertyKind, DynamicSignal, InMemoryRegistry,
    Literal, MetaObject, MetaProperty, ObjectId, PropertyType, RegisteredType,
};

use common::*;

/// `Item { id: root; <declarations>; Item { id: inner } }`
fn aliasing_document(url: &str, declare: impl FnOnce(&mut Document, ObjectId)) -> (Document, ObjectId) {
    let mut doc = Document::new(url);
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let id = doc.ensure_property(root, "id", loc(2, 5));
    doc.add_script(id, "root", loc(2, 9));
    declare(&mut doc, root);
    let inner = doc.create_object("Item", at(6, 5));
    let inner_id = doc.ensure_property(inner, "id", loc(6, 12));
    doc.add_script(inner_id, "inner", loc(6, 16));
    let data = doc.ensure_default_property(root, loc(6, 5));
    doc.add_object(data, inner);
    (doc, root)
}

fn declare_alias(doc: &mut Document, obj: ObjectId, name: &str, target: &str, line: u32) {
    let index = doc.add_dynamic_property(obj, name, DynamicPropertyKind::Alias, false, loc(line, 5));
    let holder = doc.dynamic_property_value(obj, index);
    doc.add_script(holder, target, loc(line, 27));
}

fn descriptor(compiled: &CompiledDocument, obj: ObjectId) -> DynamicTypeDescriptor {
    match &compiled.document.object(obj).ann.descriptor {
        Some(desc) => desc.clone(),
        None => panic!("object has no synthesized type"),
    }
}

#[test]
fn test_alias_slots_follow_value_slots() {
    let (doc, root) = aliasing_document("file:///app/main.qml", |doc, root| {
        declare_alias(doc, root, "w", "inner.width", 3);
        let count = doc.add_dynamic_property(root, "count", DynamicPropertyKind::Int, false, loc(4, 5));
        let init = doc.dynamic_property_value(root, count);
        doc.add_literal(init, Literal::Number(3.0), loc(4, 25));
    });

    let registry = registry();
    let compiled = Compiler::new(&registry).compile(&doc).unwrap();
    let desc = descriptor(&compiled, root);

    assert_eq!(desc.class_name, "Item_QML_0");
    assert_eq!(desc.base_class, "Item");
    assert_eq!(
        desc.properties,
        vec![
            PropertySlot {
                name: "count".into(),
                type_name: "int".into(),
                storage: SlotStorage::Value { type_code: 2 },
                writable: true,
                notify_signal: 0,
            },
            PropertySlot {
                name: "w".into(),
                type_name: "real".into(),
                storage: SlotStorage::Alias(Some(AliasTarget {
                    context_index: 1,
                    property_index: Some(ITEM_WIDTH),
                    flags: 0,
                    type_code: 6,
                })),
                writable: true,
                notify_signal: 1,
            },
        ]
    );
    assert_eq!(
        desc.signals,
        vec![SignalSlot::notify("countChanged"), SignalSlot::notify("wChanged")]
    );

    let component = &compiled.component;
    let ops = ops(component);
    assert_eq!(
        opcodes(component)[..6],
        [
            Opcode::Init,
            Opcode::CreateObject,
            Opcode::StoreMetaObject,
            Opcode::SetId,
            Opcode::BeginObject,
            Opcode::StoreInteger,
        ]
    );
    assert_eq!(ops[5], Instruction::StoreInteger { property: 6, value: 3 });

    let Instruction::StoreMetaObject { data, alias_data, property_cache } = ops[2] else {
        panic!("expected a synthesized type");
    };
    assert_eq!(property_cache, component.root_property_cache);
    let stored = DynamicTypeDescriptor::from_bytes(component.pool.data(data).unwrap()).unwrap();
    assert_eq!(stored, desc);
    let synth = SynthesisData::from_bytes(component.pool.data(alias_data).unwrap()).unwrap();
    assert_eq!(synth.value_property_count, 1);
    assert_eq!(synth.aliases.len(), 1);
    assert_eq!(synth.aliases[0].context_index, 1);
}

#[test]
fn test_alias_pass_keeps_class_name() {
    let (mut doc, root) = aliasing_document("file:///app/main.qml", |doc, root| {
        declare_alias(doc, root, "w", "inner.width", 3);
    });
    let inner = doc
        .object_ids()
        .find(|o| *o != root && doc.object(*o).type_index.is_some())
        .unwrap();
    doc.add_dynamic_property(inner, "flag", DynamicPropertyKind::Bool, false, loc(7, 9));

    let registry = registry();
    let compiled = Compiler::new(&registry).compile(&doc).unwrap();
    assert_eq!(descriptor(&compiled, root).class_name, "Item_QML_0");
    assert_eq!(descriptor(&compiled, inner).class_name, "Item_QML_1");
}

#[test]
fn test_object_alias() {
    let (doc, root) = aliasing_document("file:///app/main.qml", |doc, root| {
        declare_alias(doc, root, "content", "inner", 3);
    });

    let registry = registry();
    let compiled = Compiler::new(&registry).compile(&doc).unwrap();
    let desc = descriptor(&compiled, root);
    let (_, slot) = desc.property("content").unwrap();
    assert_eq!(slot.type_name, "Item*");
    assert!(!slot.writable);
    let SlotStorage::Alias(Some(target)) = slot.storage else {
        panic!("expected a resolved alias");
    };
    assert!(target.is_pointer());
    assert_eq!(target.property_index, None);
    assert_eq!(target.flags, ALIAS_FLAG_PTR);
}

#[test]
fn test_value_type_alias() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    declare_alias(&mut doc, root, "size", "label.font.pixelSize", 2);
    let label = doc.create_object("Text", at(3, 5));
    let id = doc.ensure_property(label, "id", loc(3, 12));
    doc.add_script(id, "label", loc(3, 16));
    let data = doc.ensure_default_property(root, loc(3, 5));
    doc.add_object(data, label);

    let registry = registry();
    let compiled = Compiler::new(&registry).compile(&doc).unwrap();
    let desc = descriptor(&compiled, root);
    let (_, slot) = desc.property("size").unwrap();
    assert_eq!(slot.type_name, "int");
    let SlotStorage::Alias(Some(target)) = slot.storage else {
        panic!("expected a resolved alias");
    };
    assert_eq!(target.context_index, 0);
    assert_eq!(target.core_index(), Some(TEXT_FONT));
    assert_eq!(target.value_type_index(), Some(0));
    assert_eq!(target.property_index.map(|i| i >> 24), Some(FONT_TYPE));
}

#[test]
fn test_enum_alias_is_int() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    declare_alias(&mut doc, root, "align", "label.horizontalAlignment", 2);
    let label = doc.create_object("Text", at(3, 5));
    let id = doc.ensure_property(label, "id", loc(3, 12));
    doc.add_script(id, "label", loc(3, 16));
    let data = doc.ensure_default_property(root, loc(3, 5));
    doc.add_object(data, label);

    let registry = registry();
    let compiled = Compiler::new(&registry).compile(&doc).unwrap();
    let desc = descriptor(&compiled, root);
    assert_eq!(desc.property("align").unwrap().1.type_name, "int");
}

#[test]
fn test_alias_errors() {
    for (target, message) in [
        ("nothere.width", "Invalid alias reference. Unable to find id \"nothere\""),
        ("inner.missing", "Invalid alias location"),
        (
            "inner.width + 1",
            "Invalid alias reference. An alias reference must be specified as <id>, <id>.<property> or <id>.<value property>.<property>",
        ),
    ] {
        let (doc, _) = aliasing_document("file:///app/main.qml", |doc, root| {
            declare_alias(doc, root, "w", target, 3);
        });
        let registry = registry();
        let err = Compiler::new(&registry).compile(&doc).unwrap_err();
        let descriptions: Vec<&str> = err.diagnostics().iter().map(|d| d.description.as_str()).collect();
        assert_eq!(descriptions, vec![message], "alias {target}");
        assert_eq!(err.diagnostics()[0].line, 3);
    }
}

#[test]
fn test_declared_signals_and_methods() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    doc.add_dynamic_signal(
        root,
        DynamicSignal {
            name: "moved".into(),
            parameter_types: vec!["int".into()],
            parameter_names: vec!["x".into()],
            location: loc(2, 5),
        },
    );
    doc.add_dynamic_method(
        root,
        DynamicMethod {
            name: "reset".into(),
            parameter_names: vec!["a".into(), "b".into()],
            body: "{ return a }".into(),
            location: loc(3, 5),
        },
    );
    let handler = doc.ensure_property(root, "onMoved", loc(4, 5));
    doc.add_script(handler, "reset(x, 0)", loc(4, 14));

    let registry = registry();
    let compiled = Compiler::new(&registry).compile(&doc).unwrap();
    let desc = descriptor(&compiled, root);
    assert_eq!(desc.signals[0].signature(), "moved(int)");
    assert_eq!(desc.methods[0].signature(), "reset(var,var)");

    let component = &compiled.component;
    let Instruction::StoreMetaObject { alias_data, .. } = ops(component)[2] else {
        panic!("expected a synthesized type");
    };
    let synth = SynthesisData::from_bytes(component.pool.data(alias_data).unwrap()).unwrap();
    assert_eq!(synth.signal_count, 1);
    assert_eq!(synth.method_body(0), Some("(function reset(a,b) { return a })"));
    assert_eq!(synth.methods[0].line, 3);
    assert_eq!(count_ops(component, |op| op.opcode() == Opcode::StoreSignal), 1);
}

#[test]
fn test_dynamic_member_name_errors() {
    let cases: [(&str, fn(&mut Document, ObjectId)); 4] = [
        ("Duplicate property name", |doc, root| {
            doc.add_dynamic_property(root, "a", DynamicPropertyKind::Int, false, loc(2, 5));
            doc.add_dynamic_property(root, "a", DynamicPropertyKind::Real, false, loc(3, 5));
        }),
        ("Property names cannot begin with an upper case letter", |doc, root| {
            doc.add_dynamic_property(root, "Big", DynamicPropertyKind::Int, false, loc(2, 5));
        }),
        ("Illegal property name", |doc, root| {
            doc.add_dynamic_property(root, "print", DynamicPropertyKind::Int, false, loc(2, 5));
        }),
        ("Cannot override FINAL property", |doc, root| {
            doc.add_dynamic_property(root, "objectName", DynamicPropertyKind::String, false, loc(2, 5));
        }),
    ];
    for (message, declare) in cases {
        let mut doc = Document::new("file:///app/main.qml");
        let root = doc.create_object("Rectangle", at(1, 1));
        doc.set_root(root);
        declare(&mut doc, root);
        let registry = if message.contains("FINAL") {
            final_object_name_registry()
        } else {
            registry()
        };
        let err = Compiler::new(&registry).compile(&doc).unwrap_err();
        assert_eq!(err.diagnostics()[0].description, message);
    }
}

fn final_object_name_registry() -> InMemoryRegistry {
    let base = MetaObject::builder("QObject")
        .property(MetaProperty::new("objectName", PropertyType::String).final_())
        .build();
    let rectangle = MetaObject::builder("Rectangle").super_class(base).build();
    let mut registry = InMemoryRegistry::new();
    registry.register(RegisteredType::new(3, "QtQuick", "Rectangle", rectangle));
    registry
}

#[test]
fn test_composite_type_alias_binding() {
    let (button_doc, button_root) = {
        let mut doc = Document::new("file:///ui/Button.qml");
        let root = doc.create_object("Item", at(1, 1));
        doc.set_root(root);
        declare_alias(&mut doc, root, "label", "text.text", 2);
        let text = doc.create_object("Text", at(3, 5));
        let id = doc.ensure_property(text, "id", loc(3, 12));
        doc.add_script(id, "text", loc(3, 16));
        let data = doc.ensure_default_property(root, loc(3, 5));
        doc.add_object(data, text);
        (doc, root)
    };

    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    let button = compiler.compile(&button_doc).unwrap();
    assert_eq!(descriptor(&button, button_root).class_name, "Button_QMLTYPE_0");
    let composite = Arc::new(button.composite_type().unwrap());
    assert_eq!(composite.url, "file:///ui/Button.qml");

    let mut doc = Document::new("file:///ui/main.qml");
    doc.add_composite_type("Button", composite);
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let id = doc.ensure_property(root, "id", loc(2, 5));
    doc.add_script(id, "root", loc(2, 9));
    let instance = doc.create_object("Button", at(3, 5));
    let label = doc.ensure_property(instance, "label", loc(3, 14));
    doc.add_script(label, "root.objectName", loc(3, 21));
    declare_alias(&mut doc, root, "button", "instance", 4);
    let instance_id = doc.ensure_property(instance, "id", loc(3, 30));
    doc.add_script(instance_id, "instance", loc(3, 34));
    let data = doc.ensure_default_property(root, loc(3, 5));
    doc.add_object(data, instance);

    let compiled = compiler.compile(&doc).unwrap();
    let component = &compiled.component;
    let ops = ops(component);

    let create = ops
        .iter()
        .find(|op| matches!(op, Instruction::CreateObject { type_index, .. } if type_index.index() == 0))
        .unwrap();
    let Instruction::CreateObject { binding_bits: Some(bits), data: None, .. } = create else {
        panic!("expected binding bits on the composite instance");
    };
    assert_eq!(component.pool.data(*bits), Some(&[0x40u8, 0, 0, 0][..]));

    let Some(Instruction::StoreBindingOnAlias { property, .. }) =
        ops.iter().find(|op| op.opcode() == Opcode::StoreBindingOnAlias)
    else {
        panic!("expected a binding on the alias");
    };
    let target = SavedProperty::from_bytes(component.pool.data(*property).unwrap()).unwrap();
    assert_eq!(target.core_index, 6);
    assert_eq!(target.type_code, 10);

    // Aliases to composite instances expose the registered base class.
    let desc = descriptor(&compiled, root);
    assert_eq!(desc.property("button").unwrap().1.type_name, "Item*");
}

/// `Button.qml`: `Item { property alias labelFont: text.font; Text { id: text } }`
fn font_button_document() -> (Document, ObjectId) {
    let mut doc = Document::new("file:///ui/Button.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    declare_alias(&mut doc, root, "labelFont", "text.font", 2);
    let text = doc.create_object("Text", at(3, 5));
    let id = doc.ensure_property(text, "id", loc(3, 12));
    doc.add_script(id, "text", loc(3, 16));
    let data = doc.ensure_default_property(root, loc(3, 5));
    doc.add_object(data, text);
    (doc, root)
}

#[test]
fn test_alias_to_custom_value_type_keeps_type() {
    let (button_doc, button_root) = font_button_document();
    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    let button = compiler.compile(&button_doc).unwrap();

    let desc = descriptor(&button, button_root);
    let (_, slot) = desc.property("labelFont").unwrap();
    assert_eq!(slot.type_name, "font");
    let SlotStorage::Alias(Some(target)) = slot.storage else {
        panic!("expected a resolved alias");
    };
    assert_eq!(target.type_code, FONT_TYPE);
    assert_eq!(target.core_index(), Some(TEXT_FONT));

    let composite = Arc::new(button.composite_type().unwrap());
    let label_font = composite.root_meta.index_of_property("labelFont").unwrap();
    assert_eq!(
        composite.root_meta.property(label_font).map(|p| p.ty.clone()),
        Some(PropertyType::Custom(FONT_TYPE, "font".into()))
    );

    // main.qml: `Button { labelFont.pixelSize: 12 }`
    let mut doc = Document::new("file:///ui/main.qml");
    doc.add_composite_type("Button", composite);
    let root = doc.create_object("Button", at(1, 1));
    doc.set_root(root);
    let font = doc.ensure_property(root, "labelFont", loc(2, 5));
    let scope = doc.ensure_sub_scope(font);
    let size = doc.ensure_property(scope, "pixelSize", loc(2, 15));
    doc.add_literal(size, Literal::Number(12.0), loc(2, 26));

    let compiled = match compiler.compile(&doc) {
        Ok(compiled) => compiled,
        Err(e) => panic!("compile failed: {:?}", e.diagnostics()),
    };
    let ops = ops(&compiled.component);
    let fetch = ops
        .iter()
        .position(|op| op.opcode() == Opcode::FetchValueType)
        .expect("value type fetched through the alias");
    assert_eq!(
        ops[fetch..fetch + 3],
        [
            Instruction::FetchValueType {
                property: label_font,
                value_type: FONT_TYPE,
                binding_skip_list: 0,
            },
            Instruction::StoreInteger { property: 0, value: 12 },
            Instruction::PopValueType {
                property: label_font,
                value_type: FONT_TYPE,
            },
        ]
    );
}

#[test]
fn test_alias_target_must_be_scriptable_and_in_revision() {
    let item = MetaObject::builder("Item")
        .property(MetaProperty::new("width", PropertyType::Double))
        .property(MetaProperty::new("handle", PropertyType::Int).unscriptable())
        .property(MetaProperty::new("opacity", PropertyType::Double).with_revision(1))
        .property(MetaProperty::new("data", PropertyType::List("Item".into())))
        .default_property("data")
        .build();
    let mut registry = InMemoryRegistry::new();
    registry.register(RegisteredType::new(1, "QtQuick", "Item", item).revisioned());

    for (target, message) in [
        ("inner.handle", "Invalid alias location"),
        ("inner.opacity", "\"Item.opacity\" is not available in QtQuick 1.0."),
    ] {
        let (doc, _) = aliasing_document("file:///app/main.qml", |doc, root| {
            declare_alias(doc, root, "a", target, 3);
        });
        let err = Compiler::new(&registry).compile(&doc).unwrap_err();
        let descriptions: Vec<&str> = err.diagnostics().iter().map(|d| d.description.as_str()).collect();
        assert_eq!(descriptions, vec![message], "alias {target}");
        assert_eq!(err.diagnostics()[0].line, 3);
    }

    let (doc, root) = aliasing_document("file:///app/main.qml", |doc, root| {
        declare_alias(doc, root, "a", "inner.width", 3);
    });
    let compiled = Compiler::new(&registry).compile(&doc).unwrap();
    assert_eq!(descriptor(&compiled, root).property("a").unwrap().1.type_name, "real");
}

#[test]
fn test_default_alias_applies_after_alias_pass() {
    let (mut doc, root) = aliasing_document("file:///app/main.qml", |_, _| {});
    let content = doc.add_dynamic_property(root, "content", DynamicPropertyKind::Alias, true, loc(3, 5));
    let holder = doc.dynamic_property_value(root, content);
    doc.add_script(holder, "inner.data", loc(3, 35));

    let registry = registry();
    let compiled = match Compiler::new(&registry).compile(&doc) {
        Ok(compiled) => compiled,
        Err(e) => panic!("compile failed: {:?}", e.diagnostics()),
    };

    // The root's own children still go to the base default property.
    let ops = ops(&compiled.component);
    assert!(
        ops.iter()
            .any(|op| matches!(op, Instruction::FetchList { property: ITEM_DATA, .. }))
    );

    let desc = descriptor(&compiled, root);
    assert_eq!(desc.default_property.as_deref(), Some("content"));
    let synth = compiled.document.object(root).ann.synth_meta.clone().unwrap();
    let (index, property) = synth.default_property().unwrap();
    assert_eq!(property.name, "content");
    assert_eq!(synth.index_of_property("content"), Some(index));
}

#[test]
fn test_nested_component_root_gets_document_type_name() {
    let mut doc = Document::new("file:///ui/Button.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let component = doc.create_object("Component", at(2, 5));
    let delegate = doc.create_object("Item", at(3, 9));
    doc.add_dynamic_property(delegate, "pressed", DynamicPropertyKind::Bool, false, loc(4, 13));
    let child = doc.create_object("Item", at(5, 13));
    doc.add_dynamic_property(child, "hovered", DynamicPropertyKind::Bool, false, loc(6, 17));
    let children = doc.ensure_default_property(delegate, loc(5, 13));
    doc.add_object(children, child);
    let body = doc.ensure_default_property(component, loc(3, 9));
    doc.add_object(body, delegate);
    let data = doc.ensure_default_property(root, loc(2, 5));
    doc.add_object(data, component);

    let registry = registry();
    let compiled = Compiler::new(&registry).compile(&doc).unwrap();
    assert!(descriptor(&compiled, delegate).class_name.starts_with("Button_QMLTYPE_"));
    assert!(descriptor(&compiled, child).class_name.starts_with("Item_QML_"));
}
