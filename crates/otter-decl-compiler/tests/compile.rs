mod common;

use otter_decl_bytecode::{ArtifactTypeKind, BindingPayload, Instruction, Opcode, ProgramRef, SavedProperty};
use otter_decl_compiler::registry::RESERVED_GLOBALS;
use otter_decl_compiler::{CompiledDocument, Compiler, CompilerOptions, Document, DynamicPropertyKind, Literal};
use proptest::prelude::*;

use common::*;

fn compile(doc: &Document) -> CompiledDocument {
    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    match compiler.compile(doc) {
        Ok(compiled) => compiled,
        Err(e) => panic!("compile failed: {:?}", e.diagnostics()),
    }
}

fn compile_errors(doc: &Document) -> Vec<String> {
    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    match compiler.compile(doc) {
        Ok(_) => panic!("expected compile errors"),
        Err(e) => e.diagnostics().iter().map(|d| d.description.clone()).collect(),
    }
}

#[test]
fn test_simple_root() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Rectangle", at(1, 1));
    doc.set_root(root);
    let id = doc.ensure_property(root, "id", loc(2, 5));
    doc.add_script(id, "root", loc(2, 9));
    let width = doc.ensure_property(root, "width", loc(3, 5));
    doc.add_literal(width, Literal::Number(100.0), loc(3, 12));
    let height = doc.ensure_property(root, "height", loc(4, 5));
    doc.add_script(height, "parent.width", loc(4, 13));

    let compiled = compile(&doc);
    let component = &compiled.component;
    assert_eq!(
        opcodes(component),
        vec![
            Opcode::Init,
            Opcode::CreateObject,
            Opcode::SetId,
            Opcode::StoreDouble,
            Opcode::StoreBinding,
            Opcode::SetDefault,
        ]
    );

    let ops = ops(component);
    assert!(matches!(
        ops[0],
        Instruction::Init {
            bindings_size: 1,
            parser_status_size: 0,
            context_cache: Some(0),
            compiled_binding: None,
        }
    ));
    assert_eq!(ops[3], Instruction::StoreDouble { property: ITEM_WIDTH, value: 100.0 });
    assert_eq!(component.context_caches[0].index_of("root"), Some(0));

    let Instruction::StoreBinding { property, value, context, owner } = ops[4] else {
        panic!("expected a binding store");
    };
    assert_eq!((context, owner), (0, 0));
    let target = SavedProperty::from_bytes(component.pool.data(property).unwrap()).unwrap();
    assert_eq!(target.core_index, ITEM_HEIGHT);
    assert_eq!(target.value_type, None);
    let payload = BindingPayload::decode(component.pool.data(value).unwrap()).unwrap();
    assert_eq!(payload.program, ProgramRef::SharedClosure(0));
    assert_eq!(payload.source, "(function $height() { return parent.width })");
    assert_eq!(component.cached_closures, 1);
    assert!(component.root_property_cache.is_some());
}

#[test]
fn test_call_binding_is_not_shared() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Text", at(1, 1));
    doc.set_root(root);
    let text = doc.ensure_property(root, "text", loc(2, 5));
    doc.add_script(text, "format(width)", loc(2, 11));

    let compiled = compile(&doc);
    let Instruction::StoreBinding { value, .. } = ops(&compiled.component)[2] else {
        panic!("expected a binding store");
    };
    let payload = BindingPayload::decode(compiled.component.pool.data(value).unwrap()).unwrap();
    assert_eq!(payload.program, ProgramRef::Program(0));
    assert_eq!(compiled.component.cached_programs, 1);
    assert_eq!(compiled.component.cached_closures, 0);
}

#[test]
fn test_parser_status_and_imported_scripts() {
    let mut doc = Document::new("file:///app/main.qml");
    doc.add_imported_script("Utils", "file:///app/utils.js", "function twice(x) { return x * 2 }");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);

    let compiled = compile(&doc);
    let ops = ops(&compiled.component);
    assert!(matches!(ops[0], Instruction::Init { parser_status_size: 1, context_cache: None, .. }));
    assert_eq!(ops[1], Instruction::StoreImportedScript { value: 0 });
    assert_eq!(ops[3], Instruction::BeginObject { cast_value: ITEM_STATUS_CAST });
    assert_eq!(compiled.component.scripts[0].qualifier, "Utils");
}

#[test]
fn test_component_in_list() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let component = doc.create_object("Component", at(2, 5));
    let inner = doc.create_object("Item", at(3, 9));
    let id = doc.ensure_property(inner, "id", loc(3, 16));
    doc.add_script(id, "inner", loc(3, 20));
    let body = doc.ensure_default_property(component, loc(3, 9));
    doc.add_object(body, inner);
    let data = doc.ensure_default_property(root, loc(2, 5));
    doc.add_object(data, component);

    let compiled = compile(&doc);
    assert_eq!(
        opcodes(&compiled.component),
        vec![
            Opcode::Init,
            Opcode::CreateObject,
            Opcode::BeginObject,
            Opcode::FetchList,
            Opcode::CreateComponent,
            Opcode::Init,
            Opcode::CreateObject,
            Opcode::SetId,
            Opcode::BeginObject,
            Opcode::SetDefault,
            Opcode::StoreObjectList,
            Opcode::PopList,
            Opcode::SetDefault,
        ]
    );
    let ops = ops(&compiled.component);
    assert!(matches!(ops[4], Instruction::CreateComponent { count: 5, .. }));
    // The outer component has no ids, the nested one owns `inner`.
    assert!(matches!(ops[0], Instruction::Init { context_cache: None, .. }));
    assert!(matches!(ops[5], Instruction::Init { context_cache: Some(0), .. }));
    assert_eq!(compiled.component.context_caches[0].index_of("inner"), Some(0));
    assert_eq!(compiled.stats.len(), 2);
}

#[test]
fn test_object_wrapped_in_implicit_component() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("ListView", at(1, 1));
    doc.set_root(root);
    let delegate = doc.ensure_property(root, "delegate", loc(2, 5));
    let item = doc.create_object("Item", at(2, 15));
    doc.add_object(delegate, item);

    let compiled = compile(&doc);
    assert_eq!(
        opcodes(&compiled.component),
        vec![
            Opcode::Init,
            Opcode::CreateObject,
            Opcode::CreateComponent,
            Opcode::Init,
            Opcode::CreateObject,
            Opcode::BeginObject,
            Opcode::SetDefault,
            Opcode::StoreObject,
            Opcode::SetDefault,
        ]
    );
    let ops = ops(&compiled.component);
    assert!(matches!(ops[2], Instruction::CreateComponent { count: 4, .. }));
    assert_eq!(ops[7], Instruction::StoreObject { property: LIST_VIEW_DELEGATE });

    let types = &compiled.component.types;
    assert_eq!(types.len(), 3);
    assert_eq!(types[2].class_name, "Component");
    assert_eq!(types[2].kind, ArtifactTypeKind::Native { type_id: 4 });
}

#[test]
fn test_deferred_property_block() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Loader", at(1, 1));
    doc.set_root(root);
    let source = doc.ensure_property(root, "sourceItem", loc(2, 5));
    let item = doc.create_object("Item", at(2, 17));
    let x = doc.ensure_property(item, "x", loc(2, 24));
    doc.add_literal(x, Literal::Number(1.0), loc(2, 27));
    doc.add_object(source, item);
    let width = doc.ensure_property(root, "width", loc(3, 5));
    doc.add_literal(width, Literal::Number(5.0), loc(3, 12));
    let keys = doc.ensure_property(root, "Keys", loc(4, 5));
    let scope = doc.ensure_sub_scope(keys);
    let enabled = doc.ensure_property(scope, "enabled", loc(4, 10));
    doc.add_literal(enabled, Literal::Bool(false), loc(4, 19));

    let compiled = compile(&doc);
    assert_eq!(
        opcodes(&compiled.component),
        vec![
            Opcode::Init,
            Opcode::CreateObject,
            Opcode::StoreDouble,
            Opcode::Defer,
            Opcode::Init,
            Opcode::CreateSimpleObject,
            Opcode::BeginObject,
            Opcode::StoreDouble,
            Opcode::StoreObject,
            Opcode::FetchAttached,
            Opcode::StoreBool,
            Opcode::PopFetchedObject,
            Opcode::SetDefault,
        ]
    );
    let ops = ops(&compiled.component);
    assert_eq!(ops[2], Instruction::StoreDouble { property: ITEM_WIDTH, value: 5.0 });
    assert_eq!(ops[3], Instruction::Defer { defer_count: 5 });
    assert_eq!(ops[7], Instruction::StoreDouble { property: ITEM_X, value: 1.0 });
    assert_eq!(ops[8], Instruction::StoreObject { property: LOADER_SOURCE_ITEM });

    // Skipping the block resumes at the first non-deferred instruction.
    let defer_pc = 3;
    let Instruction::Defer { defer_count } = ops[defer_pc] else {
        panic!("expected a deferred block");
    };
    assert_eq!(
        ops[defer_pc + 1 + defer_count as usize],
        Instruction::FetchAttached { id: KEYS_ATTACHED_ID }
    );
}

#[test]
fn test_plain_object_in_default_list_is_not_wrapped() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let label = doc.create_object("Text", at(2, 5));
    let text = doc.ensure_property(label, "text", loc(2, 12));
    doc.add_literal(text, Literal::String("hello".into()), loc(2, 18));
    let data = doc.ensure_default_property(root, loc(2, 5));
    doc.add_object(data, label);

    let compiled = compile(&doc);
    assert_eq!(count_ops(&compiled.component, |op| op.opcode() == Opcode::CreateComponent), 0);
    assert_eq!(count_ops(&compiled.component, |op| op.opcode() == Opcode::Init), 1);
    let ops = ops(&compiled.component);
    let fetch = ops
        .iter()
        .position(|op| matches!(op, Instruction::FetchList { property: ITEM_DATA, .. }))
        .expect("default list is fetched");
    assert!(matches!(
        ops[fetch + 1].opcode(),
        Opcode::CreateObject | Opcode::CreateSimpleObject
    ));
    assert_eq!(ops.last().map(Instruction::opcode), Some(Opcode::SetDefault));
    assert_eq!(count_ops(&compiled.component, |op| op.opcode() == Opcode::StoreObjectList), 1);
    assert_eq!(compiled.stats.len(), 1);
}

#[test]
fn test_deferred_property_with_id_is_not_deferred() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Loader", at(1, 1));
    doc.set_root(root);
    let source = doc.ensure_property(root, "sourceItem", loc(2, 5));
    let item = doc.create_object("Item", at(2, 17));
    let id = doc.ensure_property(item, "id", loc(2, 24));
    doc.add_script(id, "content", loc(2, 28));
    doc.add_object(source, item);

    let compiled = compile(&doc);
    assert_eq!(count_ops(&compiled.component, |op| op.opcode() == Opcode::Defer), 0);
}

#[test]
fn test_color_literal() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Rectangle", at(1, 1));
    doc.set_root(root);
    let color = doc.ensure_property(root, "color", loc(2, 5));
    doc.add_literal(color, Literal::String("#80112233".into()), loc(2, 12));

    let compiled = compile(&doc);
    assert_eq!(
        ops(&compiled.component)[2],
        Instruction::StoreColor {
            property: RECT_COLOR,
            value: 0x8011_2233,
        }
    );
}

#[test]
fn test_attached_property() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let keys = doc.ensure_property(root, "Keys", loc(2, 5));
    let scope = doc.ensure_sub_scope(keys);
    let enabled = doc.ensure_property(scope, "enabled", loc(2, 10));
    doc.add_literal(enabled, Literal::Bool(false), loc(2, 19));

    let compiled = compile(&doc);
    let ops = ops(&compiled.component);
    assert_eq!(
        ops[3..6],
        [
            Instruction::FetchAttached { id: KEYS_ATTACHED_ID },
            Instruction::StoreBool { property: 1, value: false },
            Instruction::PopFetchedObject,
        ]
    );
}

#[test]
fn test_value_type_sub_property() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Text", at(1, 1));
    doc.set_root(root);
    let font = doc.ensure_property(root, "font", loc(2, 5));
    let scope = doc.ensure_sub_scope(font);
    let size = doc.ensure_property(scope, "pixelSize", loc(2, 10));
    doc.add_literal(size, Literal::Number(12.0), loc(2, 21));

    let compiled = compile(&doc);
    let ops = ops(&compiled.component);
    assert_eq!(
        ops[2..5],
        [
            Instruction::FetchValueType {
                property: TEXT_FONT,
                value_type: FONT_TYPE,
                binding_skip_list: 0,
            },
            Instruction::StoreInteger { property: 0, value: 12 },
            Instruction::PopValueType {
                property: TEXT_FONT,
                value_type: FONT_TYPE,
            },
        ]
    );
}

#[test]
fn test_qualified_enum_folds_to_literal() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Text", at(1, 1));
    doc.set_root(root);
    let align = doc.ensure_property(root, "horizontalAlignment", loc(2, 5));
    doc.add_script(align, "Text.AlignRight", loc(2, 26));

    let compiled = compile(&doc);
    let ops = ops(&compiled.component);
    assert!(matches!(ops[0], Instruction::Init { bindings_size: 0, .. }));
    assert_eq!(ops[2], Instruction::StoreInteger { property: TEXT_HALIGN, value: 2 });
}

#[test]
fn test_enum_key_string_literal() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Text", at(1, 1));
    doc.set_root(root);
    let align = doc.ensure_property(root, "horizontalAlignment", loc(2, 5));
    doc.add_literal(align, Literal::String("AlignHCenter".into()), loc(2, 26));

    let compiled = compile(&doc);
    assert_eq!(
        ops(&compiled.component)[2],
        Instruction::StoreInteger { property: TEXT_HALIGN, value: 4 }
    );
}

#[test]
fn test_value_source() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let x = doc.ensure_property(root, "x", loc(2, 24));
    let animation = doc.create_object("NumberAnimation", at(2, 5));
    let to = doc.ensure_property(animation, "to", loc(2, 28));
    doc.add_literal(to, Literal::Number(50.0), loc(2, 32));
    doc.add_on_object(x, animation);

    let compiled = compile(&doc);
    let ops = ops(&compiled.component);
    assert!(matches!(ops[3], Instruction::CreateSimpleObject { create: 7, .. }));
    assert_eq!(ops[4], Instruction::StoreDouble { property: 1, value: 50.0 });
    let Instruction::StoreValueSource { property, owner, cast_value } = ops[5] else {
        panic!("expected a value source store");
    };
    assert_eq!((owner, cast_value), (0, ANIMATION_SOURCE_CAST));
    let target = SavedProperty::from_bytes(compiled.component.pool.data(property).unwrap()).unwrap();
    assert_eq!(target.core_index, ITEM_X);
}

#[test]
fn test_non_source_on_assignment() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let x = doc.ensure_property(root, "x", loc(2, 13));
    let rect = doc.create_object("Rectangle", at(2, 5));
    doc.add_on_object(x, rect);

    let errors = compile_errors(&doc);
    assert_eq!(errors, vec!["\"Rectangle\" cannot operate on \"x\"".to_string()]);
}

#[test]
fn test_custom_parser_data() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("ListModel", at(1, 1));
    doc.set_root(root);
    let fruit = doc.ensure_property(root, "fruit", loc(2, 5));
    doc.add_literal(fruit, Literal::String("apple".into()), loc(2, 12));
    let color = doc.ensure_property(root, "color", loc(3, 5));
    doc.add_literal(color, Literal::String("red".into()), loc(3, 12));

    let compiled = compile(&doc);
    let Instruction::CreateObject { data: Some(data), .. } = ops(&compiled.component)[1] else {
        panic!("expected custom data on creation");
    };
    assert_eq!(compiled.component.pool.data(data), Some(&b"fruit,color"[..]));
}

#[test]
fn test_custom_parser_errors() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("ListModel", at(1, 1));
    doc.set_root(root);
    let bad = doc.ensure_property(root, "bad", loc(2, 5));
    doc.add_literal(bad, Literal::Number(1.0), loc(2, 10));

    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    let err = compiler.compile(&doc).unwrap_err();
    assert_eq!(err.diagnostics()[0].to_string(), "file:///app/main.qml:2:5: bad role");
}

#[test]
fn test_read_only_property_on_custom_parser_type() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("ListModel", at(1, 1));
    doc.set_root(root);
    let count = doc.ensure_property(root, "count", loc(2, 5));
    doc.add_literal(count, Literal::Number(3.0), loc(2, 12));

    let errors = compile_errors(&doc);
    assert_eq!(
        errors,
        vec!["Invalid property assignment: \"count\" is a read-only property".to_string()]
    );
}

#[test]
fn test_signal_handler() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let handler = doc.ensure_property(root, "onClicked", loc(2, 5));
    doc.add_script(handler, " console.log(button) ", loc(2, 16));

    let compiled = compile(&doc);
    let component = &compiled.component;
    let Instruction::StoreSignal { value, context, name, .. } = ops(component)[3] else {
        panic!("expected a signal store");
    };
    assert_eq!(context, 0);
    assert_eq!(component.pool.string(value), Some("console.log(button)"));
    assert_eq!(component.pool.string(name), Some("onClicked"));
}

#[test]
fn test_empty_signal_handler() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let handler = doc.ensure_property(root, "onClicked", loc(2, 5));
    doc.add_script(handler, "   ", loc(2, 16));

    assert_eq!(compile_errors(&doc), vec!["Empty signal assignment".to_string()]);
}

#[test]
fn test_optimized_bindings() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let id = doc.ensure_property(root, "id", loc(2, 5));
    doc.add_script(id, "root", loc(2, 9));
    let child = doc.create_object("Item", at(3, 5));
    let width = doc.ensure_property(child, "width", loc(4, 9));
    doc.add_script(width, "root.width", loc(4, 16));
    let height = doc.ensure_property(child, "height", loc(5, 9));
    doc.add_script(height, "parent.height + 1", loc(5, 17));
    let data = doc.ensure_default_property(root, loc(3, 5));
    doc.add_object(data, child);

    let registry = registry();
    let mut compiler = Compiler::new(&registry).with_optimizer(Box::new(PathOptimizer::default()));
    let compiled = compiler.compile(&doc).unwrap();
    let component = &compiled.component;
    let ops = ops(component);

    let Instruction::Init { compiled_binding: Some(program), bindings_size: 2, .. } = ops[0] else {
        panic!("expected a linked binding program");
    };
    assert_eq!(component.pool.data(program), Some(&b"root.width"[..]));
    assert!(ops.contains(&Instruction::StoreCompiledBinding {
        property: ITEM_WIDTH,
        value: 0,
        context: 0,
        owner: 0,
    }));
    assert_eq!(count_ops(component, |op| op.opcode() == Opcode::StoreBinding), 1);
    assert_eq!(compiled.stats[0].optimized_bindings.len(), 1);
    assert_eq!(compiled.stats[0].script_bindings.len(), 1);
}

#[test]
fn test_optimizer_disabled_by_options() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let id = doc.ensure_property(root, "id", loc(2, 5));
    doc.add_script(id, "root", loc(2, 9));
    let width = doc.ensure_property(root, "width", loc(3, 5));
    doc.add_script(width, "root.height", loc(3, 12));

    let registry = registry();
    let options = CompilerOptions::default().with_optimized_bindings(false);
    let mut compiler = Compiler::with_options(&registry, options).with_optimizer(Box::new(PathOptimizer::default()));
    let compiled = compiler.compile(&doc).unwrap();
    assert_eq!(count_ops(&compiled.component, |op| op.opcode() == Opcode::StoreCompiledBinding), 0);
    assert_eq!(count_ops(&compiled.component, |op| op.opcode() == Opcode::StoreBinding), 1);
}

#[test]
fn test_duplicate_id() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let data = doc.ensure_default_property(root, loc(2, 5));
    for line in [2, 3] {
        let child = doc.create_object("Item", at(line, 5));
        let id = doc.ensure_property(child, "id", loc(line, 12));
        doc.add_script(id, "twin", loc(line, 16));
        doc.add_object(data, child);
    }

    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    let err = compiler.compile(&doc).unwrap_err();
    let diagnostic = &err.diagnostics()[0];
    assert_eq!(diagnostic.description, "id is not unique");
    assert_eq!((diagnostic.line, diagnostic.column), (3, 12));
}

#[test]
fn test_invalid_ids() {
    for (id, message) in [
        ("Foo", "IDs cannot start with an uppercase letter"),
        ("1abc", "IDs must start with a letter or underscore"),
        ("a-b", "IDs must contain only letters, numbers, and underscores"),
        ("eval", "ID illegally masks global JavaScript property"),
    ] {
        let mut doc = Document::new("file:///app/main.qml");
        let root = doc.create_object("Item", at(1, 1));
        doc.set_root(root);
        let prop = doc.ensure_property(root, "id", loc(2, 5));
        doc.add_script(prop, id, loc(2, 9));
        assert_eq!(compile_errors(&doc), vec![message.to_string()], "id {id}");
    }
}

#[test]
fn test_non_existent_property() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let bogus = doc.ensure_property(root, "bogus", loc(2, 5));
    doc.add_literal(bogus, Literal::Number(1.0), loc(2, 12));

    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    let err = compiler.compile(&doc).unwrap_err();
    assert_eq!(
        err.diagnostics()[0].to_string(),
        "file:///app/main.qml:2:5: Cannot assign to non-existent property \"bogus\""
    );
}

#[test]
fn test_errors_are_collected() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let bogus = doc.ensure_property(root, "bogus", loc(2, 5));
    doc.add_literal(bogus, Literal::Number(1.0), loc(2, 12));
    let child = doc.create_object("Item", at(3, 5));
    let other = doc.ensure_property(child, "other", loc(3, 12));
    doc.add_literal(other, Literal::Number(2.0), loc(3, 19));
    let data = doc.ensure_default_property(root, loc(3, 5));
    doc.add_object(data, child);

    let errors = compile_errors(&doc);
    assert_eq!(
        errors,
        vec![
            "Cannot assign to non-existent property \"bogus\"".to_string(),
            "Cannot assign to non-existent property \"other\"".to_string(),
        ]
    );
}

#[test]
fn test_multiple_values_on_singular_property() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let width = doc.ensure_property(root, "width", loc(2, 5));
    doc.add_literal(width, Literal::Number(1.0), loc(2, 12));
    doc.add_literal(width, Literal::Number(2.0), loc(3, 12));

    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    let err = compiler.compile(&doc).unwrap_err();
    let diagnostic = &err.diagnostics()[0];
    assert_eq!(diagnostic.description, "Cannot assign multiple values to a singular property");
    assert_eq!(diagnostic.line, 3);
}

#[test]
fn test_literal_type_mismatch() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Text", at(1, 1));
    doc.set_root(root);
    let text = doc.ensure_property(root, "text", loc(2, 5));
    doc.add_literal(text, Literal::Number(3.0), loc(2, 11));

    assert_eq!(
        compile_errors(&doc),
        vec!["Invalid property assignment: string expected".to_string()]
    );
}

#[test]
fn test_unknown_type() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Foo", at(1, 1));
    doc.set_root(root);

    let registry = registry();
    let mut compiler = Compiler::new(&registry);
    let err = compiler.compile(&doc).unwrap_err();
    assert_eq!(err.diagnostics()[0].to_string(), "file:///app/main.qml:1:1: Foo is not a type");
}

#[test]
fn test_uncreatable_type() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Keys", at(1, 1));
    doc.set_root(root);

    assert_eq!(
        compile_errors(&doc),
        vec!["Keys is only available via attached properties".to_string()]
    );
}

#[test]
fn test_empty_document() {
    let doc = Document::new("file:///app/main.qml");
    assert_eq!(compile_errors(&doc), vec!["Empty document".to_string()]);
}

#[test]
fn test_component_with_properties() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let component = doc.create_object("Component", at(2, 5));
    let width = doc.ensure_property(component, "width", loc(2, 17));
    doc.add_literal(width, Literal::Number(3.0), loc(2, 24));
    let body = doc.ensure_default_property(component, loc(2, 27));
    let inner = doc.create_object("Item", at(2, 27));
    doc.add_object(body, inner);
    let data = doc.ensure_default_property(root, loc(2, 5));
    doc.add_object(data, component);

    assert_eq!(
        compile_errors(&doc),
        vec!["Component elements may not contain properties other than id".to_string()]
    );
}

#[test]
fn test_grouped_value_assignment() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Text", at(1, 1));
    doc.set_root(root);
    let font = doc.ensure_property(root, "font", loc(2, 5));
    doc.add_script(font, "theme.font", loc(2, 11));
    let scope = doc.ensure_sub_scope(font);
    let bold = doc.ensure_property(scope, "bold", loc(3, 10));
    doc.add_literal(bold, Literal::Bool(true), loc(3, 16));

    assert_eq!(
        compile_errors(&doc),
        vec!["Property has already been assigned a value".to_string()]
    );
}

#[test]
fn test_synthesized_names_and_determinism() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    let count = doc.add_dynamic_property(root, "count", DynamicPropertyKind::Int, false, loc(2, 5));
    let init = doc.dynamic_property_value(root, count);
    doc.add_literal(init, Literal::Number(1.0), loc(2, 25));

    let registry = registry();
    let first = Compiler::new(&registry).compile(&doc).unwrap();
    let second = Compiler::new(&registry).compile(&doc).unwrap();
    assert_eq!(
        first.component.to_bytes().unwrap(),
        second.component.to_bytes().unwrap()
    );

    let mut session = Compiler::new(&registry);
    let names: Vec<String> = (0..2)
        .map(|_| {
            let compiled = session.compile(&doc).unwrap();
            let root = compiled.document.root().unwrap();
            let desc = compiled.document.object(root).ann.descriptor.clone().unwrap();
            desc.class_name
        })
        .collect();
    assert_eq!(names, vec!["Item_QML_0".to_string(), "Item_QML_1".to_string()]);
}

#[test]
fn test_seeded_type_names() {
    let mut doc = Document::new("file:///app/main.qml");
    let root = doc.create_object("Item", at(1, 1));
    doc.set_root(root);
    doc.add_dynamic_property(root, "flag", DynamicPropertyKind::Bool, false, loc(2, 5));

    let registry = registry();
    let options = CompilerOptions::default().with_type_name_seed(40);
    let compiled = Compiler::with_options(&registry, options).compile(&doc).unwrap();
    let desc = compiled.document.object(root).ann.descriptor.clone().unwrap();
    assert_eq!(desc.class_name, "Item_QML_40");
}

fn id_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z][a-z0-9_]{0,6}", 1..6)
        .prop_map(|ids| {
            ids.into_iter()
                .filter(|id| !RESERVED_GLOBALS.contains(&id.as_str()))
                .collect::<Vec<_>>()
        })
        .prop_filter("at least one id", |ids| !ids.is_empty())
        .prop_shuffle()
}

proptest! {
    #[test]
    fn test_id_indices_follow_document_order(ids in id_list()) {
        let mut doc = Document::new("file:///app/main.qml");
        let root = doc.create_object("Item", at(1, 1));
        doc.set_root(root);
        let data = doc.ensure_default_property(root, loc(2, 5));
        for (line, id) in ids.iter().enumerate() {
            let line = line as u32 + 2;
            let child = doc.create_object("Item", at(line, 5));
            let prop = doc.ensure_property(child, "id", loc(line, 12));
            doc.add_script(prop, id, loc(line, 16));
            doc.add_object(data, child);
        }

        let compiled = compile(&doc);
        let expected: Vec<(String, u32)> = ids.iter().cloned().zip(0..).collect();
        prop_assert_eq!(compiled.component.context_caches[0].ids(), &expected[..]);
    }
}
