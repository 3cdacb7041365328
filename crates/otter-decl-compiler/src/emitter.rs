//! Instruction emission
//!
//! Turns a resolved tree into the linear instruction stream. Object bodies
//! are emitted in a fixed order; `Defer` and `CreateComponent` lengths are
//! patched once their contents are known.

use std::mem;

use tracing::trace;

use otter_decl_bytecode::{DataIndex, Instruction, SavedProperty, StringIndex, TypeIndex};

use crate::compiler::Compiler;
use crate::error::CompileResult;
use crate::meta::PropertyType;
use crate::state::{BindingKind, CompileState};
use crate::tree::{ObjectId, PropertyId, ValueId, ValueKind};

/// Owning property of a value-type sub-property: (index, type code)
type ValueTypeOwner = Option<(u32, u32)>;

/// Pack a value-type sub-property target for optimized bindings
fn pack_value_type_target(owner_index: u32, owner_type: u32, sub_index: u32) -> u32 {
    (owner_index & 0xFFFF) | ((owner_type & 0xFF) << 16) | ((sub_index & 0xFF) << 24)
}

impl<'r> Compiler<'r> {
    fn intern(&mut self, s: &str) -> StringIndex {
        self.output.pool.add_string(s)
    }

    fn blob(&mut self, bytes: &[u8]) -> DataIndex {
        self.output.pool.add_data(bytes)
    }

    pub(crate) fn gen_object(&mut self, obj: ObjectId) -> CompileResult<()> {
        let node = self.doc.object(obj);
        let location = node.location.start;
        let Some(type_index) = node.type_index else {
            return Ok(());
        };
        if node
            .ann
            .meta
            .as_ref()
            .is_some_and(|m| self.is_component_meta(m))
        {
            return self.gen_component(obj);
        }

        let ty = &self.types[type_index];
        let simple = match &ty.native {
            Some(native) if ty.composite.is_none() && !native.extended => native
                .create_function
                .filter(|_| node.ann.custom_data.is_none() && self.state.root != Some(obj))
                .map(|create| (create, native.create_size)),
            _ => None,
        };
        let is_composite = ty.composite.is_some();

        let create = match simple {
            Some((create, type_size)) => Instruction::CreateSimpleObject {
                type_index: TypeIndex::new(type_index as u32),
                create,
                type_size,
                column: location.column,
            },
            None => {
                let custom = node.ann.custom_data.clone();
                let bits = node.ann.binding_bits.clone();
                let data = custom.map(|d| self.blob(&d));
                let binding_bits = (is_composite && !bits.is_empty()).then(|| self.blob(&bits));
                Instruction::CreateObject {
                    type_index: TypeIndex::new(type_index as u32),
                    data,
                    binding_bits,
                    column: location.column,
                }
            }
        };
        self.output.emit(location.line, create);

        let is_unit_root = self.unit_root == Some(obj);
        if self.doc.object(obj).ann.descriptor.is_some() {
            let property_cache = self.gen_meta_object(obj, true)?;
            if is_unit_root && self.output.root_property_cache.is_none() {
                self.output.root_property_cache = property_cache;
            }
        } else if is_unit_root && self.output.root_property_cache.is_none() {
            let cache = (*self.types[type_index].cache).clone();
            self.output.root_property_cache = Some(self.output.add_property_cache(cache));
        }

        self.gen_set_id(obj);

        if let Some(cast_value) = self.doc.object(obj).ann.parser_status_cast {
            self.output.emit(location.line, Instruction::BeginObject { cast_value });
        }

        self.gen_object_body(obj)
    }

    /// Attach a synthesized type, returns the registered property cache
    fn gen_meta_object(&mut self, obj: ObjectId, with_cache: bool) -> CompileResult<Option<u32>> {
        let node = self.doc.object(obj);
        let line = node.location.start.line;
        let (Some(desc), Some(synth)) = (&node.ann.descriptor, &node.ann.synth_data) else {
            return Ok(None);
        };
        let (desc_bytes, synth_bytes) = (desc.to_bytes()?, synth.to_bytes()?);
        let cache = node.ann.synth_cache.clone().filter(|_| with_cache);

        let data = self.blob(&desc_bytes);
        let alias_data = self.blob(&synth_bytes);
        let property_cache = cache.map(|c| self.output.add_property_cache((*c).clone()));
        self.output.emit(
            line,
            Instruction::StoreMetaObject {
                data,
                alias_data,
                property_cache,
            },
        );
        Ok(property_cache)
    }

    fn gen_set_id(&mut self, obj: ObjectId) {
        let ann = &self.doc.object(obj).ann;
        let line = self.doc.object(obj).location.start.line;
        if let (Some(id), Some(index)) = (ann.id.clone(), ann.id_index) {
            let value = self.intern(&id);
            self.output.emit(line, Instruction::SetId { value, index });
        }
    }

    fn gen_object_body(&mut self, obj: ObjectId) -> CompileResult<()> {
        let ann = self.doc.object(obj).ann.clone();

        for (prop, scope) in &ann.script_string_properties {
            let p = self.doc.property(*prop);
            let (line, property) = (p.location.line, p.ann.index.unwrap_or_default());
            let script = p
                .values
                .first()
                .map(|v| self.doc.value(*v).content.as_script())
                .unwrap_or_default();
            let value = self.intern(&script);
            self.output.emit(
                line,
                Instruction::StoreScriptString {
                    property,
                    value,
                    scope: *scope,
                },
            );
        }

        let mut seen_defer = false;
        for prop in &ann.value_properties {
            let p = &self.doc.property(*prop).ann;
            if p.is_deferred {
                seen_defer = true;
            } else if !p.is_alias {
                self.gen_value_property(*prop)?;
            }
        }

        if seen_defer {
            let line = self.doc.object(obj).location.start.line;
            let defer_index = self.output.emit(line, Instruction::Defer { defer_count: 0 });
            self.output.emit(
                line,
                Instruction::Init {
                    bindings_size: self.state.bindings.len() as u32,
                    parser_status_size: self.state.parser_status_count,
                    context_cache: None,
                    compiled_binding: None,
                },
            );
            for prop in &ann.value_properties {
                if self.doc.property(*prop).ann.is_deferred {
                    self.gen_value_property(*prop)?;
                }
            }
            let count = (self.output.next_index() - defer_index - 1) as u32;
            if let Some(Instruction::Defer { defer_count }) = self.output.instruction_mut(defer_index) {
                *defer_count = count;
            }
        }

        for prop in &ann.signal_properties {
            self.gen_signal(*prop)?;
        }

        for prop in &ann.attached_properties {
            let p = self.doc.property(*prop);
            let (line, id, sub) = (p.location.line, p.ann.index.unwrap_or_default(), p.value);
            self.output.emit(line, Instruction::FetchAttached { id });
            if let Some(sub) = sub {
                self.gen_object_body(sub)?;
            }
            self.output.emit(line, Instruction::PopFetchedObject);
        }

        for prop in &ann.grouped_properties {
            let p = self.doc.property(*prop);
            let (line, property, sub) = (p.location.line, p.ann.index.unwrap_or_default(), p.value);
            self.output.emit(line, Instruction::FetchObject { property });
            if let Some(sub) = sub {
                self.gen_meta_object(sub, false)?;
                self.gen_object_body(sub)?;
            }
            self.output.emit(line, Instruction::PopFetchedObject);
        }

        for prop in &ann.value_type_properties {
            if !self.doc.property(*prop).ann.is_alias {
                self.gen_value_type_property(obj, *prop)?;
            }
        }

        for prop in &ann.value_properties {
            if self.doc.property(*prop).ann.is_alias {
                self.gen_value_property(*prop)?;
            }
        }

        for prop in &ann.value_type_properties {
            if self.doc.property(*prop).ann.is_alias {
                self.gen_value_type_property(obj, *prop)?;
            }
        }
        Ok(())
    }

    fn gen_signal(&mut self, prop: PropertyId) -> CompileResult<()> {
        let p = self.doc.property(prop);
        let (name, signal_index) = (p.name.clone(), p.ann.index.unwrap_or_default());
        let Some(value) = p.values.first().copied() else {
            return Ok(());
        };
        let v = self.doc.value(value);
        let line = v.location.line;
        match (v.ann.kind, v.content.as_object()) {
            (Some(ValueKind::SignalObject), Some(child)) => {
                self.gen_object(child)?;
                let signal = self.intern(&name);
                self.output.emit(line, Instruction::AssignSignalObject { signal });
            }
            _ => {
                let script = v.content.as_script();
                let context = self
                    .state
                    .signal_expressions
                    .get(&value)
                    .map(|ctx| ctx.stack)
                    .unwrap_or_default();
                let value = self.intern(script.trim());
                let name = self.intern(&name);
                self.output.emit(
                    line,
                    Instruction::StoreSignal {
                        signal_index,
                        value,
                        context,
                        name,
                    },
                );
            }
        }
        Ok(())
    }

    fn gen_value_property(&mut self, prop: PropertyId) -> CompileResult<()> {
        if self.doc.property(prop).ann.ty.as_ref().is_some_and(PropertyType::is_list) {
            self.gen_list_property(prop)
        } else {
            self.gen_property_assignment(prop, None)
        }
    }

    fn gen_value_type_property(&mut self, obj: ObjectId, prop: PropertyId) -> CompileResult<()> {
        let p = self.doc.property(prop);
        let line = p.location.line;
        let property = p.ann.index.unwrap_or_default();
        let value_type = p.ann.ty.as_ref().map(PropertyType::code).unwrap_or_default();
        let Some(sub) = p.value else {
            return Ok(());
        };
        let sub_props = self.doc.object(sub).ann.value_properties.clone();

        // Native types cannot carry bindings on these fields yet.
        let owner_type = self.doc.object(obj).type_index;
        let needs_skip_list = owner_type.is_none_or(|t| self.types[t].composite.is_some());
        let mut binding_skip_list = 0u32;
        if needs_skip_list {
            for vprop in &sub_props {
                let vp = self.doc.property(*vprop);
                if let Some(bit) = vp.ann.index.filter(|i| *i < 32 && !vp.values.is_empty()) {
                    binding_skip_list |= 1 << bit;
                }
            }
        }

        self.output.emit(
            line,
            Instruction::FetchValueType {
                property,
                value_type,
                binding_skip_list,
            },
        );
        for vprop in sub_props {
            self.gen_property_assignment(vprop, Some((property, value_type)))?;
        }
        self.output
            .emit(line, Instruction::PopValueType { property, value_type });
        Ok(())
    }

    fn gen_list_property(&mut self, prop: PropertyId) -> CompileResult<()> {
        let p = self.doc.property(prop);
        let line = p.location.line;
        let property = p.ann.index.unwrap_or_default();
        let element = p
            .ann
            .ty
            .as_ref()
            .and_then(PropertyType::list_element)
            .unwrap_or_default()
            .to_string();
        let values = p.values.clone();
        let is_interface = self.registry.is_interface(&element);
        let element_type = self.intern(&element);

        self.output.emit(
            line,
            Instruction::FetchList {
                property,
                element_type,
                is_interface,
            },
        );
        for value in values {
            let v = self.doc.value(value);
            let value_line = v.location.line;
            match (v.ann.kind, v.content.as_object()) {
                (Some(ValueKind::CreatedObject), Some(child)) => {
                    self.gen_object(child)?;
                    let store = if is_interface {
                        Instruction::AssignObjectList
                    } else {
                        Instruction::StoreObjectList
                    };
                    self.output.emit(value_line, store);
                }
                (Some(ValueKind::PropertyBinding), _) => self.gen_binding_assignment(value, prop, None)?,
                _ => {}
            }
        }
        self.output.emit(line, Instruction::PopList);
        Ok(())
    }

    fn gen_property_assignment(&mut self, prop: PropertyId, owner: ValueTypeOwner) -> CompileResult<()> {
        let p = self.doc.property(prop);
        let property = p.ann.index.unwrap_or_default();
        let ty = p.ann.ty.clone().unwrap_or(PropertyType::Variant);
        let (values, on_values) = (p.values.clone(), p.on_values.clone());

        for value in values {
            let v = self.doc.value(value);
            let line = v.location.line;
            match (v.ann.kind, v.content.as_object()) {
                (Some(ValueKind::CreatedObject), Some(child)) => {
                    self.gen_object(child)?;
                    let store = match &ty {
                        PropertyType::Object(class) if self.registry.is_interface(class) => {
                            Instruction::StoreInterface { property }
                        }
                        PropertyType::Variant => Instruction::StoreVariantObject { property },
                        _ => Instruction::StoreObject { property },
                    };
                    self.output.emit(line, store);
                }
                (Some(ValueKind::PropertyBinding), _) => self.gen_binding_assignment(value, prop, owner)?,
                (Some(ValueKind::Literal), _) => {
                    if let Some(literal) = v.ann.literal.clone() {
                        let store = literal.to_instruction(property, &mut self.output);
                        self.output.emit(line, store);
                    }
                }
                _ => {}
            }
        }

        for value in on_values {
            let v = self.doc.value(value);
            let line = v.location.line;
            let (Some(kind), Some(child)) = (v.ann.kind, v.content.as_object()) else {
                continue;
            };
            self.gen_object(child)?;
            let saved = match owner {
                Some((owner_index, owner_type)) => {
                    SavedProperty::value_type(owner_index, owner_type, property, ty.code())
                }
                None => SavedProperty::new(property, ty.code()),
            };
            let data = self.blob(&saved.to_bytes());
            let registered = self.to_registered_type(child);
            let owner_flag = u32::from(owner.is_some());
            let store = match kind {
                ValueKind::ValueSource => Instruction::StoreValueSource {
                    property: data,
                    owner: owner_flag,
                    cast_value: registered.and_then(|t| t.value_source_cast).unwrap_or_default(),
                },
                ValueKind::ValueInterceptor => Instruction::StoreValueInterceptor {
                    property: data,
                    owner: owner_flag,
                    cast_value: registered.and_then(|t| t.value_interceptor_cast).unwrap_or_default(),
                },
                _ => continue,
            };
            self.output.emit(line, store);
        }
        Ok(())
    }

    fn gen_binding_assignment(&mut self, value: ValueId, prop: PropertyId, owner: ValueTypeOwner) -> CompileResult<()> {
        let Some(reference) = self.state.bindings.get(&value).cloned() else {
            return Ok(());
        };
        let line = self.doc.value(value).location.line;
        let p = self.doc.property(prop);
        let property = p.ann.index.unwrap_or_default();
        let type_code = p.ann.ty.as_ref().map(PropertyType::code).unwrap_or_default();
        let is_alias = p.ann.is_alias;
        let (context, binding_owner) = (reference.context.stack, reference.context.owner);

        match reference.kind {
            BindingKind::Optimized(index) => {
                let property = match owner {
                    Some((owner_index, owner_type)) => pack_value_type_target(owner_index, owner_type, property),
                    None => property,
                };
                self.output.emit(
                    line,
                    Instruction::StoreCompiledBinding {
                        property,
                        value: index,
                        context,
                        owner: binding_owner,
                    },
                );
            }
            BindingKind::Script(payload) => {
                let saved = match owner {
                    Some((owner_index, owner_type)) => {
                        SavedProperty::value_type(owner_index, owner_type, property, type_code)
                    }
                    None => SavedProperty::new(property, type_code),
                };
                let value = self.blob(&payload.encode());
                let property = self.blob(&saved.to_bytes());
                let store = if is_alias {
                    Instruction::StoreBindingOnAlias {
                        property,
                        value,
                        context,
                        owner: binding_owner,
                    }
                } else {
                    Instruction::StoreBinding {
                        property,
                        value,
                        context,
                        owner: binding_owner,
                    }
                };
                self.output.emit(line, store);
            }
            BindingKind::Pending => {}
        }
        Ok(())
    }

    fn gen_component(&mut self, obj: ObjectId) -> CompileResult<()> {
        let node = self.doc.object(obj);
        let (start, end_line) = (node.location.start, node.location.end.line);
        let root = node
            .default_property
            .and_then(|d| self.doc.property(d).values.first().copied())
            .and_then(|v| self.doc.value(v).content.as_object());
        let Some(root) = root else {
            return Ok(());
        };
        trace!(line = start.line, "emitting nested component");

        let create_index = self.output.emit(
            start.line,
            Instruction::CreateComponent {
                count: 0,
                end_line,
                column: start.column,
            },
        );

        let saved = self.saved_states.get(&root).cloned();
        debug_assert!(saved.is_some(), "component state saved before emission");
        let outer = mem::replace(&mut self.state, saved.unwrap_or_else(|| CompileState::with_root(root)));

        let context_cache = self.gen_context_cache();
        let compiled_binding = self.state.compiled_binding_data.clone().map(|data| self.blob(&data));
        self.output.emit(
            start.line,
            Instruction::Init {
                bindings_size: self.state.bindings.len() as u32,
                parser_status_size: self.state.parser_status_count,
                context_cache,
                compiled_binding,
            },
        );
        let body = self.gen_object(root);
        self.output.emit(start.line, Instruction::SetDefault);
        let count = (self.output.next_index() - create_index - 1) as u32;
        if let Some(Instruction::CreateComponent { count: slot, .. }) = self.output.instruction_mut(create_index) {
            *slot = count;
        }
        self.state = outer;
        body?;

        self.gen_set_id(obj);

        if self.unit_root == Some(obj) && self.output.root_property_cache.is_none() {
            if let Some(t) = self.doc.object(obj).type_index {
                let cache = (*self.types[t].cache).clone();
                self.output.root_property_cache = Some(self.output.add_property_cache(cache));
            }
        }
        Ok(())
    }
}
