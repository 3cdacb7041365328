//! Dynamic type synthesis
//!
//! Objects declaring properties, signals or methods get a descriptor layered
//! on their static type. Synthesis runs twice: the structural pass fixes the
//! slot layout with placeholder alias slots, the alias pass fills in alias
//! targets once every id of the component is known.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::trace;

use otter_decl_bytecode::{
    AliasTarget, DynamicTypeDescriptor, MethodSlot, PropertySlot, SignalSlot, SlotStorage, SynthesisData,
    ALIAS_FLAG_PTR,
};

use crate::compiler::Compiler;
use crate::error::{Reported, Step};
use crate::meta::{self, MetaObject, PropertyType};
use crate::resolver::Lookup;
use crate::rewrite::alias_path;
use crate::tree::{DynamicProperty, DynamicPropertyKind, Location, ObjectId, SynthState};

/// How far to take synthesis for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SynthMode {
    /// Structural pass: alias slots stay unresolved
    IgnoreAliases,
    /// Alias pass: fill in alias targets
    ResolveAliases,
    /// Synthesize even without declared members
    ForceCreation,
}

const INVALID_ALIAS_REFERENCE: &str = "Invalid alias reference. An alias reference must be specified as <id>, <id>.<property> or <id>.<value property>.<property>";

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn value_kind_type(kind: &DynamicPropertyKind) -> Option<PropertyType> {
    Some(match kind {
        DynamicPropertyKind::Variant => PropertyType::Variant,
        DynamicPropertyKind::Int => PropertyType::Int,
        DynamicPropertyKind::Bool => PropertyType::Bool,
        DynamicPropertyKind::Real => PropertyType::Double,
        DynamicPropertyKind::String => PropertyType::String,
        DynamicPropertyKind::Url => PropertyType::Url,
        DynamicPropertyKind::Color => PropertyType::Color,
        DynamicPropertyKind::Time => PropertyType::Time,
        DynamicPropertyKind::Date => PropertyType::Date,
        DynamicPropertyKind::DateTime => PropertyType::DateTime,
        DynamicPropertyKind::Alias | DynamicPropertyKind::Custom(_) | DynamicPropertyKind::CustomList(_) => {
            return None;
        }
    })
}

/// Registered class name behind a possibly synthesized type, as a pointer type
fn object_alias_type_name(meta: &Arc<MetaObject>) -> String {
    let mut current = meta.clone();
    while current.class_name().contains("_QMLTYPE_") {
        match current.super_class() {
            Some(super_class) => current = super_class.clone(),
            None => break,
        }
    }
    let name = current.class_name();
    let base = name.find("_QML_").map_or(name, |idx| &name[..idx]);
    format!("{base}*")
}

impl<'r> Compiler<'r> {
    /// Reject duplicate, capitalized or reserved member names
    pub(crate) fn check_dynamic_meta(&mut self, obj: ObjectId) -> Step {
        let node = self.doc.object(obj);
        let properties = node.dynamic_properties.clone();
        let signals = node.dynamic_signals.clone();
        let methods = node.dynamic_methods.clone();

        let mut seen_default = false;
        let mut names = FxHashSet::default();
        for p in &properties {
            if p.is_default {
                if seen_default {
                    return Err(self.error(p.location, "Duplicate default property"));
                }
                seen_default = true;
            }
            if !names.insert(p.name.as_str()) {
                return Err(self.error(p.location, "Duplicate property name"));
            }
            if starts_uppercase(&p.name) {
                return Err(self.error(p.location, "Property names cannot begin with an upper case letter"));
            }
            if self.registry.is_reserved_name(&p.name) {
                return Err(self.error(p.location, "Illegal property name"));
            }
        }

        let mut method_names = FxHashSet::default();
        for s in &signals {
            if !method_names.insert(s.name.as_str()) {
                return Err(self.error(s.location, "Duplicate signal name"));
            }
            if starts_uppercase(&s.name) {
                return Err(self.error(s.location, "Signal names cannot begin with an upper case letter"));
            }
            if self.registry.is_reserved_name(&s.name) {
                return Err(self.error(s.location, "Illegal signal name"));
            }
        }
        for m in &methods {
            if !method_names.insert(m.name.as_str()) {
                return Err(self.error(m.location, "Duplicate method name"));
            }
            if starts_uppercase(&m.name) {
                return Err(self.error(m.location, "Method names cannot begin with an upper case letter"));
            }
            if self.registry.is_reserved_name(&m.name) {
                return Err(self.error(m.location, "Illegal method name"));
            }
        }
        Ok(())
    }

    /// Move declaration initializers into ordinary property assignments
    pub(crate) fn merge_dynamic_meta_properties(&mut self, obj: ObjectId) -> Step {
        let declared: Vec<DynamicProperty> = self.doc.object(obj).dynamic_properties.clone();
        for p in declared {
            if p.kind == DynamicPropertyKind::Alias {
                continue;
            }
            let Some(initializer) = p.default_value else {
                continue;
            };
            let target = if p.is_default {
                self.doc.ensure_default_property(obj, p.location)
            } else {
                self.doc.ensure_property(obj, &p.name, p.location)
            };
            let existing = self.doc.property(target);
            let location = existing.location;
            if !p.is_default && !existing.values.is_empty() {
                return Err(self.error(location, "Property value set multiple times"));
            }
            if existing.value.is_some() {
                return Err(self.error(location, "Invalid property nesting"));
            }
            let values = self.doc.property(initializer).values.clone();
            self.doc.property_mut(target).values.extend(values);
        }
        Ok(())
    }

    /// Build or refresh the synthesized type of an object
    pub(crate) fn build_dynamic_meta(&mut self, obj: ObjectId, mode: SynthMode) -> Step {
        let node = self.doc.object(obj);
        if mode != SynthMode::ForceCreation && !node.has_dynamic_members() {
            return Ok(());
        }
        let Some(static_meta) = node.ann.meta.clone() else {
            return Ok(());
        };
        let resolve_aliases = mode == SynthMode::ResolveAliases;
        let properties = node.dynamic_properties.clone();
        let signals = node.dynamic_signals.clone();
        let methods = node.dynamic_methods.clone();
        let type_index = node.type_index;
        let previous_class = node.ann.descriptor.as_ref().map(|d| d.class_name.clone());

        for p in &properties {
            let overrides_final = static_meta
                .index_of_property(&p.name)
                .and_then(|i| static_meta.property(i))
                .is_some_and(|mp| mp.is_final);
            if overrides_final {
                return Err(self.error(p.location, "Cannot override FINAL property"));
            }
        }

        if resolve_aliases {
            self.doc.object_mut(obj).ann.synth_state = SynthState::AliasPass;
        }

        let class_name = match previous_class {
            Some(name) => name,
            None => self.synthesized_class_name(obj, &static_meta),
        };
        let mut desc = DynamicTypeDescriptor::new(class_name, static_meta.class_name());
        let mut data = SynthesisData::default();

        // Value slots, then alias slots; each slot's notify signal shares its position.
        let (values, aliases): (Vec<&DynamicProperty>, Vec<&DynamicProperty>) =
            properties.iter().partition(|p| p.kind != DynamicPropertyKind::Alias);
        for p in &values {
            let (type_name, storage, writable) = match &p.kind {
                DynamicPropertyKind::Custom(name) => {
                    let class = self.resolve_property_class(name, p.location)?;
                    (format!("{class}*"), SlotStorage::Object, true)
                }
                DynamicPropertyKind::CustomList(name) => {
                    let class = self.resolve_property_class(name, p.location)?;
                    (format!("list<{class}>"), SlotStorage::List, false)
                }
                kind => {
                    let ty = value_kind_type(kind).unwrap_or(PropertyType::Variant);
                    let storage = SlotStorage::Value { type_code: ty.code() };
                    (ty.name(), storage, true)
                }
            };
            if p.is_default {
                desc.default_property = Some(p.name.clone());
            }
            desc.properties.push(PropertySlot {
                name: p.name.clone(),
                type_name,
                storage,
                writable,
                notify_signal: desc.signals.len() as u32,
            });
            desc.signals.push(SignalSlot::notify(format!("{}Changed", p.name)));
        }
        data.value_property_count = values.len() as u32;

        for p in &aliases {
            let (type_name, target, writable) = if resolve_aliases {
                let (type_name, target, writable) = self.compile_alias(obj, p)?;
                data.aliases.push(target);
                (type_name, Some(target), writable)
            } else {
                (String::new(), None, false)
            };
            if p.is_default && resolve_aliases {
                desc.default_property = Some(p.name.clone());
            }
            desc.properties.push(PropertySlot {
                name: p.name.clone(),
                type_name,
                storage: SlotStorage::Alias(target),
                writable,
                notify_signal: desc.signals.len() as u32,
            });
            desc.signals.push(SignalSlot::notify(format!("{}Changed", p.name)));
        }

        for s in &signals {
            desc.signals.push(SignalSlot {
                name: s.name.clone(),
                parameter_types: s.parameter_types.clone(),
                parameter_names: s.parameter_names.clone(),
            });
        }
        data.signal_count = signals.len() as u32;

        for m in &methods {
            desc.methods.push(MethodSlot {
                name: m.name.clone(),
                parameter_names: m.parameter_names.clone(),
            });
            let body = format!("(function {}({}) {})", m.name, m.parameter_names.join(","), m.body);
            data.push_method(m.parameter_names.len() as u32, &body, m.location.line);
        }

        if mode == SynthMode::IgnoreAliases && !aliases.is_empty() && !self.state.aliasing_objects.contains(&obj) {
            self.state.aliasing_objects.push(obj);
        }

        let synth_meta = MetaObject::from_descriptor(static_meta, &desc);
        let synth_cache = type_index.map(|t| Arc::new(meta::dynamic_property_cache(&self.types[t].cache, &synth_meta, &desc)));

        let ann = &mut self.doc.object_mut(obj).ann;
        ann.synth_state = if aliases.is_empty() || resolve_aliases {
            SynthState::Final
        } else {
            SynthState::StructuralPass
        };
        ann.synth_meta = Some(synth_meta);
        ann.synth_cache = synth_cache;
        ann.descriptor = Some(desc);
        ann.synth_data = Some(data);
        Ok(())
    }

    fn synthesized_class_name(&mut self, obj: ObjectId, static_meta: &MetaObject) -> String {
        let index = self.next_type_name_index();
        if self.state.root == Some(obj) {
            let file = self.doc.url.rsplit('/').next().unwrap_or_default();
            let base = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
            if starts_uppercase(base) {
                let name = format!("{base}_QMLTYPE_{index}");
                trace!(%name, "synthesized type name");
                return name;
            }
        }
        let name = format!("{}_QML_{index}", static_meta.class_name());
        trace!(%name, "synthesized type name");
        name
    }

    /// Class name for an object-typed declaration
    fn resolve_property_class(&mut self, type_name: &str, at: Location) -> Step<String> {
        if let Some(ty) = self.registry.resolve_type(type_name) {
            return Ok(ty.meta.class_name().to_string());
        }
        let composite = self
            .types
            .iter()
            .find(|t| t.name == type_name)
            .map(|t| t.meta.class_name().to_string());
        composite.ok_or_else(|| self.error(at, "Invalid property type"))
    }

    /// Resolve an alias declaration to its target
    ///
    /// Returns the exposed type name, target and writability.
    fn compile_alias(&mut self, obj: ObjectId, p: &DynamicProperty) -> Step<(String, AliasTarget, bool)> {
        let Some(location_prop) = p.default_value else {
            let at = self.doc.object(obj).location.start;
            return Err(self.error(at, "No property alias location"));
        };
        let holder = self.doc.property(location_prop);
        let at = holder.location;
        let source = match holder.values.as_slice() {
            [value] if self.doc.value(*value).content.is_script() => self.doc.value(*value).content.as_string(),
            _ => return Err(self.error(at, "Invalid alias location")),
        };

        let path = alias_path(&source);
        if path.is_empty() || path.len() > 3 {
            return Err(self.error(at, INVALID_ALIAS_REFERENCE));
        }
        let Some(target_obj) = self.state.id_object(&path[0]) else {
            return Err(self.error(at, format!("Invalid alias reference. Unable to find id \"{}\"", path[0])));
        };
        let target_node = self.doc.object(target_obj);
        let context_index = target_node.ann.id_index.unwrap_or_default();
        let Some(target_meta) = target_node.ann.effective_meta().cloned() else {
            return Err(self.error(at, "Invalid alias location"));
        };

        let (type_name, property_index, writable, type_code) = if path.len() == 1 {
            let type_name = object_alias_type_name(&target_meta);
            let type_code = PropertyType::from_name(&type_name).code();
            (type_name, None, false, type_code)
        } else {
            let (index, mut aliased) = match self.property_index(target_obj, &path[1]) {
                Lookup::Found(found) => found,
                Lookup::NotInRevision => return Err(self.not_in_revision(target_obj, &path[1], at)),
                Lookup::Missing => return Err(self.error(at, "Invalid alias location")),
            };
            if !aliased.scriptable {
                return Err(self.error(at, "Invalid alias location"));
            }
            if index > 0xFFFF {
                return Err(self.error(at, "Alias property exceeds alias bounds"));
            }
            let writable = aliased.writable;
            let mut encoded = index;
            if let Some(sub_name) = path.get(2) {
                let Some(value_type) = self.registry.value_type(&aliased.ty) else {
                    return Err(self.error(at, "Invalid alias location"));
                };
                let Some((sub_index, sub)) = value_type
                    .index_of_property(sub_name)
                    .and_then(|i| Some((i, value_type.property(i)?.clone())))
                    .filter(|(_, sub)| sub.scriptable)
                else {
                    return Err(self.error(at, "Invalid alias location"));
                };
                if sub_index > 0xFF {
                    return Err(self.error(at, "Alias property exceeds alias bounds"));
                }
                encoded = AliasTarget::encode_property(index, Some((sub_index, aliased.ty.code())));
                aliased = sub;
            }
            let ty = if aliased.is_enum_type() {
                PropertyType::Int
            } else {
                aliased.ty.clone()
            };
            (ty.name(), Some(encoded), writable, ty.code())
        };

        let flags = if type_name.ends_with('*') { ALIAS_FLAG_PTR } else { 0 };
        Ok((
            type_name,
            AliasTarget {
                context_index,
                property_index,
                flags,
                type_code,
            },
            writable,
        ))
    }

    /// Run the alias pass over every object queued by the structural pass
    pub(crate) fn resolve_aliases(&mut self) -> Step {
        let pending = self.state.aliasing_objects.clone();
        let mut result = Ok(());
        for obj in pending {
            if self.build_dynamic_meta(obj, SynthMode::ResolveAliases).is_err() {
                result = Err(Reported);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_alias_type_name_strips_suffix() {
        let item = MetaObject::builder("Item").build();
        let synth = MetaObject::from_descriptor(item.clone(), &DynamicTypeDescriptor::new("Item_QML_4", "Item"));
        assert_eq!(object_alias_type_name(&synth), "Item*");

        let typed = MetaObject::from_descriptor(item, &DynamicTypeDescriptor::new("Button_QMLTYPE_2", "Item"));
        assert_eq!(object_alias_type_name(&typed), "Item*");
    }

    #[test]
    fn test_value_kind_types() {
        assert_eq!(value_kind_type(&DynamicPropertyKind::Real), Some(PropertyType::Double));
        assert_eq!(value_kind_type(&DynamicPropertyKind::Alias), None);
        assert_eq!(value_kind_type(&DynamicPropertyKind::Custom("Item".into())), None);
    }
}
