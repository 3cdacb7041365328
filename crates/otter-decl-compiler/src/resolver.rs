//! Tree resolution pass
//!
//! Walks the object tree depth first, resolving every property against the
//! owning object's (possibly synthesized) type, classifying every value and
//! collecting ids, bindings and signal handlers into the component state.
//! Errors are recorded per property; resolution moves on to the next sibling
//! so one compile reports as many independent problems as possible.

use std::mem;
use std::sync::Arc;

use tracing::trace;

use crate::compiler::Compiler;
use crate::custom::{custom_property, CustomParserContext};
use crate::error::{Reported, Step};
use crate::literal::{check_literal, LiteralStore};
use crate::meta::{MetaObject, MetaProperty, PropertyType};
use crate::state::{BindingContext, BindingKind, BindingReference, CompileState, ComponentStats};
use crate::synth::SynthMode;
use crate::tree::{Document, Literal, Location, ObjectId, PropertyId, ValueContent, ValueId, ValueKind};

/// Outcome of a name lookup on an object's type
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lookup<T> {
    Found(T),
    /// Exists, but not in the imported minor version
    NotInRevision,
    Missing,
}

/// `onSomething`
pub(crate) fn is_signal_property_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 3 && name.starts_with("on") && bytes[2].is_ascii_uppercase()
}

/// `Something.` prefix of an attached property
pub(crate) fn is_attached_property_name(name: &str) -> bool {
    name.as_bytes().first().is_some_and(u8::is_ascii_uppercase)
}

impl<'r> Compiler<'r> {
    // ==================== Lookups ====================

    /// Resolve a property name on an object, honoring revision filtering
    pub(crate) fn property_index(&self, obj: ObjectId, name: &str) -> Lookup<(u32, MetaProperty)> {
        let node = self.doc.object(obj);
        let Some(meta) = node.ann.effective_meta() else {
            return Lookup::Missing;
        };
        let cache = node
            .ann
            .synth_cache
            .clone()
            .or_else(|| node.type_index.map(|t| self.types[t].cache.clone()));
        match cache {
            Some(cache) => match cache.find_property(name) {
                Some(entry) if !cache.is_allowed_in_revision(entry) => Lookup::NotInRevision,
                Some(entry) => match meta.property(entry.core_index) {
                    Some(p) => Lookup::Found((entry.core_index, p.clone())),
                    None => Lookup::Missing,
                },
                None => Lookup::Missing,
            },
            None => match meta.index_of_property(name).and_then(|i| Some((i, meta.property(i)?.clone()))) {
                Some(found) => Lookup::Found(found),
                None => Lookup::Missing,
            },
        }
    }

    /// Resolve a signal name on an object
    ///
    /// `xChanged` falls back to the notify signal of property `x`.
    pub(crate) fn signal_index(&self, obj: ObjectId, name: &str) -> Lookup<u32> {
        let node = self.doc.object(obj);
        let Some(meta) = node.ann.effective_meta() else {
            return Lookup::Missing;
        };
        let cache = node
            .ann
            .synth_cache
            .clone()
            .or_else(|| node.type_index.map(|t| self.types[t].cache.clone()));
        let Some(cache) = cache else {
            return match meta.index_of_signal(name) {
                Some(index) => Lookup::Found(index),
                None => Lookup::Missing,
            };
        };
        match cache.property(name) {
            Some(entry) if !cache.is_allowed_in_revision(entry) => return Lookup::NotInRevision,
            Some(entry) if entry.flags.is_function => return Lookup::Found(entry.core_index),
            _ => {}
        }
        if let Some(property) = name.strip_suffix("Changed") {
            return match self.property_index(obj, property) {
                Lookup::Found((_, p)) => p.notify.map_or(Lookup::Missing, Lookup::Found),
                Lookup::NotInRevision => Lookup::NotInRevision,
                Lookup::Missing => Lookup::Missing,
            };
        }
        Lookup::Missing
    }

    pub(crate) fn not_in_revision(&mut self, obj: ObjectId, name: &str, at: Location) -> Reported {
        let description = match self.doc.object(obj).type_index.map(|t| &self.types[t]) {
            Some(ty) => match (&ty.native, &ty.composite) {
                (Some(native), None) => format!(
                    "\"{}.{}\" is not available in {} {}.{}.",
                    ty.name, name, native.module, native.major_version, native.minor_version
                ),
                _ => format!("\"{}.{}\" is not available due to component versioning.", ty.name, name),
            },
            None => format!("\"{name}\" is not available due to component versioning."),
        };
        self.error(at, description)
    }

    pub(crate) fn meta_property(&self, obj: ObjectId, index: u32) -> Option<MetaProperty> {
        self.doc.object(obj).ann.effective_meta()?.property(index).cloned()
    }

    /// Type of a class, native or defined by a compiled document
    pub(crate) fn meta_for_class(&self, class_name: &str) -> Option<Arc<MetaObject>> {
        self.registry.meta_for_class(class_name).or_else(|| {
            self.types
                .iter()
                .find(|t| t.composite.is_some() && t.meta.class_name() == class_name)
                .map(|t| t.meta.clone())
        })
    }

    fn does_property_exist(&self, prop: PropertyId, obj: ObjectId) -> bool {
        let node = self.doc.property(prop);
        if is_attached_property_name(&node.name) || node.name == "id" {
            return true;
        }
        let Some(meta) = self.doc.object(obj).ann.effective_meta() else {
            return false;
        };
        if node.is_default {
            meta.default_property().is_some()
        } else {
            meta.index_of_property(&node.name)
                .and_then(|i| meta.property(i))
                .is_some_and(|p| p.scriptable)
        }
    }

    fn can_coerce(&self, class_name: &str, obj: ObjectId) -> bool {
        self.doc
            .object(obj)
            .ann
            .effective_meta()
            .is_some_and(|m| m.inherits(class_name))
    }

    fn set_kind(&mut self, value: ValueId, kind: ValueKind) {
        self.doc.value_mut(value).ann.kind = Some(kind);
    }

    fn resolved(&mut self, prop: PropertyId) -> Step<(u32, MetaProperty)> {
        let node = self.doc.property(prop);
        let (location, parent, name) = (node.location, node.parent, node.name.clone());
        match node.ann.index.and_then(|i| Some((i, self.meta_property(parent, i)?))) {
            Some(found) => Ok(found),
            None => Err(self.error(location, format!("Cannot assign to non-existent property \"{name}\""))),
        }
    }

    fn read_only(&mut self, at: Location, name: &str) -> Reported {
        self.error(at, format!("Invalid property assignment: \"{name}\" is a read-only property"))
    }

    // ==================== Objects ====================

    /// Resolve an object and everything below it
    ///
    /// Properties of the object always start a fresh binding context; `_ctx`
    /// is the context of the assignment that created it.
    pub(crate) fn build_object(&mut self, obj: ObjectId, _ctx: BindingContext) -> Step {
        self.stats.objects += 1;

        let type_index = self.doc.object(obj).type_index;
        if let Some(t) = type_index {
            let meta = self.types[t].meta.clone();
            self.doc.object_mut(obj).ann.meta = Some(meta);
        }
        let is_component = self
            .doc
            .object(obj)
            .ann
            .meta
            .as_ref()
            .is_some_and(|m| self.is_component_meta(m));
        if is_component {
            return self.build_component(obj);
        }

        let errors_before = self.diagnostics.len();
        let obj_ctx = BindingContext::new(obj);

        self.check_dynamic_meta(obj)?;
        self.merge_dynamic_meta_properties(obj)?;
        self.build_dynamic_meta(obj, SynthMode::IgnoreAliases)?;

        let native = type_index.and_then(|t| self.types[t].native.clone());
        if let Some(cast) = native.as_ref().and_then(|n| n.parser_status_cast) {
            self.doc.object_mut(obj).ann.parser_status_cast = Some(cast);
            self.state.parser_status_count += 1;
        }
        let parser = native.as_ref().and_then(|n| n.custom_parser.clone());
        let deferred = self
            .doc
            .object(obj)
            .ann
            .effective_meta()
            .map(|m| m.deferred_properties())
            .unwrap_or_default();

        // Ids go first so id indices follow instantiation order.
        if let Some(id_prop) = self.doc.object(obj).properties.get("id").copied() {
            let _ = self.build_property(id_prop, obj, obj_ctx);
        }

        let (default_prop, skip_prop) = self.merge_default_property(obj);

        let mut custom_props = Vec::new();
        let explicit: Vec<PropertyId> = self.doc.object(obj).properties.values().copied().collect();
        for prop in explicit {
            let name = self.doc.property(prop).name.clone();
            if Some(prop) == skip_prop || name == "id" {
                continue;
            }
            let ids_before = self.state.ids.len();
            let built = match &parser {
                Some(cp) => {
                    if self.does_property_exist(prop, obj)
                        && !(cp.accepts_attached_properties() && is_attached_property_name(&name))
                    {
                        self.build_property(prop, obj, obj_ctx).is_ok()
                    } else {
                        custom_props.push(prop);
                        false
                    }
                }
                None if is_signal_property_name(&name) => {
                    let _ = self.build_signal(prop, obj, obj_ctx);
                    false
                }
                None => self.build_property(prop, obj, obj_ctx).is_ok(),
            };
            if built && ids_before == self.state.ids.len() {
                self.mark_deferred(prop, &deferred);
            }
        }

        if let Some(prop) = default_prop {
            let ids_before = self.state.ids.len();
            let built = if parser.is_some() && !self.does_property_exist(prop, obj) {
                custom_props.push(prop);
                false
            } else {
                self.build_property(prop, obj, obj_ctx).is_ok()
            };
            if built && ids_before == self.state.ids.len() {
                self.mark_deferred(prop, &deferred);
            }
        }

        if let Some(cp) = parser.filter(|_| !custom_props.is_empty()) {
            let converted: Vec<_> = custom_props.iter().map(|p| custom_property(&self.doc, *p)).collect();
            let mut parser_ctx = CustomParserContext::new(self.registry, &self.doc.url);
            let data = cp.compile(&mut parser_ctx, &converted);
            let errors = parser_ctx.into_errors();
            self.diagnostics.extend(errors);
            self.doc.object_mut(obj).ann.custom_data = Some(data);
        }

        if self.diagnostics.len() > errors_before {
            Err(Reported)
        } else {
            Ok(())
        }
    }

    fn mark_deferred(&mut self, prop: PropertyId, deferred: &[String]) {
        let node = self.doc.property_mut(prop);
        if deferred.iter().any(|d| *d == node.name) {
            node.ann.is_deferred = true;
        }
    }

    /// Fold an explicit assignment to the default property's real name into
    /// the default-property slot, values in source order
    fn merge_default_property(&mut self, obj: ObjectId) -> (Option<PropertyId>, Option<PropertyId>) {
        let node = self.doc.object(obj);
        let Some(default) = node.default_property else {
            return (None, None);
        };
        let Some(name) = node
            .ann
            .effective_meta()
            .and_then(|m| m.default_property())
            .map(|(_, p)| p.name.clone())
        else {
            return (Some(default), None);
        };
        let explicit = match node.properties.get(&name) {
            Some(explicit) if self.doc.property(*explicit).value.is_none() => *explicit,
            _ => return (Some(default), None),
        };
        let mut values = self.doc.property(default).values.clone();
        values.extend(self.doc.property(explicit).values.iter().copied());
        values.sort_by_key(|v| self.doc.value(*v).location);
        self.doc.property_mut(default).values = values;
        (Some(default), Some(explicit))
    }

    fn build_component(&mut self, obj: ObjectId) -> Step {
        let node = self.doc.object(obj);
        let at = node.location.start;
        let props: Vec<(String, PropertyId)> = node.properties.iter().map(|(k, v)| (k.clone(), *v)).collect();

        if props.len() > 1 || props.first().is_some_and(|(name, _)| name != "id") {
            let first = self.doc.property(props[0].1).location;
            return Err(self.error(first, "Component elements may not contain properties other than id"));
        }

        if let Some((_, id_prop)) = props.first() {
            let p = self.doc.property(*id_prop);
            let location = p.location;
            let single = match p.values.as_slice() {
                [value] if p.value.is_none() && self.doc.value(*value).content.as_object().is_none() => Some(*value),
                _ => None,
            };
            let Some(value) = single else {
                return Err(self.error(location, "Invalid component id specification"));
            };
            let id = self.doc.value(value).content.as_string();
            self.check_valid_id(value, &id)?;
            if self.state.ids.contains_key(&id) {
                return Err(self.error(location, "id is not unique"));
            }
            self.add_id(&id, obj);
        }

        let node = self.doc.object(obj);
        if let Some(default) = node.default_property {
            let dp = self.doc.property(default);
            let body_is_object = dp
                .values
                .first()
                .is_some_and(|v| self.doc.value(*v).content.as_object().is_some());
            if dp.value.is_some() || dp.values.len() > 1 || (dp.values.len() == 1 && !body_is_object) {
                return Err(self.error(at, "Invalid component body specification"));
            }
        }
        if !node.dynamic_properties.is_empty() {
            return Err(self.error(at, "Component objects cannot declare new properties."));
        }
        if !node.dynamic_signals.is_empty() {
            return Err(self.error(at, "Component objects cannot declare new signals."));
        }
        if !node.dynamic_methods.is_empty() {
            return Err(self.error(at, "Component objects cannot declare new functions."));
        }

        let root = node
            .default_property
            .and_then(|d| self.doc.property(d).values.first().copied())
            .and_then(|v| self.doc.value(v).content.as_object());
        let Some(root) = root else {
            return Err(self.error(at, "Cannot create empty component specification"));
        };
        self.build_component_from_root(root)
    }

    fn build_component_from_root(&mut self, root: ObjectId) -> Step {
        let line = self.doc.object(root).location.start.line;
        trace!(line, "building nested component");
        let outer_state = mem::replace(&mut self.state, CompileState::with_root(root));
        let outer_stats = mem::replace(
            &mut self.stats,
            ComponentStats {
                line,
                ..ComponentStats::default()
            },
        );
        let result = self
            .build_object(root, BindingContext::new(root))
            .and_then(|()| self.complete_component_build());
        self.state = outer_state;
        self.stats = outer_stats;
        result
    }

    fn build_sub_object(&mut self, obj: ObjectId, ctx: BindingContext) -> Step {
        debug_assert!(ctx.is_sub_context());
        let props: Vec<PropertyId> = self.doc.object(obj).properties.values().copied().collect();
        let mut result = Ok(());
        for prop in props {
            let step = if is_signal_property_name(&self.doc.property(prop).name) {
                self.build_signal(prop, obj, ctx)
            } else {
                self.build_property(prop, obj, ctx)
            };
            if step.is_err() {
                result = Err(Reported);
            }
        }
        result
    }

    fn build_signal(&mut self, prop: PropertyId, obj: ObjectId, ctx: BindingContext) -> Step {
        let prop_name = self.doc.property(prop).name.clone();
        let location = self.doc.property(prop).location;
        let mut name = prop_name[2..].to_string();
        if let Some(first) = name.get(0..1) {
            let lower = first.to_ascii_lowercase();
            name.replace_range(0..1, &lower);
        }

        let index = match self.signal_index(obj, &name) {
            Lookup::Found(index) => index,
            lookup => {
                if lookup == Lookup::NotInRevision
                    && !matches!(self.property_index(obj, &prop_name), Lookup::Found(_))
                {
                    return Err(self.not_in_revision(obj, &name, location));
                }
                // Not a signal; `onFoo` may still be an ordinary property.
                return self.build_property(prop, obj, ctx);
            }
        };

        let p = self.doc.property(prop);
        let value = match p.values.as_slice() {
            [value] if p.value.is_none() => *value,
            _ => return Err(self.error(location, "Incorrectly specified signal assignment")),
        };
        self.doc.property_mut(prop).ann.index = Some(index);
        self.doc.object_mut(obj).ann.signal_properties.push(prop);

        match self.doc.value(value).content.clone() {
            ValueContent::Object(child) => {
                self.build_object(child, ctx)?;
                self.set_kind(value, ValueKind::SignalObject);
            }
            content => {
                self.set_kind(value, ValueKind::SignalExpression);
                if !content.is_script() {
                    return Err(self.error(
                        location,
                        "Cannot assign a value to a signal (expecting a script to be run)",
                    ));
                }
                if content.as_script().trim().is_empty() {
                    return Err(self.error(location, "Empty signal assignment"));
                }
                self.state.signal_expressions.insert(value, ctx);
            }
        }
        Ok(())
    }

    // ==================== Properties ====================

    pub(crate) fn build_property(&mut self, prop: PropertyId, obj: ObjectId, ctx: BindingContext) -> Step {
        let p = self.doc.property(prop);
        let (name, location, is_default) = (p.name.clone(), p.location, p.is_default);
        if p.value.is_none() && p.values.is_empty() && p.on_values.is_empty() {
            return Err(self.error(location, "Empty property assignment"));
        }

        if is_attached_property_name(&name) {
            if ctx.is_sub_context() {
                return Err(self.error(location, "Attached properties cannot be used here"));
            }
            if self.registry.is_namespace(&name) {
                return self.build_property_in_namespace(&name, prop, obj, ctx);
            }
            let Some(attached) = self.registry.resolve_type(&name).and_then(|t| t.attached.clone()) else {
                return Err(self.error(location, "Non-existent attached object"));
            };
            let Some(sub) = self.doc.property(prop).value else {
                return Err(self.error(location, "Invalid attached object assignment"));
            };
            self.doc.property_mut(prop).ann.index = Some(attached.id);
            self.doc.object_mut(sub).ann.meta = Some(attached.meta);
        } else {
            let found = if is_default {
                self.doc
                    .object(obj)
                    .ann
                    .effective_meta()
                    .and_then(|m| m.default_property())
                    .map(|(i, p)| (i, p.clone()))
            } else {
                match self.property_index(obj, &name) {
                    Lookup::Found(found) => Some(found),
                    Lookup::NotInRevision => return Err(self.not_in_revision(obj, &name, location)),
                    Lookup::Missing => None,
                }
            };

            if let Some((index, mp)) = found {
                let is_alias = self
                    .doc
                    .object(obj)
                    .type_index
                    .and_then(|t| self.types[t].composite.as_ref())
                    .is_some_and(|c| c.root_cache.is_alias(index));
                let node = self.doc.property_mut(prop);
                node.name = mp.name.clone();
                node.ann.ty = Some(mp.ty.clone());
                if mp.scriptable {
                    node.ann.index = Some(index);
                    node.ann.is_alias |= is_alias;
                    if !node.values.is_empty() {
                        self.doc.object_mut(obj).ann.set_binding_bit(index);
                    }
                }
            }
        }

        let p = self.doc.property(prop);
        let (name, index, ty, has_sub_scope) = (p.name.clone(), p.ann.index, p.ann.ty.clone(), p.value.is_some());

        if !is_default && name == "id" && !ctx.is_sub_context() {
            // A real string `id` property also receives the literal.
            let assign = ty == Some(PropertyType::String)
                && matches!(p.values.as_slice(), [v] if self.doc.value(*v).content.is_string());
            self.build_id_property(prop, obj, assign)?;
            if assign {
                self.build_property_assignment(prop, obj, ctx)?;
            }
            Ok(())
        } else if is_attached_property_name(&name) {
            self.build_attached_property(prop, obj, ctx)
        } else if index.is_none() {
            if is_default {
                let at = p
                    .values
                    .first()
                    .map(|v| self.doc.value(*v).location)
                    .unwrap_or(location);
                Err(self.error(at, "Cannot assign to non-existent default property"))
            } else {
                Err(self.error(location, format!("Cannot assign to non-existent property \"{name}\"")))
            }
        } else if has_sub_scope {
            self.build_grouped_property(prop, obj, ctx)
        } else if ty.as_ref().is_some_and(PropertyType::is_list) {
            self.build_list_property(prop, obj, ctx)
        } else if ty == Some(PropertyType::ScriptString) {
            self.build_script_string_property(prop, obj, ctx)
        } else {
            self.build_property_assignment(prop, obj, ctx)
        }
    }

    fn build_property_in_namespace(
        &mut self,
        namespace: &str,
        ns_prop: PropertyId,
        obj: ObjectId,
        ctx: BindingContext,
    ) -> Step {
        let location = self.doc.property(ns_prop).location;
        let Some(scope) = self.doc.property(ns_prop).value else {
            return Err(self.error(location, "Invalid use of namespace"));
        };
        let props: Vec<PropertyId> = self.doc.object(scope).properties.values().copied().collect();
        for prop in props {
            let name = self.doc.property(prop).name.clone();
            let at = self.doc.property(prop).location;
            if !is_attached_property_name(&name) {
                return Err(self.error(at, "Not an attached property name"));
            }
            let Some(attached) = self
                .registry
                .resolve_in_namespace(namespace, &name)
                .and_then(|t| t.attached.clone())
            else {
                return Err(self.error(at, "Non-existent attached object"));
            };
            let Some(sub) = self.doc.property(prop).value else {
                return Err(self.error(at, "Invalid attached object assignment"));
            };
            self.doc.property_mut(prop).ann.index = Some(attached.id);
            self.doc.object_mut(sub).ann.meta = Some(attached.meta);
            self.build_attached_property(prop, obj, ctx)?;
        }
        Ok(())
    }

    fn build_id_property(&mut self, prop: PropertyId, obj: ObjectId, keep_literal: bool) -> Step {
        let p = self.doc.property(prop);
        let location = p.location;
        let value = match p.values.as_slice() {
            [value] if p.value.is_none() && self.doc.value(*value).content.as_object().is_none() => *value,
            _ => return Err(self.error(location, "Invalid use of id property")),
        };
        let id = self.doc.value(value).content.as_string();
        self.check_valid_id(value, &id)?;
        if self.state.ids.contains_key(&id) {
            return Err(self.error(location, "id is not unique"));
        }
        if !keep_literal {
            self.set_kind(value, ValueKind::Id);
        }
        self.add_id(&id, obj);
        Ok(())
    }

    fn check_valid_id(&mut self, value: ValueId, id: &str) -> Step {
        let at = self.doc.value(value).location;
        let mut chars = id.chars();
        let Some(first) = chars.next() else {
            return Err(self.error(at, "Invalid empty ID"));
        };
        if first.is_alphabetic() && !first.is_lowercase() {
            return Err(self.error(at, "IDs cannot start with an uppercase letter"));
        }
        if !first.is_alphabetic() && first != '_' {
            return Err(self.error(at, "IDs must start with a letter or underscore"));
        }
        if chars.any(|c| !c.is_alphanumeric() && c != '_') {
            return Err(self.error(at, "IDs must contain only letters, numbers, and underscores"));
        }
        if self.registry.is_reserved_name(id) {
            return Err(self.error(at, "ID illegally masks global JavaScript property"));
        }
        Ok(())
    }

    fn add_id(&mut self, id: &str, obj: ObjectId) {
        let index = self.state.add_id(id, obj);
        let ann = &mut self.doc.object_mut(obj).ann;
        ann.id = Some(id.to_string());
        ann.id_index = Some(index);
    }

    fn build_attached_property(&mut self, prop: PropertyId, obj: ObjectId, ctx: BindingContext) -> Step {
        let location = self.doc.property(prop).location;
        let Some(sub) = self.doc.property(prop).value else {
            return Err(self.error(location, "Invalid attached object assignment"));
        };
        self.doc.object_mut(obj).ann.attached_properties.push(prop);
        self.build_sub_object(sub, ctx.incr())
    }

    fn build_grouped_property(&mut self, prop: PropertyId, obj: ObjectId, ctx: BindingContext) -> Step {
        let (index, mp) = self.resolved(prop)?;
        let p = self.doc.property(prop);
        let (location, first_value, is_alias) = (p.location, p.values.first().copied(), p.ann.is_alias);
        let Some(sub) = p.value else {
            return Err(self.error(location, "Invalid grouped property access"));
        };

        if let Some(value_type) = self.registry.value_type(&mp.ty) {
            if let Some(first) = first_value {
                let at = self.doc.value(first).location;
                return Err(self.error(at, "Property has already been assigned a value"));
            }
            if !self.meta_property(obj, index).is_some_and(|m| m.writable) {
                return Err(self.read_only(location, &mp.name));
            }
            if is_alias {
                let sub_props: Vec<PropertyId> = self.doc.object(sub).properties.values().copied().collect();
                for sub_prop in sub_props {
                    self.doc.property_mut(sub_prop).ann.is_alias = true;
                }
            }
            self.build_value_type_property(value_type, sub, obj, ctx.incr())?;
            self.doc.object_mut(obj).ann.value_type_properties.push(prop);
        } else {
            let meta = match &mp.ty {
                PropertyType::Object(class) => self.meta_for_class(class),
                _ => None,
            };
            let Some(meta) = meta else {
                return Err(self.error(location, "Invalid grouped property access"));
            };
            self.doc.object_mut(sub).ann.meta = Some(meta);
            if let Some(first) = first_value {
                let at = self.doc.value(first).location;
                return Err(self.error(at, "Cannot assign a value directly to a grouped property"));
            }
            self.doc.object_mut(obj).ann.grouped_properties.push(prop);
            self.build_sub_object(sub, ctx.incr())?;
        }
        Ok(())
    }

    fn build_value_type_property(
        &mut self,
        value_type: Arc<MetaObject>,
        obj: ObjectId,
        base_obj: ObjectId,
        ctx: BindingContext,
    ) -> Step {
        if self.doc.object(obj).default_property.is_some() {
            let at = self.doc.object(obj).location.start;
            return Err(self.error(at, "Invalid property use"));
        }
        self.doc.object_mut(obj).ann.meta = Some(value_type.clone());

        let props: Vec<PropertyId> = self.doc.object(obj).properties.values().copied().collect();
        for prop in props {
            let p = self.doc.property(prop);
            let (name, location) = (p.name.clone(), p.location);
            let found = value_type
                .index_of_property(&name)
                .and_then(|i| Some((i, value_type.property(i)?.clone())))
                .filter(|(_, mp)| mp.scriptable);
            let Some((index, mp)) = found else {
                return Err(self.error(location, format!("Cannot assign to non-existent property \"{name}\"")));
            };
            let node = self.doc.property_mut(prop);
            node.ann.index = Some(index);
            node.ann.ty = Some(mp.ty.clone());
            node.ann.is_value_type_sub_property = true;

            let p = self.doc.property(prop);
            if p.value.is_some() {
                return Err(self.error(location, "Property assignment expected"));
            }
            if p.values.len() > 1 {
                return Err(self.error(location, "Single property assignment expected"));
            }
            let on_values = p.on_values.clone();
            if let Some(value) = p.values.first().copied() {
                match self.doc.value(value).content.clone() {
                    ValueContent::Object(_) => {
                        return Err(self.error(location, "Unexpected object assignment"));
                    }
                    ValueContent::Script(_) => {
                        let folded = mp.is_enum_type() && self.test_qualified_enum_assignment(&mp, obj, value)?;
                        if folded {
                            self.set_kind(value, ValueKind::Literal);
                        } else {
                            let mut context = ctx;
                            context.owner += 1;
                            self.state.add_binding_reference(BindingReference {
                                value,
                                property: prop,
                                context,
                                kind: BindingKind::Pending,
                            });
                            self.set_kind(value, ValueKind::PropertyBinding);
                        }
                    }
                    ValueContent::Literal(_) => {
                        let store = self.test_literal_assignment(&mp, value)?;
                        self.doc.value_mut(value).ann.literal = Some(store);
                        self.set_kind(value, ValueKind::Literal);
                    }
                }
            }
            for on_value in on_values {
                self.build_property_on_assignment(prop, obj, base_obj, on_value, ctx)?;
            }
            self.doc.object_mut(obj).ann.value_properties.push(prop);
        }
        Ok(())
    }

    fn build_list_property(&mut self, prop: PropertyId, obj: ObjectId, ctx: BindingContext) -> Step {
        self.doc.object_mut(obj).ann.value_properties.push(prop);
        let element = self
            .doc
            .property(prop)
            .ann
            .ty
            .as_ref()
            .and_then(PropertyType::list_element)
            .map(str::to_string)
            .unwrap_or_default();
        let is_interface = self.registry.is_interface(&element);

        let mut assigned_binding = false;
        let values = self.doc.property(prop).values.clone();
        for value in values {
            let at = self.doc.value(value).location;
            match self.doc.value(value).content.clone() {
                ValueContent::Object(child) => {
                    self.set_kind(value, ValueKind::CreatedObject);
                    self.build_object(child, ctx)?;
                    // Interface lists are checked when the object is appended.
                    if !is_interface && !self.can_coerce(&element, child) {
                        return Err(self.error(at, "Cannot assign object to list"));
                    }
                }
                ValueContent::Script(_) => {
                    if assigned_binding {
                        return Err(self.error(at, "Can only assign one binding to lists"));
                    }
                    assigned_binding = true;
                    self.build_binding(value, prop, ctx)?;
                    self.set_kind(value, ValueKind::PropertyBinding);
                }
                ValueContent::Literal(_) => {
                    return Err(self.error(at, "Cannot assign primitives to lists"));
                }
            }
        }
        Ok(())
    }

    fn build_script_string_property(&mut self, prop: PropertyId, obj: ObjectId, ctx: BindingContext) -> Step {
        let p = self.doc.property(prop);
        let location = p.location;
        if let Some(second) = p.values.get(1) {
            let at = self.doc.value(*second).location;
            return Err(self.error(at, "Cannot assign multiple values to a script property"));
        }
        match p.values.first() {
            Some(v) if self.doc.value(*v).content.as_object().is_none() => {}
            Some(v) => {
                let at = self.doc.value(*v).location;
                return Err(self.error(at, "Invalid property assignment: script expected"));
            }
            None => return Err(self.error(location, "Invalid property assignment: script expected")),
        }
        self.doc
            .object_mut(obj)
            .ann
            .script_string_properties
            .push((prop, ctx.stack));
        Ok(())
    }

    fn build_property_assignment(&mut self, prop: PropertyId, obj: ObjectId, ctx: BindingContext) -> Step {
        self.doc.object_mut(obj).ann.value_properties.push(prop);
        let p = self.doc.property(prop);
        if let Some(second) = p.values.get(1) {
            let at = self.doc.value(*second).location;
            return Err(self.error(at, "Cannot assign multiple values to a singular property"));
        }
        let (values, on_values) = (p.values.clone(), p.on_values.clone());
        for value in values {
            if self.doc.value(value).content.as_object().is_some() {
                self.build_property_object_assignment(prop, obj, value, ctx)?;
            } else {
                self.build_property_literal_assignment(prop, obj, value, ctx)?;
            }
        }
        for value in on_values {
            self.build_property_on_assignment(prop, obj, obj, value, ctx)?;
        }
        Ok(())
    }

    fn build_property_object_assignment(
        &mut self,
        prop: PropertyId,
        obj: ObjectId,
        value: ValueId,
        ctx: BindingContext,
    ) -> Step {
        let (_, mp) = self.resolved(prop)?;
        let at = self.doc.value(value).location;
        if !mp.writable {
            return Err(self.read_only(at, &mp.name));
        }
        let Some(child) = self.doc.value(value).content.as_object() else {
            return Err(self.error(at, "Cannot assign object to property"));
        };

        let is_interface = matches!(&mp.ty, PropertyType::Object(class) if self.registry.is_interface(class));
        if is_interface || mp.ty == PropertyType::Variant {
            self.build_object(child, ctx)?;
            self.set_kind(value, ValueKind::CreatedObject);
            return Ok(());
        }

        // The static type decides assignability; synthesized members do not.
        let child_meta = self.doc.object(child).type_index.map(|t| self.types[t].meta.clone());
        self.doc.object_mut(child).ann.meta = child_meta.clone();
        let target = match &mp.ty {
            PropertyType::Object(class) => Some(class.clone()),
            _ => None,
        };
        let assignable = match (&target, &child_meta) {
            (Some(class), Some(meta)) => meta.inherits(class),
            _ => false,
        };

        if assignable {
            self.build_object(child, ctx)?;
            self.set_kind(value, ValueKind::CreatedObject);
            return Ok(());
        }

        let wants_component = target.as_deref().is_some_and(|class| {
            self.registry
                .component_type()
                .is_some_and(|c| c.meta.class_name() == class)
        });
        let child_at = self.doc.object(child).location.start;
        if !wants_component {
            return Err(self.error(child_at, "Cannot assign object to property"));
        }
        let Some(component_type) = self.component_type_ref() else {
            return Err(self.error(child_at, "Cannot assign object to property"));
        };

        let location = self.doc.object(child).location;
        let wrapper = self
            .doc
            .push_object(Document::new_object_node(Some(component_type), location));
        let body = self.doc.ensure_default_property(wrapper, location.start);
        self.doc.add_object(body, child);
        self.doc.value_mut(value).content = ValueContent::Object(wrapper);
        trace!(line = location.start.line, "wrapped object in implicit component");
        self.build_property_object_assignment(prop, obj, value, ctx)
    }

    fn build_property_on_assignment(
        &mut self,
        prop: PropertyId,
        obj: ObjectId,
        base_obj: ObjectId,
        value: ValueId,
        ctx: BindingContext,
    ) -> Step {
        let (_, mp) = self.resolved(prop)?;
        let at = self.doc.value(value).location;
        if !mp.writable {
            return Err(self.read_only(at, &mp.name));
        }
        let Some(child) = self.doc.value(value).content.as_object() else {
            return Err(self.error(at, "Invalid property assignment"));
        };
        let type_index = self.doc.object(child).type_index;
        let child_meta = type_index.map(|t| self.types[t].meta.clone());
        self.doc.object_mut(child).ann.meta = child_meta;

        let registered = self.to_registered_type(child);
        let is_source = registered.as_ref().is_some_and(|t| t.value_source_cast.is_some());
        let is_interceptor = registered.as_ref().is_some_and(|t| t.value_interceptor_cast.is_some());

        if !is_source && !is_interceptor {
            let type_name = type_index
                .and_then(|t| self.doc.types.get(t))
                .map(|t| t.name.clone())
                .unwrap_or_default();
            let prop_name = self.doc.property(prop).name.clone();
            return Err(self.error(at, format!("\"{type_name}\" cannot operate on \"{prop_name}\"")));
        }

        self.build_object(child, ctx)?;
        // Interceptors need a synthesized type on the real owner to hook into.
        if is_interceptor && self.doc.object(base_obj).ann.synth_data.is_none() {
            self.build_dynamic_meta(base_obj, SynthMode::ForceCreation)?;
        }
        let kind = if is_source {
            ValueKind::ValueSource
        } else {
            ValueKind::ValueInterceptor
        };
        self.set_kind(value, kind);
        Ok(())
    }

    fn build_property_literal_assignment(
        &mut self,
        prop: PropertyId,
        obj: ObjectId,
        value: ValueId,
        ctx: BindingContext,
    ) -> Step {
        let (_, mp) = self.resolved(prop)?;
        if self.doc.value(value).content.is_script() {
            let folded = mp.is_enum_type() && self.test_qualified_enum_assignment(&mp, obj, value)?;
            if folded {
                self.set_kind(value, ValueKind::Literal);
            } else {
                self.build_binding(value, prop, ctx)?;
                self.set_kind(value, ValueKind::PropertyBinding);
            }
        } else {
            let store = self.test_literal_assignment(&mp, value)?;
            self.doc.value_mut(value).ann.literal = Some(store);
            self.set_kind(value, ValueKind::Literal);
        }
        Ok(())
    }

    fn test_literal_assignment(&mut self, mp: &MetaProperty, value: ValueId) -> Step<LiteralStore> {
        let node = self.doc.value(value);
        let at = node.location;
        if !mp.writable {
            return Err(self.read_only(at, &mp.name));
        }
        let checked = check_literal(
            &mp.ty,
            mp.enumerator.as_ref(),
            &node.content,
            &self.doc.url,
            self.registry,
        );
        checked.map_err(|description| self.error(at, description))
    }

    /// Fold `Type.Key` assigned to an enum property into its numeric value
    fn test_qualified_enum_assignment(&mut self, mp: &MetaProperty, obj: ObjectId, value: ValueId) -> Step<bool> {
        let at = self.doc.value(value).location;
        if !mp.writable {
            return Err(self.read_only(at, &mp.name));
        }
        let text = self.doc.value(value).content.as_string();
        if !text.chars().next().is_some_and(char::is_uppercase) {
            return Ok(false);
        }
        let Some((type_name, key)) = text.split_once('.') else {
            return Ok(false);
        };
        if key.contains('.') {
            return Ok(false);
        }

        let resolved = match self.registry.resolve_type(type_name) {
            Some(ty) => {
                let own_type = self.to_registered_type(obj).is_some_and(|o| o.type_id == ty.type_id);
                match (&mp.enumerator, own_type) {
                    (Some(enumerator), true) if enumerator.is_flag => enumerator.keys_to_value(key),
                    (Some(enumerator), true) => enumerator.key_to_value(key),
                    _ => ty.meta.enum_value(key),
                }
            }
            None if type_name == "Qt" => self.registry.global_enums().and_then(|m| m.enum_value(key)),
            None => return Ok(false),
        };
        let Some(number) = resolved else {
            return Ok(false);
        };

        let node = self.doc.value_mut(value);
        node.content = ValueContent::Literal(Literal::Number(f64::from(number)));
        node.ann.literal = Some(LiteralStore::Enum(number));
        Ok(true)
    }

    fn build_binding(&mut self, value: ValueId, prop: PropertyId, ctx: BindingContext) -> Step {
        let (_, mp) = self.resolved(prop)?;
        if !mp.writable && !mp.ty.is_list() {
            let at = self.doc.property(prop).location;
            return Err(self.read_only(at, &mp.name));
        }
        self.state.add_binding_reference(BindingReference {
            value,
            property: prop,
            context: ctx,
            kind: BindingKind::Pending,
        });
        Ok(())
    }
}
