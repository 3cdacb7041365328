//! Compiler driver

use std::mem;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use otter_decl_bytecode::{
    ArtifactType, ArtifactTypeKind, BindingPayload, CompiledComponent, ContextCache, Instruction, ProgramRef,
    PropertyCache,
};

use crate::error::{CompileError, CompileResult, Diagnostic, Reported};
use crate::meta::{self, MetaObject, PropertyType};
use crate::optimizer::{BindingOptimizer, BindingSite};
use crate::options::CompilerOptions;
use crate::registry::{CompositeType, RegisteredType, TypeRegistry};
use crate::rewrite::rewrite_binding;
use crate::state::{BindingContext, BindingKind, CompileState, ComponentStats};
use crate::tree::{Document, Location, ObjectId, TypeSlot};

/// A resolved entry of the document's type table
#[derive(Debug, Clone)]
pub(crate) struct TypeReference {
    /// Name as written
    pub name: String,
    /// Native type, if registered
    pub native: Option<Arc<RegisteredType>>,
    /// Composite type, if defined by another document
    pub composite: Option<Arc<CompositeType>>,
    /// Reflective type
    pub meta: Arc<MetaObject>,
    /// Property cache, revision filtered for versioned native types
    pub cache: Arc<PropertyCache>,
}

impl TypeReference {
    fn native(name: &str, ty: Arc<RegisteredType>) -> Self {
        let allowed = ty.revisioned.then_some(ty.minor_version);
        let cache = Arc::new(meta::property_cache(&ty.meta, allowed));
        Self {
            name: name.to_string(),
            meta: ty.meta.clone(),
            native: Some(ty),
            composite: None,
            cache,
        }
    }

    fn composite(name: &str, composite: Arc<CompositeType>) -> Self {
        Self {
            name: name.to_string(),
            native: None,
            meta: composite.root_meta.clone(),
            cache: composite.root_cache.clone(),
            composite: Some(composite),
        }
    }

    fn artifact(&self) -> ArtifactType {
        let kind = match (&self.native, &self.composite) {
            (_, Some(composite)) => ArtifactTypeKind::Composite {
                url: composite.url.clone(),
            },
            (Some(native), None) => ArtifactTypeKind::Native {
                type_id: native.type_id,
            },
            (None, None) => ArtifactTypeKind::Native { type_id: u32::MAX },
        };
        ArtifactType {
            class_name: self.name.clone(),
            kind,
        }
    }
}

/// Result of a successful compile
#[derive(Debug, Clone)]
pub struct CompiledDocument {
    /// The instantiation artifact
    pub component: CompiledComponent,
    /// The document with resolution annotations
    pub document: Document,
    /// Statistics, one entry per component
    pub stats: Vec<ComponentStats>,
}

impl CompiledDocument {
    /// Describe the document root as a type usable by other documents
    pub fn composite_type(&self) -> Option<CompositeType> {
        let root = self.document.root()?;
        let meta = self.document.object(root).ann.effective_meta()?.clone();
        let cache = self.component.root_cache()?.clone();
        Some(CompositeType {
            url: self.component.url.clone(),
            root_meta: meta,
            root_cache: Arc::new(cache),
        })
    }
}

/// Declarative document compiler
///
/// One compiler is a session: the synthesized type-name counter persists
/// across [`Compiler::compile`] calls, all other state is per compile.
pub struct Compiler<'r> {
    pub(crate) registry: &'r dyn TypeRegistry,
    pub(crate) options: CompilerOptions,
    pub(crate) optimizer: Option<Box<dyn BindingOptimizer + 'r>>,
    pub(crate) type_name_counter: u32,

    pub(crate) doc: Document,
    pub(crate) output: CompiledComponent,
    pub(crate) types: Vec<TypeReference>,
    pub(crate) state: CompileState,
    pub(crate) saved_states: FxHashMap<ObjectId, CompileState>,
    pub(crate) stats: ComponentStats,
    pub(crate) finished_stats: Vec<ComponentStats>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) unit_root: Option<ObjectId>,
}

impl<'r> Compiler<'r> {
    /// Create a compiler over a registry
    pub fn new(registry: &'r dyn TypeRegistry) -> Self {
        Self::with_options(registry, CompilerOptions::default())
    }

    /// Create a compiler with options
    pub fn with_options(registry: &'r dyn TypeRegistry, options: CompilerOptions) -> Self {
        Self {
            registry,
            type_name_counter: options.type_name_seed,
            options,
            optimizer: None,
            doc: Document::new(""),
            output: CompiledComponent::default(),
            types: Vec::new(),
            state: CompileState::default(),
            saved_states: FxHashMap::default(),
            stats: ComponentStats::default(),
            finished_stats: Vec::new(),
            diagnostics: Vec::new(),
            unit_root: None,
        }
    }

    /// Attach an optimized binding compiler
    pub fn with_optimizer(mut self, optimizer: Box<dyn BindingOptimizer + 'r>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Compile a document
    ///
    /// On failure every diagnostic is returned and no artifact is produced.
    pub fn compile(&mut self, document: &Document) -> CompileResult<CompiledDocument> {
        debug!(url = %document.url, "compiling document");
        self.doc = document.clone();
        self.output = CompiledComponent::new(document.url.clone());
        self.types.clear();
        self.diagnostics.clear();
        self.finished_stats.clear();

        match self.doc.root() {
            Some(root) => {
                if self.resolve_types().is_ok() {
                    self.compile_tree(root)?;
                }
            }
            None => {
                self.error(Location::new(1, 1), "Empty document");
            }
        }

        let result = if self.diagnostics.is_empty() {
            if self.options.dump_instructions {
                debug!("{}", self.output.disassemble());
            }
            if self.options.dump_stats {
                self.dump_stats();
            }
            debug!(
                url = %self.doc.url,
                instructions = self.output.bytecode.len(),
                "compiled document"
            );
            Ok(CompiledDocument {
                component: mem::take(&mut self.output),
                document: mem::replace(&mut self.doc, Document::new("")),
                stats: mem::take(&mut self.finished_stats),
            })
        } else {
            debug!(url = %self.doc.url, errors = self.diagnostics.len(), "compile failed");
            self.output.reset();
            Err(CompileError::Failed(mem::take(&mut self.diagnostics)))
        };

        self.state = CompileState::default();
        self.saved_states.clear();
        self.stats = ComponentStats::default();
        self.unit_root = None;
        result
    }

    /// Record a diagnostic at a source position
    pub(crate) fn error(&mut self, location: Location, description: impl AsRef<str>) -> Reported {
        self.diagnostics.push(Diagnostic::new(
            self.doc.url.clone(),
            location.line,
            location.column,
            description,
        ));
        Reported
    }

    fn resolve_types(&mut self) -> Result<(), Reported> {
        let slots: Vec<TypeSlot> = self.doc.types.clone();
        let mut failed = false;
        for (index, slot) in slots.iter().enumerate() {
            let first_ref = self.doc.first_object_of_type(index);
            let at = first_ref
                .map(|o| self.doc.object(o).location.start)
                .unwrap_or(Location::new(1, 1));

            let reference = match &slot.composite {
                Some(composite) => TypeReference::composite(&slot.name, composite.clone()),
                None => match self.registry.resolve_type(&slot.name) {
                    Some(ty) => {
                        if !ty.is_creatable() && first_ref.is_some() {
                            let reason = ty
                                .no_creation_reason
                                .clone()
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "Element is not creatable.".to_string());
                            self.error(at, reason);
                            failed = true;
                        }
                        TypeReference::native(&slot.name, ty)
                    }
                    None => {
                        self.error(at, format!("{} is not a type", slot.name));
                        failed = true;
                        continue;
                    }
                },
            };
            self.output.types.push(reference.artifact());
            self.types.push(reference);
        }
        if failed { Err(Reported) } else { Ok(()) }
    }

    /// Type table index of the wrapper component, adding it if needed
    pub(crate) fn component_type_ref(&mut self) -> Option<usize> {
        let component = self.registry.component_type()?;
        if let Some(pos) = self
            .types
            .iter()
            .rposition(|t| t.native.as_ref().is_some_and(|n| n.type_id == component.type_id))
        {
            return Some(pos);
        }
        let name = component.element_name.clone();
        let reference = TypeReference::native(&name, component);
        self.doc.types.push(TypeSlot {
            name,
            composite: None,
        });
        self.output.types.push(reference.artifact());
        self.types.push(reference);
        Some(self.types.len() - 1)
    }

    /// Whether a type is the wrapper component
    pub(crate) fn is_component_meta(&self, meta: &MetaObject) -> bool {
        self.registry
            .component_type()
            .is_some_and(|c| c.meta.class_name() == meta.class_name())
    }

    /// Registered element for an object, walking its class chain
    pub(crate) fn to_registered_type(&self, obj: ObjectId) -> Option<Arc<RegisteredType>> {
        let mut current = self.doc.object(obj).ann.effective_meta().cloned();
        while let Some(meta) = current {
            if let Some(ty) = self.registry.type_for_class(meta.class_name()) {
                return Some(ty);
            }
            current = meta.super_class().cloned();
        }
        None
    }

    fn compile_tree(&mut self, root: ObjectId) -> CompileResult<()> {
        self.unit_root = Some(root);
        self.state = CompileState::with_root(root);
        self.stats = ComponentStats {
            line: self.doc.object(root).location.start.line,
            ..ComponentStats::default()
        };

        if self.build_object(root, BindingContext::new(root)).is_err()
            || self.complete_component_build().is_err()
            || !self.diagnostics.is_empty()
        {
            return Ok(());
        }

        let context_cache = self.gen_context_cache();
        let compiled_binding = self
            .state
            .compiled_binding_data
            .clone()
            .map(|data| self.output.pool.add_data(&data));
        self.output.emit(
            0,
            Instruction::Init {
                bindings_size: self.state.bindings.len() as u32,
                parser_status_size: self.state.parser_status_count,
                context_cache,
                compiled_binding,
            },
        );

        self.output.scripts = self.doc.scripts.clone();
        for (index, _) in self.doc.scripts.iter().enumerate() {
            self.output
                .emit(0, Instruction::StoreImportedScript { value: index as u32 });
        }

        self.gen_object(root)?;
        self.output.emit(0, Instruction::SetDefault);
        Ok(())
    }

    /// Finish the current component once its whole tree is resolved
    ///
    /// Resolves aliases, classifies every binding as optimized or script,
    /// then saves the component's state for emission.
    pub(crate) fn complete_component_build(&mut self) -> Result<(), Reported> {
        self.resolve_aliases()?;
        self.stats.ids = self.state.ids.len() as u32;

        let use_optimizer = self.options.optimized_bindings && self.optimizer.is_some();
        if use_optimizer {
            if let Some(optimizer) = self.optimizer.as_mut() {
                optimizer.begin_component();
            }
        }
        let ids: Vec<String> = self.state.ids.keys().cloned().collect();

        let mut failed = false;
        let values: Vec<_> = self.state.bindings.keys().copied().collect();
        for value in values {
            let Some(reference) = self.state.bindings.get(&value).cloned() else {
                continue;
            };
            let value_node = self.doc.value(value);
            let (expression, location) = (value_node.content.as_script(), value_node.location);
            let prop = self.doc.property(reference.property);
            let (name, index, ty) = (
                prop.name.clone(),
                prop.ann.index.unwrap_or_default(),
                prop.ann.ty.clone().unwrap_or(PropertyType::Variant),
            );
            let (is_alias, is_value_type_sub) = (prop.ann.is_alias, prop.ann.is_value_type_sub_property);

            if use_optimizer && !is_alias {
                let site = BindingSite {
                    expression: &expression,
                    property_name: &name,
                    property_index: index,
                    property_type: &ty,
                    ids: &ids,
                    location,
                };
                let compiled = self.optimizer.as_mut().and_then(|o| o.compile(&site));
                if let Some(program_index) = compiled {
                    if let Some(binding) = self.state.bindings.get_mut(&value) {
                        binding.kind = BindingKind::Optimized(program_index);
                    }
                    self.stats.optimized_bindings.push(location);
                    continue;
                }
            }

            let rewritten = match rewrite_binding(&expression, &format!("${name}")) {
                Ok(rewritten) => rewritten,
                Err(err) => {
                    self.error(location, err.to_string());
                    failed = true;
                    continue;
                }
            };
            let program = if rewritten.sharable && !is_value_type_sub {
                let slot = self.output.cached_closures;
                self.output.cached_closures += 1;
                ProgramRef::SharedClosure(slot)
            } else {
                let slot = self.output.cached_programs;
                self.output.cached_programs += 1;
                ProgramRef::Program(slot)
            };
            if let Some(binding) = self.state.bindings.get_mut(&value) {
                binding.kind = BindingKind::Script(BindingPayload::new(program, rewritten.source));
            }
            self.stats.script_bindings.push(location);
        }

        if use_optimizer {
            self.state.compiled_binding_data = self.optimizer.as_mut().and_then(|o| o.finish_component());
        }
        if failed {
            return Err(Reported);
        }

        if let Some(root) = self.state.root {
            self.saved_states.insert(root, self.state.clone());
        }
        self.finished_stats.push(self.stats.clone());
        Ok(())
    }

    /// Id lookup table for the current component, if it has ids
    pub(crate) fn gen_context_cache(&mut self) -> Option<u32> {
        if self.state.ids.is_empty() {
            return None;
        }
        let ids: Vec<(String, u32)> = self
            .state
            .ids
            .iter()
            .map(|(name, obj)| {
                let index = self.doc.object(*obj).ann.id_index.unwrap_or_default();
                (name.clone(), index)
            })
            .collect();
        Some(self.output.add_context_cache(ContextCache::new(ids)))
    }

    fn dump_stats(&self) {
        debug!("Document: {}", self.doc.url);
        for stats in &self.finished_stats {
            debug!("{}", stats.report());
        }
    }

    pub(crate) fn next_type_name_index(&mut self) -> u32 {
        let index = self.type_name_counter;
        self.type_name_counter += 1;
        trace!(index, "synthesized type name");
        index
    }
}
