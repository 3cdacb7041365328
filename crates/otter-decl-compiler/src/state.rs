//! Per-component compile state

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use otter_decl_bytecode::BindingPayload;

use crate::tree::{Location, ObjectId, PropertyId, ValueId};

/// Lexical position of an assignment relative to its component root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingContext {
    /// Sub-scope depth below the object (grouped, attached, value type)
    pub stack: u32,
    /// Value-type owner depth
    pub owner: u32,
    /// Object the assignment belongs to
    pub object: Option<ObjectId>,
}

impl BindingContext {
    /// Context of an object's own properties
    pub fn new(object: ObjectId) -> Self {
        Self {
            stack: 0,
            owner: 0,
            object: Some(object),
        }
    }

    /// Context one sub-scope deeper
    pub fn incr(&self) -> Self {
        Self {
            stack: self.stack + 1,
            ..*self
        }
    }

    /// Whether the context is inside a sub-scope
    pub fn is_sub_context(&self) -> bool {
        self.stack > 0
    }
}

/// How a binding will be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// Not yet classified
    Pending,
    /// Index into the optimized binding program
    Optimized(u32),
    /// Rewritten script
    Script(BindingPayload),
}

/// A binding awaiting emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingReference {
    /// The bound value
    pub value: ValueId,
    /// Target property
    pub property: PropertyId,
    /// Lexical context of the assignment
    pub context: BindingContext,
    /// Classification
    pub kind: BindingKind,
}

/// Scope of one component compilation
#[derive(Debug, Clone, Default)]
pub struct CompileState {
    /// Component root
    pub root: Option<ObjectId>,
    /// Ids in assignment order
    pub ids: IndexMap<String, ObjectId>,
    /// Bindings keyed by value
    pub bindings: IndexMap<ValueId, BindingReference>,
    /// Signal handler contexts keyed by value
    pub signal_expressions: FxHashMap<ValueId, BindingContext>,
    /// Objects registered for construction notifications
    pub parser_status_count: u32,
    /// Objects whose alias slots still need resolving
    pub aliasing_objects: Vec<ObjectId>,
    /// Optimized binding program
    pub compiled_binding_data: Option<Vec<u8>>,
}

impl CompileState {
    /// Fresh state for a component rooted at `root`
    pub fn with_root(root: ObjectId) -> Self {
        Self {
            root: Some(root),
            ..Self::default()
        }
    }

    /// Register an id, returns its sequential index
    pub fn add_id(&mut self, id: &str, object: ObjectId) -> u32 {
        assert!(!self.ids.contains_key(id), "id {id} registered twice");
        let index = self.ids.len() as u32;
        self.ids.insert(id.to_string(), object);
        index
    }

    /// Object registered under an id
    pub fn id_object(&self, id: &str) -> Option<ObjectId> {
        self.ids.get(id).copied()
    }

    /// Register a binding
    pub fn add_binding_reference(&mut self, reference: BindingReference) {
        assert!(
            !self.bindings.contains_key(&reference.value),
            "binding reference added twice"
        );
        self.bindings.insert(reference.value, reference);
    }
}

/// Statistics for one component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentStats {
    /// Line of the component root
    pub line: u32,
    /// Objects built
    pub objects: u32,
    /// Ids registered
    pub ids: u32,
    /// Bindings handled by the optimizer
    pub optimized_bindings: Vec<Location>,
    /// Bindings rewritten as scripts
    pub script_bindings: Vec<Location>,
}

impl ComponentStats {
    /// Multi-line report
    pub fn report(&self) -> String {
        let locations = |list: &[Location]| {
            list.iter()
                .map(|l| format!("({}:{})", l.line, l.column))
                .collect::<Vec<_>>()
                .join(" ")
        };
        format!(
            "    Component Line {}\n        Total Objects:      {}\n        IDs Used:           {}\n        Optimized Bindings: {}\n            {}\n        QScript Bindings:   {}\n            {}",
            self.line,
            self.objects,
            self.ids,
            self.optimized_bindings.len(),
            locations(&self.optimized_bindings),
            self.script_bindings.len(),
            locations(&self.script_bindings),
        )
    }
}
