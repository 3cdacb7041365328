//! Optimized binding compiler capability

use crate::meta::PropertyType;
use crate::tree::Location;

/// A binding offered to the optimizer
#[derive(Debug, Clone, Copy)]
pub struct BindingSite<'a> {
    /// Expression source
    pub expression: &'a str,
    /// Target property name
    pub property_name: &'a str,
    /// Target property index
    pub property_index: u32,
    /// Target property type
    pub property_type: &'a PropertyType,
    /// Ids of the component in index order
    pub ids: &'a [String],
    /// Position of the expression
    pub location: Location,
}

/// Compiles simple bindings to a non-script program
///
/// Sessions are per component: `begin_component`, any number of `compile`
/// calls, then `finish_component` returning the linked program.
pub trait BindingOptimizer {
    /// Start a component
    fn begin_component(&mut self);

    /// Compile a binding, returns its index in the program
    fn compile(&mut self, site: &BindingSite<'_>) -> Option<u32>;

    /// Finish the component; `None` when nothing was compiled
    fn finish_component(&mut self) -> Option<Vec<u8>>;
}
