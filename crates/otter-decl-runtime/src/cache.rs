//! Per-artifact program caches
//!
//! Each compiled component owns two tables sized by the compiler: shared
//! closures, evaluated once and reused by every instance, and programs,
//! compiled once and instantiated per binding.

use std::rc::Rc;

use otter_decl_bytecode::{BindingPayload, BytecodeError, CompiledComponent, DataIndex, ProgramRef};
use tracing::trace;

use crate::engine::{EvaluationMode, ScriptEngine};
use crate::error::RuntimeResult;

/// Compiled binding programs for one artifact
pub struct ProgramCache<E: ScriptEngine> {
    url: String,
    closures: Vec<Option<E::Function>>,
    programs: Vec<Option<Rc<E::Program>>>,
}

impl<E: ScriptEngine> ProgramCache<E> {
    /// Empty tables sized for `component`
    pub fn for_component(component: &CompiledComponent) -> Self {
        Self::with_slots(
            component.url.clone(),
            component.cached_closures as usize,
            component.cached_programs as usize,
        )
    }

    /// Empty tables with explicit sizes
    pub fn with_slots(url: impl Into<String>, closures: usize, programs: usize) -> Self {
        Self {
            url: url.into(),
            closures: (0..closures).map(|_| None).collect(),
            programs: (0..programs).map(|_| None).collect(),
        }
    }

    /// Url bindings from this artifact report errors against
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of shared closures evaluated so far
    pub fn compiled_closures(&self) -> usize {
        self.closures.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of programs compiled so far
    pub fn compiled_programs(&self) -> usize {
        self.programs.iter().filter(|slot| slot.is_some()).count()
    }

    /// Resolve the function a binding payload runs
    ///
    /// Shared closures are compiled and evaluated on first use. Programs are
    /// compiled on first use and instantiated against `context` and `scope`
    /// on every call.
    pub fn resolve(
        &mut self,
        engine: &E,
        payload: &BindingPayload,
        line: u32,
        context: &E::Context,
        scope: &E::Scope,
    ) -> RuntimeResult<(E::Function, EvaluationMode)> {
        match payload.program {
            ProgramRef::SharedClosure(slot) => {
                let len = self.closures.len();
                let entry = self
                    .closures
                    .get_mut(slot as usize)
                    .ok_or_else(|| out_of_range("shared closure", slot, len))?;
                if let Some(ref function) = *entry {
                    return Ok((function.clone(), EvaluationMode::Shared));
                }
                trace!(url = %self.url, slot, "evaluating shared closure");
                let program = engine.compile(&payload.source, &self.url, line)?;
                let function = engine.instantiate_shared(&program)?;
                *entry = Some(function.clone());
                Ok((function, EvaluationMode::Shared))
            }
            ProgramRef::Program(slot) => {
                let len = self.programs.len();
                let entry = self
                    .programs
                    .get_mut(slot as usize)
                    .ok_or_else(|| out_of_range("program", slot, len))?;
                let program = match *entry {
                    Some(ref program) => program.clone(),
                    None => {
                        trace!(url = %self.url, slot, "compiling binding program");
                        let program = Rc::new(engine.compile(&payload.source, &self.url, line)?);
                        *entry = Some(program.clone());
                        program
                    }
                };
                let function = engine.instantiate(&program, context, scope)?;
                Ok((function, EvaluationMode::Program))
            }
        }
    }
}

/// Decode the binding payload stored at `data` in `component`'s pool
pub fn payload(component: &CompiledComponent, data: DataIndex) -> RuntimeResult<BindingPayload> {
    let bytes = component
        .pool
        .data(data)
        .ok_or_else(|| BytecodeError::MalformedPayload(format!("no binding data at index {}", data.index())))?;
    Ok(BindingPayload::decode(bytes)?)
}

fn out_of_range(table: &str, slot: u32, len: usize) -> BytecodeError {
    BytecodeError::MalformedPayload(format!("{} slot {} out of range ({} slots)", table, slot, len))
}
