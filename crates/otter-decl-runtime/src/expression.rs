//! Script expressions with dependency tracking
//!
//! An expression runs one function against its context and scope. When change
//! tracking is on, every notifying property read during evaluation gets a
//! guard endpoint connected to that property's notifier, so a later change
//! reaches the expression's notify target.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use otter_decl_bytecode::BindingPayload;
use rustc_hash::FxHashSet;
use tracing::{trace, warn};

use crate::cache::ProgramCache;
use crate::capture::{CaptureScope, CapturedProperty};
use crate::engine::{EvaluationMode, ScriptEngine};
use crate::error::{RuntimeError, RuntimeResult, ScriptError};
use crate::notifier::{NotifierEndpoint, NotifyCallback};

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<V> {
    /// The expression produced a value
    Value(V),
    /// The expression produced the undefined value
    Undefined,
    /// The expression threw; see [`Expression::error`]
    Exception,
}

/// A script expression bound to a context and scope object
pub struct Expression<E: ScriptEngine> {
    engine: Rc<E>,
    context: E::Context,
    scope: E::Scope,
    function: Option<E::Function>,
    mode: EvaluationMode,
    source: String,
    url: String,
    line: u32,
    error: Option<ScriptError>,
    track_change: bool,
    notify_target: Option<NotifyCallback>,
    guards: Vec<NotifierEndpoint>,
    alive: Rc<Cell<bool>>,
}

impl<E: ScriptEngine> Expression<E> {
    /// An expression compiled from source on first evaluation
    pub fn new(
        engine: Rc<E>,
        context: E::Context,
        scope: E::Scope,
        source: impl Into<String>,
        url: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            engine,
            context,
            scope,
            function: None,
            mode: EvaluationMode::Program,
            source: source.into(),
            url: url.into(),
            line,
            error: None,
            track_change: false,
            notify_target: None,
            guards: Vec::new(),
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// An expression running a compiled binding payload
    ///
    /// The function comes from `cache`: the artifact's shared closure for
    /// shareable bindings, or a fresh instance of the artifact's program.
    pub fn from_payload(
        engine: Rc<E>,
        cache: &mut ProgramCache<E>,
        payload: &BindingPayload,
        line: u32,
        context: E::Context,
        scope: E::Scope,
    ) -> RuntimeResult<Self> {
        let (function, mode) = cache.resolve(&engine, payload, line, &context, &scope)?;
        let mut expression = Self::new(engine, context, scope, payload.source.clone(), cache.url(), line);
        expression.function = Some(function);
        expression.mode = mode;
        Ok(expression)
    }

    /// Source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Url errors are reported against
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Line errors are reported against
    pub fn line(&self) -> u32 {
        self.line
    }

    /// How the function is resolved against the context
    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    /// Exception raised by the last evaluation
    pub fn error(&self) -> Option<&ScriptError> {
        self.error.as_ref()
    }

    /// Whether the last evaluation threw
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Forget the last exception
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Callback run when a dependency changes
    pub fn set_notify_target(&mut self, target: Option<NotifyCallback>) {
        self.notify_target = target;
        for guard in &mut self.guards {
            guard.set_target(self.notify_target.clone());
        }
    }

    /// Whether dependencies are tracked
    pub fn notify_on_value_change(&self) -> bool {
        self.track_change
    }

    /// Enable or disable dependency tracking; disabling drops all guards
    pub fn set_notify_on_value_change(&mut self, notify: bool) {
        self.track_change = notify;
        if !notify {
            self.clear_guards();
        }
    }

    /// Number of guard endpoints currently held
    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }

    /// Number of guards attached to a notifier
    pub fn connected_guard_count(&self) -> usize {
        self.guards.iter().filter(|g| g.is_attached()).count()
    }

    /// Disconnect and drop all guards
    pub fn clear_guards(&mut self) {
        self.guards.clear();
    }

    /// Whether the expression is still live
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Shared liveness flag, cleared when the owner is destroyed
    pub(crate) fn liveness(&self) -> Rc<Cell<bool>> {
        self.alive.clone()
    }

    /// Run the expression
    ///
    /// Exceptions are recorded on the expression, not returned. Fails with
    /// [`RuntimeError::Deleted`] when the owner was destroyed while the script
    /// ran; guards and the error are left untouched in that case.
    pub fn evaluate(&mut self) -> RuntimeResult<Evaluation<E::Value>> {
        let watcher = self.alive.clone();

        let function = match self.function() {
            Ok(function) => function,
            Err(err) => {
                self.error = Some(err);
                return Ok(Evaluation::Exception);
            }
        };

        let capture = CaptureScope::begin(self.track_change);
        let result = self.call(&function);
        let captured = capture.finish();

        if !watcher.get() {
            return Err(RuntimeError::Deleted);
        }

        if self.track_change {
            if captured.is_empty() {
                self.clear_guards();
            } else {
                self.update_guards(&captured);
            }
        }

        match result {
            Ok(value) => {
                self.error = None;
                if self.engine.is_undefined(&value) {
                    Ok(Evaluation::Undefined)
                } else {
                    Ok(Evaluation::Value(value))
                }
            }
            Err(err) => {
                self.error = Some(err);
                Ok(Evaluation::Exception)
            }
        }
    }

    fn function(&mut self) -> Result<E::Function, ScriptError> {
        if let Some(function) = &self.function {
            return Ok(function.clone());
        }
        let program = self.engine.compile(&self.source, &self.url, self.line)?;
        let function = self.engine.instantiate(&program, &self.context, &self.scope)?;
        self.function = Some(function.clone());
        Ok(function)
    }

    fn call(&self, function: &E::Function) -> Result<E::Value, ScriptError> {
        match self.mode {
            EvaluationMode::Shared => {
                let previous = self
                    .engine
                    .swap_shared(Some((self.context.clone(), self.scope.clone())));
                let result = self.engine.call(function);
                self.engine.swap_shared(previous);
                result
            }
            EvaluationMode::Program => self.engine.call(function),
        }
    }

    fn update_guards(&mut self, properties: &[CapturedProperty]) {
        if properties.len() != self.guards.len() {
            trace!(
                expression = %self.source,
                from = self.guards.len(),
                to = properties.len(),
                "rebuilding guard list"
            );
            self.guards.resize_with(properties.len(), NotifierEndpoint::new);
        }

        let mut connected = FxHashSet::default();
        let mut unnotifiable = Vec::new();
        for (guard, property) in self.guards.iter_mut().zip(properties) {
            guard.set_target(self.notify_target.clone());
            match &property.notifier {
                Some(notifier) if connected.insert(notifier.id()) => guard.connect(notifier),
                Some(_) => guard.disconnect(),
                None => {
                    guard.disconnect();
                    unnotifiable.push(property.core_index);
                }
            }
        }

        if !unnotifiable.is_empty() {
            warn!(
                expression = %self.source,
                properties = ?unnotifiable,
                "Expression depends on non-NOTIFYable properties"
            );
        }
    }
}

impl<E: ScriptEngine> fmt::Debug for Expression<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .field("url", &self.url)
            .field("line", &self.line)
            .field("mode", &self.mode)
            .field("guards", &self.guards.len())
            .field("error", &self.error)
            .finish()
    }
}
