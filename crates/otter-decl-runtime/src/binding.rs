//! Property bindings
//!
//! A binding owns an expression and writes its result into a target property
//! whenever one of the expression's dependencies changes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::engine::ScriptEngine;
use crate::error::{RuntimeError, RuntimeResult, ScriptError};
use crate::expression::{Evaluation, Expression};
use crate::notifier::NotifyCallback;

/// The property a binding writes to
pub trait BindingTarget<V> {
    /// Name used in diagnostics, `width` or `font.pixelSize`
    fn name(&self) -> String;

    /// Store a value; `Err` carries a description of why it was rejected
    fn write(&self, value: V) -> Result<(), String>;

    /// Reset to the default value; `false` when the property is not resettable
    fn reset(&self) -> bool {
        false
    }
}

struct BindingInner<E: ScriptEngine> {
    expression: RefCell<Expression<E>>,
    target: Box<dyn BindingTarget<E::Value>>,
    alive: Rc<Cell<bool>>,
    enabled: Cell<bool>,
    updating: Cell<bool>,
}

/// A binding of an expression to a target property
///
/// Dropping the handle destroys the binding, even while it is evaluating.
pub struct Binding<E: ScriptEngine> {
    inner: Rc<BindingInner<E>>,
}

impl<E: ScriptEngine + 'static> Binding<E> {
    /// Create a disabled binding
    pub fn new(mut expression: Expression<E>, target: Box<dyn BindingTarget<E::Value>>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<BindingInner<E>>| {
            let weak = weak.clone();
            let callback: NotifyCallback = Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let _ = update(&inner);
                }
            });
            expression.set_notify_target(Some(callback));
            BindingInner {
                alive: expression.liveness(),
                expression: RefCell::new(expression),
                target,
                enabled: Cell::new(false),
                updating: Cell::new(false),
            }
        });
        Self { inner }
    }

    /// Enable or disable the binding
    ///
    /// Enabling evaluates immediately and starts tracking dependencies;
    /// disabling drops all dependency guards. Called from the binding's own
    /// evaluation, the change applies once that evaluation returns.
    pub fn set_enabled(&self, enabled: bool) -> RuntimeResult<()> {
        self.inner.enabled.set(enabled);
        if self.inner.updating.get() {
            return Ok(());
        }
        sync_tracking(&self.inner);
        if enabled { update(&self.inner) } else { Ok(()) }
    }

    /// Whether the binding reacts to changes
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// Re-evaluate and write the target
    pub fn update(&self) -> RuntimeResult<()> {
        update(&self.inner)
    }

    /// Diagnostic name of the target property
    pub fn property_name(&self) -> String {
        self.inner.target.name()
    }

    /// Exception raised by the last evaluation
    pub fn error(&self) -> Option<ScriptError> {
        self.inner.expression.borrow().error().cloned()
    }

    /// Expression source
    pub fn source(&self) -> String {
        self.inner.expression.borrow().source().to_string()
    }

    /// Number of dependency guards attached to a notifier
    pub fn dependency_count(&self) -> usize {
        self.inner.expression.borrow().connected_guard_count()
    }
}

impl<E: ScriptEngine> Drop for Binding<E> {
    fn drop(&mut self) {
        self.inner.alive.set(false);
        self.inner.enabled.set(false);
        if let Ok(mut expression) = self.inner.expression.try_borrow_mut() {
            expression.clear_guards();
        }
    }
}

impl<E: ScriptEngine> fmt::Debug for Binding<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("property", &self.inner.target.name())
            .field("enabled", &self.inner.enabled.get())
            .field("updating", &self.inner.updating.get())
            .finish()
    }
}

fn update<E: ScriptEngine>(inner: &Rc<BindingInner<E>>) -> RuntimeResult<()> {
    if !inner.alive.get() {
        return Err(RuntimeError::Deleted);
    }
    if !inner.enabled.get() {
        return Ok(());
    }
    if inner.updating.get() {
        let name = inner.target.name();
        warn!(property = %name, "Binding loop detected for property \"{}\"", name);
        return Ok(());
    }

    inner.updating.set(true);
    let result = run(inner);
    inner.updating.set(false);
    result
}

/// Match dependency tracking to the enabled flag
fn sync_tracking<E: ScriptEngine>(inner: &BindingInner<E>) {
    if let Ok(mut expression) = inner.expression.try_borrow_mut() {
        let enabled = inner.enabled.get();
        if expression.notify_on_value_change() != enabled {
            expression.set_notify_on_value_change(enabled);
        }
    }
}

fn run<E: ScriptEngine>(inner: &Rc<BindingInner<E>>) -> RuntimeResult<()> {
    let evaluation = inner.expression.borrow_mut().evaluate();
    sync_tracking(inner);
    let evaluation = match evaluation {
        Ok(evaluation) => evaluation,
        Err(RuntimeError::Deleted) => {
            if let Ok(mut expression) = inner.expression.try_borrow_mut() {
                expression.clear_guards();
            }
            return Err(RuntimeError::Deleted);
        }
        Err(err) => return Err(err),
    };

    match evaluation {
        Evaluation::Value(value) => {
            if let Err(description) = inner.target.write(value) {
                let expression = inner.expression.borrow();
                warn!(
                    url = expression.url(),
                    line = expression.line(),
                    property = %inner.target.name(),
                    "{}",
                    description
                );
            }
        }
        Evaluation::Undefined => {
            if !inner.target.reset() {
                let expression = inner.expression.borrow();
                warn!(
                    url = expression.url(),
                    line = expression.line(),
                    "Unable to assign [undefined] to {}",
                    inner.target.name()
                );
            }
        }
        Evaluation::Exception => {
            if let Some(err) = inner.expression.borrow().error() {
                warn!(file = %err.file, line = err.line, "{}", err.message);
            }
        }
    }
    Ok(())
}
