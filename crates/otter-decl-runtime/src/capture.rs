//! Dependency capture
//!
//! While an expression evaluates, every property read is recorded on the
//! current thread. Evaluations nest: a [`CaptureScope`] saves the enclosing
//! state on entry and restores it when finished or dropped.

use std::cell::RefCell;

use crate::notifier::Notifier;

/// A property read during evaluation
#[derive(Debug, Clone)]
pub struct CapturedProperty {
    /// Property index on the owning object
    pub core_index: u32,
    /// Change signal, `None` for properties without one
    pub notifier: Option<Notifier>,
}

impl CapturedProperty {
    /// A read of a property with a change signal
    pub fn notifying(core_index: u32, notifier: Notifier) -> Self {
        Self {
            core_index,
            notifier: Some(notifier),
        }
    }

    /// A read of a property without a change signal
    pub fn constant(core_index: u32) -> Self {
        Self {
            core_index,
            notifier: None,
        }
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    enabled: bool,
    properties: Vec<CapturedProperty>,
}

thread_local! {
    static CAPTURE: RefCell<CaptureState> = RefCell::new(CaptureState::default());
}

/// Whether reads on this thread are currently recorded
pub fn is_capturing() -> bool {
    CAPTURE.with(|c| c.borrow().enabled)
}

/// Record a property read if capture is enabled
pub fn capture(property: CapturedProperty) {
    CAPTURE.with(|c| {
        let mut state = c.borrow_mut();
        if state.enabled {
            state.properties.push(property);
        }
    });
}

/// One level of capture nesting
#[derive(Debug)]
pub struct CaptureScope {
    saved: Option<CaptureState>,
}

impl CaptureScope {
    /// Start a capture level, enabled or suppressed
    pub fn begin(enabled: bool) -> Self {
        let saved = CAPTURE.with(|c| {
            std::mem::replace(
                &mut *c.borrow_mut(),
                CaptureState {
                    enabled,
                    properties: Vec::new(),
                },
            )
        });
        Self { saved: Some(saved) }
    }

    /// End this level, returning what it recorded and restoring the enclosing one
    pub fn finish(mut self) -> Vec<CapturedProperty> {
        self.restore()
    }

    fn restore(&mut self) -> Vec<CapturedProperty> {
        match self.saved.take() {
            Some(saved) => CAPTURE.with(|c| std::mem::replace(&mut *c.borrow_mut(), saved).properties),
            None => Vec::new(),
        }
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        self.restore();
    }
}
