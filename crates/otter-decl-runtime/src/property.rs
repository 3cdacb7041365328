//! Reactive property cells

use std::cell::RefCell;
use std::fmt;

use crate::capture::{self, CapturedProperty};
use crate::notifier::Notifier;

/// A property value that records reads and signals writes
pub struct Property<T> {
    core_index: u32,
    value: RefCell<T>,
    notifier: Option<Notifier>,
}

impl<T> Property<T> {
    /// A property with a change signal
    pub fn new(core_index: u32, value: T) -> Self {
        Self {
            core_index,
            value: RefCell::new(value),
            notifier: Some(Notifier::new()),
        }
    }

    /// A property without a change signal
    pub fn constant(core_index: u32, value: T) -> Self {
        Self {
            core_index,
            value: RefCell::new(value),
            notifier: None,
        }
    }

    /// Property index
    pub fn core_index(&self) -> u32 {
        self.core_index
    }

    /// Change signal, if any
    pub fn notifier(&self) -> Option<&Notifier> {
        self.notifier.as_ref()
    }

    /// Read the value, recording the read when capture is enabled
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        capture::capture(CapturedProperty {
            core_index: self.core_index,
            notifier: self.notifier.clone(),
        });
        self.value.borrow().clone()
    }

    /// Read the value without recording it
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    /// Write the value, notifying only when it changed
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("core_index", &self.core_index)
            .field("value", &self.value.borrow())
            .field("notifying", &self.notifier.is_some())
            .finish()
    }
}
