//! Change notifiers and the endpoints connected to them
//!
//! A [`Notifier`] is the change signal of one property. A [`NotifierEndpoint`]
//! is a single connection slot: it is attached to at most one notifier at a
//! time and invokes its target callback when that notifier fires. Dropping an
//! endpoint disconnects it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback invoked when a connected notifier fires
pub type NotifyCallback = Rc<dyn Fn()>;

static NEXT_NOTIFIER_ID: AtomicU64 = AtomicU64::new(1);

struct Connection {
    target: RefCell<Option<NotifyCallback>>,
    /// Id of the notifier this connection is attached to, 0 when detached
    attached_to: Cell<u64>,
}

struct NotifierInner {
    id: u64,
    connections: RefCell<Vec<Weak<Connection>>>,
}

/// A property change signal
///
/// Clones share the same connection list.
#[derive(Clone)]
pub struct Notifier {
    inner: Rc<NotifierInner>,
}

impl Notifier {
    /// Create a notifier with no connections
    pub fn new() -> Self {
        Self {
            inner: Rc::new(NotifierInner {
                id: NEXT_NOTIFIER_ID.fetch_add(1, Ordering::Relaxed),
                connections: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Identity of this notifier
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether two handles refer to the same notifier
    pub fn ptr_eq(&self, other: &Notifier) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.inner
            .connections
            .borrow()
            .iter()
            .filter(|c| c.upgrade().is_some_and(|c| c.attached_to.get() == self.inner.id))
            .count()
    }

    /// Fire the notifier
    ///
    /// Callbacks may connect or disconnect endpoints, including the one being
    /// notified. An endpoint disconnected by an earlier callback is skipped.
    pub fn notify(&self) {
        let connections: Vec<Rc<Connection>> = {
            let mut list = self.inner.connections.borrow_mut();
            list.retain(|c| c.upgrade().is_some_and(|c| c.attached_to.get() == self.inner.id));
            list.iter().filter_map(Weak::upgrade).collect()
        };

        for connection in connections {
            if connection.attached_to.get() != self.inner.id {
                continue;
            }
            let target = connection.target.borrow().clone();
            if let Some(target) = target {
                target();
            }
        }
    }

    fn attach(&self, connection: &Rc<Connection>) {
        connection.attached_to.set(self.inner.id);
        self.inner.connections.borrow_mut().push(Rc::downgrade(connection));
    }

    fn detach(&self, connection: &Rc<Connection>) {
        connection.attached_to.set(0);
        self.inner
            .connections
            .borrow_mut()
            .retain(|c| !std::ptr::eq(c.as_ptr(), Rc::as_ptr(connection)));
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("id", &self.inner.id)
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// A single connection slot
pub struct NotifierEndpoint {
    connection: Rc<Connection>,
    source: Option<Notifier>,
}

impl NotifierEndpoint {
    /// Create a detached endpoint without a target
    pub fn new() -> Self {
        Self {
            connection: Rc::new(Connection {
                target: RefCell::new(None),
                attached_to: Cell::new(0),
            }),
            source: None,
        }
    }

    /// Set the callback run when the connected notifier fires
    pub fn set_target(&mut self, target: Option<NotifyCallback>) {
        *self.connection.target.borrow_mut() = target;
    }

    /// Attach to `notifier`, detaching from any previous one
    pub fn connect(&mut self, notifier: &Notifier) {
        if self.is_connected(notifier) {
            return;
        }
        self.disconnect();
        notifier.attach(&self.connection);
        self.source = Some(notifier.clone());
    }

    /// Detach from the current notifier, if any
    pub fn disconnect(&mut self) {
        if let Some(source) = self.source.take() {
            source.detach(&self.connection);
        }
    }

    /// Whether this endpoint is attached to `notifier`
    pub fn is_connected(&self, notifier: &Notifier) -> bool {
        self.source.as_ref().is_some_and(|source| source.ptr_eq(notifier))
    }

    /// Whether this endpoint is attached to any notifier
    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }
}

impl Default for NotifierEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NotifierEndpoint {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for NotifierEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierEndpoint")
            .field("source", &self.source.as_ref().map(Notifier::id))
            .finish()
    }
}
