//! Session lifecycle and attribute listeners.

use std::sync::Arc;

use parking_lot::RwLock;
use tessera_types::{DestroyedReason, SessionEventKind};
use tracing::trace;

use crate::value::AttributeValue;

/// What a listener sees of the session an event concerns.
pub trait SessionView {
    fn id(&self) -> String;
    fn attribute(&self, name: &str) -> Option<AttributeValue>;
    fn attribute_names(&self) -> Vec<String>;
}

/// Receives session events. Every method defaults to a no-op.
pub trait SessionListener: Send + Sync {
    fn session_created(&self, _session: &dyn SessionView) {}

    fn session_destroyed(&self, _session: &dyn SessionView, _reason: DestroyedReason) {}

    fn attribute_added(&self, _session: &dyn SessionView, _name: &str, _value: &AttributeValue) {}

    fn attribute_updated(
        &self,
        _session: &dyn SessionView,
        _name: &str,
        _value: &AttributeValue,
        _old: &AttributeValue,
    ) {
    }

    fn attribute_removed(&self, _session: &dyn SessionView, _name: &str, _old: &AttributeValue) {}

    fn session_id_changed(&self, _session: &dyn SessionView, _old_id: &str) {}
}

/// Registered listeners of one session manager.
///
/// Events are dispatched to a snapshot of the registry, so listeners may
/// add or remove listeners from inside a callback.
#[derive(Default)]
pub struct SessionListeners {
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl SessionListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove a previously added listener. Returns whether it was found.
    pub fn remove(&self, listener: &Arc<dyn SessionListener>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| Arc::as_ptr(l) as *const () != target);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners.read().clone()
    }

    pub(crate) fn session_created(&self, session: &dyn SessionView) {
        dispatching(session, SessionEventKind::Created);
        for listener in self.snapshot() {
            listener.session_created(session);
        }
    }

    pub(crate) fn session_destroyed(&self, session: &dyn SessionView, reason: DestroyedReason) {
        dispatching(session, SessionEventKind::Destroyed);
        for listener in self.snapshot() {
            listener.session_destroyed(session, reason);
        }
    }

    pub(crate) fn attribute_added(
        &self,
        session: &dyn SessionView,
        name: &str,
        value: &AttributeValue,
    ) {
        dispatching(session, SessionEventKind::AttributeAdded);
        for listener in self.snapshot() {
            listener.attribute_added(session, name, value);
        }
    }

    pub(crate) fn attribute_updated(
        &self,
        session: &dyn SessionView,
        name: &str,
        value: &AttributeValue,
        old: &AttributeValue,
    ) {
        dispatching(session, SessionEventKind::AttributeUpdated);
        for listener in self.snapshot() {
            listener.attribute_updated(session, name, value, old);
        }
    }

    pub(crate) fn attribute_removed(
        &self,
        session: &dyn SessionView,
        name: &str,
        old: &AttributeValue,
    ) {
        dispatching(session, SessionEventKind::AttributeRemoved);
        for listener in self.snapshot() {
            listener.attribute_removed(session, name, old);
        }
    }

    pub(crate) fn session_id_changed(&self, session: &dyn SessionView, old_id: &str) {
        dispatching(session, SessionEventKind::IdChanged);
        for listener in self.snapshot() {
            listener.session_id_changed(session, old_id);
        }
    }
}

fn dispatching(session: &dyn SessionView, event: SessionEventKind) {
    trace!(session_id = %session.id(), %event, "Dispatching session event");
}
