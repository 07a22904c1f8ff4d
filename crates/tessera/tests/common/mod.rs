//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use parking_lot::Mutex;

use tessera::store::InMemorySessionStore;
use tessera::{
    AttributeValue, CookieSessionConfig, DistributableSessionManager, ManagerConfig,
    RequestContext, SessionCookieConfig, SessionListener, SessionView,
};
use tessera_types::DestroyedReason;

pub const DEPLOYMENT: &str = "test-app";
pub const COOKIE: &str = "SESSIONID";

static TRACING: Once = Once::new();

/// Route tracing output through the test harness.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A started manager over an in-memory store, with a recording listener.
pub struct TestNode {
    pub store: InMemorySessionStore,
    pub manager: DistributableSessionManager,
    pub events: Arc<RecordingListener>,
}

impl TestNode {
    pub fn start() -> Self {
        Self::start_with(ManagerConfig::new())
    }

    pub fn start_with(config: ManagerConfig) -> Self {
        init_tracing();
        let store = InMemorySessionStore::new();
        let manager = DistributableSessionManager::new(DEPLOYMENT, Arc::new(store.clone()), config);
        let events = Arc::new(RecordingListener::default());
        manager.listeners().add(events.clone());
        manager.start().expect("manager starts");
        Self {
            store,
            manager,
            events,
        }
    }

    /// Create a session in a fresh request, complete the request, and
    /// return the identifier.
    pub fn create_committed(&self, attributes: &[(&str, &str)]) -> String {
        let mut ctx = RequestContext::new();
        let handle = self
            .manager
            .create_session(&mut ctx, Some(cookie()))
            .expect("session created");
        for (name, value) in attributes {
            handle
                .set_attribute(name, Some(AttributeValue::from(*value)))
                .expect("attribute set");
        }
        let id = handle.id();
        ctx.complete();
        id
    }
}

pub fn cookie() -> Arc<dyn SessionCookieConfig> {
    Arc::new(CookieSessionConfig::new(COOKIE))
}

/// A request presenting `id` in the session cookie.
pub fn request_with(id: &str) -> RequestContext {
    RequestContext::new().with_cookie(COOKIE, id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording listener
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Created(String),
    Destroyed(String, DestroyedReason),
    Added(String, String),
    Updated(String, String),
    Removed(String, String),
    IdChanged { new_id: String, old_id: String },
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl SessionListener for RecordingListener {
    fn session_created(&self, session: &dyn SessionView) {
        self.push(Event::Created(session.id()));
    }

    fn session_destroyed(&self, session: &dyn SessionView, reason: DestroyedReason) {
        self.push(Event::Destroyed(session.id(), reason));
    }

    fn attribute_added(&self, session: &dyn SessionView, name: &str, _value: &AttributeValue) {
        self.push(Event::Added(session.id(), name.to_string()));
    }

    fn attribute_updated(
        &self,
        session: &dyn SessionView,
        name: &str,
        _value: &AttributeValue,
        _old: &AttributeValue,
    ) {
        self.push(Event::Updated(session.id(), name.to_string()));
    }

    fn attribute_removed(&self, session: &dyn SessionView, name: &str, _old: &AttributeValue) {
        self.push(Event::Removed(session.id(), name.to_string()));
    }

    fn session_id_changed(&self, session: &dyn SessionView, old_id: &str) {
        self.push(Event::IdChanged {
            new_id: session.id(),
            old_id: old_id.to_string(),
        });
    }
}
