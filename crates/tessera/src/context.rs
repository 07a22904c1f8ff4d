//! Per-request state: cookies, response status, and attached session handles.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::handle::SessionHandle;

/// Default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "SESSIONID";

/// What the response will do with a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCookie {
    Set(String),
    Cleared,
}

/// The state of one request as seen by session managers.
///
/// Each deployment may attach at most one session handle; it stays attached
/// until the handle is invalidated or the request completes.
#[derive(Default)]
pub struct RequestContext {
    request_id: Uuid,
    response_started: bool,
    request_cookies: HashMap<String, String>,
    response_cookies: HashMap<String, ResponseCookie>,
    sessions: HashMap<String, Arc<SessionHandle>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            ..Default::default()
        }
    }

    /// Add a cookie sent by the client.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_cookies.insert(name.into(), value.into());
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn request_cookie(&self, name: &str) -> Option<&str> {
        self.request_cookies.get(name).map(String::as_str)
    }

    pub fn response_cookie(&self, name: &str) -> Option<&ResponseCookie> {
        self.response_cookies.get(name)
    }

    pub fn set_response_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response_cookies
            .insert(name.into(), ResponseCookie::Set(value.into()));
    }

    pub fn clear_response_cookie(&mut self, name: impl Into<String>) {
        self.response_cookies
            .insert(name.into(), ResponseCookie::Cleared);
    }

    /// Mark the response as committed; headers can no longer change.
    pub fn start_response(&mut self) {
        self.response_started = true;
    }

    pub fn is_response_started(&self) -> bool {
        self.response_started
    }

    /// The handle attached for `deployment`, if any.
    pub fn session(&self, deployment: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(deployment).cloned()
    }

    pub(crate) fn attach_session(&mut self, deployment: &str, handle: Arc<SessionHandle>) {
        self.sessions.insert(deployment.to_string(), handle);
    }

    /// Detach `handle` if it is the one attached for `deployment`.
    pub(crate) fn detach_session(&mut self, deployment: &str, handle: &SessionHandle) {
        if self
            .sessions
            .get(deployment)
            .is_some_and(|attached| std::ptr::eq(Arc::as_ptr(attached), handle))
        {
            self.sessions.remove(deployment);
        }
    }

    /// End the request: every attached handle records its access and
    /// releases its batch and permit.
    pub fn complete(&mut self) {
        let handles: Vec<_> = self.sessions.drain().map(|(_, handle)| handle).collect();
        for handle in handles {
            handle.request_done(self);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cookie configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Reads and writes the session identifier on a request.
pub trait SessionCookieConfig: Send + Sync {
    /// Identifier presented by the client, if any.
    fn find_session_id(&self, ctx: &RequestContext) -> Option<String>;

    /// Send `id` to the client.
    fn set_session_id(&self, ctx: &mut RequestContext, id: &str);

    /// Tell the client to forget `id`.
    fn clear_session(&self, ctx: &mut RequestContext, id: &str);
}

/// Carries the identifier in a named cookie.
#[derive(Debug, Clone)]
pub struct CookieSessionConfig {
    name: String,
}

impl CookieSessionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for CookieSessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME)
    }
}

impl SessionCookieConfig for CookieSessionConfig {
    fn find_session_id(&self, ctx: &RequestContext) -> Option<String> {
        ctx.request_cookie(&self.name).map(str::to_string)
    }

    fn set_session_id(&self, ctx: &mut RequestContext, id: &str) {
        ctx.set_response_cookie(&self.name, id);
    }

    fn clear_session(&self, ctx: &mut RequestContext, _id: &str) {
        ctx.clear_response_cookie(&self.name);
    }
}

/// Fixed identifier, for lookups made outside any client request.
#[derive(Debug, Clone)]
pub struct SimpleSessionConfig {
    id: String,
}

impl SimpleSessionConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl SessionCookieConfig for SimpleSessionConfig {
    fn find_session_id(&self, _ctx: &RequestContext) -> Option<String> {
        Some(self.id.clone())
    }

    fn set_session_id(&self, _ctx: &mut RequestContext, _id: &str) {}

    fn clear_session(&self, _ctx: &mut RequestContext, _id: &str) {}
}
