//! Session identifier encoding and validation.
//!
//! Outgoing identifiers carry a routing suffix so a load balancer can keep
//! a client on the node that owns its session:
//!
//! ```text
//! 3f2a9c...e1.node-1
//! └──id───┘ │ └route┘
//!        separator
//! ```

use std::sync::Arc;

use tessera_types::defaults;

use crate::context::{RequestContext, SessionCookieConfig};

/// Longest identifier [`DefaultIdentifierValidator`] accepts.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Converts between internal identifiers and their on-the-wire form.
pub trait IdentifierCodec: Send + Sync {
    fn encode(&self, id: &str) -> String;

    /// Strip whatever [`encode`](Self::encode) added.
    fn decode<'a>(&self, wire: &'a str) -> &'a str;
}

/// Leaves identifiers untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl IdentifierCodec for IdentityCodec {
    fn encode(&self, id: &str) -> String {
        id.to_string()
    }

    fn decode<'a>(&self, wire: &'a str) -> &'a str {
        wire
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves the route for a session identifier.
pub trait RouteLocator: Send + Sync {
    fn locate(&self, id: &str) -> Option<String>;
}

impl<F> RouteLocator for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn locate(&self, id: &str) -> Option<String> {
        self(id)
    }
}

/// Routes every session to this node.
#[derive(Debug, Clone, Default)]
pub struct LocalRouteLocator {
    route: Option<String>,
}

impl LocalRouteLocator {
    pub fn new(route: Option<String>) -> Self {
        Self { route }
    }
}

impl RouteLocator for LocalRouteLocator {
    fn locate(&self, _id: &str) -> Option<String> {
        self.route.clone()
    }
}

/// Appends `<separator><route>` on encode and strips it on decode.
#[derive(Clone)]
pub struct RoutingCodec {
    locator: Arc<dyn RouteLocator>,
    separator: String,
}

impl RoutingCodec {
    pub fn new(locator: Arc<dyn RouteLocator>, separator: impl Into<String>) -> Self {
        Self {
            locator,
            separator: separator.into(),
        }
    }

    /// Codec that always appends this node's route.
    pub fn local(route: Option<String>) -> Self {
        Self::new(
            Arc::new(LocalRouteLocator::new(route)),
            defaults::ROUTE_SEPARATOR,
        )
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Split a wire identifier into identifier and route.
    pub fn parse<'a>(&self, wire: &'a str) -> (&'a str, Option<&'a str>) {
        if self.separator.is_empty() {
            return (wire, None);
        }
        match wire.split_once(self.separator.as_str()) {
            Some((id, route)) => (id, Some(route)),
            None => (wire, None),
        }
    }
}

impl IdentifierCodec for RoutingCodec {
    fn encode(&self, id: &str) -> String {
        match self.locator.locate(id) {
            Some(route) if !self.separator.is_empty() => {
                format!("{}{}{}", id, self.separator, route)
            }
            _ => id.to_string(),
        }
    }

    fn decode<'a>(&self, wire: &'a str) -> &'a str {
        self.parse(wire).0
    }
}

/// Applies an [`IdentifierCodec`] around another cookie configuration.
pub struct CodecSessionConfig {
    inner: Arc<dyn SessionCookieConfig>,
    codec: Arc<dyn IdentifierCodec>,
}

impl CodecSessionConfig {
    pub fn new(inner: Arc<dyn SessionCookieConfig>, codec: Arc<dyn IdentifierCodec>) -> Self {
        Self { inner, codec }
    }
}

impl SessionCookieConfig for CodecSessionConfig {
    fn find_session_id(&self, ctx: &RequestContext) -> Option<String> {
        self.inner
            .find_session_id(ctx)
            .map(|wire| self.codec.decode(&wire).to_string())
    }

    fn set_session_id(&self, ctx: &mut RequestContext, id: &str) {
        self.inner.set_session_id(ctx, &self.codec.encode(id));
    }

    fn clear_session(&self, ctx: &mut RequestContext, id: &str) {
        self.inner.clear_session(ctx, &self.codec.encode(id));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Decides whether a client-presented identifier is worth looking up.
pub trait IdentifierValidator: Send + Sync {
    fn validate(&self, id: &str) -> bool;
}

impl<F> IdentifierValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn validate(&self, id: &str) -> bool {
        self(id)
    }
}

/// Accepts 1 to [`MAX_IDENTIFIER_LEN`] characters from `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIdentifierValidator;

impl IdentifierValidator for DefaultIdentifierValidator {
    fn validate(&self, id: &str) -> bool {
        !id.is_empty()
            && id.len() <= MAX_IDENTIFIER_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}
