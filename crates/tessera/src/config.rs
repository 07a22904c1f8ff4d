//! Session manager configuration.

use std::collections::HashSet;
use std::time::Duration;

use tessera_types::{AuthMechanism, HasManagerConfig, defaults};

/// Configuration for a [`DistributableSessionManager`](crate::DistributableSessionManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long `stop()` waits for in-flight requests.
    pub stop_timeout: Duration,
    /// Max-inactive interval given to new sessions (zero = never expire).
    pub default_session_timeout: Duration,
    /// Upper bound on active sessions; `None` is unlimited.
    pub max_active_sessions: Option<usize>,
    /// Hand out throwaway sessions when the response was already committed.
    pub orphan_sessions: bool,
    /// Attribute names stored in the node-local context only.
    pub local_context_attributes: HashSet<String>,
    /// Mechanisms whose authenticated session stays node-local.
    pub silent_mechanisms: Vec<AuthMechanism>,
    /// Route appended to outgoing identifiers.
    pub route: Option<String>,
    pub route_separator: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            stop_timeout: defaults::stop_timeout(),
            default_session_timeout: defaults::session_timeout(),
            max_active_sessions: None,
            orphan_sessions: false,
            local_context_attributes: HashSet::from([
                defaults::WEB_SOCKET_CHANNELS_ATTRIBUTE.to_string()
            ]),
            silent_mechanisms: AuthMechanism::silent_defaults().to_vec(),
            route: None,
            route_separator: defaults::ROUTE_SEPARATOR.to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any configuration provider.
    pub fn from_provider<P: HasManagerConfig>(provider: &P) -> Self {
        Self {
            stop_timeout: provider.stop_timeout(),
            default_session_timeout: provider.default_session_timeout(),
            max_active_sessions: provider.max_active_sessions(),
            orphan_sessions: provider.orphan_sessions(),
            local_context_attributes: provider.local_context_attributes().into_iter().collect(),
            silent_mechanisms: provider.silent_mechanisms(),
            route: provider.route(),
            route_separator: provider.route_separator(),
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_default_session_timeout(mut self, timeout: Duration) -> Self {
        self.default_session_timeout = timeout;
        self
    }

    pub fn with_max_active_sessions(mut self, max: usize) -> Self {
        self.max_active_sessions = Some(max);
        self
    }

    pub fn with_orphan_sessions(mut self, enabled: bool) -> Self {
        self.orphan_sessions = enabled;
        self
    }

    pub fn with_local_context_attribute(mut self, name: impl Into<String>) -> Self {
        self.local_context_attributes.insert(name.into());
        self
    }

    pub fn with_silent_mechanisms(mut self, mechanisms: Vec<AuthMechanism>) -> Self {
        self.silent_mechanisms = mechanisms;
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_route_separator(mut self, separator: impl Into<String>) -> Self {
        self.route_separator = separator.into();
        self
    }

    pub(crate) fn is_local_only(&self, name: &str) -> bool {
        self.local_context_attributes.contains(name)
    }

    pub(crate) fn is_silent(&self, mechanism: &AuthMechanism) -> bool {
        self.silent_mechanisms.contains(mechanism)
    }
}
