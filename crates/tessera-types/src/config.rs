//! Configuration traits for decoupled config passing between crates.
//!
//! The session core depends on these capabilities rather than on the
//! concrete TOML schema in `tessera-config`, so embedders can feed it from
//! any source.

use std::time::Duration;

use crate::auth::AuthMechanism;

/// Base trait for all configuration types.
///
/// Implementations should be cheaply cloneable and thread-safe.
pub trait ConfigProvider: Clone + Send + Sync + 'static {}

/// Distributable session manager configuration.
pub trait HasManagerConfig: ConfigProvider {
    /// Upper bound on how long `stop()` waits for in-flight requests to drain.
    fn stop_timeout(&self) -> Duration;

    /// Max-inactive interval applied to newly created sessions.
    ///
    /// `Duration::ZERO` means sessions never expire.
    fn default_session_timeout(&self) -> Duration;

    /// Maximum number of concurrently active sessions (None = unlimited).
    fn max_active_sessions(&self) -> Option<usize> {
        None
    }

    /// Whether session creation after the response has started yields a
    /// throwaway orphan session instead of an error.
    fn orphan_sessions(&self) -> bool {
        false
    }

    /// Attribute names that live only in the node-local context.
    fn local_context_attributes(&self) -> Vec<String> {
        vec![defaults::WEB_SOCKET_CHANNELS_ATTRIBUTE.to_string()]
    }

    /// Authentication mechanisms that can re-authenticate without user
    /// interaction.
    fn silent_mechanisms(&self) -> Vec<AuthMechanism> {
        AuthMechanism::silent_defaults().to_vec()
    }

    /// Route of this node, appended to outgoing session identifiers.
    fn route(&self) -> Option<String> {
        None
    }

    /// Separator between a session identifier and its route.
    fn route_separator(&self) -> String {
        defaults::ROUTE_SEPARATOR.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Default values
// ─────────────────────────────────────────────────────────────────────────────

/// Default manager configuration values.
pub mod defaults {
    use std::time::Duration;

    pub const STOP_TIMEOUT_SECS: u64 = 30;
    pub const SESSION_TIMEOUT_SECS: u64 = 1800;
    pub const ROUTE_SEPARATOR: &str = ".";
    pub const SWEEP_INTERVAL_SECS: u64 = 60;
    /// Reserved attribute holding the cached authenticated session.
    pub const AUTHENTICATED_SESSION_ATTRIBUTE: &str = "tessera.AuthenticatedSession";
    /// Reserved attribute holding live web socket channels.
    pub const WEB_SOCKET_CHANNELS_ATTRIBUTE: &str = "tessera.WebSocketChannels";

    pub fn stop_timeout() -> Duration {
        Duration::from_secs(STOP_TIMEOUT_SECS)
    }

    pub fn session_timeout() -> Duration {
        Duration::from_secs(SESSION_TIMEOUT_SECS)
    }

    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Standalone provider
// ─────────────────────────────────────────────────────────────────────────────

/// Standalone manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfigProvider {
    pub stop_timeout: Duration,
    pub default_session_timeout: Duration,
    pub max_active_sessions: Option<usize>,
    pub orphan_sessions: bool,
    pub route: Option<String>,
}

impl Default for ManagerConfigProvider {
    fn default() -> Self {
        Self {
            stop_timeout: defaults::stop_timeout(),
            default_session_timeout: defaults::session_timeout(),
            max_active_sessions: None,
            orphan_sessions: false,
            route: None,
        }
    }
}

impl ConfigProvider for ManagerConfigProvider {}

impl HasManagerConfig for ManagerConfigProvider {
    fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    fn default_session_timeout(&self) -> Duration {
        self.default_session_timeout
    }

    fn max_active_sessions(&self) -> Option<usize> {
        self.max_active_sessions
    }

    fn orphan_sessions(&self) -> bool {
        self.orphan_sessions
    }

    fn route(&self) -> Option<String> {
        self.route.clone()
    }
}
