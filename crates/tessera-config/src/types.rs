//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [manager]                # session manager behaviour
//! [routing]                # session id routing suffix
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_types::{AuthMechanism, ConfigProvider, HasManagerConfig, defaults};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Session manager configuration.
    pub manager: Option<ManagerSection>,

    /// Routing configuration.
    pub routing: Option<RoutingSection>,
}

impl TesseraConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: TesseraConfig) {
        if other.manager.is_some() {
            self.manager = other.manager;
        }
        if other.routing.is_some() {
            self.routing = other.routing;
        }
    }

    /// Manager section, or defaults if absent.
    pub fn manager(&self) -> ManagerSection {
        self.manager.clone().unwrap_or_default()
    }

    /// Routing section, or defaults if absent.
    pub fn routing(&self) -> RoutingSection {
        self.routing.clone().unwrap_or_default()
    }

    /// Check values the session manager relies on.
    pub fn validate(&self) -> Result<()> {
        let routing = self.routing();

        if routing.separator.is_empty() {
            return Err(ConfigError::Invalid {
                field: "routing.separator".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        // The separator must never occur inside a session identifier.
        if routing
            .separator
            .chars()
            .any(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid {
                field: "routing.separator".to_string(),
                reason: format!(
                    "'{}' overlaps the session identifier alphabet",
                    routing.separator
                ),
            });
        }

        if let Some(route) = &routing.route {
            if route.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "routing.route".to_string(),
                    reason: "must not be empty when set".to_string(),
                });
            }
            if route.contains(&routing.separator) {
                return Err(ConfigError::Invalid {
                    field: "routing.route".to_string(),
                    reason: format!("must not contain separator '{}'", routing.separator),
                });
            }
        }

        if self.manager().max_active_sessions == Some(0) {
            return Err(ConfigError::Invalid {
                field: "manager.max_active_sessions".to_string(),
                reason: "must be at least 1 (omit for unlimited)".to_string(),
            });
        }

        Ok(())
    }
}

impl ConfigProvider for TesseraConfig {}

impl HasManagerConfig for TesseraConfig {
    fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.manager().stop_timeout_secs)
    }

    fn default_session_timeout(&self) -> Duration {
        Duration::from_secs(self.manager().default_session_timeout_secs)
    }

    fn max_active_sessions(&self) -> Option<usize> {
        self.manager().max_active_sessions
    }

    fn orphan_sessions(&self) -> bool {
        self.manager().orphan_sessions
    }

    fn local_context_attributes(&self) -> Vec<String> {
        self.manager().local_context_attributes
    }

    fn silent_mechanisms(&self) -> Vec<AuthMechanism> {
        self.manager().silent_mechanisms
    }

    fn route(&self) -> Option<String> {
        self.routing().route
    }

    fn route_separator(&self) -> String {
        self.routing().separator
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session manager configuration.
///
/// ```toml
/// [manager]
/// stop_timeout_secs = 30
/// default_session_timeout_secs = 1800
/// max_active_sessions = 10000
/// orphan_sessions = false
/// local_context_attributes = ["tessera.WebSocketChannels"]
/// silent_mechanisms = ["BASIC", "DIGEST", "CLIENT_CERT"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSection {
    /// Seconds `stop()` waits for in-flight requests before stopping anyway.
    pub stop_timeout_secs: u64,
    /// Max-inactive interval for new sessions, in seconds (0 = never expire).
    pub default_session_timeout_secs: u64,
    /// Maximum concurrently active sessions (absent = unlimited).
    pub max_active_sessions: Option<usize>,
    /// Hand out throwaway sessions when the response was already committed.
    pub orphan_sessions: bool,
    /// Attribute names kept in the node-local context only.
    pub local_context_attributes: Vec<String>,
    /// Mechanisms whose authenticated session stays node-local.
    pub silent_mechanisms: Vec<AuthMechanism>,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            stop_timeout_secs: defaults::STOP_TIMEOUT_SECS,
            default_session_timeout_secs: defaults::SESSION_TIMEOUT_SECS,
            max_active_sessions: None,
            orphan_sessions: false,
            local_context_attributes: vec![defaults::WEB_SOCKET_CHANNELS_ATTRIBUTE.to_string()],
            silent_mechanisms: AuthMechanism::silent_defaults().to_vec(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session identifier routing.
///
/// ```toml
/// [routing]
/// route = "node-1"
/// separator = "."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    /// Route of this node; absent disables the routing suffix.
    pub route: Option<String>,
    /// Separator between identifier and route.
    pub separator: String,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            route: None,
            separator: defaults::ROUTE_SEPARATOR.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TesseraConfig::from_toml("").unwrap();
        assert!(config.manager.is_none());
        assert_eq!(config.stop_timeout(), Duration::from_secs(30));
        assert_eq!(config.default_session_timeout(), Duration::from_secs(1800));
        assert_eq!(config.route(), None);
        assert_eq!(config.route_separator(), ".");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let config = TesseraConfig::from_toml(
            r#"
[manager]
stop_timeout_secs = 5
default_session_timeout_secs = 60
max_active_sessions = 100
orphan_sessions = true
local_context_attributes = ["ws", "sse"]
silent_mechanisms = ["BASIC"]

[routing]
route = "node-1"
separator = "."
"#,
        )
        .unwrap();

        assert_eq!(config.stop_timeout(), Duration::from_secs(5));
        assert_eq!(config.default_session_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_active_sessions(), Some(100));
        assert!(config.orphan_sessions());
        assert_eq!(config.local_context_attributes(), vec!["ws", "sse"]);
        assert_eq!(config.silent_mechanisms(), vec![AuthMechanism::Basic]);
        assert_eq!(config.route().as_deref(), Some("node-1"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config = TesseraConfig::from_toml(
            r#"
[manager]
orphan_sessions = true
"#,
        )
        .unwrap();
        let manager = config.manager();
        assert!(manager.orphan_sessions);
        assert_eq!(manager.stop_timeout_secs, defaults::STOP_TIMEOUT_SECS);
        assert_eq!(
            manager.local_context_attributes,
            vec![defaults::WEB_SOCKET_CHANNELS_ATTRIBUTE.to_string()]
        );
    }

    #[test]
    fn test_merge_overrides_sections() {
        let mut base = TesseraConfig::from_toml(
            r#"
[manager]
stop_timeout_secs = 5

[routing]
route = "a"
"#,
        )
        .unwrap();
        let overlay = TesseraConfig::from_toml(
            r#"
[routing]
route = "b"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.route().as_deref(), Some("b"));
        assert_eq!(base.stop_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_route_containing_separator() {
        let config = TesseraConfig::from_toml(
            r#"
[routing]
route = "node.1"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "routing.route"));
    }

    #[test]
    fn test_validate_separator_in_id_alphabet() {
        let config = TesseraConfig::from_toml(
            r#"
[routing]
separator = "-"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_max_active() {
        let config = TesseraConfig::from_toml(
            r#"
[manager]
max_active_sessions = 0
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = TesseraConfig::new();
        config.routing = Some(RoutingSection {
            route: Some("node-7".to_string()),
            separator: ":".to_string(),
        });
        let text = config.to_toml().unwrap();
        let back = TesseraConfig::from_toml(&text).unwrap();
        assert_eq!(back, config);
    }
}
