//! Authentication records cached in a session.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Mechanism that produced an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMechanism {
    Basic,
    Digest,
    ClientCert,
    Form,
    /// Any mechanism not known to the session layer.
    Other(String),
}

impl AuthMechanism {
    /// Mechanisms that carry credentials on every request, so the
    /// authenticated identity can be re-derived on any node.
    pub fn silent_defaults() -> &'static [AuthMechanism] {
        &[
            AuthMechanism::Basic,
            AuthMechanism::Digest,
            AuthMechanism::ClientCert,
        ]
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMechanism::Basic => write!(f, "BASIC"),
            AuthMechanism::Digest => write!(f, "DIGEST"),
            AuthMechanism::ClientCert => write!(f, "CLIENT_CERT"),
            AuthMechanism::Form => write!(f, "FORM"),
            AuthMechanism::Other(name) => write!(f, "{}", name),
        }
    }
}

impl std::str::FromStr for AuthMechanism {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "BASIC" => AuthMechanism::Basic,
            "DIGEST" => AuthMechanism::Digest,
            "CLIENT_CERT" | "CLIENT-CERT" => AuthMechanism::ClientCert,
            "FORM" => AuthMechanism::Form,
            _ => AuthMechanism::Other(s.to_string()),
        })
    }
}

/// An authenticated principal and its roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub principal: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Account {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }
}

/// Identity cached in a session after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub account: Account,
    pub mechanism: AuthMechanism,
}

impl AuthenticatedSession {
    pub fn new(account: Account, mechanism: AuthMechanism) -> Self {
        Self { account, mechanism }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mechanism_parse() {
        assert_eq!("basic".parse::<AuthMechanism>().unwrap(), AuthMechanism::Basic);
        assert_eq!(
            "CLIENT-CERT".parse::<AuthMechanism>().unwrap(),
            AuthMechanism::ClientCert
        );
        assert_eq!(
            "SPNEGO".parse::<AuthMechanism>().unwrap(),
            AuthMechanism::Other("SPNEGO".to_string())
        );
    }

    #[test]
    fn test_authenticated_session_json() {
        let auth = AuthenticatedSession::new(
            Account::new("alice").with_role("admin"),
            AuthMechanism::Form,
        );
        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(json["mechanism"], "FORM");
        assert_eq!(json["account"]["principal"], "alice");

        let back: AuthenticatedSession = serde_json::from_value(json).unwrap();
        assert_eq!(back, auth);
    }
}
