//! Session lifecycle event vocabulary.
//!
//! These types are shared between the session core (which dispatches the
//! events) and listener implementations that live elsewhere.

use serde::{Deserialize, Serialize};

/// Why a session was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestroyedReason {
    /// Explicitly invalidated by request logic.
    Invalidated,
    /// Timed out in the session store.
    Timeout,
    /// The owning deployment was stopped.
    Undeploy,
}

impl std::fmt::Display for DestroyedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestroyedReason::Invalidated => write!(f, "invalidated"),
            DestroyedReason::Timeout => write!(f, "timeout"),
            DestroyedReason::Undeploy => write!(f, "undeploy"),
        }
    }
}

/// A lifecycle event a session listener can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SessionEventKind {
    /// A new session was created.
    Created,
    /// A session was destroyed.
    Destroyed,
    /// An attribute was set for the first time.
    AttributeAdded,
    /// An attribute was replaced with a different value.
    AttributeUpdated,
    /// An attribute was removed.
    AttributeRemoved,
    /// The session identifier was rotated.
    IdChanged,
}

impl std::fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEventKind::Created => write!(f, "Created"),
            SessionEventKind::Destroyed => write!(f, "Destroyed"),
            SessionEventKind::AttributeAdded => write!(f, "AttributeAdded"),
            SessionEventKind::AttributeUpdated => write!(f, "AttributeUpdated"),
            SessionEventKind::AttributeRemoved => write!(f, "AttributeRemoved"),
            SessionEventKind::IdChanged => write!(f, "IdChanged"),
        }
    }
}
