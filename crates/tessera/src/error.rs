//! Error types for session manager operations.

use crate::store::StoreError;

/// Error type for session manager and session handle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session creation was attempted without a cookie/routing configuration.
    #[error("No session cookie configuration supplied")]
    NoCookieConfig,

    /// The requested identifier is already in use.
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// A new session was requested after the response started.
    #[error("Cannot create a session after the response has been committed")]
    ResponseAlreadyCommitted,

    /// The manager is stopping or stopped.
    #[error("Session manager is not started")]
    ManagerStopped,

    /// The value cannot be marshalled by the session store.
    #[error("Attribute '{name}' is not serializable: {reason}")]
    NotSerializable { name: String, reason: String },

    /// A reserved attribute was given a value of the wrong shape.
    #[error("Attribute '{name}' has an invalid value: {reason}")]
    InvalidAttribute { name: String, reason: String },

    /// The session was invalidated; the handle is terminal.
    #[error("Session is no longer valid: {0}")]
    InvalidSession(String),

    /// Creating another session would exceed the configured limit.
    #[error("Too many active sessions (max {max})")]
    TooManyActiveSessions { max: usize },

    /// Error from the session store.
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for session manager operations.
pub type Result<T> = std::result::Result<T, Error>;
