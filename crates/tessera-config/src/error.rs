//! Configuration error types.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing a config file failed.
    #[error("cannot access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot render TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// A node override in the environment could not be applied.
    #[error("environment variable {var}: {reason}")]
    Environment { var: String, reason: String },

    /// A field holds a value the session manager cannot work with.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}
