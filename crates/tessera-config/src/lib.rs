//! Configuration for the Tessera distributable session manager.
//!
//! - `[manager]`: stop timeout, session timeout, active-session limit,
//!   orphan sessions, local-context attributes, silent mechanisms
//! - `[routing]`: node route and separator
//! - layering of user file, deployment file, and node environment
//!
//! [`TesseraConfig`] implements [`tessera_types::HasManagerConfig`], so it
//! can be handed straight to the session manager.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    Layer, LayerSource, LoadedConfig, load_config, load_config_file, load_config_from,
    save_config, user_config_dir,
};
pub use error::{ConfigError, Result};
pub use types::{ManagerSection, RoutingSection, TesseraConfig};
