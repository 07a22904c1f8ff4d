//! Shared types for the Tessera distributable session manager.

pub mod auth;
pub mod config;
pub mod events;

pub use auth::{Account, AuthMechanism, AuthenticatedSession};
pub use config::{ConfigProvider, HasManagerConfig, ManagerConfigProvider, defaults};
pub use events::{DestroyedReason, SessionEventKind};
