//! Distributable session manager.
//!
//! Coordinates the lifecycle of web sessions stored in a replicated session
//! store:
//!
//! - [`DistributableSessionManager`]: per-deployment entry point that creates
//!   and resolves sessions and drains in-flight requests on stop
//! - [`SessionHandle`]: request-scoped view of one session, owning the
//!   request's store batch and lifecycle permit
//! - [`SessionStatistics`]: lock-free lifetime and activity counters
//! - [`RoutingCodec`]: appends and strips the node route on session ids
//! - [`store`]: the store contracts plus an in-memory implementation
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera::{
//!     CookieSessionConfig, DistributableSessionManager, ManagerConfig, RequestContext,
//!     store::InMemorySessionStore,
//! };
//!
//! let store = Arc::new(InMemorySessionStore::new());
//! let manager = DistributableSessionManager::new("app", store, ManagerConfig::new());
//! manager.start().unwrap();
//!
//! let mut ctx = RequestContext::new();
//! let handle = manager
//!     .create_session(&mut ctx, Some(Arc::new(CookieSessionConfig::default())))
//!     .unwrap();
//! handle.set_attribute("user", Some("alice".into())).unwrap();
//! ctx.complete();
//!
//! manager.stop();
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod expiration;
pub mod handle;
pub mod lifecycle;
pub mod listener;
pub mod manager;
pub mod orphan;
pub mod stats;
pub mod store;
pub mod value;

pub use codec::{
    CodecSessionConfig, DefaultIdentifierValidator, IdentifierCodec, IdentifierValidator,
    IdentityCodec, LocalRouteLocator, RouteLocator, RoutingCodec,
};
pub use config::ManagerConfig;
pub use context::{
    CookieSessionConfig, RequestContext, ResponseCookie, SessionCookieConfig, SimpleSessionConfig,
};
pub use error::{Error, Result};
pub use expiration::ExpirationNotifier;
pub use handle::SessionHandle;
pub use lifecycle::{LifecycleLock, ManagerState, ReadPermit, WritePermit};
pub use listener::{SessionListener, SessionListeners, SessionView};
pub use manager::{DistributableSessionManager, ManagerBuilder};
pub use orphan::OrphanSession;
pub use stats::{SessionStatistics, StatisticsSnapshot};
pub use value::AttributeValue;
