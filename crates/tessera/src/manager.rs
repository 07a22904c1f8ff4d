//! Distributable session manager.
//!
//! The manager is the per-deployment entry point: it resolves the session
//! for a request, creates new sessions, and coordinates shutdown with the
//! requests still in flight.
//!
//! ```text
//! request ──► get_session / create_session
//!               │  shared permit (fails fast once stop() begins)
//!               │  batch opened, session found/created, batch suspended
//!               ▼
//!            SessionHandle  ──► request_done: batch committed, permit released
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::codec::{
    CodecSessionConfig, DefaultIdentifierValidator, IdentifierCodec, IdentifierValidator,
    RoutingCodec,
};
use crate::config::ManagerConfig;
use crate::context::{RequestContext, SessionCookieConfig, SimpleSessionConfig};
use crate::error::{Error, Result};
use crate::expiration::ExpirationNotifier;
use crate::handle::SessionHandle;
use crate::lifecycle::{LifecycleLock, ManagerState, ReadPermit, WritePermit};
use crate::listener::SessionListeners;
use crate::orphan::OrphanSession;
use crate::stats::SessionStatistics;
use crate::store::{Batch, BatchScope, Session, SessionStore};

/// State shared between the manager, its handles, and its expiration
/// notifier.
pub(crate) struct ManagerShared {
    pub(crate) deployment: String,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) listeners: SessionListeners,
    pub(crate) statistics: SessionStatistics,
    pub(crate) config: ManagerConfig,
    codec: Arc<dyn IdentifierCodec>,
    validator: Arc<dyn IdentifierValidator>,
    lock: LifecycleLock,
    state: AtomicU8,
    /// Exclusive permit held while the manager is not serving requests.
    stop_permit: Mutex<Option<WritePermit>>,
}

impl ManagerShared {
    pub(crate) fn wrap_config(
        &self,
        config: Arc<dyn SessionCookieConfig>,
    ) -> Arc<dyn SessionCookieConfig> {
        Arc::new(CodecSessionConfig::new(config, self.codec.clone()))
    }

    fn state(&self) -> ManagerState {
        ManagerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The handle this request already holds. One whose session has since
    /// been invalidated is closed and detached instead.
    fn attached(&self, ctx: &mut RequestContext) -> Option<Arc<SessionHandle>> {
        let handle = ctx.session(&self.deployment)?;
        if handle.is_valid() {
            return Some(handle);
        }
        trace!(deployment = %self.deployment, session_id = %handle.id(), "Dropping stale handle");
        handle.request_done(ctx);
        None
    }

    fn set_state(&self, state: ManagerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn acquire(&self) -> Result<ReadPermit> {
        let permit = self.lock.try_read().ok_or(Error::ManagerStopped)?;
        if self.state() != ManagerState::Started {
            return Err(Error::ManagerStopped);
        }
        Ok(permit)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`DistributableSessionManager`].
pub struct ManagerBuilder {
    deployment: String,
    store: Arc<dyn SessionStore>,
    config: ManagerConfig,
    codec: Option<Arc<dyn IdentifierCodec>>,
    validator: Arc<dyn IdentifierValidator>,
}

impl ManagerBuilder {
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the routing codec derived from the configured route.
    pub fn with_codec(mut self, codec: Arc<dyn IdentifierCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn IdentifierValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn build(self) -> DistributableSessionManager {
        let config = self.config;
        let codec = self.codec.unwrap_or_else(|| {
            Arc::new(
                RoutingCodec::local(config.route.clone())
                    .with_separator(config.route_separator.clone()),
            )
        });

        // Until started, the manager behaves as stopped.
        let lock = LifecycleLock::new();
        let stop_permit = lock.try_write();

        self.store
            .set_default_max_inactive_interval(config.default_session_timeout);

        let shared = Arc::new(ManagerShared {
            deployment: self.deployment,
            store: self.store,
            listeners: SessionListeners::new(),
            statistics: SessionStatistics::new(),
            config,
            codec,
            validator: self.validator,
            lock,
            state: AtomicU8::new(ManagerState::Created.as_u8()),
            stop_permit: Mutex::new(stop_permit),
        });

        shared
            .store
            .add_expiration_listener(Arc::new(ExpirationNotifier::new(Arc::downgrade(&shared))));

        DistributableSessionManager { shared }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Session manager for one deployment, backed by a replicated store.
pub struct DistributableSessionManager {
    shared: Arc<ManagerShared>,
}

impl DistributableSessionManager {
    /// `store` must be dedicated to this deployment; the manager registers
    /// itself for every expiration the store reports.
    pub fn builder(deployment: impl Into<String>, store: Arc<dyn SessionStore>) -> ManagerBuilder {
        ManagerBuilder {
            deployment: deployment.into(),
            store,
            config: ManagerConfig::default(),
            codec: None,
            validator: Arc::new(DefaultIdentifierValidator),
        }
    }

    pub fn new(
        deployment: impl Into<String>,
        store: Arc<dyn SessionStore>,
        config: ManagerConfig,
    ) -> Self {
        Self::builder(deployment, store).with_config(config).build()
    }

    pub fn deployment(&self) -> &str {
        &self.shared.deployment
    }

    pub fn state(&self) -> ManagerState {
        self.shared.state()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn statistics(&self) -> &SessionStatistics {
        &self.shared.statistics
    }

    pub fn listeners(&self) -> &SessionListeners {
        &self.shared.listeners
    }

    pub fn default_max_inactive_interval(&self) -> Duration {
        self.shared.store.default_max_inactive_interval()
    }

    /// Timeout for sessions created from now on; zero means never expire.
    pub fn set_default_max_inactive_interval(&self, timeout: Duration) {
        self.shared.store.set_default_max_inactive_interval(timeout);
    }

    /// Start serving requests.
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let mut stop_permit = shared.stop_permit.lock();
        if shared.state() == ManagerState::Started {
            return Ok(());
        }

        shared.store.start()?;
        shared.statistics.reset();
        shared.set_state(ManagerState::Started);
        stop_permit.take();

        info!(deployment = %shared.deployment, "Session manager started");
        Ok(())
    }

    /// Stop serving requests.
    ///
    /// New requests fail with [`Error::ManagerStopped`] as soon as this is
    /// called. In-flight requests get up to the configured stop timeout to
    /// finish; after that the store is stopped regardless.
    pub fn stop(&self) {
        let shared = &self.shared;
        let mut stop_permit = shared.stop_permit.lock();
        match shared.state() {
            ManagerState::Started => {}
            ManagerState::Created => {
                shared.set_state(ManagerState::Stopped);
                return;
            }
            ManagerState::Stopping | ManagerState::Stopped => return,
        }

        shared.set_state(ManagerState::Stopping);
        let timeout = shared.config.stop_timeout;
        match shared.lock.try_write_for(timeout) {
            Some(permit) => *stop_permit = Some(permit),
            None => warn!(
                deployment = %shared.deployment,
                timeout_ms = timeout.as_millis() as u64,
                "Timed out waiting for in-flight requests, stopping anyway"
            ),
        }

        shared.store.stop();
        shared.set_state(ManagerState::Stopped);
        info!(deployment = %shared.deployment, "Session manager stopped");
    }

    /// Create a session for this request and attach it to the request.
    ///
    /// The identifier presented by the client is reused when it is valid,
    /// otherwise a fresh one is minted.
    pub fn create_session(
        &self,
        ctx: &mut RequestContext,
        config: Option<Arc<dyn SessionCookieConfig>>,
    ) -> Result<Arc<SessionHandle>> {
        let shared = &self.shared;
        let config = shared.wrap_config(config.ok_or(Error::NoCookieConfig)?);

        if ctx.is_response_started() {
            if !shared.config.orphan_sessions {
                return Err(Error::ResponseAlreadyCommitted);
            }
            if shared.state() != ManagerState::Started {
                return Err(Error::ManagerStopped);
            }
            return Ok(self.create_orphan(ctx, config));
        }

        if let Some(existing) = shared.attached(ctx) {
            return Err(Error::AlreadyExists(existing.id()));
        }

        let id = match config.find_session_id(ctx) {
            Some(id) if shared.validator.validate(&id) => id,
            _ => shared.store.create_identifier(),
        };

        let permit = shared.acquire()?;

        if let Some(max) = shared.config.max_active_sessions
            && shared.statistics.active() >= max as u64
        {
            shared.statistics.record_rejected();
            warn!(deployment = %shared.deployment, max, "Rejected session creation");
            return Err(Error::TooManyActiveSessions { max });
        }

        let (session, batch) = self
            .open(|store| Ok(store.create_session(&id)?))?
            .ok_or_else(|| Error::AlreadyExists(id.clone()))?;

        config.set_session_id(ctx, &id);
        let handle = Arc::new(SessionHandle::new(
            shared.clone(),
            session,
            config,
            Some(batch),
            Some(permit),
        ));

        shared.listeners.session_created(handle.as_ref());
        shared.statistics.record_created();
        ctx.attach_session(&shared.deployment, handle.clone());

        debug!(deployment = %shared.deployment, session_id = %id, "Created session");
        Ok(handle)
    }

    /// Resolve the session for this request, if the client presented a
    /// valid identifier.
    pub fn get_session(
        &self,
        ctx: &mut RequestContext,
        config: Arc<dyn SessionCookieConfig>,
    ) -> Result<Option<Arc<SessionHandle>>> {
        let shared = &self.shared;
        if let Some(handle) = shared.attached(ctx) {
            return Ok(Some(handle));
        }

        let config = shared.wrap_config(config);
        let Some(id) = config.find_session_id(ctx) else {
            return Ok(None);
        };
        if !shared.validator.validate(&id) {
            trace!(deployment = %shared.deployment, "Ignoring malformed session identifier");
            return Ok(None);
        }

        let permit = shared.acquire()?;
        let Some((session, batch)) = self.open(|store| find_valid(store, &id))? else {
            trace!(deployment = %shared.deployment, session_id = %id, "Session not found");
            return Ok(None);
        };

        let handle = Arc::new(SessionHandle::new(
            shared.clone(),
            session,
            config,
            Some(batch),
            Some(permit),
        ));
        ctx.attach_session(&shared.deployment, handle.clone());
        Ok(Some(handle))
    }

    /// Look up a session outside any client request.
    ///
    /// The handle takes no lifecycle permit and is not attached to a request;
    /// the caller must [`close`](SessionHandle::close) it.
    pub fn find_session(&self, id: &str) -> Result<Option<Arc<SessionHandle>>> {
        let shared = &self.shared;
        if !shared.validator.validate(id) {
            return Ok(None);
        }

        let Some((session, batch)) = self.open(|store| find_valid(store, id))? else {
            return Ok(None);
        };

        let config: Arc<dyn SessionCookieConfig> = Arc::new(SimpleSessionConfig::new(id));
        Ok(Some(Arc::new(SessionHandle::new(
            shared.clone(),
            session,
            config,
            Some(batch),
            None,
        ))))
    }

    /// Run `op` inside a fresh batch and detach the batch from this thread.
    ///
    /// The batch is discarded when `op` fails or finds nothing.
    fn open<F>(&self, op: F) -> Result<Option<(Arc<dyn Session>, Box<dyn Batch>)>>
    where
        F: FnOnce(&dyn SessionStore) -> Result<Option<Arc<dyn Session>>>,
    {
        let store = self.shared.store.as_ref();
        let _scope = BatchScope::isolated(store.batcher());
        let batch = store.batcher().create_batch()?;
        match op(store) {
            Ok(Some(session)) => Ok(Some((session, batch))),
            Ok(None) => {
                batch.discard();
                Ok(None)
            }
            Err(e) => {
                batch.discard();
                Err(e)
            }
        }
    }

    fn create_orphan(
        &self,
        ctx: &mut RequestContext,
        config: Arc<dyn SessionCookieConfig>,
    ) -> Arc<SessionHandle> {
        let shared = &self.shared;
        let session = Arc::new(OrphanSession::new(
            shared.store.create_identifier(),
            shared.store.default_max_inactive_interval(),
        ));
        debug!(
            deployment = %shared.deployment,
            session_id = %session.id(),
            "Created orphan session"
        );
        let handle = Arc::new(SessionHandle::orphan(shared.clone(), session, config));
        ctx.attach_session(&shared.deployment, handle.clone());
        handle
    }
}

fn find_valid(store: &dyn SessionStore, id: &str) -> Result<Option<Arc<dyn Session>>> {
    Ok(store.find_session(id)?.filter(|session| session.is_valid()))
}
