//! Request-scoped session handle.
//!
//! A handle binds one session to one request. It owns the request's store
//! batch and lifecycle permit and releases both exactly once: when the
//! request completes, when the session is invalidated through it, or when
//! it discovers the session was invalidated elsewhere.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tessera_types::defaults::AUTHENTICATED_SESSION_ATTRIBUTE;
use tessera_types::{AuthenticatedSession, DestroyedReason};
use tracing::{debug, trace, warn};

use crate::context::{RequestContext, SessionCookieConfig};
use crate::error::{Error, Result};
use crate::lifecycle::ReadPermit;
use crate::listener::SessionView;
use crate::manager::ManagerShared;
use crate::store::{Batch, BatchScope, Session, StoreResult};
use crate::value::AttributeValue;

const ACTIVE: u8 = 0;
const INVALIDATING: u8 = 1;
const INVALIDATED: u8 = 2;

/// The session a handle currently refers to. Replaced as a unit when the
/// identifier changes.
struct Binding {
    session: Arc<dyn Session>,
    config: Arc<dyn SessionCookieConfig>,
}

struct Resources {
    batch: Option<Box<dyn Batch>>,
    permit: Option<ReadPermit>,
}

impl Resources {
    /// Commit the batch, then give back the permit.
    fn release(self) -> StoreResult<()> {
        let result = match self.batch {
            Some(batch) => batch.close(),
            None => Ok(()),
        };
        drop(self.permit);
        result
    }
}

/// A session as seen by one request.
pub struct SessionHandle {
    manager: Arc<ManagerShared>,
    binding: ArcSwap<Binding>,
    resources: Mutex<Option<Resources>>,
    state: AtomicU8,
    acquired_at: DateTime<Utc>,
    orphan: bool,
}

impl SessionHandle {
    pub(crate) fn new(
        manager: Arc<ManagerShared>,
        session: Arc<dyn Session>,
        config: Arc<dyn SessionCookieConfig>,
        batch: Option<Box<dyn Batch>>,
        permit: Option<ReadPermit>,
    ) -> Self {
        Self {
            manager,
            binding: ArcSwap::from_pointee(Binding { session, config }),
            resources: Mutex::new(Some(Resources { batch, permit })),
            state: AtomicU8::new(ACTIVE),
            acquired_at: Utc::now(),
            orphan: false,
        }
    }

    pub(crate) fn orphan(
        manager: Arc<ManagerShared>,
        session: Arc<dyn Session>,
        config: Arc<dyn SessionCookieConfig>,
    ) -> Self {
        Self {
            orphan: true,
            ..Self::new(manager, session, config, None, None)
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> String {
        self.binding.load().session.id().to_string()
    }

    /// Whether this handle is usable and its session still exists.
    pub fn is_valid(&self) -> bool {
        self.state.load(Ordering::Acquire) != INVALIDATED && self.binding.load().session.is_valid()
    }

    /// Whether this is a throwaway session that is never persisted.
    pub fn is_orphan(&self) -> bool {
        self.orphan
    }

    /// Whether the session was created by this request.
    pub fn is_new(&self) -> Result<bool> {
        self.guarded(|b| Ok(b.session.metadata()?.is_new))
    }

    pub fn creation_time(&self) -> Result<DateTime<Utc>> {
        self.guarded(|b| Ok(b.session.metadata()?.creation_time))
    }

    /// Start of the most recent completed access.
    pub fn last_accessed_time(&self) -> Result<DateTime<Utc>> {
        self.guarded(|b| Ok(b.session.metadata()?.last_access_start))
    }

    pub fn max_inactive_interval(&self) -> Result<Duration> {
        self.guarded(|b| Ok(b.session.metadata()?.timeout))
    }

    /// Zero means the session never expires.
    pub fn set_max_inactive_interval(&self, timeout: Duration) -> Result<()> {
        self.guarded(|b| Ok(b.session.set_timeout(timeout)?))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Attributes
    // ─────────────────────────────────────────────────────────────────────

    pub fn attribute_names(&self) -> Result<Vec<String>> {
        self.guarded(|b| Ok(b.session.attribute_names()?))
    }

    pub fn get_attribute(&self, name: &str) -> Result<Option<AttributeValue>> {
        self.guarded(|b| {
            if name == AUTHENTICATED_SESSION_ATTRIBUTE {
                if let Some(value) = b.session.attribute(name)? {
                    return Ok(Some(value));
                }
                return Ok(b.session.local_context().lock().get(name).cloned());
            }
            if self.manager.config.is_local_only(name) {
                return Ok(b.session.local_context().lock().get(name).cloned());
            }
            Ok(b.session.attribute(name)?)
        })
    }

    /// The cached login, from either the replicated or the local copy.
    pub fn authenticated_session(&self) -> Result<Option<AuthenticatedSession>> {
        Ok(self
            .get_attribute(AUTHENTICATED_SESSION_ATTRIBUTE)?
            .and_then(|value| value.authenticated_session()))
    }

    /// Set an attribute, returning the previous value. `None` removes it.
    ///
    /// Listeners see "added" when there was no previous value and "updated"
    /// when the previous value is a different object.
    pub fn set_attribute(
        &self,
        name: &str,
        value: Option<AttributeValue>,
    ) -> Result<Option<AttributeValue>> {
        let Some(value) = value else {
            return self.remove_attribute(name);
        };
        if name == AUTHENTICATED_SESSION_ATTRIBUTE {
            return self.set_authenticated_session(value);
        }
        if self.manager.config.is_local_only(name) {
            return self.guarded(|b| {
                Ok(b.session
                    .local_context()
                    .lock()
                    .insert(name.to_string(), value.clone()))
            });
        }

        let old = self.guarded(|b| {
            if !value.is_marshallable() {
                return Err(Error::NotSerializable {
                    name: name.to_string(),
                    reason: "node-local objects cannot be replicated".to_string(),
                });
            }
            Ok(b.session.set_attribute(name, value.clone())?)
        })?;

        let listeners = &self.manager.listeners;
        match &old {
            None => listeners.attribute_added(self, name, &value),
            Some(previous) if !previous.ptr_eq(&value) => {
                listeners.attribute_updated(self, name, &value, previous)
            }
            Some(_) => {}
        }
        Ok(old)
    }

    /// Marshal and set a serializable value.
    pub fn set_attribute_as<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<Option<AttributeValue>> {
        let value = AttributeValue::marshal(value).map_err(|e| Error::NotSerializable {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.set_attribute(name, Some(value))
    }

    pub fn remove_attribute(&self, name: &str) -> Result<Option<AttributeValue>> {
        if name == AUTHENTICATED_SESSION_ATTRIBUTE {
            return self.guarded(|b| {
                let replicated = b.session.remove_attribute(name)?;
                let local = b.session.local_context().lock().remove(name);
                Ok(replicated.or(local))
            });
        }
        if self.manager.config.is_local_only(name) {
            return self.guarded(|b| Ok(b.session.local_context().lock().remove(name)));
        }

        let old = self.guarded(|b| Ok(b.session.remove_attribute(name)?))?;
        if let Some(previous) = &old {
            self.manager.listeners.attribute_removed(self, name, previous);
        }
        Ok(old)
    }

    /// Logins by mechanisms that re-authenticate silently stay on this node;
    /// everything else is replicated.
    fn set_authenticated_session(&self, value: AttributeValue) -> Result<Option<AttributeValue>> {
        let name = AUTHENTICATED_SESSION_ATTRIBUTE;
        let auth = value
            .authenticated_session()
            .ok_or_else(|| Error::InvalidAttribute {
                name: name.to_string(),
                reason: "expected an authenticated session".to_string(),
            })?;

        self.guarded(|b| {
            let local = b.session.local_context();
            if self.manager.config.is_silent(&auth.mechanism) {
                let previous = local.lock().insert(name.to_string(), value.clone());
                let replicated = b.session.remove_attribute(name)?;
                Ok(previous.or(replicated))
            } else {
                let data = if value.is_marshallable() {
                    value.clone()
                } else {
                    AttributeValue::marshal(&auth).map_err(|e| Error::NotSerializable {
                        name: name.to_string(),
                        reason: e.to_string(),
                    })?
                };
                let previous = b.session.set_attribute(name, data)?;
                let stale = local.lock().remove(name);
                Ok(previous.or(stale))
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Invalidate the session.
    ///
    /// Listeners are told the session was destroyed and every attribute
    /// removed, the session cookie is cleared, and the batch is committed.
    /// The handle is unusable afterwards, even if this fails.
    ///
    /// Without a request the cookie is left alone and the handle stays
    /// attached; the manager drops it on the next lookup.
    pub fn invalidate(&self, ctx: Option<&mut RequestContext>) -> Result<()> {
        let binding = self.binding.load_full();
        let id = binding.session.id().to_string();
        if self
            .state
            .compare_exchange(ACTIVE, INVALIDATING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::InvalidSession(id));
        }

        let result = self.destroy(&binding);
        self.state.store(INVALIDATED, Ordering::Release);

        if let Some(ctx) = ctx {
            binding.config.clear_session(ctx, &id);
            ctx.detach_session(&self.manager.deployment, self);
        }
        let released = self.release(&binding);

        debug!(deployment = %self.manager.deployment, session_id = %id, "Invalidated session");
        result?;
        released?;
        Ok(())
    }

    fn destroy(&self, binding: &Binding) -> Result<()> {
        let session = &binding.session;
        if session.is_valid() && !self.orphan {
            let metadata = session.metadata()?;
            let attributes = session.attributes()?;
            let listeners = &self.manager.listeners;

            self.manager.statistics.record(&metadata);
            listeners.session_destroyed(self, DestroyedReason::Invalidated);
            for (name, value) in &attributes {
                listeners.attribute_removed(self, name, value);
            }
        }
        session
            .invalidate()
            .map_err(|_| Error::InvalidSession(session.id().to_string()))
    }

    /// Move the session's state to a freshly minted identifier.
    ///
    /// Attributes, timeout, last access, and the local context are copied;
    /// the old session is invalidated. Returns the new identifier.
    pub fn change_session_id(
        &self,
        ctx: &mut RequestContext,
        config: Arc<dyn SessionCookieConfig>,
    ) -> Result<String> {
        if ctx.is_response_started() || self.orphan {
            return Err(Error::ResponseAlreadyCommitted);
        }
        let binding = self.binding()?;
        let old = binding.session.clone();
        let old_id = old.id().to_string();

        let batch_id = self
            .resources
            .lock()
            .as_ref()
            .and_then(|r| r.batch.as_ref().map(|batch| batch.id()));
        let Some(batch_id) = batch_id else {
            return Err(Error::InvalidSession(old_id));
        };

        let store = self.manager.store.as_ref();
        let _scope = BatchScope::enter(store.batcher(), batch_id);

        let new_id = store.create_identifier();
        let new_session = store
            .create_session(&new_id)?
            .ok_or_else(|| Error::AlreadyExists(new_id.clone()))?;

        if let Err(e) = copy_session(old.as_ref(), new_session.as_ref()) {
            let _ = new_session.invalidate();
            if !old.is_valid() {
                self.close_stale(&binding);
                return Err(Error::InvalidSession(old_id));
            }
            return Err(e.into());
        }

        let config = self.manager.wrap_config(config);
        config.set_session_id(ctx, &new_id);
        self.binding.store(Arc::new(Binding {
            session: new_session.clone(),
            config,
        }));

        if old.invalidate().is_err() {
            warn!(session_id = %old_id, "Session invalidated during identifier change");
            let _ = new_session.invalidate();
            self.state.store(INVALIDATED, Ordering::Release);
            ctx.detach_session(&self.manager.deployment, self);
            self.close_stale(&binding);
            return Err(Error::InvalidSession(old_id));
        }

        self.manager.listeners.session_id_changed(self, &old_id);
        debug!(
            deployment = %self.manager.deployment,
            old_id = %old_id,
            new_id = %new_id,
            "Changed session identifier"
        );
        Ok(new_id)
    }

    /// End of request: record the access, commit the batch, release the
    /// permit, and detach from the request.
    pub fn request_done(&self, ctx: &mut RequestContext) {
        ctx.detach_session(&self.manager.deployment, self);
        self.close();
    }

    /// Same as [`request_done`](Self::request_done) for handles that are not
    /// attached to a request.
    pub fn close(&self) {
        let binding = self.binding.load_full();
        let Some(resources) = self.resources.lock().take() else {
            return;
        };

        let session = &binding.session;
        if self.state.load(Ordering::Acquire) == ACTIVE && session.is_valid() {
            let now = Utc::now();
            let start = match session.metadata() {
                Ok(metadata) if metadata.is_new => metadata.creation_time,
                _ => self.acquired_at,
            };
            if let Err(e) = session.set_last_access(start, now) {
                warn!(session_id = %session.id(), error = %e, "Failed to record session access");
            }
        }

        session.close();
        if let Err(e) = resources.release() {
            warn!(session_id = %session.id(), error = %e, "Failed to commit session batch");
        }
        trace!(session_id = %session.id(), "Session handle closed");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn binding(&self) -> Result<Arc<Binding>> {
        let binding = self.binding.load_full();
        if self.state.load(Ordering::Acquire) == INVALIDATED {
            return Err(Error::InvalidSession(binding.session.id().to_string()));
        }
        Ok(binding)
    }

    /// Run `op` against the bound session. If it fails because the session
    /// disappeared underneath us, release this handle's resources.
    ///
    /// A session retired by [`change_session_id`](Self::change_session_id)
    /// while `op` ran is not a disappearance: `op` is rerun against the
    /// replacement, so callers see either the old or the new session.
    fn guarded<R>(&self, op: impl Fn(&Binding) -> Result<R>) -> Result<R> {
        let mut binding = self.binding()?;
        loop {
            let e = match op(&binding) {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };
            if binding.session.is_valid() {
                return Err(e);
            }
            let current = self.binding()?;
            if !Arc::ptr_eq(&current, &binding) {
                binding = current;
                continue;
            }
            self.close_stale(&binding);
            return Err(Error::InvalidSession(binding.session.id().to_string()));
        }
    }

    fn close_stale(&self, binding: &Binding) {
        if let Err(e) = self.release(binding) {
            warn!(session_id = %binding.session.id(), error = %e, "Failed to close stale batch");
        }
    }

    fn release(&self, binding: &Binding) -> StoreResult<()> {
        let Some(resources) = self.resources.lock().take() else {
            return Ok(());
        };
        debug!(session_id = %binding.session.id(), "Releasing session handle");
        binding.session.close();
        resources.release()
    }
}

fn copy_session(from: &dyn Session, to: &dyn Session) -> StoreResult<()> {
    let metadata = from.metadata()?;
    for (name, value) in from.attributes()? {
        to.set_attribute(&name, value.deep_copy())?;
    }
    to.set_timeout(metadata.timeout)?;
    to.set_last_access(metadata.last_access_start, metadata.last_access_end)?;

    let local = from.local_context().lock().clone();
    to.local_context().lock().extend(local);
    Ok(())
}

impl SessionView for SessionHandle {
    fn id(&self) -> String {
        SessionHandle::id(self)
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.get_attribute(name).ok().flatten()
    }

    fn attribute_names(&self) -> Vec<String> {
        SessionHandle::attribute_names(self).unwrap_or_default()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("deployment", &self.manager.deployment)
            .field("id", &SessionHandle::id(self))
            .field("state", &self.state.load(Ordering::Relaxed))
            .field("orphan", &self.orphan)
            .finish()
    }
}
