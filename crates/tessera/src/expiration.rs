//! Bridges store expiration callbacks to session listeners.

use std::sync::Weak;

use tessera_types::DestroyedReason;
use tracing::debug;

use crate::error::Result;
use crate::manager::ManagerShared;
use crate::store::{BatchScope, ExpirationListener, ExpiredSession};

/// Notifies a manager's listeners when the store expires one of its
/// sessions.
///
/// The store may call this from a thread that already has a batch bound;
/// notifications run in their own batch and leave the caller's untouched.
/// Every expiration the store reports is attributed to the manager, which
/// is why each deployment needs a store of its own.
pub struct ExpirationNotifier {
    manager: Weak<ManagerShared>,
}

impl ExpirationNotifier {
    pub(crate) fn new(manager: Weak<ManagerShared>) -> Self {
        Self { manager }
    }
}

impl ExpirationListener for ExpirationNotifier {
    fn session_expired(&self, session: &ExpiredSession) -> Result<()> {
        let Some(manager) = self.manager.upgrade() else {
            return Ok(());
        };

        let batcher = manager.store.batcher();
        let _scope = BatchScope::isolated(batcher);
        let batch = batcher.create_batch()?;

        let listeners = &manager.listeners;
        listeners.session_destroyed(session, DestroyedReason::Timeout);
        for (name, value) in &session.attributes {
            listeners.attribute_removed(session, name, value);
        }
        manager
            .statistics
            .record_at(&session.metadata, session.expired_at);

        batch.close()?;
        debug!(
            deployment = %manager.deployment,
            session_id = %session.id,
            "Notified listeners of expired session"
        );
        Ok(())
    }
}
