//! Contracts with the replicated session store.
//!
//! The manager never touches storage directly: it creates batches through a
//! [`Batcher`], reads and writes sessions through [`Session`], and receives
//! expiration callbacks through [`ExpirationListener`]. Every call is
//! synchronous; batches are bound to the calling thread.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::listener::SessionView;
use crate::value::AttributeValue;

pub use memory::{InMemorySessionStore, SweeperHandle};

/// Errors raised by a session store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session store is not started")]
    NotStarted,

    #[error("Batch {0} is already closed")]
    BatchClosed(BatchId),

    #[error("Session not found or invalidated: {0}")]
    SessionInvalid(String),

    #[error("Session store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Node-local, never-replicated state attached to a session.
pub type LocalContext = Mutex<HashMap<String, AttributeValue>>;

/// Identifier of a store batch.
pub type BatchId = u64;

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of a session's timing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    pub creation_time: DateTime<Utc>,
    pub last_access_start: DateTime<Utc>,
    pub last_access_end: DateTime<Utc>,
    /// Max inactive interval; zero means the session never expires.
    pub timeout: Duration,
    /// Whether the session was created by the current request.
    pub is_new: bool,
}

impl SessionMetadata {
    /// Metadata for a session created at `now`.
    pub fn new(now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            creation_time: now,
            last_access_start: now,
            last_access_end: now,
            timeout,
            is_new: true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the session has been idle longer than its timeout at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.timeout.is_zero() {
            return false;
        }
        now.signed_duration_since(self.last_access_end)
            .to_std()
            .map(|idle| idle > self.timeout)
            .unwrap_or(false)
    }

    /// Time elapsed since creation, clamped to zero.
    pub fn lifetime_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.creation_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store contracts
// ─────────────────────────────────────────────────────────────────────────────

/// A session as seen through the store, scoped to one batch.
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    /// False once invalidated, removed, or expired.
    fn is_valid(&self) -> bool;

    fn metadata(&self) -> StoreResult<SessionMetadata>;

    fn set_timeout(&self, timeout: Duration) -> StoreResult<()>;

    /// Record the start and end of the most recent access.
    fn set_last_access(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<()>;

    fn attribute(&self, name: &str) -> StoreResult<Option<AttributeValue>>;

    fn attribute_names(&self) -> StoreResult<Vec<String>>;

    fn attributes(&self) -> StoreResult<HashMap<String, AttributeValue>>;

    /// Store a value, returning the previous one.
    fn set_attribute(&self, name: &str, value: AttributeValue)
    -> StoreResult<Option<AttributeValue>>;

    /// Remove a value, returning the previous one.
    fn remove_attribute(&self, name: &str) -> StoreResult<Option<AttributeValue>>;

    /// Node-local context; shared by every handle to this session on this node.
    fn local_context(&self) -> Arc<LocalContext>;

    fn invalidate(&self) -> StoreResult<()>;

    /// Release per-request resources held for this session.
    fn close(&self) {}
}

/// A unit of store work. Writes become visible to other batches on close.
pub trait Batch: Send {
    fn id(&self) -> BatchId;

    /// Commit the batch.
    fn close(self: Box<Self>) -> StoreResult<()>;

    /// Abandon the batch without committing.
    fn discard(self: Box<Self>);
}

/// Token for a batch detached from its thread.
#[derive(Debug, PartialEq, Eq)]
pub struct SuspendedBatch {
    id: BatchId,
}

impl SuspendedBatch {
    pub fn new(id: BatchId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }
}

/// Creates batches and moves them between threads.
pub trait Batcher: Send + Sync {
    /// Open a batch and bind it to the current thread.
    fn create_batch(&self) -> StoreResult<Box<dyn Batch>>;

    /// Unbind whatever batch is bound to the current thread.
    fn suspend_batch(&self) -> Option<SuspendedBatch>;

    /// Bind a suspended batch to the current thread.
    fn resume_batch(&self, batch: SuspendedBatch);
}

/// Notified when the store expires a session.
pub trait ExpirationListener: Send + Sync {
    fn session_expired(&self, session: &ExpiredSession) -> crate::Result<()>;
}

/// The replicated session store.
///
/// A store holds the sessions of exactly one deployment. Its expiration
/// listeners hear about every session it expires, so two managers must not
/// share one store.
pub trait SessionStore: Send + Sync {
    /// Mint a fresh identifier.
    fn create_identifier(&self) -> String;

    /// Create a session in the batch bound to the current thread.
    ///
    /// Returns `None` when the identifier is already in use.
    fn create_session(&self, id: &str) -> StoreResult<Option<Arc<dyn Session>>>;

    /// Find a live session in the batch bound to the current thread.
    fn find_session(&self, id: &str) -> StoreResult<Option<Arc<dyn Session>>>;

    fn batcher(&self) -> &dyn Batcher;

    fn start(&self) -> StoreResult<()>;

    fn stop(&self);

    fn default_max_inactive_interval(&self) -> Duration;

    fn set_default_max_inactive_interval(&self, timeout: Duration);

    fn add_expiration_listener(&self, listener: Arc<dyn ExpirationListener>);
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch scoping
// ─────────────────────────────────────────────────────────────────────────────

/// Temporarily replaces the batch bound to the current thread.
///
/// On drop, whatever is bound is suspended and the previously bound batch
/// (if any) is resumed.
pub struct BatchScope<'a> {
    batcher: &'a dyn Batcher,
    previous: Option<SuspendedBatch>,
}

impl<'a> BatchScope<'a> {
    /// Leave the current thread with no batch bound.
    pub fn isolated(batcher: &'a dyn Batcher) -> Self {
        let previous = batcher.suspend_batch();
        Self { batcher, previous }
    }

    /// Bind the given batch to the current thread.
    pub fn enter(batcher: &'a dyn Batcher, batch: BatchId) -> Self {
        let scope = Self::isolated(batcher);
        batcher.resume_batch(SuspendedBatch::new(batch));
        scope
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        self.batcher.suspend_batch();
        if let Some(previous) = self.previous.take() {
            self.batcher.resume_batch(previous);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expired sessions
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only snapshot of a session the store just expired.
#[derive(Debug, Clone)]
pub struct ExpiredSession {
    pub id: String,
    pub metadata: SessionMetadata,
    pub attributes: HashMap<String, AttributeValue>,
    /// When the store decided the session had expired.
    pub expired_at: DateTime<Utc>,
}

impl SessionView for ExpiredSession {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.attributes.get(name).cloned()
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }
}
