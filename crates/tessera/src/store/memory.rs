//! In-process session store.
//!
//! Reference implementation of the store contracts for single-node
//! deployments and tests. Each batch buffers its writes copy-on-write and
//! publishes them atomically on close; readers outside the batch keep seeing
//! the committed state until then.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tessera_types::defaults;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{
    Batch, BatchId, Batcher, ExpirationListener, ExpiredSession, LocalContext, Session,
    SessionMetadata, SessionStore, StoreError, StoreResult, SuspendedBatch,
};
use crate::value::AttributeValue;

#[derive(Debug, Clone)]
struct SessionRecord {
    metadata: SessionMetadata,
    attributes: HashMap<String, AttributeValue>,
    /// Bumped on every committed write.
    version: u64,
}

/// Pending writes of one open batch. `None` marks a removal.
struct Transaction {
    id: BatchId,
    open: AtomicBool,
    writes: Mutex<HashMap<String, Option<SessionRecord>>>,
    /// Committed version of each record when the batch first touched it,
    /// `None` if it did not exist yet.
    bases: Mutex<HashMap<String, Option<u64>>>,
}

impl Transaction {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::BatchClosed(self.id))
        }
    }
}

struct StoreInner {
    records: Mutex<HashMap<String, SessionRecord>>,
    local: Mutex<HashMap<String, Arc<LocalContext>>>,
    transactions: Mutex<HashMap<BatchId, Arc<Transaction>>>,
    bound: Mutex<HashMap<ThreadId, BatchId>>,
    next_batch: AtomicU64,
    next_version: AtomicU64,
    default_timeout: Mutex<Duration>,
    listeners: RwLock<Vec<Arc<dyn ExpirationListener>>>,
    started: AtomicBool,
}

impl StoreInner {
    fn current_transaction(&self) -> Option<Arc<Transaction>> {
        let batch = self.bound.lock().get(&thread::current().id()).copied()?;
        self.transactions.lock().get(&batch).cloned()
    }

    fn ensure_started(&self) -> StoreResult<()> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotStarted)
        }
    }

    /// Read a record as seen from `tx` (or the committed state).
    fn read(&self, id: &str, tx: Option<&Transaction>) -> StoreResult<Option<SessionRecord>> {
        if let Some(tx) = tx {
            tx.ensure_open()?;
            if let Some(pending) = tx.writes.lock().get(id) {
                return Ok(pending.clone());
            }
        }
        let committed = self.records.lock().get(id).cloned();
        if let Some(tx) = tx {
            tx.bases
                .lock()
                .entry(id.to_string())
                .or_insert(committed.as_ref().map(|record| record.version));
        }
        Ok(committed)
    }

    fn write(&self, id: &str, record: Option<SessionRecord>, tx: Option<&Transaction>) {
        match tx {
            Some(tx) => {
                if !tx.bases.lock().contains_key(id) {
                    let base = self.records.lock().get(id).map(|record| record.version);
                    tx.bases.lock().entry(id.to_string()).or_insert(base);
                }
                tx.writes.lock().insert(id.to_string(), record);
            }
            None => {
                let mut records = self.records.lock();
                match record {
                    Some(mut record) => {
                        record.version = self.next_version.fetch_add(1, Ordering::Relaxed);
                        records.insert(id.to_string(), record);
                    }
                    None => {
                        records.remove(id);
                    }
                }
            }
        }
    }

    fn local_context(&self, id: &str) -> Arc<LocalContext> {
        self.local
            .lock()
            .entry(id.to_string())
            .or_insert_with(Default::default)
            .clone()
    }

    fn end_transaction(&self, id: BatchId) -> Option<Arc<Transaction>> {
        self.bound.lock().retain(|_, bound| *bound != id);
        let tx = self.transactions.lock().remove(&id)?;
        tx.open.store(false, Ordering::Release);
        Some(tx)
    }

    /// Publish the writes of `tx`. A write is dropped when its record was
    /// changed or removed (for instance expired) after the batch first read
    /// it, so the first batch to commit wins.
    fn commit(&self, tx: &Transaction) {
        let writes = std::mem::take(&mut *tx.writes.lock());
        let bases = std::mem::take(&mut *tx.bases.lock());
        let mut removed = Vec::new();
        let mut stale = 0usize;
        {
            let mut records = self.records.lock();
            for (id, record) in writes {
                let current = records.get(&id).map(|record| record.version);
                if bases.get(&id).is_some_and(|base| *base != current) {
                    debug!(batch = tx.id, session_id = %id, "Dropped stale write");
                    stale += 1;
                    continue;
                }
                match record {
                    Some(mut record) => {
                        record.metadata.is_new = false;
                        record.version = self.next_version.fetch_add(1, Ordering::Relaxed);
                        records.insert(id, record);
                    }
                    None => {
                        records.remove(&id);
                        removed.push(id);
                    }
                }
            }
        }
        if !removed.is_empty() {
            let mut local = self.local.lock();
            for id in &removed {
                local.remove(id);
            }
        }
        trace!(batch = tx.id, removed = removed.len(), stale, "Committed batch");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Single-process [`SessionStore`].
///
/// Sessions expire only when [`purge_expired`](Self::purge_expired) runs,
/// either explicitly or from a sweeper thread.
#[derive(Clone)]
pub struct InMemorySessionStore {
    inner: Arc<StoreInner>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                records: Mutex::new(HashMap::new()),
                local: Mutex::new(HashMap::new()),
                transactions: Mutex::new(HashMap::new()),
                bound: Mutex::new(HashMap::new()),
                next_batch: AtomicU64::new(1),
                next_version: AtomicU64::new(1),
                default_timeout: Mutex::new(defaults::session_timeout()),
                listeners: RwLock::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Set the default max-inactive interval for new sessions.
    pub fn with_default_timeout(self, timeout: Duration) -> Self {
        *self.inner.default_timeout.lock() = timeout;
        self
    }

    /// Number of committed sessions.
    pub fn session_count(&self) -> usize {
        self.inner.records.lock().len()
    }

    /// Whether a committed session with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.records.lock().contains_key(id)
    }

    /// Number of batches still open.
    pub fn open_batches(&self) -> usize {
        self.inner.transactions.lock().len()
    }

    /// Expire every committed session idle past its timeout at `now`.
    ///
    /// Each expired session is removed first and then handed to every
    /// expiration listener; a failing listener is logged and skipped.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<ExpiredSession> = {
            let mut records = self.inner.records.lock();
            let ids: Vec<String> = records
                .iter()
                .filter(|(_, record)| record.metadata.is_expired_at(now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    let record = records.remove(&id)?;
                    Some(ExpiredSession {
                        id,
                        metadata: record.metadata,
                        attributes: record.attributes,
                        expired_at: now,
                    })
                })
                .collect()
        };

        if expired.is_empty() {
            return 0;
        }

        {
            let mut local = self.inner.local.lock();
            for session in &expired {
                local.remove(&session.id);
            }
        }

        let listeners = self.inner.listeners.read().clone();
        for session in &expired {
            debug!(session_id = %session.id, "Session expired");
            for listener in &listeners {
                if let Err(e) = listener.session_expired(session) {
                    warn!(session_id = %session.id, error = %e, "Expiration listener failed");
                }
            }
        }

        expired.len()
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` on a
    /// background thread until the returned handle is stopped or dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> std::io::Result<SweeperHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);

        let handle = thread::Builder::new()
            .name("tessera-sweeper".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    let Some(inner) = weak.upgrade() else { break };
                    let store = InMemorySessionStore { inner };
                    if store.inner.started.load(Ordering::Acquire) {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            debug!(purged, "Sweeper expired sessions");
                        }
                    }
                }
                trace!("Sweeper stopped");
            })?;

        Ok(SweeperHandle {
            stop: Some(stop_tx),
            thread: Some(handle),
        })
    }

    fn open_session(&self, id: &str, tx: Option<Arc<Transaction>>) -> Arc<dyn Session> {
        Arc::new(MemorySession {
            id: id.to_string(),
            local: self.inner.local_context(id),
            store: self.inner.clone(),
            tx,
            valid: AtomicBool::new(true),
        })
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_identifier(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn create_session(&self, id: &str) -> StoreResult<Option<Arc<dyn Session>>> {
        self.inner.ensure_started()?;
        let tx = self.inner.current_transaction();
        if self.inner.read(id, tx.as_deref())?.is_some() {
            return Ok(None);
        }

        let timeout = *self.inner.default_timeout.lock();
        let record = SessionRecord {
            metadata: SessionMetadata::new(Utc::now(), timeout),
            attributes: HashMap::new(),
            version: 0,
        };
        self.inner.write(id, Some(record), tx.as_deref());
        // A recycled identifier must not inherit stale local state.
        self.inner.local.lock().remove(id);

        trace!(session_id = %id, "Created session record");
        Ok(Some(self.open_session(id, tx)))
    }

    fn find_session(&self, id: &str) -> StoreResult<Option<Arc<dyn Session>>> {
        self.inner.ensure_started()?;
        let tx = self.inner.current_transaction();
        match self.inner.read(id, tx.as_deref())? {
            Some(record) if !record.metadata.is_expired() => Ok(Some(self.open_session(id, tx))),
            _ => Ok(None),
        }
    }

    fn batcher(&self) -> &dyn Batcher {
        self
    }

    fn start(&self) -> StoreResult<()> {
        self.inner.started.store(true, Ordering::Release);
        debug!("In-memory session store started");
        Ok(())
    }

    fn stop(&self) {
        self.inner.started.store(false, Ordering::Release);
        debug!("In-memory session store stopped");
    }

    fn default_max_inactive_interval(&self) -> Duration {
        *self.inner.default_timeout.lock()
    }

    fn set_default_max_inactive_interval(&self, timeout: Duration) {
        *self.inner.default_timeout.lock() = timeout;
    }

    fn add_expiration_listener(&self, listener: Arc<dyn ExpirationListener>) {
        self.inner.listeners.write().push(listener);
    }
}

impl Batcher for InMemorySessionStore {
    fn create_batch(&self) -> StoreResult<Box<dyn Batch>> {
        let id = self.inner.next_batch.fetch_add(1, Ordering::Relaxed);
        let tx = Arc::new(Transaction {
            id,
            open: AtomicBool::new(true),
            writes: Mutex::new(HashMap::new()),
            bases: Mutex::new(HashMap::new()),
        });
        self.inner.transactions.lock().insert(id, tx);
        self.inner.bound.lock().insert(thread::current().id(), id);
        trace!(batch = id, "Opened batch");
        Ok(Box::new(MemoryBatch {
            id,
            store: self.inner.clone(),
        }))
    }

    fn suspend_batch(&self) -> Option<SuspendedBatch> {
        self.inner
            .bound
            .lock()
            .remove(&thread::current().id())
            .map(SuspendedBatch::new)
    }

    fn resume_batch(&self, batch: SuspendedBatch) {
        if self.inner.transactions.lock().contains_key(&batch.id()) {
            self.inner
                .bound
                .lock()
                .insert(thread::current().id(), batch.id());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch
// ─────────────────────────────────────────────────────────────────────────────

struct MemoryBatch {
    id: BatchId,
    store: Arc<StoreInner>,
}

impl Batch for MemoryBatch {
    fn id(&self) -> BatchId {
        self.id
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        let tx = self
            .store
            .end_transaction(self.id)
            .ok_or(StoreError::BatchClosed(self.id))?;
        self.store.commit(&tx);
        Ok(())
    }

    fn discard(self: Box<Self>) {
        if self.store.end_transaction(self.id).is_some() {
            trace!(batch = self.id, "Discarded batch");
        }
    }
}

impl Drop for MemoryBatch {
    fn drop(&mut self) {
        // A batch dropped without close or discard is discarded.
        self.store.end_transaction(self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

struct MemorySession {
    id: String,
    store: Arc<StoreInner>,
    tx: Option<Arc<Transaction>>,
    local: Arc<LocalContext>,
    valid: AtomicBool,
}

impl MemorySession {
    fn record(&self) -> StoreResult<SessionRecord> {
        if !self.valid.load(Ordering::Acquire) {
            return Err(StoreError::SessionInvalid(self.id.clone()));
        }
        self.store
            .read(&self.id, self.tx.as_deref())?
            .ok_or_else(|| StoreError::SessionInvalid(self.id.clone()))
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionRecord) -> R) -> StoreResult<R> {
        let mut record = self.record()?;
        let result = f(&mut record);
        self.store.write(&self.id, Some(record), self.tx.as_deref());
        Ok(result)
    }
}

impl Session for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_valid(&self) -> bool {
        self.record().is_ok()
    }

    fn metadata(&self) -> StoreResult<SessionMetadata> {
        Ok(self.record()?.metadata)
    }

    fn set_timeout(&self, timeout: Duration) -> StoreResult<()> {
        self.update(|record| record.metadata.timeout = timeout)
    }

    fn set_last_access(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<()> {
        self.update(|record| {
            record.metadata.last_access_start = start;
            record.metadata.last_access_end = end;
        })
    }

    fn attribute(&self, name: &str) -> StoreResult<Option<AttributeValue>> {
        Ok(self.record()?.attributes.get(name).cloned())
    }

    fn attribute_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.record()?.attributes.into_keys().collect())
    }

    fn attributes(&self) -> StoreResult<HashMap<String, AttributeValue>> {
        Ok(self.record()?.attributes)
    }

    fn set_attribute(
        &self,
        name: &str,
        value: AttributeValue,
    ) -> StoreResult<Option<AttributeValue>> {
        self.update(|record| record.attributes.insert(name.to_string(), value))
    }

    fn remove_attribute(&self, name: &str) -> StoreResult<Option<AttributeValue>> {
        self.update(|record| record.attributes.remove(name))
    }

    fn local_context(&self) -> Arc<LocalContext> {
        self.local.clone()
    }

    fn invalidate(&self) -> StoreResult<()> {
        self.record()?;
        self.store.write(&self.id, None, self.tx.as_deref());
        self.valid.store(false, Ordering::Release);
        if self.tx.is_none() {
            self.store.local.lock().remove(&self.id);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sweeper
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a running expiration sweeper. Dropping it stops the thread.
pub struct SweeperHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the sweeper immediately.
        self.stop.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Sweeper thread panicked");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::atomic::AtomicUsize;

    fn started_store() -> InMemorySessionStore {
        let store = InMemorySessionStore::new();
        store.start().unwrap();
        store
    }

    #[test]
    fn test_not_started() {
        let store = InMemorySessionStore::new();
        let batch = store.create_batch().unwrap();
        assert!(matches!(
            store.create_session("a"),
            Err(StoreError::NotStarted)
        ));
        batch.discard();
    }

    #[test]
    fn test_identifiers_are_unique() {
        let store = InMemorySessionStore::new();
        let a = store.create_identifier();
        let b = store.create_identifier();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_writes_invisible_until_commit() {
        let store = started_store();
        let batch = store.create_batch().unwrap();
        let session = store.create_session("s1").unwrap().unwrap();
        session
            .set_attribute("k", AttributeValue::from("v"))
            .unwrap();
        assert!(session.metadata().unwrap().is_new);
        store.suspend_batch();

        assert!(!store.contains("s1"));
        assert!(store.find_session("s1").unwrap().is_none());

        batch.close().unwrap();
        assert!(store.contains("s1"));
        let found = store.find_session("s1").unwrap().unwrap();
        assert_eq!(
            found.attribute("k").unwrap(),
            Some(AttributeValue::from("v"))
        );
        assert!(!found.metadata().unwrap().is_new);
    }

    #[test]
    fn test_discard_drops_writes() {
        let store = started_store();
        let batch = store.create_batch().unwrap();
        store.create_session("s1").unwrap().unwrap();
        batch.discard();
        assert_eq!(store.session_count(), 0);
        assert_eq!(store.open_batches(), 0);
        assert!(store.suspend_batch().is_none());
    }

    #[test]
    fn test_duplicate_id_returns_none() {
        let store = started_store();
        let batch = store.create_batch().unwrap();
        assert!(store.create_session("dup").unwrap().is_some());
        assert!(store.create_session("dup").unwrap().is_none());
        batch.close().unwrap();
    }

    #[test]
    fn test_session_unusable_after_close() {
        let store = started_store();
        let batch = store.create_batch().unwrap();
        let session = store.create_session("s1").unwrap().unwrap();
        batch.close().unwrap();

        assert!(!session.is_valid());
        assert!(matches!(
            session.attribute("k"),
            Err(StoreError::BatchClosed(_))
        ));
    }

    #[test]
    fn test_invalidate_commits_removal() {
        let store = started_store();
        let batch = store.create_batch().unwrap();
        let session = store.create_session("s1").unwrap().unwrap();
        batch.close().unwrap();

        let batch = store.create_batch().unwrap();
        let session2 = store.find_session("s1").unwrap().unwrap();
        session2.invalidate().unwrap();
        assert!(!session2.is_valid());
        assert!(session2.invalidate().is_err());
        batch.close().unwrap();

        assert!(!store.contains("s1"));
        drop(session);
    }

    #[test]
    fn test_suspend_and_resume_across_threads() {
        let store = started_store();
        let batch = store.create_batch().unwrap();
        store.create_session("s1").unwrap().unwrap();
        let suspended = store.suspend_batch().unwrap();
        assert_eq!(suspended.id(), batch.id());

        let other = store.clone();
        thread::spawn(move || {
            other.resume_batch(suspended);
            let session = other.find_session("s1").unwrap().unwrap();
            session
                .set_attribute("from", AttributeValue::from("thread"))
                .unwrap();
            batch.close().unwrap();
        })
        .join()
        .unwrap();

        let session = store.find_session("s1").unwrap().unwrap();
        assert_eq!(
            session.attribute("from").unwrap(),
            Some(AttributeValue::from("thread"))
        );
    }

    #[test]
    fn test_local_context_shared_per_session() {
        let store = started_store();
        let batch = store.create_batch().unwrap();
        let session = store.create_session("s1").unwrap().unwrap();
        session
            .local_context()
            .lock()
            .insert("ws".to_string(), AttributeValue::object(5u8));
        batch.close().unwrap();

        let found = store.find_session("s1").unwrap().unwrap();
        assert!(found.local_context().lock().contains_key("ws"));
    }

    struct CountingListener {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ExpirationListener for CountingListener {
        fn session_expired(&self, session: &ExpiredSession) -> crate::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::Error::InvalidSession(session.id.clone()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_purge_expired_notifies_and_isolates_failures() {
        let store = started_store().with_default_timeout(Duration::from_secs(1));
        let failing = Arc::new(CountingListener {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let counting = Arc::new(CountingListener {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        store.add_expiration_listener(failing.clone());
        store.add_expiration_listener(counting.clone());

        let batch = store.create_batch().unwrap();
        store.create_session("old").unwrap().unwrap();
        let keep = store.create_session("forever").unwrap().unwrap();
        keep.set_timeout(Duration::ZERO).unwrap();
        batch.close().unwrap();

        assert_eq!(store.purge_expired(), 0);
        let purged = store.purge_expired_at(Utc::now() + TimeDelta::seconds(10));
        assert_eq!(purged, 1);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert!(!store.contains("old"));
        assert!(store.contains("forever"));
    }

    #[test]
    fn test_expired_session_not_restored_by_open_batch() {
        let store = started_store().with_default_timeout(Duration::from_secs(1));
        let batch = store.create_batch().unwrap();
        store.create_session("s1").unwrap().unwrap();
        batch.close().unwrap();

        let batch = store.create_batch().unwrap();
        let session = store.find_session("s1").unwrap().unwrap();
        session
            .set_attribute("k", AttributeValue::from("v"))
            .unwrap();

        let purged = store.purge_expired_at(Utc::now() + TimeDelta::seconds(10));
        assert_eq!(purged, 1);
        batch.close().unwrap();

        assert!(!store.contains("s1"));
        assert_eq!(store.session_count(), 0);
        assert!(store.find_session("s1").unwrap().is_none());
    }

    #[test]
    fn test_first_commit_wins_between_batches() {
        let store = started_store();
        let batch = store.create_batch().unwrap();
        store.create_session("s1").unwrap().unwrap();
        batch.close().unwrap();

        let first = store.create_batch().unwrap();
        store
            .find_session("s1")
            .unwrap()
            .unwrap()
            .set_attribute("first", AttributeValue::from("1"))
            .unwrap();
        let suspended = store.suspend_batch().unwrap();

        let second = store.create_batch().unwrap();
        store
            .find_session("s1")
            .unwrap()
            .unwrap()
            .set_attribute("second", AttributeValue::from("2"))
            .unwrap();
        second.close().unwrap();

        store.resume_batch(suspended);
        first.close().unwrap();

        let session = store.find_session("s1").unwrap().unwrap();
        assert_eq!(
            session.attribute("second").unwrap(),
            Some(AttributeValue::from("2"))
        );
        assert_eq!(session.attribute("first").unwrap(), None);
    }

    #[test]
    fn test_concurrent_creates_of_one_id_keep_the_first() {
        let store = started_store();
        let first = store.create_batch().unwrap();
        store
            .create_session("dup")
            .unwrap()
            .unwrap()
            .set_attribute("owner", AttributeValue::from("first"))
            .unwrap();
        let suspended = store.suspend_batch().unwrap();

        let second = store.create_batch().unwrap();
        store
            .create_session("dup")
            .unwrap()
            .unwrap()
            .set_attribute("owner", AttributeValue::from("second"))
            .unwrap();
        second.close().unwrap();

        store.resume_batch(suspended);
        first.close().unwrap();

        let session = store.find_session("dup").unwrap().unwrap();
        assert_eq!(
            session.attribute("owner").unwrap(),
            Some(AttributeValue::from("second"))
        );
    }

    #[test]
    fn test_sweeper_stops_on_drop() {
        let store = started_store();
        let sweeper = store.spawn_sweeper(Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(30));
        sweeper.stop();
    }
}
