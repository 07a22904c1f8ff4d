//! Lifecycle lock coordinating in-flight requests with shutdown.
//!
//! Every request-scoped handle holds a shared permit for as long as it is
//! open. Stopping takes the exclusive permit: once it is requested, new
//! shared acquisitions fail immediately while existing holders drain.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

/// Shared-permit / exclusive-permit lock with owned guards.
#[derive(Debug, Clone, Default)]
pub struct LifecycleLock {
    lock: Arc<RwLock<()>>,
}

/// Shared permit; released on drop, from any thread.
pub struct ReadPermit {
    _guard: ArcRwLockReadGuard<RawRwLock, ()>,
}

/// Exclusive permit; released on drop.
pub struct WritePermit {
    _guard: ArcRwLockWriteGuard<RawRwLock, ()>,
}

impl LifecycleLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a shared permit without blocking.
    ///
    /// Fails while the exclusive permit is held or being waited for.
    pub fn try_read(&self) -> Option<ReadPermit> {
        self.lock
            .try_read_arc()
            .map(|guard| ReadPermit { _guard: guard })
    }

    pub fn try_write(&self) -> Option<WritePermit> {
        self.lock
            .try_write_arc()
            .map(|guard| WritePermit { _guard: guard })
    }

    /// Wait up to `timeout` for every shared permit to be released.
    pub fn try_write_for(&self, timeout: Duration) -> Option<WritePermit> {
        self.lock
            .try_write_arc_for(timeout)
            .map(|guard| WritePermit { _guard: guard })
    }

    pub fn is_write_locked(&self) -> bool {
        self.lock.is_locked_exclusive()
    }
}

impl fmt::Debug for ReadPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadPermit")
    }
}

impl fmt::Debug for WritePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WritePermit")
    }
}

/// Lifecycle state of a session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Constructed but never started; requests are refused.
    Created,
    Started,
    /// `stop()` is waiting for in-flight requests.
    Stopping,
    Stopped,
}

impl ManagerState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ManagerState::Created => 0,
            ManagerState::Started => 1,
            ManagerState::Stopping => 2,
            ManagerState::Stopped => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ManagerState::Started,
            2 => ManagerState::Stopping,
            3 => ManagerState::Stopped,
            _ => ManagerState::Created,
        }
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerState::Created => write!(f, "created"),
            ManagerState::Started => write!(f, "started"),
            ManagerState::Stopping => write!(f, "stopping"),
            ManagerState::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_shared_permits_coexist() {
        let lock = LifecycleLock::new();
        let a = lock.try_read().unwrap();
        let b = lock.try_read().unwrap();
        assert!(lock.try_write().is_none());
        drop((a, b));
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn test_write_blocks_readers() {
        let lock = LifecycleLock::new();
        let write = lock.try_write().unwrap();
        assert!(lock.is_write_locked());
        assert!(lock.try_read().is_none());
        drop(write);
        assert!(lock.try_read().is_some());
    }

    #[test]
    fn test_write_times_out_while_read_held() {
        let lock = LifecycleLock::new();
        let _read = lock.try_read().unwrap();
        let start = Instant::now();
        assert!(lock.try_write_for(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_permit_released_from_other_thread() {
        let lock = LifecycleLock::new();
        let read = lock.try_read().unwrap();
        let waiter = lock.clone();
        let handle = thread::spawn(move || waiter.try_write_for(Duration::from_secs(5)).is_some());
        thread::sleep(Duration::from_millis(20));
        thread::spawn(move || drop(read)).join().unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            ManagerState::Created,
            ManagerState::Started,
            ManagerState::Stopping,
            ManagerState::Stopped,
        ] {
            assert_eq!(ManagerState::from_u8(state.as_u8()), state);
        }
    }
}
