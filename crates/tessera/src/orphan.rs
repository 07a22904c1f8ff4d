//! Throwaway sessions handed out after the response was committed.
//!
//! An orphan session lives only as long as its handle: nothing is written
//! to the store and no cookie reaches the client.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::store::{LocalContext, Session, SessionMetadata, StoreError, StoreResult};
use crate::value::AttributeValue;

pub struct OrphanSession {
    id: String,
    metadata: Mutex<SessionMetadata>,
    attributes: Mutex<HashMap<String, AttributeValue>>,
    local: Arc<LocalContext>,
    valid: AtomicBool,
}

impl OrphanSession {
    pub fn new(id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            metadata: Mutex::new(SessionMetadata::new(Utc::now(), timeout)),
            attributes: Mutex::new(HashMap::new()),
            local: Arc::default(),
            valid: AtomicBool::new(true),
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.valid.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::SessionInvalid(self.id.clone()))
        }
    }
}

impl Session for OrphanSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn metadata(&self) -> StoreResult<SessionMetadata> {
        self.check()?;
        Ok(self.metadata.lock().clone())
    }

    fn set_timeout(&self, timeout: Duration) -> StoreResult<()> {
        self.check()?;
        self.metadata.lock().timeout = timeout;
        Ok(())
    }

    fn set_last_access(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<()> {
        self.check()?;
        let mut metadata = self.metadata.lock();
        metadata.last_access_start = start;
        metadata.last_access_end = end;
        Ok(())
    }

    fn attribute(&self, name: &str) -> StoreResult<Option<AttributeValue>> {
        self.check()?;
        Ok(self.attributes.lock().get(name).cloned())
    }

    fn attribute_names(&self) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self.attributes.lock().keys().cloned().collect())
    }

    fn attributes(&self) -> StoreResult<HashMap<String, AttributeValue>> {
        self.check()?;
        Ok(self.attributes.lock().clone())
    }

    fn set_attribute(
        &self,
        name: &str,
        value: AttributeValue,
    ) -> StoreResult<Option<AttributeValue>> {
        self.check()?;
        Ok(self.attributes.lock().insert(name.to_string(), value))
    }

    fn remove_attribute(&self, name: &str) -> StoreResult<Option<AttributeValue>> {
        self.check()?;
        Ok(self.attributes.lock().remove(name))
    }

    fn local_context(&self) -> Arc<LocalContext> {
        self.local.clone()
    }

    fn invalidate(&self) -> StoreResult<()> {
        if self.valid.swap(false, Ordering::AcqRel) {
            self.attributes.lock().clear();
            Ok(())
        } else {
            Err(StoreError::SessionInvalid(self.id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphan_lifecycle() {
        let session = OrphanSession::new("o1", Duration::from_secs(60));
        assert!(session.metadata().unwrap().is_new);
        session
            .set_attribute("a", AttributeValue::from("1"))
            .unwrap();
        assert_eq!(session.attribute_names().unwrap(), vec!["a".to_string()]);

        session.invalidate().unwrap();
        assert!(!session.is_valid());
        assert!(session.attribute("a").is_err());
        assert!(session.invalidate().is_err());
    }
}
