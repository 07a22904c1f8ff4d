//! Session attribute values.
//!
//! Replicated attributes must be marshallable; they are held as JSON so the
//! store can copy and ship them between nodes. Node-local attributes (the
//! local context) may hold arbitrary objects that never leave the process.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tessera_types::AuthenticatedSession;

enum Payload {
    Data(serde_json::Value),
    Object(Box<dyn Any + Send + Sync>),
}

/// A shared, immutable attribute value.
///
/// Cloning is cheap and preserves identity: listeners distinguish "added"
/// from "updated" by comparing the previous value with [`ptr_eq`].
///
/// [`ptr_eq`]: AttributeValue::ptr_eq
#[derive(Clone)]
pub struct AttributeValue {
    inner: Arc<Payload>,
}

impl AttributeValue {
    /// Marshal a serializable value.
    pub fn marshal<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::from_json(serde_json::to_value(value)?))
    }

    /// Wrap an already-marshalled JSON value.
    pub fn from_json(value: serde_json::Value) -> Self {
        Self {
            inner: Arc::new(Payload::Data(value)),
        }
    }

    /// Wrap a node-local object. Such values can only live in the local context.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(Payload::Object(Box::new(value))),
        }
    }

    /// Whether the store can replicate this value.
    pub fn is_marshallable(&self) -> bool {
        matches!(*self.inner, Payload::Data(_))
    }

    /// The marshalled form, if this is replicable data.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match &*self.inner {
            Payload::Data(value) => Some(value),
            Payload::Object(_) => None,
        }
    }

    /// Unmarshal into a concrete type.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Option<T> {
        self.as_json()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Borrow a node-local object as a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match &*self.inner {
            Payload::Object(object) => object.downcast_ref::<T>(),
            Payload::Data(_) => None,
        }
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A copy with its own identity. Node-local objects cannot be copied and
    /// are shared.
    pub fn deep_copy(&self) -> Self {
        match &*self.inner {
            Payload::Data(value) => Self::from_json(value.clone()),
            Payload::Object(_) => self.clone(),
        }
    }

    /// Read an authenticated-session record from either representation.
    pub fn authenticated_session(&self) -> Option<AuthenticatedSession> {
        match &*self.inner {
            Payload::Object(object) => object.downcast_ref::<AuthenticatedSession>().cloned(),
            Payload::Data(value) => serde_json::from_value(value.clone()).ok(),
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (&*self.inner, &*other.inner) {
            (Payload::Data(a), Payload::Data(b)) => a == b,
            _ => self.ptr_eq(other),
        }
    }
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner {
            Payload::Data(value) => f.debug_tuple("Data").field(value).finish(),
            Payload::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::from_json(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::from_json(serde_json::Value::String(value))
    }
}
