//! Opaque string identifiers for clients and sessions (spec GLOSSARY).
//!
//! Both are adapter-assigned: the core never constructs them on its own
//! behalf, it only stores and compares them.

use derive_more::{AsRef, Deref, Display};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Deref, AsRef, Display, Serialize, Deserialize,
)]
#[as_ref(str)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Deref, AsRef, Display, Serialize, Deserialize,
)]
#[as_ref(str)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
