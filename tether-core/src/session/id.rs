//! Session identifiers
//!
//! A session starts life with a provisional id allocated by the registry and
//! later gains a durable id from its transport handshake.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistryError;

/// Identifier a session can be looked up by
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh time-ordered id (UUID v7)
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Two-phase identity of a session record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    provisional: SessionId,
    durable: Option<SessionId>,
}

impl SessionIdentity {
    pub fn new(provisional: SessionId) -> Self {
        Self {
            provisional,
            durable: None,
        }
    }

    pub fn provisional(&self) -> &SessionId {
        &self.provisional
    }

    pub fn durable(&self) -> Option<&SessionId> {
        self.durable.as_ref()
    }

    /// The id the session currently answers to
    pub fn current(&self) -> &SessionId {
        self.durable.as_ref().unwrap_or(&self.provisional)
    }

    /// Record the durable id. Setting the same value twice is a no-op.
    pub fn set_durable(&mut self, durable: SessionId) -> Result<(), RegistryError> {
        match &self.durable {
            Some(existing) if *existing == durable => Ok(()),
            Some(existing) => Err(RegistryError::DurableIdAlreadySet {
                session: self.provisional.clone(),
                existing: existing.clone(),
                requested: durable,
            }),
            None => {
                self.durable = Some(durable);
                Ok(())
            }
        }
    }
}
