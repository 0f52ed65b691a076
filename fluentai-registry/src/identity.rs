//! Service identities and origins
//!
//! A registration is identified by a `(local id, origin)` pair. The origin
//! tells where an instance comes from: registered directly in this process
//! (`Local`), materialized by a named loader (`Named`), or, in dependency
//! patterns only, `Any` of those.

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a registered service instance comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Origin {
    /// Registered directly with the registry
    Local,
    /// Wildcard accepted by any origin, only valid inside dependency patterns
    Any,
    /// Provided by the loader with this name
    Named(String),
}

impl Origin {
    /// Parse an origin string, recognising the two reserved spellings
    pub fn parse(origin: &str) -> Self {
        match origin {
            "local" | "LOCAL" => Origin::Local,
            "*" | "any" | "ANY" => Origin::Any,
            name => Origin::Named(name.to_string()),
        }
    }

    /// Create a named origin
    pub fn named(name: impl Into<String>) -> Self {
        Origin::parse(&name.into())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Origin::Any)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }

    /// Whether an identity with this origin matches a pattern with `pattern`
    pub fn accepted_by(&self, pattern: &Origin) -> bool {
        pattern.is_any() || self == pattern
    }

    /// Check that the origin may be carried by a holder's own identity
    pub fn ensure_concrete(&self) -> RegistryResult<()> {
        match self {
            Origin::Any => Err(RegistryError::InvalidOrigin {
                origin: self.to_string(),
                reason: "the wildcard origin is only valid in dependency patterns".to_string(),
            }),
            Origin::Named(name) if name.trim().is_empty() => Err(RegistryError::InvalidOrigin {
                origin: name.clone(),
                reason: "origin names must not be empty".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Local
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Any => write!(f, "*"),
            Origin::Named(name) => write!(f, "{}", name),
        }
    }
}

impl From<String> for Origin {
    fn from(origin: String) -> Self {
        Origin::parse(&origin)
    }
}

impl From<&str> for Origin {
    fn from(origin: &str) -> Self {
        Origin::parse(origin)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.to_string()
    }
}

/// Immutable `(local id, origin)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceIdentity {
    local_id: String,
    #[serde(default)]
    origin: Origin,
}

impl ServiceIdentity {
    pub fn new(local_id: impl Into<String>, origin: impl Into<Origin>) -> Self {
        Self {
            local_id: local_id.into(),
            origin: origin.into(),
        }
    }

    /// Identity registered directly in this process
    pub fn local(local_id: impl Into<String>) -> Self {
        Self::new(local_id, Origin::Local)
    }

    /// Pattern accepting the local id from any origin
    pub fn any(local_id: impl Into<String>) -> Self {
        Self::new(local_id, Origin::Any)
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Identity `self` is assignable to `pattern` when the local ids are
    /// equal and the origins match or the pattern accepts any origin.
    pub fn is_assignable_to(&self, pattern: &ServiceIdentity) -> bool {
        self.local_id == pattern.local_id && self.origin.accepted_by(&pattern.origin)
    }

    /// Same local id with a different origin
    pub fn with_origin(&self, origin: impl Into<Origin>) -> Self {
        Self::new(self.local_id.clone(), origin)
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_id, self.origin)
    }
}
