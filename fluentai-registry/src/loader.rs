//! Pluggable service loaders
//!
//! A loader materializes services the registry does not hold yet. Each
//! loader owns one named origin; lookups for that origin go to it, and
//! wildcard lookups try every loader from highest to lowest priority.

use crate::dependency::TypeTag;
use crate::descriptor::ServiceDescriptor;
use crate::error::{RegistryError, RegistryResult};
use crate::identity::{Origin, ServiceIdentity};
use crate::service::ServiceRef;
use parking_lot::RwLock;
use std::sync::Arc;

/// What the registry asks a loader for
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub local_id: &'a str,
    pub required_type: Option<&'a TypeTag>,
    /// Holder whose dependency triggered the load, if any
    pub requester: Option<&'a ServiceIdentity>,
}

/// A service produced by a loader, registered under the loader's origin
pub struct LoadedService {
    pub service: ServiceRef,
    pub descriptor: ServiceDescriptor,
}

/// Resolver able to produce services for its origin
pub trait ServiceLoader: Send + Sync {
    /// Name of the origin this loader serves
    fn origin(&self) -> &str;

    /// Produce the service, or `Ok(None)` when this loader does not have it
    fn load(&self, request: &LoadRequest<'_>) -> RegistryResult<Option<LoadedService>>;
}

struct LoaderEntry {
    priority: i32,
    loader: Arc<dyn ServiceLoader>,
}

/// Priority-ordered set of loaders
#[derive(Default)]
pub struct LoaderSet {
    entries: RwLock<Vec<LoaderEntry>>,
}

impl LoaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a loader; higher priorities are tried first, ties keep insertion order
    pub fn register(&self, loader: Arc<dyn ServiceLoader>, priority: i32) -> RegistryResult<()> {
        let origin = Origin::parse(loader.origin());
        origin.ensure_concrete()?;
        if origin.is_local() {
            return Err(RegistryError::InvalidOrigin {
                origin: loader.origin().to_string(),
                reason: "loaders cannot serve the local origin".to_string(),
            });
        }

        let mut entries = self.entries.write();
        let position = entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(entries.len());
        entries.insert(position, LoaderEntry { priority, loader });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Loaders to try for a lookup with this origin, in order
    pub fn candidates(&self, origin: &Origin) -> Vec<Arc<dyn ServiceLoader>> {
        let entries = self.entries.read();
        match origin {
            Origin::Local => Vec::new(),
            Origin::Any => entries.iter().map(|e| e.loader.clone()).collect(),
            Origin::Named(name) => entries
                .iter()
                .filter(|e| e.loader.origin() == name)
                .map(|e| e.loader.clone())
                .collect(),
        }
    }
}
