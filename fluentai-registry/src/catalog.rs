//! Named service factories
//!
//! Configuration refers to implementations by name. A catalog maps those
//! names to constructors; it is an owned value handed to the registry,
//! never a process-wide table.

use crate::descriptor::ServiceDescriptor;
use crate::error::{RegistryError, RegistryResult};
use crate::loader::{LoadRequest, LoadedService, ServiceLoader};
use crate::service::ServiceRef;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

type FactoryFn = Arc<dyn Fn() -> RegistryResult<ServiceRef> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FactoryCatalog {
    factories: FxHashMap<String, FactoryFn>,
}

impl FactoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`, replacing any previous one
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> RegistryResult<ServiceRef> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Construct a fresh instance from the named factory
    pub fn create(&self, name: &str) -> RegistryResult<ServiceRef> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownFactory(name.to_string()))?;
        factory()
    }
}

/// Loader serving an origin from a catalog and a set of descriptors
///
/// A request for a local id is answered by the first descriptor declaring
/// that id, instantiated through the factory of the same entry.
pub struct CatalogLoader {
    origin: String,
    catalog: FactoryCatalog,
    entries: Vec<(String, ServiceDescriptor)>,
}

impl CatalogLoader {
    pub fn new(origin: impl Into<String>, catalog: FactoryCatalog) -> Self {
        Self {
            origin: origin.into(),
            catalog,
            entries: Vec::new(),
        }
    }

    /// Offer a service built by `factory` under this loader's origin
    pub fn offer(mut self, factory: impl Into<String>, descriptor: ServiceDescriptor) -> Self {
        self.entries.push((factory.into(), descriptor));
        self
    }
}

impl ServiceLoader for CatalogLoader {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn load(&self, request: &LoadRequest<'_>) -> RegistryResult<Option<LoadedService>> {
        let entry = self
            .entries
            .iter()
            .find(|(_, descriptor)| descriptor.ids.iter().any(|id| id == request.local_id));
        let Some((factory, descriptor)) = entry else {
            return Ok(None);
        };

        let service = self.catalog.create(factory)?;
        if let Some(required) = request.required_type {
            let advertised = service.type_tag() == *required || descriptor.provides.contains(required);
            if !advertised {
                return Ok(None);
            }
        }

        debug!("Loader '{}' created {} via factory '{}'", self.origin, request.local_id, factory);
        Ok(Some(LoadedService {
            service,
            descriptor: descriptor.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ArcServiceExt, Service};

    struct Cache;
    impl Service for Cache {}

    fn catalog() -> FactoryCatalog {
        let mut catalog = FactoryCatalog::new();
        catalog.register_factory("cache", || Ok(Arc::new(Cache) as ServiceRef));
        catalog
    }

    #[test]
    fn test_create_fresh_instances() {
        let catalog = catalog();
        let a = catalog.create("cache").unwrap();
        let b = catalog.create("cache").unwrap();
        assert!(a.downcast_service::<Cache>().is_some());
        assert!(!a.same_instance(&b));
        assert!(matches!(
            catalog.create("missing"),
            Err(RegistryError::UnknownFactory(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_loader_matches_declared_ids() {
        let loader = CatalogLoader::new("remote", catalog())
            .offer("cache", ServiceDescriptor::new("cache").alias("kv"));

        let request = LoadRequest {
            local_id: "kv",
            required_type: None,
            requester: None,
        };
        let loaded = loader.load(&request).unwrap().unwrap();
        assert_eq!(loaded.descriptor.primary_id(), Some("cache"));

        let request = LoadRequest {
            local_id: "other",
            ..request
        };
        assert!(loader.load(&request).unwrap().is_none());
    }

    #[test]
    fn test_loader_respects_required_type() {
        let loader = CatalogLoader::new("remote", catalog())
            .offer("cache", ServiceDescriptor::new("cache").provides("KvStore"));
        let wanted = crate::dependency::TypeTag::new("KvStore");
        let unwanted = crate::dependency::TypeTag::new("Queue");

        let hit = LoadRequest {
            local_id: "cache",
            required_type: Some(&wanted),
            requester: None,
        };
        assert!(loader.load(&hit).unwrap().is_some());

        let miss = LoadRequest {
            required_type: Some(&unwanted),
            ..hit
        };
        assert!(loader.load(&miss).unwrap().is_none());
    }
}
