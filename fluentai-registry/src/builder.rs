//! Registry builder for fluent configuration

use crate::catalog::FactoryCatalog;
use crate::config::{RegistryConfig, ServicesConfig};
use crate::descriptor::ServiceDescriptor;
use crate::error::RegistryResult;
use crate::hooks::SatisfyHook;
use crate::identity::Origin;
use crate::loader::ServiceLoader;
use crate::registry::Registry;
use crate::service::ServiceRef;
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing a registry
///
/// Loaders and hooks are installed before any service is registered, so
/// auto-activation at build time already sees them.
#[derive(Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    loaders: Vec<(Arc<dyn ServiceLoader>, i32)>,
    hooks: Vec<Arc<dyn SatisfyHook>>,
    services: Vec<(ServiceRef, ServiceDescriptor, Origin)>,
    declared: Vec<(ServicesConfig, FactoryCatalog)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(&mut self, config: RegistryConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn max_parallel_activations(&mut self, max: usize) -> &mut Self {
        self.config.max_parallel_activations = max;
        self
    }

    pub fn admission_queue_capacity(&mut self, capacity: usize) -> &mut Self {
        self.config.admission_queue_capacity = capacity;
        self
    }

    pub fn admission_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.admission_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn auto_activate(&mut self, enabled: bool) -> &mut Self {
        self.config.auto_activate = enabled;
        self
    }

    pub fn loader(&mut self, loader: Arc<dyn ServiceLoader>, priority: i32) -> &mut Self {
        self.loaders.push((loader, priority));
        self
    }

    pub fn satisfy_hook(&mut self, hook: Arc<dyn SatisfyHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    /// Register a local service once the registry is built
    pub fn service(&mut self, service: ServiceRef, descriptor: ServiceDescriptor) -> &mut Self {
        self.service_with_origin(service, descriptor, Origin::Local)
    }

    pub fn service_with_origin(
        &mut self,
        service: ServiceRef,
        descriptor: ServiceDescriptor,
        origin: impl Into<Origin>,
    ) -> &mut Self {
        self.services.push((service, descriptor, origin.into()));
        self
    }

    /// Register the services declared in `config` through `catalog`
    ///
    /// The `[registry]` section of `config` is ignored here; use
    /// [`RegistryBuilder::config`] to apply it.
    pub fn services_from(&mut self, config: ServicesConfig, catalog: FactoryCatalog) -> &mut Self {
        self.declared.push((config, catalog));
        self
    }

    /// Add multiple services using a configuration function
    pub fn add_services<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        configure(&mut self);
        self
    }

    /// Add services from a module
    pub fn add_module<M: RegistryModule>(mut self, module: M) -> Self {
        module.configure(&mut self);
        self
    }

    pub fn build(self) -> RegistryResult<Registry> {
        let registry = Registry::with_config(self.config);
        for (loader, priority) in self.loaders {
            registry.register_loader(loader, priority)?;
        }
        for hook in self.hooks {
            registry.register_satisfy_hook(hook);
        }
        for (service, descriptor, origin) in self.services {
            registry.register_with_origin(service, descriptor, origin)?;
        }
        for (config, catalog) in &self.declared {
            registry.apply_config(config, catalog)?;
        }
        Ok(registry)
    }
}

/// A group of services, loaders and hooks installed together
pub trait RegistryModule {
    fn configure(&self, builder: &mut RegistryBuilder);
}
