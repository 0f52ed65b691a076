//! Service registry and lifecycle engine for FluentAi
//!
//! The registry accepts opaque services together with their declared
//! dependencies, wires them into a directed graph as they arrive, and
//! drives each service through an ordered lifecycle:
//! resolve, inject, satisfy, activate.
//!
//! ```no_run
//! use fluentai_registry::prelude::*;
//! use std::sync::Arc;
//!
//! struct Logger;
//! impl Service for Logger {}
//!
//! # fn main() -> RegistryResult<()> {
//! let registry = Registry::new();
//! registry.register(Arc::new(Logger), ServiceDescriptor::new("logger").auto_activate(true))?;
//! let logger = registry.find_as::<Logger>("logger")?;
//! # let _ = logger;
//! # Ok(())
//! # }
//! ```
//!
//! Services arrive in any order. Edges are bound in both directions when a
//! holder is registered, edges that would close a cycle are rejected, and
//! providers that activate after their dependents are pushed into them
//! late.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod holder;
pub mod hooks;
pub mod identity;
pub mod lifecycle;
pub mod loader;
pub mod registry;
pub mod scheduler;
pub mod service;

pub use builder::{RegistryBuilder, RegistryModule};
pub use catalog::{CatalogLoader, FactoryCatalog};
pub use config::{RegistryConfig, ServiceConfig, ServicesConfig};
pub use dependency::{Cardinality, Dependency, TypeTag};
pub use descriptor::ServiceDescriptor;
pub use error::{CyclePath, RegistryError, RegistryResult};
pub use holder::{HolderGraph, HolderId, ServiceHolder};
pub use hooks::{AllOf, FnSatisfyHook, SatisfyHook, SatisfyHookChain};
pub use identity::{Origin, ServiceIdentity};
pub use lifecycle::{LifecycleAware, LifecycleState};
pub use loader::{LoadRequest, LoadedService, LoaderSet, ServiceLoader};
pub use registry::Registry;
pub use scheduler::{ActivationScheduler, AdmissionPermit};
pub use service::{ArcServiceExt, Injectable, Injection, Service, ServiceFactory, ServiceRef};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        ArcServiceExt, Dependency, Injectable, Injection, LifecycleAware, LifecycleState, Origin,
        Registry, RegistryBuilder, RegistryError, RegistryResult, Service, ServiceDescriptor,
        ServiceFactory, ServiceIdentity, ServiceLoader, ServiceRef,
    };
}
