//! Error types for the service registry

use crate::identity::ServiceIdentity;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Ordered list of identities forming a dependency cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePath(pub Vec<ServiceIdentity>);

impl CyclePath {
    /// Identities along the cycle, first and last entries are the same holder
    pub fn identities(&self) -> &[ServiceIdentity] {
        &self.0
    }

    /// Whether the cycle passes through a holder with this local id
    pub fn contains(&self, local_id: &str) -> bool {
        self.0.iter().any(|id| id.local_id() == local_id)
    }
}

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for id in &self.0 {
            if !first {
                write!(f, " -> ")?;
            }
            write!(f, "{}", id)?;
            first = false;
        }
        Ok(())
    }
}

/// Errors that can occur while wiring or activating services
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    /// A non-optional dependency was never bound to a provider
    #[error("Missing required dependency {dependency} of service {service}")]
    MissingRequiredDependency {
        service: ServiceIdentity,
        dependency: ServiceIdentity,
    },

    /// Binding the dependency would close a cycle
    #[error("Circular dependency detected: {path}")]
    CycleDependency { path: CyclePath },

    /// A bound dependency has not reached the activated phase
    #[error("Dependency {dependency} of service {service} is not activated")]
    UnresolvedDependency {
        service: ServiceIdentity,
        dependency: ServiceIdentity,
    },

    /// A satisfaction hook vetoed the service
    #[error("Service {service} rejected by satisfy hook '{hook}'")]
    UnsatisfiedService { service: ServiceIdentity, hook: String },

    /// The service's activation hook failed
    #[error("Failed to activate service {service}: {reason}")]
    ActivationFailed { service: ServiceIdentity, reason: String },

    /// Operation on a holder that was removed from the registry
    #[error("Service {service} has been destroyed")]
    DestroyedService { service: ServiceIdentity },

    /// No admission slot became free in time
    #[error("Activation of {service} timed out after {waited:?} waiting for an admission slot")]
    ActivationTimedOut {
        service: ServiceIdentity,
        waited: Duration,
    },

    /// The admission queue is already at capacity
    #[error("Admission queue is full ({capacity} waiting), rejected activation of {service}")]
    AdmissionQueueFull {
        service: ServiceIdentity,
        capacity: usize,
    },

    /// A single-result lookup matched more than one holder
    #[error("Ambiguous lookup for {requested}: {} candidates", .candidates.len())]
    AmbiguousLookup {
        requested: ServiceIdentity,
        candidates: Vec<ServiceIdentity>,
    },

    /// No holder matched and no loader could materialize one
    #[error("Service not found: {requested}")]
    ServiceNotFound { requested: ServiceIdentity },

    /// The origin is reserved or empty in this position
    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    /// A loader failed while materializing a service
    #[error("Loader '{loader}' failed to load {requested}: {reason}")]
    LoaderFailed {
        loader: String,
        requested: ServiceIdentity,
        reason: String,
    },

    /// A typed lookup found a service of another concrete type
    #[error("Service {service} is a {actual}, not a {expected}")]
    TypeMismatch {
        service: ServiceIdentity,
        expected: &'static str,
        actual: &'static str,
    },

    /// The descriptor cannot be registered as given
    #[error("Invalid service descriptor: {0}")]
    InvalidDescriptor(String),

    /// Configuration referenced a factory the catalog does not know
    #[error("Unknown service factory: {0}")]
    UnknownFactory(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error raised by a service's own callbacks
    #[error("Registry error: {0}")]
    Other(String),
}

impl RegistryError {
    /// Identity of the service the error is about, if there is one
    pub fn service(&self) -> Option<&ServiceIdentity> {
        match self {
            RegistryError::MissingRequiredDependency { service, .. }
            | RegistryError::UnresolvedDependency { service, .. }
            | RegistryError::UnsatisfiedService { service, .. }
            | RegistryError::ActivationFailed { service, .. }
            | RegistryError::DestroyedService { service }
            | RegistryError::ActivationTimedOut { service, .. }
            | RegistryError::AdmissionQueueFull { service, .. }
            | RegistryError::TypeMismatch { service, .. } => Some(service),
            RegistryError::AmbiguousLookup { requested, .. }
            | RegistryError::ServiceNotFound { requested }
            | RegistryError::LoaderFailed { requested, .. } => Some(requested),
            RegistryError::CycleDependency { path } => path.0.first(),
            RegistryError::InvalidOrigin { .. }
            | RegistryError::InvalidDescriptor(_)
            | RegistryError::UnknownFactory(_)
            | RegistryError::ConfigError(_)
            | RegistryError::Other(_) => None,
        }
    }
}
