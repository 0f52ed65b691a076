//! Service trait and the capabilities the registry may invoke

use crate::dependency::{Dependency, TypeTag};
use crate::error::RegistryResult;
use crate::identity::ServiceIdentity;
use crate::lifecycle::LifecycleAware;
use downcast_rs::{impl_downcast, DowncastSync};
use std::sync::Arc;

/// Shared handle to a registered service instance
pub type ServiceRef = Arc<dyn Service>;

/// Trait that all registered services implement
///
/// The registry treats instances as opaque apart from three optional
/// capabilities. A service opts into a capability by overriding the
/// matching accessor to return `Some(self)`.
pub trait Service: DowncastSync {
    /// Concrete type tag advertised for this instance
    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<Self>()
    }

    /// Type name for diagnostics
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Accepts dependency values pushed by the registry
    fn as_injectable(&self) -> Option<&dyn Injectable> {
        None
    }

    /// Receives activation, deactivation and dependency change callbacks
    fn as_lifecycle(&self) -> Option<&dyn LifecycleAware> {
        None
    }

    /// Produces a dedicated value for each consumer instead of sharing itself
    fn as_factory(&self) -> Option<&dyn ServiceFactory> {
        None
    }
}

impl_downcast!(sync Service);

/// A dependency value being pushed into a consumer
pub struct Injection<'a> {
    /// The edge the value satisfies
    pub dependency: &'a Dependency,
    /// Identity of the provider holder
    pub provider: &'a ServiceIdentity,
    /// The provider instance, or the value its factory produced
    pub value: ServiceRef,
}

impl Injection<'_> {
    /// Downcast the pushed value to a concrete type
    pub fn downcast<T: Service>(&self) -> Option<Arc<T>> {
        self.value.downcast_service::<T>()
    }
}

/// Capability: accepts dependency values by identifier
pub trait Injectable: Send + Sync {
    fn inject(&self, injection: Injection<'_>) -> RegistryResult<()>;
}

/// Capability: derives a per-consumer value from a shared instance
pub trait ServiceFactory: Send + Sync {
    fn create_for(&self, consumer: &ServiceIdentity) -> RegistryResult<ServiceRef>;
}

/// Extension methods on shared service handles
pub trait ArcServiceExt {
    /// Try to downcast to `Arc<T>`
    fn downcast_service<T: Service>(&self) -> Option<Arc<T>>;

    /// Whether both handles point at the same instance
    fn same_instance(&self, other: &ServiceRef) -> bool;
}

impl ArcServiceExt for ServiceRef {
    fn downcast_service<T: Service>(&self) -> Option<Arc<T>> {
        self.clone().downcast_arc::<T>().ok()
    }

    fn same_instance(&self, other: &ServiceRef) -> bool {
        std::ptr::eq(
            Arc::as_ptr(self) as *const (),
            Arc::as_ptr(other) as *const (),
        )
    }
}
