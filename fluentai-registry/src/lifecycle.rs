//! Service lifecycle states and callbacks
//!
//! Every holder walks a ranked sequence of phases:
//!
//! ```text
//! Unresolved(0) -> Resolved(10) -> Injected(20) -> Satisfied(30) -> Activated(40)
//!                                                                      |
//!                                                                      v
//!                                                              Deactivated(50)
//!
//! any state -> Destroyed(-1)   (terminal)
//! ```
//!
//! Ranks never decrease except through the explicit deactivation and
//! destruction transitions.

use crate::dependency::Dependency;
use crate::error::RegistryResult;
use crate::identity::ServiceIdentity;
use crate::service::ServiceRef;
use std::fmt;

/// Lifecycle state of a holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Registered, dependencies not yet validated
    #[default]
    Unresolved,
    /// All required dependencies are bound and activated
    Resolved,
    /// Dependency values have been pushed into the instance
    Injected,
    /// Satisfaction hooks accepted the holder
    Satisfied,
    /// Activation callback ran, the service is usable
    Activated,
    /// Deactivation callback ran
    Deactivated,
    /// Removed from the registry, terminal
    Destroyed,
}

impl LifecycleState {
    /// The forward phases in order
    pub const PHASES: [LifecycleState; 4] = [
        LifecycleState::Resolved,
        LifecycleState::Injected,
        LifecycleState::Satisfied,
        LifecycleState::Activated,
    ];

    pub fn rank(&self) -> i32 {
        match self {
            LifecycleState::Unresolved => 0,
            LifecycleState::Resolved => 10,
            LifecycleState::Injected => 20,
            LifecycleState::Satisfied => 30,
            LifecycleState::Activated => 40,
            LifecycleState::Deactivated => 50,
            LifecycleState::Destroyed => -1,
        }
    }

    /// Whether a request for `target` is already met
    pub fn has_reached(&self, target: LifecycleState) -> bool {
        self.rank() >= target.rank()
    }

    pub fn is_activated(&self) -> bool {
        matches!(self, LifecycleState::Activated)
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, LifecycleState::Destroyed)
    }

    /// Forward phases still missing to reach `target`, lowest first
    pub fn pending_phases(&self, target: LifecycleState) -> impl Iterator<Item = LifecycleState> {
        let current = self.rank();
        let target = target.rank();
        Self::PHASES
            .into_iter()
            .filter(move |phase| phase.rank() > current && phase.rank() <= target)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unresolved => write!(f, "unresolved"),
            LifecycleState::Resolved => write!(f, "resolved"),
            LifecycleState::Injected => write!(f, "injected"),
            LifecycleState::Satisfied => write!(f, "satisfied"),
            LifecycleState::Activated => write!(f, "activated"),
            LifecycleState::Deactivated => write!(f, "deactivated"),
            LifecycleState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Trait for services that need lifecycle callbacks
pub trait LifecycleAware: Send + Sync {
    /// Called once the holder reaches the activated phase
    fn on_activate(&self) -> RegistryResult<()> {
        Ok(())
    }

    /// Called when the holder is deactivated or destroyed while active
    fn on_deactivate(&self) -> RegistryResult<()> {
        Ok(())
    }

    /// Called on an active service when a provider arrives late (`Some`)
    /// or is removed from the registry (`None`)
    fn on_dependency_changed(
        &self,
        _dependency: &Dependency,
        _provider: &ServiceIdentity,
        _value: Option<&ServiceRef>,
    ) {
    }
}
