//! Satisfaction hooks
//!
//! Hooks are predicates consulted once per holder before it may leave the
//! injected phase. They can be registered at any time; the chain accepts a
//! holder only when every hook does.

use crate::holder::ServiceHolder;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// Predicate deciding whether a holder may be considered ready
pub trait SatisfyHook: Send + Sync {
    /// Name reported when the hook vetoes a holder
    fn name(&self) -> &str;

    fn is_satisfied(&self, holder: &ServiceHolder) -> bool;
}

/// Hook backed by a closure
pub struct FnSatisfyHook<F> {
    name: String,
    predicate: F,
}

impl<F> FnSatisfyHook<F>
where
    F: Fn(&ServiceHolder) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> SatisfyHook for FnSatisfyHook<F>
where
    F: Fn(&ServiceHolder) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied(&self, holder: &ServiceHolder) -> bool {
        (self.predicate)(holder)
    }
}

/// Hook accepting only when all of its parts accept
pub struct AllOf {
    name: String,
    hooks: Vec<Arc<dyn SatisfyHook>>,
}

impl AllOf {
    pub fn new(name: impl Into<String>, hooks: Vec<Arc<dyn SatisfyHook>>) -> Self {
        Self {
            name: name.into(),
            hooks,
        }
    }
}

impl SatisfyHook for AllOf {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied(&self, holder: &ServiceHolder) -> bool {
        self.hooks.iter().all(|hook| hook.is_satisfied(holder))
    }
}

/// Runtime-pluggable set of hooks evaluated in registration order
#[derive(Default)]
pub struct SatisfyHookChain {
    hooks: RwLock<Vec<Arc<dyn SatisfyHook>>>,
}

impl SatisfyHookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook: Arc<dyn SatisfyHook>) {
        self.hooks.write().push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Evaluate the chain, returning the name of the first vetoing hook
    pub fn check(&self, holder: &ServiceHolder) -> Result<(), String> {
        // Snapshot so hooks may register further hooks without deadlocking
        let hooks: Vec<_> = self.hooks.read().iter().cloned().collect();
        for hook in hooks {
            if !hook.is_satisfied(holder) {
                trace!("Satisfy hook '{}' rejected {}", hook.name(), holder.identity());
                return Err(hook.name().to_string());
            }
        }
        Ok(())
    }
}
