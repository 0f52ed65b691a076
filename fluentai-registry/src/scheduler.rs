//! Activation scheduling
//!
//! The scheduler bounds how many activation attempts run at once. An
//! attempt is the outermost `activate` call on a thread; everything it
//! drives transitively (providers first, then the target) runs under the
//! same admission slot. Attempts beyond the bound wait in a FIFO queue of
//! limited size and give up after the configured timeout.
//!
//! Each thread keeps a traversal stack of the holders it is currently
//! driving. Revisiting a holder already on the stack is a cycle.

use crate::config::RegistryConfig;
use crate::error::{CyclePath, RegistryError, RegistryResult};
use crate::holder::{HolderGraph, HolderId, ServiceHolder};
use crate::identity::ServiceIdentity;
use crate::lifecycle::LifecycleState;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

thread_local! {
    /// Holders being driven on this thread, keyed by scheduler address
    static TRAVERSAL: RefCell<Vec<(usize, HolderId)>> = RefCell::new(Vec::new());
}

/// Graph operations the scheduler needs beyond plain holder lookup
pub(crate) trait ActivationContext: HolderGraph {
    /// Offer unbound non-local dependencies of `holder` to the loaders
    fn pull_through(&self, holder: &Arc<ServiceHolder>) -> RegistryResult<()>;
}

#[derive(Debug, Default)]
struct AdmissionState {
    in_flight: usize,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

/// Bounded admission control plus the recursive activation driver
#[derive(Debug)]
pub struct ActivationScheduler {
    max_parallel: usize,
    queue_capacity: usize,
    timeout: Duration,
    state: Mutex<AdmissionState>,
    released: Condvar,
}

/// Slot held by one in-flight activation attempt
#[must_use]
pub struct AdmissionPermit<'a> {
    scheduler: &'a ActivationScheduler,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        let mut state = self.scheduler.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.scheduler.released.notify_all();
    }
}

/// Pops the traversal stack when a drive step ends, including on error
struct TraversalGuard;

impl Drop for TraversalGuard {
    fn drop(&mut self) {
        TRAVERSAL.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl ActivationScheduler {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            max_parallel: config.max_parallel_activations.max(1),
            queue_capacity: config.admission_queue_capacity,
            timeout: config.admission_timeout(),
            state: Mutex::new(AdmissionState::default()),
            released: Condvar::new(),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Attempts currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Attempts currently waiting for a slot
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Wait for an admission slot, first come first served
    pub fn admit(&self, service: &ServiceIdentity) -> RegistryResult<AdmissionPermit<'_>> {
        let mut state = self.state.lock();
        if state.queue.is_empty() && state.in_flight < self.max_parallel {
            state.in_flight += 1;
            return Ok(AdmissionPermit { scheduler: self });
        }
        if state.queue.len() >= self.queue_capacity {
            return Err(RegistryError::AdmissionQueueFull {
                service: service.clone(),
                capacity: self.queue_capacity,
            });
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);
        trace!("Activation of {} queued as ticket {}", service, ticket);

        let started = Instant::now();
        let deadline = started + self.timeout;
        loop {
            if state.queue.front() == Some(&ticket) && state.in_flight < self.max_parallel {
                state.queue.pop_front();
                state.in_flight += 1;
                drop(state);
                // The next ticket may fit as well
                self.released.notify_all();
                return Ok(AdmissionPermit { scheduler: self });
            }
            if Instant::now() >= deadline {
                state.queue.retain(|queued| *queued != ticket);
                drop(state);
                self.released.notify_all();
                let waited = started.elapsed();
                warn!("Activation of {} timed out after {:?}", service, waited);
                return Err(RegistryError::ActivationTimedOut {
                    service: service.clone(),
                    waited,
                });
            }
            self.released.wait_until(&mut state, deadline);
        }
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Whether this thread is already inside an attempt of this scheduler
    fn is_nested(&self) -> bool {
        let key = self.key();
        TRAVERSAL.with(|stack| stack.borrow().iter().any(|(owner, _)| *owner == key))
    }

    /// Whether this thread is currently driving `id`
    pub(crate) fn is_driving(&self, id: HolderId) -> bool {
        let key = (self.key(), id);
        TRAVERSAL.with(|stack| stack.borrow().contains(&key))
    }

    /// Drive `holder` to `Activated`, activating its providers first
    pub(crate) fn activate<C: ActivationContext>(
        &self,
        ctx: &C,
        holder: &Arc<ServiceHolder>,
    ) -> RegistryResult<()> {
        if holder.state().has_reached(LifecycleState::Activated) {
            return Ok(());
        }

        let _permit = if self.is_nested() {
            None
        } else {
            Some(self.admit(holder.identity())?)
        };
        self.drive(ctx, holder)
    }

    fn drive<C: ActivationContext>(&self, ctx: &C, holder: &Arc<ServiceHolder>) -> RegistryResult<()> {
        let key = (self.key(), holder.id());
        let revisited = TRAVERSAL.with(|stack| {
            let stack = stack.borrow();
            stack
                .iter()
                .position(|entry| *entry == key)
                .map(|start| stack[start..].iter().map(|(_, id)| *id).collect::<Vec<_>>())
        });
        if let Some(ids) = revisited {
            let mut path: Vec<ServiceIdentity> = ids
                .into_iter()
                .filter_map(|id| ctx.holder(id))
                .map(|h| h.identity().clone())
                .collect();
            path.push(holder.identity().clone());
            return Err(RegistryError::CycleDependency {
                path: CyclePath(path),
            });
        }

        TRAVERSAL.with(|stack| stack.borrow_mut().push(key));
        let _guard = TraversalGuard;

        if holder.state().has_reached(LifecycleState::Activated) {
            return Ok(());
        }

        ctx.pull_through(holder)?;

        for binding in holder.bindings() {
            for provider_id in &binding.providers {
                let Some(provider) = ctx.holder(*provider_id) else {
                    continue;
                };
                if provider.state().has_reached(LifecycleState::Activated) {
                    continue;
                }
                if let Err(e) = self.drive(ctx, &provider) {
                    if binding.dependency.is_optional() {
                        warn!(
                            "Optional dependency {} of {} failed to activate: {}",
                            provider.identity(),
                            holder.identity(),
                            e
                        );
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        holder.activate(ctx)?;
        self.notify_dependents(ctx, holder);
        Ok(())
    }

    /// Push a freshly activated provider into dependents that are already active
    fn notify_dependents<C: ActivationContext>(&self, ctx: &C, provider: &ServiceHolder) {
        for dependent_id in provider.dependents() {
            let Some(dependent) = ctx.holder(dependent_id) else {
                continue;
            };
            if !dependent.state().is_activated() {
                continue;
            }
            match dependent.rebind(ctx) {
                Ok(0) => {}
                Ok(pushed) => debug!(
                    "Rebound {} into {} ({} new values)",
                    provider.identity(),
                    dependent.identity(),
                    pushed
                ),
                Err(e) => warn!(
                    "Failed to rebind {} into {}: {}",
                    provider.identity(),
                    dependent.identity(),
                    e
                ),
            }
        }
    }
}

/// Depth-first search for a path `from ->* to` over `successors`
///
/// Returns the visited handles in order, both ends included.
pub(crate) fn find_path<F>(from: HolderId, to: HolderId, successors: F) -> Option<Vec<HolderId>>
where
    F: Fn(HolderId) -> Vec<HolderId>,
{
    fn walk<F>(
        node: HolderId,
        to: HolderId,
        successors: &F,
        visited: &mut FxHashSet<HolderId>,
        path: &mut Vec<HolderId>,
    ) -> bool
    where
        F: Fn(HolderId) -> Vec<HolderId>,
    {
        path.push(node);
        if node == to {
            return true;
        }
        if visited.insert(node) {
            for next in successors(node) {
                if walk(next, to, successors, visited, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    let mut visited = FxHashSet::default();
    let mut path = Vec::new();
    if walk(from, to, &successors, &mut visited, &mut path) {
        Some(path)
    } else {
        None
    }
}
