//! Service holders and the per-holder lifecycle state machine
//!
//! A holder wraps one service instance together with its identities, tags,
//! dependency bindings and lifecycle state. Holders live in the registry's
//! arena and refer to each other only through [`HolderId`] handles, so the
//! dependency graph never forms ownership cycles.
//!
//! Lifecycle requests (`resolve`, `inject`, `satisfy`, `activate`) ask the
//! holder to reach *at least* that phase. Lower phases that have not run yet
//! are performed first, and a holder already at or past the requested phase
//! returns immediately. A failing phase leaves the holder at the last phase
//! that completed, so a retry resumes instead of starting over.

use crate::dependency::{Dependency, TypeTag};
use crate::descriptor::ServiceDescriptor;
use crate::error::{CyclePath, RegistryError, RegistryResult};
use crate::hooks::SatisfyHookChain;
use crate::identity::{Origin, ServiceIdentity};
use crate::lifecycle::LifecycleState;
use crate::service::{Injection, ServiceRef};
use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Handle of a holder inside the registry arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId(usize);

impl HolderId {
    pub fn new(index: usize) -> Self {
        HolderId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Access to the rest of the graph while running lifecycle phases
pub trait HolderGraph {
    /// Look up a live holder by handle
    fn holder(&self, id: HolderId) -> Option<Arc<ServiceHolder>>;

    /// Hooks consulted by the satisfy phase
    fn satisfy_hooks(&self) -> &SatisfyHookChain;
}

/// Bindings of one declared dependency
#[derive(Debug, Clone)]
struct Binding {
    dependency: Dependency,
    providers: Vec<HolderId>,
    /// Set when every candidate provider was rejected for closing a cycle
    cycle: Option<CyclePath>,
}

/// Snapshot of one dependency's bindings
#[derive(Debug, Clone)]
pub struct BindingView {
    pub dependency: Dependency,
    pub providers: Vec<HolderId>,
    pub cycle: Option<CyclePath>,
}

#[derive(Debug)]
struct HolderInner {
    state: LifecycleState,
    bindings: Vec<Binding>,
    /// `(dependency index, provider)` pairs already pushed into the instance
    injected: FxHashSet<(usize, HolderId)>,
    /// Holders with a binding to this one, notified on late activation
    dependents: BTreeSet<HolderId>,
}

pub struct ServiceHolder {
    id: HolderId,
    identities: Vec<ServiceIdentity>,
    provided: Vec<TypeTag>,
    tags: BTreeSet<String>,
    auto_activate: bool,
    instance: ServiceRef,
    /// Serializes lifecycle transitions; reentrant so callbacks may look the holder up again
    transition: ReentrantMutex<()>,
    inner: Mutex<HolderInner>,
}

impl ServiceHolder {
    /// Create a holder for `instance`, registered under `origin`
    pub fn new(
        id: HolderId,
        instance: ServiceRef,
        descriptor: ServiceDescriptor,
        origin: Origin,
    ) -> RegistryResult<Self> {
        origin.ensure_concrete()?;
        if descriptor.ids.is_empty() {
            return Err(RegistryError::InvalidDescriptor(format!(
                "{} declares no local id",
                instance.type_name()
            )));
        }
        if let Some(blank) = descriptor.ids.iter().find(|id| id.trim().is_empty()) {
            return Err(RegistryError::InvalidDescriptor(format!(
                "local id {:?} of {} is blank",
                blank,
                instance.type_name()
            )));
        }

        let mut identities: Vec<ServiceIdentity> = Vec::with_capacity(descriptor.ids.len());
        for local_id in descriptor.ids {
            let identity = ServiceIdentity::new(local_id, origin.clone());
            if !identities.contains(&identity) {
                identities.push(identity);
            }
        }

        let mut provided = vec![instance.type_tag()];
        for tag in descriptor.provides {
            if !provided.contains(&tag) {
                provided.push(tag);
            }
        }

        let bindings = descriptor
            .dependencies
            .into_iter()
            .map(|dependency| Binding {
                dependency,
                providers: Vec::new(),
                cycle: None,
            })
            .collect();

        Ok(Self {
            id,
            identities,
            provided,
            tags: descriptor.tags,
            auto_activate: descriptor.auto_activate,
            instance,
            transition: ReentrantMutex::new(()),
            inner: Mutex::new(HolderInner {
                state: LifecycleState::Unresolved,
                bindings,
                injected: FxHashSet::default(),
                dependents: BTreeSet::new(),
            }),
        })
    }

    pub fn id(&self) -> HolderId {
        self.id
    }

    /// Primary identity, built from the first declared local id
    pub fn identity(&self) -> &ServiceIdentity {
        &self.identities[0]
    }

    pub fn identities(&self) -> &[ServiceIdentity] {
        &self.identities
    }

    pub fn origin(&self) -> &Origin {
        self.identity().origin()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn provided_types(&self) -> &[TypeTag] {
        &self.provided
    }

    pub fn provides(&self, tag: &TypeTag) -> bool {
        self.provided.contains(tag)
    }

    pub fn auto_activate(&self) -> bool {
        self.auto_activate
    }

    pub fn instance(&self) -> ServiceRef {
        self.instance.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Whether any identity of this holder is assignable to `pattern`
    pub fn matches(&self, pattern: &ServiceIdentity) -> bool {
        self.identities.iter().any(|id| id.is_assignable_to(pattern))
    }

    /// Whether this holder can be bound to `dependency`
    pub fn accepts(&self, dependency: &Dependency) -> bool {
        self.identities
            .iter()
            .any(|id| dependency.accepts(id, &self.provided))
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        self.inner
            .lock()
            .bindings
            .iter()
            .map(|b| b.dependency.clone())
            .collect()
    }

    pub fn bindings(&self) -> Vec<BindingView> {
        self.inner
            .lock()
            .bindings
            .iter()
            .map(|b| BindingView {
                dependency: b.dependency.clone(),
                providers: b.providers.clone(),
                cycle: b.cycle.clone(),
            })
            .collect()
    }

    /// Every provider bound to any dependency
    pub fn providers(&self) -> Vec<HolderId> {
        let inner = self.inner.lock();
        let mut providers: Vec<HolderId> = inner
            .bindings
            .iter()
            .flat_map(|b| b.providers.iter().copied())
            .collect();
        providers.sort();
        providers.dedup();
        providers
    }

    pub fn dependents(&self) -> Vec<HolderId> {
        self.inner.lock().dependents.iter().copied().collect()
    }

    /// Whether the value of `provider` has been pushed into the instance
    pub fn has_injected(&self, provider: HolderId) -> bool {
        self.inner
            .lock()
            .injected
            .iter()
            .any(|(_, injected)| *injected == provider)
    }

    /// Dependencies with neither a provider nor a recorded cycle
    pub(crate) fn unbound_dependencies(&self) -> Vec<Dependency> {
        self.inner
            .lock()
            .bindings
            .iter()
            .filter(|b| b.providers.is_empty() && b.cycle.is_none())
            .map(|b| b.dependency.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Edge bookkeeping, driven by the registry under its repository lock
    // ------------------------------------------------------------------

    /// Bind `provider` to the dependency at `index`; false if already bound
    pub(crate) fn bind(&self, index: usize, provider: HolderId) -> bool {
        let mut inner = self.inner.lock();
        let Some(binding) = inner.bindings.get_mut(index) else {
            return false;
        };
        if binding.providers.contains(&provider) {
            return false;
        }
        binding.providers.push(provider);
        binding.cycle = None;
        true
    }

    /// Record that binding the dependency at `index` would close `path`
    pub(crate) fn reject_cycle(&self, index: usize, path: CyclePath) {
        let mut inner = self.inner.lock();
        if let Some(binding) = inner.bindings.get_mut(index) {
            if binding.providers.is_empty() {
                binding.cycle = Some(path);
            }
        }
    }

    /// Forget cycle markers whose path passes through any of `removed`,
    /// returning the indices of the dependencies that were cleared
    pub(crate) fn clear_cycles_through(&self, removed: &[ServiceIdentity]) -> Vec<usize> {
        let mut inner = self.inner.lock();
        let mut cleared = Vec::new();
        for (index, binding) in inner.bindings.iter_mut().enumerate() {
            let through = binding
                .cycle
                .as_ref()
                .map_or(false, |path| path.identities().iter().any(|id| removed.contains(id)));
            if through {
                binding.cycle = None;
                cleared.push(index);
            }
        }
        cleared
    }

    pub(crate) fn add_dependent(&self, dependent: HolderId) {
        self.inner.lock().dependents.insert(dependent);
    }

    pub(crate) fn remove_dependent(&self, dependent: HolderId) {
        self.inner.lock().dependents.remove(&dependent);
    }

    /// Drop every binding to `provider`, returning the dependencies whose
    /// value had already been injected
    pub(crate) fn unbind_provider(&self, provider: HolderId) -> Vec<Dependency> {
        let mut inner = self.inner.lock();
        let HolderInner {
            bindings, injected, ..
        } = &mut *inner;

        let mut ejected = Vec::new();
        for (index, binding) in bindings.iter_mut().enumerate() {
            if let Some(pos) = binding.providers.iter().position(|p| *p == provider) {
                binding.providers.remove(pos);
                if injected.remove(&(index, provider)) {
                    ejected.push(binding.dependency.clone());
                }
            }
        }
        ejected
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn resolve(&self, graph: &dyn HolderGraph) -> RegistryResult<()> {
        self.advance_to(graph, LifecycleState::Resolved)
    }

    pub fn inject(&self, graph: &dyn HolderGraph) -> RegistryResult<()> {
        self.advance_to(graph, LifecycleState::Injected)
    }

    pub fn satisfy(&self, graph: &dyn HolderGraph) -> RegistryResult<()> {
        self.advance_to(graph, LifecycleState::Satisfied)
    }

    pub fn activate(&self, graph: &dyn HolderGraph) -> RegistryResult<()> {
        self.advance_to(graph, LifecycleState::Activated)
    }

    /// Run every pending phase up to and including `target`
    pub fn advance_to(&self, graph: &dyn HolderGraph, target: LifecycleState) -> RegistryResult<()> {
        let _transition = self.transition.lock();

        let current = self.state();
        if current.is_destroyed() {
            return Err(RegistryError::DestroyedService {
                service: self.identity().clone(),
            });
        }
        if current.has_reached(target) {
            return Ok(());
        }

        for phase in current.pending_phases(target) {
            self.run_phase(graph, phase)?;
            self.inner.lock().state = phase;
            debug!("Service {} is now {}", self.identity(), phase);
        }
        Ok(())
    }

    fn run_phase(&self, graph: &dyn HolderGraph, phase: LifecycleState) -> RegistryResult<()> {
        match phase {
            LifecycleState::Resolved => self.check_dependencies(graph),
            LifecycleState::Injected => self.inject_pending(graph).map(|_| ()),
            LifecycleState::Satisfied => {
                self.check_dependencies(graph)?;
                graph
                    .satisfy_hooks()
                    .check(self)
                    .map_err(|hook| RegistryError::UnsatisfiedService {
                        service: self.identity().clone(),
                        hook,
                    })
            }
            LifecycleState::Activated => {
                self.check_dependencies(graph)?;
                match self.instance.as_lifecycle() {
                    Some(lifecycle) => {
                        lifecycle
                            .on_activate()
                            .map_err(|e| RegistryError::ActivationFailed {
                                service: self.identity().clone(),
                                reason: e.to_string(),
                            })
                    }
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Every required dependency must be bound, unambiguous and activated
    fn check_dependencies(&self, graph: &dyn HolderGraph) -> RegistryResult<()> {
        for binding in self.bindings() {
            let dependency = &binding.dependency;
            let providers: Vec<_> = binding
                .providers
                .iter()
                .filter_map(|id| graph.holder(*id))
                .collect();

            if providers.is_empty() {
                if dependency.is_optional() {
                    continue;
                }
                return Err(match binding.cycle {
                    Some(path) => RegistryError::CycleDependency { path },
                    None => RegistryError::MissingRequiredDependency {
                        service: self.identity().clone(),
                        dependency: dependency.target().clone(),
                    },
                });
            }

            if dependency.is_single() && providers.len() > 1 {
                return Err(RegistryError::AmbiguousLookup {
                    requested: dependency.target().clone(),
                    candidates: providers.iter().map(|p| p.identity().clone()).collect(),
                });
            }

            for provider in &providers {
                if provider.state().is_activated() || dependency.is_optional() {
                    continue;
                }
                return Err(RegistryError::UnresolvedDependency {
                    service: self.identity().clone(),
                    dependency: provider.identity().clone(),
                });
            }
        }
        Ok(())
    }

    /// Push every activated, not yet injected provider into the instance
    fn inject_pending(
        &self,
        graph: &dyn HolderGraph,
    ) -> RegistryResult<Vec<(Dependency, ServiceIdentity, ServiceRef)>> {
        let mut pending: Vec<(usize, Dependency, HolderId)> = Vec::new();
        {
            let inner = self.inner.lock();
            for (index, binding) in inner.bindings.iter().enumerate() {
                for provider in &binding.providers {
                    if !inner.injected.contains(&(index, *provider)) {
                        pending.push((index, binding.dependency.clone(), *provider));
                    }
                }
            }
        }

        let mut pushed = Vec::new();
        for (index, dependency, provider_id) in pending {
            let Some(provider) = graph.holder(provider_id) else {
                continue;
            };
            if !provider.state().is_activated() {
                continue;
            }

            let value = match provider.instance.as_factory() {
                Some(factory) => factory.create_for(self.identity())?,
                None => provider.instance(),
            };
            if let Some(target) = self.instance.as_injectable() {
                target.inject(Injection {
                    dependency: &dependency,
                    provider: provider.identity(),
                    value: value.clone(),
                })?;
            }
            trace!("Injected {} into {}", provider.identity(), self.identity());

            self.inner.lock().injected.insert((index, provider_id));
            pushed.push((dependency, provider.identity().clone(), value));
        }
        Ok(pushed)
    }

    /// Push providers that became active after this holder was activated
    ///
    /// Returns the number of newly injected values. Holders that are not
    /// activated are left alone; their own inject phase will pick the
    /// providers up.
    pub fn rebind(&self, graph: &dyn HolderGraph) -> RegistryResult<usize> {
        let _transition = self.transition.lock();
        if !self.state().is_activated() {
            return Ok(0);
        }

        let pushed = self.inject_pending(graph)?;
        if let Some(lifecycle) = self.instance.as_lifecycle() {
            for (dependency, provider, value) in &pushed {
                lifecycle.on_dependency_changed(dependency, provider, Some(value));
            }
        }
        Ok(pushed.len())
    }

    /// Tell an active instance that a provider it received went away
    pub(crate) fn notify_removed(&self, dependency: &Dependency, provider: &ServiceIdentity) {
        let _transition = self.transition.lock();
        if !self.state().is_activated() {
            return;
        }
        if let Some(lifecycle) = self.instance.as_lifecycle() {
            lifecycle.on_dependency_changed(dependency, provider, None);
        }
    }

    /// Move to `Deactivated`, running the deactivation callback when active
    ///
    /// Returns false when the holder was already deactivated.
    pub fn deactivate(&self) -> RegistryResult<bool> {
        let _transition = self.transition.lock();
        match self.state() {
            LifecycleState::Destroyed => Err(RegistryError::DestroyedService {
                service: self.identity().clone(),
            }),
            LifecycleState::Deactivated => Ok(false),
            state => {
                if state.is_activated() {
                    if let Some(lifecycle) = self.instance.as_lifecycle() {
                        lifecycle
                            .on_deactivate()
                            .map_err(|e| RegistryError::ActivationFailed {
                                service: self.identity().clone(),
                                reason: format!("deactivation failed: {}", e),
                            })?;
                    }
                }
                self.inner.lock().state = LifecycleState::Deactivated;
                debug!("Service {} is now deactivated", self.identity());
                Ok(true)
            }
        }
    }

    /// Terminal transition; later lifecycle requests fail
    pub(crate) fn destroy(&self) {
        let _transition = self.transition.lock();
        let state = self.state();
        if state.is_destroyed() {
            return;
        }
        if state.is_activated() {
            if let Some(lifecycle) = self.instance.as_lifecycle() {
                if let Err(e) = lifecycle.on_deactivate() {
                    warn!("Deactivation of destroyed service {} failed: {}", self.identity(), e);
                }
            }
        }
        self.inner.lock().state = LifecycleState::Destroyed;
        debug!("Service {} destroyed", self.identity());
    }
}

impl fmt::Debug for ServiceHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHolder")
            .field("id", &self.id)
            .field("identities", &self.identities)
            .field("state", &self.state())
            .field("type", &self.instance.type_name())
            .finish()
    }
}
