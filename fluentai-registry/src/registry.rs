//! The registry façade
//!
//! The registry owns every holder in an arena keyed by [`HolderId`]. Edges
//! between holders are wired at registration time, in both directions,
//! under a single repository lock; lifecycle work runs outside that lock
//! through the [`ActivationScheduler`].

use crate::catalog::FactoryCatalog;
use crate::config::{RegistryConfig, ServicesConfig};
use crate::dependency::TypeTag;
use crate::descriptor::ServiceDescriptor;
use crate::error::{CyclePath, RegistryError, RegistryResult};
use crate::hooks::{SatisfyHook, SatisfyHookChain};
use crate::holder::{HolderGraph, HolderId, ServiceHolder};
use crate::identity::{Origin, ServiceIdentity};
use crate::lifecycle::LifecycleState;
use crate::loader::{LoadRequest, LoadedService, LoaderSet, ServiceLoader};
use crate::scheduler::{find_path, ActivationContext, ActivationScheduler};
use crate::service::{ArcServiceExt, Service, ServiceRef};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use slab::Slab;
use std::collections::VecDeque;
use std::fmt;
use std::iter;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Service registry
///
/// Cloning is cheap and yields another handle to the same registry.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: RegistryConfig,
    repository: RwLock<Repository>,
    loaders: LoaderSet,
    hooks: SatisfyHookChain,
    scheduler: ActivationScheduler,
    /// One gate per local id so concurrent lookups load a service once
    loading: Mutex<FxHashMap<String, Arc<ReentrantMutex<()>>>>,
}

#[derive(Default)]
struct Repository {
    holders: Slab<Arc<ServiceHolder>>,
    /// Local id -> holders carrying it, across origins
    by_local_id: FxHashMap<String, Vec<HolderId>>,
    /// Dependency target local id -> holders declaring such a dependency
    wanted_by: FxHashMap<String, Vec<HolderId>>,
}

/// An edge considered while registering a holder
struct CandidateEdge {
    dependent: Arc<ServiceHolder>,
    index: usize,
    provider: Arc<ServiceHolder>,
}

impl Repository {
    fn get(&self, id: HolderId) -> Option<&Arc<ServiceHolder>> {
        self.holders.get(id.index())
    }

    fn by_id<'a>(&'a self, local_id: &str) -> impl Iterator<Item = &'a Arc<ServiceHolder>> + 'a {
        self.by_local_id
            .get(local_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.get(*id))
    }

    fn matching(&self, pattern: &ServiceIdentity, required_type: Option<&TypeTag>) -> Vec<Arc<ServiceHolder>> {
        self.by_id(pattern.local_id())
            .filter(|holder| holder.matches(pattern))
            .filter(|holder| required_type.map_or(true, |tag| holder.provides(tag)))
            .filter(|holder| !holder.state().is_destroyed())
            .cloned()
            .collect()
    }

    /// Edges from the new holder's dependencies to existing providers,
    /// including itself, and from existing dependents to the new holder
    fn candidate_edges(&self, holder: &Arc<ServiceHolder>) -> Vec<CandidateEdge> {
        let mut edges = self.provider_edges(holder, |_| true);

        let mut seen = FxHashSet::default();
        for identity in holder.identities() {
            let dependents = self.wanted_by.get(identity.local_id()).into_iter().flatten();
            for dependent_id in dependents {
                if !seen.insert(*dependent_id) {
                    continue;
                }
                let Some(dependent) = self.get(*dependent_id) else {
                    continue;
                };
                for (index, dependency) in dependent.dependencies().into_iter().enumerate() {
                    trace!(
                        "Checking {} against dependency {} of {}",
                        holder.identity(),
                        dependency,
                        dependent.identity()
                    );
                    if holder.accepts(&dependency) {
                        edges.push(CandidateEdge {
                            dependent: dependent.clone(),
                            index,
                            provider: holder.clone(),
                        });
                    }
                }
            }
        }

        edges
    }

    /// Edges from the selected dependencies of `holder` to every provider
    /// accepting them, `holder` itself included
    fn provider_edges<F>(&self, holder: &Arc<ServiceHolder>, selected: F) -> Vec<CandidateEdge>
    where
        F: Fn(usize) -> bool,
    {
        let mut edges = Vec::new();
        for (index, dependency) in holder.dependencies().into_iter().enumerate() {
            if !selected(index) {
                continue;
            }
            let providers = self
                .by_id(dependency.target().local_id())
                .filter(|provider| provider.id() != holder.id())
                .chain(iter::once(holder));
            for provider in providers {
                trace!(
                    "Checking {} against dependency {} of {}",
                    provider.identity(),
                    dependency,
                    holder.identity()
                );
                if provider.accepts(&dependency) {
                    edges.push(CandidateEdge {
                        dependent: holder.clone(),
                        index,
                        provider: provider.clone(),
                    });
                }
            }
        }
        edges
    }

    /// Bind every candidate edge that does not close a cycle
    ///
    /// Cycle checks see the bound graph plus all candidate edges, so two
    /// edges forming a cycle together are both rejected. Returns the
    /// existing dependents that received a new binding.
    fn commit_edges(&self, holder: &Arc<ServiceHolder>, candidates: &[CandidateEdge]) -> Vec<Arc<ServiceHolder>> {
        let new_id = holder.id();
        let lookup = |id: HolderId| {
            if id == new_id {
                Some(holder)
            } else {
                self.get(id)
            }
        };
        let successors = |node: HolderId| -> Vec<HolderId> {
            let mut next = lookup(node).map(|h| h.providers()).unwrap_or_default();
            next.extend(
                candidates
                    .iter()
                    .filter(|edge| edge.dependent.id() == node)
                    .map(|edge| edge.provider.id()),
            );
            next
        };

        let mut touched: Vec<Arc<ServiceHolder>> = Vec::new();
        for edge in candidates {
            let (dependent, provider) = (edge.dependent.id(), edge.provider.id());

            if let Some(path) = find_path(provider, dependent, &successors) {
                let cycle = CyclePath(
                    iter::once(dependent)
                        .chain(path)
                        .filter_map(lookup)
                        .map(|h| h.identity().clone())
                        .collect(),
                );
                warn!(
                    "Rejected binding {} -> {}: would close cycle {}",
                    edge.dependent.identity(),
                    edge.provider.identity(),
                    cycle
                );
                edge.dependent.reject_cycle(edge.index, cycle);
                continue;
            }

            if edge.dependent.bind(edge.index, provider) {
                edge.provider.add_dependent(dependent);
                debug!("Bound {} -> {}", edge.dependent.identity(), edge.provider.identity());
                if dependent != new_id && !touched.iter().any(|t| t.id() == dependent) {
                    touched.push(edge.dependent.clone());
                }
            }
        }
        touched
    }

    fn insert(&mut self, holder: Arc<ServiceHolder>) {
        let id = holder.id();
        let key = self.holders.insert(holder.clone());
        debug_assert_eq!(key, id.index());

        for identity in holder.identities() {
            let ids = self.by_local_id.entry(identity.local_id().to_string()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        for dependency in holder.dependencies() {
            let ids = self
                .wanted_by
                .entry(dependency.target().local_id().to_string())
                .or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    fn detach(&mut self, id: HolderId) -> Option<Arc<ServiceHolder>> {
        if !self.holders.contains(id.index()) {
            return None;
        }
        let holder = self.holders.remove(id.index());
        for index in [&mut self.by_local_id, &mut self.wanted_by] {
            index.retain(|_, ids| {
                ids.retain(|other| *other != id);
                !ids.is_empty()
            });
        }
        Some(holder)
    }
}

impl HolderGraph for RegistryInner {
    fn holder(&self, id: HolderId) -> Option<Arc<ServiceHolder>> {
        self.repository.read().get(id).cloned()
    }

    fn satisfy_hooks(&self) -> &SatisfyHookChain {
        &self.hooks
    }
}

impl ActivationContext for RegistryInner {
    fn pull_through(&self, holder: &Arc<ServiceHolder>) -> RegistryResult<()> {
        for dependency in holder.unbound_dependencies() {
            if dependency.target().origin().is_local() {
                continue;
            }
            match self.load_through(
                dependency.target(),
                dependency.required_type(),
                Some(holder.identity()),
            ) {
                Ok(_) => {}
                Err(e) if dependency.is_optional() => warn!(
                    "Optional dependency {} of {} could not be loaded: {}",
                    dependency,
                    holder.identity(),
                    e
                ),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl RegistryInner {
    fn register_holder(
        &self,
        service: ServiceRef,
        descriptor: ServiceDescriptor,
        origin: Origin,
    ) -> RegistryResult<Arc<ServiceHolder>> {
        let (holder, touched) = self.insert_holder(service, descriptor, origin)?;
        if self.config.auto_activate {
            self.auto_activate(&holder, &touched);
        }
        Ok(holder)
    }

    /// Wire and insert a holder; returns it with the dependents it was bound into
    fn insert_holder(
        &self,
        service: ServiceRef,
        descriptor: ServiceDescriptor,
        origin: Origin,
    ) -> RegistryResult<(Arc<ServiceHolder>, Vec<Arc<ServiceHolder>>)> {
        let (holder, touched) = {
            let mut repository = self.repository.write();
            let id = HolderId::new(repository.holders.vacant_key());
            let holder = Arc::new(ServiceHolder::new(id, service, descriptor, origin)?);
            let candidates = repository.candidate_edges(&holder);
            let touched = repository.commit_edges(&holder, &candidates);
            repository.insert(holder.clone());
            (holder, touched)
        };
        debug!(
            "Registered {} ({}) with {} dependencies",
            holder.identity(),
            holder.instance().type_name(),
            holder.dependencies().len()
        );
        Ok((holder, touched))
    }

    /// Activate the new holder if it asks for it, and retry pending
    /// auto-activate dependents that just received a provider
    fn auto_activate(&self, holder: &Arc<ServiceHolder>, touched: &[Arc<ServiceHolder>]) {
        if holder.auto_activate() {
            if let Err(e) = self.scheduler.activate(self, holder) {
                warn!("Auto-activation of {} failed: {}", holder.identity(), e);
            }
        }

        // A pending dependent that comes up may unblock its own dependents
        let mut pending: VecDeque<Arc<ServiceHolder>> = touched.iter().cloned().collect();
        let mut seen = FxHashSet::default();
        while let Some(dependent) = pending.pop_front() {
            if !seen.insert(dependent.id())
                || !dependent.auto_activate()
                || dependent.state().has_reached(LifecycleState::Activated)
                || self.scheduler.is_driving(dependent.id())
            {
                continue;
            }
            match self.scheduler.activate(self, &dependent) {
                Ok(()) => {
                    debug!("Pending service {} activated", dependent.identity());
                    pending.extend(
                        dependent
                            .dependents()
                            .into_iter()
                            .filter_map(|id| self.holder(id)),
                    );
                }
                Err(e) => warn!("Auto-activation of {} failed: {}", dependent.identity(), e),
            }
        }
    }

    /// Exactly one matching holder, loading one if none is registered
    fn lookup_one(
        &self,
        pattern: &ServiceIdentity,
        required_type: Option<&TypeTag>,
    ) -> RegistryResult<Arc<ServiceHolder>> {
        let mut candidates = self.repository.read().matching(pattern, required_type);
        match candidates.len() {
            0 => self
                .load_through(pattern, required_type, None)?
                .ok_or_else(|| RegistryError::ServiceNotFound {
                    requested: pattern.clone(),
                }),
            1 => Ok(candidates.remove(0)),
            _ => Err(RegistryError::AmbiguousLookup {
                requested: pattern.clone(),
                candidates: candidates.iter().map(|h| h.identity().clone()).collect(),
            }),
        }
    }

    /// Ask the loaders serving `pattern`'s origin to materialize it
    ///
    /// Loads of the same local id are serialized; a caller that waited
    /// on another load gets the holder it produced. Loaders are tried in
    /// priority order until one produces a matching service. Errors are
    /// only surfaced when no loader succeeds.
    fn load_through(
        &self,
        pattern: &ServiceIdentity,
        required_type: Option<&TypeTag>,
        requester: Option<&ServiceIdentity>,
    ) -> RegistryResult<Option<Arc<ServiceHolder>>> {
        let gate = self.load_gate(pattern.local_id());
        let loaded = {
            let _loading = gate.lock();
            let existing = self.repository.read().matching(pattern, required_type);
            if let Some(holder) = existing.into_iter().next() {
                trace!("{} was loaded by a concurrent lookup", holder.identity());
                return Ok(Some(holder));
            }
            self.load_unique(pattern, required_type, requester)?
        };

        Ok(loaded.map(|(holder, touched)| {
            if self.config.auto_activate {
                self.auto_activate(&holder, &touched);
            }
            holder
        }))
    }

    fn load_gate(&self, local_id: &str) -> Arc<ReentrantMutex<()>> {
        self.loading
            .lock()
            .entry(local_id.to_string())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .clone()
    }

    /// Run the loaders for `pattern`; callers hold the load gate of its id
    fn load_unique(
        &self,
        pattern: &ServiceIdentity,
        required_type: Option<&TypeTag>,
        requester: Option<&ServiceIdentity>,
    ) -> RegistryResult<Option<(Arc<ServiceHolder>, Vec<Arc<ServiceHolder>>)>> {
        let request = LoadRequest {
            local_id: pattern.local_id(),
            required_type,
            requester,
        };

        let mut failure = None;
        for loader in self.loaders.candidates(pattern.origin()) {
            match loader.load(&request) {
                Ok(Some(loaded)) => {
                    if !answers(&loaded, pattern, required_type) {
                        warn!(
                            "Loader '{}' returned {:?} ({}) which does not answer {}",
                            loader.origin(),
                            loaded.descriptor.ids,
                            loaded.service.type_name(),
                            pattern
                        );
                        continue;
                    }
                    debug!("Loader '{}' provided {}", loader.origin(), pattern);
                    let origin = Origin::named(loader.origin());
                    return self
                        .insert_holder(loaded.service, loaded.descriptor, origin)
                        .map(Some);
                }
                Ok(None) => trace!("Loader '{}' has no {}", loader.origin(), pattern),
                Err(e) => {
                    warn!("Loader '{}' failed to load {}: {}", loader.origin(), pattern, e);
                    failure.get_or_insert((loader.origin().to_string(), e));
                }
            }
        }

        match failure {
            Some((loader, e)) => Err(RegistryError::LoaderFailed {
                loader,
                requested: pattern.clone(),
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    fn select<F>(&self, predicate: F) -> Vec<Arc<ServiceHolder>>
    where
        F: Fn(&ServiceHolder) -> bool,
    {
        self.repository
            .read()
            .holders
            .iter()
            .map(|(_, holder)| holder)
            .filter(|holder| predicate(holder))
            .cloned()
            .collect()
    }

    fn deactivate_group(&self, label: &str, holders: Vec<Arc<ServiceHolder>>) -> RegistryResult<usize> {
        let mut deactivated = 0;
        let mut first_error = None;
        for holder in dependents_first(holders) {
            match holder.deactivate() {
                Ok(true) => deactivated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to deactivate {}: {}", holder.identity(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        info!("Deactivated {} services for {}", deactivated, label);
        match first_error {
            Some(e) => Err(e),
            None => Ok(deactivated),
        }
    }
}

/// Whether a loaded service carries the requested id and type
fn answers(loaded: &LoadedService, pattern: &ServiceIdentity, required_type: Option<&TypeTag>) -> bool {
    loaded.descriptor.ids.iter().any(|id| id == pattern.local_id())
        && required_type.map_or(true, |tag| {
            loaded.service.type_tag() == *tag || loaded.descriptor.provides.contains(tag)
        })
}

/// Order holders so that dependents come before the providers they use
fn dependents_first(holders: Vec<Arc<ServiceHolder>>) -> Vec<Arc<ServiceHolder>> {
    let position: FxHashMap<HolderId, usize> = holders
        .iter()
        .enumerate()
        .map(|(i, holder)| (holder.id(), i))
        .collect();

    let mut waiting: Vec<usize> = holders
        .iter()
        .map(|holder| {
            holder
                .dependents()
                .iter()
                .filter(|d| **d != holder.id() && position.contains_key(d))
                .count()
        })
        .collect();

    let mut ready: VecDeque<usize> = (0..holders.len()).filter(|i| waiting[*i] == 0).collect();
    let mut done = vec![false; holders.len()];
    let mut order = Vec::with_capacity(holders.len());
    while let Some(i) = ready.pop_front() {
        done[i] = true;
        order.push(i);
        for provider in holders[i].providers() {
            if let Some(&j) = position.get(&provider) {
                if j != i && !done[j] {
                    waiting[j] = waiting[j].saturating_sub(1);
                    if waiting[j] == 0 {
                        ready.push_back(j);
                    }
                }
            }
        }
    }
    order.extend((0..holders.len()).filter(|i| !done[*i]));

    order.into_iter().map(|i| holders[i].clone()).collect()
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let scheduler = ActivationScheduler::new(&config);
        Self {
            inner: Arc::new(RegistryInner {
                config,
                repository: RwLock::new(Repository::default()),
                loaders: LoaderSet::new(),
                hooks: SatisfyHookChain::new(),
                scheduler,
                loading: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Build a registry and register every service declared in `config`
    pub fn from_config(config: &ServicesConfig, catalog: &FactoryCatalog) -> RegistryResult<Self> {
        let registry = Self::with_config(config.registry.clone());
        registry.apply_config(config, catalog)?;
        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &ActivationScheduler {
        &self.inner.scheduler
    }

    /// Register a service under the local origin
    pub fn register(
        &self,
        service: ServiceRef,
        descriptor: ServiceDescriptor,
    ) -> RegistryResult<ServiceIdentity> {
        self.register_with_origin(service, descriptor, Origin::Local)
    }

    /// Register a service under `origin`
    pub fn register_with_origin(
        &self,
        service: ServiceRef,
        descriptor: ServiceDescriptor,
        origin: impl Into<Origin>,
    ) -> RegistryResult<ServiceIdentity> {
        let holder = self
            .inner
            .register_holder(service, descriptor, origin.into())?;
        Ok(holder.identity().clone())
    }

    /// Register every service declared in `config` through `catalog`
    pub fn apply_config(
        &self,
        config: &ServicesConfig,
        catalog: &FactoryCatalog,
    ) -> RegistryResult<Vec<ServiceIdentity>> {
        let mut registered = Vec::with_capacity(config.services.len());
        for service in &config.services {
            let instance = catalog.create(&service.factory)?;
            registered.push(self.register_with_origin(
                instance,
                service.descriptor.clone(),
                service.origin.clone(),
            )?);
        }
        info!("Registered {} services from configuration", registered.len());
        Ok(registered)
    }

    pub fn register_loader(&self, loader: Arc<dyn ServiceLoader>, priority: i32) -> RegistryResult<()> {
        debug!("Registering loader '{}' with priority {}", loader.origin(), priority);
        self.inner.loaders.register(loader, priority)
    }

    pub fn register_satisfy_hook(&self, hook: Arc<dyn SatisfyHook>) {
        debug!("Registering satisfy hook '{}'", hook.name());
        self.inner.hooks.register(hook);
    }

    /// Activate and return the single service with `local_id`, any origin
    pub fn find(&self, local_id: &str) -> RegistryResult<ServiceRef> {
        self.find_with(&ServiceIdentity::any(local_id), None)
    }

    /// Activate and return the single service with `local_id` from `origin`
    pub fn find_in(&self, local_id: &str, origin: impl Into<Origin>) -> RegistryResult<ServiceRef> {
        self.find_with(&ServiceIdentity::new(local_id, origin), None)
    }

    /// Single-result lookup by identity pattern and optional type tag
    pub fn find_with(
        &self,
        pattern: &ServiceIdentity,
        required_type: Option<&TypeTag>,
    ) -> RegistryResult<ServiceRef> {
        let holder = self.inner.lookup_one(pattern, required_type)?;
        self.inner.scheduler.activate(&*self.inner, &holder)?;
        Ok(holder.instance())
    }

    /// Lookup downcast to the concrete service type
    pub fn find_as<T: Service>(&self, local_id: &str) -> RegistryResult<Arc<T>> {
        let holder = self.inner.lookup_one(&ServiceIdentity::any(local_id), None)?;
        self.inner.scheduler.activate(&*self.inner, &holder)?;
        let instance = holder.instance();
        instance
            .downcast_service::<T>()
            .ok_or_else(|| RegistryError::TypeMismatch {
                service: holder.identity().clone(),
                expected: std::any::type_name::<T>(),
                actual: instance.type_name(),
            })
    }

    /// Activate and return every service with `local_id`, any origin
    pub fn find_all(&self, local_id: &str) -> RegistryResult<Vec<ServiceRef>> {
        self.find_all_with(&ServiceIdentity::any(local_id), None)
    }

    pub fn find_all_with(
        &self,
        pattern: &ServiceIdentity,
        required_type: Option<&TypeTag>,
    ) -> RegistryResult<Vec<ServiceRef>> {
        let mut holders = self.inner.repository.read().matching(pattern, required_type);
        if holders.is_empty() {
            holders.extend(self.inner.load_through(pattern, required_type, None)?);
        }
        holders.sort_by_key(|holder| holder.id());

        let mut services = Vec::with_capacity(holders.len());
        for holder in holders {
            self.inner.scheduler.activate(&*self.inner, &holder)?;
            services.push(holder.instance());
        }
        Ok(services)
    }

    /// Drive every holder tagged `tag` to `Activated`
    ///
    /// All tagged holders are attempted; the first failure is returned.
    pub fn activate_by_tag(&self, tag: &str) -> RegistryResult<usize> {
        let mut holders = self.inner.select(|holder| holder.has_tag(tag));
        holders.sort_by_key(|holder| holder.id());

        let mut activated = 0;
        let mut first_error = None;
        for holder in &holders {
            match self.inner.scheduler.activate(&*self.inner, holder) {
                Ok(()) => activated += 1,
                Err(e) => {
                    warn!("Failed to activate {}: {}", holder.identity(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        info!("Activated {} of {} services tagged '{}'", activated, holders.len(), tag);
        match first_error {
            Some(e) => Err(e),
            None => Ok(activated),
        }
    }

    /// Deactivate every holder tagged `tag`, dependents first
    pub fn deactivate_by_tag(&self, tag: &str) -> RegistryResult<usize> {
        let holders = self.inner.select(|holder| holder.has_tag(tag));
        self.inner.deactivate_group(&format!("tag '{}'", tag), holders)
    }

    /// Deactivate every holder carrying one of `ids`, dependents first
    pub fn deactivate_by_ids<I, S>(&self, ids: I) -> RegistryResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<S> = ids.into_iter().collect();
        let holders = self.inner.select(|holder| {
            ids.iter().any(|id| {
                holder
                    .identities()
                    .iter()
                    .any(|identity| identity.local_id() == id.as_ref())
            })
        });
        self.inner.deactivate_group("ids", holders)
    }

    /// Destroy and detach every holder matching `local_id` and `origin`
    ///
    /// Edges pointing at removed holders are unbound and active dependents
    /// that had received them are told the value is gone.
    pub fn remove(&self, local_id: &str, origin: impl Into<Origin>) -> RegistryResult<usize> {
        let pattern = ServiceIdentity::new(local_id, origin);

        let mut removed = Vec::new();
        let mut ejected = Vec::new();
        {
            let mut repository = self.inner.repository.write();
            let ids: Vec<HolderId> = repository
                .by_id(local_id)
                .filter(|holder| holder.matches(&pattern))
                .map(|holder| holder.id())
                .collect();

            for id in ids {
                let Some(holder) = repository.detach(id) else {
                    continue;
                };
                for dependent_id in holder.dependents() {
                    if let Some(dependent) = repository.get(dependent_id) {
                        let dependencies = dependent.unbind_provider(id);
                        ejected.push((dependent.clone(), dependencies, holder.identity().clone()));
                    }
                }
                for provider_id in holder.providers() {
                    if let Some(provider) = repository.get(provider_id) {
                        provider.remove_dependent(id);
                    }
                }
                removed.push(holder);
            }

            // Cycles through a removed holder no longer exist; rewire those dependencies
            let gone: Vec<ServiceIdentity> = removed.iter().map(|h| h.identity().clone()).collect();
            let stale: Vec<(Arc<ServiceHolder>, Vec<usize>)> = repository
                .holders
                .iter()
                .map(|(_, holder)| (holder.clone(), holder.clear_cycles_through(&gone)))
                .filter(|(_, cleared)| !cleared.is_empty())
                .collect();
            for (holder, cleared) in stale {
                let candidates = repository.provider_edges(&holder, |index| cleared.contains(&index));
                repository.commit_edges(&holder, &candidates);
            }
        }

        if removed.is_empty() {
            return Err(RegistryError::ServiceNotFound { requested: pattern });
        }

        for holder in &removed {
            holder.destroy();
        }
        for (dependent, dependencies, provider) in ejected {
            for dependency in &dependencies {
                dependent.notify_removed(dependency, &provider);
            }
        }
        info!("Removed {} services matching {}", removed.len(), pattern);
        Ok(removed.len())
    }

    /// Holders carrying `local_id`, any origin
    pub fn holders(&self, local_id: &str) -> Vec<Arc<ServiceHolder>> {
        let mut holders: Vec<_> = self.inner.repository.read().by_id(local_id).cloned().collect();
        holders.sort_by_key(|holder| holder.id());
        holders
    }

    /// State of the holder whose primary identity is `identity`
    pub fn state_of(&self, identity: &ServiceIdentity) -> Option<LifecycleState> {
        self.inner
            .repository
            .read()
            .by_id(identity.local_id())
            .find(|holder| holder.identity() == identity)
            .map(|holder| holder.state())
    }

    /// Bound dependency edges as `(dependent, provider)` pairs, sorted
    pub fn edges(&self) -> Vec<(ServiceIdentity, ServiceIdentity)> {
        let repository = self.inner.repository.read();
        let mut edges: Vec<_> = repository
            .holders
            .iter()
            .flat_map(|(_, holder)| {
                holder
                    .providers()
                    .into_iter()
                    .filter_map(|id| repository.get(id))
                    .map(|provider| (holder.identity().clone(), provider.identity().clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        edges.sort();
        edges
    }

    /// Every holder's primary identity and state, sorted by identity
    pub fn states(&self) -> Vec<(ServiceIdentity, LifecycleState)> {
        let mut states: Vec<_> = self
            .inner
            .repository
            .read()
            .holders
            .iter()
            .map(|(_, holder)| (holder.identity().clone(), holder.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn len(&self) -> usize {
        self.inner.repository.read().holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.len())
            .field("loaders", &self.inner.loaders.len())
            .field("hooks", &self.inner.hooks.len())
            .finish()
    }
}
