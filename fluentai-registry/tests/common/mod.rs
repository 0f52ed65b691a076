//! Services shared by the integration tests

#![allow(dead_code)]

use fluentai_registry::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Ordered log of callbacks across several services
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Service recording every value pushed into it and every callback
pub struct Recorder {
    name: String,
    journal: Option<Journal>,
    failing: AtomicBool,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
    injected: Mutex<Vec<(String, ServiceRef)>>,
    changes: Mutex<Vec<(String, bool)>>,
}

impl Recorder {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, None))
    }

    pub fn with_journal(name: &str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self::build(name, Some(journal.clone())))
    }

    fn build(name: &str, journal: Option<Journal>) -> Self {
        Self {
            name: name.to_string(),
            journal,
            failing: AtomicBool::new(false),
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
            injected: Mutex::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    /// Latest value injected from a provider with this local id
    pub fn injected(&self, local_id: &str) -> Option<ServiceRef> {
        self.injected
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == local_id)
            .map(|(_, value)| value.clone())
    }

    pub fn injected_count(&self) -> usize {
        self.injected.lock().len()
    }

    pub fn changes(&self) -> Vec<(String, bool)> {
        self.changes.lock().clone()
    }

    fn log(&self, event: &str) {
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("{} {}", event, self.name));
        }
    }
}

impl Service for Recorder {
    fn as_injectable(&self) -> Option<&dyn Injectable> {
        Some(self)
    }

    fn as_lifecycle(&self) -> Option<&dyn LifecycleAware> {
        Some(self)
    }
}

impl Injectable for Recorder {
    fn inject(&self, injection: Injection<'_>) -> RegistryResult<()> {
        self.injected
            .lock()
            .push((injection.provider.local_id().to_string(), injection.value));
        Ok(())
    }
}

impl LifecycleAware for Recorder {
    fn on_activate(&self) -> RegistryResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistryError::Other(format!("{} refused to start", self.name)));
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        self.log("activate");
        Ok(())
    }

    fn on_deactivate(&self) -> RegistryResult<()> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        self.log("deactivate");
        Ok(())
    }

    fn on_dependency_changed(
        &self,
        _dependency: &Dependency,
        provider: &ServiceIdentity,
        value: Option<&ServiceRef>,
    ) {
        self.changes
            .lock()
            .push((provider.local_id().to_string(), value.is_some()));
    }
}

/// Service without any capability
pub struct Plain;

impl Service for Plain {}

pub fn plain() -> ServiceRef {
    Arc::new(Plain)
}

/// Install a test subscriber once; repeated calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
