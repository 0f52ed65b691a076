//! Example wiring a small service graph that arrives out of order

use fluentai_registry::prelude::*;
use fluentai_registry::{FactoryCatalog, RegistryModule, ServicesConfig};
use parking_lot::Mutex;
use std::sync::Arc;

struct Logger;

impl Service for Logger {
    fn as_lifecycle(&self) -> Option<&dyn LifecycleAware> {
        Some(self)
    }
}

impl LifecycleAware for Logger {
    fn on_activate(&self) -> RegistryResult<()> {
        println!("  logger: ready");
        Ok(())
    }
}

/// Consumer that keeps whatever the registry pushes into it
#[derive(Default)]
struct Worker {
    name: String,
    wired: Mutex<Vec<String>>,
}

impl Worker {
    fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }
}

impl Service for Worker {
    fn as_injectable(&self) -> Option<&dyn Injectable> {
        Some(self)
    }

    fn as_lifecycle(&self) -> Option<&dyn LifecycleAware> {
        Some(self)
    }
}

impl Injectable for Worker {
    fn inject(&self, injection: Injection<'_>) -> RegistryResult<()> {
        self.wired.lock().push(injection.provider.to_string());
        Ok(())
    }
}

impl LifecycleAware for Worker {
    fn on_activate(&self) -> RegistryResult<()> {
        println!("  {}: started with {:?}", self.name, self.wired.lock());
        Ok(())
    }

    fn on_deactivate(&self) -> RegistryResult<()> {
        println!("  {}: stopped", self.name);
        Ok(())
    }

    fn on_dependency_changed(
        &self,
        _dependency: &Dependency,
        provider: &ServiceIdentity,
        value: Option<&ServiceRef>,
    ) {
        let change = if value.is_some() { "arrived" } else { "left" };
        println!("  {}: {} {}", self.name, provider, change);
    }
}

/// Services every deployment needs
struct CoreModule;

impl RegistryModule for CoreModule {
    fn configure(&self, builder: &mut RegistryBuilder) {
        builder
            .service(
                Worker::named("api"),
                ServiceDescriptor::new("api")
                    .requires("logger")
                    .wants("cache")
                    .tag("frontend")
                    .auto_activate(true),
            )
            .service(
                Arc::new(Logger),
                ServiceDescriptor::new("logger").auto_activate(true),
            );
    }
}

const DECLARED: &str = r#"
[[services]]
factory = "worker"
ids = ["reports"]
tags = ["batch"]

[[services.dependencies]]
target = { local_id = "api", origin = "ANY" }
"#;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Service Graph Demo ===\n");

    let mut catalog = FactoryCatalog::new();
    catalog.register_factory("worker", || Ok(Worker::named("reports") as ServiceRef));
    let declared = ServicesConfig::from_toml(DECLARED)?;

    println!("1. Building the registry");
    let registry = RegistryBuilder::new()
        .add_module(CoreModule)
        .add_services(|builder| {
            builder.services_from(declared, catalog);
        })
        .build()?;

    println!("\n2. A cache shows up after the api started");
    registry.register(
        Arc::new(Logger),
        ServiceDescriptor::new("cache").auto_activate(true),
    )?;

    println!("\n3. Activating the batch group");
    let started = registry.activate_by_tag("batch")?;
    println!("  {} service(s) started", started);

    println!("\n4. Graph");
    for (dependent, provider) in registry.edges() {
        println!("  {} -> {}", dependent, provider);
    }
    for (identity, state) in registry.states() {
        println!("  {:<12} {}", identity.to_string(), state);
    }

    println!("\n5. Shutting down the frontend");
    registry.deactivate_by_tag("frontend")?;
    registry.deactivate_by_ids(["reports"])?;

    Ok(())
}
