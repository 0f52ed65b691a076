//! Integration tests for wiring and the activation lifecycle

mod common;

use common::{init_tracing, journal, plain, Recorder};
use fluentai_registry::prelude::*;
use fluentai_registry::{FnSatisfyHook, RegistryConfig, ServiceHolder, TypeTag};
use std::sync::Arc;

fn manual_registry() -> Registry {
    Registry::with_config(RegistryConfig {
        auto_activate: false,
        ..Default::default()
    })
}

#[test]
fn test_logger_injected_into_service() {
    init_tracing();
    let registry = Registry::new();
    let logger = Recorder::new("logger");
    let service_a = Recorder::new("service-a");

    registry
        .register(logger.clone(), ServiceDescriptor::new("logger").auto_activate(true))
        .unwrap();
    assert_eq!(
        registry.state_of(&ServiceIdentity::local("logger")),
        Some(LifecycleState::Activated)
    );

    registry
        .register(service_a.clone(), ServiceDescriptor::new("service-a").requires("logger"))
        .unwrap();

    let found = registry.find("service-a").unwrap();
    assert!(found.downcast_service::<Recorder>().is_some());

    let injected = service_a.injected("logger").unwrap();
    let found_logger = registry.find("logger").unwrap();
    assert!(injected.same_instance(&found_logger));
    assert_eq!(logger.activations(), 1);
}

#[test]
fn test_activate_is_idempotent() {
    let registry = manual_registry();
    let service = Recorder::new("svc");
    registry.register(service.clone(), ServiceDescriptor::new("svc")).unwrap();

    for _ in 0..5 {
        assert!(registry.find("svc").is_ok());
    }
    assert_eq!(registry.holders("svc")[0].state(), LifecycleState::Activated);
    assert_eq!(service.activations(), 1);
}

#[test]
fn test_mutual_dependency_is_rejected() {
    init_tracing();
    let registry = manual_registry();
    registry.register(plain(), ServiceDescriptor::new("a").requires("b")).unwrap();
    registry.register(plain(), ServiceDescriptor::new("b").requires("a")).unwrap();

    match registry.find("a") {
        Err(RegistryError::CycleDependency { path }) => {
            assert!(path.contains("a"));
            assert!(path.contains("b"));
        }
        other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
    }
    assert!(registry.edges().is_empty());
    assert_eq!(
        registry.state_of(&ServiceIdentity::local("a")),
        Some(LifecycleState::Unresolved)
    );
}

#[test]
fn test_cycle_through_three_services() {
    let registry = manual_registry();
    registry.register(plain(), ServiceDescriptor::new("x").requires("y")).unwrap();
    registry.register(plain(), ServiceDescriptor::new("y").requires("z")).unwrap();
    registry.register(plain(), ServiceDescriptor::new("z").requires("x")).unwrap();

    let edges = registry.edges();
    assert_eq!(
        edges,
        vec![(ServiceIdentity::local("x"), ServiceIdentity::local("y"))]
    );
    let err = registry.find("x").err().unwrap();
    assert!(matches!(err, RegistryError::CycleDependency { .. }));
}

#[test]
fn test_removal_breaks_cycle() {
    let registry = manual_registry();
    registry.register(plain(), ServiceDescriptor::new("a").requires("b")).unwrap();
    registry.register(plain(), ServiceDescriptor::new("b").requires("a")).unwrap();
    registry.remove("b", Origin::Any).unwrap();

    match registry.find("a") {
        Err(RegistryError::MissingRequiredDependency { dependency, .. }) => {
            assert_eq!(dependency, ServiceIdentity::any("b"));
        }
        other => panic!("expected a missing dependency, got {:?}", other.map(|_| ())),
    }

    // The dependency is open again for a new provider
    registry.register(plain(), ServiceDescriptor::new("b")).unwrap();
    assert!(registry.find("a").is_ok());
    assert_eq!(
        registry.edges(),
        vec![(ServiceIdentity::local("a"), ServiceIdentity::local("b"))]
    );
}

#[test]
fn test_removal_rewires_rejected_edges() {
    let registry = manual_registry();
    registry.register(plain(), ServiceDescriptor::new("x").requires("y")).unwrap();
    registry.register(plain(), ServiceDescriptor::new("y").requires("z")).unwrap();
    registry.register(plain(), ServiceDescriptor::new("z").requires("x")).unwrap();
    registry.remove("x", Origin::Any).unwrap();

    assert_eq!(
        registry.edges(),
        vec![(ServiceIdentity::local("y"), ServiceIdentity::local("z"))]
    );
    assert!(matches!(
        registry.find("z"),
        Err(RegistryError::MissingRequiredDependency { .. })
    ));
}

#[test]
fn test_optional_unbound_dependency_is_tolerated() {
    let registry = manual_registry();
    let consumer = Recorder::new("consumer");
    registry
        .register(consumer.clone(), ServiceDescriptor::new("consumer").wants("metrics"))
        .unwrap();

    assert!(registry.find("consumer").is_ok());
    assert_eq!(consumer.activations(), 1);
    assert_eq!(consumer.injected_count(), 0);
}

#[test]
fn test_missing_required_dependency() {
    let registry = manual_registry();
    registry
        .register(plain(), ServiceDescriptor::new("consumer").requires("db"))
        .unwrap();

    let err = registry.find("consumer").err().unwrap();
    match err {
        RegistryError::MissingRequiredDependency { service, dependency } => {
            assert_eq!(service, ServiceIdentity::local("consumer"));
            assert_eq!(dependency, ServiceIdentity::any("db"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_late_provider_is_pushed_without_reactivation() {
    init_tracing();
    let registry = manual_registry();
    let consumer = Recorder::new("consumer");
    registry
        .register(consumer.clone(), ServiceDescriptor::new("consumer").wants("cache"))
        .unwrap();
    registry.find("consumer").unwrap();
    assert!(consumer.injected("cache").is_none());

    let cache = Recorder::new("cache");
    registry.register(cache.clone(), ServiceDescriptor::new("cache")).unwrap();
    assert!(consumer.injected("cache").is_none(), "bound but not yet active");

    let found = registry.find("cache").unwrap();
    let injected = consumer.injected("cache").unwrap();
    assert!(injected.same_instance(&found));
    assert_eq!(consumer.activations(), 1);
    assert_eq!(consumer.changes(), vec![("cache".to_string(), true)]);
}

#[test]
fn test_required_provider_registered_later() {
    let registry = manual_registry();
    registry
        .register(plain(), ServiceDescriptor::new("api").requires("db"))
        .unwrap();
    assert!(matches!(
        registry.find("api"),
        Err(RegistryError::MissingRequiredDependency { .. })
    ));

    registry.register(plain(), ServiceDescriptor::new("db")).unwrap();
    assert!(registry.find("api").is_ok());
    assert_eq!(
        registry.state_of(&ServiceIdentity::local("db")),
        Some(LifecycleState::Activated)
    );
}

#[test]
fn test_pending_auto_activation_retried() {
    let registry = Registry::new();
    let api = Recorder::new("api");
    registry
        .register(api.clone(), ServiceDescriptor::new("api").requires("db").auto_activate(true))
        .unwrap();
    assert_eq!(api.activations(), 0);

    registry.register(plain(), ServiceDescriptor::new("db")).unwrap();
    assert_eq!(api.activations(), 1);
}

#[test]
fn test_pending_chain_activates_when_root_arrives() {
    let registry = Registry::new();
    let web = Recorder::new("web");
    let api = Recorder::new("api");
    registry
        .register(web.clone(), ServiceDescriptor::new("web").requires("api").auto_activate(true))
        .unwrap();
    registry
        .register(api.clone(), ServiceDescriptor::new("api").requires("db").auto_activate(true))
        .unwrap();
    assert_eq!(web.activations(), 0);

    registry.register(plain(), ServiceDescriptor::new("db")).unwrap();
    assert_eq!(api.activations(), 1);
    assert_eq!(web.activations(), 1);
    assert!(web.injected("api").is_some());
}

#[test]
fn test_ambiguous_lookup() {
    let registry = manual_registry();
    registry.register(plain(), ServiceDescriptor::new("db")).unwrap();
    registry.register(plain(), ServiceDescriptor::new("db")).unwrap();

    match registry.find("db") {
        Err(RegistryError::AmbiguousLookup { candidates, .. }) => assert_eq!(candidates.len(), 2),
        other => panic!("expected ambiguity, got {:?}", other.map(|_| ())),
    }
    assert_eq!(registry.find_all("db").unwrap().len(), 2);
}

#[test]
fn test_ambiguous_single_dependency() {
    let registry = manual_registry();
    registry.register(plain(), ServiceDescriptor::new("sink")).unwrap();
    registry
        .register_with_origin(plain(), ServiceDescriptor::new("sink"), "remote")
        .unwrap();
    registry
        .register(plain(), ServiceDescriptor::new("app").requires("sink"))
        .unwrap();
    registry
        .register(
            plain(),
            ServiceDescriptor::new("fanout")
                .depends_on(Dependency::required(ServiceIdentity::any("sink")).multiple()),
        )
        .unwrap();

    assert!(matches!(
        registry.find("app"),
        Err(RegistryError::AmbiguousLookup { .. })
    ));
    assert!(registry.find("fanout").is_ok());
    assert!(registry.find_in("sink", "remote").is_ok());
}

#[test]
fn test_optional_single_dependency_is_still_ambiguous() {
    let registry = manual_registry();
    registry.register(plain(), ServiceDescriptor::new("sink")).unwrap();
    registry
        .register_with_origin(plain(), ServiceDescriptor::new("sink"), "remote")
        .unwrap();
    let app = Recorder::new("app");
    registry
        .register(app.clone(), ServiceDescriptor::new("app").wants("sink"))
        .unwrap();

    assert!(matches!(
        registry.find("app"),
        Err(RegistryError::AmbiguousLookup { candidates, .. }) if candidates.len() == 2
    ));
    assert_eq!(app.activations(), 0);

    // Dropping one candidate resolves the ambiguity
    registry.remove("sink", "remote").unwrap();
    assert!(registry.find("app").is_ok());
    assert!(app.injected("sink").is_some());
}

#[test]
fn test_failed_phase_keeps_progress() {
    let registry = manual_registry();
    let service = Recorder::new("flaky");
    service.set_failing(true);
    registry.register(service.clone(), ServiceDescriptor::new("flaky")).unwrap();

    let err = registry.find("flaky").err().unwrap();
    assert!(matches!(err, RegistryError::ActivationFailed { .. }));
    assert!(err.to_string().contains("flaky refused to start"));
    assert_eq!(
        registry.state_of(&ServiceIdentity::local("flaky")),
        Some(LifecycleState::Satisfied)
    );

    service.set_failing(false);
    assert!(registry.find("flaky").is_ok());
    assert_eq!(service.activations(), 1);
}

#[test]
fn test_satisfy_hook_vetoes_and_resumes() {
    let registry = manual_registry();
    let ready = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let gate = ready.clone();
    registry.register_satisfy_hook(Arc::new(FnSatisfyHook::new(
        "warmup",
        move |holder: &ServiceHolder| {
            !holder.has_tag("slow") || gate.load(std::sync::atomic::Ordering::SeqCst)
        },
    )));
    registry
        .register(plain(), ServiceDescriptor::new("index").tag("slow"))
        .unwrap();

    match registry.find("index") {
        Err(RegistryError::UnsatisfiedService { hook, .. }) => assert_eq!(hook, "warmup"),
        other => panic!("expected veto, got {:?}", other.map(|_| ())),
    }
    assert_eq!(
        registry.state_of(&ServiceIdentity::local("index")),
        Some(LifecycleState::Injected)
    );

    ready.store(true, std::sync::atomic::Ordering::SeqCst);
    assert!(registry.find("index").is_ok());
}

#[test]
fn test_failed_optional_provider_is_skipped() {
    init_tracing();
    let registry = manual_registry();
    let broken = Recorder::new("metrics");
    broken.set_failing(true);
    let app = Recorder::new("app");
    registry.register(broken.clone(), ServiceDescriptor::new("metrics")).unwrap();
    registry
        .register(app.clone(), ServiceDescriptor::new("app").wants("metrics"))
        .unwrap();

    assert!(registry.find("app").is_ok());
    assert!(app.injected("metrics").is_none());

    broken.set_failing(false);
    registry.find("metrics").unwrap();
    assert!(app.injected("metrics").is_some());
}

#[test]
fn test_group_operations_order_dependents_first() {
    let events = journal();
    let registry = manual_registry();
    registry
        .register(
            Recorder::with_journal("db", &events),
            ServiceDescriptor::new("db").tag("backend"),
        )
        .unwrap();
    registry
        .register(
            Recorder::with_journal("repo", &events),
            ServiceDescriptor::new("repo").requires("db").tag("backend"),
        )
        .unwrap();
    registry
        .register(
            Recorder::with_journal("api", &events),
            ServiceDescriptor::new("api").requires("repo").tag("backend"),
        )
        .unwrap();
    registry
        .register(Recorder::with_journal("ui", &events), ServiceDescriptor::new("ui"))
        .unwrap();

    assert_eq!(registry.activate_by_tag("backend").unwrap(), 3);
    assert_eq!(
        *events.lock(),
        vec!["activate db", "activate repo", "activate api"]
    );
    assert_eq!(
        registry.state_of(&ServiceIdentity::local("ui")),
        Some(LifecycleState::Unresolved)
    );

    events.lock().clear();
    assert_eq!(registry.deactivate_by_tag("backend").unwrap(), 3);
    assert_eq!(
        *events.lock(),
        vec!["deactivate api", "deactivate repo", "deactivate db"]
    );
    assert_eq!(registry.len(), 4, "deactivation keeps services registered");
    assert_eq!(registry.deactivate_by_tag("backend").unwrap(), 0);
}

#[test]
fn test_deactivate_by_ids() {
    let registry = manual_registry();
    let first = Recorder::new("first");
    let second = Recorder::new("second");
    registry.register(first.clone(), ServiceDescriptor::new("first")).unwrap();
    registry.register(second.clone(), ServiceDescriptor::new("second")).unwrap();
    registry.find("first").unwrap();

    assert_eq!(registry.deactivate_by_ids(["first", "second"]).unwrap(), 2);
    assert_eq!(first.deactivations(), 1);
    assert_eq!(second.deactivations(), 0, "never activated, no callback");
    assert_eq!(
        registry.state_of(&ServiceIdentity::local("second")),
        Some(LifecycleState::Deactivated)
    );
}

#[test]
fn test_removal_unbinds_and_notifies() {
    let registry = manual_registry();
    let store = Recorder::new("store");
    let app = Recorder::new("app");
    registry.register(store.clone(), ServiceDescriptor::new("store")).unwrap();
    registry
        .register(app.clone(), ServiceDescriptor::new("app").wants("store"))
        .unwrap();
    registry.find("app").unwrap();
    let holder = registry.holders("store")[0].clone();

    assert_eq!(registry.remove("store", Origin::Local).unwrap(), 1);
    assert_eq!(holder.state(), LifecycleState::Destroyed);
    assert_eq!(store.deactivations(), 1);
    assert!(registry.edges().is_empty());
    assert_eq!(app.changes(), vec![("store".to_string(), false)]);
    assert!(matches!(
        registry.find("store"),
        Err(RegistryError::ServiceNotFound { .. })
    ));
    assert!(matches!(
        registry.remove("store", Origin::Local),
        Err(RegistryError::ServiceNotFound { .. })
    ));
}

#[test]
fn test_typed_lookup_and_type_filter() {
    let registry = manual_registry();
    registry
        .register(Recorder::new("kv"), ServiceDescriptor::new("kv").provides("KvStore"))
        .unwrap();
    registry
        .register(
            plain(),
            ServiceDescriptor::new("reader")
                .depends_on(Dependency::required(ServiceIdentity::any("kv")).with_type("KvStore")),
        )
        .unwrap();
    registry
        .register(
            plain(),
            ServiceDescriptor::new("writer")
                .depends_on(Dependency::optional(ServiceIdentity::any("kv")).with_type("BlobStore")),
        )
        .unwrap();

    assert!(registry.find_as::<Recorder>("kv").is_ok());
    assert!(matches!(
        registry.find_as::<common::Plain>("kv"),
        Err(RegistryError::TypeMismatch { .. })
    ));
    assert_eq!(
        registry.edges(),
        vec![(ServiceIdentity::local("reader"), ServiceIdentity::local("kv"))]
    );

    let kv = TypeTag::new("KvStore");
    assert!(registry
        .find_with(&ServiceIdentity::any("kv"), Some(&kv))
        .is_ok());
    assert!(matches!(
        registry.find_with(&ServiceIdentity::any("kv"), Some(&TypeTag::new("Queue"))),
        Err(RegistryError::ServiceNotFound { .. })
    ));
}

#[test]
fn test_aliases_are_assignable() {
    let registry = manual_registry();
    let backend = Recorder::new("backend");
    let frontend = Recorder::new("frontend");
    registry
        .register(backend.clone(), ServiceDescriptor::new("postgres").alias("database"))
        .unwrap();
    registry
        .register(frontend.clone(), ServiceDescriptor::new("frontend").requires("database"))
        .unwrap();

    registry.find("frontend").unwrap();
    let injected = frontend.injected("postgres").unwrap();
    assert!(injected.same_instance(&registry.find("database").unwrap()));
}

struct Connection {
    consumer: ServiceIdentity,
}

impl Service for Connection {}

struct Pool;

impl Service for Pool {
    fn as_factory(&self) -> Option<&dyn ServiceFactory> {
        Some(self)
    }
}

impl ServiceFactory for Pool {
    fn create_for(&self, consumer: &ServiceIdentity) -> RegistryResult<ServiceRef> {
        Ok(Arc::new(Connection {
            consumer: consumer.clone(),
        }))
    }
}

#[test]
fn test_factory_creates_value_per_consumer() {
    let registry = manual_registry();
    let one = Recorder::new("one");
    let two = Recorder::new("two");
    registry.register(Arc::new(Pool), ServiceDescriptor::new("pool")).unwrap();
    registry
        .register(one.clone(), ServiceDescriptor::new("one").requires("pool"))
        .unwrap();
    registry
        .register(two.clone(), ServiceDescriptor::new("two").requires("pool"))
        .unwrap();

    registry.find("one").unwrap();
    registry.find("two").unwrap();

    let first = one.injected("pool").unwrap().downcast_service::<Connection>().unwrap();
    let second = two.injected("pool").unwrap().downcast_service::<Connection>().unwrap();
    assert_eq!(first.consumer, ServiceIdentity::local("one"));
    assert_eq!(second.consumer, ServiceIdentity::local("two"));
}

#[test]
fn test_invalid_registrations() {
    let registry = manual_registry();
    assert!(matches!(
        registry.register_with_origin(plain(), ServiceDescriptor::new("x"), Origin::Any),
        Err(RegistryError::InvalidOrigin { .. })
    ));
    assert!(matches!(
        registry.register(plain(), ServiceDescriptor::default()),
        Err(RegistryError::InvalidDescriptor(_))
    ));
    assert!(registry.is_empty());
}
