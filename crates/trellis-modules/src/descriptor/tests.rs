//! Unit tests for the activation state machine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::capability::InMemoryCapabilityRegistry;
use crate::container::{InMemoryContainer, ModuleContainer};
use crate::error::{BoxError, ClassResolutionError};
use crate::factory::EntryType;
use crate::manifest::{ModuleManifest, RequiredModule};
use crate::tests::{
    CapturedLogs, MockCapabilities, MockContainer, RecordingEntry, descriptor_in, recording_type,
};

#[fixture]
fn container() -> Arc<InMemoryContainer> {
    Arc::new(InMemoryContainer::new())
}

fn alpha() -> ModuleManifest {
    ModuleManifest::new("alpha", "2.1.0").with_entry_class("alpha.Activator")
}

/// Registers an `alpha.Activator` that counts its constructions.
fn counting_types(count: &Arc<AtomicUsize>) -> EntryTypeRegistry {
    let counter = Arc::clone(count);
    let mut types = EntryTypeRegistry::new();
    types
        .register_in_module(
            "alpha",
            EntryType::new("alpha.Activator", move |descriptor: &ModuleDescriptor| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(RecordingEntry::from_descriptor(descriptor))
            }),
        )
        .expect("register counting type");
    types
}

fn ready(descriptor: &ModuleDescriptor) -> Arc<dyn EntryObject> {
    descriptor
        .entry_object()
        .expect("activation succeeds")
        .ready()
        .expect("entry object ready")
}

fn mock_descriptor(container: MockContainer, manifest: ModuleManifest) -> ModuleDescriptor {
    let container: Arc<dyn ModuleContainer> = Arc::new(container);
    ModuleDescriptor::new(
        ModuleHandle::new(manifest, container),
        Arc::new(EntryTypeRegistry::new()),
        Arc::new(InMemoryCapabilityRegistry::new()),
    )
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

#[rstest]
fn repeated_lookups_return_the_same_entry(container: Arc<InMemoryContainer>) {
    let count = Arc::new(AtomicUsize::new(0));
    let descriptor = descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        counting_types(&count),
    );

    let first = ready(&descriptor);
    let second = ready(&descriptor);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(descriptor.is_activated());
    assert!(descriptor.has_activation_started());
    assert_eq!(descriptor.phase(), ActivationPhase::Active);
}

#[rstest]
fn activation_starts_resolved_module_once(container: Arc<InMemoryContainer>) {
    let descriptor = descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        counting_types(&Arc::new(AtomicUsize::new(0))),
    );
    ready(&descriptor);
    ready(&descriptor);
    assert_eq!(container.state("alpha"), Some(LifecycleState::Active));
    assert_eq!(container.start_count("alpha"), 1);
}

#[rstest]
fn concurrent_callers_construct_once(container: Arc<InMemoryContainer>) {
    const CALLERS: usize = 8;
    let count = Arc::new(AtomicUsize::new(0));
    let descriptor = Arc::new(descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        counting_types(&count),
    ));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let descriptor = Arc::clone(&descriptor);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                descriptor.entry_object().expect("no caller fails")
            })
        })
        .collect();
    let lookups: Vec<EntryLookup> = handles
        .into_iter()
        .map(|handle| handle.join().expect("caller thread"))
        .collect();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    let entries: Vec<_> = lookups.into_iter().filter_map(EntryLookup::ready).collect();
    assert!(!entries.is_empty(), "at least the activating caller gets the entry");
    let settled = ready(&descriptor);
    assert!(entries.iter().all(|entry| Arc::ptr_eq(entry, &settled)));
}

#[rstest]
fn failure_disables_module_permanently(container: Arc<InMemoryContainer>) {
    let descriptor = descriptor_in(
        &container,
        ModuleManifest::new("beta", "1.0.0").with_entry_class("beta.Missing"),
        LifecycleState::Resolved,
        EntryTypeRegistry::new(),
    );

    let first = descriptor.entry_object().expect_err("missing type");
    assert!(matches!(
        first.resolution_failure(),
        Some(ClassResolutionError::NotFound { .. })
    ));
    assert!(descriptor.is_permanently_disabled());
    assert!(!descriptor.is_activated());
    assert!(!descriptor.has_activation_started());

    let second = descriptor.entry_object().expect_err("still disabled");
    assert!(matches!(
        second,
        ActivationError::PermanentlyDisabled { ref module } if module == "beta"
    ));
}

#[rstest]
fn failed_constructor_is_not_rerun(container: Arc<InMemoryContainer>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let mut types = EntryTypeRegistry::new();
    types
        .register_in_module(
            "alpha",
            EntryType::new(
                "alpha.Activator",
                move |_: &ModuleDescriptor| -> Result<RecordingEntry, BoxError> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("no database".into())
                },
            ),
        )
        .expect("register failing type");
    let descriptor = descriptor_in(&container, alpha(), LifecycleState::Resolved, types);

    assert!(descriptor.entry_object().is_err());
    assert!(descriptor.entry_object().is_err());
    descriptor.deactivate();
    assert!(descriptor.entry_object().is_err());
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(descriptor.is_permanently_disabled());
}

#[rstest]
fn panicking_constructor_disables_module(container: Arc<InMemoryContainer>) {
    let mut types = EntryTypeRegistry::new();
    types
        .register_in_module(
            "alpha",
            EntryType::from_raw_constructor("alpha.Activator", |_| panic!("boom")),
        )
        .expect("register panicking type");
    let descriptor = descriptor_in(&container, alpha(), LifecycleState::Resolved, types);

    let err = descriptor.entry_object().expect_err("constructor panics");
    assert!(matches!(
        err.resolution_failure(),
        Some(ClassResolutionError::ConstructionFailed { .. })
    ));
    assert_eq!(descriptor.phase(), ActivationPhase::Deactivated);
}

#[rstest]
fn start_failure_disables_module(container: Arc<InMemoryContainer>) {
    let descriptor = descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        counting_types(&Arc::new(AtomicUsize::new(0))),
    );
    container
        .fail_start_with("alpha", "activator thread died")
        .expect("configure failure");

    let err = descriptor.entry_object().expect_err("start fails");
    assert!(matches!(err, ActivationError::ContainerStart { .. }));
    assert!(descriptor.is_permanently_disabled());
}

#[rstest]
#[case::installed(Some(LifecycleState::Installed))]
#[case::unknown(None)]
fn unresolved_module_is_rejected_without_disabling(#[case] state: Option<LifecycleState>) {
    let mut container = MockContainer::new();
    container.expect_state().returning(move |_| state);
    container.expect_start().never();
    let descriptor = mock_descriptor(container, alpha());

    let err = descriptor.entry_object().expect_err("not resolved");
    assert!(matches!(
        err,
        ActivationError::IllegalModuleState { state: reported, .. } if reported == state
    ));
    assert!(!descriptor.is_permanently_disabled());
    assert_eq!(descriptor.phase(), ActivationPhase::Inactive);
}

#[test]
fn unresolved_module_rejection_is_logged() {
    let mut container = MockContainer::new();
    container
        .expect_state()
        .returning(|_| Some(LifecycleState::Installed));
    container.expect_start().never();
    let descriptor = mock_descriptor(container, alpha());
    let logs = CapturedLogs::default();

    let outcome = logs.during(|| descriptor.entry_object());

    assert!(matches!(
        outcome,
        Err(ActivationError::IllegalModuleState { .. })
    ));
    let output = logs.contents();
    assert!(output.contains("module is not resolved"), "logs: {output}");
    assert!(output.contains("ERROR"), "logs: {output}");
    assert!(output.contains("alpha.Activator"), "logs: {output}");
    assert!(output.contains("installed"), "logs: {output}");
}

#[rstest]
fn disabled_module_refusal_names_entry_class(container: Arc<InMemoryContainer>) {
    let descriptor = descriptor_in(
        &container,
        ModuleManifest::new("beta", "1.0.0").with_entry_class("beta.Missing"),
        LifecycleState::Resolved,
        EntryTypeRegistry::new(),
    );
    assert!(descriptor.entry_object().is_err());
    let logs = CapturedLogs::default();

    let outcome = logs.during(|| descriptor.entry_object());

    assert!(matches!(
        outcome,
        Err(ActivationError::PermanentlyDisabled { .. })
    ));
    let output = logs.contents();
    assert!(
        output.contains("refusing to activate disabled module"),
        "logs: {output}"
    );
    assert!(output.contains("beta.Missing"), "logs: {output}");
}

#[test]
fn starting_module_is_not_started_again() {
    let mut container = MockContainer::new();
    container
        .expect_state()
        .returning(|_| Some(LifecycleState::Starting));
    container.expect_start().never();
    let descriptor = mock_descriptor(container, ModuleManifest::new("gamma", "3.0"));

    let entry = ready(&descriptor);
    assert!(entry.is::<DefaultEntry>());
}

#[test]
fn active_module_starts_in_active_phase_with_default_entry() {
    let mut container = MockContainer::new();
    container
        .expect_state()
        .returning(|_| Some(LifecycleState::Active));
    container.expect_start().never();
    container.expect_classpath_headers().never();
    let descriptor = mock_descriptor(container, alpha());

    assert_eq!(descriptor.phase(), ActivationPhase::Active);
    assert!(descriptor.is_activated());
    let entry = ready(&descriptor);
    let default = entry.downcast_ref::<DefaultEntry>().expect("default entry");
    assert_eq!(default.version().to_string(), "2.1.0");
}

// ---------------------------------------------------------------------------
// Reentrancy and blocking
// ---------------------------------------------------------------------------

#[rstest]
fn constructor_reentry_reports_in_progress(container: Arc<InMemoryContainer>) {
    let observed = Arc::new(std::sync::Mutex::new(None));
    let sink = Arc::clone(&observed);
    let mut types = EntryTypeRegistry::new();
    types
        .register_in_module(
            "alpha",
            EntryType::new("alpha.Activator", move |descriptor: &ModuleDescriptor| {
                let lookup = descriptor.entry_object().map(|lookup| lookup.is_ready());
                let activated = descriptor.is_activated();
                descriptor.deactivate();
                *sink.lock().expect("observation lock") = Some((lookup.ok(), activated));
                Ok(RecordingEntry::from_descriptor(descriptor))
            }),
        )
        .expect("register reentrant type");
    let descriptor = descriptor_in(&container, alpha(), LifecycleState::Resolved, types);

    let entry = ready(&descriptor);
    assert!(entry.is::<RecordingEntry>());
    let recorded = observed.lock().expect("observation lock").take();
    assert_eq!(recorded, Some((Some(false), false)));
    assert!(descriptor.is_activated());
}

#[rstest]
fn waiters_block_until_activation_settles(container: Arc<InMemoryContainer>) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(release_rx);
    let mut types = EntryTypeRegistry::new();
    types
        .register_in_module(
            "alpha",
            EntryType::new("alpha.Activator", move |descriptor: &ModuleDescriptor| {
                entered_tx.send(()).expect("signal entry");
                release_rx
                    .lock()
                    .expect("release lock")
                    .recv()
                    .expect("release signal");
                Ok(RecordingEntry::from_descriptor(descriptor))
            }),
        )
        .expect("register blocking type");
    let descriptor = Arc::new(descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        types,
    ));

    let activator = {
        let descriptor = Arc::clone(&descriptor);
        std::thread::spawn(move || descriptor.entry_object().expect("activation succeeds"))
    };
    entered_rx.recv().expect("constructor entered");

    assert!(matches!(
        descriptor.entry_object().expect("concurrent lookup"),
        EntryLookup::InProgress
    ));
    assert!(descriptor.has_activation_started());
    assert!(!descriptor.is_permanently_disabled());

    let (done_tx, done_rx) = mpsc::channel();
    let waiter = {
        let descriptor = Arc::clone(&descriptor);
        std::thread::spawn(move || done_tx.send(descriptor.is_activated()).expect("report"))
    };
    assert!(
        done_rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "is_activated must wait for the pending activation"
    );

    release_tx.send(()).expect("release constructor");
    assert!(activator.join().expect("activator thread").is_ready());
    assert!(done_rx.recv().expect("waiter result"));
    waiter.join().expect("waiter thread");
}

#[rstest]
fn constructor_waiting_on_helper_thread_never_completes(container: Arc<InMemoryContainer>) {
    let mut types = EntryTypeRegistry::new();
    types
        .register_in_module(
            "alpha",
            EntryType::new("alpha.Activator", |descriptor: &ModuleDescriptor| {
                // The helper waits for the activation its own caller is running.
                std::thread::scope(|scope| {
                    scope.spawn(|| descriptor.is_activated()).join().is_ok()
                });
                Ok(RecordingEntry::from_descriptor(descriptor))
            }),
        )
        .expect("register hanging type");
    let descriptor = Arc::new(descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        types,
    ));

    let (done_tx, done_rx) = mpsc::channel();
    let activating = Arc::clone(&descriptor);
    std::thread::spawn(move || {
        let outcome = activating.entry_object().map(|lookup| lookup.is_ready());
        done_tx.send(outcome.is_ok()).expect("report outcome");
    });

    assert!(
        done_rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "activation blocked on its helper thread must not complete"
    );
    assert_eq!(descriptor.phase(), ActivationPhase::Pending);
}

// ---------------------------------------------------------------------------
// Teardown and external activation
// ---------------------------------------------------------------------------

#[rstest]
fn deactivate_allows_fresh_activation(container: Arc<InMemoryContainer>) {
    let count = Arc::new(AtomicUsize::new(0));
    let descriptor = descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        counting_types(&count),
    );
    let first = ready(&descriptor);
    descriptor.deactivate();
    assert_eq!(descriptor.phase(), ActivationPhase::Inactive);
    assert!(!descriptor.is_activated());

    let second = ready(&descriptor);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[rstest]
fn external_activation_synthesises_default_entry(container: Arc<InMemoryContainer>) {
    let count = Arc::new(AtomicUsize::new(0));
    let descriptor = descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        counting_types(&count),
    );
    descriptor.set_active_externally();
    assert!(descriptor.is_activated());

    let entry = ready(&descriptor);
    assert!(entry.is::<DefaultEntry>());
    assert!(Arc::ptr_eq(&entry, &ready(&descriptor)));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[rstest]
fn external_activation_is_ignored_once_disabled(container: Arc<InMemoryContainer>) {
    let descriptor = descriptor_in(
        &container,
        ModuleManifest::new("beta", "1.0.0").with_entry_class("beta.Missing"),
        LifecycleState::Resolved,
        EntryTypeRegistry::new(),
    );
    assert!(descriptor.entry_object().is_err());

    descriptor.set_active_externally();
    descriptor.set_entry_object(Arc::new(DefaultEntry::new(&descriptor)));
    assert!(descriptor.is_permanently_disabled());
    assert!(!descriptor.is_activated());
    assert!(descriptor.entry_object().is_err());
}

#[rstest]
fn explicit_entry_replacement_is_returned(container: Arc<InMemoryContainer>) {
    let mut types = EntryTypeRegistry::new();
    recording_type(&mut types, "alpha", "alpha.Activator");
    let descriptor = descriptor_in(&container, alpha(), LifecycleState::Resolved, types);
    let replacement: Arc<dyn EntryObject> = Arc::new(DefaultEntry::new(&descriptor));

    descriptor.set_entry_object(Arc::clone(&replacement));
    assert!(descriptor.is_activated());
    assert!(Arc::ptr_eq(&ready(&descriptor), &replacement));
}

// ---------------------------------------------------------------------------
// Identity, class context and capabilities
// ---------------------------------------------------------------------------

#[rstest]
fn identity_helpers_render_module_identity(container: Arc<InMemoryContainer>) {
    let descriptor = descriptor_in(
        &container,
        ModuleManifest::new("org.example.alpha", "2.1")
            .with_name("Alpha")
            .with_vendor("Example Corp"),
        LifecycleState::Resolved,
        EntryTypeRegistry::new(),
    );
    assert_eq!(descriptor.unique_identifier(), "org.example.alpha");
    assert_eq!(descriptor.to_string(), "org.example.alpha_2.1.0");
    assert_eq!(
        descriptor.install_url(),
        "platform:/plugin/org.example.alpha_2.1.0/"
    );
    assert_eq!(descriptor.label(), Some("Alpha"));
    assert_eq!(descriptor.provider_name(), Some("Example Corp"));
}

#[rstest]
fn malformed_version_falls_back(container: Arc<InMemoryContainer>) {
    let descriptor = descriptor_in(
        &container,
        ModuleManifest::new("delta", "not-a-version"),
        LifecycleState::Resolved,
        EntryTypeRegistry::new(),
    );
    assert_eq!(descriptor.version().to_string(), "1.0.0");
    assert_eq!(descriptor.to_string(), "delta_1.0.0");
}

#[rstest]
#[case::with_version("a.b_1.2.0", "a.b", "1.2.0")]
#[case::qualified("a.b_1.2.0.v2004", "a.b", "1.2.0.v2004")]
#[case::bare_version("3.1", "3.1", "3.1.0")]
fn parses_id_version_strings(#[case] text: &str, #[case] id: &str, #[case] version: &str) {
    assert_eq!(unique_identifier_from_str(text), id);
    assert_eq!(
        version_from_str(text).expect("valid version").to_string(),
        version
    );
}

#[test]
fn version_from_malformed_string_is_an_error() {
    assert!(version_from_str("a.b_x.y").is_err());
}

#[rstest]
fn class_context_is_created_once(container: Arc<InMemoryContainer>) {
    let descriptor = descriptor_in(
        &container,
        ModuleManifest::new("alpha", "2.1.0").with_classpath("alpha.jar, lib/util.jar"),
        LifecycleState::Resolved,
        EntryTypeRegistry::new(),
    );
    let first = descriptor.class_context();
    let second = descriptor.class_context();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(
        descriptor.runtime_libraries(),
        vec![
            Library::new("alpha", "alpha.jar"),
            Library::new("alpha", "lib/util.jar"),
        ]
    );
}

#[test]
fn capability_queries_use_own_module_id() {
    let mut registry = MockCapabilities::new();
    registry
        .expect_extensions()
        .withf(|module| module == "alpha")
        .returning(|_| {
            vec![
                Extension::new("alpha", "views", "core.views"),
                Extension::new("alpha", "commands", "core.commands"),
            ]
        });
    registry
        .expect_extension_points()
        .withf(|module| module == "alpha")
        .returning(|_| vec![ExtensionPoint::new("alpha", "hooks")]);
    registry
        .expect_extension_point()
        .withf(|module, id| module == "alpha" && id == "hooks")
        .returning(|_, _| Some(ExtensionPoint::new("alpha", "hooks")));

    let container = InMemoryContainer::new();
    container
        .install(
            alpha().with_requires(vec![RequiredModule::new("core").optional()]),
            LifecycleState::Resolved,
        )
        .expect("install alpha");
    let container: Arc<dyn ModuleContainer> = Arc::new(container);
    let handle = ModuleHandle::from_container(&container, "alpha").expect("alpha installed");
    let descriptor = ModuleDescriptor::new(
        handle,
        Arc::new(EntryTypeRegistry::new()),
        Arc::new(registry),
    );

    assert_eq!(descriptor.extensions().len(), 2);
    assert_eq!(
        descriptor
            .extension("commands")
            .map(|extension| extension.point_id().to_owned()),
        Some("core.commands".to_owned())
    );
    assert_eq!(descriptor.extension_points().len(), 1);
    assert!(descriptor.extension_point("hooks").is_some());
    let prerequisites = descriptor.prerequisites();
    assert_eq!(prerequisites.len(), 1);
    assert!(prerequisites.iter().all(Prerequisite::is_optional));
}

// ---------------------------------------------------------------------------
// Resource lookup
// ---------------------------------------------------------------------------

#[fixture]
fn with_fragment(
    container: Arc<InMemoryContainer>,
) -> (Arc<InMemoryContainer>, ModuleDescriptor) {
    let descriptor = descriptor_in(
        &container,
        alpha(),
        LifecycleState::Resolved,
        EntryTypeRegistry::new(),
    );
    container
        .install(
            ModuleManifest::new("alpha.linux", "2.1.0").as_fragment_of("alpha"),
            LifecycleState::Resolved,
        )
        .expect("install fragment");
    (container, descriptor)
}

#[rstest]
fn find_prefers_host_module(with_fragment: (Arc<InMemoryContainer>, ModuleDescriptor)) {
    let (container, descriptor) = with_fragment;
    container
        .add_entry("alpha", "icons/logo.png")
        .expect("host entry");
    container
        .add_entry("alpha.linux", "icons/logo.png")
        .expect("fragment entry");

    assert_eq!(
        descriptor.find("/icons/logo.png").as_deref(),
        Some("module://alpha/icons/logo.png")
    );
}

#[rstest]
fn find_falls_back_to_fragments(with_fragment: (Arc<InMemoryContainer>, ModuleDescriptor)) {
    let (container, descriptor) = with_fragment;
    container
        .add_entry("alpha.linux", "lib/native.so")
        .expect("fragment entry");

    assert_eq!(
        descriptor.find("lib/native.so").as_deref(),
        Some("module://alpha.linux/lib/native.so")
    );
}

#[rstest]
fn find_returns_none_for_missing_resource(
    with_fragment: (Arc<InMemoryContainer>, ModuleDescriptor),
) {
    let (_container, descriptor) = with_fragment;
    assert!(descriptor.find("icons/missing.png").is_none());
    assert!(descriptor.find("").is_none());
}

#[rstest]
fn find_expands_variables_before_plain_path(
    with_fragment: (Arc<InMemoryContainer>, ModuleDescriptor),
) {
    let (container, descriptor) = with_fragment;
    container
        .add_entry("alpha", "lib/native.so")
        .expect("host entry");
    container
        .add_entry("alpha.linux", "os/win32/lib/native.so")
        .expect("fragment entry");
    let variables = PathVariables::new().with_os("win32").with_arch("x86");

    assert_eq!(
        descriptor
            .find_with_variables("$os$/lib/native.so", &variables)
            .as_deref(),
        Some("module://alpha.linux/os/win32/lib/native.so")
    );
    let other_os = PathVariables::new().with_os("macosx");
    assert_eq!(
        descriptor
            .find_with_variables("$os$/lib/native.so", &other_os)
            .as_deref(),
        Some("module://alpha/lib/native.so")
    );
}
