//! Crate-level helpers, end-to-end and BDD tests.

use std::any::Any;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use mockall::mock;

use crate::capability::{
    CapabilityRegistry, Extension, ExtensionPoint, InMemoryCapabilityRegistry,
};
use crate::container::{InMemoryContainer, LifecycleState, ModuleContainer};
use crate::descriptor::ModuleDescriptor;
use crate::entry::EntryObject;
use crate::error::ContainerError;
use crate::factory::{EntryType, EntryTypeRegistry};
use crate::handle::ModuleHandle;
use crate::manifest::{ModuleManifest, RequiredModule};
use crate::module_set::ModuleSet;


mock! {
    pub(crate) Container {}

    impl ModuleContainer for Container {
        fn module_ids(&self) -> Vec<String>;
        fn manifest(&self, module_id: &str) -> Option<ModuleManifest>;
        fn state(&self, module_id: &str) -> Option<LifecycleState>;
        fn start(&self, module_id: &str) -> Result<(), ContainerError>;
        fn classpath_headers(&self, module_id: &str) -> Vec<String>;
        fn fragments_of(&self, module_id: &str) -> Vec<String>;
        fn dependency_snapshot(&self, module_id: &str) -> Vec<RequiredModule>;
        fn find_entry(&self, module_id: &str, path: &str) -> Option<String>;
    }
}

mock! {
    pub(crate) Capabilities {}

    impl CapabilityRegistry for Capabilities {
        fn extensions(&self, module_id: &str) -> Vec<Extension>;
        fn extension_points(&self, module_id: &str) -> Vec<ExtensionPoint>;
        fn extension_point(&self, module_id: &str, simple_id: &str) -> Option<ExtensionPoint>;
    }
}

/// Entry object recording the descriptor it was built from.
#[derive(Debug)]
pub(crate) struct RecordingEntry {
    module: String,
    version: String,
}

impl RecordingEntry {
    pub(crate) fn from_descriptor(descriptor: &ModuleDescriptor) -> Self {
        Self {
            module: descriptor.id().to_owned(),
            version: descriptor.version().to_string(),
        }
    }

    pub(crate) fn version(&self) -> &str {
        &self.version
    }
}

impl EntryObject for RecordingEntry {
    fn module_id(&self) -> &str {
        &self.module
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registers `RecordingEntry` under `class` in the module's root library.
pub(crate) fn recording_type(types: &mut EntryTypeRegistry, module_id: &str, class: &str) {
    types
        .register_in_module(
            module_id,
            EntryType::new(class, |descriptor: &ModuleDescriptor| {
                Ok(RecordingEntry::from_descriptor(descriptor))
            }),
        )
        .expect("register recording type");
}

/// Formatted log output captured while an action runs.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Runs `action` with a subscriber writing into this buffer.
    pub(crate) fn during<T>(&self, action: impl FnOnce() -> T) -> T {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, action)
    }

    pub(crate) fn contents(&self) -> String {
        let buffer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Installs a module and returns a descriptor for it.
pub(crate) fn descriptor_in(
    container: &Arc<InMemoryContainer>,
    manifest: ModuleManifest,
    state: LifecycleState,
    types: EntryTypeRegistry,
) -> ModuleDescriptor {
    let id = manifest.id().to_owned();
    container.install(manifest, state).expect("install module");
    let dynamic: Arc<dyn ModuleContainer> = Arc::clone(container) as Arc<dyn ModuleContainer>;
    let handle = ModuleHandle::from_container(&dynamic, &id).expect("module installed");
    ModuleDescriptor::new(
        handle,
        Arc::new(types),
        Arc::new(InMemoryCapabilityRegistry::new()),
    )
}

#[test]
fn end_to_end_module_set_activation() {
    let document = r#"{
        "modules": [
            { "id": "alpha", "version": "2.1.0", "entry_class": "alpha.Activator" },
            { "id": "gamma", "version": "3.0" }
        ]
    }"#;
    let set = ModuleSet::from_json_str(document).expect("valid module set");
    let mut types = EntryTypeRegistry::new();
    recording_type(&mut types, "alpha", "alpha.Activator");
    let runtime = set.into_runtime(types).expect("runtime");

    let alpha = runtime.descriptor("alpha").expect("alpha descriptor");
    let entry = alpha
        .entry_object()
        .expect("alpha activates")
        .ready()
        .expect("entry ready");
    let recorded = entry.downcast_ref::<RecordingEntry>().expect("recording entry");
    assert_eq!(recorded.version(), "2.1.0");
    assert_eq!(
        runtime.container().state("alpha"),
        Some(LifecycleState::Active)
    );

    let gamma = runtime.descriptor("gamma").expect("gamma descriptor");
    assert!(gamma.entry_object().expect("gamma activates").is_ready());
    assert!(Arc::ptr_eq(
        &gamma,
        &runtime.descriptor("gamma").expect("cached descriptor")
    ));
}
