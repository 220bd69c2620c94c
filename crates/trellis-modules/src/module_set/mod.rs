//! Module set documents and the runtime built from them.
//!
//! A module set is a JSON document listing module manifests with their
//! initial lifecycle state, plus the extension points and extensions they
//! declare:
//!
//! ```json
//! {
//!   "modules": [
//!     {
//!       "id": "alpha",
//!       "version": "2.1.0",
//!       "entry_class": "alpha.Activator",
//!       "entries": ["icons/logo.png"]
//!     },
//!     { "id": "core", "version": "1.0", "state": "active" }
//!   ],
//!   "extension_points": [{ "module": "core", "id": "views" }],
//!   "extensions": [{ "module": "alpha", "id": "main", "point": "core.views" }]
//! }
//! ```
//!
//! [`ModuleSet::into_runtime`] installs everything into an
//! [`InMemoryContainer`] and an [`InMemoryCapabilityRegistry`] and returns a
//! [`ModuleRuntime`] that hands out one [`ModuleDescriptor`] per module.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capability::{
    CapabilityRegistry, Extension, ExtensionPoint, InMemoryCapabilityRegistry,
};
use crate::container::{InMemoryContainer, LifecycleState, ModuleContainer};
use crate::descriptor::ModuleDescriptor;
use crate::error::ModuleSetError;
use crate::factory::EntryTypeRegistry;
use crate::handle::ModuleHandle;
use crate::manifest::ModuleManifest;

/// Tracing target for module set loading.
const MODULE_SET_TARGET: &str = "trellis_modules::module_set";

const fn default_state() -> LifecycleState {
    LifecycleState::Resolved
}

/// A module manifest with the lifecycle state it is installed in and the
/// files packaged in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSetEntry {
    #[serde(flatten)]
    manifest: ModuleManifest,
    #[serde(default = "default_state")]
    state: LifecycleState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    entries: Vec<String>,
}

impl ModuleSetEntry {
    /// Pairs a manifest with its initial state.
    #[must_use]
    pub const fn new(manifest: ModuleManifest, state: LifecycleState) -> Self {
        Self {
            manifest,
            state,
            entries: Vec::new(),
        }
    }

    /// Adds a packaged file, relative to the module root.
    #[must_use]
    pub fn with_entry(mut self, path: impl Into<String>) -> Self {
        self.entries.push(path.into());
        self
    }

    /// Returns the manifest.
    #[must_use]
    pub const fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    /// Returns the initial lifecycle state, `resolved` unless declared.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns the packaged files.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// Declarative description of a set of modules and their capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSet {
    #[serde(default)]
    modules: Vec<ModuleSetEntry>,
    #[serde(default)]
    extension_points: Vec<ExtensionPoint>,
    #[serde(default)]
    extensions: Vec<Extension>,
}

impl ModuleSet {
    /// Parses a module set from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleSetError::Parse`] when the text is not a valid module
    /// set.
    pub fn from_json_str(text: &str) -> Result<Self, ModuleSetError> {
        serde_json::from_str(text).map_err(ModuleSetError::Parse)
    }

    /// Reads and parses a module set file.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleSetError::Read`] if the file cannot be read and
    /// [`ModuleSetError::Parse`] if it is not a valid module set.
    pub fn from_path(path: &Path) -> Result<Self, ModuleSetError> {
        let text = fs::read_to_string(path).map_err(|source| ModuleSetError::Read {
            path: path.display().to_string(),
            source: Arc::new(source),
        })?;
        let set = Self::from_json_str(&text)?;
        debug!(
            target: MODULE_SET_TARGET,
            path = %path.display(),
            modules = set.modules.len(),
            "loaded module set"
        );
        Ok(set)
    }

    /// Adds a module.
    #[must_use]
    pub fn with_module(mut self, manifest: ModuleManifest, state: LifecycleState) -> Self {
        self.modules.push(ModuleSetEntry::new(manifest, state));
        self
    }

    /// Adds a prepared module entry.
    #[must_use]
    pub fn with_entry(mut self, entry: ModuleSetEntry) -> Self {
        self.modules.push(entry);
        self
    }

    /// Adds an extension point.
    #[must_use]
    pub fn with_extension_point(mut self, point: ExtensionPoint) -> Self {
        self.extension_points.push(point);
        self
    }

    /// Adds an extension.
    #[must_use]
    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Returns the modules in declaration order.
    #[must_use]
    pub fn modules(&self) -> &[ModuleSetEntry] {
        &self.modules
    }

    /// Installs the set and returns a runtime resolving entry types through
    /// `types`.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleSetError::Container`] when a manifest is invalid or
    /// duplicated and [`ModuleSetError::Registration`] for duplicate
    /// extension points.
    pub fn into_runtime(self, types: EntryTypeRegistry) -> Result<ModuleRuntime, ModuleSetError> {
        let container = InMemoryContainer::new();
        for entry in self.modules {
            let id = entry.manifest.id().to_owned();
            container.install(entry.manifest, entry.state)?;
            for path in &entry.entries {
                container.add_entry(&id, path)?;
            }
        }

        let mut capabilities = InMemoryCapabilityRegistry::new();
        for point in self.extension_points {
            capabilities.add_extension_point(point)?;
        }
        for extension in self.extensions {
            capabilities.add_extension(extension);
        }

        info!(
            target: MODULE_SET_TARGET,
            modules = container.module_ids().len(),
            entry_types = types.len(),
            "module runtime ready"
        );
        Ok(ModuleRuntime {
            container: Arc::new(container),
            capabilities: Arc::new(capabilities),
            types: Arc::new(types),
            descriptors: Mutex::new(HashMap::new()),
        })
    }
}

/// Installed modules together with their descriptors.
///
/// Descriptors are created on first request and cached, so every caller
/// observes the same activation state for a module.
#[derive(Debug)]
pub struct ModuleRuntime {
    container: Arc<InMemoryContainer>,
    capabilities: Arc<InMemoryCapabilityRegistry>,
    types: Arc<EntryTypeRegistry>,
    descriptors: Mutex<HashMap<String, Arc<ModuleDescriptor>>>,
}

impl ModuleRuntime {
    /// Returns the descriptor of an installed module.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleSetError::UnknownModule`] if no module has the given
    /// identifier.
    pub fn descriptor(&self, module_id: &str) -> Result<Arc<ModuleDescriptor>, ModuleSetError> {
        let mut descriptors = self
            .descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(descriptor) = descriptors.get(module_id) {
            return Ok(Arc::clone(descriptor));
        }

        let container: Arc<dyn ModuleContainer> =
            Arc::clone(&self.container) as Arc<dyn ModuleContainer>;
        let handle = ModuleHandle::from_container(&container, module_id).ok_or_else(|| {
            ModuleSetError::UnknownModule {
                module: module_id.to_owned(),
            }
        })?;
        let descriptor = Arc::new(ModuleDescriptor::new(
            handle,
            Arc::clone(&self.types),
            Arc::clone(&self.capabilities) as Arc<dyn CapabilityRegistry>,
        ));
        descriptors.insert(module_id.to_owned(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Returns the identifiers of installed host modules, fragments excluded.
    #[must_use]
    pub fn module_ids(&self) -> Vec<String> {
        self.container
            .module_ids()
            .into_iter()
            .filter(|id| {
                self.container
                    .manifest(id)
                    .is_some_and(|manifest| !manifest.is_fragment())
            })
            .collect()
    }

    /// Returns the container hosting the modules.
    #[must_use]
    pub const fn container(&self) -> &Arc<InMemoryContainer> {
        &self.container
    }

    /// Returns the capability registry.
    #[must_use]
    pub const fn capabilities(&self) -> &Arc<InMemoryCapabilityRegistry> {
        &self.capabilities
    }

    /// Returns the entry type registry.
    #[must_use]
    pub const fn types(&self) -> &Arc<EntryTypeRegistry> {
        &self.types
    }
}
