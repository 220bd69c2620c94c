//! Read-only view over a module known to the container.

use std::fmt;
use std::sync::Arc;

use crate::container::{LifecycleState, ModuleContainer};
use crate::error::ContainerError;
use crate::manifest::{ModuleManifest, RequiredModule};
use crate::version::ModuleVersion;

/// A module's metadata paired with the container that manages it.
///
/// The manifest is captured when the handle is created; lifecycle flags,
/// fragments and classpath headers are read from the container on every
/// call so they always reflect its current view.
#[derive(Clone)]
pub struct ModuleHandle {
    manifest: Arc<ModuleManifest>,
    container: Arc<dyn ModuleContainer>,
}

impl ModuleHandle {
    /// Wraps a manifest managed by `container`.
    #[must_use]
    pub fn new(manifest: ModuleManifest, container: Arc<dyn ModuleContainer>) -> Self {
        Self {
            manifest: Arc::new(manifest),
            container,
        }
    }

    /// Looks a module up in the container.
    #[must_use]
    pub fn from_container(container: &Arc<dyn ModuleContainer>, module_id: &str) -> Option<Self> {
        container
            .manifest(module_id)
            .map(|manifest| Self::new(manifest, Arc::clone(container)))
    }

    /// Returns the module identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.manifest.id()
    }

    /// Returns the parsed module version.
    #[must_use]
    pub fn version(&self) -> ModuleVersion {
        self.manifest.version()
    }

    /// Returns the declared entry type, if any.
    #[must_use]
    pub fn entry_class(&self) -> Option<&str> {
        self.manifest.entry_class()
    }

    /// Returns the module's manifest.
    #[must_use]
    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    /// Returns the container managing the module.
    #[must_use]
    pub const fn container(&self) -> &Arc<dyn ModuleContainer> {
        &self.container
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> Option<LifecycleState> {
        self.container.state(self.id())
    }

    /// Returns `true` when the container has resolved the module.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state().is_some_and(LifecycleState::is_resolved)
    }

    /// Returns `true` while the container runs the start sequence.
    #[must_use]
    pub fn is_starting(&self) -> bool {
        self.state() == Some(LifecycleState::Starting)
    }

    /// Returns `true` once the container has started the module.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == Some(LifecycleState::Active)
    }

    /// Asks the container to start the module.
    ///
    /// # Errors
    ///
    /// Propagates the container's [`ContainerError`].
    pub fn start(&self) -> Result<(), ContainerError> {
        self.container.start(self.id())
    }

    /// Returns the raw classpath headers.
    #[must_use]
    pub fn classpath_headers(&self) -> Vec<String> {
        self.container.classpath_headers(self.id())
    }

    /// Returns handles for the fragments attached to this module.
    #[must_use]
    pub fn fragments(&self) -> Vec<Self> {
        self.container
            .fragments_of(self.id())
            .iter()
            .filter_map(|fragment| Self::from_container(&self.container, fragment))
            .collect()
    }

    /// Returns the requirements recorded by dependency resolution.
    #[must_use]
    pub fn requirements(&self) -> Vec<RequiredModule> {
        self.container.dependency_snapshot(self.id())
    }

    /// Returns the location of a file packaged in this module.
    #[must_use]
    pub fn find_entry(&self, path: &str) -> Option<String> {
        self.container.find_entry(self.id(), path)
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}
