//! Module container interface and an in-memory implementation.
//!
//! The container installs modules, resolves them, starts them and reports
//! their lifecycle state. The activation core never owns a container; it
//! receives one as an `Arc<dyn ModuleContainer>` and only queries it or asks
//! it to start a module on first use.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ContainerError;
use crate::manifest::{ModuleManifest, RequiredModule};

/// Tracing target for container operations.
const CONTAINER_TARGET: &str = "trellis_modules::container";

/// Scheme of the entry locations reported by [`InMemoryContainer`].
pub const ENTRY_SCHEME: &str = "module";

/// Lifecycle state of a module as reported by the container.
///
/// # Example
///
/// ```
/// use trellis_modules::LifecycleState;
///
/// assert!(LifecycleState::Starting.is_resolved());
/// assert!(!LifecycleState::Installed.is_resolved());
/// assert_eq!(LifecycleState::Active.as_str(), "active");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Installed but its dependencies are not resolved yet.
    Installed,
    /// Dependencies resolved; the module can be started.
    Resolved,
    /// The container is running the module's start sequence.
    Starting,
    /// The module is started.
    Active,
}

impl LifecycleState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Resolved => "resolved",
            Self::Starting => "starting",
            Self::Active => "active",
        }
    }

    /// Returns `true` for states in which the module may be activated.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved | Self::Starting | Self::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface to the container that manages module lifecycles.
///
/// All queries are keyed by module identifier. Implementations must be safe
/// to share between threads because descriptors hold them behind an `Arc`.
pub trait ModuleContainer: Send + Sync {
    /// Returns the identifiers of all installed modules, fragments included.
    fn module_ids(&self) -> Vec<String>;

    /// Returns the manifest of an installed module.
    fn manifest(&self, module_id: &str) -> Option<ModuleManifest>;

    /// Returns the lifecycle state, or `None` for unknown modules.
    fn state(&self, module_id: &str) -> Option<LifecycleState>;

    /// Starts a resolved module.
    ///
    /// # Errors
    ///
    /// Returns a [`ContainerError`] if the module is unknown, is not resolved,
    /// or its start sequence fails.
    fn start(&self, module_id: &str) -> Result<(), ContainerError>;

    /// Returns the raw classpath headers declared by the module.
    fn classpath_headers(&self, module_id: &str) -> Vec<String>;

    /// Returns the identifiers of the fragments attached to a host module.
    fn fragments_of(&self, module_id: &str) -> Vec<String>;

    /// Returns the requirements recorded for the module by dependency
    /// resolution.
    fn dependency_snapshot(&self, module_id: &str) -> Vec<RequiredModule>;

    /// Returns the location of a file packaged in the module itself, not
    /// its fragments. `path` is relative to the module root.
    fn find_entry(&self, module_id: &str, path: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
struct InstalledModule {
    manifest: ModuleManifest,
    state: LifecycleState,
    start_failure: Option<String>,
    start_count: usize,
    entries: BTreeSet<String>,
}

/// Thread-safe container holding manifests and states in memory.
///
/// Used by the CLI to host a module set and by tests as a stand-in for a
/// real container.
///
/// # Example
///
/// ```
/// use trellis_modules::{InMemoryContainer, LifecycleState, ModuleContainer, ModuleManifest};
///
/// let container = InMemoryContainer::new();
/// container
///     .install(ModuleManifest::new("alpha", "2.1.0"), LifecycleState::Resolved)
///     .expect("install alpha");
/// container.start("alpha").expect("start alpha");
/// assert_eq!(container.state("alpha"), Some(LifecycleState::Active));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryContainer {
    modules: RwLock<HashMap<String, InstalledModule>>,
}

impl InMemoryContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a module in the given state after validating its manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::InvalidManifest`] if validation fails or
    /// [`ContainerError::AlreadyInstalled`] for duplicate identifiers.
    pub fn install(
        &self,
        manifest: ModuleManifest,
        state: LifecycleState,
    ) -> Result<(), ContainerError> {
        manifest.validate()?;
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        let id = manifest.id().to_owned();
        if modules.contains_key(&id) {
            return Err(ContainerError::AlreadyInstalled { module: id });
        }
        debug!(target: CONTAINER_TARGET, module = %id, %state, "installed module");
        modules.insert(
            id,
            InstalledModule {
                manifest,
                state,
                start_failure: None,
                start_count: 0,
                entries: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Overrides the lifecycle state of an installed module.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::UnknownModule`] if the module is not
    /// installed.
    pub fn set_state(&self, module_id: &str, state: LifecycleState) -> Result<(), ContainerError> {
        self.with_module(module_id, |module| module.state = state)
    }

    /// Makes every later start of the module fail with `message`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::UnknownModule`] if the module is not
    /// installed.
    pub fn fail_start_with(
        &self,
        module_id: &str,
        message: impl Into<String>,
    ) -> Result<(), ContainerError> {
        let message = message.into();
        self.with_module(module_id, |module| module.start_failure = Some(message))
    }

    /// Records a file packaged in the module. Leading slashes are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::UnknownModule`] if the module is not
    /// installed.
    pub fn add_entry(&self, module_id: &str, path: &str) -> Result<(), ContainerError> {
        let entry = path.trim_start_matches('/').to_owned();
        self.with_module(module_id, |module| {
            module.entries.insert(entry);
        })
    }

    /// Returns how many times the module's start sequence ran.
    #[must_use]
    pub fn start_count(&self, module_id: &str) -> usize {
        self.read_module(module_id, |module| module.start_count)
            .unwrap_or(0)
    }

    fn with_module(
        &self,
        module_id: &str,
        update: impl FnOnce(&mut InstalledModule),
    ) -> Result<(), ContainerError> {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        let module = modules
            .get_mut(module_id)
            .ok_or_else(|| ContainerError::UnknownModule {
                module: module_id.to_owned(),
            })?;
        update(module);
        Ok(())
    }

    fn read_module<T>(
        &self,
        module_id: &str,
        read: impl FnOnce(&InstalledModule) -> T,
    ) -> Option<T> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        modules.get(module_id).map(read)
    }
}

impl ModuleContainer for InMemoryContainer {
    fn module_ids(&self) -> Vec<String> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = modules.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn manifest(&self, module_id: &str) -> Option<ModuleManifest> {
        self.read_module(module_id, |module| module.manifest.clone())
    }

    fn state(&self, module_id: &str) -> Option<LifecycleState> {
        self.read_module(module_id, |module| module.state)
    }

    fn start(&self, module_id: &str) -> Result<(), ContainerError> {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        let module = modules
            .get_mut(module_id)
            .ok_or_else(|| ContainerError::UnknownModule {
                module: module_id.to_owned(),
            })?;

        match module.state {
            LifecycleState::Installed => Err(ContainerError::InvalidTransition {
                module: module_id.to_owned(),
                state: module.state,
            }),
            LifecycleState::Starting | LifecycleState::Active => Ok(()),
            LifecycleState::Resolved => {
                module.start_count += 1;
                if let Some(message) = &module.start_failure {
                    return Err(ContainerError::StartFailed {
                        module: module_id.to_owned(),
                        message: message.clone(),
                    });
                }
                module.state = LifecycleState::Active;
                debug!(target: CONTAINER_TARGET, module = module_id, "started module");
                Ok(())
            }
        }
    }

    fn classpath_headers(&self, module_id: &str) -> Vec<String> {
        self.read_module(module_id, |module| {
            module
                .manifest
                .classpath()
                .map(str::to_owned)
                .into_iter()
                .collect()
        })
        .unwrap_or_default()
    }

    fn fragments_of(&self, module_id: &str) -> Vec<String> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        let mut fragments: Vec<String> = modules
            .values()
            .filter(|module| module.manifest.fragment_host() == Some(module_id))
            .map(|module| module.manifest.id().to_owned())
            .collect();
        fragments.sort();
        fragments
    }

    fn dependency_snapshot(&self, module_id: &str) -> Vec<RequiredModule> {
        self.read_module(module_id, |module| module.manifest.requires().to_vec())
            .unwrap_or_default()
    }

    fn find_entry(&self, module_id: &str, path: &str) -> Option<String> {
        let entry = path.trim_start_matches('/');
        self.read_module(module_id, |module| module.entries.contains(entry))
            .unwrap_or(false)
            .then(|| format!("{ENTRY_SCHEME}://{module_id}/{entry}"))
    }
}
