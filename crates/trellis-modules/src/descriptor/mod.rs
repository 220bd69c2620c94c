//! Module descriptors and the activation state machine.
//!
//! A [`ModuleDescriptor`] is created once per resolved module. It creates the
//! module's entry object on first use, coordinates concurrent callers so the
//! entry type is constructed at most once, and disables the module for good
//! when activation fails.
//!
//! Activation moves through the phases in [`ActivationPhase`]:
//!
//! ```text
//! Inactive -> Pending -> Active
//!                     \-> Deactivated (terminal)
//! ```
//!
//! The descriptor lock is never held while the entry type is constructed.
//! A constructor that calls back into its own descriptor observes the
//! `Pending` phase and receives [`EntryLookup::InProgress`].

use std::fmt;
use std::iter;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, error, warn};

use crate::capability::{
    CapabilityBridge, CapabilityRegistry, Extension, ExtensionPoint, Prerequisite,
};
use crate::classpath::{ClassContext, Library};
use crate::container::LifecycleState;
use crate::entry::{DefaultEntry, EntryObject};
use crate::error::ActivationError;
use crate::factory::{EntryTypeRegistry, resolve_entry};
use crate::handle::ModuleHandle;
use crate::resource::{PathVariables, candidate_paths};
use crate::version::{ModuleVersion, VersionError};

/// Tracing target for activation.
const ACTIVATION_TARGET: &str = "trellis_modules::activation";

/// Tracing target for resource lookups.
const RESOURCE_TARGET: &str = "trellis_modules::resource";

/// Separator between identifier and version in `id_version` strings.
pub const VERSION_SEPARATOR: char = '_';

/// Prefix of module install locations.
pub const INSTALL_URL_PREFIX: &str = "platform:/plugin/";

/// Activation phase of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationPhase {
    /// Not activated yet, or deactivated by explicit teardown.
    Inactive,
    /// One thread is creating the entry object.
    Pending,
    /// The module is active.
    Active,
    /// Activation failed; the module is never activated again.
    Deactivated,
}

impl ActivationPhase {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for ActivationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`ModuleDescriptor::entry_object`].
#[derive(Debug, Clone)]
pub enum EntryLookup {
    /// The module's entry object.
    Ready(Arc<dyn EntryObject>),
    /// Another call, possibly further up the current thread's stack, is
    /// activating the module.
    InProgress,
}

impl EntryLookup {
    /// Returns the entry object when it is ready.
    #[must_use]
    pub fn ready(self) -> Option<Arc<dyn EntryObject>> {
        match self {
            Self::Ready(entry) => Some(entry),
            Self::InProgress => None,
        }
    }

    /// Returns `true` when the entry object is ready.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

#[derive(Debug)]
struct ActivationState {
    phase: ActivationPhase,
    activator: Option<ThreadId>,
    entry: Option<Arc<dyn EntryObject>>,
}

impl ActivationState {
    fn blocks(&self, caller: ThreadId) -> bool {
        self.phase == ActivationPhase::Pending && self.activator != Some(caller)
    }
}

enum Admission<'a> {
    Ready(Arc<dyn EntryObject>),
    InProgress,
    Activate(PendingActivation<'a>),
}

/// Descriptor of one module: identity, metadata, class context and
/// activation state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trellis_modules::{
///     DefaultEntry, EntryTypeRegistry, InMemoryCapabilityRegistry, InMemoryContainer,
///     LifecycleState, ModuleContainer, ModuleDescriptor, ModuleHandle, ModuleManifest,
/// };
///
/// let container = InMemoryContainer::new();
/// container
///     .install(ModuleManifest::new("gamma", "3.0"), LifecycleState::Resolved)
///     .expect("install gamma");
/// let container: Arc<dyn ModuleContainer> = Arc::new(container);
/// let handle = ModuleHandle::from_container(&container, "gamma").expect("gamma installed");
///
/// let descriptor = ModuleDescriptor::new(
///     handle,
///     Arc::new(EntryTypeRegistry::new()),
///     Arc::new(InMemoryCapabilityRegistry::new()),
/// );
/// let entry = descriptor
///     .entry_object()
///     .expect("activation succeeds")
///     .ready()
///     .expect("entry object ready");
/// assert!(entry.is::<DefaultEntry>());
/// assert!(descriptor.is_activated());
/// assert_eq!(descriptor.to_string(), "gamma_3.0.0");
/// ```
pub struct ModuleDescriptor {
    handle: ModuleHandle,
    version: ModuleVersion,
    types: Arc<EntryTypeRegistry>,
    capabilities: CapabilityBridge,
    class_context: OnceLock<Arc<ClassContext>>,
    state: Mutex<ActivationState>,
    settled: Condvar,
}

impl ModuleDescriptor {
    /// Creates the descriptor of a resolved module.
    ///
    /// The descriptor starts [`ActivationPhase::Active`] when the container
    /// already reports the module active.
    #[must_use]
    pub fn new(
        handle: ModuleHandle,
        types: Arc<EntryTypeRegistry>,
        capabilities: Arc<dyn CapabilityRegistry>,
    ) -> Self {
        let phase = if handle.is_active() {
            ActivationPhase::Active
        } else {
            ActivationPhase::Inactive
        };
        let version = handle.version();
        let bridge = CapabilityBridge::new(capabilities, Arc::clone(handle.container()));
        Self {
            handle,
            version,
            types,
            capabilities: bridge,
            class_context: OnceLock::new(),
            state: Mutex::new(ActivationState {
                phase,
                activator: None,
                entry: None,
            }),
            settled: Condvar::new(),
        }
    }

    /// Returns the module identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.handle.id()
    }

    /// Returns the module identifier.
    #[must_use]
    pub fn unique_identifier(&self) -> &str {
        self.handle.id()
    }

    /// Returns the module version, `1.0.0` when the declared one is unusable.
    #[must_use]
    pub const fn version(&self) -> &ModuleVersion {
        &self.version
    }

    /// Returns the declared entry type.
    #[must_use]
    pub fn entry_class(&self) -> Option<&str> {
        self.handle.entry_class()
    }

    /// Returns the module handle.
    #[must_use]
    pub const fn handle(&self) -> &ModuleHandle {
        &self.handle
    }

    /// Returns the human-readable module name.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.handle.manifest().name()
    }

    /// Returns the module vendor.
    #[must_use]
    pub fn provider_name(&self) -> Option<&str> {
        self.handle.manifest().vendor()
    }

    /// Returns the install location, `platform:/plugin/<id>_<version>/`.
    #[must_use]
    pub fn install_url(&self) -> String {
        format!("{INSTALL_URL_PREFIX}{self}/")
    }

    /// Returns the current activation phase.
    #[must_use]
    pub fn phase(&self) -> ActivationPhase {
        self.lock_state().phase
    }

    /// Returns the module's entry object, activating the module on first use.
    ///
    /// Exactly one caller runs activation. Callers that arrive while it runs,
    /// including the entry type's own constructor, receive
    /// [`EntryLookup::InProgress`].
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::IllegalModuleState`] when the container has
    /// not resolved the module and [`ActivationError::PermanentlyDisabled`]
    /// after an earlier failure. A failure of this attempt is returned as
    /// [`ActivationError::ContainerStart`] or
    /// [`ActivationError::ClassResolution`] and disables the module.
    pub fn entry_object(&self) -> Result<EntryLookup, ActivationError> {
        if let Some(entry) = self.lock_state().entry.as_ref() {
            return Ok(EntryLookup::Ready(Arc::clone(entry)));
        }

        let pending = match self.admit()? {
            Admission::Ready(entry) => return Ok(EntryLookup::Ready(entry)),
            Admission::InProgress => return Ok(EntryLookup::InProgress),
            Admission::Activate(pending) => pending,
        };

        match self.activate() {
            Ok(entry) => {
                debug!(
                    target: ACTIVATION_TARGET,
                    module = self.id(),
                    entry_class = self.entry_class().unwrap_or_default(),
                    "module activated"
                );
                pending.complete(Arc::clone(&entry));
                Ok(EntryLookup::Ready(entry))
            }
            Err(failure) => {
                error!(
                    target: ACTIVATION_TARGET,
                    module = self.id(),
                    entry_class = self.entry_class().unwrap_or_default(),
                    error = %failure,
                    "module activation failed"
                );
                pending.fail();
                Err(failure)
            }
        }
    }

    fn admit(&self) -> Result<Admission<'_>, ActivationError> {
        let mut state = self.lock_state();
        if let Some(entry) = state.entry.as_ref() {
            return Ok(Admission::Ready(Arc::clone(entry)));
        }
        if state.phase == ActivationPhase::Deactivated {
            warn!(
                target: ACTIVATION_TARGET,
                module = self.id(),
                entry_class = self.entry_class().unwrap_or_default(),
                "refusing to activate disabled module"
            );
            return Err(ActivationError::PermanentlyDisabled {
                module: self.id().to_owned(),
            });
        }

        let container_state = self.handle.state();
        if !container_state.is_some_and(LifecycleState::is_resolved) {
            error!(
                target: ACTIVATION_TARGET,
                module = self.id(),
                entry_class = self.entry_class().unwrap_or_default(),
                state = container_state.map_or("unknown", LifecycleState::as_str),
                "module is not resolved; refusing to activate"
            );
            return Err(ActivationError::IllegalModuleState {
                module: self.id().to_owned(),
                state: container_state,
            });
        }

        match state.phase {
            ActivationPhase::Pending => Ok(Admission::InProgress),
            ActivationPhase::Active => {
                debug!(
                    target: ACTIVATION_TARGET,
                    module = self.id(),
                    "module was started elsewhere; using default entry object"
                );
                let entry: Arc<dyn EntryObject> = Arc::new(DefaultEntry::new(self));
                state.entry = Some(Arc::clone(&entry));
                Ok(Admission::Ready(entry))
            }
            ActivationPhase::Inactive | ActivationPhase::Deactivated => {
                state.phase = ActivationPhase::Pending;
                state.activator = Some(thread::current().id());
                Ok(Admission::Activate(PendingActivation {
                    descriptor: self,
                    settled: false,
                }))
            }
        }
    }

    fn activate(&self) -> Result<Arc<dyn EntryObject>, ActivationError> {
        if self.handle.state() == Some(LifecycleState::Resolved) {
            self.handle
                .start()
                .map_err(|source| ActivationError::ContainerStart {
                    module: self.id().to_owned(),
                    source,
                })?;
        }
        resolve_entry(self).map_err(|source| ActivationError::ClassResolution {
            module: self.id().to_owned(),
            entry_class: self.entry_class().unwrap_or_default().to_owned(),
            source,
        })
    }

    /// Returns `true` when the module is active.
    ///
    /// Waits while another thread is activating the module. Called from the
    /// activating thread itself it returns `false` without waiting.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        let caller = thread::current().id();
        let state = self
            .settled
            .wait_while(self.lock_state(), |current| current.blocks(caller))
            .unwrap_or_else(PoisonError::into_inner);
        state.phase == ActivationPhase::Active
    }

    /// Returns `true` once activation has failed. Never blocks on an
    /// in-flight activation.
    #[must_use]
    pub fn is_permanently_disabled(&self) -> bool {
        self.lock_state().phase == ActivationPhase::Deactivated
    }

    /// Returns `true` while activation runs or after it succeeded.
    #[must_use]
    pub fn has_activation_started(&self) -> bool {
        matches!(
            self.lock_state().phase,
            ActivationPhase::Pending | ActivationPhase::Active
        )
    }

    /// Tears the module down: drops the entry object and returns to
    /// [`ActivationPhase::Inactive`]. A disabled module stays disabled.
    ///
    /// Waits for an in-flight activation on another thread. Called from the
    /// activating thread itself it does nothing.
    pub fn deactivate(&self) {
        let caller = thread::current().id();
        let mut state = self
            .settled
            .wait_while(self.lock_state(), |current| current.blocks(caller))
            .unwrap_or_else(PoisonError::into_inner);
        if state.phase == ActivationPhase::Pending {
            debug!(
                target: ACTIVATION_TARGET,
                module = self.id(),
                "ignoring deactivation from inside activation"
            );
            return;
        }
        state.entry = None;
        if state.phase != ActivationPhase::Deactivated {
            state.phase = ActivationPhase::Inactive;
        }
        debug!(
            target: ACTIVATION_TARGET,
            module = self.id(),
            phase = %state.phase,
            "module deactivated"
        );
    }

    /// Marks the module active without running activation, for modules
    /// started by another subsystem. The next
    /// [`entry_object`](Self::entry_object) call supplies a default entry
    /// object.
    ///
    /// Ignored while activation runs and after it failed.
    pub fn set_active_externally(&self) {
        let mut state = self.lock_state();
        match state.phase {
            ActivationPhase::Inactive | ActivationPhase::Active => {
                state.phase = ActivationPhase::Active;
            }
            phase @ (ActivationPhase::Pending | ActivationPhase::Deactivated) => debug!(
                target: ACTIVATION_TARGET,
                module = self.id(),
                %phase,
                "ignoring external activation"
            ),
        }
    }

    /// Replaces the entry object and marks the module active.
    ///
    /// Ignored while activation runs and after it failed.
    pub fn set_entry_object(&self, entry: Arc<dyn EntryObject>) {
        let mut state = self.lock_state();
        match state.phase {
            ActivationPhase::Inactive | ActivationPhase::Active => {
                state.phase = ActivationPhase::Active;
                state.entry = Some(entry);
            }
            phase @ (ActivationPhase::Pending | ActivationPhase::Deactivated) => debug!(
                target: ACTIVATION_TARGET,
                module = self.id(),
                %phase,
                "ignoring entry object replacement"
            ),
        }
    }

    /// Returns the module's class context, creating it on first use.
    #[must_use]
    pub fn class_context(&self) -> Arc<ClassContext> {
        let context = self.class_context.get_or_init(|| {
            Arc::new(ClassContext::build(&self.handle, Arc::clone(&self.types)))
        });
        Arc::clone(context)
    }

    /// Returns the libraries of the module's class context.
    #[must_use]
    pub fn runtime_libraries(&self) -> Vec<Library> {
        self.class_context().libraries().to_vec()
    }

    /// Locates a resource in the module, then in its fragments.
    ///
    /// Variable segments such as `$os$` expand for the running platform; see
    /// [`ModuleDescriptor::find_with_variables`].
    #[must_use]
    pub fn find(&self, path: &str) -> Option<String> {
        self.find_with_variables(path, &PathVariables::default())
    }

    /// Locates a resource, expanding variable segments with `variables`.
    ///
    /// Each candidate path is looked up in the module and then in each of
    /// its fragments before the next candidate is tried. Returns `None` when
    /// no module provides the resource.
    #[must_use]
    pub fn find_with_variables(&self, path: &str, variables: &PathVariables) -> Option<String> {
        let fragments = self.handle.fragments();
        let location = candidate_paths(path, variables).iter().find_map(|candidate| {
            iter::once(&self.handle)
                .chain(fragments.iter())
                .find_map(|module| module.find_entry(candidate))
        });
        debug!(
            target: RESOURCE_TARGET,
            module = self.id(),
            path,
            found = location.is_some(),
            "resource lookup"
        );
        location
    }

    /// Returns the extensions this module contributes.
    #[must_use]
    pub fn extensions(&self) -> Vec<Extension> {
        self.capabilities.list_extensions(self.id())
    }

    /// Returns the extension points this module declares.
    #[must_use]
    pub fn extension_points(&self) -> Vec<ExtensionPoint> {
        self.capabilities.list_extension_points(self.id())
    }

    /// Returns this module's first extension with the given simple
    /// identifier.
    #[must_use]
    pub fn extension(&self, simple_id: &str) -> Option<Extension> {
        self.capabilities.extension(self.id(), simple_id)
    }

    /// Returns one of this module's extension points.
    #[must_use]
    pub fn extension_point(&self, simple_id: &str) -> Option<ExtensionPoint> {
        self.capabilities.extension_point(self.id(), simple_id)
    }

    /// Returns this module's prerequisites.
    #[must_use]
    pub fn prerequisites(&self) -> Vec<Prerequisite> {
        self.capabilities.list_prerequisites(self.id())
    }

    fn lock_state(&self) -> MutexGuard<'_, ActivationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{VERSION_SEPARATOR}{}", self.id(), self.version)
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id())
            .field("version", &self.version)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Marks a descriptor `Pending` for the lifetime of one activation attempt.
///
/// Dropping it without settling disables the module and wakes waiters, so an
/// unwinding activation never leaves the descriptor pending.
struct PendingActivation<'a> {
    descriptor: &'a ModuleDescriptor,
    settled: bool,
}

impl PendingActivation<'_> {
    fn complete(mut self, entry: Arc<dyn EntryObject>) {
        self.settle(ActivationPhase::Active, Some(entry));
    }

    fn fail(mut self) {
        self.settle(ActivationPhase::Deactivated, None);
    }

    fn settle(&mut self, phase: ActivationPhase, entry: Option<Arc<dyn EntryObject>>) {
        let mut state = self.descriptor.lock_state();
        state.phase = phase;
        state.entry = entry;
        state.activator = None;
        self.settled = true;
        drop(state);
        self.descriptor.settled.notify_all();
    }
}

impl Drop for PendingActivation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                target: ACTIVATION_TARGET,
                module = self.descriptor.id(),
                "activation unwound; disabling module"
            );
            self.settle(ActivationPhase::Deactivated, None);
        }
    }
}

/// Returns the identifier part of an `id_version` string: the text before
/// the first `_`, or the whole string.
///
/// # Example
///
/// ```
/// use trellis_modules::descriptor::unique_identifier_from_str;
///
/// assert_eq!(unique_identifier_from_str("a.b_1.2.0"), "a.b");
/// assert_eq!(unique_identifier_from_str("a.b"), "a.b");
/// ```
#[must_use]
pub fn unique_identifier_from_str(text: &str) -> &str {
    text.split_once(VERSION_SEPARATOR)
        .map_or(text, |(id, _)| id)
}

/// Parses the version part of an `id_version` string, or the whole string
/// when it has no `_`.
///
/// # Errors
///
/// Returns [`VersionError`] when the version part is malformed.
///
/// # Example
///
/// ```
/// use trellis_modules::descriptor::version_from_str;
///
/// let version = version_from_str("a.b_1.2").expect("valid version");
/// assert_eq!(version.to_string(), "1.2.0");
/// ```
pub fn version_from_str(text: &str) -> Result<ModuleVersion, VersionError> {
    let version = text
        .split_once(VERSION_SEPARATOR)
        .map_or(text, |(_, version)| version);
    ModuleVersion::parse(version)
}

#[cfg(test)]
mod tests;
