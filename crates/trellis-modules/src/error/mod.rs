//! Domain errors raised by module activation and its collaborators.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. Causes that must be shared across
//! threads (constructor failures, I/O) are wrapped in `Arc` so the errors stay
//! `Send + Sync` and cheap to move.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::classpath::Library;
use crate::container::LifecycleState;

/// Boxed error returned by entry-object constructors.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors surfaced by [`ModuleDescriptor::entry_object`](crate::ModuleDescriptor::entry_object).
///
/// Every variant names the module it concerns. Failures other than
/// [`ActivationError::IllegalModuleState`] leave the descriptor permanently
/// disabled.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// An earlier activation attempt failed; the module is never retried.
    #[error("module '{module}' is disabled after a failed activation")]
    PermanentlyDisabled {
        /// Identifier of the disabled module.
        module: String,
    },

    /// The container refused to start the module.
    #[error("module '{module}' could not be started: {source}")]
    ContainerStart {
        /// Identifier of the module being activated.
        module: String,
        /// Failure reported by the container.
        #[source]
        source: ContainerError,
    },

    /// The declared entry type could not be resolved or constructed.
    #[error("module '{module}' failed to create entry object '{entry_class}': {source}")]
    ClassResolution {
        /// Identifier of the module being activated.
        module: String,
        /// Entry type name declared by the module.
        entry_class: String,
        /// Resolution failure.
        #[source]
        source: ClassResolutionError,
    },

    /// Activation was requested before the container resolved the module.
    #[error("module '{module}' cannot be activated in container state {}", state_label(.state))]
    IllegalModuleState {
        /// Identifier of the module.
        module: String,
        /// State reported by the container, if it knows the module at all.
        state: Option<LifecycleState>,
    },
}

impl ActivationError {
    /// Returns the identifier of the module the error concerns.
    #[must_use]
    pub fn module(&self) -> &str {
        match self {
            Self::PermanentlyDisabled { module }
            | Self::ContainerStart { module, .. }
            | Self::ClassResolution { module, .. }
            | Self::IllegalModuleState { module, .. } => module,
        }
    }

    /// Returns the class resolution failure, when that is the cause.
    #[must_use]
    pub const fn resolution_failure(&self) -> Option<&ClassResolutionError> {
        match self {
            Self::ClassResolution { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn state_label(state: &Option<LifecycleState>) -> &'static str {
    state.map_or("unknown", LifecycleState::as_str)
}

/// Failures while turning a declared entry type name into an entry object.
#[derive(Debug, Error)]
pub enum ClassResolutionError {
    /// No library on the module's classpath defines the type.
    #[error("type '{class}' was not found on the module classpath")]
    NotFound {
        /// Requested type name.
        class: String,
    },

    /// The type exists but has no constructor accepting the module descriptor.
    #[error("type '{class}' has no constructor accepting a module descriptor")]
    NoMatchingConstructor {
        /// Requested type name.
        class: String,
    },

    /// The constructor produced a value that is not an entry object.
    #[error("type '{class}' does not implement the entry object contract")]
    NotAssignable {
        /// Requested type name.
        class: String,
    },

    /// The constructor returned an error or panicked.
    #[error("constructing '{class}' failed: {message}")]
    ConstructionFailed {
        /// Requested type name.
        class: String,
        /// Human-readable failure description.
        message: String,
        /// Error returned by the constructor, absent when it panicked.
        #[source]
        source: Option<Arc<dyn StdError + Send + Sync>>,
    },
}

impl ClassResolutionError {
    /// Returns the type name the failure concerns.
    #[must_use]
    pub fn class(&self) -> &str {
        match self {
            Self::NotFound { class }
            | Self::NoMatchingConstructor { class }
            | Self::NotAssignable { class }
            | Self::ConstructionFailed { class, .. } => class,
        }
    }
}

/// Errors reported by a [`ModuleContainer`](crate::ModuleContainer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    /// The container does not know the module.
    #[error("module '{module}' is not installed")]
    UnknownModule {
        /// Identifier that was looked up.
        module: String,
    },

    /// The module is already installed.
    #[error("module '{module}' is already installed")]
    AlreadyInstalled {
        /// Identifier of the duplicate module.
        module: String,
    },

    /// The module cannot be started from its current state.
    #[error("module '{module}' cannot be started from state {state}")]
    InvalidTransition {
        /// Identifier of the module.
        module: String,
        /// State the module was in.
        state: LifecycleState,
    },

    /// The module's start sequence failed.
    #[error("module '{module}' failed to start: {message}")]
    StartFailed {
        /// Identifier of the module.
        module: String,
        /// Description of the failure.
        message: String,
    },

    /// The manifest offered for installation is invalid.
    #[error(transparent)]
    InvalidManifest(#[from] ManifestError),
}

/// Errors produced while parsing a classpath header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClasspathError {
    /// A clause between separators was empty or had no path.
    #[error("classpath header '{header}' contains an empty entry")]
    EmptyClause {
        /// Header being parsed.
        header: String,
    },

    /// A double quote was opened but never closed.
    #[error("classpath header '{header}' has an unterminated quote")]
    UnterminatedQuote {
        /// Header being parsed.
        header: String,
    },

    /// A clause parameter was not of the form `key=value`.
    #[error("classpath header '{header}' has a malformed parameter '{parameter}'")]
    MalformedParameter {
        /// Header being parsed.
        header: String,
        /// Offending parameter text.
        parameter: String,
    },
}

/// A module manifest failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("manifest error: {message}")]
pub struct ManifestError {
    message: String,
}

impl ManifestError {
    /// Creates a manifest error with the given description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the validation failure description.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Errors raised when registering entry types or extension points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A type with the same name is already registered in the library.
    #[error("entry type '{name}' is already registered in library '{library}'")]
    DuplicateEntryType {
        /// Library the type was registered in.
        library: Library,
        /// Type name.
        name: String,
    },

    /// An entry type name was blank.
    #[error("entry type names must not be empty")]
    EmptyTypeName,

    /// An extension point with the same unique identifier already exists.
    #[error("extension point '{id}' is already registered")]
    DuplicateExtensionPoint {
        /// Unique identifier of the extension point.
        id: String,
    },
}

/// Errors raised while loading a module set or looking modules up in it.
#[derive(Debug, Error)]
pub enum ModuleSetError {
    /// The module set file could not be read.
    #[error("failed to read module set '{path}': {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The module set document is not valid JSON for the expected shape.
    #[error("failed to parse module set: {0}")]
    Parse(#[source] serde_json::Error),

    /// The container rejected a module.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// An extension point could not be registered.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// No module with the given identifier is installed.
    #[error("module '{module}' is not part of the module set")]
    UnknownModule {
        /// Identifier that was looked up.
        module: String,
    },
}
