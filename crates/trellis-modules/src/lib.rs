//! Module activation and lifecycle management for Trellis.
//!
//! The `trellis-modules` crate turns statically described modules into live
//! runtime objects. Each module declares an identifier, a version, an
//! optional entry type and a classpath in its [`ModuleManifest`]. A
//! [`ModuleDescriptor`] creates the module's entry object on first use,
//! exactly once, and disables the module for good when that fails.
//!
//! # Architecture
//!
//! The crate never owns the systems it coordinates. The module container that
//! resolves and starts modules is reached through the [`ModuleContainer`]
//! trait, and the store of extensions and extension points through
//! [`CapabilityRegistry`]. In-memory implementations of both,
//! [`InMemoryContainer`] and [`InMemoryCapabilityRegistry`], back the CLI and
//! the tests.
//!
//! Entry types are looked up by name in an [`EntryTypeRegistry`], scoped to
//! the libraries on the module's classpath (and those of its fragments).
//! Registered constructors receive the module's descriptor.
//!
//! Resources packaged in a module are located with
//! [`ModuleDescriptor::find`], which searches the module and then its
//! fragments.
//!
//! # Example
//!
//! ```
//! use std::any::Any;
//! use trellis_modules::{
//!     EntryObject, EntryType, EntryTypeRegistry, LifecycleState, ModuleDescriptor,
//!     ModuleManifest, ModuleSet,
//! };
//!
//! #[derive(Debug)]
//! struct Activator {
//!     module: String,
//! }
//!
//! impl EntryObject for Activator {
//!     fn module_id(&self) -> &str {
//!         &self.module
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! let mut types = EntryTypeRegistry::new();
//! types
//!     .register_in_module(
//!         "alpha",
//!         EntryType::new("alpha.Activator", |descriptor: &ModuleDescriptor| {
//!             Ok(Activator {
//!                 module: descriptor.id().to_owned(),
//!             })
//!         }),
//!     )
//!     .expect("register entry type");
//!
//! let runtime = ModuleSet::default()
//!     .with_module(
//!         ModuleManifest::new("alpha", "2.1.0").with_entry_class("alpha.Activator"),
//!         LifecycleState::Resolved,
//!     )
//!     .into_runtime(types)
//!     .expect("module runtime");
//!
//! let alpha = runtime.descriptor("alpha").expect("alpha descriptor");
//! let entry = alpha
//!     .entry_object()
//!     .expect("activation succeeds")
//!     .ready()
//!     .expect("entry object ready");
//! assert!(entry.is::<Activator>());
//! assert!(alpha.is_activated());
//! ```

pub mod capability;
pub mod classpath;
pub mod container;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod factory;
pub mod handle;
pub mod manifest;
pub mod module_set;
pub mod resource;
pub mod version;

#[cfg(test)]
mod tests;

pub use capability::{
    CapabilityBridge, CapabilityRegistry, Extension, ExtensionPoint, InMemoryCapabilityRegistry,
    Prerequisite,
};
pub use classpath::{ClassContext, ClasspathClause, Library};
pub use container::{InMemoryContainer, LifecycleState, ModuleContainer};
pub use descriptor::{ActivationPhase, EntryLookup, ModuleDescriptor};
pub use entry::{DefaultEntry, EntryObject};
pub use error::{
    ActivationError, BoxError, ClassResolutionError, ClasspathError, ContainerError,
    ManifestError, ModuleSetError, RegistrationError,
};
pub use factory::{EntryType, EntryTypeLoader, EntryTypeRegistry};
pub use handle::ModuleHandle;
pub use manifest::{ModuleManifest, RequiredModule};
pub use module_set::{ModuleRuntime, ModuleSet, ModuleSetEntry};
pub use resource::PathVariables;
pub use version::{ModuleVersion, VersionError};
