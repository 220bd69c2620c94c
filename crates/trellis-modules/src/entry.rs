//! The entry object contract and the built-in default entry object.

use std::any::Any;
use std::fmt;

use crate::descriptor::ModuleDescriptor;
use crate::version::ModuleVersion;

/// Runtime object a module designates to represent it once activated.
///
/// Implementations are created by the entry type registered under the
/// module's declared entry type name and are shared behind an `Arc`.
///
/// # Example
///
/// ```
/// use std::any::Any;
/// use trellis_modules::EntryObject;
///
/// #[derive(Debug)]
/// struct Activator {
///     module: String,
/// }
///
/// impl EntryObject for Activator {
///     fn module_id(&self) -> &str {
///         &self.module
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait EntryObject: Any + Send + Sync + fmt::Debug {
    /// Identifier of the module that owns this entry object.
    fn module_id(&self) -> &str;

    /// Exposes the concrete type for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl dyn EntryObject {
    /// Returns the entry object as `T` when that is its concrete type.
    #[must_use]
    pub fn downcast_ref<T: EntryObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns `true` when the entry object's concrete type is `T`.
    #[must_use]
    pub fn is<T: EntryObject>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Entry object used for modules that declare no entry type, or that were
/// started by another subsystem. It does nothing beyond identifying its
/// module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultEntry {
    module_id: String,
    version: ModuleVersion,
}

impl DefaultEntry {
    /// Creates the default entry object for a descriptor.
    #[must_use]
    pub fn new(descriptor: &ModuleDescriptor) -> Self {
        Self {
            module_id: descriptor.id().to_owned(),
            version: descriptor.version().clone(),
        }
    }

    /// Returns the version of the owning module.
    #[must_use]
    pub const fn version(&self) -> &ModuleVersion {
        &self.version
    }
}

impl EntryObject for DefaultEntry {
    fn module_id(&self) -> &str {
        &self.module_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
