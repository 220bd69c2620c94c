//! Entry type registry and entry object resolution.
//!
//! Modules name their entry type as text. The [`EntryTypeRegistry`] maps
//! those names, per library, to constructors taking the module's
//! [`ModuleDescriptor`]. Types are registered statically or supplied on
//! demand by an [`EntryTypeLoader`], the one place where dynamic loading may
//! plug in.
//!
//! Resolution walks the descriptor's class context, checks the type has a
//! descriptor constructor, runs it and checks that the product is an entry
//! object. Modules that declare no entry type get a [`DefaultEntry`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::classpath::Library;
use crate::descriptor::ModuleDescriptor;
use crate::entry::{DefaultEntry, EntryObject};
use crate::error::{BoxError, ClassResolutionError, RegistrationError};

/// Tracing target for entry object resolution.
const FACTORY_TARGET: &str = "trellis_modules::factory";

/// Value produced by a descriptor constructor before it is checked against
/// the entry object contract.
///
/// Constructors that produce an entry object box an `Arc<dyn EntryObject>`.
pub type ConstructedValue = Box<dyn Any + Send + Sync>;

/// Constructor receiving the descriptor of the module being activated.
pub type DescriptorConstructor =
    Arc<dyn Fn(&ModuleDescriptor) -> Result<ConstructedValue, BoxError> + Send + Sync>;

/// A named type that may serve as a module's entry type.
///
/// # Example
///
/// ```
/// use std::any::Any;
/// use trellis_modules::{EntryObject, EntryType, ModuleDescriptor};
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
///
/// let entry_type = EntryType::new("alpha.Activator", |descriptor: &ModuleDescriptor| {
///     Ok(Activator {
///         module: descriptor.id().to_owned(),
///     })
/// });
/// assert!(entry_type.has_descriptor_constructor());
/// ```
#[derive(Clone)]
pub struct EntryType {
    name: String,
    constructor: Option<DescriptorConstructor>,
}

impl EntryType {
    /// Creates a type whose constructor yields an entry object.
    #[must_use]
    pub fn new<T, F>(name: impl Into<String>, constructor: F) -> Self
    where
        T: EntryObject,
        F: Fn(&ModuleDescriptor) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_raw_constructor(name, move |descriptor| {
            let entry: Arc<dyn EntryObject> = Arc::new(constructor(descriptor)?);
            Ok(Box::new(entry) as ConstructedValue)
        })
    }

    /// Creates a type from an untyped constructor, as produced by dynamic
    /// loaders. The product is checked against the entry object contract at
    /// activation time.
    #[must_use]
    pub fn from_raw_constructor<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ModuleDescriptor) -> Result<ConstructedValue, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            constructor: Some(Arc::new(constructor)),
        }
    }

    /// Creates a type that cannot be constructed from a descriptor.
    #[must_use]
    pub fn without_descriptor_constructor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
        }
    }

    /// Returns the type name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns `true` when the type accepts a module descriptor.
    #[must_use]
    pub const fn has_descriptor_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    /// Returns the descriptor constructor.
    #[must_use]
    pub const fn constructor(&self) -> Option<&DescriptorConstructor> {
        self.constructor.as_ref()
    }
}

impl fmt::Debug for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryType")
            .field("name", &self.name)
            .field("has_descriptor_constructor", &self.has_descriptor_constructor())
            .finish()
    }
}

/// Supplies entry types that were not registered up front.
///
/// # Example
///
/// ```
/// use trellis_modules::{EntryType, EntryTypeLoader, Library};
///
/// struct NothingLoader;
///
/// impl EntryTypeLoader for NothingLoader {
///     fn load(&self, _library: &Library, _type_name: &str) -> Option<EntryType> {
///         None
///     }
/// }
/// ```
pub trait EntryTypeLoader: Send + Sync {
    /// Returns the named type if `library` provides it.
    fn load(&self, library: &Library, type_name: &str) -> Option<EntryType>;
}

/// Registry of entry types keyed by library and type name.
///
/// Libraries are scoped to their owning module, so `alpha`'s `.` and
/// `beta`'s `.` are distinct. System types are visible to every module.
#[derive(Clone, Default)]
pub struct EntryTypeRegistry {
    libraries: HashMap<Library, HashMap<String, EntryType>>,
    system: HashMap<String, EntryType>,
    loader: Option<Arc<dyn EntryTypeLoader>>,
}

impl EntryTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a loader consulted when a library has no registered type of
    /// the requested name.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn EntryTypeLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Registers a type in a library.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::EmptyTypeName`] for blank names and
    /// [`RegistrationError::DuplicateEntryType`] if the library already has
    /// a type of that name.
    pub fn register(
        &mut self,
        library: Library,
        entry_type: EntryType,
    ) -> Result<(), RegistrationError> {
        validate_name(&entry_type)?;
        let types = self.libraries.entry(library.clone()).or_default();
        if types.contains_key(entry_type.name()) {
            return Err(RegistrationError::DuplicateEntryType {
                library,
                name: entry_type.name().to_owned(),
            });
        }
        types.insert(entry_type.name().to_owned(), entry_type);
        Ok(())
    }

    /// Registers a type in a module's root library (`.`).
    ///
    /// # Errors
    ///
    /// See [`EntryTypeRegistry::register`].
    pub fn register_in_module(
        &mut self,
        module_id: &str,
        entry_type: EntryType,
    ) -> Result<(), RegistrationError> {
        self.register(Library::module_root(module_id), entry_type)
    }

    /// Registers a type visible to every module.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::EmptyTypeName`] for blank names and
    /// [`RegistrationError::DuplicateEntryType`] for duplicate system types.
    pub fn register_system(&mut self, entry_type: EntryType) -> Result<(), RegistrationError> {
        validate_name(&entry_type)?;
        if self.system.contains_key(entry_type.name()) {
            return Err(RegistrationError::DuplicateEntryType {
                library: Library::new("", "system"),
                name: entry_type.name().to_owned(),
            });
        }
        self.system.insert(entry_type.name().to_owned(), entry_type);
        Ok(())
    }

    /// Looks a type up in one library, asking the loader on a miss.
    #[must_use]
    pub fn lookup(&self, library: &Library, type_name: &str) -> Option<EntryType> {
        self.libraries
            .get(library)
            .and_then(|types| types.get(type_name))
            .cloned()
            .or_else(|| {
                self.loader
                    .as_ref()
                    .and_then(|loader| loader.load(library, type_name))
            })
    }

    /// Looks a system type up.
    #[must_use]
    pub fn lookup_system(&self, type_name: &str) -> Option<EntryType> {
        self.system.get(type_name).cloned()
    }

    /// Returns the number of registered types, system types included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.libraries.values().map(HashMap::len).sum::<usize>() + self.system.len()
    }

    /// Returns `true` when no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EntryTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryTypeRegistry")
            .field("libraries", &self.libraries.len())
            .field("system", &self.system.len())
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}

fn validate_name(entry_type: &EntryType) -> Result<(), RegistrationError> {
    if entry_type.name().trim().is_empty() {
        return Err(RegistrationError::EmptyTypeName);
    }
    Ok(())
}

/// Creates the entry object for a descriptor.
///
/// Modules without a declared entry type receive a [`DefaultEntry`].
///
/// # Errors
///
/// Returns the [`ClassResolutionError`] matching the step that failed.
pub fn resolve_entry(
    descriptor: &ModuleDescriptor,
) -> Result<Arc<dyn EntryObject>, ClassResolutionError> {
    let Some(class) = descriptor.entry_class() else {
        debug!(
            target: FACTORY_TARGET,
            module = descriptor.id(),
            "no entry type declared; using default entry object"
        );
        return Ok(Arc::new(DefaultEntry::new(descriptor)));
    };

    let context = descriptor.class_context();
    let entry_type = context
        .resolve(class)
        .ok_or_else(|| ClassResolutionError::NotFound {
            class: class.to_owned(),
        })?;
    let constructor =
        entry_type
            .constructor()
            .ok_or_else(|| ClassResolutionError::NoMatchingConstructor {
                class: class.to_owned(),
            })?;

    debug!(
        target: FACTORY_TARGET,
        module = descriptor.id(),
        entry_class = class,
        "constructing entry object"
    );
    let constructed = construct(class, constructor, descriptor)?;
    constructed
        .downcast::<Arc<dyn EntryObject>>()
        .map(|entry| *entry)
        .map_err(|_| ClassResolutionError::NotAssignable {
            class: class.to_owned(),
        })
}

fn construct(
    class: &str,
    constructor: &DescriptorConstructor,
    descriptor: &ModuleDescriptor,
) -> Result<ConstructedValue, ClassResolutionError> {
    match panic::catch_unwind(AssertUnwindSafe(|| constructor(descriptor))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ClassResolutionError::ConstructionFailed {
            class: class.to_owned(),
            message: error.to_string(),
            source: Some(Arc::from(error)),
        }),
        Err(payload) => Err(ClassResolutionError::ConstructionFailed {
            class: class.to_owned(),
            message: panic_message(payload.as_ref()),
            source: None,
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(
            || String::from("constructor panicked"),
            |message| format!("constructor panicked: {message}"),
        )
}
