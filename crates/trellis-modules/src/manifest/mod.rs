//! Module manifest types describing module identity and metadata.
//!
//! A [`ModuleManifest`] declares what the activation core reads about a
//! module: its identifier, version, display name, vendor, entry type,
//! classpath header, required modules and, for fragments, the host it
//! attaches to. Manifests are plain data; the container owns them and the
//! core only reads them.

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::version::ModuleVersion;

/// A requirement on another module, as recorded by the container's
/// dependency resolution.
///
/// # Example
///
/// ```
/// use trellis_modules::RequiredModule;
///
/// let requirement = RequiredModule::new("core.runtime")
///     .with_version_range("[1.0.0,2.0.0)")
///     .optional();
/// assert!(requirement.is_optional());
/// assert_eq!(requirement.version_range(), Some("[1.0.0,2.0.0)"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredModule {
    id: String,
    #[serde(default)]
    version_range: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    reexport: bool,
}

impl RequiredModule {
    /// Creates a mandatory, non-exported requirement with no version range.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version_range: None,
            optional: false,
            reexport: false,
        }
    }

    /// Sets the accepted version range, kept as declared.
    #[must_use]
    pub fn with_version_range(mut self, range: impl Into<String>) -> Self {
        self.version_range = Some(range.into());
        self
    }

    /// Marks the requirement as optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the requirement as re-exported to dependants.
    #[must_use]
    pub const fn reexported(mut self) -> Self {
        self.reexport = true;
        self
    }

    /// Returns the identifier of the required module.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the declared version range.
    #[must_use]
    pub fn version_range(&self) -> Option<&str> {
        self.version_range.as_deref()
    }

    /// Returns `true` when the requirement is optional.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns `true` when the requirement is re-exported.
    #[must_use]
    pub const fn is_reexported(&self) -> bool {
        self.reexport
    }
}

/// Declarative description of a module.
///
/// # Example
///
/// ```
/// use trellis_modules::ModuleManifest;
///
/// let manifest = ModuleManifest::new("alpha", "2.1.0")
///     .with_entry_class("alpha.Activator")
///     .with_classpath("alpha.jar, lib/util.jar");
///
/// assert_eq!(manifest.id(), "alpha");
/// assert_eq!(manifest.version().to_string(), "2.1.0");
/// assert_eq!(manifest.entry_class(), Some("alpha.Activator"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    id: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    entry_class: Option<String>,
    #[serde(default)]
    classpath: Option<String>,
    #[serde(default)]
    requires: Vec<RequiredModule>,
    #[serde(default)]
    fragment_host: Option<String>,
}

impl ModuleManifest {
    /// Creates a manifest with an identifier and declared version text.
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: Some(version.into()),
            name: None,
            vendor: None,
            entry_class: None,
            classpath: None,
            requires: Vec::new(),
            fragment_host: None,
        }
    }

    /// Sets the human-readable module name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the module vendor.
    #[must_use]
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Declares the entry type instantiated on activation.
    #[must_use]
    pub fn with_entry_class(mut self, entry_class: impl Into<String>) -> Self {
        self.entry_class = Some(entry_class.into());
        self
    }

    /// Sets the raw classpath header.
    #[must_use]
    pub fn with_classpath(mut self, classpath: impl Into<String>) -> Self {
        self.classpath = Some(classpath.into());
        self
    }

    /// Declares the modules this module requires.
    #[must_use]
    pub fn with_requires(mut self, requires: Vec<RequiredModule>) -> Self {
        self.requires = requires;
        self
    }

    /// Turns the manifest into a fragment attached to `host`.
    #[must_use]
    pub fn as_fragment_of(mut self, host: impl Into<String>) -> Self {
        self.fragment_host = Some(host.into());
        self
    }

    /// Validates the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the identifier is empty or contains
    /// whitespace, or if a fragment declares an entry type.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.trim().is_empty() {
            return Err(ManifestError::new("module identifier must not be empty"));
        }
        if self.id.chars().any(char::is_whitespace) {
            return Err(ManifestError::new(format!(
                "module identifier '{}' must not contain whitespace",
                self.id
            )));
        }
        if self.is_fragment() && self.entry_class().is_some() {
            return Err(ManifestError::new(format!(
                "fragment '{}' must not declare an entry type",
                self.id
            )));
        }
        Ok(())
    }

    /// Returns the module identifier.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the version text exactly as declared.
    #[must_use]
    pub fn declared_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns the parsed version, `1.0.0` when absent or malformed.
    #[must_use]
    pub fn version(&self) -> ModuleVersion {
        ModuleVersion::parse_or_fallback(self.declared_version())
    }

    /// Returns the human-readable module name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the module vendor.
    #[must_use]
    pub fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }

    /// Returns the declared entry type, treating a blank declaration as none.
    #[must_use]
    pub fn entry_class(&self) -> Option<&str> {
        self.entry_class
            .as_deref()
            .map(str::trim)
            .filter(|class| !class.is_empty())
    }

    /// Returns the raw classpath header.
    #[must_use]
    pub fn classpath(&self) -> Option<&str> {
        self.classpath.as_deref()
    }

    /// Returns the declared requirements.
    #[must_use]
    pub fn requires(&self) -> &[RequiredModule] {
        &self.requires
    }

    /// Returns the host this fragment attaches to.
    #[must_use]
    pub fn fragment_host(&self) -> Option<&str> {
        self.fragment_host.as_deref()
    }

    /// Returns `true` when the manifest describes a fragment.
    #[must_use]
    pub const fn is_fragment(&self) -> bool {
        self.fragment_host.is_some()
    }
}
