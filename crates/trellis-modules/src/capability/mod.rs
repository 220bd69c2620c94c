//! Bridge between modules and the capability registry.
//!
//! Modules contribute [`Extension`]s to extension points and declare
//! [`ExtensionPoint`]s of their own. Both live in an external
//! [`CapabilityRegistry`]; the [`CapabilityBridge`] queries it on behalf of a
//! module and combines the answers with the container's dependency snapshot
//! to list the module's [`Prerequisite`]s. Results are snapshots and are
//! recomputed on every call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::container::ModuleContainer;
use crate::error::RegistrationError;
use crate::manifest::RequiredModule;

/// Tracing target for capability registry operations.
const CAPABILITY_TARGET: &str = "trellis_modules::capability";

/// An extension contributed by a module to an extension point.
///
/// # Example
///
/// ```
/// use trellis_modules::Extension;
///
/// let extension = Extension::new("alpha", "views", "core.views").with_label("Alpha views");
/// assert_eq!(extension.unique_id(), "alpha.views");
/// assert_eq!(extension.point_id(), "core.views");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    #[serde(rename = "module")]
    module_id: String,
    #[serde(rename = "id")]
    simple_id: String,
    #[serde(rename = "point")]
    point_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl Extension {
    /// Creates an extension of `point_id` contributed by `module_id`.
    #[must_use]
    pub fn new(
        module_id: impl Into<String>,
        simple_id: impl Into<String>,
        point_id: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            simple_id: simple_id.into(),
            point_id: point_id.into(),
            label: None,
        }
    }

    /// Sets the human-readable label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns the contributing module.
    #[must_use]
    pub const fn module_id(&self) -> &str {
        self.module_id.as_str()
    }

    /// Returns the identifier local to the contributing module.
    #[must_use]
    pub const fn simple_id(&self) -> &str {
        self.simple_id.as_str()
    }

    /// Returns `module.simple_id`.
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}.{}", self.module_id, self.simple_id)
    }

    /// Returns the unique identifier of the extended point.
    #[must_use]
    pub const fn point_id(&self) -> &str {
        self.point_id.as_str()
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// An extension point declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionPoint {
    #[serde(rename = "module")]
    module_id: String,
    #[serde(rename = "id")]
    simple_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
}

impl ExtensionPoint {
    /// Creates an extension point declared by `module_id`.
    #[must_use]
    pub fn new(module_id: impl Into<String>, simple_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            simple_id: simple_id.into(),
            label: None,
            schema: None,
        }
    }

    /// Sets the human-readable label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the schema reference describing valid contributions.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Returns the declaring module.
    #[must_use]
    pub const fn module_id(&self) -> &str {
        self.module_id.as_str()
    }

    /// Returns the identifier local to the declaring module.
    #[must_use]
    pub const fn simple_id(&self) -> &str {
        self.simple_id.as_str()
    }

    /// Returns `module.simple_id`.
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}.{}", self.module_id, self.simple_id)
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns the schema reference.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

/// A module's requirement on another module, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prerequisite {
    id: String,
    version_range: Option<String>,
    optional: bool,
    reexport: bool,
}

impl Prerequisite {
    /// Returns the identifier of the required module.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the accepted version range as declared.
    #[must_use]
    pub fn version_range(&self) -> Option<&str> {
        self.version_range.as_deref()
    }

    /// Returns `true` when the requirement may be left unsatisfied.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns `true` when the requirement is re-exported.
    #[must_use]
    pub const fn is_exported(&self) -> bool {
        self.reexport
    }
}

impl From<&RequiredModule> for Prerequisite {
    fn from(required: &RequiredModule) -> Self {
        Self {
            id: required.id().to_owned(),
            version_range: required.version_range().map(str::to_owned),
            optional: required.is_optional(),
            reexport: required.is_reexported(),
        }
    }
}

/// Interface to the store of extensions and extension points.
pub trait CapabilityRegistry: Send + Sync {
    /// Returns the extensions contributed by a module.
    fn extensions(&self, module_id: &str) -> Vec<Extension>;

    /// Returns the extension points declared by a module.
    fn extension_points(&self, module_id: &str) -> Vec<ExtensionPoint>;

    /// Returns one extension point of a module by its simple identifier.
    fn extension_point(&self, module_id: &str, simple_id: &str) -> Option<ExtensionPoint>;
}

/// Capability queries scoped to the modules of one container.
#[derive(Clone)]
pub struct CapabilityBridge {
    registry: Arc<dyn CapabilityRegistry>,
    container: Arc<dyn ModuleContainer>,
}

impl CapabilityBridge {
    /// Creates a bridge over a registry and a container.
    #[must_use]
    pub fn new(registry: Arc<dyn CapabilityRegistry>, container: Arc<dyn ModuleContainer>) -> Self {
        Self {
            registry,
            container,
        }
    }

    /// Returns the extensions contributed by a module.
    #[must_use]
    pub fn list_extensions(&self, module_id: &str) -> Vec<Extension> {
        self.registry.extensions(module_id)
    }

    /// Returns the extension points declared by a module.
    #[must_use]
    pub fn list_extension_points(&self, module_id: &str) -> Vec<ExtensionPoint> {
        self.registry.extension_points(module_id)
    }

    /// Returns the first extension of a module with the given simple
    /// identifier.
    #[must_use]
    pub fn extension(&self, module_id: &str, simple_id: &str) -> Option<Extension> {
        self.registry
            .extensions(module_id)
            .into_iter()
            .find(|extension| extension.simple_id() == simple_id)
    }

    /// Returns one extension point of a module.
    #[must_use]
    pub fn extension_point(&self, module_id: &str, simple_id: &str) -> Option<ExtensionPoint> {
        self.registry.extension_point(module_id, simple_id)
    }

    /// Returns a module's prerequisites from the container's dependency
    /// snapshot.
    #[must_use]
    pub fn list_prerequisites(&self, module_id: &str) -> Vec<Prerequisite> {
        self.container
            .dependency_snapshot(module_id)
            .iter()
            .map(Prerequisite::from)
            .collect()
    }
}

impl fmt::Debug for CapabilityBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityBridge").finish_non_exhaustive()
    }
}

/// Capability registry held in memory, keyed by module.
///
/// # Example
///
/// ```
/// use trellis_modules::{
///     CapabilityRegistry, Extension, ExtensionPoint, InMemoryCapabilityRegistry,
/// };
///
/// let mut registry = InMemoryCapabilityRegistry::new();
/// registry
///     .add_extension_point(ExtensionPoint::new("core", "views"))
///     .expect("new extension point");
/// registry.add_extension(Extension::new("alpha", "views", "core.views"));
///
/// assert_eq!(registry.extensions("alpha").len(), 1);
/// assert!(registry.extension_point("core", "views").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCapabilityRegistry {
    extensions: HashMap<String, Vec<Extension>>,
    extension_points: HashMap<String, Vec<ExtensionPoint>>,
}

impl InMemoryCapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an extension under its contributing module.
    pub fn add_extension(&mut self, extension: Extension) {
        debug!(
            target: CAPABILITY_TARGET,
            module = extension.module_id(),
            point = extension.point_id(),
            "registered extension"
        );
        self.extensions
            .entry(extension.module_id().to_owned())
            .or_default()
            .push(extension);
    }

    /// Records an extension point under its declaring module.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::DuplicateExtensionPoint`] if a point with
    /// the same unique identifier exists.
    pub fn add_extension_point(&mut self, point: ExtensionPoint) -> Result<(), RegistrationError> {
        let points = self
            .extension_points
            .entry(point.module_id().to_owned())
            .or_default();
        if points
            .iter()
            .any(|existing| existing.simple_id() == point.simple_id())
        {
            return Err(RegistrationError::DuplicateExtensionPoint {
                id: point.unique_id(),
            });
        }
        debug!(
            target: CAPABILITY_TARGET,
            point = %point.unique_id(),
            "registered extension point"
        );
        points.push(point);
        Ok(())
    }

    /// Removes everything a module contributed or declared.
    pub fn remove_module(&mut self, module_id: &str) {
        self.extensions.remove(module_id);
        self.extension_points.remove(module_id);
    }
}

impl CapabilityRegistry for InMemoryCapabilityRegistry {
    fn extensions(&self, module_id: &str) -> Vec<Extension> {
        self.extensions.get(module_id).cloned().unwrap_or_default()
    }

    fn extension_points(&self, module_id: &str) -> Vec<ExtensionPoint> {
        self.extension_points
            .get(module_id)
            .cloned()
            .unwrap_or_default()
    }

    fn extension_point(&self, module_id: &str, simple_id: &str) -> Option<ExtensionPoint> {
        self.extension_points
            .get(module_id)?
            .iter()
            .find(|point| point.simple_id() == simple_id)
            .cloned()
    }
}
