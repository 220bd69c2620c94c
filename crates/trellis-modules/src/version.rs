//! Module version parsing.
//!
//! Module metadata carries versions in the dotted `major.minor.service.qualifier`
//! form, where trailing numeric components may be omitted. [`ModuleVersion`]
//! normalises the numeric part into a [`semver::Version`], keeps the
//! qualifier verbatim and renders both back in the dotted form.

use std::fmt;
use std::str::FromStr;

use semver::Version;
use thiserror::Error;
use tracing::debug;

/// Tracing target for version parsing.
const VERSION_TARGET: &str = "trellis_modules::version";

/// Version assumed when a module declares none or an unparsable one.
pub const FALLBACK_VERSION: Version = Version::new(1, 0, 0);

/// Error raised when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid module version '{text}': {reason}")]
pub struct VersionError {
    text: String,
    reason: &'static str,
}

impl VersionError {
    fn new(text: &str, reason: &'static str) -> Self {
        Self {
            text: text.to_owned(),
            reason,
        }
    }
}

/// Structured module version.
///
/// # Example
///
/// ```
/// use trellis_modules::ModuleVersion;
///
/// let version: ModuleVersion = "2.1".parse().expect("valid version");
/// assert_eq!(version.to_string(), "2.1.0");
///
/// let fallback = ModuleVersion::parse_or_fallback(Some("not-a-version"));
/// assert_eq!(fallback.to_string(), "1.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleVersion {
    version: Version,
    qualifier: Option<String>,
}

impl ModuleVersion {
    /// Parses a dotted module version.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] when a numeric component is missing or not a
    /// number, or when the qualifier is empty or contains characters outside
    /// `[0-9A-Za-z_-]`.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(VersionError::new(text, "version is empty"));
        }

        let mut parts = trimmed.splitn(4, '.');
        let major = parse_component(text, parts.next())?.unwrap_or(0);
        let minor = parse_component(text, parts.next())?.unwrap_or(0);
        let patch = parse_component(text, parts.next())?.unwrap_or(0);

        let qualifier = parts
            .next()
            .map(|qualifier| validate_qualifier(text, qualifier))
            .transpose()?;
        Ok(Self {
            version: Version::new(major, minor, patch),
            qualifier,
        })
    }

    /// Parses a declared version, falling back to `1.0.0` when it is absent
    /// or malformed.
    #[must_use]
    pub fn parse_or_fallback(text: Option<&str>) -> Self {
        match text.map(Self::parse) {
            Some(Ok(version)) => version,
            Some(Err(error)) => {
                debug!(target: VERSION_TARGET, %error, "using fallback module version");
                Self::fallback()
            }
            None => Self::fallback(),
        }
    }

    /// Returns the `1.0.0` fallback version.
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            version: FALLBACK_VERSION,
            qualifier: None,
        }
    }

    /// Returns the major component.
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.version.major
    }

    /// Returns the minor component.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.version.minor
    }

    /// Returns the service (patch) component.
    #[must_use]
    pub const fn service(&self) -> u64 {
        self.version.patch
    }

    /// Returns the qualifier, when one was declared.
    #[must_use]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Returns the numeric components as a semantic version.
    #[must_use]
    pub const fn as_semver(&self) -> &Version {
        &self.version
    }
}

fn parse_component(text: &str, component: Option<&str>) -> Result<Option<u64>, VersionError> {
    let Some(component) = component else {
        return Ok(None);
    };
    if component.is_empty() || !component.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(VersionError::new(text, "numeric component expected"));
    }
    component
        .parse::<u64>()
        .map(Some)
        .map_err(|_| VersionError::new(text, "numeric component out of range"))
}

fn validate_qualifier(text: &str, qualifier: &str) -> Result<String, VersionError> {
    let valid = !qualifier.is_empty()
        && qualifier
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-');
    if !valid {
        return Err(VersionError::new(
            text,
            "qualifier must be non-empty and use only [0-9A-Za-z_-]",
        ));
    }
    Ok(qualifier.to_owned())
}

impl Default for ModuleVersion {
    fn default() -> Self {
        Self::fallback()
    }
}

impl FromStr for ModuleVersion {
    type Err = VersionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.service())?;
        match self.qualifier() {
            Some(qualifier) => write!(f, ".{qualifier}"),
            None => Ok(()),
        }
    }
}

impl From<Version> for ModuleVersion {
    fn from(version: Version) -> Self {
        let build = version.build.as_str();
        let qualifier = (!build.is_empty()).then(|| build.to_owned());
        Self {
            version: Version::new(version.major, version.minor, version.patch),
            qualifier,
        }
    }
}
