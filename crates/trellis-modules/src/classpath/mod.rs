//! Classpath header parsing and per-module class contexts.
//!
//! A module's classpath header lists the libraries that hold its types, for
//! example `alpha.jar, lib/util.jar;optional=true`. The [`ClassContext`]
//! built for a descriptor combines the host module's libraries with those of
//! every attached fragment and resolves entry type names against them.
//!
//! A header that cannot be parsed only removes the libraries of the module
//! that declared it; the rest of the context is still built.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ClasspathError;
use crate::factory::{EntryType, EntryTypeRegistry};
use crate::handle::ModuleHandle;

/// Tracing target for classpath operations.
const CLASSPATH_TARGET: &str = "trellis_modules::classpath";

/// Classpath entry assumed when a module declares no classpath header.
pub const DEFAULT_CLASSPATH_ENTRY: &str = ".";

/// A single clause of a classpath header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClasspathClause {
    path: String,
    parameters: Vec<(String, String)>,
}

impl ClasspathClause {
    /// Returns the library path.
    #[must_use]
    pub const fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the clause parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Returns the value of a named parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Parses a classpath header into its clauses.
///
/// Clauses are separated by commas, parameters by semicolons. Values may be
/// double-quoted to protect separators. A blank header has no clauses.
///
/// # Errors
///
/// Returns a [`ClasspathError`] for empty clauses, malformed parameters or an
/// unterminated quote.
///
/// # Example
///
/// ```
/// use trellis_modules::classpath::parse_classpath_header;
///
/// let clauses = parse_classpath_header(r#"alpha.jar, "lib/a,b.jar";optional=true"#)
///     .expect("valid header");
/// assert_eq!(clauses.len(), 2);
/// assert_eq!(clauses[1].path(), "lib/a,b.jar");
/// assert_eq!(clauses[1].parameter("optional"), Some("true"));
/// ```
pub fn parse_classpath_header(header: &str) -> Result<Vec<ClasspathClause>, ClasspathError> {
    if header.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_unquoted(header, header, ',')?
        .into_iter()
        .map(|clause| parse_clause(header, clause))
        .collect()
}

fn parse_clause(header: &str, clause: &str) -> Result<ClasspathClause, ClasspathError> {
    let mut segments = split_unquoted(header, clause, ';')?.into_iter();
    let path = segments.next().map(unquote).unwrap_or_default();
    if path.is_empty() {
        return Err(ClasspathError::EmptyClause {
            header: header.to_owned(),
        });
    }

    let parameters = segments
        .map(|segment| parse_parameter(header, segment))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClasspathClause {
        path: path.to_owned(),
        parameters,
    })
}

fn parse_parameter(header: &str, segment: &str) -> Result<(String, String), ClasspathError> {
    let malformed = || ClasspathError::MalformedParameter {
        header: header.to_owned(),
        parameter: segment.trim().to_owned(),
    };
    let (raw_key, value) = segment.split_once('=').ok_or_else(malformed)?;
    // `key:=value` marks a directive; the colon is not part of the key.
    let key = raw_key.trim().trim_end_matches(':').trim();
    if key.is_empty() {
        return Err(malformed());
    }
    Ok((key.to_owned(), unquote(value).to_owned()))
}

fn unquote(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(trimmed)
}

fn split_unquoted<'a>(
    header: &str,
    input: &'a str,
    separator: char,
) -> Result<Vec<&'a str>, ClasspathError> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (index, character) in input.char_indices() {
        if character == '"' {
            in_quotes = !in_quotes;
        } else if character == separator && !in_quotes {
            parts.push(input.get(start..index).unwrap_or_default());
            start = index + separator.len_utf8();
        }
    }
    if in_quotes {
        return Err(ClasspathError::UnterminatedQuote {
            header: header.to_owned(),
        });
    }
    parts.push(input.get(start..).unwrap_or_default());

    if parts.iter().any(|part| part.trim().is_empty()) {
        return Err(ClasspathError::EmptyClause {
            header: header.to_owned(),
        });
    }
    Ok(parts)
}

/// A classpath entry together with the module that contributes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Library {
    owner: String,
    path: String,
}

impl Library {
    /// Creates a library contributed by `owner`.
    #[must_use]
    pub fn new(owner: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            path: path.into(),
        }
    }

    /// Returns the module's default library (`.`).
    #[must_use]
    pub fn module_root(owner: impl Into<String>) -> Self {
        Self::new(owner, DEFAULT_CLASSPATH_ENTRY)
    }

    /// Returns the identifier of the contributing module.
    #[must_use]
    pub const fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Returns the path declared in the classpath header.
    #[must_use]
    pub const fn path(&self) -> &str {
        self.path.as_str()
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.path)
    }
}

/// Libraries declared by one module, `.` when it declares no header.
///
/// # Errors
///
/// Returns the first [`ClasspathError`] among the module's headers.
pub fn module_libraries(module: &ModuleHandle) -> Result<Vec<Library>, ClasspathError> {
    let mut libraries = Vec::new();
    for header in module.classpath_headers() {
        for clause in parse_classpath_header(&header)? {
            libraries.push(Library::new(module.id(), clause.path()));
        }
    }
    if libraries.is_empty() {
        libraries.push(Library::module_root(module.id()));
    }
    Ok(libraries)
}

/// Type-resolution context of one module: its libraries and those of its
/// fragments, searched in order, backed by the shared entry type registry.
#[derive(Debug)]
pub struct ClassContext {
    module_id: String,
    libraries: Vec<Library>,
    types: Arc<EntryTypeRegistry>,
}

impl ClassContext {
    /// Builds the context for a host module.
    ///
    /// Contributions whose classpath header fails to parse are logged and
    /// skipped.
    #[must_use]
    pub fn build(module: &ModuleHandle, types: Arc<EntryTypeRegistry>) -> Self {
        let mut libraries = Vec::new();
        let contributors = std::iter::once(module.clone()).chain(module.fragments());
        for contributor in contributors {
            match module_libraries(&contributor) {
                Ok(contributed) => libraries.extend(contributed),
                Err(error) => warn!(
                    target: CLASSPATH_TARGET,
                    module = module.id(),
                    contributor = contributor.id(),
                    %error,
                    "skipping classpath contribution"
                ),
            }
        }
        debug!(
            target: CLASSPATH_TARGET,
            module = module.id(),
            libraries = libraries.len(),
            "created class context"
        );
        Self {
            module_id: module.id().to_owned(),
            libraries,
            types,
        }
    }

    /// Returns the identifier of the host module.
    #[must_use]
    pub const fn module_id(&self) -> &str {
        self.module_id.as_str()
    }

    /// Returns the libraries searched by this context, host first.
    #[must_use]
    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    /// Resolves a type name, searching the context's libraries in order and
    /// then the registry's system types.
    #[must_use]
    pub fn resolve(&self, type_name: &str) -> Option<EntryType> {
        self.libraries
            .iter()
            .find_map(|library| self.types.lookup(library, type_name))
            .or_else(|| self.types.lookup_system(type_name))
    }
}
