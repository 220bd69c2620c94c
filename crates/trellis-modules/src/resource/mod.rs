//! Resource path expansion for lookups inside a module.
//!
//! A resource path may start with one of the variable segments `$os$`,
//! `$ws$`, `$arch$` or `$nl$`. Each expands into platform-specific
//! directories, most specific first, followed by the path without the
//! variable:
//!
//! ```text
//! $os$/lib/native.so  ->  os/linux/x86_64/lib/native.so
//!                         os/linux/lib/native.so
//!                         lib/native.so
//! ```

use std::env;

/// Variable segment expanding to the operating system directories.
pub const OS_VARIABLE: &str = "$os$";
/// Variable segment expanding to the windowing system directory.
pub const WS_VARIABLE: &str = "$ws$";
/// Variable segment expanding to the architecture directory.
pub const ARCH_VARIABLE: &str = "$arch$";
/// Variable segment expanding to the locale directories.
pub const NL_VARIABLE: &str = "$nl$";

/// Values substituted for variable segments.
///
/// Defaults to the running operating system and architecture with no
/// windowing system or locale.
///
/// # Example
///
/// ```
/// use trellis_modules::PathVariables;
///
/// let variables = PathVariables::new().with_os("win32").with_nl("de_CH");
/// assert_eq!(variables.os(), "win32");
/// assert_eq!(variables.nl(), Some("de_CH"));
/// assert!(variables.ws().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathVariables {
    os: String,
    arch: String,
    ws: Option<String>,
    nl: Option<String>,
}

impl Default for PathVariables {
    fn default() -> Self {
        Self {
            os: env::consts::OS.to_owned(),
            arch: env::consts::ARCH.to_owned(),
            ws: None,
            nl: None,
        }
    }
}

impl PathVariables {
    /// Creates variables for the running platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the operating system.
    #[must_use]
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Overrides the architecture.
    #[must_use]
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Sets the windowing system.
    #[must_use]
    pub fn with_ws(mut self, ws: impl Into<String>) -> Self {
        self.ws = Some(ws.into());
        self
    }

    /// Sets the locale, as `language` or `language_COUNTRY`.
    #[must_use]
    pub fn with_nl(mut self, nl: impl Into<String>) -> Self {
        self.nl = Some(nl.into());
        self
    }

    /// Returns the operating system.
    #[must_use]
    pub const fn os(&self) -> &str {
        self.os.as_str()
    }

    /// Returns the architecture.
    #[must_use]
    pub const fn arch(&self) -> &str {
        self.arch.as_str()
    }

    /// Returns the windowing system, if set.
    #[must_use]
    pub fn ws(&self) -> Option<&str> {
        self.ws.as_deref()
    }

    /// Returns the locale, if set.
    #[must_use]
    pub fn nl(&self) -> Option<&str> {
        self.nl.as_deref()
    }
}

/// Expands a resource path into the paths to try, in order.
///
/// Leading slashes are ignored. An empty path yields no candidates.
#[must_use]
pub fn candidate_paths(path: &str, variables: &PathVariables) -> Vec<String> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    let (first, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));

    let prefixes: Vec<Vec<&str>> = match first {
        OS_VARIABLE => vec![
            vec!["os", variables.os(), variables.arch()],
            vec!["os", variables.os()],
        ],
        WS_VARIABLE => variables
            .ws()
            .map(|ws| vec!["ws", ws])
            .into_iter()
            .collect(),
        ARCH_VARIABLE => vec![vec!["arch", variables.arch()]],
        NL_VARIABLE => locale_prefixes(variables.nl()),
        _ => return vec![trimmed.to_owned()],
    };

    prefixes
        .into_iter()
        .map(|prefix| join(prefix, rest))
        .chain(std::iter::once(rest.to_owned()))
        .filter(|candidate| !candidate.is_empty())
        .collect()
}

fn locale_prefixes(nl: Option<&str>) -> Vec<Vec<&str>> {
    let Some(locale) = nl.filter(|locale| !locale.is_empty()) else {
        return Vec::new();
    };
    match locale.split_once('_') {
        Some((language, country)) if !country.is_empty() => {
            vec![vec!["nl", language, country], vec!["nl", language]]
        }
        Some((language, _)) => vec![vec!["nl", language]],
        None => vec![vec!["nl", locale]],
    }
}

fn join<'a>(mut segments: Vec<&'a str>, rest: &'a str) -> String {
    if !rest.is_empty() {
        segments.push(rest);
    }
    segments.join("/")
}
