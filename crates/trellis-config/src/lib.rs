//! Layered configuration for the Trellis command-line tool.
//!
//! Values are merged from defaults, a configuration file, `TRELLIS_*`
//! environment variables and command-line flags, later layers winning. The
//! loader is derived with `ortho_config`, so `--config-path` (or
//! `TRELLIS_CONFIG_PATH`) selects an explicit file.

mod defaults;
mod logging;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, default_log_filter, default_log_filter_string, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration shared by every `trellis` command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TRELLIS")]
pub struct Config {
    /// `tracing` filter directive applied to diagnostics.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format for diagnostics.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Module set document used when a command names none.
    #[serde(default)]
    pub module_set: Option<Utf8PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            module_set: None,
        }
    }
}

impl Config {
    /// Returns the configured log filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the configured module set document, if any.
    #[must_use]
    pub fn module_set(&self) -> Option<&Utf8PathBuf> {
        self.module_set.as_ref()
    }

    /// Picks the module set document for a command.
    ///
    /// An explicit path wins over the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingModuleSet`] when neither is present.
    pub fn resolve_module_set(
        &self,
        explicit: Option<Utf8PathBuf>,
    ) -> Result<Utf8PathBuf, ConfigError> {
        explicit
            .or_else(|| self.module_set.clone())
            .ok_or(ConfigError::MissingModuleSet)
    }
}

/// Errors raised while interpreting loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No module set document was named on the command line or configured.
    #[error(
        "no module set document given; pass one on the command line or set TRELLIS_MODULE_SET"
    )]
    MissingModuleSet,
}
