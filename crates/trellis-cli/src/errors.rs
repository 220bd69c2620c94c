//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use trellis_config::ConfigError;
use trellis_modules::{ModuleSetError, RegistrationError};

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to register built-in entry types: {0}")]
    EntryTypes(#[from] RegistrationError),
    #[error(transparent)]
    ModuleSet(#[from] ModuleSetError),
    #[error("failed to serialise report: {0}")]
    SerialiseReport(serde_json::Error),
    #[error("failed to write report: {0}")]
    WriteReport(io::Error),
}
