//! Module commands and the JSON line reports they emit.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use trellis_config::Config;
use trellis_modules::{
    DefaultEntry, EntryLookup, EntryObject, Extension, ExtensionPoint, LifecycleState,
    ModuleContainer, ModuleDescriptor, ModuleRuntime, ModuleSet, PathVariables, Prerequisite,
};

use crate::AppError;
use crate::cli::{CliCommand, DocumentArgs, VariableArgs};
use crate::entry_types::system_types;

/// Tracing target for CLI commands.
const COMMAND_TARGET: &str = "trellis_cli::command";

#[derive(Debug, Serialize)]
struct ModuleSummary {
    id: String,
    version: String,
    state: &'static str,
    phase: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ActivationOutcome {
    Activated,
    InProgress,
    Failed,
}

#[derive(Debug, Serialize)]
struct ActivationReport {
    module: String,
    version: String,
    outcome: ActivationOutcome,
    phase: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    id: String,
    version: String,
    versioned_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    install_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_class: Option<String>,
    state: &'static str,
    phase: &'static str,
    libraries: Vec<String>,
    prerequisites: Vec<Prerequisite>,
    extension_points: Vec<ExtensionPoint>,
    extensions: Vec<Extension>,
}

#[derive(Debug, Serialize)]
struct FindReport {
    module: String,
    path: String,
    location: Option<String>,
}

impl InspectReport {
    fn from_descriptor(descriptor: &ModuleDescriptor) -> Self {
        Self {
            id: descriptor.id().to_owned(),
            version: descriptor.version().to_string(),
            versioned_id: descriptor.to_string(),
            label: descriptor.label().map(str::to_owned),
            provider: descriptor.provider_name().map(str::to_owned),
            install_url: descriptor.install_url(),
            entry_class: descriptor.entry_class().map(str::to_owned),
            state: state_label(descriptor.handle().state()),
            phase: descriptor.phase().as_str(),
            libraries: descriptor
                .runtime_libraries()
                .iter()
                .map(ToString::to_string)
                .collect(),
            prerequisites: descriptor.prerequisites(),
            extension_points: descriptor.extension_points(),
            extensions: descriptor.extensions(),
        }
    }
}

fn state_label(state: Option<LifecycleState>) -> &'static str {
    state.map_or("unknown", LifecycleState::as_str)
}

fn write_report<W, T>(stdout: &mut W, report: &T) -> Result<(), AppError>
where
    W: Write,
    T: Serialize,
{
    serde_json::to_writer(&mut *stdout, report).map_err(AppError::SerialiseReport)?;
    stdout.write_all(b"\n").map_err(AppError::WriteReport)?;
    stdout.flush().map_err(AppError::WriteReport)
}

/// Executes a parsed command, writing its reports to `stdout`.
pub(crate) fn execute<W: Write>(
    command: CliCommand,
    config: &Config,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    match command {
        CliCommand::List(document) => {
            let runtime = load_runtime(document, config)?;
            list(&runtime, stdout)
        }
        CliCommand::Activate { modules, document } => {
            let runtime = load_runtime(document, config)?;
            activate(&runtime, modules, stdout)
        }
        CliCommand::Inspect { module, document } => {
            let runtime = load_runtime(document, config)?;
            inspect(&runtime, &module, stdout)
        }
        CliCommand::Find {
            module,
            path,
            variables,
            document,
        } => {
            let runtime = load_runtime(document, config)?;
            find(&runtime, &module, path, variables, stdout)
        }
    }
}

fn load_runtime(document: DocumentArgs, config: &Config) -> Result<ModuleRuntime, AppError> {
    let path = config.resolve_module_set(document.document)?;
    debug!(target: COMMAND_TARGET, path = %path, "loading module set");
    let set = ModuleSet::from_path(path.as_std_path())?;
    Ok(set.into_runtime(system_types()?)?)
}

fn list<W: Write>(runtime: &ModuleRuntime, stdout: &mut W) -> Result<ExitCode, AppError> {
    for id in runtime.module_ids() {
        let descriptor = runtime.descriptor(&id)?;
        let summary = ModuleSummary {
            state: state_label(runtime.container().state(&id)),
            phase: descriptor.phase().as_str(),
            version: descriptor.version().to_string(),
            id,
        };
        write_report(stdout, &summary)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn activate<W: Write>(
    runtime: &ModuleRuntime,
    requested: Vec<String>,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let modules = if requested.is_empty() {
        runtime.module_ids()
    } else {
        requested
    };

    let mut failed = false;
    for id in modules {
        let descriptor = runtime.descriptor(&id)?;
        let report = activation_report(&descriptor);
        failed |= report.outcome == ActivationOutcome::Failed;
        write_report(stdout, &report)?;
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn activation_report(descriptor: &ModuleDescriptor) -> ActivationReport {
    let (outcome, entry, error) = match descriptor.entry_object() {
        Ok(EntryLookup::Ready(entry)) => (
            ActivationOutcome::Activated,
            Some(entry_label(descriptor, &entry)),
            None,
        ),
        Ok(EntryLookup::InProgress) => (ActivationOutcome::InProgress, None, None),
        Err(error) => (ActivationOutcome::Failed, None, Some(error.to_string())),
    };
    ActivationReport {
        module: descriptor.id().to_owned(),
        version: descriptor.version().to_string(),
        outcome,
        phase: descriptor.phase().as_str(),
        entry,
        error,
    }
}

fn entry_label(descriptor: &ModuleDescriptor, entry: &Arc<dyn EntryObject>) -> String {
    if entry.is::<DefaultEntry>() {
        return String::from("default");
    }
    descriptor
        .entry_class()
        .map_or_else(|| String::from("custom"), str::to_owned)
}

fn inspect<W: Write>(
    runtime: &ModuleRuntime,
    module: &str,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let descriptor = runtime.descriptor(module)?;
    write_report(stdout, &InspectReport::from_descriptor(&descriptor))?;
    Ok(ExitCode::SUCCESS)
}

fn find<W: Write>(
    runtime: &ModuleRuntime,
    module: &str,
    path: String,
    variables: VariableArgs,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let descriptor = runtime.descriptor(module)?;
    let location = descriptor.find_with_variables(&path, &path_variables(variables));
    let found = location.is_some();
    write_report(
        stdout,
        &FindReport {
            module: descriptor.id().to_owned(),
            path,
            location,
        },
    )?;
    Ok(if found {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn path_variables(overrides: VariableArgs) -> PathVariables {
    let VariableArgs { os, arch, ws, nl } = overrides;
    let mut variables = PathVariables::new();
    if let Some(value) = os {
        variables = variables.with_os(value);
    }
    if let Some(value) = arch {
        variables = variables.with_arch(value);
    }
    if let Some(value) = ws {
        variables = variables.with_ws(value);
    }
    if let Some(value) = nl {
        variables = variables.with_nl(value);
    }
    variables
}
