//! CLI argument definitions for Trellis.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Command-line interface for activating and inspecting modules.
#[derive(Parser, Debug)]
#[command(name = "trellis", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// The command to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Commands operating on a module set document.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Lists the installed modules and their container state.
    List(DocumentArgs),
    /// Activates modules and reports the outcome for each.
    Activate {
        /// Module to activate; repeat for several. Defaults to every host
        /// module in the document.
        #[arg(long = "module", value_name = "ID")]
        modules: Vec<String>,
        /// Location of the module set document.
        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Prints a module's descriptor without activating it.
    Inspect {
        /// Identifier of the module to inspect.
        #[arg(value_name = "MODULE_ID")]
        module: String,
        /// Location of the module set document.
        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Locates a resource in a module or its fragments.
    Find {
        /// Identifier of the module to search.
        #[arg(value_name = "MODULE_ID")]
        module: String,
        /// Resource path relative to the module root; may start with `$os$`,
        /// `$ws$`, `$arch$` or `$nl$`.
        #[arg(value_name = "PATH")]
        path: String,
        /// Values for the path variables.
        #[command(flatten)]
        variables: VariableArgs,
        /// Location of the module set document.
        #[command(flatten)]
        document: DocumentArgs,
    },
}

/// Overrides for resource path variables.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct VariableArgs {
    /// Operating system; defaults to the running one.
    #[arg(long)]
    pub(crate) os: Option<String>,
    /// Architecture; defaults to the running one.
    #[arg(long)]
    pub(crate) arch: Option<String>,
    /// Windowing system.
    #[arg(long)]
    pub(crate) ws: Option<String>,
    /// Locale, as `language` or `language_COUNTRY`.
    #[arg(long)]
    pub(crate) nl: Option<String>,
}

/// Selects the module set document for a command.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct DocumentArgs {
    /// Module set document; defaults to the configured `module_set`.
    #[arg(long, value_name = "PATH")]
    pub(crate) document: Option<Utf8PathBuf>,
}
