//! Entry types built into the CLI and visible to every module.

use std::any::Any;

use tracing::info;
use trellis_modules::{
    BoxError, EntryObject, EntryType, EntryTypeRegistry, ModuleDescriptor, RegistrationError,
};

/// Tracing target for entry objects created by the CLI.
const ENTRY_TARGET: &str = "trellis_cli::entry";

/// Entry type that logs the module it was created for.
pub(crate) const TRACING_ENTRY: &str = "trellis.cli.TracingEntry";

/// Entry type whose construction always fails.
pub(crate) const FAILING_ENTRY: &str = "trellis.cli.FailingEntry";

/// Entry object recording the module and version it was created for.
#[derive(Debug)]
pub(crate) struct TracingEntry {
    module: String,
}

impl EntryObject for TracingEntry {
    fn module_id(&self) -> &str {
        &self.module
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn create_tracing_entry(descriptor: &ModuleDescriptor) -> Result<TracingEntry, BoxError> {
    info!(
        target: ENTRY_TARGET,
        module = descriptor.id(),
        version = %descriptor.version(),
        "module entry created"
    );
    Ok(TracingEntry {
        module: descriptor.id().to_owned(),
    })
}

fn refuse_entry(descriptor: &ModuleDescriptor) -> Result<TracingEntry, BoxError> {
    Err(format!("{FAILING_ENTRY} refuses to start '{}'", descriptor.id()).into())
}

/// Returns a registry holding the built-in system entry types.
pub(crate) fn system_types() -> Result<EntryTypeRegistry, RegistrationError> {
    let mut types = EntryTypeRegistry::new();
    types.register_system(EntryType::new(TRACING_ENTRY, create_tracing_entry))?;
    types.register_system(EntryType::new(FAILING_ENTRY, refuse_entry))?;
    Ok(types)
}
