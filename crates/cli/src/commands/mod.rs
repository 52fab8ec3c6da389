//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

use std::path::Path;

use contracts::IngestBlueprint;
use ingestion::AdapterRegistry;

use crate::error::{CliError, Result};

/// Load and validate the config file
fn load_blueprint(path: &Path) -> Result<IngestBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    Ok(config_loader::ConfigLoader::load_from_path(path)?)
}

/// Build every enabled source's adapter once, collecting the failures
///
/// Catches unknown source types and unset credential variables before the
/// scheduler would degrade those sources at runtime.
fn check_sources(blueprint: &IngestBlueprint, registry: &AdapterRegistry) -> Vec<String> {
    blueprint
        .enabled_sources()
        .filter_map(|source| registry.build(source).err())
        .map(|e| e.to_string())
        .collect()
}
