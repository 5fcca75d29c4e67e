//! Check command handler

use super::{engine, Engine};
use crate::cli::CheckArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::{CheckEntry, OutputWriter};
use fhirmap_core::{Direction, MappingConfiguration};
use tracing::{debug, instrument};

/// Handle the check command
#[instrument(skip_all)]
pub async fn handle_check(args: CheckArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let engine = engine(config, args.store.store.as_deref())?;
    let entries = check_store(&engine, args.mapping.as_deref()).await?;
    output.check(&entries)?;

    let count = entries.iter().filter(|entry| !entry.valid).count();
    if count > 0 {
        return Err(Error::InvalidMappings { count });
    }
    Ok(())
}

async fn check_store(engine: &Engine, only: Option<&str>) -> Result<Vec<CheckEntry>> {
    let mappings: Vec<MappingConfiguration> = match only {
        Some(identifier) => {
            let found = engine
                .store
                .document()
                .mappings
                .into_iter()
                .find(|config| config.is_identified_by(identifier));
            match found {
                Some(config) => vec![config],
                None => {
                    return Err(fhirmap_core::Error::ConfigNotFound {
                        identifier: identifier.to_string(),
                    }
                    .into())
                }
            }
        }
        None => engine.store.document().mappings,
    };

    let mut entries = Vec::with_capacity(mappings.len());
    for config in mappings {
        debug!(mapping = %config.name, "checking mapping");
        entries.push(check_one(engine, &config.name, config.direction).await?);
    }
    Ok(entries)
}

async fn check_one(engine: &Engine, name: &str, direction: Direction) -> Result<CheckEntry> {
    let mut entry = CheckEntry {
        mapping: name.to_string(),
        direction,
        valid: true,
        problems: Vec::new(),
        warnings: Vec::new(),
    };
    match engine.factory.prepare(name).await {
        Ok(prepared) => entry.warnings = prepared.warnings,
        Err(fhirmap_core::Error::InvalidMapping { problems, .. }) => {
            entry.valid = false;
            entry.problems = problems;
        }
        Err(e) if e.is_configuration_error() => {
            entry.valid = false;
            entry.problems.push(e.to_string());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(entry)
}
