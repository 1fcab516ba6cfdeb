//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use crate::plan::{ConverterRegistry, MigrationStep, SequenceMigrationSpec, TableMigrationSpec};
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, reported with each run.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Build the migration steps, resolving converters in `registry`.
    pub fn build_steps(&self, registry: &ConverterRegistry) -> Result<Vec<MigrationStep>> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let built = step.build(registry).and_then(|s| {
                    s.validate()?;
                    Ok(s)
                });
                built.map_err(|e| match e {
                    MigrateError::Config(msg) => {
                        MigrateError::Config(format!("steps[{}]: {}", i, msg))
                    }
                    other => other,
                })
            })
            .collect()
    }
}

impl StepConfig {
    fn build(&self, registry: &ConverterRegistry) -> Result<MigrationStep> {
        match self {
            StepConfig::Table(t) => {
                let mut spec = TableMigrationSpec::new(&t.source);
                if let Some(target) = &t.target {
                    spec = spec.into_table(target);
                }
                for (column, value) in &t.required {
                    spec = spec.require(column, value.clone());
                }
                for (from, to) in &t.rename {
                    spec = spec.rename(from, to);
                }
                for (column, name) in &t.convert {
                    let converter = registry.get(name).ok_or_else(|| {
                        MigrateError::Config(format!(
                            "unknown converter '{}' for column {} (available: {})",
                            name,
                            column,
                            registry.names().collect::<Vec<_>>().join(", ")
                        ))
                    })?;
                    spec = spec.convert(column, converter);
                }
                Ok(spec.into())
            }
            StepConfig::Sequence(s) => {
                let mut spec = SequenceMigrationSpec::new(&s.source);
                if let Some(target) = &s.target {
                    spec = spec.into_sequence(target);
                }
                Ok(spec.into())
            }
        }
    }
}

impl SourceConfig {
    /// Build an ODBC connection string for the Oracle driver.
    pub fn connection_string(&self) -> String {
        format!(
            "Driver={{{}}};DBQ=//{}:{}/{};UID={};PWD={};",
            self.driver, self.host, self.port, self.service_name, self.user, self.password
        )
    }
}
