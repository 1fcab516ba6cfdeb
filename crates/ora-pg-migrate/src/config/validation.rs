//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

const SSL_MODES: &[&str] = &["disable", "prefer", "require", "verify-ca", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.driver.is_empty() {
        return Err(MigrateError::Config("source.driver is required".into()));
    }
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.service_name.is_empty() {
        return Err(MigrateError::Config(
            "source.service_name is required".into(),
        ));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if matches!(config.source.schema.as_deref(), Some("")) {
        return Err(MigrateError::Config(
            "source.schema cannot be empty (omit it to use the login schema)".into(),
        ));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }
    if !SSL_MODES.contains(&config.target.ssl_mode.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "target.ssl_mode must be one of {}, got '{}'",
            SSL_MODES.join(", "),
            config.target.ssl_mode
        )));
    }
    if config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    if config.migration.tx_batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.tx_batch_size must be at least 1".into(),
        ));
    }

    Ok(())
}
