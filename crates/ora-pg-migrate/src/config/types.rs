//! Configuration type definitions.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::SqlValue;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (Oracle over ODBC).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Ordered migration steps. Parents and their sequences come first.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Source database (Oracle) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// ODBC driver name as registered with the driver manager.
    pub driver: String,

    /// Database host.
    pub host: String,

    /// Listener port (default: 1521).
    #[serde(default = "default_oracle_port")]
    pub port: u16,

    /// Service name.
    pub service_name: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Owning schema of the migrated objects. Defaults to the login user's.
    #[serde(default)]
    pub schema: Option<String>,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("service_name", &self.service_name)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Connection pool size (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per bulk insert / transaction (default: 1000).
    #[serde(default = "default_tx_batch_size")]
    pub tx_batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            tx_batch_size: default_tx_batch_size(),
        }
    }
}

/// One step of the migration, as written in YAML.
///
/// ```yaml
/// steps:
///   - table: partners
///   - sequence: seq_partner
///   - table:
///       source: subscribers
///       target: subscriber_billings
///       rename: { user_type: prepaid }
///       convert: { user_type: zero_is_true }
///   - sequence: { source: seq_roaming_history, target: seq_subscriber_roaming_interval }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepConfig {
    Table(TableStepConfig),
    Sequence(SequenceStepConfig),
}

/// Table step. A bare string is shorthand for a same-named plain copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TableStepRepr")]
pub struct TableStepConfig {
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Literal values written to every row.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub required: IndexMap<String, SqlValue>,

    /// Source column -> target column.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub rename: IndexMap<String, String>,

    /// Source column -> converter name.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub convert: IndexMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableStepRepr {
    Name(String),
    Full {
        source: String,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        required: IndexMap<String, SqlValue>,
        #[serde(default)]
        rename: IndexMap<String, String>,
        #[serde(default)]
        convert: IndexMap<String, String>,
    },
}

impl From<TableStepRepr> for TableStepConfig {
    fn from(repr: TableStepRepr) -> Self {
        match repr {
            TableStepRepr::Name(source) => TableStepConfig {
                source,
                target: None,
                required: IndexMap::new(),
                rename: IndexMap::new(),
                convert: IndexMap::new(),
            },
            TableStepRepr::Full {
                source,
                target,
                required,
                rename,
                convert,
            } => TableStepConfig {
                source,
                target,
                required,
                rename,
                convert,
            },
        }
    }
}

/// Sequence step. A bare string is shorthand for a same-named carry-over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "SequenceStepRepr")]
pub struct SequenceStepConfig {
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SequenceStepRepr {
    Name(String),
    Full {
        source: String,
        #[serde(default)]
        target: Option<String>,
    },
}

impl From<SequenceStepRepr> for SequenceStepConfig {
    fn from(repr: SequenceStepRepr) -> Self {
        match repr {
            SequenceStepRepr::Name(source) => SequenceStepConfig {
                source,
                target: None,
            },
            SequenceStepRepr::Full { source, target } => SequenceStepConfig { source, target },
        }
    }
}

fn default_oracle_port() -> u16 {
    1521
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_max_connections() -> usize {
    2
}

fn default_tx_batch_size() -> usize {
    1000
}
