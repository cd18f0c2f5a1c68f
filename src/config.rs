//! Configuration types and builders for pg-upsert-replicator.
//!
//! Files are TOML by default; a `.json` extension selects JSON, which also
//! covers the camelCase keys (`leaderDSN`, `replicationMode`, ...) of older
//! deployments.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Main configuration for a replication run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReplicationConfig {
    /// Source database, read only
    #[serde(alias = "leaderDSN")]
    #[validate(nested)]
    pub leader: PostgresConfig,

    /// Destination database
    #[serde(alias = "followerDSN")]
    #[validate(nested)]
    pub follower: PostgresConfig,

    /// Run loop behaviour
    #[serde(default)]
    #[validate(nested)]
    pub run: RunConfig,

    /// Synchronizer behaviour
    #[serde(default)]
    #[validate(nested)]
    pub sync: SyncSettings,

    /// Tables to replicate, in order
    #[validate(nested)]
    pub tables: Vec<TableSyncConfig>,

    /// Where cycle progress is persisted
    #[serde(default)]
    #[validate(nested)]
    pub progress: ProgressConfig,

    /// Connection retry configuration
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,
}

impl ReplicationConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ReplicationConfigBuilder {
        ReplicationConfigBuilder::default()
    }

    /// Load configuration from a TOML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
        .map_err(|e| match e {
            Error::Config { message, source } => Error::Config {
                message: format!("Failed to parse {}: {}", path.display(), message),
                source,
            },
            other => other,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without validating.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::config_with_source(format!("Invalid TOML: {}", e.message()), e))
    }

    /// Parse JSON without validating.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::config_with_source(format!("Invalid JSON: {}", e), e))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|e| Error::validation(format!("Config validation failed: {}", e)))?;

        if self.tables.is_empty() {
            return Err(Error::validation("At least one table must be configured"));
        }
        if self.progress.backend == ProgressBackend::File && self.progress.path.is_none() {
            return Err(Error::validation("File progress backend requires a path"));
        }
        Ok(())
    }

    /// Commented sample configuration, as written by `init`.
    pub fn sample_toml() -> &'static str {
        SAMPLE_CONFIG
    }
}

/// PostgreSQL connection configuration.
///
/// Deserializes from a bare connection string or a table.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(from = "PostgresConfigRepr")]
pub struct PostgresConfig {
    /// Connection URL or key/value connection string
    #[validate(length(min = 1))]
    pub url: String,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Accept self-signed or otherwise invalid server certificates
    pub accept_invalid_certs: bool,
}

impl PostgresConfig {
    /// Configuration for a connection string with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout_secs: default_timeout_secs(),
            accept_invalid_certs: false,
        }
    }

    /// Connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PostgresConfigRepr {
    Url(String),
    Full {
        url: String,
        #[serde(default = "default_timeout_secs")]
        connect_timeout_secs: u64,
        #[serde(default)]
        accept_invalid_certs: bool,
    },
}

impl From<PostgresConfigRepr> for PostgresConfig {
    fn from(repr: PostgresConfigRepr) -> Self {
        match repr {
            PostgresConfigRepr::Url(url) => Self::new(url),
            PostgresConfigRepr::Full {
                url,
                connect_timeout_secs,
                accept_invalid_certs,
            } => Self {
                url,
                connect_timeout_secs,
                accept_invalid_certs,
            },
        }
    }
}

/// Run loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    /// Pause between cycles, in (fractional) seconds
    #[validate(range(min = 0.0))]
    #[serde(alias = "iterationSleepInterval", default = "default_sleep_interval")]
    pub iteration_sleep_interval: f64,

    /// Stop after the first cycle that applied no rows
    #[serde(alias = "exitOnCompletion", default)]
    pub exit_on_completion: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iteration_sleep_interval: default_sleep_interval(),
            exit_on_completion: false,
        }
    }
}

impl RunConfig {
    /// Pause between cycles.
    pub fn sleep_interval(&self) -> Result<Duration> {
        seconds("iteration_sleep_interval", self.iteration_sleep_interval)
    }
}

/// Synchronizer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SyncSettings {
    /// Overlap subtracted from the watermark to absorb clock drift
    #[validate(range(min = 0.0))]
    #[serde(alias = "clockSynchronizationMarginSeconds", default)]
    pub clock_synchronization_margin_seconds: f64,
}

impl SyncSettings {
    /// Clock synchronization margin.
    pub fn clock_margin(&self) -> Result<Duration> {
        seconds(
            "clock_synchronization_margin_seconds",
            self.clock_synchronization_margin_seconds,
        )
    }
}

/// How conflicts with rows already on the follower are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicationMode {
    /// `ON CONFLICT (id) DO UPDATE`
    #[default]
    #[serde(alias = "")]
    Upsert,
    /// `ON CONFLICT DO NOTHING`
    Insert,
    /// Append-only: copy ids above the follower's current maximum
    InsertSerial,
}

impl std::fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationMode::Upsert => write!(f, "upsert"),
            ReplicationMode::Insert => write!(f, "insert"),
            ReplicationMode::InsertSerial => write!(f, "insert-serial"),
        }
    }
}

/// Per-table replication settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TableSyncConfig {
    /// Table name, optionally schema-qualified
    #[validate(length(min = 1))]
    pub name: String,

    /// Replication mode
    #[serde(alias = "replicationMode", default)]
    pub replication_mode: ReplicationMode,

    /// Monotonic integer id column
    #[validate(length(min = 1))]
    #[serde(alias = "idColumn", default = "default_id_column")]
    pub id_column: String,

    /// Row creation timestamp column
    #[validate(length(min = 1))]
    #[serde(alias = "createdAtColumn", default = "default_created_at_column")]
    pub created_at_column: String,

    /// Row modification timestamp column
    #[validate(length(min = 1))]
    #[serde(alias = "updatedAtColumn", default = "default_updated_at_column")]
    pub updated_at_column: String,

    /// Rows created longer ago than this are never rescanned (0 = rescan all)
    #[validate(range(min = 0.0))]
    #[serde(alias = "maxRecordAgeSeconds", default)]
    pub max_record_age_seconds: f64,
}

impl TableSyncConfig {
    /// Upsert configuration with default column names.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replication_mode: ReplicationMode::default(),
            id_column: default_id_column(),
            created_at_column: default_created_at_column(),
            updated_at_column: default_updated_at_column(),
            max_record_age_seconds: 0.0,
        }
    }

    /// Create a builder.
    pub fn builder() -> TableSyncConfigBuilder {
        TableSyncConfigBuilder::default()
    }

    /// Maximum record age, `None` when age partitioning is off.
    pub fn max_record_age(&self) -> Result<Option<Duration>> {
        if self.max_record_age_seconds == 0.0 {
            return Ok(None);
        }
        seconds("max_record_age_seconds", self.max_record_age_seconds).map(Some)
    }
}

/// Builder for TableSyncConfig.
#[derive(Debug, Default)]
pub struct TableSyncConfigBuilder {
    name: Option<String>,
    replication_mode: ReplicationMode,
    id_column: Option<String>,
    created_at_column: Option<String>,
    updated_at_column: Option<String>,
    max_record_age_seconds: f64,
}

impl TableSyncConfigBuilder {
    /// Set table name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set replication mode.
    pub fn replication_mode(mut self, mode: ReplicationMode) -> Self {
        self.replication_mode = mode;
        self
    }

    /// Set id column.
    pub fn id_column(mut self, col: impl Into<String>) -> Self {
        self.id_column = Some(col.into());
        self
    }

    /// Set creation timestamp column.
    pub fn created_at_column(mut self, col: impl Into<String>) -> Self {
        self.created_at_column = Some(col.into());
        self
    }

    /// Set modification timestamp column.
    pub fn updated_at_column(mut self, col: impl Into<String>) -> Self {
        self.updated_at_column = Some(col.into());
        self
    }

    /// Set maximum record age in seconds.
    pub fn max_record_age_seconds(mut self, secs: f64) -> Self {
        self.max_record_age_seconds = secs;
        self
    }

    /// Build the TableSyncConfig.
    pub fn build(self) -> Result<TableSyncConfig> {
        let name = self.name.ok_or_else(|| Error::config("table name required"))?;

        let table = TableSyncConfig {
            name,
            replication_mode: self.replication_mode,
            id_column: self.id_column.unwrap_or_else(default_id_column),
            created_at_column: self
                .created_at_column
                .unwrap_or_else(default_created_at_column),
            updated_at_column: self
                .updated_at_column
                .unwrap_or_else(default_updated_at_column),
            max_record_age_seconds: self.max_record_age_seconds,
        };

        Validate::validate(&table)
            .map_err(|e| Error::validation(format!("Table {} is invalid: {}", table.name, e)))?;
        Ok(table)
    }
}

/// Progress store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressBackend {
    /// Bookkeeping table in the follower database (default)
    #[default]
    Database,
    /// Single-line RFC 3339 timestamp file
    File,
}

/// Progress persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProgressConfig {
    /// Backend
    #[serde(default)]
    pub backend: ProgressBackend,

    /// Bookkeeping table (database backend)
    #[validate(length(min = 1))]
    #[serde(default = "default_progress_table")]
    pub table: String,

    /// Watermark file (file backend)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            backend: ProgressBackend::default(),
            table: default_progress_table(),
            path: None,
        }
    }
}

/// Retry configuration for establishing connections.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Max retry attempts
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Max backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[validate(range(min = 1.0))]
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Get initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Get max backoff duration.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Builder for ReplicationConfig.
#[derive(Debug, Default)]
pub struct ReplicationConfigBuilder {
    leader_url: Option<String>,
    follower_url: Option<String>,
    accept_invalid_certs: bool,
    iteration_sleep_interval: Option<f64>,
    exit_on_completion: bool,
    clock_margin_seconds: f64,
    tables: Vec<TableSyncConfig>,
    progress: ProgressConfig,
    max_retries: Option<u32>,
}

impl ReplicationConfigBuilder {
    /// Set leader connection URL.
    pub fn leader_url(mut self, url: impl Into<String>) -> Self {
        self.leader_url = Some(url.into());
        self
    }

    /// Set follower connection URL.
    pub fn follower_url(mut self, url: impl Into<String>) -> Self {
        self.follower_url = Some(url.into());
        self
    }

    /// Accept invalid certificates on both connections.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Set pause between cycles in seconds.
    pub fn iteration_sleep_interval(mut self, secs: f64) -> Self {
        self.iteration_sleep_interval = Some(secs);
        self
    }

    /// Stop after the first idle cycle.
    pub fn exit_on_completion(mut self, exit: bool) -> Self {
        self.exit_on_completion = exit;
        self
    }

    /// Set clock synchronization margin in seconds.
    pub fn clock_margin_seconds(mut self, secs: f64) -> Self {
        self.clock_margin_seconds = secs;
        self
    }

    /// Add a table.
    pub fn table(mut self, table: TableSyncConfig) -> Self {
        self.tables.push(table);
        self
    }

    /// Persist progress in a timestamp file.
    pub fn progress_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.progress.backend = ProgressBackend::File;
        self.progress.path = Some(path.into());
        self
    }

    /// Persist progress in a follower table.
    pub fn progress_table(mut self, table: impl Into<String>) -> Self {
        self.progress.backend = ProgressBackend::Database;
        self.progress.table = table.into();
        self
    }

    /// Set max connection retry attempts.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Build the ReplicationConfig.
    pub fn build(self) -> Result<ReplicationConfig> {
        let leader = self
            .leader_url
            .ok_or_else(|| Error::config("leader_url required"))?;
        let follower = self
            .follower_url
            .ok_or_else(|| Error::config("follower_url required"))?;
        for url in [&leader, &follower] {
            Url::parse(url)
                .map_err(|e| Error::config(format!("Invalid PostgreSQL URL: {}", e)))?;
        }

        let connection = |url: String| PostgresConfig {
            accept_invalid_certs: self.accept_invalid_certs,
            ..PostgresConfig::new(url)
        };

        let config = ReplicationConfig {
            leader: connection(leader),
            follower: connection(follower),
            run: RunConfig {
                iteration_sleep_interval: self
                    .iteration_sleep_interval
                    .unwrap_or_else(default_sleep_interval),
                exit_on_completion: self.exit_on_completion,
            },
            sync: SyncSettings {
                clock_synchronization_margin_seconds: self.clock_margin_seconds,
            },
            tables: self.tables,
            progress: self.progress,
            retry: RetryConfig {
                max_retries: self.max_retries.unwrap_or_else(default_max_retries),
                ..Default::default()
            },
        };

        config.validate()?;
        Ok(config)
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::config_with_source(format!("{} out of range: {}", field, secs), e))
}

// Defaults
fn default_timeout_secs() -> u64 {
    30
}
fn default_sleep_interval() -> f64 {
    10.0
}
fn default_id_column() -> String {
    "id".into()
}
fn default_created_at_column() -> String {
    "created_at".into()
}
fn default_updated_at_column() -> String {
    "updated_at".into()
}
fn default_progress_table() -> String {
    "unprivileged_replication_sync_records".into()
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    60000
}
fn default_multiplier() -> f64 {
    2.0
}

const SAMPLE_CONFIG: &str = r#"# pg-upsert-replicator configuration

# Connection strings. A table form is accepted too:
#   [leader]
#   url = "postgres://..."
#   connect_timeout_secs = 30
#   accept_invalid_certs = false
leader = "postgres://replicator@leader.example.com:5432/app"
follower = "postgres://replicator@follower.example.com:5432/app"

[run]
# Pause between cycles, in seconds (fractions allowed)
iteration_sleep_interval = 10.0
# Stop after the first cycle that applied no rows
exit_on_completion = false

[sync]
# Rows updated this long before the previous cycle started are rescanned
clock_synchronization_margin_seconds = 5.0

[progress]
# "database" keeps a bookkeeping table in the follower, "file" a timestamp file
backend = "database"
table = "unprivileged_replication_sync_records"
# path = "/var/lib/pg-upsert-replicator/last_sync"

[retry]
max_retries = 3
initial_backoff_ms = 1000
max_backoff_ms = 60000
multiplier = 2.0

# One block per table, synced in this order.
# replication_mode: "upsert" (default), "insert" or "insert-serial"
[[tables]]
name = "public.accounts"
replication_mode = "upsert"
id_column = "id"
created_at_column = "created_at"
updated_at_column = "updated_at"
max_record_age_seconds = 0

[[tables]]
name = "public.events"
replication_mode = "insert-serial"
"#;
