//! Error types for pg-upsert-replicator.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Which side of a replication cycle a commit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Source database, read only
    Leader,
    /// Destination database, written by the synchronizer
    Follower,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Leader => write!(f, "leader"),
            Side::Follower => write!(f, "follower"),
        }
    }
}

/// Main error type for pg-upsert-replicator operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
        /// Source error if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// PostgreSQL connection error
    #[error("PostgreSQL connection error: {message}")]
    PostgresConnection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// PostgreSQL query error
    #[error("PostgreSQL query error on table '{table}': {message}")]
    PostgresQuery {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// Commit of a cycle transaction failed
    #[error("Failed to commit {side} transaction")]
    Commit {
        /// Which transaction failed
        side: Side,
        /// Source error
        #[source]
        source: tokio_postgres::Error,
    },

    /// No codec exists for this type/nullability/array combination
    #[error(
        "Unsupported column kind for '{column}': type '{data_type}' (nullable: {nullable}, array: {array})"
    )]
    UnsupportedColumnKind {
        /// Column name
        column: String,
        /// Declared type as reported by the catalog
        data_type: String,
        /// Whether the column is nullable
        nullable: bool,
        /// Whether the column is an array
        array: bool,
    },

    /// Requested insert or conflict column is absent from the table
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },

    /// Conflict column and no-conflict were both requested
    #[error("Conflict column and no-conflict are mutually exclusive")]
    MutuallyExclusiveOptions,

    /// A column was rendered before a row was scanned into it
    #[error("Column '{0}' holds no scanned value")]
    UnscannedColumn(String),

    /// An object was used out of its lifecycle order
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a PostgreSQL connection error without a driver error.
    pub fn postgres_connection(message: impl Into<String>) -> Self {
        Self::PostgresConnection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a PostgreSQL connection error with tokio_postgres::Error.
    pub fn postgres_connection_pg(
        message: impl Into<String>,
        source: tokio_postgres::Error,
    ) -> Self {
        Self::PostgresConnection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a PostgreSQL query error.
    pub fn postgres_query(
        table: impl Into<String>,
        message: impl Into<String>,
        source: tokio_postgres::Error,
    ) -> Self {
        Self::PostgresQuery {
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an unknown column error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a serialization error with source.
    pub fn serialization(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only failures to establish a connection qualify. Anything that happens
    /// inside a replication cycle is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PostgresConnection { source: Some(_), .. })
    }

    /// Get the error code for metrics/logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::PostgresConnection { .. } => "PG_CONNECTION_ERROR",
            Error::PostgresQuery { .. } => "PG_QUERY_ERROR",
            Error::Commit { .. } => "COMMIT_ERROR",
            Error::UnsupportedColumnKind { .. } => "UNSUPPORTED_COLUMN_KIND",
            Error::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            Error::MutuallyExclusiveOptions => "MUTUALLY_EXCLUSIVE_OPTIONS",
            Error::UnscannedColumn(_) => "UNSCANNED_COLUMN",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Serialization { .. } => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}
