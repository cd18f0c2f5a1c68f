//! # pg-upsert-replicator
//!
//! Incremental PostgreSQL replication for users without replication
//! privileges. Each cycle re-reads the leader rows changed since the previous
//! cycle and applies them to the follower as generated `INSERT` / `UPSERT`
//! statements.
//!
//! ## Features
//!
//! - **Statement generation**: dump any table or view as `INSERT`,
//!   `INSERT ... ON CONFLICT DO UPDATE` or `ON CONFLICT DO NOTHING` statements
//! - **Replication modes**: `upsert`, `insert` and append-only `insert-serial`
//! - **Consistent cycles**: serializable leader snapshot, repeatable-read
//!   follower transaction, leader committed first
//! - **Resumable**: progress kept in a follower table or a timestamp file
//! - **Age partitioning**: skip rescanning rows older than a configured age
//! - **Metrics**: built-in counters mirrored to the `metrics` facade
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pg_upsert_replicator::{ReplicationConfig, Synchronizer, Watermark, postgres};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReplicationConfig::from_file("replication.toml")?;
//!
//!     let leader = postgres::connect(&config.leader).await?;
//!     let follower = postgres::connect(&config.follower).await?;
//!     let mut sync = Synchronizer::new(leader, follower, config.tables, &config.sync)?;
//!
//!     let stats = sync.sync(Watermark::epoch()).await?;
//!     println!("Applied {} rows", stats.total_rows());
//!     Ok(())
//! }
//! ```
//!
//! ## Dumping a table
//!
//! ```rust,no_run
//! use pg_upsert_replicator::{DumpOptions, WriterSink, dump, postgres, PostgresConfig};
//!
//! # async fn example() -> pg_upsert_replicator::Result<()> {
//! let client = postgres::connect(&PostgresConfig::new("postgres://localhost/app")).await?;
//! let mut sink = WriterSink::new(tokio::io::stdout());
//! let opts = DumpOptions::upsert("id").with_query("WHERE updated_at > now() - interval '1 day'");
//! dump(&mut sink, &client, "public.accounts", &opts).await?;
//! sink.finish().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod dump;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod progress;
pub mod run;
pub mod schema;
pub mod statement;
pub mod sync;

// Re-exports for convenience
pub use codec::{Codec, ColumnKind, Value, quote_ident, quote_literal};
pub use config::{
    PostgresConfig, ReplicationConfig, ReplicationConfigBuilder, ReplicationMode,
    TableSyncConfig, TableSyncConfigBuilder,
};
pub use dump::{DumpOptions, ExecSink, StatementSink, WriterSink, dump};
pub use error::{Error, Result};
pub use progress::{
    AnyProgressStore, DatabaseProgressStore, FileProgressStore, ProgressStore, SyncRecord,
    Watermark,
};
pub use run::{RunLoop, RunOutcome, RunSettings, Shutdown, StopReason};
pub use schema::{Column, ColumnInfo, discover_columns};
pub use sync::{CycleRunner, CycleStats, Synchronizer, TableSyncResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
