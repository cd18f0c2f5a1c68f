//! Replication cycles: one consistent leader snapshot applied to the follower.

use crate::codec::{quote_ident, timestamptz_literal};
use crate::config::{ReplicationMode, SyncSettings, TableSyncConfig};
use crate::dump::{DumpOptions, ExecSink, dump};
use crate::error::{Error, Result, Side};
use crate::metrics::{Metrics, Timer, format_duration};
use crate::progress::Watermark;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::{Client, GenericClient, IsolationLevel, Row, Transaction};
use tracing::{info, instrument, warn};

/// Outcome of one replication cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    /// Per-table results, in sync order
    pub tables: Vec<TableSyncResult>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
}

impl CycleStats {
    /// Rows applied across all tables.
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// True when nothing changed since the previous cycle.
    pub fn is_idle(&self) -> bool {
        self.total_rows() == 0
    }
}

/// Per-table sync result.
#[derive(Debug, Clone, Serialize)]
pub struct TableSyncResult {
    /// Table name
    pub table: String,
    /// Replication mode used
    pub mode: ReplicationMode,
    /// Lowest id considered
    pub min_id: i64,
    /// Rows applied to the follower
    pub rows: u64,
    /// Statements executed on the follower
    pub statements: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Something that runs one replication cycle.
pub trait CycleRunner {
    /// Replicate everything changed since `last_sync`.
    fn run_cycle(&mut self, last_sync: Watermark) -> impl Future<Output = Result<CycleStats>>;
}

/// Leader to follower synchronizer.
pub struct Synchronizer {
    leader: Client,
    follower: Client,
    tables: Vec<TableSyncConfig>,
    clock_margin: Duration,
    verbose: bool,
    metrics: Arc<Metrics>,
}

impl Synchronizer {
    /// Create a synchronizer over open leader and follower connections.
    pub fn new(
        leader: Client,
        follower: Client,
        tables: Vec<TableSyncConfig>,
        settings: &SyncSettings,
    ) -> Result<Self> {
        // Surface bad durations before the first cycle.
        for table in &tables {
            table.max_record_age()?;
        }
        Ok(Self {
            leader,
            follower,
            tables,
            clock_margin: settings.clock_margin()?,
            verbose: false,
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Log every generated statement at info level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Share a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics collector.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run one cycle over every configured table.
    ///
    /// The leader is read in a serializable read-only transaction and the
    /// follower written in a repeatable-read one. The leader commits first;
    /// any failure rolls back whichever side is still open.
    #[instrument(skip(self), fields(last_sync = %last_sync))]
    pub async fn sync(&mut self, last_sync: Watermark) -> Result<CycleStats> {
        let timer = Timer::start("cycle");
        let Self {
            leader,
            follower,
            tables,
            clock_margin,
            verbose,
            metrics,
        } = self;

        let leader_tx = leader
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .read_only(true)
            .start()
            .await
            .map_err(|e| Error::postgres_connection_pg("Failed to begin leader transaction", e))?;
        let follower_tx = follower
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .start()
            .await
            .map_err(|e| {
                Error::postgres_connection_pg("Failed to begin follower transaction", e)
            })?;

        let mut results = Vec::with_capacity(tables.len());
        for table in tables.iter() {
            let result =
                sync_table(&leader_tx, &follower_tx, table, last_sync, *clock_margin, *verbose)
                    .await;
            match result {
                Ok(result) => results.push(result),
                Err(e) => {
                    rollback(leader_tx, Side::Leader).await;
                    rollback(follower_tx, Side::Follower).await;
                    return Err(e);
                }
            }
        }

        // The leader commit fixes the serialized snapshot the dumps were read from.
        if let Err(e) = leader_tx.commit().await {
            rollback(follower_tx, Side::Follower).await;
            return Err(Error::Commit {
                side: Side::Leader,
                source: e,
            });
        }
        follower_tx.commit().await.map_err(|e| Error::Commit {
            side: Side::Follower,
            source: e,
        })?;

        for result in &results {
            metrics.record_table(&result.table, result.rows, result.statements);
        }
        let stats = CycleStats {
            tables: results,
            duration_ms: timer.elapsed_ms(),
        };
        metrics.record_cycle(stats.total_rows(), stats.duration_ms);
        info!(
            "Cycle done in {}, updated {} rows",
            format_duration(timer.elapsed()),
            stats.total_rows()
        );
        Ok(stats)
    }

    /// Run `SELECT 1` on both connections.
    pub async fn test_connectivity(&self) -> Result<()> {
        crate::postgres::ping(&self.leader).await?;
        info!("Leader: OK");
        crate::postgres::ping(&self.follower).await?;
        info!("Follower: OK");
        Ok(())
    }
}

impl CycleRunner for Synchronizer {
    async fn run_cycle(&mut self, last_sync: Watermark) -> Result<CycleStats> {
        self.sync(last_sync).await
    }
}

async fn rollback(tx: Transaction<'_>, side: Side) {
    if let Err(e) = tx.rollback().await {
        warn!("Failed to roll back {} transaction: {}", side, e);
    }
}

#[instrument(skip_all, fields(table = %table.name, mode = %table.replication_mode))]
async fn sync_table(
    leader: &Transaction<'_>,
    follower: &Transaction<'_>,
    table: &TableSyncConfig,
    last_sync: Watermark,
    clock_margin: Duration,
    verbose: bool,
) -> Result<TableSyncResult> {
    let timer = Timer::start(format!("table {}", table.name));
    info!("Syncing table {} ...", table.name);

    let (min_id, opts) = match table.replication_mode {
        ReplicationMode::Upsert | ReplicationMode::Insert => {
            let min_id = partition_by_age(leader, table, last_sync).await?;
            let since = last_sync.minus(clock_margin)?;
            let base = if table.replication_mode == ReplicationMode::Upsert {
                DumpOptions::upsert(&table.id_column)
            } else {
                DumpOptions::insert_ignore()
            };
            let query = format!(
                "WHERE {} >= {} AND {} >= {}",
                quote_ident(&table.id_column),
                min_id,
                quote_ident(&table.updated_at_column),
                timestamptz_literal(&since),
            );
            (min_id, base.with_query(query))
        }
        ReplicationMode::InsertSerial => {
            let min_id = next_serial_id(follower, table).await?;
            let query = format!("WHERE {} >= {}", quote_ident(&table.id_column), min_id);
            (min_id, DumpOptions::default().with_query(query))
        }
    };

    let mut sink = ExecSink::new(follower, &table.name, verbose);
    let rows = dump(&mut sink, leader, &table.name, &opts.with_verbose(verbose)).await?;
    let statements = sink.executed();

    info!(
        "Table {} done in {}, updated {} rows",
        table.name,
        format_duration(timer.elapsed()),
        rows
    );
    Ok(TableSyncResult {
        table: table.name.clone(),
        mode: table.replication_mode,
        min_id,
        rows,
        statements,
        duration_ms: timer.stop(),
    })
}

/// Lowest id worth rescanning on `table`.
///
/// Rows created more than `max_record_age_seconds` before `last_sync` are
/// treated as immutable: the result is one past the newest such id, or 0
/// when age partitioning is off or no row is that old.
pub async fn partition_by_age<C: GenericClient>(
    leader: &C,
    table: &TableSyncConfig,
    last_sync: Watermark,
) -> Result<i64> {
    let Some(age) = table.max_record_age()? else {
        return Ok(0);
    };
    let created_before = last_sync.minus(age)?;

    let query = format!(
        "SELECT {id}::bigint FROM {table} WHERE {created} < {ts} AND {id} IS NOT NULL \
         ORDER BY {id} DESC LIMIT 1",
        id = quote_ident(&table.id_column),
        table = table.name,
        created = quote_ident(&table.created_at_column),
        ts = timestamptz_literal(&created_before),
    );
    let row = leader
        .query_opt(query.as_str(), &[])
        .await
        .map_err(|e| Error::postgres_query(&table.name, "Failed to partition by age", e))?;

    one_past(row.as_ref(), &table.name)
}

/// One past the highest id already on the follower, or 0 for an empty table.
pub async fn next_serial_id<C: GenericClient>(follower: &C, table: &TableSyncConfig) -> Result<i64> {
    let query = format!(
        "SELECT {id}::bigint FROM {table} WHERE {id} IS NOT NULL ORDER BY {id} DESC LIMIT 1",
        id = quote_ident(&table.id_column),
        table = table.name,
    );
    let row = follower
        .query_opt(query.as_str(), &[])
        .await
        .map_err(|e| Error::postgres_query(&table.name, "Failed to read last follower id", e))?;

    one_past(row.as_ref(), &table.name)
}

fn one_past(row: Option<&Row>, table: &str) -> Result<i64> {
    let Some(row) = row else {
        return Ok(0);
    };
    let id = row
        .try_get::<_, Option<i64>>(0)
        .map_err(|e| Error::postgres_query(table, "Failed to read id", e))?;
    id.map_or(Ok(0), |id| {
        id.checked_add(1)
            .ok_or_else(|| Error::InvalidState(format!("id {} on {} cannot grow", id, table)))
    })
}
