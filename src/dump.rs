//! Row dumping: one INSERT statement per selected row, handed to a sink.

use crate::error::{Error, Result};
use crate::schema::{Column, discover_columns};
use crate::statement::{Conflict, InsertOptions, render_insert, render_select};
use futures::TryStreamExt;
use std::future::Future;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_postgres::GenericClient;
use tokio_postgres::types::ToSql;
use tracing::{debug, info, instrument};

/// Dump options.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Full SELECT to run instead of the default one, or a `WHERE ...` clause
    /// appended to it
    pub query: Option<String>,
    /// Columns to dump (empty = all)
    pub insert_columns: Vec<String>,
    /// Emit `ON CONFLICT (<col>) DO UPDATE SET ...`
    pub conflict_column: Option<String>,
    /// Emit `ON CONFLICT DO NOTHING`
    pub no_conflict: bool,
    /// Table named in the INSERTs (defaults to the source table)
    pub insert_table: Option<String>,
    /// Leave the column list out of the INSERTs
    pub skip_column_names_in_insert: bool,
    /// Log the row query and every statement at info level
    pub verbose: bool,
}

impl DumpOptions {
    /// Options for an upsert keyed on `column`.
    pub fn upsert(column: impl Into<String>) -> Self {
        Self {
            conflict_column: Some(column.into()),
            ..Default::default()
        }
    }

    /// Options for `ON CONFLICT DO NOTHING` inserts.
    pub fn insert_ignore() -> Self {
        Self {
            no_conflict: true,
            ..Default::default()
        }
    }

    /// Set the row query or WHERE clause.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set verbose logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check option consistency.
    pub fn validate(&self) -> Result<()> {
        self.conflict().map(|_| ())
    }

    /// Conflict policy described by these options.
    pub fn conflict(&self) -> Result<Conflict<'_>> {
        Conflict::from_options(self.conflict_column.as_deref(), self.no_conflict)
    }

    /// Query producing the rows to dump.
    pub fn row_query(&self, table: &str, columns: &[Column]) -> String {
        let default = render_select(table, columns);
        match self.query.as_deref().map(str::trim) {
            None | Some("") => default,
            Some(clause) if starts_with_where(clause) => format!("{default} {clause}"),
            Some(query) => query.to_string(),
        }
    }
}

fn starts_with_where(query: &str) -> bool {
    query
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("where"))
}

/// Consumer of rendered statements.
pub trait StatementSink {
    /// Take one complete statement.
    fn accept(&mut self, statement: &str) -> impl Future<Output = Result<()>>;
}

/// Sink writing statements to an async writer.
pub struct WriterSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> WriterSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write raw text that is not a dumped row (e.g. `BEGIN;`).
    pub async fn write_raw(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        Ok(())
    }

    /// Flush and return the writer.
    pub async fn finish(mut self) -> Result<W> {
        self.writer.flush().await?;
        Ok(self.writer)
    }
}

impl<W: AsyncWrite + Unpin> StatementSink for WriterSink<W> {
    async fn accept(&mut self, statement: &str) -> Result<()> {
        self.writer.write_all(statement.as_bytes()).await?;
        Ok(())
    }
}

/// Sink executing statements against a connection or transaction.
pub struct ExecSink<'a, C> {
    client: &'a C,
    table: String,
    verbose: bool,
    executed: u64,
}

impl<'a, C: GenericClient> ExecSink<'a, C> {
    /// Execute statements for `table` on `client`.
    pub fn new(client: &'a C, table: impl Into<String>, verbose: bool) -> Self {
        Self {
            client,
            table: table.into(),
            verbose,
            executed: 0,
        }
    }

    /// Number of statements executed so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }
}

impl<C: GenericClient> StatementSink for ExecSink<'_, C> {
    async fn accept(&mut self, statement: &str) -> Result<()> {
        if self.verbose {
            info!("{}", statement.trim_end());
        } else {
            debug!("{}", statement.trim_end());
        }

        self.client
            .batch_execute(statement)
            .await
            .map_err(|e| Error::postgres_query(&self.table, "Failed to apply statement", e))?;
        self.executed += 1;
        Ok(())
    }
}

/// Dump the rows of `table` selected by `opts` into `sink`.
///
/// Returns the number of rows dumped. A row that fails to scan or render
/// aborts the dump before anything is emitted for it.
#[instrument(skip(sink, source, opts), fields(table = %table))]
pub async fn dump<C, S>(sink: &mut S, source: &C, table: &str, opts: &DumpOptions) -> Result<u64>
where
    C: GenericClient,
    S: StatementSink,
{
    let conflict = opts.conflict()?;
    let mut columns = discover_columns(source, table, &opts.insert_columns).await?;

    if let Conflict::Update(conflict_column) = conflict {
        if !columns.iter().any(|col| col.name() == conflict_column) {
            return Err(Error::unknown_column(table, conflict_column));
        }
    }

    let query = opts.row_query(table, &columns);
    if opts.verbose {
        info!("{}", query);
    } else {
        debug!("Row query: {}", query);
    }

    let insert_opts = InsertOptions {
        conflict,
        skip_column_names: opts.skip_column_names_in_insert,
    };
    let dest = opts.insert_table.as_deref().unwrap_or(table);

    let rows = source
        .query_raw(query.as_str(), std::iter::empty::<&(dyn ToSql + Sync)>())
        .await
        .map_err(|e| Error::postgres_query(table, "Row query failed", e))?;
    let mut rows = std::pin::pin!(rows);

    let mut count = 0u64;
    while let Some(row) = rows
        .try_next()
        .await
        .map_err(|e| Error::postgres_query(table, "Failed to fetch row", e))?
    {
        for (idx, col) in columns.iter_mut().enumerate() {
            col.scan(&row, idx).map_err(|e| {
                Error::postgres_query(table, format!("Failed to scan column '{}'", col.name()), e)
            })?;
        }
        let statement = render_insert(dest, &columns, &insert_opts)?;
        sink.accept(&statement).await?;
        count += 1;
    }

    if opts.verbose {
        info!("Fetched {} rows", count);
    } else {
        debug!("Fetched {} rows", count);
    }
    Ok(count)
}
