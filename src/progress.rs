//! Sync progress persistence.
//!
//! The watermark of a cycle is the moment it started: every row updated after
//! that (minus the clock margin) is picked up by the next cycle. Two stores
//! implement [`ProgressStore`]: a single-line timestamp file and a bookkeeping
//! table in the follower database.

use crate::config::{ProgressBackend, ProgressConfig, PostgresConfig, RetryConfig};
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio_postgres::{Client, GenericClient};
use tracing::{debug, info};

/// Point in time from which rows count as possibly changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Wrap a timestamp.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Current time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Unix epoch, the watermark of a first run.
    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Underlying timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// The watermark moved back by `delta`.
    pub fn minus(&self, delta: std::time::Duration) -> Result<DateTime<Utc>> {
        TimeDelta::from_std(delta)
            .ok()
            .and_then(|delta| self.0.checked_sub_signed(delta))
            .ok_or_else(|| Error::config(format!("Cannot subtract {:?} from {}", delta, self)))
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl FromStr for Watermark {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|at| Self(at.with_timezone(&Utc)))
            .map_err(|e| Error::serialization(format!("Invalid RFC 3339 timestamp '{}'", s.trim()), e))
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

/// Persistence of completed cycles.
pub trait ProgressStore {
    /// Watermark of the most recent completed cycle, `None` on a first run.
    fn last_watermark(&mut self) -> impl Future<Output = Result<Option<Watermark>>>;

    /// Note that a cycle started at `started`.
    fn begin_cycle(&mut self, started: Watermark) -> impl Future<Output = Result<()>>;

    /// Note that the cycle started at `started` completed at `finished`.
    fn record_cycle(
        &mut self,
        started: Watermark,
        finished: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>>;
}

/// Watermark kept as one RFC 3339 line in a file.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    /// Store backed by `path`; the file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressStore for FileProgressStore {
    async fn last_watermark(&mut self) -> Result<Option<Watermark>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        content.parse().map(Some)
    }

    async fn begin_cycle(&mut self, _started: Watermark) -> Result<()> {
        Ok(())
    }

    async fn record_cycle(&mut self, started: Watermark, _finished: DateTime<Utc>) -> Result<()> {
        // Write aside and rename so a crash never leaves a torn file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, format!("{}\n", started)).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote watermark {} to {}", started, self.path.display());
        Ok(())
    }
}

/// One replication cycle as stored in the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    id: Option<i64>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl SyncRecord {
    /// A record for a cycle started at `started_at`, not yet stored.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            started_at,
            finished_at: None,
        }
    }

    /// Database id, once created.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Cycle start.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Cycle end, if finished.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Insert the record into `table`.
    pub async fn create<C: GenericClient>(&mut self, client: &C, table: &str) -> Result<()> {
        if self.id.is_some() {
            return Err(Error::InvalidState("sync record already created".into()));
        }
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO {} (started_at, finished_at) VALUES ($1, $2) RETURNING id",
                    table
                ),
                &[&self.started_at, &self.finished_at],
            )
            .await
            .map_err(|e| Error::postgres_query(table, "Failed to create sync record", e))?;
        self.id = Some(row.get(0));
        Ok(())
    }

    /// Write the record's timestamps back to `table`.
    pub async fn save<C: GenericClient>(&self, client: &C, table: &str) -> Result<()> {
        let id = self
            .id
            .ok_or_else(|| Error::InvalidState("sync record saved before create".into()))?;
        let affected = client
            .execute(
                &format!(
                    "UPDATE {} SET started_at = $1, finished_at = $2 WHERE id = $3",
                    table
                ),
                &[&self.started_at, &self.finished_at, &id],
            )
            .await
            .map_err(|e| Error::postgres_query(table, "Failed to save sync record", e))?;
        if affected == 0 {
            return Err(Error::InvalidState(format!("sync record {} not found", id)));
        }
        Ok(())
    }

    /// Mark the record finished at `finished_at`.
    pub fn finish(&mut self, finished_at: DateTime<Utc>) -> Result<()> {
        if self.finished_at.is_some() {
            return Err(Error::InvalidState("sync record already finished".into()));
        }
        self.finished_at = Some(finished_at);
        Ok(())
    }

    /// Cycle duration, zero while unfinished.
    pub fn duration(&self) -> TimeDelta {
        self.finished_at
            .map(|finished| finished - self.started_at)
            .unwrap_or_else(TimeDelta::zero)
    }
}

/// Cycle history kept in a follower table.
pub struct DatabaseProgressStore {
    client: Client,
    table: String,
    current: Option<SyncRecord>,
}

impl DatabaseProgressStore {
    /// Use `table` on `client`, creating it if needed.
    pub async fn open(client: Client, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id bigserial PRIMARY KEY,
                    started_at timestamp with time zone NOT NULL,
                    finished_at timestamp with time zone
                )",
                table
            ))
            .await
            .map_err(|e| Error::postgres_query(&table, "Failed to create sync record table", e))?;
        Ok(Self {
            client,
            table,
            current: None,
        })
    }

    /// Most recent finished cycle.
    pub async fn last_finished(&self) -> Result<Option<SyncRecord>> {
        let row = self
            .client
            .query_opt(
                &format!(
                    "SELECT id, started_at, finished_at FROM {}
                     WHERE finished_at IS NOT NULL
                     ORDER BY started_at DESC
                     LIMIT 1",
                    self.table
                ),
                &[],
            )
            .await
            .map_err(|e| Error::postgres_query(&self.table, "Failed to read sync records", e))?;

        Ok(row.map(|row| SyncRecord {
            id: Some(row.get(0)),
            started_at: row.get(1),
            finished_at: row.get(2),
        }))
    }
}

impl ProgressStore for DatabaseProgressStore {
    async fn last_watermark(&mut self) -> Result<Option<Watermark>> {
        Ok(self
            .last_finished()
            .await?
            .map(|record| Watermark::new(record.started_at)))
    }

    async fn begin_cycle(&mut self, started: Watermark) -> Result<()> {
        let mut record = SyncRecord::new(started.timestamp());
        record.create(&self.client, &self.table).await?;
        self.current = Some(record);
        Ok(())
    }

    async fn record_cycle(&mut self, started: Watermark, finished: DateTime<Utc>) -> Result<()> {
        let mut record = match self.current.take() {
            Some(record) if record.started_at == started.timestamp() => record,
            _ => {
                let mut record = SyncRecord::new(started.timestamp());
                record.create(&self.client, &self.table).await?;
                record
            }
        };
        record.finish(finished)?;
        record.save(&self.client, &self.table).await?;
        debug!("Sync record {:?} finished", record.id);
        Ok(())
    }
}

/// Progress store chosen by configuration.
pub enum AnyProgressStore {
    /// Timestamp file
    File(FileProgressStore),
    /// Follower bookkeeping table
    Database(DatabaseProgressStore),
}

impl AnyProgressStore {
    /// Build the configured store. The database backend opens its own
    /// follower connection so bookkeeping never joins a cycle transaction.
    pub async fn from_config(
        progress: &ProgressConfig,
        follower: &PostgresConfig,
        retry: &RetryConfig,
    ) -> Result<Self> {
        match progress.backend {
            ProgressBackend::File => {
                let path = progress
                    .path
                    .clone()
                    .ok_or_else(|| Error::config("File progress backend requires a path"))?;
                info!("Tracking progress in {}", path.display());
                Ok(Self::File(FileProgressStore::new(path)))
            }
            ProgressBackend::Database => {
                let client = crate::postgres::connect_with_retry(follower, retry, None).await?;
                info!("Tracking progress in table {}", progress.table);
                Ok(Self::Database(
                    DatabaseProgressStore::open(client, progress.table.clone()).await?,
                ))
            }
        }
    }
}

impl ProgressStore for AnyProgressStore {
    async fn last_watermark(&mut self) -> Result<Option<Watermark>> {
        match self {
            Self::File(store) => store.last_watermark().await,
            Self::Database(store) => store.last_watermark().await,
        }
    }

    async fn begin_cycle(&mut self, started: Watermark) -> Result<()> {
        match self {
            Self::File(store) => store.begin_cycle(started).await,
            Self::Database(store) => store.begin_cycle(started).await,
        }
    }

    async fn record_cycle(&mut self, started: Watermark, finished: DateTime<Utc>) -> Result<()> {
        match self {
            Self::File(store) => store.record_cycle(started, finished).await,
            Self::Database(store) => store.record_cycle(started, finished).await,
        }
    }
}
