//! Metrics and observability for pg-upsert-replicator.
//!
//! Counters live in-process on [`Metrics`] and are mirrored to the `metrics`
//! facade, so an embedding application can install any exporter it likes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics collector for replication cycles.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Cycles completed
    pub cycles_total: AtomicU64,
    /// Cycles that applied no rows
    pub cycles_idle: AtomicU64,
    /// Tables synced across all cycles
    pub tables_synced: AtomicU64,
    /// Rows applied to the follower
    pub rows_applied: AtomicU64,
    /// Statements executed against the follower
    pub statements_executed: AtomicU64,
    /// Total cycle duration in milliseconds
    pub cycle_duration_ms: AtomicU64,
    /// Connection retries
    pub retries: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed cycle.
    pub fn record_cycle(&self, rows: u64, duration_ms: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        if rows == 0 {
            self.cycles_idle.fetch_add(1, Ordering::Relaxed);
        }
        self.cycle_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);

        metrics::counter!("replication_cycles_total").increment(1);
        metrics::histogram!("replication_cycle_duration_seconds")
            .record(duration_ms as f64 / 1000.0);
    }

    /// Record one synced table.
    pub fn record_table(&self, table: &str, rows: u64, statements: u64) {
        self.tables_synced.fetch_add(1, Ordering::Relaxed);
        self.rows_applied.fetch_add(rows, Ordering::Relaxed);
        self.statements_executed
            .fetch_add(statements, Ordering::Relaxed);

        metrics::counter!("replication_rows_applied_total", "table" => table.to_string())
            .increment(rows);
    }

    /// Record a connection retry.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("replication_connection_retries_total").increment(1);
    }

    /// Get snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_idle: self.cycles_idle.load(Ordering::Relaxed),
            tables_synced: self.tables_synced.load(Ordering::Relaxed),
            rows_applied: self.rows_applied.load(Ordering::Relaxed),
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            cycle_duration_ms: self.cycle_duration_ms.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Cycles completed
    pub cycles_total: u64,
    /// Cycles that applied no rows
    pub cycles_idle: u64,
    /// Tables synced across all cycles
    pub tables_synced: u64,
    /// Rows applied to the follower
    pub rows_applied: u64,
    /// Statements executed against the follower
    pub statements_executed: u64,
    /// Total cycle duration in milliseconds
    pub cycle_duration_ms: u64,
    /// Connection retries
    pub retries: u64,
}

impl MetricsSnapshot {
    /// Average cycle duration in milliseconds.
    pub fn avg_cycle_duration_ms(&self) -> f64 {
        if self.cycles_total == 0 {
            0.0
        } else {
            self.cycle_duration_ms as f64 / self.cycles_total as f64
        }
    }

    /// Rows applied per second of cycle time.
    pub fn rows_per_second(&self) -> f64 {
        if self.cycle_duration_ms == 0 {
            0.0
        } else {
            (self.rows_applied as f64 * 1000.0) / self.cycle_duration_ms as f64
        }
    }
}

/// Timer for measuring operation duration.
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Start a new timer.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Elapsed time.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration.
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("{} completed in {}", self.label, format_duration(self.elapsed()));
        elapsed
    }
}

/// Human-readable duration, rounded to milliseconds.
pub fn format_duration(duration: Duration) -> String {
    let rounded = Duration::from_millis(duration.as_millis() as u64);
    humantime::format_duration(rounded).to_string()
}
