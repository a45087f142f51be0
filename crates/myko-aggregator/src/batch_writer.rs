//! Batch writer
//!
//! Buffers verified entries in an [`Aggregator`] and flushes the summed
//! records to a sink once either threshold is crossed:
//! - the table holds `buffer_size` distinct keys, or
//! - `flush_interval` has passed since the last successful flush.
//!
//! Thresholds are only evaluated inside [`BatchWriter::write`]. There is no
//! background timer, so a quiet period leaves data buffered until the next
//! write (or an explicit [`BatchWriter::flush_now`]).
//!
//! A failed flush never drops data: the records stay buffered and the next
//! flush retries the union of old and new data. There is no backoff and no
//! cap, so a sink that keeps failing lets the table grow past `buffer_size`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use myko_common::{AggregatedRecord, Entry, EventSink, MykoError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::Aggregator;
use crate::deadline::with_deadline;

/// How a flush interacts with the writer lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Hold the lock across sink I/O. Writers block for the duration of the
    /// flush, and every flush sees a complete snapshot.
    #[default]
    Blocking,
    /// Drain under the lock, release it, then perform sink I/O. Drained
    /// records are merged back if the sink fails or the I/O task panics. At
    /// most one detached flush is in flight at a time.
    Detached,
}

/// Configuration for the batch writer
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Distinct-key count that triggers a flush
    pub buffer_size: usize,
    /// Age of the last successful flush that triggers a flush
    pub flush_interval: Duration,
    /// Lock behavior during flush
    pub mode: FlushMode,
    /// Deadline for each sink ingest
    pub backend_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            flush_interval: Duration::from_secs(5),
            mode: FlushMode::Blocking,
            backend_timeout: Duration::from_secs(10),
        }
    }
}

/// Writer counters
#[derive(Debug, Default)]
pub struct WriterMetrics {
    pub events_merged: AtomicU64,
    pub flushes: AtomicU64,
    pub failed_flushes: AtomicU64,
    pub records_flushed: AtomicU64,
}

impl WriterMetrics {
    fn on_flushed(&self, records: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.records_flushed
            .fetch_add(records as u64, Ordering::Relaxed);
        info!(records, "Flushed aggregated records");
    }

    fn on_flush_failed(&self, retained: usize, err: &MykoError) {
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        warn!(retained, error = %err, "Flush failed, keeping records for the next write");
    }
}

/// Point-in-time view of the writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    /// Distinct keys currently buffered
    pub buffered: usize,
    /// Whether a detached flush is running
    pub flushing: bool,
    pub events_merged: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub records_flushed: u64,
}

struct WriterState {
    aggregator: Aggregator,
    last_flush: Instant,
    in_flight: bool,
}

/// Serializes concurrent writers into one aggregator and flushes it to a sink
pub struct BatchWriter<S> {
    config: WriterConfig,
    state: Arc<Mutex<WriterState>>,
    sink: S,
    metrics: Arc<WriterMetrics>,
    /// Signalled whenever a detached flush finishes
    idle: Arc<Notify>,
}

impl<S> BatchWriter<S>
where
    S: EventSink + Clone + 'static,
{
    /// Create a writer bound to `sink`
    pub fn new(sink: S, config: WriterConfig) -> Self {
        let state = WriterState {
            aggregator: Aggregator::new(config.buffer_size),
            last_flush: Instant::now(),
            in_flight: false,
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            sink,
            metrics: Arc::new(WriterMetrics::default()),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &WriterMetrics {
        &self.metrics
    }

    /// Merge every event of every entry, then flush if a threshold is crossed.
    ///
    /// Entries must already be verified. Returns the flush error, if any; the
    /// merged events stay buffered in that case.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn write(&self, entries: &[Entry]) -> Result<()> {
        let mut state = self.state.lock().await;

        let mut merged = 0u64;
        for entry in entries {
            for event in &entry.events {
                state.aggregator.add(&entry.scope, &entry.origin, event);
                merged += 1;
            }
        }
        self.metrics
            .events_merged
            .fetch_add(merged, Ordering::Relaxed);

        if !self.flush_due(&state) {
            debug!(merged, buffered = state.aggregator.size(), "Buffered events");
            return Ok(());
        }
        self.flush(state).await
    }

    /// Flush whatever is buffered, ignoring thresholds.
    ///
    /// Waits for a running detached flush first, then flushes what is left
    /// (including records merged back by a failed flush).
    #[instrument(skip(self))]
    pub async fn flush_now(&self) -> Result<()> {
        loop {
            let state = self.state.lock().await;
            if state.in_flight {
                // Registered under the lock, so the completion cannot slip by.
                let done = self.idle.notified();
                drop(state);
                done.await;
                continue;
            }
            if state.aggregator.is_empty() {
                return Ok(());
            }
            return self.flush(state).await;
        }
    }

    /// Number of distinct keys currently buffered
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.aggregator.size()
    }

    pub async fn stats(&self) -> WriterStats {
        let state = self.state.lock().await;
        WriterStats {
            buffered: state.aggregator.size(),
            flushing: state.in_flight,
            events_merged: self.metrics.events_merged.load(Ordering::Relaxed),
            flushes: self.metrics.flushes.load(Ordering::Relaxed),
            failed_flushes: self.metrics.failed_flushes.load(Ordering::Relaxed),
            records_flushed: self.metrics.records_flushed.load(Ordering::Relaxed),
        }
    }

    fn flush_due(&self, state: &WriterState) -> bool {
        if state.aggregator.is_empty() || state.in_flight {
            return false;
        }
        state.aggregator.size() >= self.config.buffer_size
            || state.last_flush.elapsed() >= self.config.flush_interval
    }

    async fn flush(&self, state: MutexGuard<'_, WriterState>) -> Result<()> {
        match self.config.mode {
            FlushMode::Blocking => self.flush_blocking(state).await,
            FlushMode::Detached => self.flush_detached(state).await,
        }
    }

    async fn flush_blocking(&self, mut state: MutexGuard<'_, WriterState>) -> Result<()> {
        let batch = state.aggregator.snapshot();
        debug!(records = batch.len(), "Batch writing records");

        let result = with_deadline(
            self.config.backend_timeout,
            "ingest",
            self.sink.ingest(&batch),
        )
        .await;

        match result {
            Ok(()) => {
                state.aggregator.reset();
                state.last_flush = Instant::now();
                self.metrics.on_flushed(batch.len());
                Ok(())
            }
            Err(err) => {
                self.metrics.on_flush_failed(state.aggregator.size(), &err);
                Err(err)
            }
        }
    }

    async fn flush_detached(&self, mut state: MutexGuard<'_, WriterState>) -> Result<()> {
        let batch = Arc::new(state.aggregator.drain());
        state.in_flight = true;
        drop(state);
        debug!(records = batch.len(), "Batch writing records outside the lock");

        // The supervisor outlives a cancelled caller. The I/O gets its own
        // task, so a panicking sink comes back as a JoinError and the batch
        // is still merged back below.
        let shared = Arc::clone(&self.state);
        let sink = self.sink.clone();
        let metrics = Arc::clone(&self.metrics);
        let idle = Arc::clone(&self.idle);
        let timeout = self.config.backend_timeout;

        let supervisor = tokio::spawn(async move {
            let io_batch = Arc::clone(&batch);
            let io = tokio::spawn(async move {
                with_deadline(timeout, "ingest", sink.ingest(&io_batch)).await
            });
            let result = io
                .await
                .unwrap_or_else(|e| Err(MykoError::Internal(format!("ingest task failed: {e}"))));

            let mut state = shared.lock().await;
            state.in_flight = false;
            let result = match result {
                Ok(()) => {
                    state.last_flush = Instant::now();
                    metrics.on_flushed(batch.len());
                    Ok(())
                }
                Err(err) => {
                    state.aggregator.merge(reclaim(batch));
                    metrics.on_flush_failed(state.aggregator.size(), &err);
                    Err(err)
                }
            };
            drop(state);
            idle.notify_waiters();
            result
        });

        supervisor
            .await
            .map_err(|e| MykoError::Internal(format!("flush task failed: {e}")))?
    }
}

/// Take the batch back once the I/O task has released its handle
fn reclaim(batch: Arc<Vec<AggregatedRecord>>) -> Vec<AggregatedRecord> {
    Arc::try_unwrap(batch).unwrap_or_else(|shared| shared.as_ref().clone())
}
