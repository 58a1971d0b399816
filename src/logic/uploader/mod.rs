//! Batch Uploader
//!
//! Decouples the read loop from the network. Records land in a bounded
//! in-memory queue; a flush task ships them in batches and mirrors the
//! newest acked row into the latest-state table. The read loop never
//! blocks on the store.

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::logic::dataset::{LabeledRecord, LatestState};
use crate::logic::store::RemoteStore;

// ============================================================================
// QUEUE
// ============================================================================

struct QueueInner {
    items: VecDeque<(u64, LabeledRecord)>,
    next_ticket: u64,
    uploaded_total: u64,
    dropped_capacity: u64,
    dropped_rejected: u64,
    failed_attempts: u64,
}

/// Counter snapshot for status logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploaderStats {
    pub queued: usize,
    pub uploaded: u64,
    pub dropped_capacity: u64,
    pub dropped_rejected: u64,
    pub failed_attempts: u64,
}

/// Bounded FIFO shared between the read loop and the flush task.
///
/// Each record gets a monotonic ticket on entry. Flushes ack by ticket,
/// so records enqueued while a batch was in flight are never removed by
/// that batch's ack. At capacity the oldest record is dropped; a dropped
/// row can still land upstream if its flush was already in flight, the
/// counters are allowed to be approximate there.
pub struct UploadQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
}

impl UploadQueue {
    pub fn new(capacity: usize) -> Self {
        UploadQueue {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity),
                next_ticket: 0,
                uploaded_total: 0,
                dropped_capacity: 0,
                dropped_rejected: 0,
                failed_attempts: 0,
            }),
            capacity,
        }
    }

    pub fn push(&self, record: LabeledRecord) {
        let mut inner = self.inner.lock();
        if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            inner.dropped_capacity += 1;
        }
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        inner.items.push_back((ticket, record));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> UploaderStats {
        let inner = self.inner.lock();
        UploaderStats {
            queued: inner.items.len(),
            uploaded: inner.uploaded_total,
            dropped_capacity: inner.dropped_capacity,
            dropped_rejected: inner.dropped_rejected,
            failed_attempts: inner.failed_attempts,
        }
    }

    /// Clone up to `max` of the oldest records without removing them.
    /// Returns the last ticket of the batch alongside the rows.
    fn peek_batch(&self, max: usize) -> Option<(u64, Vec<LabeledRecord>)> {
        let inner = self.inner.lock();
        if inner.items.is_empty() {
            return None;
        }
        let take = max.min(inner.items.len());
        let last_ticket = inner.items[take - 1].0;
        let rows = inner.items.iter().take(take).map(|(_, r)| r.clone()).collect();
        Some((last_ticket, rows))
    }

    /// Remove everything up to and including `last_ticket` after a
    /// successful upload.
    fn ack_through(&self, last_ticket: u64) {
        let mut inner = self.inner.lock();
        while inner.items.front().map_or(false, |(t, _)| *t <= last_ticket) {
            inner.items.pop_front();
            inner.uploaded_total += 1;
        }
    }

    /// Remove a batch the store refused outright.
    fn discard_through(&self, last_ticket: u64) {
        let mut inner = self.inner.lock();
        while inner.items.front().map_or(false, |(t, _)| *t <= last_ticket) {
            inner.items.pop_front();
            inner.dropped_rejected += 1;
        }
    }

    fn note_failure(&self) {
        self.inner.lock().failed_attempts += 1;
    }
}

// ============================================================================
// FLUSH TASK
// ============================================================================

/// Flush loop tuning
#[derive(Debug, Clone, Copy)]
pub struct FlushSettings {
    pub batch_size: usize,
    /// A partial batch is flushed once it has waited this long
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_multiplier: f64,
}

impl Default for FlushSettings {
    fn default() -> Self {
        use crate::constants;

        FlushSettings {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            max_wait: Duration::from_millis(constants::DEFAULT_MAX_WAIT_MS),
            poll_interval: Duration::from_millis(250),
            backoff_initial: Duration::from_millis(constants::DEFAULT_BACKOFF_INITIAL_MS),
            backoff_max: Duration::from_millis(constants::DEFAULT_BACKOFF_MAX_MS),
            backoff_multiplier: constants::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

#[derive(Debug)]
pub enum FlushOutcome {
    Empty,
    /// Batch acked, this many rows left the queue
    Flushed(usize),
    /// Store refused the batch, rows dropped
    Dropped(usize),
    /// Transient failure, batch stays queued
    Retry(crate::logic::store::StoreError),
}

/// One flush attempt: send the oldest batch, then mirror its newest row
/// into the latest-state table. The mirror is best-effort, a stale
/// dashboard row is not worth re-sending the batch.
pub async fn flush_once<S: RemoteStore>(
    queue: &UploadQueue,
    store: &S,
    batch_size: usize,
) -> FlushOutcome {
    let (last_ticket, rows) = match queue.peek_batch(batch_size) {
        Some(batch) => batch,
        None => return FlushOutcome::Empty,
    };

    match store.insert_readings(&rows).await {
        Ok(()) => {
            queue.ack_through(last_ticket);
            if let Some(newest) = rows.last() {
                let latest = LatestState::from_record(newest);
                if let Err(e) = store.upsert_latest(&latest).await {
                    log::warn!("Latest-state upsert failed: {}", e);
                }
            }
            FlushOutcome::Flushed(rows.len())
        }
        Err(e) if e.is_transient() => {
            queue.note_failure();
            FlushOutcome::Retry(e)
        }
        Err(e) => {
            log::error!("Store rejected batch of {}: {}", rows.len(), e);
            queue.discard_through(last_ticket);
            FlushOutcome::Dropped(rows.len())
        }
    }
}

/// Flush task body. Runs until `stop` is set, then drains what it can in
/// a single best-effort pass.
pub async fn run_flush_loop<S: RemoteStore>(
    queue: Arc<UploadQueue>,
    store: S,
    settings: FlushSettings,
    stop: Arc<AtomicBool>,
) {
    let mut backoff = settings.backoff_initial;
    let mut last_flush = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let queued = queue.len();
        let due = queued >= settings.batch_size
            || (queued > 0 && last_flush.elapsed() >= settings.max_wait);

        if !due {
            tokio::time::sleep(settings.poll_interval).await;
            continue;
        }

        match flush_once(&queue, &store, settings.batch_size).await {
            FlushOutcome::Flushed(count) => {
                log::debug!("Uploaded batch of {} readings", count);
                backoff = settings.backoff_initial;
                last_flush = Instant::now();
            }
            FlushOutcome::Dropped(_) => {
                backoff = settings.backoff_initial;
                last_flush = Instant::now();
            }
            FlushOutcome::Retry(e) => {
                log::warn!("Upload failed: {}. Retrying in {:?}", e, backoff);
                tokio::time::sleep(backoff).await;
                backoff = backoff.mul_f64(settings.backoff_multiplier).min(settings.backoff_max);
            }
            FlushOutcome::Empty => {
                last_flush = Instant::now();
            }
        }
    }

    // shutdown drain: stop at the first transient failure
    while !queue.is_empty() {
        match flush_once(&queue, &store, settings.batch_size).await {
            FlushOutcome::Flushed(_) | FlushOutcome::Dropped(_) => {}
            FlushOutcome::Retry(e) => {
                log::warn!("Final flush abandoned {} queued readings: {}", queue.len(), e);
                break;
            }
            FlushOutcome::Empty => break,
        }
    }
}
