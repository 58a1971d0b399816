use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use super::{flush_once, run_flush_loop, FlushOutcome, FlushSettings, UploadQueue};
use crate::logic::dataset::{LabeledRecord, LatestState};
use crate::logic::features::DerivedFeatures;
use crate::logic::reading::ObdParameters;
use crate::logic::store::{RemoteStore, StoreError};
use crate::logic::stress::HealthTier;

fn record(sequence: u64) -> LabeledRecord {
    LabeledRecord {
        timestamp: Utc::now(),
        session_id: "deadbeef".to_string(),
        vehicle_signature: "ffeeddccbbaa99887766554433221100".to_string(),
        sequence,
        data_quality: 100,
        raw_parameters: ObdParameters {
            rpm: Some(1500.0 + sequence as f64),
            ..Default::default()
        },
        derived_features: DerivedFeatures::default(),
        stress_score: 0,
        health_tier: HealthTier::Normal,
        ml_status: None,
        ml_confidence: None,
        ml_alerts: None,
    }
}

/// Store double with scriptable failures. Unscripted calls succeed.
#[derive(Default)]
struct MockStore {
    batches: Mutex<Vec<Vec<LabeledRecord>>>,
    latest: Mutex<Vec<LatestState>>,
    insert_failures: Mutex<VecDeque<StoreError>>,
    upsert_failures: Mutex<VecDeque<StoreError>>,
}

impl MockStore {
    fn fail_insert(&self, error: StoreError) {
        self.insert_failures.lock().push_back(error);
    }

    fn fail_upsert(&self, error: StoreError) {
        self.upsert_failures.lock().push_back(error);
    }
}

impl RemoteStore for MockStore {
    async fn insert_readings(&self, rows: &[LabeledRecord]) -> Result<(), StoreError> {
        if let Some(error) = self.insert_failures.lock().pop_front() {
            return Err(error);
        }
        self.batches.lock().push(rows.to_vec());
        Ok(())
    }

    async fn upsert_latest(&self, row: &LatestState) -> Result<(), StoreError> {
        if let Some(error) = self.upsert_failures.lock().pop_front() {
            return Err(error);
        }
        self.latest.lock().push(row.clone());
        Ok(())
    }
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

#[test]
fn queue_drops_oldest_at_capacity() {
    let queue = UploadQueue::new(3);
    for seq in 1..=5 {
        queue.push(record(seq));
    }

    let stats = queue.stats();
    assert_eq!(stats.queued, 3);
    assert_eq!(stats.dropped_capacity, 2);

    // survivors are the newest three
    let store = MockStore::default();
    block_on(flush_once(&queue, &store, 10));
    let batches = store.batches.lock();
    let sequences: Vec<u64> = batches[0].iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![3, 4, 5]);
}

#[test]
fn flush_uploads_batch_and_mirrors_latest() {
    let queue = UploadQueue::new(100);
    for seq in 1..=4 {
        queue.push(record(seq));
    }

    let store = MockStore::default();
    let outcome = block_on(flush_once(&queue, &store, 10));

    assert!(matches!(outcome, FlushOutcome::Flushed(4)));
    assert!(queue.is_empty());
    assert_eq!(queue.stats().uploaded, 4);

    assert_eq!(store.batches.lock().len(), 1);
    let latest = store.latest.lock();
    assert_eq!(latest.len(), 1);
    // the mirror follows the newest row of the acked batch
    assert_eq!(latest[0].rpm, Some(1504.0));
}

#[test]
fn partial_batch_ack_leaves_the_rest_queued() {
    let queue = UploadQueue::new(100);
    for seq in 1..=5 {
        queue.push(record(seq));
    }

    let store = MockStore::default();
    block_on(flush_once(&queue, &store, 3));

    assert_eq!(queue.len(), 2);
    let batches = store.batches.lock();
    assert_eq!(batches[0].len(), 3);
    assert_eq!(batches[0][0].sequence, 1);
}

#[test]
fn transient_failure_keeps_batch_queued() {
    let queue = UploadQueue::new(100);
    queue.push(record(1));
    queue.push(record(2));

    let store = MockStore::default();
    store.fail_insert(StoreError::Server(503));

    let outcome = block_on(flush_once(&queue, &store, 10));
    assert!(matches!(outcome, FlushOutcome::Retry(_)));
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.stats().failed_attempts, 1);
    assert!(store.batches.lock().is_empty());

    // next attempt succeeds and drains
    let outcome = block_on(flush_once(&queue, &store, 10));
    assert!(matches!(outcome, FlushOutcome::Flushed(2)));
    assert!(queue.is_empty());
}

#[test]
fn fatal_failure_drops_batch_without_mirroring() {
    let queue = UploadQueue::new(100);
    queue.push(record(1));

    let store = MockStore::default();
    store.fail_insert(StoreError::Rejected {
        status: 400,
        body: "column does not exist".to_string(),
    });

    let outcome = block_on(flush_once(&queue, &store, 10));
    assert!(matches!(outcome, FlushOutcome::Dropped(1)));
    assert!(queue.is_empty());
    assert_eq!(queue.stats().dropped_rejected, 1);
    assert_eq!(queue.stats().uploaded, 0);
    assert!(store.latest.lock().is_empty());
}

#[test]
fn records_enqueued_mid_flight_survive_the_ack() {
    let queue = UploadQueue::new(100);
    queue.push(record(1));
    queue.push(record(2));

    // batch of 2 goes out, a new record arrives before the ack lands
    let store = MockStore::default();
    let outcome = block_on(async {
        let flush = flush_once(&queue, &store, 2);
        queue.push(record(3));
        flush.await
    });

    assert!(matches!(outcome, FlushOutcome::Flushed(2)));
    assert_eq!(queue.len(), 1);

    block_on(flush_once(&queue, &store, 10));
    let batches = store.batches.lock();
    assert_eq!(batches[1][0].sequence, 3);
}

#[test]
fn failed_latest_mirror_does_not_requeue_the_batch() {
    let queue = UploadQueue::new(100);
    queue.push(record(1));

    let store = MockStore::default();
    store.fail_upsert(StoreError::Server(500));

    let outcome = block_on(flush_once(&queue, &store, 10));
    assert!(matches!(outcome, FlushOutcome::Flushed(1)));
    assert!(queue.is_empty());
    assert!(store.latest.lock().is_empty());
}

#[test]
fn flush_of_empty_queue_is_empty() {
    let queue = UploadQueue::new(10);
    let store = MockStore::default();
    let outcome = block_on(flush_once(&queue, &store, 10));
    assert!(matches!(outcome, FlushOutcome::Empty));
}

#[test]
fn stopped_loop_drains_remaining_records() {
    let queue = Arc::new(UploadQueue::new(100));
    for seq in 1..=7 {
        queue.push(record(seq));
    }

    let store = MockStore::default();
    let stop = Arc::new(AtomicBool::new(true));
    let settings = FlushSettings {
        batch_size: 3,
        max_wait: Duration::from_millis(50),
        poll_interval: Duration::from_millis(5),
        backoff_initial: Duration::from_millis(5),
        backoff_max: Duration::from_millis(20),
        backoff_multiplier: 2.0,
    };

    block_on(run_flush_loop(queue.clone(), store, settings, stop.clone()));

    assert!(queue.is_empty());
    assert_eq!(queue.stats().uploaded, 7);
    assert!(stop.load(Ordering::Relaxed));
}

#[test]
fn final_drain_gives_up_on_transient_failure() {
    let queue = Arc::new(UploadQueue::new(100));
    queue.push(record(1));
    queue.push(record(2));

    let store = MockStore::default();
    store.fail_insert(StoreError::Timeout);

    let stop = Arc::new(AtomicBool::new(true));
    block_on(run_flush_loop(
        queue.clone(),
        store,
        FlushSettings {
            batch_size: 10,
            max_wait: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            backoff_initial: Duration::from_millis(5),
            backoff_max: Duration::from_millis(20),
            backoff_multiplier: 2.0,
        },
        stop,
    ));

    // loop must terminate instead of retrying forever
    assert_eq!(queue.len(), 2);
}
