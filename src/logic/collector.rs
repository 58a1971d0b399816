//! Collector Engine - Read Cycle
//!
//! Owns the whole online pipeline: session, feature engine, stress
//! labeler, optional predictor, dataset writer and upload queue. One
//! sequential loop reads the vehicle at a fixed cadence; the only other
//! thread is the uploader flush task.
//!
//! Mất link sau khi đã kết nối không phải lỗi chết: reconnect với
//! backoff. Chỉ lần mở đầu tiên thất bại mới là unrecoverable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::constants;
use crate::logic::config::CollectorConfig;
use crate::logic::dataset::{DatasetWriter, LabeledRecord};
use crate::logic::features::FeatureEngine;
use crate::logic::model::Predictor;
use crate::logic::session::{ObdSession, SessionError, SessionState};
use crate::logic::store::StoreClient;
use crate::logic::stress::{assess, HealthTier, StressAssessment};
use crate::logic::uploader::{run_flush_loop, FlushSettings, UploadQueue};

/// Status summary cadence, in read cycles
const STATUS_LOG_EVERY: u64 = 60;

/// Granularity of interruptible waits
const SLEEP_SLICE: Duration = Duration::from_millis(250);

// ============================================================================
// COLLECTOR
// ============================================================================

pub struct Collector {
    config: CollectorConfig,
    engine: FeatureEngine,
    writer: DatasetWriter,
    queue: Arc<UploadQueue>,
    predictor: Option<Predictor>,
    link_state: SessionState,
    last_tier: Option<HealthTier>,
    last_quality: u8,
    zero_decode_streak: u32,
    cycles: u64,
}

impl Collector {
    /// Wire up the pipeline. A missing or stale model artifact is not an
    /// error, the collector then emits rule labels only.
    pub fn new(config: CollectorConfig) -> Self {
        let predictor = match Predictor::load(&constants::model_path()) {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("Health model unavailable ({}), running label-only", e);
                None
            }
        };
        let queue = Arc::new(UploadQueue::new(config.buffer_capacity));

        Collector {
            config,
            engine: FeatureEngine::new(),
            writer: DatasetWriter::new(),
            queue,
            predictor,
            link_state: SessionState::Disconnected,
            last_tier: None,
            last_quality: 0,
            zero_decode_streak: 0,
            cycles: 0,
        }
    }

    /// Run until `stop` is raised. The first link open must succeed;
    /// everything after that reconnects with backoff.
    pub fn run(mut self, stop: Arc<AtomicBool>) -> Result<(), SessionError> {
        let mut session = Some(ObdSession::open(
            &self.config.link_candidates,
            self.config.link_timeout(),
        )?);
        self.link_state = SessionState::Active;

        let uploader = self.spawn_uploader(&stop);

        while !stop.load(Ordering::SeqCst) {
            let active = match session.as_mut() {
                Some(s) => s,
                None => {
                    match self.reconnect(&stop) {
                        Some(s) => session = Some(s),
                        None => break,
                    }
                    continue;
                }
            };

            let cycle_started = Instant::now();
            self.run_cycle(active);

            if self.needs_restart(active) {
                log::warn!(
                    "Session unusable (state {}, {} empty cycles), restarting link",
                    active.state(),
                    self.zero_decode_streak
                );
                if let Some(s) = session.take() {
                    s.close();
                }
                self.engine.reset();
                self.zero_decode_streak = 0;
                self.link_state = SessionState::Connecting;
                continue;
            }

            if let Some(rest) = self.config.read_interval().checked_sub(cycle_started.elapsed())
            {
                if !sleep_interruptible(rest, &stop) {
                    break;
                }
            }
        }

        log::info!(
            "Stopping: closing link, {} readings still queued",
            self.queue.len()
        );
        if let Some(s) = session.take() {
            s.close();
        }
        if let Some(handle) = uploader {
            // the flush task drains the queue before it exits
            if handle.join().is_err() {
                log::error!("Uploader task panicked during shutdown");
            }
        }
        let stats = self.queue.stats();
        log::info!(
            "Collector done: {} cycles, {} uploaded, {} dropped",
            self.cycles,
            stats.uploaded,
            stats.dropped_capacity + stats.dropped_rejected
        );
        Ok(())
    }

    /// One read: query, derive, label, predict, persist, enqueue.
    fn run_cycle(&mut self, session: &mut ObdSession) {
        let reading = session.read_cycle();
        self.cycles += 1;
        self.link_state = session.state();
        self.last_quality = reading.data_quality();
        if reading.decoded == 0 {
            self.zero_decode_streak += 1;
        } else {
            self.zero_decode_streak = 0;
        }

        let derived = self.engine.compute(&reading);
        let assessment = assess(&reading.params, &self.config.thresholds);
        self.note_tier(&assessment);

        let (ml_status, ml_confidence, ml_alerts) = match &self.predictor {
            Some(p) => {
                let prediction = p.predict(&reading.params, &derived, &assessment);
                (
                    Some(prediction.tier),
                    Some(prediction.confidence),
                    Some(prediction.alerts),
                )
            }
            None => (None, None, None),
        };

        let record = LabeledRecord {
            timestamp: reading.timestamp,
            session_id: session.session_id().to_string(),
            vehicle_signature: session.vehicle_signature().to_string(),
            sequence: reading.sequence,
            data_quality: reading.data_quality(),
            raw_parameters: reading.params,
            derived_features: derived,
            stress_score: assessment.score,
            health_tier: assessment.tier,
            ml_status,
            ml_confidence,
            ml_alerts,
        };

        if let Err(e) = self.writer.append(&record) {
            log::error!("Dataset append failed: {}", e);
        }
        if self.config.upload_enabled {
            self.queue.push(record);
        }

        if self.cycles % STATUS_LOG_EVERY == 0 {
            self.log_status(session);
        }
    }

    fn needs_restart(&self, session: &ObdSession) -> bool {
        session.state() == SessionState::Disconnected
            || self.zero_decode_streak >= constants::DEFAULT_MAX_CYCLE_FAILURES
    }

    /// Log tier transitions, not every cycle.
    fn note_tier(&mut self, assessment: &StressAssessment) {
        if self.last_tier == Some(assessment.tier) {
            return;
        }
        match assessment.tier {
            HealthTier::Normal => {
                if self.last_tier.is_some() {
                    log::info!("Health back to NORMAL");
                }
            }
            tier => {
                let factors: Vec<&str> = assessment
                    .dominant_factors()
                    .iter()
                    .map(|f| f.describe())
                    .collect();
                log::warn!(
                    "Health {} (score {}): {}",
                    tier,
                    assessment.score,
                    factors.join(", ")
                );
            }
        }
        self.last_tier = Some(assessment.tier);
    }

    fn log_status(&self, session: &ObdSession) {
        let stats = self.queue.stats();
        log::info!(
            "Cycle {}: link {} on {}, quality {}%, tier {}, queue {} ({} uploaded, {} dropped)",
            self.cycles,
            self.link_state,
            session.endpoint(),
            self.last_quality,
            self.last_tier.map_or("-", |t| t.as_str()),
            stats.queued,
            stats.uploaded,
            stats.dropped_capacity + stats.dropped_rejected
        );
    }

    /// Keep trying the candidate list until an adapter answers or `stop`
    /// is raised. Waits grow per attempt and are capped.
    fn reconnect(&mut self, stop: &AtomicBool) -> Option<ObdSession> {
        let backoff = self.config.reconnect_backoff;
        let mut wait = backoff.initial();
        loop {
            if stop.load(Ordering::SeqCst) {
                return None;
            }
            match ObdSession::open(&self.config.link_candidates, self.config.link_timeout()) {
                Ok(session) => {
                    log::info!("Link restored on {}", session.endpoint());
                    self.link_state = session.state();
                    return Some(session);
                }
                Err(e) => {
                    log::warn!("Reconnect failed: {}. Next attempt in {:?}", e, wait);
                    if !sleep_interruptible(wait, stop) {
                        return None;
                    }
                    wait = wait.mul_f64(backoff.multiplier).min(backoff.max());
                }
            }
        }
    }

    /// Flush task on its own thread with a small runtime, the pattern
    /// keeps the read loop free of async plumbing.
    fn spawn_uploader(&self, stop: &Arc<AtomicBool>) -> Option<thread::JoinHandle<()>> {
        if !self.config.upload_enabled {
            log::info!("Remote upload disabled, dataset only");
            return None;
        }

        let queue = Arc::clone(&self.queue);
        let store = StoreClient::new(self.config.store.clone());
        let settings = FlushSettings {
            batch_size: self.config.batch_size,
            max_wait: self.config.max_wait(),
            ..FlushSettings::default()
        };
        let stop = Arc::clone(stop);

        Some(thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to create tokio runtime for uploader");
            rt.block_on(run_flush_loop(queue, store, settings, stop));
        }))
    }
}

/// Sleep in slices so a stop request is honored quickly. Returns false
/// when interrupted.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        thread::sleep(left.min(SLEEP_SLICE));
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::session::testing::ScriptedLink;

    fn handshake_steps() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ATI", "ELM327 v1.5\r"),
            ("ATZ", "\rELM327 v1.5\r"),
            ("ATE0", "OK\r"),
            ("ATL0", "OK\r"),
            ("ATS0", "OK\r"),
            ("ATSP0", "OK\r"),
            ("0100", "410088100000\r"),
            ("0120", "NO DATA\r"),
            ("0140", "NO DATA\r"),
        ]
    }

    fn scripted_session(cycle: Vec<(&'static str, &'static str)>) -> ObdSession {
        let mut steps = handshake_steps();
        steps.extend(cycle);
        ObdSession::from_link(Box::new(ScriptedLink::new(steps))).unwrap()
    }

    fn test_collector(dir: &std::path::Path, upload_enabled: bool) -> Collector {
        let config = CollectorConfig {
            upload_enabled,
            ..Default::default()
        };
        Collector {
            engine: FeatureEngine::new(),
            writer: DatasetWriter::from_path(dir.to_path_buf()),
            queue: Arc::new(UploadQueue::new(config.buffer_capacity)),
            predictor: None,
            link_state: SessionState::Active,
            last_tier: None,
            last_quality: 0,
            zero_decode_streak: 0,
            cycles: 0,
            config,
        }
    }

    #[test]
    fn cycle_writes_a_labeled_record_and_queues_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = test_collector(dir.path(), true);
        let mut session = scripted_session(vec![
            ("010C", "410C0C80\r"),
            ("0105", "41055A\r"),
            ("0101", "410100\r"),
        ]);

        collector.run_cycle(&mut session);

        assert_eq!(collector.queue.len(), 1);
        assert_eq!(collector.cycles, 1);
        assert_eq!(collector.zero_decode_streak, 0);

        let records = crate::logic::dataset::load_corpus(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.raw_parameters.rpm, Some(800.0));
        assert_eq!(record.raw_parameters.coolant_temp, Some(50.0));
        assert_eq!(record.health_tier, HealthTier::Normal);
        assert_eq!(record.data_quality, 100);
        assert_eq!(record.session_id, session.session_id());
        assert!(record.ml_status.is_none());
    }

    #[test]
    fn upload_disabled_keeps_the_queue_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = test_collector(dir.path(), false);
        let mut session = scripted_session(vec![
            ("010C", "410C0C80\r"),
            ("0105", "41055A\r"),
            ("0101", "410100\r"),
        ]);

        collector.run_cycle(&mut session);

        assert!(collector.queue.is_empty());
        assert_eq!(
            crate::logic::dataset::load_corpus(dir.path()).unwrap().len(),
            1
        );
    }

    #[test]
    fn empty_cycles_accumulate_into_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = test_collector(dir.path(), false);
        let mut session = scripted_session(vec![
            ("010C", "NO DATA\r"),
            ("0105", "NO DATA\r"),
            ("0101", "NO DATA\r"),
        ]);

        collector.zero_decode_streak = constants::DEFAULT_MAX_CYCLE_FAILURES - 1;
        collector.run_cycle(&mut session);

        assert_eq!(
            collector.zero_decode_streak,
            constants::DEFAULT_MAX_CYCLE_FAILURES
        );
        assert!(collector.needs_restart(&session));
    }

    #[test]
    fn decoded_cycle_resets_the_streak() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = test_collector(dir.path(), false);
        let mut session = scripted_session(vec![
            ("010C", "410C0C80\r"),
            ("0105", "NO DATA\r"),
            ("0101", "NO DATA\r"),
        ]);

        collector.zero_decode_streak = 3;
        collector.run_cycle(&mut session);

        assert_eq!(collector.zero_decode_streak, 0);
        assert!(!collector.needs_restart(&session));
    }

    #[test]
    fn loaded_model_annotates_records() {
        use crate::logic::features::{layout_hash, MODEL_FEATURE_COUNT, MODEL_FEATURE_VERSION};
        use crate::logic::model::artifact::{save_artifact, ModelArtifact, ARTIFACT_VERSION};
        use crate::logic::model::{ForestModel, ForestParams};
        use ndarray::Array2;

        // Single-class model is enough to see the fields flow through
        let x =
            Array2::from_shape_vec((10, MODEL_FEATURE_COUNT), vec![0.0; 10 * MODEL_FEATURE_COUNT])
                .unwrap();
        let y = vec![0usize; 10];
        let forest = ForestModel::fit(
            x.view(),
            &y,
            1,
            &ForestParams {
                n_trees: 3,
                ..ForestParams::default()
            },
        )
        .unwrap();
        let artifact = ModelArtifact {
            version: ARTIFACT_VERSION,
            feature_version: MODEL_FEATURE_VERSION,
            layout_hash: layout_hash(),
            classes: vec![HealthTier::Normal],
            medians: vec![0.0; MODEL_FEATURE_COUNT],
            forest,
            trained_at: chrono::Utc::now(),
        };

        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        save_artifact(&model_path, &artifact).unwrap();

        let mut collector = test_collector(dir.path(), false);
        collector.predictor = Some(Predictor::load(&model_path).unwrap());

        let mut session = scripted_session(vec![
            ("010C", "410C0C80\r"),
            ("0105", "41055A\r"),
            ("0101", "410100\r"),
        ]);
        collector.run_cycle(&mut session);

        let records = crate::logic::dataset::load_corpus(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ml_status, Some(HealthTier::Normal));
        assert_eq!(records[0].ml_confidence, Some(1.0));
        assert!(records[0]
            .ml_alerts
            .as_ref()
            .map_or(false, |a| !a.is_empty()));
    }

    #[test]
    fn interruptible_sleep_honors_stop() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!sleep_interruptible(Duration::from_secs(5), &stop));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
