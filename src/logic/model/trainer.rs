//! Offline Trainer - Corpus to Artifact
//!
//! Turns a labeled dataset into a forest artifact plus a training
//! report. Runs as a batch command, never inside the read cycle.
//!
//! The corpus rarely contains all four tiers (a healthy car never logs
//! CRITICAL). Training proceeds on whatever classes are present and the
//! artifact records them; the predictor only ever reports those.

use std::fs;
use std::path::Path;

use chrono::Utc;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::artifact::{ModelArtifact, ARTIFACT_VERSION};
use super::forest::{ForestModel, ForestParams};
use super::{impute, ModelError};
use crate::logic::dataset::LabeledRecord;
use crate::logic::features::{
    assemble, layout_hash, MODEL_FEATURE_COUNT, MODEL_FEATURE_LAYOUT, MODEL_FEATURE_VERSION,
};
use crate::logic::stress::HealthTier;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerSettings {
    pub forest: ForestParams,
    /// Fraction of each class held out for evaluation
    pub test_fraction: f64,
    pub min_records: usize,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        TrainerSettings {
            forest: ForestParams::default(),
            test_fraction: 0.2,
            min_records: 50,
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub tier: HealthTier,
    pub precision: f64,
    pub recall: f64,
    /// Held-out samples of this class
    pub support: usize,
}

/// Sidecar metadata written next to the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub trained_at: chrono::DateTime<Utc>,
    pub total_records: usize,
    pub train_count: usize,
    pub test_count: usize,
    pub feature_order: Vec<String>,
    pub layout_hash: u32,
    pub supported_classes: Vec<HealthTier>,
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
}

impl TrainingReport {
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ModelError::Parse(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }
}

// ============================================================================
// TRAINING
// ============================================================================

pub fn train(
    records: &[LabeledRecord],
    settings: &TrainerSettings,
) -> Result<(ModelArtifact, TrainingReport), ModelError> {
    if records.len() < settings.min_records {
        return Err(ModelError::TooFewSamples {
            got: records.len(),
            need: settings.min_records,
        });
    }

    let vectors: Vec<Vec<Option<f64>>> = records
        .iter()
        .map(|r| assemble(&r.raw_parameters, &r.derived_features))
        .collect();

    // Classes present in the corpus, kept in tier order
    let mut present = [false; 4];
    for r in records {
        present[r.health_tier.index()] = true;
    }
    let classes: Vec<HealthTier> = HealthTier::ALL
        .iter()
        .copied()
        .filter(|t| present[t.index()])
        .collect();
    let n_classes = classes.len();
    let y: Vec<usize> = records
        .iter()
        .map(|r| {
            classes
                .iter()
                .position(|t| *t == r.health_tier)
                .unwrap_or(0)
        })
        .collect();

    log::info!(
        "Training corpus: {} records, {} classes ({})",
        records.len(),
        n_classes,
        classes
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let medians = compute_medians(&vectors);
    let imputed: Vec<Vec<f64>> = vectors.iter().map(|v| impute(v, &medians)).collect();

    let mut rng = StdRng::seed_from_u64(settings.forest.seed);
    let (train_idx, test_idx) = stratified_split(&y, n_classes, settings.test_fraction, &mut rng);
    log::info!(
        "Train/test split: {}/{}",
        train_idx.len(),
        test_idx.len()
    );

    let mut flat = Vec::with_capacity(train_idx.len() * MODEL_FEATURE_COUNT);
    let mut train_y = Vec::with_capacity(train_idx.len());
    for &i in &train_idx {
        flat.extend_from_slice(&imputed[i]);
        train_y.push(y[i]);
    }
    let x_train = Array2::from_shape_vec((train_idx.len(), MODEL_FEATURE_COUNT), flat)
        .map_err(|e| ModelError::Shape(e.to_string()))?;

    let forest = ForestModel::fit(x_train.view(), &train_y, n_classes, &settings.forest)?;

    // Evaluate on the held-out rows; fall back to the training rows only
    // in the degenerate case where every class had a single record
    let eval_idx = if test_idx.is_empty() {
        &train_idx
    } else {
        &test_idx
    };
    let (accuracy, per_class) = evaluate(&forest, &imputed, &y, eval_idx, &classes);
    log::info!("Held-out accuracy: {:.1}%", accuracy * 100.0);
    for m in &per_class {
        log::info!(
            "  {}: precision {:.2}, recall {:.2}, support {}",
            m.tier,
            m.precision,
            m.recall,
            m.support
        );
    }

    let trained_at = Utc::now();
    let artifact = ModelArtifact {
        version: ARTIFACT_VERSION,
        feature_version: MODEL_FEATURE_VERSION,
        layout_hash: layout_hash(),
        classes: classes.clone(),
        medians,
        forest,
        trained_at,
    };
    let report = TrainingReport {
        trained_at,
        total_records: records.len(),
        train_count: train_idx.len(),
        test_count: test_idx.len(),
        feature_order: MODEL_FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
        layout_hash: layout_hash(),
        supported_classes: classes,
        accuracy,
        per_class,
    };
    Ok((artifact, report))
}

/// Column medians over present values. A column with no values at all
/// gets 0.0.
fn compute_medians(vectors: &[Vec<Option<f64>>]) -> Vec<f64> {
    (0..MODEL_FEATURE_COUNT)
        .map(|col| {
            let mut values: Vec<f64> = vectors.iter().filter_map(|v| v[col]).collect();
            if values.is_empty() {
                return 0.0;
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let mid = values.len() / 2;
            if values.len() % 2 == 1 {
                values[mid]
            } else {
                (values[mid - 1] + values[mid]) / 2.0
            }
        })
        .collect()
}

/// Shuffle each class independently and hold out `test_fraction` of it,
/// so rare tiers are represented on both sides. A class with a single
/// record goes entirely to the training side.
fn stratified_split(
    y: &[usize],
    n_classes: usize,
    test_fraction: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &class) in y.iter().enumerate() {
        groups[class].push(i);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for mut group in groups {
        group.shuffle(rng);
        if group.len() < 2 {
            train.extend(group);
            continue;
        }
        let held = ((group.len() as f64 * test_fraction).round() as usize)
            .clamp(1, group.len() - 1);
        test.extend_from_slice(&group[..held]);
        train.extend_from_slice(&group[held..]);
    }
    (train, test)
}

fn evaluate(
    forest: &ForestModel,
    imputed: &[Vec<f64>],
    y: &[usize],
    eval_idx: &[usize],
    classes: &[HealthTier],
) -> (f64, Vec<ClassMetrics>) {
    let n_classes = classes.len();
    let mut tp = vec![0usize; n_classes];
    let mut fp = vec![0usize; n_classes];
    let mut fn_ = vec![0usize; n_classes];
    let mut correct = 0usize;

    for &i in eval_idx {
        let (predicted, _) = forest.predict(&imputed[i]);
        let actual = y[i];
        if predicted == actual {
            correct += 1;
            tp[actual] += 1;
        } else {
            fp[predicted] += 1;
            fn_[actual] += 1;
        }
    }

    let accuracy = if eval_idx.is_empty() {
        0.0
    } else {
        correct as f64 / eval_idx.len() as f64
    };
    let per_class = classes
        .iter()
        .enumerate()
        .map(|(c, &tier)| {
            let precision = if tp[c] + fp[c] == 0 {
                0.0
            } else {
                tp[c] as f64 / (tp[c] + fp[c]) as f64
            };
            let recall = if tp[c] + fn_[c] == 0 {
                0.0
            } else {
                tp[c] as f64 / (tp[c] + fn_[c]) as f64
            };
            ClassMetrics {
                tier,
                precision,
                recall,
                support: tp[c] + fn_[c],
            }
        })
        .collect();
    (accuracy, per_class)
}

// ============================================================================
// TESTS
// ============================================================================
