//! Online Predictor - Artifact Consumer
//!
//! Loads a trained artifact once and scores readings inside the read
//! cycle. Every call is pure CPU work on an immutable model; if the
//! artifact cannot be loaded the collector runs label-only and this
//! type is simply never constructed.

use std::path::Path;

use super::artifact::{load_artifact, ModelArtifact};
use super::{impute, ModelError};
use crate::logic::features::{
    assemble, is_layout_compatible, DerivedFeatures, MODEL_FEATURE_COUNT, MODEL_FEATURE_VERSION,
};
use crate::logic::reading::ObdParameters;
use crate::logic::stress::{HealthTier, StressAssessment};

/// Below this, predictions carry a low-confidence alert
const LOW_CONFIDENCE: f64 = 0.7;

/// Dominant stress factors named in the alert list
const MAX_FACTOR_ALERTS: usize = 2;

// ============================================================================
// PREDICTION
// ============================================================================

#[derive(Debug, Clone)]
pub struct Prediction {
    pub tier: HealthTier,
    /// Probability of the predicted tier
    pub confidence: f64,
    /// Distribution over the classes the model was trained on, in the
    /// artifact's class order. Tiers absent from the training corpus
    /// never appear here.
    pub probabilities: Vec<(HealthTier, f64)>,
    pub alerts: Vec<String>,
}

// ============================================================================
// PREDICTOR
// ============================================================================

pub struct Predictor {
    artifact: ModelArtifact,
}

impl Predictor {
    /// Load and validate an artifact. Refuses models trained against a
    /// different feature layout.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let artifact = load_artifact(path)?;
        if !is_layout_compatible(artifact.feature_version, artifact.layout_hash) {
            return Err(ModelError::LayoutMismatch {
                expected_version: MODEL_FEATURE_VERSION,
                found_version: artifact.feature_version,
            });
        }
        if artifact.medians.len() != MODEL_FEATURE_COUNT {
            return Err(ModelError::Shape(format!(
                "artifact has {} medians, layout has {} features",
                artifact.medians.len(),
                MODEL_FEATURE_COUNT
            )));
        }
        if artifact.classes.is_empty() || artifact.classes.len() != artifact.forest.n_classes() {
            return Err(ModelError::Shape(format!(
                "artifact lists {} classes, forest was fit for {}",
                artifact.classes.len(),
                artifact.forest.n_classes()
            )));
        }
        log::info!(
            "Loaded health model: {} trees, classes [{}], trained {}",
            artifact.forest.n_trees(),
            artifact
                .classes
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            artifact.trained_at.format("%Y-%m-%d %H:%M UTC")
        );
        Ok(Predictor { artifact })
    }

    pub fn classes(&self) -> &[HealthTier] {
        &self.artifact.classes
    }

    /// Score one reading. Absent inputs are filled with the training
    /// medians stored in the artifact.
    pub fn predict(
        &self,
        params: &ObdParameters,
        derived: &DerivedFeatures,
        assessment: &StressAssessment,
    ) -> Prediction {
        let raw = assemble(params, derived);
        let features = impute(&raw, &self.artifact.medians);
        let probs = self.artifact.forest.predict_proba(&features);

        let (best, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        let tier = self.artifact.classes[best];
        let probabilities = self
            .artifact
            .classes
            .iter()
            .copied()
            .zip(probs)
            .collect();

        Prediction {
            tier,
            confidence,
            probabilities,
            alerts: build_alerts(tier, confidence, assessment),
        }
    }
}

// ============================================================================
// ALERTS
// ============================================================================

/// Human-readable alert list for one prediction: confidence caveat,
/// tier guidance, then the factors that drove the stress score.
fn build_alerts(tier: HealthTier, confidence: f64, assessment: &StressAssessment) -> Vec<String> {
    let mut alerts = Vec::new();

    if confidence < LOW_CONFIDENCE {
        alerts.push("Low prediction confidence, monitor closely".to_string());
    }

    match tier {
        HealthTier::Critical => alerts.push("Maintenance required immediately".to_string()),
        HealthTier::Warning => alerts.push("Schedule maintenance soon".to_string()),
        HealthTier::Advisory => alerts.push("Monitor vehicle condition".to_string()),
        HealthTier::Normal => {}
    }

    for factor in assessment
        .dominant_factors()
        .into_iter()
        .take(MAX_FACTOR_ALERTS)
    {
        alerts.push(factor.describe().to_string());
    }

    if alerts.is_empty() {
        alerts.push("All systems operating normally".to_string());
    }
    alerts
}

// ============================================================================
// TESTS
// ============================================================================
