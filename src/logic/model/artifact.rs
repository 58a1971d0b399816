//! Model Artifact - On-Disk Format
//!
//! A trained forest plus everything the predictor needs to use it:
//! class list, imputation medians, and the feature layout it was
//! trained against. The wrapper carries a CRC32 so a truncated or
//! hand-edited file is refused instead of silently mispredicting.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::forest::ForestModel;
use super::ModelError;
use crate::logic::stress::HealthTier;

/// Bump when the artifact schema changes shape
pub const ARTIFACT_VERSION: u8 = 1;

// ============================================================================
// ARTIFACT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u8,
    /// Feature layout the design matrix was assembled with
    pub feature_version: u8,
    pub layout_hash: u32,
    /// Tiers present in the training corpus, in tier order. Prediction
    /// output is indexed by this list, not by the full tier set.
    pub classes: Vec<HealthTier>,
    /// Per-feature training medians used to fill absent inputs
    pub medians: Vec<f64>,
    pub forest: ForestModel,
    pub trained_at: DateTime<Utc>,
}

/// Wrapper actually written to disk. The checksum covers the serialized
/// artifact bytes; serde field order is fixed, so re-serializing at
/// load time reproduces them exactly.
#[derive(Debug, Serialize, Deserialize)]
struct ArtifactFile {
    checksum: u32,
    artifact: ModelArtifact,
}

fn checksum_of(artifact: &ModelArtifact) -> Result<u32, ModelError> {
    let bytes = serde_json::to_vec(artifact).map_err(|e| ModelError::Parse(e.to_string()))?;
    Ok(crc32fast::hash(&bytes))
}

// ============================================================================
// SAVE / LOAD
// ============================================================================

pub fn save_artifact(path: &Path, artifact: &ModelArtifact) -> Result<(), ModelError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = ArtifactFile {
        checksum: checksum_of(artifact)?,
        artifact: artifact.clone(),
    };
    let json = serde_json::to_string(&file).map_err(|e| ModelError::Parse(e.to_string()))?;
    fs::write(path, json)?;
    log::info!("Saved model artifact to {}", path.display());
    Ok(())
}

pub fn load_artifact(path: &Path) -> Result<ModelArtifact, ModelError> {
    let json = fs::read_to_string(path)?;
    let file: ArtifactFile =
        serde_json::from_str(&json).map_err(|e| ModelError::Parse(e.to_string()))?;
    if checksum_of(&file.artifact)? != file.checksum {
        return Err(ModelError::ChecksumMismatch);
    }
    Ok(file.artifact)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::MODEL_FEATURE_VERSION;
    use crate::logic::model::forest::ForestParams;
    use ndarray::Array2;

    fn sample_artifact() -> ModelArtifact {
        let x = Array2::from_shape_vec((8, 2), vec![
            1.0, 0.0, 1.1, 0.0, 1.2, 0.0, 1.3, 0.0, 9.0, 0.0, 9.1, 0.0, 9.2, 0.0, 9.3, 0.0,
        ])
        .unwrap();
        let y = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let params = ForestParams {
            n_trees: 3,
            ..ForestParams::default()
        };
        let forest = ForestModel::fit(x.view(), &y, 2, &params).unwrap();
        ModelArtifact {
            version: ARTIFACT_VERSION,
            feature_version: MODEL_FEATURE_VERSION,
            layout_hash: 0xDEAD_BEEF,
            classes: vec![HealthTier::Normal, HealthTier::Warning],
            medians: vec![2.5, 0.0],
            forest,
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = sample_artifact();
        save_artifact(&path, &artifact).unwrap();

        let loaded = load_artifact(&path).unwrap();
        assert_eq!(loaded.classes, artifact.classes);
        assert_eq!(loaded.medians, artifact.medians);
        assert_eq!(
            loaded.forest.predict_proba(&[1.0, 0.0]),
            artifact.forest.predict_proba(&[1.0, 0.0])
        );
    }

    #[test]
    fn tampered_file_fails_the_integrity_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        save_artifact(&path, &sample_artifact()).unwrap();

        let json = fs::read_to_string(&path).unwrap();
        let tampered = json.replace("\"medians\":[2.5", "\"medians\":[3.5");
        fs::write(&path, tampered).unwrap();

        match load_artifact(&path) {
            Err(ModelError::ChecksumMismatch) => {}
            other => panic!("expected checksum failure, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        match load_artifact(Path::new("/nonexistent/model.json")) {
            Err(ModelError::Io(_)) => {}
            other => panic!("expected IO error, got {:?}", other),
        }
    }

    #[test]
    fn garbage_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "not json at all").unwrap();
        match load_artifact(&path) {
            Err(ModelError::Parse(_)) => {}
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
