//! Model Module - Health Classifier
//!
//! Offline trainer and online predictor around a bagged decision-tree
//! ensemble. Tách trainer khỏi predictor: trainer chỉ chạy batch,
//! predictor chỉ đọc artifact.

pub mod artifact;
pub mod forest;
pub mod predictor;
pub mod trainer;
pub mod tree;


pub use artifact::{ModelArtifact, ARTIFACT_VERSION};
pub use forest::{ForestModel, ForestParams};
pub use predictor::{Prediction, Predictor};
pub use trainer::{train, ClassMetrics, TrainerSettings, TrainingReport};

/// Model errors
#[derive(Debug)]
pub enum ModelError {
    Io(String),
    Parse(String),
    /// Artifact bytes do not match their recorded checksum
    ChecksumMismatch,
    /// Artifact was trained against a different feature layout
    LayoutMismatch {
        expected_version: u8,
        found_version: u8,
    },
    TooFewSamples {
        got: usize,
        need: usize,
    },
    Shape(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Model IO error: {}", e),
            Self::Parse(e) => write!(f, "Model parse error: {}", e),
            Self::ChecksumMismatch => write!(f, "Model artifact failed integrity check"),
            Self::LayoutMismatch {
                expected_version,
                found_version,
            } => write!(
                f,
                "Model trained on feature layout v{}, this build expects v{}",
                found_version, expected_version
            ),
            Self::TooFewSamples { got, need } => {
                write!(f, "Corpus too small: {} records, need at least {}", got, need)
            }
            Self::Shape(e) => write!(f, "Design matrix error: {}", e),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<std::io::Error> for ModelError {
    fn from(e: std::io::Error) -> Self {
        ModelError::Io(e.to_string())
    }
}

/// Replace absent slots with training-set medians so a sparse reading
/// still produces a full-width model input.
pub fn impute(raw: &[Option<f64>], medians: &[f64]) -> Vec<f64> {
    raw.iter()
        .enumerate()
        .map(|(i, v)| v.unwrap_or_else(|| medians.get(i).copied().unwrap_or(0.0)))
        .collect()
}
