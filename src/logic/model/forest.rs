//! Random Forest - Bagged Tree Ensemble
//!
//! Bootstrap-sampled CART trees with per-split feature subsampling.
//! Training is deterministic for a fixed seed.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use super::ModelError;

// ============================================================================
// PARAMETERS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Fraction of the training set drawn (with replacement) per tree
    pub sample_ratio: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_trees: 30,
            max_depth: 8,
            min_samples_split: 4,
            sample_ratio: 0.8,
            seed: 42,
        }
    }
}

// ============================================================================
// MODEL
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl ForestModel {
    /// Train an ensemble on the full design matrix. `y` holds class
    /// indices in `0..n_classes`.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
        params: &ForestParams,
    ) -> Result<Self, ModelError> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples == 0 || n_samples != y.len() {
            return Err(ModelError::Shape(format!(
                "matrix has {} rows but {} labels",
                n_samples,
                y.len()
            )));
        }
        if n_classes == 0 {
            return Err(ModelError::Shape("no classes to fit".to_string()));
        }

        let sample_size = ((n_samples as f64 * params.sample_ratio).round() as usize)
            .clamp(1, n_samples);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            feature_subset: ((n_features as f64).sqrt().ceil() as usize).max(1),
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);
        for _ in 0..params.n_trees.max(1) {
            // Bootstrap: draw with replacement
            let indices: Vec<usize> = (0..sample_size)
                .map(|_| rng.gen_range(0..n_samples))
                .collect();
            trees.push(DecisionTree::fit(
                x,
                y,
                &indices,
                n_classes,
                &tree_params,
                &mut rng,
            ));
        }

        Ok(ForestModel {
            trees,
            n_features,
            n_classes,
        })
    }

    /// Average the per-tree leaf distributions.
    pub fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let mut averaged = vec![0.0f64; self.n_classes];
        for tree in &self.trees {
            let dist = tree.predict_proba(features);
            for (acc, p) in averaged.iter_mut().zip(dist.iter()) {
                *acc += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        for p in &mut averaged {
            *p /= n;
        }
        averaged
    }

    /// Most likely class index together with its probability.
    pub fn predict(&self, features: &[f64]) -> (usize, f64) {
        let probs = self.predict_proba(features);
        probs
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

// ============================================================================
// TESTS
// ============================================================================
