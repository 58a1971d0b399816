//! Decision Tree - CART Classifier
//!
//! Binary splits minimizing Gini impurity. Trees are grown greedily and
//! never pruned; the forest averages out the variance.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

// ============================================================================
// PARAMETERS
// ============================================================================

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Number of features examined per split (random subset)
    pub feature_subset: usize,
}

// ============================================================================
// TREE STRUCTURE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        /// Class distribution at this leaf, sums to 1.0
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: TreeNode,
}

impl DecisionTree {
    /// Grow a tree over the rows named by `indices`.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: &[usize],
        indices: &[usize],
        n_classes: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let root = grow(x, y, indices, 0, n_classes, params, rng);
        DecisionTree { root }
    }

    /// Walk the tree and return the leaf's class distribution.
    pub fn predict_proba(&self, features: &[f64]) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature).copied().unwrap_or(0.0);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Depth of the grown tree, for diagnostics.
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

// ============================================================================
// GROWTH
// ============================================================================

fn grow(
    x: ArrayView2<'_, f64>,
    y: &[usize],
    indices: &[usize],
    depth: usize,
    n_classes: usize,
    params: &TreeParams,
    rng: &mut StdRng,
) -> TreeNode {
    let counts = class_counts(y, indices, n_classes);
    let total = indices.len();

    let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
    if depth >= params.max_depth || total < params.min_samples_split || pure {
        return leaf_from_counts(&counts, total);
    }

    let parent_gini = gini(&counts, total);
    match best_split(x, y, indices, n_classes, parent_gini, params, rng) {
        Some((feature, threshold)) => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .copied()
                .partition(|&i| x[[i, feature]] <= threshold);
            // Threshold midpoints guarantee both sides are non-empty
            let left = grow(x, y, &left_idx, depth + 1, n_classes, params, rng);
            let right = grow(x, y, &right_idx, depth + 1, n_classes, params, rng);
            TreeNode::Split {
                feature,
                threshold,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        None => leaf_from_counts(&counts, total),
    }
}

fn leaf_from_counts(counts: &[usize], total: usize) -> TreeNode {
    let distribution = if total == 0 {
        vec![0.0; counts.len()]
    } else {
        counts.iter().map(|&c| c as f64 / total as f64).collect()
    };
    TreeNode::Leaf { distribution }
}

fn class_counts(y: &[usize], indices: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in indices {
        counts[y[i]] += 1;
    }
    counts
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let sum_sq: f64 = counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total as f64;
            p * p
        })
        .sum();
    1.0 - sum_sq
}

/// Find the (feature, threshold) pair with the highest impurity gain,
/// scanning a random subset of features. Returns None when no split
/// improves on the parent.
fn best_split(
    x: ArrayView2<'_, f64>,
    y: &[usize],
    indices: &[usize],
    n_classes: usize,
    parent_gini: f64,
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    const MIN_GAIN: f64 = 1e-12;

    let n_features = x.ncols();
    let subset = params.feature_subset.clamp(1, n_features);
    let sampled = rand::seq::index::sample(rng, n_features, subset);

    let total = indices.len() as f64;
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in sampled.iter() {
        let mut column: Vec<(f64, usize)> =
            indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_counts = vec![0usize; n_classes];
        let mut right_counts = class_counts(y, indices, n_classes);

        for (pos, window) in column.windows(2).enumerate() {
            let (value, class) = window[0];
            let next_value = window[1].0;
            left_counts[class] += 1;
            right_counts[class] -= 1;
            if next_value <= value {
                continue;
            }

            let n_left = pos + 1;
            let n_right = column.len() - n_left;
            let weighted = (n_left as f64 / total) * gini(&left_counts, n_left)
                + (n_right as f64 / total) * gini(&right_counts, n_right);
            let gain = parent_gini - weighted;
            if gain > MIN_GAIN && best.map_or(true, |(_, _, g)| gain > g) {
                best = Some((feature, (value + next_value) / 2.0, gain));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 6,
            min_samples_split: 2,
            feature_subset: 2,
        }
    }

    fn two_cluster_data() -> (Array2<f64>, Vec<usize>) {
        // Class 0 clusters low on feature 0, class 1 clusters high
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            rows.extend_from_slice(&[i as f64 * 0.1, 5.0]);
            labels.push(0);
        }
        for i in 0..20 {
            rows.extend_from_slice(&[10.0 + i as f64 * 0.1, 5.0]);
            labels.push(1);
        }
        let x = Array2::from_shape_vec((40, 2), rows).unwrap();
        (x, labels)
    }

    #[test]
    fn separable_classes_are_learned_exactly() {
        let (x, y) = two_cluster_data();
        let indices: Vec<usize> = (0..y.len()).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let tree = DecisionTree::fit(x.view(), &y, &indices, 2, &params(), &mut rng);

        let low = tree.predict_proba(&[0.5, 5.0]);
        let high = tree.predict_proba(&[11.0, 5.0]);
        assert!(low[0] > 0.99, "low cluster should be class 0: {:?}", low);
        assert!(high[1] > 0.99, "high cluster should be class 1: {:?}", high);
    }

    #[test]
    fn pure_node_stops_growing() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = vec![0, 0, 0, 0];
        let indices = vec![0, 1, 2, 3];
        let mut rng = StdRng::seed_from_u64(1);
        let tree = DecisionTree::fit(x.view(), &y, &indices, 2, &params(), &mut rng);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict_proba(&[2.5]), &[1.0, 0.0]);
    }

    #[test]
    fn depth_limit_is_respected() {
        let (x, y) = two_cluster_data();
        let indices: Vec<usize> = (0..y.len()).collect();
        let shallow = TreeParams {
            max_depth: 1,
            min_samples_split: 2,
            feature_subset: 2,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let tree = DecisionTree::fit(x.view(), &y, &indices, 2, &shallow, &mut rng);
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn constant_features_yield_a_leaf() {
        let x = Array2::from_shape_vec((6, 2), vec![3.0; 12]).unwrap();
        let y = vec![0, 1, 0, 1, 0, 1];
        let indices: Vec<usize> = (0..6).collect();
        let mut rng = StdRng::seed_from_u64(5);
        let tree = DecisionTree::fit(x.view(), &y, &indices, 2, &params(), &mut rng);
        assert_eq!(tree.depth(), 0);
        let dist = tree.predict_proba(&[3.0, 3.0]);
        assert!((dist[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn distribution_sums_to_one() {
        let (x, y) = two_cluster_data();
        let indices: Vec<usize> = (0..y.len()).collect();
        let mut rng = StdRng::seed_from_u64(11);
        let tree = DecisionTree::fit(x.view(), &y, &indices, 2, &params(), &mut rng);
        let dist = tree.predict_proba(&[5.0, 5.0]);
        let sum: f64 = dist.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
