//! CART (Classification and Regression Tree) builder
//!
//! Fits a single regression tree to second-order gradient statistics using
//! the exact-greedy algorithm: every boundary between distinct sorted
//! feature values is a split candidate, and ties on gain are resolved by
//! [`SplitTieBreaker`] so the chosen tree never depends on iteration order.

use crate::deterministic::SplitTieBreaker;
use crate::tree::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Minimum hessian sum required in each child
    pub min_child_weight: f64,
    /// L2 regularisation on leaf values
    pub lambda: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_leaf: 1,
            min_child_weight: 1.0,
            lambda: 1.0,
        }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain
            || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

/// Build a regression tree on gradients and hessians
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    /// All three slices must have the same length; rows must share one width.
    pub fn new(
        features: &'a [Vec<f64>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), gradients.len());
        debug_assert_eq!(features.len(), hessians.len());

        let feature_count = features.first().map(Vec::len).unwrap_or(0);

        Self {
            config,
            features,
            gradients,
            hessians,
            feature_count,
        }
    }

    /// Build tree with unit weight; the caller sets the shrinkage.
    pub fn build(&self) -> Tree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.features.len()).collect();

        self.build_node(&indices, 0, &mut nodes, 0);

        Tree::new(nodes, 1.0)
    }

    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        node_id: usize,
    ) -> i32 {
        let current_idx = nodes.len() as i32;
        let (sum_g, sum_h) = self.sum_gradients_hessians(indices);

        let split = if depth >= self.config.max_depth
            || indices.len() < 2 * self.config.min_samples_leaf.max(1)
        {
            None
        } else {
            self.find_best_split(indices, sum_g, sum_h, node_id)
        };

        let Some(split) = split else {
            nodes.push(Node::leaf(node_id as i32, self.leaf_value(sum_g, sum_h)));
            return current_idx;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&idx| self.features[idx][split.feature_idx] <= split.threshold);

        // Reserve space for current node; children are patched in below.
        nodes.push(Node::internal(
            node_id as i32,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
        ));

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, node_id * 2 + 1);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, node_id * 2 + 2);

        nodes[current_idx as usize].left = left_idx;
        nodes[current_idx as usize].right = right_idx;

        current_idx
    }

    /// Exact-greedy scan over every feature's sorted values
    fn find_best_split(
        &self,
        indices: &[usize],
        sum_g: f64,
        sum_h: f64,
        node_id: usize,
    ) -> Option<SplitCandidate> {
        let lambda = self.config.lambda;
        let parent_score = sum_g * sum_g / (sum_h + lambda);
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;

        let mut sorted = indices.to_vec();
        for feature_idx in 0..self.feature_count {
            sorted.sort_by(|&a, &b| {
                self.features[a][feature_idx]
                    .total_cmp(&self.features[b][feature_idx])
                    .then(a.cmp(&b))
            });

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for (rank, window) in sorted.windows(2).enumerate() {
                let (idx, next) = (window[0], window[1]);
                g_left += self.gradients[idx];
                h_left += self.hessians[idx];

                let value = self.features[idx][feature_idx];
                let next_value = self.features[next][feature_idx];
                if value == next_value {
                    continue;
                }

                let n_left = rank + 1;
                let n_right = sorted.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let g_right = sum_g - g_left;
                let h_right = sum_h - h_left;
                if h_left < self.config.min_child_weight || h_right < self.config.min_child_weight {
                    continue;
                }

                let gain = 0.5
                    * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                        - parent_score);
                if gain.is_nan() || gain <= 0.0 {
                    continue;
                }

                let candidate = SplitCandidate {
                    feature_idx,
                    threshold: value + (next_value - value) / 2.0,
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, rank, node_id),
                };

                if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    fn sum_gradients_hessians(&self, indices: &[usize]) -> (f64, f64) {
        indices.iter().fold((0.0, 0.0), |(g, h), &idx| {
            (g + self.gradients[idx], h + self.hessians[idx])
        })
    }

    /// Optimal leaf value: -G / (H + lambda)
    fn leaf_value(&self, sum_g: f64, sum_h: f64) -> f64 {
        let denom = sum_h + self.config.lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -sum_g / denom
    }
}
