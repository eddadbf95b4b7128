//! Decision tree structures for GBDT scoring
//!
//! Trees are stored as flat node arrays with the root at index 0.

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes:
/// - `feature_idx >= 0`: index into feature vector
/// - `left` and `right` point to child node indices
/// - `leaf` is `None`
///
/// For leaf nodes:
/// - `feature_idx == -1`
/// - `leaf` contains the raw (unweighted) output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID in heap numbering (for reference, not used in traversal)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    /// Rows with `feature <= threshold` go left
    pub threshold: f64,

    /// Leaf value (Some for leaf nodes, None for internal nodes)
    pub leaf: Option<f64>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(id: i32, feature_idx: i32, threshold: f64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, value: f64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A single regression tree in the boosted ensemble
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,

    /// Shrinkage applied to every leaf of this tree
    pub weight: f64,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, weight: f64) -> Self {
        Self { nodes, weight }
    }

    /// Raw leaf output for a feature vector. Malformed trees score 0.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }

            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0.0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next < 0 {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    /// Weighted contribution of this tree to the ensemble margin
    pub fn contribution(&self, features: &[f64]) -> f64 {
        self.weight * self.evaluate(features)
    }

    /// Maximum root-to-leaf depth (a lone leaf has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() => {
                    1 + walk(nodes, node.left as usize).max(walk(nodes, node.right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Validate tree structure against the expected feature count
    pub fn validate(&self, feature_count: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        if !self.weight.is_finite() {
            return Err(format!("tree weight {} is not finite", self.weight));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(v) if v.is_finite() => {}
                    Some(v) => return Err(format!("leaf node {i} has non-finite value {v}")),
                    None => return Err(format!("leaf node {i} has no leaf value")),
                }
                continue;
            }

            for (side, child) in [("left", node.left), ("right", node.right)] {
                // Children are always emitted after their parent.
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("node {i} has invalid {side} child: {child}"));
                }
            }
            if node.feature_idx < 0 || node.feature_idx as usize >= feature_count {
                return Err(format!(
                    "node {i} splits on feature {} but model has {feature_count} features",
                    node.feature_idx
                ));
            }
            if !node.threshold.is_finite() {
                return Err(format!("node {i} has non-finite threshold"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        // if feature[0] <= 12.5 -> -1.0 else 2.0
        Tree::new(
            vec![
                Node::internal(0, 0, 12.5, 1, 2),
                Node::leaf(1, -1.0),
                Node::leaf(2, 2.0),
            ],
            0.5,
        )
    }

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(0, 3, 1.5, 1, 2);
        assert!(!internal.is_leaf());
        assert_eq!(internal.feature_idx, 3);

        let leaf = Node::leaf(1, -0.25);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.leaf, Some(-0.25));
        assert_eq!(leaf.feature_idx, -1);
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[3.0]), -1.0);
        assert_eq!(tree.evaluate(&[12.5]), -1.0); // equal goes left
        assert_eq!(tree.evaluate(&[13.0]), 2.0);
        assert_eq!(tree.contribution(&[13.0]), 1.0);
    }

    #[test]
    fn test_missing_feature_scores_zero() {
        assert_eq!(stump().evaluate(&[]), 0.0);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate(1).is_ok());
        assert!(stump().validate(0).is_err());

        let bad_child = Tree::new(
            vec![
                Node::internal(0, 0, 1.0, 5, 2),
                Node::leaf(1, 0.0),
                Node::leaf(2, 0.0),
            ],
            1.0,
        );
        assert!(bad_child.validate(1).is_err());

        assert!(Tree::new(vec![], 1.0).validate(1).is_err());
    }

    #[test]
    fn test_depth() {
        assert_eq!(stump().depth(), 1);
        assert_eq!(Tree::new(vec![Node::leaf(0, 1.0)], 1.0).depth(), 0);
    }
}
