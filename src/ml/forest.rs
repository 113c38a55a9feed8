//! Random forest regressor
//!
//! Bagged CART regression trees split on variance reduction. Each tree gets
//! its own seed (`seed + tree_index`) so a forest is reproducible run to run.

use crate::error::{Result, ValuatorError};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Random forest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples in each leaf
    pub min_samples_leaf: usize,
    /// Features tried per split (all if None)
    pub max_features: Option<usize>,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 300,
            max_depth: 20,
            min_samples_split: 5,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl From<&crate::config::TrainingConfig> for ForestConfig {
    fn from(cfg: &crate::config::TrainingConfig) -> Self {
        Self {
            n_trees: cfg.n_trees,
            max_depth: cfg.max_depth,
            min_samples_split: cfg.min_samples_split,
            min_samples_leaf: cfg.min_samples_leaf,
            max_features: cfg.max_features,
            bootstrap: cfg.bootstrap,
            seed: cfg.seed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree stored as a flat node arena (root at 0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = features.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    sse: f64,
    /// Number of samples going left once `indices` is sorted on `feature`
    n_left: usize,
}

struct TreeBuilder<'a> {
    config: &'a ForestConfig,
    x: &'a [Vec<f64>],
    y: &'a [f64],
    n_features: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn build(&mut self, indices: &mut [usize], depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let n = indices.len();
        let (sum, sum_sq) = indices.iter().fold((0.0, 0.0), |(s, sq), &i| {
            (s + self.y[i], sq + self.y[i] * self.y[i])
        });
        let mean = sum / n as f64;
        let parent_sse = (sum_sq - sum * sum / n as f64).max(0.0);

        if depth >= self.config.max_depth
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || parent_sse / (n as f64) < 1e-12
        {
            return self.push(Node::Leaf { value: mean });
        }

        let Some(best) = self.find_best_split(indices, rng) else {
            return self.push(Node::Leaf { value: mean });
        };

        let gain = parent_sse - best.sse;
        if gain <= 1e-12 {
            return self.push(Node::Leaf { value: mean });
        }
        self.importances[best.feature] += gain;

        indices.sort_by(|&a, &b| self.x[a][best.feature].total_cmp(&self.x[b][best.feature]));
        let id = self.push(Node::Leaf { value: mean });
        let (left_idx, right_idx) = indices.split_at_mut(best.n_left);
        let left = self.build(left_idx, depth + 1, rng);
        let right = self.build(right_idx, depth + 1, rng);

        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Sorted-scan search over the candidate features
    fn find_best_split(&self, indices: &[usize], rng: &mut ChaCha8Rng) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(k) = self.config.max_features {
            if k < self.n_features {
                features.shuffle(rng);
                features.truncate(k.max(1));
            }
        }

        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();

        let mut best: Option<BestSplit> = None;
        let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);

        for &feature in &features {
            column.clear();
            column.extend(indices.iter().map(|&i| (self.x[i][feature], self.y[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let (value, target) = column[pos];
                left_sum += target;
                left_sq += target * target;

                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let next = column[pos + 1].0;
                if next <= value {
                    continue;
                }

                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);

                if best.as_ref().map_or(true, |b| sse < b.sse) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (value + next) / 2.0,
                        sse,
                        n_left,
                    });
                }
            }
        }

        best
    }
}

/// Fitted forest; predictions are the mean over trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Train a forest on an encoded matrix
    pub fn fit(config: &ForestConfig, x: &[Vec<f64>], y: &[f64]) -> Result<Self> {
        Self::fit_with_abort(config, x, y, None)
    }

    /// Train, checking `abort` between trees
    pub fn fit_with_abort(
        config: &ForestConfig,
        x: &[Vec<f64>],
        y: &[f64],
        abort: Option<&AtomicBool>,
    ) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ValuatorError::Data(format!(
                "forest needs matching non-empty inputs, got {} rows and {} targets",
                x.len(),
                y.len()
            )));
        }
        if config.n_trees == 0 {
            return Err(ValuatorError::Data("forest needs at least one tree".into()));
        }

        let n_samples = x.len();
        let n_features = x[0].len();
        let mut trees = Vec::with_capacity(config.n_trees);
        let mut importances = vec![0.0; n_features];

        for tree_idx in 0..config.n_trees {
            if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(ValuatorError::Cancelled {
                    trees_built: tree_idx,
                });
            }

            let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(tree_idx as u64));
            let mut indices: Vec<usize> = if config.bootstrap {
                (0..n_samples).map(|_| rng.random_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };

            let mut builder = TreeBuilder {
                config,
                x,
                y,
                n_features,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
            };
            builder.build(&mut indices, 0, &mut rng);

            for (total, imp) in importances.iter_mut().zip(&builder.importances) {
                *total += imp;
            }
            trees.push(RegressionTree {
                nodes: builder.nodes,
            });
        }

        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut importances {
                *imp /= sum;
            }
        }

        tracing::debug!(
            "Fitted {} trees on {} samples x {} features",
            trees.len(),
            n_samples,
            n_features
        );

        Ok(Self {
            config: config.clone(),
            trees,
            feature_importances: importances,
        })
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict_one(features)).sum();
        total / self.trees.len() as f64
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn max_tree_depth(&self) -> usize {
        self.trees.iter().map(|t| t.depth()).max().unwrap_or(0)
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Normalized variance-reduction importances per encoded column
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}
