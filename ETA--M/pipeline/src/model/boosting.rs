use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{metrics::mean_squared_error, Regressor};
use crate::error::{PipelineError, PipelineResult};

/// Settings for [`GradientBoostingModel`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of trees.
    pub rounds: usize,
    /// Shrinkage applied to each tree.
    pub learning_rate: f64,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum rows on each side of a split.
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "node", rename_all = "snake_case")]
enum TreeNode {
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

/// Least-squares regression tree stored as a flat node list; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn fit(x: ArrayView2<'_, f64>, targets: &[f64], params: &BoostingParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let indices: Vec<usize> = (0..targets.len()).collect();
        tree.grow(x, targets, indices, 0, params);
        tree
    }

    fn grow(
        &mut self,
        x: ArrayView2<'_, f64>,
        targets: &[f64],
        indices: Vec<usize>,
        depth: usize,
        params: &BoostingParams,
    ) -> usize {
        let slot = self.nodes.len();
        let mean = indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64;
        self.nodes.push(TreeNode::Leaf { value: mean });
        if depth >= params.max_depth {
            return slot;
        }
        let Some((feature, threshold)) = best_split(x, targets, &indices, params.min_samples_leaf)
        else {
            return slot;
        };
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, feature]] <= threshold);
        let left = self.grow(x, targets, left_idx, depth + 1, params);
        let right = self.grow(x, targets, right_idx, depth + 1, params);
        self.nodes[slot] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut slot = 0;
        loop {
            match self.nodes.get(slot) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    slot = if value <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }
}

/// Best variance-reducing split as `(feature, threshold)`, if any split improves.
fn best_split(
    x: ArrayView2<'_, f64>,
    targets: &[f64],
    indices: &[usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let n = indices.len();
    let min_leaf = min_leaf.max(1);
    if n < 2 * min_leaf {
        return None;
    }
    let total: f64 = indices.iter().map(|&i| targets[i]).sum();
    let parent_score = total * total / n as f64;
    let mut best: Option<(usize, f64, f64)> = None;
    let mut order = indices.to_vec();
    for feature in 0..x.ncols() {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let mut left_sum = 0.0;
        for split in 1..n {
            left_sum += targets[order[split - 1]];
            let lower = x[[order[split - 1], feature]];
            let upper = x[[order[split], feature]];
            if split < min_leaf || n - split < min_leaf || lower == upper {
                continue;
            }
            let right_sum = total - left_sum;
            let score =
                left_sum * left_sum / split as f64 + right_sum * right_sum / (n - split) as f64;
            let gain = score - parent_score;
            if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                best = Some((feature, (lower + upper) / 2.0, gain));
            }
        }
    }
    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Gradient-boosted regression trees on squared error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradientBoostingModel {
    params: BoostingParams,
    n_features: usize,
    base: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostingModel {
    /// Creates an untrained ensemble.
    #[must_use]
    pub const fn new(params: BoostingParams) -> Self {
        Self {
            params,
            n_features: 0,
            base: 0.0,
            trees: Vec::new(),
        }
    }

    /// Number of fitted trees.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoostingModel {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> PipelineResult<f64> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(PipelineError::Data(format!(
                "cannot fit gradient boosting on {} rows and {} targets",
                x.nrows(),
                y.len()
            )));
        }
        self.n_features = x.ncols();
        self.base = y.mean().unwrap_or(0.0);
        self.trees.clear();
        let mut current = vec![self.base; y.len()];
        for _ in 0..self.params.rounds {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let tree = RegressionTree::fit(x, &residuals, &self.params);
            for (row, prediction) in x.rows().into_iter().zip(current.iter_mut()) {
                *prediction += self.params.learning_rate * tree.predict_row(row);
            }
            let is_stump = tree.nodes.len() == 1;
            self.trees.push(tree);
            if is_stump {
                break;
            }
        }
        Ok(mean_squared_error(Array1::from(current).view(), y))
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                self.base
                    + self
                        .trees
                        .iter()
                        .map(|tree| self.params.learning_rate * tree.predict_row(row))
                        .sum::<f64>()
            })
            .collect()
    }
}
