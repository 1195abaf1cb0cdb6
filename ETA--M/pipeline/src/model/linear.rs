use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{metrics::mean_squared_error, Regressor};
use crate::error::{PipelineError, PipelineResult};

/// Gradient-descent settings for [`LinearRegressionModel`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinearParams {
    /// Full-batch epochs.
    pub epochs: usize,
    /// Step size.
    pub learning_rate: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            epochs: 500,
            learning_rate: 0.05,
        }
    }
}

/// Linear regression with bias, trained by gradient descent on standardized
/// features. The standardization statistics are part of the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearRegressionModel {
    params: LinearParams,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

impl LinearRegressionModel {
    /// Creates an untrained model.
    #[must_use]
    pub const fn new(params: LinearParams) -> Self {
        Self {
            params,
            means: Vec::new(),
            scales: Vec::new(),
            weights: Vec::new(),
            bias: 0.0,
        }
    }

    /// Learned weights in standardized feature space.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn standardize(&self, sample: ArrayView1<'_, f64>) -> Vec<f64> {
        sample
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect()
    }

    fn predict_standardized(&self, sample: &[f64]) -> f64 {
        sample
            .iter()
            .zip(&self.weights)
            .map(|(feature, weight)| feature * weight)
            .sum::<f64>()
            + self.bias
    }
}

impl Regressor for LinearRegressionModel {
    fn name(&self) -> &'static str {
        "linear_regression"
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> PipelineResult<f64> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(PipelineError::Data(format!(
                "cannot fit linear regression on {} rows and {} targets",
                x.nrows(),
                y.len()
            )));
        }
        let rows = x.nrows() as f64;
        self.means = x
            .mean_axis(Axis(0))
            .map_or_else(|| vec![0.0; x.ncols()], |m| m.to_vec());
        self.scales = x
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|s| if *s > 1e-9 { *s } else { 1.0 })
            .collect();
        let features: Vec<Vec<f64>> = x.rows().into_iter().map(|r| self.standardize(r)).collect();
        self.weights = vec![0.0; x.ncols()];
        self.bias = y.mean().unwrap_or(0.0);

        for _ in 0..self.params.epochs {
            let error: Vec<f64> = features
                .iter()
                .zip(y)
                .map(|(sample, label)| self.predict_standardized(sample) - label)
                .collect();
            for (idx, weight) in self.weights.iter_mut().enumerate() {
                let grad = error
                    .iter()
                    .zip(&features)
                    .map(|(err, sample)| err * sample[idx])
                    .sum::<f64>()
                    / rows;
                *weight -= self.params.learning_rate * grad;
            }
            let bias_grad = error.iter().sum::<f64>() / rows;
            self.bias -= self.params.learning_rate * bias_grad;
        }
        let predictions = self.predict(x);
        Ok(mean_squared_error(predictions.view(), y))
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.predict_standardized(&self.standardize(row)))
            .collect()
    }
}
