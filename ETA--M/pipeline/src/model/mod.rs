//! Interchangeable regressors over the assembled feature matrix.

/// Gradient-boosted regression trees.
pub mod boosting;
/// Gradient-descent linear regression.
pub mod linear;
/// Train/test split and error metrics.
pub mod metrics;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

pub use boosting::{BoostingParams, GradientBoostingModel};
pub use linear::{LinearParams, LinearRegressionModel};
pub use metrics::{train_test_split, Evaluation, Split};

/// A regressor consuming rows of the feature matrix.
pub trait Regressor {
    /// Stable model name used in reports and artifacts.
    fn name(&self) -> &'static str;

    /// Input width after fitting.
    fn n_features(&self) -> usize;

    /// Fits on `x`/`y`, returning the training mean squared error.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> PipelineResult<f64>;

    /// Predicts one value per row.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64>;
}

/// Which regressor a training run keeps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelChoice {
    /// Keep the linear model.
    Linear,
    /// Keep the boosted ensemble.
    #[default]
    GradientBoosting,
    /// Keep whichever candidate has the lower held-out RMSE.
    Best,
}

/// A fitted model as persisted in the model artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    /// Linear regression.
    Linear(LinearRegressionModel),
    /// Gradient-boosted trees.
    GradientBoosting(GradientBoostingModel),
}

impl TrainedModel {
    fn inner(&self) -> &dyn Regressor {
        match self {
            Self::Linear(model) => model,
            Self::GradientBoosting(model) => model,
        }
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner().name()
    }

    /// Input width the model was fitted on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    /// Predicts resolution hours, clamped at zero. Fails when the matrix width
    /// differs from the fitted width.
    pub fn predict_hours(&self, x: ArrayView2<'_, f64>) -> PipelineResult<Array1<f64>> {
        if x.ncols() != self.n_features() {
            return Err(PipelineError::SchemaMismatch(format!(
                "model expects {} features, received {}",
                self.n_features(),
                x.ncols()
            )));
        }
        Ok(self.inner().predict(x).mapv(|hours| hours.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn predictions_are_clamped_and_width_checked() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![-5.0, -5.0, 10.0, 10.0];
        let mut boosted = GradientBoostingModel::new(BoostingParams {
            min_samples_leaf: 1,
            ..BoostingParams::default()
        });
        boosted.fit(x.view(), y.view()).unwrap();
        let model = TrainedModel::GradientBoosting(boosted);
        let hours = model.predict_hours(x.view()).unwrap();
        assert!(hours.iter().all(|h| *h >= 0.0));
        assert_eq!(model.name(), "gradient_boosting");

        let wide = Array2::<f64>::zeros((1, 2));
        assert!(matches!(
            model.predict_hours(wide.view()),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn model_choice_parses_snake_case() {
        let choice: ModelChoice = serde_json::from_str("\"best\"").unwrap();
        assert_eq!(choice, ModelChoice::Best);
        assert_eq!(ModelChoice::default(), ModelChoice::GradientBoosting);
    }
}
