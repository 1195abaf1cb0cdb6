use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Train/test partition of a feature matrix and its targets.
#[derive(Debug, Clone)]
pub struct Split {
    /// Training features.
    pub x_train: Array2<f64>,
    /// Training targets.
    pub y_train: Array1<f64>,
    /// Held-out features.
    pub x_test: Array2<f64>,
    /// Held-out targets.
    pub y_test: Array1<f64>,
}

/// Shuffles rows with a seeded generator and holds out `test_ratio` of them.
/// At least one row stays on each side when there are two or more rows.
#[must_use]
pub fn train_test_split(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    test_ratio: f64,
    seed: u64,
) -> Split {
    let rows = x.nrows();
    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let mut test_len = (test_ratio.clamp(0.0, 1.0) * rows as f64).round() as usize;
    if rows >= 2 {
        test_len = test_len.clamp(1, rows - 1);
    } else {
        test_len = 0;
    }
    let (test_idx, train_idx) = order.split_at(test_len);
    Split {
        x_train: x.select(Axis(0), train_idx),
        y_train: y.select(Axis(0), train_idx),
        x_test: x.select(Axis(0), test_idx),
        y_test: y.select(Axis(0), test_idx),
    }
}

/// Computes mean squared error between predictions and labels.
#[must_use]
pub fn mean_squared_error(predictions: ArrayView1<'_, f64>, labels: ArrayView1<'_, f64>) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(labels)
        .map(|(pred, label)| (pred - label).powi(2))
        .sum::<f64>()
        / predictions.len() as f64
}

/// Computes mean absolute error between predictions and labels.
#[must_use]
pub fn mean_absolute_error(predictions: ArrayView1<'_, f64>, labels: ArrayView1<'_, f64>) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(labels)
        .map(|(pred, label)| (pred - label).abs())
        .sum::<f64>()
        / predictions.len() as f64
}

/// Coefficient of determination; 0 when the labels have no variance.
#[must_use]
pub fn r2_score(predictions: ArrayView1<'_, f64>, labels: ArrayView1<'_, f64>) -> f64 {
    if labels.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    let mean = labels.sum() / labels.len() as f64;
    let total: f64 = labels.iter().map(|l| (l - mean).powi(2)).sum();
    if total == 0.0 {
        return 0.0;
    }
    let residual: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(p, l)| (l - p).powi(2))
        .sum();
    1.0 - residual / total
}

/// Held-out error metrics for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    /// Mean absolute error, hours.
    pub mae: f64,
    /// Root mean squared error, hours.
    pub rmse: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

impl Evaluation {
    /// Scores predictions against labels.
    #[must_use]
    pub fn score(predictions: ArrayView1<'_, f64>, labels: ArrayView1<'_, f64>) -> Self {
        Self {
            mae: mean_absolute_error(predictions, labels),
            rmse: mean_squared_error(predictions, labels).sqrt(),
            r2: r2_score(predictions, labels),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    #[test]
    fn metrics_handle_inputs() {
        let preds = array![1.0, 2.0, 3.0];
        let labels = array![1.0, 2.5, 2.0];
        assert!((mean_absolute_error(preds.view(), labels.view()) - 0.5).abs() < 1e-12);
        assert!((mean_squared_error(preds.view(), labels.view()) - 1.25 / 3.0).abs() < 1e-12);
        assert!((r2_score(labels.view(), labels.view()) - 1.0).abs() < 1e-12);
        assert_eq!(mean_squared_error(preds.view(), array![1.0].view()), 0.0);
    }

    #[test]
    fn split_generates_partitions() {
        let x = Array::from_shape_fn((10, 2), |(r, c)| (r * 2 + c) as f64);
        let y = Array::from_iter((0..10).map(f64::from));
        let split = train_test_split(x.view(), y.view(), 0.2, 42);
        assert_eq!(split.x_train.nrows(), 8);
        assert_eq!(split.x_test.nrows(), 2);
        assert_eq!(split.y_test.len(), 2);
        // Rows and targets stay aligned.
        for (row, target) in split.x_test.rows().into_iter().zip(&split.y_test) {
            assert_eq!(row[0], target * 2.0);
        }
    }

    #[test]
    fn split_is_seeded() {
        let x = Array::from_shape_fn((20, 1), |(r, _)| r as f64);
        let y = Array::from_iter((0..20).map(f64::from));
        let a = train_test_split(x.view(), y.view(), 0.25, 7);
        let b = train_test_split(x.view(), y.view(), 0.25, 7);
        assert_eq!(a.y_test, b.y_test);
    }
}
