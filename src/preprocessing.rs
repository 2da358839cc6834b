//! Feature scaling
//!
//! Standardization followed by range scaling, applied column-wise to the
//! numeric matrix built from an augmented clinical table. NaN cells are
//! ignored when fitting and passed through unchanged when transforming.

use crate::error::ComputeError;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Column-wise transformer with a fit/transform interface
pub trait Transformer {
    /// Learn per-column parameters
    fn fit(&mut self, x: &Array2<f64>) -> Result<(), ComputeError>;

    /// Apply the learned parameters
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ComputeError>;

    fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>, ComputeError> {
        self.fit(x)?;
        self.transform(x)
    }

    fn name(&self) -> &'static str;
}

fn ensure_rows(x: &Array2<f64>, name: &str) -> Result<(), ComputeError> {
    if x.nrows() == 0 {
        return Err(ComputeError::ShapeMismatch(format!(
            "{}: cannot fit on an empty matrix",
            name
        )));
    }
    Ok(())
}

/// Non-NaN values of one column
fn observed(column: ArrayView1<f64>) -> Array1<f64> {
    column.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// `(x - offset) / scale`, broadcast over rows
fn apply(
    x: &Array2<f64>,
    offset: &Array1<f64>,
    scale: &Array1<f64>,
    name: &str,
) -> Result<Array2<f64>, ComputeError> {
    if x.ncols() != offset.len() {
        return Err(ComputeError::ShapeMismatch(format!(
            "{}: matrix has {} columns, fitted on {}",
            name,
            x.ncols(),
            offset.len()
        )));
    }
    Ok((x - offset) / scale)
}

/// Zero scale would divide by zero; such columns are only centred
fn safe_scale(scale: f64) -> f64 {
    if scale == 0.0 || !scale.is_finite() {
        1.0
    } else {
        scale
    }
}

/// Standardize columns to zero mean and unit variance (population std)
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }
}

impl Transformer for StandardScaler {
    fn fit(&mut self, x: &Array2<f64>) -> Result<(), ComputeError> {
        ensure_rows(x, self.name())?;
        let (means, scales): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|column| {
                let values = observed(column);
                match values.mean() {
                    Some(mean) => (mean, safe_scale(values.std(0.0))),
                    // all NaN
                    None => (0.0, 1.0),
                }
            })
            .unzip();

        self.mean = Some(Array1::from(means));
        self.scale = Some(Array1::from(scales));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ComputeError> {
        match (&self.mean, &self.scale) {
            (Some(mean), Some(scale)) => apply(x, mean, scale, self.name()),
            _ => Err(ComputeError::ScalerNotFitted(self.name().to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "standard_scaler"
    }
}

/// Scale columns into [0, 1] using the fitted min and max
#[derive(Debug, Clone, Default)]
pub struct MinMaxScaler {
    data_min: Option<Array1<f64>>,
    data_range: Option<Array1<f64>>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_min(&self) -> Option<&Array1<f64>> {
        self.data_min.as_ref()
    }
}

impl Transformer for MinMaxScaler {
    fn fit(&mut self, x: &Array2<f64>) -> Result<(), ComputeError> {
        ensure_rows(x, self.name())?;
        let (mins, ranges): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|column| {
                let values = observed(column);
                if values.is_empty() {
                    return (0.0, 1.0);
                }
                let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
                (min, safe_scale(max - min))
            })
            .unzip();

        self.data_min = Some(Array1::from(mins));
        self.data_range = Some(Array1::from(ranges));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ComputeError> {
        match (&self.data_min, &self.data_range) {
            (Some(min), Some(range)) => apply(x, min, range, self.name()),
            _ => Err(ComputeError::ScalerNotFitted(self.name().to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "min_max_scaler"
    }
}

/// The preprocessing chain used by the estimator: standardize, then range-scale
pub fn default_preprocessing() -> Vec<Box<dyn Transformer>> {
    vec![Box::new(StandardScaler::new()), Box::new(MinMaxScaler::new())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn matrix() -> Array2<f64> {
        array![
            [1.0, 10.0, 5.0],
            [2.0, 20.0, 5.0],
            [3.0, 30.0, 5.0],
            [4.0, 40.0, 5.0],
        ]
    }

    #[test]
    fn test_standard_scaler_zero_mean_unit_variance() {
        let mut scaler = StandardScaler::new();
        let out = scaler.fit_transform(&matrix()).unwrap();

        for col in 0..2 {
            let values = out.column(col);
            assert!(values.mean().unwrap().abs() < 1e-12);
            assert!((values.var(0.0) - 1.0).abs() < 1e-12);
        }
        // Constant column is centred, not divided by zero
        assert_eq!(out.column(2).to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn test_min_max_scaler_unit_interval() {
        let mut scaler = MinMaxScaler::new();
        let out = scaler.fit_transform(&matrix()).unwrap();

        assert!((out[[0, 0]] - 0.0).abs() < 1e-12);
        assert!((out[[3, 0]] - 1.0).abs() < 1e-12);
        assert!((out[[1, 0]] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(out.column(2).to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn test_nan_ignored_when_fitting() {
        let x = array![[1.0, 7.0], [f64::NAN, 9.0], [3.0, 11.0]];
        let mut scaler = MinMaxScaler::new();
        let out = scaler.fit_transform(&x).unwrap();

        assert_eq!(out[[0, 0]], 0.0);
        assert!(out[[1, 0]].is_nan());
        assert_eq!(out[[2, 0]], 1.0);
        assert_eq!(out.column(1).to_vec(), vec![0.0, 0.5, 1.0]);

        let mut standard = StandardScaler::new();
        standard.fit(&x).unwrap();
        assert_eq!(standard.mean(), Some(&array![2.0, 9.0]));
        let scale = standard.scale().unwrap();
        assert!((scale[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_nan_column_passes_through() {
        let x = array![[f64::NAN, 1.0], [f64::NAN, 3.0]];
        let mut scaler = StandardScaler::new();
        let out = scaler.fit_transform(&x).unwrap();
        assert!(out.column(0).iter().all(|v| v.is_nan()));
        assert!((out[[0, 1]] + 1.0).abs() < 1e-12);
        assert!((out[[1, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_before_fit() {
        let scaler = StandardScaler::new();
        assert!(matches!(
            scaler.transform(&matrix()),
            Err(ComputeError::ScalerNotFitted(_))
        ));
        assert!(MinMaxScaler::new().transform(&matrix()).is_err());
    }

    #[test]
    fn test_shape_checks() {
        let mut scaler = StandardScaler::new();
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(scaler.fit(&empty), Err(ComputeError::ShapeMismatch(_))));

        scaler.fit(&matrix()).unwrap();
        let narrow = array![[1.0, 2.0]];
        assert!(matches!(
            scaler.transform(&narrow),
            Err(ComputeError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_default_chain_order() {
        let chain = default_preprocessing();
        let names: Vec<&str> = chain.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["standard_scaler", "min_max_scaler"]);
    }
}
