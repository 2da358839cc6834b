//! Closed-form statistics over CGM readings
//!
//! Every function rejects an empty slice; callers supply readings with missing
//! values already removed.

use crate::error::ComputeError;

fn ensure_non_empty(values: &[f64], what: &str) -> Result<(), ComputeError> {
    if values.is_empty() {
        return Err(ComputeError::EmptySeries(what.to_string()));
    }
    Ok(())
}

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Result<f64, ComputeError> {
    ensure_non_empty(values, "mean")?;
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Variance with `n - ddof` in the denominator (ddof = 1 gives sample variance)
///
/// NaN when there are no more than `ddof` readings.
pub fn variance(values: &[f64], ddof: usize) -> Result<f64, ComputeError> {
    ensure_non_empty(values, "variance")?;
    if values.len() <= ddof {
        return Ok(f64::NAN);
    }

    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Ok(sum_sq / (values.len() - ddof) as f64)
}

/// Largest reading
pub fn max(values: &[f64]) -> Result<f64, ComputeError> {
    ensure_non_empty(values, "max")?;
    Ok(values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Fraction of readings within `[low, high]`, bounds inclusive
pub fn time_in_range(values: &[f64], low: f64, high: f64) -> Result<f64, ComputeError> {
    ensure_non_empty(values, "time_in_range")?;
    let in_range = values.iter().filter(|&&v| v >= low && v <= high).count();
    Ok(in_range as f64 / values.len() as f64)
}

/// Linear HbA1c proxy: `slope * mean + intercept`
pub fn hba1c_estimate(values: &[f64], slope: f64, intercept: f64) -> Result<f64, ComputeError> {
    Ok(slope * mean(values)? + intercept)
}
