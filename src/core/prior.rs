//! Prior shaping for the alpha marginal of each cell.

use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

/// Produces an (unnormalised) alpha prior for one cell, given its bin indices.
pub trait AlphaPrior {
    fn weights(&self, alpha_grid: &[f64], cell_bins: &[usize]) -> Vec<f64>;
}

impl<F> AlphaPrior for F
where
    F: Fn(&[f64], &[usize]) -> Vec<f64>,
{
    fn weights(&self, alpha_grid: &[f64], cell_bins: &[usize]) -> Vec<f64> {
        self(alpha_grid, cell_bins)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UniformPrior;

impl AlphaPrior for UniformPrior {
    fn weights(&self, alpha_grid: &[f64], _cell_bins: &[usize]) -> Vec<f64> {
        vec![1.0; alpha_grid.len()]
    }
}

/// Log-normal over alpha. The median grows with every bin index:
/// `median = base_median * exp(sum_d gains[d] * idx_d)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogNormalPrior {
    pub base_median: f64,
    pub sigma: f64,
    #[serde(default)]
    pub gains: Vec<f64>,
}

impl LogNormalPrior {
    /// Median and sigma must be finite and positive, gains finite and non-negative.
    pub fn validate(&self) -> Result<(), EstimatorError> {
        if !(self.base_median.is_finite() && self.base_median > 0.0) {
            return Err(EstimatorError::InvalidPrior(format!(
                "base_median {} must be finite and positive",
                self.base_median
            )));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(EstimatorError::InvalidPrior(format!(
                "sigma {} must be finite and positive",
                self.sigma
            )));
        }
        if let Some((d, g)) = self
            .gains
            .iter()
            .enumerate()
            .find(|(_, g)| !(g.is_finite() && **g >= 0.0))
        {
            return Err(EstimatorError::InvalidPrior(format!(
                "gain {g} for dimension {d} must be finite and non-negative"
            )));
        }
        Ok(())
    }

    pub fn median_for(&self, cell_bins: &[usize]) -> f64 {
        let exponent: f64 = cell_bins
            .iter()
            .enumerate()
            .map(|(d, &idx)| self.gains.get(d).copied().unwrap_or(0.0).max(0.0) * idx as f64)
            .sum();
        self.base_median * exponent.exp()
    }
}

impl AlphaPrior for LogNormalPrior {
    fn weights(&self, alpha_grid: &[f64], cell_bins: &[usize]) -> Vec<f64> {
        let median = self.median_for(cell_bins);
        if !(median > 0.0) || !(self.sigma > 0.0) {
            return vec![0.0; alpha_grid.len()];
        }
        let mu = median.ln();
        let two_var = 2.0 * self.sigma * self.sigma;
        alpha_grid
            .iter()
            .map(|&a| {
                if a <= 0.0 {
                    return 0.0;
                }
                let z = a.ln() - mu;
                (-(z * z) / two_var).exp() / a
            })
            .collect()
    }
}

/// Scale to unit mass; uniform when the mass is zero or not finite.
pub fn normalize_or_uniform(weights: &[f64]) -> Vec<f64> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let sane = weights.iter().all(|w| w.is_finite() && *w >= 0.0);
    let mass: f64 = weights.iter().sum();
    if !sane || !(mass > 0.0) || !mass.is_finite() {
        return vec![1.0 / n as f64; n];
    }
    weights.iter().map(|w| w / mass).collect()
}
