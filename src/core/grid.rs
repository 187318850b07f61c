//! Candidate grids for the Weibull parameters and the shared likelihood table.

use serde::{Deserialize, Serialize};

use crate::core::psychometric::{WeibullParams, weibull};
use crate::error::EstimatorError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridSpacing {
    Linear,
    #[default]
    Log,
}

/// `steps` values from `min` to `max` inclusive.
pub fn spaced(min: f64, max: f64, steps: usize, spacing: GridSpacing) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let last = (steps - 1) as f64;
            match spacing {
                GridSpacing::Linear => (0..steps)
                    .map(|i| min + (max - min) * i as f64 / last)
                    .collect(),
                GridSpacing::Log => {
                    let (lmin, lmax) = (min.ln(), max.ln());
                    (0..steps)
                        .map(|i| (lmin + (lmax - lmin) * i as f64 / last).exp())
                        .collect()
                }
            }
        }
    }
}

/// Fixed candidate sets. Validated once, never resized.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterGrid {
    alpha: Vec<f64>,
    beta: Vec<f64>,
    lapse: Vec<f64>,
    guess: f64,
}

impl ParameterGrid {
    pub fn new(
        alpha: Vec<f64>,
        beta: Vec<f64>,
        lapse: Vec<f64>,
        guess: f64,
    ) -> Result<Self, EstimatorError> {
        if alpha.is_empty() {
            return Err(EstimatorError::EmptyGrid("alpha"));
        }
        if beta.is_empty() {
            return Err(EstimatorError::EmptyGrid("beta"));
        }
        if lapse.is_empty() {
            return Err(EstimatorError::EmptyGrid("lapse"));
        }
        let mut prev = 0.0;
        for (i, &a) in alpha.iter().enumerate() {
            if !a.is_finite() || a <= prev {
                return Err(EstimatorError::AlphaNotAscending(i));
            }
            prev = a;
        }
        if let Some(&b) = beta.iter().find(|b| !(b.is_finite() && **b > 0.0)) {
            return Err(EstimatorError::InvalidBeta(b));
        }
        if let Some(&l) = lapse.iter().find(|l| !(**l >= 0.0 && **l < 1.0)) {
            return Err(EstimatorError::InvalidLapse(l));
        }
        let max_lapse = lapse.iter().copied().fold(0.0, f64::max);
        if !(guess >= 0.0) || guess + max_lapse >= 1.0 {
            return Err(EstimatorError::InvalidGuess {
                guess,
                lapse: max_lapse,
            });
        }
        Ok(Self {
            alpha,
            beta,
            lapse,
            guess,
        })
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    pub fn lapse(&self) -> &[f64] {
        &self.lapse
    }

    pub fn guess(&self) -> f64 {
        self.guess
    }

    /// Number of (alpha, beta, lapse) triples.
    pub fn joint_len(&self) -> usize {
        self.alpha.len() * self.beta.len() * self.lapse.len()
    }

    /// Flat joint offset, alpha-major.
    #[inline]
    pub fn joint_index(&self, a: usize, b: usize, l: usize) -> usize {
        (a * self.beta.len() + b) * self.lapse.len() + l
    }

    /// Inverse of [`joint_index`](Self::joint_index).
    #[inline]
    pub fn split_index(&self, j: usize) -> (usize, usize, usize) {
        let nl = self.lapse.len();
        let nb = self.beta.len();
        (j / (nb * nl), (j / nl) % nb, j % nl)
    }

    pub fn params_at(&self, j: usize) -> WeibullParams {
        let (a, b, l) = self.split_index(j);
        WeibullParams::new(self.alpha[a], self.beta[b], self.guess, self.lapse[l])
    }

    #[inline]
    pub fn p_correct(&self, j: usize, intensity: f64) -> f64 {
        let (a, b, l) = self.split_index(j);
        weibull(intensity, self.alpha[a], self.beta[b], self.guess, self.lapse[l])
    }
}

/// P(correct) for every stimulus candidate × joint parameter triple.
/// Stimulus candidates are the alpha grid.
#[derive(Clone, Debug)]
pub struct LikelihoodTable {
    grid: ParameterGrid,
    stimuli: Vec<f64>,
    // stimuli.len() rows of grid.joint_len() entries
    p_correct: Vec<f64>,
}

impl LikelihoodTable {
    pub fn new(grid: ParameterGrid) -> Self {
        let stimuli = grid.alpha().to_vec();
        let n = grid.joint_len();
        let mut p_correct = Vec::with_capacity(stimuli.len() * n);
        for &s in &stimuli {
            for j in 0..n {
                p_correct.push(grid.p_correct(j, s));
            }
        }
        Self {
            grid,
            stimuli,
            p_correct,
        }
    }

    pub fn grid(&self) -> &ParameterGrid {
        &self.grid
    }

    pub fn stimuli(&self) -> &[f64] {
        &self.stimuli
    }

    #[inline]
    pub fn row(&self, stimulus: usize) -> &[f64] {
        let n = self.grid.joint_len();
        &self.p_correct[stimulus * n..(stimulus + 1) * n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_spacing_hits_endpoints() {
        let v = spaced(0.1, 10.0, 5, GridSpacing::Log);
        assert_eq!(v.len(), 5);
        assert_relative_eq!(v[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(v[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(v[4], 10.0, epsilon = 1e-12);
        assert_eq!(spaced(1.0, 2.0, 1, GridSpacing::Linear), vec![1.0]);
        assert!(spaced(1.0, 2.0, 0, GridSpacing::Linear).is_empty());
    }

    #[test]
    fn joint_index_round_trips() {
        let g = ParameterGrid::new(
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0],
            vec![0.0, 0.02, 0.05, 0.1],
            0.0,
        )
        .unwrap();
        assert_eq!(g.joint_len(), 24);
        for j in 0..g.joint_len() {
            let (a, b, l) = g.split_index(j);
            assert_eq!(g.joint_index(a, b, l), j);
        }
        let p = g.params_at(g.joint_index(2, 1, 3));
        assert_eq!((p.alpha, p.beta, p.lapse), (3.0, 2.0, 0.1));
    }

    #[test]
    fn rejects_invalid_candidates() {
        assert_eq!(
            ParameterGrid::new(vec![], vec![1.0], vec![0.0], 0.0),
            Err(EstimatorError::EmptyGrid("alpha"))
        );
        assert_eq!(
            ParameterGrid::new(vec![1.0, 1.0], vec![1.0], vec![0.0], 0.0),
            Err(EstimatorError::AlphaNotAscending(1))
        );
        assert_eq!(
            ParameterGrid::new(vec![-1.0], vec![1.0], vec![0.0], 0.0),
            Err(EstimatorError::AlphaNotAscending(0))
        );
        assert_eq!(
            ParameterGrid::new(vec![1.0], vec![0.0], vec![0.0], 0.0),
            Err(EstimatorError::InvalidBeta(0.0))
        );
        assert_eq!(
            ParameterGrid::new(vec![1.0], vec![1.0], vec![1.0], 0.0),
            Err(EstimatorError::InvalidLapse(1.0))
        );
        assert!(matches!(
            ParameterGrid::new(vec![1.0], vec![1.0], vec![0.5], 0.5),
            Err(EstimatorError::InvalidGuess { .. })
        ));
    }

    #[test]
    fn table_rows_match_direct_evaluation() {
        let g = ParameterGrid::new(vec![0.5, 1.0, 2.0], vec![2.0, 4.0], vec![0.0, 0.05], 0.0)
            .unwrap();
        let table = LikelihoodTable::new(g.clone());
        for (si, &s) in table.stimuli().iter().enumerate() {
            let row = table.row(si);
            assert_eq!(row.len(), g.joint_len());
            for (j, &p) in row.iter().enumerate() {
                assert_relative_eq!(p, g.p_correct(j, s), epsilon = 1e-15);
            }
        }
    }
}
