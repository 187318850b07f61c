//! One context cell: a joint posterior over (alpha, beta, lapse) updated by
//! Bayes' rule with the Weibull likelihood, and QUEST+ stimulus selection.

use std::sync::Arc;

use serde::Serialize;

use crate::core::grid::LikelihoodTable;
use crate::core::prior::normalize_or_uniform;
use crate::core::psychometric::{WeibullParams, entropy};
use crate::error::UpdateError;

/// Posterior point summaries. Each field is `None` when it cannot be computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PosteriorSummary {
    pub alpha_mean: Option<f64>,
    pub beta_mean: Option<f64>,
    pub lapse_mean: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct QuestCell {
    table: Arc<LikelihoodTable>,
    posterior: Vec<f64>,
    trials: u32,
}

impl QuestCell {
    /// `alpha_prior` must have one weight per alpha candidate; it is
    /// normalised here. Beta and lapse start uniform.
    pub fn new(table: Arc<LikelihoodTable>, alpha_prior: &[f64]) -> Self {
        let grid = table.grid();
        let (na, nb, nl) = (grid.alpha().len(), grid.beta().len(), grid.lapse().len());
        let alpha_w = if alpha_prior.len() == na {
            normalize_or_uniform(alpha_prior)
        } else {
            normalize_or_uniform(&vec![1.0; na])
        };
        let other = 1.0 / (nb * nl) as f64;
        let mut posterior = Vec::with_capacity(grid.joint_len());
        for &wa in &alpha_w {
            for _ in 0..nb * nl {
                posterior.push(wa * other);
            }
        }
        Self {
            table,
            posterior,
            trials: 0,
        }
    }

    pub fn trials(&self) -> u32 {
        self.trials
    }

    pub fn posterior(&self) -> &[f64] {
        &self.posterior
    }

    pub fn table(&self) -> &LikelihoodTable {
        &self.table
    }

    /// Multiply in the likelihood of `detected` at `intensity` and renormalise.
    /// The posterior is untouched on error.
    pub fn update(&mut self, intensity: f64, detected: bool) -> Result<(), UpdateError> {
        if !intensity.is_finite() {
            return Err(UpdateError::NonFiniteStimulus(intensity));
        }
        let grid = self.table.grid();
        let next: Vec<f64> = self
            .posterior
            .iter()
            .enumerate()
            .map(|(j, &w)| {
                let p = grid.p_correct(j, intensity);
                w * if detected { p } else { 1.0 - p }
            })
            .collect();
        let mass: f64 = next.iter().sum();
        if !mass.is_finite() {
            return Err(UpdateError::NonFinitePosterior);
        }
        if mass <= 0.0 {
            return Err(UpdateError::ZeroPosterior);
        }
        self.posterior = next.into_iter().map(|w| w / mass).collect();
        self.trials += 1;
        Ok(())
    }

    /// Index into the stimulus candidates that minimises expected posterior
    /// entropy after one more trial. Ties keep the lowest index.
    pub fn next_stimulus_index(&self) -> usize {
        let n_stim = self.table.stimuli().len();
        let mut best = (0usize, f64::INFINITY);
        let mut hit = vec![0.0; self.posterior.len()];
        let mut miss = vec![0.0; self.posterior.len()];
        for si in 0..n_stim {
            let row = self.table.row(si);
            let mut p_hit = 0.0;
            for ((h, m), (&w, &p)) in hit
                .iter_mut()
                .zip(miss.iter_mut())
                .zip(self.posterior.iter().zip(row))
            {
                *h = w * p;
                *m = w * (1.0 - p);
                p_hit += *h;
            }
            let p_miss = 1.0 - p_hit;
            let expected = p_hit * conditional_entropy(&hit, p_hit)
                + p_miss * conditional_entropy(&miss, p_miss);
            if expected < best.1 {
                best = (si, expected);
            }
        }
        best.0
    }

    /// Unrefined next intensity.
    pub fn next_stimulus(&self) -> f64 {
        self.table.stimuli()[self.next_stimulus_index()]
    }

    /// Maximum a posteriori parameters. Ties keep the first joint index.
    pub fn map_estimate(&self, min_trials: u32) -> Result<WeibullParams, UpdateError> {
        if self.trials < min_trials {
            return Err(UpdateError::InsufficientTrials {
                seen: self.trials,
                required: min_trials,
            });
        }
        let mut best: Option<(usize, f64)> = None;
        for (j, &w) in self.posterior.iter().enumerate() {
            if !w.is_finite() {
                return Err(UpdateError::NonFinitePosterior);
            }
            match best {
                Some((_, bw)) if bw >= w => {}
                _ => best = Some((j, w)),
            }
        }
        match best {
            Some((j, w)) if w > 0.0 => Ok(self.table.grid().params_at(j)),
            _ => Err(UpdateError::ZeroPosterior),
        }
    }

    /// Posterior means of each parameter.
    pub fn summary(&self) -> PosteriorSummary {
        let grid = self.table.grid();
        let mut mass = 0.0;
        let (mut a, mut b, mut l) = (0.0, 0.0, 0.0);
        for (j, &w) in self.posterior.iter().enumerate() {
            let p = grid.params_at(j);
            mass += w;
            a += w * p.alpha;
            b += w * p.beta;
            l += w * p.lapse;
        }
        let finite = |v: f64| (mass > 0.0 && v.is_finite()).then(|| v / mass);
        PosteriorSummary {
            alpha_mean: finite(a),
            beta_mean: finite(b),
            lapse_mean: finite(l),
        }
    }

    /// Marginal distribution over the alpha candidates.
    pub fn alpha_marginal(&self) -> Vec<f64> {
        let grid = self.table.grid();
        let block = grid.beta().len() * grid.lapse().len();
        self.posterior
            .chunks(block)
            .map(|c| c.iter().sum())
            .collect()
    }

    /// Replace the posterior with a point mass on one triple.
    pub fn collapse_to(
        &mut self,
        alpha: usize,
        beta: usize,
        lapse: usize,
    ) -> Result<(), UpdateError> {
        let grid = self.table.grid();
        if alpha >= grid.alpha().len() || beta >= grid.beta().len() || lapse >= grid.lapse().len() {
            return Err(UpdateError::IndexOutOfRange { alpha, beta, lapse });
        }
        let j = grid.joint_index(alpha, beta, lapse);
        self.posterior.iter_mut().for_each(|w| *w = 0.0);
        self.posterior[j] = 1.0;
        Ok(())
    }
}

fn conditional_entropy(joint: &[f64], marginal: f64) -> f64 {
    if !(marginal > 0.0) {
        return 0.0;
    }
    let h = entropy(joint);
    // H(w / m) = H(w) / m + ln m for weights summing to m
    h / marginal + marginal.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::{GridSpacing, ParameterGrid, spaced};
    use approx::assert_abs_diff_eq;

    fn table() -> Arc<LikelihoodTable> {
        let grid = ParameterGrid::new(
            spaced(0.05, 2.0, 20, GridSpacing::Log),
            vec![1.5, 3.0],
            vec![0.0, 0.04],
            0.0,
        )
        .unwrap();
        Arc::new(LikelihoodTable::new(grid))
    }

    #[test]
    fn prior_is_normalised_with_uniform_nuisance() {
        let t = table();
        let mut prior = vec![0.0; 20];
        prior[5] = 2.0;
        let cell = QuestCell::new(t.clone(), &prior);
        assert_abs_diff_eq!(cell.posterior().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        let marginal = cell.alpha_marginal();
        assert_abs_diff_eq!(marginal[5], 1.0, epsilon = 1e-12);
        let j = t.grid().joint_index(5, 1, 1);
        assert_abs_diff_eq!(cell.posterior()[j], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn wrong_length_prior_falls_back_to_uniform() {
        let cell = QuestCell::new(table(), &[1.0, 2.0]);
        for w in cell.alpha_marginal() {
            assert_abs_diff_eq!(w, 0.05, epsilon = 1e-12);
        }
    }

    #[test]
    fn detections_shift_alpha_down_misses_shift_up() {
        let t = table();
        let base = QuestCell::new(t.clone(), &[1.0; 20]);
        let start = base.summary().alpha_mean.unwrap();

        let mut seen = base.clone();
        let mut missed = base.clone();
        for _ in 0..8 {
            seen.update(0.3, true).unwrap();
            missed.update(0.3, false).unwrap();
        }
        assert!(seen.summary().alpha_mean.unwrap() < start);
        assert!(missed.summary().alpha_mean.unwrap() > start);
        assert_eq!(seen.trials(), 8);
        assert_abs_diff_eq!(seen.posterior().iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rejected_update_keeps_state() {
        let mut cell = QuestCell::new(table(), &[1.0; 20]);
        let before = cell.posterior().to_vec();
        assert!(matches!(
            cell.update(f64::NAN, true),
            Err(UpdateError::NonFiniteStimulus(_))
        ));
        assert_eq!(
            cell.update(f64::INFINITY, false),
            Err(UpdateError::NonFiniteStimulus(f64::INFINITY))
        );
        assert_eq!(cell.posterior(), &before[..]);
        assert_eq!(cell.trials(), 0);
    }

    #[test]
    fn zero_likelihood_is_reported() {
        // Zero lapse and guess: a miss at a huge intensity is impossible for
        // every candidate once the posterior sits on one triple.
        let t = table();
        let mut cell = QuestCell::new(t, &[1.0; 20]);
        cell.collapse_to(0, 1, 0).unwrap();
        assert_eq!(cell.update(1e6, false), Err(UpdateError::ZeroPosterior));
        assert_eq!(cell.posterior().iter().filter(|&&w| w == 1.0).count(), 1);
    }

    #[test]
    fn map_estimate_reads_point_mass() {
        let t = table();
        let mut cell = QuestCell::new(t.clone(), &[1.0; 20]);
        cell.collapse_to(7, 1, 1).unwrap();
        let est = cell.map_estimate(0).unwrap();
        assert_eq!(est.alpha, t.grid().alpha()[7]);
        assert_eq!(est.beta, 3.0);
        assert_eq!(est.lapse, 0.04);
        assert_eq!(
            cell.map_estimate(3),
            Err(UpdateError::InsufficientTrials {
                seen: 0,
                required: 3
            })
        );
        assert!(cell.collapse_to(20, 0, 0).is_err());
    }

    #[test]
    fn entropy_choice_lies_inside_grid() {
        let t = table();
        let mut prior = vec![0.0; 20];
        prior[10] = 1.0;
        let cell = QuestCell::new(t.clone(), &prior);
        let s = cell.next_stimulus();
        assert!(t.stimuli().contains(&s));
    }

    #[test]
    fn conditional_entropy_matches_direct() {
        let joint = [0.1, 0.2, 0.1];
        let m: f64 = joint.iter().sum();
        let normalised: Vec<f64> = joint.iter().map(|w| w / m).collect();
        assert_abs_diff_eq!(
            conditional_entropy(&joint, m),
            entropy(&normalised),
            epsilon = 1e-12
        );
    }
}
