//! Weibull psychometric function shared by every estimator cell.
//!
//! P(correct | s) = guess + (1 - guess - lapse) * (1 - exp(-(s / alpha)^beta))
//!
//! Intensities at or below zero map to the guess rate.

use serde::{Deserialize, Serialize};

/// One point of the (alpha, beta, guess, lapse) parameter space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeibullParams {
    pub alpha: f64,
    pub beta: f64,
    pub guess: f64,
    pub lapse: f64,
}

impl WeibullParams {
    pub fn new(alpha: f64, beta: f64, guess: f64, lapse: f64) -> Self {
        Self {
            alpha,
            beta,
            guess,
            lapse,
        }
    }

    #[inline]
    pub fn p_correct(&self, intensity: f64) -> f64 {
        weibull(intensity, self.alpha, self.beta, self.guess, self.lapse)
    }

    /// Upper asymptote of the curve.
    #[inline]
    pub fn ceiling(&self) -> f64 {
        1.0 - self.lapse
    }
}

#[inline]
pub fn weibull(intensity: f64, alpha: f64, beta: f64, guess: f64, lapse: f64) -> f64 {
    if !(intensity > 0.0) || !(alpha > 0.0) {
        return guess;
    }
    let core = 1.0 - (-(intensity / alpha).powf(beta)).exp();
    guess + (1.0 - guess - lapse) * core
}

/// Index of the candidate whose modelled probability is closest to `target`.
/// Ties keep the first candidate.
pub fn closest_to_target(candidates: &[f64], params: &WeibullParams, target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in candidates.iter().enumerate() {
        let dist = (params.p_correct(s) - target).abs();
        if !dist.is_finite() {
            continue;
        }
        match best {
            Some((_, d)) if d <= dist => {}
            _ => best = Some((i, dist)),
        }
    }
    best.map(|(i, _)| i)
}

/// Shannon entropy (nats) of a normalised weight vector.
pub fn entropy(weights: &[f64]) -> f64 {
    weights
        .iter()
        .filter(|&&w| w > 0.0)
        .map(|&w| -w * w.ln())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn threshold_point_matches_closed_form() {
        let p = WeibullParams::new(2.0, 3.0, 0.0, 0.0);
        // At s = alpha the core is 1 - e^-1.
        assert_abs_diff_eq!(p.p_correct(2.0), 1.0 - (-1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn non_positive_intensity_returns_guess() {
        let p = WeibullParams::new(1.0, 2.0, 0.25, 0.02);
        assert_eq!(p.p_correct(0.0), 0.25);
        assert_eq!(p.p_correct(-3.0), 0.25);
        assert_eq!(p.p_correct(f64::NAN), 0.25);
    }

    #[test]
    fn strictly_increasing_and_bounded_by_ceiling() {
        let p = WeibullParams::new(0.8, 2.5, 0.0, 0.04);
        let mut prev = p.p_correct(1e-3);
        for i in 2..200 {
            let s = i as f64 * 0.01;
            let v = p.p_correct(s);
            assert!(v > prev, "not increasing at s={s}: {v} <= {prev}");
            assert!(v < p.ceiling());
            prev = v;
        }
        assert_abs_diff_eq!(p.p_correct(100.0), p.ceiling(), epsilon = 1e-9);
    }

    #[test]
    fn closest_to_target_prefers_first_on_tie() {
        // Guess-only curve: every candidate maps to the same probability.
        let flat = WeibullParams::new(1.0, 2.0, 0.5, 0.5);
        assert_eq!(closest_to_target(&[0.1, 0.2, 0.3], &flat, 0.7), Some(0));
        assert_eq!(closest_to_target(&[], &flat, 0.7), None);
    }

    #[test]
    fn entropy_of_uniform_is_log_n() {
        let w = vec![0.25; 4];
        assert_abs_diff_eq!(entropy(&w), 4.0f64.ln(), epsilon = 1e-12);
        assert_eq!(entropy(&[1.0, 0.0]), 0.0);
    }
}
