use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateControllerConfig {
    #[serde(default = "RateControllerConfig::default_target_rate")]
    pub target_rate: f64,
    #[serde(default = "RateControllerConfig::default_baseline")]
    pub baseline: f64,
    #[serde(default = "RateControllerConfig::default_min")]
    pub min: f64,
    #[serde(default = "RateControllerConfig::default_max")]
    pub max: f64,
    #[serde(default = "RateControllerConfig::default_gain")]
    pub gain: f64,
    #[serde(default = "RateControllerConfig::default_ema_alpha")]
    pub ema_alpha: f64,
}

impl RateControllerConfig {
    fn default_target_rate() -> f64 {
        0.05
    }
    fn default_baseline() -> f64 {
        0.18
    }
    fn default_min() -> f64 {
        0.10
    }
    fn default_max() -> f64 {
        0.45
    }
    fn default_gain() -> f64 {
        2.0
    }
    fn default_ema_alpha() -> f64 {
        0.1
    }

    pub fn validate(&self) -> Result<(), EstimatorError> {
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        let problem = if !unit(self.target_rate) {
            Some(format!("target_rate {} outside [0, 1]", self.target_rate))
        } else if !unit(self.baseline) {
            Some(format!("baseline {} outside [0, 1]", self.baseline))
        } else if !unit(self.min) || !unit(self.max) || self.min > self.max {
            Some(format!("clamp [{}, {}] is not a sub-range of [0, 1]", self.min, self.max))
        } else if !(self.gain >= 0.0) || !self.gain.is_finite() {
            Some(format!("gain {} must be finite and non-negative", self.gain))
        } else if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            Some(format!("ema_alpha {} outside (0, 1]", self.ema_alpha))
        } else {
            None
        };
        match problem {
            Some(msg) => Err(EstimatorError::InvalidRateConfig(msg)),
            None => Ok(()),
        }
    }
}

impl Default for RateControllerConfig {
    fn default() -> Self {
        Self {
            target_rate: Self::default_target_rate(),
            baseline: Self::default_baseline(),
            min: Self::default_min(),
            max: Self::default_max(),
            gain: Self::default_gain(),
            ema_alpha: Self::default_ema_alpha(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub ema: Option<f64>,
    pub catch_trials: u64,
    pub false_alarms: u64,
    /// Cumulative false alarms / catch trials.
    pub observed_rate: Option<f64>,
    pub catch_probability: f64,
}

/// Proportional controller on the smoothed false-alarm rate of catch trials.
///
/// p_catch = clamp(baseline + gain * max(0, ema - target), min, max)
///
/// Before any catch outcome the EMA is taken to equal the target, so the
/// controller starts at `baseline` (clamped).
#[derive(Clone, Debug)]
pub struct CatchRateController {
    config: RateControllerConfig,
    ema: Option<f64>,
    catch_trials: u64,
    false_alarms: u64,
}

impl CatchRateController {
    pub fn new(config: RateControllerConfig) -> Result<Self, EstimatorError> {
        config.validate()?;
        Ok(Self {
            config,
            ema: None,
            catch_trials: 0,
            false_alarms: 0,
        })
    }

    pub fn config(&self) -> &RateControllerConfig {
        &self.config
    }

    pub fn ema(&self) -> Option<f64> {
        self.ema
    }

    pub fn estimated_rate(&self) -> f64 {
        self.ema.unwrap_or(self.config.target_rate)
    }

    pub fn current_catch_probability(&self) -> f64 {
        let c = &self.config;
        let error = (self.estimated_rate() - c.target_rate).max(0.0);
        (c.baseline + c.gain * error).clamp(c.min, c.max)
    }

    /// Bernoulli draw for the upcoming trial.
    pub fn decide_catch_trial<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random::<f64>() < self.current_catch_probability()
    }

    /// Only for trials the caller presented as catch trials.
    pub fn record_catch_outcome(&mut self, responded: bool) {
        self.catch_trials += 1;
        if responded {
            self.false_alarms += 1;
        }
        let obs = if responded { 1.0 } else { 0.0 };
        let a = self.config.ema_alpha;
        self.ema = Some(match self.ema {
            None => obs,
            Some(prev) => (1.0 - a) * prev + a * obs,
        });
    }

    /// Trials for the EMA weight of an observation to halve.
    pub fn half_life_trials(&self) -> f64 {
        std::f64::consts::LN_2 / self.config.ema_alpha
    }

    pub fn snapshot(&self) -> RateSnapshot {
        RateSnapshot {
            ema: self.ema,
            catch_trials: self.catch_trials,
            false_alarms: self.false_alarms,
            observed_rate: (self.catch_trials > 0)
                .then(|| self.false_alarms as f64 / self.catch_trials as f64),
            catch_probability: self.current_catch_probability(),
        }
    }
}
