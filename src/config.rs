use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::control::rate::{CatchRateController, RateControllerConfig};
use crate::core::estimator::AdaptiveEstimator;
use crate::core::grid::{GridSpacing, ParameterGrid, spaced};
use crate::core::partition::{ContextPartition, Dimension};
use crate::core::prior::LogNormalPrior;
use crate::error::{ConfigError, EstimatorError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    pub name: String,
    /// `[lo, hi)` pairs, ascending.
    pub bins: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaGridConfig {
    #[serde(default = "AlphaGridConfig::default_min")]
    pub min: f64,
    #[serde(default = "AlphaGridConfig::default_max")]
    pub max: f64,
    #[serde(default = "AlphaGridConfig::default_steps")]
    pub steps: usize,
    #[serde(default)]
    pub spacing: GridSpacing,
    /// Explicit candidates; overrides min/max/steps when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
}

impl AlphaGridConfig {
    fn default_min() -> f64 {
        0.05
    }
    fn default_max() -> f64 {
        2.0
    }
    fn default_steps() -> usize {
        24
    }

    pub fn candidates(&self) -> Vec<f64> {
        match &self.values {
            Some(v) => v.clone(),
            None => spaced(self.min, self.max, self.steps, self.spacing),
        }
    }
}

impl Default for AlphaGridConfig {
    fn default() -> Self {
        Self {
            min: Self::default_min(),
            max: Self::default_max(),
            steps: Self::default_steps(),
            spacing: GridSpacing::Log,
            values: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default = "EstimatorConfig::default_target_probability")]
    pub target_probability: f64,
    #[serde(default = "EstimatorConfig::default_fallback_intensity")]
    pub fallback_intensity: f64,
    #[serde(default)]
    pub guess_rate: f64,
    #[serde(default)]
    pub refine_min_trials: u32,
    #[serde(default)]
    pub alpha: AlphaGridConfig,
    #[serde(default = "EstimatorConfig::default_beta")]
    pub beta: Vec<f64>,
    #[serde(default = "EstimatorConfig::default_lapse")]
    pub lapse: Vec<f64>,
    #[serde(default = "EstimatorConfig::default_prior")]
    pub prior: LogNormalPrior,
    #[serde(default = "EstimatorConfig::default_dimensions")]
    pub dimensions: Vec<DimensionConfig>,
}

impl EstimatorConfig {
    fn default_target_probability() -> f64 {
        0.70
    }
    fn default_fallback_intensity() -> f64 {
        0.5
    }
    fn default_beta() -> Vec<f64> {
        vec![1.5, 2.0, 3.0, 4.5]
    }
    fn default_lapse() -> Vec<f64> {
        vec![0.0, 0.02, 0.05]
    }
    fn default_prior() -> LogNormalPrior {
        LogNormalPrior {
            base_median: 0.3,
            sigma: 0.6,
            gains: vec![0.35, 0.25, 0.05],
        }
    }
    fn default_dimensions() -> Vec<DimensionConfig> {
        vec![
            DimensionConfig {
                name: "soa_ms".into(),
                bins: vec![[100.0, 200.0], [200.0, 350.0]],
            },
            DimensionConfig {
                name: "ecc_px".into(),
                bins: vec![[0.0, 80.0], [80.0, 140.0]],
            },
            DimensionConfig {
                name: "direction_rad".into(),
                bins: vec![[-3.1416, 0.0], [0.0, 3.1416]],
            },
        ]
    }

    pub fn partition(&self) -> Result<ContextPartition, EstimatorError> {
        ContextPartition::new(
            self.dimensions
                .iter()
                .map(|d| Dimension::from_ranges(d.name.clone(), &d.bins))
                .collect(),
        )
    }

    pub fn grid(&self) -> Result<ParameterGrid, EstimatorError> {
        ParameterGrid::new(
            self.alpha.candidates(),
            self.beta.clone(),
            self.lapse.clone(),
            self.guess_rate,
        )
    }

    pub fn build(&self) -> Result<AdaptiveEstimator, EstimatorError> {
        let target = self.target_probability;
        if !(0.0..=1.0).contains(&target) {
            return Err(EstimatorError::InvalidTarget(target));
        }
        self.prior.validate()?;
        let estimator = AdaptiveEstimator::new(
            self.partition()?,
            self.grid()?,
            self.fallback_intensity,
            &self.prior,
        )?;
        Ok(estimator.with_refine_min_trials(self.refine_min_trials))
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            target_probability: Self::default_target_probability(),
            fallback_intensity: Self::default_fallback_intensity(),
            guess_rate: 0.0,
            refine_min_trials: 0,
            alpha: AlphaGridConfig::default(),
            beta: Self::default_beta(),
            lapse: Self::default_lapse(),
            prior: Self::default_prior(),
            dimensions: Self::default_dimensions(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "SimulationConfig::default_trials")]
    pub trials: usize,
    #[serde(default = "SimulationConfig::default_seed")]
    pub seed: u64,
    /// Fraction of generated contexts that fall outside every bin.
    #[serde(default = "SimulationConfig::default_out_of_range")]
    pub out_of_range: f64,
    /// Threshold of the simulated observer in cell (0, 0, ...).
    #[serde(default = "SimulationConfig::default_base_threshold")]
    pub base_threshold: f64,
    /// Per-dimension multiplicative threshold growth per bin index.
    #[serde(default = "SimulationConfig::default_threshold_growth")]
    pub threshold_growth: Vec<f64>,
    #[serde(default = "SimulationConfig::default_observer_beta")]
    pub observer_beta: f64,
    #[serde(default = "SimulationConfig::default_observer_lapse")]
    pub observer_lapse: f64,
    /// Probability the simulated observer responds on a catch trial.
    #[serde(default = "SimulationConfig::default_false_alarm")]
    pub false_alarm: f64,
}

impl SimulationConfig {
    fn default_trials() -> usize {
        600
    }
    fn default_seed() -> u64 {
        7
    }
    fn default_out_of_range() -> f64 {
        0.05
    }
    fn default_base_threshold() -> f64 {
        0.25
    }
    fn default_threshold_growth() -> Vec<f64> {
        vec![1.6, 1.3, 1.05]
    }
    fn default_observer_beta() -> f64 {
        3.0
    }
    fn default_observer_lapse() -> f64 {
        0.02
    }
    fn default_false_alarm() -> f64 {
        0.12
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trials: Self::default_trials(),
            seed: Self::default_seed(),
            out_of_range: Self::default_out_of_range(),
            base_threshold: Self::default_base_threshold(),
            threshold_growth: Self::default_threshold_growth(),
            observer_beta: Self::default_observer_beta(),
            observer_lapse: Self::default_observer_lapse(),
            false_alarm: Self::default_false_alarm(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub rate: RateControllerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Strict load: missing or malformed files are errors.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let cfg: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read `path` if it exists, otherwise write commented defaults there.
    /// Unreadable or unparsable files fall back to defaults.
    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            return match Self::load(path) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("{err}. Using defaults.");
                    Self::default()
                }
            };
        }

        let default_cfg = Self::default();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, comment_out(&text)) {
                    warn!("Failed to write default config to {path}: {err}");
                } else {
                    info!("Wrote default config to {path}");
                }
            }
            Err(err) => warn!("Failed to serialize default config: {err}"),
        }
        default_cfg
    }

    /// Check that both control loops can be built from this config.
    pub fn validate(&self) -> Result<(), EstimatorError> {
        self.build().map(|_| ())
    }

    pub fn build(&self) -> Result<(AdaptiveEstimator, CatchRateController), EstimatorError> {
        Ok((self.estimator.build()?, CatchRateController::new(self.rate)?))
    }
}

/// Comment out everything except top-level section headers, so the file
/// documents the defaults without pinning them.
fn comment_out(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push('\n');
            continue;
        }
        if !is_top_level_header(trimmed) {
            out.push_str("# ");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_top_level_header(line: &str) -> bool {
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(|name| {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}
