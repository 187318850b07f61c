use thiserror::Error;

/// Errors raised while building an estimator. These surface before any trial runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("{0} candidate grid is empty")]
    EmptyGrid(&'static str),
    #[error("alpha candidates must be finite, positive and strictly ascending (index {0})")]
    AlphaNotAscending(usize),
    #[error("beta candidate {0} must be finite and positive")]
    InvalidBeta(f64),
    #[error("lapse candidate {0} must lie in [0, 1)")]
    InvalidLapse(f64),
    #[error("guess rate {guess} plus lapse {lapse} must stay below 1")]
    InvalidGuess { guess: f64, lapse: f64 },
    #[error("partition has no dimensions")]
    NoDimensions,
    #[error("dimension `{0}` has no bins")]
    EmptyDimension(String),
    #[error("dimension `{dim}` bin {index} is malformed or overlaps its predecessor")]
    InvalidBin { dim: String, index: usize },
    #[error("partition would allocate {count} cells (limit {limit})")]
    TooManyCells { count: usize, limit: usize },
    #[error("fallback intensity {0} is not finite")]
    InvalidFallback(f64),
    #[error("target probability {0} must lie in [0, 1]")]
    InvalidTarget(f64),
    #[error("log-normal prior: {0}")]
    InvalidPrior(String),
    #[error("rate controller: {0}")]
    InvalidRateConfig(String),
}

/// Internal failures of a single cell. Converted to fallbacks at the public boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpdateError {
    #[error("stimulus intensity {0} is not finite")]
    NonFiniteStimulus(f64),
    #[error("posterior collapsed to zero mass")]
    ZeroPosterior,
    #[error("posterior contains non-finite weights")]
    NonFinitePosterior,
    #[error("only {seen} trials observed, {required} required")]
    InsufficientTrials { seen: u32, required: u32 },
    #[error("target probability {0} must lie in [0, 1]")]
    InvalidTarget(f64),
    #[error("parameter index ({alpha}, {beta}, {lapse}) is out of range")]
    IndexOutOfRange {
        alpha: usize,
        beta: usize,
        lapse: usize,
    },
}

/// Failures loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(#[from] EstimatorError),
}
