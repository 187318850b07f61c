//! Adaptive threshold estimation for psychophysics tasks.
//!
//! [`core::estimator::AdaptiveEstimator`] keeps one grid-based Bayesian
//! staircase per context cell and proposes intensities aimed at a target
//! detection probability. [`control::rate::CatchRateController`] regulates the
//! catch-trial probability so the false-alarm rate tracks a target.

pub mod config;
pub mod control;
pub mod core;
pub mod error;
pub mod sim;
