//! Offline driver: runs both control loops against a simulated observer.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{AppConfig, SimulationConfig};
use crate::control::rate::{CatchRateController, RateSnapshot};
use crate::core::estimator::{AdaptiveEstimator, CellEstimate};
use crate::core::partition::{CellIndex, ContextPartition};
use crate::core::psychometric::WeibullParams;
use crate::error::EstimatorError;

/// Ground-truth observer. Its threshold grows geometrically with bin index.
#[derive(Clone, Debug)]
pub struct SimulatedObserver {
    pub base_threshold: f64,
    pub threshold_growth: Vec<f64>,
    pub beta: f64,
    pub lapse: f64,
    pub false_alarm: f64,
}

impl SimulatedObserver {
    pub fn from_config(cfg: &SimulationConfig) -> Self {
        Self {
            base_threshold: cfg.base_threshold,
            threshold_growth: cfg.threshold_growth.clone(),
            beta: cfg.observer_beta,
            lapse: cfg.observer_lapse,
            false_alarm: cfg.false_alarm,
        }
    }

    pub fn threshold(&self, cell: Option<&CellIndex>) -> f64 {
        let Some(cell) = cell else {
            return self.base_threshold;
        };
        cell.bins
            .iter()
            .enumerate()
            .fold(self.base_threshold, |acc, (d, &idx)| {
                let g = self.threshold_growth.get(d).copied().unwrap_or(1.0);
                acc * g.powi(idx as i32)
            })
    }

    pub fn params(&self, cell: Option<&CellIndex>) -> WeibullParams {
        WeibullParams::new(self.threshold(cell), self.beta, 0.0, self.lapse)
    }

    pub fn respond<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        cell: Option<&CellIndex>,
        intensity: f64,
    ) -> bool {
        rng.random::<f64>() < self.params(cell).p_correct(intensity)
    }

    pub fn false_alarm<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random::<f64>() < self.false_alarm
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrialRecord {
    pub index: usize,
    pub catch: bool,
    pub context: Vec<f64>,
    pub cell: Option<usize>,
    pub intensity: Option<f64>,
    pub responded: bool,
    pub catch_probability: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionReport {
    pub trials: usize,
    pub catch_trials: usize,
    pub false_alarms: usize,
    pub unmatched: usize,
    pub final_catch_probability: f64,
    pub rate: RateSnapshot,
    pub cells: Vec<CellEstimate>,
    /// Observer threshold per cell, partition order.
    pub true_thresholds: Vec<f64>,
    pub log: Vec<TrialRecord>,
}

/// Uniform value inside a random cell, or, with probability `out_of_range`,
/// a point just past the last bin of the first dimension.
pub fn draw_context<R: Rng + ?Sized>(
    rng: &mut R,
    partition: &ContextPartition,
    out_of_range: f64,
) -> Vec<f64> {
    let mut context: Vec<f64> = partition
        .dims()
        .iter()
        .map(|dim| {
            let bin = dim.bins[rng.random_range(0..dim.bins.len())];
            rng.random_range(bin.lo..bin.hi)
        })
        .collect();
    if out_of_range > 0.0 && rng.random::<f64>() < out_of_range {
        if let Some(last) = partition.dims().first().and_then(|d| d.bins.last()) {
            context[0] = last.hi + last.width() * rng.random::<f64>();
        }
    }
    context
}

pub fn run_session<R: Rng + ?Sized>(
    estimator: &mut AdaptiveEstimator,
    controller: &mut CatchRateController,
    observer: &SimulatedObserver,
    target: f64,
    trials: usize,
    out_of_range: f64,
    rng: &mut R,
) -> SessionReport {
    let mut log = Vec::with_capacity(trials);
    let (mut catch_trials, mut false_alarms, mut unmatched) = (0, 0, 0);

    for index in 0..trials {
        let catch_probability = controller.current_catch_probability();
        if controller.decide_catch_trial(rng) {
            let responded = observer.false_alarm(rng);
            controller.record_catch_outcome(responded);
            catch_trials += 1;
            false_alarms += usize::from(responded);
            log.push(TrialRecord {
                index,
                catch: true,
                context: Vec::new(),
                cell: None,
                intensity: None,
                responded,
                catch_probability,
            });
            continue;
        }

        let context = draw_context(rng, estimator.partition(), out_of_range);
        let cell = estimator.lookup_cell(&context);
        let intensity = estimator.propose_stimulus(&context, target);
        let responded = observer.respond(rng, cell.as_ref(), intensity);
        if !estimator.record_outcome(&context, intensity, responded) {
            unmatched += 1;
        }
        log.push(TrialRecord {
            index,
            catch: false,
            context,
            cell: cell.map(|c| c.linear),
            intensity: Some(intensity),
            responded,
            catch_probability,
        });
    }

    let true_thresholds = estimator
        .partition()
        .iter_cells()
        .map(|c| observer.threshold(Some(&c)))
        .collect();
    let rate = controller.snapshot();
    debug!(catch_trials, false_alarms, unmatched, "session finished");
    SessionReport {
        trials,
        catch_trials,
        false_alarms,
        unmatched,
        final_catch_probability: rate.catch_probability,
        rate,
        cells: estimator.export_posteriors(),
        true_thresholds,
        log,
    }
}

/// Build both loops from `cfg` and run the configured simulation.
pub fn simulate(cfg: &AppConfig) -> Result<SessionReport, EstimatorError> {
    let (mut estimator, mut controller) = cfg.build()?;
    let observer = SimulatedObserver::from_config(&cfg.simulation);
    let mut rng = StdRng::seed_from_u64(cfg.simulation.seed);
    info!(
        trials = cfg.simulation.trials,
        cells = estimator.cell_count(),
        seed = cfg.simulation.seed,
        "simulating session"
    );
    Ok(run_session(
        &mut estimator,
        &mut controller,
        &observer,
        cfg.estimator.target_probability,
        cfg.simulation.trials,
        cfg.simulation.out_of_range,
        &mut rng,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::partition::Dimension;
    use rand::RngCore;

    #[test]
    fn observer_threshold_grows_with_bins() {
        let obs = SimulatedObserver {
            base_threshold: 0.2,
            threshold_growth: vec![2.0, 1.5],
            beta: 3.0,
            lapse: 0.0,
            false_alarm: 0.1,
        };
        let cell = CellIndex {
            bins: vec![1, 2],
            linear: 5,
        };
        assert!((obs.threshold(Some(&cell)) - 0.2 * 2.0 * 2.25).abs() < 1e-12);
        assert_eq!(obs.threshold(None), 0.2);
    }

    #[test]
    fn drawn_contexts_match_or_miss_as_requested() {
        let partition = ContextPartition::new(vec![
            Dimension::from_ranges("soa_ms", &[[100.0, 200.0], [200.0, 350.0]]),
            Dimension::from_ranges("ecc_px", &[[0.0, 80.0], [80.0, 140.0]]),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let ctx = draw_context(&mut rng, &partition, 0.0);
            assert!(partition.lookup(&ctx).is_some(), "{ctx:?}");
        }
        for _ in 0..200 {
            let ctx = draw_context(&mut rng, &partition, 1.0);
            assert!(partition.lookup(&ctx).is_none(), "{ctx:?}");
        }
    }

    #[test]
    fn session_accounts_for_every_trial() {
        let cfg = AppConfig {
            simulation: SimulationConfig {
                trials: 120,
                ..SimulationConfig::default()
            },
            ..AppConfig::default()
        };
        let report = simulate(&cfg).unwrap();
        assert_eq!(report.log.len(), 120);
        assert_eq!(report.catch_trials, report.log.iter().filter(|t| t.catch).count());
        assert_eq!(report.rate.catch_trials as usize, report.catch_trials);
        let absorbed: u32 = report.cells.iter().map(|c| c.trials).sum();
        assert_eq!(
            absorbed as usize + report.unmatched + report.catch_trials,
            report.trials
        );
    }

    #[test]
    fn session_runs_on_any_rng() {
        let cfg = AppConfig::default();
        let (mut estimator, mut controller) = cfg.build().unwrap();
        let observer = SimulatedObserver::from_config(&cfg.simulation);
        let mut seeded = StdRng::seed_from_u64(11);
        let rng: &mut dyn RngCore = &mut seeded;
        let report = run_session(
            &mut estimator,
            &mut controller,
            &observer,
            cfg.estimator.target_probability,
            40,
            0.0,
            rng,
        );
        assert_eq!(report.log.len(), 40);
        assert_eq!(report.unmatched, 0);
    }
}
