//! Context-conditioned staircase: one [`QuestCell`] per partition cell, held in
//! a flat arena indexed by the cell's linear offset.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::core::cell::QuestCell;
use crate::core::grid::{LikelihoodTable, ParameterGrid};
use crate::core::partition::{CellIndex, ContextPartition};
use crate::core::prior::AlphaPrior;
use crate::core::psychometric::closest_to_target;
use crate::error::{EstimatorError, UpdateError};

/// Diagnostic snapshot of one cell.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellEstimate {
    pub cell: usize,
    pub bins: Vec<usize>,
    pub trials: u32,
    pub alpha_mean: Option<f64>,
    pub beta_mean: Option<f64>,
    pub alpha_map: Option<f64>,
    pub beta_map: Option<f64>,
    pub lapse_map: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct AdaptiveEstimator {
    partition: ContextPartition,
    table: Arc<LikelihoodTable>,
    cells: Vec<QuestCell>,
    fallback: f64,
    refine_min_trials: u32,
}

impl AdaptiveEstimator {
    /// Allocate every cell of the partition up front, each seeded by `prior`.
    pub fn new(
        partition: ContextPartition,
        grid: ParameterGrid,
        fallback: f64,
        prior: &dyn AlphaPrior,
    ) -> Result<Self, EstimatorError> {
        if !fallback.is_finite() {
            return Err(EstimatorError::InvalidFallback(fallback));
        }
        let table = Arc::new(LikelihoodTable::new(grid));
        let cells = partition
            .iter_cells()
            .map(|idx| {
                let weights = prior.weights(table.grid().alpha(), &idx.bins);
                QuestCell::new(table.clone(), &weights)
            })
            .collect::<Vec<_>>();
        debug!(
            cells = cells.len(),
            joint = table.grid().joint_len(),
            "estimator cells allocated"
        );
        Ok(Self {
            partition,
            table,
            cells,
            fallback,
            refine_min_trials: 0,
        })
    }

    /// Require at least `n` observations in a cell before proposals use its
    /// parameter estimate.
    pub fn with_refine_min_trials(mut self, n: u32) -> Self {
        self.refine_min_trials = n;
        self
    }

    pub fn partition(&self) -> &ContextPartition {
        &self.partition
    }

    pub fn grid(&self) -> &ParameterGrid {
        self.table.grid()
    }

    pub fn fallback(&self) -> f64 {
        self.fallback
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn lookup_cell(&self, context: &[f64]) -> Option<CellIndex> {
        self.partition.lookup(context)
    }

    pub fn cell(&self, index: &CellIndex) -> Option<&QuestCell> {
        self.cells.get(index.linear)
    }

    pub fn cell_mut(&mut self, index: &CellIndex) -> Option<&mut QuestCell> {
        self.cells.get_mut(index.linear)
    }

    pub fn cell_at(&self, linear: usize) -> Option<&QuestCell> {
        self.cells.get(linear)
    }

    /// Next intensity for `context`, aimed at `target` probability.
    /// Unmatched contexts get the configured fallback.
    pub fn propose_stimulus(&self, context: &[f64], target: f64) -> f64 {
        let Some(index) = self.lookup_cell(context) else {
            trace!(?context, "propose: unmatched context, using fallback");
            return self.fallback;
        };
        let cell = &self.cells[index.linear];
        match self.refine(cell, target) {
            Ok(value) => value,
            Err(err) => {
                debug!(cell = index.linear, %err, "propose: keeping unrefined suggestion");
                cell.next_stimulus()
            }
        }
    }

    fn refine(&self, cell: &QuestCell, target: f64) -> Result<f64, UpdateError> {
        if !(0.0..=1.0).contains(&target) {
            return Err(UpdateError::InvalidTarget(target));
        }
        let est = cell.map_estimate(self.refine_min_trials)?;
        let alphas = self.table.grid().alpha();
        closest_to_target(alphas, &est, target)
            .map(|i| alphas[i])
            .ok_or(UpdateError::NonFinitePosterior)
    }

    /// Feed one outcome back. Returns whether a cell absorbed it; unmatched
    /// contexts and failed updates leave all state unchanged.
    pub fn record_outcome(&mut self, context: &[f64], intensity: f64, detected: bool) -> bool {
        let Some(index) = self.partition.lookup(context) else {
            trace!(?context, "record: unmatched context, outcome discarded");
            return false;
        };
        match self.cells[index.linear].update(intensity, detected) {
            Ok(()) => true,
            Err(err) => {
                warn!(cell = index.linear, intensity, detected, %err, "posterior update skipped");
                false
            }
        }
    }

    /// Point estimates for every cell in partition order. Read only.
    pub fn export_posteriors(&self) -> Vec<CellEstimate> {
        self.partition
            .iter_cells()
            .zip(&self.cells)
            .map(|(idx, cell)| {
                let summary = cell.summary();
                let map = cell.map_estimate(0).ok();
                CellEstimate {
                    cell: idx.linear,
                    bins: idx.bins,
                    trials: cell.trials(),
                    alpha_mean: summary.alpha_mean,
                    beta_mean: summary.beta_mean,
                    alpha_map: map.map(|p| p.alpha),
                    beta_map: map.map(|p| p.beta),
                    lapse_map: map.map(|p| p.lapse),
                }
            })
            .collect()
    }
}
