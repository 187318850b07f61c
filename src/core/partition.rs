//! Context partition: half-open bins per dimension, and the row-major cell
//! offset over their Cartesian product.

use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

/// Upper bound on eagerly allocated cells.
pub const MAX_CELLS: usize = 512;

/// Half-open range `[lo, hi)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub lo: f64,
    pub hi: f64,
}

impl Bin {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value < self.hi
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub bins: Vec<Bin>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, bins: Vec<Bin>) -> Self {
        Self {
            name: name.into(),
            bins,
        }
    }

    /// Build from `[lo, hi]` pairs.
    pub fn from_ranges(name: impl Into<String>, ranges: &[[f64; 2]]) -> Self {
        Self::new(name, ranges.iter().map(|r| Bin::new(r[0], r[1])).collect())
    }

    /// First bin containing `value`.
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        self.bins.iter().position(|b| b.contains(value))
    }

    fn validate(&self) -> Result<(), EstimatorError> {
        if self.bins.is_empty() {
            return Err(EstimatorError::EmptyDimension(self.name.clone()));
        }
        let mut prev_hi = f64::NEG_INFINITY;
        for (index, bin) in self.bins.iter().enumerate() {
            let well_formed = bin.lo.is_finite() && bin.hi.is_finite() && bin.lo < bin.hi;
            if !well_formed || bin.lo < prev_hi {
                return Err(EstimatorError::InvalidBin {
                    dim: self.name.clone(),
                    index,
                });
            }
            prev_hi = bin.hi;
        }
        Ok(())
    }
}

/// Per-dimension bin indices of one cell, plus its linear offset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CellIndex {
    pub bins: Vec<usize>,
    pub linear: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContextPartition {
    dims: Vec<Dimension>,
    strides: Vec<usize>,
    cell_count: usize,
}

impl ContextPartition {
    pub fn new(dims: Vec<Dimension>) -> Result<Self, EstimatorError> {
        if dims.is_empty() {
            return Err(EstimatorError::NoDimensions);
        }
        for dim in &dims {
            dim.validate()?;
        }
        let mut cell_count = 1usize;
        for dim in &dims {
            cell_count = cell_count.saturating_mul(dim.bins.len());
        }
        if cell_count > MAX_CELLS {
            return Err(EstimatorError::TooManyCells {
                count: cell_count,
                limit: MAX_CELLS,
            });
        }
        // Row-major: the last dimension varies fastest.
        let mut strides = vec![1usize; dims.len()];
        for d in (0..dims.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * dims[d + 1].bins.len();
        }
        Ok(Self {
            dims,
            strides,
            cell_count,
        })
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Map a context point to its cell. `None` when any value falls outside
    /// every bin of its dimension, or when the arity does not match.
    pub fn lookup(&self, context: &[f64]) -> Option<CellIndex> {
        if context.len() != self.dims.len() {
            return None;
        }
        let mut bins = Vec::with_capacity(self.dims.len());
        let mut linear = 0usize;
        for ((dim, &value), &stride) in self.dims.iter().zip(context).zip(&self.strides) {
            let idx = dim.bin_of(value)?;
            linear += idx * stride;
            bins.push(idx);
        }
        Some(CellIndex { bins, linear })
    }

    /// Inverse of the linear offset.
    pub fn index_at(&self, linear: usize) -> Option<CellIndex> {
        if linear >= self.cell_count {
            return None;
        }
        let mut rem = linear;
        let bins = self
            .strides
            .iter()
            .map(|&stride| {
                let idx = rem / stride;
                rem %= stride;
                idx
            })
            .collect();
        Some(CellIndex { bins, linear })
    }

    /// Cells in partition order.
    pub fn iter_cells(&self) -> impl Iterator<Item = CellIndex> + '_ {
        (0..self.cell_count).filter_map(move |i| self.index_at(i))
    }

    /// Centre of each bin for a cell; useful for building representative contexts.
    pub fn center_of(&self, index: &CellIndex) -> Vec<f64> {
        self.dims
            .iter()
            .zip(&index.bins)
            .map(|(dim, &b)| {
                let bin = dim.bins[b];
                bin.lo + 0.5 * bin.width()
            })
            .collect()
    }
}
