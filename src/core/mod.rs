pub mod cell;
pub mod estimator;
pub mod grid;
pub mod partition;
pub mod prior;
pub mod psychometric;
