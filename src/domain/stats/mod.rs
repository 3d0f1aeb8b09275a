// Causal rolling / expanding structures
pub mod rolling;

// Percentiles and medians
pub mod quantile;

// Least squares and HAC covariance
pub mod ols;

// Distribution tail probabilities
pub mod inference;

pub use ols::{OlsFit, design_matrix, design_rank, newey_west_lags};
pub use quantile::{median, percentile, percentile_sorted};
pub use rolling::{ExpandingMoments, ExpandingQuantiles, RollingWindow, TrailingDayWindow};
