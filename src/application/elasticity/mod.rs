pub mod instruments;
pub mod iv_estimator;

pub use instruments::{RetargetShock, build_elasticity_panel, retarget_shocks};
pub use iv_estimator::IvEstimator;
