pub mod returns;
pub mod walk_forward;

pub use returns::ReturnSeries;
pub use walk_forward::{RegressionInputs, WalkForwardOutput, WalkForwardRegressor, summarize};
