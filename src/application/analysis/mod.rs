pub mod weekday_returns;

pub use weekday_returns::{
    WeekdayCoefficient, WeekdayEffects, WeekdayGroup, WeekdayRegression, WeekdayReturnAnalysis,
};
