use crate::application::factors::price_series::PriceSeries;
use chrono::NaiveDate;

/// Closing prices aligned to panel rows, with log-return helpers.
///
/// Row `t` of the panel carries features observed at the close of day
/// `t - 1`, so every return attributed to row `t` starts at that close.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    closes: Vec<Option<f64>>,
}

impl ReturnSeries {
    pub fn new(closes: Vec<Option<f64>>) -> Self {
        Self { closes }
    }

    pub fn from_prices(days: &[NaiveDate], prices: &PriceSeries) -> Self {
        Self::new(days.iter().map(|d| prices.price_on(*d)).collect())
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn close(&self, index: usize) -> Option<f64> {
        self.closes.get(index).copied().flatten()
    }

    /// `ln(P[to] / P[from])`, `None` when either close is missing.
    pub fn log_return(&self, from: usize, to: usize) -> Option<f64> {
        let start = self.close(from).filter(|p| *p > 0.0)?;
        let end = self.close(to).filter(|p| *p > 0.0)?;
        Some((end / start).ln())
    }

    /// Horizon-h target of row `t`: `ln(P[t - 1 + h] / P[t - 1])`.
    pub fn forward_return(&self, row: usize, horizon: u32) -> Option<f64> {
        let origin = row.checked_sub(1)?;
        self.log_return(origin, origin + horizon as usize)
    }

    /// The one-day return realized on the feature date of row `t`.
    pub fn trailing_return(&self, row: usize) -> Option<f64> {
        let origin = row.checked_sub(1)?;
        self.log_return(origin.checked_sub(1)?, origin)
    }

    /// Last row whose horizon-h target is known by the close of day `day`.
    pub fn last_known_target_row(day: usize, horizon: u32) -> Option<usize> {
        (day + 1).checked_sub(horizon as usize)
    }
}
