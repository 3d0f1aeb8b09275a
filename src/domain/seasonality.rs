use serde::{Deserialize, Serialize};

/// Covariates absorbed next to the hour × weekday cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityControl {
    /// Mean block fullness in the hour.
    Fullness,
    /// Std of log fee over the trailing hours, excluding the current one.
    RecentVolatility,
    /// Lagged standardized backlog pressure (MPR) from the factor panel.
    BacklogPressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceFlag {
    Normal,
    LowConfidence,
}

/// Fitted fee-level effect of one (hour-of-day, day-of-week) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalityCell {
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday.
    pub weekday: u32,
    pub fitted_effect: f64,
    pub std_error: Option<f64>,
    pub sample_count: usize,
    pub confidence: ConfidenceFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalityDecomposition {
    /// Populated cells ordered by (weekday, hour).
    pub cells: Vec<SeasonalityCell>,
    pub control_coefficients: Vec<(SeasonalityControl, f64)>,
    pub r_squared: f64,
    pub observations: usize,
    /// F test that every populated cell has the same effect.
    pub equal_effects_f: Option<f64>,
    pub equal_effects_p_value: Option<f64>,
}

impl SeasonalityDecomposition {
    pub fn cell(&self, hour: u32, weekday: u32) -> Option<&SeasonalityCell> {
        self.cells
            .iter()
            .find(|c| c.hour == hour && c.weekday == weekday)
    }
}
