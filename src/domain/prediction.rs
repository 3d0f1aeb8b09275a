use crate::domain::stats::inference::t_p_value;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Extra regressors next to the factor vector, all known at the feature date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCovariate {
    /// One-day log return realized on the feature date.
    LaggedReturn,
    /// Log of total fees paid on the feature date.
    LaggedLogFees,
}

impl ControlCovariate {
    pub fn column_name(self) -> &'static str {
        match self {
            ControlCovariate::LaggedReturn => "lagged_return",
            ControlCovariate::LaggedLogFees => "lagged_log_fees",
        }
    }
}

/// Contiguous training slice `[start_index, end_index]` of the panel.
/// Windows only ever grow at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionWindow {
    pub horizon: u32,
    pub start_index: usize,
    pub end_index: usize,
    pub end_day: NaiveDate,
}

impl RegressionWindow {
    pub fn len(&self) -> usize {
        self.end_index + 1 - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.end_index < self.start_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Fitted,
    RankDeficient,
    InsufficientData,
    /// The fit succeeded but the prediction row lacks a feature value.
    MissingFeatures,
}

/// Frozen coefficients of one window fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub id: String,
    pub columns: Vec<String>,
    pub coefficients: Vec<f64>,
    /// Newey-West (HAC) standard errors.
    pub std_errors: Vec<f64>,
    /// Coefficient over its HAC standard error. None when the error is zero.
    pub t_stats: Vec<Option<f64>>,
    /// Two-sided Student-t p-values on `observations - columns` degrees of freedom.
    pub p_values: Vec<Option<f64>>,
    pub newey_west_lags: usize,
    pub observations: usize,
    pub r_squared: f64,
}

impl ModelSnapshot {
    pub fn new(
        columns: Vec<String>,
        coefficients: Vec<f64>,
        std_errors: Vec<f64>,
        newey_west_lags: usize,
        observations: usize,
        r_squared: f64,
    ) -> Self {
        let id = Self::snapshot_id(&columns, &coefficients);
        let df = observations.saturating_sub(coefficients.len()) as f64;
        let t_stats: Vec<Option<f64>> = coefficients
            .iter()
            .zip(&std_errors)
            .map(|(&coef, &se)| (se.is_finite() && se > 0.0).then(|| coef / se))
            .collect();
        let p_values = t_stats
            .iter()
            .map(|t| t.and_then(|t| t_p_value(t, df)))
            .collect();
        Self {
            id,
            columns,
            coefficients,
            std_errors,
            t_stats,
            p_values,
            newey_west_lags,
            observations,
            r_squared,
        }
    }

    /// First 16 hex chars of SHA-256 over column names and coefficient bits.
    pub fn snapshot_id(columns: &[String], coefficients: &[f64]) -> String {
        let mut hasher = Sha256::new();
        for (name, coef) in columns.iter().zip(coefficients) {
            hasher.update(name.as_bytes());
            hasher.update(coef.to_bits().to_le_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }

    pub fn coefficient(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.coefficients[i])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Row day: the return predicted starts at the close of the previous day.
    pub day: NaiveDate,
    pub horizon: u32,
    pub predicted_return: Option<f64>,
    /// Filled post hoc once the horizon has elapsed.
    pub realized_return: Option<f64>,
    /// Mean training target, the naive forecast used for out-of-sample R².
    pub benchmark_return: Option<f64>,
    pub training_end: Option<NaiveDate>,
    pub training_rows: usize,
    pub model: Option<ModelSnapshot>,
    pub status: PredictionStatus,
}

impl PredictionRecord {
    pub fn model_snapshot_id(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.id.as_str())
    }
}

/// Aggregate scorecard for one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub horizon: u32,
    pub fitted: usize,
    pub null_predictions: usize,
    /// Campbell-Thompson out-of-sample R² against the historical-mean forecast.
    pub oos_r_squared: Option<f64>,
    /// Share of scored predictions whose sign matched the realized return.
    pub hit_rate: Option<f64>,
    pub mean_coefficients: Vec<(String, f64)>,
}
