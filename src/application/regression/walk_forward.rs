//! Expanding-window walk-forward regression.
//!
//! For each horizon the regressor cycles `Training → Predicting → Advancing`
//! over the panel. The window for prediction row `T` holds every row whose
//! target had fully realized by the close of day `T - 1`, so row `T` and
//! anything after it never reach the fit that predicts it.

use crate::application::regression::returns::ReturnSeries;
use crate::config::WalkForwardConfig;
use crate::domain::errors::FitError;
use crate::domain::factors::Factor;
use crate::domain::panel::PanelSnapshot;
use crate::domain::prediction::{
    ControlCovariate, ModelSnapshot, PredictionRecord, PredictionStatus, RegressionWindow,
    WalkForwardSummary,
};
use crate::domain::stats::{OlsFit, design_matrix, newey_west_lags};
use nalgebra::DVector;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a window fit reads. Immutable once built.
#[derive(Debug, Clone)]
pub struct RegressionInputs {
    pub panel: Arc<PanelSnapshot>,
    pub returns: ReturnSeries,
    /// Log total fees per panel day; `None` on fee-less days.
    pub log_fees: Vec<Option<f64>>,
}

impl RegressionInputs {
    fn control(&self, control: ControlCovariate, row: usize) -> Option<f64> {
        match control {
            ControlCovariate::LaggedReturn => self.returns.trailing_return(row),
            ControlCovariate::LaggedLogFees => {
                row.checked_sub(1).and_then(|d| self.log_fees.get(d).copied().flatten())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardOutput {
    /// Ordered by day, then horizon.
    pub predictions: Vec<PredictionRecord>,
    pub summaries: Vec<WalkForwardSummary>,
}

/// Phase of the per-horizon walk.
#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Training { row: usize },
    Predicting { row: usize, fit: WindowFit },
    Advancing { row: usize },
    Exhausted,
}

/// Result of fitting one training window.
#[derive(Debug, Clone, PartialEq)]
struct WindowFit {
    window: RegressionWindow,
    training_rows: usize,
    benchmark: Option<f64>,
    outcome: Result<ModelSnapshot, FitError>,
}

pub struct WalkForwardRegressor {
    config: WalkForwardConfig,
    inputs: RegressionInputs,
}

impl WalkForwardRegressor {
    pub fn new(config: WalkForwardConfig, inputs: RegressionInputs) -> Self {
        Self { config, inputs }
    }

    pub fn column_names(&self) -> Vec<String> {
        std::iter::once("intercept".to_string())
            .chain(self.config.factors.iter().map(|f| f.column_name().to_string()))
            .chain(self.config.controls.iter().map(|c| c.column_name().to_string()))
            .collect()
    }

    pub fn run(&self) -> WalkForwardOutput {
        let mut predictions = Vec::new();
        let mut summaries = Vec::new();

        for &horizon in &self.config.horizons {
            let records = if self.config.parallel {
                self.run_parallel(horizon)
            } else {
                self.run_sequential(horizon)
            };
            let summary = summarize(horizon, &records);
            info!(
                "WalkForward h={}: {} fitted, {} null, OOS R² {:?}, hit rate {:?}",
                horizon,
                summary.fitted,
                summary.null_predictions,
                summary.oos_r_squared,
                summary.hit_rate
            );
            summaries.push(summary);
            predictions.extend(records);
        }

        // Stable: within a day, horizons keep configuration order
        predictions.sort_by_key(|p| p.day);
        WalkForwardOutput {
            predictions,
            summaries,
        }
    }

    /// First row that can be predicted with a full initial window.
    pub fn first_prediction_row(&self, horizon: u32) -> usize {
        self.config.initial_window_days + horizon as usize - 1
    }

    /// Drives the phase machine row by row.
    pub fn run_sequential(&self, horizon: u32) -> Vec<PredictionRecord> {
        let n = self.inputs.panel.len();
        let mut records = Vec::new();
        let mut phase = Phase::Training {
            row: self.first_prediction_row(horizon),
        };

        loop {
            phase = match phase {
                Phase::Training { row } if row >= n => Phase::Exhausted,
                Phase::Training { row } => Phase::Predicting {
                    row,
                    fit: self.fit_window(row, horizon),
                },
                Phase::Predicting { row, fit } => {
                    records.push(self.predict(row, horizon, fit));
                    Phase::Advancing { row }
                }
                Phase::Advancing { row } => Phase::Training { row: row + 1 },
                Phase::Exhausted => break,
            };
        }
        records
    }

    /// Same windows as `run_sequential`, fitted on the rayon pool.
    pub fn run_parallel(&self, horizon: u32) -> Vec<PredictionRecord> {
        let n = self.inputs.panel.len();
        let first = self.first_prediction_row(horizon);
        (first..n.max(first))
            .into_par_iter()
            .map(|row| self.predict(row, horizon, self.fit_window(row, horizon)))
            .collect()
    }

    /// Feature vector of `row`: intercept, lagged factors, controls.
    fn feature_row(&self, row: usize) -> Option<Vec<f64>> {
        let mut features = Vec::with_capacity(1 + self.config.factors.len() + self.config.controls.len());
        features.push(1.0);
        for factor in &self.config.factors {
            features.push(self.lagged_factor(*factor, row)?);
        }
        for control in &self.config.controls {
            features.push(self.inputs.control(*control, row)?);
        }
        Some(features)
    }

    fn lagged_factor(&self, factor: Factor, row: usize) -> Option<f64> {
        self.inputs.panel.lagged(factor, row)
    }

    fn fit_window(&self, row: usize, horizon: u32) -> WindowFit {
        let end_index = ReturnSeries::last_known_target_row(row.saturating_sub(1), horizon)
            .unwrap_or(0);
        let window = RegressionWindow {
            horizon,
            start_index: 0,
            end_index,
            end_day: self
                .inputs
                .panel
                .day(end_index)
                .unwrap_or_default(),
        };

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for r in window.start_index..=window.end_index {
            if let (Some(features), Some(target)) = (
                self.feature_row(r),
                self.inputs.returns.forward_return(r, horizon),
            ) {
                rows.push(features);
                targets.push(target);
            }
        }
        let training_rows = rows.len();
        let benchmark = (!targets.is_empty())
            .then(|| targets.iter().sum::<f64>() / targets.len() as f64);

        let columns = self.column_names();
        let outcome = if training_rows <= columns.len() {
            Err(FitError::InsufficientData {
                available: training_rows,
                required: columns.len() + 1,
            })
        } else {
            let x = design_matrix(&rows);
            let y = DVector::from_vec(targets);
            OlsFit::fit(&x, &y).map(|fit| {
                let lags = newey_west_lags(training_rows, horizon);
                let std_errors = fit.newey_west_std_errors(&x, lags);
                ModelSnapshot::new(
                    columns,
                    fit.coefficients.iter().copied().collect(),
                    std_errors.iter().copied().collect(),
                    lags,
                    training_rows,
                    fit.r_squared(),
                )
            })
        };

        WindowFit {
            window,
            training_rows,
            benchmark,
            outcome,
        }
    }

    fn predict(&self, row: usize, horizon: u32, fit: WindowFit) -> PredictionRecord {
        let day = self.inputs.panel.day(row).unwrap_or_default();
        let realized_return = self.inputs.returns.forward_return(row, horizon);
        let mut record = PredictionRecord {
            day,
            horizon,
            predicted_return: None,
            realized_return,
            benchmark_return: fit.benchmark,
            training_end: Some(fit.window.end_day),
            training_rows: fit.training_rows,
            model: None,
            status: PredictionStatus::Fitted,
        };

        match fit.outcome {
            Ok(model) => {
                match self.feature_row(row) {
                    Some(features) => {
                        let predicted: f64 = features
                            .iter()
                            .zip(&model.coefficients)
                            .map(|(x, b)| x * b)
                            .sum();
                        debug!(
                            "WalkForward h={} {}: predicted {:.6} from {} rows (model {})",
                            horizon, day, predicted, fit.training_rows, model.id
                        );
                        record.predicted_return = Some(predicted);
                    }
                    None => {
                        debug!("WalkForward h={} {}: prediction row has missing features", horizon, day);
                        record.status = PredictionStatus::MissingFeatures;
                    }
                }
                record.model = Some(model);
            }
            Err(FitError::RankDeficientDesign { rank, columns }) => {
                warn!(
                    "WalkForward h={} {}: rank-deficient design (rank {} < {}), prediction skipped",
                    horizon, day, rank, columns
                );
                record.status = PredictionStatus::RankDeficient;
            }
            Err(FitError::InsufficientData {
                available,
                required,
            }) => {
                warn!(
                    "WalkForward h={} {}: {} usable rows, need {}, prediction skipped",
                    horizon, day, available, required
                );
                record.status = PredictionStatus::InsufficientData;
            }
        }
        record
    }
}

/// Scorecard of one horizon's predictions.
pub fn summarize(horizon: u32, records: &[PredictionRecord]) -> WalkForwardSummary {
    let fitted = records
        .iter()
        .filter(|r| r.predicted_return.is_some())
        .count();

    let scored: Vec<(f64, f64, f64)> = records
        .iter()
        .filter_map(|r| Some((r.predicted_return?, r.realized_return?, r.benchmark_return?)))
        .collect();

    let oos_r_squared = if scored.is_empty() {
        None
    } else {
        let model_sse: f64 = scored.iter().map(|(p, r, _)| (r - p).powi(2)).sum();
        let bench_sse: f64 = scored.iter().map(|(_, r, b)| (r - b).powi(2)).sum();
        (bench_sse > 0.0).then(|| 1.0 - model_sse / bench_sse)
    };

    let signed: Vec<&(f64, f64, f64)> = scored.iter().filter(|(_, r, _)| *r != 0.0).collect();
    let hit_rate = (!signed.is_empty()).then(|| {
        let hits = signed
            .iter()
            .filter(|(p, r, _)| p.signum() == r.signum())
            .count();
        hits as f64 / signed.len() as f64
    });

    let models: Vec<&ModelSnapshot> = records
        .iter()
        .filter(|r| r.predicted_return.is_some())
        .filter_map(|r| r.model.as_ref())
        .collect();
    let mean_coefficients = match models.first() {
        Some(first) => first
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mean = models.iter().map(|m| m.coefficients[i]).sum::<f64>() / models.len() as f64;
                (name.clone(), mean)
            })
            .collect(),
        None => Vec::new(),
    };

    WalkForwardSummary {
        horizon,
        fitted,
        null_predictions: records.len() - fitted,
        oos_r_squared,
        hit_rate,
        mean_coefficients,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::panel::FactorColumn;
    use chrono::{NaiveDate, TimeDelta};

    fn panel_with(values: Vec<Option<f64>>) -> Arc<PanelSnapshot> {
        let n = values.len();
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let days = (0..n).map(|i| start + TimeDelta::days(i as i64)).collect();
        let lagged = std::iter::once(None)
            .chain(values.iter().take(n - 1).copied())
            .collect();
        let column = FactorColumn {
            factor: Factor::HodlPct,
            raw: values.clone(),
            bounds: vec![None; n],
            winsorized: values.clone(),
            standardized: values.clone(),
            filled: values,
            lagged,
        };
        Arc::new(PanelSnapshot::new(days, vec![column]))
    }

    /// Price path where each day's return is 0.05 × the previous day's factor.
    fn planted(n: usize) -> RegressionInputs {
        let factor: Vec<Option<f64>> = (0..n).map(|i| Some(((i * 7919) % 13) as f64 / 6.0 - 1.0)).collect();
        let mut closes = vec![Some(100.0)];
        for t in 1..n {
            let prev = closes[t - 1].unwrap_or(100.0);
            let ret = 0.05 * factor[t - 1].unwrap_or(0.0) + 0.001;
            closes.push(Some(prev * f64::exp(ret)));
        }
        RegressionInputs {
            panel: panel_with(factor),
            returns: ReturnSeries::new(closes),
            log_fees: vec![None; n],
        }
    }

    fn config(parallel: bool) -> WalkForwardConfig {
        WalkForwardConfig {
            initial_window_days: 30,
            horizons: vec![1],
            factors: vec![Factor::HodlPct],
            controls: Vec::new(),
            parallel,
        }
    }

    #[test]
    fn test_recovers_planted_coefficient() {
        let regressor = WalkForwardRegressor::new(config(false), planted(80));
        let output = regressor.run();
        assert_eq!(output.predictions.len(), 80 - 30);
        let first = &output.predictions[0];
        assert_eq!(first.status, PredictionStatus::Fitted);
        let model = first.model.as_ref().unwrap();
        assert!((model.coefficient("hodl_pct").unwrap() - 0.05).abs() < 1e-8);
        assert_eq!(model.p_values.len(), model.columns.len());
        assert!(output.summaries[0].oos_r_squared.unwrap() > 0.99);
    }

    #[test]
    fn test_training_window_excludes_prediction_row() {
        let regressor = WalkForwardRegressor::new(config(false), planted(60));
        let h7 = 7;
        let row = regressor.first_prediction_row(h7);
        let fit = regressor.fit_window(row, h7);
        // Target of the last training row closes on day row - 1
        assert_eq!(fit.window.end_index + h7 as usize - 1, row - 1);
        assert_eq!(fit.window.len(), 30);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = WalkForwardRegressor::new(config(false), planted(70)).run();
        let parallel = WalkForwardRegressor::new(config(true), planted(70)).run();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_constant_factor_is_rank_deficient() {
        let n = 50;
        let mut inputs = planted(n);
        inputs.panel = panel_with(vec![Some(1.0); n]);
        let output = WalkForwardRegressor::new(config(false), inputs).run();
        assert!(
            output
                .predictions
                .iter()
                .all(|p| p.status == PredictionStatus::RankDeficient && p.predicted_return.is_none())
        );
        assert_eq!(output.summaries[0].fitted, 0);
    }

    #[test]
    fn test_summary_scores() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let record = |p: f64, r: f64| PredictionRecord {
            day,
            horizon: 1,
            predicted_return: Some(p),
            realized_return: Some(r),
            benchmark_return: Some(0.0),
            training_end: None,
            training_rows: 10,
            model: None,
            status: PredictionStatus::Fitted,
        };
        let summary = summarize(1, &[record(0.1, 0.2), record(-0.1, 0.1)]);
        assert_eq!(summary.hit_rate, Some(0.5));
        // SSE model 0.01 + 0.04, benchmark 0.04 + 0.01
        assert!(summary.oos_r_squared.unwrap().abs() < 1e-12);
    }
}
