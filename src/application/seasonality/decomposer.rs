//! Factorial hour-of-day × day-of-week decomposition of log fee levels.
//!
//! `log(fee) = Σ α[h,d]·1[hour=h, weekday=d] + Γ'C + ξ`, one dummy per
//! populated cell and no intercept. Controls are demeaned so each α reads
//! as the cell's log fee at average control values.

use crate::config::SeasonalityConfig;
use crate::domain::errors::FitError;
use crate::domain::factors::Factor;
use crate::domain::ledger::aggregates::HourlyAggregate;
use crate::domain::panel::PanelSnapshot;
use crate::domain::seasonality::{
    ConfidenceFlag, SeasonalityCell, SeasonalityControl, SeasonalityDecomposition,
};
use crate::domain::stats::inference::{f_p_value, nested_f_statistic};
use crate::domain::stats::{OlsFit, RollingWindow};
use chrono::{Datelike, Timelike};
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One usable hour: its cell and control values.
#[derive(Debug, Clone, PartialEq)]
struct SeasonalRow {
    weekday: u32,
    hour: u32,
    log_fee: f64,
    controls: Vec<f64>,
}

pub struct SeasonalityDecomposer {
    config: SeasonalityConfig,
}

impl SeasonalityDecomposer {
    pub fn new(config: SeasonalityConfig) -> Self {
        Self { config }
    }

    /// `panel` supplies backlog pressure; without it that control is
    /// missing and every row needing it is dropped.
    pub fn decompose(
        &self,
        hourly: &[HourlyAggregate],
        panel: Option<&PanelSnapshot>,
    ) -> Result<SeasonalityDecomposition, FitError> {
        let rows = self.rows(hourly, panel);
        let n = rows.len();

        let mut counts: BTreeMap<(u32, u32), usize> = BTreeMap::new();
        for row in &rows {
            *counts.entry((row.weekday, row.hour)).or_insert(0) += 1;
        }
        let cells: Vec<(u32, u32)> = counts.keys().copied().collect();
        let cell_index: BTreeMap<(u32, u32), usize> =
            cells.iter().enumerate().map(|(i, c)| (*c, i)).collect();

        let kc = self.config.controls.len();
        let k = cells.len() + kc;
        if cells.is_empty() || n <= k {
            return Err(FitError::InsufficientData {
                available: n,
                required: k + 1,
            });
        }

        let control_means: Vec<f64> = (0..kc)
            .map(|j| rows.iter().map(|r| r.controls[j]).sum::<f64>() / n as f64)
            .collect();
        let demeaned = |i: usize, j: usize| rows[i].controls[j] - control_means[j];

        let x = DMatrix::from_fn(n, k, |i, j| {
            if j < cells.len() {
                let own = cell_index.get(&(rows[i].weekday, rows[i].hour));
                if own == Some(&j) { 1.0 } else { 0.0 }
            } else {
                demeaned(i, j - cells.len())
            }
        });
        let y = DVector::from_iterator(n, rows.iter().map(|r| r.log_fee));
        let fit = OlsFit::fit(&x, &y)?;
        let std_errors = fit.classical_std_errors();

        let (equal_effects_f, equal_effects_p_value) = if cells.len() > 1 {
            let restricted_x = DMatrix::from_fn(n, 1 + kc, |i, j| {
                if j == 0 { 1.0 } else { demeaned(i, j - 1) }
            });
            match OlsFit::fit(&restricted_x, &y) {
                Ok(restricted) => {
                    let q = cells.len() - 1;
                    let df = n - k;
                    let f = nested_f_statistic(restricted.rss, fit.rss, q, df);
                    (f, f.and_then(|f| f_p_value(f, q as f64, df as f64)))
                }
                Err(_) => (None, None),
            }
        } else {
            (None, None)
        };

        let min_samples = self.config.min_cell_samples;
        let seasonal_cells: Vec<SeasonalityCell> = cells
            .iter()
            .enumerate()
            .map(|(j, &(weekday, hour))| {
                let sample_count = counts.get(&(weekday, hour)).copied().unwrap_or(0);
                SeasonalityCell {
                    hour,
                    weekday,
                    fitted_effect: fit.coefficients[j],
                    std_error: Some(std_errors[j]).filter(|s| s.is_finite()),
                    sample_count,
                    confidence: if sample_count < min_samples {
                        ConfidenceFlag::LowConfidence
                    } else {
                        ConfidenceFlag::Normal
                    },
                }
            })
            .collect();

        let low = seasonal_cells
            .iter()
            .filter(|c| c.confidence == ConfidenceFlag::LowConfidence)
            .count();
        if low > 0 {
            warn!(
                "SeasonalityDecomposer: {} of {} cells below {} samples",
                low,
                seasonal_cells.len(),
                min_samples
            );
        }
        info!(
            "SeasonalityDecomposer: {} hours, {} cells, R² {:.4}, equal-effects F {:?}",
            n,
            seasonal_cells.len(),
            fit.r_squared(),
            equal_effects_f
        );

        Ok(SeasonalityDecomposition {
            cells: seasonal_cells,
            control_coefficients: self
                .config
                .controls
                .iter()
                .enumerate()
                .map(|(j, c)| (*c, fit.coefficients[cells.len() + j]))
                .collect(),
            r_squared: fit.r_squared(),
            observations: n,
            equal_effects_f,
            equal_effects_p_value,
        })
    }

    fn rows(&self, hourly: &[HourlyAggregate], panel: Option<&PanelSnapshot>) -> Vec<SeasonalRow> {
        let mut recent = RollingWindow::new(self.config.volatility_window_hours);
        let mut rows = Vec::with_capacity(hourly.len());

        for hour in hourly {
            let Some(log_fee) = hour.mean_fee_rate().map(f64::ln) else {
                continue;
            };
            // Volatility over preceding hours only
            let volatility = recent.std_dev();
            recent.push(log_fee);

            let controls: Option<Vec<f64>> = self
                .config
                .controls
                .iter()
                .map(|control| match control {
                    SeasonalityControl::Fullness => hour.mean_fullness,
                    SeasonalityControl::RecentVolatility => volatility,
                    SeasonalityControl::BacklogPressure => panel.and_then(|p| {
                        let index = p.day_index(hour.hour_start.date_naive())?;
                        p.lagged(Factor::Mpr, index)
                    }),
                })
                .collect();

            if let Some(controls) = controls {
                rows.push(SeasonalRow {
                    weekday: hour.hour_start.weekday().num_days_from_monday(),
                    hour: hour.hour_start.hour(),
                    log_fee,
                    controls,
                });
            }
        }
        rows
    }
}
