//! Winsorize, standardize, fill and lag each factor column.
//!
//! Every statistic applied on day t comes from an expanding structure that
//! has only seen values up to and including t.

use crate::config::PreprocessConfig;
use crate::domain::factors::{DailyFactorRecord, Factor};
use crate::domain::panel::{FactorColumn, PanelSnapshot};
use crate::domain::stats::{ExpandingMoments, ExpandingQuantiles};
use tracing::info;

pub struct PanelPreprocessor {
    config: PreprocessConfig,
}

impl PanelPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, records: &[DailyFactorRecord]) -> PanelSnapshot {
        let days = records.iter().map(|r| r.day).collect();
        let columns: Vec<FactorColumn> = Factor::ALL
            .iter()
            .map(|&factor| {
                let raw: Vec<Option<f64>> = records.iter().map(|r| r.get(factor)).collect();
                self.process_column(factor, raw)
            })
            .collect();

        let panel = PanelSnapshot::new(days, columns);
        info!(
            "PanelPreprocessor: {} days, fingerprint {}",
            panel.len(),
            &panel.fingerprint()[..16]
        );
        panel
    }

    pub fn process_column(&self, factor: Factor, raw: Vec<Option<f64>>) -> FactorColumn {
        let n = raw.len();
        let mut quantiles = ExpandingQuantiles::new();
        let mut moments = ExpandingMoments::new();
        let mut bounds = Vec::with_capacity(n);
        let mut winsorized = Vec::with_capacity(n);
        let mut standardized = Vec::with_capacity(n);

        for value in &raw {
            let value = value.filter(|v| v.is_finite());
            if let Some(v) = value {
                quantiles.push(v);
            }
            let day_bounds = quantiles
                .quantile(self.config.winsor_lower)
                .zip(quantiles.quantile(self.config.winsor_upper));
            bounds.push(day_bounds);

            let clipped = value.zip(day_bounds).map(|(v, (lo, hi))| v.clamp(lo, hi));
            winsorized.push(clipped);

            let z = clipped.and_then(|w| {
                moments.push(w);
                if moments.count() < self.config.zscore_min_observations {
                    return None;
                }
                let mean = moments.mean()?;
                let std = moments.std_dev().filter(|s| *s > 0.0)?;
                Some((w - mean) / std)
            });
            standardized.push(z);
        }

        let filled = forward_fill(&standardized, self.config.max_fill_gap);
        let lagged = std::iter::once(None)
            .chain(filled.iter().take(n.saturating_sub(1)).copied())
            .collect();

        FactorColumn {
            factor,
            raw,
            bounds,
            winsorized,
            standardized,
            filled,
            lagged,
        }
    }
}

/// Carries the last value across at most `max_gap` consecutive missing
/// cells. The fill never looks past the current cell, so a longer gap is
/// filled for its first `max_gap` cells and null afterwards.
pub fn forward_fill(values: &[Option<f64>], max_gap: usize) -> Vec<Option<f64>> {
    let mut last: Option<f64> = None;
    let mut gap = 0usize;
    values
        .iter()
        .map(|value| match value {
            Some(v) => {
                last = Some(*v);
                gap = 0;
                Some(*v)
            }
            None => {
                gap += 1;
                if gap <= max_gap { last } else { None }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor(min_obs: usize, max_gap: usize) -> PanelPreprocessor {
        PanelPreprocessor::new(PreprocessConfig {
            winsor_lower: 0.01,
            winsor_upper: 0.99,
            zscore_min_observations: min_obs,
            max_fill_gap: max_gap,
        })
    }

    #[test]
    fn test_winsorized_values_within_expanding_bounds() {
        let raw: Vec<Option<f64>> = (0..200)
            .map(|i| {
                if i == 150 || i == 190 {
                    Some(1_000.0)
                } else if i % 11 == 0 {
                    None
                } else {
                    Some((i as f64 * 0.7).sin())
                }
            })
            .collect();
        let column = preprocessor(30, 6).process_column(Factor::Nvt, raw);
        for (w, b) in column.winsorized.iter().zip(&column.bounds) {
            if let (Some(w), Some((lo, hi))) = (w, b) {
                assert!(*w >= *lo && *w <= *hi);
            }
        }
        // Later outliers are pulled inside the bounds
        assert!(column.winsorized[150].unwrap() < 1_000.0);
        assert_eq!(column.raw[150], Some(1_000.0));
    }

    #[test]
    fn test_zscore_warmup_and_lag() {
        let raw: Vec<Option<f64>> = (0..10).map(|i| Some(i as f64)).collect();
        let column = preprocessor(5, 6).process_column(Factor::HodlPct, raw);
        assert!(column.standardized[..4].iter().all(Option::is_none));
        assert!(column.standardized[4].is_some());
        assert_eq!(column.lagged[0], None);
        for t in 1..10 {
            assert_eq!(column.lagged[t], column.filled[t - 1]);
        }
    }

    #[test]
    fn test_forward_fill_is_bounded() {
        let values = vec![Some(1.0), None, None, None, Some(2.0), None];
        assert_eq!(
            forward_fill(&values, 2),
            vec![Some(1.0), Some(1.0), Some(1.0), None, Some(2.0), Some(2.0)]
        );
        assert_eq!(forward_fill(&[None, Some(3.0)], 6), vec![None, Some(3.0)]);
    }

    #[test]
    fn test_constant_column_never_standardizes() {
        let raw = vec![Some(4.0); 50];
        let column = preprocessor(30, 6).process_column(Factor::Mpr, raw);
        assert!(column.standardized.iter().all(Option::is_none));
    }
}
