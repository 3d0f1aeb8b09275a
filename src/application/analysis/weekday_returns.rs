//! Weekday effects in daily log returns: one-way ANOVA, Kruskal-Wallis and
//! a dummy regression against a Monday baseline with HAC errors.

use crate::config::WeekdayConfig;
use crate::domain::ledger::records::PriceObservation;
use crate::domain::stats::OlsFit;
use crate::domain::stats::inference::{chi_squared_p_value, f_p_value, t_p_value};
use chrono::{Datelike, TimeDelta, Weekday};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayGroup {
    pub weekday: Weekday,
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

/// One weekday's mean return relative to Monday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayCoefficient {
    pub weekday: Weekday,
    pub coefficient: f64,
    pub std_error: f64,
    pub p_value: Option<f64>,
}

/// `return ~ 1 + Tue + ... + Sun`, Monday absorbed by the intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayRegression {
    pub baseline_mean: f64,
    pub r_squared: f64,
    /// Wald F on the six dummies using the HAC covariance.
    pub f_statistic: Option<f64>,
    pub f_p_value: Option<f64>,
    pub hac_lags: usize,
    /// Tuesday first.
    pub coefficients: Vec<WeekdayCoefficient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayEffects {
    pub f_statistic: f64,
    pub p_value: Option<f64>,
    /// Share of return variance explained by the weekday.
    pub eta_squared: f64,
    /// Tie-corrected Kruskal-Wallis H. None when every return is tied.
    pub kruskal_h: Option<f64>,
    pub kruskal_p_value: Option<f64>,
    pub regression: Option<WeekdayRegression>,
    /// Monday first.
    pub groups: Vec<WeekdayGroup>,
}

pub struct WeekdayReturnAnalysis {
    config: WeekdayConfig,
}

impl WeekdayReturnAnalysis {
    pub fn new(config: WeekdayConfig) -> Self {
        Self { config }
    }

    /// `None` when any weekday has fewer than `min_group_size` returns.
    pub fn analyze(&self, prices: &[PriceObservation]) -> Option<WeekdayEffects> {
        // (weekday index, return) in date order
        let mut series: Vec<(usize, f64)> = Vec::with_capacity(prices.len());
        for pair in prices.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            // Only consecutive calendar days form a one-day return
            if curr.day - prev.day != TimeDelta::days(1) || prev.closing_price <= 0.0 {
                continue;
            }
            let ret = (curr.closing_price / prev.closing_price).ln();
            series.push((curr.day.weekday().num_days_from_monday() as usize, ret));
        }
        let mut buckets: [Vec<f64>; 7] = Default::default();
        for &(weekday, ret) in &series {
            buckets[weekday].push(ret);
        }

        if let Some(short) = buckets.iter().map(Vec::len).min()
            && short < self.config.min_group_size.max(2)
        {
            debug!(
                "WeekdayReturnAnalysis: smallest weekday group has {} returns, need {}",
                short, self.config.min_group_size
            );
            return None;
        }

        let all: Vec<f64> = buckets.iter().flatten().copied().collect();
        let total = all.len();
        let grand_mean = all.iter().mean();
        let sst: f64 = all.iter().map(|r| (r - grand_mean).powi(2)).sum();

        let mut ssb = 0.0;
        let mut ssw = 0.0;
        let mut groups = Vec::with_capacity(7);
        for (i, bucket) in buckets.iter().enumerate() {
            let mean = bucket.iter().mean();
            ssb += bucket.len() as f64 * (mean - grand_mean).powi(2);
            ssw += bucket.iter().map(|r| (r - mean).powi(2)).sum::<f64>();
            groups.push(WeekdayGroup {
                weekday: weekday_at(i),
                mean,
                std_dev: bucket.iter().std_dev(),
                count: bucket.len(),
            });
        }

        let df_between = 6.0;
        let df_within = (total - 7) as f64;
        if ssw <= 0.0 || df_within <= 0.0 {
            return None;
        }
        let f_statistic = (ssb / df_between) / (ssw / df_within);
        let kruskal_h = kruskal_wallis(&buckets);
        let effects = WeekdayEffects {
            f_statistic,
            p_value: f_p_value(f_statistic, df_between, df_within),
            eta_squared: if sst > 0.0 { ssb / sst } else { 0.0 },
            kruskal_h,
            kruskal_p_value: kruskal_h.and_then(|h| chi_squared_p_value(h, df_between)),
            regression: self.monday_baseline_regression(&series),
            groups,
        };
        info!(
            "WeekdayReturnAnalysis: {} returns, F {:.3}, p {:?}, eta² {:.4}, H {:?}",
            total, effects.f_statistic, effects.p_value, effects.eta_squared, effects.kruskal_h
        );
        Some(effects)
    }

    fn monday_baseline_regression(&self, series: &[(usize, f64)]) -> Option<WeekdayRegression> {
        let n = series.len();
        let x = DMatrix::from_fn(n, 7, |t, j| {
            if j == 0 || series[t].0 == j { 1.0 } else { 0.0 }
        });
        let y = DVector::from_iterator(n, series.iter().map(|&(_, r)| r));
        let fit = match OlsFit::fit(&x, &y) {
            Ok(fit) => fit,
            Err(e) => {
                debug!("WeekdayReturnAnalysis: regression skipped: {}", e);
                return None;
            }
        };

        let lags = self.config.hac_lags;
        let cov = fit.newey_west_covariance(&x, lags);
        let df = (n - 7) as f64;
        let coefficients = (1..7)
            .map(|j| {
                let coefficient = fit.coefficients[j];
                let std_error = cov[(j, j)].max(0.0).sqrt();
                let p_value = (std_error > 0.0)
                    .then(|| t_p_value(coefficient / std_error, df))
                    .flatten();
                WeekdayCoefficient {
                    weekday: weekday_at(j),
                    coefficient,
                    std_error,
                    p_value,
                }
            })
            .collect();

        let beta = fit.coefficients.rows(1, 6).clone_owned();
        let f_statistic = cov
            .view((1, 1), (6, 6))
            .clone_owned()
            .try_inverse()
            .map(|inv| (beta.transpose() * inv * &beta)[(0, 0)] / 6.0)
            .filter(|f| f.is_finite());

        Some(WeekdayRegression {
            baseline_mean: fit.coefficients[0],
            r_squared: fit.r_squared(),
            f_statistic,
            f_p_value: f_statistic.and_then(|f| f_p_value(f, 6.0, df)),
            hac_lags: lags,
            coefficients,
        })
    }
}

fn weekday_at(index: usize) -> Weekday {
    Weekday::try_from(index as u8).unwrap_or(Weekday::Mon)
}

/// Kruskal-Wallis H with average ranks for ties and the usual tie correction.
fn kruskal_wallis(groups: &[Vec<f64>]) -> Option<f64> {
    let mut pooled: Vec<(f64, usize)> = groups
        .iter()
        .enumerate()
        .flat_map(|(g, values)| values.iter().map(move |&v| (v, g)))
        .collect();
    let n = pooled.len();
    if n < 2 {
        return None;
    }
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sums = vec![0.0; groups.len()];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        // Ranks i+1..=j+1 share their average
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &(_, g) in &pooled[i..=j] {
            rank_sums[g] += rank;
        }
        let ties = (j - i + 1) as f64;
        tie_term += ties.powi(3) - ties;
        i = j + 1;
    }

    let nf = n as f64;
    let correction = 1.0 - tie_term / (nf.powi(3) - nf);
    if correction <= 0.0 {
        return None;
    }
    let sum: f64 = groups
        .iter()
        .zip(&rank_sums)
        .filter(|(values, _)| !values.is_empty())
        .map(|(values, r)| r * r / values.len() as f64)
        .sum();
    let h = 12.0 / (nf * (nf + 1.0)) * sum - 3.0 * (nf + 1.0);
    Some(h / correction)
}
