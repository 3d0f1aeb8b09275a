//! Daily on-chain factors: HODL%, SOPR-lite, NVT and MPR.
//!
//! Each factor for day t reads only aggregates and prices dated t or
//! earlier. A factor whose inputs are missing is `None`, never zero.

use crate::application::factors::price_series::PriceSeries;
use crate::config::FactorConfig;
use crate::domain::factors::DailyFactorRecord;
use crate::domain::ledger::aggregates::{DailyAggregate, LedgerAggregates, supply_at_height};
use crate::domain::ledger::records::{BASE_UNITS_PER_COIN, BacklogObservation};
use crate::domain::stats::TrailingDayWindow;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub struct FactorBuilder {
    config: FactorConfig,
}

impl FactorBuilder {
    pub fn new(config: FactorConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        aggregates: &LedgerAggregates,
        backlog: &[BacklogObservation],
    ) -> Vec<DailyFactorRecord> {
        let prices = PriceSeries::new(&aggregates.prices, self.config.price_fill_tolerance_days);
        let backlog_by_day = latest_backlog_per_day(backlog);
        let mut volume_window = TrailingDayWindow::new(self.config.nvt_window_days);

        let records: Vec<DailyFactorRecord> = aggregates
            .daily
            .iter()
            .enumerate()
            .map(|(i, day)| {
                let price = prices.price_on(day.day);
                let volume = price
                    .map(|p| day.total_spent_value as f64 / BASE_UNITS_PER_COIN * p);
                volume_window.advance(i, volume);

                DailyFactorRecord {
                    day: day.day,
                    hodl_pct: self.hodl_pct(day),
                    sopr_lite: self.sopr_lite(day, &prices),
                    nvt: self.nvt(day, price, &volume_window),
                    mpr: self.mpr(day, backlog_by_day.get(&day.day).copied()),
                }
            })
            .collect();

        info!(
            "FactorBuilder: {} days, non-null hodl={} sopr={} nvt={} mpr={}",
            records.len(),
            records.iter().filter(|r| r.hodl_pct.is_some()).count(),
            records.iter().filter(|r| r.sopr_lite.is_some()).count(),
            records.iter().filter(|r| r.nvt.is_some()).count(),
            records.iter().filter(|r| r.mpr.is_some()).count()
        );
        records
    }

    /// Value-weighted share of the day's matched spends at least the
    /// threshold age.
    pub fn hodl_pct(&self, day: &DailyAggregate) -> Option<f64> {
        let total: i64 = day.spend_ages.iter().map(|s| s.value).sum();
        if total <= 0 {
            return None;
        }
        let old: i64 = day
            .spend_ages
            .iter()
            .filter(|s| s.age_days >= self.config.hodl_age_threshold_days)
            .map(|s| s.value)
            .sum();
        Some(old as f64 / total as f64)
    }

    /// Realized value over cost basis for spends at least the minimum age.
    pub fn sopr_lite(&self, day: &DailyAggregate, prices: &PriceSeries) -> Option<f64> {
        let spend_price = prices.price_on(day.day)?;
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for spend in day
            .spend_ages
            .iter()
            .filter(|s| s.age_days >= self.config.sopr_min_age_days)
        {
            let Some(basis) = prices.price_on(spend.creation_day) else {
                debug!(
                    "FactorBuilder: no cost-basis price for {} (spent {})",
                    spend.creation_day, day.day
                );
                return None;
            };
            numerator += spend.value as f64 * spend_price;
            denominator += spend.value as f64 * basis;
        }
        (denominator > 0.0).then(|| numerator / denominator)
    }

    /// Market cap over the trailing mean daily transferred value.
    fn nvt(
        &self,
        day: &DailyAggregate,
        price: Option<f64>,
        volume_window: &TrailingDayWindow,
    ) -> Option<f64> {
        let price = price?;
        let height = day.last_height?;
        if volume_window.count() < self.config.nvt_min_observations {
            return None;
        }
        let mean_volume = volume_window.mean()?;
        if mean_volume <= 0.0 {
            return None;
        }
        let market_cap = supply_at_height(height) as f64 / BASE_UNITS_PER_COIN * price;
        Some(market_cap / mean_volume)
    }

    /// Backlog depth relative to block capacity, times fee urgency relative
    /// to recently confirmed fees.
    fn mpr(&self, day: &DailyAggregate, backlog: Option<&BacklogObservation>) -> Option<f64> {
        let backlog = backlog?;
        let block_vsize = day.trailing_block_vsize.filter(|v| *v > 0.0)?;
        let confirmed_fee = day.trailing_confirmed_median_fee.filter(|f| *f > 0.0)?;
        let depth = backlog.pending_vsize as f64 / block_vsize;
        let urgency = backlog.pending_median_fee_rate / confirmed_fee;
        urgency.is_finite().then_some(depth * urgency)
    }
}

/// Latest observation on each calendar day.
fn latest_backlog_per_day(
    backlog: &[BacklogObservation],
) -> BTreeMap<NaiveDate, &BacklogObservation> {
    let mut by_day: BTreeMap<NaiveDate, &BacklogObservation> = BTreeMap::new();
    for obs in backlog {
        let day = obs.timestamp.date_naive();
        match by_day.get(&day) {
            Some(existing) if existing.timestamp >= obs.timestamp => {}
            _ => {
                by_day.insert(day, obs);
            }
        }
    }
    by_day
}
