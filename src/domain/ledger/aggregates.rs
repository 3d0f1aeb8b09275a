use crate::domain::errors::MalformedKind;
use crate::domain::ledger::records::PriceObservation;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Blocks per subsidy era.
pub const HALVING_INTERVAL: u64 = 210_000;

/// Initial block subsidy in base units.
pub const INITIAL_SUBSIDY: i64 = 5_000_000_000;

/// Block subsidy at `height`: `5e9 × 0.5^floor(height / 210000)` in base units.
pub fn subsidy(height: u64) -> i64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 63 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// Circulating supply after the block at `height` has been mined.
pub fn supply_at_height(height: u64) -> i64 {
    let mut supply = 0i64;
    let mut era_start = 0u64;
    while era_start <= height {
        let reward = subsidy(era_start);
        if reward == 0 {
            break;
        }
        let era_end = (era_start + HALVING_INTERVAL - 1).min(height);
        supply += reward * (era_end - era_start + 1) as i64;
        era_start += HALVING_INTERVAL;
    }
    supply
}

/// One spent unit of value with its holding age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendAge {
    pub value: i64,
    pub age_days: i64,
    pub creation_day: NaiveDate,
}

/// Per-day aggregate, one per calendar day of the run's day arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub day: NaiveDate,
    pub block_count: u32,
    /// Non-coinbase transactions.
    pub transaction_count: u64,
    pub total_fees: i64,
    pub total_subsidy: i64,
    /// All spends on the day, matched or not.
    pub total_spent_value: i64,
    /// Matched spends only.
    pub spend_ages: Vec<SpendAge>,
    pub total_weight: u64,
    pub empty_blocks: u32,
    /// Highest canonical height at or before the end of the day.
    pub last_height: Option<u64>,
    /// Mean virtual size over the trailing block window ending at the day's last block.
    pub trailing_block_vsize: Option<f64>,
    /// Median fee rate over the transactions of the trailing fee-block window.
    pub trailing_confirmed_median_fee: Option<f64>,
}

impl DailyAggregate {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            block_count: 0,
            transaction_count: 0,
            total_fees: 0,
            total_subsidy: 0,
            total_spent_value: 0,
            spend_ages: Vec::new(),
            total_weight: 0,
            empty_blocks: 0,
            last_height: None,
            trailing_block_vsize: None,
            trailing_confirmed_median_fee: None,
        }
    }
}

/// Per-block aggregate for canonical blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAggregate {
    pub height: u64,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub weight: u64,
    pub virtual_size: f64,
    pub fullness: f64,
    pub transaction_count: u32,
    pub total_fees: i64,
    pub subsidy: i64,
    pub median_fee_rate: Option<f64>,
    /// 10th-percentile fee rate, the block's clearing price proxy.
    pub clearing_fee_rate: Option<f64>,
    /// Seconds since the previous canonical block.
    pub interval_secs: Option<i64>,
    pub is_empty: bool,
}

impl BlockAggregate {
    /// Median over clearing fee rate; how much the typical payer overbid.
    pub fn overpay_ratio(&self) -> Option<f64> {
        match (self.median_fee_rate, self.clearing_fee_rate) {
            (Some(median), Some(clearing)) if clearing > 0.0 => Some(median / clearing),
            _ => None,
        }
    }
}

/// Per-hour aggregate (UTC hour buckets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub hour_start: DateTime<Utc>,
    pub block_count: u32,
    pub transaction_count: u64,
    pub total_fees: i64,
    pub total_vsize: u64,
    pub mean_fullness: Option<f64>,
    pub empty_blocks: u32,
    /// Longest inter-block gap among blocks mined in the hour.
    pub max_interval_secs: Option<i64>,
    pub mean_overpay_ratio: Option<f64>,
}

impl HourlyAggregate {
    pub fn empty(hour_start: DateTime<Utc>) -> Self {
        Self {
            hour_start,
            block_count: 0,
            transaction_count: 0,
            total_fees: 0,
            total_vsize: 0,
            mean_fullness: None,
            empty_blocks: 0,
            max_interval_secs: None,
            mean_overpay_ratio: None,
        }
    }

    /// Mean fee rate (fees / vsize) in base units per vbyte.
    pub fn mean_fee_rate(&self) -> Option<f64> {
        if self.total_vsize == 0 || self.total_fees <= 0 {
            return None;
        }
        Some(self.total_fees as f64 / self.total_vsize as f64)
    }
}

/// Counts of what the aggregator accepted and excluded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub total_records: usize,
    pub excluded: BTreeMap<MalformedKind, usize>,
    pub unmatched_spends: usize,
    pub superseded_blocks: usize,
}

impl AggregationReport {
    pub fn record_exclusion(&mut self, kind: MalformedKind) {
        *self.excluded.entry(kind).or_insert(0) += 1;
    }

    pub fn excluded_total(&self) -> usize {
        self.excluded.values().sum()
    }

    pub fn excluded_fraction(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        self.excluded_total() as f64 / self.total_records as f64
    }
}

/// Aggregator output: day-, block- and hour-indexed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAggregates {
    pub daily: Vec<DailyAggregate>,
    pub blocks: Vec<BlockAggregate>,
    pub hourly: Vec<HourlyAggregate>,
    /// Validated daily closes, ascending by day, at most one per day.
    pub prices: Vec<PriceObservation>,
    pub report: AggregationReport,
}

impl LedgerAggregates {
    pub fn start_day(&self) -> Option<NaiveDate> {
        self.daily.first().map(|d| d.day)
    }

    pub fn day_index(&self, day: NaiveDate) -> Option<usize> {
        let start = self.start_day()?;
        let offset = (day - start).num_days();
        if offset < 0 || offset as usize >= self.daily.len() {
            return None;
        }
        Some(offset as usize)
    }
}
