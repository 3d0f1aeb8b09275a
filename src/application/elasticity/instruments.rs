//! Hourly fee/throughput panel with its instrument set.
//!
//! Every instrument for an hour is built from blocks mined at or before the
//! end of that hour.

use crate::application::aggregation::ledger_aggregator::hour_floor;
use crate::config::ElasticityConfig;
use crate::domain::elasticity::{ElasticityObservation, InstrumentKind};
use crate::domain::ledger::aggregates::{BlockAggregate, LedgerAggregates};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Blocks per difficulty epoch.
pub const RETARGET_INTERVAL: u64 = 2016;

/// Protocol bound on a single retarget adjustment.
const MAX_RETARGET_FACTOR: f64 = 4.0;

/// A difficulty retarget and its log adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetargetShock {
    pub height: u64,
    pub timestamp: DateTime<Utc>,
    pub log_adjustment: f64,
}

/// Retargets whose previous epoch is fully present in `blocks`.
///
/// The adjustment factor is `2016 × expected_interval / actual_duration`,
/// where the duration runs from the epoch's first block to its last (the
/// protocol's off-by-one), clamped to `[1/4, 4]`.
pub fn retarget_shocks(blocks: &[BlockAggregate], expected_interval_secs: f64) -> Vec<RetargetShock> {
    let by_height: HashMap<u64, &BlockAggregate> = blocks.iter().map(|b| (b.height, b)).collect();
    blocks
        .iter()
        .filter(|b| b.height >= RETARGET_INTERVAL && b.height % RETARGET_INTERVAL == 0)
        .filter_map(|b| {
            let first = by_height.get(&(b.height - RETARGET_INTERVAL))?;
            let last = by_height.get(&(b.height - 1))?;
            let actual = (last.timestamp - first.timestamp).num_seconds().max(1) as f64;
            let factor = (RETARGET_INTERVAL as f64 * expected_interval_secs / actual)
                .clamp(1.0 / MAX_RETARGET_FACTOR, MAX_RETARGET_FACTOR);
            Some(RetargetShock {
                height: b.height,
                timestamp: b.timestamp,
                log_adjustment: factor.ln(),
            })
        })
        .collect()
}

/// Builds one observation per hour with positive fees and throughput.
pub fn build_elasticity_panel(
    aggregates: &LedgerAggregates,
    config: &ElasticityConfig,
) -> Vec<ElasticityObservation> {
    let Some(first_hour) = aggregates.hourly.first().map(|h| h.hour_start) else {
        return Vec::new();
    };
    let expected_blocks = 3600.0 / config.expected_block_interval_secs;
    let shocks = retarget_shocks(&aggregates.blocks, config.expected_block_interval_secs);
    let shock_window = TimeDelta::hours(config.difficulty_shock_window_hours.max(0));

    let mut panel = Vec::with_capacity(aggregates.hourly.len());
    let mut previous_log_tx: Option<(DateTime<Utc>, f64)> = None;

    for hour in &aggregates.hourly {
        let Some(fee_rate) = hour.mean_fee_rate() else {
            previous_log_tx = None;
            continue;
        };
        if hour.transaction_count == 0 {
            previous_log_tx = None;
            continue;
        }
        let log_tx_count = (hour.transaction_count as f64).ln();

        let difficulty_shock = shocks
            .iter()
            .rev()
            .find(|s| {
                let start = hour_floor(s.timestamp);
                hour.hour_start >= start && hour.hour_start < start + shock_window
            })
            .map(|s| s.log_adjustment)
            .unwrap_or(0.0);
        let disrupted = hour
            .max_interval_secs
            .is_some_and(|gap| gap >= config.disruption_gap_secs);

        let mut instruments = [0.0; 3];
        instruments[InstrumentKind::ArrivalSurprise.index()] =
            hour.block_count as f64 - expected_blocks;
        instruments[InstrumentKind::DifficultyShock.index()] = difficulty_shock;
        instruments[InstrumentKind::HashrateDisruption.index()] =
            if disrupted { 1.0 } else { 0.0 };

        let lagged_log_tx_count = previous_log_tx
            .filter(|(at, _)| *at + TimeDelta::hours(1) == hour.hour_start)
            .map(|(_, v)| v);

        panel.push(ElasticityObservation {
            hour_start: hour.hour_start,
            log_fee: fee_rate.ln(),
            log_tx_count,
            fullness: hour.mean_fullness,
            instruments,
            trend: (hour.hour_start - first_hour).num_hours() as f64,
            lagged_log_tx_count,
        });
        previous_log_tx = Some((hour.hour_start, log_tx_count));
    }

    debug!(
        "Elasticity panel: {} usable hours of {}, {} retargets",
        panel.len(),
        aggregates.hourly.len(),
        shocks.len()
    );
    panel
}
