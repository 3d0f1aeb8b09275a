//! Reduces raw ledger records into block-, hour- and day-indexed aggregates.
//!
//! Everything happens in one forward pass over canonical blocks in height
//! order. Spends are matched to their creations through an outpoint index
//! built once up front.

use crate::config::AggregationConfig;
use crate::domain::errors::{MalformedKind, PipelineError};
use crate::domain::ledger::aggregates::{
    AggregationReport, BlockAggregate, DailyAggregate, HourlyAggregate, LedgerAggregates,
    SpendAge, subsidy,
};
use crate::domain::ledger::records::{
    BlockRecord, CreationEvent, LedgerRecords, OutPoint, PriceObservation, TransactionRecord,
};
use crate::domain::stats::{RollingWindow, median, percentile};
use crate::domain::validation::LedgerRecordValidator;
use chrono::{DateTime, NaiveDate, TimeDelta, Timelike, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Percentile of a block's fee rates used as its clearing price.
const CLEARING_PERCENTILE: f64 = 0.10;

pub struct LedgerAggregator {
    config: AggregationConfig,
    block_window: usize,
    fee_blocks: usize,
    start_day: Option<NaiveDate>,
    end_day: Option<NaiveDate>,
}

/// Running trailing state, snapshotted after each block.
#[derive(Debug, Clone, Copy, Default)]
struct TrailingState {
    last_height: Option<u64>,
    block_vsize: Option<f64>,
    confirmed_median_fee: Option<f64>,
}

impl LedgerAggregator {
    /// `block_window` and `fee_blocks` size the trailing block-size mean and
    /// the confirmed-fee median carried on each day.
    pub fn new(config: AggregationConfig, block_window: usize, fee_blocks: usize) -> Self {
        Self {
            config,
            block_window: block_window.max(1),
            fee_blocks: fee_blocks.max(1),
            start_day: None,
            end_day: None,
        }
    }

    /// Restricts the day arena. Records outside it still feed the creation
    /// index and the trailing block windows.
    pub fn with_day_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_day = start;
        self.end_day = end;
        self
    }

    pub fn aggregate(
        &self,
        records: &LedgerRecords,
        prices: &[PriceObservation],
    ) -> Result<LedgerAggregates, PipelineError> {
        let mut report = AggregationReport {
            total_records: records.len() + prices.len(),
            ..Default::default()
        };
        info!(
            "LedgerAggregator: aggregating {} blocks, {} transactions, {} spends, {} creations",
            records.blocks.len(),
            records.transactions.len(),
            records.spends.len(),
            records.creations.len()
        );

        let blocks = canonical_blocks(&records.blocks, &mut report);
        let canonical_hashes: HashMap<&str, &BlockRecord> =
            blocks.iter().map(|b| (b.hash.as_str(), *b)).collect();

        // Transactions
        let mut block_transactions: HashMap<&str, Vec<&TransactionRecord>> = HashMap::new();
        let mut canonical_txs: HashSet<&str> = HashSet::new();
        let mut orphaned_txs: HashSet<&str> = HashSet::new();
        for tx in &records.transactions {
            if let Err(e) = LedgerRecordValidator::validate_transaction(tx) {
                report.record_exclusion(e.kind);
                continue;
            }
            if !canonical_hashes.contains_key(tx.block_hash.as_str()) {
                debug!("LedgerAggregator: transaction {} is orphaned", tx.hash);
                orphaned_txs.insert(tx.hash.as_str());
                report.record_exclusion(MalformedKind::Orphaned);
                continue;
            }
            canonical_txs.insert(tx.hash.as_str());
            block_transactions
                .entry(tx.block_hash.as_str())
                .or_default()
                .push(tx);
        }
        let is_orphaned =
            |hash: &str| orphaned_txs.contains(hash) && !canonical_txs.contains(hash);

        // Creation index
        let mut creation_index: HashMap<OutPoint, &CreationEvent> =
            HashMap::with_capacity(records.creations.len());
        for creation in &records.creations {
            if let Err(e) = LedgerRecordValidator::validate_creation(creation) {
                report.record_exclusion(e.kind);
                continue;
            }
            if is_orphaned(&creation.transaction_hash) {
                report.record_exclusion(MalformedKind::Orphaned);
                continue;
            }
            creation_index.entry(creation.outpoint()).or_insert(creation);
        }

        // Spends, bucketed by calendar day
        let mut spent_by_day: BTreeMap<NaiveDate, (i64, Vec<SpendAge>)> = BTreeMap::new();
        let mut consumed: HashSet<OutPoint> = HashSet::with_capacity(records.spends.len());
        for spend in &records.spends {
            if let Err(e) = LedgerRecordValidator::validate_spend(spend) {
                report.record_exclusion(e.kind);
                continue;
            }
            if is_orphaned(&spend.transaction_hash) {
                report.record_exclusion(MalformedKind::Orphaned);
                continue;
            }
            let outpoint = OutPoint {
                transaction_hash: spend.spent_transaction_hash.clone(),
                index: spend.spent_output_index,
            };
            // First accepted spend of an outpoint wins
            if consumed.contains(&outpoint) {
                debug!("LedgerAggregator: {} spent again by {}", outpoint, spend.transaction_hash);
                report.record_exclusion(MalformedKind::DoubleSpend);
                continue;
            }
            let spend_day = spend.block_timestamp.date_naive();
            match creation_index.get(&outpoint) {
                Some(creation) => {
                    if let Err(e) = LedgerRecordValidator::validate_spend_against(spend, creation) {
                        report.record_exclusion(e.kind);
                        continue;
                    }
                    let event = creation.spent_by(spend);
                    let Some(age_days) = event.age_days() else {
                        continue;
                    };
                    consumed.insert(outpoint);
                    let entry = spent_by_day.entry(spend_day).or_default();
                    entry.0 += spend.value;
                    entry.1.push(SpendAge {
                        value: spend.value,
                        age_days,
                        creation_day: event.created_at.date_naive(),
                    });
                }
                None => {
                    consumed.insert(outpoint);
                    report.unmatched_spends += 1;
                    spent_by_day.entry(spend_day).or_default().0 += spend.value;
                }
            }
        }

        let prices = validated_prices(prices, &mut report);

        let fraction = report.excluded_fraction();
        if fraction > self.config.max_malformed_fraction {
            warn!(
                "LedgerAggregator: {} of {} records excluded ({:.4}), above ceiling {:.4}",
                report.excluded_total(),
                report.total_records,
                fraction,
                self.config.max_malformed_fraction
            );
            return Err(PipelineError::DataIntegrityExceeded {
                excluded: report.excluded_total(),
                total: report.total_records,
                fraction,
                ceiling: self.config.max_malformed_fraction,
            });
        }

        let block_aggregates = build_block_aggregates(&blocks, &block_transactions);

        let Some((start, end)) = self.day_range(&blocks) else {
            info!("LedgerAggregator: no canonical blocks, empty aggregates");
            return Ok(LedgerAggregates {
                daily: Vec::new(),
                blocks: block_aggregates,
                hourly: Vec::new(),
                prices,
                report,
            });
        };

        let daily = self.build_daily(
            start,
            end,
            &blocks,
            &block_aggregates,
            &block_transactions,
            spent_by_day,
        );
        let hourly = build_hourly(start, end, &block_aggregates);

        if report.excluded_total() > 0 || report.unmatched_spends > 0 {
            warn!(
                "LedgerAggregator: excluded {} records {:?}, {} unmatched spends, {} superseded blocks",
                report.excluded_total(),
                report.excluded,
                report.unmatched_spends,
                report.superseded_blocks
            );
        }
        info!(
            "LedgerAggregator: {} days, {} blocks, {} hours from {} to {}",
            daily.len(),
            block_aggregates.len(),
            hourly.len(),
            start,
            end
        );

        Ok(LedgerAggregates {
            daily,
            blocks: block_aggregates,
            hourly,
            prices,
            report,
        })
    }

    fn day_range(&self, blocks: &[&BlockRecord]) -> Option<(NaiveDate, NaiveDate)> {
        let first = blocks.iter().map(|b| b.day()).min()?;
        let last = blocks.iter().map(|b| b.day()).max()?;
        let start = self.start_day.unwrap_or(first);
        let end = self.end_day.unwrap_or(last);
        (start <= end).then_some((start, end))
    }

    fn build_daily(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        blocks: &[&BlockRecord],
        block_aggregates: &[BlockAggregate],
        block_transactions: &HashMap<&str, Vec<&TransactionRecord>>,
        mut spent_by_day: BTreeMap<NaiveDate, (i64, Vec<SpendAge>)>,
    ) -> Vec<DailyAggregate> {
        let days = (end - start).num_days() as usize + 1;
        let mut daily: Vec<DailyAggregate> = (0..days)
            .map(|i| DailyAggregate::empty(start + TimeDelta::days(i as i64)))
            .collect();
        let index_of = |day: NaiveDate| -> Option<usize> {
            let offset = (day - start).num_days();
            (offset >= 0 && (offset as usize) < days).then_some(offset as usize)
        };

        let mut vsize_window = RollingWindow::new(self.block_window);
        let mut fee_window: VecDeque<Vec<f64>> = VecDeque::with_capacity(self.fee_blocks);
        let mut snapshots: Vec<Option<TrailingState>> = vec![None; days];
        let mut before_arena = TrailingState::default();

        for (block, agg) in blocks.iter().zip(block_aggregates) {
            vsize_window.push(agg.virtual_size);
            if fee_window.len() >= self.fee_blocks {
                fee_window.pop_front();
            }
            let rates: Vec<f64> = block_transactions
                .get(block.hash.as_str())
                .map(|txs| txs.iter().filter_map(|tx| tx.fee_rate()).collect())
                .unwrap_or_default();
            fee_window.push_back(rates);

            let pooled: Vec<f64> = fee_window.iter().flatten().copied().collect();
            let state = TrailingState {
                last_height: Some(block.height),
                block_vsize: vsize_window.mean(),
                confirmed_median_fee: median(&pooled),
            };

            let day = block.day();
            match index_of(day) {
                Some(i) => {
                    let d = &mut daily[i];
                    d.block_count += 1;
                    d.transaction_count += u64::from(block.transaction_count.saturating_sub(1));
                    d.total_fees += agg.total_fees;
                    d.total_subsidy += agg.subsidy;
                    d.total_weight += block.weight;
                    if agg.is_empty {
                        d.empty_blocks += 1;
                    }
                    snapshots[i] = Some(state);
                }
                None if day < start => before_arena = state,
                None => {}
            }
        }

        let mut carried = before_arena;
        for (i, d) in daily.iter_mut().enumerate() {
            if let Some(state) = snapshots[i] {
                carried = state;
            }
            d.last_height = carried.last_height;
            d.trailing_block_vsize = carried.block_vsize;
            d.trailing_confirmed_median_fee = carried.confirmed_median_fee;

            if let Some((value, ages)) = spent_by_day.remove(&d.day) {
                d.total_spent_value = value;
                d.spend_ages = ages;
            }
        }
        daily
    }
}

/// Canonical chain: the last record seen for each height wins.
fn canonical_blocks<'a>(
    blocks: &'a [BlockRecord],
    report: &mut AggregationReport,
) -> Vec<&'a BlockRecord> {
    let mut by_height: BTreeMap<u64, &BlockRecord> = BTreeMap::new();
    for block in blocks {
        if let Some(previous) = by_height.insert(block.height, block) {
            debug!(
                "LedgerAggregator: block {} at height {} superseded by {}",
                previous.hash, block.height, block.hash
            );
            report.superseded_blocks += 1;
        }
    }
    by_height.into_values().collect()
}

fn build_block_aggregates(
    blocks: &[&BlockRecord],
    block_transactions: &HashMap<&str, Vec<&TransactionRecord>>,
) -> Vec<BlockAggregate> {
    let mut previous: Option<&BlockRecord> = None;
    blocks
        .iter()
        .map(|block| {
            let txs = block_transactions.get(block.hash.as_str());
            let rates: Vec<f64> = txs
                .map(|txs| txs.iter().filter_map(|tx| tx.fee_rate()).collect())
                .unwrap_or_default();
            let total_fees: i64 = txs
                .map(|txs| txs.iter().filter(|tx| !tx.is_coinbase).map(|tx| tx.fee).sum())
                .unwrap_or(0);
            let interval_secs = previous
                .filter(|p| p.height + 1 == block.height)
                .map(|p| (block.timestamp - p.timestamp).num_seconds());
            previous = Some(*block);

            BlockAggregate {
                height: block.height,
                hash: block.hash.clone(),
                timestamp: block.timestamp,
                weight: block.weight,
                virtual_size: block.virtual_size(),
                fullness: block.fullness(),
                transaction_count: block.transaction_count,
                total_fees,
                subsidy: subsidy(block.height),
                median_fee_rate: median(&rates),
                clearing_fee_rate: percentile(&rates, CLEARING_PERCENTILE),
                interval_secs,
                is_empty: block.transaction_count <= 1,
            }
        })
        .collect()
}

fn build_hourly(
    start: NaiveDate,
    end: NaiveDate,
    block_aggregates: &[BlockAggregate],
) -> Vec<HourlyAggregate> {
    let in_range: Vec<&BlockAggregate> = block_aggregates
        .iter()
        .filter(|b| {
            let day = b.timestamp.date_naive();
            day >= start && day <= end
        })
        .collect();
    let Some(first) = in_range.iter().map(|b| hour_floor(b.timestamp)).min() else {
        return Vec::new();
    };
    let Some(last) = in_range.iter().map(|b| hour_floor(b.timestamp)).max() else {
        return Vec::new();
    };

    let hours = (last - first).num_hours() as usize + 1;
    let mut hourly: Vec<HourlyAggregate> = (0..hours)
        .map(|i| HourlyAggregate::empty(first + TimeDelta::hours(i as i64)))
        .collect();
    let mut fullness_sums = vec![0.0; hours];
    let mut overpay: Vec<(f64, usize)> = vec![(0.0, 0); hours];

    for block in in_range {
        let i = (hour_floor(block.timestamp) - first).num_hours() as usize;
        let h = &mut hourly[i];
        h.block_count += 1;
        h.transaction_count += u64::from(block.transaction_count.saturating_sub(1));
        h.total_fees += block.total_fees;
        h.total_vsize += block.weight / 4;
        if block.is_empty {
            h.empty_blocks += 1;
        }
        if let Some(gap) = block.interval_secs {
            h.max_interval_secs = Some(h.max_interval_secs.map_or(gap, |m| m.max(gap)));
        }
        fullness_sums[i] += block.fullness;
        if let Some(ratio) = block.overpay_ratio() {
            overpay[i].0 += ratio;
            overpay[i].1 += 1;
        }
    }

    for (i, h) in hourly.iter_mut().enumerate() {
        if h.block_count > 0 {
            h.mean_fullness = Some(fullness_sums[i] / h.block_count as f64);
        }
        if overpay[i].1 > 0 {
            h.mean_overpay_ratio = Some(overpay[i].0 / overpay[i].1 as f64);
        }
    }
    hourly
}

/// One close per day, ascending; later duplicates and non-positive closes
/// are excluded.
fn validated_prices(
    prices: &[PriceObservation],
    report: &mut AggregationReport,
) -> Vec<PriceObservation> {
    let mut by_day: BTreeMap<NaiveDate, PriceObservation> = BTreeMap::new();
    for price in prices {
        if let Err(e) = LedgerRecordValidator::validate_price(price) {
            report.record_exclusion(e.kind);
            continue;
        }
        if by_day.contains_key(&price.day) {
            warn!("LedgerAggregator: duplicate price for {}", price.day);
            report.record_exclusion(MalformedKind::DuplicatePrice);
            continue;
        }
        by_day.insert(price.day, price.clone());
    }
    by_day.into_values().collect()
}

pub(crate) fn hour_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_minute(0))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::records::SpendEvent;
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    fn block(height: u64, hash: &str, at: DateTime<Utc>, tx_count: u32) -> BlockRecord {
        BlockRecord {
            height,
            timestamp: at,
            weight: 2_000_000,
            transaction_count: tx_count,
            hash: hash.to_string(),
        }
    }

    fn tx(hash: &str, block_hash: &str, fee: i64, vsize: u64, at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            block_hash: block_hash.to_string(),
            fee,
            size: vsize,
            virtual_size: vsize,
            is_coinbase: false,
            timestamp: at,
        }
    }

    fn aggregator(ceiling: f64) -> LedgerAggregator {
        LedgerAggregator::new(
            AggregationConfig {
                max_malformed_fraction: ceiling,
            },
            144,
            6,
        )
    }

    #[test]
    fn test_reorg_last_block_wins_and_orphans_transactions() {
        let records = LedgerRecords {
            blocks: vec![
                block(1, "a", ts(1, 0, 0), 2),
                block(2, "stale", ts(1, 0, 10), 2),
                block(2, "b", ts(1, 0, 12), 2),
            ],
            transactions: vec![
                tx("t1", "a", 1_000, 100, ts(1, 0, 0)),
                tx("t2", "stale", 2_000, 100, ts(1, 0, 10)),
                tx("t3", "b", 3_000, 100, ts(1, 0, 12)),
            ],
            ..Default::default()
        };
        let aggregates = aggregator(1.0).aggregate(&records, &[]).unwrap();

        assert_eq!(aggregates.report.superseded_blocks, 1);
        assert_eq!(aggregates.report.excluded.get(&MalformedKind::Orphaned), Some(&1));
        assert_eq!(aggregates.blocks.len(), 2);
        assert_eq!(aggregates.blocks[1].hash, "b");
        assert_eq!(aggregates.daily[0].total_fees, 4_000);
        assert_eq!(aggregates.blocks[1].interval_secs, Some(720));
    }

    #[test]
    fn test_spend_ages_and_unmatched_spends() {
        let records = LedgerRecords {
            blocks: vec![block(1, "a", ts(1, 0, 0), 1), block(2, "b", ts(3, 0, 0), 1)],
            creations: vec![CreationEvent {
                transaction_hash: "fund".to_string(),
                output_index: 0,
                value: 700,
                block_timestamp: ts(1, 0, 0),
            }],
            spends: vec![
                SpendEvent {
                    transaction_hash: "s1".to_string(),
                    spent_transaction_hash: "fund".to_string(),
                    spent_output_index: 0,
                    value: 700,
                    block_timestamp: ts(3, 0, 0),
                },
                SpendEvent {
                    transaction_hash: "s2".to_string(),
                    spent_transaction_hash: "ancient".to_string(),
                    spent_output_index: 4,
                    value: 300,
                    block_timestamp: ts(3, 0, 0),
                },
            ],
            ..Default::default()
        };
        let aggregates = aggregator(0.01).aggregate(&records, &[]).unwrap();

        let day3 = &aggregates.daily[2];
        assert_eq!(day3.total_spent_value, 1_000);
        assert_eq!(day3.spend_ages.len(), 1);
        assert_eq!(day3.spend_ages[0].age_days, 2);
        assert_eq!(aggregates.report.unmatched_spends, 1);
        // Day 2 had no blocks but carries the trailing state forward
        assert_eq!(aggregates.daily[1].block_count, 0);
        assert_eq!(aggregates.daily[1].last_height, Some(1));
    }

    #[test]
    fn test_repeat_spend_of_outpoint_is_excluded() {
        let spend = |tx: &str, spent_tx: &str, value: i64| SpendEvent {
            transaction_hash: tx.to_string(),
            spent_transaction_hash: spent_tx.to_string(),
            spent_output_index: 0,
            value,
            block_timestamp: ts(3, 0, 0),
        };
        let records = LedgerRecords {
            blocks: vec![block(1, "a", ts(1, 0, 0), 1), block(2, "b", ts(3, 0, 0), 1)],
            creations: vec![CreationEvent {
                transaction_hash: "fund".to_string(),
                output_index: 0,
                value: 700,
                block_timestamp: ts(1, 0, 0),
            }],
            spends: vec![
                spend("s1", "fund", 700),
                spend("s2", "fund", 700),
                spend("s3", "ancient", 300),
                spend("s4", "ancient", 300),
            ],
            ..Default::default()
        };
        let aggregates = aggregator(1.0).aggregate(&records, &[]).unwrap();

        let day3 = &aggregates.daily[2];
        assert_eq!(day3.total_spent_value, 1_000);
        assert_eq!(day3.spend_ages.len(), 1);
        assert_eq!(aggregates.report.unmatched_spends, 1);
        assert_eq!(
            aggregates.report.excluded.get(&MalformedKind::DoubleSpend),
            Some(&2)
        );
    }

    #[test]
    fn test_repeat_spends_count_toward_integrity_ceiling() {
        let records = LedgerRecords {
            blocks: vec![block(1, "a", ts(1, 0, 0), 1)],
            spends: (0..3)
                .map(|i| SpendEvent {
                    transaction_hash: format!("s{i}"),
                    spent_transaction_hash: "ancient".to_string(),
                    spent_output_index: 0,
                    value: 10,
                    block_timestamp: ts(1, 0, 0),
                })
                .collect(),
            ..Default::default()
        };
        let result = aggregator(0.25).aggregate(&records, &[]);
        assert!(matches!(
            result,
            Err(PipelineError::DataIntegrityExceeded { excluded: 2, total: 4, .. })
        ));
    }

    #[test]
    fn test_integrity_ceiling_aborts() {
        let records = LedgerRecords {
            blocks: vec![block(1, "a", ts(1, 0, 0), 2)],
            transactions: vec![tx("bad", "a", -5, 100, ts(1, 0, 0))],
            ..Default::default()
        };
        let result = aggregator(0.1).aggregate(&records, &[]);
        assert!(matches!(
            result,
            Err(PipelineError::DataIntegrityExceeded { excluded: 1, total: 2, .. })
        ));
    }

    #[test]
    fn test_block_fee_percentiles_and_hourly_buckets() {
        let at = ts(1, 5, 30);
        let records = LedgerRecords {
            blocks: vec![block(1, "a", ts(1, 5, 0), 6), block(2, "b", at, 1)],
            transactions: (1..=5)
                .map(|i| tx(&format!("t{i}"), "a", 100 * i, 10, ts(1, 5, 0)))
                .collect(),
            ..Default::default()
        };
        let aggregates = aggregator(0.01).aggregate(&records, &[]).unwrap();

        let first = &aggregates.blocks[0];
        assert_eq!(first.median_fee_rate, Some(30.0));
        assert!((first.clearing_fee_rate.unwrap() - 14.0).abs() < 1e-9);
        assert!(aggregates.blocks[1].is_empty);

        assert_eq!(aggregates.hourly.len(), 1);
        let hour = &aggregates.hourly[0];
        assert_eq!(hour.block_count, 2);
        assert_eq!(hour.transaction_count, 5);
        assert_eq!(hour.empty_blocks, 1);
        assert_eq!(hour.max_interval_secs, Some(1800));
    }

    #[test]
    fn test_duplicate_prices_excluded() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let prices = vec![
            PriceObservation {
                day,
                closing_price: 42_000.0,
            },
            PriceObservation {
                day,
                closing_price: 43_000.0,
            },
        ];
        let records = LedgerRecords {
            blocks: vec![block(1, "a", ts(1, 0, 0), 1)],
            ..Default::default()
        };
        let aggregates = aggregator(1.0).aggregate(&records, &prices).unwrap();
        assert_eq!(aggregates.prices.len(), 1);
        assert_eq!(aggregates.prices[0].closing_price, 42_000.0);
        assert_eq!(
            aggregates.report.excluded.get(&MalformedKind::DuplicatePrice),
            Some(&1)
        );
    }
}
