#![allow(dead_code)]

use chainpanel::application::PipelineInputs;
use chainpanel::domain::ledger::records::{
    BacklogObservation, BlockRecord, CreationEvent, LedgerRecords, PriceObservation, SpendEvent,
    TransactionRecord,
};
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Value moved per day by the planted ledger, in base units.
pub const DAY_VALUE: i64 = 1_000_000_000;
pub const BLOCKS_PER_DAY: i64 = 24;
/// HODL threshold the planted ledger is designed around.
pub const HODL_THRESHOLD_DAYS: i64 = 2;

/// A Monday.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap()
}

pub fn day(offset: usize) -> NaiveDate {
    epoch().date_naive() + TimeDelta::days(offset as i64)
}

pub fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-12);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Appends blocks, transactions and value events with consistent hashes.
pub struct ChainBuilder {
    pub records: LedgerRecords,
    next_height: u64,
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            records: LedgerRecords::default(),
            next_height: 1,
        }
    }

    /// A block with a coinbase plus `txs` as (hash, fee, vsize). The block's
    /// transaction count is at least the number of transactions recorded.
    pub fn block(
        &mut self,
        at: DateTime<Utc>,
        weight: u64,
        transaction_count: u32,
        txs: &[(String, i64, u64)],
    ) -> String {
        let height = self.next_height;
        self.next_height += 1;
        let hash = format!("block{height}");

        self.records.transactions.push(TransactionRecord {
            hash: format!("coinbase{height}"),
            block_hash: hash.clone(),
            fee: 0,
            size: 150,
            virtual_size: 150,
            is_coinbase: true,
            timestamp: at,
        });
        for (tx_hash, fee, vsize) in txs {
            self.records.transactions.push(TransactionRecord {
                hash: tx_hash.clone(),
                block_hash: hash.clone(),
                fee: *fee,
                size: *vsize,
                virtual_size: *vsize,
                is_coinbase: false,
                timestamp: at,
            });
        }
        self.records.blocks.push(BlockRecord {
            height,
            timestamp: at,
            weight,
            transaction_count: transaction_count.max(1 + txs.len() as u32),
            hash: hash.clone(),
        });
        hash
    }

    pub fn creation(&mut self, tx: &str, index: u32, value: i64, at: DateTime<Utc>) {
        self.records.creations.push(CreationEvent {
            transaction_hash: tx.to_string(),
            output_index: index,
            value,
            block_timestamp: at,
        });
    }

    pub fn spend(&mut self, tx: &str, spent_tx: &str, spent_index: u32, value: i64, at: DateTime<Utc>) {
        self.records.spends.push(SpendEvent {
            transaction_hash: tx.to_string(),
            spent_transaction_hash: spent_tx.to_string(),
            spent_output_index: spent_index,
            value,
            block_timestamp: at,
        });
    }
}

pub struct SyntheticLedger {
    pub records: LedgerRecords,
    pub prices: Vec<PriceObservation>,
    pub backlog: Vec<BacklogObservation>,
    /// Designed HODL share per day at `HODL_THRESHOLD_DAYS`.
    pub hodl: Vec<Option<f64>>,
}

impl SyntheticLedger {
    pub fn inputs(&self) -> PipelineInputs {
        PipelineInputs {
            records: self.records.clone(),
            prices: self.prices.clone(),
            backlog: self.backlog.clone(),
        }
    }
}

/// `days` of hourly blocks where each day's spent value splits between one
/// old coin (created on day 0) and one coin created the previous day. The
/// next-day log return is `beta × HODL + noise`.
pub fn planted_hodl_ledger(days: usize, seed: u64, beta: f64, noise: f64) -> SyntheticLedger {
    let mut rng = StdRng::seed_from_u64(seed);
    let shares: Vec<f64> = (0..days).map(|_| rng.random_range(0.1..0.9)).collect();
    let old_value = |d: usize| (shares[d] * DAY_VALUE as f64).round() as i64;

    let mut chain = ChainBuilder::new();
    let mut hodl = vec![None; days];
    let mut backlog = Vec::with_capacity(days);

    for d in 0..days {
        let midnight = epoch() + TimeDelta::days(d as i64);
        for h in 0..BLOCKS_PER_DAY {
            let at = midnight + TimeDelta::hours(h) + TimeDelta::minutes(rng.random_range(1..59));
            let fullness: f64 = rng.random_range(0.4..1.0);
            let rate = (2.0 + 0.5 * fullness + 0.1 * standard_normal(&mut rng)).exp();
            let mut txs = vec![(format!("fee{d}_{h}"), (rate * 250.0).round() as i64, 250)];

            if h == 0 {
                txs.push((format!("move{d}"), 2_000, 400));
                if d == 0 {
                    txs.push(("genesis".to_string(), 5_000, 1_000));
                }
            }
            chain.block(at, (fullness * 4_000_000.0) as u64, 0, &txs);

            if h == 0 {
                let mover = format!("move{d}");
                if d == 0 {
                    for i in 1..days {
                        chain.creation("genesis", i as u32, old_value(i), at);
                    }
                } else {
                    let previous = format!("move{}", d - 1);
                    chain.spend(&mover, "genesis", d as u32, old_value(d), at);
                    chain.spend(&mover, &previous, 0, DAY_VALUE - old_value(d), at);
                    hodl[d] = Some(if d as i64 >= HODL_THRESHOLD_DAYS {
                        old_value(d) as f64 / DAY_VALUE as f64
                    } else {
                        0.0
                    });
                }
                if d + 1 < days {
                    chain.creation(&mover, 0, DAY_VALUE - old_value(d + 1), at);
                }
            }
        }
        backlog.push(BacklogObservation {
            timestamp: midnight + TimeDelta::hours(23) + TimeDelta::minutes(59),
            pending_vsize: rng.random_range(2_000_000..20_000_000),
            pending_median_fee_rate: rng.random_range(5.0..30.0),
        });
    }

    let mut prices = Vec::with_capacity(days);
    let mut price: f64 = 20_000.0;
    for d in 0..days {
        if d > 0 {
            let signal = hodl[d - 1].map(|x| beta * x).unwrap_or(0.0);
            price *= (signal + noise * standard_normal(&mut rng)).exp();
        }
        prices.push(PriceObservation {
            day: day(d),
            closing_price: price,
        });
    }

    SyntheticLedger {
        records: chain.records,
        prices,
        backlog,
        hodl,
    }
}

/// Hourly blocks whose throughput responds to the fee level with elasticity
/// `elasticity`, while the fee level is shifted by block arrival luck.
/// Demand shocks are correlated with fee shocks, so plain OLS is biased.
pub fn planted_elasticity_ledger(hours: usize, seed: u64, elasticity: f64) -> LedgerRecords {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chain = ChainBuilder::new();
    let vsize: u64 = 1_000_000;

    for i in 0..hours {
        let hour_start = epoch() + TimeDelta::hours(i as i64);
        let blocks: i64 = rng.random_range(3..=9);
        let v = 0.3 * standard_normal(&mut rng);
        let u = 0.6 * v + 0.2 * standard_normal(&mut rng);
        let log_fee = 2.0 - 0.25 * (blocks - 6) as f64 + v;
        let log_tx = 8.0 + elasticity * log_fee + u;

        let total_tx = log_tx.exp().round() as i64;
        let per_block = total_tx / blocks;
        let fee = (log_fee.exp() * vsize as f64).round() as i64;

        for j in 0..blocks {
            let at = hour_start + TimeDelta::seconds(30 + j * 3600 / blocks);
            let count = per_block + if j == 0 { total_tx - per_block * blocks } else { 0 };
            let txs = [(format!("fee{i}_{j}"), fee, vsize)];
            chain.block(at, vsize * 4, (count + 1) as u32, &txs);
        }
    }
    chain.records
}
