//! Input record schemas as supplied by the ledger-acquisition collaborator.
//!
//! Values and fees are denominated in base units (satoshis) and kept signed
//! so that corrupt upstream rows can be detected instead of failing to parse.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Base units per coin.
pub const BASE_UNITS_PER_COIN: f64 = 100_000_000.0;

/// Block weight limit used to express fullness.
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub height: u64,
    pub timestamp: DateTime<Utc>,
    pub weight: u64,
    pub transaction_count: u32,
    pub hash: String,
}

impl BlockRecord {
    /// Virtual size in vbytes.
    pub fn virtual_size(&self) -> f64 {
        self.weight as f64 / 4.0
    }

    pub fn fullness(&self) -> f64 {
        self.weight as f64 / MAX_BLOCK_WEIGHT as f64
    }

    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub block_hash: String,
    pub fee: i64,
    pub size: u64,
    pub virtual_size: u64,
    pub is_coinbase: bool,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    /// Fee rate in base units per vbyte. `None` for coinbase or empty transactions.
    pub fn fee_rate(&self) -> Option<f64> {
        if self.is_coinbase || self.virtual_size == 0 {
            return None;
        }
        Some(self.fee as f64 / self.virtual_size as f64)
    }
}

/// Input side: a previously created output being consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendEvent {
    pub transaction_hash: String,
    pub spent_transaction_hash: String,
    pub spent_output_index: u32,
    pub value: i64,
    pub block_timestamp: DateTime<Utc>,
}

/// Output side: a new unit of value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationEvent {
    pub transaction_hash: String,
    pub output_index: u32,
    pub value: i64,
    pub block_timestamp: DateTime<Utc>,
}

impl CreationEvent {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            transaction_hash: self.transaction_hash.clone(),
            index: self.output_index,
        }
    }

    /// Joins this output with the input that consumed it.
    pub fn spent_by(&self, spend: &SpendEvent) -> ValueEvent {
        ValueEvent {
            transaction_hash: self.transaction_hash.clone(),
            index: self.output_index,
            value: self.value,
            created_at: self.block_timestamp,
            spent_at: Some(spend.block_timestamp),
            spending_transaction_hash: Some(spend.transaction_hash.clone()),
        }
    }
}

/// Key of the creation index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub transaction_hash: String,
    pub index: u32,
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.transaction_hash, self.index)
    }
}

/// A created value unit joined with its spend, once spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEvent {
    pub transaction_hash: String,
    pub index: u32,
    pub value: i64,
    pub created_at: DateTime<Utc>,
    pub spent_at: Option<DateTime<Utc>>,
    pub spending_transaction_hash: Option<String>,
}

impl ValueEvent {
    /// Holding age in whole calendar days (day truncation on both ends).
    pub fn age_days(&self) -> Option<i64> {
        self.spent_at
            .map(|spent| (spent.date_naive() - self.created_at.date_naive()).num_days())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub day: NaiveDate,
    pub closing_price: f64,
}

/// Pending-transaction backlog snapshot, supplied externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogObservation {
    pub timestamp: DateTime<Utc>,
    pub pending_vsize: u64,
    pub pending_median_fee_rate: f64,
}

/// Everything one pipeline run consumes.
#[derive(Debug, Clone, Default)]
pub struct LedgerRecords {
    pub blocks: Vec<BlockRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub spends: Vec<SpendEvent>,
    pub creations: Vec<CreationEvent>,
}

impl LedgerRecords {
    pub fn extend(&mut self, other: LedgerRecords) {
        self.blocks.extend(other.blocks);
        self.transactions.extend(other.transactions);
        self.spends.extend(other.spends);
        self.creations.extend(other.creations);
    }

    pub fn len(&self) -> usize {
        self.blocks.len() + self.transactions.len() + self.spends.len() + self.creations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
