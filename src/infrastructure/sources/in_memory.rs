use crate::domain::ledger::records::{BacklogObservation, LedgerRecords, PriceObservation};
use crate::domain::ports::{LedgerSource, RecordBatch};
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// Serves pre-loaded records in fixed-size batches.
///
/// Batch `i` holds the `i`-th chunk of every record kind, so a batch is
/// not guaranteed to be self-contained (a spend may arrive before its
/// creation). The aggregator only runs once every batch is in.
pub struct InMemoryLedgerSource {
    records: LedgerRecords,
    prices: Vec<PriceObservation>,
    backlog: Vec<BacklogObservation>,
    batch_size: usize,
    cursor: usize,
}

impl InMemoryLedgerSource {
    pub fn new(records: LedgerRecords, prices: Vec<PriceObservation>, batch_size: usize) -> Self {
        Self {
            records,
            prices,
            backlog: Vec::new(),
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    pub fn with_backlog(mut self, backlog: Vec<BacklogObservation>) -> Self {
        self.backlog = backlog;
        self
    }

    fn longest(&self) -> usize {
        self.records
            .blocks
            .len()
            .max(self.records.transactions.len())
            .max(self.records.spends.len())
            .max(self.records.creations.len())
    }
}

fn chunk<T: Clone>(items: &[T], start: usize, size: usize) -> Vec<T> {
    if start >= items.len() {
        return Vec::new();
    }
    items[start..(start + size).min(items.len())].to_vec()
}

#[async_trait]
impl LedgerSource for InMemoryLedgerSource {
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.cursor >= self.longest() {
            return Ok(None);
        }
        let (start, size) = (self.cursor, self.batch_size);
        let batch = LedgerRecords {
            blocks: chunk(&self.records.blocks, start, size),
            transactions: chunk(&self.records.transactions, start, size),
            spends: chunk(&self.records.spends, start, size),
            creations: chunk(&self.records.creations, start, size),
        };
        self.cursor += size;
        debug!("InMemoryLedgerSource: served batch of {} records", batch.len());
        Ok(Some(batch))
    }

    async fn prices(&mut self) -> Result<Vec<PriceObservation>> {
        Ok(self.prices.clone())
    }

    async fn backlog(&mut self) -> Result<Vec<BacklogObservation>> {
        Ok(self.backlog.clone())
    }
}
