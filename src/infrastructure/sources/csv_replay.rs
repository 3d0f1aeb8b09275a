//! Replays a recorded run from a directory of CSV exports.
//!
//! Expected files, headers matching the record field names:
//! `blocks.csv`, `transactions.csv`, `inputs.csv`, `outputs.csv`,
//! `prices.csv` and optionally `backlog.csv`.

use super::in_memory::InMemoryLedgerSource;
use crate::domain::ledger::records::{
    BacklogObservation, BlockRecord, CreationEvent, LedgerRecords, PriceObservation, SpendEvent,
    TransactionRecord,
};
use crate::domain::ports::{LedgerSource, RecordBatch};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::info;

pub const BLOCKS_FILE: &str = "blocks.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const INPUTS_FILE: &str = "inputs.csv";
pub const OUTPUTS_FILE: &str = "outputs.csv";
pub const PRICES_FILE: &str = "prices.csv";
pub const BACKLOG_FILE: &str = "backlog.csv";

pub struct CsvReplaySource {
    dir: PathBuf,
    batch_size: usize,
    // Loaded lazily on the first batch request
    inner: Option<InMemoryLedgerSource>,
}

impl CsvReplaySource {
    pub fn new(dir: impl Into<PathBuf>, batch_size: usize) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            bail!("Replay directory {} does not exist", dir.display());
        }
        Ok(Self {
            dir,
            batch_size,
            inner: None,
        })
    }

    async fn load(&mut self) -> Result<&mut InMemoryLedgerSource> {
        if self.inner.is_none() {
            let records = LedgerRecords {
                blocks: read_csv::<BlockRecord>(&self.dir.join(BLOCKS_FILE)).await?,
                transactions: read_csv::<TransactionRecord>(&self.dir.join(TRANSACTIONS_FILE))
                    .await?,
                spends: read_csv::<SpendEvent>(&self.dir.join(INPUTS_FILE)).await?,
                creations: read_csv::<CreationEvent>(&self.dir.join(OUTPUTS_FILE)).await?,
            };
            let prices = read_csv::<PriceObservation>(&self.dir.join(PRICES_FILE)).await?;

            let backlog_path = self.dir.join(BACKLOG_FILE);
            let backlog = if backlog_path.exists() {
                read_csv::<BacklogObservation>(&backlog_path).await?
            } else {
                Vec::new()
            };

            info!(
                "CsvReplaySource: loaded {} records, {} prices, {} backlog rows from {}",
                records.len(),
                prices.len(),
                backlog.len(),
                self.dir.display()
            );
            self.inner = Some(
                InMemoryLedgerSource::new(records, prices, self.batch_size).with_backlog(backlog),
            );
        }
        self.inner
            .as_mut()
            .context("Replay source failed to initialize")
    }
}

async fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut reader = csv::Reader::from_reader(raw.as_bytes());
    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("{}: bad row {}", path.display(), i + 1)))
        .collect()
}

#[async_trait]
impl LedgerSource for CsvReplaySource {
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        self.load().await?.next_batch().await
    }

    async fn prices(&mut self) -> Result<Vec<PriceObservation>> {
        self.load().await?.prices().await
    }

    async fn backlog(&mut self) -> Result<Vec<BacklogObservation>> {
        self.load().await?.backlog().await
    }
}
