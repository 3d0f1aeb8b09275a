use crate::domain::ledger::records::{BacklogObservation, LedgerRecords, PriceObservation};
use anyhow::Result;
use async_trait::async_trait;

/// One chunk of ledger records delivered by a source.
pub type RecordBatch = LedgerRecords;

/// Supplier of recorded ledger data.
///
/// Batches arrive in chronological order. The pipeline only awaits between
/// batches; nothing is computed until the stream is exhausted.
#[async_trait]
pub trait LedgerSource: Send {
    /// Next batch, or `None` once the stream is exhausted.
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>>;

    async fn prices(&mut self) -> Result<Vec<PriceObservation>>;

    /// Pending-backlog observations; empty when the source has none.
    async fn backlog(&mut self) -> Result<Vec<BacklogObservation>>;
}
