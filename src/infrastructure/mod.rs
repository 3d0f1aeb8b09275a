// Record sources (replay only; no network)
pub mod sources;

pub mod observability;

pub use sources::{CsvReplaySource, InMemoryLedgerSource};
