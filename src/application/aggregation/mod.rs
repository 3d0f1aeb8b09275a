pub mod ledger_aggregator;

pub use ledger_aggregator::LedgerAggregator;
