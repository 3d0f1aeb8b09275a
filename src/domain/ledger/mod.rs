pub mod aggregates;
pub mod records;

pub use aggregates::{
    AggregationReport, BlockAggregate, DailyAggregate, HourlyAggregate, LedgerAggregates,
    SpendAge, subsidy, supply_at_height,
};
pub use records::{
    BacklogObservation, BlockRecord, CreationEvent, LedgerRecords, OutPoint, PriceObservation,
    SpendEvent, TransactionRecord, ValueEvent,
};
