pub mod csv_replay;
pub mod in_memory;

pub use csv_replay::CsvReplaySource;
pub use in_memory::InMemoryLedgerSource;
