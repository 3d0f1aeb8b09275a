pub mod record_validator;

pub use record_validator::LedgerRecordValidator;
