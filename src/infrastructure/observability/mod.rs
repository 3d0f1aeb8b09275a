//! Log output for library consumers and tests. Stages only emit through
//! the `tracing` facade; installing a subscriber is the caller's choice.

pub mod logging;

pub use logging::init_logging;
