// Raw ledger records and their aggregates
pub mod ledger;

// Daily factor records
pub mod factors;

// Preprocessed, frozen factor panel
pub mod panel;

// Walk-forward windows, models and predictions
pub mod prediction;

// Instrumented fee elasticity types
pub mod elasticity;

// Hour x weekday fee seasonality types
pub mod seasonality;

// Least squares, rolling windows, tail probabilities
pub mod stats;

// Port interfaces
pub mod ports;

// Structural record checks
pub mod validation;

// Domain-specific error types
pub mod errors;
