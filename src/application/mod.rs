// Ledger ingestion: canonical chain, value flows, day/block/hour series
pub mod aggregation;

// Daily on-chain factors
pub mod factors;

// Winsorize, standardize, fill
pub mod preprocessing;

// Rolling-origin return predictability
pub mod regression;

// Fee elasticity of demand (2SLS / GMM)
pub mod elasticity;

// Hour-of-day × weekday fee structure
pub mod seasonality;

pub mod analysis;

// Stage orchestrator
pub mod pipeline;

pub use pipeline::{CancellationToken, Pipeline, PipelineInputs, PipelineOutput};
