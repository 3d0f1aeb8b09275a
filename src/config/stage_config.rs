//! Per-stage configuration sections.
//!
//! Every threshold a stage relies on lives here with its default; no stage
//! carries a hidden constant of its own.

use crate::domain::elasticity::{IvSpecification, SubsampleFilter};
use crate::domain::factors::Factor;
use crate::domain::prediction::ControlCovariate;
use crate::domain::seasonality::SeasonalityControl;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Excluded / total records above which the run aborts.
    pub max_malformed_fraction: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_malformed_fraction: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorConfig {
    /// Minimum holding age (days) counted as long-term supply by HODL%.
    pub hodl_age_threshold_days: i64,
    /// Spends younger than this (days) are left out of SOPR-lite.
    pub sopr_min_age_days: i64,
    /// Largest gap (days) a price may be carried forward across.
    pub price_fill_tolerance_days: i64,
    pub nvt_window_days: usize,
    /// Trailing volume observations required before NVT is defined.
    pub nvt_min_observations: usize,
    /// Blocks in the trailing mean block size used by MPR.
    pub mpr_block_window: usize,
    /// Blocks whose transactions form the confirmed median fee used by MPR.
    pub mpr_fee_blocks: usize,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            hodl_age_threshold_days: 365,
            sopr_min_age_days: 1,
            price_fill_tolerance_days: 1,
            nvt_window_days: 90,
            nvt_min_observations: 30,
            mpr_block_window: 144,
            mpr_fee_blocks: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub winsor_lower: f64,
    pub winsor_upper: f64,
    /// Observations required before the expanding z-score is defined.
    pub zscore_min_observations: usize,
    /// Longest run of missing days bridged by forward fill.
    pub max_fill_gap: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            winsor_lower: 0.01,
            winsor_upper: 0.99,
            zscore_min_observations: 30,
            max_fill_gap: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub initial_window_days: usize,
    pub horizons: Vec<u32>,
    pub factors: Vec<Factor>,
    pub controls: Vec<ControlCovariate>,
    /// Fit windows on the rayon pool; results are identical either way.
    pub parallel: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            initial_window_days: 365,
            horizons: vec![1, 7],
            factors: vec![Factor::HodlPct, Factor::SoprLite, Factor::Nvt],
            controls: vec![ControlCovariate::LaggedReturn],
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticityConfig {
    pub expected_block_interval_secs: f64,
    /// Inter-block gap that marks an hour as hash-rate disrupted.
    pub disruption_gap_secs: i64,
    pub difficulty_shock_window_hours: i64,
    pub weak_instrument_f: f64,
    pub min_observations: usize,
    pub specifications: Vec<IvSpecification>,
    pub subsamples: Vec<SubsampleFilter>,
}

impl Default for ElasticityConfig {
    fn default() -> Self {
        Self {
            expected_block_interval_secs: 600.0,
            disruption_gap_secs: 3600,
            difficulty_shock_window_hours: 24,
            weak_instrument_f: 10.0,
            min_observations: 30,
            specifications: vec![IvSpecification::default()],
            subsamples: vec![SubsampleFilter::All],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalityConfig {
    pub controls: Vec<SeasonalityControl>,
    pub volatility_window_hours: usize,
    /// Cells with fewer samples are flagged low-confidence.
    pub min_cell_samples: usize,
}

impl Default for SeasonalityConfig {
    fn default() -> Self {
        Self {
            controls: vec![SeasonalityControl::Fullness, SeasonalityControl::RecentVolatility],
            volatility_window_hours: 24,
            min_cell_samples: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekdayConfig {
    pub min_group_size: usize,
    /// Newey-West truncation for the Monday-baseline regression.
    pub hac_lags: usize,
}

impl Default for WeekdayConfig {
    fn default() -> Self {
        Self {
            min_group_size: 10,
            hac_lags: 5,
        }
    }
}
