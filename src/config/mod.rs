//! Configuration for a pipeline run.
//!
//! A run is a pure function of its inputs and a `PipelineConfig`. The config
//! loads from TOML (every section optional, defaulted) and can be adjusted
//! through `CHAINPANEL_*` environment variables.

mod stage_config;

pub use stage_config::{
    AggregationConfig, ElasticityConfig, FactorConfig, PreprocessConfig, SeasonalityConfig,
    WalkForwardConfig, WeekdayConfig,
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Environment variable naming a TOML file to load before overrides apply.
pub const CONFIG_PATH_VAR: &str = "CHAINPANEL_CONFIG";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid winsorization bounds: lower {lower}, upper {upper}")]
    WinsorBounds { lower: f64, upper: f64 },

    #[error("Invalid fraction for {field}: {value}")]
    Fraction { field: &'static str, value: f64 },

    #[error("{field} must be > 0")]
    NonPositive { field: &'static str },

    #[error("{field} must be >= 0")]
    Negative { field: &'static str },

    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: usize },

    #[error("Horizon set must be non-empty with every horizon >= 1")]
    Horizons,

    #[error("Walk-forward needs at least one factor")]
    NoFactors,

    #[error("Invalid day range: start {start} after end {end}")]
    DayRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub start_day: Option<NaiveDate>,
    pub end_day: Option<NaiveDate>,
    pub aggregation: AggregationConfig,
    pub factors: FactorConfig,
    pub preprocess: PreprocessConfig,
    pub walk_forward: WalkForwardConfig,
    pub elasticity: ElasticityConfig,
    pub seasonality: SeasonalityConfig,
    pub weekday: WeekdayConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(raw).context("Failed to parse pipeline config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Defaults, or the file named by `CHAINPANEL_CONFIG`, with
    /// `CHAINPANEL_*` overrides applied on top.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (an environment-like key → value map).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = &lookup;
        override_value(
            lookup,
            "CHAINPANEL_MAX_MALFORMED_FRACTION",
            &mut self.aggregation.max_malformed_fraction,
        )?;
        override_value(
            lookup,
            "CHAINPANEL_HODL_AGE_THRESHOLD_DAYS",
            &mut self.factors.hodl_age_threshold_days,
        )?;
        override_value(
            lookup,
            "CHAINPANEL_PRICE_FILL_TOLERANCE_DAYS",
            &mut self.factors.price_fill_tolerance_days,
        )?;
        override_value(
            lookup,
            "CHAINPANEL_NVT_WINDOW_DAYS",
            &mut self.factors.nvt_window_days,
        )?;
        override_value(lookup, "CHAINPANEL_WINSOR_LOWER", &mut self.preprocess.winsor_lower)?;
        override_value(lookup, "CHAINPANEL_WINSOR_UPPER", &mut self.preprocess.winsor_upper)?;
        override_value(
            lookup,
            "CHAINPANEL_ZSCORE_MIN_OBSERVATIONS",
            &mut self.preprocess.zscore_min_observations,
        )?;
        override_value(lookup, "CHAINPANEL_MAX_FILL_GAP", &mut self.preprocess.max_fill_gap)?;
        override_value(
            lookup,
            "CHAINPANEL_INITIAL_WINDOW_DAYS",
            &mut self.walk_forward.initial_window_days,
        )?;
        override_value(lookup, "CHAINPANEL_PARALLEL", &mut self.walk_forward.parallel)?;
        override_value(
            lookup,
            "CHAINPANEL_WEAK_INSTRUMENT_F",
            &mut self.elasticity.weak_instrument_f,
        )?;
        override_value(
            lookup,
            "CHAINPANEL_MIN_CELL_SAMPLES",
            &mut self.seasonality.min_cell_samples,
        )?;

        if let Some(raw) = lookup("CHAINPANEL_HORIZONS") {
            self.walk_forward.horizons = raw
                .split(',')
                .map(|h| h.trim().parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to parse CHAINPANEL_HORIZONS")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.preprocess;
        if !(0.0..=1.0).contains(&p.winsor_lower)
            || !(0.0..=1.0).contains(&p.winsor_upper)
            || p.winsor_lower >= p.winsor_upper
        {
            return Err(ConfigError::WinsorBounds {
                lower: p.winsor_lower,
                upper: p.winsor_upper,
            });
        }
        let fraction = self.aggregation.max_malformed_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ConfigError::Fraction {
                field: "max_malformed_fraction",
                value: fraction,
            });
        }
        if p.zscore_min_observations < 2 {
            return Err(ConfigError::TooSmall {
                field: "zscore_min_observations",
                min: 2,
            });
        }

        let f = &self.factors;
        if f.hodl_age_threshold_days <= 0 {
            return Err(ConfigError::NonPositive {
                field: "hodl_age_threshold_days",
            });
        }
        if f.nvt_window_days == 0 {
            return Err(ConfigError::NonPositive {
                field: "nvt_window_days",
            });
        }
        if f.mpr_block_window == 0 || f.mpr_fee_blocks == 0 {
            return Err(ConfigError::NonPositive {
                field: "mpr_block_window / mpr_fee_blocks",
            });
        }
        if f.sopr_min_age_days < 0 || f.price_fill_tolerance_days < 0 {
            return Err(ConfigError::Negative {
                field: "sopr_min_age_days / price_fill_tolerance_days",
            });
        }

        let w = &self.walk_forward;
        if w.initial_window_days == 0 {
            return Err(ConfigError::NonPositive {
                field: "initial_window_days",
            });
        }
        if w.horizons.is_empty() || w.horizons.contains(&0) {
            return Err(ConfigError::Horizons);
        }
        if w.factors.is_empty() {
            return Err(ConfigError::NoFactors);
        }

        let e = &self.elasticity;
        if e.expected_block_interval_secs <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "expected_block_interval_secs",
            });
        }
        if e.disruption_gap_secs <= 0 {
            return Err(ConfigError::NonPositive {
                field: "disruption_gap_secs",
            });
        }
        if self.seasonality.volatility_window_hours < 2 {
            return Err(ConfigError::TooSmall {
                field: "volatility_window_hours",
                min: 2,
            });
        }

        if let (Some(start), Some(end)) = (self.start_day, self.end_day)
            && start > end
        {
            return Err(ConfigError::DayRange { start, end });
        }
        Ok(())
    }
}

fn override_value<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}", key))?;
    }
    Ok(())
}
