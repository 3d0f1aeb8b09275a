use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four daily on-chain factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    HodlPct,
    SoprLite,
    Nvt,
    Mpr,
}

impl Factor {
    pub const ALL: [Factor; 4] = [Factor::HodlPct, Factor::SoprLite, Factor::Nvt, Factor::Mpr];

    pub fn index(self) -> usize {
        match self {
            Factor::HodlPct => 0,
            Factor::SoprLite => 1,
            Factor::Nvt => 2,
            Factor::Mpr => 3,
        }
    }

    pub fn column_name(self) -> &'static str {
        match self {
            Factor::HodlPct => "hodl_pct",
            Factor::SoprLite => "sopr_lite",
            Factor::Nvt => "nvt",
            Factor::Mpr => "mpr",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// One row of the raw factor panel. Each factor is `None` when its inputs
/// were insufficient on that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFactorRecord {
    pub day: NaiveDate,
    pub hodl_pct: Option<f64>,
    pub sopr_lite: Option<f64>,
    pub nvt: Option<f64>,
    pub mpr: Option<f64>,
}

impl DailyFactorRecord {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            hodl_pct: None,
            sopr_lite: None,
            nvt: None,
            mpr: None,
        }
    }

    pub fn get(&self, factor: Factor) -> Option<f64> {
        match factor {
            Factor::HodlPct => self.hodl_pct,
            Factor::SoprLite => self.sopr_lite,
            Factor::Nvt => self.nvt,
            Factor::Mpr => self.mpr,
        }
    }
}
