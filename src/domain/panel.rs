//! Preprocessed factor panel.
//!
//! Once built the panel is frozen behind an `Arc` and only read; its
//! fingerprint identifies the exact cell contents of a run.

use crate::domain::factors::Factor;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// All preprocessing stages of one factor, aligned to the panel's days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorColumn {
    pub factor: Factor,
    pub raw: Vec<Option<f64>>,
    /// Expanding-window [lower, upper] percentile bounds in effect on each day.
    pub bounds: Vec<Option<(f64, f64)>>,
    pub winsorized: Vec<Option<f64>>,
    pub standardized: Vec<Option<f64>>,
    /// Standardized values after the bounded forward fill.
    pub filled: Vec<Option<f64>>,
    /// `lagged[t] == filled[t - 1]`: the value usable for a return realized on day t.
    pub lagged: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSnapshot {
    days: Vec<NaiveDate>,
    columns: Vec<FactorColumn>,
    fingerprint: String,
}

impl PanelSnapshot {
    /// `columns` must hold one column per factor, each as long as `days`.
    pub fn new(days: Vec<NaiveDate>, mut columns: Vec<FactorColumn>) -> Self {
        columns.sort_by_key(|c| c.factor);
        let fingerprint = Self::compute_fingerprint(&days, &columns);
        Self {
            days,
            columns,
            fingerprint,
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn day(&self, index: usize) -> Option<NaiveDate> {
        self.days.get(index).copied()
    }

    pub fn day_index(&self, day: NaiveDate) -> Option<usize> {
        let start = *self.days.first()?;
        let offset = (day - start).num_days();
        if offset < 0 || offset as usize >= self.days.len() {
            return None;
        }
        Some(offset as usize)
    }

    pub fn column(&self, factor: Factor) -> Option<&FactorColumn> {
        self.columns.iter().find(|c| c.factor == factor)
    }

    pub fn columns(&self) -> &[FactorColumn] {
        &self.columns
    }

    /// Lagged, standardized value of `factor` for the row at `index`.
    pub fn lagged(&self, factor: Factor, index: usize) -> Option<f64> {
        self.column(factor)?.lagged.get(index).copied().flatten()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn compute_fingerprint(days: &[NaiveDate], columns: &[FactorColumn]) -> String {
        let mut hasher = Sha256::new();
        for day in days {
            hasher.update(day.to_string().as_bytes());
        }
        for column in columns {
            hasher.update(column.factor.column_name().as_bytes());
            for series in [
                &column.raw,
                &column.winsorized,
                &column.standardized,
                &column.filled,
                &column.lagged,
            ] {
                for cell in series {
                    match cell {
                        Some(v) => {
                            hasher.update([1u8]);
                            hasher.update(v.to_bits().to_le_bytes());
                        }
                        None => hasher.update([0u8]),
                    }
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}
