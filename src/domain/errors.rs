use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a structurally invalid input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MalformedKind {
    NegativeValue,
    NegativeFee,
    SpendBeforeCreation,
    ValueMismatch,
    DoubleSpend,
    Orphaned,
    DuplicatePrice,
    NonPositivePrice,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MalformedKind::NegativeValue => "negative value",
            MalformedKind::NegativeFee => "negative fee",
            MalformedKind::SpendBeforeCreation => "spend before creation",
            MalformedKind::ValueMismatch => "spend/creation value mismatch",
            MalformedKind::DoubleSpend => "outpoint already spent",
            MalformedKind::Orphaned => "orphaned by reorg",
            MalformedKind::DuplicatePrice => "duplicate price observation",
            MalformedKind::NonPositivePrice => "non-positive price",
        };
        f.write_str(label)
    }
}

/// A record excluded from aggregation. Counted, never raised on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed record {record}: {kind}")]
pub struct MalformedRecord {
    pub kind: MalformedKind,
    pub record: String,
}

impl MalformedRecord {
    pub fn new(kind: MalformedKind, record: impl Into<String>) -> Self {
        Self {
            kind,
            record: record.into(),
        }
    }
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "Data integrity exceeded: {excluded}/{total} records excluded ({fraction:.4} > ceiling {ceiling:.4})"
    )]
    DataIntegrityExceeded {
        excluded: usize,
        total: usize,
        fraction: f64,
        ceiling: f64,
    },

    #[error("Run cancelled before stage '{stage}'")]
    Cancelled { stage: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Record source failed: {0}")]
    Source(String),

    #[error("Pipeline worker failed: {0}")]
    Worker(String),
}

/// Errors from a single model fit. These degrade to null output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("Rank-deficient design: rank {rank} < {columns} columns")]
    RankDeficientDesign { rank: usize, columns: usize },

    #[error("Insufficient data: {available} usable observations, need {required}")]
    InsufficientData { available: usize, required: usize },
}
