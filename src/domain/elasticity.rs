use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Exogenous shifters of fee level used in the first stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Blocks found in the hour minus the expected count.
    ArrivalSurprise,
    /// Log retarget adjustment, carried for a window after each retarget.
    DifficultyShock,
    /// Indicator of an unusually long inter-block gap.
    HashrateDisruption,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 3] = [
        InstrumentKind::ArrivalSurprise,
        InstrumentKind::DifficultyShock,
        InstrumentKind::HashrateDisruption,
    ];

    pub fn index(self) -> usize {
        match self {
            InstrumentKind::ArrivalSurprise => 0,
            InstrumentKind::DifficultyShock => 1,
            InstrumentKind::HashrateDisruption => 2,
        }
    }
}

/// Exogenous controls `W`, included in both stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElasticityControl {
    Weekend,
    TimeTrend,
    Fullness,
    LaggedLogTxCount,
}

/// One hour of the fee/throughput panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticityObservation {
    pub hour_start: DateTime<Utc>,
    pub log_fee: f64,
    pub log_tx_count: f64,
    pub fullness: Option<f64>,
    /// Indexed by `InstrumentKind::index`.
    pub instruments: [f64; 3],
    /// Hours since the start of the panel.
    pub trend: f64,
    pub lagged_log_tx_count: Option<f64>,
}

impl ElasticityObservation {
    pub fn instrument(&self, kind: InstrumentKind) -> f64 {
        self.instruments[kind.index()]
    }

    pub fn is_weekend(&self) -> bool {
        use chrono::{Datelike, Weekday};
        matches!(self.hour_start.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn control(&self, control: ElasticityControl) -> Option<f64> {
        match control {
            ElasticityControl::Weekend => Some(if self.is_weekend() { 1.0 } else { 0.0 }),
            ElasticityControl::TimeTrend => Some(self.trend),
            ElasticityControl::Fullness => self.fullness,
            ElasticityControl::LaggedLogTxCount => self.lagged_log_tx_count,
        }
    }
}

/// Instrument and control set of one 2SLS run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvSpecification {
    pub id: String,
    pub instruments: Vec<InstrumentKind>,
    pub controls: Vec<ElasticityControl>,
}

impl Default for IvSpecification {
    fn default() -> Self {
        Self {
            id: "baseline".to_string(),
            instruments: InstrumentKind::ALL.to_vec(),
            controls: vec![ElasticityControl::Weekend, ElasticityControl::TimeTrend],
        }
    }
}

/// Row filter for stratified sub-estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubsampleFilter {
    All,
    /// Mean block fullness in `[min, max)`.
    FullnessBucket { min: f64, max: f64 },
    /// Mean fee rate (base units / vbyte) in `[min, max)`.
    FeeRegime { min: f64, max: f64 },
    /// Calendar days `[start, end]`, inclusive.
    Period { start: NaiveDate, end: NaiveDate },
}

impl SubsampleFilter {
    pub fn descriptor(&self) -> String {
        match self {
            SubsampleFilter::All => "all".to_string(),
            SubsampleFilter::FullnessBucket { min, max } => format!("fullness[{min:.2},{max:.2})"),
            SubsampleFilter::FeeRegime { min, max } => format!("fee_rate[{min},{max})"),
            SubsampleFilter::Period { start, end } => format!("period[{start},{end}]"),
        }
    }

    pub fn matches(&self, obs: &ElasticityObservation) -> bool {
        match self {
            SubsampleFilter::All => true,
            SubsampleFilter::FullnessBucket { min, max } => obs
                .fullness
                .is_some_and(|f| f >= *min && f < *max),
            SubsampleFilter::FeeRegime { min, max } => {
                let rate = obs.log_fee.exp();
                rate >= *min && rate < *max
            }
            SubsampleFilter::Period { start, end } => {
                let day = obs.hour_start.date_naive();
                day >= *start && day <= *end
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateStatus {
    Estimated,
    RankDeficient,
    InsufficientData,
}

/// One (specification, subsample) elasticity estimate with diagnostics.
/// Diagnostics are reported, never acted upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IVEstimate {
    pub spec_id: String,
    pub subsample_descriptor: String,
    pub point_estimate: Option<f64>,
    pub std_error: Option<f64>,
    pub first_stage_f: Option<f64>,
    pub first_stage_f_p_value: Option<f64>,
    /// Hansen J; `None` when exactly identified.
    pub overid_stat: Option<f64>,
    pub overid_p_value: Option<f64>,
    /// First-stage F below the configured threshold.
    pub weak_instrument: bool,
    pub observations: usize,
    pub status: EstimateStatus,
}

impl IVEstimate {
    pub fn unavailable(
        spec_id: &str,
        subsample_descriptor: String,
        observations: usize,
        status: EstimateStatus,
    ) -> Self {
        Self {
            spec_id: spec_id.to_string(),
            subsample_descriptor,
            point_estimate: None,
            std_error: None,
            first_stage_f: None,
            first_stage_f_p_value: None,
            overid_stat: None,
            overid_p_value: None,
            weak_instrument: false,
            observations,
            status,
        }
    }
}
