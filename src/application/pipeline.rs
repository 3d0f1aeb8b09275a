//! End-to-end run: aggregate → factors → panel → {walk-forward, seasonality},
//! with the elasticity estimator fed from the aggregates.
//!
//! A run either returns every output or an error; nothing partial escapes.
//! Cancellation is observed only between stages.

use crate::application::aggregation::LedgerAggregator;
use crate::application::analysis::{WeekdayEffects, WeekdayReturnAnalysis};
use crate::application::elasticity::{IvEstimator, build_elasticity_panel};
use crate::application::factors::{FactorBuilder, PriceSeries};
use crate::application::preprocessing::PanelPreprocessor;
use crate::application::regression::{RegressionInputs, ReturnSeries, WalkForwardRegressor};
use crate::application::seasonality::SeasonalityDecomposer;
use crate::config::PipelineConfig;
use crate::domain::elasticity::IVEstimate;
use crate::domain::errors::{FitError, PipelineError};
use crate::domain::factors::DailyFactorRecord;
use crate::domain::ledger::aggregates::{AggregationReport, LedgerAggregates};
use crate::domain::ledger::records::{BacklogObservation, LedgerRecords, PriceObservation};
use crate::domain::panel::PanelSnapshot;
use crate::domain::ports::LedgerSource;
use crate::domain::prediction::{PredictionRecord, WalkForwardSummary};
use crate::domain::seasonality::SeasonalityDecomposition;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, info_span, warn};

/// Shared abort flag, checked at every stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub records: LedgerRecords,
    pub prices: Vec<PriceObservation>,
    pub backlog: Vec<BacklogObservation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub aggregation: AggregationReport,
    pub factors: Vec<DailyFactorRecord>,
    pub panel: Arc<PanelSnapshot>,
    pub predictions: Vec<PredictionRecord>,
    pub walk_forward: Vec<WalkForwardSummary>,
    pub elasticity: Vec<IVEstimate>,
    /// `None` when the hourly panel was too thin to fit.
    pub seasonality: Option<SeasonalityDecomposition>,
    pub weekday_effects: Option<WeekdayEffects>,
}

#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn checkpoint(&self, stage: &'static str) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            warn!("Pipeline cancelled before stage '{}'", stage);
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }

    pub fn run(&self, inputs: &PipelineInputs) -> Result<PipelineOutput, PipelineError> {
        let span = info_span!("pipeline_run");
        let _guard = span.enter();
        let config = &self.config;

        self.checkpoint("aggregate")?;
        let aggregates = {
            let _stage = info_span!("aggregate").entered();
            LedgerAggregator::new(
                config.aggregation.clone(),
                config.factors.mpr_block_window,
                config.factors.mpr_fee_blocks,
            )
            .with_day_range(config.start_day, config.end_day)
            .aggregate(&inputs.records, &inputs.prices)?
        };

        self.checkpoint("factors")?;
        let factors = {
            let _stage = info_span!("factors").entered();
            FactorBuilder::new(config.factors.clone()).build(&aggregates, &inputs.backlog)
        };

        self.checkpoint("preprocess")?;
        let panel = {
            let _stage = info_span!("preprocess").entered();
            Arc::new(PanelPreprocessor::new(config.preprocess.clone()).process(&factors))
        };

        self.checkpoint("walk_forward")?;
        let walk_forward = {
            let _stage = info_span!("walk_forward").entered();
            let inputs = self.regression_inputs(&aggregates, Arc::clone(&panel));
            WalkForwardRegressor::new(config.walk_forward.clone(), inputs).run()
        };

        self.checkpoint("elasticity")?;
        let elasticity = {
            let _stage = info_span!("elasticity").entered();
            let hourly_panel = build_elasticity_panel(&aggregates, &config.elasticity);
            IvEstimator::new(config.elasticity.clone()).estimate_all(&hourly_panel)
        };

        self.checkpoint("seasonality")?;
        let seasonality = {
            let _stage = info_span!("seasonality").entered();
            match SeasonalityDecomposer::new(config.seasonality.clone())
                .decompose(&aggregates.hourly, Some(&panel))
            {
                Ok(decomposition) => Some(decomposition),
                Err(FitError::InsufficientData {
                    available,
                    required,
                }) => {
                    warn!(
                        "Seasonality skipped: {} usable hours, need {}",
                        available, required
                    );
                    None
                }
                Err(e) => {
                    warn!("Seasonality skipped: {}", e);
                    None
                }
            }
        };

        self.checkpoint("weekday_effects")?;
        let weekday_effects =
            WeekdayReturnAnalysis::new(config.weekday.clone()).analyze(&aggregates.prices);

        self.checkpoint("complete")?;
        info!(
            "Pipeline complete: {} days, {} predictions, {} IV estimates, panel {}",
            panel.len(),
            walk_forward.predictions.len(),
            elasticity.len(),
            panel.fingerprint()
        );

        Ok(PipelineOutput {
            aggregation: aggregates.report,
            factors,
            panel,
            predictions: walk_forward.predictions,
            walk_forward: walk_forward.summaries,
            elasticity,
            seasonality,
            weekday_effects,
        })
    }

    /// Drains `source` batch by batch, then runs the synchronous core on the
    /// blocking pool so the caller's runtime keeps serving other tasks.
    pub async fn run_from_source<S>(&self, source: &mut S) -> Result<PipelineOutput, PipelineError>
    where
        S: LedgerSource + ?Sized,
    {
        let mut inputs = PipelineInputs::default();
        let mut batches = 0usize;
        loop {
            self.checkpoint("ingest")?;
            let batch = source
                .next_batch()
                .await
                .map_err(|e| PipelineError::Source(format!("{:#}", e)))?;
            match batch {
                Some(batch) => {
                    batches += 1;
                    inputs.records.extend(batch);
                }
                None => break,
            }
        }
        inputs.prices = source
            .prices()
            .await
            .map_err(|e| PipelineError::Source(format!("{:#}", e)))?;
        inputs.backlog = source
            .backlog()
            .await
            .map_err(|e| PipelineError::Source(format!("{:#}", e)))?;
        info!(
            "Pipeline ingested {} batches ({} records, {} prices, {} backlog observations)",
            batches,
            inputs.records.len(),
            inputs.prices.len(),
            inputs.backlog.len()
        );

        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.run(&inputs))
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?
    }

    fn regression_inputs(
        &self,
        aggregates: &LedgerAggregates,
        panel: Arc<PanelSnapshot>,
    ) -> RegressionInputs {
        let prices = PriceSeries::new(
            &aggregates.prices,
            self.config.factors.price_fill_tolerance_days,
        );
        let returns = ReturnSeries::from_prices(panel.days(), &prices);
        let log_fees = panel
            .days()
            .iter()
            .map(|day| {
                aggregates
                    .day_index(*day)
                    .map(|i| aggregates.daily[i].total_fees)
                    .filter(|fees| *fees > 0)
                    .map(|fees| (fees as f64).ln())
            })
            .collect();
        RegressionInputs {
            panel,
            returns,
            log_fees,
        }
    }
}
