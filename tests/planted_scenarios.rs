mod common;

use chainpanel::application::aggregation::LedgerAggregator;
use chainpanel::application::factors::FactorBuilder;
use chainpanel::application::{Pipeline, PipelineInputs};
use chainpanel::config::{AggregationConfig, FactorConfig, PipelineConfig};
use chainpanel::domain::factors::Factor;
use chainpanel::domain::prediction::PredictionStatus;
use chrono::TimeDelta;
use common::{ChainBuilder, HODL_THRESHOLD_DAYS, epoch, planted_hodl_ledger};

fn planted_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.factors.hodl_age_threshold_days = HODL_THRESHOLD_DAYS;
    config.walk_forward.factors = vec![Factor::HodlPct];
    config.walk_forward.controls = vec![];
    config.walk_forward.horizons = vec![1];
    config.walk_forward.initial_window_days = 200;
    config
}

#[test]
fn test_planted_hodl_relationship_is_recovered_out_of_sample() {
    let ledger = planted_hodl_ledger(400, 7, 0.05, 0.004);
    let pipeline = Pipeline::new(planted_config()).unwrap();
    let output = pipeline.run(&ledger.inputs()).unwrap();

    assert_eq!(output.factors.len(), 400);
    // The factor builder reproduces the designed shares exactly
    for (record, designed) in output.factors.iter().zip(&ledger.hodl) {
        match (record.hodl_pct, designed) {
            (Some(actual), Some(expected)) => assert!((actual - expected).abs() < 1e-12),
            (actual, expected) => assert_eq!(actual, *expected),
        }
    }

    let summary = &output.walk_forward[0];
    assert_eq!(summary.horizon, 1);
    assert_eq!(summary.fitted, 200);
    assert!(summary.oos_r_squared.unwrap() > 0.0);
    assert!(summary.hit_rate.unwrap() > 0.5);

    let slope = summary
        .mean_coefficients
        .iter()
        .find(|(name, _)| name == "hodl_pct")
        .map(|(_, b)| *b)
        .unwrap();
    assert!(slope > 0.0);

    for record in &output.predictions {
        assert_eq!(record.status, PredictionStatus::Fitted);
        let model = record.model.as_ref().unwrap();
        assert!(model.coefficient("hodl_pct").unwrap() > 0.0);
    }
}

#[test]
fn test_hodl_counts_only_the_year_old_event() {
    let day_one = epoch() + TimeDelta::days(1) + TimeDelta::hours(10);
    let day_four_hundred = epoch() + TimeDelta::days(400) + TimeDelta::hours(10);

    let mut chain = ChainBuilder::new();
    chain.block(day_one, 2_000_000, 0, &[("old".to_string(), 1_000, 250)]);
    chain.creation("old", 0, 300_000_000, day_one);
    chain.block(
        day_four_hundred,
        2_000_000,
        0,
        &[
            ("fresh".to_string(), 1_000, 250),
            ("spender".to_string(), 1_000, 250),
        ],
    );
    chain.creation("fresh", 0, 100_000_000, day_four_hundred);
    chain.spend("spender", "old", 0, 300_000_000, day_four_hundred);
    chain.spend("spender", "fresh", 0, 100_000_000, day_four_hundred);

    let aggregates = LedgerAggregator::new(AggregationConfig::default(), 144, 6)
        .aggregate(&chain.records, &[])
        .unwrap();
    assert_eq!(aggregates.daily.len(), 400);

    let spend_day = &aggregates.daily[399];
    let mut ages: Vec<i64> = spend_day.spend_ages.iter().map(|s| s.age_days).collect();
    ages.sort_unstable();
    assert_eq!(ages, vec![0, 399]);

    let factors = FactorBuilder::new(FactorConfig::default()).build(&aggregates, &[]);
    assert_eq!(factors[399].hodl_pct, Some(0.75));
    assert!(factors[..399].iter().all(|f| f.hodl_pct.is_none()));
}

#[test]
fn test_pipeline_with_empty_ledger_is_structurally_complete() {
    let output = Pipeline::new(planted_config())
        .unwrap()
        .run(&PipelineInputs::default())
        .unwrap();
    assert!(output.panel.is_empty());
    assert_eq!(output.walk_forward.len(), 1);
    assert_eq!(output.walk_forward[0].fitted, 0);
}
