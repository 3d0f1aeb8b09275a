mod common;

use chainpanel::application::{Pipeline, PipelineInputs, PipelineOutput};
use chainpanel::config::PipelineConfig;
use chainpanel::domain::factors::Factor;
use chainpanel::domain::prediction::ControlCovariate;
use chrono::NaiveDate;
use common::{HODL_THRESHOLD_DAYS, day, planted_hodl_ledger};

const DAYS: usize = 140;
const CUTOFF: usize = 100;

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.factors.hodl_age_threshold_days = HODL_THRESHOLD_DAYS;
    config.factors.nvt_window_days = 20;
    config.factors.nvt_min_observations = 10;
    config.preprocess.zscore_min_observations = 10;
    config.walk_forward.initial_window_days = 60;
    config.walk_forward.factors = vec![Factor::HodlPct, Factor::SoprLite, Factor::Nvt, Factor::Mpr];
    config.walk_forward.controls = vec![ControlCovariate::LaggedReturn, ControlCovariate::LaggedLogFees];
    config.walk_forward.horizons = vec![1, 7];
    config
}

/// Rewrites every record dated on or after `from`, keeping it valid.
fn perturb_from(inputs: &PipelineInputs, from: NaiveDate) -> PipelineInputs {
    let mut perturbed = inputs.clone();
    for block in perturbed.records.blocks.iter_mut().filter(|b| b.day() >= from) {
        block.weight /= 2;
    }
    for tx in perturbed
        .records
        .transactions
        .iter_mut()
        .filter(|t| t.timestamp.date_naive() >= from && !t.is_coinbase)
    {
        tx.fee *= 3;
    }
    for price in perturbed.prices.iter_mut().filter(|p| p.day >= from) {
        price.closing_price *= 1.5;
    }
    for obs in perturbed.backlog.iter_mut().filter(|o| o.timestamp.date_naive() >= from) {
        obs.pending_vsize *= 2;
    }
    perturbed
}

fn run(inputs: &PipelineInputs) -> PipelineOutput {
    Pipeline::new(config()).unwrap().run(inputs).unwrap()
}

#[test]
fn test_future_records_do_not_move_past_factors() {
    let inputs = planted_hodl_ledger(DAYS, 11, 0.05, 0.01).inputs();
    let baseline = run(&inputs);
    let perturbed = run(&perturb_from(&inputs, day(CUTOFF)));

    // The perturbation is visible from the cutoff on
    assert_ne!(baseline.factors[CUTOFF].nvt, perturbed.factors[CUTOFF].nvt);
    assert_eq!(baseline.factors[..CUTOFF], perturbed.factors[..CUTOFF]);

    for factor in Factor::ALL {
        let a = baseline.panel.column(factor).unwrap();
        let b = perturbed.panel.column(factor).unwrap();
        assert_eq!(a.raw[..CUTOFF], b.raw[..CUTOFF], "{factor} raw");
        assert_eq!(a.bounds[..CUTOFF], b.bounds[..CUTOFF], "{factor} bounds");
        assert_eq!(a.winsorized[..CUTOFF], b.winsorized[..CUTOFF], "{factor} winsorized");
        assert_eq!(a.standardized[..CUTOFF], b.standardized[..CUTOFF], "{factor} standardized");
        assert_eq!(a.filled[..CUTOFF], b.filled[..CUTOFF], "{factor} filled");
        // lagged[t] only reads filled[t - 1]
        assert_eq!(a.lagged[..=CUTOFF], b.lagged[..=CUTOFF], "{factor} lagged");
    }
}

#[test]
fn test_predictions_ignore_records_from_their_own_day_on() {
    let inputs = planted_hodl_ledger(DAYS, 13, 0.05, 0.01).inputs();
    let baseline = run(&inputs);
    assert!(!baseline.predictions.is_empty());

    for cutoff in [70, 90, 120] {
        let perturbed = run(&perturb_from(&inputs, day(cutoff)));
        assert_eq!(baseline.predictions.len(), perturbed.predictions.len());

        for (a, b) in baseline.predictions.iter().zip(&perturbed.predictions) {
            assert_eq!((a.day, a.horizon), (b.day, b.horizon));
            if a.day > day(cutoff) {
                continue;
            }
            assert_eq!(a.predicted_return, b.predicted_return, "{} h={}", a.day, a.horizon);
            assert_eq!(a.model_snapshot_id(), b.model_snapshot_id());
            assert_eq!(a.training_end, b.training_end);
        }
    }
}

#[test]
fn test_training_window_ends_before_target_is_realized() {
    let inputs = planted_hodl_ledger(DAYS, 17, 0.05, 0.01).inputs();
    let output = run(&inputs);

    for record in &output.predictions {
        let end = record.training_end.unwrap();
        // Last training target closes on end + h - 1, before the row's origin close
        let target_close = end + chrono::TimeDelta::days(record.horizon as i64 - 1);
        assert!(target_close < record.day, "{} h={}", record.day, record.horizon);
    }
}
