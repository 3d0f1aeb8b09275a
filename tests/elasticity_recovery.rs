mod common;

use chainpanel::application::{Pipeline, PipelineInputs};
use chainpanel::config::PipelineConfig;
use chainpanel::domain::elasticity::{
    ElasticityControl, EstimateStatus, InstrumentKind, IvSpecification, SubsampleFilter,
};
use common::{day, planted_elasticity_ledger};

const TRUE_ELASTICITY: f64 = -0.5;

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.elasticity.specifications = vec![IvSpecification {
        id: "arrival".to_string(),
        instruments: vec![InstrumentKind::ArrivalSurprise],
        controls: vec![ElasticityControl::Weekend],
    }];
    config.elasticity.subsamples = vec![
        SubsampleFilter::All,
        SubsampleFilter::Period {
            start: day(0),
            end: day(80),
        },
    ];
    config
}

#[test]
fn test_planted_elasticity_is_recovered_through_the_pipeline() {
    let inputs = PipelineInputs {
        records: planted_elasticity_ledger(4_000, 42, TRUE_ELASTICITY),
        ..Default::default()
    };
    let output = Pipeline::new(config()).unwrap().run(&inputs).unwrap();

    assert_eq!(output.elasticity.len(), 2);
    let full = &output.elasticity[0];
    assert_eq!(full.spec_id, "arrival");
    assert_eq!(full.subsample_descriptor, "all");
    assert_eq!(full.status, EstimateStatus::Estimated);
    assert_eq!(full.observations, 4_000);

    let estimate = full.point_estimate.unwrap();
    assert!(
        (estimate - TRUE_ELASTICITY).abs() < 0.05,
        "estimated elasticity {estimate}"
    );
    assert!(full.first_stage_f.unwrap() > 10.0);
    assert!(!full.weak_instrument);
    assert!(full.std_error.unwrap() > 0.0);
    // Exactly identified: nothing to test
    assert!(full.overid_stat.is_none());

    let early = &output.elasticity[1];
    assert!(early.observations < full.observations);
    assert!((early.point_estimate.unwrap() - TRUE_ELASTICITY).abs() < 0.1);
}

#[test]
fn test_short_panel_reports_insufficient_data() {
    let inputs = PipelineInputs {
        records: planted_elasticity_ledger(20, 42, TRUE_ELASTICITY),
        ..Default::default()
    };
    let output = Pipeline::new(config()).unwrap().run(&inputs).unwrap();
    assert!(
        output
            .elasticity
            .iter()
            .all(|e| e.status == EstimateStatus::InsufficientData && e.point_estimate.is_none())
    );
}
