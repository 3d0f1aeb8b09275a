//! Two-stage least squares for the demand elasticity of throughput to fees.
//!
//! First stage: `log_fee ~ W + Z`. Second stage: `log_tx_count ~ log_fee_hat + W`.
//! The coefficient on fitted log fee is the elasticity. Diagnostics
//! (first-stage F, Hansen J) are reported on the estimate and never gate it.

use crate::config::ElasticityConfig;
use crate::domain::elasticity::{
    ElasticityObservation, EstimateStatus, IVEstimate, IvSpecification, SubsampleFilter,
};
use crate::domain::errors::FitError;
use crate::domain::stats::OlsFit;
use crate::domain::stats::inference::{chi_squared_p_value, f_p_value, nested_f_statistic};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, info, warn};

pub struct IvEstimator {
    config: ElasticityConfig,
}

/// Design pieces of one (specification, subsample) run.
struct IvDesign {
    y: DVector<f64>,
    x: DVector<f64>,
    /// Exogenous controls, intercept first.
    w: DMatrix<f64>,
    z: DMatrix<f64>,
}

impl IvDesign {
    fn n(&self) -> usize {
        self.y.len()
    }

    /// `[W | Z]`, the full instrument matrix.
    fn instruments(&self) -> DMatrix<f64> {
        hstack(&self.w, &self.z)
    }

    /// `[x | W]` with `x` replaced by `column`.
    fn regressors(&self, column: &DVector<f64>) -> DMatrix<f64> {
        let endogenous = DMatrix::from_column_slice(column.len(), 1, column.as_slice());
        hstack(&endogenous, &self.w)
    }
}

impl IvEstimator {
    pub fn new(config: ElasticityConfig) -> Self {
        Self { config }
    }

    /// Every configured (specification × subsample) estimate, in that order.
    pub fn estimate_all(&self, panel: &[ElasticityObservation]) -> Vec<IVEstimate> {
        let combos: Vec<(&IvSpecification, &SubsampleFilter)> = self
            .config
            .specifications
            .iter()
            .flat_map(|spec| self.config.subsamples.iter().map(move |s| (spec, s)))
            .collect();

        let estimates: Vec<IVEstimate> = combos
            .par_iter()
            .map(|(spec, subsample)| self.estimate(panel, spec, subsample))
            .collect();

        info!(
            "IvEstimator: {} estimates over {} hours, {} weak",
            estimates.len(),
            panel.len(),
            estimates.iter().filter(|e| e.weak_instrument).count()
        );
        estimates
    }

    pub fn estimate(
        &self,
        panel: &[ElasticityObservation],
        spec: &IvSpecification,
        subsample: &SubsampleFilter,
    ) -> IVEstimate {
        let descriptor = subsample.descriptor();
        let rows: Vec<(&ElasticityObservation, Vec<f64>)> = panel
            .iter()
            .filter(|obs| subsample.matches(obs))
            .filter_map(|obs| {
                let controls: Option<Vec<f64>> =
                    spec.controls.iter().map(|c| obs.control(*c)).collect();
                controls.map(|c| (obs, c))
            })
            .collect();

        let n = rows.len();
        let kw = 1 + spec.controls.len();
        let kz = spec.instruments.len();
        let required = self.config.min_observations.max(kw + kz + 2);
        if kz == 0 || n < required {
            debug!(
                "IvEstimator {}/{}: {} observations, need {}",
                spec.id, descriptor, n, required
            );
            return IVEstimate::unavailable(&spec.id, descriptor, n, EstimateStatus::InsufficientData);
        }

        let design = IvDesign {
            y: DVector::from_iterator(n, rows.iter().map(|(o, _)| o.log_tx_count)),
            x: DVector::from_iterator(n, rows.iter().map(|(o, _)| o.log_fee)),
            w: DMatrix::from_fn(n, kw, |i, j| if j == 0 { 1.0 } else { rows[i].1[j - 1] }),
            z: DMatrix::from_fn(n, kz, |i, j| rows[i].0.instrument(spec.instruments[j])),
        };

        match self.two_stage(&design, spec, &descriptor) {
            Ok(estimate) => estimate,
            Err(FitError::RankDeficientDesign { rank, columns }) => {
                warn!(
                    "IvEstimator {}/{}: rank-deficient design (rank {} < {})",
                    spec.id, descriptor, rank, columns
                );
                IVEstimate::unavailable(&spec.id, descriptor, n, EstimateStatus::RankDeficient)
            }
            Err(FitError::InsufficientData { .. }) => {
                IVEstimate::unavailable(&spec.id, descriptor, n, EstimateStatus::InsufficientData)
            }
        }
    }

    fn two_stage(
        &self,
        design: &IvDesign,
        spec: &IvSpecification,
        descriptor: &str,
    ) -> Result<IVEstimate, FitError> {
        let n = design.n();
        let kw = design.w.ncols();
        let kz = design.z.ncols();
        let instruments = design.instruments();

        // First stage and its exclusion F test
        let first = OlsFit::fit(&instruments, &design.x)?;
        let restricted = OlsFit::fit(&design.w, &design.x)?;
        let df = n - kw - kz;
        let first_stage_f = nested_f_statistic(restricted.rss, first.rss, kz, df);
        let first_stage_f_p_value =
            first_stage_f.and_then(|f| f_p_value(f, kz as f64, df as f64));

        // Second stage on fitted log fee
        let x_hat = &design.x - &first.residuals;
        let fitted_regressors = design.regressors(&x_hat);
        let mut second = OlsFit::fit(&fitted_regressors, &design.y)?;

        // Structural residuals use the observed regressor
        let actual_regressors = design.regressors(&design.x);
        second.residuals = &design.y - &actual_regressors * &second.coefficients;
        let robust = second.newey_west_std_errors(&fitted_regressors, 0);

        let point_estimate = second.coefficients[0];
        let std_error = robust[0];

        let (overid_stat, overid_p_value) = if kz > 1 {
            match hansen_j(&instruments, &actual_regressors, &design.y, &second.residuals) {
                Some(j) => (Some(j), chi_squared_p_value(j, (kz - 1) as f64)),
                None => (None, None),
            }
        } else {
            (None, None)
        };

        let weak_instrument = first_stage_f.is_none_or(|f| f < self.config.weak_instrument_f);
        if weak_instrument {
            warn!(
                "IvEstimator {}/{}: weak instruments, first-stage F {:?} < {}",
                spec.id, descriptor, first_stage_f, self.config.weak_instrument_f
            );
        }
        debug!(
            "IvEstimator {}/{}: elasticity {:.4} (se {:.4}), F {:?}, J {:?}, n={}",
            spec.id, descriptor, point_estimate, std_error, first_stage_f, overid_stat, n
        );

        Ok(IVEstimate {
            spec_id: spec.id.clone(),
            subsample_descriptor: descriptor.to_string(),
            point_estimate: Some(point_estimate),
            std_error: Some(std_error),
            first_stage_f,
            first_stage_f_p_value,
            overid_stat,
            overid_p_value,
            weak_instrument,
            observations: n,
            status: EstimateStatus::Estimated,
        })
    }
}

/// Hansen's J from two-step efficient GMM.
///
/// `residuals` are the first-step (2SLS) structural residuals used to build
/// the heteroskedasticity-robust weight matrix.
pub fn hansen_j(
    z: &DMatrix<f64>,
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    residuals: &DVector<f64>,
) -> Option<f64> {
    let n = z.nrows();
    let l = z.ncols();
    let nf = n as f64;

    let mut s = DMatrix::<f64>::zeros(l, l);
    for i in 0..n {
        let zi = z.row(i).transpose();
        s += &zi * zi.transpose() * (residuals[i] * residuals[i]);
    }
    s /= nf;
    let weight = s.cholesky()?.inverse();

    let zx = z.transpose() * x;
    let zy = z.transpose() * y;
    let lhs = zx.transpose() * &weight * &zx;
    let rhs = zx.transpose() * &weight * &zy;
    let beta = lhs.try_inverse()? * rhs;

    let e = y - x * beta;
    let g = z.transpose() * e / nf;
    let j = (g.transpose() * &weight * &g)[(0, 0)] * nf;
    j.is_finite().then_some(j.max(0.0))
}

fn hstack(left: &DMatrix<f64>, right: &DMatrix<f64>) -> DMatrix<f64> {
    let split = left.ncols();
    DMatrix::from_fn(left.nrows(), split + right.ncols(), |i, j| {
        if j < split { left[(i, j)] } else { right[(i, j - split)] }
    })
}
