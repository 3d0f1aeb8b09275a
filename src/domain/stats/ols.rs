//! Ordinary least squares with classical and Newey-West covariance.

use crate::domain::errors::FitError;
use nalgebra::{DMatrix, DVector};

/// Singular values below `RANK_TOLERANCE × max` count as zero.
const RANK_TOLERANCE: f64 = 1e-10;

/// Numerical rank of a design matrix via its singular values.
pub fn design_rank(x: &DMatrix<f64>) -> usize {
    if x.nrows() == 0 || x.ncols() == 0 {
        return 0;
    }
    let singular = x.singular_values();
    let max = singular.iter().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return 0;
    }
    singular.iter().filter(|s| **s > max * RANK_TOLERANCE).count()
}

/// HAC lag truncation for a horizon-h target.
///
/// Overlapping h-period returns carry an MA(h-1) error, so the truncation is
/// never below `h - 1`; otherwise the Newey-West rule of thumb
/// `floor(4 (n / 100)^(2/9))` applies.
pub fn newey_west_lags(n: usize, horizon: u32) -> usize {
    let rule = (4.0 * (n as f64 / 100.0).powf(2.0 / 9.0)).floor() as usize;
    rule.max(horizon.saturating_sub(1) as usize)
}

/// Converts row-major feature rows into a design matrix.
pub fn design_matrix(rows: &[Vec<f64>]) -> DMatrix<f64> {
    let n = rows.len();
    let k = rows.first().map(|r| r.len()).unwrap_or(0);
    DMatrix::from_fn(n, k, |i, j| rows[i][j])
}

#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: DVector<f64>,
    pub residuals: DVector<f64>,
    pub xtx_inv: DMatrix<f64>,
    pub rss: f64,
    pub tss: f64,
    pub n: usize,
    pub k: usize,
}

impl OlsFit {
    /// Fit `y = Xβ + ε`.
    ///
    /// # Errors
    /// * `InsufficientData` - fewer rows than columns + 1
    /// * `RankDeficientDesign` - X has linearly dependent columns
    pub fn fit(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<Self, FitError> {
        let (n, k) = x.shape();
        if k == 0 || n <= k || y.len() != n {
            return Err(FitError::InsufficientData {
                available: n.min(y.len()),
                required: k + 1,
            });
        }

        let rank = design_rank(x);
        if rank < k {
            return Err(FitError::RankDeficientDesign { rank, columns: k });
        }

        let xt = x.transpose();
        let xtx = &xt * x;
        let xtx_inv = xtx
            .cholesky()
            .map(|c| c.inverse())
            .ok_or(FitError::RankDeficientDesign { rank, columns: k })?;

        let coefficients = &xtx_inv * (&xt * y);
        let residuals = y - x * &coefficients;
        let rss = residuals.norm_squared();
        let mean = y.mean();
        let tss = y.iter().map(|v| (v - mean).powi(2)).sum();

        Ok(Self {
            coefficients,
            residuals,
            xtx_inv,
            rss,
            tss,
            n,
            k,
        })
    }

    /// Centered R². Zero when the target has no variance.
    pub fn r_squared(&self) -> f64 {
        if self.tss <= 0.0 {
            return 0.0;
        }
        1.0 - self.rss / self.tss
    }

    /// Residual variance with a degrees-of-freedom correction.
    pub fn sigma2(&self) -> f64 {
        self.rss / (self.n - self.k) as f64
    }

    pub fn classical_std_errors(&self) -> DVector<f64> {
        let s2 = self.sigma2();
        DVector::from_fn(self.k, |i, _| (s2 * self.xtx_inv[(i, i)]).max(0.0).sqrt())
    }

    /// Newey-West HAC covariance with Bartlett weights.
    ///
    /// `x` must be the design matrix the fit was computed from.
    pub fn newey_west_covariance(&self, x: &DMatrix<f64>, lags: usize) -> DMatrix<f64> {
        let k = self.k;
        let u = &self.residuals;
        let mut meat = DMatrix::<f64>::zeros(k, k);

        for t in 0..self.n {
            let xt = x.row(t).transpose();
            meat += &xt * xt.transpose() * (u[t] * u[t]);
        }

        for l in 1..=lags.min(self.n.saturating_sub(1)) {
            let weight = 1.0 - l as f64 / (lags as f64 + 1.0);
            let mut gamma = DMatrix::<f64>::zeros(k, k);
            for t in l..self.n {
                let xt = x.row(t).transpose();
                let xl = x.row(t - l).transpose();
                gamma += &xt * xl.transpose() * (u[t] * u[t - l]);
            }
            meat += (&gamma + gamma.transpose()) * weight;
        }

        &self.xtx_inv * meat * &self.xtx_inv
    }

    pub fn newey_west_std_errors(&self, x: &DMatrix<f64>, lags: usize) -> DVector<f64> {
        let cov = self.newey_west_covariance(x, lags);
        DVector::from_fn(self.k, |i, _| cov[(i, i)].max(0.0).sqrt())
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(self.coefficients.iter())
            .map(|(x, b)| x * b)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ols_recovers_exact_line() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64]).collect();
        let x = design_matrix(&rows);
        let y = DVector::from_fn(10, |i, _| 2.0 + 3.0 * i as f64);

        let fit = OlsFit::fit(&x, &y).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-9);
        assert!((fit.coefficients[1] - 3.0).abs() < 1e-9);
        assert!((fit.r_squared() - 1.0).abs() < 1e-9);
        assert!((fit.predict(&[1.0, 20.0]) - 62.0).abs() < 1e-8);
    }

    #[test]
    fn test_collinear_design_is_rank_deficient() {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![1.0, i as f64, 2.0 * i as f64])
            .collect();
        let x = design_matrix(&rows);
        let y = DVector::from_fn(10, |i, _| i as f64);

        match OlsFit::fit(&x, &y) {
            Err(FitError::RankDeficientDesign { rank, columns }) => {
                assert_eq!(rank, 2);
                assert_eq!(columns, 3);
            }
            other => panic!("expected rank deficiency, got {:?}", other),
        }
    }

    #[test]
    fn test_too_few_rows() {
        let x = design_matrix(&[vec![1.0, 2.0], vec![1.0, 3.0]]);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        assert!(matches!(
            OlsFit::fit(&x, &y),
            Err(FitError::InsufficientData { available: 2, required: 3 })
        ));
    }

    #[test]
    fn test_newey_west_zero_lags_is_white() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0, (i % 7) as f64]).collect();
        let x = design_matrix(&rows);
        let y = DVector::from_fn(20, |i, _| 1.0 + 0.5 * (i % 7) as f64 + if i % 2 == 0 { 0.3 } else { -0.2 });
        let fit = OlsFit::fit(&x, &y).unwrap();

        let nw0 = fit.newey_west_std_errors(&x, 0);
        let nw3 = fit.newey_west_std_errors(&x, 3);
        assert!(nw0.iter().all(|s| s.is_finite() && *s > 0.0));
        assert!(nw3.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_newey_west_lags_grow_with_horizon() {
        assert_eq!(newey_west_lags(100, 1), 4);
        assert_eq!(newey_west_lags(100, 30), 29);
        assert!(newey_west_lags(1000, 1) >= newey_west_lags(100, 1));
    }
}
