use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, StudentsT};

/// Upper-tail p-value of an F statistic.
pub fn f_p_value(f: f64, df_num: f64, df_den: f64) -> Option<f64> {
    if !f.is_finite() || f < 0.0 {
        return None;
    }
    let dist = FisherSnedecor::new(df_num, df_den).ok()?;
    Some((1.0 - dist.cdf(f)).clamp(0.0, 1.0))
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn t_p_value(t: f64, df: f64) -> Option<f64> {
    if !t.is_finite() || df <= 0.0 {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0))
}

/// Upper-tail p-value of a chi-squared statistic.
pub fn chi_squared_p_value(stat: f64, df: f64) -> Option<f64> {
    if !stat.is_finite() || stat < 0.0 {
        return None;
    }
    let dist = ChiSquared::new(df).ok()?;
    Some((1.0 - dist.cdf(stat)).clamp(0.0, 1.0))
}

/// F statistic comparing a restricted to an unrestricted nested model.
///
/// `q` restrictions, `df_unrestricted = n - k_unrestricted`.
pub fn nested_f_statistic(
    rss_restricted: f64,
    rss_unrestricted: f64,
    q: usize,
    df_unrestricted: usize,
) -> Option<f64> {
    if q == 0 || df_unrestricted == 0 || rss_unrestricted <= 0.0 {
        return None;
    }
    let num = (rss_restricted - rss_unrestricted).max(0.0) / q as f64;
    let den = rss_unrestricted / df_unrestricted as f64;
    Some(num / den)
}
