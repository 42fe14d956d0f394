// Statistics backend for the comparison engine
//
// The engine consumes these tests; it does not care how they are computed.
// Distribution functions (t, F, chi-square, normal, log-gamma) come from
// statrs. The tests built on top of them report their results in the
// backend's own column vocabulary (`raw_table()`); the comparison engine runs
// every raw table through `crate::table::normalize` before logging it.
//
// Only the tests the engine needs are here:
// - Levene (median-centred) for the homoskedasticity pre-check
// - Student / Welch / paired t-tests with Cohen's d
// - Mann-Whitney U and Kruskal-Wallis for the non-parametric paths
// - one-way ANOVA and Welch ANOVA
// - Tukey HSD and Games-Howell post-hoc contrasts
// - chi-square goodness of fit for group balance

mod adjust;
mod nonparametric;
mod parametric;
mod posthoc;
mod studentized_range;

pub use adjust::{adjust_pvalues, PAdjust};
pub use nonparametric::{kruskal, mann_whitney_u, KruskalResult, MannWhitneyResult};
pub use parametric::{
    anova, chisquare, cohen_d, levene, ttest, welch_anova, AnovaResult, ChiSquareResult,
    LeveneResult, TTestResult, TTestVariant, WelchAnovaResult,
};
pub use posthoc::{games_howell, tukey_hsd, Contrast, PostHocMethod, PostHocResult};
pub use studentized_range::ptukey;

use crate::error::{ExperimentError, Result};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

/// Direction of the alternative hypothesis
///
/// `Greater` means the first group (A) has the larger location parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    TwoSided,
    Greater,
    Less,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator)
pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Quantile with linear interpolation between order statistics (R-7)
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

fn distribution_error(e: impl std::fmt::Display) -> ExperimentError {
    ExperimentError::stats(format!("invalid distribution parameters: {}", e))
}

/// p-value of a t statistic for the requested tail
pub(crate) fn t_pvalue(t: f64, df: f64, tail: Tail) -> Result<f64> {
    if t.is_nan() {
        return Err(ExperimentError::stats("t statistic is undefined"));
    }
    let dist = StudentsT::new(0.0, 1.0, df).map_err(distribution_error)?;
    Ok(match tail {
        Tail::TwoSided => (2.0 * dist.sf(t.abs())).min(1.0),
        Tail::Greater => dist.sf(t),
        Tail::Less => dist.cdf(t),
    })
}

/// Upper-tail p-value of an F statistic
pub(crate) fn f_pvalue(f: f64, df1: f64, df2: f64) -> Result<f64> {
    if f.is_nan() {
        return Err(ExperimentError::stats("F statistic is undefined"));
    }
    if f.is_infinite() {
        return Ok(0.0);
    }
    let dist = FisherSnedecor::new(df1, df2).map_err(distribution_error)?;
    Ok(dist.sf(f.max(0.0)))
}

/// Upper-tail p-value of a chi-square statistic
pub(crate) fn chi2_pvalue(x: f64, df: f64) -> Result<f64> {
    let dist = ChiSquared::new(df).map_err(distribution_error)?;
    Ok(dist.sf(x.max(0.0)))
}

/// p-value of a standard normal statistic for the requested tail
pub(crate) fn z_pvalue(z: f64, tail: Tail) -> Result<f64> {
    let dist = Normal::new(0.0, 1.0).map_err(distribution_error)?;
    Ok(match tail {
        Tail::TwoSided => (2.0 * dist.sf(z.abs())).min(1.0),
        Tail::Greater => dist.sf(z),
        Tail::Less => dist.cdf(z),
    })
}
