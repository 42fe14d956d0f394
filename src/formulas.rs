//! Experiment formulas: power analysis, the group-balance test and outlier
//! remediation transforms
//!
//! Everything here is a pure function of its inputs; the remediation
//! transforms mutate only the dataset they are handed.

use crate::dataset::Dataset;
use crate::error::{ExperimentError, Result};
use crate::stats::{self, ChiSquareResult};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::fmt;
use std::str::FromStr;

/// Sidedness used by the power formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tails {
    OneSided,
    #[default]
    TwoSided,
}

impl Tails {
    /// Per-tail significance level
    fn alpha(self, alpha: f64) -> f64 {
        match self {
            Tails::OneSided => alpha,
            Tails::TwoSided => alpha / 2.0,
        }
    }
}

impl FromStr for Tails {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one-sided" => Ok(Tails::OneSided),
            "two-sided" => Ok(Tails::TwoSided),
            other => Err(ExperimentError::config(format!(
                "tails should be 'one-sided' or 'two-sided', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Tails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tails::OneSided => f.write_str("one-sided"),
            Tails::TwoSided => f.write_str("two-sided"),
        }
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ExperimentError::config(format!(
            "{} should be strictly between 0 and 1, got {}",
            name, value
        )))
    }
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| ExperimentError::stats(e.to_string()))
}

/// Minimum detectable effect for a two-sample comparison
///
/// `|t(1 - alpha') + t(power)| * sqrt(xvar/xn + yvar/yn)` with
/// `xn + yn - 2` degrees of freedom; `alpha' = alpha / 2` when two-sided.
pub fn mde(
    xvar: f64,
    yvar: f64,
    xn: usize,
    yn: usize,
    alpha: f64,
    power: f64,
    tails: Tails,
) -> Result<f64> {
    check_probability("alpha", alpha)?;
    check_probability("power", power)?;
    if xn < 2 || yn < 2 {
        return Err(ExperimentError::stats(
            "minimum detectable effect needs at least 2 observations per group",
        ));
    }

    let dof = (xn + yn - 2) as f64;
    let dist = StudentsT::new(0.0, 1.0, dof).map_err(|e| ExperimentError::stats(e.to_string()))?;
    let t_critical = dist.inverse_cdf(1.0 - tails.alpha(alpha));
    let t_power = dist.inverse_cdf(power);
    let se = (xvar / xn as f64 + yvar / yn as f64).sqrt();

    Ok(((t_critical + t_power) * se).abs())
}

/// Minimum detectable effect for conversion-rate metrics
///
/// Variances follow from the observed rates as `p * (1 - p)`.
pub fn mde_binomial(
    xmean: f64,
    ymean: f64,
    xn: usize,
    yn: usize,
    alpha: f64,
    power: f64,
    tails: Tails,
) -> Result<f64> {
    for (name, rate) in [("control rate", xmean), ("test rate", ymean)] {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ExperimentError::InvalidData(format!(
                "{} should be a proportion, got {}",
                name, rate
            )));
        }
    }
    mde(
        xmean * (1.0 - xmean),
        ymean * (1.0 - ymean),
        xn,
        yn,
        alpha,
        power,
        tails,
    )
}

/// Sample size per group needed to detect the observed difference
///
/// `(z(1 - alpha') + z(power))^2 * (xvar + yvar) / (ymean - xmean)^2`,
/// rounded up.
pub fn required_n(
    xmean: f64,
    ymean: f64,
    xvar: f64,
    yvar: f64,
    alpha: f64,
    power: f64,
    tails: Tails,
) -> Result<u64> {
    check_probability("alpha", alpha)?;
    check_probability("power", power)?;

    let delta = ymean - xmean;
    if delta == 0.0 {
        return Err(ExperimentError::stats(
            "required sample size is unbounded when the groups have equal means",
        ));
    }

    let normal = standard_normal()?;
    let z = normal.inverse_cdf(1.0 - tails.alpha(alpha)) + normal.inverse_cdf(power);
    let n = z * z * (xvar + yvar) / (delta * delta);
    Ok(n.ceil() as u64)
}

/// Achieved power of a two-sample comparison (normal approximation)
///
/// `Phi(|delta| / se - z(1 - alpha'))`, plus the opposite tail
/// `Phi(-|delta| / se - z(1 - alpha'))` when two-sided.
#[allow(clippy::too_many_arguments)]
pub fn actual_power(
    xmean: f64,
    ymean: f64,
    xvar: f64,
    yvar: f64,
    xn: usize,
    yn: usize,
    alpha: f64,
    tails: Tails,
) -> Result<f64> {
    check_probability("alpha", alpha)?;
    if xn == 0 || yn == 0 {
        return Err(ExperimentError::stats(
            "power needs at least 1 observation per group",
        ));
    }

    let se = (xvar / xn as f64 + yvar / yn as f64).sqrt();
    let normal = standard_normal()?;
    let z_critical = normal.inverse_cdf(1.0 - tails.alpha(alpha));

    if se == 0.0 {
        return Ok(if ymean == xmean { tails.alpha(alpha) } else { 1.0 });
    }

    let effect = (ymean - xmean).abs() / se;
    let power = match tails {
        Tails::OneSided => normal.cdf(effect - z_critical),
        Tails::TwoSided => normal.cdf(effect - z_critical) + normal.cdf(-effect - z_critical),
    };
    Ok(power.clamp(0.0, 1.0))
}

/// Chi-square test of observed group sizes against expected proportions
///
/// Compares proportions rather than counts: `sum((e - o)^2 / o)` over the
/// expected (`e`) and observed (`o`) shares, k - 1 degrees of freedom.
/// Values are unrounded; callers round for reporting.
pub fn check_multiple_proportion(
    n_total: usize,
    n_treatment: &[usize],
    expected_proportion: &[f64],
) -> Result<ChiSquareResult> {
    if n_total == 0 {
        return Err(ExperimentError::InvalidData(
            "cannot check proportions of an empty dataset".to_string(),
        ));
    }
    let observed: Vec<f64> = n_treatment
        .iter()
        .map(|n| *n as f64 / n_total as f64)
        .collect();

    stats::chisquare(expected_proportion, &observed)
}

/// Drop masked rows
pub fn trim_outliers(data: &mut Dataset, outlier_mask: &[bool]) -> Result<()> {
    let keep: Vec<bool> = outlier_mask.iter().map(|o| !o).collect();
    data.retain_rows(&keep)
}

/// Replace masked values of each metric with the smallest masked value of
/// that metric
pub fn winsorize_outliers(
    data: &mut Dataset,
    outlier_mask: &[bool],
    metrics: &[String],
) -> Result<()> {
    if outlier_mask.len() != data.n_rows() {
        return Err(ExperimentError::InvalidData(format!(
            "outlier mask has {} entries, dataset has {} rows",
            outlier_mask.len(),
            data.n_rows()
        )));
    }

    for metric in metrics {
        let values = data.numeric_mut(metric)?;
        let floor = values
            .iter()
            .zip(outlier_mask)
            .filter(|(_, masked)| **masked)
            .map(|(v, _)| *v)
            .fold(f64::INFINITY, f64::min);
        if !floor.is_finite() {
            continue;
        }
        for (value, masked) in values.iter_mut().zip(outlier_mask) {
            if *masked {
                *value = floor;
            }
        }
    }

    Ok(())
}
