//! Assumption checks and their remediation
//!
//! Three independent state machines (group balance, crossover, outliers),
//! each `unchecked → checked → handled`. Checks never touch the dataset;
//! handles rewrite it in place. A check computes everything before writing
//! its log record, so a failing check leaves the previous record untouched.

use crate::dataset::Dataset;
use crate::descriptor::ExperimentDescriptor;
use crate::error::{ExperimentError, Result};
use crate::formulas;
use crate::log::{
    Assumption, CrossoverDiagnostics, DiagnosticLog, Diagnostics, GroupBalanceDiagnostics,
    OutlierDiagnostics,
};
use crate::stats;
use crate::table::{ResultTable, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Per-stratum aggregation used by the outlier check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Median,
    Std,
    Min,
    Max,
    Sum,
    Count,
}

impl Aggregation {
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            Aggregation::Mean => stats::mean(values),
            Aggregation::Median => stats::median(values),
            Aggregation::Std => stats::std_dev(values),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Count => values.len() as f64,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::Std => "std",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Sum => "sum",
            Aggregation::Count => "count",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            "std" => Ok(Aggregation::Std),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "sum" => Ok(Aggregation::Sum),
            "count" => Ok(Aggregation::Count),
            other => Err(ExperimentError::config(format!(
                "unknown aggregation '{}'",
                other
            ))),
        }
    }
}

/// Outlier remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    /// Drop masked rows
    Trim,
    /// Replace masked values with the smallest masked value per metric
    Winsorize,
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierMethod::Trim => f.write_str("trim"),
            OutlierMethod::Winsorize => f.write_str("winsorize"),
        }
    }
}

impl FromStr for OutlierMethod {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "trim" => Ok(OutlierMethod::Trim),
            "winsorize" => Ok(OutlierMethod::Winsorize),
            other => Err(ExperimentError::config(format!(
                "outlier method should be 'trim' or 'winsorize', got '{}'",
                other
            ))),
        }
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Runs the checks and caches the masks between check and handle
#[derive(Debug, Clone, Default)]
pub struct AssumptionChecker {
    /// unit → crossed over
    crossover_mask: Option<BTreeMap<String, bool>>,
    /// row → outlier
    outlier_mask: Option<Vec<bool>>,
}

impl AssumptionChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crossover_mask(&self) -> Option<&BTreeMap<String, bool>> {
        self.crossover_mask.as_ref()
    }

    pub fn outlier_mask(&self) -> Option<&[bool]> {
        self.outlier_mask.as_deref()
    }

    /// Chi-square goodness of fit of the observed group shares against the
    /// expected proportions
    pub fn check_group_balance(
        &self,
        data: &Dataset,
        descriptor: &ExperimentDescriptor,
        log: &mut DiagnosticLog,
    ) -> Result<()> {
        let counts = data.value_counts(&descriptor.treatment)?;
        let expected = &descriptor.expected_proportions;

        if expected.len() != counts.len() {
            return Err(ExperimentError::config(format!(
                "provide one expected proportion per group: {} proportions for {} groups",
                expected.len(),
                counts.len()
            )));
        }

        let n_total = data.n_rows();
        let n_treatment: Vec<usize> = counts.values().copied().collect();
        let test = formulas::check_multiple_proportion(n_total, &n_treatment, expected)?;

        let observed: Vec<f64> = n_treatment
            .iter()
            .map(|n| round3(*n as f64 / n_total as f64))
            .collect();
        let differences: Vec<f64> = expected
            .iter()
            .zip(&observed)
            .map(|(e, o)| round3(e - o))
            .collect();

        let passed = test.pvalue > 0.05;
        log.record_check(
            Assumption::GroupBalance,
            Some(passed),
            Diagnostics::GroupBalance(GroupBalanceDiagnostics {
                groups: counts.into_keys().collect(),
                observed,
                expected: expected.clone(),
                differences,
                test: "chi-square GOF",
                statistic: round3(test.statistic),
                pvalue: round3(test.pvalue),
            }),
        );

        if passed {
            info!(
                statistic = test.statistic,
                pvalue = test.pvalue,
                "group_balance checked: proportions match"
            );
        } else {
            warn!(
                statistic = test.statistic,
                pvalue = test.pvalue,
                "group_balance checked: proportions deviate from expectation"
            );
        }
        Ok(())
    }

    /// Units exposed to more than one variant
    pub fn check_crossover(
        &mut self,
        data: &Dataset,
        descriptor: &ExperimentDescriptor,
        log: &mut DiagnosticLog,
    ) -> Result<()> {
        let units = data.labels(&descriptor.experiment_unit)?;
        let treatments = data.labels(&descriptor.treatment)?;

        let mut exposures: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (unit, treatment) in units.iter().zip(treatments) {
            exposures.entry(unit).or_default().insert(treatment);
        }

        let mask: BTreeMap<String, bool> = exposures
            .iter()
            .map(|(unit, seen)| (unit.to_string(), seen.len() > 1))
            .collect();
        let cases = mask.values().filter(|crossed| **crossed).count();
        let percent = if mask.is_empty() {
            0.0
        } else {
            cases as f64 / mask.len() as f64 * 100.0
        };

        let passed = cases == 0;
        log.record_check(
            Assumption::Crossover,
            Some(passed),
            Diagnostics::Crossover(CrossoverDiagnostics { cases, percent }),
        );
        self.crossover_mask = Some(mask);

        if passed {
            info!("crossover checked: every unit saw a single variant");
        } else {
            warn!(cases, percent, "crossover checked: units exposed to several variants");
        }
        Ok(())
    }

    /// Aggregates of `metrics` for outliers vs. regular rows
    ///
    /// Builds a table with `Outliers`, `Regulars` and `(delta)` rows, one
    /// column per metric and aggregation. The dataset is left untouched; the
    /// mask is cached for [`AssumptionChecker::handle_outliers`].
    pub fn check_outliers(
        &mut self,
        data: &Dataset,
        log: &mut DiagnosticLog,
        is_outlier: &[bool],
        metrics: &[String],
        aggregations: &[Aggregation],
    ) -> Result<()> {
        if is_outlier.len() != data.n_rows() {
            return Err(ExperimentError::InvalidData(format!(
                "outlier mask has {} entries, dataset has {} rows",
                is_outlier.len(),
                data.n_rows()
            )));
        }
        let aggregations = if aggregations.is_empty() {
            &[Aggregation::Mean][..]
        } else {
            aggregations
        };

        let mut columns = vec!["stratum".to_string()];
        let mut outliers_row: Vec<Value> = vec!["Outliers".into()];
        let mut regulars_row: Vec<Value> = vec!["Regulars".into()];
        let mut delta_row: Vec<Value> = vec!["(delta)".into()];

        for metric in metrics {
            let values = data.numeric(metric)?;
            let (outliers, regulars): (Vec<(f64, bool)>, Vec<(f64, bool)>) = values
                .iter()
                .copied()
                .zip(is_outlier.iter().copied())
                .partition(|(_, o)| *o);
            let outliers: Vec<f64> = outliers.into_iter().map(|(v, _)| v).collect();
            let regulars: Vec<f64> = regulars.into_iter().map(|(v, _)| v).collect();

            for agg in aggregations {
                let out = round3(agg.apply(&outliers));
                let reg = round3(agg.apply(&regulars));
                let delta = (out / reg - 1.0) * 100.0;

                columns.push(format!("{} ({})", metric, agg));
                outliers_row.push(finite_or_missing(out));
                regulars_row.push(finite_or_missing(reg));
                delta_row.push(if delta.is_finite() {
                    format!("{:+.1}%", delta).into()
                } else {
                    Value::Missing
                });
            }
        }

        let mut table = ResultTable::new(columns);
        table.push_row(outliers_row);
        table.push_row(regulars_row);
        table.push_row(delta_row);

        let n_outliers = is_outlier.iter().filter(|o| **o).count();
        debug!(n_outliers, "outlier stats:\n{}", table);

        log.record_check(
            Assumption::Outliers,
            None,
            Diagnostics::Outliers(OutlierDiagnostics {
                stats: Some(table),
                ..OutlierDiagnostics::default()
            }),
        );
        self.outlier_mask = Some(is_outlier.to_vec());

        info!(
            n_outliers,
            "outliers checked: only handling them changes the dataset"
        );
        Ok(())
    }

    /// Drop every row of crossed-over units
    ///
    /// Runs the check first when needed. Fails with a policy violation when
    /// more than `threshold` of the units crossed over, unless `force`.
    pub fn handle_crossover(
        &mut self,
        data: &mut Dataset,
        descriptor: &ExperimentDescriptor,
        log: &mut DiagnosticLog,
        threshold: f64,
        force: bool,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ExperimentError::config(format!(
                "crossover threshold should be a proportion, got {}",
                threshold
            )));
        }

        let status = log.status(Assumption::Crossover);
        if status.handled {
            info!("crossover already handled");
            return Ok(());
        }
        if !status.checked || self.crossover_mask.is_none() {
            self.check_crossover(data, descriptor, log)?;
        }
        let Some(mask) = self.crossover_mask.as_ref() else {
            return Ok(());
        };

        let crossed: BTreeSet<&str> = mask
            .iter()
            .filter(|(_, crossed)| **crossed)
            .map(|(unit, _)| unit.as_str())
            .collect();
        if crossed.is_empty() {
            info!("no cross-over cases to handle");
            return Ok(());
        }

        let rate = crossed.len() as f64 / mask.len() as f64;
        if rate > threshold && !force {
            return Err(ExperimentError::PolicyViolation(format!(
                "{:.3}% of units were exposed to multiple variants (threshold {:.3}%); \
                 investigate before proceeding or force the removal",
                rate * 100.0,
                threshold * 100.0
            )));
        }

        let keep: Vec<bool> = data
            .labels(&descriptor.experiment_unit)?
            .iter()
            .map(|unit| !crossed.contains(unit.as_str()))
            .collect();
        let n_units = crossed.len();
        let n_rows = keep.iter().filter(|k| !**k).count();
        data.retain_rows(&keep)?;

        log.mark_handled(Assumption::Crossover);
        self.crossover_mask = None;
        info!(units = n_units, rows = n_rows, "crossed-over units removed");
        Ok(())
    }

    /// Trim or winsorize outliers
    ///
    /// Uses `is_outlier` when given, otherwise the mask cached by the last
    /// check. An explicit mask without a prior check runs the check first
    /// (mean aggregation). Metrics default to success + learning.
    pub fn handle_outliers(
        &mut self,
        data: &mut Dataset,
        descriptor: &ExperimentDescriptor,
        log: &mut DiagnosticLog,
        method: OutlierMethod,
        is_outlier: Option<&[bool]>,
        metrics: Option<&[String]>,
    ) -> Result<()> {
        let metrics: Vec<String> = match metrics {
            Some(m) => m.to_vec(),
            None => {
                info!("all success and learning metrics are affected by default");
                descriptor.default_compare_metrics()
            }
        };

        let mask: Vec<bool> = match (is_outlier, self.outlier_mask.as_ref()) {
            (Some(mask), _) => mask.to_vec(),
            (None, Some(cached)) => cached.clone(),
            (None, None) => {
                return Err(ExperimentError::config(
                    "provide a boolean mask that identifies outliers",
                ))
            }
        };
        if mask.len() != data.n_rows() {
            return Err(ExperimentError::InvalidData(format!(
                "outlier mask has {} entries, dataset has {} rows",
                mask.len(),
                data.n_rows()
            )));
        }
        for metric in &metrics {
            data.numeric(metric)?;
        }

        if !log.status(Assumption::Outliers).checked {
            self.check_outliers(data, log, &mask, &metrics, &[Aggregation::Mean])?;
        }

        match method {
            OutlierMethod::Trim => formulas::trim_outliers(data, &mask)?,
            OutlierMethod::Winsorize => formulas::winsorize_outliers(data, &mask, &metrics)?,
        }

        let affected = mask.iter().filter(|o| **o).count();
        let percent = if mask.is_empty() {
            0.0
        } else {
            affected as f64 / mask.len() as f64 * 100.0
        };

        log.update_outlier_diagnostics(|d| {
            d.method = Some(method);
            d.affected_metrics = metrics.clone();
            d.affected_units = Some(affected);
        });
        log.mark_handled(Assumption::Outliers);
        self.outlier_mask = None;

        info!(
            %method,
            affected,
            percent = round3(percent),
            "outliers handled"
        );
        Ok(())
    }
}

fn finite_or_missing(x: f64) -> Value {
    if x.is_finite() {
        Value::Float(x)
    } else {
        Value::Missing
    }
}
