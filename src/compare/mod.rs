// Group comparisons: strategy selection and dispatch
//
// Given the number of variants and the requested test family, one of three
// strategies runs per metric:
//
// - Single (2 groups): t-test (Welch when variances differ), Mann-Whitney U
//   for the rank-based family
// - Multiple (> 2 groups): ANOVA / Welch ANOVA / Kruskal-Wallis omnibus plus
//   Tukey HSD or Games-Howell contrasts
// - Permutation (exactly 2 groups): seeded label shuffling
//
// Every backend table is normalized to the canonical schema before it lands
// in the diagnostic log. The result of a call fully replaces the previous
// `analyses` entry of the log.

mod multiple;
mod options;
mod permutation;
mod single;

pub use multiple::MultipleComparison;
pub use options::{Alternative, CompareOptions, Parametric, StatisticFn};
pub use permutation::{
    default_statistic, permutation_test, PermutationComparison, PermutationOutcome,
};
pub use single::SingleComparison;

use crate::dataset::Dataset;
use crate::descriptor::ExperimentDescriptor;
use crate::error::{ExperimentError, Result};
use crate::log::{ComparisonResult, DiagnosticLog};
use crate::stats;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Which strategy a comparison runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Single,
    Multiple,
    Permutation,
}

impl StrategyKind {
    /// Precedence: permutation (2 groups only), then > 2 groups, then 2 groups
    pub fn select(n_groups: usize, parametric: Parametric) -> Result<Self> {
        if n_groups < 2 {
            return Err(ExperimentError::InvalidData(format!(
                "comparisons need at least 2 groups, found {}",
                n_groups
            )));
        }
        match (parametric, n_groups) {
            (Parametric::Permute, 2) => Ok(StrategyKind::Permutation),
            (Parametric::Permute, _) => Err(ExperimentError::UnsupportedConfiguration(
                "permutations are only available for experiments with two variants".to_string(),
            )),
            (_, 2) => Ok(StrategyKind::Single),
            _ => Ok(StrategyKind::Multiple),
        }
    }

    pub fn strategy(&self) -> Box<dyn ComparisonStrategy> {
        match self {
            StrategyKind::Single => Box::new(SingleComparison),
            StrategyKind::Multiple => Box::new(MultipleComparison),
            StrategyKind::Permutation => Box::new(PermutationComparison),
        }
    }
}

/// Everything a strategy reads; the dataset is borrowed immutably
pub struct ComparisonContext<'a> {
    pub data: &'a Dataset,
    pub treatment: &'a str,
    /// Sorted variant labels
    pub groups: &'a [String],
    pub metrics: &'a [String],
    pub options: &'a CompareOptions,
}

impl ComparisonContext<'_> {
    /// Values of `metric` per group, in group order
    pub fn group_values(&self, metric: &str) -> Result<Vec<(String, Vec<f64>)>> {
        let mut split = self.data.split_by(metric, self.treatment)?;
        self.groups
            .iter()
            .map(|g| {
                split
                    .remove(g)
                    .map(|values| (g.clone(), values))
                    .ok_or_else(|| {
                        ExperimentError::InvalidData(format!(
                            "group '{}' has no rows for metric '{}'",
                            g, metric
                        ))
                    })
            })
            .collect()
    }
}

/// A comparison strategy produces one set of normalized tables per metric
pub trait ComparisonStrategy {
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &ComparisonContext<'_>) -> Result<ComparisonResult>;
}

/// Levene's test per metric: metric → equal variances
pub fn check_homoskedasticity(ctx: &ComparisonContext<'_>) -> Result<BTreeMap<String, bool>> {
    let mut equal_var = BTreeMap::new();
    for metric in ctx.metrics {
        let groups = ctx.group_values(metric)?;
        let slices: Vec<&[f64]> = groups.iter().map(|(_, v)| v.as_slice()).collect();
        let levene = stats::levene(&slices)?;
        debug!(
            metric = metric.as_str(),
            statistic = levene.statistic,
            pvalue = levene.pvalue,
            equal_var = levene.equal_var,
            "levene"
        );
        equal_var.insert(metric.clone(), levene.equal_var);
    }
    Ok(equal_var)
}

/// Compare the variants of `data` and store the result in `log`
///
/// Options are validated and the strategy selected before any statistic is
/// computed.
pub fn compare<'l>(
    data: &Dataset,
    descriptor: &ExperimentDescriptor,
    options: &CompareOptions,
    log: &'l mut DiagnosticLog,
) -> Result<&'l ComparisonResult> {
    options.validate()?;

    let groups = data.unique_labels(&descriptor.treatment)?;
    let kind = StrategyKind::select(groups.len(), options.parametric)?;

    let metrics = match &options.metrics {
        Some(metrics) => metrics.clone(),
        None => descriptor.default_compare_metrics(),
    };
    if metrics.is_empty() {
        return Err(ExperimentError::config(
            "no metrics to compare: declare success or learning metrics",
        ));
    }
    for metric in &metrics {
        data.numeric(metric)?;
    }

    let strategy = kind.strategy();
    info!(
        strategy = strategy.name(),
        groups = groups.len(),
        metrics = metrics.len(),
        "comparing variants"
    );

    let ctx = ComparisonContext {
        data,
        treatment: &descriptor.treatment,
        groups: &groups,
        metrics: &metrics,
        options,
    };
    let result = strategy.run(&ctx)?;

    Ok(log.set_analyses(result))
}

#[cfg(test)]
mod tests;
