// Two-group comparison

use super::{check_homoskedasticity, ComparisonContext, ComparisonStrategy, Parametric};
use crate::error::{ExperimentError, Result};
use crate::log::{ComparisonResult, TestKind};
use crate::stats::{self, PAdjust, TTestVariant};
use crate::table::{normalize, ResultTable};
use std::collections::BTreeMap;
use tracing::info;

const WELCH_NOTE: &str =
    "Welch's correction is applied automatically when the metric variance differs across variants";

/// t-test (or Mann-Whitney U) of the first group against the second
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleComparison;

impl SingleComparison {
    fn run_metric(
        ctx: &ComparisonContext<'_>,
        metric: &str,
        equal_var: bool,
    ) -> Result<ResultTable> {
        let groups = ctx.group_values(metric)?;
        let (label_a, a) = &groups[0];
        let (label_b, b) = &groups[1];
        let options = ctx.options;
        let tail = options.alternative.tail();

        let adjust = |p: f64| match options.padjust {
            PAdjust::None => None,
            method => stats::adjust_pvalues(&[p], method).first().copied(),
        };

        let raw = match (options.parametric, options.paired) {
            (Parametric::Parametric, paired) => {
                let variant = match (paired, equal_var) {
                    (true, _) => TTestVariant::Paired,
                    (false, true) => TTestVariant::Student,
                    (false, false) => TTestVariant::Welch,
                };
                let result = stats::ttest(a, b, variant, tail)?;
                info!(
                    metric,
                    ?variant,
                    t = result.statistic,
                    pvalue = result.pvalue,
                    "t-test"
                );
                result.raw_table(label_a, label_b, adjust(result.pvalue))
            }
            (Parametric::NonParametric, false) => {
                let result = stats::mann_whitney_u(a, b, tail)?;
                info!(metric, u = result.u, pvalue = result.pvalue, "Mann-Whitney U");
                result.raw_table(label_a, label_b, adjust(result.pvalue))
            }
            (Parametric::NonParametric, true) => {
                return Err(ExperimentError::UnsupportedConfiguration(
                    "paired rank-based comparisons are not implemented".to_string(),
                ))
            }
            (Parametric::Permute, _) => {
                return Err(ExperimentError::UnsupportedConfiguration(
                    "permutations run through the permutation strategy".to_string(),
                ))
            }
        };

        Ok(normalize(&raw.with_note(WELCH_NOTE)))
    }
}

impl ComparisonStrategy for SingleComparison {
    fn name(&self) -> &'static str {
        "single"
    }

    fn run(&self, ctx: &ComparisonContext<'_>) -> Result<ComparisonResult> {
        let equal_var = check_homoskedasticity(ctx)?;

        let mut result = ComparisonResult::new();
        for metric in ctx.metrics {
            let table = Self::run_metric(ctx, metric, equal_var[metric])?;
            result.insert(metric.clone(), BTreeMap::from([(TestKind::TTest, table)]));
        }
        Ok(result)
    }
}
