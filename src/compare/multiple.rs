// Comparison of more than two groups: omnibus test plus post-hoc contrasts

use super::{check_homoskedasticity, ComparisonContext, ComparisonStrategy, Parametric};
use crate::error::{ExperimentError, Result};
use crate::log::{ComparisonResult, TestKind};
use crate::stats;
use crate::table::{normalize, ResultTable};
use std::collections::BTreeMap;
use tracing::{info, warn};

const POST_HOC_NOTE: &str =
    "p-values are adjusted for multiple comparisons (studentized range distribution)";

#[derive(Debug, Clone, Copy, Default)]
pub struct MultipleComparison;

impl MultipleComparison {
    /// ANOVA, Welch ANOVA or Kruskal-Wallis by (parametric, equal_var)
    fn omnibus(
        ctx: &ComparisonContext<'_>,
        metric: &str,
        groups: &[&[f64]],
        equal_var: bool,
    ) -> Result<ResultTable> {
        let (raw, pvalue) = match (ctx.options.parametric, equal_var) {
            (Parametric::Parametric, true) => {
                let r = stats::anova(groups)?;
                (r.raw_table(ctx.treatment), r.pvalue)
            }
            (Parametric::Parametric, false) => {
                let r = stats::welch_anova(groups)?;
                (r.raw_table(ctx.treatment), r.pvalue)
            }
            (Parametric::NonParametric, _) => {
                let r = stats::kruskal(groups)?;
                (r.raw_table(ctx.treatment), r.pvalue)
            }
            (Parametric::Permute, _) => {
                return Err(ExperimentError::UnsupportedConfiguration(
                    "permutations are only available for experiments with two variants"
                        .to_string(),
                ))
            }
        };

        let alpha = ctx.options.alpha;
        let note = if pvalue <= alpha {
            info!(metric, pvalue, alpha, "omnibus significant");
            format!(
                "significant at alpha = {}: the treatment has an effect on {}; \
                 examine the post-hoc contrasts",
                alpha, metric
            )
        } else {
            warn!(metric, pvalue, alpha, "omnibus not significant");
            format!(
                "not significant at alpha = {}: no treatment effect on {}; \
                 relying on the post-hoc contrasts risks false positives",
                alpha, metric
            )
        };

        Ok(normalize(&raw.with_note(note)))
    }

    /// Tukey HSD when variances are equal, Games-Howell otherwise
    fn post_hoc(groups: &[(&str, &[f64])], equal_var: bool) -> Result<ResultTable> {
        let result = if equal_var {
            stats::tukey_hsd(groups)?
        } else {
            stats::games_howell(groups)?
        };
        Ok(normalize(&result.raw_table().with_note(POST_HOC_NOTE)))
    }
}

impl ComparisonStrategy for MultipleComparison {
    fn name(&self) -> &'static str {
        "multiple"
    }

    fn run(&self, ctx: &ComparisonContext<'_>) -> Result<ComparisonResult> {
        if ctx.options.paired {
            warn!("paired is ignored when comparing more than two variants");
        }
        let equal_var = check_homoskedasticity(ctx)?;

        let mut result = ComparisonResult::new();
        for metric in ctx.metrics {
            let groups = ctx.group_values(metric)?;
            let slices: Vec<&[f64]> = groups.iter().map(|(_, v)| v.as_slice()).collect();
            let labelled: Vec<(&str, &[f64])> = groups
                .iter()
                .map(|(g, v)| (g.as_str(), v.as_slice()))
                .collect();
            let equal = equal_var[metric];

            let anova = Self::omnibus(ctx, metric, &slices, equal)?;
            let post_hoc = Self::post_hoc(&labelled, equal)?;

            result.insert(
                metric.clone(),
                BTreeMap::from([(TestKind::Anova, anova), (TestKind::PostHoc, post_hoc)]),
            );
        }
        Ok(result)
    }
}
