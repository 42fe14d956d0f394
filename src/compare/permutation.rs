// Two-group permutation test
//
// The pooled sample is shuffled in place each round (each round starts from
// the previous round's order), split at |A|, and the statistic recomputed.
// p = #(permuted diff >= observed diff) / rounds.

use super::{Alternative, ComparisonContext, ComparisonStrategy, StatisticFn};
use crate::error::{ExperimentError, Result};
use crate::log::{ComparisonResult, TestKind};
use crate::stats::mean;
use crate::table::ResultTable;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::info;

/// Outcome of one permutation run
#[derive(Debug, Clone, PartialEq)]
pub struct PermutationOutcome {
    pub stat_a: f64,
    pub stat_b: f64,
    pub observed: f64,
    pub rounds: usize,
    pub pvalue: f64,
}

impl PermutationOutcome {
    /// Output row: A = 0, B = 1 (group positions, not labels)
    pub fn to_table(&self) -> ResultTable {
        let mut table = ResultTable::new([
            "A",
            "B",
            "stat(A)",
            "stat(B)",
            "diff",
            "permutations",
            "p-value",
        ]);
        table.push_row(vec![
            0usize.into(),
            1usize.into(),
            self.stat_a.into(),
            self.stat_b.into(),
            self.observed.into(),
            self.rounds.into(),
            self.pvalue.into(),
        ]);
        table
    }
}

/// Mean-difference statistic for the alternative
pub fn default_statistic(alternative: Alternative) -> fn(&[f64], &[f64]) -> (f64, f64, f64) {
    match alternative {
        Alternative::TwoSided => |a, b| {
            let (sa, sb) = (mean(a), mean(b));
            (sa, sb, (sa - sb).abs())
        },
        Alternative::Greater => |a, b| {
            let (sa, sb) = (mean(a), mean(b));
            (sa, sb, sa - sb)
        },
        Alternative::Smaller => |a, b| {
            let (sa, sb) = (mean(a), mean(b));
            (sa, sb, (sb - sa).abs())
        },
    }
}

/// Run `rounds` label permutations of `a` vs `b` with a seeded PRNG
pub fn permutation_test<F>(
    a: &[f64],
    b: &[f64],
    statistic: F,
    rounds: usize,
    seed: u64,
) -> Result<PermutationOutcome>
where
    F: Fn(&[f64], &[f64]) -> (f64, f64, f64),
{
    if a.is_empty() || b.is_empty() {
        return Err(ExperimentError::stats(
            "permutation test requires two non-empty samples",
        ));
    }
    if rounds == 0 {
        return Err(ExperimentError::config(
            "permutation rounds must be at least 1",
        ));
    }

    let (stat_a, stat_b, observed) = statistic(a, b);
    let k = a.len();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut pool: Vec<f64> = a.iter().chain(b).copied().collect();

    let mut at_least_as_extreme = 0usize;
    for _ in 0..rounds {
        pool.shuffle(&mut rng);
        let (pa, pb) = pool.split_at(k);
        if statistic(pa, pb).2 >= observed {
            at_least_as_extreme += 1;
        }
    }

    Ok(PermutationOutcome {
        stat_a,
        stat_b,
        observed,
        rounds,
        pvalue: at_least_as_extreme as f64 / rounds as f64,
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PermutationComparison;

impl ComparisonStrategy for PermutationComparison {
    fn name(&self) -> &'static str {
        "permutation"
    }

    fn run(&self, ctx: &ComparisonContext<'_>) -> Result<ComparisonResult> {
        let options = ctx.options;
        if options.paired {
            return Err(ExperimentError::UnsupportedConfiguration(
                "paired permutations are not implemented".to_string(),
            ));
        }
        if ctx.groups.len() != 2 {
            return Err(ExperimentError::UnsupportedConfiguration(
                "permutations are only available for experiments with two variants".to_string(),
            ));
        }

        let seed = options.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let custom: Option<&StatisticFn> = options.statistic.as_ref();
        if custom.is_none() {
            info!(
                "permuting for mean difference by default; \
                 supply a custom statistic for medians or quantiles"
            );
        }
        info!(
            seed,
            rounds = options.rounds,
            method = options.method.as_str(),
            "permutation test"
        );

        let mut result = ComparisonResult::new();
        for metric in ctx.metrics {
            let groups = ctx.group_values(metric)?;
            let (a, b) = (&groups[0].1, &groups[1].1);

            // each metric restarts from the same seed
            let outcome = match custom {
                Some(f) => permutation_test(a, b, |x, y| f.call(x, y), options.rounds, seed)?,
                None => permutation_test(
                    a,
                    b,
                    default_statistic(options.alternative),
                    options.rounds,
                    seed,
                )?,
            };
            info!(
                metric = metric.as_str(),
                diff = outcome.observed,
                pvalue = outcome.pvalue,
                "permutation"
            );

            result.insert(
                metric.clone(),
                BTreeMap::from([(TestKind::PermutationTest, outcome.to_table())]),
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_pvalue() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 3.0, 4.0, 5.0, 6.0];
        let f = default_statistic(Alternative::TwoSided);
        let first = permutation_test(&a, &b, f, 200, 42).unwrap();
        let second = permutation_test(&a, &b, f, 200, 42).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_separated_groups_have_small_pvalue() {
        let a: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.1).collect();
        let b: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let outcome =
            permutation_test(&a, &b, default_statistic(Alternative::Greater), 500, 7).unwrap();
        assert!(outcome.pvalue < 0.01);
        assert!(outcome.observed > 99.0);
    }

    #[test]
    fn test_identical_groups_have_pvalue_one() {
        let a = [3.0; 10];
        let outcome =
            permutation_test(&a, &a, default_statistic(Alternative::TwoSided), 50, 1).unwrap();
        assert_eq!(outcome.pvalue, 1.0);
    }

    #[test]
    fn test_table_layout() {
        let outcome = PermutationOutcome {
            stat_a: 1.0,
            stat_b: 2.0,
            observed: 1.0,
            rounds: 10,
            pvalue: 0.3,
        };
        let table = outcome.to_table();
        assert_eq!(table.number(0, "A"), Some(0.0));
        assert_eq!(table.number(0, "B"), Some(1.0));
        assert_eq!(table.number(0, "permutations"), Some(10.0));
    }

    #[test]
    fn test_rejects_empty_sample() {
        let f = default_statistic(Alternative::TwoSided);
        assert!(permutation_test(&[], &[1.0], f, 10, 0).is_err());
    }
}
