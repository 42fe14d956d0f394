//! Property-based tests for the read-out engine
//!
//! Properties covered:
//! 1. Winsorizing is idempotent for a fixed mask
//! 2. Group balance rejects exactly the mismatched proportion vectors
//! 3. Permutation p-values are proportions of the rounds
//! 4. Identical samples look identical to the t-test

use abtest::compare::{default_statistic, permutation_test};
use abtest::formulas::winsorize_outliers;
use abtest::stats::{self, TTestVariant, Tail};
use abtest::{
    Alternative, AssumptionChecker, Dataset, DiagnosticLog, ExperimentDescriptor, ExperimentError,
};
use proptest::prelude::*;

/// Rows for `counts[g]` units of group g, labels `g0`, `g1`, ...
fn grouped_dataset(counts: &[usize]) -> Dataset {
    let mut variant = Vec::new();
    let mut user = Vec::new();
    for (g, n) in counts.iter().enumerate() {
        for i in 0..*n {
            variant.push(format!("g{}", g));
            user.push(format!("u{}-{}", g, i));
        }
    }
    Dataset::new()
        .with_labels("variant", variant)
        .unwrap()
        .with_labels("user", user)
        .unwrap()
}

fn normalized(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| w / total).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_winsorize_is_idempotent(
        rows in prop::collection::vec((-1000.0f64..1000.0, any::<bool>()), 1..60),
    ) {
        let (values, mask): (Vec<f64>, Vec<bool>) = rows.into_iter().unzip();
        let metrics = vec!["revenue".to_string()];
        let mut once = Dataset::new().with_numeric("revenue", values).unwrap();
        winsorize_outliers(&mut once, &mask, &metrics).unwrap();

        let mut twice = once.clone();
        winsorize_outliers(&mut twice, &mask, &metrics).unwrap();

        prop_assert_eq!(once.numeric("revenue").unwrap(), twice.numeric("revenue").unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_group_balance_accepts_matching_proportions(
        groups in prop::collection::vec((1usize..40, 0.05f64..1.0), 2..6),
    ) {
        let (counts, weights): (Vec<usize>, Vec<f64>) = groups.into_iter().unzip();
        let data = grouped_dataset(&counts);
        let descriptor = ExperimentDescriptor::new("variant", "user", normalized(&weights));

        let mut log = DiagnosticLog::new();
        let result = AssumptionChecker::new().check_group_balance(&data, &descriptor, &mut log);
        prop_assert!(!matches!(result, Err(ExperimentError::Configuration(_))));
    }

    #[test]
    fn prop_group_balance_rejects_mismatched_length(
        counts in prop::collection::vec(1usize..40, 2..6),
        extra in 1usize..3,
        shorter in any::<bool>(),
    ) {
        let data = grouped_dataset(&counts);
        let k = if shorter { counts.len() - 1 } else { counts.len() + extra };
        let descriptor = ExperimentDescriptor::new("variant", "user", vec![1.0 / k as f64; k]);

        let mut log = DiagnosticLog::new();
        let result = AssumptionChecker::new().check_group_balance(&data, &descriptor, &mut log);
        prop_assert!(matches!(result, Err(ExperimentError::Configuration(_))));
        prop_assert!(!log.status(abtest::Assumption::GroupBalance).checked);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_permutation_pvalue_is_a_proportion(
        a in prop::collection::vec(-100.0f64..100.0, 1..20),
        b in prop::collection::vec(-100.0f64..100.0, 1..20),
        rounds in 1usize..200,
        seed in any::<u64>(),
    ) {
        let outcome = permutation_test(
            &a,
            &b,
            default_statistic(Alternative::TwoSided),
            rounds,
            seed,
        )
        .unwrap();
        prop_assert!((0.0..=1.0).contains(&outcome.pvalue));

        let hits = outcome.pvalue * rounds as f64;
        prop_assert!((hits - hits.round()).abs() < 1e-9);
    }

    #[test]
    fn prop_single_round_pvalue_is_zero_or_one(
        a in prop::collection::vec(-100.0f64..100.0, 1..20),
        b in prop::collection::vec(-100.0f64..100.0, 1..20),
        seed in any::<u64>(),
    ) {
        let outcome =
            permutation_test(&a, &b, default_statistic(Alternative::Greater), 1, seed).unwrap();
        prop_assert!(outcome.pvalue == 0.0 || outcome.pvalue == 1.0);
    }

    #[test]
    fn prop_identical_groups_ttest(
        values in prop::collection::vec(-100.0f64..100.0, 2..40),
    ) {
        prop_assume!(stats::variance(&values) > 1e-6);
        let result = stats::ttest(&values, &values, TTestVariant::Student, Tail::TwoSided).unwrap();
        prop_assert!((result.pvalue - 1.0).abs() < 1e-6);
        prop_assert!(result.cohen_d.abs() < 1e-9);
    }
}
