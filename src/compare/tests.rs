// Comparison engine scenarios
//
// Datasets use deterministic pseudo-noise so expectations are stable.

use super::*;
use crate::log::TestKind;
use crate::stats::PAdjust;

/// Deterministic noise in [-0.5, 0.5)
fn noise(i: usize) -> f64 {
    ((i * 37 + 11) % 101) as f64 / 101.0 - 0.5
}

/// `n` rows per group; group g has mean `means[g]` and spread `spreads[g]`
fn dataset(means: &[f64], spreads: &[f64], n: usize) -> (Dataset, ExperimentDescriptor) {
    let labels = ["control", "test1", "test2", "test3"];
    let mut variant = Vec::new();
    let mut user = Vec::new();
    let mut revenue = Vec::new();
    for (g, (mean, spread)) in means.iter().zip(spreads).enumerate() {
        for i in 0..n {
            variant.push(labels[g]);
            user.push(format!("u{}-{}", g, i));
            revenue.push(mean + spread * noise(i + g * 7));
        }
    }
    let data = Dataset::new()
        .with_labels("variant", variant)
        .unwrap()
        .with_labels("user", user)
        .unwrap()
        .with_numeric("revenue", revenue)
        .unwrap();
    let k = means.len();
    let descriptor = ExperimentDescriptor::new("variant", "user", vec![1.0 / k as f64; k])
        .with_success_metrics(["revenue"]);
    (data, descriptor)
}

#[test]
fn test_select_strategy_precedence() {
    assert_eq!(
        StrategyKind::select(2, Parametric::Permute).unwrap(),
        StrategyKind::Permutation
    );
    assert!(matches!(
        StrategyKind::select(3, Parametric::Permute),
        Err(ExperimentError::UnsupportedConfiguration(_))
    ));
    assert_eq!(
        StrategyKind::select(2, Parametric::NonParametric).unwrap(),
        StrategyKind::Single
    );
    assert_eq!(
        StrategyKind::select(5, Parametric::Parametric).unwrap(),
        StrategyKind::Multiple
    );
    assert!(StrategyKind::select(1, Parametric::Parametric).is_err());
}

#[test]
fn test_two_groups_take_ttest_path() {
    let (data, descriptor) = dataset(&[10.0, 11.0], &[1.0, 1.0], 200);
    let mut log = DiagnosticLog::new();
    let result = compare(&data, &descriptor, &CompareOptions::default(), &mut log).unwrap();

    let tables = &result["revenue"];
    assert_eq!(tables.len(), 1);
    let ttest = &tables[&TestKind::TTest];
    assert!(ttest.number(0, "p-value").unwrap() < 0.05);
    assert!(ttest.number(0, "effect size (d)").unwrap() < 0.0);
    assert!(ttest.has_column("t-stat"));
    assert!(!ttest.has_column("p-value (adj)"));
    assert!(ttest.note().is_some());
}

#[test]
fn test_padjust_adds_adjusted_column() {
    let (data, descriptor) = dataset(&[10.0, 11.0], &[1.0, 1.0], 50);
    let mut log = DiagnosticLog::new();
    let options = CompareOptions {
        padjust: PAdjust::Bonferroni,
        ..Default::default()
    };
    let result = compare(&data, &descriptor, &options, &mut log).unwrap();
    let ttest = &result["revenue"][&TestKind::TTest];
    assert_eq!(
        ttest.number(0, "p-value (adj)"),
        ttest.number(0, "p-value")
    );
}

#[test]
fn test_unequal_variances_use_welch() {
    let (data, descriptor) = dataset(&[10.0, 10.5], &[0.1, 20.0], 100);
    let mut log = DiagnosticLog::new();
    let result = compare(&data, &descriptor, &CompareOptions::default(), &mut log).unwrap();
    let dof = result["revenue"][&TestKind::TTest].number(0, "dof").unwrap();
    // pooled dof would be exactly 198
    assert!(dof < 198.0);
    assert!(dof.fract() != 0.0);
}

#[test]
fn test_non_parametric_two_groups_use_mann_whitney() {
    let (data, descriptor) = dataset(&[10.0, 12.0], &[1.0, 1.0], 40);
    let mut log = DiagnosticLog::new();
    let options = CompareOptions::default().with_parametric(false);
    let result = compare(&data, &descriptor, &options, &mut log).unwrap();
    let table = &result["revenue"][&TestKind::TTest];
    assert!(table.has_column("u-stat"));
    assert!(table.number(0, "p-value").unwrap() < 0.001);
}

#[test]
fn test_paired_non_parametric_unsupported() {
    let (data, descriptor) = dataset(&[10.0, 12.0], &[1.0, 1.0], 20);
    let mut log = DiagnosticLog::new();
    let options = CompareOptions {
        paired: true,
        ..CompareOptions::default().with_parametric(false)
    };
    assert!(matches!(
        compare(&data, &descriptor, &options, &mut log),
        Err(ExperimentError::UnsupportedConfiguration(_))
    ));
}

#[test]
fn test_three_groups_take_multiple_path() {
    let (data, descriptor) = dataset(&[10.0, 10.0, 13.0], &[1.0, 1.0, 1.0], 60);
    let mut log = DiagnosticLog::new();
    let result = compare(&data, &descriptor, &CompareOptions::default(), &mut log).unwrap();

    let tables = &result["revenue"];
    assert!(!tables.contains_key(&TestKind::TTest));
    let anova = &tables[&TestKind::Anova];
    assert!(anova.number(0, "p-value").unwrap() < 0.05);
    assert!(anova.note().unwrap().starts_with("significant"));

    let post_hoc = &tables[&TestKind::PostHoc];
    assert_eq!(post_hoc.n_rows(), 3);
    assert_eq!(
        post_hoc.columns(),
        &[
            "A",
            "B",
            "mean(A)",
            "mean(B)",
            "delta",
            "stderr",
            "t-stat",
            "p-value",
            "effect size (d)"
        ]
    );
}

#[test]
fn test_omnibus_not_significant_note() {
    let (data, descriptor) = dataset(&[10.0, 10.0, 10.0], &[1.0, 1.0, 1.0], 30);
    let mut log = DiagnosticLog::new();
    let result = compare(&data, &descriptor, &CompareOptions::default(), &mut log).unwrap();
    let anova = &result["revenue"][&TestKind::Anova];
    assert!(anova.note().unwrap().starts_with("not significant"));
    // post-hoc always runs
    assert_eq!(result["revenue"][&TestKind::PostHoc].n_rows(), 3);
}

#[test]
fn test_kruskal_for_non_parametric_multiple() {
    let (data, descriptor) = dataset(&[10.0, 11.0, 12.0], &[1.0, 1.0, 1.0], 30);
    let mut log = DiagnosticLog::new();
    let options = CompareOptions::default().with_parametric(false);
    let result = compare(&data, &descriptor, &options, &mut log).unwrap();
    assert!(result["revenue"][&TestKind::Anova].has_column("H-stat"));
}

#[test]
fn test_permute_with_three_groups_is_unsupported() {
    let (data, descriptor) = dataset(&[10.0, 10.0, 13.0], &[1.0, 1.0, 1.0], 20);
    let mut log = DiagnosticLog::new();
    let options = CompareOptions::default().with_parametric(Parametric::Permute);
    assert!(matches!(
        compare(&data, &descriptor, &options, &mut log),
        Err(ExperimentError::UnsupportedConfiguration(_))
    ));
    assert!(log.analyses().is_empty());
}

#[test]
fn test_paired_permutation_is_unsupported() {
    let (data, descriptor) = dataset(&[10.0, 12.0], &[1.0, 1.0], 20);
    let mut log = DiagnosticLog::new();
    let options = CompareOptions {
        paired: true,
        ..CompareOptions::default().with_parametric(Parametric::Permute)
    };
    assert!(matches!(
        compare(&data, &descriptor, &options, &mut log),
        Err(ExperimentError::UnsupportedConfiguration(_))
    ));
}

#[test]
fn test_permutation_path_is_reproducible() {
    let (data, descriptor) = dataset(&[10.0, 10.2], &[1.0, 1.0], 40);
    let options = CompareOptions {
        rounds: 300,
        ..CompareOptions::default()
            .with_parametric(Parametric::Permute)
            .with_seed(2024)
    };

    let mut first = DiagnosticLog::new();
    let mut second = DiagnosticLog::new();
    compare(&data, &descriptor, &options, &mut first).unwrap();
    compare(&data, &descriptor, &options, &mut second).unwrap();
    assert_eq!(first.analyses(), second.analyses());

    let table = &first.analyses()["revenue"][&TestKind::PermutationTest];
    assert_eq!(table.number(0, "permutations"), Some(300.0));
    let p = table.number(0, "p-value").unwrap();
    assert!((0.0..=1.0).contains(&p));
}

#[test]
fn test_analyses_fully_replaced() {
    let (data, descriptor) = dataset(&[10.0, 11.0], &[1.0, 1.0], 30);
    let mut log = DiagnosticLog::new();
    compare(&data, &descriptor, &CompareOptions::default(), &mut log).unwrap();
    assert!(log.analyses()["revenue"].contains_key(&TestKind::TTest));

    let options = CompareOptions::default()
        .with_parametric(Parametric::Permute)
        .with_seed(1);
    compare(&data, &descriptor, &options, &mut log).unwrap();
    let tables = &log.analyses()["revenue"];
    assert!(!tables.contains_key(&TestKind::TTest));
    assert!(tables.contains_key(&TestKind::PermutationTest));
}

#[test]
fn test_invalid_alpha_rejected_before_computation() {
    let (data, descriptor) = dataset(&[10.0, 11.0], &[1.0, 1.0], 10);
    let mut log = DiagnosticLog::new();
    let options = CompareOptions {
        alpha: -0.1,
        ..Default::default()
    };
    assert!(matches!(
        compare(&data, &descriptor, &options, &mut log),
        Err(ExperimentError::Configuration(_))
    ));
}

#[test]
fn test_unknown_metric_rejected() {
    let (data, descriptor) = dataset(&[10.0, 11.0], &[1.0, 1.0], 10);
    let mut log = DiagnosticLog::new();
    let options = CompareOptions::default().with_metrics(["clicks"]);
    assert!(matches!(
        compare(&data, &descriptor, &options, &mut log),
        Err(ExperimentError::MissingColumn(_))
    ));
}
