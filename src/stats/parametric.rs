// Parametric tests: t-tests, one-way / Welch ANOVA, Levene, chi-square GOF

use super::{chi2_pvalue, f_pvalue, mean, median, t_pvalue, variance, Tail};
use crate::error::{ExperimentError, Result};
use crate::table::{ResultTable, Value};

/// Flavour of the two-sample t-test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TTestVariant {
    /// Pooled variance (equal variances assumed)
    Student,
    /// Unequal variances, Welch-Satterthwaite degrees of freedom
    Welch,
    /// Paired observations (row i of A with row i of B)
    Paired,
}

/// Result of a two-sample t-test
#[derive(Debug, Clone)]
pub struct TTestResult {
    pub variant: TTestVariant,
    pub tail: Tail,
    pub mean_a: f64,
    pub mean_b: f64,
    pub statistic: f64,
    pub dof: f64,
    pub pvalue: f64,
    /// Cohen's d (A - B)
    pub cohen_d: f64,
}

impl TTestResult {
    /// Backend table for the contrast `a` vs `b`
    ///
    /// `adjusted` adds a `p-corr` column when a p-value correction was
    /// requested.
    pub fn raw_table(&self, a: &str, b: &str, adjusted: Option<f64>) -> ResultTable {
        let mut columns = vec![
            "Contrast",
            "A",
            "B",
            "Paired",
            "Parametric",
            "T",
            "dof",
            "alternative",
            "p-unc",
        ];
        if adjusted.is_some() {
            columns.push("p-corr");
        }
        columns.push("cohen");

        let mut row: Vec<Value> = vec![
            "treatment".into(),
            a.into(),
            b.into(),
            (self.variant == TTestVariant::Paired).into(),
            true.into(),
            self.statistic.into(),
            self.dof.into(),
            tail_label(self.tail).into(),
            self.pvalue.into(),
        ];
        if let Some(p) = adjusted {
            row.push(p.into());
        }
        row.push(self.cohen_d.into());

        let mut table = ResultTable::new(columns);
        table.push_row(row);
        table
    }
}

pub(crate) fn tail_label(tail: Tail) -> &'static str {
    match tail {
        Tail::TwoSided => "two-sided",
        Tail::Greater => "greater",
        Tail::Less => "less",
    }
}

/// Cohen's d for two samples
///
/// Independent samples use the pooled standard deviation; paired samples use
/// the square root of the average variance.
pub fn cohen_d(a: &[f64], b: &[f64], paired: bool) -> f64 {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (va, vb) = (variance(a), variance(b));
    let sd = if paired {
        ((va + vb) / 2.0).sqrt()
    } else {
        (((na - 1.0) * va + (nb - 1.0) * vb) / (na + nb - 2.0)).sqrt()
    };

    let diff = mean(a) - mean(b);
    if sd > 0.0 {
        diff / sd
    } else if diff == 0.0 {
        0.0
    } else {
        f64::INFINITY.copysign(diff)
    }
}

/// Two-sample t-test
pub fn ttest(a: &[f64], b: &[f64], variant: TTestVariant, tail: Tail) -> Result<TTestResult> {
    if a.len() < 2 || b.len() < 2 {
        return Err(ExperimentError::stats(
            "each group needs at least 2 observations for a t-test",
        ));
    }

    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (mean_a, mean_b) = (mean(a), mean(b));
    let (va, vb) = (variance(a), variance(b));

    let (statistic, dof) = match variant {
        TTestVariant::Student => {
            let pooled = ((na - 1.0) * va + (nb - 1.0) * vb) / (na + nb - 2.0);
            let se = (pooled * (1.0 / na + 1.0 / nb)).sqrt();
            ((mean_a - mean_b) / se, na + nb - 2.0)
        }
        TTestVariant::Welch => {
            let (sa, sb) = (va / na, vb / nb);
            let se = (sa + sb).sqrt();
            let dof = (sa + sb).powi(2) / (sa.powi(2) / (na - 1.0) + sb.powi(2) / (nb - 1.0));
            ((mean_a - mean_b) / se, dof)
        }
        TTestVariant::Paired => {
            if a.len() != b.len() {
                return Err(ExperimentError::InvalidData(format!(
                    "paired t-test needs groups of equal size, got {} and {}",
                    a.len(),
                    b.len()
                )));
            }
            let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
            let se = (variance(&diffs) / na).sqrt();
            (mean(&diffs) / se, na - 1.0)
        }
    };

    let pvalue = t_pvalue(statistic, dof, tail)?;

    Ok(TTestResult {
        variant,
        tail,
        mean_a,
        mean_b,
        statistic,
        dof,
        pvalue,
        cohen_d: cohen_d(a, b, variant == TTestVariant::Paired),
    })
}

/// Ratio of mean squares; `None` when both are zero
fn f_ratio(ms_between: f64, ms_within: f64) -> Option<f64> {
    if ms_within > 0.0 {
        Some(ms_between / ms_within)
    } else if ms_between > 0.0 {
        Some(f64::INFINITY)
    } else {
        None
    }
}

fn check_groups(groups: &[&[f64]], min_size: usize, test: &str) -> Result<()> {
    if groups.len() < 2 {
        return Err(ExperimentError::stats(format!(
            "{} requires at least 2 groups",
            test
        )));
    }
    if let Some(g) = groups.iter().find(|g| g.len() < min_size) {
        return Err(ExperimentError::stats(format!(
            "{} requires at least {} observations per group, got {}",
            test,
            min_size,
            g.len()
        )));
    }
    Ok(())
}

/// One-way ANOVA table (between / within)
#[derive(Debug, Clone)]
pub struct AnovaResult {
    pub ss_between: f64,
    pub ss_within: f64,
    pub df_between: usize,
    pub df_within: usize,
    pub ms_between: f64,
    pub ms_within: f64,
    pub f: f64,
    pub pvalue: f64,
    /// Partial eta squared
    pub np2: f64,
}

impl AnovaResult {
    pub fn raw_table(&self, source: &str) -> ResultTable {
        let mut table = ResultTable::new(["Source", "SS", "DF", "MS", "F", "p-unc", "np2"]);
        table.push_row(vec![
            source.into(),
            self.ss_between.into(),
            self.df_between.into(),
            self.ms_between.into(),
            self.f.into(),
            self.pvalue.into(),
            self.np2.into(),
        ]);
        table.push_row(vec![
            "Within".into(),
            self.ss_within.into(),
            self.df_within.into(),
            self.ms_within.into(),
            Value::Missing,
            Value::Missing,
            Value::Missing,
        ]);
        table
    }
}

/// Classic one-way ANOVA (equal variances assumed)
pub fn anova(groups: &[&[f64]]) -> Result<AnovaResult> {
    check_groups(groups, 1, "ANOVA")?;

    let k = groups.len();
    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    if n_total <= k {
        return Err(ExperimentError::stats(
            "not enough observations for within-group variance",
        ));
    }

    let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n_total as f64;
    let means: Vec<f64> = groups.iter().map(|g| mean(g)).collect();

    let ss_between: f64 = groups
        .iter()
        .zip(&means)
        .map(|(g, m)| g.len() as f64 * (m - grand_mean).powi(2))
        .sum();
    let ss_within: f64 = groups
        .iter()
        .zip(&means)
        .map(|(g, m)| g.iter().map(|x| (x - m).powi(2)).sum::<f64>())
        .sum();

    let df_between = k - 1;
    let df_within = n_total - k;
    let ms_between = ss_between / df_between as f64;
    let ms_within = ss_within / df_within as f64;

    let f = f_ratio(ms_between, ms_within)
        .ok_or_else(|| ExperimentError::stats("ANOVA undefined: all values are identical"))?;
    let pvalue = f_pvalue(f, df_between as f64, df_within as f64)?;

    Ok(AnovaResult {
        ss_between,
        ss_within,
        df_between,
        df_within,
        ms_between,
        ms_within,
        f,
        pvalue,
        np2: ss_between / (ss_between + ss_within),
    })
}

/// Welch's heteroskedasticity-robust one-way ANOVA
#[derive(Debug, Clone)]
pub struct WelchAnovaResult {
    pub df_between: f64,
    pub df_within: f64,
    pub f: f64,
    pub pvalue: f64,
    pub np2: f64,
}

impl WelchAnovaResult {
    pub fn raw_table(&self, source: &str) -> ResultTable {
        let mut table = ResultTable::new(["Source", "ddof1", "ddof2", "F", "p-unc", "np2"]);
        table.push_row(vec![
            source.into(),
            self.df_between.into(),
            self.df_within.into(),
            self.f.into(),
            self.pvalue.into(),
            self.np2.into(),
        ]);
        table
    }
}

pub fn welch_anova(groups: &[&[f64]]) -> Result<WelchAnovaResult> {
    check_groups(groups, 2, "Welch ANOVA")?;

    let k = groups.len() as f64;
    let ns: Vec<f64> = groups.iter().map(|g| g.len() as f64).collect();
    let means: Vec<f64> = groups.iter().map(|g| mean(g)).collect();
    let vars: Vec<f64> = groups.iter().map(|g| variance(g)).collect();

    if vars.iter().any(|v| *v <= 0.0) {
        return Err(ExperimentError::stats(
            "Welch ANOVA undefined: a group has zero variance",
        ));
    }

    let weights: Vec<f64> = ns.iter().zip(&vars).map(|(n, v)| n / v).collect();
    let w_sum: f64 = weights.iter().sum();
    let weighted_mean = weights.iter().zip(&means).map(|(w, m)| w * m).sum::<f64>() / w_sum;

    let between = weights
        .iter()
        .zip(&means)
        .map(|(w, m)| w * (m - weighted_mean).powi(2))
        .sum::<f64>()
        / (k - 1.0);
    let lambda = weights
        .iter()
        .zip(&ns)
        .map(|(w, n)| (1.0 - w / w_sum).powi(2) / (n - 1.0))
        .sum::<f64>();

    let f = between / (1.0 + 2.0 * (k - 2.0) * lambda / (k * k - 1.0));
    let df_within = (k * k - 1.0) / (3.0 * lambda);
    let pvalue = f_pvalue(f, k - 1.0, df_within)?;

    // Effect size from the classic decomposition, as in the equal-variance case
    let n_total: f64 = ns.iter().sum();
    let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n_total;
    let ss_between: f64 = ns
        .iter()
        .zip(&means)
        .map(|(n, m)| n * (m - grand_mean).powi(2))
        .sum();
    let ss_total: f64 = groups
        .iter()
        .flat_map(|g| g.iter())
        .map(|x| (x - grand_mean).powi(2))
        .sum();

    Ok(WelchAnovaResult {
        df_between: k - 1.0,
        df_within,
        f,
        pvalue,
        np2: ss_between / ss_total,
    })
}

/// Levene's test (median-centred, Brown-Forsythe variant)
#[derive(Debug, Clone)]
pub struct LeveneResult {
    pub statistic: f64,
    pub pvalue: f64,
    /// `pvalue > 0.05`
    pub equal_var: bool,
}

pub fn levene(groups: &[&[f64]]) -> Result<LeveneResult> {
    check_groups(groups, 2, "Levene's test")?;

    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let center = median(g);
            g.iter().map(|x| (x - center).abs()).collect()
        })
        .collect();

    let k = deviations.len();
    let n_total: usize = deviations.iter().map(Vec::len).sum();
    let grand_mean = deviations.iter().flatten().sum::<f64>() / n_total as f64;
    let means: Vec<f64> = deviations.iter().map(|d| mean(d)).collect();

    let ss_between: f64 = deviations
        .iter()
        .zip(&means)
        .map(|(d, m)| d.len() as f64 * (m - grand_mean).powi(2))
        .sum();
    let ss_within: f64 = deviations
        .iter()
        .zip(&means)
        .map(|(d, m)| d.iter().map(|z| (z - m).powi(2)).sum::<f64>())
        .sum();

    let df_between = (k - 1) as f64;
    let df_within = (n_total - k) as f64;

    // Identical spread in every group (including all-constant groups)
    let (statistic, pvalue) = match f_ratio(ss_between / df_between, ss_within / df_within) {
        Some(w) => (w, f_pvalue(w, df_between, df_within)?),
        None => (0.0, 1.0),
    };

    Ok(LeveneResult {
        statistic,
        pvalue,
        equal_var: pvalue > 0.05,
    })
}

/// Chi-square goodness-of-fit result
#[derive(Debug, Clone)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub pvalue: f64,
    pub df: usize,
}

/// Chi-square goodness of fit: sum((observed - expected)^2 / expected)
pub fn chisquare(observed: &[f64], expected: &[f64]) -> Result<ChiSquareResult> {
    if observed.len() != expected.len() {
        return Err(ExperimentError::stats(format!(
            "chi-square needs as many expected as observed frequencies ({} vs {})",
            expected.len(),
            observed.len()
        )));
    }
    if observed.len() < 2 {
        return Err(ExperimentError::stats(
            "chi-square requires at least 2 categories",
        ));
    }
    if expected.iter().any(|e| *e <= 0.0) {
        return Err(ExperimentError::stats(
            "expected frequencies must be positive",
        ));
    }

    let statistic: f64 = observed
        .iter()
        .zip(expected)
        .map(|(o, e)| (o - e).powi(2) / e)
        .sum();
    let df = observed.len() - 1;

    Ok(ChiSquareResult {
        statistic,
        pvalue: chi2_pvalue(statistic, df as f64)?,
        df,
    })
}
