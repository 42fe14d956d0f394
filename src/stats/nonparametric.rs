// Rank-based tests: Mann-Whitney U and Kruskal-Wallis H

use super::{chi2_pvalue, cohen_d, z_pvalue, Tail};
use crate::error::{ExperimentError, Result};
use crate::table::ResultTable;

/// Average ranks (1-based) of the pooled values; ties share their mean rank
///
/// Also returns the tie term `sum(t^3 - t)` over tie groups.
fn rank_with_ties(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // positions i..j (0-based) share ranks i+1..=j
        let avg = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg;
        }
        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }

    (ranks, tie_term)
}

/// Mann-Whitney U (normal approximation with tie and continuity corrections)
#[derive(Debug, Clone)]
pub struct MannWhitneyResult {
    pub tail: Tail,
    /// U statistic of the first sample
    pub u: f64,
    pub pvalue: f64,
    pub cohen_d: f64,
}

impl MannWhitneyResult {
    pub fn raw_table(&self, a: &str, b: &str, adjusted: Option<f64>) -> ResultTable {
        let mut columns = vec!["A", "B", "U", "alternative", "p-unc"];
        if adjusted.is_some() {
            columns.push("p-corr");
        }
        columns.push("cohen");

        let mut row = vec![
            a.into(),
            b.into(),
            self.u.into(),
            super::parametric::tail_label(self.tail).into(),
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

pub fn mann_whitney_u(a: &[f64], b: &[f64], tail: Tail) -> Result<MannWhitneyResult> {
    if a.is_empty() || b.is_empty() {
        return Err(ExperimentError::stats(
            "Mann-Whitney U requires two non-empty samples",
        ));
    }

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let pooled: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, tie_term) = rank_with_ties(&pooled);

    let rank_sum_a: f64 = ranks[..a.len()].iter().sum();
    let u1 = rank_sum_a - n1 * (n1 + 1.0) / 2.0;
    let u2 = n1 * n2 - u1;

    let n = n1 + n2;
    let mu = n1 * n2 / 2.0;
    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();
    if sigma <= 0.0 || sigma.is_nan() {
        return Err(ExperimentError::stats(
            "Mann-Whitney U undefined: all values are tied",
        ));
    }

    let u_for_tail = match tail {
        Tail::TwoSided => u1.max(u2),
        Tail::Greater => u1,
        Tail::Less => u2,
    };
    let z = (u_for_tail - mu - 0.5) / sigma;
    let pvalue = match tail {
        Tail::TwoSided => z_pvalue(z, Tail::TwoSided)?,
        Tail::Greater | Tail::Less => z_pvalue(z, Tail::Greater)?,
    };

    Ok(MannWhitneyResult {
        tail,
        u: u1,
        pvalue: pvalue.clamp(0.0, 1.0),
        cohen_d: cohen_d(a, b, false),
    })
}

/// Kruskal-Wallis H test
#[derive(Debug, Clone)]
pub struct KruskalResult {
    pub h: f64,
    pub df: usize,
    pub pvalue: f64,
}

impl KruskalResult {
    pub fn raw_table(&self, source: &str) -> ResultTable {
        let mut table = ResultTable::new(["Source", "ddof1", "H", "p-unc"]);
        table.push_row(vec![
            source.into(),
            self.df.into(),
            self.h.into(),
            self.pvalue.into(),
        ]);
        table
    }
}

pub fn kruskal(groups: &[&[f64]]) -> Result<KruskalResult> {
    if groups.len() < 2 {
        return Err(ExperimentError::stats(
            "Kruskal-Wallis requires at least 2 groups",
        ));
    }
    if groups.iter().any(|g| g.is_empty()) {
        return Err(ExperimentError::stats(
            "Kruskal-Wallis requires non-empty groups",
        ));
    }

    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = pooled.len() as f64;
    let (ranks, tie_term) = rank_with_ties(&pooled);

    let mut h = 0.0;
    let mut offset = 0;
    for g in groups {
        let rank_sum: f64 = ranks[offset..offset + g.len()].iter().sum();
        h += rank_sum * rank_sum / g.len() as f64;
        offset += g.len();
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    let correction = 1.0 - tie_term / (n * n * n - n);
    if correction <= 0.0 {
        return Err(ExperimentError::stats(
            "Kruskal-Wallis undefined: all values are tied",
        ));
    }
    h /= correction;

    let df = groups.len() - 1;
    Ok(KruskalResult {
        h,
        df,
        pvalue: chi2_pvalue(h, df as f64)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_with_ties() {
        let (ranks, tie_term) = rank_with_ties(&[3.0, 1.0, 3.0, 2.0]);
        assert_eq!(ranks, vec![3.5, 1.0, 3.5, 2.0]);
        assert_eq!(tie_term, 6.0);
    }

    #[test]
    fn test_mann_whitney_separated_samples() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let b = [11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0];
        let result = mann_whitney_u(&a, &b, Tail::TwoSided).unwrap();
        assert_eq!(result.u, 0.0);
        assert!(result.pvalue < 0.01);

        let less = mann_whitney_u(&a, &b, Tail::Less).unwrap();
        let greater = mann_whitney_u(&a, &b, Tail::Greater).unwrap();
        assert!(less.pvalue < 0.01);
        assert!(greater.pvalue > 0.99);
    }

    #[test]
    fn test_mann_whitney_all_tied() {
        assert!(mann_whitney_u(&[1.0, 1.0], &[1.0, 1.0], Tail::TwoSided).is_err());
    }

    #[test]
    fn test_kruskal_detects_shift() {
        let g1 = [1.0, 2.0, 3.0, 4.0, 5.0];
        let g2 = [6.0, 7.0, 8.0, 9.0, 10.0];
        let g3 = [11.0, 12.0, 13.0, 14.0, 15.0];
        let result = kruskal(&[&g1, &g2, &g3]).unwrap();
        // no ties: H = 12/(15*16) * (15^2 + 40^2 + 65^2)/5 - 48 = 12.5
        assert!((result.h - 12.5).abs() < 1e-9);
        assert_eq!(result.df, 2);
        assert!(result.pvalue < 0.01);
    }

    #[test]
    fn test_kruskal_same_distribution() {
        let g1 = [1.0, 4.0, 7.0];
        let g2 = [2.0, 5.0, 8.0];
        let g3 = [3.0, 6.0, 9.0];
        let result = kruskal(&[&g1, &g2, &g3]).unwrap();
        assert!(result.pvalue > 0.5);
    }
}
