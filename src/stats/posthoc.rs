// Pairwise post-hoc contrasts: Tukey HSD and Games-Howell

use super::{cohen_d, mean, ptukey, variance};
use crate::error::{ExperimentError, Result};
use crate::table::{ResultTable, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostHocMethod {
    TukeyHsd,
    GamesHowell,
}

/// One pairwise contrast A - B
#[derive(Debug, Clone)]
pub struct Contrast {
    pub a: String,
    pub b: String,
    pub mean_a: f64,
    pub mean_b: f64,
    pub diff: f64,
    pub se: f64,
    pub t: f64,
    pub df: f64,
    pub pvalue: f64,
    pub cohen_d: f64,
}

/// All pairwise contrasts, in (i, j) order with i < j over the input groups
#[derive(Debug, Clone)]
pub struct PostHocResult {
    pub method: PostHocMethod,
    pub contrasts: Vec<Contrast>,
}

impl PostHocResult {
    pub fn raw_table(&self) -> ResultTable {
        let mut columns = vec!["A", "B", "mean(A)", "mean(B)", "diff", "se", "T"];
        if self.method == PostHocMethod::GamesHowell {
            columns.push("df");
        }
        columns.extend(["p-tukey", "cohen"]);

        let mut table = ResultTable::new(columns);
        for c in &self.contrasts {
            let mut row: Vec<Value> = vec![
                c.a.as_str().into(),
                c.b.as_str().into(),
                c.mean_a.into(),
                c.mean_b.into(),
                c.diff.into(),
                c.se.into(),
                c.t.into(),
            ];
            if self.method == PostHocMethod::GamesHowell {
                row.push(c.df.into());
            }
            row.push(c.pvalue.into());
            row.push(c.cohen_d.into());
            table.push_row(row);
        }
        table
    }
}

/// Upper tail of the studentized range at sqrt(2) * |t|
fn range_pvalue(t: f64, k: f64, df: f64) -> Result<f64> {
    let cdf = ptukey(std::f64::consts::SQRT_2 * t.abs(), 1.0, k, df);
    if cdf.is_nan() {
        return Err(ExperimentError::stats(format!(
            "studentized range undefined for k = {}, df = {:.2}",
            k, df
        )));
    }
    Ok((1.0 - cdf).clamp(0.0, 1.0))
}

fn check_groups(groups: &[(&str, &[f64])]) -> Result<()> {
    if groups.len() < 2 {
        return Err(ExperimentError::stats(
            "post-hoc contrasts require at least 2 groups",
        ));
    }
    if let Some((label, _)) = groups.iter().find(|(_, v)| v.len() < 2) {
        return Err(ExperimentError::stats(format!(
            "group '{}' needs at least 2 observations for post-hoc contrasts",
            label
        )));
    }
    Ok(())
}

fn pairs(k: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..k).flat_map(move |i| (i + 1..k).map(move |j| (i, j)))
}

/// Tukey's honestly significant difference (equal variances)
pub fn tukey_hsd(groups: &[(&str, &[f64])]) -> Result<PostHocResult> {
    check_groups(groups)?;

    let k = groups.len();
    let n_total: usize = groups.iter().map(|(_, v)| v.len()).sum();
    let means: Vec<f64> = groups.iter().map(|(_, v)| mean(v)).collect();
    let ss_within: f64 = groups
        .iter()
        .zip(&means)
        .map(|((_, v), m)| v.iter().map(|x| (x - m).powi(2)).sum::<f64>())
        .sum();
    let df = (n_total - k) as f64;
    let mse = ss_within / df;

    let mut contrasts = Vec::with_capacity(k * (k - 1) / 2);
    for (i, j) in pairs(k) {
        let (ni, nj) = (groups[i].1.len() as f64, groups[j].1.len() as f64);
        let diff = means[i] - means[j];
        let se = (mse * (1.0 / ni + 1.0 / nj)).sqrt();
        let t = diff / se;
        let pvalue = if t.is_nan() { 1.0 } else { range_pvalue(t, k as f64, df)? };

        contrasts.push(Contrast {
            a: groups[i].0.to_string(),
            b: groups[j].0.to_string(),
            mean_a: means[i],
            mean_b: means[j],
            diff,
            se,
            t,
            df,
            pvalue,
            cohen_d: cohen_d(groups[i].1, groups[j].1, false),
        });
    }

    Ok(PostHocResult {
        method: PostHocMethod::TukeyHsd,
        contrasts,
    })
}

/// Games-Howell contrasts (unequal variances, Welch degrees of freedom)
pub fn games_howell(groups: &[(&str, &[f64])]) -> Result<PostHocResult> {
    check_groups(groups)?;

    let k = groups.len();
    let means: Vec<f64> = groups.iter().map(|(_, v)| mean(v)).collect();
    let vars: Vec<f64> = groups.iter().map(|(_, v)| variance(v)).collect();

    let mut contrasts = Vec::with_capacity(k * (k - 1) / 2);
    for (i, j) in pairs(k) {
        let (ni, nj) = (groups[i].1.len() as f64, groups[j].1.len() as f64);
        let (si, sj) = (vars[i] / ni, vars[j] / nj);
        let diff = means[i] - means[j];
        let se = (si + sj).sqrt();
        let t = diff / se;
        let df = (si + sj).powi(2) / (si.powi(2) / (ni - 1.0) + sj.powi(2) / (nj - 1.0));

        let pvalue = if t.is_nan() || df.is_nan() {
            1.0
        } else if df < 2.0 {
            return Err(ExperimentError::stats(format!(
                "Games-Howell degrees of freedom too small ({:.2}) for {} vs {}",
                df, groups[i].0, groups[j].0
            )));
        } else {
            range_pvalue(t, k as f64, df)?
        };

        contrasts.push(Contrast {
            a: groups[i].0.to_string(),
            b: groups[j].0.to_string(),
            mean_a: means[i],
            mean_b: means[j],
            diff,
            se,
            t,
            df,
            pvalue,
            cohen_d: cohen_d(groups[i].1, groups[j].1, false),
        });
    }

    Ok(PostHocResult {
        method: PostHocMethod::GamesHowell,
        contrasts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_groups() -> Vec<(&'static str, Vec<f64>)> {
        vec![
            ("control", vec![10.0, 11.0, 9.0, 10.5, 9.5, 10.0]),
            ("test1", vec![10.2, 10.8, 9.4, 10.1, 9.9, 10.4]),
            ("test2", vec![15.0, 16.0, 14.0, 15.5, 14.5, 15.0]),
        ]
    }

    fn as_refs<'a>(groups: &'a [(&'static str, Vec<f64>)]) -> Vec<(&'static str, &'a [f64])> {
        groups.iter().map(|(l, v)| (*l, v.as_slice())).collect()
    }

    #[test]
    fn test_tukey_contrast_count_and_order() {
        let groups = three_groups();
        let result = tukey_hsd(&as_refs(&groups)).unwrap();
        assert_eq!(result.contrasts.len(), 3);
        let labels: Vec<(&str, &str)> = result
            .contrasts
            .iter()
            .map(|c| (c.a.as_str(), c.b.as_str()))
            .collect();
        assert_eq!(
            labels,
            vec![("control", "test1"), ("control", "test2"), ("test1", "test2")]
        );
    }

    #[test]
    fn test_tukey_flags_shifted_group_only() {
        let groups = three_groups();
        let result = tukey_hsd(&as_refs(&groups)).unwrap();
        assert!(result.contrasts[0].pvalue > 0.5);
        assert!(result.contrasts[1].pvalue < 0.001);
        assert!(result.contrasts[2].pvalue < 0.001);
        assert!(result.contrasts[1].diff < 0.0);
    }

    #[test]
    fn test_games_howell_reports_df() {
        let groups = three_groups();
        let result = games_howell(&as_refs(&groups)).unwrap();
        let table = result.raw_table();
        assert!(table.has_column("df"));
        assert_eq!(table.n_rows(), 3);
        assert!(result.contrasts[1].pvalue < 0.001);
    }

    #[test]
    fn test_posthoc_requires_two_observations() {
        let groups: Vec<(&str, &[f64])> = vec![("a", &[1.0]), ("b", &[1.0, 2.0])];
        assert!(tukey_hsd(&groups).is_err());
    }
}
