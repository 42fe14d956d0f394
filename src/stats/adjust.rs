// Multiple-comparison p-value corrections

use crate::error::ExperimentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// p-value correction method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PAdjust {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "bonf")]
    Bonferroni,
    #[serde(rename = "holm")]
    Holm,
    /// Benjamini-Hochberg false discovery rate
    #[serde(rename = "fdr_bh")]
    FdrBh,
}

impl FromStr for PAdjust {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PAdjust::None),
            "bonf" | "bonferroni" => Ok(PAdjust::Bonferroni),
            "holm" => Ok(PAdjust::Holm),
            "fdr_bh" => Ok(PAdjust::FdrBh),
            other => Err(ExperimentError::config(format!(
                "unknown p-value adjustment '{}' (expected none, bonf, holm or fdr_bh)",
                other
            ))),
        }
    }
}

impl fmt::Display for PAdjust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PAdjust::None => "none",
            PAdjust::Bonferroni => "bonf",
            PAdjust::Holm => "holm",
            PAdjust::FdrBh => "fdr_bh",
        };
        f.write_str(name)
    }
}

/// Adjust a family of p-values; output order matches input order
pub fn adjust_pvalues(pvalues: &[f64], method: PAdjust) -> Vec<f64> {
    let m = pvalues.len();
    if m == 0 {
        return Vec::new();
    }
    let mf = m as f64;

    match method {
        PAdjust::None => pvalues.to_vec(),
        PAdjust::Bonferroni => pvalues.iter().map(|p| (p * mf).min(1.0)).collect(),
        PAdjust::Holm => {
            let mut order: Vec<usize> = (0..m).collect();
            order.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));

            let mut adjusted = vec![0.0; m];
            let mut running_max: f64 = 0.0;
            for (rank, &idx) in order.iter().enumerate() {
                let value = ((mf - rank as f64) * pvalues[idx]).min(1.0);
                running_max = running_max.max(value);
                adjusted[idx] = running_max;
            }
            adjusted
        }
        PAdjust::FdrBh => {
            let mut order: Vec<usize> = (0..m).collect();
            order.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));

            let mut adjusted = vec![0.0; m];
            let mut running_min: f64 = 1.0;
            for (rank, &idx) in order.iter().enumerate().rev() {
                let value = pvalues[idx] * mf / (rank + 1) as f64;
                running_min = running_min.min(value);
                adjusted[idx] = running_min.min(1.0);
            }
            adjusted
        }
    }
}
