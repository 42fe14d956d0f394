//! In-memory columnar dataset
//!
//! The ingestion layer hands over a table of equal-length named columns.
//! Label columns carry the treatment and the experiment-unit identifiers,
//! numeric columns carry the metrics.

use crate::error::{ExperimentError, Result};
use crate::stats;
use crate::table::ResultTable;
use std::collections::BTreeMap;

/// Single named column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Label(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Label(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Label(_) => "label",
        }
    }

    fn retain(&mut self, keep: &[bool]) {
        match self {
            Column::Numeric(v) => {
                let mut it = keep.iter();
                v.retain(|_| it.next().copied().unwrap_or(false));
            }
            Column::Label(v) => {
                let mut it = keep.iter();
                v.retain(|_| it.next().copied().unwrap_or(false));
            }
        }
    }
}

/// Table of equal-length named columns (insertion order preserved)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<(String, Column)>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a numeric column
    pub fn with_numeric(self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.with_column(name, Column::Numeric(values))
    }

    /// Add (or replace) a label column
    pub fn with_labels<S: Into<String>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let labels = values.into_iter().map(Into::into).collect();
        self.with_column(name, Column::Label(labels))
    }

    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if let Some((_, first)) = self.columns.iter().find(|(n, _)| *n != name) {
            if first.len() != column.len() {
                return Err(ExperimentError::InvalidData(format!(
                    "column '{}' has {} rows, dataset has {}",
                    name,
                    column.len(),
                    first.len()
                )));
            }
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name, column)),
        }
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| ExperimentError::MissingColumn(name.to_string()))
    }

    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v),
            other => Err(wrong_kind(name, "numeric", other)),
        }
    }

    pub fn numeric_mut(&mut self, name: &str) -> Result<&mut Vec<f64>> {
        let column = self
            .columns
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| ExperimentError::MissingColumn(name.to_string()))?;
        match column {
            Column::Numeric(v) => Ok(v),
            other => Err(wrong_kind(name, "numeric", other)),
        }
    }

    pub fn labels(&self, name: &str) -> Result<&[String]> {
        match self.column(name)? {
            Column::Label(v) => Ok(v),
            other => Err(wrong_kind(name, "label", other)),
        }
    }

    /// Keep only the rows where `keep` is true
    pub fn retain_rows(&mut self, keep: &[bool]) -> Result<()> {
        if keep.len() != self.n_rows() {
            return Err(ExperimentError::InvalidData(format!(
                "row mask has {} entries, dataset has {} rows",
                keep.len(),
                self.n_rows()
            )));
        }
        for (_, column) in &mut self.columns {
            column.retain(keep);
        }
        Ok(())
    }

    /// Sorted distinct values of a label column
    pub fn unique_labels(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.value_counts(name)?.into_keys().collect())
    }

    /// Row count per distinct label, sorted by label
    pub fn value_counts(&self, name: &str) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for label in self.labels(name)? {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Values of `metric` split by the label column `by`, sorted by label
    pub fn split_by(&self, metric: &str, by: &str) -> Result<BTreeMap<String, Vec<f64>>> {
        let values = self.numeric(metric)?;
        let labels = self.labels(by)?;
        let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (label, value) in labels.iter().zip(values) {
            groups.entry(label.clone()).or_default().push(*value);
        }
        Ok(groups)
    }

    /// Descriptive summary of `metrics` per stratum of `by`
    ///
    /// One table per stratum; rows are metrics, columns are count, mean, std,
    /// min, 25%, 50%, 75%, max.
    pub fn describe(&self, metrics: &[String], by: &str) -> Result<BTreeMap<String, ResultTable>> {
        let strata = self.unique_labels(by)?;
        let mut summary = BTreeMap::new();

        for stratum in strata {
            let mut table = ResultTable::new([
                "metric", "count", "mean", "std", "min", "25%", "50%", "75%", "max",
            ]);
            for metric in metrics {
                let groups = self.split_by(metric, by)?;
                let values = groups.get(&stratum).map(Vec::as_slice).unwrap_or(&[]);
                let fold = |init: f64, f: fn(f64, f64) -> f64| values.iter().copied().fold(init, f);
                table.push_row(vec![
                    metric.as_str().into(),
                    values.len().into(),
                    stats::mean(values).into(),
                    stats::std_dev(values).into(),
                    fold(f64::INFINITY, f64::min).into(),
                    stats::quantile(values, 0.25).into(),
                    stats::median(values).into(),
                    stats::quantile(values, 0.75).into(),
                    fold(f64::NEG_INFINITY, f64::max).into(),
                ]);
            }
            summary.insert(stratum, table);
        }

        Ok(summary)
    }
}

fn wrong_kind(name: &str, expected: &str, found: &Column) -> ExperimentError {
    ExperimentError::InvalidData(format!(
        "column '{}' should be {}, found {}",
        name,
        expected,
        found.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new()
            .with_labels("variant", ["b", "a", "b", "a", "c"])
            .unwrap()
            .with_numeric("revenue", vec![2.0, 1.0, 4.0, 3.0, 10.0])
            .unwrap()
    }

    #[test]
    fn test_ragged_column_rejected() {
        let err = sample().with_numeric("clicks", vec![1.0, 2.0]);
        assert!(matches!(err, Err(ExperimentError::InvalidData(_))));
    }

    #[test]
    fn test_replace_column_keeps_position() {
        let data = sample().with_numeric("revenue", vec![0.0; 5]).unwrap();
        assert_eq!(data.column_names().collect::<Vec<_>>(), vec!["variant", "revenue"]);
        assert_eq!(data.numeric("revenue").unwrap(), &[0.0; 5]);
    }

    #[test]
    fn test_column_kind_checked() {
        let data = sample();
        assert!(matches!(data.numeric("variant"), Err(ExperimentError::InvalidData(_))));
        assert!(matches!(data.labels("missing"), Err(ExperimentError::MissingColumn(_))));
    }

    #[test]
    fn test_value_counts_and_unique() {
        let data = sample();
        assert_eq!(data.unique_labels("variant").unwrap(), vec!["a", "b", "c"]);
        let counts = data.value_counts("variant").unwrap();
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["c"], 1);
    }

    #[test]
    fn test_split_by_keeps_row_order() {
        let groups = sample().split_by("revenue", "variant").unwrap();
        assert_eq!(groups["a"], vec![1.0, 3.0]);
        assert_eq!(groups["b"], vec![2.0, 4.0]);
    }

    #[test]
    fn test_retain_rows() {
        let mut data = sample();
        data.retain_rows(&[true, false, true, false, true]).unwrap();
        assert_eq!(data.n_rows(), 3);
        assert_eq!(data.numeric("revenue").unwrap(), &[2.0, 4.0, 10.0]);
        assert!(data.retain_rows(&[true]).is_err());
    }

    #[test]
    fn test_describe_per_stratum() {
        let data = sample();
        let summary = data.describe(&["revenue".to_string()], "variant").unwrap();
        assert_eq!(summary.len(), 3);
        let b = &summary["b"];
        assert_eq!(b.number(0, "count"), Some(2.0));
        assert_eq!(b.number(0, "mean"), Some(3.0));
        assert_eq!(b.number(0, "min"), Some(2.0));
        assert_eq!(b.number(0, "max"), Some(4.0));
    }
}
