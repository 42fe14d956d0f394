//! Result tables and the canonical column schema
//!
//! The statistics backend reports each test in its own column vocabulary
//! (`p-unc`, `p-tukey`, `DF`, `ddof1`, `T`, `cohen`, ...). Every table that
//! reaches the diagnostic log goes through [`normalize`], which keeps the
//! columns listed in [`COLUMN_MAPPING`] and renames them to the canonical
//! schema. Columns without a mapping (`MS`, `np2`, `ddof2`, `alternative`,
//! ...) are dropped.

use serde::Serialize;
use std::fmt;

/// Backend column name → canonical column name
///
/// Several backend names collapse to the same canonical name (`DF`, `dof`
/// and `ddof1` all become `dof`); a single backend table never carries more
/// than one of them.
pub const COLUMN_MAPPING: &[(&str, &str)] = &[
    ("Source", "Source"),
    ("A", "A"),
    ("B", "B"),
    ("mean(A)", "mean(A)"),
    ("mean(B)", "mean(B)"),
    ("diff", "delta"),
    ("SS", "SS"),
    ("DF", "dof"),
    ("dof", "dof"),
    ("ddof1", "dof"),
    ("F", "f-stat"),
    ("se", "stderr"),
    ("H", "H-stat"),
    ("T", "t-stat"),
    ("U", "u-stat"),
    ("p-unc", "p-value"),
    ("p-tukey", "p-value"),
    ("p-corr", "p-value (adj)"),
    ("cohen", "effect size (d)"),
];

/// Single cell of a result table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Not applicable for this row (e.g. `F` on the `Within` row of an ANOVA)
    Missing,
}

impl Value {
    /// Numeric view of the cell, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:.3}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Missing => write!(f, "-"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Missing, Value::Float)
    }
}

/// Row-oriented table with named columns and an optional interpretation note
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl ResultTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            note: None,
        }
    }

    /// Append a row; missing trailing cells are padded with [`Value::Missing`]
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Numeric cell lookup; `None` for missing rows, columns or non-numeric cells
    pub fn number(&self, row: usize, column: &str) -> Option<f64> {
        self.get(row, column).and_then(Value::as_f64)
    }

    /// Plain-text rendering with right-aligned columns
    pub fn to_report_string(&self) -> String {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, header)| {
                cells
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(String::len)
                    .chain(std::iter::once(header.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut report = String::new();
        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:>w$}", h, w = w))
            .collect();
        report.push_str(&header.join("  "));
        report.push('\n');

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        report.push_str(&rule.join("  "));
        report.push('\n');

        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:>w$}", c, w = w))
                .collect();
            report.push_str(&line.join("  "));
            report.push('\n');
        }

        if let Some(note) = &self.note {
            report.push_str(&format!("\n{}\n", note));
        }

        report
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_report_string())
    }
}

/// Canonical name for a backend column, if the column is kept
pub fn canonical_name(backend_column: &str) -> Option<&'static str> {
    COLUMN_MAPPING
        .iter()
        .find(|(backend, _)| *backend == backend_column)
        .map(|(_, canonical)| *canonical)
}

/// Map a backend table onto the canonical schema
///
/// Keeps mapped columns in their original order, renames them and drops the
/// rest. The note travels with the table.
pub fn normalize(raw: &ResultTable) -> ResultTable {
    let kept: Vec<(usize, &'static str)> = raw
        .columns
        .iter()
        .enumerate()
        .filter_map(|(i, name)| canonical_name(name).map(|canonical| (i, canonical)))
        .collect();

    let mut table = ResultTable::new(kept.iter().map(|(_, name)| *name));
    for row in &raw.rows {
        table.push_row(
            kept.iter()
                .map(|(i, _)| row.get(*i).cloned().unwrap_or(Value::Missing))
                .collect(),
        );
    }
    table.note = raw.note.clone();
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anova_like() -> ResultTable {
        let mut raw = ResultTable::new(["Source", "SS", "DF", "MS", "F", "p-unc", "np2"]);
        raw.push_row(vec![
            "treatment".into(),
            12.5.into(),
            2usize.into(),
            6.25.into(),
            4.1.into(),
            0.02.into(),
            0.3.into(),
        ]);
        raw.push_row(vec![
            "Within".into(),
            30.0.into(),
            20usize.into(),
            1.5.into(),
        ]);
        raw
    }

    #[test]
    fn test_normalize_renames_and_drops() {
        let table = normalize(&anova_like());
        assert_eq!(
            table.columns(),
            &["Source", "SS", "dof", "f-stat", "p-value"]
        );
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.number(0, "p-value"), Some(0.02));
        assert_eq!(table.number(0, "dof"), Some(2.0));
        assert_eq!(table.get(1, "f-stat"), Some(&Value::Missing));
    }

    #[test]
    fn test_normalize_collapses_dof_aliases() {
        let mut raw = ResultTable::new(["Source", "ddof1", "ddof2", "F", "p-unc"]);
        raw.push_row(vec![
            "treatment".into(),
            2usize.into(),
            15.3.into(),
            3.0.into(),
            0.07.into(),
        ]);
        let table = normalize(&raw);
        assert_eq!(table.columns(), &["Source", "dof", "f-stat", "p-value"]);
    }

    #[test]
    fn test_normalize_keeps_note() {
        let raw = anova_like().with_note("significant");
        assert_eq!(normalize(&raw).note(), Some("significant"));
    }

    #[test]
    fn test_push_row_pads_missing_cells() {
        let mut table = ResultTable::new(["A", "B", "p-unc"]);
        table.push_row(vec!["control".into()]);
        assert_eq!(table.rows()[0].len(), 3);
        assert_eq!(table.number(0, "p-unc"), None);
    }

    #[test]
    fn test_report_string_contains_headers_and_values() {
        let report = normalize(&anova_like()).to_report_string();
        assert!(report.contains("f-stat"));
        assert!(report.contains("treatment"));
        assert!(report.contains("0.020"));
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("p-tukey"), Some("p-value"));
        assert_eq!(canonical_name("cohen"), Some("effect size (d)"));
        assert_eq!(canonical_name("np2"), None);
    }
}
