//! Diagnostic log of a read-out
//!
//! One record per assumption (status plus assumption-specific diagnostics),
//! the metric transformations applied so far and the last comparison result.
//! The log serializes to JSON for audit export and renders as plain text for
//! the terminal.

use crate::checker::OutlierMethod;
use crate::table::ResultTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Prerequisites checked before comparing groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Assumption {
    GroupBalance,
    Crossover,
    Outliers,
}

impl Assumption {
    pub const ALL: [Assumption; 3] = [
        Assumption::GroupBalance,
        Assumption::Crossover,
        Assumption::Outliers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Assumption::GroupBalance => "group_balance",
            Assumption::Crossover => "crossover",
            Assumption::Outliers => "outliers",
        }
    }

    pub fn statement(&self) -> &'static str {
        match self {
            Assumption::GroupBalance => "group sizes follow the pre-defined proportions",
            Assumption::Crossover => "each experiment unit is exposed to a single variant",
            Assumption::Outliers => "depends on the outlier definition in use",
        }
    }

    pub fn info(&self) -> &'static str {
        match self {
            Assumption::GroupBalance => {
                "proportions that deviate from the pre-defined ones point to randomisation issues"
            }
            Assumption::Crossover => {
                "units exposed to several variants may bias the average treatment effect"
            }
            Assumption::Outliers => {
                "careful outlier handling usually increases statistical power"
            }
        }
    }
}

impl fmt::Display for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one assumption: unchecked → checked → handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub checked: bool,
    /// `None` until checked (and for outliers, which have no pass criterion)
    pub passed: Option<bool>,
    pub handled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupBalanceDiagnostics {
    pub groups: Vec<String>,
    /// Observed shares, 3 decimals
    pub observed: Vec<f64>,
    pub expected: Vec<f64>,
    /// expected - observed, 3 decimals
    pub differences: Vec<f64>,
    pub test: &'static str,
    pub statistic: f64,
    pub pvalue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossoverDiagnostics {
    pub cases: usize,
    /// Share of unique units that crossed over, in percent
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutlierDiagnostics {
    /// Per-stratum aggregates (`Outliers`, `Regulars`, `(delta)`)
    pub stats: Option<ResultTable>,
    pub method: Option<OutlierMethod>,
    pub affected_metrics: Vec<String>,
    pub affected_units: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Diagnostics {
    GroupBalance(GroupBalanceDiagnostics),
    Crossover(CrossoverDiagnostics),
    Outliers(OutlierDiagnostics),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssumptionRecord {
    pub assumption: &'static str,
    pub info: &'static str,
    pub status: Status,
    pub diagnostics: Option<Diagnostics>,
}

impl AssumptionRecord {
    fn new(assumption: Assumption) -> Self {
        Self {
            assumption: assumption.statement(),
            info: assumption.info(),
            status: Status::default(),
            diagnostics: None,
        }
    }
}

/// Kind of table stored per metric in a comparison result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TestKind {
    #[serde(rename = "t-test")]
    TTest,
    #[serde(rename = "anova")]
    Anova,
    #[serde(rename = "post_hoc")]
    PostHoc,
    #[serde(rename = "permutation-test")]
    PermutationTest,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestKind::TTest => "t-test",
            TestKind::Anova => "anova",
            TestKind::PostHoc => "post_hoc",
            TestKind::PermutationTest => "permutation-test",
        };
        f.write_str(name)
    }
}

/// metric → test kind → normalized table
pub type ComparisonResult = BTreeMap<String, BTreeMap<TestKind, ResultTable>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticLog {
    assumptions: BTreeMap<Assumption, AssumptionRecord>,
    transformations: BTreeMap<String, String>,
    analyses: ComparisonResult,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self {
            assumptions: Assumption::ALL
                .iter()
                .map(|a| (*a, AssumptionRecord::new(*a)))
                .collect(),
            transformations: BTreeMap::new(),
            analyses: ComparisonResult::new(),
        }
    }

    /// Record of a single assumption
    pub fn section(&self, assumption: Assumption) -> &AssumptionRecord {
        // every assumption is inserted by `new`
        &self.assumptions[&assumption]
    }

    pub fn status(&self, assumption: Assumption) -> Status {
        self.section(assumption).status
    }

    pub fn diagnostics(&self, assumption: Assumption) -> Option<&Diagnostics> {
        self.section(assumption).diagnostics.as_ref()
    }

    pub fn transformations(&self) -> &BTreeMap<String, String> {
        &self.transformations
    }

    pub fn analyses(&self) -> &ComparisonResult {
        &self.analyses
    }

    fn section_mut(&mut self, assumption: Assumption) -> &mut AssumptionRecord {
        self.assumptions
            .entry(assumption)
            .or_insert_with(|| AssumptionRecord::new(assumption))
    }

    /// Overwrite an assumption with a fresh check (resets `handled`)
    pub(crate) fn record_check(
        &mut self,
        assumption: Assumption,
        passed: Option<bool>,
        diagnostics: Diagnostics,
    ) {
        let record = self.section_mut(assumption);
        record.status = Status {
            checked: true,
            passed,
            handled: false,
        };
        record.diagnostics = Some(diagnostics);
    }

    pub(crate) fn mark_handled(&mut self, assumption: Assumption) {
        self.section_mut(assumption).status.handled = true;
    }

    /// Update the outlier diagnostics, starting from an empty record when the
    /// handle ran without a check
    pub(crate) fn update_outlier_diagnostics(
        &mut self,
        update: impl FnOnce(&mut OutlierDiagnostics),
    ) {
        let record = self.section_mut(Assumption::Outliers);
        let mut diagnostics = match record.diagnostics.take() {
            Some(Diagnostics::Outliers(d)) => d,
            _ => OutlierDiagnostics::default(),
        };
        update(&mut diagnostics);
        record.diagnostics = Some(Diagnostics::Outliers(diagnostics));
    }

    pub(crate) fn record_transformation(&mut self, metric: &str, description: &str) {
        self.transformations
            .insert(metric.to_string(), description.to_string());
    }

    pub(crate) fn set_analyses(&mut self, analyses: ComparisonResult) -> &ComparisonResult {
        self.analyses = analyses;
        &self.analyses
    }

    /// Drop every record, transformation and analysis
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable status of every assumption
    ///
    /// Brief mode lists the status flags only; detailed mode adds the
    /// statement, info line and diagnostics.
    pub fn to_report_string(&self, detailed: bool) -> String {
        let mut report = String::new();

        for (assumption, record) in &self.assumptions {
            let icon = match (record.status.checked, record.status.passed, record.status.handled) {
                (_, _, true) => "🔧",
                (false, _, _) => "⏳",
                (true, Some(true), _) => "✅",
                (true, Some(false), _) => "❌",
                (true, None, _) => "ℹ️ ",
            };
            report.push_str(&format!("{} {}\n", icon, assumption));
            report.push_str(&format!(
                "  checked: {}, passed: {}, handled: {}\n",
                record.status.checked,
                record
                    .status
                    .passed
                    .map_or_else(|| "-".to_string(), |p| p.to_string()),
                record.status.handled
            ));

            if detailed {
                report.push_str(&format!("  assumption: {}\n", record.assumption));
                report.push_str(&format!("  info: {}\n", record.info));
                if let Some(diagnostics) = &record.diagnostics {
                    report.push_str(&render_diagnostics(diagnostics));
                }
            }
            report.push('\n');
        }

        if !self.transformations.is_empty() {
            report.push_str("🔁 Transformations:\n");
            for (metric, description) in &self.transformations {
                report.push_str(&format!("  {}: {}\n", metric, description));
            }
            report.push('\n');
        }

        if detailed && !self.analyses.is_empty() {
            report.push_str("📊 Analyses:\n");
            for (metric, tables) in &self.analyses {
                for (kind, table) in tables {
                    report.push_str(&format!("\n[{}] {}\n", metric, kind));
                    report.push_str(&table.to_report_string());
                }
            }
        }

        report
    }
}

fn render_diagnostics(diagnostics: &Diagnostics) -> String {
    let mut out = String::from("  diagnostics:\n");
    match diagnostics {
        Diagnostics::GroupBalance(d) => {
            out.push_str(&format!("    groups: {}\n", d.groups.join(", ")));
            out.push_str(&format!("    observed prop: {:?}\n", d.observed));
            out.push_str(&format!("    expected prop: {:?}\n", d.expected));
            out.push_str(&format!("    differences: {:?}\n", d.differences));
            out.push_str(&format!(
                "    {}: statistic={:.3}, p-value={:.3}\n",
                d.test, d.statistic, d.pvalue
            ));
        }
        Diagnostics::Crossover(d) => {
            out.push_str(&format!("    cross-over cases: {}\n", d.cases));
            out.push_str(&format!("    percent of total: {}%\n", d.percent.round()));
        }
        Diagnostics::Outliers(d) => {
            out.push_str(&format!(
                "    method: {}\n",
                d.method.map_or_else(|| "-".to_string(), |m| m.to_string())
            ));
            out.push_str(&format!(
                "    affected metrics: {}\n",
                d.affected_metrics.join(", ")
            ));
            out.push_str(&format!(
                "    number of affected units: {}\n",
                d.affected_units
                    .map_or_else(|| "-".to_string(), |n| n.to_string())
            ));
            if let Some(stats) = &d.stats {
                for line in stats.to_report_string().lines() {
                    out.push_str(&format!("    {}\n", line));
                }
            }
        }
    }
    out
}
