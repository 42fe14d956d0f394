//! Experiment session
//!
//! Owns the descriptor, the dataset, the diagnostic log and the checker
//! state of one read-out. Handles are the only writers of the dataset;
//! comparisons borrow it immutably.

use crate::checker::{Aggregation, AssumptionChecker, OutlierMethod};
use crate::compare::{self, CompareOptions};
use crate::dataset::Dataset;
use crate::descriptor::ExperimentDescriptor;
use crate::error::{ExperimentError, Result};
use crate::formulas::{self, Tails};
use crate::log::{ComparisonResult, DiagnosticLog};
use crate::stats;
use crate::table::ResultTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// More variants than this trigger a warning at read-out
pub const MAX_RECOMMENDED_GROUPS: usize = 7;

/// Optional bookkeeping about the experiment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentMetadata {
    pub start: Option<String>,
    pub end: Option<String>,
    pub expected_delta: Option<f64>,
    /// Share of traffic in the experiment, 0..=1
    pub roll_out_percent: Option<f64>,
}

impl ExperimentMetadata {
    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.roll_out_percent {
            if !(0.0..=1.0).contains(&p) {
                return Err(ExperimentError::config(format!(
                    "roll-out percent should be a proportion, got {}",
                    p
                )));
            }
        }
        if let Some(delta) = self.expected_delta {
            if !delta.is_finite() {
                return Err(ExperimentError::config("expected delta must be finite"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Readout {
    descriptor: ExperimentDescriptor,
    data: Dataset,
}

/// Per-metric value of a power computation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue<T> {
    pub metric: String,
    pub value: T,
}

/// Inputs and result of an achieved-power computation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerEstimate {
    pub metric: String,
    pub xmean: f64,
    pub ymean: f64,
    pub xvar: f64,
    pub yvar: f64,
    pub xn: usize,
    pub yn: usize,
    pub power: f64,
}

/// One experiment read-out
#[derive(Debug, Clone)]
pub struct Experiment {
    name: String,
    metadata: ExperimentMetadata,
    readout: Option<Readout>,
    log: DiagnosticLog,
    checker: AssumptionChecker,
}

fn no_data() -> ExperimentError {
    ExperimentError::config("no data has been read out yet; see Experiment::read_out")
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: ExperimentMetadata::default(),
            readout: None,
            log: DiagnosticLog::new(),
            checker: AssumptionChecker::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: ExperimentMetadata) -> Result<Self> {
        metadata.validate()?;
        self.metadata = metadata;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &ExperimentMetadata {
        &self.metadata
    }

    /// Attach a dataset and its descriptor
    ///
    /// Validates the pair, then resets the log and the checker state.
    pub fn read_out(&mut self, descriptor: ExperimentDescriptor, data: Dataset) -> Result<()> {
        descriptor.validate()?;
        descriptor.validate_against(&data)?;

        let n_groups = data.unique_labels(&descriptor.treatment)?.len();
        if n_groups > MAX_RECOMMENDED_GROUPS {
            warn!(
                n_groups,
                "more than {} variants detected; are you sure you want to proceed?",
                MAX_RECOMMENDED_GROUPS
            );
        }

        let n_units = data.unique_labels(&descriptor.experiment_unit)?.len();
        if n_units < data.n_rows() {
            warn!(
                rows = data.n_rows(),
                units = n_units,
                "experiment units repeat; most tests assume independent observations"
            );
        }

        let n_test_metrics = descriptor.success_metrics.len() + descriptor.health_metrics.len();
        if n_test_metrics > 2 {
            warn!(
                n_test_metrics,
                "more than two test metrics (success + health) inflate the false positive rate"
            );
        }

        info!(
            experiment = self.name.as_str(),
            rows = data.n_rows(),
            groups = n_groups,
            "experiment data read out"
        );

        self.readout = Some(Readout { descriptor, data });
        self.log.reset();
        self.checker = AssumptionChecker::new();
        Ok(())
    }

    fn readout(&self) -> Result<&Readout> {
        self.readout.as_ref().ok_or_else(no_data)
    }

    pub fn data(&self) -> Result<&Dataset> {
        Ok(&self.readout()?.data)
    }

    pub fn descriptor(&self) -> Result<&ExperimentDescriptor> {
        Ok(&self.readout()?.descriptor)
    }

    /// Sorted variant labels
    pub fn groups(&self) -> Result<Vec<String>> {
        let r = self.readout()?;
        r.data.unique_labels(&r.descriptor.treatment)
    }

    pub fn n_groups(&self) -> Result<usize> {
        Ok(self.groups()?.len())
    }

    pub fn sample_size(&self) -> Result<usize> {
        Ok(self.readout()?.data.n_rows())
    }

    pub fn get_log(&self) -> &DiagnosticLog {
        &self.log
    }

    pub fn status_report(&self, detailed: bool) -> String {
        self.log.to_report_string(detailed)
    }

    pub fn check_group_balance(&mut self) -> Result<()> {
        let r = self.readout.as_ref().ok_or_else(no_data)?;
        self.checker
            .check_group_balance(&r.data, &r.descriptor, &mut self.log)
    }

    pub fn check_crossover(&mut self) -> Result<()> {
        let r = self.readout.as_ref().ok_or_else(no_data)?;
        self.checker
            .check_crossover(&r.data, &r.descriptor, &mut self.log)
    }

    /// Metrics default to success + learning, aggregations to the mean
    pub fn check_outliers(
        &mut self,
        is_outlier: &[bool],
        metrics: Option<&[String]>,
        aggregations: &[Aggregation],
    ) -> Result<()> {
        let r = self.readout.as_ref().ok_or_else(no_data)?;
        let metrics = metrics
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| r.descriptor.default_compare_metrics());
        self.checker
            .check_outliers(&r.data, &mut self.log, is_outlier, &metrics, aggregations)
    }

    pub fn handle_crossover(&mut self, threshold: f64, force: bool) -> Result<()> {
        let r = self.readout.as_mut().ok_or_else(no_data)?;
        self.checker
            .handle_crossover(&mut r.data, &r.descriptor, &mut self.log, threshold, force)
    }

    pub fn handle_outliers(
        &mut self,
        method: OutlierMethod,
        is_outlier: Option<&[bool]>,
        metrics: Option<&[String]>,
    ) -> Result<()> {
        let r = self.readout.as_mut().ok_or_else(no_data)?;
        self.checker.handle_outliers(
            &mut r.data,
            &r.descriptor,
            &mut self.log,
            method,
            is_outlier,
            metrics,
        )
    }

    /// Run the comparison and store it as the log's `analyses`
    pub fn compare(&mut self, options: &CompareOptions) -> Result<&ComparisonResult> {
        let r = self.readout.as_ref().ok_or_else(no_data)?;
        compare::compare(&r.data, &r.descriptor, options, &mut self.log)
    }

    /// Apply `f` to each metric in place; metrics default to success + health
    pub fn transform_metrics<F>(
        &mut self,
        metrics: Option<&[String]>,
        name: &str,
        f: F,
    ) -> Result<()>
    where
        F: Fn(f64) -> f64,
    {
        let r = self.readout.as_mut().ok_or_else(no_data)?;
        let metrics = metrics
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| r.descriptor.test_metrics());
        for metric in &metrics {
            r.data.numeric(metric)?;
        }

        for metric in &metrics {
            for value in r.data.numeric_mut(metric)?.iter_mut() {
                *value = f(*value);
            }
            self.log.record_transformation(metric, name);
        }
        info!(transformation = name, metrics = ?metrics, "metrics transformed");
        Ok(())
    }

    /// `ln(x + offset)` on each metric
    pub fn transform_metrics_log(&mut self, metrics: Option<&[String]>, offset: f64) -> Result<()> {
        if !offset.is_finite() || offset < 0.0 {
            return Err(ExperimentError::config(format!(
                "log offset should be a non-negative number, got {}",
                offset
            )));
        }

        let r = self.readout()?;
        let targets = metrics
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| r.descriptor.test_metrics());
        for metric in &targets {
            if let Some(v) = r.data.numeric(metric)?.iter().find(|v| **v + offset <= 0.0) {
                return Err(ExperimentError::InvalidData(format!(
                    "log undefined for '{}': value {} with offset {}",
                    metric, v, offset
                )));
            }
        }

        let name = format!("log(x + {})", offset);
        self.transform_metrics(Some(&targets), &name, |x| (x + offset).ln())
    }

    /// Control (first group) and the smallest test group
    fn power_groups(&self) -> Result<(String, String)> {
        let r = self.readout()?;
        let counts = r.data.value_counts(&r.descriptor.treatment)?;
        let mut groups = counts.iter();
        let (control, _) = groups.next().ok_or_else(|| {
            ExperimentError::InvalidData("dataset has no variants".to_string())
        })?;
        let (smallest, _) = groups.min_by_key(|(_, n)| **n).ok_or_else(|| {
            ExperimentError::InvalidData("dataset has a single variant".to_string())
        })?;
        Ok((control.clone(), smallest.clone()))
    }

    fn power_inputs(&self, metrics: Option<&[String]>) -> Result<Vec<PowerEstimate>> {
        let r = self.readout()?;
        let (control, test) = self.power_groups()?;
        let metrics = metrics
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| r.descriptor.default_compare_metrics());

        metrics
            .into_iter()
            .map(|metric| {
                let groups = r.data.split_by(&metric, &r.descriptor.treatment)?;
                let empty = Vec::new();
                let x = groups.get(&control).unwrap_or(&empty);
                let y = groups.get(&test).unwrap_or(&empty);
                Ok(PowerEstimate {
                    metric,
                    xmean: stats::mean(x),
                    ymean: stats::mean(y),
                    xvar: stats::variance(x),
                    yvar: stats::variance(y),
                    xn: x.len(),
                    yn: y.len(),
                    power: f64::NAN,
                })
            })
            .collect()
    }

    /// Minimum detectable effect per metric, control vs. the smallest test group
    pub fn mde(
        &self,
        metrics: Option<&[String]>,
        alpha: f64,
        power: f64,
        tails: Tails,
    ) -> Result<Vec<MetricValue<f64>>> {
        self.power_inputs(metrics)?
            .into_iter()
            .map(|p| {
                let value = formulas::mde(p.xvar, p.yvar, p.xn, p.yn, alpha, power, tails)?;
                Ok(MetricValue {
                    metric: p.metric,
                    value,
                })
            })
            .collect()
    }

    /// Sample size per group needed to detect the observed difference
    pub fn required_n(
        &self,
        metrics: Option<&[String]>,
        alpha: f64,
        power: f64,
        tails: Tails,
    ) -> Result<Vec<MetricValue<u64>>> {
        self.power_inputs(metrics)?
            .into_iter()
            .map(|p| {
                let value =
                    formulas::required_n(p.xmean, p.ymean, p.xvar, p.yvar, alpha, power, tails)?;
                Ok(MetricValue {
                    metric: p.metric,
                    value,
                })
            })
            .collect()
    }

    /// Achieved power per metric at the observed sizes and difference
    pub fn actual_power(
        &self,
        metrics: Option<&[String]>,
        alpha: f64,
        tails: Tails,
    ) -> Result<Vec<PowerEstimate>> {
        self.power_inputs(metrics)?
            .into_iter()
            .map(|mut p| {
                p.power = formulas::actual_power(
                    p.xmean, p.ymean, p.xvar, p.yvar, p.xn, p.yn, alpha, tails,
                )?;
                Ok(p)
            })
            .collect()
    }

    /// Descriptive summary of every declared metric per stratum of `by`
    /// (the treatment column by default)
    pub fn describe(&self, by: Option<&str>) -> Result<BTreeMap<String, ResultTable>> {
        let r = self.readout()?;
        let by = by.unwrap_or(r.descriptor.treatment.as_str());
        let metrics: Vec<String> = r.descriptor.all_metrics().cloned().collect();
        r.data.describe(&metrics, by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Assumption;

    fn experiment() -> Experiment {
        let mut variant = Vec::new();
        let mut user = Vec::new();
        let mut revenue = Vec::new();
        let mut latency = Vec::new();
        for i in 0..40 {
            let g = i % 2;
            variant.push(if g == 0 { "control" } else { "test" });
            user.push(format!("u{}", i));
            revenue.push(10.0 + g as f64 + (i % 5) as f64 * 0.1);
            latency.push(100.0 + (i % 7) as f64);
        }
        let data = Dataset::new()
            .with_labels("variant", variant)
            .unwrap()
            .with_labels("user", user)
            .unwrap()
            .with_numeric("revenue", revenue)
            .unwrap()
            .with_numeric("latency", latency)
            .unwrap();
        let descriptor = ExperimentDescriptor::new("variant", "user", vec![0.5, 0.5])
            .with_success_metrics(["revenue"])
            .with_health_metrics(["latency"]);

        let mut experiment = Experiment::new("checkout-button");
        experiment.read_out(descriptor, data).unwrap();
        experiment
    }

    #[test]
    fn test_requires_read_out() {
        let mut experiment = Experiment::new("empty");
        assert!(matches!(
            experiment.check_group_balance(),
            Err(ExperimentError::Configuration(_))
        ));
        assert!(experiment.groups().is_err());
    }

    #[test]
    fn test_metadata_validation() {
        let bad = ExperimentMetadata {
            roll_out_percent: Some(1.5),
            ..Default::default()
        };
        assert!(Experiment::new("x").with_metadata(bad).is_err());
        let ok = ExperimentMetadata {
            roll_out_percent: Some(0.2),
            start: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        assert!(Experiment::new("x").with_metadata(ok).is_ok());
    }

    #[test]
    fn test_accessors() {
        let experiment = experiment();
        assert_eq!(experiment.groups().unwrap(), vec!["control", "test"]);
        assert_eq!(experiment.n_groups().unwrap(), 2);
        assert_eq!(experiment.sample_size().unwrap(), 40);
        assert_eq!(experiment.name(), "checkout-button");
    }

    #[test]
    fn test_read_out_resets_log() {
        let mut experiment = experiment();
        experiment.check_group_balance().unwrap();
        assert!(experiment.get_log().status(Assumption::GroupBalance).checked);

        let descriptor = experiment.descriptor().unwrap().clone();
        let data = experiment.data().unwrap().clone();
        experiment.read_out(descriptor, data).unwrap();
        assert!(!experiment.get_log().status(Assumption::GroupBalance).checked);
    }

    #[test]
    fn test_read_out_rejects_bad_descriptor() {
        let data = experiment().data().unwrap().clone();
        let descriptor = ExperimentDescriptor::new("variant", "user", vec![0.7, 0.7]);
        let mut experiment = Experiment::new("bad");
        assert!(experiment.read_out(descriptor, data).is_err());
    }

    #[test]
    fn test_transform_metrics_log() {
        let mut experiment = experiment();
        experiment.transform_metrics_log(None, 1.0).unwrap();

        let revenue = experiment.data().unwrap().numeric("revenue").unwrap();
        assert!((revenue[0] - 11.0_f64.ln()).abs() < 1e-12);
        let transformations = experiment.get_log().transformations();
        assert_eq!(transformations["revenue"], "log(x + 1)");
        assert_eq!(transformations["latency"], "log(x + 1)");
    }

    #[test]
    fn test_transform_metrics_log_rejects_negative_offset() {
        let mut experiment = experiment();
        assert!(matches!(
            experiment.transform_metrics_log(None, -1.0),
            Err(ExperimentError::Configuration(_))
        ));
    }

    #[test]
    fn test_custom_transformation() {
        let mut experiment = experiment();
        let metrics = ["latency".to_string()];
        experiment
            .transform_metrics(Some(&metrics), "ms to s", |x| x / 1000.0)
            .unwrap();
        let latency = experiment.data().unwrap().numeric("latency").unwrap();
        assert!((latency[0] - 0.1).abs() < 1e-12);
        assert!(!experiment.get_log().transformations().contains_key("revenue"));
    }

    #[test]
    fn test_power_analysis() {
        let experiment = experiment();
        let mde = experiment.mde(None, 0.05, 0.8, Tails::TwoSided).unwrap();
        assert_eq!(mde.len(), 1);
        assert_eq!(mde[0].metric, "revenue");
        assert!(mde[0].value > 0.0 && mde[0].value < 1.0);

        let n = experiment
            .required_n(None, 0.05, 0.8, Tails::TwoSided)
            .unwrap();
        assert!(n[0].value >= 1);

        let power = experiment.actual_power(None, 0.05, Tails::TwoSided).unwrap();
        assert_eq!(power[0].xn, 20);
        assert!(power[0].power > 0.99);
    }

    #[test]
    fn test_describe_by_treatment() {
        let summary = experiment().describe(None).unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary["control"].n_rows(), 2);
    }

    #[test]
    fn test_status_report_lists_assumptions() {
        let mut experiment = experiment();
        experiment.check_crossover().unwrap();
        let report = experiment.status_report(false);
        assert!(report.contains("crossover"));
        assert!(report.contains("group_balance"));
    }
}
