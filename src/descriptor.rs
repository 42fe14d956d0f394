//! Static description of an experiment read-out

use crate::dataset::Dataset;
use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};

const PROPORTION_TOLERANCE: f64 = 1e-9;

/// Which columns of the dataset play which role
///
/// Expected proportions are listed in the sorted order of the treatment
/// labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDescriptor {
    pub treatment: String,
    pub expected_proportions: Vec<f64>,
    #[serde(default)]
    pub success_metrics: Vec<String>,
    #[serde(default)]
    pub health_metrics: Vec<String>,
    #[serde(default)]
    pub learning_metrics: Vec<String>,
    pub experiment_unit: String,
}

impl ExperimentDescriptor {
    pub fn new(
        treatment: impl Into<String>,
        experiment_unit: impl Into<String>,
        expected_proportions: Vec<f64>,
    ) -> Self {
        Self {
            treatment: treatment.into(),
            expected_proportions,
            success_metrics: Vec::new(),
            health_metrics: Vec::new(),
            learning_metrics: Vec::new(),
            experiment_unit: experiment_unit.into(),
        }
    }

    pub fn with_success_metrics<S: Into<String>>(
        mut self,
        metrics: impl IntoIterator<Item = S>,
    ) -> Self {
        self.success_metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_health_metrics<S: Into<String>>(
        mut self,
        metrics: impl IntoIterator<Item = S>,
    ) -> Self {
        self.health_metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_learning_metrics<S: Into<String>>(
        mut self,
        metrics: impl IntoIterator<Item = S>,
    ) -> Self {
        self.learning_metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    /// Success followed by learning metrics (default for comparisons and
    /// outlier handling)
    pub fn default_compare_metrics(&self) -> Vec<String> {
        self.success_metrics
            .iter()
            .chain(&self.learning_metrics)
            .cloned()
            .collect()
    }

    /// Success followed by health metrics (default for transformations)
    pub fn test_metrics(&self) -> Vec<String> {
        self.success_metrics
            .iter()
            .chain(&self.health_metrics)
            .cloned()
            .collect()
    }

    pub fn all_metrics(&self) -> impl Iterator<Item = &String> {
        self.success_metrics
            .iter()
            .chain(&self.health_metrics)
            .chain(&self.learning_metrics)
    }

    /// Proportions are non-negative and sum to 1
    pub fn validate(&self) -> Result<()> {
        if self.expected_proportions.is_empty() {
            return Err(ExperimentError::config(
                "expected proportions must not be empty",
            ));
        }
        if let Some(p) = self
            .expected_proportions
            .iter()
            .find(|p| !p.is_finite() || **p < 0.0)
        {
            return Err(ExperimentError::config(format!(
                "expected proportions must be non-negative, got {}",
                p
            )));
        }
        let total: f64 = self.expected_proportions.iter().sum();
        if (total - 1.0).abs() > PROPORTION_TOLERANCE {
            return Err(ExperimentError::config(format!(
                "expected proportions must sum to 1, got {}",
                total
            )));
        }
        Ok(())
    }

    /// Declared columns exist in `data` with the right kind
    pub fn validate_against(&self, data: &Dataset) -> Result<()> {
        data.labels(&self.treatment)?;
        data.labels(&self.experiment_unit)?;
        for metric in self.all_metrics() {
            data.numeric(metric)?;
        }
        Ok(())
    }
}
