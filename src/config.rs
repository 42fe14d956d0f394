//! Read-out configuration files
//!
//! ```toml
//! [metadata]
//! roll_out_percent = 0.2
//!
//! [experiment]
//! treatment = "variant"
//! experiment_unit = "user_id"
//! expected_proportions = [0.5, 0.5]
//! success_metrics = ["revenue"]
//!
//! [compare]
//! alpha = 0.05
//! padjust = "holm"
//! parametric = true
//!
//! [crossover]
//! threshold = 0.01
//! ```

use crate::compare::CompareOptions;
use crate::descriptor::ExperimentDescriptor;
use crate::error::{ExperimentError, Result};
use crate::experiment::ExperimentMetadata;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How crossover units are handled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverPolicy {
    /// Largest tolerated share of crossover units
    pub threshold: f64,
    /// Drop crossover units even above the threshold
    pub force: bool,
}

impl Default for CrossoverPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            force: false,
        }
    }
}

/// Complete configuration of one read-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadoutConfig {
    #[serde(default)]
    pub metadata: ExperimentMetadata,
    pub experiment: ExperimentDescriptor,
    #[serde(default)]
    pub compare: CompareOptions,
    #[serde(default)]
    pub crossover: CrossoverPolicy,
}

impl ReadoutConfig {
    /// Load and validate a configuration file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use abtest::config::ReadoutConfig;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = ReadoutConfig::from_file("readout.toml")?;
    /// println!("alpha = {}", config.compare.alpha);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid read-out configuration in {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.metadata.validate()?;
        self.experiment.validate()?;
        self.compare.validate()?;
        if !(0.0..=1.0).contains(&self.crossover.threshold) {
            return Err(ExperimentError::config(format!(
                "crossover threshold should be a proportion, got {}",
                self.crossover.threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{Alternative, Parametric};
    use crate::stats::PAdjust;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
[metadata]
start = "2024-03-01"
roll_out_percent = 0.25

[experiment]
treatment = "variant"
experiment_unit = "user_id"
expected_proportions = [0.5, 0.5]
success_metrics = ["revenue"]
health_metrics = ["latency"]

[compare]
alpha = 0.01
padjust = "holm"
alternative = "greater"
parametric = "permute"
rounds = 500
seed = 7

[crossover]
threshold = 0.05
force = true
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ReadoutConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.metadata.roll_out_percent, Some(0.25));
        assert_eq!(config.experiment.treatment, "variant");
        assert_eq!(config.experiment.health_metrics, vec!["latency"]);
        assert_eq!(config.compare.alpha, 0.01);
        assert_eq!(config.compare.padjust, PAdjust::Holm);
        assert_eq!(config.compare.alternative, Alternative::Greater);
        assert_eq!(config.compare.parametric, Parametric::Permute);
        assert_eq!(config.compare.seed, Some(7));
        assert!(config.crossover.force);
    }

    #[test]
    fn test_defaults_for_optional_sections() {
        let config = ReadoutConfig::from_toml_str(
            r#"
[experiment]
treatment = "variant"
experiment_unit = "user_id"
expected_proportions = [0.5, 0.5]
"#,
        )
        .unwrap();
        let defaults = CompareOptions::default();
        assert_eq!(config.compare.alpha, defaults.alpha);
        assert_eq!(config.compare.parametric, defaults.parametric);
        assert_eq!(config.compare.rounds, defaults.rounds);
        assert_eq!(config.crossover, CrossoverPolicy::default());
        assert_eq!(config.metadata, ExperimentMetadata::default());
    }

    #[test]
    fn test_validation_failures() {
        let bad_props = CONFIG.replace("[0.5, 0.5]", "[0.5, 0.6]");
        assert!(ReadoutConfig::from_toml_str(&bad_props).is_err());

        let bad_threshold = CONFIG.replace("threshold = 0.05", "threshold = 2.0");
        let err = ReadoutConfig::from_toml_str(&bad_threshold).unwrap_err();
        assert!(err
            .downcast_ref::<ExperimentError>()
            .is_some_and(|e| matches!(e, ExperimentError::Configuration(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = ReadoutConfig::from_file(file.path()).unwrap();
        assert_eq!(config.compare.rounds, 500);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = ReadoutConfig::from_file("/nonexistent/readout.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
