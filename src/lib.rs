//! abtest - A/B experiment read-outs
//!
//! Checks the assumptions behind an experiment (group balance, crossover,
//! outliers), optionally repairs the dataset, and compares variants with the
//! test that fits the number of groups and the requested test family:
//! t-test or Mann-Whitney U for two groups, ANOVA with post-hoc contrasts
//! for more, or a seeded permutation test. Every check, repair and result
//! lands in a [`DiagnosticLog`] that can be rendered or exported as JSON.
//!
//! ```
//! use abtest::{CompareOptions, Dataset, Experiment, ExperimentDescriptor, TestKind};
//!
//! # fn main() -> abtest::Result<()> {
//! let data = Dataset::new()
//!     .with_labels("variant", ["control", "control", "control", "test", "test", "test"])?
//!     .with_labels("user", ["a", "b", "c", "d", "e", "f"])?
//!     .with_numeric("revenue", vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0])?;
//! let descriptor = ExperimentDescriptor::new("variant", "user", vec![0.5, 0.5])
//!     .with_success_metrics(["revenue"]);
//!
//! let mut experiment = Experiment::new("checkout");
//! experiment.read_out(descriptor, data)?;
//! experiment.check_group_balance()?;
//! let result = experiment.compare(&CompareOptions::default())?;
//! assert!(result["revenue"].contains_key(&TestKind::TTest));
//! # Ok(())
//! # }
//! ```

pub mod checker;
pub mod compare;
pub mod config;
pub mod dataset;
pub mod descriptor;
pub mod error;
pub mod experiment;
pub mod formulas;
pub mod log;
pub mod logging;
pub mod stats;
pub mod table;

pub use checker::{Aggregation, AssumptionChecker, OutlierMethod};
pub use compare::{compare, Alternative, CompareOptions, Parametric, StatisticFn};
pub use config::{CrossoverPolicy, ReadoutConfig};
pub use dataset::{Column, Dataset};
pub use descriptor::ExperimentDescriptor;
pub use error::{ExperimentError, Result};
pub use experiment::{Experiment, ExperimentMetadata, MetricValue, PowerEstimate};
pub use formulas::Tails;
pub use log::{Assumption, ComparisonResult, DiagnosticLog, Status, TestKind};
pub use stats::PAdjust;
pub use table::{ResultTable, Value};
