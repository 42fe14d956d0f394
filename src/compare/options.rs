// Options for group comparisons
//
// Mirrors the shape of a significance-testing config: a default, strict and
// permissive presets, and a validate() pass that runs before any statistic
// is computed.

use crate::error::{ExperimentError, Result};
use crate::stats::{PAdjust, Tail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Alternative hypothesis, A relative to B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Alternative {
    #[default]
    #[serde(rename = "two-sided")]
    TwoSided,
    #[serde(rename = "greater")]
    Greater,
    #[serde(rename = "smaller")]
    Smaller,
}

impl Alternative {
    pub fn tail(&self) -> Tail {
        match self {
            Alternative::TwoSided => Tail::TwoSided,
            Alternative::Greater => Tail::Greater,
            Alternative::Smaller => Tail::Less,
        }
    }
}

impl FromStr for Alternative {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "two-sided" => Ok(Alternative::TwoSided),
            "greater" => Ok(Alternative::Greater),
            "smaller" => Ok(Alternative::Smaller),
            other => Err(ExperimentError::config(format!(
                "alternative should be one of 'two-sided', 'greater' or 'smaller', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alternative::TwoSided => f.write_str("two-sided"),
            Alternative::Greater => f.write_str("greater"),
            Alternative::Smaller => f.write_str("smaller"),
        }
    }
}

/// Test family: parametric, rank-based, or permutation
///
/// In configuration files this is `true`, `false` or `"permute"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ParametricRepr", into = "ParametricRepr")]
pub enum Parametric {
    #[default]
    Parametric,
    NonParametric,
    Permute,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ParametricRepr {
    Flag(bool),
    Mode(String),
}

impl TryFrom<ParametricRepr> for Parametric {
    type Error = ExperimentError;

    fn try_from(repr: ParametricRepr) -> Result<Self> {
        match repr {
            ParametricRepr::Flag(true) => Ok(Parametric::Parametric),
            ParametricRepr::Flag(false) => Ok(Parametric::NonParametric),
            ParametricRepr::Mode(mode) => mode.parse(),
        }
    }
}

impl From<Parametric> for ParametricRepr {
    fn from(p: Parametric) -> Self {
        match p {
            Parametric::Parametric => ParametricRepr::Flag(true),
            Parametric::NonParametric => ParametricRepr::Flag(false),
            Parametric::Permute => ParametricRepr::Mode("permute".to_string()),
        }
    }
}

impl FromStr for Parametric {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "true" => Ok(Parametric::Parametric),
            "false" => Ok(Parametric::NonParametric),
            "permute" => Ok(Parametric::Permute),
            other => Err(ExperimentError::config(format!(
                "parametric should be boolean or \"permute\", got '{}'",
                other
            ))),
        }
    }
}

impl From<bool> for Parametric {
    fn from(flag: bool) -> Self {
        if flag {
            Parametric::Parametric
        } else {
            Parametric::NonParametric
        }
    }
}

/// Custom permutation statistic: `(a, b) -> (stat(a), stat(b), diff)`
#[derive(Clone)]
pub struct StatisticFn(Arc<dyn Fn(&[f64], &[f64]) -> (f64, f64, f64) + Send + Sync>);

impl StatisticFn {
    pub fn new(f: impl Fn(&[f64], &[f64]) -> (f64, f64, f64) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, a: &[f64], b: &[f64]) -> (f64, f64, f64) {
        (self.0)(a, b)
    }
}

impl fmt::Debug for StatisticFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatisticFn(..)")
    }
}

/// Options for [`crate::compare::compare`]
///
/// # Example
/// ```
/// use abtest::compare::CompareOptions;
///
/// let options = CompareOptions::default();
/// assert_eq!(options.alpha, 0.05);
/// assert_eq!(options.rounds, 1000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    /// Significance level for the omnibus note
    pub alpha: f64,

    /// Correction added to the t-test table (`none` leaves it out)
    pub padjust: PAdjust,

    pub alternative: Alternative,

    /// Pair observations by row order within each group
    pub paired: bool,

    /// Metrics to compare; success + learning metrics when `None`
    pub metrics: Option<Vec<String>>,

    pub parametric: Parametric,

    /// Replaces the default mean-difference permutation statistic
    #[serde(skip)]
    pub statistic: Option<StatisticFn>,

    /// Permutation rounds
    pub rounds: usize,

    /// Free-form tag describing the permutation scheme, logged with each run
    pub method: String,

    /// Permutation seed; drawn and logged when absent
    pub seed: Option<u64>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            padjust: PAdjust::None,
            alternative: Alternative::TwoSided,
            paired: false,
            metrics: None,
            parametric: Parametric::Parametric,
            statistic: None,
            rounds: 1000,
            method: "approx".to_string(),
            seed: None,
        }
    }
}

impl CompareOptions {
    /// alpha = 0.01
    pub fn strict() -> Self {
        Self {
            alpha: 0.01,
            ..Default::default()
        }
    }

    /// alpha = 0.10
    pub fn permissive() -> Self {
        Self {
            alpha: 0.10,
            ..Default::default()
        }
    }

    pub fn with_parametric(mut self, parametric: impl Into<Parametric>) -> Self {
        self.parametric = parametric.into();
        self
    }

    pub fn with_metrics<S: Into<String>>(mut self, metrics: impl IntoIterator<Item = S>) -> Self {
        self.metrics = Some(metrics.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_statistic(mut self, statistic: StatisticFn) -> Self {
        self.statistic = Some(statistic);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ExperimentError::config(format!(
                "alpha should be a proportion, got {}",
                self.alpha
            )));
        }
        if self.parametric == Parametric::Permute && self.rounds == 0 {
            return Err(ExperimentError::config(
                "permutation rounds must be at least 1",
            ));
        }
        if let Some(metrics) = &self.metrics {
            if metrics.is_empty() {
                return Err(ExperimentError::config("metric list must not be empty"));
            }
        }
        Ok(())
    }
}
