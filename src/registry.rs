//! Construction of strategies from a kind tag and named numeric parameters.

use crate::error::{PipelineError, Result};
use crate::strategy::{Amplify, Multiply, Repeat, RunningAverage, Sample, Strategy, ThresholdFilter};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// The built-in strategy families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    Multiply,
    RunningAverage,
    ThresholdFilter,
    Amplify,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Multiply,
        StrategyKind::RunningAverage,
        StrategyKind::ThresholdFilter,
        StrategyKind::Amplify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Multiply => "multiply",
            StrategyKind::RunningAverage => "running-average",
            StrategyKind::ThresholdFilter => "threshold",
            StrategyKind::Amplify => "amplify",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "multiply" | "numeric" => Ok(StrategyKind::Multiply),
            "running-average" | "running_average" | "statistical" => {
                Ok(StrategyKind::RunningAverage)
            }
            "threshold" | "filtering" => Ok(StrategyKind::ThresholdFilter),
            "amplify" | "amplification" => Ok(StrategyKind::Amplify),
            _ => Err(PipelineError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Named numeric parameters for a strategy constructor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyParams {
    values: BTreeMap<String, f64>,
}

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Look up `name`, falling back to `default`. Non-finite values are rejected.
    pub fn get_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.values.get(name) {
            None => Ok(default),
            Some(value) if value.is_finite() => Ok(*value),
            Some(value) => Err(PipelineError::InvalidParameter {
                name: name.to_string(),
                reason: format!("{value} is not a finite number"),
            }),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for StrategyParams {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Builds a boxed strategy from its parameters
pub type StrategyConstructor<T> = fn(&StrategyParams) -> Result<Box<dyn Strategy<T>>>;

/// An explicit table of strategy constructors keyed by kind.
///
/// Each pipeline environment builds its own registry, so there is no
/// process-wide factory state.
pub struct StrategyRegistry<T> {
    constructors: HashMap<StrategyKind, StrategyConstructor<T>>,
}

impl<T: 'static> StrategyRegistry<T> {
    /// A registry with no kinds registered
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register or replace the constructor for `kind`
    pub fn register(&mut self, kind: StrategyKind, constructor: StrategyConstructor<T>) -> &mut Self {
        self.constructors.insert(kind, constructor);
        self
    }

    pub fn contains(&self, kind: StrategyKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Registered kinds in a stable order
    pub fn kinds(&self) -> Vec<StrategyKind> {
        let mut kinds: Vec<_> = self.constructors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Build a strategy, failing fast if `kind` is not registered
    pub fn create(&self, kind: StrategyKind, params: &StrategyParams) -> Result<Box<dyn Strategy<T>>> {
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or_else(|| PipelineError::UnknownStrategy(kind.to_string()))?;
        constructor(params)
    }

    /// Parse `kind` and build the strategy
    pub fn create_named(&self, kind: &str, params: &StrategyParams) -> Result<Box<dyn Strategy<T>>> {
        self.create(kind.parse()?, params)
    }
}

fn multiply<T: Sample>(params: &StrategyParams) -> Result<Box<dyn Strategy<T>>> {
    let factor = params.get_or("multiplier", 2.0)?;
    Ok(Box::new(Multiply::new(T::from_f64(factor))))
}

fn running_average<T: Sample>(_: &StrategyParams) -> Result<Box<dyn Strategy<T>>> {
    Ok(Box::new(RunningAverage::<T>::new()))
}

fn threshold_filter<T: Sample>(params: &StrategyParams) -> Result<Box<dyn Strategy<T>>> {
    let threshold = params.get_or("threshold", 0.0)?;
    Ok(Box::new(ThresholdFilter::new(T::from_f64(threshold))))
}

fn amplify<T: Sample>(params: &StrategyParams) -> Result<Box<dyn Strategy<T>>> {
    let gain = params.get_or("gain", 1.5)?;
    Ok(Box::new(Amplify::new(gain)))
}

/// Upper bound on `repetitions`; larger values would only build huge strings
pub const MAX_REPETITIONS: usize = 1024;

fn repeat(params: &StrategyParams) -> Result<Box<dyn Strategy<String>>> {
    let repetitions = params.get_or("repetitions", 2.0)?;
    if !(0.0..=MAX_REPETITIONS as f64).contains(&repetitions) {
        return Err(PipelineError::InvalidParameter {
            name: "repetitions".into(),
            reason: format!("{repetitions} is outside 0..={MAX_REPETITIONS}"),
        });
    }
    Ok(Box::new(Repeat::new(repetitions as usize)))
}

impl<T: Sample> StrategyRegistry<T> {
    /// Every built-in numeric strategy
    pub fn numeric() -> Self {
        let mut registry = Self::empty();
        registry
            .register(StrategyKind::Multiply, multiply::<T>)
            .register(StrategyKind::RunningAverage, running_average::<T>)
            .register(StrategyKind::ThresholdFilter, threshold_filter::<T>)
            .register(StrategyKind::Amplify, amplify::<T>);
        registry
    }
}

impl StrategyRegistry<String> {
    /// Strings only support `Multiply`, which repeats the input
    pub fn text() -> Self {
        let mut registry = Self::empty();
        registry.register(StrategyKind::Multiply, repeat);
        registry
    }
}
