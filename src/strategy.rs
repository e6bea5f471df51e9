//! Processing strategies applied by pipeline workers.
//!
//! A strategy is invoked from many worker threads but never concurrently: the
//! pipeline serializes every `process()` call behind one lock, so a strategy
//! may freely keep cross-item state such as a running total.

use crate::error::{PipelineError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A transformation applied to every item passing through a pipeline
pub trait Strategy<T>: Send + 'static {
    /// Transform one input item into one output item
    fn process(&mut self, input: T) -> Result<T>;

    /// Stable identifier used for reporting
    fn name(&self) -> &str;

    /// Clear any state accumulated across calls
    fn reset(&mut self) {}
}

impl<T: 'static> Strategy<T> for Box<dyn Strategy<T>> {
    fn process(&mut self, input: T) -> Result<T> {
        (**self).process(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// A strategy handle that can outlive the pipeline using it.
///
/// The mutex is the serialization point: holding it is the only way to call
/// `process()`, so two calls can never overlap.
pub type SharedStrategy<T> = Arc<Mutex<dyn Strategy<T>>>;

/// Wrap a strategy so it can be handed to a pipeline and kept by the caller
pub fn shared<T, S: Strategy<T>>(strategy: S) -> SharedStrategy<T> {
    Arc::new(Mutex::new(strategy))
}

/// Numeric element types the built-in strategies operate on
pub trait Sample: Copy + PartialOrd + fmt::Display + Send + 'static {
    /// The value a filter emits for rejected inputs
    const ZERO: Self;

    /// Lossy conversion, saturating for integers
    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;

    fn checked_add(self, rhs: Self) -> Option<Self>;

    fn checked_mul(self, rhs: Self) -> Option<Self>;

    /// `self / count`, integer division for integer types
    fn div_count(self, count: u64) -> Self;
}

macro_rules! impl_sample_int {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            const ZERO: Self = 0;

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn checked_add(self, rhs: Self) -> Option<Self> {
                <$t>::checked_add(self, rhs)
            }

            fn checked_mul(self, rhs: Self) -> Option<Self> {
                <$t>::checked_mul(self, rhs)
            }

            fn div_count(self, count: u64) -> Self {
                (self as i128 / count as i128) as $t
            }
        }
    )*};
}

macro_rules! impl_sample_float {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            const ZERO: Self = 0.0;

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn checked_add(self, rhs: Self) -> Option<Self> {
                Some(self + rhs)
            }

            fn checked_mul(self, rhs: Self) -> Option<Self> {
                Some(self * rhs)
            }

            fn div_count(self, count: u64) -> Self {
                self / count as $t
            }
        }
    )*};
}

impl_sample_int!(i32, i64, u32, u64);
impl_sample_float!(f32, f64);

/// Multiplies every input by a fixed factor
#[derive(Debug, Clone)]
pub struct Multiply<T> {
    factor: T,
}

impl<T: Sample> Multiply<T> {
    pub fn new(factor: T) -> Self {
        Self { factor }
    }
}

impl<T: Sample> Strategy<T> for Multiply<T> {
    fn process(&mut self, input: T) -> Result<T> {
        input.checked_mul(self.factor).ok_or_else(|| {
            PipelineError::Strategy(format!("{} * {} overflows", input, self.factor))
        })
    }

    fn name(&self) -> &str {
        "multiply"
    }
}

/// Emits the mean of every input seen since creation or the last reset
#[derive(Debug, Clone)]
pub struct RunningAverage<T> {
    total: T,
    count: u64,
}

impl<T: Sample> RunningAverage<T> {
    pub fn new() -> Self {
        Self {
            total: T::ZERO,
            count: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<T: Sample> Default for RunningAverage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Sample> Strategy<T> for RunningAverage<T> {
    fn process(&mut self, input: T) -> Result<T> {
        let total = self.total.checked_add(input).ok_or_else(|| {
            PipelineError::Strategy(format!("running total overflows after {} items", self.count))
        })?;
        self.total = total;
        self.count += 1;
        Ok(total.div_count(self.count))
    }

    fn name(&self) -> &str {
        "running_average"
    }

    fn reset(&mut self) {
        log::debug!("Resetting running average after {} items", self.count);
        self.total = T::ZERO;
        self.count = 0;
    }
}

/// Passes inputs at or above the threshold, replaces the rest with zero
#[derive(Debug, Clone)]
pub struct ThresholdFilter<T> {
    threshold: T,
}

impl<T: Sample> ThresholdFilter<T> {
    pub fn new(threshold: T) -> Self {
        Self { threshold }
    }
}

impl<T: Sample> Strategy<T> for ThresholdFilter<T> {
    fn process(&mut self, input: T) -> Result<T> {
        if input >= self.threshold {
            Ok(input)
        } else {
            Ok(T::ZERO)
        }
    }

    fn name(&self) -> &str {
        "threshold_filter"
    }
}

/// Scales inputs by a floating-point gain
#[derive(Debug, Clone)]
pub struct Amplify {
    gain: f64,
}

impl Amplify {
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }
}

impl<T: Sample> Strategy<T> for Amplify {
    fn process(&mut self, input: T) -> Result<T> {
        Ok(T::from_f64(input.to_f64() * self.gain))
    }

    fn name(&self) -> &str {
        "amplify"
    }
}

/// Concatenates each input string with itself
#[derive(Debug, Clone)]
pub struct Repeat {
    times: usize,
}

impl Repeat {
    pub fn new(times: usize) -> Self {
        Self { times }
    }
}

impl Strategy<String> for Repeat {
    fn process(&mut self, input: String) -> Result<String> {
        if input.len().checked_mul(self.times).is_none() {
            return Err(PipelineError::Strategy(format!(
                "repeating {} bytes {} times overflows",
                input.len(),
                self.times
            )));
        }
        Ok(input.repeat(self.times))
    }

    fn name(&self) -> &str {
        "repeat"
    }
}

/// A named closure used as a strategy
pub struct FnStrategy<F> {
    name: String,
    f: F,
}

impl<F> FnStrategy<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<T, F> Strategy<T> for FnStrategy<F>
where
    F: FnMut(T) -> Result<T> + Send + 'static,
{
    fn process(&mut self, input: T) -> Result<T> {
        (self.f)(input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
