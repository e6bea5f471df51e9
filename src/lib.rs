//! A bounded-queue worker pool for pushing items through a pluggable strategy.
//!
//! Callers submit items into an input queue, a fixed pool of worker threads
//! runs each item through the active [`Strategy`], and results land in an
//! output queue for later collection.
//!
//! # Features
//!
//! - [`BoundedQueue`]: fixed-capacity FIFO with timeout-bounded blocking push
//!   and pop and a one-way shutdown switch that wakes every waiter
//! - [`Pipeline`]: worker pool with cooperative, draining `stop()`
//! - One serialization point around `process()`, so stateful strategies such
//!   as [`RunningAverage`] stay consistent across workers
//! - [`StrategyRegistry`]: explicit constructor table keyed by [`StrategyKind`]
//! - Per-pipeline counters and latency percentiles
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use work_pipeline::{Pipeline, PipelineBuilder, RunningAverage};
//!
//! let pipeline: Pipeline<i32> = PipelineBuilder::new()
//!     .workers(1)
//!     .strategy(RunningAverage::<i32>::new())
//!     .build()?;
//! pipeline.start()?;
//!
//! for value in [10, 20, 30] {
//!     pipeline.submit(value, Duration::from_secs(1)).ok();
//! }
//! let averages = pipeline.collect_many(3, Duration::from_millis(500));
//! pipeline.stop();
//! assert!(averages.len() <= 3);
//! # Ok::<(), work_pipeline::PipelineError>(())
//! ```

pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod strategy;

// Re-exports for convenience
pub use error::{PipelineError, PushError, Result};
pub use metrics::{LatencySummary, LatencyTracker, PipelineMetrics, PipelineStatistics};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineConfig, DEFAULT_COLLECT_MANY_TIMEOUT,
    DEFAULT_COLLECT_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT,
};
pub use queue::{BoundedQueue, QueueStats};
pub use registry::{
    StrategyConstructor, StrategyKind, StrategyParams, StrategyRegistry, MAX_REPETITIONS,
};
pub use strategy::{
    shared, Amplify, FnStrategy, Multiply, Repeat, RunningAverage, Sample, SharedStrategy,
    Strategy, ThresholdFilter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
