use crate::error::{PipelineError, PushError, Result};
use crate::metrics::{PipelineMetrics, PipelineStatistics};
use crate::queue::{BoundedQueue, QueueStats};
use crate::registry::{StrategyKind, StrategyParams, StrategyRegistry};
use crate::strategy::{self, SharedStrategy, Strategy};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default wait bound for [`Pipeline::submit`]
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default wait bound for [`Pipeline::collect`]
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default per-attempt wait bound for [`Pipeline::collect_many`]
pub const DEFAULT_COLLECT_MANY_TIMEOUT: Duration = Duration::from_millis(100);

/// Fixed settings of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of worker threads spawned by `start()`
    pub worker_count: usize,
    /// Capacity of both the input and the output queue
    pub queue_capacity: usize,
    /// How long an idle worker waits on the input queue before re-checking
    /// whether it should exit
    pub poll_timeout: Duration,
    /// How long a worker waits for room in the output queue before dropping
    /// the result
    pub output_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 10_000,
            poll_timeout: Duration::from_millis(500),
            output_timeout: Duration::from_millis(500),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(PipelineError::Config("worker_count must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::Config("queue_capacity must be at least 1".into()));
        }
        // Zero would mean an unbounded wait, and an idle worker would never
        // notice stop() on an empty queue that is not yet shut down.
        if self.poll_timeout.is_zero() {
            return Err(PipelineError::Config("poll_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for constructing pipelines
pub struct PipelineBuilder<T> {
    config: PipelineConfig,
    strategy: Option<SharedStrategy<T>>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            strategy: None,
        }
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    pub fn output_timeout(mut self, timeout: Duration) -> Self {
        self.config.output_timeout = timeout;
        self
    }

    pub fn strategy<S: Strategy<T>>(mut self, strategy: S) -> Self {
        self.strategy = Some(strategy::shared(strategy));
        self
    }

    pub fn shared_strategy(mut self, strategy: SharedStrategy<T>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Validate the configuration and build a stopped pipeline
    pub fn build(self) -> Result<Pipeline<T>> {
        self.config.validate()?;
        let pipeline = Pipeline::assemble(self.config);
        if let Some(strategy) = self.strategy {
            pipeline.set_shared_strategy(strategy);
        }
        Ok(pipeline)
    }
}

impl<T: Send + 'static> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The active strategy, if any. Locking this is the serialization point
/// shared by every worker and by `statistics()`.
type StrategySlot<T> = Arc<Mutex<Option<SharedStrategy<T>>>>;

/// A worker pool that moves items from an input queue, through the active
/// strategy, into an output queue.
///
/// Workers dequeue and enqueue concurrently, but only one `process()` call
/// runs at a time across the whole pool, so stateful strategies see items one
/// by one in dequeue order.
///
/// A pipeline is single-use: `stop()` shuts the input queue down for good.
pub struct Pipeline<T: Send + 'static> {
    config: PipelineConfig,
    input: BoundedQueue<T>,
    output: BoundedQueue<T>,
    strategy: StrategySlot<T>,
    metrics: PipelineMetrics,
    running: Arc<AtomicBool>,
    /// Held across start/stop so lifecycle transitions never interleave
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Create a stopped pipeline with `worker_count` workers and two queues of
    /// `queue_capacity` items each
    pub fn new(worker_count: usize, queue_capacity: usize) -> Result<Self> {
        Self::with_config(PipelineConfig {
            worker_count,
            queue_capacity,
            ..PipelineConfig::default()
        })
    }

    pub fn with_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config))
    }

    pub fn builder() -> PipelineBuilder<T> {
        PipelineBuilder::new()
    }

    fn assemble(config: PipelineConfig) -> Self {
        debug!(
            "Pipeline created with {} workers, queue capacity {}",
            config.worker_count, config.queue_capacity
        );
        Self {
            input: BoundedQueue::new(config.queue_capacity),
            output: BoundedQueue::new(config.queue_capacity),
            strategy: Arc::new(Mutex::new(None)),
            metrics: PipelineMetrics::new(),
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Replace the active strategy.
    ///
    /// An in-flight `process()` call finishes with the old strategy; the next
    /// dequeued item uses the new one.
    pub fn set_strategy<S: Strategy<T>>(&self, strategy: S) {
        self.set_shared_strategy(strategy::shared(strategy));
    }

    /// Replace the active strategy with a handle the caller may keep using
    pub fn set_shared_strategy(&self, strategy: SharedStrategy<T>) {
        let name = strategy.lock().name().to_string();
        *self.strategy.lock() = Some(strategy);
        info!("Strategy set: {}", name);
    }

    /// Build a strategy from `registry` and make it active
    pub fn set_strategy_by_kind(
        &self,
        registry: &StrategyRegistry<T>,
        kind: StrategyKind,
        params: &StrategyParams,
    ) -> Result<()> {
        let strategy = registry.create(kind, params)?;
        self.set_strategy(strategy);
        Ok(())
    }

    /// The active strategy handle, if one is assigned
    pub fn strategy(&self) -> Option<SharedStrategy<T>> {
        self.strategy.lock().clone()
    }

    /// Clear the active strategy's accumulated state
    pub fn reset_strategy(&self) {
        if let Some(strategy) = self.strategy.lock().as_ref() {
            let mut strategy = strategy.lock();
            strategy.reset();
            info!("Strategy reset: {}", strategy.name());
        }
    }

    /// Spawn the worker threads.
    ///
    /// Starting a running pipeline is a logged no-op. Fails without a strategy
    /// or after the pipeline has been stopped.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();

        if self.running.load(Ordering::Acquire) {
            warn!("Pipeline already running");
            return Ok(());
        }
        if self.input.is_shut_down() {
            error!("Pipeline has been stopped and cannot be restarted");
            return Err(PipelineError::ShutDown);
        }
        if self.strategy.lock().is_none() {
            error!("No strategy assigned; call set_strategy() first");
            return Err(PipelineError::NoStrategy);
        }

        self.running.store(true, Ordering::Release);
        info!("Starting pipeline with {} worker threads", self.config.worker_count);

        for id in 0..self.config.worker_count {
            let worker = Worker {
                id,
                input: self.input.clone(),
                output: self.output.clone(),
                strategy: Arc::clone(&self.strategy),
                metrics: self.metrics.clone(),
                running: Arc::clone(&self.running),
                poll_timeout: self.config.poll_timeout,
                output_timeout: self.config.output_timeout,
            };

            let spawned = thread::Builder::new()
                .name(format!("pipeline-worker-{id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!("Failed to spawn worker {}: {}", id, e);
                    self.running.store(false, Ordering::Release);
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(PipelineError::Thread(e.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Stop accepting input, let the workers drain what is buffered, and join
    /// them. Idempotent.
    pub fn stop(&self) {
        let mut workers = self.workers.lock();

        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        info!("Stopping pipeline");
        self.input.shutdown();

        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread panicked outside of strategy processing");
            }
        }

        info!(
            "Pipeline stopped. Total processed: {}, Errors: {}",
            self.metrics.total_processed(),
            self.metrics.total_errors()
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queue `item` for processing, waiting up to `timeout` for room
    /// (`Duration::ZERO` waits indefinitely).
    ///
    /// Rejected immediately with [`PushError::NotRunning`] while stopped.
    pub fn submit(&self, item: T, timeout: Duration) -> std::result::Result<(), PushError<T>> {
        if !self.is_running() {
            warn!("Pipeline not running; rejecting item");
            return Err(PushError::NotRunning(item));
        }
        self.input.enqueue(item, timeout)
    }

    /// Take the next result, waiting up to `timeout`
    pub fn collect(&self, timeout: Duration) -> Option<T> {
        self.output.dequeue(timeout)
    }

    /// Make `count` attempts to take a result, each waiting up to `timeout`,
    /// and return whatever arrived
    pub fn collect_many(&self, count: usize, timeout: Duration) -> Vec<T> {
        (0..count).filter_map(|_| self.output.dequeue(timeout)).collect()
    }

    /// Snapshot of depths, counters and the strategy name, taken under the
    /// strategy lock. Latency percentiles are computed after releasing it.
    pub fn statistics(&self) -> PipelineStatistics {
        let slot = self.strategy.lock();
        let strategy_name = match slot.as_ref() {
            Some(strategy) => strategy.lock().name().to_string(),
            None => "none".to_string(),
        };
        let input_depth = self.input.len();
        let output_depth = self.output.len();
        let processed = self.metrics.total_processed();
        let errors = self.metrics.total_errors();
        let running = self.is_running();
        drop(slot);

        let latency = self.metrics.latency().summary();
        PipelineStatistics {
            input_depth,
            output_depth,
            processed,
            errors,
            running,
            strategy_name,
            latency_p50_us: latency.p50_us,
            latency_p99_us: latency.p99_us,
            throughput_per_sec: self.metrics.throughput_per_sec(),
        }
    }

    /// Write the current statistics to the log
    pub fn log_statistics(&self) {
        let stats = self.statistics();
        info!("=== Pipeline Statistics ===");
        info!("Status: {}", if stats.running { "RUNNING" } else { "STOPPED" });
        info!("Strategy: {}", stats.strategy_name);
        info!("Input queue: {}", stats.input_depth);
        info!("Output queue: {}", stats.output_depth);
        info!("Total processed: {}", stats.processed);
        info!("Total errors: {}", stats.errors);
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.config.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }

    pub fn input_stats(&self) -> QueueStats {
        self.input.stats()
    }

    pub fn output_stats(&self) -> QueueStats {
        self.output.stats()
    }
}

impl<T: Send + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self::assemble(PipelineConfig::default())
    }
}

impl<T: Send + 'static> Drop for Pipeline<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one worker thread needs, moved into the thread
struct Worker<T> {
    id: usize,
    input: BoundedQueue<T>,
    output: BoundedQueue<T>,
    strategy: StrategySlot<T>,
    metrics: PipelineMetrics,
    running: Arc<AtomicBool>,
    poll_timeout: Duration,
    output_timeout: Duration,
}

impl<T: Send + 'static> Worker<T> {
    /// Keep going while the pipeline runs or items remain buffered
    fn run(self) {
        debug!("Worker {} started", self.id);

        while self.running.load(Ordering::Acquire) || !self.input.is_empty() {
            let Some(item) = self.input.dequeue(self.poll_timeout) else {
                continue;
            };
            self.metrics.record_dequeued();
            self.handle(item);
        }

        debug!("Worker {} finished", self.id);
    }

    /// Run the active strategy on `item` and publish the result, all under the
    /// serialization lock, so results reach the output queue in the order the
    /// strategy produced them. Failures and panics are logged and counted.
    fn handle(&self, item: T) {
        let slot = self.strategy.lock();
        let Some(strategy) = slot.as_ref() else {
            error!("No strategy available in worker {}", self.id);
            self.metrics.record_error();
            return;
        };
        let mut strategy = strategy.lock();

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| strategy.process(item)));
        self.metrics.record_latency(start.elapsed());

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("Worker {} strategy '{}' failed: {}", self.id, strategy.name(), e);
                self.metrics.record_error();
                return;
            }
            Err(payload) => {
                error!(
                    "Worker {} strategy '{}' panicked: {}",
                    self.id,
                    strategy.name(),
                    panic_message(payload.as_ref())
                );
                self.metrics.record_error();
                return;
            }
        };
        // Callers holding the shared handle only need the inner lock
        drop(strategy);

        match self.output.enqueue(result, self.output_timeout) {
            Ok(()) => self.metrics.record_processed(),
            Err(e) => {
                warn!("Worker {} dropped a result: {}", self.id, e);
                self.metrics.record_error();
            }
        }
        drop(slot);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{FnStrategy, Multiply};

    const WAIT: Duration = Duration::from_millis(500);

    fn quick_pipeline<T: Send + 'static>(workers: usize) -> Pipeline<T> {
        PipelineBuilder::new()
            .workers(workers)
            .queue_capacity(16)
            .poll_timeout(Duration::from_millis(20))
            .output_timeout(Duration::from_millis(20))
            .build()
            .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(Pipeline::<i32>::new(0, 10), Err(PipelineError::Config(_))));
        assert!(matches!(Pipeline::<i32>::new(2, 0), Err(PipelineError::Config(_))));
        let result = PipelineBuilder::<i32>::new().poll_timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let pipeline = Pipeline::<i32>::default();
        assert_eq!(pipeline.worker_count(), 4);
        assert_eq!(pipeline.queue_capacity(), 10_000);
        assert_eq!(pipeline.config(), &PipelineConfig::default());
        assert!(!pipeline.is_running());
        assert_eq!(pipeline.statistics().strategy_name, "none");
    }

    #[test]
    fn test_start_without_strategy() {
        let pipeline = quick_pipeline::<i32>(2);
        assert!(matches!(pipeline.start(), Err(PipelineError::NoStrategy)));
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_submit_rejected_while_stopped() {
        let pipeline = quick_pipeline::<i32>(1);
        pipeline.set_strategy(Multiply::new(2));
        let err = pipeline.submit(5, Duration::ZERO).unwrap_err();
        assert!(matches!(err, PushError::NotRunning(5)));
    }

    #[test]
    fn test_start_twice_is_noop() {
        let pipeline = quick_pipeline::<i32>(2);
        pipeline.set_strategy(Multiply::new(2));
        pipeline.start().unwrap();
        pipeline.start().unwrap();
        assert_eq!(pipeline.workers.lock().len(), 2);
        pipeline.stop();
    }

    #[test]
    fn test_restart_after_stop_fails() {
        let pipeline = quick_pipeline::<i32>(1);
        pipeline.set_strategy(Multiply::new(2));
        pipeline.start().unwrap();
        pipeline.stop();
        assert!(matches!(pipeline.start(), Err(PipelineError::ShutDown)));
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_strategy_failure_is_counted() {
        let pipeline = quick_pipeline::<i32>(2);
        pipeline.set_strategy(FnStrategy::new("odd_only", |v: i32| {
            if v % 2 == 0 {
                Err(PipelineError::Strategy(format!("{v} is even")))
            } else {
                Ok(v)
            }
        }));
        pipeline.start().unwrap();
        for v in 0..6 {
            pipeline.submit(v, WAIT).unwrap();
        }
        pipeline.stop();

        let stats = pipeline.statistics();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.errors, 3);
        let mut results = pipeline.collect_many(6, Duration::from_millis(10));
        results.sort_unstable();
        assert_eq!(results, vec![1, 3, 5]);
    }

    #[test]
    fn test_strategy_panic_does_not_kill_worker() {
        let pipeline = quick_pipeline::<i32>(1);
        pipeline.set_strategy(FnStrategy::new("fragile", |v: i32| {
            if v == 2 {
                panic!("cannot handle two");
            }
            Ok(v)
        }));
        pipeline.start().unwrap();
        for v in 1..=3 {
            pipeline.submit(v, WAIT).unwrap();
        }
        pipeline.stop();

        assert_eq!(pipeline.collect_many(3, Duration::from_millis(10)), vec![1, 3]);
        assert_eq!(pipeline.metrics().total_errors(), 1);
        assert_eq!(pipeline.metrics().total_dequeued(), 3);
    }

    #[test]
    fn test_output_saturation_drops_results() {
        let pipeline: Pipeline<i32> = PipelineBuilder::new()
            .workers(1)
            .queue_capacity(2)
            .poll_timeout(Duration::from_millis(20))
            .output_timeout(Duration::from_millis(10))
            .strategy(Multiply::new(1))
            .build()
            .unwrap();
        pipeline.start().unwrap();
        for v in 0..4 {
            pipeline.submit(v, WAIT).unwrap();
        }
        pipeline.stop();

        let stats = pipeline.statistics();
        assert_eq!(stats.output_depth, 2);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.errors, 2);
        assert!(pipeline.output_stats().is_full);
        assert!(pipeline.input_stats().is_empty);
        assert_eq!(pipeline.collect_many(4, Duration::from_millis(10)), vec![0, 1]);
        assert!(pipeline.output_stats().is_empty);
    }

    #[test]
    fn test_swap_strategy_while_running() {
        let pipeline = quick_pipeline::<i32>(1);
        pipeline.set_strategy(Multiply::new(2));
        pipeline.start().unwrap();
        pipeline.submit(1, WAIT).unwrap();
        assert_eq!(pipeline.collect(WAIT), Some(2));

        pipeline.set_strategy(Multiply::new(10));
        pipeline.submit(1, WAIT).unwrap();
        assert_eq!(pipeline.collect(WAIT), Some(10));
        let stats = pipeline.statistics();
        assert_eq!(stats.strategy_name, "multiply");
        assert_eq!(pipeline.metrics().latency().summary().samples, 2);
        assert!(stats.latency_p99_us >= stats.latency_p50_us);
        pipeline.stop();
    }

    #[test]
    fn test_reset_strategy() {
        let pipeline = quick_pipeline::<i32>(1);
        let handle = strategy::shared(crate::strategy::RunningAverage::<i32>::new());
        pipeline.set_shared_strategy(Arc::clone(&handle));
        pipeline.start().unwrap();
        pipeline.submit(10, WAIT).unwrap();
        assert_eq!(pipeline.collect(WAIT), Some(10));

        pipeline.reset_strategy();
        pipeline.submit(2, WAIT).unwrap();
        assert_eq!(pipeline.collect(WAIT), Some(2));
        pipeline.stop();

        // The caller's handle is the same strategy the pipeline used
        assert_eq!(handle.lock().process(4).unwrap(), 3);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
