use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The most recent `process()` durations, overwritten oldest-first
struct Window {
    samples: Vec<u64>,
    next: usize,
    capacity: usize,
}

/// Median and tail of the recorded `process()` durations
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatencySummary {
    pub samples: usize,
    pub p50_us: f64,
    pub p99_us: f64,
}

/// Nearest-rank percentile of an ascending slice, in microseconds
fn nearest_rank_us(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() as f64 * p).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1] as f64 / 1000.0
}

/// Keeps the last `window_size` strategy latencies.
///
/// Recording only touches this tracker's own lock. [`summary`] copies the
/// window and sorts the copy after releasing it.
///
/// [`summary`]: LatencyTracker::summary
#[derive(Clone)]
pub struct LatencyTracker {
    window: Arc<Mutex<Window>>,
}

impl LatencyTracker {
    pub fn new(window_size: usize) -> Self {
        let capacity = window_size.max(1);
        Self {
            window: Arc::new(Mutex::new(Window {
                samples: Vec::with_capacity(capacity),
                next: 0,
                capacity,
            })),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let mut window = self.window.lock();
        if window.samples.len() < window.capacity {
            window.samples.push(nanos);
        } else {
            let slot = window.next;
            window.samples[slot] = nanos;
        }
        window.next = (window.next + 1) % window.capacity;
    }

    pub fn summary(&self) -> LatencySummary {
        let mut sorted = self.window.lock().samples.clone();
        sorted.sort_unstable();
        LatencySummary {
            samples: sorted.len(),
            p50_us: nearest_rank_us(&sorted, 0.50),
            p99_us: nearest_rank_us(&sorted, 0.99),
        }
    }
}

impl fmt::Debug for LatencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencyTracker")
            .field("summary", &self.summary())
            .finish()
    }
}

struct Counters {
    dequeued: CachePadded<AtomicU64>,
    processed: CachePadded<AtomicU64>,
    errors: CachePadded<AtomicU64>,
}

/// Counters shared by every worker of a pipeline.
///
/// Cloning gives another handle to the same counters. All counters only ever
/// increase, and `processed + errors` never exceeds `dequeued` because a
/// worker counts the dequeue before it counts the outcome.
#[derive(Clone)]
pub struct PipelineMetrics {
    counters: Arc<Counters>,
    latency: LatencyTracker,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters {
                dequeued: CachePadded::new(AtomicU64::new(0)),
                processed: CachePadded::new(AtomicU64::new(0)),
                errors: CachePadded::new(AtomicU64::new(0)),
            }),
            latency: LatencyTracker::new(1000),
            start_time: Instant::now(),
        }
    }

    /// Record an item taken off the input queue
    pub fn record_dequeued(&self) {
        self.counters.dequeued.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a result delivered to the output queue
    pub fn record_processed(&self) {
        self.counters.processed.fetch_add(1, Ordering::AcqRel);
    }

    /// Record an item dropped by a strategy failure or a full output queue
    pub fn record_error(&self) {
        self.counters.errors.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.latency.record(elapsed);
    }

    pub fn total_dequeued(&self) -> u64 {
        self.counters.dequeued.load(Ordering::Acquire)
    }

    pub fn total_processed(&self) -> u64 {
        self.counters.processed.load(Ordering::Acquire)
    }

    pub fn total_errors(&self) -> u64 {
        self.counters.errors.load(Ordering::Acquire)
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    /// Delivered results per second since the metrics were created
    pub fn throughput_per_sec(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_processed() as f64 / elapsed
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineMetrics")
            .field("dequeued", &self.total_dequeued())
            .field("processed", &self.total_processed())
            .field("errors", &self.total_errors())
            .finish()
    }
}

/// A snapshot of a pipeline's state
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStatistics {
    pub input_depth: usize,
    pub output_depth: usize,
    pub processed: u64,
    pub errors: u64,
    pub running: bool,
    pub strategy_name: String,
    pub latency_p50_us: f64,
    pub latency_p99_us: f64,
    pub throughput_per_sec: f64,
}

impl PipelineStatistics {
    /// Format the snapshot as a single human-readable line
    pub fn format(&self) -> String {
        format!(
            "Status: {}, Strategy: {}, Input: {}, Output: {}, Processed: {}, Errors: {}, \
             Latency P50: {:.2}µs, P99: {:.2}µs, Throughput: {:.2} items/s",
            if self.running { "RUNNING" } else { "STOPPED" },
            self.strategy_name,
            self.input_depth,
            self.output_depth,
            self.processed,
            self.errors,
            self.latency_p50_us,
            self.latency_p99_us,
            self.throughput_per_sec
        )
    }
}

impl fmt::Display for PipelineStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(us: u64) -> Duration {
        Duration::from_micros(us)
    }

    #[test]
    fn test_latency_summary() {
        let tracker = LatencyTracker::new(10);
        for i in 1..=10 {
            tracker.record(micros(i));
        }
        let summary = tracker.summary();
        assert_eq!(summary.samples, 10);
        assert_eq!(summary.p50_us, 5.0);
        assert_eq!(summary.p99_us, 10.0);
    }

    #[test]
    fn test_latency_window_overwrites_oldest() {
        let tracker = LatencyTracker::new(3);
        for us in [100, 1, 2, 3] {
            tracker.record(micros(us));
        }
        let summary = tracker.summary();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.p50_us, 2.0);
        assert_eq!(summary.p99_us, 3.0);
    }

    #[test]
    fn test_empty_tracker() {
        assert_eq!(LatencyTracker::new(4).summary(), LatencySummary::default());
    }

    #[test]
    fn test_counters_shared_between_clones() {
        let metrics = PipelineMetrics::new();
        let worker = metrics.clone();
        for _ in 0..3 {
            worker.record_dequeued();
        }
        worker.record_processed();
        worker.record_processed();
        worker.record_error();

        assert_eq!(metrics.total_dequeued(), 3);
        assert_eq!(metrics.total_processed(), 2);
        assert_eq!(metrics.total_errors(), 1);
    }

    #[test]
    fn test_statistics_format() {
        let stats = PipelineStatistics {
            input_depth: 1,
            output_depth: 2,
            processed: 3,
            errors: 4,
            running: true,
            strategy_name: "multiply".into(),
            latency_p50_us: 0.0,
            latency_p99_us: 0.0,
            throughput_per_sec: 0.0,
        };
        let line = stats.to_string();
        assert!(line.starts_with("Status: RUNNING, Strategy: multiply"));
        assert!(line.contains("Processed: 3, Errors: 4"));
    }
}
