//! Runs each built-in strategy through a pipeline and prints the results.
//!
//! Usage: RUST_LOG=debug cargo run --example signal_processing

use env_logger::Env;
use log::info;
use std::time::{Duration, Instant};
use work_pipeline::{
    Pipeline, PipelineBuilder, Result as PipelineResult, Sample, StrategyKind, StrategyParams,
    StrategyRegistry, DEFAULT_COLLECT_MANY_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT,
};

fn run_numeric<T: Sample>(
    title: &str,
    workers: usize,
    kind: StrategyKind,
    params: StrategyParams,
    inputs: &[T],
) -> PipelineResult<()> {
    println!("\n=== {title} ===");

    let registry = StrategyRegistry::<T>::numeric();
    let pipeline: Pipeline<T> = PipelineBuilder::new()
        .workers(workers)
        .queue_capacity(1000)
        .build()?;
    pipeline.set_strategy_by_kind(&registry, kind, &params)?;
    pipeline.start()?;

    for &value in inputs {
        if let Err(e) = pipeline.submit(value, DEFAULT_SUBMIT_TIMEOUT) {
            println!("Rejected {value}: {e}");
        }
    }

    let results = pipeline.collect_many(inputs.len(), Duration::from_millis(500));
    // With several workers the order may differ from submission order
    for output in &results {
        println!("  {output}");
    }

    pipeline.log_statistics();
    pipeline.stop();
    Ok(())
}

fn run_text() -> PipelineResult<()> {
    println!("\n=== String repetition ===");

    let pipeline: Pipeline<String> = PipelineBuilder::new().workers(2).queue_capacity(100).build()?;
    pipeline.set_strategy_by_kind(
        &StrategyRegistry::text(),
        StrategyKind::Multiply,
        &StrategyParams::new().with("repetitions", 3.0),
    )?;
    pipeline.start()?;

    for word in ["Hello", "Rust", "Pipelines"] {
        pipeline.submit(word.to_string(), DEFAULT_SUBMIT_TIMEOUT).ok();
    }
    for result in pipeline.collect_many(3, Duration::from_millis(500)) {
        println!("  {result}");
    }

    pipeline.stop();
    Ok(())
}

fn run_stress() -> PipelineResult<()> {
    println!("\n=== Stress test: 8 workers, 10000 items ===");

    let pipeline: Pipeline<i64> = PipelineBuilder::new()
        .workers(8)
        .queue_capacity(5000)
        .build()?;
    pipeline.set_strategy_by_kind(
        &StrategyRegistry::numeric(),
        StrategyKind::Multiply,
        &StrategyParams::new().with("multiplier", 2.0),
    )?;
    pipeline.start()?;

    let start = Instant::now();
    let collected = crossbeam::scope(|s| {
        s.spawn(|_| {
            for i in 0..10_000 {
                pipeline.submit(i, Duration::from_secs(5)).ok();
            }
        });
        let collector = s.spawn(|_| {
            let mut collected = 0;
            while collected < 10_000 {
                collected += pipeline.collect_many(100, DEFAULT_COLLECT_MANY_TIMEOUT).len();
            }
            collected
        });
        collector.join().unwrap_or(0)
    })
    .unwrap_or(0);

    let elapsed = start.elapsed();
    println!(
        "  Collected {collected} results in {:.3}s ({:.0} items/s)",
        elapsed.as_secs_f64(),
        collected as f64 / elapsed.as_secs_f64()
    );
    println!("  {}", pipeline.statistics());

    pipeline.stop();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("work-pipeline {}", work_pipeline::VERSION);

    run_numeric(
        "Multiply integers by 5",
        4,
        StrategyKind::Multiply,
        StrategyParams::new().with("multiplier", 5.0),
        &(1..=10).collect::<Vec<i32>>(),
    )?;
    run_numeric(
        "Threshold filter at 5.0",
        1,
        StrategyKind::ThresholdFilter,
        StrategyParams::new().with("threshold", 5.0),
        &[1.5f32, 3.2, 5.5, 4.1, 8.9, 2.3, 10.0],
    )?;
    run_numeric(
        "Amplify with gain 2.5",
        4,
        StrategyKind::Amplify,
        StrategyParams::new().with("gain", 2.5),
        &(1..=8).map(|i| i as f64 * 1.5).collect::<Vec<_>>(),
    )?;
    run_numeric(
        "Running average",
        1,
        StrategyKind::RunningAverage,
        StrategyParams::new(),
        &[10, 20, 30, 40, 50],
    )?;
    run_text()?;
    run_stress()?;

    // Unknown kinds fail before any pipeline is involved
    if let Err(e) = "median".parse::<StrategyKind>() {
        println!("\n{e}");
    }

    Ok(())
}
