use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::thread;
use std::time::Duration;
use work_pipeline::BoundedQueue;

fn benchmark_uncontended(c: &mut Criterion) {
    let queue = BoundedQueue::new(1024);
    c.bench_function("queue_enqueue_dequeue_uncontended", |b| {
        b.iter(|| {
            for i in 0..1000u64 {
                let _ = queue.try_enqueue(black_box(i));
                black_box(queue.try_dequeue());
            }
        });
    });
}

fn benchmark_spsc(c: &mut Criterion) {
    c.bench_function("queue_spsc_10000_items_capacity_64", |b| {
        b.iter(|| {
            let queue = BoundedQueue::new(64);
            let producer = {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..10_000u64 {
                        queue.enqueue(i, Duration::ZERO).expect("Enqueue failed");
                    }
                })
            };
            for _ in 0..10_000 {
                black_box(queue.dequeue(Duration::ZERO));
            }
            producer.join().expect("Producer panicked");
        });
    });
}

criterion_group!(benches, benchmark_uncontended, benchmark_spsc);
criterion_main!(benches);
