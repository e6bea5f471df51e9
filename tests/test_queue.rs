use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use work_pipeline::BoundedQueue;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_length_never_exceeds_capacity() {
    let queue = BoundedQueue::new(8);
    let done = AtomicBool::new(false);

    crossbeam::scope(|s| {
        for p in 0..3 {
            let queue = queue.clone();
            s.spawn(move |_| {
                for i in 0..500 {
                    queue.enqueue(p * 1000 + i, WAIT).expect("Enqueue failed");
                }
            });
        }
        let consumer = {
            let queue = queue.clone();
            s.spawn(move |_| {
                let mut received = 0;
                while received < 1500 {
                    if queue.dequeue(WAIT).is_some() {
                        received += 1;
                    }
                }
                received
            })
        };
        s.spawn(|_| {
            while !done.load(Ordering::Acquire) {
                let stats = queue.stats();
                assert!(stats.current_size <= stats.capacity);
                assert_eq!(stats.is_full, stats.current_size == stats.capacity);
            }
        });

        assert_eq!(consumer.join().expect("Consumer panicked"), 1500);
        done.store(true, Ordering::Release);
    })
    .expect("Scope failed");

    assert!(queue.is_empty());
}

#[test]
fn test_single_producer_single_consumer_fifo() {
    let queue = BoundedQueue::new(16);

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..10_000u32 {
                queue.enqueue(i, WAIT).expect("Enqueue failed");
            }
        })
    };

    let received: Vec<u32> = (0..10_000).filter_map(|_| queue.dequeue(WAIT)).collect();
    producer.join().expect("Producer panicked");

    assert_eq!(received, (0..10_000).collect::<Vec<_>>());
}

#[test]
fn test_shutdown_releases_every_waiter() {
    let empty: BoundedQueue<u32> = BoundedQueue::new(2);
    let full = BoundedQueue::new(1);
    full.enqueue(0u32, WAIT).expect("Enqueue failed");

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = empty.clone();
            thread::spawn(move || queue.dequeue(Duration::ZERO))
        })
        .collect();
    let producers: Vec<_> = (1..=4)
        .map(|i| {
            let queue = full.clone();
            thread::spawn(move || queue.enqueue(i, Duration::ZERO))
        })
        .collect();

    thread::sleep(Duration::from_millis(100));
    let start = Instant::now();
    empty.shutdown();
    full.shutdown();

    for consumer in consumers {
        assert_eq!(consumer.join().expect("Consumer panicked"), None);
    }
    for producer in producers {
        let err = producer.join().expect("Producer panicked").unwrap_err();
        assert!(err.is_shut_down());
    }
    assert!(start.elapsed() < WAIT);
    assert_eq!(full.len(), 1);
}

#[test]
fn test_drain_then_empty_after_shutdown() {
    let queue = BoundedQueue::new(10);
    for i in 0..5 {
        queue.enqueue(i, WAIT).expect("Enqueue failed");
    }
    queue.shutdown();

    assert!(queue.enqueue(99, WAIT).is_err());
    let drained: Vec<_> = (0..5).filter_map(|_| queue.dequeue(WAIT)).collect();
    assert_eq!(drained, vec![0, 1, 2, 3, 4]);

    let start = Instant::now();
    assert_eq!(queue.dequeue(WAIT), None);
    assert!(start.elapsed() < Duration::from_secs(1));
}
