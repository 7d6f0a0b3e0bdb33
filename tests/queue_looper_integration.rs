//! Integration tests for queue ordering and looper scheduling.
//!
//! These tests run the concurrency layer the way a pipeline would: elements
//! pushing across threads, workers draining in order, and jobs fanned out
//! over shared loopers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use strata::looper::{DispatchQueue, Job, Looper};
use strata::queue::{LockFreeQueue, spsc};

// ============================================================================
// Queue Contracts
// ============================================================================

/// Values 1..=1000 pushed from one thread arrive on another intact
/// and in order.
#[test]
fn test_spsc_cross_thread_order() {
    let (mut tx, mut rx) = spsc::queue();

    let producer = thread::spawn(move || {
        for i in 1..=1000u32 {
            tx.push(i);
        }
    });
    let consumer = thread::spawn(move || {
        let mut received = Vec::with_capacity(1000);
        while received.len() < 1000 {
            if let Some(v) = rx.pop() {
                received.push(v);
            } else {
                std::hint::spin_loop();
            }
        }
        assert_eq!(rx.pop(), None);
        received
    });

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    assert_eq!(received, (1..=1000).collect::<Vec<_>>());
}

/// Concurrent producers and consumers on the MPMC queue: every element is
/// delivered exactly once.
#[test]
fn test_mpmc_no_loss_no_duplication() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 2500;

    let queue = Arc::new(LockFreeQueue::new());
    let produced = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            let produced = Arc::clone(&produced);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.push(p * PER_PRODUCER + i);
                    produced.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let produced = Arc::clone(&produced);
            thread::spawn(move || {
                let mut taken = Vec::new();
                loop {
                    match queue.pop() {
                        Some(v) => taken.push(v),
                        None => {
                            // Done only when production finished and the
                            // queue stayed empty.
                            if produced.load(Ordering::SeqCst) == PRODUCERS * PER_PRODUCER
                                && queue.is_empty()
                            {
                                break;
                            }
                            std::hint::spin_loop();
                        }
                    }
                }
                taken
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let mut seen = vec![false; PRODUCERS * PER_PRODUCER];
    for c in consumers {
        for v in c.join().unwrap() {
            assert!(!seen[v], "duplicate delivery of {v}");
            seen[v] = true;
        }
    }
    assert!(seen.iter().all(|&s| s), "lost elements");
}

// ============================================================================
// Looper Scheduling
// ============================================================================

/// Jobs fanned onto one looper from several threads all run, serially.
#[test]
fn test_looper_serializes_concurrent_dispatch() {
    let looper = Looper::new("fan-in").unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let dispatchers: Vec<_> = (0..4)
        .map(|_| {
            let looper = looper.clone();
            let in_flight = Arc::clone(&in_flight);
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                for _ in 0..50 {
                    let in_flight = Arc::clone(&in_flight);
                    let completed = Arc::clone(&completed);
                    let job = Job::new(move || {
                        // Serial execution means never more than one job
                        // inside this window.
                        assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                    });
                    looper.dispatch(&job, Duration::ZERO);
                }
            })
        })
        .collect();
    for d in dispatchers {
        d.join().unwrap();
    }

    // Fence: everything dispatched before this has run once it completes.
    let fence = Job::new(|| {});
    assert!(looper.sync(&fence, Some(Duration::from_secs(10))));
    assert_eq!(completed.load(Ordering::SeqCst), 200);
    looper.terminate();
}

/// Two dispatch queues on one looper interleave execution but keep
/// independent books.
#[test]
fn test_dispatch_queues_share_worker() {
    let looper = Looper::new("shared-worker").unwrap();
    let q1 = DispatchQueue::new(&looper);
    let q2 = DispatchQueue::new(&looper);

    let hits = Arc::new(AtomicUsize::new(0));
    for queue in [&q1, &q2] {
        for _ in 0..10 {
            let hits = Arc::clone(&hits);
            let job = Job::with_queue(queue, move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
            job.dispatch();
        }
    }

    let fence = Job::new(|| {});
    assert!(q1.sync(&fence, Some(Duration::from_secs(10))));
    assert!(q2.sync(&fence, Some(Duration::from_secs(10))));
    assert_eq!(hits.load(Ordering::SeqCst), 20);
    looper.terminate();
}

/// A producer thread feeds an SPSC queue; a looper job drains it. The kind
/// of one-way handoff a decoder feeding a renderer uses.
#[test]
fn test_spsc_feeding_looper_consumer() {
    let (mut tx, rx) = spsc::queue();
    let looper = Looper::new("renderer").unwrap();

    let producer = thread::spawn(move || {
        for frame in 0..100u64 {
            tx.push(frame);
        }
    });
    producer.join().unwrap();

    let rx = std::sync::Mutex::new(rx);
    let drained = Arc::new(AtomicUsize::new(0));
    let job = {
        let drained = Arc::clone(&drained);
        Job::with_looper(&looper, move || {
            let mut rx = rx.lock().unwrap();
            let mut expected = 0u64;
            while let Some(frame) = rx.pop() {
                assert_eq!(frame, expected);
                expected += 1;
            }
            drained.store(expected as usize, Ordering::SeqCst);
        })
    };
    assert!(job.sync(Some(Duration::from_secs(10))));
    assert_eq!(drained.load(Ordering::SeqCst), 100);
    looper.terminate();
}
