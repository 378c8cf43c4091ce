//! Public-API properties of `WorkerPool`/`Job` from outside the crate: the
//! ring buffer and gate are exercised directly by the inline unit tests in
//! `src/worker_pool.rs`; this checks the surface a real command handler
//! actually uses (`push`/`start`/`stop`) behaves correctly under
//! concurrent producers and a stop-then-drain sequence.

use kvstore::worker_pool::{Job, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountJob(Arc<AtomicUsize>);

impl Job for CountJob {
    fn run(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn every_job_pushed_from_many_threads_runs_exactly_once() {
    let mut pool: WorkerPool<CountJob> = WorkerPool::new();
    pool.start(4, "it-pool");
    let pool = Arc::new(pool);
    let counter = Arc::new(AtomicUsize::new(0));

    let mut pushers = Vec::new();
    for _ in 0..8 {
        let pool = Arc::clone(&pool);
        let counter = Arc::clone(&counter);
        pushers.push(std::thread::spawn(move || {
            for _ in 0..200 {
                pool.push(CountJob(Arc::clone(&counter)));
            }
        }));
    }
    for p in pushers {
        p.join().unwrap();
    }

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) < 1600 && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1600);
}

#[test]
fn jobs_queued_before_start_still_run_once_started() {
    let mut pool: WorkerPool<CountJob> = WorkerPool::new();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..50 {
        pool.push(CountJob(Arc::clone(&counter)));
    }
    pool.start(2, "late-start-pool");

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) < 50 && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 50);
}

#[test]
fn stop_drains_the_queue_before_joining_workers() {
    let mut pool: WorkerPool<CountJob> = WorkerPool::new();
    pool.start(2, "drain-pool");
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..300 {
        pool.push(CountJob(Arc::clone(&counter)));
    }
    pool.stop();
    assert_eq!(counter.load(Ordering::SeqCst), 300);
}
