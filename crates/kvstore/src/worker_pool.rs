//! Bounded lock-free MPMC job queue plus a futex-gated worker pool.
//!
//! Grounded in `examples/original_source/src/util/thread.h`: `Queue<T,CAP>`
//! is a Vyukov-style ring buffer (a per-slot sequence number arbitrates
//! producers and consumers without a lock), and `WorkerPool<W,JOB>` is a
//! fixed set of OS threads parked on a gate that producers wake with a
//! single flag flip. `parking_lot::Mutex`/`Condvar` stand in for the
//! original's raw `pthread_mutex_t` + Linux `futex(2)` pair — the same
//! single-flag wake protocol, without the syscall.

use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

struct Slot<T> {
    seq: AtomicU64,
    item: UnsafeCell<Option<T>>,
}

/// A bounded multi-producer multi-consumer ring buffer. `CAP` must be a
/// power of two (enforced at construction, the original enforces it with a
/// `static_assert` on a const template parameter).
struct Queue<T> {
    ring: Box<[Slot<T>]>,
    mask: u64,
    tail: AtomicU64,
    head: AtomicU64,
}

unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    fn new(cap: usize) -> Self {
        assert!(cap.is_power_of_two(), "queue capacity must be a power of two");
        let ring = (0..cap)
            .map(|i| Slot {
                seq: AtomicU64::new(i as u64),
                item: UnsafeCell::new(None),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Queue {
            ring,
            mask: (cap - 1) as u64,
            tail: AtomicU64::new(0),
            head: AtomicU64::new(0),
        }
    }

    fn push(&self, item: T) {
        let pos = self.tail.fetch_add(1, Ordering::Relaxed);
        let slot = &self.ring[(pos & self.mask) as usize];
        loop {
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as i64 - pos as i64;
            if diff == 0 {
                break;
            }
            std::hint::spin_loop();
        }
        unsafe {
            *slot.item.get() = Some(item);
        }
        slot.seq.store(pos + 1, Ordering::Release);
    }

    fn pop(&self) -> Option<T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.ring[(pos & self.mask) as usize];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as i64 - (pos as i64 + 1);
            if diff == 0 {
                if self
                    .head
                    .compare_exchange_weak(pos, pos + 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    let item = unsafe { (*slot.item.get()).take() };
                    slot.seq.store(pos + self.ring.len() as u64, Ordering::Release);
                    return item;
                }
                std::hint::spin_loop();
            } else if diff < 0 {
                return None;
            } else {
                std::hint::spin_loop();
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }
}

const QUEUE_CAPACITY: usize = 1 << 16;

struct Gate {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

impl Gate {
    fn new() -> Self {
        Gate {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Flip the pending-work flag and wake a waiter if the gate was closed
    /// (`WorkerPool::push`'s `need_wake` check — avoids a redundant wake
    /// when a worker hasn't yet gone back to sleep).
    fn signal(&self) {
        let mut pending = self.mutex.lock();
        if !*pending {
            *pending = true;
            self.condvar.notify_one();
        }
    }

    fn wake_all(&self) {
        let mut pending = self.mutex.lock();
        *pending = true;
        self.condvar.notify_all();
    }

    /// Block until there is pending work, or the pool has been stopped.
    /// Returns `false` once stopped with no remaining work.
    fn wait(&self, started: &std::sync::atomic::AtomicBool) -> bool {
        let mut pending = self.mutex.lock();
        while started.load(Ordering::Acquire) && !*pending {
            self.condvar.wait(&mut pending);
        }
        if !started.load(Ordering::Acquire) && !*pending {
            return false;
        }
        *pending = false;
        true
    }
}

/// A unit of dispatchable work. Implementations run
/// entirely off the event loop thread.
pub trait Job: Send + 'static {
    fn run(&mut self);
}

/// A fixed-size pool of OS threads draining a shared job queue. Jobs may be pushed from any thread; `stop` joins every
/// worker after draining what's left in the queue.
pub struct WorkerPool<J: Job> {
    queue: Arc<Queue<J>>,
    gate: Arc<Gate>,
    started: Arc<std::sync::atomic::AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl<J: Job> WorkerPool<J> {
    pub fn new() -> Self {
        WorkerPool {
            queue: Arc::new(Queue::new(QUEUE_CAPACITY)),
            gate: Arc::new(Gate::new()),
            started: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn start(&mut self, num_workers: usize, name: &str) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        for id in 0..num_workers {
            let queue = Arc::clone(&self.queue);
            let gate = Arc::clone(&self.gate);
            let started = Arc::clone(&self.started);
            let thread_name = format!("{name}-{id}");
            let handle = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || worker_loop(id, queue, gate, started))
                .expect("failed to spawn worker thread");
            self.handles.push(handle);
        }
    }

    pub fn push(&self, job: J) {
        self.queue.push(job);
        self.gate.signal();
    }

    pub fn stop(&mut self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        self.gate.wake_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<J: Job> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<J: Job>(
    id: usize,
    queue: Arc<Queue<J>>,
    gate: Arc<Gate>,
    started: Arc<std::sync::atomic::AtomicBool>,
) {
    tracing::debug!(worker_id = id, "worker started");
    loop {
        if !gate.wait(&started) {
            break;
        }
        while let Some(mut job) = queue.pop() {
            job.run();
        }
    }
    tracing::debug!(worker_id = id, "worker stopped");
}
