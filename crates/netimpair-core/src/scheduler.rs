//! The abstract timer/dispatch contract the rest of the core depends on.
//!
//! Two implementations are provided: [`LiveScheduler`], which drives callbacks
//! from a single dedicated thread against monotonic wall time, and
//! [`VirtualScheduler`], which is driven by manually calling [`VirtualScheduler::advance`]
//! and is what the test suite binds against.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// A callback scheduled to fire once, at most, at or after its due time.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Abstract scheduler contract.
///
/// `schedule` enqueues `callback` to fire once after `delay_seconds` from the
/// current clock. Scheduling never fails; a callback that panics is caught,
/// logged, and does not halt the scheduler (see [`crate::error::Error::SchedulerMisuse`]).
pub trait Scheduler: Send + Sync {
    /// Seconds elapsed since this scheduler was created.
    fn now(&self) -> f64;

    /// Enqueue `callback` to fire once, `delay_seconds` from now.
    fn schedule(&self, delay_seconds: f64, callback: Callback);
}

fn run_guarded(callback: Callback) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "scheduled callback panicked".to_string());
        log::error!("scheduler: callback panicked: {message}");
    }
}

struct TaskEntry<D> {
    due: D,
    seq: u64,
    callback: Callback,
}

impl<D: PartialEq> PartialEq for TaskEntry<D> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}
impl<D: PartialEq> Eq for TaskEntry<D> {}

impl<D: PartialOrd> PartialOrd for TaskEntry<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so a `BinaryHeap` (a max-heap) pops the *earliest* due time first,
// with FIFO tie-breaking on insertion order.
impl<D: PartialOrd> Ord for TaskEntry<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.due.partial_cmp(&other.due) {
            Some(Ordering::Equal) | None => other.seq.cmp(&self.seq),
            Some(ord) => ord.reverse(),
        }
    }
}

/// Live scheduler: clock is monotonic wall time, dispatched from a single
/// dedicated background thread.
pub struct LiveScheduler {
    shared: Arc<LiveShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct LiveShared {
    start: Instant,
    next_seq: AtomicU64,
    heap: Mutex<BinaryHeap<TaskEntry<Instant>>>,
    cvar: Condvar,
    shutdown: Mutex<bool>,
}

impl LiveScheduler {
    pub fn new() -> Arc<Self> {
        let shared = Arc::new(LiveShared {
            start: Instant::now(),
            next_seq: AtomicU64::new(0),
            heap: Mutex::new(BinaryHeap::new()),
            cvar: Condvar::new(),
            shutdown: Mutex::new(false),
        });

        let dispatcher = Arc::clone(&shared);
        let handle = std::thread::spawn(move || Self::dispatch_loop(dispatcher));

        Arc::new(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn dispatch_loop(shared: Arc<LiveShared>) {
        loop {
            let mut heap = shared.heap.lock().unwrap();
            loop {
                if *shared.shutdown.lock().unwrap() {
                    return;
                }
                match heap.peek() {
                    None => {
                        heap = shared.cvar.wait_timeout(heap, Duration::from_millis(200)).unwrap().0;
                        continue;
                    }
                    Some(top) => {
                        let now = Instant::now();
                        if top.due <= now {
                            break;
                        }
                        let wait = top.due - now;
                        heap = shared.cvar.wait_timeout(heap, wait).unwrap().0;
                    }
                }
            }

            // Snapshot everything due "now" into one batch; anything scheduled
            // from within a callback this round waits for the next wake.
            let now = Instant::now();
            let mut batch = Vec::new();
            while heap.peek().is_some_and(|t| t.due <= now) {
                batch.push(heap.pop().unwrap());
            }
            drop(heap);

            for task in batch {
                run_guarded(task.callback);
            }
        }
    }

    /// Stop the dispatcher thread. Unfired tasks are abandoned; their
    /// callbacks are never invoked.
    pub fn stop(&self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.cvar.notify_all();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LiveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Scheduler for LiveScheduler {
    fn now(&self) -> f64 {
        self.shared.start.elapsed().as_secs_f64()
    }

    fn schedule(&self, delay_seconds: f64, callback: Callback) {
        let delay = Duration::from_secs_f64(delay_seconds.max(0.0));
        let seq = self.shared.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        let due = Instant::now() + delay;
        self.shared.heap.lock().unwrap().push(TaskEntry { due, seq, callback });
        self.shared.cvar.notify_all();
    }
}

/// Virtual scheduler: clock is a mutable scalar, advanced manually by tests.
pub struct VirtualScheduler {
    inner: Mutex<VirtualInner>,
}

struct VirtualInner {
    now: f64,
    next_seq: u64,
    heap: BinaryHeap<TaskEntry<TotalF64>>,
}

/// `f64` due-times never carry NaN in this scheduler (delays are clamped to
/// `>= 0` and added to a finite clock), so a total order is safe.
#[derive(Clone, Copy, PartialEq)]
struct TotalF64(f64);

impl PartialOrd for TotalF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VirtualInner {
                now: 0.0,
                next_seq: 0,
                heap: BinaryHeap::new(),
            }),
        }
    }

    /// Move time forward by `delta` seconds, firing every task due at or
    /// before the new time, in non-decreasing due-time / FIFO order.
    ///
    /// Tasks scheduled by a callback invoked during this call are not fired
    /// by this same call, even if their due time is within the new window —
    /// they wait for the next `advance`.
    pub fn advance(&self, delta: f64) {
        let target = {
            let mut inner = self.inner.lock().unwrap();
            inner.now += delta.max(0.0);
            inner.now
        };

        let mut inner = self.inner.lock().unwrap();
        let mut batch = Vec::new();
        while inner.heap.peek().is_some_and(|t| t.due.0 <= target) {
            batch.push(inner.heap.pop().unwrap());
        }
        drop(inner);

        for task in batch {
            run_guarded(task.callback);
        }
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> f64 {
        self.inner.lock().unwrap().now
    }

    fn schedule(&self, delay_seconds: f64, callback: Callback) {
        let mut inner = self.inner.lock().unwrap();
        let due = TotalF64(inner.now + delay_seconds.max(0.0));
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(TaskEntry { due, seq, callback });
    }
}
