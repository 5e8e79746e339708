//! The per-direction link model: bandwidth throttling, queue buffering,
//! constant additive latency, and independent random packet loss.

use crate::event_log::{EventLog, EventType};
use crate::parameters::ParameterStore;
use crate::scheduler::{Callback, Scheduler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

struct PipeState {
    size: u64,
    bytes_attempted: u64,
    bytes_delivered: u64,
}

/// Outcome of the admission check made under a single `state` lock
/// acquisition (see `attempt`), carrying the post-admission occupancy so
/// the caller never needs to re-read `state.size` outside that lock.
enum Verdict {
    Admitted(u64),
    Overflow,
    Lost,
}

struct Shared {
    name: &'static str,
    params: Arc<ParameterStore>,
    events: Arc<EventLog>,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<PipeState>,
    rng: Mutex<StdRng>,
}

/// One direction of a bandwidth-limited, lossy, delay-prone link.
///
/// Cheaply cloneable: clones share the same underlying state (it wraps an
/// `Arc` internally), which is what lets `attempt`'s scheduled release/deliver
/// closures capture an owned, `'static` handle back into the pipe.
#[derive(Clone)]
pub struct Pipe(Arc<Shared>);

impl Pipe {
    pub fn new(
        name: &'static str,
        params: Arc<ParameterStore>,
        events: Arc<EventLog>,
        scheduler: Arc<dyn Scheduler>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self(Arc::new(Shared {
            name,
            params,
            events,
            scheduler,
            state: Mutex::new(PipeState { size: 0, bytes_attempted: 0, bytes_delivered: 0 }),
            rng: Mutex::new(rng),
        }))
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Current bytes-in-flight (accepted into the buffer but not yet
    /// released).
    pub fn size(&self) -> u64 {
        self.0.state.lock().unwrap().size
    }

    pub fn bytes_attempted(&self) -> u64 {
        self.0.state.lock().unwrap().bytes_attempted
    }

    pub fn bytes_delivered(&self) -> u64 {
        self.0.state.lock().unwrap().bytes_delivered
    }

    /// Zero `bytes_attempted` and `bytes_delivered`. Leaves `size` and any
    /// in-flight scheduled packets untouched.
    pub fn reset_meter(&self) {
        let mut state = self.0.state.lock().unwrap();
        state.bytes_attempted = 0;
        state.bytes_delivered = 0;
    }

    /// Offer a packet of `size` bytes. Exactly one of `deliver` or `drop`
    /// will be invoked: synchronously for a drop, or later (scheduled via the
    /// `Scheduler` this pipe was built with) for a delivery.
    pub fn attempt(&self, deliver: Callback, drop: Callback, size: u64) {
        let shared = &self.0;
        let t0 = shared.scheduler.now();
        let params = shared.params.snapshot();

        let draw: f64 = shared.rng.lock().unwrap().random();

        // Buffer admission is checked and committed under one lock
        // acquisition: releasing the lock between the overflow check and the
        // `size` increment would let two concurrent callers both pass the
        // check against the same pre-admission `size` and both commit,
        // pushing occupancy over `params.buffer`.
        let admitted = {
            let mut state = shared.state.lock().unwrap();
            state.bytes_attempted += size;

            if params.buffer > 0 && (state.size + size) as i64 > params.buffer {
                Verdict::Overflow
            } else if draw < params.loss {
                Verdict::Lost
            } else {
                state.size += size;
                Verdict::Admitted(state.size)
            }
        };

        let size_current = match admitted {
            Verdict::Overflow => {
                log::warn!("{}: buffer overflow, dropping {size} bytes", shared.name);
                shared.events.add(t0, shared.name, EventType::Drop, size as f64);
                drop();
                return;
            }
            Verdict::Lost => {
                log::debug!("{}: lost {size} bytes (draw={draw:.4}, loss={})", shared.name, params.loss);
                shared.events.add(t0, shared.name, EventType::Drop, size as f64);
                drop();
                return;
            }
            Verdict::Admitted(size_current) => size_current,
        };
        shared.events.add(t0, shared.name, EventType::Buffer, size_current as f64);
        log::debug!("{}: admitted {size} bytes, occupancy now {size_current}", shared.name);

        let throttle_delay = if params.bandwidth > 0 {
            size_current as f64 / params.bandwidth as f64
        } else {
            0.0
        };
        let constant_delay = params.delay;

        let release_shared = Arc::clone(shared);
        shared.scheduler.schedule(
            throttle_delay,
            Box::new(move || {
                let t = release_shared.scheduler.now();
                let remaining = {
                    let mut state = release_shared.state.lock().unwrap();
                    state.size -= size;
                    state.size
                };
                release_shared.events.add(t, release_shared.name, EventType::Buffer, remaining as f64);
                log::debug!("{}: released {size} bytes, occupancy now {remaining}", release_shared.name);
            }),
        );

        let deliver_shared = Arc::clone(shared);
        shared.scheduler.schedule(
            throttle_delay + constant_delay,
            Box::new(move || {
                let t = deliver_shared.scheduler.now();
                let latency = t - t0;
                {
                    let mut state = deliver_shared.state.lock().unwrap();
                    state.bytes_delivered += size;
                }
                deliver_shared.events.add(t, deliver_shared.name, EventType::Deliver, size as f64);
                deliver_shared.events.add(t, deliver_shared.name, EventType::Latency, latency);
                log::debug!("{}: delivered {size} bytes after {latency:.6}s", deliver_shared.name);
                deliver();
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::EventLog;
    use crate::parameters::Parameters;
    use crate::scheduler::VirtualScheduler;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_pipe(params: Parameters, scheduler: Arc<VirtualScheduler>) -> Pipe {
        Pipe::new(
            "up",
            Arc::new(ParameterStore::new(params)),
            Arc::new(EventLog::default()),
            scheduler,
            Some(42),
        )
    }

    #[test]
    fn zero_size_packet_obeys_delay_not_bandwidth() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let pipe = make_pipe(Parameters { delay: 0.5, ..Default::default() }, Arc::clone(&scheduler));

        let delivered = Arc::new(AtomicU64::new(0));
        let d1 = Arc::clone(&delivered);
        pipe.attempt(Box::new(move || { d1.fetch_add(1, Ordering::SeqCst); }), Box::new(|| {}), 0);

        scheduler.advance(0.49);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        scheduler.advance(0.01);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn throttle_delays_proportional_to_occupancy() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let pipe = make_pipe(Parameters { bandwidth: 4096, ..Default::default() }, Arc::clone(&scheduler));

        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, size) in [("A", 1024u64), ("B", 2048), ("C", 0)] {
            let o = Arc::clone(&order);
            pipe.attempt(Box::new(move || o.lock().unwrap().push(label)), Box::new(|| {}), size);
        }

        scheduler.advance(0.25);
        assert_eq!(*order.lock().unwrap(), vec!["A"]);
        scheduler.advance(0.5);
        assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn buffer_overflow_drops_synchronously() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let pipe = make_pipe(
            Parameters { bandwidth: 1024, buffer: 2048, ..Default::default() },
            Arc::clone(&scheduler),
        );

        let dropped = Arc::new(AtomicU64::new(0));
        for _ in 0..2 {
            pipe.attempt(Box::new(|| {}), Box::new(|| {}), 1024);
        }
        let d = Arc::clone(&dropped);
        pipe.attempt(Box::new(|| {}), Box::new(move || { d.fetch_add(1, Ordering::SeqCst); }), 1024);

        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(pipe.size(), 2048);
    }

    #[test]
    fn total_loss_never_delivers() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let pipe = make_pipe(Parameters { delay: 1.0, loss: 1.0, ..Default::default() }, Arc::clone(&scheduler));

        let delivered = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let d1 = Arc::clone(&delivered);
        let d2 = Arc::clone(&dropped);
        pipe.attempt(
            Box::new(move || { d1.fetch_add(1, Ordering::SeqCst); }),
            Box::new(move || { d2.fetch_add(1, Ordering::SeqCst); }),
            1024,
        );
        scheduler.advance(2.0);

        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(pipe.bytes_attempted(), 1024);
        assert_eq!(pipe.bytes_delivered(), 0);
    }

    #[test]
    fn metering_under_delay() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let pipe = make_pipe(Parameters { delay: 2.0, ..Default::default() }, Arc::clone(&scheduler));

        pipe.attempt(Box::new(|| {}), Box::new(|| {}), 1024);
        scheduler.advance(1.0);
        pipe.attempt(Box::new(|| {}), Box::new(|| {}), 1024);

        assert_eq!(pipe.bytes_attempted(), 2048);
        assert_eq!(pipe.bytes_delivered(), 0);

        scheduler.advance(1.0);
        assert_eq!(pipe.bytes_attempted(), 2048);
        assert_eq!(pipe.bytes_delivered(), 1024);

        scheduler.advance(1.0);
        assert_eq!(pipe.bytes_attempted(), 2048);
        assert_eq!(pipe.bytes_delivered(), 2048);
    }

    #[test]
    fn reset_meter_leaves_size_untouched() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let pipe = make_pipe(Parameters { delay: 10.0, ..Default::default() }, Arc::clone(&scheduler));
        pipe.attempt(Box::new(|| {}), Box::new(|| {}), 500);
        assert_eq!(pipe.size(), 500);
        pipe.reset_meter();
        assert_eq!(pipe.bytes_attempted(), 0);
        assert_eq!(pipe.bytes_delivered(), 0);
        assert_eq!(pipe.size(), 500);
    }

    #[test]
    fn concurrent_attempts_never_exceed_buffer() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let pipe = make_pipe(
            Parameters { delay: 10.0, buffer: 4096, ..Default::default() },
            Arc::clone(&scheduler),
        );

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let pipe = pipe.clone();
                std::thread::spawn(move || pipe.attempt(Box::new(|| {}), Box::new(|| {}), 1024))
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert!(pipe.size() <= 4096, "occupancy {} exceeded buffer 4096", pipe.size());
    }
}
