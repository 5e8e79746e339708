//! The concrete end-to-end scenarios from the simulation engine's spec,
//! all executed against the virtual scheduler.

use netimpair_core::parameters::{ParameterStore, Parameters};
use netimpair_core::pipe_pair::PipePair;
use netimpair_core::scheduler::VirtualScheduler;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

fn pipes(params: Parameters, seed: u64) -> (Arc<VirtualScheduler>, PipePair) {
    let scheduler = Arc::new(VirtualScheduler::new());
    let store = Arc::new(ParameterStore::new(params));
    let pipes = PipePair::new(store, Arc::clone(&scheduler) as Arc<dyn netimpair_core::Scheduler>, Some(seed));
    (scheduler, pipes)
}

#[test]
fn constant_delay() {
    let (scheduler, pipes) = pipes(Parameters { delay: 0.5, ..Default::default() }, 1);
    let delivered = Arc::new(Mutex::new(Vec::new()));

    for label in ["A", "B"] {
        let d = Arc::clone(&delivered);
        pipes.up().attempt(Box::new(move || d.lock().unwrap().push(label)), Box::new(|| {}), 0);
    }

    scheduler.advance(0.5 - 1e-6);
    assert!(delivered.lock().unwrap().is_empty());

    scheduler.advance(1e-6);
    assert_eq!(*delivered.lock().unwrap(), vec!["A", "B"]);

    let d = Arc::clone(&delivered);
    pipes.up().attempt(Box::new(move || d.lock().unwrap().push("C")), Box::new(|| {}), 0);
    scheduler.advance(0.5);
    assert_eq!(*delivered.lock().unwrap(), vec!["A", "B", "C"]);

    assert_eq!(pipes.up().bytes_attempted(), 0);
    assert_eq!(pipes.up().bytes_delivered(), 0);
}

#[test]
fn throttle() {
    let (scheduler, pipes) = pipes(Parameters { bandwidth: 4096, ..Default::default() }, 1);
    let delivered = Arc::new(Mutex::new(Vec::new()));

    for (label, size) in [("A", 1024u64), ("B", 2048), ("C", 0)] {
        let d = Arc::clone(&delivered);
        pipes.up().attempt(Box::new(move || d.lock().unwrap().push(label)), Box::new(|| {}), size);
    }

    scheduler.advance(0.25);
    assert_eq!(*delivered.lock().unwrap(), vec!["A"]);

    scheduler.advance(0.5);
    assert_eq!(*delivered.lock().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn throttle_plus_constant_delay() {
    let (scheduler, pipes) = pipes(Parameters { bandwidth: 4096, delay: 2.0, ..Default::default() }, 1);
    let delivered = Arc::new(AtomicU64::new(0));

    for _ in 0..2 {
        let d = Arc::clone(&delivered);
        pipes.up().attempt(Box::new(move || { d.fetch_add(1, Ordering::SeqCst); }), Box::new(|| {}), 2048);
    }
    assert_eq!(pipes.up().size(), 4096);

    // Both release from the buffer at t=1 (throttle_delay) ...
    scheduler.advance(1.0);
    assert_eq!(pipes.up().size(), 0);
    assert_eq!(delivered.load(Ordering::SeqCst), 0);

    // ... but don't deliver until t=3 (throttle_delay + constant_delay).
    scheduler.advance(2.0);
    assert_eq!(delivered.load(Ordering::SeqCst), 2);
}

#[test]
fn buffer_overflow() {
    let (scheduler, pipes) = pipes(Parameters { bandwidth: 1024, buffer: 2048, ..Default::default() }, 1);

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let dropped = Arc::new(Mutex::new(Vec::new()));

    for label in ["A", "B", "C"] {
        let d = Arc::clone(&delivered);
        let x = Arc::clone(&dropped);
        pipes.up().attempt(
            Box::new(move || d.lock().unwrap().push(label)),
            Box::new(move || x.lock().unwrap().push(label)),
            1024,
        );
    }

    assert_eq!(*dropped.lock().unwrap(), vec!["C"]);
    assert_eq!(pipes.up().size(), 2048);

    scheduler.advance(1.0);
    assert_eq!(*delivered.lock().unwrap(), vec!["A"]);
    assert_eq!(pipes.up().size(), 1024);

    let d = Arc::clone(&delivered);
    pipes.up().attempt(Box::new(move || d.lock().unwrap().push("D")), Box::new(|| {}), 1024);

    scheduler.advance(1.0);
    assert_eq!(*delivered.lock().unwrap(), vec!["A", "B"]);

    scheduler.advance(1.0);
    assert_eq!(*delivered.lock().unwrap(), vec!["A", "B", "D"]);
}

#[test]
fn total_loss() {
    let (scheduler, pipes) = pipes(Parameters { delay: 1.0, loss: 1.0, ..Default::default() }, 1);

    let delivered = Arc::new(AtomicU64::new(0));
    let d = Arc::clone(&delivered);
    pipes.up().attempt(Box::new(move || { d.fetch_add(1, Ordering::SeqCst); }), Box::new(|| {}), 1024);

    scheduler.advance(1.0);
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert_eq!(pipes.up().bytes_attempted(), 1024);
    assert_eq!(pipes.up().bytes_delivered(), 0);
}

#[test]
fn metering_under_delay() {
    let (scheduler, pipes) = pipes(Parameters { delay: 2.0, ..Default::default() }, 1);

    pipes.up().attempt(Box::new(|| {}), Box::new(|| {}), 1024);
    scheduler.advance(1.0);
    pipes.up().attempt(Box::new(|| {}), Box::new(|| {}), 1024);

    assert_eq!(pipes.up().bytes_attempted(), 2048);
    assert_eq!(pipes.up().bytes_delivered(), 0);

    scheduler.advance(1.0);
    assert_eq!(pipes.up().bytes_attempted(), 2048);
    assert_eq!(pipes.up().bytes_delivered(), 1024);

    scheduler.advance(1.0);
    assert_eq!(pipes.up().bytes_attempted(), 2048);
    assert_eq!(pipes.up().bytes_delivered(), 2048);
}

#[test]
fn control_round_trip() {
    let store = ParameterStore::new(Parameters::default());

    let mut candidate = HashMap::new();
    candidate.insert("bandwidth".to_string(), Value::from("2048"));
    candidate.insert("loss".to_string(), Value::from("0.25"));
    let merged = store.update(&candidate).unwrap();
    assert_eq!(merged.bandwidth, 2048);
    assert_eq!(merged.loss, 0.25);

    let reset = store.reset();
    assert_eq!(reset, Parameters::default());
    assert_eq!(store.snapshot(), Parameters::default());
}
