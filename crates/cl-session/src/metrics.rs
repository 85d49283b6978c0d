#![cfg(feature = "metrics")]

//! Latency and allocation counters for the session API.

use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

/* ───────────── raw latencies ────────────────────────── */

static TIMES: Lazy<Mutex<Vec<(&'static str, u128)>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Called from the wrappers: `record("enqueue_write", Instant::now());`
pub fn record(name: &'static str, start: Instant) {
    let us = start.elapsed().as_micros();
    TIMES.lock().unwrap().push((name, us));
}

/* ───────────── counters ─────────────────────────────── */

pub static ALLOCS: AtomicUsize = AtomicUsize::new(0);
pub static ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);
pub static DISPATCHES: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn count_alloc(bytes: usize) {
    ALLOCS.fetch_add(1, Ordering::Relaxed);
    ALLOC_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub(crate) fn count_dispatch() {
    DISPATCHES.fetch_add(1, Ordering::Relaxed);
}

/* ───────────── summary ──────────────────────────────── */

/// Print grouped API latencies and the allocation counters; call once
/// at the end of a run.
pub fn summary() {
    let mut grouped: HashMap<&str, Vec<u128>> = HashMap::new();
    {
        let mut times = TIMES.lock().unwrap();
        for (name, us) in times.drain(..) {
            grouped.entry(name).or_default().push(us);
        }
    }

    println!("── metrics summary ──");
    for (name, mut v) in grouped {
        v.sort_unstable();
        let mean = v.iter().sum::<u128>() / v.len() as u128;
        let p95 = v[((v.len() * 95) / 100).saturating_sub(1)];
        println!("{:<18} calls={:>4}  mean={:>5} µs  p95={:>5} µs", name, v.len(), mean, p95);
    }

    let allocs = ALLOCS.load(Ordering::Relaxed);
    let bytes = ALLOC_BYTES.load(Ordering::Relaxed);
    let dispatches = DISPATCHES.load(Ordering::Relaxed);
    println!(
        "device allocations: {}   ({} MiB)   dispatches: {}",
        allocs,
        bytes / 1024 / 1024,
        dispatches
    );
}
