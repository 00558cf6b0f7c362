//! Timer and repeater cadence.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use botd::error::TimerError;
use botd::runtime::timer::{Clock, Repeater, Timer};
use common::wait_until;

#[test]
fn repeater_fire_count_tracks_the_window() {
    const INTERVAL: Duration = Duration::from_millis(100);
    const N: usize = 5;

    let clock = Clock::new().unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let repeater = Repeater::new(&clock, INTERVAL, "window", move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    repeater.start();
    thread::sleep(INTERVAL * N as u32 + Duration::from_millis(50));
    repeater.exit();

    let fired = count.load(Ordering::SeqCst);
    assert!((N - 1..=N + 1).contains(&fired), "fired {fired} times in the window");
    clock.shutdown();
}

#[test]
fn slow_jobs_overlap_instead_of_delaying_the_cadence() {
    let clock = Clock::new().unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (r, p) = (running.clone(), peak.clone());

    let repeater = Repeater::new(&clock, Duration::from_millis(30), "slow", move || {
        let now = r.fetch_add(1, Ordering::SeqCst) + 1;
        p.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(150));
        r.fetch_sub(1, Ordering::SeqCst);
    })
    .unwrap();

    repeater.start();
    assert!(wait_until(|| peak.load(Ordering::SeqCst) >= 2), "jobs never overlapped");
    // Several firings were scheduled while the first job was still sleeping.
    assert!(repeater.snapshot().fires >= 2);
    repeater.exit();
    clock.shutdown();
}

#[test]
fn exit_stops_the_cycle() {
    let clock = Clock::new().unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let repeater = Repeater::new(&clock, Duration::from_millis(10), "short", move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    repeater.start();
    assert!(wait_until(|| count.load(Ordering::SeqCst) >= 3));
    repeater.exit();
    // Jobs already launched may still land; wait them out.
    thread::sleep(Duration::from_millis(50));
    let settled = count.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), settled);
    assert!(!repeater.snapshot().pending);
    clock.shutdown();
}

#[test]
fn one_shot_timer_runs_on_a_named_thread() {
    let clock = Clock::new().unwrap();
    let name = Arc::new(std::sync::Mutex::new(None));
    let n = name.clone();
    let timer = Timer::new(&clock, Duration::from_millis(10), move || {
        *n.lock().unwrap() = thread::current().name().map(str::to_string);
    })
    .named("reminder");

    timer.start();
    assert!(wait_until(|| name.lock().unwrap().is_some()));
    assert_eq!(name.lock().unwrap().as_deref(), Some("reminder"));
    assert_eq!(timer.snapshot().fires, 1);
    clock.shutdown();
}

#[test]
fn zero_interval_is_rejected() {
    let clock = Clock::new().unwrap();
    let result = Repeater::new(&clock, Duration::ZERO, "busy", || {});
    assert!(matches!(result, Err(TimerError::ZeroInterval(_))));
    clock.shutdown();
}
