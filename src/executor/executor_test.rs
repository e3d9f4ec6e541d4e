use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn start_spawns_low_watermark_workers() {
    let ex = Executor::new(2, 4, Duration::from_millis(50), 8);
    ex.start();
    std::thread::sleep(Duration::from_millis(20));
    let c = ex.counters();
    assert_eq!(c.threads, 2);
    assert_eq!(c.free_threads, 2);
    assert!(c.running);
    ex.stop(true);
}

#[test]
fn execute_runs_the_task() {
    let ex = Executor::new(1, 2, Duration::from_millis(50), 8);
    ex.start();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = ran.clone();
    assert!(ex.execute(Box::new(move || {
        ran2.fetch_add(1, Ordering::SeqCst);
    })));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    ex.stop(true);
}

#[test]
fn execute_before_start_is_rejected() {
    let ex = Executor::new(1, 2, Duration::from_millis(50), 8);
    assert!(!ex.execute(Box::new(|| {})));
}

#[test]
fn execute_rejects_once_queue_is_full() {
    // A single, permanently busy worker so tasks pile up in the queue.
    let ex = Executor::new(1, 1, Duration::from_millis(500), 2);
    ex.start();
    let (tx, rx) = std::sync::mpsc::channel::<()>();
    let rx = Arc::new(Mutex::new(rx));
    // First task blocks the only worker until released.
    assert!(ex.execute(Box::new(move || {
        let _ = rx.lock().recv();
    })));
    std::thread::sleep(Duration::from_millis(20));
    assert!(ex.execute(Box::new(|| {})));
    assert!(ex.execute(Box::new(|| {})));
    // Queue is now at max_queue=2; the next submission must be rejected.
    assert!(!ex.execute(Box::new(|| {})));
    let _ = tx.send(());
    std::thread::sleep(Duration::from_millis(50));
    ex.stop(true);
}

#[test]
fn scales_up_under_concurrent_load_and_back_down_when_idle() {
    let ex = Executor::new(2, 4, Duration::from_millis(50), 8);
    ex.start();
    for _ in 0..4 {
        assert!(ex.execute(Box::new(|| {
            std::thread::sleep(Duration::from_millis(100));
        })));
    }
    std::thread::sleep(Duration::from_millis(30));
    let busy = ex.counters();
    assert_eq!(busy.threads, 4, "four concurrent long tasks should grow to high_watermark");

    std::thread::sleep(Duration::from_millis(300));
    let idle = ex.counters();
    assert_eq!(idle.threads, 2, "idle workers above low_watermark must self-reap");
    ex.stop(true);
}

#[test]
fn stop_await_drains_the_queue_and_zeroes_threads() {
    let ex = Executor::new(2, 4, Duration::from_millis(50), 8);
    ex.start();
    let completed = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
        let completed = completed.clone();
        ex.execute(Box::new(move || {
            completed.fetch_add(1, Ordering::SeqCst);
        }));
    }
    ex.stop(true);
    assert_eq!(completed.load(Ordering::SeqCst), 5, "stop(await=true) must drain the queue first");
    let c = ex.counters();
    assert_eq!(c.threads, 0);
    assert_eq!(c.queue_len, 0);
}

#[test]
fn stop_on_a_never_started_executor_is_a_noop() {
    let ex = Executor::new(1, 2, Duration::from_millis(50), 8);
    ex.stop(true);
    assert_eq!(ex.counters().threads, 0);
}

#[test]
fn panicking_task_does_not_poison_the_pool() {
    let ex = Executor::new(1, 1, Duration::from_millis(200), 8);
    ex.start();
    assert!(ex.execute(Box::new(|| panic!("boom"))));
    std::thread::sleep(Duration::from_millis(30));
    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = ran.clone();
    assert!(ex.execute(Box::new(move || {
        ran2.fetch_add(1, Ordering::SeqCst);
    })));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(ran.load(Ordering::SeqCst), 1, "worker must survive a panicking task");
    ex.stop(true);
}
