//! Autoscaling worker pool (C4) with idle reaping. Grounded on the
//! `Stopped/Running/Stopping` state machine of the lineage's `Executor`
//! (counter discipline corrected: the exit path decrements `threads` and
//! `free_threads` exactly once, unlike the underflow the original exhibits).

mod counters;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub use counters::Counters;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Run,
    Stopping,
}

struct Params {
    max_queue: usize,
    low_watermark: usize,
    high_watermark: usize,
    idle_timeout: Duration,
}

struct StateData {
    phase: Phase,
    queue: VecDeque<Task>,
    threads: usize,
    free_threads: usize,
}

struct Inner {
    params: Params,
    state: Mutex<StateData>,
    empty_cv: Condvar,
    stop_cv: Condvar,
}

/// A bounded pool of OS threads that grows from `low_watermark` up to
/// `high_watermark` under load and reaps idle workers back down.
pub struct Executor {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    pub fn new(low_watermark: usize, high_watermark: usize, idle_timeout: Duration, max_queue: usize) -> Self {
        assert!(low_watermark >= 1, "low_watermark must be at least 1");
        assert!(high_watermark >= low_watermark, "high_watermark must be >= low_watermark");
        assert!(max_queue >= 1, "max_queue must be at least 1");
        Self {
            inner: Arc::new(Inner {
                params: Params {
                    max_queue,
                    low_watermark,
                    high_watermark,
                    idle_timeout,
                },
                state: Mutex::new(StateData {
                    phase: Phase::Stopped,
                    queue: VecDeque::new(),
                    threads: 0,
                    free_threads: 0,
                }),
                empty_cv: Condvar::new(),
                stop_cv: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self) {
        let mut st = self.inner.state.lock();
        if st.phase != Phase::Stopped {
            return;
        }
        st.phase = Phase::Run;
        st.threads = self.inner.params.low_watermark;
        st.free_threads = self.inner.params.low_watermark;
        drop(st);

        let mut workers = self.workers.lock();
        for _ in 0..self.inner.params.low_watermark {
            workers.push(spawn_worker(self.inner.clone()));
        }
    }

    /// Enqueues `task`, returning `false` (no side effect) if the executor
    /// is not running or the queue is already at `max_queue`.
    pub fn execute(&self, task: Task) -> bool {
        let mut st = self.inner.state.lock();
        if st.phase != Phase::Run || st.queue.len() == self.inner.params.max_queue {
            return false;
        }
        let was_empty = st.queue.is_empty();
        st.queue.push_back(task);

        if st.free_threads == 0 && st.threads < self.inner.params.high_watermark {
            st.threads += 1;
            st.free_threads += 1;
            drop(st);
            self.workers.lock().push(spawn_worker(self.inner.clone()));
        } else if was_empty {
            drop(st);
            self.inner.empty_cv.notify_one();
        }
        true
    }

    /// `await=true` blocks until every worker has exited and the queue is
    /// drained; `await=false` returns immediately after signalling.
    pub fn stop(&self, await_drain: bool) {
        {
            let mut st = self.inner.state.lock();
            match st.phase {
                Phase::Stopped => {}
                Phase::Stopping => {}
                Phase::Run => {
                    if st.threads == 0 {
                        st.phase = Phase::Stopped;
                    } else {
                        st.phase = Phase::Stopping;
                        drop(st);
                        self.inner.empty_cv.notify_all();
                    }
                }
            }
        }
        if !await_drain {
            return;
        }
        let mut st = self.inner.state.lock();
        while st.phase != Phase::Stopped {
            self.inner.stop_cv.wait(&mut st);
        }
        drop(st);
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }

    pub fn counters(&self) -> Counters {
        let st = self.inner.state.lock();
        Counters {
            threads: st.threads,
            free_threads: st.free_threads,
            queue_len: st.queue.len(),
            running: st.phase == Phase::Run,
        }
    }
}

fn spawn_worker(inner: Arc<Inner>) -> JoinHandle<()> {
    thread::spawn(move || worker_loop(inner))
}

fn worker_loop(inner: Arc<Inner>) {
    let mut guard = inner.state.lock();
    let mut idle_since = Instant::now();
    loop {
        if let Some(task) = guard.queue.pop_front() {
            guard.free_threads -= 1;
            drop(guard);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                let msg = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("non-string panic payload");
                tracing::error!(%msg, "executor task panicked; worker continues");
            }
            guard = inner.state.lock();
            guard.free_threads += 1;
            idle_since = Instant::now();
            continue;
        }

        if guard.phase == Phase::Stopping {
            reap(&mut guard, &inner);
            return;
        }

        let deadline = idle_since + inner.params.idle_timeout;
        let now = Instant::now();
        if now >= deadline {
            if guard.threads > inner.params.low_watermark {
                reap(&mut guard, &inner);
                return;
            }
            idle_since = now;
            continue;
        }

        inner.empty_cv.wait_for(&mut guard, deadline - now);
    }
}

/// Decrements the live-thread counters for a worker that is about to exit,
/// transitioning `Stopping -> Stopped` and waking `stop(await=true)` if this
/// was the last worker.
fn reap(guard: &mut parking_lot::MutexGuard<'_, StateData>, inner: &Inner) {
    guard.threads -= 1;
    guard.free_threads -= 1;
    if guard.threads == 0 && guard.phase == Phase::Stopping {
        guard.phase = Phase::Stopped;
        inner.stop_cv.notify_all();
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod executor_test;
