//! Process-wide periodic-callback facility.
//!
//! One timer thread serves every app. Each registration posts its callback
//! to the owning app's executor when due; a per-registration busy flag
//! skips (never queues) a tick whose predecessor is still running, so a
//! slow callback can never build an unbounded backlog.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use coapling_client::CallbackExecutor;
use tracing::{debug, warn};

struct Entry {
    period: Duration,
    next_due: Instant,
    busy: Arc<AtomicBool>,
    task: Arc<dyn Fn() + Send + Sync>,
    executor: Arc<dyn CallbackExecutor>,
}

struct SchedulerState {
    entries: HashMap<u64, Entry>,
    next_id: u64,
    shutdown: bool,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    cond: Condvar,
}

/// Handle for cancelling one interval registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalHandle(u64);

/// Shared periodic scheduler.
pub struct IntervalScheduler {
    inner: Arc<SchedulerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedulerState {
                entries: HashMap::new(),
                next_id: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        let timer_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("interval-scheduler".to_string())
            .spawn(move || run_timer(timer_inner))
            .expect("failed to spawn scheduler thread");

        IntervalScheduler {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Register a periodic task. The callback runs on `executor`; a tick
    /// due while the previous invocation still runs is skipped.
    pub fn set_interval(
        &self,
        executor: Arc<dyn CallbackExecutor>,
        period: Duration,
        task: impl Fn() + Send + Sync + 'static,
    ) -> IntervalHandle {
        assert!(period > Duration::ZERO, "interval period must be non-zero");
        let mut state = self.inner.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.insert(
            id,
            Entry {
                period,
                next_due: Instant::now() + period,
                busy: Arc::new(AtomicBool::new(false)),
                task: Arc::new(task),
                executor,
            },
        );
        drop(state);
        self.inner.cond.notify_one();
        IntervalHandle(id)
    }

    /// Remove a registration. Idempotent; a tick already posted to the
    /// app's queue may still run once.
    pub fn cancel(&self, handle: IntervalHandle) {
        let mut state = self.inner.state.lock().unwrap();
        if state.entries.remove(&handle.0).is_some() {
            debug!(id = handle.0, "interval cancelled");
        }
        drop(state);
        self.inner.cond.notify_one();
    }

    /// Stop the timer thread. No further ticks fire.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.entries.clear();
        }
        self.inner.cond.notify_one();
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        IntervalScheduler::new()
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer(inner: Arc<SchedulerInner>) {
    let mut state = inner.state.lock().unwrap();
    loop {
        if state.shutdown {
            return;
        }

        let now = Instant::now();
        let mut due: Vec<(u64, Arc<AtomicBool>, Arc<dyn Fn() + Send + Sync>, Arc<dyn CallbackExecutor>)> =
            Vec::new();
        let mut earliest: Option<Instant> = None;

        for (id, entry) in state.entries.iter_mut() {
            if entry.next_due <= now {
                // Re-arm relative to now so a stalled timer does not burst.
                entry.next_due = now + entry.period;
                due.push((
                    *id,
                    Arc::clone(&entry.busy),
                    Arc::clone(&entry.task),
                    Arc::clone(&entry.executor),
                ));
            }
            earliest = Some(match earliest {
                Some(e) => e.min(entry.next_due),
                None => entry.next_due,
            });
        }

        if !due.is_empty() {
            drop(state);
            for (id, busy, task, executor) in due {
                if busy.swap(true, Ordering::SeqCst) {
                    // Previous invocation still running: skip this tick.
                    warn!(id, "interval tick skipped, previous run still active");
                    continue;
                }
                let tick_busy = Arc::clone(&busy);
                let accepted = executor.execute(Box::new(move || {
                    let result = catch_unwind(AssertUnwindSafe(|| task()));
                    tick_busy.store(false, Ordering::SeqCst);
                    if result.is_err() {
                        warn!(id, "interval callback panicked");
                    }
                }));
                // A rejected tick never runs, so it must not hold the flag.
                if !accepted {
                    busy.store(false, Ordering::SeqCst);
                }
            }
            state = inner.state.lock().unwrap();
            continue;
        }

        state = match earliest {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    continue;
                }
                inner.cond.wait_timeout(state, deadline - now).unwrap().0
            }
            None => inner.cond.wait(state).unwrap(),
        };
    }
}
