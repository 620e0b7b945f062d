//! Per-app cooperative execution context.
//!
//! Each hosted app owns one logical single-threaded work queue: handler
//! invocations, interval ticks and asynchronous completion callbacks are
//! posted here and run to completion, one at a time, with no reentrancy.
//! Different apps' contexts run independently of each other and of the
//! engine's dispatch machinery.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use coapling_client::CallbackExecutor;
use tracing::{debug, error, info};

type Task = Box<dyn FnOnce() + Send>;
type UnloadHook = Box<dyn FnOnce() + Send>;

struct ContextInner {
    name: String,
    queue: Mutex<VecDeque<Task>>,
    cond: Condvar,
    shutting_down: AtomicBool,
    unload_hooks: Mutex<Vec<UnloadHook>>,
}

/// One app's execution context.
///
/// Create via [`AppContext::spawn`]; post work with [`AppContext::post`];
/// tear down with [`AppContext::shutdown`], which runs the unload hooks on
/// the app thread before any still-pending tasks and then drains the queue.
pub struct AppContext {
    inner: Arc<ContextInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
    /// Start the context's worker thread.
    pub fn spawn(name: impl Into<String>) -> Arc<AppContext> {
        let inner = Arc::new(ContextInner {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            unload_hooks: Mutex::new(Vec::new()),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name(worker_inner.name.clone())
            .spawn(move || run_queue(worker_inner))
            .expect("failed to spawn app context thread");

        Arc::new(AppContext {
            inner,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Enqueue a task. Tasks posted after shutdown began are dropped.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            debug!(app = self.inner.name, "task dropped, context shutting down");
            return;
        }
        self.inner.queue.lock().unwrap().push_back(Box::new(task));
        self.inner.cond.notify_one();
    }

    /// Register a teardown hook, run exactly once at shutdown.
    pub fn on_unload(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.unload_hooks.lock().unwrap().push(Box::new(hook));
    }

    /// Fire-and-forget diagnostic output on behalf of the app.
    pub fn log(&self, message: impl AsRef<str>) {
        info!(app = self.inner.name, "{}", message.as_ref());
    }

    /// Block the calling context only.
    pub fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    /// Stop intake, run the unload hooks ahead of any still-pending tasks,
    /// drain the queue and join the worker.
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let hooks: Vec<UnloadHook> = self.inner.unload_hooks.lock().unwrap().drain(..).collect();
        let name = self.inner.name.clone();
        let hook_task: Task = Box::new(move || {
            for hook in hooks {
                if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                    error!(app = name, "unload hook panicked");
                }
            }
        });

        {
            let mut queue = self.inner.queue.lock().unwrap();
            // Hooks jump the queue: pending interval ticks and callbacks
            // only fire after teardown ran.
            queue.push_front(hook_task);
        }
        self.inner.cond.notify_one();

        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }
}

impl CallbackExecutor for AppContext {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) -> bool {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.queue.lock().unwrap().push_back(task);
        self.inner.cond.notify_one();
        true
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_queue(inner: Arc<ContextInner>) {
    loop {
        let task = {
            let mut queue = inner.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    break task;
                }
                if inner.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                queue = inner.cond.wait(queue).unwrap();
            }
        };

        // A panicking task must not kill the app's context.
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(app = inner.name, "task panicked in app context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn tasks_run_in_order_without_overlap() {
        let context = AppContext::spawn("ordered");
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();

        for i in 0..10 {
            let log = Arc::clone(&log);
            let tx = tx.clone();
            context.post(move || {
                log.lock().unwrap().push(i);
                if i == 9 {
                    tx.send(()).unwrap();
                }
            });
        }
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_task_does_not_kill_the_context() {
        let context = AppContext::spawn("resilient");
        let (tx, rx) = mpsc::channel();

        context.post(|| panic!("app bug"));
        context.post(move || tx.send(()).unwrap());

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn unload_hooks_run_before_pending_tasks() {
        let context = AppContext::spawn("teardown");
        let log = Arc::new(Mutex::new(Vec::new()));

        // Stall the worker so tasks pile up behind this one.
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        context.post(move || {
            let _ = gate_rx.recv_timeout(Duration::from_secs(2));
        });

        let pending_log = Arc::clone(&log);
        context.post(move || pending_log.lock().unwrap().push("pending"));

        let hook_log = Arc::clone(&log);
        context.on_unload(move || hook_log.lock().unwrap().push("hook"));

        // Begin shutdown while the worker is still stalled, so the hook is
        // queued ahead of the pending task, then release the gate.
        let for_shutdown = Arc::clone(&context);
        let shutdown = thread::spawn(move || for_shutdown.shutdown());
        thread::sleep(Duration::from_millis(50));
        gate_tx.send(()).unwrap();
        shutdown.join().unwrap();

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen, vec!["hook", "pending"]);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let context = AppContext::spawn("twice");
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        context.on_unload(move || flag.store(true, Ordering::SeqCst));

        context.shutdown();
        context.shutdown();
        assert!(ran.load(Ordering::SeqCst));
    }
}
