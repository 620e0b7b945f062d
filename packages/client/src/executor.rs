//! Where asynchronous completion callbacks run.
//!
//! Each hosted app owns one cooperative execution context; the client never
//! invokes async callbacks on its own worker threads. Instead it hands them
//! to a [`CallbackExecutor`], and the host's per-app work queue implements
//! the trait so callbacks run to completion without reentrancy on the
//! app's own thread.

/// Executes completion callbacks on behalf of a subscriber.
///
/// # Object Safety
///
/// This trait is object-safe: clients hold `Arc<dyn CallbackExecutor>`.
pub trait CallbackExecutor: Send + Sync {
    /// Run `task` on this executor's context.
    ///
    /// Returns whether the task was accepted. A rejected task (for
    /// example, the context is shutting down) is dropped unrun, and the
    /// caller must not assume it will ever execute.
    fn execute(&self, task: Box<dyn FnOnce() + Send>) -> bool;
}

/// Runs tasks immediately on the calling thread.
///
/// Suitable for tests and for callers that do their own queueing.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl CallbackExecutor for InlineExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) -> bool {
        task();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn inline_executor_runs_synchronously() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        assert!(InlineExecutor.execute(Box::new(move || flag.store(true, Ordering::SeqCst))));
        assert!(ran.load(Ordering::SeqCst));
    }
}
