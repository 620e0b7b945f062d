//! Change-notification dispatch.
//!
//! On `changed()` the dispatcher takes a stable snapshot of the node's
//! observer set, releases the registry lock and delivers to each snapshot
//! member. Registrations added after the snapshot are not notified by that
//! call; ones removed after the snapshot may still receive this one
//! notification (subscribers de-duplicate via the sequence number).

use std::sync::Arc;

use coapling_core::Response;
use tracing::{debug, warn};

use crate::node::ResourceNode;

/// Delivery options for observer notification.
#[derive(Debug, Clone)]
pub struct NotifyOptions {
    /// Redelivery attempts after a failed push before the registration is
    /// evicted. The default of zero evicts on the first failure.
    pub retry_budget: u32,
}

impl Default for NotifyOptions {
    fn default() -> Self {
        NotifyOptions { retry_budget: 0 }
    }
}

/// Push the node's current content to every observer registered at the
/// snapshot point.
pub(crate) fn notify_observers(node: &Arc<ResourceNode>, options: &NotifyOptions) {
    let snapshot = node.observers.read().unwrap().snapshot();
    if snapshot.is_empty() {
        return;
    }

    let content = node.content();
    debug!(path = %node.path(), observers = snapshot.len(), "notifying observers");

    for registration in snapshot {
        let sequence = registration.next_sequence();
        let mut response = Response::content(content.clone());
        response.observe_sequence = Some(sequence);

        if deliver(&registration, response, options.retry_budget) {
            continue;
        }

        // Delivery failed transport-wise: evict the registration.
        warn!(
            path = %node.path(),
            token = registration.token(),
            "observer delivery failed, evicting registration"
        );
        node.observers.write().unwrap().cancel(registration.token());
    }
}

fn deliver(
    registration: &crate::observe::ObserverRegistration,
    response: Response,
    retry_budget: u32,
) -> bool {
    for attempt in 0..=retry_budget {
        match registration.sink().push(response.clone()) {
            Ok(()) => return true,
            Err(err) => {
                debug!(
                    token = registration.token(),
                    attempt,
                    error = %err,
                    "observer push failed"
                );
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ResourceTree;
    use coapling_core::{path, Error, PushSink};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn recording_sink(log: Arc<Mutex<Vec<u64>>>) -> Arc<dyn PushSink> {
        Arc::new(move |rsp: Response| {
            log.lock().unwrap().push(rsp.observe_sequence.unwrap());
            Ok::<(), Error>(())
        })
    }

    #[test]
    fn sequences_increase_strictly_per_registration() {
        let tree = ResourceTree::new();
        let node = tree.register(&path!("sensor"), crate::Handlers::new()).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        node.observers
            .write()
            .unwrap()
            .register("tok", recording_sink(Arc::clone(&log)));

        node.set_content("a");
        node.changed();
        node.set_content("b");
        node.changed();
        node.changed();

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn failing_sink_is_evicted_after_budget() {
        let tree = ResourceTree::new();
        let node = tree.register(&path!("sensor"), crate::Handlers::new()).unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&attempts);
        let sink: Arc<dyn PushSink> = Arc::new(move |_rsp: Response| {
            counted.fetch_add(1, Ordering::SeqCst);
            Err(Error::transport("unreachable"))
        });
        node.observers.write().unwrap().register("tok", sink);

        node.changed_with(&NotifyOptions { retry_budget: 2 });
        // One initial attempt plus two retries, then eviction.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(node.observers.read().unwrap().is_empty());

        node.changed_with(&NotifyOptions { retry_budget: 2 });
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn registration_added_after_snapshot_not_notified() {
        let tree = ResourceTree::new();
        let node = tree.register(&path!("sensor"), crate::Handlers::new()).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let late_log = Arc::new(Mutex::new(Vec::new()));

        // The first sink registers a second observer while being notified,
        // which must not receive this call's notification.
        let node_for_sink = Arc::clone(&node);
        let late_for_sink = Arc::clone(&late_log);
        let log_for_sink = Arc::clone(&log);
        let sink: Arc<dyn PushSink> = Arc::new(move |rsp: Response| {
            log_for_sink.lock().unwrap().push(rsp.observe_sequence.unwrap());
            node_for_sink
                .observers
                .write()
                .unwrap()
                .register("late", recording_sink(Arc::clone(&late_for_sink)));
            Ok::<(), Error>(())
        });
        node.observers.write().unwrap().register("tok", sink);

        node.changed();
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(late_log.lock().unwrap().is_empty());

        node.changed();
        assert_eq!(late_log.lock().unwrap().len(), 1);
    }
}
