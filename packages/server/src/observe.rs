//! Per-node observer registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coapling_core::PushSink;

/// One standing registration: a subscriber's delivery sink plus the
/// per-registration sequence counter.
#[derive(Clone)]
pub struct ObserverRegistration {
    token: String,
    sink: Arc<dyn PushSink>,
    sequence: Arc<AtomicU64>,
    registered_at: DateTime<Utc>,
}

impl ObserverRegistration {
    /// The token scoping this registration to one subscriber client.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn sink(&self) -> &Arc<dyn PushSink> {
        &self.sink
    }

    /// Claim the next sequence number. Strictly increasing per
    /// registration; the initial response carries 0, pushes start at 1.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

impl std::fmt::Debug for ObserverRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistration")
            .field("token", &self.token)
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Ordered set of registrations for one node.
///
/// At most one active registration per token: re-registering replaces the
/// previous entry and restarts its sequence.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Vec<ObserverRegistration>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        ObserverRegistry::default()
    }

    /// Add or replace the registration for `token`.
    pub fn register(&mut self, token: impl Into<String>, sink: Arc<dyn PushSink>) {
        let token = token.into();
        self.entries.retain(|entry| entry.token != token);
        self.entries.push(ObserverRegistration {
            token,
            sink,
            sequence: Arc::new(AtomicU64::new(0)),
            registered_at: Utc::now(),
        });
    }

    /// Remove the registration for `token`. Idempotent; returns whether an
    /// entry was removed.
    pub fn cancel(&mut self, token: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.token != token);
        before != self.entries.len()
    }

    /// A stable copy of the current registrations, in registration order.
    pub fn snapshot(&self) -> Vec<ObserverRegistration> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coapling_core::{Error, Response};

    fn noop_sink() -> Arc<dyn PushSink> {
        Arc::new(|_rsp: Response| Ok::<(), Error>(()))
    }

    #[test]
    fn re_register_replaces_and_restarts_sequence() {
        let mut registry = ObserverRegistry::new();
        registry.register("tok", noop_sink());
        let first = registry.snapshot().remove(0);
        assert_eq!(first.next_sequence(), 1);
        assert_eq!(first.next_sequence(), 2);

        registry.register("tok", noop_sink());
        assert_eq!(registry.len(), 1);
        let second = registry.snapshot().remove(0);
        assert_eq!(second.next_sequence(), 1);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut registry = ObserverRegistry::new();
        registry.register("tok", noop_sink());
        assert!(registry.cancel("tok"));
        assert!(!registry.cancel("tok"));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_stable_against_later_mutation() {
        let mut registry = ObserverRegistry::new();
        registry.register("a", noop_sink());
        registry.register("b", noop_sink());
        let snapshot = registry.snapshot();
        registry.cancel("a");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
    }
}
