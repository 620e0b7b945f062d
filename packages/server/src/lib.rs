//! coapling-server: the resource tree and inbound dispatch state.
//!
//! A [`ResourceTree`] is a process-wide, dynamically mutable namespace of
//! addressable [`ResourceNode`]s. Each node carries up to one [`Handler`]
//! per method, opaque content and an observer registry. Inbound
//! invocations are modeled as [`IncomingRequest`]s with an accept/respond
//! lifecycle; `changed()` on a node pushes the current content to every
//! registered observer through their [`coapling_core::PushSink`]s.

mod incoming;
mod node;
mod notify;
mod observe;
mod tree;

pub use incoming::{AcceptSignal, IncomingRequest, IncomingState, Responder};
pub use node::{Handler, ResourceNode};
pub use notify::NotifyOptions;
pub use observe::{ObserverRegistration, ObserverRegistry};
pub use tree::{Handlers, ResourceTree};

use std::sync::Arc;

use coapling_core::PushSink;

/// Attach or replace an observe registration at `node`.
pub fn register_observer(node: &ResourceNode, token: impl Into<String>, sink: Arc<dyn PushSink>) {
    node.observers.write().unwrap().register(token, sink);
}

/// Cancel an observe registration at `node`. Idempotent.
pub fn cancel_observer(node: &ResourceNode, token: &str) -> bool {
    node.observers.write().unwrap().cancel(token)
}

/// Number of active registrations at `node`.
pub fn observer_count(node: &ResourceNode) -> usize {
    node.observers.read().unwrap().len()
}
