//! coapling-engine: everything wired together in one process.
//!
//! The [`Engine`] owns a [`coapling_server::ResourceTree`], routes
//! [`coapling_client::OutgoingRequest`]s to it through the in-process
//! [`LoopbackTransport`], runs each installed app on its own
//! [`coapling_host::AppContext`] and drives periodic work through the
//! shared [`coapling_host::IntervalScheduler`].

mod engine;
mod loopback;

pub use engine::{AppHandle, Engine};
pub use loopback::LoopbackTransport;
