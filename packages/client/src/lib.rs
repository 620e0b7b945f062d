//! coapling-client: the outgoing-request side of the engine.
//!
//! An [`OutgoingRequest`] is opened, configured and sent against a
//! [`Transport`]; completion is delivered synchronously to the blocked
//! caller or asynchronously through callback slots running on a
//! [`CallbackExecutor`]. Standing observe registrations reuse the same
//! machinery: each push from the target completes the request again with
//! a fresh result and an increased sequence number.

mod executor;
mod request;
mod transport;

pub use executor::{CallbackExecutor, InlineExecutor};
pub use request::{Mode, Outcome, OutgoingRequest, ReadyState, RequestState};
pub use transport::{DispatchHooks, Transport};
