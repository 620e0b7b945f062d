//! coapling-core: the shared message model for the coapling engine.
//!
//! This crate holds the types every layer speaks: validated resource
//! [`Path`]s, the [`Method`] set, the ordered [`Headers`] multimap, the
//! canonical [`Status`] registry with its conversion table, the abstract
//! [`Request`]/[`Response`] messages, the [`PushSink`] observe-delivery
//! seam and the [`Error`] kinds.
//!
//! Wire-level encoding, security and discovery are out of scope; the model
//! here is what an in-process transport routes between hosted apps.

mod error;
mod header;
mod message;
mod method;
mod observe;
mod path;
mod status;

pub use error::Error;
pub use header::{HeaderValue, Headers};
pub use message::{ObserveMode, Request, Response};
pub use method::Method;
pub use observe::PushSink;
pub use path::{Path, PathError};
pub use status::Status;
