//! Abstract request/response message model.
//!
//! Wire-level byte encoding is out of scope; these are the structured
//! messages the engine routes between clients, the tree and observers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Headers, Method, Path, Status};

/// Observe option on an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObserveMode {
    /// Establish a standing registration at the target.
    Register,
    /// Cancel a standing registration identified by the request token.
    Deregister,
}

/// A client-originated request message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    /// Target resource, as a path-shaped URI string.
    pub uri: String,
    #[serde(default, skip_serializing_if = "Headers::is_empty")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Bytes::is_empty")]
    pub payload: Bytes,
    /// Standing-registration option, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observe: Option<ObserveMode>,
    /// Registration token scoping observe state to one client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Request {
            method,
            uri: uri.into(),
            ..Request::default()
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Request::new(Method::Get, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Request::new(Method::Post, uri)
    }

    pub fn put(uri: impl Into<String>) -> Self {
        Request::new(Method::Put, uri)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Request::new(Method::Delete, uri)
    }

    pub fn with_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<crate::HeaderValue>,
    ) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// The request payload as lossy text.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// A response message, also used as the body of an observe push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Headers::is_empty")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Bytes::is_empty")]
    pub payload: Bytes,
    /// Path of a newly created resource, set by the handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_path: Option<Path>,
    /// Strictly increasing per observe registration; absent on ordinary
    /// responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observe_sequence: Option<u64>,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Response {
            status,
            headers: Headers::new(),
            payload: Bytes::new(),
            location_path: None,
            observe_sequence: None,
        }
    }

    /// A 2.05 Content response with the given payload.
    pub fn content(payload: impl Into<Bytes>) -> Self {
        Response::new(Status::Content).with_payload(payload)
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_location_path(mut self, path: Path) -> Self {
        self.location_path = Some(path);
        self
    }

    /// The response payload as lossy text.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
