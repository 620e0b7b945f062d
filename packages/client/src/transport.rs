//! Transport seam for outgoing requests.
//!
//! The client never encodes bytes; wire-level encoding is out of scope.
//! A [`Transport`] routes a structured [`Request`] to its target and
//! returns the structured [`Response`]. The production implementation is
//! the engine's in-process loopback; tests use scripted mocks.

use std::sync::Arc;

use coapling_core::{Error, PushSink, Request, Response};

/// Per-dispatch hooks handed from the client to the transport.
#[derive(Default)]
pub struct DispatchHooks {
    /// Delivery sink to register at the target when the request carries
    /// an observe registration.
    pub push_sink: Option<Arc<dyn PushSink>>,
    /// Fired when the server accepts the request for deferred processing.
    pub on_accept: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Routes one request to its target resource.
///
/// `dispatch` blocks the calling thread until the target responds or the
/// delivery fails; the client owns deadlines and runs `dispatch` on a
/// worker thread so a timeout can cut the wait short.
///
/// # Object Safety
///
/// This trait is object-safe: clients hold `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn dispatch(&self, request: Request, hooks: DispatchHooks) -> Result<Response, Error>;
}

/// Scripted transport for tests.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// A mock transport returning predefined responses by request URI.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<HashMap<String, Response>>,
        delay: Mutex<Option<Duration>>,
        fail_message: Mutex<Option<String>>,
        recorded: Mutex<Vec<Request>>,
        sinks: Mutex<Vec<Arc<dyn PushSink>>>,
    }

    impl MockTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(MockTransport::default())
        }

        pub fn with_response(self: Arc<Self>, uri: impl Into<String>, response: Response) -> Arc<Self> {
            self.responses.lock().unwrap().insert(uri.into(), response);
            self
        }

        /// Delay every dispatch, to exercise timeout paths.
        pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
            *self.delay.lock().unwrap() = Some(delay);
            self
        }

        /// Fail every dispatch with a transport error.
        pub fn fail_with(self: Arc<Self>, message: impl Into<String>) -> Arc<Self> {
            *self.fail_message.lock().unwrap() = Some(message.into());
            self
        }

        /// Requests seen so far, in dispatch order.
        pub fn recorded(&self) -> Vec<Request> {
            self.recorded.lock().unwrap().clone()
        }

        /// Push sinks registered through observe dispatches.
        pub fn sinks(&self) -> Vec<Arc<dyn PushSink>> {
            self.sinks.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn dispatch(&self, request: Request, hooks: DispatchHooks) -> Result<Response, Error> {
            self.recorded.lock().unwrap().push(request.clone());

            if let Some(delay) = *self.delay.lock().unwrap() {
                std::thread::sleep(delay);
            }
            if let Some(message) = self.fail_message.lock().unwrap().clone() {
                return Err(Error::transport(message));
            }
            if let Some(sink) = hooks.push_sink {
                self.sinks.lock().unwrap().push(sink);
            }

            let responses = self.responses.lock().unwrap();
            match responses.get(&request.uri) {
                Some(response) => Ok(response.clone()),
                None => Ok(Response::new(coapling_core::Status::NotFound)),
            }
        }
    }
}
