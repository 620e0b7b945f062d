//! Inbound request lifecycle.
//!
//! An [`IncomingRequest`] binds one inbound method invocation to its
//! resolved node and owns the accept/respond lifecycle:
//! `Received → (accept) → Accepted → (respond) → Responded`, or
//! `Received → (respond) → Responded` directly. `Responded` is terminal.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use bytes::Bytes;
use coapling_core::{Error, Headers, Method, Path, Response, Status};

use crate::node::ResourceNode;

/// Lifecycle state of an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingState {
    Received,
    Accepted,
    Responded,
}

/// Fired when a handler accepts a request, announcing that processing will
/// take longer than immediate. The transport maps this to an intermediate
/// ready-state milestone on the requesting client.
pub type AcceptSignal = Box<dyn Fn() + Send>;

/// One inbound method invocation bound to a resolved node.
pub struct IncomingRequest {
    method: Method,
    headers: Headers,
    payload: Bytes,
    node: Arc<ResourceNode>,
    location_path: Option<Path>,
    state: IncomingState,
    reply: Option<Sender<Response>>,
    on_accept: Option<AcceptSignal>,
}

impl IncomingRequest {
    pub fn new(
        method: Method,
        headers: Headers,
        payload: Bytes,
        node: Arc<ResourceNode>,
        reply: Sender<Response>,
        on_accept: Option<AcceptSignal>,
    ) -> Self {
        IncomingRequest {
            method,
            headers,
            payload,
            node,
            location_path: None,
            state: IncomingState::Received,
            reply: Some(reply),
            on_accept,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The node this request resolved to.
    pub fn node(&self) -> &Arc<ResourceNode> {
        &self.node
    }

    pub fn state(&self) -> IncomingState {
        self.state
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The request payload as lossy text.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Parse the payload as a decimal integer.
    ///
    /// Malformed input is an expected validation failure and surfaces as
    /// `Error::BadRequest`, never a panic.
    pub fn payload_as_i64(&self) -> Result<i64, Error> {
        let text = self.payload_text();
        text.trim()
            .parse::<i64>()
            .map_err(|_| Error::bad_request(format!("expected an integer payload, got '{}'", text)))
    }

    /// Announce the path of a resource this request created. Carried on
    /// the response as its location path.
    pub fn set_location_path(&mut self, path: Path) {
        self.location_path = Some(path);
    }

    /// Signal that processing will take longer than immediate, without
    /// committing a final result.
    ///
    /// Callable at most once and only while `Received`.
    pub fn accept(&mut self) -> Result<(), Error> {
        match self.state {
            IncomingState::Received => {
                self.state = IncomingState::Accepted;
                if let Some(signal) = &self.on_accept {
                    signal();
                }
                Ok(())
            }
            IncomingState::Accepted => Err(Error::invalid_state("request already accepted")),
            IncomingState::Responded => Err(Error::invalid_state("request already responded")),
        }
    }

    /// Send the final response. Callable at most once, from `Received` or
    /// `Accepted`; transitions to the terminal `Responded` state.
    pub fn respond(&mut self, status: Status, payload: impl Into<Bytes>) -> Result<(), Error> {
        let response = Response::new(status).with_payload(payload);
        self.respond_with(response)
    }

    /// Send a fully formed response. The request's location path, if set,
    /// overrides the response's.
    pub fn respond_with(&mut self, mut response: Response) -> Result<(), Error> {
        if self.state == IncomingState::Responded {
            return Err(Error::invalid_state("request already responded"));
        }
        let reply = self
            .reply
            .take()
            .ok_or_else(|| Error::invalid_state("responder already detached"))?;
        if let Some(path) = self.location_path.take() {
            response.location_path = Some(path);
        }
        self.state = IncomingState::Responded;
        reply
            .send(response)
            .map_err(|_| Error::transport("requester is gone"))
    }

    /// Report an error through the normal response path.
    pub fn respond_error(&mut self, error: &Error) -> Result<(), Error> {
        self.respond(error.to_status(), error.to_string())
    }

    /// Accept the request and detach a one-shot [`Responder`] that can be
    /// moved to another execution context for a deferred response.
    ///
    /// The request stays `Accepted` while the responder is outstanding;
    /// only the detached responder can commit the final response, and any
    /// further `respond` on the request itself is an invalid-state error.
    pub fn accept_deferred(&mut self) -> Result<Responder, Error> {
        self.accept()?;
        let reply = self
            .reply
            .take()
            .ok_or_else(|| Error::invalid_state("responder already detached"))?;
        Ok(Responder {
            reply,
            location_path: self.location_path.take(),
        })
    }
}

/// One-shot handle for responding to an accepted request later.
pub struct Responder {
    reply: Sender<Response>,
    location_path: Option<Path>,
}

impl Responder {
    pub fn respond(self, status: Status, payload: impl Into<Bytes>) -> Result<(), Error> {
        self.respond_with(Response::new(status).with_payload(payload))
    }

    pub fn respond_with(self, mut response: Response) -> Result<(), Error> {
        if let Some(path) = self.location_path {
            response.location_path = Some(path);
        }
        self.reply
            .send(response)
            .map_err(|_| Error::transport("requester is gone"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ResourceTree;
    use coapling_core::path;
    use std::sync::mpsc;

    fn request_for_test() -> (IncomingRequest, mpsc::Receiver<Response>) {
        let tree = ResourceTree::new();
        let node = tree.register(&path!("target"), crate::Handlers::new()).unwrap();
        let (tx, rx) = mpsc::channel();
        let request = IncomingRequest::new(
            Method::Post,
            Headers::new(),
            Bytes::from("17"),
            node,
            tx,
            None,
        );
        (request, rx)
    }

    #[test]
    fn respond_is_terminal_and_single_shot() {
        let (mut request, rx) = request_for_test();
        request.respond(Status::Content, "ok").unwrap();
        assert_eq!(request.state(), IncomingState::Responded);

        let err = request.respond(Status::Content, "again").unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        let response = rx.recv().unwrap();
        assert_eq!(response.status, Status::Content);
        assert_eq!(response.payload_text(), "ok");
    }

    #[test]
    fn accept_only_once_and_only_before_respond() {
        let (mut request, _rx) = request_for_test();
        request.accept().unwrap();
        assert_eq!(request.state(), IncomingState::Accepted);
        assert!(matches!(
            request.accept(),
            Err(Error::InvalidState { .. })
        ));

        request.respond(Status::Changed, "").unwrap();
        assert!(matches!(
            request.accept(),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn accept_fires_signal() {
        let tree = ResourceTree::new();
        let node = tree.register(&path!("target"), crate::Handlers::new()).unwrap();
        let (tx, _rx) = mpsc::channel();
        let (signal_tx, signal_rx) = mpsc::channel();
        let mut request = IncomingRequest::new(
            Method::Get,
            Headers::new(),
            Bytes::new(),
            node,
            tx,
            Some(Box::new(move || {
                let _ = signal_tx.send(());
            })),
        );
        request.accept().unwrap();
        assert!(signal_rx.try_recv().is_ok());
    }

    #[test]
    fn location_path_carried_on_response() {
        let (mut request, rx) = request_for_test();
        request.set_location_path(path!("target/created"));
        request.respond(Status::Created, "").unwrap();
        let response = rx.recv().unwrap();
        assert_eq!(response.location_path, Some(path!("target/created")));
    }

    #[test]
    fn deferred_responder_answers_from_elsewhere() {
        let (mut request, rx) = request_for_test();
        let responder = request.accept_deferred().unwrap();

        // Accepted, not terminal: the response is still outstanding.
        assert_eq!(request.state(), IncomingState::Accepted);

        // Only the detached responder can commit the response.
        assert!(matches!(
            request.respond(Status::Content, "late"),
            Err(Error::InvalidState { .. })
        ));

        std::thread::spawn(move || {
            responder.respond(Status::Content, "deferred").unwrap();
        });
        let response = rx.recv().unwrap();
        assert_eq!(response.payload_text(), "deferred");
    }

    #[test]
    fn malformed_integer_payload_is_bad_request() {
        let (request, _rx) = request_for_test();
        assert_eq!(request.payload_as_i64().unwrap(), 17);

        let tree = ResourceTree::new();
        let node = tree.register(&path!("t2"), crate::Handlers::new()).unwrap();
        let (tx, _rx2) = mpsc::channel();
        let bad = IncomingRequest::new(
            Method::Post,
            Headers::new(),
            Bytes::from("seventeen"),
            node,
            tx,
            None,
        );
        assert!(matches!(
            bad.payload_as_i64(),
            Err(Error::BadRequest { .. })
        ));
    }
}
