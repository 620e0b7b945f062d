//! In-process request delivery.
//!
//! [`LoopbackTransport`] routes an outgoing request to a node in a local
//! [`ResourceTree`] and runs the node's handler, forming the server side
//! of the dispatch boundary: resolution failures, missing handler slots
//! and handler panics all surface as ordinary protocol responses, never
//! as a crash of the dispatching machinery.
//!
//! Handlers run on the execution context mounted over their subtree when
//! one is registered, so an app's inbound handlers serialize with its
//! interval ticks and async callbacks. Without a mount the handler runs
//! on the dispatching thread. A synchronous self-request from an app's
//! own context would wait on its own queue; such requests must carry a
//! timeout.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, RwLock};

use coapling_client::{CallbackExecutor, DispatchHooks, Transport};
use coapling_core::{Error, Method, ObserveMode, Path, Request, Response, Status};
use coapling_server::{
    cancel_observer, register_observer, AcceptSignal, IncomingRequest, IncomingState, ResourceTree,
};
use tracing::{debug, error, warn};

/// Routes requests to a local resource tree.
pub struct LoopbackTransport {
    tree: Arc<ResourceTree>,
    mounts: RwLock<Vec<(Path, Arc<dyn CallbackExecutor>)>>,
}

impl LoopbackTransport {
    pub fn new(tree: Arc<ResourceTree>) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport {
            tree,
            mounts: RwLock::new(Vec::new()),
        })
    }

    pub fn tree(&self) -> &Arc<ResourceTree> {
        &self.tree
    }

    /// Route every handler invocation under `path` onto `executor`.
    ///
    /// The deepest covering mount wins, so an app mounted at
    /// `/apps/running/timer` shadows one at `/apps`.
    pub fn mount(&self, path: Path, executor: Arc<dyn CallbackExecutor>) {
        self.mounts.write().unwrap().push((path, executor));
    }

    /// Drop the mount at exactly `path`. Idempotent.
    pub fn unmount(&self, path: &Path) {
        self.mounts
            .write()
            .unwrap()
            .retain(|(mounted, _)| mounted != path);
    }

    fn executor_for(&self, path: &Path) -> Option<Arc<dyn CallbackExecutor>> {
        let mounts = self.mounts.read().unwrap();
        mounts
            .iter()
            .filter(|(mounted, _)| path.starts_with(mounted))
            .max_by_key(|(mounted, _)| mounted.segments().len())
            .map(|(_, executor)| Arc::clone(executor))
    }
}

impl Transport for LoopbackTransport {
    fn dispatch(&self, request: Request, hooks: DispatchHooks) -> Result<Response, Error> {
        let path = match Path::parse(&request.uri) {
            Ok(path) => path,
            Err(err) => return Ok(rejection(Status::BadRequest, err.to_string())),
        };
        let node = match self.tree.resolve(&path) {
            Ok(node) => node,
            Err(err) => return Ok(rejection(err.to_status(), err.to_string())),
        };

        // A deregistration takes effect regardless of how the accompanying
        // request fares.
        if request.observe == Some(ObserveMode::Deregister) {
            if let Some(token) = request.token.as_deref() {
                if cancel_observer(&node, token) {
                    debug!(path = %node.path(), token, "observe registration cancelled");
                }
            }
        }

        let handler = match node.handler(request.method) {
            Some(handler) => handler,
            None => {
                return Ok(rejection(
                    Status::MethodNotAllowed,
                    format!("{} has no {} handler", node.path(), request.method.as_str()),
                ))
            }
        };

        let (reply, responses) = mpsc::channel();
        let accept: Option<AcceptSignal> = hooks
            .on_accept
            .map(|hook| Box::new(move || hook()) as AcceptSignal);
        let incoming = IncomingRequest::new(
            request.method,
            request.headers.clone(),
            request.payload.clone(),
            Arc::clone(&node),
            reply,
            accept,
        );

        let invocation_path = node.path().clone();
        let invoke = move || run_handler(handler, incoming, &invocation_path);
        match self.executor_for(&path) {
            // A rejected invocation drops the reply sender, which surfaces
            // below as a transport failure.
            Some(executor) => {
                executor.execute(Box::new(invoke));
            }
            None => invoke(),
        }

        // The sender lives inside the handler invocation; an invocation
        // dropped without responding (context shut down, handler returned
        // silently) closes the channel.
        let mut response = responses
            .recv()
            .map_err(|_| Error::transport("request dropped without a response"))?;

        if request.observe == Some(ObserveMode::Register) && request.method == Method::Get {
            if !node.is_observable() {
                debug!(path = %node.path(), "observe requested on a non-observable resource");
            } else if response.status.is_success() {
                if let (Some(sink), Some(token)) = (hooks.push_sink, request.token.clone()) {
                    register_observer(&node, token, sink);
                    response.observe_sequence = Some(0);
                }
            }
        }
        Ok(response)
    }
}

/// Run one handler invocation, containing panics at the dispatch boundary.
fn run_handler(
    handler: Arc<dyn coapling_server::Handler>,
    mut incoming: IncomingRequest,
    path: &Path,
) {
    let result = catch_unwind(AssertUnwindSafe(|| handler.handle(&mut incoming)));
    if result.is_err() {
        error!(path = %path, "handler panicked");
        if incoming.state() != IncomingState::Responded {
            if incoming
                .respond(Status::InternalServerError, "handler failure")
                .is_err()
            {
                warn!(path = %path, "failure response could not be delivered");
            }
        }
    }
}

fn rejection(status: Status, message: impl Into<bytes::Bytes>) -> Response {
    Response::new(status).with_payload(message)
}
