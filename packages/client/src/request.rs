//! Outgoing request state machine.
//!
//! An [`OutgoingRequest`] walks `Idle → Opened → Sent → {Completed,
//! TimedOut, Errored}`. Exactly one terminal outcome ever commits per
//! send: the response path, the deadline timer and the error path all
//! funnel through one guarded state transition, and whichever commits
//! first wins. A request can be re-opened from a terminal state for
//! reuse; a new generation number makes late commits from the previous
//! send no-ops.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use coapling_core::{
    Error, HeaderValue, Method, ObserveMode, Path, PushSink, Request, Response, Status,
};
use tracing::debug;

use crate::executor::CallbackExecutor;
use crate::transport::{DispatchHooks, Transport};

/// Completion delivery mode, fixed at `open()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `send()` blocks the calling context until a terminal state.
    Sync,
    /// `send()` returns immediately; the terminal outcome arrives through
    /// exactly one of the `on_load`/`on_timeout`/`on_error` callbacks.
    Async,
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Opened,
    Sent,
    Completed,
    TimedOut,
    Errored,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::TimedOut | RequestState::Errored
        )
    }
}

/// Intermediate protocol milestones surfaced through
/// `on_ready_state_change`. These never substitute for the terminal
/// callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Opened,
    Sent,
    /// The server accepted the request for deferred processing.
    Accepted,
    Done,
}

/// Terminal result of a synchronous send.
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed(Response),
    TimedOut,
    Errored(Error),
}

type LoadCallback = Arc<dyn Fn(Response) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(Error) + Send + Sync>;
type TimeoutCallback = Arc<dyn Fn() + Send + Sync>;
type ReadyCallback = Arc<dyn Fn(ReadyState) + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    on_load: Option<LoadCallback>,
    on_error: Option<ErrorCallback>,
    on_timeout: Option<TimeoutCallback>,
    on_ready_state_change: Option<ReadyCallback>,
}

struct Inner {
    state: RequestState,
    generation: u64,
    response: Option<Response>,
    error: Option<Error>,
    callbacks: Callbacks,
}

struct Shared {
    inner: Mutex<Inner>,
    cond: Condvar,
}

enum Terminal {
    Completed(Response),
    TimedOut(u64),
    Errored(Error),
}

impl Shared {
    /// The single guarded transition for all three completion paths.
    /// Returns false for the losing path (late commit), which is a no-op.
    fn commit(
        &self,
        generation: u64,
        terminal: Terminal,
        mode: Mode,
        executor: &Arc<dyn CallbackExecutor>,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.generation != generation || inner.state != RequestState::Sent {
            debug!("late completion ignored");
            return false;
        }

        match &terminal {
            Terminal::Completed(response) => {
                inner.state = RequestState::Completed;
                inner.response = Some(response.clone());
            }
            Terminal::TimedOut(millis) => {
                inner.state = RequestState::TimedOut;
                inner.error = Some(Error::Timeout { millis: *millis });
            }
            Terminal::Errored(error) => {
                inner.state = RequestState::Errored;
                inner.error = Some(error.clone());
            }
        }
        let callbacks = inner.callbacks.clone();
        drop(inner);
        self.cond.notify_all();

        // Sync mode uses no callback path; the blocked send() observes the
        // state directly.
        if mode == Mode::Async {
            executor.execute(Box::new(move || {
                if let Some(ready) = &callbacks.on_ready_state_change {
                    ready(ReadyState::Done);
                }
                match terminal {
                    Terminal::Completed(response) => {
                        if let Some(on_load) = &callbacks.on_load {
                            on_load(response);
                        }
                    }
                    Terminal::TimedOut(_) => {
                        if let Some(on_timeout) = &callbacks.on_timeout {
                            on_timeout();
                        }
                    }
                    Terminal::Errored(error) => {
                        if let Some(on_error) = &callbacks.on_error {
                            on_error(error);
                        }
                    }
                }
            }));
        }
        true
    }
}

/// Delivers observe pushes into the subscriber's callback path.
///
/// A push completes the standing registration's outstanding request with a
/// fresh result; it does not re-run the request state machine. The sink is
/// live only while the send that registered it stands Completed: after a
/// timeout, an error or a re-open it refuses delivery so the dispatcher
/// evicts the stale registration.
struct ObserveSink {
    shared: Arc<Shared>,
    executor: Arc<dyn CallbackExecutor>,
    generation: u64,
}

impl PushSink for ObserveSink {
    fn push(&self, response: Response) -> Result<(), Error> {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.generation != self.generation || inner.state != RequestState::Completed {
            return Err(Error::transport("observe registration is stale"));
        }
        let on_load = match &inner.callbacks.on_load {
            Some(on_load) => Arc::clone(on_load),
            // No one is listening; report failure so the dispatcher can
            // evict the registration.
            None => return Err(Error::transport("subscriber has no on_load callback")),
        };
        inner.response = Some(response.clone());
        drop(inner);

        self.executor.execute(Box::new(move || on_load(response)));
        Ok(())
    }
}

/// One client-initiated request to a (possibly remote) resource.
pub struct OutgoingRequest {
    transport: Arc<dyn Transport>,
    executor: Arc<dyn CallbackExecutor>,
    shared: Arc<Shared>,
    method: Method,
    uri: String,
    mode: Mode,
    headers: coapling_core::Headers,
    timeout: Duration,
    observe: bool,
    token: String,
    observed_uri: Option<String>,
}

impl OutgoingRequest {
    /// Create an idle request bound to a transport and the executor that
    /// will run its asynchronous callbacks.
    pub fn new(transport: Arc<dyn Transport>, executor: Arc<dyn CallbackExecutor>) -> Self {
        OutgoingRequest {
            transport,
            executor,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: RequestState::Idle,
                    generation: 0,
                    response: None,
                    error: None,
                    callbacks: Callbacks::default(),
                }),
                cond: Condvar::new(),
            }),
            method: Method::Get,
            uri: String::new(),
            mode: Mode::Sync,
            headers: coapling_core::Headers::new(),
            timeout: Duration::ZERO,
            observe: false,
            token: uuid::Uuid::new_v4().to_string(),
            observed_uri: None,
        }
    }

    /// Fix method, target and delivery mode; transitions to `Opened`.
    ///
    /// Legal from `Idle` and from any terminal state (requests are
    /// reusable); illegal while a send is in flight. Re-opening resets
    /// staged headers, the observe flag and the previous result.
    pub fn open(&mut self, method: Method, uri: impl Into<String>, mode: Mode) -> Result<(), Error> {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.state == RequestState::Sent {
                return Err(Error::invalid_state("cannot re-open a request in flight"));
            }
            inner.state = RequestState::Opened;
            inner.generation += 1;
            inner.response = None;
            inner.error = None;
        }
        self.method = method;
        self.uri = uri.into();
        self.mode = mode;
        self.headers = coapling_core::Headers::new();
        self.observe = false;
        self.fire_ready(ReadyState::Opened);
        Ok(())
    }

    fn require_configurable(&self) -> Result<(), Error> {
        let state = self.state();
        if matches!(state, RequestState::Idle | RequestState::Opened) {
            Ok(())
        } else {
            Err(Error::invalid_state(format!(
                "configuration is frozen after send (state: {:?})",
                state
            )))
        }
    }

    /// Append a header. Permitted only while `Idle` or `Opened`.
    pub fn set_header(
        &mut self,
        key: impl Into<String>,
        value: impl Into<HeaderValue>,
    ) -> Result<(), Error> {
        self.require_configurable()?;
        self.headers.append(key, value);
        Ok(())
    }

    /// Arm a deadline for the next send. Zero means no timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        self.require_configurable()?;
        self.timeout = timeout;
        Ok(())
    }

    /// Mark the next send as a standing observe registration.
    pub fn set_observe(&mut self) -> Result<(), Error> {
        self.require_configurable()?;
        self.observe = true;
        Ok(())
    }

    pub fn on_load(&mut self, callback: impl Fn(Response) + Send + Sync + 'static) {
        self.shared.inner.lock().unwrap().callbacks.on_load = Some(Arc::new(callback));
    }

    pub fn on_error(&mut self, callback: impl Fn(Error) + Send + Sync + 'static) {
        self.shared.inner.lock().unwrap().callbacks.on_error = Some(Arc::new(callback));
    }

    pub fn on_timeout(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.shared.inner.lock().unwrap().callbacks.on_timeout = Some(Arc::new(callback));
    }

    pub fn on_ready_state_change(&mut self, callback: impl Fn(ReadyState) + Send + Sync + 'static) {
        self.shared.inner.lock().unwrap().callbacks.on_ready_state_change =
            Some(Arc::new(callback));
    }

    /// Clear the load and ready-state callbacks. If this request holds a
    /// standing registration, the target is deregistered as well so the
    /// server stops pushing.
    pub fn clear_callbacks(&mut self) -> Result<(), Error> {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.callbacks.on_load = None;
            inner.callbacks.on_ready_state_change = None;
        }
        self.cancel_observe()
    }

    /// Deregister this request's standing observe registration, if any.
    /// Idempotent; expressed as a deregistration request to the target.
    pub fn cancel_observe(&mut self) -> Result<(), Error> {
        let uri = match self.observed_uri.take() {
            Some(uri) => uri,
            None => return Ok(()),
        };
        let mut request = Request::get(uri);
        request.observe = Some(ObserveMode::Deregister);
        request.token = Some(self.token.clone());
        self.transport
            .dispatch(request, DispatchHooks::default())
            .map(|_| ())
    }

    /// Dispatch the request.
    ///
    /// In `Sync` mode this blocks the calling context until a terminal
    /// state is reached and returns `Some(outcome)`; in `Async` mode it
    /// returns `None` immediately and exactly one terminal callback fires
    /// later. Calling `send()` on a request that was never opened is a
    /// local contract violation.
    pub fn send(&mut self, payload: impl Into<Bytes>) -> Result<Option<Outcome>, Error> {
        let generation = {
            let mut inner = self.shared.inner.lock().unwrap();
            match inner.state {
                RequestState::Opened => {}
                RequestState::Idle => {
                    return Err(Error::invalid_state("send() before open()"));
                }
                state => {
                    return Err(Error::invalid_state(format!(
                        "send() in state {:?}",
                        state
                    )));
                }
            }
            inner.state = RequestState::Sent;
            inner.generation
        };

        let mut request = Request::new(self.method, self.uri.clone());
        request.headers = self.headers.clone();
        request.payload = payload.into();
        request.token = Some(self.token.clone());
        if self.observe {
            request.observe = Some(ObserveMode::Register);
            self.observed_uri = Some(self.uri.clone());
        }

        let hooks = DispatchHooks {
            push_sink: self.observe.then(|| {
                Arc::new(ObserveSink {
                    shared: Arc::clone(&self.shared),
                    executor: Arc::clone(&self.executor),
                    generation,
                }) as Arc<dyn PushSink>
            }),
            on_accept: Some(self.accept_hook(generation)),
        };

        self.fire_ready(ReadyState::Sent);

        let transport = Arc::clone(&self.transport);
        let shared = Arc::clone(&self.shared);
        let executor = Arc::clone(&self.executor);
        let mode = self.mode;
        thread::spawn(move || {
            let terminal = match transport.dispatch(request, hooks) {
                Ok(response) => Terminal::Completed(response),
                Err(error) => Terminal::Errored(error),
            };
            shared.commit(generation, terminal, mode, &executor);
        });

        match self.mode {
            Mode::Sync => Ok(Some(self.wait_for_outcome(generation))),
            Mode::Async => {
                if self.timeout > Duration::ZERO {
                    let shared = Arc::clone(&self.shared);
                    let executor = Arc::clone(&self.executor);
                    let timeout = self.timeout;
                    thread::spawn(move || {
                        thread::sleep(timeout);
                        shared.commit(
                            generation,
                            Terminal::TimedOut(timeout.as_millis() as u64),
                            Mode::Async,
                            &executor,
                        );
                    });
                }
                Ok(None)
            }
        }
    }

    /// Block until the current send reaches a terminal state, arming the
    /// deadline if one is configured.
    fn wait_for_outcome(&self, generation: u64) -> Outcome {
        let deadline = (self.timeout > Duration::ZERO).then(|| Instant::now() + self.timeout);

        let mut inner = self.shared.inner.lock().unwrap();
        while inner.state == RequestState::Sent && inner.generation == generation {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (guard, _timed_out) = self
                        .shared
                        .cond
                        .wait_timeout(inner, deadline - now)
                        .unwrap();
                    inner = guard;
                }
                None => {
                    inner = self.shared.cond.wait(inner).unwrap();
                }
            }
        }

        // Deadline passed with no completion: the timeout path commits
        // under the same lock, so a response can no longer win.
        if inner.state == RequestState::Sent && inner.generation == generation {
            inner.state = RequestState::TimedOut;
            inner.error = Some(Error::Timeout {
                millis: self.timeout.as_millis() as u64,
            });
        }

        match inner.state {
            RequestState::Completed => {
                Outcome::Completed(inner.response.clone().expect("completed without response"))
            }
            RequestState::TimedOut => Outcome::TimedOut,
            RequestState::Errored => {
                Outcome::Errored(inner.error.clone().expect("errored without error"))
            }
            state => Outcome::Errored(Error::invalid_state(format!(
                "send interrupted in state {:?}",
                state
            ))),
        }
    }

    fn accept_hook(&self, generation: u64) -> Arc<dyn Fn() + Send + Sync> {
        let shared = Arc::clone(&self.shared);
        let executor = Arc::clone(&self.executor);
        let mode = self.mode;
        Arc::new(move || {
            if mode != Mode::Async {
                return;
            }
            let inner = shared.inner.lock().unwrap();
            if inner.generation != generation {
                return;
            }
            let ready = inner.callbacks.on_ready_state_change.clone();
            drop(inner);
            if let Some(ready) = ready {
                executor.execute(Box::new(move || ready(ReadyState::Accepted)));
            }
        })
    }

    fn fire_ready(&self, milestone: ReadyState) {
        if self.mode != Mode::Async {
            return;
        }
        let ready = self
            .shared
            .inner
            .lock()
            .unwrap()
            .callbacks
            .on_ready_state_change
            .clone();
        if let Some(ready) = ready {
            self.executor
                .execute(Box::new(move || ready(milestone)));
        }
    }

    pub fn state(&self) -> RequestState {
        self.shared.inner.lock().unwrap().state
    }

    /// The latest completed response, including observe pushes.
    pub fn response(&self) -> Option<Response> {
        self.shared.inner.lock().unwrap().response.clone()
    }

    pub fn status(&self) -> Option<Status> {
        self.response().map(|response| response.status)
    }

    pub fn response_text(&self) -> Option<String> {
        self.response().map(|response| response.payload_text())
    }

    /// Location path announced by a create operation, for later
    /// addressing of the new resource.
    pub fn response_location_path(&self) -> Option<Path> {
        self.response().and_then(|response| response.location_path)
    }

    /// The terminal error of the last send, if it timed out or failed.
    pub fn error(&self) -> Option<Error> {
        self.shared.inner.lock().unwrap().error.clone()
    }

    /// The registration token scoping this client's observe state.
    pub fn token(&self) -> &str {
        &self.token
    }
}
