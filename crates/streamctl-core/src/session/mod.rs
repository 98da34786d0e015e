//! Remote-control session.
//!
//! [`Remote`] is the caller-facing handle. It owns a dedicated thread with a
//! current-thread tokio runtime on which the session worker runs; every
//! caller operation is posted to that worker as a command, and every handler
//! fires on the session thread.
//!
//! Only one request may be outstanding at a time. A second request made
//! while the first is unanswered fails immediately with a busy connection
//! error through its own error handler.
//!
//! Handlers must not call [`Remote::shutdown`]: it joins the thread they run
//! on.

mod handlers;
mod worker;

use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::thread::JoinHandle;

use streamctl_rpc::{ConnectionError, Presence, Request, classify};
use streamctl_types::{RemoteError, StartEvent, StatusInfo, StopEvent};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use crate::{Config, Error, Result};

pub use handlers::{
    ConnectHandler, DisconnectHandler, ErrorHandler, StartEventHandler, StatusHandler,
    StopEventHandler, SuccessHandler,
};

use handlers::{ResponseHandler, Subscription};
use worker::{Command, Worker};

/// Connection and admission state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Connected with no request outstanding.
    ConnectedIdle,
    /// Connected with a request awaiting its response.
    ConnectedBusy,
}

impl SessionState {
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::ConnectedIdle | SessionState::ConnectedBusy
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::ConnectedIdle => "connected",
            SessionState::ConnectedBusy => "busy",
        };
        f.write_str(name)
    }
}

static LIVE_ENDPOINTS: LazyLock<Mutex<HashSet<String>>> = LazyLock::new(Mutex::default);

/// Exclusive claim on an endpoint, released on drop.
struct EndpointClaim(String);

impl EndpointClaim {
    fn acquire(endpoint: &str) -> Result<Self> {
        let mut live = LIVE_ENDPOINTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !live.insert(endpoint.to_string()) {
            return Err(Error::AlreadyRunning(endpoint.to_string()));
        }
        Ok(Self(endpoint.to_string()))
    }
}

impl Drop for EndpointClaim {
    fn drop(&mut self) {
        LIVE_ENDPOINTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.0);
    }
}

/// Handle to a running remote-control session.
pub struct Remote {
    endpoint: String,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    worker: Option<JoinHandle<()>>,
    claim: Option<EndpointClaim>,
}

impl Remote {
    /// Start a session using the presence check the config describes.
    ///
    /// # Errors
    ///
    /// See [`Remote::start_with_presence`].
    pub fn start(config: &Config) -> Result<Self> {
        Self::start_with_presence(config, config.presence())
    }

    /// Start a session that probes `presence` before every connect attempt.
    ///
    /// The first connect attempt begins immediately; failures are retried
    /// every `retry_delay_ms` until the session is shut down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid config,
    /// [`Error::AlreadyRunning`] when a session for the same endpoint is
    /// live in this process, or [`Error::Io`] when the session thread or its
    /// runtime cannot be created.
    pub fn start_with_presence(config: &Config, presence: Arc<dyn Presence>) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint();
        let claim = EndpointClaim::acquire(&endpoint)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SessionState::Disconnected);
        let worker = Worker::new(
            endpoint.clone(),
            presence,
            config.retry_delay(),
            commands_rx,
            state_tx,
        );

        let handle = std::thread::Builder::new()
            .name("streamctl-session".to_string())
            .spawn(move || runtime.block_on(worker.run()))?;

        info!("Session started for {endpoint}");
        Ok(Self {
            endpoint,
            commands,
            state,
            worker: Some(handle),
            claim: Some(claim),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Called each time a connection opens.
    pub fn register_connect_handler(&self, handler: impl FnMut() + Send + 'static) {
        self.post(Command::Subscribe(Subscription::Connect(Box::new(handler))));
    }

    /// Called each time an open connection closes or fails.
    pub fn register_disconnect_handler(&self, handler: impl FnMut() + Send + 'static) {
        self.post(Command::Subscribe(Subscription::Disconnect(Box::new(
            handler,
        ))));
    }

    pub fn register_start_event_handler(&self, handler: impl FnMut(StartEvent) + Send + 'static) {
        self.post(Command::Subscribe(Subscription::StartEvent(Box::new(
            handler,
        ))));
    }

    pub fn register_stop_event_handler(&self, handler: impl FnMut(StopEvent) + Send + 'static) {
        self.post(Command::Subscribe(Subscription::StopEvent(Box::new(
            handler,
        ))));
    }

    /// Ask for the current status. Exactly one of the handlers fires unless
    /// the connection closes first.
    pub fn request_status(
        &self,
        on_error: impl FnOnce(RemoteError) + Send + 'static,
        on_status: impl FnOnce(StatusInfo) + Send + 'static,
    ) {
        self.request(
            Request::Status,
            Box::new(on_error),
            ResponseHandler::Status(Box::new(on_status)),
        );
    }

    pub fn request_start(
        &self,
        title: impl Into<String>,
        on_error: impl FnOnce(RemoteError) + Send + 'static,
        on_started: impl FnOnce() + Send + 'static,
    ) {
        self.request(
            Request::Start {
                title: title.into(),
            },
            Box::new(on_error),
            ResponseHandler::Start(Box::new(on_started)),
        );
    }

    pub fn request_stop(
        &self,
        title: impl Into<String>,
        on_error: impl FnOnce(RemoteError) + Send + 'static,
        on_stopped: impl FnOnce() + Send + 'static,
    ) {
        self.request(
            Request::Stop {
                title: title.into(),
            },
            Box::new(on_error),
            ResponseHandler::Stop(Box::new(on_stopped)),
        );
    }

    pub fn request_quality_update(
        &self,
        quality: impl Into<String>,
        on_error: impl FnOnce(RemoteError) + Send + 'static,
        on_updated: impl FnOnce() + Send + 'static,
    ) {
        self.request(
            Request::QualityUpdate {
                quality: quality.into(),
            },
            Box::new(on_error),
            ResponseHandler::QualityUpdate(Box::new(on_updated)),
        );
    }

    /// Ask the streaming application to exit. No response is expected, so
    /// the session stays busy until the connection closes.
    pub fn request_exit(&self, on_error: impl FnOnce(RemoteError) + Send + 'static) {
        self.request(Request::Exit, Box::new(on_error), ResponseHandler::Exit);
    }

    /// Fetch the current status.
    ///
    /// # Errors
    ///
    /// Returns the classified failure, or a remote-close connection error
    /// when the request is abandoned.
    pub async fn status(&self) -> std::result::Result<StatusInfo, RemoteError> {
        let (on_error, on_status, reply) = reply_channel();
        self.request_status(on_error, on_status);
        await_reply(reply).await
    }

    /// Start streaming to the source titled `title`.
    ///
    /// # Errors
    ///
    /// See [`Remote::status`].
    pub async fn start_streaming(
        &self,
        title: impl Into<String>,
    ) -> std::result::Result<(), RemoteError> {
        let (on_error, on_started, reply) = reply_channel();
        self.request_start(title, on_error, move || on_started(()));
        await_reply(reply).await
    }

    /// Stop streaming from the source titled `title`.
    ///
    /// # Errors
    ///
    /// See [`Remote::status`].
    pub async fn stop_streaming(
        &self,
        title: impl Into<String>,
    ) -> std::result::Result<(), RemoteError> {
        let (on_error, on_stopped, reply) = reply_channel();
        self.request_stop(title, on_error, move || on_stopped(()));
        await_reply(reply).await
    }

    /// Change the stream quality.
    ///
    /// # Errors
    ///
    /// See [`Remote::status`].
    pub async fn update_quality(
        &self,
        quality: impl Into<String>,
    ) -> std::result::Result<(), RemoteError> {
        let (on_error, on_updated, reply) = reply_channel();
        self.request_quality_update(quality, on_error, move || on_updated(()));
        await_reply(reply).await
    }

    /// Stop the session thread and release the endpoint. Pending handlers
    /// are dropped without firing. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = self.commands.send(Command::Shutdown);
        if worker.join().is_err() {
            error!("Session thread for {} panicked", self.endpoint);
        }
        self.claim = None;
        info!("Session stopped for {}", self.endpoint);
    }

    fn request(&self, request: Request, on_error: ErrorHandler, on_response: ResponseHandler) {
        self.post(Command::Request {
            request,
            on_error,
            on_response,
        });
    }

    fn post(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Session for {} is stopped, dropping call", self.endpoint);
        }
    }
}

impl Drop for Remote {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

type ReplySlot<T> = Arc<Mutex<Option<oneshot::Sender<std::result::Result<T, RemoteError>>>>>;

/// Pair of handlers feeding one oneshot. Whichever fires first wins.
fn reply_channel<T: Send + 'static>() -> (
    impl FnOnce(RemoteError) + Send + 'static,
    impl FnOnce(T) + Send + 'static,
    oneshot::Receiver<std::result::Result<T, RemoteError>>,
) {
    let (tx, rx) = oneshot::channel();
    let slot: ReplySlot<T> = Arc::new(Mutex::new(Some(tx)));
    let error_slot = Arc::clone(&slot);

    let on_error = move |err| deliver(&error_slot, Err(err));
    let on_success = move |value| deliver(&slot, Ok(value));
    (on_error, on_success, rx)
}

fn deliver<T>(slot: &ReplySlot<T>, outcome: std::result::Result<T, RemoteError>) {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
}

async fn await_reply<T>(
    reply: oneshot::Receiver<std::result::Result<T, RemoteError>>,
) -> std::result::Result<T, RemoteError> {
    reply
        .await
        .unwrap_or_else(|_| Err(classify::connection_error(ConnectionError::RemoteClose)))
}
