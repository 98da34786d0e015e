//! Session state machine.
//!
//! Runs on the session thread and owns all mutable session state. Caller
//! commands, transport events and the retry timer are serialized through a
//! single `select!` loop, so handlers never observe a half-applied update.

use std::sync::Arc;
use std::time::Duration;

use streamctl_rpc::{
    ConnectionError, ConnectionId, Inbound, Message, Presence, RemoteError, Reply, Request,
    Transport, TransportEvent, classify,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::SessionState;
use super::handlers::{
    ErrorHandler, Operation, PendingHandlers, ResponseHandler, Subscribers, Subscription,
    busy_error,
};

/// Messages from the [`Remote`](super::Remote) handle.
pub(crate) enum Command {
    Subscribe(Subscription),
    Request {
        request: Request,
        on_error: ErrorHandler,
        on_response: ResponseHandler,
    },
    Shutdown,
}

pub(crate) struct Worker {
    transport: Transport,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<SessionState>,
    retry_delay: Duration,

    connection: Option<ConnectionId>,
    busy: bool,
    /// Admitted request waiting for the dial in flight.
    queued: Option<Request>,
    retry_at: Option<Instant>,

    pending: PendingHandlers,
    subscribers: Subscribers,
}

impl Worker {
    pub(crate) fn new(
        endpoint: String,
        presence: Arc<dyn Presence>,
        retry_delay: Duration,
        commands: mpsc::UnboundedReceiver<Command>,
        state: watch::Sender<SessionState>,
    ) -> Self {
        let (transport, transport_events) = Transport::new(endpoint, presence);
        Self {
            transport,
            transport_events,
            commands,
            state,
            retry_delay,
            connection: None,
            busy: false,
            queued: None,
            retry_at: None,
            pending: PendingHandlers::default(),
            subscribers: Subscribers::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Session worker started for {}", self.transport.endpoint());
        self.keep_connected();
        self.publish_state();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Subscribe(subscription)) => {
                        self.subscribers.register(subscription);
                    }
                    Some(Command::Request { request, on_error, on_response }) => {
                        self.admit(request, on_error, on_response);
                    }
                    Some(Command::Shutdown) | None => break,
                },

                Some(event) = self.transport_events.recv() => {
                    self.handle_transport_event(event);
                }

                () = retry_timer(self.retry_at) => {
                    self.retry_at = None;
                    self.keep_connected();
                }
            }
            self.publish_state();
        }

        self.transport.close();
        self.connection = None;
        self.busy = false;
        self.pending.clear();
        self.publish_state();
        debug!("Session worker stopped for {}", self.transport.endpoint());
    }

    fn admit(&mut self, request: Request, on_error: ErrorHandler, on_response: ResponseHandler) {
        if self.busy {
            debug!("Rejecting {}: a request is outstanding", request.kind());
            on_error(busy_error());
            return;
        }

        self.busy = true;
        self.pending.install(on_error, on_response);

        if let Some(id) = self.connection {
            self.send(id, &request);
            return;
        }

        if self.transport.is_dialing() {
            self.queued = Some(request);
            return;
        }

        match self.transport.dial() {
            Ok(_) => self.queued = Some(request),
            Err(e) => {
                self.fail_request(Operation::of(&request), e.into());
                self.schedule_retry();
            }
        }
    }

    fn send(&mut self, id: ConnectionId, request: &Request) {
        debug!("Sending {} on connection {id}", request.kind());
        if let Err(e) = self.transport.send(id, request.encode()) {
            self.fail_request(Operation::of(request), e.into());
        }
    }

    /// Report a request failure and reopen admission.
    fn fail_request(&mut self, operation: Operation, err: RemoteError) {
        error!("{err}");
        self.busy = false;
        self.pending.fail(operation, err);
    }

    /// Start a dial unless connected or already dialing. A dial that cannot
    /// start arms the retry timer instead.
    fn keep_connected(&mut self) {
        if self.connection.is_some() || self.transport.is_dialing() {
            return;
        }

        if let Err(e) = self.transport.dial() {
            debug!("Cannot connect to {}: {e}", self.transport.endpoint());
            self.schedule_retry();
        }
    }

    fn schedule_retry(&mut self) {
        if self.retry_at.is_none() {
            trace!("Retrying in {:?}", self.retry_delay);
            self.retry_at = Some(Instant::now() + self.retry_delay);
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let Some(event) = self.transport.accept(event) else {
            trace!("Dropping stale transport event");
            return;
        };

        match event {
            TransportEvent::Opened(id) => self.on_open(id),
            TransportEvent::ConnectFailed(_, e) => {
                debug!("Connect to {} failed: {e}", self.transport.endpoint());
                if let Some(request) = self.queued.take() {
                    self.fail_request(Operation::of(&request), e.into());
                }
                self.schedule_retry();
            }
            TransportEvent::Message(_, payload) => self.on_message(&payload),
            TransportEvent::Closed(_) => self.on_disconnect(ConnectionError::RemoteClose, None),
            TransportEvent::Failed(_, reason) => {
                self.on_disconnect(ConnectionError::RemoteFail, Some(&reason));
            }
        }
    }

    fn on_open(&mut self, id: ConnectionId) {
        info!("Connected to {}", self.transport.endpoint());
        self.connection = Some(id);
        self.retry_at = None;
        self.subscribers.connected();

        if let Some(request) = self.queued.take() {
            self.send(id, &request);
        }
    }

    fn on_message(&mut self, payload: &str) {
        // Any inbound traffic reopens admission, events included.
        self.busy = false;
        trace!("Received {payload}");

        let message = Message::decode(payload);
        if message.is_undefined() {
            warn!("Dropping undefined message: {payload}");
            return;
        }

        if message.kind.is_event() {
            trace!("Unsolicited {} reopened admission", message.kind);
        }

        match Inbound::parse(&message) {
            Ok(inbound) => self.dispatch(inbound),
            Err(e) => error!("Dropping malformed message: {e}"),
        }
    }

    fn dispatch(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::StatusResponse(Reply::Success(info)) => self.pending.complete_status(info),
            Inbound::StatusResponse(Reply::Error(id)) => {
                self.report(Operation::Status, classify::classify_misc_error(&id));
            }
            Inbound::StartResponse(Reply::Success(())) => self.pending.complete(Operation::Start),
            Inbound::StartResponse(Reply::Error(id)) => {
                self.report(Operation::Start, classify::classify_start_error(&id));
            }
            Inbound::StopResponse(Reply::Success(())) => self.pending.complete(Operation::Stop),
            Inbound::StopResponse(Reply::Error(id)) => {
                self.report(Operation::Stop, classify::classify_stop_error(&id));
            }
            Inbound::QualityUpdateResponse(Reply::Success(())) => {
                self.pending.complete(Operation::QualityUpdate);
            }
            Inbound::QualityUpdateResponse(Reply::Error(id)) => {
                self.report(Operation::QualityUpdate, classify::classify_misc_error(&id));
            }
            Inbound::StartEvent(event) => {
                debug!("Streaming started from {}", event.source_title);
                self.subscribers.started(event);
            }
            Inbound::StopEvent(event) => {
                debug!("Streaming stopped from {}", event.source_title);
                self.subscribers.stopped(event);
            }
            Inbound::Unexpected(kind) => warn!("Dropping unexpected {kind} message"),
        }
    }

    fn report(&mut self, operation: Operation, err: RemoteError) {
        error!("{err}");
        self.pending.fail(operation, err);
    }

    fn on_disconnect(&mut self, code: ConnectionError, reason: Option<&str>) {
        self.connection = None;
        self.busy = false;
        self.pending.clear();

        let err = match reason {
            Some(reason) => classify::connection_error_with_detail(code, reason),
            None => classify::connection_error(code),
        };
        warn!("Disconnected from {}: {}", self.transport.endpoint(), err.description);

        self.subscribers.disconnected();
        self.keep_connected();
    }

    fn current_state(&self) -> SessionState {
        match (self.connection, self.busy) {
            (Some(_), true) => SessionState::ConnectedBusy,
            (Some(_), false) => SessionState::ConnectedIdle,
            (None, _) if self.transport.is_dialing() => SessionState::Connecting,
            (None, _) => SessionState::Disconnected,
        }
    }

    fn publish_state(&self) {
        let next = self.current_state();
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            trace!("Session state {current} -> {next}");
            *current = next;
            true
        });
    }
}

async fn retry_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
