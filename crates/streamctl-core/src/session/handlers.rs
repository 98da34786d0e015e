//! Caller callback slots.
//!
//! Pending handlers belong to one request each and fire at most once.
//! Subscribed handlers persist across requests and reconnections.

use streamctl_rpc::{Request, classify};
use streamctl_types::{RemoteError, StartEvent, StatusInfo, StopEvent};
use tracing::{error, warn};

/// Receives the failure of a request.
pub type ErrorHandler = Box<dyn FnOnce(RemoteError) + Send>;
/// Receives a successful status response.
pub type StatusHandler = Box<dyn FnOnce(StatusInfo) + Send>;
/// Signals a successful start, stop or quality update.
pub type SuccessHandler = Box<dyn FnOnce() + Send>;

pub type ConnectHandler = Box<dyn FnMut() + Send>;
pub type DisconnectHandler = Box<dyn FnMut() + Send>;
pub type StartEventHandler = Box<dyn FnMut(StartEvent) + Send>;
pub type StopEventHandler = Box<dyn FnMut(StopEvent) + Send>;

/// Public request operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Status,
    Start,
    Stop,
    QualityUpdate,
    Exit,
}

impl Operation {
    pub(crate) fn of(request: &Request) -> Self {
        match request {
            Request::Status => Operation::Status,
            Request::Start { .. } => Operation::Start,
            Request::Stop { .. } => Operation::Stop,
            Request::QualityUpdate { .. } => Operation::QualityUpdate,
            Request::Exit => Operation::Exit,
        }
    }
}

/// Success callback supplied with a request.
pub(crate) enum ResponseHandler {
    Status(StatusHandler),
    Start(SuccessHandler),
    Stop(SuccessHandler),
    QualityUpdate(SuccessHandler),
    /// Exit has no response.
    Exit,
}

struct Pending<H> {
    on_error: ErrorHandler,
    on_response: H,
}

/// One pending handler pair per operation.
#[derive(Default)]
pub(crate) struct PendingHandlers {
    status: Option<Pending<StatusHandler>>,
    start: Option<Pending<SuccessHandler>>,
    stop: Option<Pending<SuccessHandler>>,
    quality_update: Option<Pending<SuccessHandler>>,
    exit: Option<ErrorHandler>,
}

impl PendingHandlers {
    /// Make `on_error`/`response` the active pair for their operation.
    ///
    /// An unanswered pair for the same operation is dropped unfired; returns
    /// whether that happened.
    pub(crate) fn install(&mut self, on_error: ErrorHandler, response: ResponseHandler) -> bool {
        let (operation, replaced) = match response {
            ResponseHandler::Status(on_response) => (
                Operation::Status,
                self.status
                    .replace(Pending {
                        on_error,
                        on_response,
                    })
                    .is_some(),
            ),
            ResponseHandler::Start(on_response) => (
                Operation::Start,
                self.start
                    .replace(Pending {
                        on_error,
                        on_response,
                    })
                    .is_some(),
            ),
            ResponseHandler::Stop(on_response) => (
                Operation::Stop,
                self.stop
                    .replace(Pending {
                        on_error,
                        on_response,
                    })
                    .is_some(),
            ),
            ResponseHandler::QualityUpdate(on_response) => (
                Operation::QualityUpdate,
                self.quality_update
                    .replace(Pending {
                        on_error,
                        on_response,
                    })
                    .is_some(),
            ),
            ResponseHandler::Exit => (Operation::Exit, self.exit.replace(on_error).is_some()),
        };

        if replaced {
            warn!("Replacing unanswered {operation:?} request; its handlers will not fire");
        }
        replaced
    }

    /// Report a failure of `operation` to its error handler.
    pub(crate) fn fail(&mut self, operation: Operation, err: RemoteError) {
        let on_error = match operation {
            Operation::Status => self.status.take().map(|p| p.on_error),
            Operation::Start => self.start.take().map(|p| p.on_error),
            Operation::Stop => self.stop.take().map(|p| p.on_error),
            Operation::QualityUpdate => self.quality_update.take().map(|p| p.on_error),
            Operation::Exit => self.exit.take(),
        };

        match on_error {
            Some(on_error) => on_error(err),
            None => error!("No pending {operation:?} request for error: {err}"),
        }
    }

    pub(crate) fn complete_status(&mut self, info: StatusInfo) {
        match self.status.take() {
            Some(pending) => (pending.on_response)(info),
            None => error!("No pending Status request for response"),
        }
    }

    /// Fire the success handler of a start, stop or quality update.
    pub(crate) fn complete(&mut self, operation: Operation) {
        let pending = match operation {
            Operation::Start => self.start.take(),
            Operation::Stop => self.stop.take(),
            Operation::QualityUpdate => self.quality_update.take(),
            Operation::Status | Operation::Exit => None,
        };

        match pending {
            Some(pending) => (pending.on_response)(),
            None => error!("No pending {operation:?} request for response"),
        }
    }

    /// Abandon every pending request without invoking it.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.start.is_none()
            && self.stop.is_none()
            && self.quality_update.is_none()
            && self.exit.is_none()
    }
}

/// Registration of a persistent handler.
pub(crate) enum Subscription {
    Connect(ConnectHandler),
    Disconnect(DisconnectHandler),
    StartEvent(StartEventHandler),
    StopEvent(StopEventHandler),
}

#[derive(Default)]
pub(crate) struct Subscribers {
    connect: Option<ConnectHandler>,
    disconnect: Option<DisconnectHandler>,
    start_event: Option<StartEventHandler>,
    stop_event: Option<StopEventHandler>,
}

impl Subscribers {
    pub(crate) fn register(&mut self, subscription: Subscription) {
        match subscription {
            Subscription::Connect(handler) => self.connect = Some(handler),
            Subscription::Disconnect(handler) => self.disconnect = Some(handler),
            Subscription::StartEvent(handler) => self.start_event = Some(handler),
            Subscription::StopEvent(handler) => self.stop_event = Some(handler),
        }
    }

    pub(crate) fn connected(&mut self) {
        if let Some(handler) = self.connect.as_mut() {
            handler();
        }
    }

    pub(crate) fn disconnected(&mut self) {
        if let Some(handler) = self.disconnect.as_mut() {
            handler();
        }
    }

    pub(crate) fn started(&mut self, event: StartEvent) {
        if let Some(handler) = self.start_event.as_mut() {
            handler(event);
        }
    }

    pub(crate) fn stopped(&mut self, event: StopEvent) {
        if let Some(handler) = self.stop_event.as_mut() {
            handler(event);
        }
    }
}

/// Failure reported when a request is rejected for being second in line.
pub(crate) fn busy_error() -> RemoteError {
    classify::connection_error(streamctl_types::ConnectionError::Busy)
}
