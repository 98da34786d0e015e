//! WebSocket transport session.
//!
//! Owns the socket lifecycle for one remote endpoint. Each dial spawns a
//! connection task that reports back over a single event channel; the owner
//! feeds every event through [`Transport::accept`] so events from superseded
//! connections are dropped before they reach session state.
//!
//! Must be used from inside a tokio runtime: dialing spawns tasks.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as HandshakeRequest;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};

/// Default port the streaming application listens on.
pub const DEFAULT_PORT: u16 = 9002;

/// Build the endpoint URL for a host and port.
#[must_use]
pub fn endpoint_url(host: &str, port: u16) -> String {
    format!("ws://{host}:{port}/")
}

/// Predicate telling whether the target process is running.
///
/// Queried before every connect attempt.
pub trait Presence: Send + Sync {
    fn is_running(&self) -> bool;
}

impl<F> Presence for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_running(&self) -> bool {
        self()
    }
}

/// Presence that assumes the target is always running and lets the connect
/// call decide.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPresent;

impl Presence for AlwaysPresent {
    fn is_running(&self) -> bool {
        true
    }
}

/// Identifies one dial attempt and the connection it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events reported by connection tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed; the connection is usable.
    Opened(ConnectionId),
    /// The connect call failed.
    ConnectFailed(ConnectionId, TransportError),
    /// A text frame arrived.
    Message(ConnectionId, String),
    /// The remote closed the connection.
    Closed(ConnectionId),
    /// The connection broke.
    Failed(ConnectionId, String),
}

impl TransportEvent {
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        match self {
            TransportEvent::Opened(id)
            | TransportEvent::ConnectFailed(id, _)
            | TransportEvent::Message(id, _)
            | TransportEvent::Closed(id)
            | TransportEvent::Failed(id, _) => *id,
        }
    }
}

struct Link {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl Link {
    fn abort(self) {
        self.task.abort();
    }
}

/// Connection owner for a single endpoint.
pub struct Transport {
    endpoint: String,
    presence: Arc<dyn Presence>,
    events: mpsc::UnboundedSender<TransportEvent>,
    next_id: u64,
    dialing: Option<Link>,
    open: Option<Link>,
}

impl Transport {
    /// Create a transport and the receiver its connection tasks report to.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        presence: Arc<dyn Presence>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let transport = Self {
            endpoint: endpoint.into(),
            presence,
            events,
            next_id: 1,
            dialing: None,
            open: None,
        };
        (transport, events_rx)
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn is_dialing(&self) -> bool {
        self.dialing.is_some()
    }

    /// The open connection, if any.
    #[must_use]
    pub fn connection(&self) -> Option<ConnectionId> {
        self.open.as_ref().map(|link| link.id)
    }

    /// Start a connect attempt.
    ///
    /// The outcome arrives later as [`TransportEvent::Opened`] or
    /// [`TransportEvent::ConnectFailed`]. An attempt already in flight is
    /// abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoTargetProcess`] when the presence
    /// predicate is false (no socket is touched), or
    /// [`TransportError::Init`] when the endpoint is not a valid URL.
    pub fn dial(&mut self) -> Result<ConnectionId> {
        if !self.presence.is_running() {
            return Err(TransportError::NoTargetProcess);
        }

        let request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Init(e.to_string()))?;

        if let Some(stale) = self.dialing.take() {
            debug!("Abandoning connect attempt {}", stale.id);
            stale.abort();
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(
            id,
            request,
            outbound_rx,
            self.events.clone(),
        ));

        debug!("Dialing {} as connection {id}", self.endpoint);
        self.dialing = Some(Link { id, outbound, task });
        Ok(id)
    }

    /// Validate an event against the current connection state.
    ///
    /// Returns the event when it belongs to the attempt in flight or the open
    /// connection, updating state for open/close transitions. Returns `None`
    /// for stale events.
    pub fn accept(&mut self, event: TransportEvent) -> Option<TransportEvent> {
        let id = event.connection();
        match &event {
            TransportEvent::Opened(_) => {
                let link = take_if(&mut self.dialing, id)?;
                if let Some(previous) = self.open.replace(link) {
                    previous.abort();
                }
            }
            TransportEvent::ConnectFailed(..) => {
                take_if(&mut self.dialing, id)?;
            }
            TransportEvent::Message(..) => {
                if self.connection() != Some(id) {
                    return None;
                }
            }
            TransportEvent::Closed(_) | TransportEvent::Failed(..) => {
                take_if(&mut self.open, id)?;
            }
        }
        Some(event)
    }

    /// Queue a text frame on an open connection. Fire-and-forget: write
    /// failures surface later as [`TransportEvent::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] when `id` is not the open
    /// connection, or [`TransportError::Send`] when its task has stopped.
    pub fn send(&self, id: ConnectionId, payload: String) -> Result<()> {
        let link = self
            .open
            .as_ref()
            .filter(|link| link.id == id)
            .ok_or(TransportError::NotConnected)?;

        link.outbound
            .send(payload)
            .map_err(|_| TransportError::Send("connection task stopped".to_string()))
    }

    /// Abort every connection task.
    pub fn close(&mut self) {
        if let Some(link) = self.dialing.take() {
            link.abort();
        }
        if let Some(link) = self.open.take() {
            link.abort();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

fn take_if(slot: &mut Option<Link>, id: ConnectionId) -> Option<Link> {
    if slot.as_ref().is_some_and(|link| link.id == id) {
        slot.take()
    } else {
        None
    }
}

async fn run_connection(
    id: ConnectionId,
    request: HandshakeRequest,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let socket = match connect_async(request).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            let _ = events.send(TransportEvent::ConnectFailed(
                id,
                TransportError::Connect(e.to_string()),
            ));
            return;
        }
    };

    if events.send(TransportEvent::Opened(id)).is_err() {
        return;
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            payload = outbound.recv() => {
                let Some(payload) = payload else {
                    let _ = sink.close().await;
                    break;
                };
                trace!("Connection {id} sending {payload}");
                if let Err(e) = sink.send(Frame::text(payload)).await {
                    let _ = events.send(TransportEvent::Failed(id, e.to_string()));
                    break;
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    let payload = text.as_str().to_owned();
                    if events.send(TransportEvent::Message(id, payload)).is_err() {
                        break;
                    }
                }
                Some(Ok(Frame::Close(_))) | None => {
                    let _ = events.send(TransportEvent::Closed(id));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Failed(id, e.to_string()));
                    break;
                }
            }
        }
    }
}
