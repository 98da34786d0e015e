//! End-to-end session tests against a mock streaming application.
//!
//! Each test binds its own WebSocket listener on an ephemeral port and drives
//! the remote side by hand, so request/response interleavings are explicit.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use streamctl_core::{
    Config, ConnectionError, Error, ErrorCategory, Remote, SessionState, StartError, StartEvent,
    StopError, StopEvent,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{WebSocketStream, accept_async};

const WAIT: Duration = Duration::from_secs(5);

type AppSocket = WebSocketStream<TcpStream>;

/// Mock streaming application accepting any number of connections.
struct MockApp {
    port: u16,
    connections: mpsc::UnboundedReceiver<AppSocket>,
}

impl MockApp {
    async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(socket) = accept_async(stream).await else {
                    continue;
                };
                if tx.send(socket).is_err() {
                    break;
                }
            }
        });

        Self { port, connections }
    }

    fn config(&self) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: self.port,
            retry_delay_ms: 50,
            process_name: None,
        }
    }

    async fn next_connection(&mut self) -> AppSocket {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for the session to connect")
            .expect("listener stopped")
    }
}

async fn recv_json(socket: &mut AppSocket) -> Value {
    loop {
        let frame = timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for a request")
            .expect("connection closed")
            .expect("connection failed");
        if let Frame::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_raw(socket: &mut AppSocket, payload: &str) {
    socket.send(Frame::text(payload)).await.unwrap();
}

async fn send_json(socket: &mut AppSocket, value: &Value) {
    send_raw(socket, &value.to_string()).await;
}

async fn wait_for_state(remote: &Remote, state: SessionState) {
    let mut rx = remote.watch_state();
    let reached = timeout(WAIT, rx.wait_for(|current| *current == state))
        .await
        .expect("timed out waiting for session state")
        .is_ok();
    assert!(reached, "session stopped before reaching {state}");
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a handler")
        .expect("handler channel closed")
}

#[tokio::test]
async fn test_status_round_trip() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();
    let mut socket = app.next_connection().await;

    let (status, ()) = tokio::join!(remote.status(), async {
        let request = recv_json(&mut socket).await;
        assert_eq!(request, json!({"type": 101}));
        send_json(
            &mut socket,
            &json!({
                "type": 102,
                "status": "standby",
                "sourceTitle": "My Game",
                "userName": "alice",
                "quality": "high",
            }),
        )
        .await;
    });

    let status = status.unwrap();
    assert_eq!(status.status, "standby");
    assert_eq!(status.source_title, "My Game");
    assert_eq!(status.user_name, "alice");
    assert_eq!(status.quality, "high");
    wait_for_state(&remote, SessionState::ConnectedIdle).await;
}

#[tokio::test]
async fn test_requests_carry_their_arguments() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();
    let mut socket = app.next_connection().await;

    let (started, ()) = tokio::join!(remote.start_streaming("My Game"), async {
        let request = recv_json(&mut socket).await;
        assert_eq!(request, json!({"type": 201, "title": "My Game"}));
        send_json(&mut socket, &json!({"type": 202})).await;
    });
    started.unwrap();

    let (updated, ()) = tokio::join!(remote.update_quality("low"), async {
        let request = recv_json(&mut socket).await;
        assert_eq!(request, json!({"type": 301, "quality": "low"}));
        send_json(&mut socket, &json!({"type": 302, "error": ""})).await;
    });
    updated.unwrap();

    let (stopped, ()) = tokio::join!(remote.stop_streaming("My Game"), async {
        let request = recv_json(&mut socket).await;
        assert_eq!(request, json!({"type": 211, "title": "My Game"}));
        send_json(&mut socket, &json!({"type": 212})).await;
    });
    stopped.unwrap();
}

#[tokio::test]
async fn test_second_request_is_rejected_while_busy() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();
    let mut socket = app.next_connection().await;
    wait_for_state(&remote, SessionState::ConnectedIdle).await;

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let error_tx = status_tx.clone();
    remote.request_status(
        move |err| {
            let _ = error_tx.send(Err(err));
        },
        move |info| {
            let _ = status_tx.send(Ok(info));
        },
    );

    let busy = remote.start_streaming("Other").await.unwrap_err();
    assert!(busy.is_connection(ConnectionError::Busy));
    assert_eq!(busy.category, ErrorCategory::Connection);

    assert_eq!(recv_json(&mut socket).await, json!({"type": 101}));
    send_json(
        &mut socket,
        &json!({
            "type": 102,
            "status": "onair",
            "sourceTitle": "",
            "userName": "",
            "quality": "mid",
        }),
    )
    .await;

    let info = next(&mut status_rx).await.unwrap();
    assert_eq!(info.status, "onair");
}

#[tokio::test]
async fn test_remote_errors_are_classified() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();
    let mut socket = app.next_connection().await;

    let (started, ()) = tokio::join!(remote.start_streaming("Nope"), async {
        recv_json(&mut socket).await;
        send_json(&mut socket, &json!({"type": 202, "error": "kUnknownTitle"})).await;
    });
    let err = started.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Start);
    assert_eq!(err.code, StartError::UnknownTitle.code());

    let (stopped, ()) = tokio::join!(remote.stop_streaming("Nope"), async {
        recv_json(&mut socket).await;
        send_json(&mut socket, &json!({"type": 212, "error": "kNotOnAir"})).await;
    });
    let err = stopped.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Stop);
    assert_eq!(err.code, StopError::NotOnAir.code());

    let (updated, ()) = tokio::join!(remote.update_quality("ultra"), async {
        recv_json(&mut socket).await;
        send_json(&mut socket, &json!({"type": 302, "error": "kBadQuality"})).await;
    });
    let err = updated.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Misc);
    assert_eq!(err.code, 0);
    assert_eq!(err.description, "kBadQuality");
}

#[tokio::test]
async fn test_events_reach_subscribers() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();

    let (start_tx, mut starts) = mpsc::unbounded_channel::<StartEvent>();
    let (stop_tx, mut stops) = mpsc::unbounded_channel::<StopEvent>();
    remote.register_start_event_handler(move |event| {
        let _ = start_tx.send(event);
    });
    remote.register_stop_event_handler(move |event| {
        let _ = stop_tx.send(event);
    });

    let mut socket = app.next_connection().await;
    send_json(
        &mut socket,
        &json!({
            "type": 203,
            "source": "MyTitle:1234",
            "userPage": "me",
            "privacy": "SELF",
            "description": "tonight",
            "mic": "on",
            "serviceProvider": "facebook",
            "streamUrl": "rtmp://example/live",
            "postUrl": "https://example/post",
        }),
    )
    .await;
    send_json(&mut socket, &json!({"type": 213, "source": "MyTitle:1234"})).await;

    let started = next(&mut starts).await;
    assert_eq!(started.source_title, "MyTitle");
    assert_eq!(started.service_provider, "facebook");
    assert_eq!(started.post_url, "https://example/post");

    let stopped = next(&mut stops).await;
    assert_eq!(stopped.source_title, "MyTitle");
}

#[tokio::test]
async fn test_malformed_messages_are_dropped() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();
    let mut socket = app.next_connection().await;

    let (status, ()) = tokio::join!(remote.status(), async {
        recv_json(&mut socket).await;
        send_raw(&mut socket, "not json").await;
        send_json(&mut socket, &json!({"type": 999})).await;
        send_json(&mut socket, &json!({"type": 102, "status": "standby"})).await;
        send_json(&mut socket, &json!({"type": 213})).await;
        send_json(
            &mut socket,
            &json!({
                "type": 102,
                "status": "standby",
                "sourceTitle": "",
                "userName": "bob",
                "quality": "high",
            }),
        )
        .await;
    });

    assert_eq!(status.unwrap().user_name, "bob");
}

#[tokio::test]
async fn test_close_drops_pending_request_and_reconnects() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();

    let (connect_tx, mut connects) = mpsc::unbounded_channel();
    let (disconnect_tx, mut disconnects) = mpsc::unbounded_channel();
    remote.register_connect_handler(move || {
        let _ = connect_tx.send(());
    });
    remote.register_disconnect_handler(move || {
        let _ = disconnect_tx.send(());
    });

    let mut socket = app.next_connection().await;
    next(&mut connects).await;

    let (status, ()) = tokio::join!(remote.status(), async {
        recv_json(&mut socket).await;
        socket.close(None).await.unwrap();
    });
    let err = status.unwrap_err();
    assert!(err.is_connection(ConnectionError::RemoteClose));

    next(&mut disconnects).await;
    let mut socket = app.next_connection().await;
    next(&mut connects).await;
    wait_for_state(&remote, SessionState::ConnectedIdle).await;

    let (updated, ()) = tokio::join!(remote.update_quality("mid"), async {
        recv_json(&mut socket).await;
        send_json(&mut socket, &json!({"type": 302})).await;
    });
    updated.unwrap();
}

#[tokio::test]
async fn test_exit_keeps_session_busy_until_close() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();
    let mut socket = app.next_connection().await;
    wait_for_state(&remote, SessionState::ConnectedIdle).await;

    remote.request_exit(|err| panic!("exit failed: {err}"));
    assert_eq!(recv_json(&mut socket).await, json!({"type": 901}));
    wait_for_state(&remote, SessionState::ConnectedBusy).await;

    let err = remote.status().await.unwrap_err();
    assert!(err.is_connection(ConnectionError::Busy));

    socket.close(None).await.unwrap();
    let _socket = app.next_connection().await;
    wait_for_state(&remote, SessionState::ConnectedIdle).await;
}

#[tokio::test]
async fn test_request_waits_for_late_application() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config {
        host: "127.0.0.1".to_string(),
        port,
        retry_delay_ms: 50,
        process_name: None,
    };
    let remote = Remote::start(&config).unwrap();

    let err = remote.status().await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Connection);
    assert!(
        err.is_connection(ConnectionError::Connect),
        "unexpected error: {err}"
    );

    // The application appears later on the same port.
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let _socket = accept_async(stream).await.unwrap();
    wait_for_state(&remote, SessionState::ConnectedIdle).await;
}

#[tokio::test]
async fn test_absent_process_never_dials() {
    let mut app = MockApp::bind().await;
    let mut remote = Remote::start_with_presence(&app.config(), Arc::new(|| false)).unwrap();

    let err = remote.status().await.unwrap_err();
    assert!(err.is_connection(ConnectionError::NoTargetProcess));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(app.connections.try_recv().is_err());
    assert_eq!(remote.state(), SessionState::Disconnected);
    remote.shutdown();
}

#[tokio::test]
async fn test_one_session_per_endpoint() {
    let mut app = MockApp::bind().await;
    let mut remote = Remote::start(&app.config()).unwrap();
    let _socket = app.next_connection().await;

    assert!(matches!(
        Remote::start(&app.config()),
        Err(Error::AlreadyRunning(endpoint)) if endpoint == remote.endpoint()
    ));

    remote.shutdown();
    remote.shutdown();

    let again = Remote::start(&app.config()).unwrap();
    let _socket = app.next_connection().await;
    wait_for_state(&again, SessionState::ConnectedIdle).await;
}

#[tokio::test]
async fn test_late_error_reaches_only_its_own_request() {
    let mut app = MockApp::bind().await;
    let remote = Remote::start(&app.config()).unwrap();
    let mut socket = app.next_connection().await;
    wait_for_state(&remote, SessionState::ConnectedIdle).await;

    let (log_tx, mut log) = mpsc::unbounded_channel::<String>();
    let status_error = log_tx.clone();
    let status_ok = log_tx.clone();
    remote.request_status(
        move |err| {
            let _ = status_error.send(format!("status error: {}", err.description));
        },
        move |_| {
            let _ = status_ok.send("status ok".to_string());
        },
    );
    assert_eq!(recv_json(&mut socket).await, json!({"type": 101}));
    wait_for_state(&remote, SessionState::ConnectedBusy).await;

    // An unsolicited event reopens admission before the status answer.
    send_json(&mut socket, &json!({"type": 213, "source": "Other:1"})).await;
    wait_for_state(&remote, SessionState::ConnectedIdle).await;

    let start_error = log_tx.clone();
    let start_ok = log_tx;
    remote.request_start(
        "My Game",
        move |err| {
            let _ = start_error.send(format!("start error: {err}"));
        },
        move || {
            let _ = start_ok.send("start ok".to_string());
        },
    );
    assert_eq!(
        recv_json(&mut socket).await,
        json!({"type": 201, "title": "My Game"})
    );

    send_json(&mut socket, &json!({"type": 102, "error": "kNoStatus"})).await;
    send_json(&mut socket, &json!({"type": 202})).await;

    assert_eq!(next(&mut log).await, "status error: kNoStatus");
    assert_eq!(next(&mut log).await, "start ok");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(log.try_recv().is_err());
}

#[tokio::test]
async fn test_close_while_idle_reconnects() {
    const RETRY_DELAY: Duration = Duration::from_millis(500);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: listener.local_addr().unwrap().port(),
        retry_delay_ms: 500,
        process_name: None,
    };
    let remote = Remote::start(&config).unwrap();

    let (connect_tx, mut connects) = mpsc::unbounded_channel();
    let (disconnect_tx, mut disconnects) = mpsc::unbounded_channel();
    remote.register_connect_handler(move || {
        let _ = connect_tx.send(());
    });
    remote.register_disconnect_handler(move || {
        let _ = disconnect_tx.send(());
    });

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut socket = accept_async(stream).await.unwrap();
    next(&mut connects).await;
    wait_for_state(&remote, SessionState::ConnectedIdle).await;

    socket.close(None).await.unwrap();
    next(&mut disconnects).await;

    // The redial stays in its handshake until the listener accepts it.
    wait_for_state(&remote, SessionState::Connecting).await;
    tokio::time::sleep(RETRY_DELAY).await;
    assert!(disconnects.try_recv().is_err());
    assert!(connects.try_recv().is_err());

    let (stream, _) = timeout(RETRY_DELAY, listener.accept())
        .await
        .expect("session did not redial")
        .unwrap();
    let _socket = accept_async(stream).await.unwrap();
    next(&mut connects).await;
    wait_for_state(&remote, SessionState::ConnectedIdle).await;
    assert!(disconnects.try_recv().is_err());
}
