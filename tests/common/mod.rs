//! Shared utilities for resocket integration tests
//!
//! The fake connector hands every connection attempt to the test, which
//! plays the server: accept to get a [`FakePeer`] wired to the socket's
//! transport, reject to fail the attempt, or drop the attempt to make it
//! hang until the socket's connection timeout. Together with tokio's
//! paused clock this makes every scenario fully deterministic.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use resocket::{
    CloseEvent, Connection, ConnectionInfo, Connector, Event, EventKind, Message, ReadyState,
    Socket, SocketError, Status, TransportEvent, TransportSink, TransportStream,
};

/// Create a connector/server pair for one test
pub fn fake_link() -> (FakeConnector, FakeServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FakeConnector { tx }, FakeServer { rx })
}

/// Connector that forwards every attempt to the test's [`FakeServer`]
pub struct FakeConnector {
    tx: mpsc::UnboundedSender<ConnectAttempt>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str, protocols: &[String]) -> Result<Connection, SocketError> {
        let (reply, response) = oneshot::channel();
        let attempt = ConnectAttempt {
            url: url.to_string(),
            protocols: protocols.to_vec(),
            reply,
        };
        if self.tx.send(attempt).is_err() {
            return Err(SocketError::Handshake("fake server gone".to_string()));
        }
        match response.await {
            Ok(result) => result,
            // The test dropped the attempt: hang like an unresponsive host
            Err(_) => std::future::pending().await,
        }
    }
}

/// The test side of the fake connector
pub struct FakeServer {
    rx: mpsc::UnboundedReceiver<ConnectAttempt>,
}

impl FakeServer {
    /// Wait for the socket's next connection attempt
    pub async fn next_attempt(&mut self) -> ConnectAttempt {
        self.rx.recv().await.expect("socket task gone")
    }

    /// Take an already-issued attempt without waiting
    pub fn try_next_attempt(&mut self) -> Option<ConnectAttempt> {
        self.rx.try_recv().ok()
    }
}

/// One connection attempt awaiting the test's verdict
pub struct ConnectAttempt {
    pub url: String,
    pub protocols: Vec<String>,
    reply: oneshot::Sender<Result<Connection, SocketError>>,
}

impl ConnectAttempt {
    /// Let the attempt succeed and get the server end of the transport
    pub fn accept(self) -> FakePeer {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let connection = Connection {
            sink: Box::new(FakeSink {
                tx: outbound_tx,
                closed: Arc::clone(&closed),
            }),
            stream: Box::new(FakeStream { rx: inbound_rx }),
            info: ConnectionInfo { url: self.url.clone(), protocol: String::new() },
        };
        let _ = self.reply.send(Ok(connection));

        FakePeer { outbound: outbound_rx, inbound: inbound_tx, closed }
    }

    /// Fail the attempt with the given error
    pub fn reject(self, error: SocketError) {
        let _ = self.reply.send(Err(error));
    }
}

/// The server end of an accepted fake transport
pub struct FakePeer {
    outbound: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl FakePeer {
    /// Deliver a text message to the socket
    pub fn send_text(&self, text: &str) {
        let _ = self
            .inbound
            .send(TransportEvent::Message(Message::Text(text.to_string())));
    }

    /// Deliver a transport error to the socket
    pub fn error(&self, message: &str) {
        let _ = self
            .inbound
            .send(TransportEvent::Error(SocketError::Transport(message.to_string())));
    }

    /// Close the transport from the server side
    pub fn close(&self, code: u16) {
        let _ = self.inbound.send(TransportEvent::Closed(CloseEvent {
            code,
            reason: String::new(),
            was_clean: true,
        }));
    }

    /// Next payload the socket handed to the transport
    pub async fn recv(&mut self) -> Option<Message> {
        self.outbound.recv().await
    }

    /// Take an already-delivered payload without waiting
    pub fn try_recv(&mut self) -> Option<Message> {
        self.outbound.try_recv().ok()
    }

    /// True once the socket closed its end
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct FakeSink {
    tx: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSink for FakeSink {
    async fn send(&mut self, message: Message) -> Result<(), SocketError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SocketError::Transport("sink closed".to_string()));
        }
        self.tx
            .send(message)
            .map_err(|_| SocketError::Transport("peer gone".to_string()))
    }

    async fn close(&mut self, _code: Option<u16>, _reason: Option<String>) {
        self.closed.store(true, Ordering::Release);
    }

    fn ready_state(&self) -> ReadyState {
        if self.closed.load(Ordering::Acquire) {
            ReadyState::Closed
        } else {
            ReadyState::Open
        }
    }
}

struct FakeStream {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportStream for FakeStream {
    async fn next_event(&mut self) -> TransportEvent {
        match self.rx.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed(CloseEvent {
                code: 1006,
                reason: "peer dropped".to_string(),
                was_clean: false,
            }),
        }
    }
}

/// Records every event with the milliseconds elapsed since attachment
#[derive(Clone)]
pub struct Recorder {
    start: Instant,
    entries: Arc<Mutex<Vec<(u64, Event)>>>,
}

impl Recorder {
    pub fn attach(socket: &Socket) -> Recorder {
        let recorder = Recorder {
            start: Instant::now(),
            entries: Arc::new(Mutex::new(Vec::new())),
        };
        for kind in [
            EventKind::Open,
            EventKind::Message,
            EventKind::Error,
            EventKind::Close,
            EventKind::Status,
            EventKind::Disconnect,
            EventKind::LostConnection,
        ] {
            let entries = Arc::clone(&recorder.entries);
            let start = recorder.start;
            socket.on(kind, move |event| {
                let at = (Instant::now() - start).as_millis() as u64;
                entries.lock().push((at, event.clone()));
            });
        }
        recorder
    }

    /// Every event in emission order
    pub fn events(&self) -> Vec<Event> {
        self.entries.lock().iter().map(|(_, event)| event.clone()).collect()
    }

    /// Every event with its timestamp
    pub fn timed(&self) -> Vec<(u64, Event)> {
        self.entries.lock().clone()
    }

    /// Only the status transitions, in order
    pub fn statuses(&self) -> Vec<Status> {
        self.entries
            .lock()
            .iter()
            .filter_map(|(_, event)| match event {
                Event::Status(status) => Some(*status),
                _ => None,
            })
            .collect()
    }
}

/// Block until the socket reports the given status
pub async fn wait_status(socket: &Socket, target: Status) {
    let mut rx = socket.subscribe_status();
    loop {
        if *rx.borrow_and_update() == target {
            return;
        }
        if rx.changed().await.is_err() {
            panic!("socket task gone while waiting for {target:?}");
        }
    }
}

/// Milliseconds elapsed since `start`
pub fn elapsed_ms(start: Instant) -> u64 {
    (Instant::now() - start).as_millis() as u64
}

/// A real WebSocket peer for exercising the default connector
///
/// Speaks this crate's application-level heartbeat dialect: text
/// `"ping"` is answered with `"pong"`, everything else is echoed back.
pub mod echo {
    use std::net::SocketAddr;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::watch;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    pub struct EchoServer {
        addr: SocketAddr,
        stop: watch::Sender<bool>,
    }

    impl EchoServer {
        /// Bind a fresh loopback port and start serving
        pub async fn bind() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (stop, stopped) = watch::channel(false);
            tokio::spawn(accept_loop(listener, stopped));
            Self { addr, stop }
        }

        pub fn url(&self) -> String {
            format!("ws://{}", self.addr)
        }

        /// Stop accepting and tear down every in-flight session
        pub fn stop(&self) {
            let _ = self.stop.send(true);
        }
    }

    impl Drop for EchoServer {
        fn drop(&mut self) {
            self.stop();
        }
    }

    async fn accept_loop(listener: TcpListener, mut stopped: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        tokio::spawn(session(stream, stopped.clone()));
                    }
                    Err(_) => return,
                },
                _ = stopped.changed() => return,
            }
        }
    }

    // Each session watches the stop signal itself, so stopping the
    // server also ends connections accepted long ago
    async fn session(stream: TcpStream, mut stopped: watch::Receiver<bool>) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(_) => return,
        };
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                inbound = read.next() => {
                    let reply = match inbound {
                        Some(Ok(WsMessage::Text(text))) if text.as_str() == "ping" => {
                            WsMessage::Text("pong".into())
                        }
                        Some(Ok(msg)) if msg.is_close() => return,
                        Some(Ok(msg)) if msg.is_text() || msg.is_binary() => msg,
                        Some(Ok(_)) => continue,
                        Some(Err(_)) | None => return,
                    };
                    if write.send(reply).await.is_err() {
                        return;
                    }
                }
                _ = stopped.changed() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return;
                }
            }
        }
    }
}
