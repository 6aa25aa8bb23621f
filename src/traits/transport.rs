use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::core::status::ReadyState;
use crate::traits::error::{Result, SocketError};

/// An outbound or inbound WebSocket payload
///
/// Payloads are opaque to the socket; only the heartbeat filter inspects
/// inbound messages, and only to recognize pongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text payload
    Text(String),
    /// Binary payload
    Binary(Vec<u8>),
}

impl Message {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Check if message is text
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Check if message is binary
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        match self {
            Message::Text(s) => s.len(),
            Message::Binary(b) => b.len(),
        }
    }

    /// True when the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::Text(value)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Message::Binary(value)
    }
}

impl From<&[u8]> for Message {
    fn from(value: &[u8]) -> Self {
        Message::Binary(value.to_vec())
    }
}

/// A close observed on (or synthesized for) the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code
    pub code: u16,
    /// Close reason, empty when the peer sent none
    pub reason: String,
    /// False when the connection dropped without a closing handshake
    pub was_clean: bool,
}

impl CloseEvent {
    /// A clean close with the given code
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into(), was_clean: true }
    }

    /// An abnormal closure (code 1006)
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self { code: 1006, reason: reason.into(), was_clean: false }
    }
}

/// What the read half of a transport observed
#[derive(Debug)]
pub enum TransportEvent {
    /// A data message arrived
    Message(Message),
    /// The transport errored; a `Closed` event follows on the next read
    Error(SocketError),
    /// The transport is closed and will produce nothing further
    Closed(CloseEvent),
}

/// Write half of an established transport
#[async_trait]
pub trait TransportSink: Send {
    /// Hand a message to the transport
    async fn send(&mut self, message: Message) -> Result<()>;

    /// Close the transport, sending a close frame where the protocol has one
    async fn close(&mut self, code: Option<u16>, reason: Option<String>);

    /// The transport's own view of the standard `readyState`
    ///
    /// A freshly handed-over transport reports `Open`; `Closing` while a
    /// closing handshake is in flight; `Closed` once the transport is
    /// done. The socket proxies this through its readable view while the
    /// transport is held.
    fn ready_state(&self) -> ReadyState;
}

/// Read half of an established transport
#[async_trait]
pub trait TransportStream: Send {
    /// Wait for the next transport observation
    ///
    /// After a `Closed` event the stream must not be polled again.
    async fn next_event(&mut self) -> TransportEvent;
}

/// Details captured when a connection reached the open state
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    /// The final URL the transport connected to
    pub url: String,
    /// The negotiated subprotocol, empty when none was agreed
    pub protocol: String,
}

/// An established connection as handed over by a [`Connector`]
pub struct Connection {
    /// Write half
    pub sink: Box<dyn TransportSink>,
    /// Read half
    pub stream: Box<dyn TransportStream>,
    /// Handshake details
    pub info: ConnectionInfo,
}

/// Trait for opening transports
///
/// The default implementation is [`TungsteniteConnector`]. Supplying a
/// different connector swaps the transport implementation wholesale, for
/// instance with an in-process fake in tests. A resolved `connect` call
/// IS the open event; rejection or hanging past the socket's
/// `connection_timeout` fails the attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `url`, offering the given subprotocols
    async fn connect(&self, url: &str, protocols: &[String]) -> Result<Connection>;
}

/// Gate applied between transport open and attempt success
///
/// When configured, an attempt is not considered successful until the
/// resolver returns `Ok`. Returning an error fails the attempt and the
/// pending transport is closed.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    /// Decide whether the freshly opened connection is usable
    async fn resolve(&self, info: &ConnectionInfo) -> Result<()>;
}

type WsStreamInner = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The default [`Connector`], backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str, protocols: &[String]) -> Result<Connection> {
        let mut request = url
            .into_client_request()
            .map_err(|e| SocketError::InvalidUrl(e.to_string()))?;

        if !protocols.is_empty() {
            let joined = protocols.join(", ");
            let value = HeaderValue::from_str(&joined)
                .map_err(|e| SocketError::InvalidUrl(e.to_string()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        debug!(%url, "opening websocket transport");
        let (ws, response) = connect_async(request)
            .await
            .map_err(|e| SocketError::Handshake(e.to_string()))?;

        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let (write, read) = ws.split();
        Ok(Connection {
            sink: Box::new(WsSink { write, state: ReadyState::Open }),
            stream: Box::new(WsStream { read, errored: false }),
            info: ConnectionInfo { url: url.to_string(), protocol },
        })
    }
}

struct WsSink {
    write: SplitSink<WsStreamInner, TungsteniteMessage>,
    state: ReadyState,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, message: Message) -> Result<()> {
        let msg = match message {
            Message::Text(text) => TungsteniteMessage::Text(text.into()),
            Message::Binary(data) => TungsteniteMessage::Binary(data.into()),
        };
        self.write.send(msg).await.map_err(|e| {
            // A failed write means the connection is gone
            self.state = ReadyState::Closed;
            SocketError::Transport(e.to_string())
        })
    }

    async fn close(&mut self, code: Option<u16>, reason: Option<String>) {
        self.state = ReadyState::Closing;
        let frame = code.map(|code| CloseFrame {
            code: code.into(),
            reason: reason.unwrap_or_default().into(),
        });
        // The peer may already be gone; nothing to do about it here
        let _ = self.write.send(TungsteniteMessage::Close(frame)).await;
        let _ = self.write.close().await;
        self.state = ReadyState::Closed;
    }

    fn ready_state(&self) -> ReadyState {
        self.state
    }
}

struct WsStream {
    read: SplitStream<WsStreamInner>,
    errored: bool,
}

#[async_trait]
impl TransportStream for WsStream {
    async fn next_event(&mut self) -> TransportEvent {
        if self.errored {
            return TransportEvent::Closed(CloseEvent::abnormal("transport error"));
        }

        loop {
            match self.read.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => {
                    return TransportEvent::Message(Message::Text(text.to_string()));
                }
                Some(Ok(TungsteniteMessage::Binary(data))) => {
                    return TransportEvent::Message(Message::Binary(data.to_vec()));
                }
                // Protocol-level ping/pong is answered by tungstenite itself
                Some(Ok(TungsteniteMessage::Ping(_))) => continue,
                Some(Ok(TungsteniteMessage::Pong(_))) => continue,
                Some(Ok(TungsteniteMessage::Frame(_))) => continue,
                Some(Ok(TungsteniteMessage::Close(frame))) => {
                    let close = match frame {
                        Some(frame) => CloseEvent {
                            code: frame.code.into(),
                            reason: frame.reason.to_string(),
                            was_clean: true,
                        },
                        None => CloseEvent { code: 1005, reason: String::new(), was_clean: true },
                    };
                    return TransportEvent::Closed(close);
                }
                Some(Err(e)) => {
                    self.errored = true;
                    return TransportEvent::Error(SocketError::Transport(e.to_string()));
                }
                None => {
                    return TransportEvent::Closed(CloseEvent::abnormal("stream ended"));
                }
            }
        }
    }
}
