//! # resocket
//!
//! A reconnecting WebSocket client: wraps a pluggable transport with
//! automatic reconnection, parameterized connection URLs, heartbeat
//! liveness detection, optional send buffering across reconnects, a
//! lost-connection grace-period detector and an observable status state
//! machine.
//!
//! ## Features
//!
//! - **Automatic reconnection**: exponential backoff by default, capped
//!   retries, or a custom [`RetryPolicy`]
//! - **Async credential injection**: a [`QueryProvider`] resolves fresh
//!   query parameters before every attempt; returning the
//!   [`SocketError::StopRetry`] sentinel ends the socket permanently
//! - **Heartbeat**: application-level ping/pong with miss accounting and
//!   probes forced by host focus/online signals
//! - **Send buffering**: messages sent while disconnected are queued and
//!   flushed in order on the next open transport
//! - **Observer fan-out**: `open`, `message`, `error`, `close`, `status`,
//!   `disconnect` and `lostConnection` events with registration-order
//!   dispatch
//! - **Pluggable transport**: any [`Connector`] implementation; the
//!   default is tokio-tungstenite
//! - **Reactive adapter**: [`SocketContext`] for component-tree UI
//!   runtimes
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use resocket::{BufferPolicy, EventKind, HeartbeatOptions, Socket};
//!
//! #[tokio::main]
//! async fn main() {
//!     let socket = Socket::builder("wss://api.example.com/feed")
//!         .heartbeat(HeartbeatOptions::new(Duration::from_secs(30)))
//!         .buffering(BufferPolicy::Bounded(64))
//!         .max_retries(10)
//!         .build();
//!
//!     socket.on(EventKind::Message, |event| {
//!         println!("got {:?}", event);
//!     });
//!
//!     socket.send("hello").unwrap();
//! }
//! ```

pub mod context;
pub mod core;
pub mod traits;

pub use crate::context::{EventBinding, SocketContext, StatusWatch};
pub use crate::core::{
    BufferPolicy, DisconnectCause, Event, EventKind, HeartbeatOptions, ListenerId,
    LostConnection, ReadyState, Socket, SocketBuilder, Status,
};
pub use crate::traits::{
    compose_url, ChannelSignals, CloseEvent, Connection, ConnectionInfo, ConnectionResolver,
    Connector, EnvSignal, ExponentialBackoff, FixedDelay, JsonPongMatcher, Message, NoSignals,
    PongMatcher, QueryParams, QueryProvider, Result, RetryInfo, RetryPolicy, SignalSource,
    SocketError, StaticQuery, TextPongMatcher, TransportEvent, TransportSink, TransportStream,
    TungsteniteConnector, UrlProvider,
};
