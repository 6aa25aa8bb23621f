//! Pluggable seams of the reconnecting socket
//!
//! Every policy the socket consults is a trait with a default
//! implementation, so behavior can be swapped piecewise:
//!
//! - [`Connector`] / [`TransportSink`] / [`TransportStream`]: the transport
//! - [`QueryProvider`]: async query parameter (credential) injection
//! - [`UrlProvider`]: full control over URL construction
//! - [`RetryPolicy`]: reconnection pacing
//! - [`PongMatcher`]: heartbeat pong recognition
//! - [`SignalSource`]: host focus/online probes
//! - [`ConnectionResolver`]: post-open attempt gating

pub mod error;
pub mod params;
pub mod pong;
pub mod retry;
pub mod signals;
pub mod transport;
pub mod url;

pub use error::{Result, SocketError};
pub use params::{QueryParams, QueryProvider, StaticQuery};
pub use pong::{JsonPongMatcher, PongMatcher, TextPongMatcher};
pub use retry::{ExponentialBackoff, FixedDelay, RetryInfo, RetryPolicy};
pub use signals::{ChannelSignals, EnvSignal, NoSignals, SignalSource};
pub use transport::{
    CloseEvent, Connection, ConnectionInfo, ConnectionResolver, Connector, Message,
    TransportEvent, TransportSink, TransportStream, TungsteniteConnector,
};
pub use url::{compose_url, UrlProvider};
