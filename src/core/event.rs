use crate::core::status::Status;
use crate::traits::error::SocketError;
use crate::traits::transport::{CloseEvent, Message};

/// Grace-period notification distinguishing brief hiccups from outages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostConnection {
    /// The connection has been down longer than `lost_connection_timeout`
    Lost,
    /// The connection came back after `Lost` had been announced
    Restored,
    /// The socket gave up after `Lost` had been announced
    Failed,
}

/// What terminated the socket, carried on the `disconnect` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The server closed with a code configured as fatal
    Close(CloseEvent),
    /// The last attempt error once retries were exhausted
    Error(SocketError),
    /// A query provider returned the stop sentinel
    StopRetry(String),
}

/// Everything a [`Socket`] announces to its listeners
///
/// [`Socket`]: crate::core::socket::Socket
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A transport reached the open state
    Open,
    /// A data message arrived (heartbeat pongs are filtered out)
    Message(Message),
    /// An established transport errored; not terminal by itself
    Error(SocketError),
    /// A transport closed, by the server, the caller or a teardown
    Close(CloseEvent),
    /// The lifecycle status changed
    Status(Status),
    /// The socket reached `Disconnected` through failure, with the cause
    /// when the failure carries one; caller-initiated closes do not fire
    /// this event
    Disconnect(Option<DisconnectCause>),
    /// Grace-period signal, see [`LostConnection`]
    LostConnection(LostConnection),
}

/// Discriminant used to register listeners for one event family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Transport open
    Open,
    /// Inbound data message
    Message,
    /// Transport error
    Error,
    /// Transport close
    Close,
    /// Status change
    Status,
    /// Terminal failure
    Disconnect,
    /// Grace-period signal
    LostConnection,
}

impl Event {
    /// The family this event belongs to
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Open => EventKind::Open,
            Event::Message(_) => EventKind::Message,
            Event::Error(_) => EventKind::Error,
            Event::Close(_) => EventKind::Close,
            Event::Status(_) => EventKind::Status,
            Event::Disconnect(_) => EventKind::Disconnect,
            Event::LostConnection(_) => EventKind::LostConnection,
        }
    }
}
