use std::fmt;

/// The coarse lifecycle state of a [`Socket`]
///
/// `Connecting` is the first attempt of a cycle; `Reconnecting` covers
/// every subsequent attempt. `Disconnected` is terminal until
/// [`Socket::reconnect`] is called.
///
/// [`Socket`]: crate::core::socket::Socket
/// [`Socket::reconnect`]: crate::core::socket::Socket::reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The first connection attempt of a cycle is in flight
    Connecting,
    /// A transport is open and messages flow
    Connected,
    /// The connection dropped and a new attempt is in flight or scheduled
    Reconnecting,
    /// No transport, no timers; leaving requires an explicit reconnect
    Disconnected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Reconnecting => "reconnecting",
            Status::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Numeric mirror of the standard WebSocket `readyState`
///
/// See [`WebSocket.readyState` on MDN](https://developer.mozilla.org/en-US/docs/Web/API/WebSocket/readyState).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// The connection has not yet been established
    Connecting = 0,
    /// The connection is established and communication is possible
    Open = 1,
    /// The connection is going through the closing handshake
    Closing = 2,
    /// The connection has been closed or could not be opened
    Closed = 3,
}

/// The fallback used when no transport is held; `Closing` only comes
/// from a live transport's own report
impl From<Status> for ReadyState {
    fn from(value: Status) -> Self {
        match value {
            Status::Connecting | Status::Reconnecting => ReadyState::Connecting,
            Status::Connected => ReadyState::Open,
            Status::Disconnected => ReadyState::Closed,
        }
    }
}
