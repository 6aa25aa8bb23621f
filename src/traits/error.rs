use thiserror::Error;

/// Main error type for resocket
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// Error on an established transport (send failure, protocol error, dropped stream)
    #[error("transport error: {0}")]
    Transport(String),

    /// The WebSocket handshake was rejected or the connection could not be opened
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The configured or composed URL could not be parsed
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The connection attempt did not reach the open state within `connection_timeout`
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// The query provider did not resolve within `params_timeout`
    #[error("query params timed out")]
    ParamsTimeout,

    /// The query provider or url provider failed
    #[error("query params failed: {0}")]
    Params(String),

    /// Sentinel returned by a query provider to stop the socket permanently
    ///
    /// Returning this from [`QueryProvider::query_params`] ends the socket:
    /// no further attempts are scheduled and the `disconnect` event carries
    /// the reason. Any other error only fails the current attempt.
    ///
    /// [`QueryProvider::query_params`]: crate::traits::params::QueryProvider::query_params
    #[error("retry stopped: {reason}")]
    StopRetry {
        /// Caller-supplied reason, surfaced on the `disconnect` event
        reason: String,
    },

    /// All configured retries were consumed without reaching the open state
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of failed attempts, including the initial one
        attempts: u32,
    },

    /// The server closed the connection
    #[error("connection closed: code {code}, reason: {reason}")]
    ConnectionClosed {
        /// Close code from the close frame
        code: u16,
        /// Close reason from the close frame
        reason: String,
    },

    /// The socket task is gone and can no longer accept commands
    #[error("socket task is gone")]
    ChannelClosed,
}

impl SocketError {
    /// Build the [`SocketError::StopRetry`] sentinel with the given reason
    pub fn stop_retry(reason: impl Into<String>) -> Self {
        Self::StopRetry { reason: reason.into() }
    }

    /// True for the terminal sentinel variant
    pub fn is_stop_retry(&self) -> bool {
        matches!(self, Self::StopRetry { .. })
    }
}

/// Result type for resocket operations
pub type Result<T> = std::result::Result<T, SocketError>;
