use std::sync::Arc;
use std::time::Duration;

use crate::core::buffer::BufferPolicy;
use crate::core::heartbeat::HeartbeatOptions;
use crate::core::socket::Socket;
use crate::traits::params::QueryProvider;
use crate::traits::retry::{ExponentialBackoff, RetryPolicy};
use crate::traits::signals::SignalSource;
use crate::traits::transport::{ConnectionResolver, Connector, TungsteniteConnector};
use crate::traits::url::UrlProvider;

/// Default wait for the transport to reach the open state
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default wait for the query provider to resolve
pub const DEFAULT_PARAMS_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default grace period before a `lostConnection` notification
pub const DEFAULT_LOST_CONNECTION_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default upper clamp for the reconnection delay
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_millis(10_000);

/// Default growth factor for the reconnection delay
pub const DEFAULT_RECONNECT_GROWTH_FACTOR: f64 = 1.3;

/// Resolved configuration handed to the socket task
pub(crate) struct SocketOptions {
    pub(crate) url: String,
    pub(crate) protocols: Vec<String>,
    pub(crate) query: Option<Arc<dyn QueryProvider>>,
    pub(crate) params_timeout: Duration,
    pub(crate) url_provider: Option<Arc<dyn UrlProvider>>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) connection_resolver: Option<Arc<dyn ConnectionResolver>>,
    pub(crate) connection_timeout: Duration,
    pub(crate) retry: Arc<dyn RetryPolicy>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) heartbeat: Option<HeartbeatOptions>,
    pub(crate) buffering: BufferPolicy,
    pub(crate) lost_connection_timeout: Duration,
    pub(crate) close_codes: Vec<u16>,
    pub(crate) start_closed: bool,
    pub(crate) signals: Option<Arc<dyn SignalSource>>,
    pub(crate) ignore_focus_events: bool,
    pub(crate) ignore_network_events: bool,
}

/// Builder for [`Socket`]
///
/// Every option has a default; only the URL is required and is given to
/// [`Socket::builder`]. `build` spawns the socket task, so it must run
/// inside a tokio runtime.
///
/// # Example
/// ```ignore
/// let socket = Socket::builder("wss://api.example.com/feed")
///     .heartbeat(HeartbeatOptions::new(Duration::from_secs(30)))
///     .buffering(BufferPolicy::Bounded(64))
///     .max_retries(10)
///     .close_code(4001)
///     .build();
/// ```
pub struct SocketBuilder {
    url: String,
    protocols: Vec<String>,
    query: Option<Arc<dyn QueryProvider>>,
    params_timeout: Duration,
    url_provider: Option<Arc<dyn UrlProvider>>,
    connector: Option<Arc<dyn Connector>>,
    connection_resolver: Option<Arc<dyn ConnectionResolver>>,
    connection_timeout: Duration,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    max_retries: Option<u32>,
    min_reconnect_delay: Option<Duration>,
    max_reconnect_delay: Duration,
    reconnect_growth_factor: f64,
    heartbeat: Option<HeartbeatOptions>,
    buffering: BufferPolicy,
    lost_connection_timeout: Duration,
    close_codes: Vec<u16>,
    start_closed: bool,
    signals: Option<Arc<dyn SignalSource>>,
    ignore_focus_events: bool,
    ignore_network_events: bool,
}

impl SocketBuilder {
    pub(crate) fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
            query: None,
            params_timeout: DEFAULT_PARAMS_TIMEOUT,
            url_provider: None,
            connector: None,
            connection_resolver: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            retry_policy: None,
            max_retries: None,
            min_reconnect_delay: None,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            reconnect_growth_factor: DEFAULT_RECONNECT_GROWTH_FACTOR,
            heartbeat: None,
            buffering: BufferPolicy::Disabled,
            lost_connection_timeout: DEFAULT_LOST_CONNECTION_TIMEOUT,
            close_codes: Vec::new(),
            start_closed: false,
            signals: None,
            ignore_focus_events: false,
            ignore_network_events: false,
        }
    }

    /// Offer a single subprotocol during the handshake
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Offer multiple subprotocols during the handshake
    pub fn protocols<P: Into<String>>(mut self, protocols: impl IntoIterator<Item = P>) -> Self {
        self.protocols.extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Resolve query parameters before every attempt
    pub fn query(mut self, provider: impl QueryProvider + 'static) -> Self {
        self.query = Some(Arc::new(provider));
        self
    }

    /// How long the query provider may take before the attempt fails
    pub fn params_timeout(mut self, timeout: Duration) -> Self {
        self.params_timeout = timeout;
        self
    }

    /// Take over URL construction entirely
    pub fn url_provider(mut self, provider: impl UrlProvider + 'static) -> Self {
        self.url_provider = Some(Arc::new(provider));
        self
    }

    /// Swap the transport implementation
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Gate attempt success behind a post-open check
    pub fn connection_resolver(mut self, resolver: impl ConnectionResolver + 'static) -> Self {
        self.connection_resolver = Some(Arc::new(resolver));
        self
    }

    /// How long an attempt may take to reach the open state
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Supply a custom reconnection pacing policy
    ///
    /// Overrides the delay computed from `min_reconnect_delay`,
    /// `max_reconnect_delay` and `reconnect_growth_factor`.
    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Some(Arc::new(policy));
        self
    }

    /// Cap consecutive failed attempts; unlimited when not set
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Lower bound for the reconnection delay
    ///
    /// When not set, a value between 1000 and 5000 ms is rolled once per
    /// socket so that a fleet of clients does not reconnect in lockstep.
    pub fn min_reconnect_delay(mut self, delay: Duration) -> Self {
        self.min_reconnect_delay = Some(delay);
        self
    }

    /// Upper bound for the reconnection delay
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    /// Growth factor applied to the reconnection delay per attempt
    pub fn reconnect_growth_factor(mut self, factor: f64) -> Self {
        self.reconnect_growth_factor = factor;
        self
    }

    /// Enable heartbeat liveness detection
    pub fn heartbeat(mut self, options: HeartbeatOptions) -> Self {
        self.heartbeat = Some(options);
        self
    }

    /// Buffer messages sent while not connected
    pub fn buffering(mut self, policy: BufferPolicy) -> Self {
        self.buffering = policy;
        self
    }

    /// Grace period before `lostConnection` notifications
    pub fn lost_connection_timeout(mut self, timeout: Duration) -> Self {
        self.lost_connection_timeout = timeout;
        self
    }

    /// Treat a server close with this code as terminal
    pub fn close_code(mut self, code: u16) -> Self {
        self.close_codes.push(code);
        self
    }

    /// Treat server closes with any of these codes as terminal
    pub fn close_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.close_codes.extend(codes);
        self
    }

    /// Create the socket in the disconnected state; connect on
    /// [`Socket::reconnect`]
    pub fn start_closed(mut self, start_closed: bool) -> Self {
        self.start_closed = start_closed;
        self
    }

    /// Subscribe to host focus/online signals
    pub fn signal_source(mut self, source: impl SignalSource + 'static) -> Self {
        self.signals = Some(Arc::new(source));
        self
    }

    /// Do not let focus signals force heartbeat probes
    pub fn ignore_focus_events(mut self, ignore: bool) -> Self {
        self.ignore_focus_events = ignore;
        self
    }

    /// Do not let network-online signals force heartbeat probes
    pub fn ignore_network_events(mut self, ignore: bool) -> Self {
        self.ignore_network_events = ignore;
        self
    }

    /// Spawn the socket task and return the handle
    pub fn build(self) -> Socket {
        let min_delay = self.min_reconnect_delay.unwrap_or_else(|| {
            Duration::from_millis(1000 + (rand::random::<f64>() * 4000.0) as u64)
        });
        let retry = self.retry_policy.unwrap_or_else(|| {
            Arc::new(ExponentialBackoff::new(
                min_delay,
                self.max_reconnect_delay,
                self.reconnect_growth_factor,
            ))
        });
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector));

        Socket::spawn(SocketOptions {
            url: self.url,
            protocols: self.protocols,
            query: self.query,
            params_timeout: self.params_timeout,
            url_provider: self.url_provider,
            connector,
            connection_resolver: self.connection_resolver,
            connection_timeout: self.connection_timeout,
            retry,
            max_retries: self.max_retries,
            heartbeat: self.heartbeat,
            buffering: self.buffering,
            lost_connection_timeout: self.lost_connection_timeout,
            close_codes: self.close_codes,
            start_closed: self.start_closed,
            signals: self.signals,
            ignore_focus_events: self.ignore_focus_events,
            ignore_network_events: self.ignore_network_events,
        })
    }
}
