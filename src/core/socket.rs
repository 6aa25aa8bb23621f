//! Socket core: the lifecycle state machine
//!
//! Each [`Socket`] spawns one task that owns the transport and every
//! timer. The handle talks to the task through a command channel and
//! observes it through shared state and the event fan-out. The task moves
//! between three shapes: a connect cycle (attempts paced by the retry
//! policy), the connected loop (messages, commands, heartbeat, host
//! signals) and the disconnected idle wait (commands only, nothing
//! scheduled).

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::core::attempt::{run_attempt, AttemptFailure};
use crate::core::buffer::SendBuffer;
use crate::core::config::{SocketBuilder, SocketOptions};
use crate::core::emitter::{Emitter, ListenerId};
use crate::core::event::{DisconnectCause, Event, EventKind, LostConnection};
use crate::core::heartbeat::{HeartbeatController, HeartbeatTick};
use crate::core::status::{ReadyState, Status};
use crate::traits::error::{Result, SocketError};
use crate::traits::retry::RetryInfo;
use crate::traits::signals::EnvSignal;
use crate::traits::transport::{
    CloseEvent, Connection, ConnectionInfo, Message, TransportEvent, TransportSink,
};

enum Command {
    Send(Message),
    Close,
    Reconnect,
}

pub(crate) struct Shared {
    status: watch::Sender<Status>,
    retry_count: AtomicU32,
    buffered: AtomicU64,
    last_sent: Mutex<Option<Instant>>,
    info: Mutex<ConnectionInfo>,
    /// The held transport's own `readyState`, `None` while no transport
    transport_state: Mutex<Option<ReadyState>>,
    emitter: Emitter,
}

impl Shared {
    fn set_status(&self, status: Status) {
        let changed = *self.status.borrow() != status;
        if changed {
            self.status.send_replace(status);
            debug!(%status, "status changed");
            self.emit(&Event::Status(status));
        }
    }

    fn emit(&self, event: &Event) {
        self.emitter.emit(event);
    }

    fn status(&self) -> Status {
        *self.status.borrow()
    }

    fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Acquire)
    }

    fn bump_retry(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn reset_retry(&self) {
        self.retry_count.store(0, Ordering::Release);
    }

    fn note_sent(&self, now: Instant) {
        *self.last_sent.lock() = Some(now);
    }

    fn set_buffered(&self, bytes: u64) {
        self.buffered.store(bytes, Ordering::Release);
    }

    fn set_info(&self, info: ConnectionInfo) {
        *self.info.lock() = info;
    }

    fn set_transport_state(&self, state: Option<ReadyState>) {
        *self.transport_state.lock() = state;
    }

    fn transport_state(&self) -> Option<ReadyState> {
        *self.transport_state.lock()
    }
}

/// A reconnecting WebSocket client
///
/// Construction spawns the socket task and, unless `start_closed` is
/// configured, begins connecting immediately. The handle is cheap to
/// share behind an [`Arc`]; dropping the last handle tears the task down.
///
/// See the [crate documentation](crate) for usage and examples.
pub struct Socket {
    shared: Arc<Shared>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Socket {
    /// Start building a socket for the given URL
    pub fn builder(url: impl Into<String>) -> SocketBuilder {
        SocketBuilder::new(url)
    }

    /// Connect to `url` with default options
    pub fn new(url: impl Into<String>) -> Socket {
        Self::builder(url).build()
    }

    pub(crate) fn spawn(options: SocketOptions) -> Socket {
        let initial = if options.start_closed {
            Status::Disconnected
        } else {
            Status::Connecting
        };
        let (status_tx, _status_rx) = watch::channel(initial);
        let shared = Arc::new(Shared {
            status: status_tx,
            retry_count: AtomicU32::new(0),
            buffered: AtomicU64::new(0),
            last_sent: Mutex::new(None),
            info: Mutex::new(ConnectionInfo {
                url: options.url.clone(),
                protocol: String::new(),
            }),
            transport_state: Mutex::new(None),
            emitter: Emitter::new(),
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let buffering = options.buffering;
        let signals = options.signals.as_ref().map(|source| source.subscribe());

        let engine = Engine {
            shared: Arc::clone(&shared),
            options: Arc::new(options),
            cmd_rx,
            signals,
            buffer: SendBuffer::new(buffering),
            lost: LostTimer::default(),
            last_error: None,
        };
        tokio::spawn(engine.run());

        Socket { shared, cmd_tx }
    }

    /// Send a message
    ///
    /// When connected the payload goes straight to the transport. While
    /// not connected it is buffered per the configured policy, or dropped
    /// with a debug trace when buffering is off. The only error is a gone
    /// socket task.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.cmd_tx
            .send(Command::Send(message.into()))
            .map_err(|_| SocketError::ChannelClosed)
    }

    /// Close the socket
    ///
    /// Cancels every timer, closes the transport when one is open and
    /// settles in `Disconnected`. Idempotent: repeated calls do nothing
    /// further. [`reconnect`](Self::reconnect) starts a fresh cycle.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }

    /// Leave `Disconnected` and start a fresh connect cycle
    ///
    /// A no-op in every other state.
    pub fn reconnect(&self) {
        let _ = self.cmd_tx.send(Command::Reconnect);
    }

    /// Current lifecycle status
    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// Numeric `readyState` in the standard WebSocket sense
    ///
    /// Proxied from the transport while one is held, so a closing
    /// handshake reports `Closing`; derived from the lifecycle status
    /// when no transport exists (attempts in flight report `Connecting`,
    /// the terminal state `Closed`).
    pub fn ready_state(&self) -> ReadyState {
        self.shared
            .transport_state()
            .unwrap_or_else(|| self.status().into())
    }

    /// True when a transport is open and accepting writes
    pub fn can_send(&self) -> bool {
        self.status() == Status::Connected
    }

    /// Failed attempts in the current reconnection cycle
    pub fn retry_count(&self) -> u32 {
        self.shared.retry_count()
    }

    /// Bytes queued in the send buffer
    pub fn buffered_amount(&self) -> u64 {
        self.shared.buffered.load(Ordering::Acquire)
    }

    /// When the last payload was handed to a transport, pings and flushed
    /// buffered messages included
    pub fn last_message_sent(&self) -> Option<Instant> {
        *self.shared.last_sent.lock()
    }

    /// The URL of the current transport, or the last one used
    pub fn url(&self) -> String {
        self.shared.info.lock().url.clone()
    }

    /// The negotiated subprotocol, empty when none was agreed
    pub fn protocol(&self) -> String {
        self.shared.info.lock().protocol.clone()
    }

    /// Watch the status; the receiver sees every transition
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.shared.status.subscribe()
    }

    /// Register a listener for one event family
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> ListenerId {
        self.shared.emitter.on(kind, listener)
    }

    /// Register a listener that fires at most once
    pub fn once(
        &self,
        kind: EventKind,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> ListenerId {
        self.shared.emitter.once(kind, listener)
    }

    /// Remove a listener; idempotent
    pub fn off(&self, id: ListenerId) {
        self.shared.emitter.off(id);
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("url", &self.url())
            .field("status", &self.status())
            .field("retry_count", &self.retry_count())
            .finish()
    }
}

/// Grace-period bookkeeping for lost-connection notifications
#[derive(Default)]
struct LostTimer {
    deadline: Option<Instant>,
    fired: bool,
}

impl LostTimer {
    /// Arm once per disconnected cycle; later calls are no-ops
    fn arm(&mut self, at: Instant) {
        if self.deadline.is_none() && !self.fired {
            self.deadline = Some(at);
        }
    }

    fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    fn deadline_or_far(&self) -> Instant {
        self.deadline.unwrap_or_else(far_future)
    }

    fn fire(&mut self) {
        self.deadline = None;
        self.fired = true;
    }

    fn has_fired(&self) -> bool {
        self.fired
    }

    fn reset(&mut self) {
        self.deadline = None;
        self.fired = false;
    }
}

enum CycleEnd {
    Idle,
    Shutdown,
}

enum ConnExit {
    Retry,
    Fatal,
    UserClosed,
    Shutdown,
}

enum WaitEnd {
    Proceed,
    UserClosed,
    Shutdown,
}

enum IdleEnd {
    Reconnect,
    Shutdown,
}

struct Engine {
    shared: Arc<Shared>,
    options: Arc<SocketOptions>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    signals: Option<mpsc::UnboundedReceiver<EnvSignal>>,
    buffer: SendBuffer,
    lost: LostTimer,
    last_error: Option<SocketError>,
}

impl Engine {
    async fn run(mut self) {
        debug!(url = %self.options.url, "socket task started");
        if self.options.start_closed {
            match self.idle().await {
                IdleEnd::Shutdown => return,
                IdleEnd::Reconnect => {}
            }
        }
        loop {
            match self.connect_cycle().await {
                CycleEnd::Shutdown => {
                    debug!("socket task exiting");
                    return;
                }
                CycleEnd::Idle => match self.idle().await {
                    IdleEnd::Shutdown => {
                        debug!("socket task exiting");
                        return;
                    }
                    IdleEnd::Reconnect => {}
                },
            }
        }
    }

    /// Disconnected wait: no transport, no timers, commands only
    async fn idle(&mut self) -> IdleEnd {
        loop {
            match self.cmd_rx.recv().await {
                Some(Command::Reconnect) => {
                    info!("reconnect requested");
                    self.shared.reset_retry();
                    self.last_error = None;
                    self.lost.reset();
                    self.shared.set_status(Status::Connecting);
                    return IdleEnd::Reconnect;
                }
                Some(Command::Send(message)) => {
                    if self.buffer.enqueue(message) {
                        self.shared.set_buffered(self.buffer.bytes());
                    }
                }
                // Already disconnected, nothing to do
                Some(Command::Close) => {}
                None => return IdleEnd::Shutdown,
            }
        }
    }

    /// Run attempts until connected-then-terminal, closed or shut down
    async fn connect_cycle(&mut self) -> CycleEnd {
        let started_at = Instant::now();
        loop {
            let retry_info = RetryInfo {
                retry_count: self.shared.retry_count(),
                last_error: self.last_error.clone().map(Arc::new),
                started_at,
            };
            let attempt = run_attempt(Arc::clone(&self.options), retry_info);
            tokio::pin!(attempt);

            let shared = Arc::clone(&self.shared);
            let outcome = loop {
                let lost_deadline = self.lost.deadline_or_far();
                let Engine { cmd_rx, buffer, lost, .. } = &mut *self;
                tokio::select! {
                    result = &mut attempt => break result,
                    command = cmd_rx.recv() => match command {
                        Some(Command::Send(message)) => {
                            if buffer.enqueue(message) {
                                shared.set_buffered(buffer.bytes());
                            }
                        }
                        Some(Command::Close) => {
                            user_close_offline(&shared, buffer, lost);
                            return CycleEnd::Idle;
                        }
                        Some(Command::Reconnect) => {}
                        None => return CycleEnd::Shutdown,
                    },
                    _ = sleep_until(lost_deadline), if lost.is_armed() => {
                        lost.fire();
                        shared.emit(&Event::LostConnection(LostConnection::Lost));
                    }
                }
            };

            match outcome {
                Ok(connection) => match self.connected_phase(connection).await {
                    ConnExit::Retry => continue,
                    ConnExit::Fatal | ConnExit::UserClosed => return CycleEnd::Idle,
                    ConnExit::Shutdown => return CycleEnd::Shutdown,
                },
                Err(AttemptFailure::Terminal(error)) => {
                    let reason = match &error {
                        SocketError::StopRetry { reason } => reason.clone(),
                        other => other.to_string(),
                    };
                    info!(%reason, "query provider stopped the socket");
                    terminal_disconnect(
                        &self.shared,
                        &mut self.buffer,
                        &mut self.lost,
                        Some(DisconnectCause::StopRetry(reason)),
                    );
                    return CycleEnd::Idle;
                }
                Err(AttemptFailure::Failed(error)) => {
                    debug!(%error, "connection attempt failed");
                    self.last_error = Some(error);
                    let failures = self.shared.bump_retry();

                    if let Some(max) = self.options.max_retries {
                        if failures > max {
                            warn!(attempts = failures, "retries exhausted");
                            let cause = DisconnectCause::Error(
                                self.last_error.clone().unwrap_or(
                                    SocketError::RetriesExhausted { attempts: failures },
                                ),
                            );
                            terminal_disconnect(
                                &self.shared,
                                &mut self.buffer,
                                &mut self.lost,
                                Some(cause),
                            );
                            return CycleEnd::Idle;
                        }
                    }

                    self.shared.set_status(Status::Reconnecting);
                    self.lost
                        .arm(Instant::now() + self.options.lost_connection_timeout);

                    let delay = self.options.retry.next_delay(failures - 1);
                    debug!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    match self.wait_retry(delay).await {
                        WaitEnd::Proceed => {}
                        WaitEnd::UserClosed => return CycleEnd::Idle,
                        WaitEnd::Shutdown => return CycleEnd::Shutdown,
                    }
                }
            }
        }
    }

    /// Pace the next attempt, staying responsive to commands
    async fn wait_retry(&mut self, delay: Duration) -> WaitEnd {
        let wake = Instant::now() + delay;
        let shared = Arc::clone(&self.shared);
        loop {
            let lost_deadline = self.lost.deadline_or_far();
            let Engine { cmd_rx, buffer, lost, .. } = &mut *self;
            tokio::select! {
                _ = sleep_until(wake) => return WaitEnd::Proceed,
                command = cmd_rx.recv() => match command {
                    Some(Command::Send(message)) => {
                        if buffer.enqueue(message) {
                            shared.set_buffered(buffer.bytes());
                        }
                    }
                    Some(Command::Close) => {
                        user_close_offline(&shared, buffer, lost);
                        return WaitEnd::UserClosed;
                    }
                    Some(Command::Reconnect) => {}
                    None => return WaitEnd::Shutdown,
                },
                _ = sleep_until(lost_deadline), if lost.is_armed() => {
                    lost.fire();
                    shared.emit(&Event::LostConnection(LostConnection::Lost));
                }
            }
        }
    }

    /// Drive one open transport until it goes away
    async fn connected_phase(&mut self, connection: Connection) -> ConnExit {
        let Connection { mut sink, mut stream, info } = connection;
        let shared = Arc::clone(&self.shared);
        let options = Arc::clone(&self.options);

        info!(url = %info.url, "connected");
        shared.set_info(info);
        shared.set_transport_state(Some(sink.ready_state()));
        shared.reset_retry();
        shared.set_status(Status::Connected);
        shared.emit(&Event::Open);
        if self.lost.has_fired() {
            shared.emit(&Event::LostConnection(LostConnection::Restored));
        }
        self.lost.reset();
        self.last_error = None;

        let mut hb = options
            .heartbeat
            .clone()
            .map(|opts| HeartbeatController::new(opts, Instant::now()));

        // Buffered sends go out first, in enqueue order
        while let Some(message) = self.buffer.pop_front() {
            match sink.send(message.clone()).await {
                Ok(()) => note_sent(&shared, &mut hb),
                Err(error) => {
                    self.buffer.push_front(message);
                    self.shared.set_buffered(self.buffer.bytes());
                    self.last_error = Some(error.clone());
                    fail_transport(&shared, &mut self.lost, &mut sink, &options, error).await;
                    return ConnExit::Retry;
                }
            }
        }
        shared.set_buffered(self.buffer.bytes());

        loop {
            let hb_deadline = hb
                .as_ref()
                .map(|controller| controller.next_deadline())
                .unwrap_or_else(far_future);
            let Engine { cmd_rx, signals, buffer, lost, last_error, .. } = &mut *self;
            tokio::select! {
                transport_event = stream.next_event() => match transport_event {
                    TransportEvent::Message(message) => {
                        let consumed = hb
                            .as_mut()
                            .map(|controller| controller.on_message(&message))
                            .unwrap_or(false);
                        if consumed {
                            trace!("pong consumed by heartbeat filter");
                        } else {
                            shared.emit(&Event::Message(message));
                        }
                    }
                    TransportEvent::Error(error) => {
                        warn!(%error, "transport error");
                        shared.emit(&Event::Error(error.clone()));
                        *last_error = Some(error);
                    }
                    TransportEvent::Closed(close) => {
                        info!(code = close.code, clean = close.was_clean, "transport closed");
                        shared.set_transport_state(None);
                        shared.emit(&Event::Close(close.clone()));
                        if options.close_codes.contains(&close.code) {
                            terminal_disconnect(
                                &shared,
                                buffer,
                                lost,
                                Some(DisconnectCause::Close(close)),
                            );
                            return ConnExit::Fatal;
                        }
                        *last_error = Some(SocketError::ConnectionClosed {
                            code: close.code,
                            reason: close.reason,
                        });
                        shared.set_status(Status::Reconnecting);
                        lost.arm(Instant::now() + options.lost_connection_timeout);
                        return ConnExit::Retry;
                    }
                },
                command = cmd_rx.recv() => match command {
                    Some(Command::Send(message)) => match sink.send(message).await {
                        Ok(()) => note_sent(&shared, &mut hb),
                        Err(error) => {
                            *last_error = Some(error.clone());
                            fail_transport(&shared, lost, &mut sink, &options, error).await;
                            return ConnExit::Retry;
                        }
                    },
                    Some(Command::Close) => {
                        info!("closed by caller");
                        shared.set_transport_state(Some(ReadyState::Closing));
                        shared.set_status(Status::Disconnected);
                        shared.emit(&Event::Close(CloseEvent::clean(1000, "")));
                        sink.close(Some(1000), None).await;
                        shared.set_transport_state(None);
                        lost.reset();
                        buffer.clear();
                        shared.set_buffered(0);
                        return ConnExit::UserClosed;
                    }
                    Some(Command::Reconnect) => {}
                    None => {
                        sink.close(Some(1000), None).await;
                        shared.set_transport_state(None);
                        return ConnExit::Shutdown;
                    }
                },
                _ = sleep_until(hb_deadline), if hb.is_some() => {
                    let Some(tick) = hb
                        .as_mut()
                        .map(|controller| controller.on_deadline(Instant::now()))
                    else {
                        continue;
                    };
                    match tick {
                        HeartbeatTick::Ping(ping) => match sink.send(ping).await {
                            Ok(()) => {
                                trace!("heartbeat ping sent");
                                note_sent(&shared, &mut hb);
                            }
                            Err(error) => {
                                *last_error = Some(error.clone());
                                fail_transport(&shared, lost, &mut sink, &options, error).await;
                                return ConnExit::Retry;
                            }
                        },
                        HeartbeatTick::Miss { missed } => {
                            debug!(missed, "heartbeat pong missed");
                        }
                        HeartbeatTick::Expire => {
                            warn!("heartbeat expired, recycling transport");
                            shared.emit(&Event::Close(CloseEvent::abnormal("heartbeat timeout")));
                            sink.close(None, None).await;
                            shared.set_transport_state(None);
                            *last_error =
                                Some(SocketError::Transport("heartbeat timeout".to_string()));
                            shared.set_status(Status::Reconnecting);
                            lost.arm(Instant::now() + options.lost_connection_timeout);
                            return ConnExit::Retry;
                        }
                    }
                },
                signal = next_signal(signals) => {
                    let allowed = match signal {
                        EnvSignal::Focus => !options.ignore_focus_events,
                        EnvSignal::Online => !options.ignore_network_events,
                    };
                    if allowed {
                        let probe = hb
                            .as_mut()
                            .and_then(|controller| controller.trigger(Instant::now()));
                        if let Some(ping) = probe {
                            debug!(?signal, "environment signal forced a heartbeat probe");
                            match sink.send(ping).await {
                                Ok(()) => note_sent(&shared, &mut hb),
                                Err(error) => {
                                    *last_error = Some(error.clone());
                                    fail_transport(&shared, lost, &mut sink, &options, error)
                                        .await;
                                    return ConnExit::Retry;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Caller close while no transport is open
fn user_close_offline(shared: &Shared, buffer: &mut SendBuffer, lost: &mut LostTimer) {
    info!("closed by caller");
    shared.set_status(Status::Disconnected);
    shared.emit(&Event::Close(CloseEvent::clean(1000, "")));
    lost.reset();
    buffer.clear();
    shared.set_buffered(0);
}

/// Terminal failure: announce the cause and settle in `Disconnected`
fn terminal_disconnect(
    shared: &Shared,
    buffer: &mut SendBuffer,
    lost: &mut LostTimer,
    cause: Option<DisconnectCause>,
) {
    shared.set_status(Status::Disconnected);
    shared.emit(&Event::Disconnect(cause));
    if lost.has_fired() {
        shared.emit(&Event::LostConnection(LostConnection::Failed));
    }
    lost.reset();
    buffer.clear();
    shared.set_buffered(0);
}

/// A write on the established transport failed: surface it, tear the
/// transport down and move to the retry path
async fn fail_transport(
    shared: &Shared,
    lost: &mut LostTimer,
    sink: &mut Box<dyn TransportSink>,
    options: &SocketOptions,
    error: SocketError,
) {
    warn!(%error, "transport write failed");
    shared.emit(&Event::Error(error));
    shared.emit(&Event::Close(CloseEvent::abnormal("send failed")));
    sink.close(None, None).await;
    shared.set_transport_state(None);
    shared.set_status(Status::Reconnecting);
    lost.arm(Instant::now() + options.lost_connection_timeout);
}

fn note_sent(shared: &Shared, hb: &mut Option<HeartbeatController>) {
    let now = Instant::now();
    shared.note_sent(now);
    if let Some(controller) = hb {
        controller.note_activity(now);
    }
}

/// Wait for the next host signal; a closed or absent source never yields
async fn next_signal(rx: &mut Option<mpsc::UnboundedReceiver<EnvSignal>>) -> EnvSignal {
    loop {
        match rx {
            Some(receiver) => match receiver.recv().await {
                Some(signal) => return signal,
                None => *rx = None,
            },
            None => std::future::pending::<()>().await,
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365)
}
