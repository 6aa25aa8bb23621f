//! Environment signal probes
//!
//! Hosts that can observe focus/visibility changes or network-online
//! transitions can feed them to the socket, where they force an immediate
//! heartbeat probe. Hosts without such notifications use [`NoSignals`]
//! and the rest of the machinery behaves identically.

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A host environment event relevant to connection liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvSignal {
    /// The host regained focus or became visible
    Focus,
    /// The host network came back online
    Online,
}

/// Capability for subscribing to host environment signals
pub trait SignalSource: Send + Sync {
    /// Subscribe to the signal stream
    ///
    /// The socket holds the receiver for its lifetime; a closed channel
    /// degrades to silence.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<EnvSignal>;
}

/// Signal source for hosts without focus or network notifications
pub struct NoSignals;

impl SignalSource for NoSignals {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<EnvSignal> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }
}

/// A signal source fed manually through [`ChannelSignals::emit`]
///
/// Useful when the embedding application already receives host
/// notifications through its own machinery, and in tests.
#[derive(Default)]
pub struct ChannelSignals {
    senders: Mutex<Vec<mpsc::UnboundedSender<EnvSignal>>>,
}

impl ChannelSignals {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a signal to every subscriber
    pub fn emit(&self, signal: EnvSignal) {
        self.senders.lock().retain(|tx| tx.send(signal).is_ok());
    }
}

impl SignalSource for ChannelSignals {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<EnvSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        rx
    }
}
