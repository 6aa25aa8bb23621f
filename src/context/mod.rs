//! Reactive adapter for component-tree UI runtimes
//!
//! [`SocketContext`] plays the provider role: it owns exactly one
//! [`Socket`] for its own lifetime and closes it on drop. Components
//! reach the socket through the context and subscribe through hook-shaped
//! accessors:
//!
//! - [`SocketContext::socket`] hands out the stable shared handle
//! - [`SocketContext::status`] yields a [`StatusWatch`] with a synchronous
//!   current value and an awaitable change notification
//! - [`SocketContext::on_message`] and
//!   [`SocketContext::on_lost_connection`] return RAII bindings that
//!   unsubscribe on drop
//!
//! A binding's callback can be swapped in place with
//! [`EventBinding::set`], so a component that re-renders with a fresh
//! closure updates the slot instead of re-subscribing. The underlying
//! listener reads the slot on every dispatch and therefore always runs
//! the latest closure.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::core::event::{Event, EventKind, LostConnection};
use crate::core::emitter::ListenerId;
use crate::core::socket::Socket;
use crate::core::status::Status;
use crate::traits::transport::Message;

/// Owns one socket and hands out subscriptions scoped to component
/// lifetimes
pub struct SocketContext {
    socket: Arc<Socket>,
}

impl SocketContext {
    /// Wrap an already-built socket
    pub fn new(socket: Socket) -> Self {
        Self { socket: Arc::new(socket) }
    }

    /// Connect to `url` with default options and wrap the socket
    pub fn connect(url: impl Into<String>) -> Self {
        Self::new(Socket::new(url))
    }

    /// The shared socket handle; stable across the context's lifetime
    pub fn socket(&self) -> Arc<Socket> {
        Arc::clone(&self.socket)
    }

    /// Subscribe to status changes
    pub fn status(&self) -> StatusWatch {
        StatusWatch { rx: self.socket.subscribe_status() }
    }

    /// Run `callback` for every inbound message until the binding drops
    pub fn on_message(
        &self,
        callback: impl FnMut(&Message) + Send + 'static,
    ) -> EventBinding<Message> {
        EventBinding::register(&self.socket, EventKind::Message, message_payload, callback)
    }

    /// Run `callback` for every lost-connection notification until the
    /// binding drops
    pub fn on_lost_connection(
        &self,
        callback: impl FnMut(&LostConnection) + Send + 'static,
    ) -> EventBinding<LostConnection> {
        EventBinding::register(
            &self.socket,
            EventKind::LostConnection,
            lost_connection_payload,
            callback,
        )
    }
}

impl Drop for SocketContext {
    fn drop(&mut self) {
        self.socket.close();
    }
}

fn message_payload(event: &Event) -> Option<&Message> {
    match event {
        Event::Message(message) => Some(message),
        _ => None,
    }
}

fn lost_connection_payload(event: &Event) -> Option<&LostConnection> {
    match event {
        Event::LostConnection(value) => Some(value),
        _ => None,
    }
}

/// Live view of the socket status
pub struct StatusWatch {
    rx: watch::Receiver<Status>,
}

impl StatusWatch {
    /// Read the current status synchronously
    pub fn current(&self) -> Status {
        *self.rx.borrow()
    }

    /// Wait for the next transition and return the new status
    ///
    /// Returns the last known status when the socket is gone.
    pub async fn changed(&mut self) -> Status {
        let _ = self.rx.changed().await;
        *self.rx.borrow_and_update()
    }
}

type CallbackSlot<T> = Arc<Mutex<Box<dyn FnMut(&T) + Send>>>;

/// A component-lifetime event subscription
///
/// Dropping the binding unsubscribes. [`set`](Self::set) replaces the
/// callback without touching the subscription, so no event is missed
/// while a component re-renders.
pub struct EventBinding<T> {
    slot: CallbackSlot<T>,
    id: ListenerId,
    socket: Arc<Socket>,
}

impl<T: 'static> EventBinding<T> {
    fn register(
        socket: &Arc<Socket>,
        kind: EventKind,
        payload: fn(&Event) -> Option<&T>,
        callback: impl FnMut(&T) + Send + 'static,
    ) -> Self {
        let slot: CallbackSlot<T> = Arc::new(Mutex::new(Box::new(callback)));
        let dispatch_slot = Arc::clone(&slot);
        let id = socket.on(kind, move |event| {
            if let Some(value) = payload(event) {
                (dispatch_slot.lock())(value);
            }
        });
        Self { slot, id, socket: Arc::clone(socket) }
    }

    /// Swap in the latest callback
    pub fn set(&self, callback: impl FnMut(&T) + Send + 'static) {
        *self.slot.lock() = Box::new(callback);
    }
}

impl<T> Drop for EventBinding<T> {
    fn drop(&mut self) {
        self.socket.off(self.id);
    }
}
