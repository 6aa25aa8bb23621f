use std::collections::VecDeque;

use tracing::debug;

use crate::traits::transport::Message;

/// What happens to messages sent while the socket is not connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Drop the message (a debug trace records it)
    Disabled,
    /// Queue without bound, flushed in order on the next open transport
    Unbounded,
    /// Queue up to N messages, dropping the oldest on overflow
    Bounded(usize),
}

/// FIFO of payloads waiting for the next open transport
#[derive(Debug)]
pub(crate) struct SendBuffer {
    policy: BufferPolicy,
    queue: VecDeque<Message>,
}

impl SendBuffer {
    pub(crate) fn new(policy: BufferPolicy) -> Self {
        Self { policy, queue: VecDeque::new() }
    }

    /// Queue a message per policy; returns false when it was dropped
    pub(crate) fn enqueue(&mut self, message: Message) -> bool {
        match self.policy {
            BufferPolicy::Disabled => {
                debug!("dropping message sent while not connected, buffering is disabled");
                false
            }
            BufferPolicy::Unbounded => {
                self.queue.push_back(message);
                true
            }
            BufferPolicy::Bounded(max) => {
                self.queue.push_back(message);
                while self.queue.len() > max {
                    self.queue.pop_front();
                    debug!("send buffer over capacity, dropped oldest message");
                }
                true
            }
        }
    }

    /// Take the next message in enqueue order
    pub(crate) fn pop_front(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }

    /// Put a message back at the head after a failed handoff
    pub(crate) fn push_front(&mut self, message: Message) {
        self.queue.push_front(message);
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }

    /// Total queued payload size
    pub(crate) fn bytes(&self) -> u64 {
        self.queue.iter().map(|m| m.len() as u64).sum()
    }
}
