//! The socket engine
//!
//! [`socket`] owns the lifecycle state machine; the sibling modules are
//! its subordinate parts: single-shot connection [`attempt`]s, the send
//! [`buffer`], the [`heartbeat`] controller, the listener [`emitter`] and
//! the [`status`] model. [`config`] holds the builder that wires them
//! together.

pub mod attempt;
pub mod buffer;
pub mod config;
pub mod emitter;
pub mod event;
pub mod heartbeat;
pub mod socket;
pub mod status;

pub use buffer::BufferPolicy;
pub use config::SocketBuilder;
pub use emitter::ListenerId;
pub use event::{DisconnectCause, Event, EventKind, LostConnection};
pub use heartbeat::HeartbeatOptions;
pub use socket::Socket;
pub use status::{ReadyState, Status};
