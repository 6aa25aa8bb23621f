//! Listener registry and event fan-out
//!
//! Listeners fire synchronously in registration order. Each emission works
//! from a snapshot of the table: listeners added during an emission do not
//! see the current event, while removals take effect immediately because
//! liveness is re-checked per listener. A panicking listener is isolated
//! and logged; the remaining listeners still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::core::event::{Event, EventKind};

/// Identifies one registered listener
///
/// Returned by [`Socket::on`] and [`Socket::once`]; pass it to
/// [`Socket::off`] to unsubscribe. Removal is idempotent.
///
/// [`Socket::on`]: crate::core::socket::Socket::on
/// [`Socket::once`]: crate::core::socket::Socket::once
/// [`Socket::off`]: crate::core::socket::Socket::off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Slot = Arc<dyn Fn(&Event) + Send + Sync>;

struct Entry {
    id: u64,
    kind: EventKind,
    slot: Slot,
    once: bool,
}

#[derive(Default)]
pub(crate) struct Emitter {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl Emitter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> ListenerId {
        self.register(kind, Arc::new(listener), false)
    }

    pub(crate) fn once(
        &self,
        kind: EventKind,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> ListenerId {
        self.register(kind, Arc::new(listener), true)
    }

    fn register(&self, kind: EventKind, slot: Slot, once: bool) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push(Entry { id, kind, slot, once });
        ListenerId(id)
    }

    pub(crate) fn off(&self, id: ListenerId) {
        self.entries.lock().retain(|entry| entry.id != id.0);
    }

    pub(crate) fn emit(&self, event: &Event) {
        let kind = event.kind();
        let snapshot: Vec<(u64, Slot, bool)> = {
            let entries = self.entries.lock();
            entries
                .iter()
                .filter(|entry| entry.kind == kind)
                .map(|entry| (entry.id, Arc::clone(&entry.slot), entry.once))
                .collect()
        };

        for (id, slot, once) in snapshot {
            // Removed between snapshot and dispatch means skip; one-shot
            // listeners come out of the table before their slot runs
            let live = {
                let mut entries = self.entries.lock();
                match entries.iter().position(|entry| entry.id == id) {
                    Some(position) => {
                        if once {
                            entries.remove(position);
                        }
                        true
                    }
                    None => false,
                }
            };
            if !live {
                continue;
            }

            if catch_unwind(AssertUnwindSafe(|| slot(event))).is_err() {
                error!(kind = ?kind, "event listener panicked, continuing with remaining listeners");
            }
        }
    }
}
