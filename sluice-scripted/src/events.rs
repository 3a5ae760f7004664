use parking_lot::Mutex;
use sluice_core::{Disposition, Value};
use std::{sync::Arc, time::Duration};

/// Something the driver observed, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected {
        connection: u64,
        reused: bool,
    },
    CommandCreated {
        connection: u64,
        sql: String,
        params: Vec<Value>,
        timeout: Duration,
    },
    /// The server side cancellation was requested.
    CancelRequested {
        connection: u64,
    },
    /// The connection was closed from another thread.
    ForceClosed {
        connection: u64,
    },
    CancelerDropped {
        connection: u64,
    },
    CloserDropped {
        connection: u64,
    },
    Released {
        connection: u64,
        disposition: Disposition,
    },
    Closed {
        connection: u64,
    },
}

/// Shared, append only log of [`Event`].
#[derive(Debug, Clone, Default)]
pub struct Events(Arc<Mutex<Vec<Event>>>);

impl Events {
    pub(crate) fn push(&self, event: Event) {
        log::trace!("{:?}", event);
        self.0.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.0.lock().contains(event)
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.0.lock().iter().position(|v| v == event)
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().iter().filter(|v| predicate(v)).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}
