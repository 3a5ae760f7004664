use crate::{Event, Events, ScriptedConnection, Statement};
use parking_lot::Mutex;
use sluice_core::{CancellationToken, Disposition, Driver, Error, OperationCanceled, Result};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// In-memory driver answering every SQL text with the [`Statement`] scripted for it.
///
/// Connections given back as [`Disposition::Reusable`] are pooled and handed out again, the
/// others are closed. Everything the driver observes is recorded in [`ScriptedDriver::events`].
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    pub(crate) shared: Arc<Shared>,
}

#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) script: Mutex<HashMap<String, Statement>>,
    pub(crate) events: Events,
    idle: Mutex<Vec<ScriptedConnection>>,
    next_id: AtomicU64,
    connect_delay: Mutex<Option<Duration>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `statement`, replacing the previous script for the same text.
    pub fn on(self, sql: impl Into<String>, statement: Statement) -> Self {
        self.script(sql, statement);
        self
    }

    pub fn script(&self, sql: impl Into<String>, statement: Statement) {
        self.shared.script.lock().insert(sql.into(), statement);
    }

    /// Time it takes to open a new connection.
    pub fn connect_delay(self, delay: Duration) -> Self {
        *self.shared.connect_delay.lock() = Some(delay);
        self
    }

    pub fn events(&self) -> Events {
        self.shared.events.clone()
    }

    /// Connections currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.shared.idle.lock().len()
    }

    fn pooled(&self) -> Option<ScriptedConnection> {
        let connection = self.shared.idle.lock().pop()?;
        self.shared.events.push(Event::Connected {
            connection: connection.id(),
            reused: true,
        });
        Some(connection)
    }

    fn open(&self) -> ScriptedConnection {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.events.push(Event::Connected {
            connection: id,
            reused: false,
        });
        ScriptedConnection::new(id, self.shared.clone())
    }
}

impl Driver for ScriptedDriver {
    type Connection = ScriptedConnection;

    const NAME: &'static str = "scripted";

    fn connect(&self) -> Result<ScriptedConnection> {
        if let Some(connection) = self.pooled() {
            return Ok(connection);
        }
        let delay = *self.shared.connect_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(self.open())
    }

    async fn connect_async(&self, cancel: CancellationToken) -> Result<ScriptedConnection> {
        if let Some(connection) = self.pooled() {
            return Ok(connection);
        }
        let delay = *self.shared.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(Error::new(OperationCanceled).context("While connecting"));
                }
            }
        }
        Ok(self.open())
    }

    fn release(&self, connection: ScriptedConnection, disposition: Disposition) {
        self.shared.events.push(Event::Released {
            connection: connection.id(),
            disposition,
        });
        if disposition == Disposition::Reusable && !connection.is_closed() {
            self.shared.idle.lock().push(connection);
        } else if let Err(e) = sluice_core::Connection::close(connection) {
            log::error!("{:#}", e);
        }
    }
}
