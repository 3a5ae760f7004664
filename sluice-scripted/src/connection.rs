use crate::{Event, Events, ScriptedCommand, driver::Shared};
use sluice_core::{CancellationToken, Connection, ConnectionCloser, Error, Result, Value};
use std::{sync::Arc, time::Duration};

pub struct ScriptedConnection {
    id: u64,
    closed: CancellationToken,
    shared: Arc<Shared>,
}

impl ScriptedConnection {
    pub(crate) fn new(id: u64, shared: Arc<Shared>) -> Self {
        Self {
            id,
            closed: CancellationToken::new(),
            shared,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the connection was closed from another thread.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Connection for ScriptedConnection {
    type Command = ScriptedCommand;
    type Closer = ScriptedCloser;

    fn closer(&self) -> ScriptedCloser {
        ScriptedCloser {
            connection: self.id,
            closed: self.closed.clone(),
            events: self.shared.events.clone(),
        }
    }

    fn create_command(
        &mut self,
        sql: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<ScriptedCommand> {
        if self.is_closed() {
            return Err(Error::msg(format!("Connection {} is closed", self.id)));
        }
        let Some(statement) = self.shared.script.lock().get(sql).cloned() else {
            return Err(Error::msg(format!("No statement is scripted for `{sql}`")));
        };
        self.shared.events.push(Event::CommandCreated {
            connection: self.id,
            sql: sql.to_string(),
            params: params.to_vec(),
            timeout,
        });
        Ok(ScriptedCommand::new(
            self.id,
            statement,
            self.closed.clone(),
            self.shared.events.clone(),
        ))
    }

    fn close(self) -> Result<()> {
        self.shared.events.push(Event::Closed {
            connection: self.id,
        });
        Ok(())
    }
}

/// Closes a [`ScriptedConnection`] from another thread, the command running on it fails.
pub struct ScriptedCloser {
    connection: u64,
    closed: CancellationToken,
    events: Events,
}

impl ConnectionCloser for ScriptedCloser {
    fn close(&self) -> Result<()> {
        self.events.push(Event::ForceClosed {
            connection: self.connection,
        });
        self.closed.cancel();
        Ok(())
    }
}

impl Drop for ScriptedCloser {
    fn drop(&mut self) {
        self.events.push(Event::CloserDropped {
            connection: self.connection,
        });
    }
}
