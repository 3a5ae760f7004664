use crate::{Event, Events, ScriptedReader, Statement};
use sluice_core::{
    CancellationToken, Command, CommandCanceler, Error, OperationCanceled, Result,
};
use std::{
    thread,
    time::{Duration, Instant},
};

/// Interval at which a blocking command checks whether it was canceled or closed.
pub(crate) const POLL: Duration = Duration::from_millis(5);

pub(crate) fn canceled_by_server() -> Error {
    Error::new(OperationCanceled).context("Canceled on request of the client")
}

pub struct ScriptedCommand {
    connection: u64,
    statement: Statement,
    closed: CancellationToken,
    canceled: CancellationToken,
    events: Events,
}

impl ScriptedCommand {
    pub(crate) fn new(
        connection: u64,
        statement: Statement,
        closed: CancellationToken,
        events: Events,
    ) -> Self {
        Self {
            connection,
            statement,
            closed,
            canceled: CancellationToken::new(),
            events,
        }
    }

    fn closed_error(&self) -> Error {
        Error::msg(format!(
            "Connection {} was closed while the command was running",
            self.connection
        ))
    }

    fn complete(&self) -> Result<ScriptedReader> {
        if let Some(message) = &self.statement.fail_on_execute {
            return Err(Error::msg(message.clone()));
        }
        Ok(ScriptedReader::new(
            &self.statement,
            self.closed.clone(),
            self.canceled.clone(),
        ))
    }
}

impl Command for ScriptedCommand {
    type Reader = ScriptedReader;
    type Canceler = ScriptedCanceler;

    fn canceler(&self) -> ScriptedCanceler {
        ScriptedCanceler {
            connection: self.connection,
            canceled: self.canceled.clone(),
            events: self.events.clone(),
        }
    }

    fn execute_reader(&mut self) -> Result<ScriptedReader> {
        let started = Instant::now();
        loop {
            if self.closed.is_cancelled() {
                return Err(self.closed_error());
            }
            if self.statement.responds_to_cancel && self.canceled.is_cancelled() {
                return Err(canceled_by_server());
            }
            if self.statement.stall.is_over(started) {
                break;
            }
            thread::sleep(POLL);
        }
        self.complete()
    }

    async fn execute_reader_async(&mut self, cancel: CancellationToken) -> Result<ScriptedReader> {
        let responds = self.statement.responds_to_cancel;
        let stall = self.statement.stall.elapse();
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(self.closed_error()),
            _ = cancel.cancelled(), if responds => return Err(OperationCanceled::error()),
            _ = self.canceled.cancelled(), if responds => return Err(canceled_by_server()),
            _ = stall => {}
        }
        self.complete()
    }
}

/// Requests the cancellation of a [`ScriptedCommand`], the request is lost when the statement
/// ignores cancellation.
pub struct ScriptedCanceler {
    connection: u64,
    canceled: CancellationToken,
    events: Events,
}

impl CommandCanceler for ScriptedCanceler {
    fn cancel(&self) -> Result<()> {
        self.events.push(Event::CancelRequested {
            connection: self.connection,
        });
        self.canceled.cancel();
        Ok(())
    }
}

impl Drop for ScriptedCanceler {
    fn drop(&mut self) {
        self.events.push(Event::CancelerDropped {
            connection: self.connection,
        });
    }
}
