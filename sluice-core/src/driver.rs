use crate::{Error, Result, RowLabeled, RowNames, RowsAffected, Value};
use std::{
    fmt::{self, Display},
    future::Future,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Entry point of a backend: opens connections and takes them back.
///
/// The execution layer consumes drivers as opaque capabilities. Every blocking method has an
/// asynchronous twin receiving the cancellation signal that governs the current query, drivers
/// are expected to stop cooperatively and return [`OperationCanceled`] when it fires.
pub trait Driver: Send + Sync + 'static {
    type Connection: Connection;

    const NAME: &'static str;

    /// Open (or take from a pool) a connection.
    fn connect(&self) -> Result<Self::Connection>;

    /// Open (or take from a pool) a connection, giving up when `cancel` fires.
    fn connect_async(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;

    /// Take back a connection at the end of a query.
    ///
    /// A [`Disposition::Broken`] connection must never be handed out again. The default
    /// implementation closes every connection, pooling drivers override it.
    fn release(&self, connection: Self::Connection, disposition: Disposition) {
        if disposition == Disposition::Broken {
            log::debug!("Releasing a broken {} connection", Self::NAME);
        }
        if let Err(e) = connection.close() {
            log::error!("{:#}", e);
        }
    }
}

/// State of a connection when it is given back to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The query ended under normal control, the connection can be reused.
    Reusable,
    /// The connection was force-closed or its state is unknown.
    Broken,
}

pub trait Connection: Send + 'static {
    type Command: Command;
    type Closer: ConnectionCloser;

    /// Handle able to close this connection from another thread while a query is running on it.
    fn closer(&self) -> Self::Closer;

    /// Build a command, `timeout` is the timeout in effect for the query.
    fn create_command(
        &mut self,
        sql: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<Self::Command>;

    fn close(self) -> Result<()>
    where
        Self: Sized;
}

pub trait Command: Send + 'static {
    type Reader: Reader;
    type Canceler: CommandCanceler;

    /// Handle asking the server to cancel this command while it runs.
    fn canceler(&self) -> Self::Canceler;

    fn execute_reader(&mut self) -> Result<Self::Reader>;

    /// Start executing, resolves once the server begins returning results.
    fn execute_reader_async(
        &mut self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Self::Reader>> + Send;
}

/// Forward cursor over one or more result sets.
pub trait Reader: Send + 'static {
    /// Advance to the next row of the current result set.
    fn read(&mut self) -> Result<bool>;

    fn read_async(&mut self, cancel: CancellationToken)
    -> impl Future<Output = Result<bool>> + Send;

    /// Move to the next result set, `false` when there are no more.
    fn next_result(&mut self) -> Result<bool>;

    fn next_result_async(
        &mut self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Column names of the current result set.
    fn labels(&self) -> RowNames;

    /// Value of the column at `ordinal` in the current row.
    fn get(&self, ordinal: usize) -> Result<Value>;

    /// Rows modified by the current result set, zero for queries returning rows.
    fn rows_affected(&self) -> RowsAffected {
        RowsAffected::default()
    }

    fn current_row(&self) -> Result<RowLabeled> {
        let labels = self.labels();
        let values = (0..labels.len())
            .map(|i| self.get(i))
            .collect::<Result<_>>()?;
        Ok(RowLabeled::new(labels, values))
    }
}

/// Thread safe handle force-closing a connection.
///
/// Called from a timer context while the query may still be running on the connection.
pub trait ConnectionCloser: Send + Sync + 'static {
    fn close(&self) -> Result<()>;
}

/// Thread safe handle requesting the server side cancellation of a command.
///
/// Best-effort: it must not block for long and it is a no-op when nothing is running.
pub trait CommandCanceler: Send + Sync + 'static {
    fn cancel(&self) -> Result<()>;
}

/// Returned by drivers that stopped because the cancellation signal they were given fired.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OperationCanceled;

impl Display for OperationCanceled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("The operation was canceled")
    }
}

impl std::error::Error for OperationCanceled {}

impl OperationCanceled {
    pub fn error() -> Error {
        Error::new(OperationCanceled)
    }

    /// True if `error` is exactly an [`OperationCanceled`] with no context attached.
    pub fn is(error: &Error) -> bool {
        error.downcast_ref::<OperationCanceled>().is_some() && error.chain().count() == 1
    }
}
