use crate::{
    AbnormalCloseGuard, CancelCommandRequest, CancelSource, Command, Connection, Disposition,
    Driver, Error, LinkedCancellation, Projection, Query, QueryConfig, QueryError, Result,
};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

type CommandOf<D> = <<D as Driver>::Connection as Connection>::Command;
type ReaderOf<D> = <CommandOf<D> as Command>::Reader;

/// Owns the connection, the command and the reader of one query execution.
///
/// They are released together, reader first and connection last. A scope dropped before
/// [`CommandScope::finish`] (an early return or an abandoned future) gives the connection back
/// as [`Disposition::Broken`], its state is unknown at that point.
struct CommandScope<'d, D: Driver> {
    driver: &'d D,
    connection: Option<D::Connection>,
    command: Option<CommandOf<D>>,
    reader: Option<ReaderOf<D>>,
}

impl<'d, D: Driver> CommandScope<'d, D> {
    fn new(driver: &'d D) -> Self {
        Self {
            driver,
            connection: None,
            command: None,
            reader: None,
        }
    }

    fn finish(&mut self, disposition: Disposition) {
        self.reader.take();
        self.command.take();
        if let Some(connection) = self.connection.take() {
            self.driver.release(connection, disposition);
        }
    }
}

impl<D: Driver> Drop for CommandScope<'_, D> {
    fn drop(&mut self) {
        if self.connection.is_some() {
            log::debug!(
                "Query interrupted, releasing the {} connection as broken",
                D::NAME
            );
        }
        self.finish(Disposition::Broken);
    }
}

/// Error of a guarded execution, before classification.
struct Failure {
    error: Error,
    abnormally_closed: bool,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            abnormally_closed: false,
        }
    }
}

/// Execution parameters resolved once per query.
pub(crate) struct Execution<'a, D: Driver> {
    pub(crate) driver: &'a D,
    pub(crate) config: &'a QueryConfig,
    pub(crate) runtime: &'a Handle,
    pub(crate) query: &'a Query,
}

impl<D: Driver> Execution<'_, D> {
    fn timeout(&self) -> Duration {
        self.query
            .timeout_override()
            .unwrap_or(self.config.query_timeout)
    }

    /// Run the query on the asynchronous path.
    pub(crate) async fn run<P: Projection>(
        &self,
        user: CancellationToken,
        projection: P,
    ) -> std::result::Result<P::Output, QueryError> {
        let timeout = self.timeout();
        let linked = LinkedCancellation::new(user, timeout, self.runtime);
        log::debug!("Executing `{}` with timeout {:?}", self.query, timeout);
        match self.guarded_async(timeout, linked.token(), projection).await {
            Ok(output) => Ok(output),
            Err(failure) => Err(self.classify(failure, &linked)),
        }
    }

    /// Run the query on the blocking path, the current thread waits for every step.
    ///
    /// The timers are driven by `runtime`, which therefore must not be the runtime blocked by
    /// this call.
    pub(crate) fn run_blocking<P: Projection>(
        &self,
        user: CancellationToken,
        projection: P,
    ) -> std::result::Result<P::Output, QueryError> {
        let timeout = self.timeout();
        let linked = LinkedCancellation::new(user, timeout, self.runtime);
        log::debug!("Executing `{}` (blocking) with timeout {:?}", self.query, timeout);
        match self.guarded_blocking(timeout, linked.token(), projection) {
            Ok(output) => Ok(output),
            Err(failure) => Err(self.classify(failure, &linked)),
        }
    }

    async fn guarded_async<P: Projection>(
        &self,
        timeout: Duration,
        signal: CancellationToken,
        projection: P,
    ) -> std::result::Result<P::Output, Failure> {
        let mut scope = CommandScope::new(self.driver);
        let connection = scope
            .connection
            .insert(self.driver.connect_async(signal.clone()).await?);
        let closer = connection.closer();
        let command =
            match connection.create_command(self.query.sql(), self.query.params(), timeout) {
                Ok(command) => scope.command.insert(command),
                Err(e) => {
                    scope.finish(Disposition::Reusable);
                    return Err(e.into());
                }
            };
        // Declaration order is the reverse of the drop order on an abandoned future
        let mut guard = AbnormalCloseGuard::new(
            self.config.close_penalty,
            Box::new(closer),
            &signal,
            self.runtime,
        );
        let mut cancel_request =
            CancelCommandRequest::new(Box::new(command.canceler()), &signal, self.runtime);
        let result = read_async(command, &mut scope.reader, projection, signal).await;
        cancel_request.dispose();
        let abnormally_closed = guard.dispose();
        scope.finish(disposition(abnormally_closed));
        result.map_err(|error| Failure {
            error,
            abnormally_closed,
        })
    }

    fn guarded_blocking<P: Projection>(
        &self,
        timeout: Duration,
        signal: CancellationToken,
        projection: P,
    ) -> std::result::Result<P::Output, Failure> {
        let mut scope = CommandScope::new(self.driver);
        let connection = scope.connection.insert(self.driver.connect()?);
        let closer = connection.closer();
        let command =
            match connection.create_command(self.query.sql(), self.query.params(), timeout) {
                Ok(command) => scope.command.insert(command),
                Err(e) => {
                    scope.finish(Disposition::Reusable);
                    return Err(e.into());
                }
            };
        let mut guard = AbnormalCloseGuard::new(
            self.config.close_penalty,
            Box::new(closer),
            &signal,
            self.runtime,
        );
        let mut cancel_request =
            CancelCommandRequest::new(Box::new(command.canceler()), &signal, self.runtime);
        let result = read_blocking(command, &mut scope.reader, projection);
        cancel_request.dispose();
        let abnormally_closed = guard.dispose();
        scope.finish(disposition(abnormally_closed));
        result.map_err(|error| Failure {
            error,
            abnormally_closed,
        })
    }

    /// Map a failure to exactly one [`QueryError`], the first matching rule wins.
    fn classify(&self, failure: Failure, linked: &LinkedCancellation) -> QueryError {
        let Failure {
            error,
            abnormally_closed,
        } = failure;
        let classified = if abnormally_closed {
            QueryError::ConnectionClosedAbnormally {
                query_timeout: linked.timeout(),
                close_penalty: self.config.close_penalty,
                source: error,
            }
        } else if linked.source() == Some(CancelSource::Timeout) {
            QueryError::QueryTimeout {
                timeout: linked.timeout(),
                source: error,
            }
        } else if linked.user_requested() {
            QueryError::canceled(error)
        } else {
            QueryError::Driver(error)
        };
        log::debug!(
            "Query `{}` failed: {:?} ({})",
            self.query,
            classified.kind(),
            classified
        );
        classified
    }
}

fn disposition(abnormally_closed: bool) -> Disposition {
    if abnormally_closed {
        Disposition::Broken
    } else {
        Disposition::Reusable
    }
}

async fn read_async<C: Command, P: Projection>(
    command: &mut C,
    reader: &mut Option<C::Reader>,
    projection: P,
    signal: CancellationToken,
) -> Result<P::Output> {
    let reader = reader.insert(command.execute_reader_async(signal.clone()).await?);
    projection.project_async(reader, signal).await
}

fn read_blocking<C: Command, P: Projection>(
    command: &mut C,
    reader: &mut Option<C::Reader>,
    projection: P,
) -> Result<P::Output> {
    let reader = reader.insert(command.execute_reader()?);
    projection.project(reader)
}
