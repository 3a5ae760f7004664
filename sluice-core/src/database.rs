use crate::{
    Affected, AllRows, AsValue, Driver, Error, FirstRow, FromRow, Projection, Query, QueryConfig,
    QueryError, Result, ResultSets, RowLabeled, RowsAffected, Scalar, SingleRow, Value,
    executor::Execution,
};
use std::{any, sync::Arc, time::Duration};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;

/// Entry point of the execution layer: a driver together with the settings applied to every
/// query. Cloning is cheap, clones share the driver.
///
/// ```rust,ignore
/// let db = Database::new(driver, QueryConfig::default().close_penalty_secs(5));
/// let names: Vec<(String,)> = db
///     .query("SELECT name FROM users WHERE age > ?")
///     .bind(21)
///     .timeout_secs(2)
///     .fetch_all()
///     .await?;
/// ```
#[derive(Debug)]
pub struct Database<D: Driver> {
    driver: Arc<D>,
    config: QueryConfig,
    runtime: Option<Handle>,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            config: self.config,
            runtime: self.runtime.clone(),
        }
    }
}

impl<D: Driver> Database<D> {
    pub fn new(driver: D, config: QueryConfig) -> Self {
        Self {
            driver: Arc::new(driver),
            config,
            runtime: None,
        }
    }

    /// Runtime driving the timers, required by the blocking methods when they are called from a
    /// thread that is not part of a tokio runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn query(&self, query: impl Into<Query>) -> QueryBuilder<'_, D> {
        QueryBuilder {
            database: self,
            query: query.into(),
            cancel: None,
        }
    }

    fn runtime(&self) -> std::result::Result<Handle, QueryError> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.clone()),
            None => Handle::try_current().map_err(|_| QueryError::MissingRuntime),
        }
    }

    /// Runtime for the blocking path. A current-thread runtime cannot drive the timers while the
    /// thread running it is blocked by the query.
    fn blocking_runtime(&self) -> std::result::Result<Handle, QueryError> {
        let runtime = self.runtime()?;
        let starved = runtime.runtime_flavor() == RuntimeFlavor::CurrentThread
            && Handle::try_current()
                .is_ok_and(|current| current.runtime_flavor() == RuntimeFlavor::CurrentThread);
        if starved {
            log::error!(
                "Blocking execution from a current-thread runtime, the timers would never run"
            );
            return Err(QueryError::MissingRuntime);
        }
        Ok(runtime)
    }

    /// Execute `query` and apply `projection` to its reader, under the query timeout, the
    /// caller's cancellation and the close penalty.
    pub async fn run<P: Projection>(
        &self,
        query: &Query,
        cancel: CancellationToken,
        projection: P,
    ) -> std::result::Result<P::Output, QueryError> {
        let runtime = self.runtime()?;
        Execution {
            driver: self.driver.as_ref(),
            config: &self.config,
            runtime: &runtime,
            query,
        }
        .run(cancel, projection)
        .await
    }

    /// Blocking twin of [`Database::run`].
    ///
    /// Fails with [`QueryError::MissingRuntime`] when called from a current-thread runtime that
    /// would also have to drive the timers.
    pub fn run_blocking<P: Projection>(
        &self,
        query: &Query,
        cancel: CancellationToken,
        projection: P,
    ) -> std::result::Result<P::Output, QueryError> {
        let runtime = self.blocking_runtime()?;
        Execution {
            driver: self.driver.as_ref(),
            config: &self.config,
            runtime: &runtime,
            query,
        }
        .run_blocking(cancel, projection)
    }
}

/// Fluent configuration of one query, consumed by a terminal method.
pub struct QueryBuilder<'d, D: Driver> {
    database: &'d Database<D>,
    query: Query,
    cancel: Option<CancellationToken>,
}

fn no_rows<T>() -> QueryError {
    QueryError::Driver(Error::msg(format!(
        "Expected one row to decode {}, the query returned none",
        any::type_name::<T>()
    )))
}

impl<'d, D: Driver> QueryBuilder<'d, D> {
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.query.bind(value);
        self
    }

    pub fn bind_index(mut self, value: impl Into<Value>, index: usize) -> Result<Self> {
        self.query.bind_index(value, index)?;
        Ok(self)
    }

    pub fn bind_null<T: AsValue>(mut self) -> Self {
        self.query.bind_null::<T>();
        self
    }

    /// Override [`QueryConfig::query_timeout`] for this query.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.query.timeout(timeout);
        self
    }

    pub fn timeout_secs(mut self, seconds: u64) -> Self {
        self.query.timeout_secs(seconds);
        self
    }

    /// Cancel the query when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn into_parts(self) -> (&'d Database<D>, Query, CancellationToken) {
        (self.database, self.query, self.cancel.unwrap_or_default())
    }

    pub async fn project<P: Projection>(
        self,
        projection: P,
    ) -> std::result::Result<P::Output, QueryError> {
        let (database, query, cancel) = self.into_parts();
        database.run(&query, cancel, projection).await
    }

    pub fn project_blocking<P: Projection>(
        self,
        projection: P,
    ) -> std::result::Result<P::Output, QueryError> {
        let (database, query, cancel) = self.into_parts();
        database.run_blocking(&query, cancel, projection)
    }

    pub async fn fetch_all<T: FromRow + Send>(self) -> std::result::Result<Vec<T>, QueryError> {
        self.project(AllRows::new()).await
    }

    pub fn fetch_all_blocking<T: FromRow + Send>(
        self,
    ) -> std::result::Result<Vec<T>, QueryError> {
        self.project_blocking(AllRows::new())
    }

    /// The first row, if any. The remaining rows are not read.
    pub async fn fetch_first<T: FromRow + Send>(
        self,
    ) -> std::result::Result<Option<T>, QueryError> {
        self.project(FirstRow::new()).await
    }

    pub fn fetch_first_blocking<T: FromRow + Send>(
        self,
    ) -> std::result::Result<Option<T>, QueryError> {
        self.project_blocking(FirstRow::new())
    }

    /// Zero or one row, more than one is an error.
    pub async fn fetch_optional<T: FromRow + Send>(
        self,
    ) -> std::result::Result<Option<T>, QueryError> {
        self.project(SingleRow::new()).await
    }

    pub fn fetch_optional_blocking<T: FromRow + Send>(
        self,
    ) -> std::result::Result<Option<T>, QueryError> {
        self.project_blocking(SingleRow::new())
    }

    /// Exactly one row.
    pub async fn fetch_one<T: FromRow + Send>(self) -> std::result::Result<T, QueryError> {
        self.fetch_optional().await?.ok_or_else(no_rows::<T>)
    }

    pub fn fetch_one_blocking<T: FromRow + Send>(self) -> std::result::Result<T, QueryError> {
        self.fetch_optional_blocking()?.ok_or_else(no_rows::<T>)
    }

    /// First column of the first row, `None` when there are no rows.
    pub async fn fetch_scalar<T: AsValue + Send>(
        self,
    ) -> std::result::Result<Option<T>, QueryError> {
        self.project(Scalar::new()).await
    }

    pub fn fetch_scalar_blocking<T: AsValue + Send>(
        self,
    ) -> std::result::Result<Option<T>, QueryError> {
        self.project_blocking(Scalar::new())
    }

    pub async fn fetch_result_sets(
        self,
    ) -> std::result::Result<Vec<Vec<RowLabeled>>, QueryError> {
        self.project(ResultSets).await
    }

    pub fn fetch_result_sets_blocking(
        self,
    ) -> std::result::Result<Vec<Vec<RowLabeled>>, QueryError> {
        self.project_blocking(ResultSets)
    }

    pub async fn execute(self) -> std::result::Result<RowsAffected, QueryError> {
        self.project(Affected).await
    }

    pub fn execute_blocking(self) -> std::result::Result<RowsAffected, QueryError> {
        self.project_blocking(Affected)
    }
}
